//! Occupancy snapshot writes and retention

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::entities::{active_tunnel_snapshot, ActiveTunnelSnapshot};

/// How long snapshots are kept before pruning
pub const SNAPSHOT_RETENTION_DAYS: i64 = 90;

/// Append one snapshot row
pub async fn append_snapshot<C: ConnectionTrait>(
    db: &C,
    ts: DateTime<Utc>,
    active_tunnels: u64,
) -> Result<active_tunnel_snapshot::Model, DbErr> {
    let active_tunnels = i64::try_from(active_tunnels)
        .map_err(|_| DbErr::Custom(format!("active tunnel count out of range: {}", active_tunnels)))?;

    active_tunnel_snapshot::ActiveModel {
        ts: Set(ts),
        active_tunnels: Set(active_tunnels),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Delete snapshots strictly older than `cutoff`, returning the number removed
pub async fn prune_snapshots_before<C: ConnectionTrait>(
    db: &C,
    cutoff: DateTime<Utc>,
) -> Result<u64, DbErr> {
    let result = ActiveTunnelSnapshot::delete_many()
        .filter(active_tunnel_snapshot::Column::Ts.lt(cutoff))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Cutoff for the retention window as of `now`
pub fn retention_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(SNAPSHOT_RETENTION_DAYS)
}

/// Most recent snapshots, newest first
pub async fn recent_snapshots<C: ConnectionTrait>(
    db: &C,
    limit: u64,
) -> Result<Vec<active_tunnel_snapshot::Model>, DbErr> {
    ActiveTunnelSnapshot::find()
        .order_by_desc(active_tunnel_snapshot::Column::Ts)
        .limit(limit)
        .all(db)
        .await
}
