//! Where occupancy snapshots go

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use switchboard_db::{append_snapshot, prune_snapshots_before, retention_cutoff};
use tracing::{debug, warn};

use crate::{OccupancySnapshot, SamplerError};

/// Destination for occupancy snapshots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn record(&self, snapshot: OccupancySnapshot) -> Result<(), SamplerError>;
}

/// Analytics database sink
///
/// Appends the snapshot, then prunes rows past the retention window. Pruning is
/// best effort: a failed prune is logged and the append still counts.
pub struct DatabaseSink {
    db: DatabaseConnection,
}

impl DatabaseSink {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SnapshotSink for DatabaseSink {
    async fn record(&self, snapshot: OccupancySnapshot) -> Result<(), SamplerError> {
        append_snapshot(&self.db, snapshot.ts, snapshot.active_tunnels).await?;

        match prune_snapshots_before(&self.db, retention_cutoff(Utc::now())).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Pruned expired occupancy snapshots"),
            Err(e) => warn!("Failed to prune occupancy snapshots: {}", e),
        }

        Ok(())
    }
}
