//! Tunnel record lookups

use sea_orm::{ConnectionTrait, DbErr, EntityTrait};

use crate::entities::{tunnel, Tunnel};

/// Load a tunnel record by id
pub async fn find_tunnel<C: ConnectionTrait>(
    db: &C,
    tunnel_id: &str,
) -> Result<Option<tunnel::Model>, DbErr> {
    Tunnel::find_by_id(tunnel_id.to_string()).one(db).await
}
