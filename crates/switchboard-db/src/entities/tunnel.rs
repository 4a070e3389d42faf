//! Tunnel entity, owned by the dashboard and read by the control plane
//!
//! Timestamps are `timestamp without time zone` holding UTC wall-clock time,
//! matching the dashboard's schema.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tunnels")]
pub struct Model {
    /// Tunnel ID (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// User who created the tunnel
    pub user_id: String,

    /// Organization owning the tunnel (optional)
    pub organization_id: Option<String>,

    /// Display name
    pub name: Option<String>,

    /// Public URL as stored at registration
    /// (`https://pretty-cake.example.app`, `tcp://pretty-cake.example.app:20001`)
    pub url: String,

    /// Protocol tag: http, tcp or udp
    pub protocol: String,

    /// Last time an edge node reported the tunnel
    pub last_seen_at: Option<ChronoDateTime>,

    pub created_at: ChronoDateTime,

    pub updated_at: ChronoDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
