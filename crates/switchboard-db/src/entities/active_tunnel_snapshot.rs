//! Occupancy snapshot entity: how many tunnels were online at a given minute

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "active_tunnel_snapshots")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Sample time, truncated to the minute
    pub ts: ChronoDateTimeUtc,

    /// Presence markers counted at `ts`
    pub active_tunnels: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
