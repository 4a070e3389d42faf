//! Database migrations
//!
//! Tunnel records and analytics usually live in different databases, so each
//! gets its own migrator and its own bookkeeping table.

use sea_orm_migration::prelude::*;

mod m20260301_000001_create_tunnels;
mod m20260301_000002_create_active_tunnel_snapshots;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m20260301_000001_create_tunnels::Migration)]
    }
}

pub struct AnalyticsMigrator;

#[async_trait::async_trait]
impl MigratorTrait for AnalyticsMigrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(
            m20260301_000002_create_active_tunnel_snapshots::Migration,
        )]
    }

    fn migration_table_name() -> DynIden {
        Alias::new("seaql_analytics_migrations").into_iden()
    }
}
