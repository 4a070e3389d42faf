//! Migration to create active_tunnel_snapshots table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ActiveTunnelSnapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ActiveTunnelSnapshots::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ActiveTunnelSnapshots::Ts)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ActiveTunnelSnapshots::ActiveTunnels)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Retention pruning and dashboards both range over ts
        manager
            .create_index(
                Index::create()
                    .name("idx_active_tunnel_snapshots_ts")
                    .table(ActiveTunnelSnapshots::Table)
                    .col(ActiveTunnelSnapshots::Ts)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ActiveTunnelSnapshots::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum ActiveTunnelSnapshots {
    Table,
    Id,
    Ts,
    ActiveTunnels,
}
