//! Migration to create tunnels table
//!
//! Mirrors the dashboard's schema for local development and tests. The
//! control plane never runs it against the dashboard's database.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Tunnels::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Tunnels::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Tunnels::UserId).string().not_null())
                    .col(ColumnDef::new(Tunnels::OrganizationId).string())
                    .col(ColumnDef::new(Tunnels::Name).string())
                    .col(ColumnDef::new(Tunnels::Url).string().not_null())
                    .col(
                        ColumnDef::new(Tunnels::Protocol)
                            .string_len(16)
                            .not_null()
                            .default("http"),
                    )
                    .col(ColumnDef::new(Tunnels::LastSeenAt).timestamp())
                    .col(
                        ColumnDef::new(Tunnels::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tunnels::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_tunnels_user_id")
                    .table(Tunnels::Table)
                    .col(Tunnels::UserId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Tunnels::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Tunnels {
    Table,
    Id,
    UserId,
    OrganizationId,
    Name,
    Url,
    Protocol,
    LastSeenAt,
    CreatedAt,
    UpdatedAt,
}
