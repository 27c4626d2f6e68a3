use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OutboxEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OutboxEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OutboxEvents::TenantId).uuid())
                    .col(
                        ColumnDef::new(OutboxEvents::RegionOrigin)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::AggregateType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::AggregateId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OutboxEvents::EventType).string().not_null())
                    .col(
                        ColumnDef::new(OutboxEvents::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::Status)
                            .string_len(16)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(
                        ColumnDef::new(OutboxEvents::Retries)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(OutboxEvents::LockedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(OutboxEvents::LockedBy).string())
                    .col(
                        ColumnDef::new(OutboxEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OutboxEvents::SentAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Candidate selection and the claim predicate both filter on (status, locked_at).
        manager
            .create_index(
                Index::create()
                    .table(OutboxEvents::Table)
                    .col(OutboxEvents::Status)
                    .col(OutboxEvents::LockedAt)
                    .name("idx_outbox_events_status_locked_at")
                    .to_owned(),
            )
            .await?;

        // Oldest-first ordering of pending rows.
        manager
            .create_index(
                Index::create()
                    .table(OutboxEvents::Table)
                    .col(OutboxEvents::Status)
                    .col(OutboxEvents::CreatedAt)
                    .name("idx_outbox_events_status_created_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OutboxEvents::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum OutboxEvents {
    Table,
    Id,
    TenantId,
    RegionOrigin,
    AggregateType,
    AggregateId,
    EventType,
    Payload,
    Status,
    Retries,
    LockedAt,
    LockedBy,
    CreatedAt,
    SentAt,
}
