use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Incidents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Incidents::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()".to_string()),
                    )
                    .col(ColumnDef::new(Incidents::TenantId).string().not_null())
                    .col(ColumnDef::new(Incidents::TraceId).string())
                    .col(ColumnDef::new(Incidents::Fingerprint).string().not_null())
                    .col(ColumnDef::new(Incidents::DedupeKey).string().not_null())
                    .col(ColumnDef::new(Incidents::Severity).string().not_null())
                    .col(ColumnDef::new(Incidents::Category).string().not_null())
                    .col(ColumnDef::new(Incidents::PrimaryFlag).string().not_null())
                    .col(ColumnDef::new(Incidents::PreviousPrimaryFlag).string())
                    .col(ColumnDef::new(Incidents::SecondaryFlags).json().not_null())
                    .col(ColumnDef::new(Incidents::AllFlags).json().not_null())
                    .col(ColumnDef::new(Incidents::Action).json().not_null())
                    .col(ColumnDef::new(Incidents::ActionHint).text())
                    .col(ColumnDef::new(Incidents::Status).string().not_null())
                    .col(ColumnDef::new(Incidents::ResolutionReason).string())
                    .col(ColumnDef::new(Incidents::RoutedPayload).json())
                    .col(ColumnDef::new(Incidents::Feedback).json())
                    .col(
                        ColumnDef::new(Incidents::OccurrenceCount)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Incidents::FirstSeenAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Incidents::LastSeenAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Incidents::RetryAttemptCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Incidents::RetryEligibleAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Incidents::RetryLockUntil).timestamp_with_time_zone())
                    .col(ColumnDef::new(Incidents::RetryLockBy).string())
                    .col(ColumnDef::new(Incidents::RetryExhaustedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Incidents::RetrySuccess)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Incidents::RetryLastAttemptAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Incidents::RecomputeCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Incidents::ReclassifiedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Incidents::ResolvedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Incidents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .col(
                        ColumnDef::new(Incidents::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_incidents_dedupe_key")
                    .table(Incidents::Table)
                    .col(Incidents::TenantId)
                    .col(Incidents::DedupeKey)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_incidents_status")
                    .table(Incidents::Table)
                    .col(Incidents::TenantId)
                    .col(Incidents::Status)
                    .to_owned(),
            )
            .await?;

        // Drives C11's claim query: PENDING_RETRY rows ordered by eligibility.
        manager
            .create_index(
                Index::create()
                    .name("idx_incidents_retry_eligible")
                    .table(Incidents::Table)
                    .col(Incidents::Status)
                    .col(Incidents::RetryEligibleAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Incidents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Incidents {
    Table,
    Id,
    TenantId,
    TraceId,
    Fingerprint,
    DedupeKey,
    Severity,
    Category,
    PrimaryFlag,
    PreviousPrimaryFlag,
    SecondaryFlags,
    AllFlags,
    Action,
    ActionHint,
    Status,
    ResolutionReason,
    RoutedPayload,
    Feedback,
    OccurrenceCount,
    FirstSeenAt,
    LastSeenAt,
    RetryAttemptCount,
    RetryEligibleAt,
    RetryLockUntil,
    RetryLockBy,
    RetryExhaustedAt,
    RetrySuccess,
    RetryLastAttemptAt,
    RecomputeCount,
    ReclassifiedAt,
    ResolvedAt,
    CreatedAt,
    UpdatedAt,
}
