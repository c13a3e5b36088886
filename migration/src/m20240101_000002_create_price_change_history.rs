use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PriceChangeHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PriceChangeHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()".to_string()),
                    )
                    .col(ColumnDef::new(PriceChangeHistory::PriceType).string().not_null())
                    .col(ColumnDef::new(PriceChangeHistory::Period).string().not_null())
                    .col(ColumnDef::new(PriceChangeHistory::Action).string().not_null())
                    .col(ColumnDef::new(PriceChangeHistory::OldValue).decimal())
                    .col(ColumnDef::new(PriceChangeHistory::NewValue).decimal().not_null())
                    .col(ColumnDef::new(PriceChangeHistory::OldStatus).string())
                    .col(ColumnDef::new(PriceChangeHistory::NewStatus).string().not_null())
                    .col(ColumnDef::new(PriceChangeHistory::ChangeReason).text())
                    .col(ColumnDef::new(PriceChangeHistory::UpdatedBy).string().not_null())
                    .col(ColumnDef::new(PriceChangeHistory::Source).string().not_null())
                    .col(
                        ColumnDef::new(PriceChangeHistory::CreatedAt)
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
                    .name("idx_price_change_history_type_period")
                    .table(PriceChangeHistory::Table)
                    .col(PriceChangeHistory::PriceType)
                    .col(PriceChangeHistory::Period)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PriceChangeHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PriceChangeHistory {
    Table,
    Id,
    PriceType,
    Period,
    Action,
    OldValue,
    NewValue,
    OldStatus,
    NewStatus,
    ChangeReason,
    UpdatedBy,
    Source,
    CreatedAt,
}
