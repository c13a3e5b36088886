use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MarketPrices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MarketPrices::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()".to_string()),
                    )
                    .col(ColumnDef::new(MarketPrices::PriceType).string().not_null())
                    .col(ColumnDef::new(MarketPrices::Period).string().not_null())
                    .col(ColumnDef::new(MarketPrices::Value).decimal().not_null())
                    .col(ColumnDef::new(MarketPrices::Status).string().not_null())
                    .col(ColumnDef::new(MarketPrices::Source).string().not_null())
                    .col(ColumnDef::new(MarketPrices::ChangeReason).text())
                    .col(ColumnDef::new(MarketPrices::UpdatedBy).string().not_null())
                    .col(
                        ColumnDef::new(MarketPrices::IsLocked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(MarketPrices::CapturedAt).timestamp_with_time_zone().not_null())
                    .col(
                        ColumnDef::new(MarketPrices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .col(
                        ColumnDef::new(MarketPrices::UpdatedAt)
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
                    .name("idx_market_prices_type_period")
                    .table(MarketPrices::Table)
                    .col(MarketPrices::PriceType)
                    .col(MarketPrices::Period)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_market_prices_status")
                    .table(MarketPrices::Table)
                    .col(MarketPrices::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MarketPrices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MarketPrices {
    Table,
    Id,
    PriceType,
    Period,
    Value,
    Status,
    Source,
    ChangeReason,
    UpdatedBy,
    IsLocked,
    CapturedAt,
    CreatedAt,
    UpdatedAt,
}
