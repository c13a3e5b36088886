pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_market_prices;
mod m20240101_000002_create_price_change_history;
mod m20240101_000003_create_incidents;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_market_prices::Migration),
            Box::new(m20240101_000002_create_price_change_history::Migration),
            Box::new(m20240101_000003_create_incidents::Migration),
        ]
    }
}
