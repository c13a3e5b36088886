pub mod incidents;
pub mod market_prices;
pub mod price_change_history;

pub mod prelude {
    pub use super::incidents::Entity as Incidents;
    pub use super::market_prices::Entity as MarketPrices;
    pub use super::price_change_history::Entity as PriceChangeHistory;
}
