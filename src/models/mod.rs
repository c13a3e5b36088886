pub mod _entities;
pub mod incident;
pub mod market_price;

pub use incident::{Incident, IncidentStatus};
pub use market_price::{MarketPriceRecord, PriceChangeHistory};
