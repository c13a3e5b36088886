pub mod incidents;
pub mod market_prices;
pub mod ops;
pub mod support;
pub mod system;
