use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::_entities::{market_prices, price_change_history};

/// Service-facing view over a `market_prices` row. C7 owns every mutation;
/// this struct is the read shape handed to controllers and C12's lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPriceRecord {
    pub id: Uuid,
    pub price_type: String,
    pub period: String,
    pub value: Decimal,
    pub status: String,
    pub source: String,
    pub change_reason: Option<String>,
    pub updated_by: String,
    pub is_locked: bool,
    pub captured_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<market_prices::Model> for MarketPriceRecord {
    fn from(m: market_prices::Model) -> Self {
        Self {
            id: m.id,
            price_type: m.price_type,
            period: m.period,
            value: m.value,
            status: m.status,
            source: m.source,
            change_reason: m.change_reason,
            updated_by: m.updated_by,
            is_locked: m.is_locked,
            captured_at: m.captured_at,
            updated_at: m.updated_at,
        }
    }
}

impl MarketPriceRecord {
    pub fn is_final(&self) -> bool {
        self.status == "final"
    }
}

/// Append-only audit row. Never deleted, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceChangeHistory {
    pub id: Uuid,
    pub price_type: String,
    pub period: String,
    pub action: String,
    pub old_value: Option<Decimal>,
    pub new_value: Decimal,
    pub old_status: Option<String>,
    pub new_status: String,
    pub change_reason: Option<String>,
    pub updated_by: String,
    pub source: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<price_change_history::Model> for PriceChangeHistory {
    fn from(m: price_change_history::Model) -> Self {
        Self {
            id: m.id,
            price_type: m.price_type,
            period: m.period,
            action: m.action,
            old_value: m.old_value,
            new_value: m.new_value,
            old_status: m.old_status,
            new_status: m.new_status,
            change_reason: m.change_reason,
            updated_by: m.updated_by,
            source: m.source,
            created_at: m.created_at,
        }
    }
}
