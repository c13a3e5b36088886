use loco_rs::prelude::*;
use rust_decimal::Decimal;
use sea_orm::*;
use serde_json::json;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::_entities::{incidents, market_prices, price_change_history};
use crate::services::market_price_validator::current_period;

pub struct DatabaseSeeder;

impl DatabaseSeeder {
    /// Seed the database with initial development data
    pub async fn seed_development(db: &DatabaseConnection) -> Result<()> {
        tracing::info!("Starting development database seeding...");

        let prices = Self::create_sample_market_prices(db).await?;
        tracing::info!("Created {} sample PTF market price records", prices.len());

        Self::create_sample_incidents(db).await?;
        tracing::info!("Created sample incidents");

        tracing::info!("Development database seeding completed successfully");
        Ok(())
    }

    /// A locked final record for two periods back and an open draft for
    /// the current period, so a fresh environment exercises both the
    /// locked-record and upsert-in-place paths immediately.
    async fn create_sample_market_prices(db: &DatabaseConnection) -> Result<Vec<market_prices::Model>> {
        let periods = Self::last_n_periods(3);
        let mut created = Vec::new();

        for (i, period) in periods.iter().enumerate() {
            let is_final_locked = i == 0;
            let value = Decimal::from_str("2150.75").unwrap() + Decimal::from(i as i64 * 12);
            let status = if is_final_locked { "final" } else { "provisional" };

            let record = market_prices::ActiveModel {
                id: Set(Uuid::new_v4()),
                price_type: Set("PTF".to_string()),
                period: Set(period.clone()),
                value: Set(value),
                status: Set(status.to_string()),
                source: Set("seed".to_string()),
                change_reason: Set(None),
                updated_by: Set("seed-script".to_string()),
                is_locked: Set(is_final_locked),
                captured_at: Set(chrono::Utc::now()),
                created_at: Set(chrono::Utc::now()),
                updated_at: Set(chrono::Utc::now()),
            };
            let inserted = record.insert(db).await?;

            let history = price_change_history::ActiveModel {
                id: Set(Uuid::new_v4()),
                price_type: Set("PTF".to_string()),
                period: Set(period.clone()),
                action: Set("INSERT".to_string()),
                old_value: Set(None),
                new_value: Set(value),
                old_status: Set(None),
                new_status: Set(status.to_string()),
                change_reason: Set(None),
                updated_by: Set("seed-script".to_string()),
                source: Set("seed".to_string()),
                created_at: Set(chrono::Utc::now()),
            };
            history.insert(db).await?;

            created.push(inserted);
        }

        Ok(created)
    }

    /// One OPEN S1 incident and one RESOLVED S2 incident so the admin
    /// surface and the metrics reporter both have non-empty data to show
    /// against on a first run.
    async fn create_sample_incidents(db: &DatabaseConnection) -> Result<()> {
        let now = chrono::Utc::now();

        let open_incident = incidents::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set("default".to_string()),
            trace_id: Set(Some("seed-trace-001".to_string())),
            fingerprint: Set("seedfingerprint0001".to_string()),
            dedupe_key: Set(Uuid::new_v4().to_string()),
            severity: Set("S1".to_string()),
            category: Set("PRICE_MISSING".to_string()),
            primary_flag: Set("MARKET_PRICE_MISSING".to_string()),
            previous_primary_flag: Set(None),
            secondary_flags: Set(json!([])),
            all_flags: Set(json!(["MARKET_PRICE_MISSING"])),
            action: Set(json!({
                "type": "BUG_REPORT",
                "owner": "platform-eng",
                "code": "MARKET_PRICE_MISSING",
                "hint_text": "PTF market price missing for the invoiced period",
            })),
            action_hint: Set(Some("PTF market price missing for the invoiced period".to_string())),
            status: Set("OPEN".to_string()),
            resolution_reason: Set(None),
            routed_payload: Set(Some(json!({"flag_details": [{"code": "MARKET_PRICE_MISSING"}]}))),
            feedback: Set(None),
            occurrence_count: Set(1),
            first_seen_at: Set(now),
            last_seen_at: Set(now),
            retry_attempt_count: Set(0),
            retry_eligible_at: Set(None),
            retry_lock_until: Set(None),
            retry_lock_by: Set(None),
            retry_exhausted_at: Set(None),
            retry_success: Set(false),
            retry_last_attempt_at: Set(None),
            recompute_count: Set(0),
            reclassified_at: Set(None),
            resolved_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        open_incident.insert(db).await?;

        let resolved_incident = incidents::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set("default".to_string()),
            trace_id: Set(Some("seed-trace-002".to_string())),
            fingerprint: Set("seedfingerprint0002".to_string()),
            dedupe_key: Set(Uuid::new_v4().to_string()),
            severity: Set("S2".to_string()),
            category: Set("MISMATCH".to_string()),
            primary_flag: Set("INVOICE_TOTAL_MISMATCH".to_string()),
            previous_primary_flag: Set(None),
            secondary_flags: Set(json!([])),
            all_flags: Set(json!(["INVOICE_TOTAL_MISMATCH"])),
            action: Set(json!({
                "type": "RETRY_LOOKUP",
                "owner": "qa-ops",
                "code": "INVOICE_TOTAL_MISMATCH",
                "hint_text": "invoice total diverges from recomputed total",
            })),
            action_hint: Set(Some("invoice total diverges from recomputed total".to_string())),
            status: Set("RESOLVED".to_string()),
            resolution_reason: Set(Some("recompute_resolved".to_string())),
            routed_payload: Set(Some(json!({"flag_details": [{"code": "INVOICE_TOTAL_MISMATCH", "ratio": 0.018}]}))),
            feedback: Set(None),
            occurrence_count: Set(1),
            first_seen_at: Set(now - chrono::Duration::hours(6)),
            last_seen_at: Set(now - chrono::Duration::hours(5)),
            retry_attempt_count: Set(1),
            retry_eligible_at: Set(None),
            retry_lock_until: Set(None),
            retry_lock_by: Set(None),
            retry_exhausted_at: Set(None),
            retry_success: Set(true),
            retry_last_attempt_at: Set(Some(now - chrono::Duration::hours(5))),
            recompute_count: Set(1),
            reclassified_at: Set(None),
            resolved_at: Set(Some(now - chrono::Duration::hours(5))),
            created_at: Set(now - chrono::Duration::hours(6)),
            updated_at: Set(now - chrono::Duration::hours(5)),
        };
        resolved_incident.insert(db).await?;

        Ok(())
    }

    fn last_n_periods(n: i32) -> Vec<String> {
        let current = current_period();
        let mut parts = current.split('-');
        let year: i32 = parts.next().unwrap_or("2026").parse().unwrap_or(2026);
        let month: i32 = parts.next().unwrap_or("01").parse().unwrap_or(1);

        (0..n)
            .rev()
            .map(|back| {
                let total = (year * 12 + (month - 1)) - back;
                let y = total.div_euclid(12);
                let m = total.rem_euclid(12) + 1;
                format!("{y:04}-{m:02}")
            })
            .collect()
    }

    /// Check if the database has already been seeded.
    pub async fn is_seeded(db: &DatabaseConnection) -> Result<bool> {
        let count = market_prices::Entity::find().count(db).await?;
        Ok(count > 0)
    }

    /// Clear all seeded data (for testing).
    pub async fn clear_all(db: &DatabaseConnection) -> Result<()> {
        tracing::warn!("Clearing all database data...");

        incidents::Entity::delete_many().exec(db).await?;
        price_change_history::Entity::delete_many().exec(db).await?;
        market_prices::Entity::delete_many().exec(db).await?;

        tracing::info!("All database data cleared");
        Ok(())
    }
}
