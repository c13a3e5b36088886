//! C7 — the market-price admin store. Upsert is the one state machine
//! that matters here; everything else (get/list/history) is a read path
//! over the same table. Audit-history writes are always best-effort: a
//! failure there is logged and never propagated.

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::_entities::{market_prices, price_change_history};
use crate::models::market_price::{MarketPriceRecord, PriceChangeHistory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceErrorCode {
    ChangeReasonRequired,
    PeriodLocked,
    FinalRecordProtected,
    StatusDowngradeForbidden,
    PeriodNotFound,
    FuturePeriod,
    DbConflict,
    DbWriteFailed,
}

#[derive(Debug, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct ServiceError {
    pub code: ServiceErrorCode,
    pub message: String,
}

impl ServiceError {
    fn new(code: ServiceErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub struct UpsertInput {
    pub price_type: String,
    pub period: String,
    pub value: Decimal,
    pub status: String,
    pub source: String,
    pub change_reason: Option<String>,
    pub updated_by: String,
    pub force_update: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertResult {
    pub created: bool,
    pub changed: bool,
    pub record: MarketPriceRecord,
}

/// Returned by `get_for_calculation`: callers that drive billing math off
/// a provisional price need to know, so they can flag the derived result.
#[derive(Debug, Clone, Serialize)]
pub struct CalculationLookup {
    pub record: MarketPriceRecord,
    pub is_provisional: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Period,
    UpdatedAt,
    PriceType,
}

impl SortBy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "period" => Some(Self::Period),
            "updated_at" => Some(Self::UpdatedAt),
            "price_type" => Some(Self::PriceType),
            _ => None,
        }
    }
}

pub struct ListPricesQuery {
    pub price_type: Option<String>,
    pub status: Option<String>,
    pub from_period: Option<String>,
    pub to_period: Option<String>,
    pub sort_by: SortBy,
    pub descending: bool,
    pub page: u64,
    pub page_size: u64,
}

impl Default for ListPricesQuery {
    fn default() -> Self {
        Self {
            price_type: None,
            status: None,
            from_period: None,
            to_period: None,
            sort_by: SortBy::Period,
            descending: true,
            page: 0,
            page_size: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListPricesResult {
    pub records: Vec<MarketPriceRecord>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkUpsertOutcome {
    pub index: usize,
    pub price_type: String,
    pub period: String,
    pub outcome: BulkRowOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BulkRowOutcome {
    Applied { created: bool, changed: bool },
    Failed { code: ServiceErrorCode, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkUpsertResult {
    pub applied: u64,
    pub failed: u64,
    pub rows: Vec<BulkUpsertOutcome>,
}

/// Shared by the plain read path and the locking read inside `upsert_price`'s
/// transaction. `locked` issues `SELECT ... FOR UPDATE` so a concurrent
/// upsert under the same `(price_type, period)` key blocks instead of
/// racing on a stale read.
async fn load_existing<Conn: ConnectionTrait>(
    conn: &Conn,
    price_type: &str,
    period: &str,
    locked: bool,
) -> Result<Option<market_prices::Model>, ServiceError> {
    let mut select = market_prices::Entity::find()
        .filter(market_prices::Column::PriceType.eq(price_type))
        .filter(market_prices::Column::Period.eq(period));
    if locked {
        select = select.lock_exclusive();
    }
    select
        .one(conn)
        .await
        .map_err(|e| ServiceError::new(ServiceErrorCode::DbWriteFailed, e.to_string()))
}

/// Generic over the connection so a caller that already holds an open
/// transaction (the bulk importer's strict-mode apply) can drive the same
/// upsert logic on it instead of having each row open its own.
pub struct MarketPriceAdminService<'a, C: ConnectionTrait + TransactionTrait = DatabaseConnection> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait + TransactionTrait> MarketPriceAdminService<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    async fn find_existing(
        &self,
        price_type: &str,
        period: &str,
    ) -> Result<Option<market_prices::Model>, ServiceError> {
        load_existing(self.db, price_type, period, false).await
    }

    /// Best-effort audit write. Logged on failure, never raised — the
    /// caller's commit already happened and must not be undone because
    /// the audit trail hiccuped.
    async fn write_history<Conn: ConnectionTrait>(
        conn: &Conn,
        action: &str,
        old: Option<&market_prices::Model>,
        new: &market_prices::Model,
        change_reason: Option<String>,
    ) {
        let row = price_change_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            price_type: Set(new.price_type.clone()),
            period: Set(new.period.clone()),
            action: Set(action.to_string()),
            old_value: Set(old.map(|o| o.value)),
            new_value: Set(new.value),
            old_status: Set(old.map(|o| o.status.clone())),
            new_status: Set(new.status.clone()),
            change_reason: Set(change_reason),
            updated_by: Set(new.updated_by.clone()),
            source: Set(new.source.clone()),
            created_at: Set(chrono::Utc::now()),
        };
        if let Err(e) = row.insert(conn).await {
            tracing::warn!(
                price_type = %new.price_type,
                period = %new.period,
                error = %e,
                "failed to write price change history row"
            );
        }
    }

    /// The read-modify-write this upsert performs has to serialize under
    /// the `(price_type, period)` key, or two concurrent callers can both
    /// read the same `existing` row and clobber each other. A transaction
    /// with a locking read closes that window: the second caller's
    /// `SELECT ... FOR UPDATE` blocks until the first commits, then sees
    /// its write.
    pub async fn upsert_price(&self, input: UpsertInput) -> Result<UpsertResult, ServiceError> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| ServiceError::new(ServiceErrorCode::DbWriteFailed, e.to_string()))?;

        let existing = load_existing(&txn, &input.price_type, &input.period, true).await?;
        let result = match existing {
            None => Self::handle_insert(&txn, input).await,
            Some(existing) => Self::handle_update(&txn, existing, input).await,
        };

        match result {
            Ok(outcome) => {
                txn.commit()
                    .await
                    .map_err(|e| ServiceError::new(ServiceErrorCode::DbWriteFailed, e.to_string()))?;
                Ok(outcome)
            }
            Err(e) => {
                let _ = txn.rollback().await;
                Err(e)
            }
        }
    }

    async fn handle_insert<Conn: ConnectionTrait>(
        conn: &Conn,
        input: UpsertInput,
    ) -> Result<UpsertResult, ServiceError> {
        let now = chrono::Utc::now();
        let active = market_prices::ActiveModel {
            id: Set(Uuid::new_v4()),
            price_type: Set(input.price_type),
            period: Set(input.period),
            value: Set(input.value),
            status: Set(input.status),
            source: Set(input.source),
            change_reason: Set(input.change_reason.clone()),
            updated_by: Set(input.updated_by),
            is_locked: Set(false),
            captured_at: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let inserted = active.insert(conn).await.map_err(|e| {
            ServiceError::new(ServiceErrorCode::DbWriteFailed, e.to_string())
        })?;
        Self::write_history(conn, "INSERT", None, &inserted, input.change_reason).await;
        Ok(UpsertResult {
            created: true,
            changed: true,
            record: inserted.into(),
        })
    }

    async fn handle_update<Conn: ConnectionTrait>(
        conn: &Conn,
        existing: market_prices::Model,
        input: UpsertInput,
    ) -> Result<UpsertResult, ServiceError> {
        if existing.is_locked {
            return Err(ServiceError::new(
                ServiceErrorCode::PeriodLocked,
                format!("{} {} is locked", existing.price_type, existing.period),
            ));
        }

        let old_status = existing.status.clone();
        let old_value = existing.value;

        if old_status == "final" && input.status == "provisional" {
            return Err(ServiceError::new(
                ServiceErrorCode::StatusDowngradeForbidden,
                "final records cannot revert to provisional",
            ));
        }

        if old_status == "final" && input.status == "final" && old_value != input.value && !input.force_update {
            return Err(ServiceError::new(
                ServiceErrorCode::FinalRecordProtected,
                "changing a final record's value requires force_update",
            ));
        }

        if old_value == input.value && old_status == input.status {
            return Ok(UpsertResult {
                created: false,
                changed: false,
                record: existing.into(),
            });
        }

        if input.change_reason.as_deref().unwrap_or("").trim().is_empty() {
            return Err(ServiceError::new(
                ServiceErrorCode::ChangeReasonRequired,
                "change_reason is required for this update",
            ));
        }

        let mut active: market_prices::ActiveModel = existing.clone().into();
        active.value = Set(input.value);
        active.status = Set(input.status.clone());
        active.source = Set(input.source);
        active.change_reason = Set(input.change_reason.clone());
        active.updated_by = Set(input.updated_by);
        active.updated_at = Set(chrono::Utc::now());

        let updated = active.update(conn).await.map_err(|e| {
            ServiceError::new(ServiceErrorCode::DbWriteFailed, e.to_string())
        })?;
        Self::write_history(conn, "UPDATE", Some(&existing), &updated, input.change_reason).await;

        Ok(UpsertResult {
            created: false,
            changed: true,
            record: updated.into(),
        })
    }

    pub async fn set_locked(
        &self,
        price_type: &str,
        period: &str,
        locked: bool,
    ) -> Result<MarketPriceRecord, ServiceError> {
        let existing = self
            .find_existing(price_type, period)
            .await?
            .ok_or_else(|| ServiceError::new(ServiceErrorCode::PeriodNotFound, "no such record"))?;
        let mut active: market_prices::ActiveModel = existing.into();
        active.is_locked = Set(locked);
        active.updated_at = Set(chrono::Utc::now());
        let updated = active
            .update(self.db)
            .await
            .map_err(|e| ServiceError::new(ServiceErrorCode::DbWriteFailed, e.to_string()))?;
        Ok(updated.into())
    }

    pub async fn get_by_key(
        &self,
        price_type: &str,
        period: &str,
    ) -> Result<Option<MarketPriceRecord>, ServiceError> {
        Ok(self
            .find_existing(price_type, period)
            .await?
            .map(MarketPriceRecord::from))
    }

    /// `None` means "no such record" (controller maps this to 404);
    /// `Some(vec![])` means the record exists with no history yet.
    pub async fn get_history(
        &self,
        price_type: &str,
        period: &str,
    ) -> Result<Option<Vec<PriceChangeHistory>>, ServiceError> {
        if self.find_existing(price_type, period).await?.is_none() {
            return Ok(None);
        }
        let rows = price_change_history::Entity::find()
            .filter(price_change_history::Column::PriceType.eq(price_type))
            .filter(price_change_history::Column::Period.eq(period))
            .order_by(price_change_history::Column::CreatedAt, Order::Desc)
            .all(self.db)
            .await
            .map_err(|e| ServiceError::new(ServiceErrorCode::DbWriteFailed, e.to_string()))?;
        Ok(Some(rows.into_iter().map(PriceChangeHistory::from).collect()))
    }

    /// Billing math never blocks on a missing final price: a provisional
    /// record is returned with `is_provisional = true` so the caller can
    /// flag the derived figure as subject to later recompute.
    pub async fn get_for_calculation(
        &self,
        price_type: &str,
        period: &str,
    ) -> Result<CalculationLookup, ServiceError> {
        let existing = self
            .find_existing(price_type, period)
            .await?
            .ok_or_else(|| {
                ServiceError::new(
                    ServiceErrorCode::PeriodNotFound,
                    format!("no price for {price_type} {period}"),
                )
            })?;
        let is_provisional = existing.status != "final";
        Ok(CalculationLookup {
            record: existing.into(),
            is_provisional,
        })
    }

    pub async fn list_prices(
        &self,
        query: ListPricesQuery,
    ) -> Result<ListPricesResult, ServiceError> {
        let mut select = market_prices::Entity::find();
        if let Some(price_type) = &query.price_type {
            select = select.filter(market_prices::Column::PriceType.eq(price_type.as_str()));
        }
        if let Some(status) = &query.status {
            select = select.filter(market_prices::Column::Status.eq(status.as_str()));
        }
        if let Some(from_period) = &query.from_period {
            select = select.filter(market_prices::Column::Period.gte(from_period.as_str()));
        }
        if let Some(to_period) = &query.to_period {
            select = select.filter(market_prices::Column::Period.lte(to_period.as_str()));
        }

        let order = if query.descending { Order::Desc } else { Order::Asc };
        let select = match query.sort_by {
            SortBy::Period => select.order_by(market_prices::Column::Period, order),
            SortBy::UpdatedAt => select.order_by(market_prices::Column::UpdatedAt, order),
            SortBy::PriceType => select.order_by(market_prices::Column::PriceType, order),
        };

        let paginator = select.paginate(self.db, query.page_size.max(1));
        let total = paginator
            .num_items()
            .await
            .map_err(|e| ServiceError::new(ServiceErrorCode::DbWriteFailed, e.to_string()))?;
        let page_rows = paginator
            .fetch_page(query.page)
            .await
            .map_err(|e| ServiceError::new(ServiceErrorCode::DbWriteFailed, e.to_string()))?;

        Ok(ListPricesResult {
            records: page_rows.into_iter().map(MarketPriceRecord::from).collect(),
            total,
            page: query.page,
            page_size: query.page_size,
        })
    }

    /// `atomic = true`: the whole batch fails (no writes) on the first row
    /// error. `atomic = false`: every row is attempted independently and
    /// the per-row outcome is reported back, matching the bulk importer's
    /// apply-phase semantics (C8).
    pub async fn bulk_upsert(
        &self,
        inputs: Vec<UpsertInput>,
        atomic: bool,
    ) -> Result<BulkUpsertResult, ServiceError> {
        let mut rows = Vec::with_capacity(inputs.len());
        let mut applied = 0u64;
        let mut failed = 0u64;

        for (index, input) in inputs.into_iter().enumerate() {
            let price_type = input.price_type.clone();
            let period = input.period.clone();
            match self.upsert_price(input).await {
                Ok(result) => {
                    applied += 1;
                    rows.push(BulkUpsertOutcome {
                        index,
                        price_type,
                        period,
                        outcome: BulkRowOutcome::Applied {
                            created: result.created,
                            changed: result.changed,
                        },
                    });
                }
                Err(e) => {
                    failed += 1;
                    let code = e.code;
                    let message = e.message.clone();
                    rows.push(BulkUpsertOutcome {
                        index,
                        price_type,
                        period,
                        outcome: BulkRowOutcome::Failed { code, message },
                    });
                    if atomic {
                        return Err(e);
                    }
                }
            }
        }

        Ok(BulkUpsertResult { applied, failed, rows })
    }
}
