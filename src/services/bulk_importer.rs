//! C8 — CSV/JSON bulk import over the market-price admin store (C7). Parsing
//! never raises on a single bad row; every row carries its own validation
//! result so preview/apply can report per-row outcomes.

use sea_orm::{ConnectionTrait, TransactionTrait};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::services::market_price_admin_service::{
    MarketPriceAdminService, ServiceError, ServiceErrorCode, UpsertInput,
};
use crate::services::market_price_validator::{
    validate_entry, ErrorCode, NormalizedMarketPriceInput, RawMarketPriceInput, ValidationResult,
};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("{0}")]
    Empty(String),
    #[error("csv parse error: {0}")]
    Csv(String),
    #[error("json parse error: {0}")]
    Json(String),
    #[error("missing required column '{0}'")]
    MissingColumn(String),
}

#[derive(Debug, Clone)]
pub struct ImportRow {
    pub row_number: usize,
    pub period: String,
    pub value_raw: String,
    pub status: String,
    pub validation: ValidationResult,
    pub normalized: Option<NormalizedMarketPriceInput>,
}

fn validate_row(period: &str, value_raw: &str, status: &str) -> (ValidationResult, Option<NormalizedMarketPriceInput>) {
    validate_entry(RawMarketPriceInput {
        period,
        value: value_raw,
        status,
        price_type: "",
    })
}

fn make_row(row_number: usize, period: String, value_raw: String, status: String) -> ImportRow {
    let (validation, normalized) = validate_row(&period, &value_raw, &status);
    ImportRow {
        row_number,
        period,
        value_raw,
        status,
        validation,
        normalized,
    }
}

/// header name -> canonical slot, case-insensitive; `value`/`ptf_value` are
/// synonyms for the same column.
fn canonical_header(raw: &str) -> Option<&'static str> {
    match raw.trim().to_lowercase().as_str() {
        "period" => Some("period"),
        "value" | "ptf_value" => Some("value"),
        "status" => Some("status"),
        _ => None,
    }
}

pub fn parse_csv(content: &str) -> Result<Vec<ImportRow>, ParseError> {
    if content.trim().is_empty() {
        return Err(ParseError::Empty("csv content is empty".to_string()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.trim().as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ParseError::Csv(e.to_string()))?
        .clone();

    let mut period_idx = None;
    let mut value_idx = None;
    let mut status_idx = None;
    for (idx, header) in headers.iter().enumerate() {
        match canonical_header(header) {
            Some("period") => period_idx = Some(idx),
            Some("value") => value_idx = Some(idx),
            Some("status") => status_idx = Some(idx),
            _ => {}
        }
    }
    let period_idx = period_idx.ok_or_else(|| ParseError::MissingColumn("period".to_string()))?;
    let value_idx = value_idx.ok_or_else(|| ParseError::MissingColumn("value".to_string()))?;
    let status_idx = status_idx.ok_or_else(|| ParseError::MissingColumn("status".to_string()))?;

    let mut rows = Vec::new();
    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| ParseError::Csv(e.to_string()))?;
        let period = record.get(period_idx).unwrap_or("").trim().to_string();
        let value_raw = record.get(value_idx).unwrap_or("").trim().to_string();
        let status = record.get(status_idx).unwrap_or("").trim().to_string();
        rows.push(make_row(row_idx + 1, period, value_raw, status));
    }
    if rows.is_empty() {
        return Err(ParseError::Empty("csv contains no data rows".to_string()));
    }
    Ok(rows)
}

/// A non-object array element produces a per-row parse-error entry instead
/// of aborting the whole parse.
pub fn parse_json(content: &str) -> Result<Vec<ImportRow>, ParseError> {
    if content.trim().is_empty() {
        return Err(ParseError::Empty("json content is empty".to_string()));
    }
    let data: JsonValue =
        serde_json::from_str(content.trim()).map_err(|e| ParseError::Json(e.to_string()))?;
    let items = data
        .as_array()
        .ok_or_else(|| ParseError::Json("expected a JSON array".to_string()))?;
    if items.is_empty() {
        return Err(ParseError::Empty("json array is empty".to_string()));
    }

    let mut rows = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let row_number = idx + 1;
        let Some(obj) = item.as_object() else {
            let mut validation = ValidationResult::default();
            validation.errors.push(crate::services::market_price_validator::ValidationError {
                field: "row".to_string(),
                code: ErrorCode::InvalidDecimalFormat,
                message: "row must be a JSON object".to_string(),
            });
            rows.push(ImportRow {
                row_number,
                period: String::new(),
                value_raw: String::new(),
                status: String::new(),
                validation,
                normalized: None,
            });
            continue;
        };
        let period = obj.get("period").and_then(JsonValue::as_str).unwrap_or("").trim().to_string();
        let value_raw = match obj.get("value").or_else(|| obj.get("ptf_value")) {
            Some(JsonValue::String(s)) => s.trim().to_string(),
            Some(JsonValue::Number(n)) => n.to_string(),
            Some(_) | None => String::new(),
        };
        let status = obj.get("status").and_then(JsonValue::as_str).unwrap_or("").trim().to_string();
        rows.push(make_row(row_number, period, value_raw, status));
    }
    Ok(rows)
}

#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub row: usize,
    pub field: String,
    pub error_code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub new_records: usize,
    pub updates: usize,
    pub unchanged: usize,
    pub final_conflicts: usize,
    pub errors: Vec<RowError>,
}

impl<'a, C: ConnectionTrait + TransactionTrait> MarketPriceAdminService<'a, C> {
    /// Read-only projection: counts what `apply` would do without writing
    /// anything. Runs under the wrapper stack's read path.
    pub async fn preview_bulk_import(
        &self,
        rows: &[ImportRow],
        price_type: &str,
        force_update: bool,
    ) -> Result<ImportPreview, ServiceError> {
        let mut preview = ImportPreview {
            total_rows: rows.len(),
            valid_rows: 0,
            invalid_rows: 0,
            new_records: 0,
            updates: 0,
            unchanged: 0,
            final_conflicts: 0,
            errors: Vec::new(),
        };

        for row in rows {
            if !row.validation.is_valid() {
                preview.invalid_rows += 1;
                for err in &row.validation.errors {
                    preview.errors.push(RowError {
                        row: row.row_number,
                        field: err.field.clone(),
                        error_code: format!("{:?}", err.code),
                        message: err.message.clone(),
                    });
                }
                continue;
            }
            preview.valid_rows += 1;
            let normalized = row.normalized.as_ref().expect("valid row carries a normalized input");

            let Some(existing) = self.get_by_key(price_type, &normalized.period).await? else {
                preview.new_records += 1;
                continue;
            };

            if existing.is_locked {
                preview.final_conflicts += 1;
                preview.errors.push(RowError {
                    row: row.row_number,
                    field: "period".to_string(),
                    error_code: "PERIOD_LOCKED".to_string(),
                    message: format!("{price_type} {} is locked", normalized.period),
                });
                continue;
            }
            if existing.status == "final" && !force_update {
                if normalized.status == "provisional" {
                    preview.final_conflicts += 1;
                    preview.errors.push(RowError {
                        row: row.row_number,
                        field: "status".to_string(),
                        error_code: "STATUS_DOWNGRADE_FORBIDDEN".to_string(),
                        message: "final records cannot revert to provisional".to_string(),
                    });
                    continue;
                }
                if existing.value != normalized.value {
                    preview.final_conflicts += 1;
                    preview.errors.push(RowError {
                        row: row.row_number,
                        field: "value".to_string(),
                        error_code: "FINAL_RECORD_PROTECTED".to_string(),
                        message: "changing a final record's value requires force_update".to_string(),
                    });
                    continue;
                }
            }

            if existing.value == normalized.value && existing.status == normalized.status {
                preview.unchanged += 1;
            } else {
                preview.updates += 1;
            }
        }

        Ok(preview)
    }

    /// `strict_mode=true`: any invalid row or rejected upsert rolls the
    /// whole batch back (`accepted=0`, every row reported rejected).
    /// `strict_mode=false`: row-level accept/reject.
    pub async fn apply_bulk_import(
        &self,
        rows: Vec<ImportRow>,
        updated_by: &str,
        price_type: &str,
        force_update: bool,
        strict_mode: bool,
        source: &str,
        change_reason: Option<&str>,
    ) -> Result<ImportResult, ServiceError> {
        let total = rows.len();
        let mut rejected_rows = Vec::new();
        let mut valid_rows = Vec::new();

        for row in rows {
            if !row.validation.is_valid() {
                for err in &row.validation.errors {
                    rejected_rows.push(RowError {
                        row: row.row_number,
                        field: err.field.clone(),
                        error_code: format!("{:?}", err.code),
                        message: err.message.clone(),
                    });
                }
            } else {
                valid_rows.push(row);
            }
        }

        if strict_mode && !rejected_rows.is_empty() {
            return Ok(ImportResult {
                success: false,
                accepted_count: 0,
                rejected_count: total,
                rejected_rows,
            });
        }

        let upsert_inputs: Vec<(usize, UpsertInput)> = valid_rows
            .into_iter()
            .map(|row| {
                let normalized = row.normalized.expect("valid row carries a normalized input");
                let input = UpsertInput {
                    price_type: price_type.to_string(),
                    period: normalized.period,
                    value: normalized.value,
                    status: normalized.status,
                    source: source.to_string(),
                    change_reason: Some(change_reason.unwrap_or("Bulk import").to_string()),
                    updated_by: updated_by.to_string(),
                    force_update,
                };
                (row.row_number, input)
            })
            .collect();

        if strict_mode {
            // The whole apply must be all-or-nothing: a row rejected by
            // `upsert_price` (e.g. PERIOD_LOCKED) after earlier rows already
            // committed would otherwise leave the store holding partial
            // writes while reporting accepted=0. Run every row inside one
            // transaction and roll it back on the first rejection so "0
            // accepted" is actually true of the store, not just the count.
            let txn = self
                .db
                .begin()
                .await
                .map_err(|e| ServiceError {
                    code: ServiceErrorCode::DbWriteFailed,
                    message: e.to_string(),
                })?;
            let txn_service = MarketPriceAdminService::new(&txn);

            for (row_number, input) in upsert_inputs {
                if let Err(e) = txn_service.upsert_price(input).await {
                    rejected_rows.push(RowError {
                        row: row_number,
                        field: "period".to_string(),
                        error_code: format!("{:?}", e.code),
                        message: e.message,
                    });
                    break;
                }
            }

            if !rejected_rows.is_empty() {
                let _ = txn.rollback().await;
                return Ok(ImportResult {
                    success: false,
                    accepted_count: 0,
                    rejected_count: total,
                    rejected_rows,
                });
            }

            txn.commit().await.map_err(|e| ServiceError {
                code: ServiceErrorCode::DbWriteFailed,
                message: e.to_string(),
            })?;
            return Ok(ImportResult {
                success: true,
                accepted_count: total as u64,
                rejected_count: 0,
                rejected_rows,
            });
        }

        let mut accepted_count = 0u64;
        for (row_number, input) in upsert_inputs {
            match self.upsert_price(input).await {
                Ok(_) => accepted_count += 1,
                Err(e) => rejected_rows.push(RowError {
                    row: row_number,
                    field: "period".to_string(),
                    error_code: format!("{:?}", e.code),
                    message: e.message,
                }),
            }
        }

        let rejected_count = rejected_rows.len() as u64;
        Ok(ImportResult {
            success: rejected_count == 0,
            accepted_count,
            rejected_count,
            rejected_rows,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub success: bool,
    pub accepted_count: u64,
    pub rejected_count: u64,
    pub rejected_rows: Vec<RowError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_csv_recognizes_ptf_value_synonym() {
        let csv = "period,ptf_value,status\n2025-01,2894.92,provisional\n";
        let rows = parse_csv(csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].validation.is_valid());
    }

    #[test]
    fn parse_csv_rejects_decimal_comma_per_row_not_globally() {
        let csv = "period,value,status\n2025-01,\"2894,92\",provisional\n2025-02,2894.50,provisional\n";
        let rows = parse_csv(csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].validation.is_valid());
        assert!(rows[1].validation.is_valid());
    }

    #[test]
    fn parse_json_rejects_non_object_element_without_aborting() {
        let json = r#"[{"period":"2025-01","value":"2894.92","status":"provisional"}, "not-an-object"]"#;
        let rows = parse_json(json).unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].validation.is_valid());
        assert!(!rows[1].validation.is_valid());
    }

    #[test]
    fn parse_csv_missing_column_is_an_error() {
        let csv = "period,status\n2025-01,provisional\n";
        assert!(matches!(parse_csv(csv), Err(ParseError::MissingColumn(_))));
    }
}
