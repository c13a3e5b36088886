//! Pure input normalization for market-price admin writes. No I/O, no
//! silent reformatting — `"2026-2"` is rejected, never promoted to
//! `"2026-02"`.

use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;

pub const MIN_VALUE: &str = "0.01";
pub const MAX_VALUE: &str = "10000";
pub const WARNING_MIN: &str = "1000";
pub const WARNING_MAX: &str = "5000";
pub const MAX_DECIMAL_PLACES: u32 = 2;

fn period_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-(0[1-9]|1[0-2])$").unwrap())
}

fn decimal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+(\.\d+)?$").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidPeriodFormat,
    FuturePeriod,
    DecimalCommaNotAllowed,
    InvalidDecimalFormat,
    ValueRequired,
    ValueOutOfRange,
    TooManyDecimals,
    InvalidStatus,
    InvalidPriceType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, field: &str, code: ErrorCode, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.to_string(),
            code,
            message: message.into(),
        });
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedMarketPriceInput {
    pub period: String,
    pub value: Decimal,
    pub status: String,
    pub price_type: String,
}

pub const VALID_STATUSES: [&str; 2] = ["provisional", "final"];
pub const VALID_PRICE_TYPES: [&str; 1] = ["PTF"];

/// Returns `YYYY-MM` for "now" in Europe/Istanbul, used for the
/// future-period check so the boundary matches where the platform's
/// operators actually sit.
pub fn current_period() -> String {
    use chrono::Datelike;
    let now = chrono::Utc::now().with_timezone(&chrono_tz::Europe::Istanbul);
    format!("{:04}-{:02}", now.year(), now.month())
}

pub fn is_future_period(period: &str) -> bool {
    period > current_period().as_str()
}

pub fn validate_period(period: &str, errors: &mut ValidationResult) -> Option<String> {
    let trimmed = period.trim().to_string();
    if !period_regex().is_match(&trimmed) {
        errors.push(
            "period",
            ErrorCode::InvalidPeriodFormat,
            format!("period '{trimmed}' must match YYYY-MM"),
        );
        return None;
    }
    if is_future_period(&trimmed) {
        errors.push(
            "period",
            ErrorCode::FuturePeriod,
            format!("period '{trimmed}' is in the future"),
        );
        return None;
    }
    Some(trimmed)
}

fn parse_decimal_string(raw: &str, errors: &mut ValidationResult) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        errors.push("value", ErrorCode::ValueRequired, "value is required");
        return None;
    }
    if trimmed.contains(',') {
        errors.push(
            "value",
            ErrorCode::DecimalCommaNotAllowed,
            "decimal comma is not allowed, use a period",
        );
        return None;
    }
    if trimmed.to_lowercase().contains('e') {
        errors.push(
            "value",
            ErrorCode::InvalidDecimalFormat,
            "scientific notation is not allowed",
        );
        return None;
    }
    if !decimal_regex().is_match(trimmed) {
        errors.push(
            "value",
            ErrorCode::InvalidDecimalFormat,
            format!("'{trimmed}' is not a valid decimal"),
        );
        return None;
    }
    match Decimal::from_str(trimmed) {
        Ok(d) => Some(d),
        Err(_) => {
            errors.push(
                "value",
                ErrorCode::InvalidDecimalFormat,
                format!("'{trimmed}' is not a valid decimal"),
            );
            None
        }
    }
}

fn decimal_places(value: &Decimal) -> u32 {
    value.scale()
}

pub fn validate_value_str(raw: &str, errors: &mut ValidationResult) -> Option<Decimal> {
    let value = parse_decimal_string(raw, errors)?;
    validate_value_decimal(value, errors)
}

pub fn validate_value_decimal(value: Decimal, errors: &mut ValidationResult) -> Option<Decimal> {
    let min = Decimal::from_str(MIN_VALUE).unwrap();
    let max = Decimal::from_str(MAX_VALUE).unwrap();
    let warn_min = Decimal::from_str(WARNING_MIN).unwrap();
    let warn_max = Decimal::from_str(WARNING_MAX).unwrap();

    if decimal_places(&value) > MAX_DECIMAL_PLACES {
        errors.push(
            "value",
            ErrorCode::TooManyDecimals,
            format!("value has more than {MAX_DECIMAL_PLACES} decimal places"),
        );
        return None;
    }
    if value < min || value > max {
        errors.push(
            "value",
            ErrorCode::ValueOutOfRange,
            format!("value must be in [{min}, {max}]"),
        );
        return None;
    }
    if value < warn_min || value > warn_max {
        errors
            .warnings
            .push(format!("value {value} is outside the typical [{warn_min}, {warn_max}] band"));
    }
    Some(value)
}

pub fn validate_status(status: &str, errors: &mut ValidationResult) -> Option<String> {
    if !VALID_STATUSES.contains(&status) {
        errors.push(
            "status",
            ErrorCode::InvalidStatus,
            format!("status must be one of {VALID_STATUSES:?}"),
        );
        return None;
    }
    Some(status.to_string())
}

/// Empty price_type defaults to the singleton PTF.
pub fn validate_price_type(price_type: &str, errors: &mut ValidationResult) -> Option<String> {
    let price_type = if price_type.trim().is_empty() {
        "PTF"
    } else {
        price_type.trim()
    };
    if !VALID_PRICE_TYPES.contains(&price_type) {
        errors.push(
            "price_type",
            ErrorCode::InvalidPriceType,
            format!("price_type must be one of {VALID_PRICE_TYPES:?}"),
        );
        return None;
    }
    Some(price_type.to_string())
}

pub struct RawMarketPriceInput<'a> {
    pub period: &'a str,
    pub value: &'a str,
    pub status: &'a str,
    pub price_type: &'a str,
}

/// Aggregates all four field validations; only builds a normalized input
/// if every field passed.
pub fn validate_entry(
    input: RawMarketPriceInput,
) -> (ValidationResult, Option<NormalizedMarketPriceInput>) {
    let mut result = ValidationResult::default();
    let period = validate_period(input.period, &mut result);
    let value = validate_value_str(input.value, &mut result);
    let status = validate_status(input.status, &mut result);
    let price_type = validate_price_type(input.price_type, &mut result);

    let normalized = match (period, value, status, price_type) {
        (Some(period), Some(value), Some(status), Some(price_type)) if result.is_valid() => {
            Some(NormalizedMarketPriceInput {
                period,
                value,
                status,
                price_type,
            })
        }
        _ => None,
    };

    (result, normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_padded_month() {
        let mut errors = ValidationResult::default();
        assert!(validate_period("2026-2", &mut errors).is_none());
        assert!(errors
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::InvalidPeriodFormat));
    }

    #[test]
    fn rejects_decimal_comma() {
        let mut errors = ValidationResult::default();
        assert!(validate_value_str("2894,92", &mut errors).is_none());
        assert!(errors
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::DecimalCommaNotAllowed));
    }

    #[test]
    fn rejects_scientific_notation() {
        let mut errors = ValidationResult::default();
        assert!(validate_value_str("1e3", &mut errors).is_none());
        assert!(errors
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::InvalidDecimalFormat));
    }

    #[test]
    fn accepts_value_with_warning_outside_band() {
        let mut errors = ValidationResult::default();
        let value = validate_value_str("500.00", &mut errors);
        assert!(value.is_some());
        assert!(errors.is_valid());
        assert!(!errors.warnings.is_empty());
    }

    #[test]
    fn too_many_decimals_rejected() {
        let mut errors = ValidationResult::default();
        assert!(validate_value_str("2894.925", &mut errors).is_none());
        assert!(errors
            .errors
            .iter()
            .any(|e| e.code == ErrorCode::TooManyDecimals));
    }

    #[test]
    fn valid_entry_builds_normalized_input() {
        let (result, normalized) = validate_entry(RawMarketPriceInput {
            period: "2025-01",
            value: "2894.92",
            status: "provisional",
            price_type: "PTF",
        });
        assert!(result.is_valid());
        assert!(normalized.is_some());
    }

    #[test]
    fn empty_price_type_defaults_to_ptf() {
        let mut errors = ValidationResult::default();
        let pt = validate_price_type("", &mut errors).unwrap();
        assert_eq!(pt, "PTF");
    }
}
