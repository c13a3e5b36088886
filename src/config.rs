use serde::{Deserialize, Serialize};

/// Mismatch classification thresholds (C9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MismatchThresholds {
    pub ratio: f64,
    pub absolute: f64,
    pub severe_ratio: f64,
    pub severe_absolute: f64,
    pub rounding_delta: f64,
    pub rounding_ratio: f64,
    pub ocr_suspect_ratio: f64,
}

impl Default for MismatchThresholds {
    fn default() -> Self {
        Self {
            ratio: 0.05,
            absolute: 50.0,
            severe_ratio: 0.20,
            severe_absolute: 500.0,
            rounding_delta: 10.0,
            rounding_ratio: 0.005,
            ocr_suspect_ratio: 0.50,
        }
    }
}

/// Drift-detection thresholds (C14).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriftThresholds {
    pub min_sample: u64,
    pub min_absolute_delta: u64,
    pub rate_multiplier: f64,
    pub top_offenders_min_invoices: u64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            min_sample: 20,
            min_absolute_delta: 5,
            rate_multiplier: 2.0,
            top_offenders_min_invoices: 20,
        }
    }
}

/// Alerting thresholds (C14).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertThresholds {
    pub bug_report_rate: f64,
    pub exhausted_rate: f64,
    pub stuck_count: u64,
    pub recompute_limit: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            bug_report_rate: 0.10,
            exhausted_rate: 0.20,
            stuck_count: 1,
            recompute_limit: 1,
        }
    }
}

/// Retry/recompute recovery thresholds (C11-C13).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryThresholds {
    pub stuck_minutes: i64,
}

impl Default for RecoveryThresholds {
    fn default() -> Self {
        Self { stuck_minutes: 10 }
    }
}

/// Invoice field validation thresholds (C9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationThresholds {
    pub low_confidence: f64,
    pub min_unit_price: f64,
    pub max_unit_price: f64,
    pub min_dist_price: f64,
    pub max_dist_price: f64,
    pub line_consistency_tolerance: f64,
    pub hard_stop_delta: f64,
    pub energy_crosscheck_tolerance: f64,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            low_confidence: 0.6,
            min_unit_price: 0.5,
            max_unit_price: 15.0,
            min_dist_price: 0.0,
            max_dist_price: 5.0,
            line_consistency_tolerance: 2.0,
            hard_stop_delta: 20.0,
            energy_crosscheck_tolerance: 5.0,
        }
    }
}

/// Operator feedback thresholds (C14).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackThresholds {
    pub root_cause_max_length: usize,
}

impl Default for FeedbackThresholds {
    fn default() -> Self {
        Self {
            root_cause_max_length: 200,
        }
    }
}

/// Retry executor schedule (C11).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryThresholds {
    pub max_attempts: u32,
    pub backoff_minutes: Vec<i64>,
    pub lock_minutes: i64,
}

impl Default for RetryThresholds {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_minutes: vec![30, 120, 360, 1440],
            lock_minutes: 5,
        }
    }
}

/// Recompute guard (C12/C13).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecomputeThresholds {
    pub max_count: u32,
}

impl Default for RecomputeThresholds {
    fn default() -> Self {
        Self { max_count: 5 }
    }
}

/// The frozen threshold tree. Every numeric knob the engine consults lives
/// here; nothing is read ad hoc from the environment once boot completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Thresholds {
    pub mismatch: MismatchThresholds,
    pub drift: DriftThresholds,
    pub alert: AlertThresholds,
    pub recovery: RecoveryThresholds,
    pub validation: ValidationThresholds,
    pub feedback: FeedbackThresholds,
    pub retry: RetryThresholds,
    pub recompute: RecomputeThresholds,
}

/// One broken invariant, identified by its I-number and a human message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    pub id: &'static str,
    pub message: String,
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.id, self.message)
    }
}

/// Aggregated invariant-gate failure. Boot aborts with every violation
/// listed, never just the first.
#[derive(Debug, Clone, thiserror::Error)]
#[error("config invariant gate failed:\n{}", .0.iter().map(|v| format!("  - {v}")).collect::<Vec<_>>().join("\n"))]
pub struct ConfigInvariantError(pub Vec<InvariantViolation>);

impl Thresholds {
    /// Runs invariants I1-I8. Returns every violation found, not just the
    /// first, so an operator sees the whole picture in one boot attempt.
    pub fn validate(&self) -> Result<(), ConfigInvariantError> {
        let mut violations = Vec::new();
        let m = &self.mismatch;
        let v = &self.validation;

        if !(m.severe_ratio >= m.ratio) {
            violations.push(InvariantViolation {
                id: "I1",
                message: format!(
                    "severe_ratio ({}) must be >= ratio ({})",
                    m.severe_ratio, m.ratio
                ),
            });
        }
        if !(m.severe_absolute >= m.absolute) {
            violations.push(InvariantViolation {
                id: "I2",
                message: format!(
                    "severe_absolute ({}) must be >= absolute ({})",
                    m.severe_absolute, m.absolute
                ),
            });
        }
        if !(m.rounding_ratio < m.ratio) {
            violations.push(InvariantViolation {
                id: "I3",
                message: format!(
                    "rounding_ratio ({}) must be strictly < ratio ({})",
                    m.rounding_ratio, m.ratio
                ),
            });
        }
        if !(v.min_unit_price < v.max_unit_price) {
            violations.push(InvariantViolation {
                id: "I4",
                message: format!(
                    "min_unit_price ({}) must be < max_unit_price ({})",
                    v.min_unit_price, v.max_unit_price
                ),
            });
        }
        if !(v.min_dist_price < v.max_dist_price) {
            violations.push(InvariantViolation {
                id: "I5",
                message: format!(
                    "min_dist_price ({}) must be < max_dist_price ({})",
                    v.min_dist_price, v.max_dist_price
                ),
            });
        }
        if !(v.hard_stop_delta >= m.severe_ratio * 100.0) {
            violations.push(InvariantViolation {
                id: "I6",
                message: format!(
                    "hard_stop_delta ({}) must be >= severe_ratio*100 ({})",
                    v.hard_stop_delta,
                    m.severe_ratio * 100.0
                ),
            });
        }
        for (name, value) in self.all_named_thresholds() {
            if value <= 0.0 {
                violations.push(InvariantViolation {
                    id: "I7",
                    message: format!("threshold '{name}' must be > 0, got {value}"),
                });
            }
        }
        if !(v.low_confidence > 0.0 && v.low_confidence < 1.0) {
            violations.push(InvariantViolation {
                id: "I8",
                message: format!(
                    "low_confidence ({}) must satisfy 0 < x < 1",
                    v.low_confidence
                ),
            });
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigInvariantError(violations))
        }
    }

    /// Every threshold that must be strictly positive (I7), named for
    /// error reporting.
    fn all_named_thresholds(&self) -> Vec<(&'static str, f64)> {
        vec![
            ("mismatch.ratio", self.mismatch.ratio),
            ("mismatch.absolute", self.mismatch.absolute),
            ("mismatch.severe_ratio", self.mismatch.severe_ratio),
            ("mismatch.severe_absolute", self.mismatch.severe_absolute),
            ("mismatch.rounding_delta", self.mismatch.rounding_delta),
            ("mismatch.rounding_ratio", self.mismatch.rounding_ratio),
            ("mismatch.ocr_suspect_ratio", self.mismatch.ocr_suspect_ratio),
            ("validation.min_unit_price", self.validation.min_unit_price),
            ("validation.max_unit_price", self.validation.max_unit_price),
            ("validation.max_dist_price", self.validation.max_dist_price),
            (
                "validation.line_consistency_tolerance",
                self.validation.line_consistency_tolerance,
            ),
            ("validation.hard_stop_delta", self.validation.hard_stop_delta),
            (
                "validation.energy_crosscheck_tolerance",
                self.validation.energy_crosscheck_tolerance,
            ),
        ]
    }

    /// SHA-256 of the canonical serialized form, first 16 hex chars.
    /// Exposed on the readiness probe so operators can detect drift
    /// between processes running different config.
    pub fn config_hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let canonical =
            serde_json::to_string(self).unwrap_or_else(|_| "unserializable".to_string());
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(digest)[..16].to_string()
    }
}

/// Admin HTTP surface configuration (§6 envelope).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub enabled: bool,
    pub admin_key: String,
    pub environment: String,
}

impl AdminConfig {
    pub fn from_env() -> Self {
        let environment =
            std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let enabled = std::env::var("ADMIN_API_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(environment != "development");
        let admin_key = std::env::var("ADMIN_API_KEY").unwrap_or_else(|_| {
            if environment == "production" {
                String::new()
            } else {
                "development-admin-key-change-in-production".to_string()
            }
        });
        Self {
            enabled,
            admin_key,
            environment,
        }
    }

    /// Production requires a real secret of at least 32 chars; anything
    /// shorter is refused rather than silently accepted.
    pub fn validate(&self) -> Result<(), String> {
        if self.environment == "production" && self.admin_key.len() < 32 {
            return Err(
                "ADMIN_API_KEY must be at least 32 characters in production".to_string(),
            );
        }
        Ok(())
    }
}

/// Pilot-tenant rate-limiting configuration (§4.5 supplement).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PilotConfig {
    pub enabled: bool,
    pub tenant_id: String,
    pub max_invoices_per_hour: u32,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tenant_id: "pilot".to_string(),
            max_invoices_per_hour: 50,
        }
    }
}

impl PilotConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("PILOT_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            tenant_id: std::env::var("PILOT_TENANT_ID").unwrap_or_else(|_| "pilot".to_string()),
            max_invoices_per_hour: std::env::var("PILOT_MAX_INVOICES_PER_HOUR")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_pass_the_gate() {
        assert!(Thresholds::default().validate().is_ok());
    }

    #[test]
    fn i3_violation_is_reported() {
        let mut t = Thresholds::default();
        t.mismatch.rounding_ratio = t.mismatch.ratio; // no longer strictly less
        let err = t.validate().unwrap_err();
        assert!(err.0.iter().any(|v| v.id == "I3"));
    }

    #[test]
    fn multiple_violations_are_all_reported() {
        let mut t = Thresholds::default();
        t.mismatch.severe_ratio = 0.0; // breaks I1 and I7
        let err = t.validate().unwrap_err();
        assert!(err.0.len() >= 2);
    }

    #[test]
    fn config_hash_is_stable_for_equal_config() {
        let a = Thresholds::default();
        let b = Thresholds::default();
        assert_eq!(a.config_hash(), b.config_hash());
    }
}
