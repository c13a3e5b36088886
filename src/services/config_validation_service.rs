//! C1 (part 2) — runs the I1-I8 invariant gate defined on [`Thresholds`]
//! plus the admin-key shape check, and renders the combined result as a
//! boot-time report. The gate itself lives on `Thresholds::validate`; this
//! module is the boundary that turns it into something an operator reads.

use loco_rs::prelude::*;
use serde::Serialize;

use crate::config::{AdminConfig, Thresholds};

#[derive(Debug, Clone, Serialize)]
pub struct ConfigValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub config_hash: String,
    pub environment: String,
}

pub struct ConfigValidationService<'a> {
    thresholds: &'a Thresholds,
    admin: &'a AdminConfig,
}

impl<'a> ConfigValidationService<'a> {
    pub fn new(thresholds: &'a Thresholds, admin: &'a AdminConfig) -> Self {
        Self { thresholds, admin }
    }

    /// Aggregates every I1-I8 violation plus the admin-key shape check;
    /// never stops at the first failure, so an operator sees the whole
    /// picture from a single boot attempt.
    pub fn validate(&self) -> ConfigValidationResult {
        let mut errors = Vec::new();

        if let Err(gate_error) = self.thresholds.validate() {
            errors.extend(gate_error.0.into_iter().map(|v| v.to_string()));
        }
        if let Err(admin_error) = self.admin.validate() {
            errors.push(admin_error);
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            config_hash: self.thresholds.config_hash(),
            environment: self.admin.environment.clone(),
        }
    }

    /// Called at boot. Aborts the process with the aggregated error rather
    /// than allowing a partial boot on an invalid threshold tree.
    pub fn validate_or_abort(&self) -> Result<()> {
        let result = self.validate();
        if !result.valid {
            return Err(Error::string(&format!(
                "config invariant gate failed for environment '{}':\n{}",
                result.environment,
                result.errors.join("\n")
            )));
        }
        Ok(())
    }

    pub fn generate_report(&self) -> String {
        let result = self.validate();
        let mut report = String::new();
        report.push_str("Configuration Validation Report\n");
        report.push_str(&format!("Environment: {}\n", result.environment));
        report.push_str(&format!("Config hash: {}\n", result.config_hash));
        report.push_str(&format!("Status: {}\n\n", if result.valid { "VALID" } else { "INVALID" }));

        if !result.errors.is_empty() {
            report.push_str("ERRORS:\n");
            for error in &result.errors {
                report.push_str(&format!("  - {error}\n"));
            }
        } else {
            report.push_str("All invariants satisfied.\n");
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_and_dev_admin_config_pass() {
        let thresholds = Thresholds::default();
        let admin = AdminConfig {
            enabled: false,
            admin_key: "development-admin-key-change-in-production".to_string(),
            environment: "development".to_string(),
        };
        let result = ConfigValidationService::new(&thresholds, &admin).validate();
        assert!(result.valid);
    }

    #[test]
    fn short_production_admin_key_fails_alongside_threshold_violations() {
        let mut thresholds = Thresholds::default();
        thresholds.mismatch.severe_ratio = 0.0;
        let admin = AdminConfig {
            enabled: true,
            admin_key: "too-short".to_string(),
            environment: "production".to_string(),
        };
        let result = ConfigValidationService::new(&thresholds, &admin).validate();
        assert!(!result.valid);
        assert!(result.errors.len() >= 2);
    }
}
