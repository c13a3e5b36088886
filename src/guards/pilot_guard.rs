//! In-memory sliding-window rate limiter for the single pilot tenant.
//! Grounded on the original `pilot_guard.py`: a plain `Vec<DateTime<Utc>>`
//! trimmed of anything older than one hour on every check.

use std::sync::Mutex;

use chrono::{Duration, Utc};

use crate::config::PilotConfig;

#[derive(Debug, thiserror::Error)]
#[error("pilot tenant '{tenant}' exceeded {limit} invoices/hour")]
pub struct PilotRateLimitExceeded {
    pub tenant: String,
    pub limit: u32,
}

pub struct PilotGuard {
    config: PilotConfig,
    timestamps: Mutex<Vec<chrono::DateTime<Utc>>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PilotRateStatus {
    pub current: usize,
    pub limit: u32,
    pub remaining: u32,
    pub window_seconds: i64,
}

impl PilotGuard {
    pub fn new(config: PilotConfig) -> Self {
        Self {
            config,
            timestamps: Mutex::new(Vec::new()),
        }
    }

    pub fn is_pilot_tenant(&self, tenant_id: &str) -> bool {
        self.config.enabled && tenant_id == self.config.tenant_id
    }

    /// Cleans expired timestamps, then admits the invoice or rejects it if
    /// the hourly window is already full.
    pub fn check_rate_limit(&self) -> Result<(), PilotRateLimitExceeded> {
        if !self.config.enabled {
            return Ok(());
        }
        let cutoff = Utc::now() - Duration::hours(1);
        let mut timestamps = self.timestamps.lock().unwrap();
        timestamps.retain(|t| *t > cutoff);

        if timestamps.len() as u32 >= self.config.max_invoices_per_hour {
            return Err(PilotRateLimitExceeded {
                tenant: self.config.tenant_id.clone(),
                limit: self.config.max_invoices_per_hour,
            });
        }
        timestamps.push(Utc::now());
        Ok(())
    }

    pub fn status(&self) -> PilotRateStatus {
        let cutoff = Utc::now() - Duration::hours(1);
        let mut timestamps = self.timestamps.lock().unwrap();
        timestamps.retain(|t| *t > cutoff);
        let current = timestamps.len();
        PilotRateStatus {
            current,
            limit: self.config.max_invoices_per_hour,
            remaining: self.config.max_invoices_per_hour.saturating_sub(current as u32),
            window_seconds: 3600,
        }
    }

    #[cfg(test)]
    pub fn reset(&self) {
        self.timestamps.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> PilotGuard {
        PilotGuard::new(PilotConfig {
            enabled: true,
            tenant_id: "pilot".to_string(),
            max_invoices_per_hour: 3,
        })
    }

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let g = guard();
        assert!(g.check_rate_limit().is_ok());
        assert!(g.check_rate_limit().is_ok());
        assert!(g.check_rate_limit().is_ok());
        assert!(g.check_rate_limit().is_err());
    }

    #[test]
    fn disabled_guard_never_limits() {
        let g = PilotGuard::new(PilotConfig {
            enabled: false,
            tenant_id: "pilot".to_string(),
            max_invoices_per_hour: 1,
        });
        assert!(g.check_rate_limit().is_ok());
        assert!(g.check_rate_limit().is_ok());
    }

    #[test]
    fn status_reports_remaining() {
        let g = guard();
        g.check_rate_limit().unwrap();
        let status = g.status();
        assert_eq!(status.current, 1);
        assert_eq!(status.remaining, 2);
    }
}
