//! Process-local, operator-toggled deny switches. Consulted at the head
//! of a protected request-class pipeline, before the wrapper stack
//! (kill-switch -> rate limiter -> circuit breaker -> handler).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchStatus {
    pub name: String,
    pub enabled: bool,
    pub last_actor: Option<String>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl SwitchStatus {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            enabled: false,
            last_actor: None,
            last_updated_at: None,
            reason: None,
        }
    }
}

/// A tripped switch short-circuits the caller's pipeline; a deny here
/// never touches a circuit breaker or retry budget.
#[derive(Debug, thiserror::Error)]
#[error("call class '{0}' is disabled by kill-switch")]
pub struct KillSwitchDenied(pub String);

pub struct KillSwitchRegistry {
    switches: RwLock<HashMap<String, SwitchStatus>>,
}

impl KillSwitchRegistry {
    pub fn new() -> Self {
        Self {
            switches: RwLock::new(HashMap::new()),
        }
    }

    /// Returns Err when the named switch is tripped (enabled=true means
    /// "deny"). Unknown switch names are treated as not tripped.
    pub fn check(&self, name: &str) -> Result<(), KillSwitchDenied> {
        let switches = self.switches.read().unwrap();
        match switches.get(name) {
            Some(s) if s.enabled => Err(KillSwitchDenied(name.to_string())),
            _ => Ok(()),
        }
    }

    pub fn list(&self) -> Vec<SwitchStatus> {
        let mut switches: Vec<_> = self.switches.read().unwrap().values().cloned().collect();
        switches.sort_by(|a, b| a.name.cmp(&b.name));
        switches
    }

    /// Atomically toggles a switch, recording the acting operator and an
    /// optional reason for the audit trail.
    pub fn set(&self, name: &str, enabled: bool, actor: &str, reason: Option<String>) -> SwitchStatus {
        let mut switches = self.switches.write().unwrap();
        let entry = switches
            .entry(name.to_string())
            .or_insert_with(|| SwitchStatus::new(name));
        entry.enabled = enabled;
        entry.last_actor = Some(actor.to_string());
        entry.last_updated_at = Some(Utc::now());
        entry.reason = reason;
        entry.clone()
    }
}

impl Default for KillSwitchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide instance. Switches are operational state, not
/// request-scoped, so every admin handler and every guarded call site
/// shares this one registry.
static GLOBAL: std::sync::OnceLock<KillSwitchRegistry> = std::sync::OnceLock::new();

pub fn global() -> &'static KillSwitchRegistry {
    GLOBAL.get_or_init(KillSwitchRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_switch_allows() {
        let registry = KillSwitchRegistry::new();
        assert!(registry.check("never-set").is_ok());
    }

    #[test]
    fn tripped_switch_denies() {
        let registry = KillSwitchRegistry::new();
        registry.set("market_price_writes", true, "ops-oncall", Some("incident 123".into()));
        assert!(registry.check("market_price_writes").is_err());
    }

    #[test]
    fn toggling_back_allows_again() {
        let registry = KillSwitchRegistry::new();
        registry.set("import", true, "alice", None);
        registry.set("import", false, "bob", None);
        assert!(registry.check("import").is_ok());
        let status = registry.list().into_iter().find(|s| s.name == "import").unwrap();
        assert_eq!(status.last_actor.as_deref(), Some("bob"));
    }
}
