use std::time::Duration;

use crate::engine::ConflictMode;
use crate::model::Ms;

const HOUR_MS: Ms = 3_600_000;

/// Engine tuning knobs. `Default` matches the documented contract; `from_env`
/// overrides from `BERTH_*` variables for deployments.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a pending reservation may wait for owner approval before the
    /// sweep expires it.
    pub approval_window: Ms,
    /// Cadence of the background sweep. Bounds the staleness of time-driven
    /// transitions: a confirmed reservation goes active at most one interval
    /// after its start instant, and likewise for completion and expiry.
    pub sweep_interval: Duration,
    /// Upper bound on any single payment-gateway call.
    pub payment_timeout: Duration,
    /// Interval semantics for conflict detection.
    pub conflict_mode: ConflictMode,
    /// Journal records between compactions.
    pub compact_threshold: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            approval_window: 48 * HOUR_MS,
            sweep_interval: Duration::from_secs(60),
            payment_timeout: Duration::from_secs(10),
            conflict_mode: ConflictMode::HalfOpen,
            compact_threshold: 1000,
        }
    }
}

impl EngineConfig {
    /// Read overrides from the process environment:
    /// `BERTH_APPROVAL_WINDOW_HOURS`, `BERTH_SWEEP_INTERVAL_SECS`,
    /// `BERTH_PAYMENT_TIMEOUT_SECS`, `BERTH_CONFLICT_MODE`
    /// (`half_open`/`inclusive`), `BERTH_COMPACT_THRESHOLD`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let approval_window = get("BERTH_APPROVAL_WINDOW_HOURS")
            .and_then(|s| s.parse::<Ms>().ok())
            .map(|h| h * HOUR_MS)
            .unwrap_or(defaults.approval_window);
        let sweep_interval = get("BERTH_SWEEP_INTERVAL_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);
        let payment_timeout = get("BERTH_PAYMENT_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.payment_timeout);
        let conflict_mode = match get("BERTH_CONFLICT_MODE").as_deref() {
            Some("inclusive") => ConflictMode::Inclusive,
            Some("half_open") => ConflictMode::HalfOpen,
            _ => defaults.conflict_mode,
        };
        let compact_threshold = get("BERTH_COMPACT_THRESHOLD")
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.compact_threshold);

        Self {
            approval_window,
            sweep_interval,
            payment_timeout,
            conflict_mode,
            compact_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_contract() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.approval_window, 48 * HOUR_MS);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(60));
        assert_eq!(cfg.payment_timeout, Duration::from_secs(10));
        assert_eq!(cfg.conflict_mode, ConflictMode::HalfOpen);
        assert_eq!(cfg.compact_threshold, 1000);
    }

    #[test]
    fn lookup_overrides_apply() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BERTH_APPROVAL_WINDOW_HOURS", "12"),
            ("BERTH_SWEEP_INTERVAL_SECS", "5"),
            ("BERTH_PAYMENT_TIMEOUT_SECS", "3"),
            ("BERTH_CONFLICT_MODE", "inclusive"),
            ("BERTH_COMPACT_THRESHOLD", "50"),
        ]);
        let cfg = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.approval_window, 12 * HOUR_MS);
        assert_eq!(cfg.sweep_interval, Duration::from_secs(5));
        assert_eq!(cfg.payment_timeout, Duration::from_secs(3));
        assert_eq!(cfg.conflict_mode, ConflictMode::Inclusive);
        assert_eq!(cfg.compact_threshold, 50);
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BERTH_APPROVAL_WINDOW_HOURS", "soon"),
            ("BERTH_CONFLICT_MODE", "both"),
        ]);
        let cfg = EngineConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.approval_window, EngineConfig::default().approval_window);
        assert_eq!(cfg.conflict_mode, ConflictMode::HalfOpen);
    }
}
