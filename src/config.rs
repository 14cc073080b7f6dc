//! Runtime configuration.
//!
//! Defaults match the tuned values for a mid-range compositor. Each timing
//! can be overridden from the environment (or a `.env` file, loaded by
//! `run()` before this is read).

use crate::capture::{SettlePollWaiter, SurfaceStrategy};
use crate::overlay::GesturePolicy;
use std::time::Duration;

const STRATEGY_VAR: &str = "OVERLAY_CAPTURE_STRATEGY";
const SETTLE_VAR: &str = "OVERLAY_CAPTURE_SETTLE_MS";
const ATTEMPTS_VAR: &str = "OVERLAY_CAPTURE_POLL_ATTEMPTS";
const BACKOFF_VAR: &str = "OVERLAY_CAPTURE_POLL_BACKOFF_MS";
const HIDE_SETTLE_VAR: &str = "OVERLAY_HIDE_SETTLE_MS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub strategy: SurfaceStrategy,
    /// Wait after attaching the output before the first poll.
    pub settle: Duration,
    pub poll_attempts: u32,
    pub poll_backoff: Duration,
    /// Buffer pool depth.
    pub buffer_slots: usize,
    /// Wait after hiding the overlay so it is gone from the next frame.
    pub hide_settle: Duration,
    pub gestures: GesturePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            strategy: SurfaceStrategy::PersistentPaused,
            settle: Duration::from_millis(150),
            poll_attempts: 3,
            poll_backoff: Duration::from_millis(50),
            buffer_slots: 2,
            hide_settle: Duration::from_millis(300),
            gestures: GesturePolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep the
    /// default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup(STRATEGY_VAR) {
            config.strategy = value.parse().map_err(|reason| ConfigError::Invalid {
                var: STRATEGY_VAR,
                value: value.clone(),
                reason,
            })?;
        }
        if let Some(ms) = parse_u64(&lookup, SETTLE_VAR)? {
            config.settle = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_u64(&lookup, ATTEMPTS_VAR)? {
            if attempts == 0 || attempts > u32::MAX as u64 {
                return Err(ConfigError::Invalid {
                    var: ATTEMPTS_VAR,
                    value: attempts.to_string(),
                    reason: "must be at least 1".into(),
                });
            }
            config.poll_attempts = attempts as u32;
        }
        if let Some(ms) = parse_u64(&lookup, BACKOFF_VAR)? {
            config.poll_backoff = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_u64(&lookup, HIDE_SETTLE_VAR)? {
            config.hide_settle = Duration::from_millis(ms);
        }

        Ok(config)
    }

    pub fn waiter(&self) -> SettlePollWaiter {
        SettlePollWaiter::new(self.settle, self.poll_attempts, self.poll_backoff)
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                var,
                value,
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var: &str| map.get(var).cloned()
    }

    #[test]
    fn defaults_match_tuned_values() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.settle, Duration::from_millis(150));
        assert_eq!(config.poll_attempts, 3);
        assert_eq!(config.poll_backoff, Duration::from_millis(50));
        assert_eq!(config.hide_settle, Duration::from_millis(300));
        assert_eq!(config.strategy, SurfaceStrategy::PersistentPaused);
    }

    #[test]
    fn overrides_apply() {
        let config = AppConfig::from_lookup(lookup(&[
            ("OVERLAY_CAPTURE_STRATEGY", "on-demand"),
            ("OVERLAY_CAPTURE_SETTLE_MS", "10"),
            ("OVERLAY_CAPTURE_POLL_ATTEMPTS", "5"),
            ("OVERLAY_HIDE_SETTLE_MS", " 0 "),
        ]))
        .unwrap();
        assert_eq!(config.strategy, SurfaceStrategy::OnDemand);
        assert_eq!(config.settle, Duration::from_millis(10));
        assert_eq!(config.poll_attempts, 5);
        assert_eq!(config.hide_settle, Duration::ZERO);
        assert_eq!(config.waiter().attempts, 5);
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("OVERLAY_CAPTURE_SETTLE_MS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("OVERLAY_CAPTURE_SETTLE_MS"));

        assert!(AppConfig::from_lookup(lookup(&[("OVERLAY_CAPTURE_POLL_ATTEMPTS", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("OVERLAY_CAPTURE_STRATEGY", "always")])).is_err());
    }
}
