//! Duplicate-detection configuration.
//!
//! Read-only for the life of the process: thresholds and windows are the
//! only state shared between concurrent verifications.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Thresholds consumed by the verification engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum confidence (inclusive) for a face to be accepted.
    pub face_match_threshold: f64,
    /// Window, in hours, within which a repeat attempt is suspicious.
    pub duplicate_time_window_hours: u32,
    /// Accepted collections allowed per beneficiary per cycle before
    /// further ones raise `multiple_attempts`.
    pub max_transactions_per_cycle: u32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            face_match_threshold: 60.0,
            duplicate_time_window_hours: 24,
            max_transactions_per_cycle: 1,
        }
    }
}

impl DetectionConfig {
    /// Load from environment variables, falling back to defaults for
    /// absent ones.
    ///
    /// Variables:
    /// - `FACE_MATCH_THRESHOLD` (default: 60.0, range 0-100)
    /// - `DUPLICATE_TIME_WINDOW_HOURS` (default: 24, at least 1)
    /// - `MAX_TRANSACTIONS_PER_CYCLE` (default: 1, at least 1)
    ///
    /// # Errors
    ///
    /// A variable that is present but unparseable or out of range is an
    /// error, never silently replaced by the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (used by tests and the CLI).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            face_match_threshold: parse_or(
                &lookup,
                "FACE_MATCH_THRESHOLD",
                defaults.face_match_threshold,
            )?,
            duplicate_time_window_hours: parse_or(
                &lookup,
                "DUPLICATE_TIME_WINDOW_HOURS",
                defaults.duplicate_time_window_hours,
            )?,
            max_transactions_per_cycle: parse_or(
                &lookup,
                "MAX_TRANSACTIONS_PER_CYCLE",
                defaults.max_transactions_per_cycle,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.face_match_threshold;
        if !t.is_finite() || !(0.0..=100.0).contains(&t) {
            return Err(invalid("FACE_MATCH_THRESHOLD", t, "must be within 0-100"));
        }
        if self.duplicate_time_window_hours == 0 {
            return Err(invalid("DUPLICATE_TIME_WINDOW_HOURS", 0, "must be at least 1"));
        }
        if self.max_transactions_per_cycle == 0 {
            return Err(invalid("MAX_TRANSACTIONS_PER_CYCLE", 0, "must be at least 1"));
        }
        Ok(())
    }

    /// The suspicious-timing window as a duration.
    pub fn time_window(&self) -> Duration {
        Duration::hours(i64::from(self.duplicate_time_window_hours))
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

fn invalid(key: &'static str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
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
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_when_absent() {
        let cfg = DetectionConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, DetectionConfig::default());
        assert_eq!(cfg.time_window(), Duration::hours(24));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = DetectionConfig::from_lookup(lookup(&[
            ("FACE_MATCH_THRESHOLD", "72.5"),
            ("DUPLICATE_TIME_WINDOW_HOURS", "6"),
            ("MAX_TRANSACTIONS_PER_CYCLE", "2"),
        ]))
        .unwrap();
        assert_eq!(cfg.face_match_threshold, 72.5);
        assert_eq!(cfg.duplicate_time_window_hours, 6);
        assert_eq!(cfg.max_transactions_per_cycle, 2);
    }

    #[test]
    fn garbage_is_not_defaulted() {
        let err = DetectionConfig::from_lookup(lookup(&[("FACE_MATCH_THRESHOLD", "high")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "FACE_MATCH_THRESHOLD",
                ..
            }
        ));
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(DetectionConfig::from_lookup(lookup(&[("FACE_MATCH_THRESHOLD", "120")])).is_err());
        assert!(
            DetectionConfig::from_lookup(lookup(&[("MAX_TRANSACTIONS_PER_CYCLE", "0")])).is_err()
        );
        assert!(
            DetectionConfig::from_lookup(lookup(&[("DUPLICATE_TIME_WINDOW_HOURS", "-3")])).is_err()
        );
    }
}
