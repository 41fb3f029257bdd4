//! # Check Subcommand
//!
//! Loads every setting the API server reads at startup and prints the
//! effective values. An invalid value fails the command the same way it
//! would fail the server.

use anyhow::{Context, Result};
use serde::Serialize;

use ration_api::state::AppConfig;
use ration_core::DetectionConfig;
use ration_engine::FaceServiceConfig;

use crate::print_json;

/// Effective configuration.
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub detection: DetectionConfig,
    pub port: u16,
    /// `None` means submitted samples are compared as raw vectors.
    pub face_service_url: Option<String>,
    pub face_service_timeout_secs: Option<u64>,
    pub database_configured: bool,
}

/// Build the report over an arbitrary lookup.
pub fn config_report<F>(lookup: F) -> Result<ConfigReport>
where
    F: Fn(&str) -> Option<String>,
{
    let detection = DetectionConfig::from_lookup(&lookup).context("detection settings")?;
    let app = AppConfig::from_lookup(&lookup).context("server settings")?;
    let face = FaceServiceConfig::from_lookup(&lookup).context("face service settings")?;
    Ok(ConfigReport {
        detection,
        port: app.port,
        face_service_url: face.as_ref().map(|f| f.base_url.to_string()),
        face_service_timeout_secs: face.as_ref().map(|f| f.timeout_secs),
        database_configured: lookup("DATABASE_URL").is_some_and(|v| !v.trim().is_empty()),
    })
}

/// Run the check against the process environment.
pub fn run_check() -> Result<u8> {
    let report = config_report(|key| std::env::var(key).ok())?;
    print_json(&report)?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let report = config_report(lookup(&[])).unwrap();
        assert_eq!(report.detection, DetectionConfig::default());
        assert_eq!(report.port, 8080);
        assert!(report.face_service_url.is_none());
        assert!(!report.database_configured);
    }

    #[test]
    fn face_service_and_database_are_reported() {
        let report = config_report(lookup(&[
            ("FACE_SERVICE_URL", "http://face:8000"),
            ("DATABASE_URL", "postgres://db/ration"),
            ("FACE_MATCH_THRESHOLD", "75"),
        ]))
        .unwrap();
        assert_eq!(report.face_service_url.as_deref(), Some("http://face:8000/"));
        assert!(report.database_configured);
        assert_eq!(report.detection.face_match_threshold, 75.0);
    }

    #[test]
    fn invalid_threshold_fails() {
        assert!(config_report(lookup(&[("FACE_MATCH_THRESHOLD", "120")])).is_err());
    }
}
