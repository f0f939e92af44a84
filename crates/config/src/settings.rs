//! Top-level settings document (§6 "Configuration"): per-level confidence
//! thresholds, batch sizes, retry counts, timeouts, default chunk size,
//! and the fallback strategy name.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeThresholds {
    pub l1_threshold: f32,
    pub l2_threshold: f32,
    pub l3_threshold: f32,
    pub l4_threshold: f32,
    pub l5_threshold: f32,
    pub l6_threshold: f32,
}

impl Default for CascadeThresholds {
    fn default() -> Self {
        Self {
            l1_threshold: 0.7,
            l2_threshold: 0.6,
            l3_threshold: 0.5,
            l4_threshold: 0.6,
            l5_threshold: 0.5,
            l6_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub request_deadline_ms: u64,
    pub embedding_timeout_ms: u64,
    pub metadata_timeout_ms: u64,
    pub fallback_timeout_ms: u64,
    pub retry_attempts: u32,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_deadline_ms: 30_000,
            embedding_timeout_ms: 30_000,
            metadata_timeout_ms: 5_000,
            fallback_timeout_ms: 30_000,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub chunk_size: usize,
    pub batch_size: usize,
    pub embedding_dim: usize,
    pub concurrent_workers: usize,
    pub cycle_size: usize,
    pub embedding_batch_max: usize,
    pub embedding_batch_window_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            batch_size: 50,
            embedding_dim: 1024,
            concurrent_workers: 4,
            cycle_size: 5,
            embedding_batch_max: 32,
            embedding_batch_window_ms: 50,
        }
    }
}

/// The full settings document. Every field has a spec-mandated default so
/// a bare `Settings::default()` (no file, no environment) is already a
/// valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub thresholds: CascadeThresholds,
    pub timeouts: TimeoutConfig,
    pub ingest: IngestConfig,
    pub fallback_strategy: String,
    pub tag_csv_path: String,
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: &[(&str, bool)] = &[
            ("thresholds.l1_threshold", (0.0..=1.0).contains(&self.thresholds.l1_threshold)),
            ("thresholds.l2_threshold", (0.0..=1.0).contains(&self.thresholds.l2_threshold)),
            ("thresholds.l3_threshold", (0.0..=1.0).contains(&self.thresholds.l3_threshold)),
            ("thresholds.l4_threshold", (0.0..=1.0).contains(&self.thresholds.l4_threshold)),
            ("thresholds.l5_threshold", (0.0..=1.0).contains(&self.thresholds.l5_threshold)),
            ("ingest.chunk_size", self.ingest.chunk_size > 0),
            ("ingest.concurrent_workers", self.ingest.concurrent_workers > 0),
        ];
        for (field, ok) in checks {
            if !ok {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: "out of allowed range".to_string(),
                });
            }
        }
        if self.tag_csv_path.is_empty() {
            return Err(ConfigError::MissingField("tag_csv_path".to_string()));
        }
        Ok(())
    }
}

/// Loads a [`Settings`] document layering, in increasing priority: built-in
/// defaults, an optional YAML file, then `PODWISE_`-prefixed environment
/// variables (e.g. `PODWISE_THRESHOLDS__L1_THRESHOLD=0.8`).
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let defaults = Settings::default();
    let defaults_json = serde_json::to_string(&defaults).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    let mut builder = config::Config::builder()
        .add_source(config::File::from_str(&defaults_json, config::FileFormat::Json));

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        builder = builder.add_source(config::File::from(path));
    }

    let built = builder
        .add_source(config::Environment::with_prefix("PODWISE").separator("__"))
        .build()?;

    let settings: Settings = built.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_recognized_options() {
        let s = Settings::default();
        assert_eq!(s.ingest.chunk_size, 1024);
        assert_eq!(s.ingest.batch_size, 50);
        assert_eq!(s.ingest.embedding_dim, 1024);
        assert_eq!(s.thresholds.l1_threshold, 0.7);
        assert_eq!(s.thresholds.l2_threshold, 0.6);
        assert_eq!(s.thresholds.l3_threshold, 0.5);
        assert_eq!(s.thresholds.l4_threshold, 0.6);
        assert_eq!(s.thresholds.l5_threshold, 0.5);
        assert_eq!(s.thresholds.l6_threshold, 0.7);
        assert_eq!(s.ingest.concurrent_workers, 4);
        assert_eq!(s.timeouts.retry_attempts, 3);
        assert_eq!(s.timeouts.request_deadline_ms, 30_000);
    }

    #[test]
    fn load_without_file_validates_defaults_ok() {
        let mut s = Settings::default();
        s.tag_csv_path = "csv/TAG_info.csv".to_string();
        assert!(s.validate().is_ok());
    }

    #[test]
    fn missing_tag_csv_path_fails_validation() {
        let s = Settings::default();
        assert!(s.validate().is_err());
    }

    #[test]
    fn loading_missing_file_errors() {
        let result = load_settings(Some(Path::new("/nonexistent/settings.yaml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
