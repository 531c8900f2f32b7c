//! Service configuration — TOML file with defaults, plus the JSON server
//! registry used for multi-server tagging.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

use crate::alerting::AlertThresholds;
use crate::metrics::RetentionPolicy;

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SamplingConfig {
    /// Background sampling cadence in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    2
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub thresholds: AlertThresholds,
}

impl Config {
    /// Load from a TOML file; a missing file means defaults, an invalid
    /// one is logged and replaced by defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => match toml::from_str(&data) {
                Ok(config) => config,
                Err(e) => {
                    warn!("Invalid config {}: {} — using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

/// One monitored server. Only `local` exists by default; remote entries
/// are an extension point for tagging records with a `server_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub host: String,
}

pub fn load_servers(path: &Path) -> HashMap<String, ServerEntry> {
    match std::fs::read_to_string(path) {
        Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
            warn!("Invalid server registry {}: {}", path.display(), e);
            default_servers()
        }),
        Err(_) => default_servers(),
    }
}

fn default_servers() -> HashMap<String, ServerEntry> {
    let mut servers = HashMap::new();
    servers.insert(
        "local".to_string(),
        ServerEntry {
            name: "Local Server".to_string(),
            host: "localhost".to_string(),
        },
    );
    servers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load(Path::new("/nonexistent/hostpulse.toml"));
        assert_eq!(config.sampling.interval_secs, 2);
        assert_eq!(config.retention.max_records, 10_000);
        assert_eq!(config.thresholds.cpu, 80.0);
        assert_eq!(config.thresholds.memory, 90.0);
        assert_eq!(config.thresholds.disk, 85.0);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [sampling]
            interval_secs = 5

            [retention]
            max_records = 500
            max_age_secs = 3600

            [thresholds]
            cpu = 75.0
            "#,
        )
        .unwrap();
        assert_eq!(config.sampling.interval_secs, 5);
        assert_eq!(config.retention.max_records, 500);
        assert_eq!(config.retention.max_age_secs, Some(3600));
        assert_eq!(config.thresholds.cpu, 75.0);
        assert_eq!(config.thresholds.memory, 90.0);
    }

    #[test]
    fn server_registry_defaults_to_local() {
        let servers = load_servers(Path::new("/nonexistent/servers.json"));
        assert_eq!(servers.len(), 1);
        assert_eq!(servers["local"].host, "localhost");
    }
}
