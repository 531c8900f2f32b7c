//! Threshold alerting — pure checks against static thresholds plus a
//! JSON-persisted, append-only alert log.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::metrics::MetricsRecord;

/// Static threshold configuration, percentages 0-100. Read-only after load.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AlertThresholds {
    #[serde(default = "default_cpu_threshold")]
    pub cpu: f64,
    #[serde(default = "default_memory_threshold")]
    pub memory: f64,
    #[serde(default = "default_disk_threshold")]
    pub disk: f64,
}

fn default_cpu_threshold() -> f64 {
    80.0
}
fn default_memory_threshold() -> f64 {
    90.0
}
fn default_disk_threshold() -> f64 {
    85.0
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cpu: 80.0,
            memory: 90.0,
            disk: 85.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Cpu,
    Memory,
    Disk,
}

/// A triggered alert. Never mutated — only appended and persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub message: String,
    pub timestamp: String,
}

/// Check one record against the thresholds. Pure — never consults history.
pub fn check_thresholds(thresholds: &AlertThresholds, record: &MetricsRecord) -> Vec<Alert> {
    let mut alerts = Vec::new();
    if record.cpu > thresholds.cpu {
        alerts.push(Alert {
            kind: AlertKind::Cpu,
            message: format!("CPU usage is high: {}%", record.cpu),
            timestamp: record.datetime.clone(),
        });
    }
    if record.memory.usage_percent > thresholds.memory {
        alerts.push(Alert {
            kind: AlertKind::Memory,
            message: format!("Memory usage is high: {}%", record.memory.usage_percent),
            timestamp: record.datetime.clone(),
        });
    }
    if record.disk_usage_percent > thresholds.disk {
        alerts.push(Alert {
            kind: AlertKind::Disk,
            message: format!("Disk usage is high: {}%", record.disk_usage_percent),
            timestamp: record.datetime.clone(),
        });
    }
    alerts
}

/// Append-only alert list persisted as JSON.
pub struct AlertLog {
    path: PathBuf,
    alerts: Vec<Alert>,
}

impl AlertLog {
    /// Load persisted alerts or start empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let alerts = match std::fs::read_to_string(&path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        Self { path, alerts }
    }

    /// Append new alerts and persist the whole list. A failed write is
    /// logged; the in-memory list stays authoritative.
    pub fn append(&mut self, new_alerts: Vec<Alert>) {
        self.alerts.extend(new_alerts);
        if let Err(e) = self.save() {
            warn!("Failed to persist alert log: {}", e);
        }
    }

    fn save(&self) -> Result<(), String> {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let json = serde_json::to_string_pretty(&self.alerts).map_err(|e| e.to_string())?;
        std::fs::write(&self.path, json)
            .map_err(|e| format!("Failed to write {}: {}", self.path.display(), e))
    }

    pub fn all(&self) -> &[Alert] {
        &self.alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{DiskIo, MemoryInfo, NetworkIo};

    fn record(cpu: f64, memory_pct: f64, disk_pct: f64) -> MetricsRecord {
        MetricsRecord {
            datetime: "2024-03-15 08:00:00".to_string(),
            cpu,
            memory: MemoryInfo {
                total_gb: 16.0,
                used_gb: 8.0,
                usage_percent: memory_pct,
            },
            disk_io: DiskIo {
                read_iops: 0.0,
                write_iops: 0.0,
            },
            network: NetworkIo {
                sent_bytes_per_sec: 0.0,
                recv_bytes_per_sec: 0.0,
            },
            disk_usage_percent: disk_pct,
            server_id: None,
        }
    }

    #[test]
    fn quiet_record_raises_nothing() {
        let alerts = check_thresholds(&AlertThresholds::default(), &record(10.0, 50.0, 40.0));
        assert!(alerts.is_empty());
    }

    #[test]
    fn each_threshold_fires_independently() {
        let thresholds = AlertThresholds::default();

        let alerts = check_thresholds(&thresholds, &record(95.0, 50.0, 40.0));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::Cpu);
        assert_eq!(alerts[0].timestamp, "2024-03-15 08:00:00");

        let alerts = check_thresholds(&thresholds, &record(10.0, 95.0, 90.0));
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].kind, AlertKind::Memory);
        assert_eq!(alerts[1].kind, AlertKind::Disk);
    }

    #[test]
    fn value_exactly_at_threshold_does_not_fire() {
        let alerts = check_thresholds(&AlertThresholds::default(), &record(80.0, 90.0, 85.0));
        assert!(alerts.is_empty());
    }

    #[test]
    fn alert_log_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("hostpulse-alerts-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("alerts.json");

        let mut log = AlertLog::load(&path);
        assert!(log.all().is_empty());
        log.append(check_thresholds(
            &AlertThresholds::default(),
            &record(95.0, 50.0, 40.0),
        ));
        assert_eq!(log.all().len(), 1);

        let reloaded = AlertLog::load(&path);
        assert_eq!(reloaded.all().len(), 1);
        assert_eq!(reloaded.all()[0].kind, AlertKind::Cpu);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
