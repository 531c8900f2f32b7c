//! Sampling and windowed-aggregation engine.
//!
//! Converts raw, monotonically increasing OS counters into stable,
//! time-windowed rates and averages: a 60-second rolling window for CPU,
//! 300-second windows for disk IOPS, and per-counter rate trackers that
//! guard against zero-width intervals and counter resets. The collector
//! orchestrates one sampling cycle and appends the resulting record to a
//! retention-bounded history.

use chrono::TimeZone;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::alerting::{self, Alert, AlertLog, AlertThresholds};
use crate::report::{self, ReportError};
use crate::sampler::{CounterSource, DiskCounters, NetCounters};

/// CPU moving average window (seconds)
const CPU_WINDOW_SECS: f64 = 60.0;
/// Disk IOPS moving average window (seconds)
const DISK_WINDOW_SECS: f64 = 300.0;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Round to two decimals for presentation.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Current wall time as unix seconds.
pub fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn format_datetime(unix_secs: f64) -> String {
    chrono::Local
        .timestamp_opt(unix_secs as i64, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

// ─── Rolling window ───

/// One timestamped scalar reading. Owned by its window, dropped on eviction.
#[derive(Debug, Clone, Copy)]
struct Sample {
    timestamp: f64,
    value: f64,
}

/// Fixed-duration sample buffer. Retains only samples newer than
/// `duration_secs` relative to the latest `add` call and averages the rest.
#[derive(Debug)]
pub struct RollingWindow {
    duration_secs: f64,
    samples: Vec<Sample>,
}

impl RollingWindow {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            samples: Vec::new(),
        }
    }

    /// Append a reading at `now` and return the window average.
    ///
    /// Eviction is a filter over the whole buffer, not a front trim, so a
    /// skewed (out-of-order) timestamp cannot strand stale samples behind a
    /// newer one.
    pub fn add(&mut self, value: f64, now: f64) -> f64 {
        self.samples.push(Sample {
            timestamp: now,
            value,
        });
        self.samples
            .retain(|s| now - s.timestamp <= self.duration_secs);
        self.average()
    }

    /// Arithmetic mean of retained samples; 0 for an empty window.
    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.value).sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// ─── Rate tracking ───

/// Converts successive readings of a monotonically increasing counter into
/// a per-second rate. One tracker per counter stream.
#[derive(Debug)]
pub struct RateTracker {
    last_value: u64,
    last_time: f64,
}

impl RateTracker {
    pub fn new(initial_value: u64, now: f64) -> Self {
        Self {
            last_value: initial_value,
            last_time: now,
        }
    }

    /// Rate between the stored snapshot and `(current, now)`, rounded to
    /// two decimals and never negative.
    ///
    /// A zero or negative elapsed interval yields 0 and leaves the stored
    /// snapshot untouched, so the next delta is computed over a real
    /// interval. A counter reset (current < stored) also yields 0 but
    /// re-bases the snapshot on the new counter value.
    pub fn rate(&mut self, current: u64, now: f64) -> f64 {
        let delta_time = now - self.last_time;
        if delta_time <= 0.0 {
            return 0.0;
        }
        if current < self.last_value {
            self.last_value = current;
            self.last_time = now;
            return 0.0;
        }
        let rate = (current - self.last_value) as f64 / delta_time;
        self.last_value = current;
        self.last_time = now;
        round2(rate)
    }
}

// ─── Records ───

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryInfo {
    pub total_gb: f64,
    pub used_gb: f64,
    pub usage_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskIo {
    pub read_iops: f64,
    pub write_iops: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkIo {
    pub sent_bytes_per_sec: f64,
    pub recv_bytes_per_sec: f64,
}

/// One point-in-time snapshot of all tracked metrics. Immutable once
/// assembled; the unit of history storage and CSV export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsRecord {
    /// Local time, `%Y-%m-%d %H:%M:%S`
    pub datetime: String,
    /// 60-second moving average CPU usage, percent 0-100
    pub cpu: f64,
    pub memory: MemoryInfo,
    /// 5-minute moving average IOPS
    pub disk_io: DiskIo,
    pub network: NetworkIo,
    /// Root filesystem usage, percent 0-100
    pub disk_usage_percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
}

// ─── History ───

/// Retention policy for in-memory history: a hard record cap, optionally
/// combined with a maximum sample age.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

fn default_max_records() -> usize {
    10_000
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
            max_age_secs: None,
        }
    }
}

/// Ring buffer of collected records, bounded by a `RetentionPolicy`.
#[derive(Debug)]
pub struct History {
    entries: VecDeque<(f64, MetricsRecord)>,
    retention: RetentionPolicy,
}

impl History {
    pub fn new(retention: RetentionPolicy) -> Self {
        Self {
            entries: VecDeque::new(),
            retention,
        }
    }

    /// Append a record and evict whatever the retention policy no longer
    /// covers, oldest first.
    pub fn push(&mut self, at: f64, record: MetricsRecord) {
        self.entries.push_back((at, record));
        if let Some(max_age) = self.retention.max_age_secs {
            let cutoff = at - max_age as f64;
            while self
                .entries
                .front()
                .is_some_and(|(t, _)| *t < cutoff)
            {
                self.entries.pop_front();
            }
        }
        while self.entries.len() > self.retention.max_records {
            self.entries.pop_front();
        }
    }

    pub fn latest(&self) -> Option<&MetricsRecord> {
        self.entries.back().map(|(_, r)| r)
    }

    pub fn records(&self) -> Vec<MetricsRecord> {
        self.entries.iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ─── Collector ───

/// Owns all mutable sampling state: the rolling windows, the per-counter
/// rate trackers, the bounded history, and the alert log. One instance per
/// service; callers serialize access (single-writer discipline).
pub struct MetricsCollector {
    source: Box<dyn CounterSource + Send>,
    cpu_window: RollingWindow,
    read_iops_window: RollingWindow,
    write_iops_window: RollingWindow,
    disk_read: RateTracker,
    disk_write: RateTracker,
    net_sent: RateTracker,
    net_recv: RateTracker,
    history: History,
    thresholds: AlertThresholds,
    alert_log: AlertLog,
}

impl MetricsCollector {
    /// Prime the rate trackers with an initial counter snapshot so the
    /// first collection cycle computes a real delta.
    pub fn new(
        mut source: Box<dyn CounterSource + Send>,
        now: f64,
        retention: RetentionPolicy,
        thresholds: AlertThresholds,
        alert_log: AlertLog,
    ) -> Self {
        let disk = source.disk_counters().unwrap_or_else(|e| {
            warn!("Disk counters unavailable at startup: {}", e);
            DiskCounters::default()
        });
        let net = source.net_counters().unwrap_or_else(|e| {
            warn!("Network counters unavailable at startup: {}", e);
            NetCounters::default()
        });
        Self {
            cpu_window: RollingWindow::new(CPU_WINDOW_SECS),
            read_iops_window: RollingWindow::new(DISK_WINDOW_SECS),
            write_iops_window: RollingWindow::new(DISK_WINDOW_SECS),
            disk_read: RateTracker::new(disk.read_count, now),
            disk_write: RateTracker::new(disk.write_count, now),
            net_sent: RateTracker::new(net.bytes_sent, now),
            net_recv: RateTracker::new(net.bytes_recv, now),
            history: History::new(retention),
            thresholds,
            alert_log,
            source,
        }
    }

    /// Run one collection cycle against the wall clock.
    pub fn collect(&mut self, server_id: Option<&str>) -> MetricsRecord {
        self.collect_at(unix_now(), server_id)
    }

    /// Run one collection cycle at an explicit timestamp.
    ///
    /// CPU and memory reads cannot fail on the supported sources; a failed
    /// disk or network counter read is logged and contributes no window
    /// sample that cycle, reporting zero rates for this record only.
    pub fn collect_at(&mut self, now: f64, server_id: Option<&str>) -> MetricsRecord {
        let cpu = round2(self.cpu_window.add(self.source.cpu_percent(), now));

        let disk_io = match self.source.disk_counters() {
            Ok(counters) => {
                let read_rate = self.disk_read.rate(counters.read_count, now);
                let write_rate = self.disk_write.rate(counters.write_count, now);
                DiskIo {
                    read_iops: round2(self.read_iops_window.add(read_rate, now)),
                    write_iops: round2(self.write_iops_window.add(write_rate, now)),
                }
            }
            Err(e) => {
                warn!("Disk counter read failed, skipping sample: {}", e);
                DiskIo {
                    read_iops: 0.0,
                    write_iops: 0.0,
                }
            }
        };

        let network = match self.source.net_counters() {
            Ok(counters) => NetworkIo {
                sent_bytes_per_sec: self.net_sent.rate(counters.bytes_sent, now),
                recv_bytes_per_sec: self.net_recv.rate(counters.bytes_recv, now),
            },
            Err(e) => {
                warn!("Network counter read failed, skipping sample: {}", e);
                NetworkIo {
                    sent_bytes_per_sec: 0.0,
                    recv_bytes_per_sec: 0.0,
                }
            }
        };

        let mem = self.source.memory();
        let memory = MemoryInfo {
            total_gb: round2(mem.total_bytes as f64 / BYTES_PER_GB),
            used_gb: round2(mem.used_bytes as f64 / BYTES_PER_GB),
            usage_percent: round2(mem.percent),
        };
        let disk_usage_percent = round2(self.source.disk_usage_percent());

        let record = MetricsRecord {
            datetime: format_datetime(now),
            cpu,
            memory,
            disk_io,
            network,
            disk_usage_percent,
            server_id: server_id.map(|s| s.to_string()),
        };

        let alerts = alerting::check_thresholds(&self.thresholds, &record);
        if !alerts.is_empty() {
            for alert in &alerts {
                warn!("Threshold alert: {}", alert.message);
            }
            self.alert_log.append(alerts);
        }

        self.history.push(now, record.clone());
        record
    }

    pub fn latest(&self) -> Option<MetricsRecord> {
        self.history.latest().cloned()
    }

    pub fn history_records(&self) -> Vec<MetricsRecord> {
        self.history.records()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alert_log.all().to_vec()
    }

    /// Write the full history to a CSV file under `dir`. `Ok(None)` means
    /// there is nothing to export.
    pub fn export_history(&self, dir: &Path) -> Result<Option<PathBuf>, ReportError> {
        report::export_history(dir, &self.history.records())
    }

    /// Write a date-filtered report (daily/weekly/monthly) under `dir`.
    /// `Ok(None)` means the filter matched nothing.
    pub fn generate_report(
        &self,
        dir: &Path,
        date: &str,
        granularity: &str,
    ) -> Result<Option<PathBuf>, ReportError> {
        report::generate_report(dir, &self.history.records(), date, granularity)
    }
}
