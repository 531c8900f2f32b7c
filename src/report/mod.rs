//! CSV export and date-filtered reports over collected history.
//!
//! Pure formatting — no aggregation happens here. Rows carry the fixed
//! column order expected by downstream tooling, numerics rounded to two
//! decimals.

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::metrics::MetricsRecord;

pub const CSV_HEADER: &str =
    "datetime,cpu_usage,memory_total_gb,memory_used_gb,memory_usage_percent,disk_read_iops,disk_write_iops";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Daily,
    Weekly,
    Monthly,
}

impl Granularity {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

/// Report failures, kept separate from the "no matching data" outcome
/// which callers receive as `Ok(None)`.
#[derive(Debug)]
pub enum ReportError {
    UnknownGranularity(String),
    BadDate(String),
    Io(String),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownGranularity(g) => write!(f, "Unknown report type: {}", g),
            Self::BadDate(d) => write!(f, "Invalid date: {}", d),
            Self::Io(e) => write!(f, "Report I/O failed: {}", e),
        }
    }
}

impl std::error::Error for ReportError {}

/// Render records as CSV with the fixed header row.
pub fn render_csv(records: &[MetricsRecord]) -> String {
    let mut out = String::with_capacity(64 * (records.len() + 1));
    out.push_str(CSV_HEADER);
    out.push('\n');
    for r in records {
        out.push_str(&format!(
            "{},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}\n",
            r.datetime,
            r.cpu,
            r.memory.total_gb,
            r.memory.used_gb,
            r.memory.usage_percent,
            r.disk_io.read_iops,
            r.disk_io.write_iops,
        ));
    }
    out
}

fn write_csv(path: &Path, records: &[MetricsRecord]) -> Result<(), ReportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ReportError::Io(e.to_string()))?;
    }
    let mut file = std::fs::File::create(path).map_err(|e| ReportError::Io(e.to_string()))?;
    file.write_all(render_csv(records).as_bytes())
        .map_err(|e| ReportError::Io(e.to_string()))
}

/// Export the full history to `<dir>/metrics_log_<stamp>.csv`.
/// `Ok(None)` when there is nothing to export.
pub fn export_history(dir: &Path, records: &[MetricsRecord]) -> Result<Option<PathBuf>, ReportError> {
    if records.is_empty() {
        return Ok(None);
    }
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("metrics_log_{}.csv", stamp));
    write_csv(&path, records)?;
    Ok(Some(path))
}

/// Select the records covered by `date` at the given granularity.
///
/// Daily matches the `YYYY-MM-DD` prefix, weekly the ISO week containing
/// the date (Monday start), monthly the `YYYY-MM` prefix.
pub fn filter_records<'a>(
    records: &'a [MetricsRecord],
    date: &str,
    granularity: Granularity,
) -> Result<Vec<&'a MetricsRecord>, ReportError> {
    match granularity {
        Granularity::Daily => Ok(records
            .iter()
            .filter(|r| r.datetime.starts_with(date))
            .collect()),
        Granularity::Monthly => {
            let month = date
                .get(..7)
                .ok_or_else(|| ReportError::BadDate(date.to_string()))?;
            Ok(records
                .iter()
                .filter(|r| r.datetime.starts_with(month))
                .collect())
        }
        Granularity::Weekly => {
            let day = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .map_err(|e| ReportError::BadDate(format!("{}: {}", date, e)))?;
            let week_start = day - Duration::days(day.weekday().num_days_from_monday() as i64);
            let week_end = week_start + Duration::days(7);
            Ok(records
                .iter()
                .filter(|r| {
                    r.datetime
                        .get(..10)
                        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                        .map(|d| d >= week_start && d < week_end)
                        .unwrap_or(false)
                })
                .collect())
        }
    }
}

/// Generate `<dir>/report_<type>_<stamp>.csv` from the filtered subset.
/// `Ok(None)` when the filter matches no records.
pub fn generate_report(
    dir: &Path,
    records: &[MetricsRecord],
    date: &str,
    granularity: &str,
) -> Result<Option<PathBuf>, ReportError> {
    let granularity = Granularity::parse(granularity)
        .ok_or_else(|| ReportError::UnknownGranularity(granularity.to_string()))?;
    let subset: Vec<MetricsRecord> = filter_records(records, date, granularity)?
        .into_iter()
        .cloned()
        .collect();
    if subset.is_empty() {
        return Ok(None);
    }
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("report_{}_{}.csv", granularity.as_str(), stamp));
    write_csv(&path, &subset)?;
    Ok(Some(path))
}

/// A previously generated report file on disk.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub report_type: String,
    pub created_at: String,
}

/// List generated reports under `dir`, newest first.
pub fn list_reports(dir: &Path) -> Vec<ReportEntry> {
    let mut reports = Vec::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return reports;
    };
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(stem) = name.strip_suffix(".csv") else {
            continue;
        };
        // report_<type>_<YYYYmmdd>_<HHMMSS>.csv
        let parts: Vec<&str> = stem.split('_').collect();
        if parts.len() < 4 || parts[0] != "report" {
            continue;
        }
        let report_type = parts[1].to_string();
        let stamp = parts[2..].join("_");
        let Ok(created) = NaiveDateTime::parse_from_str(&stamp, "%Y%m%d_%H%M%S") else {
            continue;
        };
        reports.push(ReportEntry {
            id: stem.to_string(),
            report_type,
            created_at: created.format("%Y-%m-%d %H:%M:%S").to_string(),
        });
    }
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    reports
}

/// Resolve a report id back to its file, rejecting path traversal.
pub fn report_file(dir: &Path, id: &str) -> Option<PathBuf> {
    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return None;
    }
    let path = dir.join(format!("{}.csv", id));
    path.exists().then_some(path)
}
