//! REST API for metrics, CSV export, and report generation.

use actix_files::NamedFile;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpRequest, HttpResponse, web};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::ServerEntry;
use crate::metrics::MetricsCollector;
use crate::report::{self, ReportError};

/// Shared application state. The collector holds all mutable sampling
/// state and is serialized behind one mutex; handlers only read.
pub struct AppState {
    pub collector: Mutex<MetricsCollector>,
    pub servers: HashMap<String, ServerEntry>,
    pub data_dir: PathBuf,
}

impl AppState {
    pub fn exports_dir(&self) -> PathBuf {
        self.data_dir.join("exports")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/metrics", web::get().to(get_metrics))
        .route("/api/history", web::get().to(get_history))
        .route("/api/export-csv", web::get().to(export_csv))
        .route("/api/generate-report", web::post().to(generate_report))
        .route("/api/reports", web::get().to(list_reports))
        .route("/api/reports/{id}/download", web::get().to(download_report))
        .route("/api/alerts", web::get().to(get_alerts))
        .route("/api/servers", web::get().to(get_servers));
}

/// Serve a generated CSV as an attachment download.
fn serve_csv(req: &HttpRequest, path: PathBuf) -> HttpResponse {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "metrics.csv".to_string());
    match NamedFile::open(&path) {
        Ok(file) => file
            .set_content_disposition(ContentDisposition {
                disposition: DispositionType::Attachment,
                parameters: vec![DispositionParam::Filename(filename)],
            })
            .into_response(req),
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Cannot open export file: {}", e)
        })),
    }
}

// ─── Metrics API ───

/// GET /api/metrics — latest collected record
pub async fn get_metrics(state: web::Data<AppState>) -> HttpResponse {
    let collector = state.collector.lock().unwrap();
    match collector.latest() {
        Some(record) => HttpResponse::Ok().json(record),
        None => HttpResponse::ServiceUnavailable().json(serde_json::json!({
            "error": "No metrics collected yet"
        })),
    }
}

/// GET /api/history — all retained records, oldest first
pub async fn get_history(state: web::Data<AppState>) -> HttpResponse {
    let records = state.collector.lock().unwrap().history_records();
    HttpResponse::Ok().json(records)
}

/// GET /api/alerts — persisted alert list
pub async fn get_alerts(state: web::Data<AppState>) -> HttpResponse {
    let alerts = state.collector.lock().unwrap().alerts();
    HttpResponse::Ok().json(alerts)
}

/// GET /api/servers — configured server registry
pub async fn get_servers(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(&state.servers)
}

// ─── Export / reports API ───

/// GET /api/export-csv — download the full history as CSV
pub async fn export_csv(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let result = {
        let collector = state.collector.lock().unwrap();
        collector.export_history(&state.exports_dir())
    };
    match result {
        Ok(Some(path)) => serve_csv(&req, path),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "No data available"
        })),
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": e.to_string()
        })),
    }
}

#[derive(Deserialize)]
pub struct ReportRequest {
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub report_type: Option<String>,
}

/// POST /api/generate-report — build and download a daily/weekly/monthly report
pub async fn generate_report(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<ReportRequest>,
) -> HttpResponse {
    let (Some(date), Some(report_type)) = (&body.date, &body.report_type) else {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "date and type are required"
        }));
    };

    let result = {
        let collector = state.collector.lock().unwrap();
        collector.generate_report(&state.reports_dir(), date, report_type)
    };
    match result {
        Ok(Some(path)) => serve_csv(&req, path),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": format!("No data available for {} report on {}", report_type, date)
        })),
        Err(e @ ReportError::UnknownGranularity(_)) | Err(e @ ReportError::BadDate(_)) => {
            HttpResponse::BadRequest().json(serde_json::json!({ "error": e.to_string() }))
        }
        Err(e) => HttpResponse::InternalServerError().json(serde_json::json!({
            "error": e.to_string()
        })),
    }
}

/// GET /api/reports — previously generated reports, newest first
pub async fn list_reports(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(report::list_reports(&state.reports_dir()))
}

/// GET /api/reports/{id}/download — fetch a prior report by id
pub async fn download_report(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> HttpResponse {
    let id = path.into_inner();
    match report::report_file(&state.reports_dir(), &id) {
        Some(path) => serve_csv(&req, path),
        None => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Report not found"
        })),
    }
}

/// GET / — minimal status page
pub async fn index() -> HttpResponse {
    HttpResponse::Ok().content_type("text/html").body(concat!(
        "<!DOCTYPE html><html><head><title>HostPulse</title></head><body>",
        "<h1>HostPulse</h1>",
        "<p>Host metrics collection and reporting service.</p>",
        "<ul>",
        "<li><a href=\"/api/metrics\">/api/metrics</a></li>",
        "<li><a href=\"/api/history\">/api/history</a></li>",
        "<li><a href=\"/api/alerts\">/api/alerts</a></li>",
        "<li><a href=\"/api/export-csv\">/api/export-csv</a></li>",
        "<li><a href=\"/api/reports\">/api/reports</a></li>",
        "</ul></body></html>",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{AlertLog, AlertThresholds};
    use crate::metrics::RetentionPolicy;
    use crate::sampler::DiskCounters;
    use crate::sampler::testing::ScriptedSource;
    use actix_web::{App, test};
    use std::sync::{Arc, Mutex as StdMutex};

    fn test_state(
        name: &str,
    ) -> (
        web::Data<AppState>,
        Arc<StdMutex<crate::sampler::testing::SourceState>>,
    ) {
        let data_dir = std::env::temp_dir().join(format!("hostpulse-api-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&data_dir);
        let (source, handle) = ScriptedSource::new();
        let collector = MetricsCollector::new(
            Box::new(source),
            0.0,
            RetentionPolicy::default(),
            AlertThresholds::default(),
            AlertLog::load(data_dir.join("alerts.json")),
        );
        let state = web::Data::new(AppState {
            collector: Mutex::new(collector),
            servers: crate::config::load_servers(&data_dir.join("servers.json")),
            data_dir,
        });
        (state, handle)
    }

    #[actix_web::test]
    async fn metrics_unavailable_until_first_sample() {
        let (state, handle) = test_state("metrics");
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/metrics").to_request(),
        )
        .await;
        assert_eq!(resp.status(), 503);

        handle.lock().unwrap().cpu = 12.5;
        handle.lock().unwrap().disk = Ok(DiskCounters {
            read_count: 100,
            write_count: 50,
        });
        state.collector.lock().unwrap().collect_at(10.0, Some("local"));

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/metrics").to_request(),
        )
        .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["cpu"], 12.5);
        assert_eq!(body["server_id"], "local");
    }

    #[actix_web::test]
    async fn export_with_no_history_is_404() {
        let (state, _handle) = test_state("export");
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/export-csv").to_request(),
        )
        .await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn generate_report_requires_date_and_type() {
        let (state, _handle) = test_state("report-params");
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/generate-report")
                .set_json(serde_json::json!({ "date": "2024-03-15" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn generate_report_rejects_unknown_type() {
        let (state, _handle) = test_state("report-type");
        state.collector.lock().unwrap().collect_at(10.0, None);
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/generate-report")
                .set_json(serde_json::json!({ "date": "2024-03-15", "type": "hourly" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Unknown report type: hourly");
    }

    #[actix_web::test]
    async fn servers_registry_lists_local() {
        let (state, _handle) = test_state("servers");
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/api/servers").to_request(),
        )
        .await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["local"]["host"], "localhost");
    }
}
