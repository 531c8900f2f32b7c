//! HostPulse — host metrics collection and reporting service
//!
//! A small monitoring daemon that:
//! - Samples CPU, memory, disk I/O, and network counters on a fixed cadence
//! - Smooths readings through rolling windows (60s CPU, 5min disk IOPS)
//! - Keeps retention-bounded history with CSV export and dated reports
//! - Raises threshold alerts and persists them as JSON
//! - Serves the latest metrics over an HTTP API

mod alerting;
mod api;
mod config;
mod metrics;
mod report;
mod sampler;

use actix_web::{App, HttpServer, web};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// HostPulse — host metrics collection and reporting
#[derive(Parser)]
#[command(name = "hostpulse", version, about = "Host metrics collection and reporting service")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, default_value_t = 5001)]
    port: u16,

    /// Bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Configuration file (TOML)
    #[arg(short, long, default_value = "config/hostpulse.toml")]
    config: PathBuf,

    /// Directory for exports, reports, and the alert log
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hostpulse=info".parse().unwrap())
                .add_directive("actix_web=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::Config::load(&cli.config);
    let servers = config::load_servers(&cli.config.with_file_name("servers.json"));

    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    info!("");
    info!("  HostPulse v{}", env!("CARGO_PKG_VERSION"));
    info!("  ──────────────────────────────────");
    info!("  Hostname:   {}", hostname);
    info!("  Dashboard:  http://{}:{}", cli.bind, cli.port);
    info!("  Sampling:   every {}s", config.sampling.interval_secs);
    info!("  Retention:  {} records max", config.retention.max_records);
    info!("");

    let source = sampler::SystemCounterSource::new();
    let alert_log = alerting::AlertLog::load(cli.data_dir.join("alerts.json"));
    let collector = metrics::MetricsCollector::new(
        Box::new(source),
        metrics::unix_now(),
        config.retention,
        config.thresholds,
        alert_log,
    );

    let app_state = web::Data::new(api::AppState {
        collector: Mutex::new(collector),
        servers,
        data_dir: cli.data_dir.clone(),
    });

    // Background: fixed-interval sampling, decoupled from request arrival.
    // Handlers only read the latest record, so client poll frequency never
    // affects sample density.
    let sampler_state = app_state.clone();
    let interval = Duration::from_secs(config.sampling.interval_secs.max(1));
    tokio::spawn(async move {
        loop {
            {
                let mut collector = sampler_state.collector.lock().unwrap();
                collector.collect(Some("local"));
            }
            tokio::time::sleep(interval).await;
        }
    });

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(api::configure)
            .route("/", web::get().to(api::index))
    })
    .bind(format!("{}:{}", cli.bind, cli.port))?
    .run()
    .await
}
