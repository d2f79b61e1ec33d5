//! Roadlife - how close have you lived to a road, over time
//!
//! Module structure:
//! - `domain/` - Core types (residence intervals, reference lines, reports, errors)
//! - `services/` - The proximity pipeline (timeline, resolver, geodesic, aggregation)
//! - `io/` - External interfaces (postcode CSV, road GeoJSON, HTTP API, egress)
//! - `infra/` - Infrastructure (Config, Metrics)

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use roadlife::domain::ResidenceEntry;
use roadlife::infra::{Config, LogFormat, Metrics};
use roadlife::io::{
    start_api_server, ApiState, PostcodeTable, ReferenceLineProvider, ReportEgress, RoadCatalog,
};
use roadlife::services::ProximityEngine;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Roadlife - residence proximity to a reference road
#[derive(Parser, Debug)]
#[command(name = "roadlife", version, about)]
struct Args {
    /// Path to TOML configuration file (else CONFIG_FILE, else config/dev.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the roads in the catalog
    Roads,
    /// Compute proximity for one residence timeline and print the report
    Compute {
        /// Road identifier (file stem in the roads directory)
        #[arg(long)]
        road: String,
        /// JSON file with `[{"postcode": "...", "from": "YYYY-MM-DD"}, ...]`
        #[arg(long)]
        entries: PathBuf,
        /// Closing date of the last interval (default: today)
        #[arg(long)]
        today: Option<NaiveDate>,
        /// Divide printed distances by this factor (1000 for km)
        #[arg(long, default_value_t = 1.0)]
        factor: f64,
    },
    /// Run the HTTP API
    Serve,
}

fn init_tracing(format: LogFormat) {
    // Default: INFO, use RUST_LOG=debug for per-interval events
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

fn load_engine(config: &Config, metrics: Arc<Metrics>) -> anyhow::Result<ProximityEngine> {
    let postcodes = PostcodeTable::load(config.postcodes_file())?;
    let roads = RoadCatalog::load_dir(config.roads_dir())?;
    if roads.is_empty() {
        warn!(dir = %config.roads_dir(), "road_catalog_empty");
    }
    Ok(ProximityEngine::new(
        Arc::new(postcodes),
        Arc::new(roads),
        config.distance_settings(),
        metrics,
    ))
}

fn read_entries(path: &Path) -> anyhow::Result<Vec<ResidenceEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read entries file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse entries file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let loaded = Config::from_file(&config_path);
    init_tracing(loaded.as_ref().map(Config::log_format).unwrap_or_default());

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
            Config::default()
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("GIT_HASH"),
        config_file = %config.config_file(),
        roads_dir = %config.roads_dir(),
        postcodes_file = %config.postcodes_file(),
        distance_model = ?config.distance_settings().model,
        distance_mode = ?config.distance_settings().mode,
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());

    match args.command {
        Command::Roads => {
            let roads = RoadCatalog::load_dir(config.roads_dir())?;
            for feature in roads.features() {
                println!("{}\t{}", feature.id, feature.name);
            }
        }
        Command::Compute { road, entries, today, factor } => {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(format!("--factor must be a positive number, got {factor}").into());
            }
            let engine = load_engine(&config, metrics)?;
            let entries = read_entries(&entries)?;
            let today = today.unwrap_or_else(|| chrono::Local::now().date_naive());

            let report = engine.run(&road, &entries, today)?;
            if config.egress_enabled() {
                ReportEgress::new(config.egress_file()).write_report(&report);
            }
            println!("{}", serde_json::to_string_pretty(&report.scaled(factor))?);
        }
        Command::Serve => serve(config, metrics).await?,
    }

    Ok(())
}

async fn serve(config: Config, metrics: Arc<Metrics>) -> Result<(), BoxError> {
    let engine = Arc::new(load_engine(&config, metrics.clone())?);
    let mut state =
        ApiState::new(engine, metrics.clone(), config.site_id(), config.max_body_bytes());
    if config.egress_enabled() {
        state = state.with_egress(ReportEgress::new(config.egress_file()));
    }

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Periodic metrics report to the log
    let metrics_interval = config.metrics_interval_secs().max(1);
    let mut metrics_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => metrics.report().log(),
                _ = metrics_shutdown.changed() => break,
            }
        }
    });

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    if let Err(e) =
        start_api_server(config.bind_address(), config.port(), Arc::new(state), shutdown_rx).await
    {
        error!(error = %e, "api_server_error");
        return Err(e);
    }

    info!("roadlife shutdown complete");
    Ok(())
}
