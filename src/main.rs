//! CLI entry point for the journey tracker.
//!
//! Provides subcommands for running the per-line realtime trackers,
//! consuming identification events off the queue, importing datasets, and
//! one-shot vehicle identification.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use journey_tracker::config::LinesConfig;
use journey_tracker::identify::{Identifier, QueueConsumer, VehicleMonitorEvent};
use journey_tracker::import::{get_dataset, import_dataset};
use journey_tracker::infra::{MemoryDatastore, MemoryQueue, TflClient};
use journey_tracker::model::Service;
use journey_tracker::tracker::line::TFL_OPERATOR_REF;
use journey_tracker::tracker::{LineTracker, StopResolutionCache};

#[derive(Parser)]
#[command(name = "journey_tracker")]
#[command(about = "Reconciles live transit feeds into realtime journeys", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run realtime line trackers against the live arrivals feed
    Track {
        /// JSON file listing the lines to track (built-in set when omitted)
        #[arg(short, long)]
        config: Option<String>,

        /// Seconds between polling cycles per line
        #[arg(short, long, default_value_t = 30)]
        refresh_secs: u64,
    },
    /// Consume vehicle-monitor events from the queue and identify journeys
    Consume {
        /// Maximum deliveries taken per batch
        #[arg(short, long, default_value_t = 100)]
        batch_size: usize,
    },
    /// Import a registered dataset, publishing location events to the queue
    Import {
        /// Registered dataset identifier (e.g. "gb-bods-gtfs-rt")
        dataset: String,
    },
    /// Identify the journey a single vehicle is currently performing
    Identify {
        /// Line identifier (e.g. "269")
        #[arg(short, long)]
        line: String,

        /// Vehicle identifier / number plate
        #[arg(short, long)]
        vehicle: String,

        /// Source direction reference ("1" or "2"), if known
        #[arg(short, long, default_value = "")]
        direction: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/journey_tracker.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("journey_tracker.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse().unwrap()));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse().unwrap()));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Track {
            config,
            refresh_secs,
        } => {
            track(config, refresh_secs).await?;
        }
        Commands::Consume { batch_size } => {
            let tfl = Arc::new(tfl_client()?);
            let store = Arc::new(MemoryDatastore::new());
            let stop_cache = Arc::new(StopResolutionCache::new(store));
            let queue = Arc::new(MemoryQueue::new());

            let identifier = Identifier::new(tfl.clone()).with_matching(tfl, stop_cache);
            let consumer = QueueConsumer::new(queue, identifier);
            consumer.run(batch_size).await?;
        }
        Commands::Import { dataset } => {
            let dataset = get_dataset(&dataset)?;
            let queue = MemoryQueue::new();

            import_dataset(&dataset, &queue).await?;
            info!(
                pending = queue.pending_len().await,
                "location events published"
            );
        }
        Commands::Identify {
            line,
            vehicle,
            direction,
        } => {
            let tfl = Arc::new(tfl_client()?);
            let identifier = Identifier::new(tfl);

            let event = VehicleMonitorEvent {
                line,
                direction_ref: direction,
                number_plate: vehicle,
                origin_ref: String::new(),
                destination_ref: String::new(),
                origin_aimed_departure_time: String::new(),
            };

            match identifier.identify(&event).await {
                Ok(identification) => {
                    info!(journey = %identification.journey_identifier, "identified")
                }
                Err(identify_error) => error!(error = %identify_error, "failed to identify"),
            }
        }
    }

    Ok(())
}

fn tfl_client() -> Result<TflClient> {
    let app_key = std::env::var("TFL_APP_KEY").expect("TFL_APP_KEY must be set");
    TflClient::new(app_key)
}

/// Spawns one long-lived tracker task per configured line. A line whose
/// service or topology cannot be resolved fails alone; the rest keep
/// running.
async fn track(config: Option<String>, refresh_secs: u64) -> Result<()> {
    let lines = match config {
        Some(path) => LinesConfig::load(&path)?,
        None => LinesConfig::default_lines(),
    };

    let tfl = Arc::new(tfl_client()?);
    let store = Arc::new(MemoryDatastore::new());

    // The in-memory engine starts empty; seed the service records the
    // trackers resolve against. A database-backed engine would already
    // hold these from the scheduled-data import.
    for line in lines.lines() {
        store
            .add_service(Service {
                primary_identifier: format!("GB:TFLSERVICE:{}", line.id),
                service_name: line.name.clone(),
                operator_ref: TFL_OPERATOR_REF.to_string(),
                transport_type: line.mode.clone(),
            })
            .await;
    }

    let stop_cache = Arc::new(StopResolutionCache::new(store.clone()));

    let mut tasks = Vec::new();
    for line in lines.lines() {
        let tracker = LineTracker::new(
            line.clone(),
            Duration::from_secs(refresh_secs),
            store.clone(),
            tfl.clone(),
            tfl.clone(),
            stop_cache.clone(),
        );

        let line_id = line.id.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(tracker_error) = tracker.run().await {
                error!(line = %line_id, error = %tracker_error, "line tracker failed");
            }
        }));
    }

    info!(lines = tasks.len(), "line trackers started");

    for task in tasks {
        let _ = task.await;
    }

    Ok(())
}
