//! Mutant DNA detector - main entry point

use mutant_detector::config::{DetectorConfig, DispatchMode, StorageBackend};
use mutant_detector::dna::{detect, SequenceClassifier};
use mutant_detector::health::{BusHealthCheck, HealthCheckManager, StoreHealthCheck};
use mutant_detector::http::HttpServer;
use mutant_detector::observability::{health::HealthServer, init_default_logging};
use mutant_detector::service::{DetectionService, Dispatcher, PersistenceWorker, StatsService};
use mutant_detector::storage::{open_store, DnaStore};
use mutant_detector::transport::{MqttBus, Publisher};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::{
    signal,
    time::{sleep, Duration},
};
use tracing::{error, info, warn};

/// Buffered records between the bus and the persistence worker
const RECORD_CHANNEL_CAPACITY: usize = 256;

/// Mutant DNA detection service
#[derive(Parser)]
#[command(name = "mutantd")]
#[command(about = "Mutant DNA detection service")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "MUTANTD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve,
    /// Persist records received from the message bus
    Persist,
    /// Classify a single grid without starting the service
    Classify {
        /// JSON file holding `{"dna": [...]}` or a plain array of rows
        #[arg(long, value_name = "FILE", conflicts_with = "row")]
        file: Option<PathBuf>,

        /// One grid row; repeat for every row
        #[arg(long, value_name = "ROW")]
        row: Vec<String>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let result = match cli.command {
        Commands::Classify { file, row } => {
            classify_command(cli.config.as_deref(), file.as_deref(), row)
        }
        command => match load_configuration(cli.config.as_deref()) {
            Ok(Some(config)) => match command {
                Commands::Serve => serve(config).await,
                Commands::Persist => persist(config).await,
                Commands::Config { show } => handle_config_command(&config, show),
                Commands::Classify { .. } => Ok(()),
            },
            Ok(None) => {
                error!(
                    "No configuration file found. Please provide one with -c/--config or create mutant.toml"
                );
                process::exit(1);
            }
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                process::exit(1);
            }
        },
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

/// Load the given file, or the first default location that exists
fn load_configuration(
    config_path: Option<&Path>,
) -> Result<Option<DetectorConfig>, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(Some(DetectorConfig::load_from_file(path)?));
    }

    for path_str in ["mutant.toml", "config/mutant.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(Some(DetectorConfig::load_from_file(&path)?));
        }
    }

    Ok(None)
}

async fn serve(config: DetectorConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Starting mutant detector v{} as '{}'",
        env!("CARGO_PKG_VERSION"),
        config.service.id
    );

    let classifier = SequenceClassifier::new(config.policy()?);
    let store = open_store(&config.storage)?;

    let mut checks = HealthCheckManager::new();
    let (dispatcher, bus) = match config.dispatch.mode {
        DispatchMode::Direct => {
            checks.add_health_check(Box::new(StoreHealthCheck::new(store.clone())));
            (Dispatcher::Direct(store.clone()), None)
        }
        DispatchMode::Mqtt => {
            let mqtt = config.require_mqtt("dispatch mode \"mqtt\"")?;
            let mut bus = MqttBus::new(&config.service.id, mqtt.clone())?;
            bus.connect().await?;
            let bus = Arc::new(bus);
            let publisher: Arc<dyn Publisher> = bus.clone();
            checks.add_health_check(Box::new(BusHealthCheck::new(publisher.clone())));
            (Dispatcher::Publish(publisher), Some(bus))
        }
    };
    info!(
        mode = dispatcher.mode_name(),
        backend = store.backend_name(),
        "Dispatch configured"
    );

    let health = Arc::new(HealthServer::new(config.service.id.clone(), checks));
    let server = Arc::new(HttpServer::new(
        DetectionService::new(classifier, dispatcher),
        StatsService::new(store),
        health,
    ));

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server_task = tokio::spawn(server.run(config.http.socket_addr(), async {
        let _ = shutdown_rx.await;
    }));

    tokio::select! {
        result = &mut server_task => {
            // Only reached when the server could not start
            result??;
            return Ok(());
        }
        _ = wait_for_shutdown(bus.as_deref()) => {}
    }

    info!("Application shutdown initiated");
    let _ = shutdown_tx.send(());
    server_task.await??;

    if let Some(bus) = bus {
        if let Err(e) = bus.disconnect().await {
            warn!("Error during MQTT disconnect: {}", e);
        }
    }

    info!("Application shutdown complete");
    Ok(())
}

async fn persist(config: DetectorConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Starting persistence worker v{} as '{}'",
        env!("CARGO_PKG_VERSION"),
        config.service.id
    );

    if config.storage.backend == StorageBackend::Memory {
        warn!("Persisting to the in-memory store; records are lost on exit");
    }

    let store: Arc<dyn DnaStore> = open_store(&config.storage)?;
    let mqtt = config.require_mqtt("the persist command")?;

    let (record_tx, record_rx) = mpsc::channel(RECORD_CHANNEL_CAPACITY);
    let mut bus = MqttBus::new(&config.service.id, mqtt.clone())?;
    bus.set_record_sender(record_tx).await;
    bus.connect().await?;
    bus.subscribe_records().await?;

    let mut worker = PersistenceWorker::new(store, record_rx);
    let summary = worker.run(wait_for_shutdown(Some(&bus))).await;
    info!(
        persisted = summary.persisted,
        duplicates = summary.duplicates,
        failures = summary.failures,
        "Worker finished"
    );

    if let Err(e) = bus.disconnect().await {
        warn!("Error during MQTT disconnect: {}", e);
    }

    info!("Application shutdown complete");
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GridFile {
    Request { dna: Vec<String> },
    Rows(Vec<String>),
}

fn classify_command(
    config_path: Option<&Path>,
    file: Option<&Path>,
    rows: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    // The default policy applies when no configuration file exists
    let policy = match load_configuration(config_path)? {
        Some(config) => config.policy()?,
        None => Default::default(),
    };

    let rows = match file {
        Some(path) => match serde_json::from_str::<GridFile>(&std::fs::read_to_string(path)?)? {
            GridFile::Request { dna } | GridFile::Rows(dna) => dna,
        },
        None => rows,
    };

    let kind = detect(&SequenceClassifier::new(policy), &rows)?;
    println!("{kind}");
    Ok(())
}

fn handle_config_command(
    config: &DetectorConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Resolve on SIGINT, SIGTERM, or when the bus gives up reconnecting
async fn wait_for_shutdown(bus: Option<&MqttBus>) {
    let signals = async {
        match (
            signal::unix::signal(signal::unix::SignalKind::interrupt()),
            signal::unix::signal(signal::unix::SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
                }
            }
            _ => {
                warn!("Unix signal handlers unavailable, falling back to Ctrl-C");
                if let Err(e) = signal::ctrl_c().await {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
            }
        }
    };

    tokio::select! {
        _ = signals => {}
        _ = monitor_connection_health(bus) => {
            error!("MQTT connection permanently lost, shutting down...");
        }
    }
}

/// Resolve once the bus is permanently disconnected; never without a bus
async fn monitor_connection_health(bus: Option<&MqttBus>) {
    let Some(bus) = bus else {
        return std::future::pending().await;
    };

    loop {
        if bus.is_permanently_disconnected() {
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
}
