use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use stepup_sync::clock::SystemClock;
use stepup_sync::commands;
use stepup_sync::notify::LogNotifier;
use stepup_sync::storage::FileStorage;
use stepup_sync::{ApiClient, Config, OfflineService};

#[derive(Parser, Debug)]
#[command(name = "stepup-sync", about = "Offline queue and cache for the Step Up Naija API")]
struct Args {
    /// API base URL
    #[arg(long, env = "STEPUP_API_URL")]
    api_url: Option<String>,

    /// Directory holding the persisted queue and cache
    #[arg(long, env = "STEPUP_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show connectivity, queue length and pending operations
    Status,
    /// Queue an operation for later replay
    Enqueue {
        /// create, update, delete or read
        kind: String,
        target: String,
        #[arg(long)]
        payload: Option<String>,
    },
    /// Network-aware request (served from cache or queued when offline)
    Request {
        target: String,
        #[arg(long, default_value = "GET")]
        method: String,
        #[arg(long)]
        payload: Option<String>,
    },
    /// Replay queued operations once
    Drain,
    /// Run the background sync daemon until ctrl-c
    Run {
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Clear the queue and cache
    Clear,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    env_logger::init();

    let args = Args::parse();

    let mut config = Config::from_env();
    if let Some(url) = args.api_url {
        config.api_url = url;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    if let Err(e) = run(config, args.command).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config, command: Command) -> Result<(), String> {
    let storage = FileStorage::open(&config.data_dir).map_err(|e| {
        format!(
            "Failed to open data directory {}: {}",
            config.data_dir.display(),
            e
        )
    })?;
    log::debug!("Using data directory {}", storage.dir().display());

    let network = ApiClient::new(&config.api_url).with_health_path(&config.health_path);
    let service = Arc::new(OfflineService::create(
        Arc::new(storage),
        Arc::new(SystemClock),
        network,
        Arc::new(LogNotifier),
        &config,
    ));

    let svc = service.as_ref();
    match command {
        Command::Status => commands::status(svc).await,
        Command::Enqueue {
            kind,
            target,
            payload,
        } => commands::enqueue(svc, &kind, &target, payload.as_deref()),
        Command::Request {
            target,
            method,
            payload,
        } => commands::request(svc, &target, &method, payload.as_deref()).await,
        Command::Drain => commands::drain(svc).await,
        Command::Run { interval_secs } => {
            let poll = interval_secs
                .map(Duration::from_secs)
                .unwrap_or(config.sync_interval);
            commands::run(service.clone(), poll, config.probe_interval).await
        }
        Command::Clear => commands::clear(svc),
    }
}
