//! veilwire-server binary: config, logging, storage, endpoint, shutdown.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use veilwire_crypto::dh::{DEFAULT_KEY_SIZE, DEFAULT_POOL_SIZE};
use veilwire_server::{AppStorage, Config, Dispatcher, TcpEndpoint, version};

const DEFAULT_CONFIG_FILE: &str = "data/app_config.toml";

#[derive(Parser)]
#[command(name = "veilwire-server", about = "veilwire end-to-end-encrypted messaging server", version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Don't start the server; just write a default config file and exit
    #[arg(short = 'i', long = "gen_conf_file")]
    gen_conf_file: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("✗ {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(|| DEFAULT_CONFIG_FILE.into());

    if cli.gen_conf_file {
        Config::default().write(&config_path)?;
        println!("wrote default config to {}", config_path.display());
        return Ok(());
    }

    let config = Config::load_or_init(&config_path)?;
    config.make_dirs()?;
    let _log_guard = init_logging(&config);

    let data_dir = config_path.parent().unwrap_or(Path::new("."));
    let version = version::load(data_dir);
    tracing::info!("service core initialized [{} p{}]", version.release, version.protocol);

    // Parameter generation is CPU-heavy; keep it off the reactor.
    let pool =
        tokio::task::spawn_blocking(|| veilwire_crypto::global_pool(DEFAULT_KEY_SIZE, DEFAULT_POOL_SIZE))
            .await?;

    let storage = Arc::new(AppStorage::open(&config.paths.storage_dir)?);
    let dispatcher = Arc::new(Dispatcher::new(storage));

    let shutdown = CancellationToken::new();
    let endpoint =
        TcpEndpoint::bind(&config.client_tcp_endpoint, dispatcher, pool, shutdown.clone()).await?;
    let server = tokio::spawn(endpoint.run());

    tokio::signal::ctrl_c().await?;
    tracing::info!("received interrupt, shutting down gracefully");
    shutdown.cancel();
    server.await?;
    Ok(())
}

// Console plus a daily-rotated file in the configured logs dir. The
// returned guard must live as long as the process logs.
fn init_logging(config: &Config) -> tracing_appender::non_blocking::WorkerGuard {
    let file = tracing_appender::rolling::daily(&config.paths.logs_dir, "log");
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();
    guard
}
