//! colony-sync: headless field node for the colony dataset
//!
//! Wires the providers together from a TOML config:
//! - `show`: print the local collection
//! - `sync`: mirror the colony server into the local files until Ctrl-C
//! - `locate`: convert a GPS fix into site coordinates

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use nalgebra::Point2;
use tracing::{error, info, warn};

use colony_sync::provider::ColonyProvider;
use colony_sync::{
    transform, ColonyListener, ColonySet, CompositeProvider, Config, LocalStoreProvider,
    NetworkProvider, TaskPool,
};

/// How long `sync` waits for in-flight writes before cancelling them
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "colony-sync")]
#[command(about = "Keep a colony dataset in sync between a server and local files")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "colony-sync.toml")]
    config: String,

    /// Data directory holding colonies.csv / colonies.json
    #[arg(short, long, env = "COLONY_DATA_DIR")]
    data_dir: Option<String>,

    /// Colony server as host:port (overrides config file)
    #[arg(long, env = "COLONY_SERVER")]
    server: Option<String>,

    /// Log filter, e.g. "colony_sync=debug"
    #[arg(long)]
    log: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every colony in the local store
    Show,

    /// Mirror the server into the local store until interrupted
    Sync,

    /// Convert GPS coordinates to site coordinates
    #[command(allow_negative_numbers = true)]
    Locate {
        longitude: f64,
        latitude: f64,
    },
}

/// Logs change notifications and connection notices.
struct ChangeLogger {
    source: &'static str,
}

impl ColonyListener for ChangeLogger {
    fn colonies_changed(&self, colonies: &Arc<ColonySet>) {
        info!(source = self.source, colonies = colonies.len(), "Colonies changed");
    }

    fn notice(&self, message: &str) {
        warn!(source = self.source, "{message}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = match &cli.log {
        Some(directive) => tracing_subscriber::EnvFilter::try_new(directive)?,
        None => tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("colony_sync=info".parse()?),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Config file: {}", cli.config);
    let mut config = Config::load(std::path::Path::new(&cli.config))?;

    // Apply CLI overrides
    if let Some(data_dir) = cli.data_dir {
        config.node.data_dir = PathBuf::from(data_dir);
    }
    if let Some(server) = cli.server {
        config.server.set_address(&server)?;
    }
    info!("Data dir: {}", config.node.data_dir.display());

    match cli.command {
        Command::Show => show(&config).await,
        Command::Sync => run_sync(&config).await,
        Command::Locate {
            longitude,
            latitude,
        } => locate(&config, longitude, latitude).await,
    }
}

async fn show(config: &Config) -> anyhow::Result<()> {
    let pool = TaskPool::current(config.sync.max_concurrent_tasks)?;
    let local = LocalStoreProvider::open(&config.node.data_dir, pool.clone());

    let colonies = local.colonies();
    for colony in colonies.iter() {
        println!("{colony}");
    }
    println!("{} colonies", colonies.len());

    pool.drain().await;
    Ok(())
}

async fn run_sync(config: &Config) -> anyhow::Result<()> {
    let pool = TaskPool::current(config.sync.max_concurrent_tasks)?;
    let local = LocalStoreProvider::open(&config.node.data_dir, pool.clone());

    if !config.server.enabled {
        info!("Server disabled, serving the local store only");
        local.hub().add_listener(Arc::new(ChangeLogger { source: "local" }));
        tokio::signal::ctrl_c().await?;
        return finish(&pool, &local).await;
    }

    let network = NetworkProvider::new(config.server.clone(), pool.clone());
    network.hub().add_listener(Arc::new(ChangeLogger { source: "server" }));
    let provider = CompositeProvider::new(local, network);
    provider.hub().add_listener(Arc::new(ChangeLogger { source: "local" }));

    info!(server = %provider.network().server_address(), "Starting sync");
    let initial_fetch = async {
        match provider.network().refresh().await {
            Ok(colonies) => {
                info!(colonies = colonies.len(), "Initial fetch complete, pushing merged collection");
                provider.update_colonies();
            }
            Err(e) => error!(error = %e, "Initial fetch failed"),
        }
    };

    tokio::select! {
        _ = initial_fetch => {
            tokio::signal::ctrl_c().await?;
        }
        signal = tokio::signal::ctrl_c() => signal?,
    }

    info!("Interrupted, shutting down");
    finish(&pool, provider.local()).await
}

async fn finish(pool: &TaskPool, local: &LocalStoreProvider) -> anyhow::Result<()> {
    if tokio::time::timeout(DRAIN_TIMEOUT, pool.drain()).await.is_err() {
        warn!(in_flight = pool.in_flight(), "Background work still running, cancelling");
    }
    pool.shutdown().await;
    local.persist().await?;
    info!("Shutdown complete");
    Ok(())
}

async fn locate(config: &Config, longitude: f64, latitude: f64) -> anyhow::Result<()> {
    let pool = TaskPool::current(config.sync.max_concurrent_tasks)?;
    let local = LocalStoreProvider::open(&config.node.data_dir, pool.clone());
    let colonies = local.colonies();

    let transformer = transform::from_calibration(&config.calibration, &colonies)?;
    let (x, y) = transformer.to_local(longitude, latitude);
    println!("({longitude}, {latitude}) -> ({x:.1}, {y:.1}) [{:?}]", transformer.kind());

    let here = Point2::new(x, y);
    let nearest = colonies
        .iter()
        .map(|colony| (colony, nalgebra::distance(&here, &Point2::new(colony.x(), colony.y()))))
        .min_by(|a, b| a.1.total_cmp(&b.1));
    match nearest {
        Some((colony, meters)) => println!("nearest: {colony} ({meters:.1} m)"),
        None => println!("no colonies loaded"),
    }

    pool.drain().await;
    Ok(())
}
