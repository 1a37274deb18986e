//! unicloud-server binary entry point.
//!
//! Usage:
//! ```bash
//! unicloud-server --config unicloud.toml serve
//! unicloud-server client add laptop --key "ssh-ed25519 AAAA..." --share home
//! unicloud-server client threshold laptop 3600
//! unicloud-server refresh status
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sync_core::SystemClock;
use sync_types::{ClientName, ShareName, Threshold};
use tracing_subscriber::EnvFilter;
use unicloud_sync_server::config::Config;
use unicloud_sync_server::http::build_router;
use unicloud_sync_server::server::Unicloud;
use unicloud_sync_server::shares::DiskUsage;
use unicloud_sync_server::storage::SqliteStorage;

const DEFAULT_CONFIG: &str = "unicloud.toml";

/// Sync event tracking and freshness server.
#[derive(Parser, Debug)]
#[command(name = "unicloud-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: unicloud.toml if present)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server and background jobs
    Serve,

    /// Manage clients
    #[command(subcommand)]
    Client(ClientCommand),

    /// Manage shares
    #[command(subcommand)]
    Share(ShareCommand),

    /// Run one background job once
    #[command(subcommand)]
    Refresh(RefreshCommand),
}

#[derive(Subcommand, Debug)]
enum ClientCommand {
    /// Register a client pending activation
    Register {
        /// Client name
        name: String,
        /// Public key
        #[arg(long)]
        key: String,
        /// Share the client synchronizes
        #[arg(long)]
        share: String,
    },
    /// Add an active client
    Add {
        /// Client name
        name: String,
        /// Public key
        #[arg(long)]
        key: String,
        /// Share the client synchronizes
        #[arg(long)]
        share: String,
    },
    /// Activate a registered client
    Activate {
        /// Client name
        name: String,
    },
    /// Remove a client, keeping its events
    Remove {
        /// Client name
        name: String,
    },
    /// Set the freshness threshold in seconds (0 disables)
    Threshold {
        /// Client name
        name: String,
        /// Threshold in seconds
        seconds: u64,
    },
    /// Show a client summary
    Info {
        /// Client name
        name: String,
    },
    /// Evaluate a client now and cache the result
    Status {
        /// Client name
        name: String,
    },
    /// List clients
    List,
}

#[derive(Subcommand, Debug)]
enum ShareCommand {
    /// Add a share
    Add {
        /// Share name
        name: String,
        /// Location on disk
        path: PathBuf,
        /// Description
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Unregister a share; files on disk are kept
    Remove {
        /// Share name
        name: String,
    },
    /// Show one share
    Info {
        /// Share name
        name: String,
    },
    /// List shares with their last computed size
    List,
    /// Recompute the size of one share
    Refresh {
        /// Share name
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum RefreshCommand {
    /// Re-evaluate every client with a threshold
    Status,
    /// Recompute every share size
    Sizes,
    /// Clear old event logs
    Logs,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let engine = Arc::new(open_engine(config).await?);

    match cli.command {
        Commands::Serve => serve(engine).await?,
        Commands::Client(cmd) => client(&engine, cmd).await?,
        Commands::Share(cmd) => share(&engine, cmd).await?,
        Commands::Refresh(cmd) => refresh(&engine, cmd).await?,
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None if Path::new(DEFAULT_CONFIG).exists() => {
            Ok(Config::from_file(Path::new(DEFAULT_CONFIG))?)
        }
        None => {
            tracing::info!("No {} found, using defaults", DEFAULT_CONFIG);
            Ok(Config::default())
        }
    }
}

async fn open_engine(config: Config) -> Result<Unicloud> {
    let storage = SqliteStorage::new(&config.storage.database)
        .await
        .with_context(|| format!("Failed to open {}", config.storage.database.display()))?;

    Ok(Unicloud::new(
        config,
        Arc::new(storage),
        Arc::new(SystemClock),
        Arc::new(DiskUsage),
    ))
}

async fn serve(engine: Arc<Unicloud>) -> Result<()> {
    let jobs = engine.start().await.context("Startup recovery failed")?;

    let addr = engine.config().server.bind_address.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("unicloud-server v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);

    axum::serve(listener, build_router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    jobs.shutdown().await;
    tracing::info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn client(engine: &Unicloud, cmd: ClientCommand) -> Result<()> {
    let clients = engine.clients();
    match cmd {
        ClientCommand::Register { name, key, share } => {
            clients.register(&ClientName::new(name)?, &key, &share).await?;
        }
        ClientCommand::Add { name, key, share } => {
            clients.add(&ClientName::new(name)?, &key, &share).await?;
        }
        ClientCommand::Activate { name } => {
            clients.activate(&ClientName::new(name)?).await?;
        }
        ClientCommand::Remove { name } => {
            clients.remove(&ClientName::new(name)?).await?;
        }
        ClientCommand::Threshold { name, seconds } => {
            clients
                .set_threshold(&ClientName::new(name)?, Threshold::from_secs(seconds))
                .await?;
        }
        ClientCommand::Info { name } => {
            let info = clients.info(&ClientName::new(name)?).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        ClientCommand::Status { name } => {
            let name = ClientName::new(name)?;
            let cached = clients.cached_status(&name).await?;
            let live = engine.evaluator().evaluate(&name, engine.clock().now()).await?;
            engine.evaluator().update_cached_status(&name, live).await?;
            println!(
                "{}: {} (was {})",
                name,
                live,
                cached.map(|s| s.as_str()).unwrap_or("-")
            );
        }
        ClientCommand::List => {
            for c in clients.list().await? {
                let status = c.sync_status.map(|s| s.as_str()).unwrap_or("-");
                println!(
                    "{:<24} {:<10} {:>8} {}",
                    c.name.as_str(),
                    c.status.as_str(),
                    c.threshold.to_string(),
                    status
                );
            }
        }
    }
    Ok(())
}

async fn share(engine: &Unicloud, cmd: ShareCommand) -> Result<()> {
    match cmd {
        ShareCommand::Add {
            name,
            path,
            description,
        } => {
            engine
                .shares()
                .add(ShareName::new(name)?, &description, path)
                .await?;
        }
        ShareCommand::Remove { name } => {
            engine.shares().remove(&ShareName::new(name)?).await?;
        }
        ShareCommand::Info { name } => {
            let share = engine.shares().get(&ShareName::new(name)?).await?;
            println!("{}", serde_json::to_string_pretty(&share)?);
        }
        ShareCommand::List => {
            for s in engine.shares().list().await? {
                let size = s.size.map(|b| b.to_string()).unwrap_or_else(|| "-".into());
                println!("{:<24} {:>14} {}", s.name.as_str(), size, s.path.display());
            }
        }
        ShareCommand::Refresh { name } => {
            let size = engine.shares().refresh(&ShareName::new(name)?).await?;
            println!("{} bytes", size);
        }
    }
    Ok(())
}

async fn refresh(engine: &Unicloud, cmd: RefreshCommand) -> Result<()> {
    let scheduler = engine.scheduler();
    match cmd {
        RefreshCommand::Status => {
            let report = scheduler.refresh_sync_status().await?;
            println!(
                "{} clients, {} changed, {} failed",
                report.processed, report.updated, report.failed
            );
        }
        RefreshCommand::Sizes => {
            let report = scheduler.refresh_share_sizes().await?;
            println!("{} shares, {} failed", report.processed, report.failed);
        }
        RefreshCommand::Logs => {
            let pruned = scheduler.prune_logs().await?;
            println!("{} event logs cleared", pruned);
        }
    }
    Ok(())
}
