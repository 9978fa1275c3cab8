use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use coinledger_cache::AssetCache;
use coinledger_core::UserStore;
use coinledger_data::FileUserStore;
use coinledger_server::config::SourceKind;
use coinledger_server::Config;
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "coinledger")]
#[command(about = "Simulated crypto trading server with per-user wallets")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Path to a TOML config file
    #[arg(short, long, env = "COINLEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// CoinAPI key (overrides the config file)
    #[arg(long, env = "COINAPI_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Read the catalog from this CSV file instead of CoinAPI
    #[arg(long)]
    csv: Option<PathBuf>,

    /// User database file (overrides the config file)
    #[arg(long)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading server
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(short, long)]
        port: Option<u16>,

        /// Cache time-to-live in minutes (negative means default)
        #[arg(long, allow_hyphen_values = true)]
        ttl_minutes: Option<i64>,

        /// Number of assets kept in the cache (negative means default)
        #[arg(long, allow_hyphen_values = true)]
        limit: Option<i64>,
    },

    /// Fetch the catalog once and print the cached assets
    Assets {
        /// Number of assets to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },

    /// Load the user database and report how many users it holds
    CheckStore,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    if cli.json_logs {
        fmt().json().with_env_filter(filter).with_target(false).init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(key) = cli.api_key {
        config.source.api_key = key;
    }
    if let Some(path) = cli.csv {
        config.source.kind = SourceKind::Csv;
        config.source.csv_path = Some(path);
    }
    if let Some(path) = cli.store {
        config.store.path = path;
    }

    match cli.command {
        Commands::Serve {
            host,
            port,
            ttl_minutes,
            limit,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(ttl) = ttl_minutes {
                config.cache.ttl_minutes = ttl;
            }
            if let Some(limit) = limit {
                config.cache.limit = limit;
            }
            serve(config).await?;
        }
        Commands::Assets { limit } => {
            list_assets(&config, limit).await?;
        }
        Commands::CheckStore => {
            let store = FileUserStore::open(&config.store.path).with_context(|| {
                format!("Failed to load users from {}", config.store.path.display())
            })?;
            println!("{}: {} user(s)", store.path().display(), store.len());
        }
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    if config.source.kind == SourceKind::Coinapi && config.source.api_key.is_empty() {
        tracing::warn!("No CoinAPI key configured; catalog requests will be rejected");
    }

    let users: Box<dyn UserStore> = Box::new(
        FileUserStore::open(&config.store.path).with_context(|| {
            format!("Failed to load users from {}", config.store.path.display())
        })?,
    );
    let source = config.source.build()?;

    tracing::info!(
        bind = %config.server.bind_addr(),
        source = ?config.source.kind,
        ttl_minutes = config.cache.ttl_minutes,
        limit = config.cache.limit,
        "Starting coinledger server"
    );
    coinledger_server::start_server(&config, users, source)
        .await
        .with_context(|| format!("Server failed on {}", config.server.bind_addr()))?;
    Ok(())
}

async fn list_assets(config: &Config, limit: i64) -> Result<()> {
    let mut cache = AssetCache::new(config.source.build()?, config.cache.ttl_minutes, limit);
    let assets = cache.get_assets().await.context("Failed to fetch catalog")?;

    if assets.is_empty() {
        println!("No crypto assets in catalog");
        return Ok(());
    }
    println!("{:<10} {:<30} {:>20}", "ID", "NAME", "PRICE (USD)");
    for asset in assets {
        println!("{:<10} {:<30} {:>20}", asset.id, asset.name, asset.price);
    }
    Ok(())
}
