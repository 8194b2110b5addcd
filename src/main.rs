use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use ttlpool::config::{Config, LoggingConfig};
use ttlpool::workload::Workload;
use ttlpool::{ConnectionPool, Result, TtlPoolError};

#[cfg(feature = "fast-allocator")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "ttlpool")]
#[command(about = "Connection pool demo with TTL-based staleness eviction", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Target address host:port (overrides config)
    #[arg(long)]
    address: Option<String>,

    /// Pool size (overrides config)
    #[arg(long)]
    size: Option<usize>,

    /// Connection TTL in seconds (overrides config)
    #[arg(long)]
    ttl_secs: Option<u64>,

    /// Generate example configuration file
    #[arg(long, value_name = "FILE")]
    generate_config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle config generation
    if let Some(config_path) = args.generate_config {
        println!("Generating example configuration file: {:?}", config_path);
        Config::create_example(&config_path)?;
        println!("Example configuration file created successfully!");
        println!("Edit the file and run: ttlpool --config {:?}", config_path);
        return Ok(());
    }

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => Config::default(),
    };

    // Apply CLI overrides
    if let Some(address) = args.address {
        config.pool.address = address;
    }
    if let Some(size) = args.size {
        config.pool.size = size;
    }
    if let Some(ttl_secs) = args.ttl_secs {
        config.pool.ttl_secs = ttl_secs;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    init_logging(&config.logging)?;

    info!("ttlpool v{} starting", env!("CARGO_PKG_VERSION"));
    match &args.config {
        Some(path) => info!("Loaded configuration from: {:?}", path),
        None => info!("No configuration file specified, using defaults"),
    }

    let pool = Arc::new(ConnectionPool::from_settings(&config.pool).await?);
    let workload = Workload::from_settings(&config.workload);

    let result = tokio::select! {
        result = workload.run(Arc::clone(&pool)) => result,
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Received Ctrl+C, shutting down gracefully...");
            Ok(())
        }
    };

    pool.shutdown().await;

    if let Err(e) = &result {
        error!("Workload error: {}", e);
    }
    result
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_new(&logging.level)
        .map_err(|e| TtlPoolError::Config(format!("Invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);
    if logging.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    Ok(())
}
