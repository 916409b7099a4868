use clap::{Parser, Subcommand};
use std::sync::Arc;
use teller::adapters::PostgresStore;
use teller::config::AppConfig;
use teller::error::Result;
use teller::exchange::{CapturedAmountConverter, PaperExchange};
use teller::services::{FlusherConfig, TradeFlusher};
use teller::trader::{TradeQueues, Trader};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "teller")]
#[command(version = "0.1.0")]
#[command(about = "Trade consolidation and execution engine for cash-machine fleets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config directory
    #[arg(short, long, default_value = "config")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the flush scheduler
    Run,
    /// Run database migrations and exit
    Migrate,
    /// Flush all pending markets once and exit
    Flush,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config)?;
    init_logging(&config);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&config).await,
        Commands::Migrate => migrate(&config).await,
        Commands::Flush => flush_once(&config).await,
    }
}

async fn run(config: &AppConfig) -> Result<()> {
    let store = Arc::new(connect(config).await?);
    store.migrate().await?;

    let trader = Arc::new(build_trader(config, store));
    let flusher = TradeFlusher::new(
        trader,
        FlusherConfig {
            interval_secs: config.trader.flush_interval_secs,
        },
    );
    flusher.start();

    shutdown_signal().await;
    flusher.stop();
    info!("Shutting down");
    Ok(())
}

async fn migrate(config: &AppConfig) -> Result<()> {
    let store = connect(config).await?;
    store.migrate().await
}

async fn flush_once(config: &AppConfig) -> Result<()> {
    let store = Arc::new(connect(config).await?);
    store.migrate().await?;

    let trader = build_trader(config, store);
    trader.flush_all().await;
    Ok(())
}

async fn connect(config: &AppConfig) -> Result<PostgresStore> {
    PostgresStore::new(&config.database.url, config.database.max_connections).await
}

fn build_trader(config: &AppConfig, store: Arc<PostgresStore>) -> Trader {
    Trader::new(
        Arc::new(TradeQueues::new()),
        store,
        Arc::new(PaperExchange::new(&config.trader.quote_currency)),
        Arc::new(CapturedAmountConverter),
        chrono::Duration::seconds(config.trader.ttl_secs as i64),
    )
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},sqlx=warn", config.logging.level)));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
