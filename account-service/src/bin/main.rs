use std::sync::Arc;
use std::time::Duration;

use account_service::{AccountService, AccountServiceConfig, InMemoryBankRepository};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Account Service CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Set the log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Commands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the account service and its interest accrual task
    Start {
        /// Database URL
        #[arg(short, long)]
        database_url: Option<String>,

        /// Database pool size
        #[arg(short, long)]
        pool_size: Option<u32>,

        /// Keep all data in memory instead of PostgreSQL
        #[arg(long)]
        in_memory: bool,

        /// Seconds between interest accrual sweeps
        #[arg(short, long)]
        accrual_interval_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    // Parse command line arguments
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "account_service={level},common={level}", level = cli.log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Start { database_url, pool_size, in_memory, accrual_interval_secs } => {
            // Create config using provided values or env vars
            let mut config = match database_url {
                Some(url) => AccountServiceConfig::new(url, pool_size.unwrap_or(5)),
                None => AccountServiceConfig::from_env(),
            };
            if let Some(secs) = accrual_interval_secs {
                config = config.with_accrual_interval(Duration::from_secs(secs));
            }

            info!(
                "Starting account service (in memory: {}, pool size: {}, accrual every {:?})",
                in_memory, config.db_pool_size, config.accrual_interval
            );

            let service = if in_memory {
                AccountService::from_repository(Arc::new(InMemoryBankRepository::new()), &config)
            } else {
                AccountService::with_config(&config).await?
            };

            let cancel = CancellationToken::new();
            let accrual = service.start_accrual(cancel.clone());

            info!("Account service started. Press Ctrl+C to stop.");
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutting down account service...");
                },
                Err(err) => {
                    error!("Error waiting for Ctrl+C: {}", err);
                }
            }

            cancel.cancel();
            if let Err(e) = accrual.await {
                error!("Interest accrual task ended abnormally: {}", e);
            }
        }
    }

    Ok(())
}
