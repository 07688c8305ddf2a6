//! Siteaudit worker binary
//!
//! Loads configuration from the environment, connects the job store and the
//! rendering engine, and runs the job lifecycle controller until a shutdown
//! signal arrives.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use siteaudit::config::{Config, LogFormat};
use siteaudit::controller::JobController;
use siteaudit::crawl::browser::HttpBrowser;
use siteaudit::store::{JobStore, PgJobStore};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "siteaudit")]
#[command(about = "Site-auditing crawl worker")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("invalid worker configuration")?;

    init_logging(&config, cli.verbose);
    info!("siteaudit worker starting");

    let store: Arc<dyn JobStore> = Arc::new(
        PgJobStore::connect(&config.store.url, &config.store.service_key)
            .await
            .context("failed to connect to the job store")?,
    );

    let browser = Arc::new(
        HttpBrowser::new(&config.crawler.user_agent)
            .context("failed to initialize the fetch engine")?,
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(());
    });

    JobController::new(store, browser, config, shutdown_rx)
        .run()
        .await?;

    info!("siteaudit worker stopped");
    Ok(())
}

fn init_logging(config: &Config, verbose: u8) {
    let level = match verbose {
        0 => config.logging.level.as_str().to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("siteaudit={},warn", level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
