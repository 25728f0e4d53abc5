//! # Status List Server
//!
//! Loads the service configuration and runs the renewal scheduler until
//! interrupted.
//!
//! ```bash
//! statuslist-server --config /etc/status-list/config.json
//!
//! # run a single renewal pass and exit
//! statuslist-server --config /etc/status-list/config.json --once
//! ```

mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use statuslist::infosec::FileKeyStore;
use statuslist::{BitstringList, Config, Registry, Renewal};
use tracing_subscriber::EnvFilter;

use crate::shutdown::Shutdown;

#[derive(Parser)]
#[command(name = "statuslist-server")]
#[command(about = "Publishes and renews token status lists and identifier lists")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, short = 'c', env = "STATUS_LIST_CONFIG")]
    config: PathBuf,

    /// Run one renewal pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;
    tracing::info!(
        service_url = %config.service_url,
        lists = %config.status_list_dir.display(),
        countries = config.countries.len(),
        "configuration loaded"
    );

    let keys = FileKeyStore::new(config.countries.clone());
    let registry = Arc::new(Registry::<BitstringList, _>::new(&config, keys));
    let renewal = Arc::new(Renewal::new(registry, &config));

    if cli.once {
        let report = tokio::task::spawn_blocking(move || {
            renewal.run_pass(Local::now().naive_local())
        })
        .await?;
        tracing::info!(?report, "renewal pass complete");
        return Ok(());
    }

    let shutdown = Shutdown::default();
    let scheduler = tokio::spawn(renewal.run(shutdown.subscribe()));

    shutdown.on_signal().await?;
    scheduler.await?;

    tracing::info!("stopped");
    Ok(())
}
