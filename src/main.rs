mod clab;
mod cli;
mod config;
mod dialect;
mod drivers;
mod eapi;
mod hooks;
mod jobs;
mod models;
mod nautobot;
mod render;
mod utils;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; the environment may already carry the settings
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();

    // Logs go to stderr so `--json` output on stdout stays parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netlab_jobs=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = Config::load();
    if cfg.nautobot_token.is_empty() {
        tracing::warn!("NAUTOBOT_TOKEN not set - inventory requests will be rejected");
    }
    tracing::debug!("Nautobot: {}", cfg.nautobot_url);

    if let Err(e) = cli::run(cli, cfg).await {
        tracing::error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
