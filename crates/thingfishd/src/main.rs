use anyhow::Context;
use clap::Parser;
use thingfish_server::{ServerConfig, ThingfishServer};
use thingfish_types::Logger;
use tracing::info;

mod cli;
mod telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }
    if cli.verbose {
        config.log_level = "debug".into();
    }
    config.log_json |= cli.json;

    telemetry::init(&config.log_level, config.log_json)?;
    match &cli.config {
        Some(path) => info!(config = %path.display(), "loaded configuration"),
        None => info!("no configuration file given, using defaults"),
    }

    let server = ThingfishServer::new(config, Logger::current()).context("building backends")?;
    server.serve().await?;
    Ok(())
}
