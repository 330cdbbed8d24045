use anyhow::Context;
use clap::Parser;
use semantic_query_cache::cli::{self, Cli};
use semantic_query_cache::config::AppConfig;
use semantic_query_cache::infrastructure::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load().context("Failed to load configuration")?;
    logging::init_logging(&config.logging).context("Failed to initialize logging")?;

    cli::run(cli, &config).await
}
