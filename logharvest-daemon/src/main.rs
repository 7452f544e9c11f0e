use anyhow::Result;
use clap::Parser;

use logharvest_core::config::HarvestConfig;
use logharvest_daemon::cli::DaemonCli;
use logharvest_daemon::logging::init_tracing;
use logharvest_daemon::orchestrator::{Orchestrator, validate_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = HarvestConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;
    cli.apply_overrides(&mut config);

    if cli.validate {
        let rules = validate_config(&config).await?;
        println!(
            "configuration OK: {} ({} rules)",
            cli.config.display(),
            rules
        );
        return Ok(());
    }

    init_tracing(&config.general)?;
    tracing::info!(config = %cli.config.display(), "logharvest-daemon starting");

    let mut orchestrator = Orchestrator::build_from_config(config)?;
    orchestrator.run().await
}
