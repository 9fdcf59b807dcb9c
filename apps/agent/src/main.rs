#![warn(clippy::all, clippy::pedantic)]

use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;

mod agent;
mod config;
mod exporter;

use agent::Agent;
use config::AgentConfig;

#[derive(Parser)]
#[command(name = "farwatch-agent", version, about = "Host monitoring agent")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single collection cycle and exit
    #[arg(long)]
    oneshot: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AgentConfig::from_config(cli.config.as_deref())?;

    if cli.print_config {
        println!("{config}");
        return Ok(());
    }

    let level: LevelFilter = config.log.level.parse().unwrap_or(LevelFilter::INFO);
    logger::init_with_level(level);

    run_agent(config, cli.oneshot).await
}

async fn run_agent(config: AgentConfig, oneshot: bool) -> anyhow::Result<()> {
    Agent::new(config).run(oneshot).await
}
