mod cli;
mod config;
mod error;
mod fields;
mod output;
mod providers;
mod server;
mod sink;
mod span;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting buildevents - GitLab CI webhook sink");
    cli.execute().await?;

    Ok(())
}
