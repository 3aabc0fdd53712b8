pub mod clock;
pub mod commands;
pub mod config;
pub mod control;
pub mod error;
pub mod faults;
pub mod handler;
pub mod state;
mod utils;

use clap::Parser;
use commands::Cli;
use utils::setup_tracing;

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing()?;

    let cli = Cli::parse();
    cli.execute().await
}
