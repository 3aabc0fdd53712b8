pub mod autoweight;
pub mod commands;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod error;
pub mod health;
pub mod registry;
pub mod state;
pub mod stream;
mod utils;
pub mod wrr;

use clap::Parser;
use commands::Cli;
use utils::setup_tracing;

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing()?;

    let cli = Cli::parse();
    cli.execute().await
}
