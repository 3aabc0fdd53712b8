use std::sync::Arc;

use clap::Parser;

use crate::config::WorkerConfig;
use crate::state::WorkerState;

/// Root CLI struct for a worker backend.
#[derive(Parser, Debug)]
#[clap(name = "pob-worker", about = "Worker backend for the traffic-shaping testbed", version, rename_all = "kebab-case")]
pub struct Cli {
    #[clap(subcommand)]
    action: Command,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Starts the worker using env-var configuration (no config file for this service).
    Start(Start),
}

impl Cli {
    pub async fn execute(&self) -> Result<(), String> {
        match &self.action {
            Command::Start(start) => start.execute().await,
        }
    }
}

#[derive(Debug, Parser)]
pub struct Start;

impl Start {
    pub async fn execute(&self) -> Result<(), String> {
        let config = WorkerConfig::load()?;
        let host = config.worker_host.clone();
        let port = config.worker_port;
        let worker_id = config.worker_id.clone();

        let state = Arc::new(WorkerState::new(config));
        let app = crate::control::router(state);

        let addr = format!("{host}:{port}");
        tracing::info!(%addr, %worker_id, "starting worker");

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|err| format!("failed to bind {addr}: {err}"))?;
        axum::serve(listener, app).await.map_err(|err| err.to_string())
    }
}
