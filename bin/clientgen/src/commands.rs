use clap::Parser;

use crate::config::CgConfig;
use crate::state::CgState;

#[derive(Parser, Debug)]
#[clap(name = "pob-clientgen", about = "Client generator for the traffic-shaping testbed", version, rename_all = "kebab-case")]
pub struct Cli {
    #[clap(subcommand)]
    action: Command,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Starts the client generator using env-var configuration.
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
        let config = CgConfig::load()?;
        let addr = format!("{}:{}", config.cg_host, config.cg_port);

        let state = CgState::new(config);
        let app = crate::control::router(state);

        tracing::info!(%addr, "starting client generator");
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|err| format!("failed to bind {addr}: {err}"))?;
        axum::serve(listener, app).await.map_err(|err| err.to_string())
    }
}
