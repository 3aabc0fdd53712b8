use std::fs::File;
use std::io::Write;

use clap::Parser;

use crate::config::{LB_CONFIG_FILE_NAME, LbConfig};
use crate::state::LbState;
use crate::utils::check_port_availability;
use crate::{autoweight, control, health};

/// Root CLI struct for the load balancer.
#[derive(Parser, Debug)]
#[clap(name = "pob-lb", about = "Load balancer for the traffic-shaping testbed", version, rename_all = "kebab-case")]
pub struct Cli {
    #[clap(subcommand)]
    action: Command,
}

#[derive(Debug, Parser)]
pub enum Command {
    /// Creates a config file in the current working directory with default values.
    Init(Init),
    /// Starts the load balancer using the config file, overridden by `LB_*` env vars.
    Start(Start),
}

impl Cli {
    pub async fn execute(&self) -> Result<(), String> {
        match &self.action {
            Command::Init(init) => init.execute(),
            Command::Start(start) => start.execute().await,
        }
    }
}

/// Creates `pob-lb.toml` with default values.
#[derive(Debug, Parser)]
pub struct Init;

impl Init {
    pub fn execute(&self) -> Result<(), String> {
        let mut current_dir = std::env::current_dir().map_err(|err| err.to_string())?;
        current_dir.push(LB_CONFIG_FILE_NAME);

        if current_dir.exists() {
            return Err(format!(
                "the file \"{LB_CONFIG_FILE_NAME}\" already exists in the working directory"
            ));
        }

        let config = LbConfig::default();
        let toml_string = toml::to_string_pretty(&config)
            .map_err(|err| format!("error formatting config: {err}"))?;

        let mut file = File::options()
            .write(true)
            .create_new(true)
            .open(&current_dir)
            .map_err(|err| format!("error opening the file: {err}"))?;
        file.write_all(toml_string.as_bytes())
            .map_err(|err| format!("error writing to file: {err}"))?;

        println!("Config file successfully created at: {current_dir:?}");
        Ok(())
    }
}

/// Starts the load balancer defined in the config file.
#[derive(Debug, Parser)]
pub struct Start;

impl Start {
    pub async fn execute(&self) -> Result<(), String> {
        let config = LbConfig::load_from_file().map_err(|err| err.to_string())?;
        if config.worker_urls.is_empty() {
            return Err("worker_urls must be non-empty".into());
        }

        let listener = check_port_availability(&config.host, config.port)
            .map_err(|err| err.to_string())?;
        drop(listener);

        let host = config.host.clone();
        let port = config.port;
        let state = LbState::new(config);

        tokio::spawn(health::run(state.clone()));
        tokio::spawn(autoweight::run(state.clone()));

        let app = control::router(state);
        let addr = format!("{host}:{port}");
        tracing::info!(%addr, "starting load balancer");

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|err| format!("failed to bind {addr}: {err}"))?;
        axum::serve(listener, app).await.map_err(|err| err.to_string())
    }
}
