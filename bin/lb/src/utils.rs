use std::net::TcpListener;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::LbError;

/// Initializes the global tracing subscriber for the load balancer.
///
/// Sets up an env-filtered formatting layer, matching the service naming convention used
/// across the testbed's three binaries.
pub fn setup_tracing() -> Result<(), String> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| format!("failed to set tracing subscriber: {e}"))
}

/// Checks if a port is available for use.
pub fn check_port_availability(host: &str, port: u16) -> Result<TcpListener, LbError> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .inspect(|_| tracing::debug!(%port, "port is available"))
        .map_err(|err| LbError::PortAlreadyInUse(err, port))
}
