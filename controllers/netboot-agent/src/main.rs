//! Netboot Agent
//!
//! Boots one machine over the network with the `pxe-client` engine.
//!
//! The machine's NIC is reached through an Ethernet-over-UDP tunnel, so the
//! agent can stand in for a boot ROM next to a VM or a lab switch port.

mod agent;
mod error;
mod sink;
mod tunnel;

use agent::{Agent, AgentSettings};
use anyhow::{Context, Result};
use crate::error::AgentError;
use pxe_client::{ClientConfig, Mac};
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Netboot Agent");

    // Load configuration from the environment
    let config = match env::var("NETBOOT_CONFIG") {
        Ok(path) => ClientConfig::from_file(Path::new(&path))
            .with_context(|| format!("loading boot config from {path}"))?,
        Err(_) => ClientConfig::default(),
    };
    let tunnel_local = socket_var("NETBOOT_TUNNEL_LOCAL", Some("0.0.0.0:10001"))?;
    let tunnel_remote = socket_var("NETBOOT_TUNNEL_REMOTE", None)?;
    let mac: Mac = env::var("NETBOOT_MAC")
        .unwrap_or_else(|_| "52:54:00:12:34:56".to_string())
        .parse()
        .map_err(|err| AgentError::InvalidConfig(format!("NETBOOT_MAC: {err}")))?;
    let output = env::var("NETBOOT_OUTPUT").map_or_else(|_| PathBuf::from("boot.img"), PathBuf::from);

    info!("Configuration:");
    info!("  Tunnel: {} <-> {}", tunnel_local, tunnel_remote);
    info!("  MAC: {}", mac);
    info!("  Discovery: {:?}", config.discovery);
    info!("  Output: {}", output.display());

    let agent = Agent::new(AgentSettings { config, tunnel_local, tunnel_remote, mac, output })?;
    let lease = agent.run().await?;
    info!("Boot complete: {lease}");

    Ok(())
}

/// Read a socket address from `name`, falling back to `default` when unset
fn socket_var(name: &str, default: Option<&str>) -> Result<SocketAddr, AgentError> {
    let value = match (env::var(name), default) {
        (Ok(value), _) => value,
        (Err(_), Some(default)) => default.to_string(),
        (Err(_), None) => {
            return Err(AgentError::InvalidConfig(format!("{name} environment variable is required")));
        }
    };
    value
        .parse()
        .map_err(|err| AgentError::InvalidConfig(format!("{name}={value}: {err}")))
}
