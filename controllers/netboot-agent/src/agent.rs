//! Main agent implementation.
//!
//! This module contains the `Agent` struct that wires the boot engine to a
//! tunnelled NIC, the wall clock, Ctrl-C and the output file.

use crate::error::AgentError;
use crate::sink::FileSink;
use crate::tunnel::UdpTunnelNic;
use pxe_client::{BootSession, ClientConfig, Lease, Mac, SystemClock};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

/// Everything the agent needs to boot one machine.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Engine configuration
    pub config: ClientConfig,
    /// Local end of the Ethernet tunnel
    pub tunnel_local: SocketAddr,
    /// Remote end of the Ethernet tunnel
    pub tunnel_remote: SocketAddr,
    /// Station address of the booting NIC
    pub mac: Mac,
    /// Where the boot image is written
    pub output: PathBuf,
}

/// Runs one network boot.
#[derive(Debug)]
pub struct Agent {
    settings: AgentSettings,
}

impl Agent {
    /// Creates a new agent, validating its configuration.
    pub fn new(settings: AgentSettings) -> Result<Self, AgentError> {
        settings.config.validate()?;
        Ok(Self { settings })
    }

    /// Boots until the image is on disk, the attempts run out or Ctrl-C.
    pub async fn run(self) -> Result<Lease, AgentError> {
        let AgentSettings { config, tunnel_local, tunnel_remote, mac, output } = self.settings;
        let nic = UdpTunnelNic::connect(tunnel_local, tunnel_remote, mac)?;
        let mut sink = FileSink::create(&output)?;
        let mut session = BootSession::new(nic, SystemClock::new(), config)?;

        let abort = session.abort_handle();
        let signal = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, aborting boot");
                abort.store(true, Ordering::SeqCst);
            }
        });

        let boot = tokio::task::spawn_blocking(move || {
            let result = session.run(&mut sink);
            session.disable();
            result.map(|lease| (lease, sink.bytes()))
        });
        let result = boot.await;
        signal.abort();

        let (lease, bytes) = result.map_err(|err| AgentError::Task(err.to_string()))??;
        info!("Loaded {}:{} ({bytes} bytes) into {}", lease.tftp_server, lease.boot_file, output.display());
        Ok(lease)
    }
}
