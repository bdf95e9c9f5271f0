//! Boot orchestration
//!
//! A [`BootSession`] owns everything one network boot needs: the stack, the
//! DHCP client and the TFTP session. [`BootSession::run`] is the retry point
//! every failure returns to.

use crate::clock::{Clock, TICKS_PER_SEC};
use crate::config::ClientConfig;
use crate::dhcp::{DhcpClient, Lease};
use crate::error::NetbootError;
use crate::nic::Nic;
use crate::stack::NetStack;
use crate::tftp::{ImageSink, TftpSession};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{error, info, warn};

/// One network boot: configure, then load.
#[derive(Debug)]
pub struct BootSession<N: Nic, C: Clock> {
    stack: NetStack<N, C>,
    dhcp: DhcpClient,
    tftp: TftpSession,
    config: ClientConfig,
    lease: Option<Lease>,
}

impl<N: Nic, C: Clock> BootSession<N, C> {
    /// Bring up a session on `nic`.
    ///
    /// # Errors
    ///
    /// [`NetbootError::Configuration`] when `config` does not validate.
    pub fn new(nic: N, clock: C, config: ClientConfig) -> Result<Self, NetbootError> {
        config.validate()?;
        Ok(Self {
            stack: NetStack::new(nic, clock, &config),
            dhcp: DhcpClient::new(&config),
            tftp: TftpSession::new(&config),
            config,
            lease: None,
        })
    }

    /// The network stack
    #[must_use]
    pub fn stack(&self) -> &NetStack<N, C> {
        &self.stack
    }

    /// The network stack, mutably
    pub fn stack_mut(&mut self) -> &mut NetStack<N, C> {
        &mut self.stack
    }

    /// The DHCP client and its decoded options
    #[must_use]
    pub fn dhcp(&self) -> &DhcpClient {
        &self.dhcp
    }

    /// Configuration from the last successful [`BootSession::configure`]
    #[must_use]
    pub fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    /// Raise the returned flag to abort whatever the session is waiting on
    #[must_use]
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.stack.abort_handle()
    }

    /// Discover a server, then load any extension file it names.
    ///
    /// # Errors
    ///
    /// Discovery errors, an abort, or an option buffer overflow while
    /// decoding the extension file. Other extension file failures are
    /// logged and ignored.
    pub fn configure(&mut self) -> Result<Lease, NetbootError> {
        self.lease = None;
        let mut lease = self.dhcp.discover(&mut self.stack)?;

        if let Some(path) = self.dhcp.options().extension_path().filter(|p| !p.is_empty()) {
            info!(file = %path, server = %lease.tftp_server, "Loading BOOTP extension file");
            match self.tftp.fetch(&mut self.stack, lease.tftp_server, &path, self.dhcp.options_mut()) {
                Ok(()) => {
                    self.dhcp.apply_options(&mut self.stack);
                    lease = self.dhcp.lease(&self.stack);
                }
                Err(err @ (NetbootError::Aborted | NetbootError::Options(_))) => return Err(err),
                Err(err) => warn!(file = %path, error = %err, "Could not load extension file"),
            }
        }

        self.lease = Some(lease.clone());
        Ok(lease)
    }

    /// Fetch the boot file of the current lease into `sink`.
    ///
    /// # Errors
    ///
    /// [`NetbootError::NoFilename`] when neither the server nor the config
    /// names a file, [`NetbootError::NoServer`] before
    /// [`BootSession::configure`] succeeded, and any TFTP or sink error.
    pub fn load<S: ImageSink + ?Sized>(&mut self, sink: &mut S) -> Result<(), NetbootError> {
        let Some(lease) = &self.lease else {
            return Err(NetbootError::NoServer);
        };
        if lease.boot_file.is_empty() {
            error!("No filename");
            return Err(NetbootError::NoFilename);
        }
        let server = lease.tftp_server;
        let file = lease.boot_file.clone();
        info!("Loading {server}:{file}");
        self.tftp.fetch(&mut self.stack, server, &file, sink).inspect_err(|err| {
            if !matches!(err, NetbootError::Aborted) {
                error!(error = %err, "Unable to load file.");
            }
        })
    }

    /// Configure and load until the image is in `sink`.
    ///
    /// Failed attempts sleep for `retryDelaySecs` while still answering
    /// ARP, IGMP and LACP, then start over from discovery.
    ///
    /// # Errors
    ///
    /// A non-retryable error (abort, option overflow, missing filename), or
    /// the last error once `maxBootAttempts` is reached.
    pub fn run<S: ImageSink + ?Sized>(&mut self, sink: &mut S) -> Result<Lease, NetbootError> {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let err = match self.attempt(sink) {
                Ok(lease) => return Ok(lease),
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if self.config.max_boot_attempts != 0 && attempt >= self.config.max_boot_attempts {
                warn!(attempt, error = %err, "Giving up");
                return Err(err);
            }
            warn!(attempt, error = %err, "Boot attempt failed, retrying in {}s", self.config.retry_delay_secs);
            self.stack.sleep(self.config.retry_delay_secs.saturating_mul(TICKS_PER_SEC))?;
        }
    }

    /// Leave every multicast group before handing the NIC back
    pub fn disable(&mut self) {
        self.stack.leave_all_groups();
    }

    fn attempt<S: ImageSink + ?Sized>(&mut self, sink: &mut S) -> Result<Lease, NetbootError> {
        let lease = self.configure()?;
        self.load(sink)?;
        Ok(lease)
    }
}
