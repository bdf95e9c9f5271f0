//! Agent-specific error types.
//!
//! This module defines error types specific to the netboot agent that are
//! not covered by the protocol engine's own errors.

use pxe_client::NetbootError;
use thiserror::Error;

/// Errors that can occur in the netboot agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Boot engine error
    #[error("Network boot failed: {0}")]
    Netboot(#[from] NetbootError),

    /// Socket or file error outside the engine
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The blocking boot task panicked or was cancelled
    #[error("Boot task failed: {0}")]
    Task(String),
}
