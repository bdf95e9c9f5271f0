//! Network boot errors

use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors raised by the RFC1533 vendor option decoder.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OptionError {
    /// Chunk 0 or 1 did not start with the 99.130.83.99 magic cookie
    #[error("no RFC1533 vendor header found")]
    NoVendorHeader,

    /// Appending a chunk would run past the fixed option buffer
    #[error("overflow in vendor data buffer: {needed} bytes needed, {capacity} available")]
    Overflow {
        /// Bytes the buffer would need to hold after the append
        needed: usize,
        /// Fixed capacity of the buffer
        capacity: usize,
    },

    /// An encoder ran out of room in its output buffer
    #[error("option block truncated")]
    Truncated,
}

/// Errors that can occur while network booting.
#[derive(Debug, Error)]
pub enum NetbootError {
    /// The user asked to abort; all in-flight state is abandoned
    #[error("aborted by user")]
    Aborted,

    /// A bounded wait ran out of retries
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    /// BOOTP/DHCP/RARP discovery got no usable reply
    #[error("no server found")]
    NoServer,

    /// The DHCP server refused our DHCPREQUEST
    #[error("DHCP server sent NAK")]
    DhcpNak,

    /// No ARP reply for a next hop after all retries
    #[error("ARP resolution failed for {0}")]
    ArpUnresolved(Ipv4Addr),

    /// The next hop has no ARP table entry at all
    #[error("{0} is not in my arp table")]
    NotInArpTable(Ipv4Addr),

    /// The TFTP server sent an ERROR packet
    #[error("TFTP error {code} ({message})")]
    Tftp {
        code: u16,
        message: String,
    },

    /// OACK rejected; an ERROR(8) has already been sent to the server
    #[error("TFTP option negotiation failed: {0}")]
    OptionNegotiation(String),

    /// A TFTP packet with an opcode we never expect as a reply
    #[error("unexpected TFTP opcode {0}")]
    UnexpectedOpcode(u16),

    #[error("vendor options: {0}")]
    Options(#[from] OptionError),

    /// The image sink refused a block
    #[error("image sink error: {0}")]
    Sink(String),

    /// No boot file name from the server and no default configured
    #[error("no filename")]
    NoFilename,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl NetbootError {
    /// Whether the boot orchestrator should sleep and try again.
    ///
    /// Timeouts, missing servers and protocol-reported failures end the
    /// current attempt only. A user abort and an option buffer overflow end
    /// the whole run: retrying cannot make the configured data fit.
    pub fn is_retryable(&self) -> bool {
        match self {
            NetbootError::Aborted
            | NetbootError::Options(OptionError::Overflow { .. })
            | NetbootError::Configuration(_)
            | NetbootError::Serialization(_)
            | NetbootError::NoFilename => false,
            NetbootError::Timeout(_)
            | NetbootError::NoServer
            | NetbootError::DhcpNak
            | NetbootError::ArpUnresolved(_)
            | NetbootError::NotInArpTable(_)
            | NetbootError::Tftp { .. }
            | NetbootError::OptionNegotiation(_)
            | NetbootError::UnexpectedOpcode(_)
            | NetbootError::Options(_)
            | NetbootError::Sink(_)
            | NetbootError::Io(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_and_overflow_are_fatal() {
        assert!(!NetbootError::Aborted.is_retryable());
        let overflow = NetbootError::from(OptionError::Overflow { needed: 1300, capacity: 1236 });
        assert!(!overflow.is_retryable());
    }

    #[test]
    fn test_transient_failures_are_retryable() {
        assert!(NetbootError::Timeout("TFTP data").is_retryable());
        assert!(NetbootError::NoServer.is_retryable());
        assert!(NetbootError::DhcpNak.is_retryable());
        assert!(NetbootError::Tftp { code: 1, message: "File not found".to_string() }.is_retryable());
    }

    #[test]
    fn test_tftp_error_message_format() {
        let err = NetbootError::Tftp { code: 1, message: "File not found".to_string() };
        assert_eq!(err.to_string(), "TFTP error 1 (File not found)");
    }
}
