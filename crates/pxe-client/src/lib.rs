//! Network Boot Client Engine
//!
//! The protocol side of a PXE-style boot ROM: everything between a polled
//! Ethernet driver and the image loader.
//!
//! # Example
//!
//! ```no_run
//! use pxe_client::{BootSession, ClientConfig, NetbootError, SinkStatus, SystemClock};
//! # fn example(nic: impl pxe_client::Nic) -> Result<(), NetbootError> {
//! let mut image = Vec::new();
//! let mut session = BootSession::new(nic, SystemClock::new(), ClientConfig::default())?;
//! let lease = session.run(&mut |data: &[u8], _block: u32, eof: bool| -> Result<SinkStatus, NetbootError> {
//!     image.extend_from_slice(data);
//!     Ok(if eof { SinkStatus::Complete } else { SinkStatus::More })
//! })?;
//! println!("booted {} ({} bytes)", lease.boot_file, image.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Dispatch**: one cooperative poll loop ([`NetStack::await_reply`])
//!   that keeps answering ARP, IGMP and LACP while callers wait
//! - **Discovery**: DHCP with ProxyDHCP, plain BOOTP, or RARP
//! - **Options**: RFC1533 decoding with extension files and Etherboot
//!   encapsulated options
//! - **TFTP**: RFC1350 transfers with blksize negotiation
//! - **Backoff**: RFC2131/RFC1112 randomized retransmission intervals

pub mod arp;
pub mod backoff;
pub mod checksum;
pub mod clock;
pub mod config;
pub mod dhcp;
pub mod error;
pub mod igmp;
pub mod lacp;
pub mod nic;
pub mod options;
pub mod session;
pub mod stack;
pub mod tftp;
pub mod wire;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

#[cfg(test)]
mod test_utils;
#[cfg(test)]
mod dhcp_test;

pub use arp::{ArpRole, ArpTable};
pub use clock::{Clock, SystemClock, TICKS_PER_SEC};
pub use config::{ClientConfig, Discovery};
pub use dhcp::{DhcpClient, Lease};
pub use error::{NetbootError, OptionError};
pub use nic::{DeviceId, Nic};
pub use options::VendorOptions;
pub use session::BootSession;
pub use stack::{Frame, NetStack};
pub use tftp::{ImageSink, SinkStatus, TftpEvent, TftpRequest, TftpSession};
pub use wire::Mac;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockClock, MockNic};
