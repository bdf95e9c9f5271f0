//! BOOTP (RFC951) fixed-format message
//!
//! ```text
//! 0      op  htype  hlen  hops
//! 4      xid
//! 8      secs         flags
//! 12     ciaddr
//! 16     yiaddr
//! 20     siaddr
//! 24     giaddr
//! 28     chaddr (16)
//! 44     sname  (64)
//! 108    file   (128)
//! 236    vend   (64 for BOOTP, 312 for DHCP)
//! ```

use super::{Mac, be16, be32, ipv4_at};
use std::net::Ipv4Addr;

/// BOOTP server port
pub const BOOTP_SERVER: u16 = 67;
/// BOOTP client port
pub const BOOTP_CLIENT: u16 = 68;
/// PXE ProxyDHCP server port
pub const PROXYDHCP_SERVER: u16 = 4011;

/// `op` of a client request
pub const BOOTP_REQUEST: u8 = 1;
/// `op` of a server reply
pub const BOOTP_REPLY: u8 = 2;

/// Length of everything before the vendor area
pub const BOOTP_FIXED_LEN: usize = 236;
/// RFC951 vendor area size
pub const BOOTP_VENDOR_LEN: usize = 64;
/// DHCP options area size (RFC2131 minimum a client must accept)
pub const DHCP_OPT_LEN: usize = 312;

const OFF_XID: usize = 4;
const OFF_SECS: usize = 8;
const OFF_CIADDR: usize = 12;
const OFF_YIADDR: usize = 16;
const OFF_SIADDR: usize = 20;
const OFF_GIADDR: usize = 24;
const OFF_CHADDR: usize = 28;
const OFF_FILE: usize = 108;

/// Size of the `file` field
pub const BOOTP_FILE_LEN: usize = 128;

/// The fixed part of a BOOTP message, vendor area excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootpHeader {
    /// Request or reply
    pub op: u8,
    /// Transaction id
    pub xid: u32,
    /// Seconds since the client began booting
    pub secs: u16,
    /// Client address, when already known
    pub ciaddr: Ipv4Addr,
    /// "Your" (assigned) address
    pub yiaddr: Ipv4Addr,
    /// Next server (TFTP) address
    pub siaddr: Ipv4Addr,
    /// Relay agent address
    pub giaddr: Ipv4Addr,
    /// Client hardware address (first 6 of 16 bytes)
    pub chaddr: Mac,
}

impl BootpHeader {
    /// Parse the fixed header of a BOOTP message
    #[must_use]
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < BOOTP_FIXED_LEN {
            return None;
        }
        let mut chaddr = [0u8; 6];
        chaddr.copy_from_slice(&buf[OFF_CHADDR..OFF_CHADDR + 6]);
        Some(Self {
            op: buf[0],
            xid: be32(buf, OFF_XID),
            secs: be16(buf, OFF_SECS),
            ciaddr: ipv4_at(buf, OFF_CIADDR),
            yiaddr: ipv4_at(buf, OFF_YIADDR),
            siaddr: ipv4_at(buf, OFF_SIADDR),
            giaddr: ipv4_at(buf, OFF_GIADDR),
            chaddr: Mac(chaddr),
        })
    }

    /// A client request from `mac` with everything else zeroed
    #[must_use]
    pub fn request(xid: u32, mac: Mac) -> Self {
        Self {
            op: BOOTP_REQUEST,
            xid,
            secs: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: mac,
        }
    }

    /// Write the fixed header into `buf[..236]`, zeroing `sname` and `file`
    pub fn emit(&self, buf: &mut [u8]) {
        buf[..BOOTP_FIXED_LEN].fill(0);
        buf[0] = self.op;
        buf[1] = 1; // Ethernet
        buf[2] = 6;
        buf[OFF_XID..OFF_XID + 4].copy_from_slice(&self.xid.to_be_bytes());
        buf[OFF_SECS..OFF_SECS + 2].copy_from_slice(&self.secs.to_be_bytes());
        buf[OFF_CIADDR..OFF_CIADDR + 4].copy_from_slice(&self.ciaddr.octets());
        buf[OFF_YIADDR..OFF_YIADDR + 4].copy_from_slice(&self.yiaddr.octets());
        buf[OFF_SIADDR..OFF_SIADDR + 4].copy_from_slice(&self.siaddr.octets());
        buf[OFF_GIADDR..OFF_GIADDR + 4].copy_from_slice(&self.giaddr.octets());
        buf[OFF_CHADDR..OFF_CHADDR + 6].copy_from_slice(&self.chaddr.0);
    }
}

/// The NUL-terminated `file` field of a BOOTP message
#[must_use]
pub fn boot_file(buf: &[u8]) -> String {
    c_string(buf.get(OFF_FILE..OFF_FILE + BOOTP_FILE_LEN).unwrap_or_default())
}

/// Write `name` into the `file` field of `buf`, truncated to 127 bytes
pub fn set_boot_file(buf: &mut [u8], name: &str) {
    let field = &mut buf[OFF_FILE..OFF_FILE + BOOTP_FILE_LEN];
    field.fill(0);
    let len = name.len().min(BOOTP_FILE_LEN - 1);
    field[..len].copy_from_slice(&name.as_bytes()[..len]);
}

/// The vendor area: everything after the fixed header
#[must_use]
pub fn vendor_area(buf: &[u8]) -> &[u8] {
    buf.get(BOOTP_FIXED_LEN..).unwrap_or_default()
}

fn c_string(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
