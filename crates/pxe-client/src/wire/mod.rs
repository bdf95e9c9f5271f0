//! On-the-wire packet layouts
//!
//! Each submodule parses a header out of a byte slice into an owned, `Copy`
//! struct and writes it back with `emit`. Parsing never panics: a slice too
//! short for the header yields `None`.

pub mod arp;
pub mod bootp;
pub mod igmp;
pub mod ipv4;
pub mod tftp;
pub mod udp;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Ethernet header length
pub const ETH_HLEN: usize = 14;
/// Largest IP datagram carried in one frame
pub const ETH_MAX_MTU: usize = 1500;
/// Largest frame, header included
pub const ETH_FRAME_LEN: usize = ETH_HLEN + ETH_MAX_MTU;

/// IPv4 ethertype
pub const ETH_P_IP: u16 = 0x0800;
/// ARP ethertype
pub const ETH_P_ARP: u16 = 0x0806;
/// Reverse ARP ethertype
pub const ETH_P_RARP: u16 = 0x8035;
/// IEEE 802.3 slow protocols (LACP, marker)
pub const ETH_P_SLOW: u16 = 0x8809;

/// A 48-bit Ethernet hardware address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mac(pub [u8; 6]);

impl Mac {
    /// ff:ff:ff:ff:ff:ff
    pub const BROADCAST: Mac = Mac([0xff; 6]);
    /// All zero: in the ARP table this means "not resolved yet"
    pub const ZERO: Mac = Mac([0; 6]);

    /// Whether every byte is zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }

    /// RFC1112 mapping of an IPv4 multicast group to 01:00:5e + low 23 bits.
    #[must_use]
    pub fn multicast(group: Ipv4Addr) -> Mac {
        let o = group.octets();
        Mac([0x01, 0x00, 0x5e, o[1] & 0x7f, o[2], o[3]])
    }

    /// Raw bytes
    #[must_use]
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

/// Error for a MAC string that is not six colon- or dash-separated hex bytes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address: {0}")]
pub struct ParseMacError(String);

impl FromStr for Mac {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut mac = [0u8; 6];
        let mut parts = s.split([':', '-']);
        for byte in &mut mac {
            let part = parts.next().ok_or_else(|| ParseMacError(s.to_string()))?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| ParseMacError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ParseMacError(s.to_string()));
        }
        Ok(Mac(mac))
    }
}

impl TryFrom<String> for Mac {
    type Error = ParseMacError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Mac> for String {
    fn from(mac: Mac) -> Self {
        mac.to_string()
    }
}

/// Read a big-endian u16 at `offset`
pub(crate) fn be16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

/// Read a big-endian u32 at `offset`
pub(crate) fn be32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

/// Read an IPv4 address at `offset`
pub(crate) fn ipv4_at(buf: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3])
}

/// Read a MAC address at `offset`
pub(crate) fn mac_at(buf: &[u8], offset: usize) -> Mac {
    let mut mac = [0u8; 6];
    mac.copy_from_slice(&buf[offset..offset + 6]);
    Mac(mac)
}
