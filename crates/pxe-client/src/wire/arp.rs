//! ARP (RFC826) and RARP (RFC903) packet layout

use super::{ETH_P_IP, Mac, be16, ipv4_at, mac_at};
use std::net::Ipv4Addr;

/// Hardware type for Ethernet
pub const HW_TYPE_ETHERNET: u16 = 1;

/// ARP request
pub const ARP_REQUEST: u16 = 1;
/// ARP reply
pub const ARP_REPLY: u16 = 2;
/// RARP request
pub const RARP_REQUEST: u16 = 3;
/// RARP reply
pub const RARP_REPLY: u16 = 4;

/// An Ethernet/IPv4 ARP or RARP packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    /// Hardware type, 1 for Ethernet
    pub hw_type: u16,
    /// Protocol type, 0x0800 for IPv4
    pub proto_type: u16,
    /// Hardware address length
    pub hw_len: u8,
    /// Protocol address length
    pub proto_len: u8,
    /// One of the `ARP_*`/`RARP_*` opcodes
    pub opcode: u16,
    /// Sender hardware address
    pub sender_mac: Mac,
    /// Sender protocol address
    pub sender_ip: Ipv4Addr,
    /// Target hardware address
    pub target_mac: Mac,
    /// Target protocol address
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Wire length
    pub const LEN: usize = 28;

    /// An Ethernet/IPv4 packet with the given opcode and addresses
    #[must_use]
    pub fn new(
        opcode: u16,
        sender_mac: Mac,
        sender_ip: Ipv4Addr,
        target_mac: Mac,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            hw_type: HW_TYPE_ETHERNET,
            proto_type: ETH_P_IP,
            hw_len: 6,
            proto_len: 4,
            opcode,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// Parse the first 28 bytes of `buf`
    #[must_use]
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN {
            return None;
        }
        Some(Self {
            hw_type: be16(buf, 0),
            proto_type: be16(buf, 2),
            hw_len: buf[4],
            proto_len: buf[5],
            opcode: be16(buf, 6),
            sender_mac: mac_at(buf, 8),
            sender_ip: ipv4_at(buf, 14),
            target_mac: mac_at(buf, 18),
            target_ip: ipv4_at(buf, 24),
        })
    }

    /// Whether the address families are Ethernet and IPv4
    #[must_use]
    pub fn is_ethernet_ipv4(&self) -> bool {
        self.hw_type == HW_TYPE_ETHERNET
            && self.proto_type == ETH_P_IP
            && self.hw_len == 6
            && self.proto_len == 4
    }

    /// Serialize to wire format
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0..2].copy_from_slice(&self.hw_type.to_be_bytes());
        buf[2..4].copy_from_slice(&self.proto_type.to_be_bytes());
        buf[4] = self.hw_len;
        buf[5] = self.proto_len;
        buf[6..8].copy_from_slice(&self.opcode.to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());
        buf
    }
}
