//! IGMP v1/v2 (RFC1112, RFC2236) messages

use super::ipv4_at;
use crate::checksum::ip_checksum;
use std::net::Ipv4Addr;

/// Membership query
pub const IGMP_QUERY: u8 = 0x11;
/// Version 1 membership report
pub const IGMPV1_REPORT: u8 = 0x12;
/// Version 2 membership report
pub const IGMPV2_REPORT: u8 = 0x16;
/// Version 2 leave group
pub const IGMP_LEAVE: u8 = 0x17;

/// IGMP message length
pub const IGMP_LEN: usize = 8;

/// IP Router Alert option (RFC2113), carried on every report and leave
pub const ROUTER_ALERT: [u8; 4] = [0x94, 0x04, 0x00, 0x00];

/// All-systems group, destination of general queries
pub const GROUP_ALL_HOSTS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 1);
/// All-routers group, destination of leave messages
pub const GROUP_ALL_ROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 2);

/// One IGMP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgmpMessage {
    /// Message type
    pub kind: u8,
    /// Max response time in tenths of a second (0 from an IGMPv1 querier)
    pub response_time: u8,
    /// Group address, 0.0.0.0 in a general query
    pub group: Ipv4Addr,
}

impl IgmpMessage {
    /// Parse and checksum-verify an IGMP message
    #[must_use]
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < IGMP_LEN || ip_checksum(&buf[..IGMP_LEN]) != 0 {
            return None;
        }
        Some(Self { kind: buf[0], response_time: buf[1], group: ipv4_at(buf, 4) })
    }

    /// Serialize with the checksum filled in
    #[must_use]
    pub fn to_bytes(&self) -> [u8; IGMP_LEN] {
        let mut buf = [0u8; IGMP_LEN];
        buf[0] = self.kind;
        buf[1] = self.response_time;
        buf[4..8].copy_from_slice(&self.group.octets());
        let sum = ip_checksum(&buf);
        buf[2..4].copy_from_slice(&sum.to_be_bytes());
        buf
    }
}
