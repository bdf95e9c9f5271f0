//! IPv4 header

use super::{be16, ipv4_at};
use crate::checksum::ip_checksum;
use std::net::Ipv4Addr;

/// IGMP protocol number
pub const IP_IGMP: u8 = 2;
/// TCP protocol number
pub const IP_TCP: u8 = 6;
/// UDP protocol number
pub const IP_UDP: u8 = 17;

/// More-fragments flag plus fragment offset mask
pub const IP_FRAGMENT_MASK: u16 = 0x3FFF;

/// Header length without options
pub const IP_HLEN: usize = 20;

/// Fixed 20-byte IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// Version nibble and header length in 32-bit words
    pub verhdrlen: u8,
    /// Type of service
    pub service: u8,
    /// Datagram length, header included
    pub total_len: u16,
    /// Identification
    pub ident: u16,
    /// Flags and fragment offset
    pub frags: u16,
    /// Time to live
    pub ttl: u8,
    /// Upper-layer protocol
    pub protocol: u8,
    /// Header checksum as received
    pub checksum: u16,
    /// Source address
    pub src: Ipv4Addr,
    /// Destination address
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    /// Parse the fixed part of a header
    #[must_use]
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < IP_HLEN {
            return None;
        }
        Some(Self {
            verhdrlen: buf[0],
            service: buf[1],
            total_len: be16(buf, 2),
            ident: be16(buf, 4),
            frags: be16(buf, 6),
            ttl: buf[8],
            protocol: buf[9],
            checksum: be16(buf, 10),
            src: ipv4_at(buf, 12),
            dst: ipv4_at(buf, 16),
        })
    }

    /// Header length in bytes, options included
    #[must_use]
    pub fn header_len(&self) -> usize {
        usize::from(self.verhdrlen & 0x0F) * 4
    }

    /// Whether this datagram is a fragment (MF set or nonzero offset)
    #[must_use]
    pub fn is_fragment(&self) -> bool {
        self.frags & IP_FRAGMENT_MASK != 0
    }

    /// Write the header into the first 20 bytes of `buf`
    pub fn emit(&self, buf: &mut [u8]) {
        buf[0] = self.verhdrlen;
        buf[1] = self.service;
        buf[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        buf[4..6].copy_from_slice(&self.ident.to_be_bytes());
        buf[6..8].copy_from_slice(&self.frags.to_be_bytes());
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        buf[10..12].copy_from_slice(&self.checksum.to_be_bytes());
        buf[12..16].copy_from_slice(&self.src.octets());
        buf[16..20].copy_from_slice(&self.dst.octets());
    }
}

/// Write an outgoing IPv4 header into `buf` and compute its checksum.
///
/// `option_len` bytes of IP options must already sit at `buf[20..]`; they
/// are covered by the checksum. `total_len` counts header, options and
/// payload.
pub fn build_header(
    buf: &mut [u8],
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ttl: u8,
    protocol: u8,
    option_len: usize,
    total_len: u16,
) {
    let hlen = IP_HLEN + option_len;
    let words = u8::try_from(hlen / 4).unwrap_or(0x0F);
    let header = Ipv4Header {
        verhdrlen: 0x40 | (words & 0x0F),
        service: 0,
        total_len,
        ident: 0,
        frags: 0,
        ttl,
        protocol,
        checksum: 0,
        src,
        dst,
    };
    header.emit(buf);
    let sum = ip_checksum(&buf[..hlen]);
    buf[10..12].copy_from_slice(&sum.to_be_bytes());
}
