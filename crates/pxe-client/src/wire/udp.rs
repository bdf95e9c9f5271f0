//! UDP and TCP headers

use super::{be16, be32};

/// UDP header length
pub const UDP_HLEN: usize = 8;
/// TCP header length without options
pub const TCP_HLEN: usize = 20;

/// UDP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// Header plus payload length
    pub len: u16,
    /// Checksum, 0 when the sender did not compute one
    pub checksum: u16,
}

impl UdpHeader {
    /// Parse the first 8 bytes of `buf`
    #[must_use]
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < UDP_HLEN {
            return None;
        }
        Some(Self {
            src_port: be16(buf, 0),
            dst_port: be16(buf, 2),
            len: be16(buf, 4),
            checksum: be16(buf, 6),
        })
    }

    /// Write the header into the first 8 bytes of `buf`
    pub fn emit(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..6].copy_from_slice(&self.len.to_be_bytes());
        buf[6..8].copy_from_slice(&self.checksum.to_be_bytes());
    }
}

/// TCP header, enough of it to locate and checksum the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// Sequence number
    pub seq: u32,
    /// Acknowledgment number
    pub ack: u32,
    /// Data offset and flags
    pub ctrl: u16,
    /// Receive window
    pub window: u16,
    /// Checksum
    pub checksum: u16,
}

impl TcpHeader {
    /// Parse the fixed part of a TCP header
    #[must_use]
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < TCP_HLEN {
            return None;
        }
        Some(Self {
            src_port: be16(buf, 0),
            dst_port: be16(buf, 2),
            seq: be32(buf, 4),
            ack: be32(buf, 8),
            ctrl: be16(buf, 12),
            window: be16(buf, 14),
            checksum: be16(buf, 16),
        })
    }

    /// Header length in bytes, options included
    #[must_use]
    pub fn header_len(&self) -> usize {
        usize::from((self.ctrl >> 10) & 0x3C)
    }
}
