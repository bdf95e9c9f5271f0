//! TFTP (RFC1350) packets with the RFC2347 option extension

use super::be16;

/// Well-known TFTP server port
pub const TFTP_PORT: u16 = 69;

/// Read request
pub const TFTP_RRQ: u16 = 1;
/// Data block
pub const TFTP_DATA: u16 = 3;
/// Acknowledgment
pub const TFTP_ACK: u16 = 4;
/// Error
pub const TFTP_ERROR: u16 = 5;
/// Option acknowledgment
pub const TFTP_OACK: u16 = 6;

/// Default block size
pub const TFTP_DEFAULTSIZE: u16 = 512;
/// Largest block that fits a 1500-byte MTU (1500 - IP - UDP - TFTP header)
pub const TFTP_MAX_BLKSIZE: u16 = 1468;
/// Smallest block size accepted in an OACK
pub const TFTP_MIN_BLKSIZE: u16 = 512;

/// ERROR code for a rejected option negotiation
pub const TFTP_EOPTNEG: u16 = 8;

/// TFTP header length (opcode plus block number)
pub const TFTP_HLEN: usize = 4;

/// A received TFTP packet borrowing from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TftpPacket<'a> {
    /// DATA with its 16-bit block number
    Data {
        /// Block number
        block: u16,
        /// Payload, at most one block
        data: &'a [u8],
    },
    /// ACK of a block
    Ack {
        /// Acknowledged block number
        block: u16,
    },
    /// ERROR from the server
    Error {
        /// Error code
        code: u16,
        /// Server message, NUL terminator stripped
        message: &'a [u8],
    },
    /// OACK with the raw NUL-separated option list
    Oack {
        /// `key\0value\0...` pairs
        options: &'a [u8],
    },
    /// Anything else (RRQ/WRQ or an unknown opcode)
    Other(u16),
}

impl<'a> TftpPacket<'a> {
    /// Classify a UDP payload. `None` when shorter than an opcode.
    #[must_use]
    pub fn parse(payload: &'a [u8]) -> Option<Self> {
        if payload.len() < 2 {
            return None;
        }
        let opcode = be16(payload, 0);
        let rest = &payload[2..];
        Some(match opcode {
            TFTP_DATA | TFTP_ACK | TFTP_ERROR if rest.len() < 2 => return None,
            TFTP_DATA => TftpPacket::Data { block: be16(rest, 0), data: &rest[2..] },
            TFTP_ACK => TftpPacket::Ack { block: be16(rest, 0) },
            TFTP_ERROR => {
                let text = &rest[2..];
                let end = text.iter().position(|&b| b == 0).unwrap_or(text.len());
                TftpPacket::Error { code: be16(rest, 0), message: &text[..end] }
            }
            TFTP_OACK => TftpPacket::Oack { options: rest },
            other => TftpPacket::Other(other),
        })
    }
}

/// Write an RRQ for `name` in octet mode, asking for `blksize`.
///
/// Returns the number of bytes written, or `None` if `buf` is too small.
#[must_use]
pub fn build_rrq(buf: &mut [u8], name: &str, blksize: u16) -> Option<usize> {
    let size = blksize.to_string();
    let fields: [&[u8]; 4] = [name.as_bytes(), b"octet", b"blksize", size.as_bytes()];
    let needed = 2 + fields.iter().map(|f| f.len() + 1).sum::<usize>();
    if buf.len() < needed {
        return None;
    }
    buf[0..2].copy_from_slice(&TFTP_RRQ.to_be_bytes());
    let mut pos = 2;
    for field in fields {
        buf[pos..pos + field.len()].copy_from_slice(field);
        pos += field.len();
        buf[pos] = 0;
        pos += 1;
    }
    Some(pos)
}

/// An ACK for `block`
#[must_use]
pub fn build_ack(block: u16) -> [u8; TFTP_HLEN] {
    let mut buf = [0u8; TFTP_HLEN];
    buf[0..2].copy_from_slice(&TFTP_ACK.to_be_bytes());
    buf[2..4].copy_from_slice(&block.to_be_bytes());
    buf
}

/// An ERROR packet with `code` and a NUL-terminated `message`
#[must_use]
pub fn build_error(code: u16, message: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(TFTP_HLEN + message.len() + 1);
    buf.extend_from_slice(&TFTP_ERROR.to_be_bytes());
    buf.extend_from_slice(&code.to_be_bytes());
    buf.extend_from_slice(message.as_bytes());
    buf.push(0);
    buf
}

/// Errors while reading an OACK option list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OackError {
    /// The blksize value was not a plain decimal number
    #[error("bad blksize value")]
    BadValue,
}

/// Find the `blksize` value in an OACK option list.
///
/// Keys match case-insensitively. Unknown options are skipped. A missing
/// final NUL is tolerated.
pub fn oack_blksize(options: &[u8]) -> Result<Option<u64>, OackError> {
    let mut fields = options.split(|&b| b == 0);
    while let Some(key) = fields.next() {
        if key.is_empty() {
            break;
        }
        let value = fields.next().unwrap_or_default();
        if key.eq_ignore_ascii_case(b"blksize") {
            if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
                return Err(OackError::BadValue);
            }
            let size = value
                .iter()
                .try_fold(0u64, |acc, d| acc.checked_mul(10)?.checked_add(u64::from(d - b'0')))
                .ok_or(OackError::BadValue)?;
            return Ok(Some(size));
        }
    }
    Ok(None)
}
