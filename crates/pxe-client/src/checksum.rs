//! Internet checksum (RFC1071)
//!
//! Used for IPv4 headers, the UDP/TCP pseudo-header plus segment, and IGMP
//! messages. Callers zero the checksum field before computing.

use std::net::Ipv4Addr;

/// One's-complement sum of 16-bit big-endian words, complemented.
///
/// An odd trailing byte is treated as if padded with a zero byte.
#[must_use]
pub fn ip_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut words = data.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
        if sum > 0xFFFF {
            sum -= 0xFFFF;
        }
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
        if sum > 0xFFFF {
            sum -= 0xFFFF;
        }
    }
    !fold(sum)
}

/// Combine the checksum of a range starting at `offset` into a running checksum.
///
/// `sum` covers the bytes before `offset`, `new` covers the bytes from
/// `offset` on, each computed independently with [`ip_checksum`]. When the
/// second range starts at an odd offset its words straddle the first range's
/// word boundaries, so its sum is byte-swapped before being added.
#[must_use]
pub fn add_checksums(offset: usize, sum: u16, new: u16) -> u16 {
    let mut new = !new;
    if offset & 1 == 1 {
        new = new.swap_bytes();
    }
    let mut total = u32::from(!sum) + u32::from(new);
    if total > 0xFFFF {
        total -= 0xFFFF;
    }
    !fold(total)
}

/// Checksum of a UDP or TCP segment including the IPv4 pseudo-header.
///
/// Over a received segment with its checksum field intact the result is 0.
#[must_use]
pub fn transport_checksum(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, segment: &[u8]) -> u16 {
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&src.octets());
    pseudo[4..8].copy_from_slice(&dst.octets());
    pseudo[9] = protocol;
    let len = u16::try_from(segment.len()).unwrap_or(u16::MAX);
    pseudo[10..12].copy_from_slice(&len.to_be_bytes());
    add_checksums(pseudo.len(), ip_checksum(&pseudo), ip_checksum(segment))
}

fn fold(sum: u32) -> u16 {
    u16::try_from(sum & 0xFFFF).unwrap_or(u16::MAX)
}
