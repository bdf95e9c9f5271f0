//! Frame builders for the server side of a test

use crate::checksum::transport_checksum;
use crate::lacp::{LacpInfo, SLOW_DEST, build_lacpdu};
use crate::options::OptionWriter;
use crate::wire::arp::{ARP_REPLY, ARP_REQUEST, ArpPacket, RARP_REPLY};
use crate::wire::bootp::{BOOTP_FIXED_LEN, BOOTP_VENDOR_LEN, BootpHeader, DHCP_OPT_LEN, set_boot_file};
use crate::wire::igmp::IgmpMessage;
use crate::wire::ipv4::{IP_HLEN, IP_IGMP, IP_UDP, build_header};
use crate::wire::tftp::{TFTP_DATA, TFTP_OACK, build_error};
use crate::wire::udp::{UDP_HLEN, UdpHeader};
use crate::wire::{ETH_HLEN, ETH_P_ARP, ETH_P_IP, ETH_P_RARP, ETH_P_SLOW, Mac};
use std::net::{Ipv4Addr, SocketAddrV4};

/// TTL of every datagram built here
pub const SERVER_TTL: u8 = 64;

/// Prefix `payload` with an Ethernet header
#[must_use]
pub fn ethernet(dest: Mac, src: Mac, ethertype: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(ETH_HLEN + payload.len());
    frame.extend_from_slice(&dest.0);
    frame.extend_from_slice(&src.0);
    frame.extend_from_slice(&ethertype.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// An IPv4 datagram with `options` (a multiple of 4 bytes) after the header
#[must_use]
pub fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, options: &[u8], payload: &[u8]) -> Vec<u8> {
    let hlen = IP_HLEN + options.len();
    let mut datagram = vec![0u8; hlen + payload.len()];
    datagram[IP_HLEN..hlen].copy_from_slice(options);
    datagram[hlen..].copy_from_slice(payload);
    let total = u16::try_from(datagram.len()).unwrap_or(u16::MAX);
    build_header(&mut datagram, src, dst, SERVER_TTL, protocol, options.len(), total);
    datagram
}

/// A UDP segment with a valid checksum
#[must_use]
pub fn udp_segment(src: SocketAddrV4, dst: SocketAddrV4, payload: &[u8]) -> Vec<u8> {
    let mut segment = vec![0u8; UDP_HLEN + payload.len()];
    let header = UdpHeader {
        src_port: src.port(),
        dst_port: dst.port(),
        len: u16::try_from(segment.len()).unwrap_or(u16::MAX),
        checksum: 0,
    };
    header.emit(&mut segment);
    segment[UDP_HLEN..].copy_from_slice(payload);
    let sum = match transport_checksum(*src.ip(), *dst.ip(), IP_UDP, &segment) {
        0 => 0xFFFF,
        sum => sum,
    };
    segment[6..8].copy_from_slice(&sum.to_be_bytes());
    segment
}

/// A complete UDP frame
#[must_use]
pub fn udp(src_mac: Mac, dst_mac: Mac, src: SocketAddrV4, dst: SocketAddrV4, payload: &[u8]) -> Vec<u8> {
    udp_with_ip_options(src_mac, dst_mac, src, dst, &[], payload)
}

/// A complete UDP frame whose IP header carries `options`
#[must_use]
pub fn udp_with_ip_options(
    src_mac: Mac,
    dst_mac: Mac,
    src: SocketAddrV4,
    dst: SocketAddrV4,
    options: &[u8],
    payload: &[u8],
) -> Vec<u8> {
    let segment = udp_segment(src, dst, payload);
    ethernet(dst_mac, src_mac, ETH_P_IP, &ipv4(*src.ip(), *dst.ip(), IP_UDP, options, &segment))
}

/// A broadcast ARP request from `sender` asking for `target`
#[must_use]
pub fn arp_request(sender_mac: Mac, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Vec<u8> {
    let arp = ArpPacket::new(ARP_REQUEST, sender_mac, sender_ip, Mac::ZERO, target_ip);
    ethernet(Mac::BROADCAST, sender_mac, ETH_P_ARP, &arp.to_bytes())
}

/// An ARP reply telling `target` that `sender_ip` is at `sender_mac`
#[must_use]
pub fn arp_reply(sender_mac: Mac, sender_ip: Ipv4Addr, target_mac: Mac, target_ip: Ipv4Addr) -> Vec<u8> {
    let arp = ArpPacket::new(ARP_REPLY, sender_mac, sender_ip, target_mac, target_ip);
    ethernet(target_mac, sender_mac, ETH_P_ARP, &arp.to_bytes())
}

/// A RARP reply assigning `client_ip` to `client_mac`
#[must_use]
pub fn rarp_reply(server_mac: Mac, server_ip: Ipv4Addr, client_mac: Mac, client_ip: Ipv4Addr) -> Vec<u8> {
    let arp = ArpPacket::new(RARP_REPLY, server_mac, server_ip, client_mac, client_ip);
    ethernet(client_mac, server_mac, ETH_P_RARP, &arp.to_bytes())
}

/// An IGMP message from `src_ip` to `dst`
#[must_use]
pub fn igmp(src_mac: Mac, src_ip: Ipv4Addr, dst: Ipv4Addr, message: &IgmpMessage) -> Vec<u8> {
    ethernet(Mac::multicast(dst), src_mac, ETH_P_IP, &ipv4(src_ip, dst, IP_IGMP, &[], &message.to_bytes()))
}

/// A LACPDU from the link partner
#[must_use]
pub fn lacpdu(src_mac: Mac, actor: &LacpInfo, partner: &LacpInfo) -> Vec<u8> {
    ethernet(SLOW_DEST, src_mac, ETH_P_SLOW, &build_lacpdu(actor, partner))
}

/// A marker information PDU
#[must_use]
pub fn marker_info(src_mac: Mac, port: u16, transaction: u32) -> Vec<u8> {
    let mut pdu = [0u8; 110];
    // subtype, version, information TLV, its length
    pdu[..4].copy_from_slice(&[2, 1, 1, 0x16]);
    pdu[4..6].copy_from_slice(&port.to_be_bytes());
    pdu[6..12].copy_from_slice(&src_mac.0);
    pdu[12..16].copy_from_slice(&transaction.to_be_bytes());
    ethernet(SLOW_DEST, src_mac, ETH_P_SLOW, &pdu)
}

/// BOOTP/DHCP reply payload.
///
/// `options` are written as an RFC1533 block after the cookie; with `None`
/// the 64-byte vendor area is left all zero, as plain BOOTP servers send it.
#[must_use]
pub fn bootp_reply(header: &BootpHeader, file: &str, options: Option<&[(u8, &[u8])]>) -> Vec<u8> {
    let mut packet = vec![0u8; BOOTP_FIXED_LEN + DHCP_OPT_LEN];
    header.emit(&mut packet);
    set_boot_file(&mut packet, file);
    let Some(options) = options else {
        packet.truncate(BOOTP_FIXED_LEN + BOOTP_VENDOR_LEN);
        return packet;
    };
    let len = match OptionWriter::new(&mut packet[BOOTP_FIXED_LEN..]) {
        Ok(mut writer) => {
            for (tag, value) in options {
                if writer.put(*tag, value).is_err() {
                    break;
                }
            }
            writer.finish()
        }
        Err(_) => 0,
    };
    packet.truncate(BOOTP_FIXED_LEN + len.max(BOOTP_VENDOR_LEN));
    packet
}

/// TFTP DATA payload
#[must_use]
pub fn tftp_data(block: u16, data: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(4 + data.len());
    packet.extend_from_slice(&TFTP_DATA.to_be_bytes());
    packet.extend_from_slice(&block.to_be_bytes());
    packet.extend_from_slice(data);
    packet
}

/// TFTP OACK payload with `key\0value\0` pairs
#[must_use]
pub fn tftp_oack(options: &[(&str, &str)]) -> Vec<u8> {
    let mut packet = TFTP_OACK.to_be_bytes().to_vec();
    for (key, value) in options {
        packet.extend_from_slice(key.as_bytes());
        packet.push(0);
        packet.extend_from_slice(value.as_bytes());
        packet.push(0);
    }
    packet
}

/// TFTP ERROR payload
#[must_use]
pub fn tftp_error(code: u16, message: &str) -> Vec<u8> {
    build_error(code, message)
}
