//! Test utilities for the protocol engine
//!
//! A small lab network (client, boot server, ProxyDHCP server, one other
//! host) and a [`LabServer`] that answers the client's DHCP, ARP and TFTP
//! traffic through a [`MockNic`] responder.

use crate::arp::ArpRole;
use crate::config::ClientConfig;
use crate::error::NetbootError;
use crate::mock::frames;
use crate::mock::{MockClock, MockNic, Transmitted};
use crate::options::{find_option, msg, tag};
use crate::stack::NetStack;
use crate::tftp::{ImageSink, SinkStatus};
use crate::wire::arp::{ARP_REQUEST, ArpPacket};
use crate::wire::bootp::{BOOTP_CLIENT, BOOTP_REPLY, BOOTP_SERVER, BootpHeader, PROXYDHCP_SERVER, vendor_area};
use crate::wire::tftp::{TFTP_ACK, TFTP_PORT, TFTP_RRQ};
use crate::wire::{ETH_P_ARP, Mac};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};

pub const CLIENT_MAC: Mac = Mac([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);
pub const SERVER_MAC: Mac = Mac([0x52, 0x54, 0x00, 0xab, 0xcd, 0x01]);
pub const PROXY_MAC: Mac = Mac([0x52, 0x54, 0x00, 0xab, 0xcd, 0x02]);
pub const PEER_MAC: Mac = Mac([0x52, 0x54, 0x00, 0xab, 0xcd, 0x03]);

pub const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 20);
pub const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const PROXY_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub const PEER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 30);
pub const GATEWAY_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 254);
pub const NETMASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// First server-side TFTP transfer port
pub const SERVER_TFTP_PORT: u16 = 3000;

/// Default config with retry counts small enough for failure paths to
/// finish quickly
pub fn test_config() -> ClientConfig {
    ClientConfig {
        max_bootp_retries: 2,
        max_tftp_retries: 3,
        max_arp_retries: 2,
        backoff_limit: 2,
        retry_delay_secs: 1,
        ..ClientConfig::default()
    }
}

/// A NIC for [`CLIENT_MAC`] on a fresh clock
pub fn mock_nic() -> MockNic {
    MockNic::new(CLIENT_MAC, MockClock::new(1_000))
}

pub fn new_stack(nic: &MockNic, config: &ClientConfig) -> NetStack<MockNic, MockClock> {
    NetStack::new(nic.clone(), nic.clock(), config)
}

/// A stack bound to [`CLIENT_IP`]/24 that already knows the server's MAC
pub fn bound_stack(nic: &MockNic) -> NetStack<MockNic, MockClock> {
    let mut stack = new_stack(nic, &test_config());
    stack.arp_table_mut().set_ip(ArpRole::Client, CLIENT_IP);
    stack.arp_table_mut().set(ArpRole::Server, SERVER_IP, SERVER_MAC);
    stack.set_netmask(NETMASK);
    stack
}

/// UDP frame from the boot server to the client
pub fn from_server(src_port: u16, dst: Ipv4Addr, dst_port: u16, payload: &[u8]) -> Vec<u8> {
    frames::udp(
        SERVER_MAC,
        CLIENT_MAC,
        SocketAddrV4::new(SERVER_IP, src_port),
        SocketAddrV4::new(dst, dst_port),
        payload,
    )
}

/// A BOOTP/DHCP message the client sent, as a server reads it
#[derive(Debug, Clone)]
pub struct ClientMessage {
    pub header: BootpHeader,
    /// Destination address and port of the datagram
    pub to: SocketAddrV4,
    /// Source address of the datagram
    pub from: Ipv4Addr,
    /// Raw UDP payload
    pub payload: Vec<u8>,
}

impl ClientMessage {
    pub fn parse(sent: &Transmitted) -> Option<Self> {
        let ip = sent.ip()?;
        let (udp, payload) = sent.udp()?;
        if udp.dst_port != BOOTP_SERVER && udp.dst_port != PROXYDHCP_SERVER {
            return None;
        }
        Some(Self {
            header: BootpHeader::parse(payload)?,
            to: SocketAddrV4::new(ip.dst, udp.dst_port),
            from: ip.src,
            payload: payload.to_vec(),
        })
    }

    pub fn option(&self, wanted: u8) -> Option<&[u8]> {
        find_option(vendor_area(&self.payload), wanted)
    }

    pub fn msg_type(&self) -> Option<u8> {
        self.option(tag::MSG_TYPE)?.first().copied()
    }
}

/// Every BOOTP/DHCP message the client sent, in order
pub fn client_messages(nic: &MockNic) -> Vec<ClientMessage> {
    nic.transmitted().iter().filter_map(ClientMessage::parse).collect()
}

fn be16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

/// Image sink that records everything it is handed
#[derive(Debug, Default)]
pub struct Collector {
    /// `(block, len, eof)` per call
    pub calls: Vec<(u32, usize, bool)>,
    pub data: Vec<u8>,
}

impl ImageSink for Collector {
    fn accept(&mut self, data: &[u8], block: u32, eof: bool) -> Result<SinkStatus, NetbootError> {
        self.calls.push((block, data.len(), eof));
        self.data.extend_from_slice(data);
        Ok(if eof { SinkStatus::Complete } else { SinkStatus::More })
    }
}

/// Deterministic file content
pub fn image(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[derive(Debug, Clone)]
pub(crate) struct Transfer {
    client_port: u16,
    server_port: u16,
    data: Vec<u8>,
    block_size: usize,
    /// Next block to send
    next: u16,
}

impl Transfer {
    fn block(&self, number: u16) -> Option<&[u8]> {
        let start = (usize::from(number) - 1) * self.block_size;
        if start > self.data.len() {
            return None;
        }
        let end = (start + self.block_size).min(self.data.len());
        Some(&self.data[start..end])
    }
}

/// The servers of the lab network.
#[derive(Debug, Clone)]
pub struct LabServer {
    /// Answer DISCOVER and REQUEST
    pub dhcp: bool,
    /// Also run a ProxyDHCP server on [`PROXY_IP`]
    pub proxy: bool,
    /// `file` field of OFFER and ACK
    pub boot_file: String,
    /// Extra records for OFFER and ACK
    pub extra_options: Vec<(u8, Vec<u8>)>,
    /// REQUESTs answered with NAK before the first ACK
    pub naks: u32,
    /// Queue an ARP request for the offered address ahead of the ACK
    pub arp_before_ack: bool,
    /// Files served over TFTP
    pub files: HashMap<String, Vec<u8>>,
    /// blksize value to OACK; `None` skips negotiation
    pub oack_blksize: Option<String>,
    /// Send this DATA block twice in a row
    pub duplicate_block: Option<u16>,
    pub(crate) transfer: Option<Transfer>,
    pub(crate) transfers: u16,
}

impl Default for LabServer {
    fn default() -> Self {
        Self {
            dhcp: true,
            proxy: false,
            boot_file: "pxelinux.0".to_string(),
            extra_options: Vec::new(),
            naks: 0,
            arp_before_ack: false,
            files: HashMap::new(),
            oack_blksize: None,
            duplicate_block: None,
            transfer: None,
            transfers: 0,
        }
    }
}

impl LabServer {
    /// Serve `content` as `name`
    pub fn with_file(mut self, name: &str, content: Vec<u8>) -> Self {
        self.files.insert(name.to_string(), content);
        self
    }

    /// Answer everything `nic` transmits from now on
    pub fn install(mut self, nic: &MockNic) {
        nic.set_responder(move |sent| self.respond(sent));
    }

    fn respond(&mut self, sent: &Transmitted) -> Vec<Vec<u8>> {
        if sent.ethertype == ETH_P_ARP {
            return answer_arp(sent);
        }
        let Some((udp, payload)) = sent.udp() else {
            return Vec::new();
        };
        match udp.dst_port {
            BOOTP_SERVER => ClientMessage::parse(sent).map(|m| self.answer_dhcp(&m)).unwrap_or_default(),
            PROXYDHCP_SERVER => ClientMessage::parse(sent).map(|m| self.answer_proxy(&m)).unwrap_or_default(),
            TFTP_PORT => self.answer_rrq(udp.src_port, payload),
            port if self.transfer.as_ref().is_some_and(|t| t.server_port == port) => self.answer_ack(payload),
            _ => Vec::new(),
        }
    }

    fn answer_dhcp(&mut self, request: &ClientMessage) -> Vec<Vec<u8>> {
        let xid = request.header.xid;
        let mut replies = Vec::new();
        if self.proxy && request.msg_type() == Some(msg::DISCOVER) {
            replies.push(proxy_reply(xid, "pxe/offer.0"));
        }
        if !self.dhcp {
            return replies;
        }
        let kind = match request.msg_type() {
            Some(msg::DISCOVER) => msg::OFFER,
            Some(msg::REQUEST) if self.naks > 0 => {
                self.naks -= 1;
                msg::NAK
            }
            Some(msg::REQUEST) => msg::ACK,
            _ => return replies,
        };
        if kind == msg::ACK && self.arp_before_ack {
            replies.push(frames::arp_request(SERVER_MAC, SERVER_IP, CLIENT_IP));
        }

        let mut header = BootpHeader::request(xid, CLIENT_MAC);
        header.op = BOOTP_REPLY;
        let mut options = vec![(tag::MSG_TYPE, vec![kind]), (tag::SERVER_ID, SERVER_IP.octets().to_vec())];
        let file = if kind == msg::NAK {
            ""
        } else {
            // RFC2131 servers leave siaddr zero in a NAK
            header.siaddr = SERVER_IP;
            header.yiaddr = CLIENT_IP;
            options.push((tag::NETMASK, NETMASK.octets().to_vec()));
            options.push((tag::GATEWAY, GATEWAY_IP.octets().to_vec()));
            options.extend(self.extra_options.iter().cloned());
            self.boot_file.as_str()
        };
        let records: Vec<(u8, &[u8])> = options.iter().map(|(t, v)| (*t, v.as_slice())).collect();
        let reply = frames::bootp_reply(&header, file, Some(records.as_slice()));
        replies.push(from_server(BOOTP_SERVER, Ipv4Addr::BROADCAST, BOOTP_CLIENT, &reply));
        replies
    }

    fn answer_proxy(&mut self, request: &ClientMessage) -> Vec<Vec<u8>> {
        if !self.proxy {
            return Vec::new();
        }
        vec![proxy_reply(request.header.xid, "pxe/boot.0")]
    }

    fn answer_rrq(&mut self, client_port: u16, payload: &[u8]) -> Vec<Vec<u8>> {
        if payload.len() < 2 || be16(payload, 0) != TFTP_RRQ {
            return Vec::new();
        }
        let name = payload[2..].split(|&b| b == 0).next().unwrap_or_default();
        let name = String::from_utf8_lossy(name).into_owned();
        let server_port = SERVER_TFTP_PORT + self.transfers;
        self.transfers += 1;
        let reply = |payload: &[u8]| from_server(server_port, CLIENT_IP, client_port, payload);

        let Some(data) = self.files.get(&name).cloned() else {
            return vec![reply(&frames::tftp_error(1, "File not found"))];
        };
        let mut transfer = Transfer { client_port, server_port, data, block_size: 512, next: 1 };
        let replies = if let Some(blksize) = &self.oack_blksize {
            transfer.block_size = blksize.parse().unwrap_or(512);
            vec![reply(&frames::tftp_oack(&[("blksize", blksize)]))]
        } else {
            self.data_frames(&mut transfer)
        };
        self.transfer = Some(transfer);
        replies
    }

    fn answer_ack(&mut self, payload: &[u8]) -> Vec<Vec<u8>> {
        if payload.len() < 4 || be16(payload, 0) != TFTP_ACK {
            return Vec::new();
        }
        let block = be16(payload, 2);
        let Some(mut transfer) = self.transfer.take() else {
            return Vec::new();
        };
        // Duplicate ACKs are not answered
        let replies = if block.wrapping_add(1) == transfer.next {
            self.data_frames(&mut transfer)
        } else {
            Vec::new()
        };
        self.transfer = Some(transfer);
        replies
    }

    fn data_frames(&self, transfer: &mut Transfer) -> Vec<Vec<u8>> {
        let number = transfer.next;
        let Some(block) = transfer.block(number) else {
            return Vec::new();
        };
        let frame = from_server(
            transfer.server_port,
            CLIENT_IP,
            transfer.client_port,
            &frames::tftp_data(number, block),
        );
        transfer.next += 1;
        if self.duplicate_block == Some(number) {
            vec![frame.clone(), frame]
        } else {
            vec![frame]
        }
    }
}

fn answer_arp(sent: &Transmitted) -> Vec<Vec<u8>> {
    let Some(arp) = ArpPacket::parse(&sent.payload).filter(|arp| arp.opcode == ARP_REQUEST) else {
        return Vec::new();
    };
    let owner = match arp.target_ip {
        ip if ip == SERVER_IP => SERVER_MAC,
        ip if ip == PROXY_IP => PROXY_MAC,
        _ => return Vec::new(),
    };
    vec![frames::arp_reply(owner, arp.target_ip, arp.sender_mac, arp.sender_ip)]
}

/// ProxyDHCP answer: no address, boot information only
fn proxy_reply(xid: u32, file: &str) -> Vec<u8> {
    let mut header = BootpHeader::request(xid, CLIENT_MAC);
    header.op = BOOTP_REPLY;
    header.siaddr = PROXY_IP;
    let records: [(u8, &[u8]); 1] = [(tag::VENDOR_CLASS_ID, b"PXEClient")];
    let reply = frames::bootp_reply(&header, file, Some(&records[..]));
    frames::udp(
        PROXY_MAC,
        CLIENT_MAC,
        SocketAddrV4::new(PROXY_IP, BOOTP_SERVER),
        SocketAddrV4::new(Ipv4Addr::BROADCAST, BOOTP_CLIENT),
        &reply,
    )
}
