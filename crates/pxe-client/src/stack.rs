//! Packet dispatch
//!
//! [`NetStack`] owns the NIC, the single receive buffer and the shared
//! protocol state (ARP table, IGMP memberships, link-aggregation state).
//! Every wait in the engine goes through [`NetStack::await_reply`], which
//! keeps answering ARP, IGMP and LACP traffic while a caller waits for its
//! own reply.

use crate::arp::{ArpRole, ArpTable};
use crate::backoff::Backoff;
use crate::checksum::{ip_checksum, transport_checksum};
use crate::clock::Clock;
use crate::config::ClientConfig;
use crate::error::NetbootError;
use crate::igmp::IgmpTable;
use crate::lacp::{LacpState, SlowFrame};
use crate::nic::Nic;
use crate::wire::arp::ArpPacket;
use crate::wire::igmp::IgmpMessage;
use crate::wire::ipv4::{IP_HLEN, IP_IGMP, IP_TCP, IP_UDP, Ipv4Header, build_header};
use crate::wire::udp::{TCP_HLEN, TcpHeader, UDP_HLEN, UdpHeader};
use crate::wire::{
    ETH_FRAME_LEN, ETH_HLEN, ETH_MAX_MTU, ETH_P_ARP, ETH_P_IP, ETH_P_SLOW, Mac, be16, ipv4_at,
    mac_at,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// TTL of every UDP datagram we send
pub const UDP_TTL: u8 = 60;

/// Layers parsed out of the frame currently in the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RxMeta {
    len: usize,
    ethertype: u16,
    source: Mac,
    ip: Option<Ipv4Header>,
    udp: Option<UdpHeader>,
    tcp: Option<TcpHeader>,
    payload_start: usize,
    payload_end: usize,
}

/// A validated received frame.
///
/// IP frames have passed header and transport checksum checks and have had
/// any IP options removed, so the IP header is always 20 bytes.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    meta: RxMeta,
    data: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Ethernet type
    #[must_use]
    pub fn ethertype(&self) -> u16 {
        self.meta.ethertype
    }

    /// Ethernet source address
    #[must_use]
    pub fn source(&self) -> Mac {
        self.meta.source
    }

    /// IPv4 header, for IP frames
    #[must_use]
    pub fn ip(&self) -> Option<&Ipv4Header> {
        self.meta.ip.as_ref()
    }

    /// UDP header, for UDP datagrams
    #[must_use]
    pub fn udp(&self) -> Option<&UdpHeader> {
        self.meta.udp.as_ref()
    }

    /// TCP header, for TCP segments
    #[must_use]
    pub fn tcp(&self) -> Option<&TcpHeader> {
        self.meta.tcp.as_ref()
    }

    /// Innermost payload: after the transport header for UDP/TCP, after the
    /// IP header for other IP protocols, after the Ethernet header otherwise
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.meta.payload_start..self.meta.payload_end]
    }

    /// Everything after the Ethernet header
    #[must_use]
    pub fn network(&self) -> &'a [u8] {
        &self.data[ETH_HLEN..self.meta.len]
    }

    /// The ARP/RARP packet carried by this frame, if any
    #[must_use]
    pub fn arp(&self) -> Option<ArpPacket> {
        if self.meta.ethertype == ETH_P_ARP {
            ArpPacket::parse(self.payload())
        } else {
            None
        }
    }
}

/// The protocol engine's view of one network interface.
#[derive(Debug)]
pub struct NetStack<N: Nic, C: Clock> {
    pub(crate) nic: N,
    clock: C,
    abort: Arc<AtomicBool>,
    pub(crate) mac: Mac,
    packet: [u8; ETH_FRAME_LEN],
    rx: Option<RxMeta>,
    pub(crate) arp: ArpTable,
    pub(crate) netmask: Ipv4Addr,
    pub(crate) igmp: IgmpTable,
    pub(crate) lacp: Option<LacpState>,
    pub(crate) backoff: Backoff,
    pub(crate) max_arp_retries: u32,
    fragment_warned: bool,
}

impl<N: Nic, C: Clock> NetStack<N, C> {
    /// Bring up the engine on `nic`
    pub fn new(nic: N, clock: C, config: &ClientConfig) -> Self {
        let mac = nic.mac();
        let now = clock.now();
        Self {
            nic,
            abort: Arc::new(AtomicBool::new(false)),
            mac,
            packet: [0; ETH_FRAME_LEN],
            rx: None,
            arp: ArpTable::new(),
            netmask: Ipv4Addr::UNSPECIFIED,
            igmp: IgmpTable::new(),
            lacp: config.lacp.then(|| LacpState::new(mac)),
            backoff: Backoff::for_station(mac, now, config.backoff_limit),
            max_arp_retries: config.max_arp_retries,
            fragment_warned: false,
            clock,
        }
    }

    /// Flag that aborts the current wait when set; checked while the
    /// receive queue is empty
    #[must_use]
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Station address
    #[must_use]
    pub fn mac(&self) -> Mac {
        self.mac
    }

    /// Current tick
    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// The NIC collaborator
    #[must_use]
    pub fn nic(&self) -> &N {
        &self.nic
    }

    /// ARP table
    #[must_use]
    pub fn arp_table(&self) -> &ArpTable {
        &self.arp
    }

    /// ARP table, mutably
    pub fn arp_table_mut(&mut self) -> &mut ArpTable {
        &mut self.arp
    }

    /// Our address, 0.0.0.0 before discovery
    #[must_use]
    pub fn client_ip(&self) -> Ipv4Addr {
        self.arp.ip(ArpRole::Client)
    }

    /// Subnet mask used for next-hop selection
    #[must_use]
    pub fn netmask(&self) -> Ipv4Addr {
        self.netmask
    }

    /// Set the subnet mask
    pub fn set_netmask(&mut self, netmask: Ipv4Addr) {
        self.netmask = netmask;
    }

    /// Wait up to `timeout` ticks for a frame `predicate` accepts.
    ///
    /// Every iteration first runs the periodic IGMP and LACP senders, then
    /// polls the NIC once. Frames the predicate declines are handed to the
    /// ARP, slow-protocol and IGMP responders. The deadline is only checked
    /// while the receive queue is empty. A `timeout` of 0 drains the queue
    /// once and returns.
    ///
    /// Returns `Ok(None)` on timeout. After `Ok(Some(_))` the accepted frame
    /// stays available through [`NetStack::received`] until the next wait.
    ///
    /// # Errors
    ///
    /// [`NetbootError::Aborted`] when the abort flag is raised.
    pub fn await_reply<T, P>(&mut self, timeout: u64, mut predicate: P) -> Result<Option<T>, NetbootError>
    where
        P: FnMut(&Frame<'_>) -> Option<T>,
    {
        let deadline = self.clock.now().saturating_add(timeout);
        loop {
            let now = self.clock.now();
            self.send_lacp_reports(now);
            self.send_igmp_reports(now);

            self.rx = None;
            let Some(len) = self.nic.poll(&mut self.packet) else {
                if self.abort.load(Ordering::Relaxed) {
                    return Err(NetbootError::Aborted);
                }
                if timeout == 0 || self.clock.now() > deadline {
                    return Ok(None);
                }
                continue;
            };

            let Some(meta) = classify(&mut self.packet, len.min(ETH_FRAME_LEN), &mut self.fragment_warned)
            else {
                continue;
            };
            let frame = Frame { meta, data: &self.packet };
            if let Some(result) = predicate(&frame) {
                self.rx = Some(meta);
                return Ok(Some(result));
            }

            let arp = frame.arp();
            let slow = (meta.ethertype == ETH_P_SLOW).then(|| SlowFrame::parse(frame.payload())).flatten();
            let igmp = meta
                .ip
                .filter(|ip| ip.protocol == IP_IGMP)
                .and_then(|ip| IgmpMessage::parse(frame.payload()).map(|msg| (ip, msg)));

            if let Some(arp) = arp {
                self.answer_arp(&arp);
            }
            if let Some(slow) = slow {
                self.process_slow(&slow, now);
            }
            if let Some((ip, msg)) = igmp {
                self.process_igmp(&ip, &msg, now);
            }
        }
    }

    /// Discard everything queued, still answering ARP/IGMP/LACP
    pub fn rx_qdrain(&mut self) -> Result<(), NetbootError> {
        self.await_reply(0, |_| None::<()>).map(|_| ())
    }

    /// Idle for `ticks` while servicing background traffic
    pub fn sleep(&mut self, ticks: u64) -> Result<(), NetbootError> {
        self.await_reply(ticks.max(1), |_| None::<()>).map(|_| ())
    }

    /// The frame accepted by the last successful [`NetStack::await_reply`]
    #[must_use]
    pub fn received(&self) -> Option<Frame<'_>> {
        self.rx.map(|meta| Frame { meta, data: &self.packet })
    }

    /// Send a complete IP datagram, resolving the next hop first
    pub fn ip_transmit(&mut self, datagram: &[u8]) -> Result<(), NetbootError> {
        if datagram.len() < IP_HLEN {
            return Err(NetbootError::Configuration("IP datagram shorter than its header".to_string()));
        }
        let dest = ipv4_at(datagram, 16);
        let mac = if dest.is_broadcast() {
            Mac::BROADCAST
        } else if dest.is_multicast() {
            Mac::multicast(dest)
        } else {
            self.resolve(dest)?
        };
        self.nic.transmit(mac, ETH_P_IP, datagram);
        Ok(())
    }

    /// Send `payload` in a UDP datagram from our address
    pub fn udp_transmit(
        &mut self,
        dest: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        payload: &[u8],
    ) -> Result<(), NetbootError> {
        let total = IP_HLEN + UDP_HLEN + payload.len();
        let total_len = u16::try_from(total)
            .ok()
            .filter(|&len| usize::from(len) <= ETH_MAX_MTU)
            .ok_or_else(|| {
                NetbootError::Configuration(format!(
                    "UDP payload of {} bytes does not fit one frame",
                    payload.len()
                ))
            })?;
        let src = self.client_ip();
        let mut buf = [0u8; ETH_MAX_MTU];
        let udp = UdpHeader { src_port, dst_port, len: total_len - 20, checksum: 0 };
        udp.emit(&mut buf[IP_HLEN..]);
        buf[IP_HLEN + UDP_HLEN..total].copy_from_slice(payload);
        build_header(&mut buf, src, dest, UDP_TTL, IP_UDP, 0, total_len);
        let sum = match transport_checksum(src, dest, IP_UDP, &buf[IP_HLEN..total]) {
            0 => 0xFFFF,
            sum => sum,
        };
        buf[IP_HLEN + 6..IP_HLEN + 8].copy_from_slice(&sum.to_be_bytes());
        self.ip_transmit(&buf[..total])
    }
}

/// Validate and parse the frame in `packet[..len]`, stripping IP options in
/// place. `None` means drop it silently.
fn classify(packet: &mut [u8], len: usize, fragment_warned: &mut bool) -> Option<RxMeta> {
    if len < ETH_HLEN {
        return None;
    }
    let ethertype = be16(packet, 12);
    let source = mac_at(packet, 6);
    let mut meta = RxMeta {
        len,
        ethertype,
        source,
        ip: None,
        udp: None,
        tcp: None,
        payload_start: ETH_HLEN,
        payload_end: len,
    };
    if ethertype != ETH_P_IP {
        return Some(meta);
    }

    let mut ip = Ipv4Header::parse(&packet[ETH_HLEN..len])?;
    if !(0x45..=0x4F).contains(&ip.verhdrlen) {
        return None;
    }
    let hlen = ip.header_len();
    if len < ETH_HLEN + hlen || ip_checksum(&packet[ETH_HLEN..ETH_HLEN + hlen]) != 0 {
        return None;
    }
    let mut total = usize::from(ip.total_len);
    if total < hlen || total > ETH_MAX_MTU || ETH_HLEN + total > len {
        return None;
    }
    if ip.is_fragment() {
        if !*fragment_warned {
            warn!("ALERT: got a fragmented packet - reconfigure your server");
            *fragment_warned = true;
        }
        return None;
    }

    if hlen > IP_HLEN {
        packet.copy_within(ETH_HLEN + hlen..ETH_HLEN + total, ETH_HLEN + IP_HLEN);
        total -= hlen - IP_HLEN;
        ip.verhdrlen = 0x45;
        ip.total_len = u16::try_from(total).ok()?;
        ip.checksum = 0;
        ip.emit(&mut packet[ETH_HLEN..]);
        let sum = ip_checksum(&packet[ETH_HLEN..ETH_HLEN + IP_HLEN]);
        packet[ETH_HLEN + 10..ETH_HLEN + 12].copy_from_slice(&sum.to_be_bytes());
        ip.checksum = sum;
    }
    meta.len = ETH_HLEN + total;
    meta.payload_start = ETH_HLEN + IP_HLEN;
    meta.payload_end = ETH_HLEN + total;

    let segment = &packet[ETH_HLEN + IP_HLEN..ETH_HLEN + total];
    match ip.protocol {
        IP_UDP => {
            let udp = UdpHeader::parse(segment)?;
            let udp_len = usize::from(udp.len);
            if udp_len < UDP_HLEN || udp_len > segment.len() {
                return None;
            }
            if udp.checksum != 0 && transport_checksum(ip.src, ip.dst, IP_UDP, &segment[..udp_len]) != 0 {
                debug!(src = %ip.src, "UDP checksum error");
                return None;
            }
            meta.udp = Some(udp);
            meta.payload_start += UDP_HLEN;
            meta.payload_end = meta.payload_start + udp_len - UDP_HLEN;
        }
        IP_TCP => {
            let tcp = TcpHeader::parse(segment)?;
            let tcp_hlen = tcp.header_len();
            if tcp_hlen < TCP_HLEN || tcp_hlen > segment.len() {
                return None;
            }
            if transport_checksum(ip.src, ip.dst, IP_TCP, segment) != 0 {
                debug!(src = %ip.src, "TCP checksum error");
                return None;
            }
            meta.tcp = Some(tcp);
            meta.payload_start += tcp_hlen;
        }
        _ => {}
    }
    meta.ip = Some(ip);
    Some(meta)
}
