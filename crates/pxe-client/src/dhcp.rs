//! BOOTP/DHCP and RARP discovery
//!
//! [`DhcpClient::discover`] obtains the client address, the boot server and
//! a boot file name. In DHCP mode the DISCOVER wait runs for the whole
//! backoff window so that both a DHCP OFFER and a ProxyDHCP offer can be
//! collected. An OFFER is then confirmed with a REQUEST; a NAK restarts
//! discovery from scratch. BOOTP-only servers are accepted as they are.

use crate::arp::{ARP_TIMEOUT, ArpRole, default_netmask};
use crate::clock::{Clock, TICKS_PER_SEC};
use crate::config::{ClientConfig, Discovery};
use crate::error::{NetbootError, OptionError};
use crate::nic::{DeviceId, Nic};
use crate::options::{OptionWriter, VendorOptions, find_option, msg, tag};
use crate::stack::NetStack;
use crate::wire::arp::{ArpPacket, RARP_REPLY, RARP_REQUEST};
use crate::wire::bootp::{
    BOOTP_CLIENT, BOOTP_FIXED_LEN, BOOTP_REPLY, BOOTP_SERVER, BOOTP_VENDOR_LEN, BootpHeader,
    DHCP_OPT_LEN, PROXYDHCP_SERVER, boot_file, vendor_area,
};
use crate::wire::{ETH_MAX_MTU, ETH_P_RARP, Mac};
use std::fmt;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// Base wait for replies to a DISCOVER (or BOOTREQUEST)
pub const BOOTP_TIMEOUT: u64 = 2 * TICKS_PER_SEC;
/// Base wait for the reply to a DHCPREQUEST
pub const DHCP_REQUEST_TIMEOUT: u64 = 10 * TICKS_PER_SEC;

const DISCOVER_PARAMS: [u8; 4] = [tag::NETMASK, tag::GATEWAY, tag::HOSTNAME, tag::VENDOR];
const REQUEST_PARAMS: [u8; 10] = [
    tag::NETMASK,
    tag::GATEWAY,
    tag::HOSTNAME,
    tag::VENDOR,
    tag::ROOT_PATH,
    tag::VENDOR_MAGIC,
    tag::VENDOR_ADDPARM,
    tag::VENDOR_ETHDEV,
    tag::ETHERBOOT_ENCAP,
    tag::VENDOR_HOWTO,
];

/// What a matching reply turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Carries an address for us (BOOTP reply, OFFER or ACK)
    Lease,
    /// No address: a ProxyDHCP server offering only boot information
    Proxy,
    /// DHCPNAK
    Nak,
}

/// Result of a successful discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Our address
    pub client: Ipv4Addr,
    /// Subnet mask (from the reply, or classful)
    pub netmask: Ipv4Addr,
    /// DHCP server identifier, when the reply was DHCP
    pub dhcp_server: Option<Ipv4Addr>,
    /// ProxyDHCP server, if one answered
    pub proxy_dhcp: Option<Ipv4Addr>,
    /// TFTP server (`siaddr`)
    pub tftp_server: Ipv4Addr,
    /// BOOTP relay agent (`giaddr`)
    pub relay: Option<Ipv4Addr>,
    /// Default router
    pub gateway: Option<Ipv4Addr>,
    /// DNS server
    pub nameserver: Option<Ipv4Addr>,
    /// Boot file name; empty when the server sent none and no default is set
    pub boot_file: String,
}

/// The configuration summary printed once discovery succeeds
impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Me: {}", self.client)?;
        if let Some(server) = self.dhcp_server {
            write!(f, ", DHCP: {server}")?;
            if let Some(proxy) = self.proxy_dhcp {
                write!(f, " (& {proxy})")?;
            }
        }
        write!(f, ", TFTP: {}", self.tftp_server)?;
        if let Some(relay) = self.relay {
            write!(f, ", Relay: {relay}")?;
        }
        if let Some(gateway) = self.gateway {
            write!(f, ", Gateway {gateway}")?;
        }
        if let Some(nameserver) = self.nameserver {
            write!(f, ", Nameserver {nameserver}")?;
        }
        Ok(())
    }
}

/// ELF machine number of the running target, sent in the machine-info option
#[must_use]
pub fn elf_machine() -> u16 {
    if cfg!(target_arch = "x86_64") {
        62
    } else if cfg!(target_arch = "x86") {
        3
    } else if cfg!(target_arch = "aarch64") {
        183
    } else if cfg!(target_arch = "arm") {
        40
    } else if cfg!(target_arch = "riscv64") || cfg!(target_arch = "riscv32") {
        243
    } else if cfg!(target_arch = "loongarch64") {
        258
    } else {
        0
    }
}

/// Etherboot encapsulated option 150 body: NIC device id and architecture
#[must_use]
pub fn machine_info(device: DeviceId) -> [u8; 11] {
    let vendor = device.vendor_id.to_be_bytes();
    let id = device.device_id.to_be_bytes();
    let arch = elf_machine().to_le_bytes();
    [
        tag::NIC_DEV_ID,
        5,
        device.bus_type,
        vendor[0],
        vendor[1],
        id[0],
        id[1],
        tag::ARCH,
        2,
        arch[0],
        arch[1],
    ]
}

/// BOOTP/DHCP/RARP client state for one boot attempt.
#[derive(Debug, Clone)]
pub struct DhcpClient {
    config: ClientConfig,
    options: VendorOptions,
    xid: u32,
    start: u64,
    boot_file: String,
    dhcp_server: Option<Ipv4Addr>,
    offered: Ipv4Addr,
    relay: Option<Ipv4Addr>,
    /// DHCP message type of the last reply carrying an address
    last_type: Option<u8>,
}

impl DhcpClient {
    /// A client for `config`'s discovery protocol
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            config: config.clone(),
            options: VendorOptions::new(),
            xid: 0,
            start: 0,
            boot_file: String::new(),
            dhcp_server: None,
            offered: Ipv4Addr::UNSPECIFIED,
            relay: None,
            last_type: None,
        }
    }

    /// Options decoded from the bound reply
    #[must_use]
    pub fn options(&self) -> &VendorOptions {
        &self.options
    }

    /// The option decoder, for feeding extension files
    pub fn options_mut(&mut self) -> &mut VendorOptions {
        &mut self.options
    }

    /// Transaction id of the current exchange
    #[must_use]
    pub fn xid(&self) -> u32 {
        self.xid
    }

    /// Find a server and configure the stack from its reply.
    ///
    /// # Errors
    ///
    /// [`NetbootError::NoServer`] after the configured retries,
    /// [`NetbootError::DhcpNak`] when the last attempt ended in a NAK,
    /// [`NetbootError::Aborted`] from any wait.
    pub fn discover<N: Nic, C: Clock>(&mut self, stack: &mut NetStack<N, C>) -> Result<Lease, NetbootError> {
        let protocol = match self.config.discovery {
            Discovery::Dhcp => "DHCP",
            Discovery::Bootp => "BOOTP",
            Discovery::Rarp => "RARP",
        };
        info!("Searching for server ({protocol})...");
        let result = match self.config.discovery {
            Discovery::Rarp => self.rarp(stack),
            Discovery::Dhcp | Discovery::Bootp => self.bootp(stack),
        };
        match result {
            Ok(lease) => {
                info!("{lease}");
                Ok(lease)
            }
            Err(err) => {
                if !matches!(err, NetbootError::Aborted) {
                    warn!("No Server found");
                }
                Err(err)
            }
        }
    }

    /// Push netmask, gateway and name server from the decoded options into
    /// the stack
    pub fn apply_options<N: Nic, C: Clock>(&self, stack: &mut NetStack<N, C>) {
        let decoded = self.options.decoded();
        if let Some(netmask) = decoded.netmask {
            stack.netmask = netmask;
        }
        if let Some(gateway) = decoded.gateway {
            stack.arp.set_ip(ArpRole::Gateway, gateway);
        }
        if self.config.request_dns {
            if let Some(nameserver) = decoded.nameserver {
                stack.arp.set_ip(ArpRole::Nameserver, nameserver);
            }
        }
    }

    /// Summary of the current configuration
    #[must_use]
    pub fn lease<N: Nic, C: Clock>(&self, stack: &NetStack<N, C>) -> Lease {
        let non_zero = |ip: Ipv4Addr| (!ip.is_unspecified()).then_some(ip);
        let arp = stack.arp_table();
        let boot_file = if self.boot_file.is_empty() {
            self.config.default_bootfile.clone().unwrap_or_default()
        } else {
            self.boot_file.clone()
        };
        Lease {
            client: arp.ip(ArpRole::Client),
            netmask: stack.netmask(),
            dhcp_server: self.dhcp_server,
            proxy_dhcp: non_zero(arp.ip(ArpRole::ProxyDhcp)),
            tftp_server: arp.ip(ArpRole::Server),
            relay: self.relay,
            gateway: non_zero(arp.ip(ArpRole::Gateway)),
            nameserver: non_zero(arp.ip(ArpRole::Nameserver)),
            boot_file,
        }
    }

    fn rarp<N: Nic, C: Clock>(&mut self, stack: &mut NetStack<N, C>) -> Result<Lease, NetbootError> {
        let mac = stack.mac();
        let request = ArpPacket::new(RARP_REQUEST, mac, Ipv4Addr::UNSPECIFIED, mac, Ipv4Addr::UNSPECIFIED);
        for retry in 0..self.config.max_arp_retries {
            stack.nic.transmit(Mac::BROADCAST, ETH_P_RARP, &request.to_bytes());
            let timeout = stack.backoff.rfc2131_interval(ARP_TIMEOUT, retry);
            let reply = stack.await_reply(timeout, |frame| {
                if frame.ethertype() != ETH_P_RARP {
                    return None;
                }
                ArpPacket::parse(frame.payload()).filter(|p| p.opcode == RARP_REPLY && p.target_mac == mac)
            })?;
            if let Some(reply) = reply {
                stack.arp.set(ArpRole::Server, reply.sender_ip, reply.sender_mac);
                stack.arp.set_ip(ArpRole::Client, reply.target_ip);
                stack.netmask = default_netmask(reply.target_ip);
                self.boot_file = format!("{}{}", self.config.rarp_bootfile_prefix, reply.target_ip);
                return Ok(self.lease(stack));
            }
        }
        Err(NetbootError::NoServer)
    }

    fn bootp<N: Nic, C: Clock>(&mut self, stack: &mut NetStack<N, C>) -> Result<Lease, NetbootError> {
        let mac = stack.mac();
        self.start = stack.now();
        // The low four bytes of the MAC differ between stations far more
        // reliably than the time since power-on does
        let station = u32::from_be_bytes([mac.0[2], mac.0[3], mac.0[4], mac.0[5]]);
        #[allow(clippy::cast_possible_truncation, reason = "low 32 bits of the tick count")]
        let ticks = self.start as u32;
        self.xid = station ^ ticks;
        let dhcp = self.config.discovery == Discovery::Dhcp;

        let mut nak = false;
        for retry in 0..self.config.max_bootp_retries {
            stack.rx_qdrain()?;
            // Stale entries from an earlier attempt must not survive
            stack.arp.reset();
            self.options.reset();
            self.dhcp_server = None;
            self.offered = Ipv4Addr::UNSPECIFIED;
            self.relay = None;
            self.last_type = None;
            nak = false;

            let mut header = BootpHeader::request(self.xid, mac);
            header.secs = self.elapsed_secs(stack);
            let mut packet = [0u8; BOOTP_FIXED_LEN + DHCP_OPT_LEN];
            let len = if dhcp {
                self.write_discover(&header, stack.nic.device_id(), &mut packet)?
            } else {
                write_bootrequest(&header, &mut packet)?
            };
            stack.udp_transmit(Ipv4Addr::BROADCAST, BOOTP_CLIENT, BOOTP_SERVER, &packet[..len])?;
            let window = stack.backoff.rfc2131_interval(BOOTP_TIMEOUT, retry);

            let stop = stack.now().saturating_add(window);
            loop {
                let remaining = stop.saturating_sub(stack.now());
                if remaining == 0 {
                    break;
                }
                let kind = self.await_bootp(stack, remaining)?;
                if !dhcp && kind == Some(ReplyKind::Lease) {
                    return Ok(self.lease(stack));
                }
                if let Some(kind) = kind {
                    debug!(?kind, "Collected BOOTP/DHCP reply");
                }
            }
            if !dhcp {
                continue;
            }
            if stack.client_ip().is_unspecified() {
                info!("No IP address");
                continue;
            }
            // Anything but an OFFER is a plain BOOTP reply and binds as is
            if self.last_type != Some(msg::OFFER) {
                return Ok(self.lease(stack));
            }

            match self.request(stack)? {
                Some(ReplyKind::Lease) => {
                    self.proxy_request(stack)?;
                    return Ok(self.lease(stack));
                }
                Some(ReplyKind::Nak) => {
                    warn!(server = ?self.dhcp_server, "DHCP NAK, restarting discovery");
                    nak = true;
                }
                _ => debug!("No DHCPACK, restarting discovery"),
            }
        }
        Err(if nak { NetbootError::DhcpNak } else { NetbootError::NoServer })
    }

    /// Send DHCPREQUESTs until an ACK or NAK arrives
    fn request<N: Nic, C: Clock>(&mut self, stack: &mut NetStack<N, C>) -> Result<Option<ReplyKind>, NetbootError> {
        let mut header = BootpHeader::request(self.xid, stack.mac());
        header.secs = self.elapsed_secs(stack);
        let mut packet = [0u8; BOOTP_FIXED_LEN + DHCP_OPT_LEN];
        let len = self.write_request(&header, stack.nic.device_id(), &mut packet)?;

        for retry in 0..self.config.max_bootp_retries {
            stack.udp_transmit(Ipv4Addr::BROADCAST, BOOTP_CLIENT, BOOTP_SERVER, &packet[..len])?;
            self.last_type = None;
            let timeout = stack.backoff.rfc2131_interval(DHCP_REQUEST_TIMEOUT, retry);
            match self.await_bootp(stack, timeout)? {
                Some(ReplyKind::Nak) => return Ok(Some(ReplyKind::Nak)),
                Some(ReplyKind::Lease) if self.last_type == Some(msg::ACK) => {
                    return Ok(Some(ReplyKind::Lease));
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Ask the ProxyDHCP server, if one answered, for its boot information
    fn proxy_request<N: Nic, C: Clock>(&mut self, stack: &mut NetStack<N, C>) -> Result<(), NetbootError> {
        let proxy = stack.arp.ip(ArpRole::ProxyDhcp);
        if !self.config.proxy_dhcp || proxy.is_unspecified() {
            return Ok(());
        }
        let mut header = BootpHeader::request(self.xid, stack.mac());
        header.ciaddr = stack.client_ip();
        header.secs = self.elapsed_secs(stack);
        let mut packet = [0u8; BOOTP_FIXED_LEN + DHCP_OPT_LEN];
        header.emit(&mut packet);
        let mut options = OptionWriter::new(&mut packet[BOOTP_FIXED_LEN..])?;
        options.put_u8(tag::MSG_TYPE, msg::REQUEST)?.put_u16(tag::MAX_SIZE, max_message_size())?;
        let len = BOOTP_FIXED_LEN + options.finish();

        for retry in 0..self.config.max_bootp_retries {
            info!("Sending ProxyDHCP request to {proxy}...");
            stack.udp_transmit(proxy, BOOTP_CLIENT, PROXYDHCP_SERVER, &packet[..len])?;
            let timeout = stack.backoff.rfc2131_interval(DHCP_REQUEST_TIMEOUT, retry);
            if self.await_bootp(stack, timeout)?.is_some() {
                break;
            }
        }
        Ok(())
    }

    /// Wait for one reply to our transaction and record what it carries
    fn await_bootp<N: Nic, C: Clock>(
        &mut self,
        stack: &mut NetStack<N, C>,
        timeout: u64,
    ) -> Result<Option<ReplyKind>, NetbootError> {
        let xid = self.xid;
        let mac = stack.mac();
        let matched = stack.await_reply(timeout, |frame| {
            if frame.udp()?.dst_port != BOOTP_CLIENT {
                return None;
            }
            let payload = frame.payload();
            BootpHeader::parse(payload).filter(|reply| {
                reply.op == BOOTP_REPLY
                    && reply.xid == xid
                    && (reply.chaddr == mac || reply.chaddr == Mac::BROADCAST)
                    // DHCPNAK carries no siaddr
                    && (!reply.siaddr.is_unspecified() || is_nak(vendor_area(payload)))
            })
        })?;
        let Some(reply) = matched else {
            return Ok(None);
        };
        let Some(frame) = stack.received() else {
            return Ok(None);
        };
        let payload = frame.payload();
        let vendor = vendor_area(payload);
        let file = boot_file(payload);

        let kind = if !reply.yiaddr.is_unspecified() {
            match self.options.decode(vendor, 0, true) {
                Ok(()) => {}
                // Plain BOOTP servers may leave the vendor area empty
                Err(OptionError::NoVendorHeader) => debug!("Reply has no RFC1533 options"),
                Err(err) => warn!(error = %err, "Ignoring reply options"),
            }
            ReplyKind::Lease
        } else if is_nak(vendor) {
            ReplyKind::Nak
        } else {
            ReplyKind::Proxy
        };

        if kind == ReplyKind::Nak {
            return Ok(Some(kind));
        }
        stack.arp.set_ip(ArpRole::Server, reply.siaddr);
        if !reply.giaddr.is_unspecified() {
            stack.arp.set_ip(ArpRole::Gateway, reply.giaddr);
            self.relay = Some(reply.giaddr);
        }
        match kind {
            ReplyKind::Lease => {
                stack.arp.set_ip(ArpRole::Client, reply.yiaddr);
                stack.netmask = default_netmask(reply.yiaddr);
                self.offered = reply.yiaddr;
                self.boot_file = file;
                self.last_type = self.options.message_type();
                if let Some(server) = self.options.decoded().server_id {
                    self.dhcp_server = Some(server);
                }
                self.apply_options(stack);
            }
            ReplyKind::Proxy if self.config.proxy_dhcp => {
                debug!(server = %reply.siaddr, "ProxyDHCP offer");
                stack.arp.set_ip(ArpRole::ProxyDhcp, reply.siaddr);
                self.boot_file = file;
            }
            ReplyKind::Proxy | ReplyKind::Nak => {}
        }
        Ok(Some(kind))
    }

    fn elapsed_secs<N: Nic, C: Clock>(&self, stack: &NetStack<N, C>) -> u16 {
        let secs = stack.now().saturating_sub(self.start) / TICKS_PER_SEC;
        u16::try_from(secs).unwrap_or(u16::MAX)
    }

    fn write_discover(&self, header: &BootpHeader, device: DeviceId, packet: &mut [u8]) -> Result<usize, NetbootError> {
        header.emit(packet);
        let mut options = OptionWriter::new(&mut packet[BOOTP_FIXED_LEN..])?;
        options
            .put_u8(tag::MSG_TYPE, msg::DISCOVER)?
            .put_u16(tag::MAX_SIZE, max_message_size())?;
        self.put_identity(&mut options)?;
        self.put_params(&mut options, &DISCOVER_PARAMS)?;
        options.put(tag::ETHERBOOT_ENCAP, &machine_info(device))?;
        Ok(BOOTP_FIXED_LEN + options.finish())
    }

    fn write_request(&self, header: &BootpHeader, device: DeviceId, packet: &mut [u8]) -> Result<usize, NetbootError> {
        header.emit(packet);
        let mut options = OptionWriter::new(&mut packet[BOOTP_FIXED_LEN..])?;
        options.put_u8(tag::MSG_TYPE, msg::REQUEST)?;
        if let Some(server) = self.dhcp_server {
            options.put_ip(tag::SERVER_ID, server)?;
        }
        options
            .put_ip(tag::REQUESTED_IP, self.offered)?
            .put_u16(tag::MAX_SIZE, max_message_size())?;
        self.put_identity(&mut options)?;
        self.put_params(&mut options, &REQUEST_PARAMS)?;
        options.put(tag::ETHERBOOT_ENCAP, &machine_info(device))?;
        Ok(BOOTP_FIXED_LEN + options.finish())
    }

    /// Vendor class, client id and user class
    fn put_identity(&self, options: &mut OptionWriter<'_>) -> Result<(), OptionError> {
        options.put(tag::VENDOR_CLASS_ID, self.config.vendor_class_id.as_bytes())?;
        if let Some(client_id) = &self.config.client_id {
            let mut value = Vec::with_capacity(client_id.len() + 1);
            value.push(0);
            value.extend_from_slice(client_id.as_bytes());
            options.put(tag::CLIENT_ID, &value)?;
        }
        if let Some(user_class) = &self.config.user_class {
            options.put(tag::USER_CLASS, user_class.as_bytes())?;
        }
        Ok(())
    }

    fn put_params(&self, options: &mut OptionWriter<'_>, params: &[u8]) -> Result<(), OptionError> {
        let mut list = params.to_vec();
        if self.config.request_dns {
            list.push(tag::DNS);
        }
        options.put(tag::PARAM_LIST, &list)?;
        Ok(())
    }
}

/// Plain BOOTP request: 64-byte vendor area holding only cookie and END
fn write_bootrequest(header: &BootpHeader, packet: &mut [u8]) -> Result<usize, NetbootError> {
    header.emit(packet);
    let vendor = &mut packet[BOOTP_FIXED_LEN..BOOTP_FIXED_LEN + BOOTP_VENDOR_LEN];
    vendor.fill(0);
    OptionWriter::new(vendor)?.finish();
    Ok(BOOTP_FIXED_LEN + BOOTP_VENDOR_LEN)
}

fn is_nak(vendor: &[u8]) -> bool {
    find_option(vendor, tag::MSG_TYPE) == Some(&[msg::NAK][..])
}

fn max_message_size() -> u16 {
    u16::try_from(ETH_MAX_MTU).unwrap_or(u16::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line() {
        let lease = Lease {
            client: Ipv4Addr::new(10, 0, 0, 20),
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            dhcp_server: Some(Ipv4Addr::new(10, 0, 0, 1)),
            proxy_dhcp: None,
            tftp_server: Ipv4Addr::new(10, 0, 0, 1),
            relay: None,
            gateway: Some(Ipv4Addr::new(10, 0, 0, 254)),
            nameserver: None,
            boot_file: "pxelinux.0".to_string(),
        };
        assert_eq!(
            lease.to_string(),
            "Me: 10.0.0.20, DHCP: 10.0.0.1, TFTP: 10.0.0.1, Gateway 10.0.0.254"
        );
    }

    #[test]
    fn test_summary_with_proxy_and_relay() {
        let lease = Lease {
            client: Ipv4Addr::new(10, 1, 0, 5),
            netmask: Ipv4Addr::new(255, 255, 0, 0),
            dhcp_server: Some(Ipv4Addr::new(10, 0, 0, 1)),
            proxy_dhcp: Some(Ipv4Addr::new(10, 0, 0, 2)),
            tftp_server: Ipv4Addr::new(10, 0, 0, 2),
            relay: Some(Ipv4Addr::new(10, 1, 0, 1)),
            gateway: None,
            nameserver: Some(Ipv4Addr::new(10, 0, 0, 53)),
            boot_file: String::new(),
        };
        assert_eq!(
            lease.to_string(),
            "Me: 10.1.0.5, DHCP: 10.0.0.1 (& 10.0.0.2), TFTP: 10.0.0.2, Relay: 10.1.0.1, Nameserver 10.0.0.53"
        );
    }

    #[test]
    fn test_machine_info_layout() {
        let info = machine_info(DeviceId { bus_type: 1, vendor_id: 0x8086, device_id: 0x100e });
        assert_eq!(&info[..7], &[tag::NIC_DEV_ID, 5, 1, 0x80, 0x86, 0x10, 0x0e]);
        assert_eq!(&info[7..9], &[tag::ARCH, 2]);
        assert_eq!(u16::from_le_bytes([info[9], info[10]]), elf_machine());
    }

    #[test]
    fn test_bootrequest_is_300_bytes_with_cookie_and_end() {
        let header = BootpHeader::request(7, Mac([2, 0, 0, 0, 0, 1]));
        let mut packet = [0xAAu8; BOOTP_FIXED_LEN + DHCP_OPT_LEN];
        let len = write_bootrequest(&header, &mut packet).unwrap();
        assert_eq!(len, 300);
        assert_eq!(&packet[BOOTP_FIXED_LEN..BOOTP_FIXED_LEN + 5], &[99, 130, 83, 99, tag::END]);
        assert!(packet[BOOTP_FIXED_LEN + 5..len].iter().all(|&b| b == 0));
    }
}
