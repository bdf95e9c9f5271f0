//! ARP table and next-hop resolution

use crate::clock::{Clock, TICKS_PER_SEC};
use crate::error::NetbootError;
use crate::nic::Nic;
use crate::stack::NetStack;
use crate::wire::arp::{ARP_REPLY, ARP_REQUEST, ArpPacket};
use crate::wire::{ETH_P_ARP, Mac};
use std::net::Ipv4Addr;
use tracing::debug;

/// Base ARP and RARP retransmission timeout
pub const ARP_TIMEOUT: u64 = 10 * TICKS_PER_SEC;

/// Who an ARP table entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArpRole {
    /// This station
    Client,
    /// Boot (TFTP) server
    Server,
    /// Default router
    Gateway,
    /// DNS server
    Nameserver,
    /// ProxyDHCP server
    ProxyDhcp,
}

impl ArpRole {
    /// Every role, in table order
    pub const ALL: [ArpRole; 5] = [
        ArpRole::Client,
        ArpRole::Server,
        ArpRole::Gateway,
        ArpRole::Nameserver,
        ArpRole::ProxyDhcp,
    ];

    fn index(self) -> usize {
        match self {
            ArpRole::Client => 0,
            ArpRole::Server => 1,
            ArpRole::Gateway => 2,
            ArpRole::Nameserver => 3,
            ArpRole::ProxyDhcp => 4,
        }
    }
}

/// An IP address and, once resolved, its MAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpEntry {
    /// Protocol address, 0.0.0.0 when unused
    pub ip: Ipv4Addr,
    /// Hardware address, all zero until resolved
    pub mac: Mac,
}

impl Default for ArpEntry {
    fn default() -> Self {
        Self { ip: Ipv4Addr::UNSPECIFIED, mac: Mac::ZERO }
    }
}

/// Fixed ARP table indexed by role.
#[derive(Debug, Clone, Default)]
pub struct ArpTable {
    entries: [ArpEntry; 5],
}

impl ArpTable {
    /// An empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every entry
    pub fn reset(&mut self) {
        self.entries = [ArpEntry::default(); 5];
    }

    /// Entry for `role`
    #[must_use]
    pub fn get(&self, role: ArpRole) -> ArpEntry {
        self.entries[role.index()]
    }

    /// IP address for `role`
    #[must_use]
    pub fn ip(&self, role: ArpRole) -> Ipv4Addr {
        self.entries[role.index()].ip
    }

    /// Set the address for `role` and forget any resolved MAC
    pub fn set_ip(&mut self, role: ArpRole, ip: Ipv4Addr) {
        self.entries[role.index()] = ArpEntry { ip, mac: Mac::ZERO };
    }

    /// Set both addresses for `role`
    pub fn set(&mut self, role: ArpRole, ip: Ipv4Addr, mac: Mac) {
        self.entries[role.index()] = ArpEntry { ip, mac };
    }

    /// Record a resolved MAC for `role`
    pub fn set_mac(&mut self, role: ArpRole, mac: Mac) {
        self.entries[role.index()].mac = mac;
    }

    /// First role holding `ip`
    #[must_use]
    pub fn find(&self, ip: Ipv4Addr) -> Option<ArpRole> {
        if ip.is_unspecified() {
            return None;
        }
        ArpRole::ALL.into_iter().find(|role| self.entries[role.index()].ip == ip)
    }
}

/// Classful default netmask of an address
#[must_use]
pub fn default_netmask(ip: Ipv4Addr) -> Ipv4Addr {
    match ip.octets()[0] {
        0..=127 => Ipv4Addr::new(255, 0, 0, 0),
        128..=191 => Ipv4Addr::new(255, 255, 0, 0),
        _ => Ipv4Addr::new(255, 255, 255, 0),
    }
}

impl<N: Nic, C: Clock> NetStack<N, C> {
    /// Resolve the MAC to send a datagram for `dest` to.
    ///
    /// Off-subnet destinations go through the gateway when one is known.
    /// The next hop must already be in the ARP table; an entry with a zero
    /// MAC is resolved with broadcast requests under RFC2131 backoff.
    pub fn resolve(&mut self, dest: Ipv4Addr) -> Result<Mac, NetbootError> {
        let client = self.arp.ip(ArpRole::Client);
        let gateway = self.arp.ip(ArpRole::Gateway);
        let netmask = u32::from(self.netmask);
        let next_hop = if (u32::from(dest) & netmask) != (u32::from(client) & netmask)
            && !gateway.is_unspecified()
        {
            gateway
        } else {
            dest
        };

        let role = self.arp.find(next_hop).ok_or(NetbootError::NotInArpTable(next_hop))?;
        let entry = self.arp.get(role);
        if !entry.mac.is_zero() {
            return Ok(entry.mac);
        }

        let request = ArpPacket::new(ARP_REQUEST, self.mac, client, Mac::ZERO, next_hop).to_bytes();
        for retry in 0..self.max_arp_retries {
            self.rx_qdrain()?;
            self.nic.transmit(Mac::BROADCAST, ETH_P_ARP, &request);
            debug!(target = %next_hop, retry, "Sent ARP request");
            let timeout = self.backoff.rfc2131_interval(ARP_TIMEOUT, retry);
            let reply = self.await_reply(timeout, |frame| {
                frame
                    .arp()
                    .filter(|arp| arp.opcode == ARP_REPLY && arp.sender_ip == next_hop)
                    .map(|arp| arp.sender_mac)
            })?;
            if let Some(mac) = reply {
                debug!(target = %next_hop, %mac, "ARP resolved");
                self.arp.set_mac(role, mac);
                return Ok(mac);
            }
        }
        Err(NetbootError::ArpUnresolved(next_hop))
    }

    /// Answer an ARP request for our own address
    pub(crate) fn answer_arp(&mut self, arp: &ArpPacket) {
        let client = self.arp.ip(ArpRole::Client);
        if arp.opcode != ARP_REQUEST
            || !arp.is_ethernet_ipv4()
            || client.is_unspecified()
            || arp.target_ip != client
        {
            return;
        }
        let reply = ArpPacket::new(ARP_REPLY, self.mac, client, arp.sender_mac, arp.sender_ip);
        self.nic.transmit(arp.sender_mac, ETH_P_ARP, &reply.to_bytes());
        debug!(to = %arp.sender_ip, "Sent ARP reply");
    }
}
