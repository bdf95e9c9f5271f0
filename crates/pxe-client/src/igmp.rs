//! IGMP v1/v2 group membership
//!
//! A small fixed table of joined groups, each with an optional pending
//! report deadline. Queries schedule or bring forward reports, reports from
//! other members suppress ours, and the dispatch loop sends whatever is due
//! on every iteration.

use crate::clock::{Clock, TICKS_PER_SEC};
use crate::error::NetbootError;
use crate::nic::Nic;
use crate::stack::NetStack;
use crate::wire::igmp::{
    GROUP_ALL_HOSTS, GROUP_ALL_ROUTERS, IGMP_LEAVE, IGMP_LEN, IGMP_QUERY, IGMPV1_REPORT,
    IGMPV2_REPORT, IgmpMessage, ROUTER_ALERT,
};
use crate::wire::ipv4::{IP_HLEN, IP_IGMP, Ipv4Header, build_header};
use std::net::Ipv4Addr;
use tracing::debug;

/// Number of membership slots
pub const MAX_IGMP: usize = 4;
/// Report window used for IGMPv1 queries, which carry no response time
pub const IGMP_INTERVAL: u64 = 10 * TICKS_PER_SEC;
/// How long after an IGMPv1 query we keep sending v1 reports
pub const IGMPV1_ROUTER_PRESENT_TIMEOUT: u64 = 400 * TICKS_PER_SEC;

const IGMP_DATAGRAM_LEN: usize = IP_HLEN + ROUTER_ALERT.len() + IGMP_LEN;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Membership {
    group: Option<Ipv4Addr>,
    report_at: Option<u64>,
}

/// Joined multicast groups.
#[derive(Debug, Clone, Default)]
pub struct IgmpTable {
    slots: [Membership; MAX_IGMP],
    last_v1_query: Option<u64>,
}

impl IgmpTable {
    /// No memberships
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Group joined in `slot`
    #[must_use]
    pub fn group(&self, slot: usize) -> Option<Ipv4Addr> {
        self.slots.get(slot).and_then(|m| m.group)
    }

    /// Tick at which the report for `slot` is due, if one is pending
    #[must_use]
    pub fn report_deadline(&self, slot: usize) -> Option<u64> {
        self.slots.get(slot).and_then(|m| m.report_at)
    }

    /// Whether an IGMPv1 querier has been heard recently
    #[must_use]
    pub fn v1_router_present(&self, now: u64) -> bool {
        self.last_v1_query
            .is_some_and(|at| now < at.saturating_add(IGMPV1_ROUTER_PRESENT_TIMEOUT))
    }
}

impl<N: Nic, C: Clock> NetStack<N, C> {
    /// Joined groups
    #[must_use]
    pub fn igmp_table(&self) -> &IgmpTable {
        &self.igmp
    }

    /// Join `group` in `slot`, replacing (and leaving) whatever was there.
    ///
    /// Addresses outside 224.0.0.0/4 are accepted and ignored, so callers
    /// can pass a unicast or broadcast address unchanged. A report for a new
    /// group is sent right away.
    pub fn join_group(&mut self, slot: usize, group: Ipv4Addr) -> Result<(), NetbootError> {
        let current = self.igmp.slots.get(slot).ok_or_else(|| {
            NetbootError::Configuration(format!("IGMP slot {slot} out of range (max {MAX_IGMP})"))
        })?;
        if current.group == Some(group) {
            return Ok(());
        }
        if current.group.is_some() {
            self.leave_group(slot);
        }
        if !group.is_multicast() {
            return Ok(());
        }
        self.igmp.slots[slot] = Membership { group: Some(group), report_at: None };
        let now = self.now();
        self.send_report(group, now);
        Ok(())
    }

    /// Leave the group in `slot`, sending an IGMPv2 leave
    pub fn leave_group(&mut self, slot: usize) {
        let Some(membership) = self.igmp.slots.get_mut(slot) else {
            return;
        };
        let left = membership.group.take();
        membership.report_at = None;
        if let Some(group) = left {
            self.send_igmp(IGMP_LEAVE, group, GROUP_ALL_ROUTERS);
            debug!(%group, "Sent IGMP leave");
        }
    }

    /// Leave every joined group
    pub fn leave_all_groups(&mut self) {
        for slot in 0..MAX_IGMP {
            self.leave_group(slot);
        }
    }

    /// Send the reports whose deadline has passed
    pub(crate) fn send_igmp_reports(&mut self, now: u64) {
        for slot in 0..MAX_IGMP {
            let membership = self.igmp.slots[slot];
            if let (Some(group), Some(at)) = (membership.group, membership.report_at) {
                if now >= at {
                    self.igmp.slots[slot].report_at = None;
                    self.send_report(group, now);
                }
            }
        }
    }

    /// Handle a received IGMP message
    pub(crate) fn process_igmp(&mut self, ip: &Ipv4Header, msg: &IgmpMessage, now: u64) {
        match msg.kind {
            IGMP_QUERY if ip.dst == GROUP_ALL_HOSTS || ip.dst == msg.group => {
                let interval = if msg.response_time == 0 {
                    self.igmp.last_v1_query = Some(now);
                    IGMP_INTERVAL
                } else {
                    u64::from(msg.response_time) * TICKS_PER_SEC / 10
                };
                debug!(group = %msg.group, "Received IGMP query");
                for slot in 0..MAX_IGMP {
                    let membership = self.igmp.slots[slot];
                    let Some(group) = membership.group else { continue };
                    if !msg.group.is_unspecified() && msg.group != group {
                        continue;
                    }
                    let at = now + self.backoff.rfc1112_interval(interval, 0);
                    if membership.report_at.is_none_or(|pending| at < pending) {
                        self.igmp.slots[slot].report_at = Some(at);
                    }
                }
            }
            IGMPV1_REPORT | IGMPV2_REPORT if ip.dst == msg.group => {
                debug!(group = %msg.group, "Received IGMP report");
                for membership in &mut self.igmp.slots {
                    if membership.group == Some(msg.group) {
                        membership.report_at = None;
                    }
                }
            }
            _ => {}
        }
    }

    fn send_report(&mut self, group: Ipv4Addr, now: u64) {
        let kind = if self.igmp.v1_router_present(now) { IGMPV1_REPORT } else { IGMPV2_REPORT };
        self.send_igmp(kind, group, group);
        debug!(%group, "Sent IGMP report");
    }

    fn send_igmp(&mut self, kind: u8, group: Ipv4Addr, dest: Ipv4Addr) {
        let mut buf = [0u8; IGMP_DATAGRAM_LEN];
        buf[IP_HLEN..IP_HLEN + ROUTER_ALERT.len()].copy_from_slice(&ROUTER_ALERT);
        let message = IgmpMessage { kind, response_time: 0, group };
        buf[IP_HLEN + ROUTER_ALERT.len()..].copy_from_slice(&message.to_bytes());
        let src = self.client_ip();
        #[allow(clippy::cast_possible_truncation, reason = "32-byte datagram")]
        build_header(&mut buf, src, dest, 1, IP_IGMP, ROUTER_ALERT.len(), IGMP_DATAGRAM_LEN as u16);
        if let Err(err) = self.ip_transmit(&buf) {
            debug!(%group, error = %err, "IGMP transmit failed");
        }
    }
}
