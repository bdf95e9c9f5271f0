//! IEEE 802.3ad slow protocols: a passive LACP actor and marker responder
//!
//! Switch ports configured for link aggregation stop forwarding to a host
//! that never speaks LACP. The actor here only does enough to keep the
//! partner in sync: it records the partner's information from every LACPDU,
//! answers when the partner's view of us is stale, keeps the periodic
//! transmissions going, and reflects marker requests. There are no
//! selection or mux machines; a single port is always its own aggregator.

use crate::clock::{Clock, TICKS_PER_SEC};
use crate::nic::Nic;
use crate::stack::NetStack;
use crate::wire::{ETH_P_SLOW, Mac, be16, mac_at};
use tracing::debug;

/// Slow protocols multicast address
pub const SLOW_DEST: Mac = Mac([0x01, 0x80, 0xc2, 0x00, 0x00, 0x02]);

/// Subtype of an LACPDU
pub const SLOW_SUBTYPE_LACP: u8 = 1;
/// Subtype of a marker PDU
pub const SLOW_SUBTYPE_MARKER: u8 = 2;

/// LACPDU length
pub const LACPDU_LEN: usize = 110;
/// Marker PDU length
pub const MARKER_LEN: usize = 110;

const MARKER_TLV_INFO: u8 = 1;
const MARKER_TLV_RESPONSE: u8 = 2;
const MARKER_INFO_LEN: u8 = 0x16;

const LACP_TLV_ACTOR: u8 = 1;
const LACP_TLV_PARTNER: u8 = 2;
const LACP_TLV_COLLECTOR: u8 = 3;
const LACP_INFO_TLV_LEN: u8 = 0x14;
const LACP_COLLECTOR_TLV_LEN: u8 = 0x10;

/// Partner state bits
pub mod state {
    /// Active LACP
    pub const ACTIVITY: u8 = 1 << 0;
    /// Short timeout
    pub const TIMEOUT: u8 = 1 << 1;
    /// Link is aggregatable
    pub const AGGREGATION: u8 = 1 << 2;
    /// In sync
    pub const SYNCHRONIZATION: u8 = 1 << 3;
    /// Collecting frames
    pub const COLLECTING: u8 = 1 << 4;
    /// Distributing frames
    pub const DISTRIBUTING: u8 = 1 << 5;
    /// Using default partner information
    pub const DEFAULTED: u8 = 1 << 6;
    /// Partner information expired
    pub const EXPIRED: u8 = 1 << 7;
}

/// Periodic transmit interval when the partner asked for short timeouts
pub const FAST_PERIODIC_TIME: u64 = TICKS_PER_SEC;
/// Periodic transmit interval otherwise
pub const SLOW_PERIODIC_TIME: u64 = 30 * TICKS_PER_SEC;
/// Partner information lifetime with short timeouts
pub const SHORT_TIMEOUT_TIME: u64 = 3 * FAST_PERIODIC_TIME;
/// Partner information lifetime with long timeouts
pub const LONG_TIMEOUT_TIME: u64 = 3 * SLOW_PERIODIC_TIME;

const NTT_MASK: u8 = state::ACTIVITY | state::TIMEOUT | state::SYNCHRONIZATION | state::AGGREGATION;

/// Actor or partner information block (18 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LacpInfo {
    /// System priority
    pub system_priority: u16,
    /// System id
    pub system: Mac,
    /// Operational key
    pub key: u16,
    /// Port priority
    pub port_priority: u16,
    /// Port number
    pub port: u16,
    /// State bits
    pub state: u8,
}

impl LacpInfo {
    const LEN: usize = 18;

    fn parse(buf: &[u8]) -> Self {
        Self {
            system_priority: be16(buf, 0),
            system: mac_at(buf, 2),
            key: be16(buf, 8),
            port_priority: be16(buf, 10),
            port: be16(buf, 12),
            state: buf[14],
        }
    }

    fn emit(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.system_priority.to_be_bytes());
        buf[2..8].copy_from_slice(&self.system.0);
        buf[8..10].copy_from_slice(&self.key.to_be_bytes());
        buf[10..12].copy_from_slice(&self.port_priority.to_be_bytes());
        buf[12..14].copy_from_slice(&self.port.to_be_bytes());
        buf[14] = self.state;
    }

    /// Same port identity, state ignored
    fn same_port(&self, other: &LacpInfo) -> bool {
        self.system_priority == other.system_priority
            && self.system == other.system
            && self.key == other.key
            && self.port_priority == other.port_priority
            && self.port == other.port
    }
}

/// A slow-protocol frame worth answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlowFrame {
    /// LACPDU from the link partner
    Lacp {
        /// Sender's own information
        actor: LacpInfo,
        /// Sender's view of us
        partner: LacpInfo,
    },
    /// Marker information request, kept whole so it can be reflected
    MarkerInfo([u8; MARKER_LEN]),
}

impl SlowFrame {
    /// Parse the payload of an ETH_P_SLOW frame
    #[must_use]
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match payload.first()? {
            &SLOW_SUBTYPE_LACP if payload.len() >= LACPDU_LEN => Some(SlowFrame::Lacp {
                actor: LacpInfo::parse(&payload[4..4 + LacpInfo::LEN]),
                partner: LacpInfo::parse(&payload[24..24 + LacpInfo::LEN]),
            }),
            &SLOW_SUBTYPE_MARKER
                if payload.len() >= MARKER_LEN
                    && payload[2] == MARKER_TLV_INFO
                    && payload[3] == MARKER_INFO_LEN =>
            {
                let mut marker = [0u8; MARKER_LEN];
                marker.copy_from_slice(&payload[..MARKER_LEN]);
                Some(SlowFrame::MarkerInfo(marker))
            }
            _ => None,
        }
    }
}

/// Actor state and timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LacpState {
    mac: Mac,
    actor: LacpInfo,
    partner: LacpInfo,
    /// When the recorded partner information expires
    current_while: Option<u64>,
    /// When the next periodic LACPDU is due
    periodic: Option<u64>,
}

impl LacpState {
    /// Defaulted state: nothing heard from a partner yet, nothing sent
    #[must_use]
    pub fn new(mac: Mac) -> Self {
        Self {
            mac,
            actor: LacpInfo {
                system_priority: 1,
                system: mac,
                key: 1,
                port_priority: 1,
                port: 1,
                state: state::SYNCHRONIZATION
                    | state::COLLECTING
                    | state::DISTRIBUTING
                    | state::DEFAULTED,
            },
            partner: LacpInfo {
                system_priority: 1,
                system: Mac::ZERO,
                key: 1,
                port_priority: 1,
                port: 1,
                state: state::ACTIVITY
                    | state::SYNCHRONIZATION
                    | state::COLLECTING
                    | state::DISTRIBUTING
                    | state::DEFAULTED,
            },
            current_while: None,
            periodic: None,
        }
    }

    /// Our information
    #[must_use]
    pub fn actor(&self) -> &LacpInfo {
        &self.actor
    }

    /// Recorded partner information
    #[must_use]
    pub fn partner(&self) -> &LacpInfo {
        &self.partner
    }

    /// Tick at which the next periodic LACPDU is due
    #[must_use]
    pub fn periodic_deadline(&self) -> Option<u64> {
        self.periodic
    }

    /// Run the timers; returns an LACPDU when one must go out
    pub fn tick(&mut self, now: u64, mut ntt: bool) -> Option<[u8; LACPDU_LEN]> {
        if self.current_while.is_some_and(|at| now > at) {
            if self.actor.state & state::EXPIRED == 0 {
                self.partner.state &= !state::SYNCHRONIZATION;
                self.partner.state |= state::TIMEOUT;
                self.actor.state |= state::EXPIRED;
                self.current_while = Some(now + SHORT_TIMEOUT_TIME);
                ntt = true;
            } else {
                *self = Self::new(self.mac);
            }
        }
        if self.periodic.is_some_and(|at| now > at) {
            ntt = true;
        }
        if !ntt {
            return None;
        }
        if (self.partner.state | self.actor.state) & state::ACTIVITY != 0 {
            let interval = if self.partner.state & state::TIMEOUT != 0 {
                FAST_PERIODIC_TIME
            } else {
                SLOW_PERIODIC_TIME
            };
            self.periodic = Some(now + interval);
        }
        Some(self.lacpdu())
    }

    /// Record an LACPDU from the partner; returns our answer if one is due
    pub fn receive(&mut self, actor: &LacpInfo, partner: &LacpInfo, now: u64) -> Option<[u8; LACPDU_LEN]> {
        let ntt = !partner.same_port(&self.actor) || (partner.state & NTT_MASK) != (self.actor.state & NTT_MASK);

        self.partner = *actor;
        self.actor.state &= !state::DEFAULTED;
        self.partner.state &= !state::SYNCHRONIZATION;
        if (partner.same_port(&self.actor)
            && (partner.state & state::AGGREGATION) == (self.actor.state & state::AGGREGATION))
            || actor.state & state::AGGREGATION == 0
        {
            self.partner.state |= state::SYNCHRONIZATION;
        }

        let lifetime = if self.actor.state & state::TIMEOUT != 0 {
            SHORT_TIMEOUT_TIME
        } else {
            LONG_TIMEOUT_TIME
        };
        self.current_while = Some(now + lifetime);
        self.actor.state &= !state::EXPIRED;

        self.tick(now, ntt)
    }

    fn lacpdu(&self) -> [u8; LACPDU_LEN] {
        build_lacpdu(&self.actor, &self.partner)
    }
}

/// A LACPDU carrying `actor` and `partner` information
#[must_use]
pub fn build_lacpdu(actor: &LacpInfo, partner: &LacpInfo) -> [u8; LACPDU_LEN] {
    let mut pdu = [0u8; LACPDU_LEN];
    pdu[0] = SLOW_SUBTYPE_LACP;
    pdu[1] = 1;
    pdu[2] = LACP_TLV_ACTOR;
    pdu[3] = LACP_INFO_TLV_LEN;
    actor.emit(&mut pdu[4..4 + LacpInfo::LEN]);
    pdu[22] = LACP_TLV_PARTNER;
    pdu[23] = LACP_INFO_TLV_LEN;
    partner.emit(&mut pdu[24..24 + LacpInfo::LEN]);
    pdu[42] = LACP_TLV_COLLECTOR;
    pdu[43] = LACP_COLLECTOR_TLV_LEN;
    pdu[44..46].copy_from_slice(&0x8000u16.to_be_bytes());
    // terminator TLV and reserved bytes stay zero
    pdu
}

impl<N: Nic, C: Clock> NetStack<N, C> {
    /// Link-aggregation state, when the responder is enabled
    #[must_use]
    pub fn lacp_state(&self) -> Option<&LacpState> {
        self.lacp.as_ref()
    }

    /// Periodic sender, run on every dispatch iteration
    pub(crate) fn send_lacp_reports(&mut self, now: u64) {
        if let Some(pdu) = self.lacp.as_mut().and_then(|lacp| lacp.tick(now, false)) {
            self.nic.transmit(SLOW_DEST, ETH_P_SLOW, &pdu);
            debug!("Transmitted LACPDU");
        }
    }

    /// Handle a received slow-protocol frame
    pub(crate) fn process_slow(&mut self, frame: &SlowFrame, now: u64) {
        match frame {
            SlowFrame::Lacp { actor, partner } => {
                let Some(lacp) = self.lacp.as_mut() else { return };
                debug!(partner = %actor.system, "Received LACPDU");
                if let Some(pdu) = lacp.receive(actor, partner, now) {
                    self.nic.transmit(SLOW_DEST, ETH_P_SLOW, &pdu);
                    debug!("Transmitted LACPDU");
                }
            }
            SlowFrame::MarkerInfo(marker) => {
                if self.lacp.is_none() {
                    return;
                }
                let mut response = *marker;
                response[2] = MARKER_TLV_RESPONSE;
                self.nic.transmit(SLOW_DEST, ETH_P_SLOW, &response);
            }
        }
    }
}
