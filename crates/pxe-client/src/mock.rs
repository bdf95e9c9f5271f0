//! Scripted NIC and clock for testing
//!
//! [`MockNic`] plays the network: frames queued with
//! [`MockNic::push_frame`] are handed to the engine one per poll, and every
//! transmission is recorded. A responder closure can stand in for the
//! servers by answering each transmitted frame. Polling an empty queue
//! advances the shared [`MockClock`], so timeouts expire without sleeping.

pub mod frames;

use crate::clock::Clock;
use crate::nic::{DeviceId, Nic};
use crate::wire::ipv4::{IP_UDP, Ipv4Header};
use crate::wire::udp::{UDP_HLEN, UdpHeader};
use crate::wire::{ETH_P_IP, Mac};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Ticks an idle poll advances the clock by
pub const DEFAULT_IDLE_STEP: u64 = 10;

/// Shared, manually driven tick counter.
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    ticks: Arc<AtomicU64>,
}

impl MockClock {
    /// A clock at tick `start`
    #[must_use]
    pub fn new(start: u64) -> Self {
        Self { ticks: Arc::new(AtomicU64::new(start)) }
    }

    /// Move time forward
    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }
}

/// One frame handed to [`Nic::transmit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmitted {
    /// Destination MAC
    pub dest: Mac,
    /// Ethernet type
    pub ethertype: u16,
    /// Everything after the Ethernet header
    pub payload: Vec<u8>,
    /// Clock tick at transmission
    pub at: u64,
}

impl Transmitted {
    /// IP header, for IP frames
    #[must_use]
    pub fn ip(&self) -> Option<Ipv4Header> {
        if self.ethertype != ETH_P_IP {
            return None;
        }
        Ipv4Header::parse(&self.payload)
    }

    /// UDP header and payload, for UDP datagrams
    #[must_use]
    pub fn udp(&self) -> Option<(UdpHeader, &[u8])> {
        let ip = self.ip().filter(|ip| ip.protocol == IP_UDP)?;
        let segment = self.payload.get(ip.header_len()..)?;
        let udp = UdpHeader::parse(segment)?;
        let data = segment.get(UDP_HLEN..usize::from(udp.len))?;
        Some((udp, data))
    }

    /// UDP payload if this datagram went to `port`
    #[must_use]
    pub fn udp_to(&self, port: u16) -> Option<&[u8]> {
        self.udp().filter(|(udp, _)| udp.dst_port == port).map(|(_, data)| data)
    }
}

/// Server-side behavior: frames to queue in answer to a transmission.
pub type Responder = Box<dyn FnMut(&Transmitted) -> Vec<Vec<u8>> + Send>;

#[derive(Default)]
struct MockState {
    rx: VecDeque<Vec<u8>>,
    tx: Vec<Transmitted>,
    responder: Option<Responder>,
}

/// In-memory NIC.
#[derive(Clone)]
pub struct MockNic {
    mac: Mac,
    device: DeviceId,
    clock: MockClock,
    idle_step: u64,
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockNic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockNic")
            .field("mac", &self.mac)
            .field("device", &self.device)
            .field("idle_step", &self.idle_step)
            .finish_non_exhaustive()
    }
}

impl MockNic {
    /// A NIC with station address `mac`, driving `clock`
    #[must_use]
    pub fn new(mac: Mac, clock: MockClock) -> Self {
        Self {
            mac,
            device: DeviceId::default(),
            clock,
            idle_step: DEFAULT_IDLE_STEP,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Report `device` as the bus identification
    #[must_use]
    pub fn with_device_id(mut self, device: DeviceId) -> Self {
        self.device = device;
        self
    }

    /// Ticks each empty poll advances the clock by
    #[must_use]
    pub fn with_idle_step(mut self, ticks: u64) -> Self {
        self.idle_step = ticks.max(1);
        self
    }

    /// The clock this NIC advances
    #[must_use]
    pub fn clock(&self) -> MockClock {
        self.clock.clone()
    }

    /// Answer every transmission with the frames `responder` returns
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&Transmitted) -> Vec<Vec<u8>> + Send + 'static,
    {
        self.lock().responder = Some(Box::new(responder));
    }

    /// Queue a complete Ethernet frame for reception
    pub fn push_frame(&self, frame: Vec<u8>) {
        self.lock().rx.push_back(frame);
    }

    /// Frames still queued
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().rx.len()
    }

    /// Everything transmitted so far
    #[must_use]
    pub fn transmitted(&self) -> Vec<Transmitted> {
        self.lock().tx.clone()
    }

    /// Take and clear the transmit record
    pub fn take_transmitted(&self) -> Vec<Transmitted> {
        std::mem::take(&mut self.lock().tx)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Nic for MockNic {
    fn mac(&self) -> Mac {
        self.mac
    }

    fn device_id(&self) -> DeviceId {
        self.device
    }

    fn poll(&mut self, buf: &mut [u8]) -> Option<usize> {
        let next = self.lock().rx.pop_front();
        let Some(frame) = next else {
            self.clock.advance(self.idle_step);
            return None;
        };
        let len = frame.len().min(buf.len());
        buf[..len].copy_from_slice(&frame[..len]);
        Some(len)
    }

    fn transmit(&mut self, dest: Mac, ethertype: u16, payload: &[u8]) {
        let sent = Transmitted { dest, ethertype, payload: payload.to_vec(), at: self.clock.now() };
        let mut state = self.lock();
        if let Some(responder) = state.responder.as_mut() {
            let replies = responder(&sent);
            state.rx.extend(replies);
        }
        state.tx.push(sent);
    }
}
