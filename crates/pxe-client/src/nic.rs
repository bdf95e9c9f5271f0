//! Network device collaborator
//!
//! The engine never touches hardware. Everything it needs from a NIC driver
//! is the station address, a non-blocking receive into the single packet
//! buffer, and a raw Ethernet transmit.

use crate::wire::Mac;
use serde::{Deserialize, Serialize};

/// Bus identification of the NIC, reported to DHCP servers in the
/// machine-info encapsulated option.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceId {
    /// Bus type (1 = PCI, 2 = ISA, 3 = EISA, 4 = MCA)
    pub bus_type: u8,
    /// Vendor id on that bus
    pub vendor_id: u16,
    /// Device id on that bus
    pub device_id: u16,
}

/// A polled Ethernet interface.
pub trait Nic {
    /// Station MAC address
    fn mac(&self) -> Mac;

    /// Bus identification; all zero when unknown
    fn device_id(&self) -> DeviceId {
        DeviceId::default()
    }

    /// Copy at most one received frame (Ethernet header included) into `buf`.
    ///
    /// Returns the frame length, or `None` when the receive queue is empty.
    /// Must not block.
    fn poll(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// Send `payload` in an Ethernet II frame to `dest`.
    ///
    /// The driver adds the Ethernet header and any minimum-length padding.
    fn transmit(&mut self, dest: Mac, ethertype: u16, payload: &[u8]);
}
