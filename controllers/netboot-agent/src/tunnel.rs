//! Ethernet over UDP.
//!
//! Each datagram carries exactly one Ethernet frame, header included and no
//! FCS. This is the framing QEMU's `-netdev dgram` and `-netdev socket,udp=`
//! backends speak, so a VM's NIC can be plugged straight into the agent.

use pxe_client::wire::ETH_HLEN;
use pxe_client::{DeviceId, Mac, Nic};
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, warn};

/// Shortest Ethernet frame on the wire, FCS excluded
const ETH_ZLEN: usize = 60;

/// How long one poll may block waiting for a datagram
const POLL_WAIT: Duration = Duration::from_millis(1);

/// A [`Nic`] whose wire is a connected UDP socket.
#[derive(Debug)]
pub struct UdpTunnelNic {
    socket: UdpSocket,
    mac: Mac,
    frame: Vec<u8>,
}

impl UdpTunnelNic {
    /// Bind `local` and exchange frames with `remote` only
    pub fn connect(local: SocketAddr, remote: SocketAddr, mac: Mac) -> io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.connect(remote)?;
        socket.set_read_timeout(Some(POLL_WAIT))?;
        debug!(%local, %remote, %mac, "Ethernet tunnel up");
        Ok(Self { socket, mac, frame: Vec::with_capacity(ETH_HLEN + 1500) })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Nic for UdpTunnelNic {
    fn mac(&self) -> Mac {
        self.mac
    }

    fn device_id(&self) -> DeviceId {
        // virtio-net on PCI
        DeviceId { bus_type: 1, vendor_id: 0x1af4, device_id: 0x1000 }
    }

    fn poll(&mut self, buf: &mut [u8]) -> Option<usize> {
        match self.socket.recv(buf) {
            Ok(len) if len >= ETH_HLEN => Some(len),
            Ok(len) => {
                debug!(len, "Runt frame from tunnel");
                None
            }
            Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => None,
            Err(err) => {
                warn!(error = %err, "Tunnel receive failed");
                None
            }
        }
    }

    fn transmit(&mut self, dest: Mac, ethertype: u16, payload: &[u8]) {
        self.frame.clear();
        self.frame.extend_from_slice(&dest.0);
        self.frame.extend_from_slice(&self.mac.0);
        self.frame.extend_from_slice(&ethertype.to_be_bytes());
        self.frame.extend_from_slice(payload);
        if self.frame.len() < ETH_ZLEN {
            self.frame.resize(ETH_ZLEN, 0);
        }
        if let Err(err) = self.socket.send(&self.frame) {
            warn!(error = %err, "Tunnel send failed");
        }
    }
}
