//! TFTP client (RFC1350 with the RFC2348 blksize option)
//!
//! [`TftpSession`] keeps the whole transfer state between calls: ports,
//! last delivered block, negotiated block size and retry count. Each call to
//! [`TftpSession::next_block`] returns at most one new block, acknowledging
//! it before returning. [`TftpSession::fetch`] drives a whole file into an
//! [`ImageSink`].

use crate::clock::{Clock, TICKS_PER_SEC};
use crate::config::ClientConfig;
use crate::error::NetbootError;
use crate::nic::Nic;
use crate::stack::NetStack;
use crate::wire::ETH_MAX_MTU;
use crate::wire::ipv4::IP_HLEN;
use crate::wire::tftp::{
    OackError, TFTP_ACK, TFTP_DEFAULTSIZE, TFTP_EOPTNEG, TFTP_MAX_BLKSIZE, TFTP_MIN_BLKSIZE, TFTP_PORT,
    TftpPacket, build_ack, build_error, build_rrq, oack_blksize,
};
use crate::wire::udp::UDP_HLEN;
use std::net::Ipv4Addr;
use tracing::{debug, error, warn};

/// Base timeout while waiting for the first reply to an RRQ
pub const TFTP_TIMEOUT: u64 = 10 * TICKS_PER_SEC;
/// Retransmit interval once the server has sent data
pub const TFTP_REXMT: u64 = 3 * TICKS_PER_SEC;
/// First local port handed out; every RRQ takes the next one
pub const TFTP_FIRST_LOCAL_PORT: u16 = 2000;

/// What an [`ImageSink`] wants after a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    /// Keep the transfer going
    More,
    /// The image is complete; stop fetching
    Complete,
}

/// Consumer of downloaded blocks.
///
/// Blocks arrive numbered 1, 2, 3... with no gaps or repeats. `eof` is set
/// on the last one. Returning an error abandons the transfer.
pub trait ImageSink {
    /// Take one block
    fn accept(&mut self, data: &[u8], block: u32, eof: bool) -> Result<SinkStatus, NetbootError>;
}

impl<F> ImageSink for F
where
    F: FnMut(&[u8], u32, bool) -> Result<SinkStatus, NetbootError>,
{
    fn accept(&mut self, data: &[u8], block: u32, eof: bool) -> Result<SinkStatus, NetbootError> {
        self(data, block, eof)
    }
}

/// A file to start fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TftpRequest<'a> {
    /// TFTP server address
    pub server: Ipv4Addr,
    /// File name as sent in the RRQ
    pub name: &'a str,
}

/// Result of one [`TftpSession::next_block`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TftpEvent<'a> {
    /// The next block of the file
    Block {
        /// Block payload, valid until the next call
        data: &'a [u8],
        /// Position in the file, starting at 1
        number: u32,
        /// Last block of the file
        eof: bool,
    },
    /// The previous transfer already delivered its last block and no new
    /// file was named
    Finished,
}

/// A reply copied out of the receive buffer.
#[derive(Debug)]
enum Reply {
    Data { port: u16, block: u16, len: usize },
    Oack { port: u16, blksize: Result<Option<u64>, OackError> },
    Error { code: u16, message: String },
    Unexpected(u16),
    Malformed,
}

impl Reply {
    fn read(port: u16, payload: &[u8], buf: &mut [u8]) -> Self {
        match TftpPacket::parse(payload) {
            Some(TftpPacket::Data { block, data }) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Reply::Data { port, block, len }
            }
            Some(TftpPacket::Oack { options }) => Reply::Oack { port, blksize: oack_blksize(options) },
            Some(TftpPacket::Error { code, message }) => {
                Reply::Error { code, message: String::from_utf8_lossy(message).into_owned() }
            }
            Some(TftpPacket::Ack { .. }) => Reply::Unexpected(TFTP_ACK),
            Some(TftpPacket::Other(opcode)) => Reply::Unexpected(opcode),
            None => Reply::Malformed,
        }
    }
}

/// State of the current (or last) TFTP transfer.
#[derive(Debug, Clone)]
pub struct TftpSession {
    server: Ipv4Addr,
    name: String,
    next_port: u16,
    local_port: u16,
    remote_port: u16,
    /// Wire number of the last block delivered, 0 before any
    prev_block: u16,
    /// Blocks delivered so far in this transfer
    delivered: u32,
    /// Negotiated block size; 0 once the transfer is over
    block_size: u16,
    requested_size: u16,
    /// Block number we last acknowledged (0 for an accepted OACK)
    last_ack: Option<u16>,
    retry: u32,
    max_retries: u32,
    buf: [u8; TFTP_MAX_BLKSIZE as usize],
}

impl TftpSession {
    /// An idle session using the configured block size and retry count
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            server: Ipv4Addr::UNSPECIFIED,
            name: String::new(),
            next_port: TFTP_FIRST_LOCAL_PORT,
            local_port: 0,
            remote_port: TFTP_PORT,
            prev_block: 0,
            delivered: 0,
            block_size: 0,
            requested_size: config.tftp_block_size.clamp(TFTP_MIN_BLKSIZE, TFTP_MAX_BLKSIZE),
            last_ack: None,
            retry: 0,
            max_retries: config.max_tftp_retries.max(1),
            buf: [0; TFTP_MAX_BLKSIZE as usize],
        }
    }

    /// Block size in force, 0 when no transfer is running
    #[must_use]
    pub fn block_size(&self) -> u16 {
        self.block_size
    }

    /// Whether the last transfer is over
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.block_size == 0
    }

    /// Fetch the next block.
    ///
    /// With a `request`, any transfer in progress is abandoned and a new RRQ
    /// goes out from a fresh local port. Without one, the current transfer
    /// continues; once it has delivered its last block this returns
    /// [`TftpEvent::Finished`] without touching the network.
    ///
    /// # Errors
    ///
    /// [`NetbootError::Tftp`] when the server sends ERROR,
    /// [`NetbootError::OptionNegotiation`] for an unacceptable OACK,
    /// [`NetbootError::Timeout`] once the retries run out. Every error ends
    /// the transfer.
    pub fn next_block<N: Nic, C: Clock>(
        &mut self,
        stack: &mut NetStack<N, C>,
        request: Option<TftpRequest<'_>>,
    ) -> Result<TftpEvent<'_>, NetbootError> {
        if let Some(request) = request {
            self.start(stack, request)?;
        } else if self.block_size == 0 {
            return Ok(TftpEvent::Finished);
        }

        match self.receive(stack) {
            Ok(len) => {
                let eof = len < usize::from(self.block_size);
                if eof {
                    self.block_size = 0;
                }
                Ok(TftpEvent::Block { data: &self.buf[..len], number: self.delivered, eof })
            }
            Err(err) => {
                self.block_size = 0;
                Err(err)
            }
        }
    }

    /// Download `name` from `server` into `sink`.
    ///
    /// Stops as soon as the sink reports [`SinkStatus::Complete`] or fails.
    /// Reaching the end of the file while the sink still wants more is
    /// logged and treated as done.
    ///
    /// # Errors
    ///
    /// Whatever [`TftpSession::next_block`] or the sink returns.
    pub fn fetch<N: Nic, C: Clock, S: ImageSink + ?Sized>(
        &mut self,
        stack: &mut NetStack<N, C>,
        server: Ipv4Addr,
        name: &str,
        sink: &mut S,
    ) -> Result<(), NetbootError> {
        let mut request = Some(TftpRequest { server, name });
        loop {
            match self.next_block(stack, request.take())? {
                TftpEvent::Finished => return Ok(()),
                TftpEvent::Block { data, number, eof } => {
                    if sink.accept(data, number, eof)? == SinkStatus::Complete {
                        return Ok(());
                    }
                    if eof {
                        warn!(file = %name, blocks = number, "TFTP download complete, but image sink expected more data");
                        return Ok(());
                    }
                }
            }
        }
    }

    fn start<N: Nic, C: Clock>(
        &mut self,
        stack: &mut NetStack<N, C>,
        request: TftpRequest<'_>,
    ) -> Result<(), NetbootError> {
        stack.rx_qdrain()?;
        self.server = request.server;
        self.name = request.name.to_string();
        self.remote_port = TFTP_PORT;
        self.prev_block = 0;
        self.delivered = 0;
        self.block_size = TFTP_DEFAULTSIZE;
        self.last_ack = None;
        self.retry = 0;
        self.send_rrq(stack)
    }

    /// Wait for the next in-order DATA block, returning its length in `buf`
    fn receive<N: Nic, C: Clock>(&mut self, stack: &mut NetStack<N, C>) -> Result<usize, NetbootError> {
        loop {
            let timeout = if self.delivered > 0 {
                TFTP_REXMT
            } else {
                stack.backoff.rfc2131_interval(TFTP_TIMEOUT, self.retry)
            };
            let port = self.local_port;
            let buf = &mut self.buf;
            let reply = stack.await_reply(timeout, |frame| {
                let udp = frame.udp()?;
                (udp.dst_port == port).then(|| Reply::read(udp.src_port, frame.payload(), buf))
            })?;

            let Some(reply) = reply else {
                self.retry += 1;
                if self.retry >= self.max_retries {
                    warn!(file = %self.name, retries = self.retry, "TFTP transfer timed out");
                    return Err(NetbootError::Timeout("TFTP server"));
                }
                match self.last_ack {
                    Some(block) => self.send_ack(stack, block)?,
                    None => self.send_rrq(stack)?,
                }
                continue;
            };

            match reply {
                Reply::Error { code, message } => {
                    error!("TFTP error {code} ({message})");
                    return Err(NetbootError::Tftp { code, message });
                }
                Reply::Oack { port, blksize } => {
                    if self.delivered > 0 {
                        debug!("Ignoring OACK after data");
                        continue;
                    }
                    self.remote_port = port;
                    self.accept_oack(stack, blksize)?;
                }
                Reply::Data { port, block, len } => {
                    if self.delivered == 0 {
                        self.remote_port = port;
                    } else if port != self.remote_port {
                        debug!(port, "DATA from unexpected TFTP port");
                        continue;
                    }
                    if block != self.prev_block.wrapping_add(1) {
                        debug!(block, expected = self.prev_block.wrapping_add(1), "Re-acknowledging stale TFTP block");
                        self.send_ack(stack, self.prev_block)?;
                        continue;
                    }
                    self.prev_block = block;
                    self.delivered += 1;
                    self.retry = 0;
                    self.send_ack(stack, block)?;
                    return Ok(len);
                }
                Reply::Unexpected(opcode) => {
                    error!(opcode, "Unexpected TFTP opcode");
                    return Err(NetbootError::UnexpectedOpcode(opcode));
                }
                Reply::Malformed => debug!("Short TFTP packet"),
            }
        }
    }

    fn accept_oack<N: Nic, C: Clock>(
        &mut self,
        stack: &mut NetStack<N, C>,
        blksize: Result<Option<u64>, OackError>,
    ) -> Result<(), NetbootError> {
        let requested = u64::from(self.requested_size);
        let size = match blksize {
            Ok(None) => TFTP_DEFAULTSIZE,
            Ok(Some(size)) if (u64::from(TFTP_MIN_BLKSIZE)..=requested).contains(&size) => {
                u16::try_from(size).unwrap_or(TFTP_DEFAULTSIZE)
            }
            Ok(Some(size)) => {
                return Err(self.reject_oack(stack, format!("server blksize {size} outside {TFTP_MIN_BLKSIZE}..={requested}")));
            }
            Err(err) => return Err(self.reject_oack(stack, err.to_string())),
        };
        debug!(blksize = size, "TFTP OACK accepted");
        self.block_size = size;
        self.retry = 0;
        self.send_ack(stack, 0)
    }

    fn reject_oack<N: Nic, C: Clock>(&mut self, stack: &mut NetStack<N, C>, reason: String) -> NetbootError {
        error!(%reason, "TFTP option negotiation failed");
        let packet = build_error(TFTP_EOPTNEG, "RFC1782 error");
        if let Err(err) = stack.udp_transmit(self.server, self.local_port, self.remote_port, &packet) {
            debug!(error = %err, "Could not send TFTP option error");
        }
        NetbootError::OptionNegotiation(reason)
    }

    fn send_ack<N: Nic, C: Clock>(&mut self, stack: &mut NetStack<N, C>, block: u16) -> Result<(), NetbootError> {
        self.last_ack = Some(block);
        stack.udp_transmit(self.server, self.local_port, self.remote_port, &build_ack(block))
    }

    fn send_rrq<N: Nic, C: Clock>(&mut self, stack: &mut NetStack<N, C>) -> Result<(), NetbootError> {
        self.local_port = self.next_port;
        self.next_port = self.next_port.checked_add(1).unwrap_or(TFTP_FIRST_LOCAL_PORT);
        self.remote_port = TFTP_PORT;

        let mut rrq = [0u8; ETH_MAX_MTU - IP_HLEN - UDP_HLEN];
        let len = build_rrq(&mut rrq, &self.name, self.requested_size).ok_or_else(|| {
            NetbootError::Configuration(format!("TFTP file name too long: {}", self.name))
        })?;
        debug!(server = %self.server, file = %self.name, port = self.local_port, "Sending TFTP RRQ");
        stack.udp_transmit(self.server, self.local_port, TFTP_PORT, &rrq[..len])
    }
}
