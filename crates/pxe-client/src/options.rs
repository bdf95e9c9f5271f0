//! RFC1533 vendor options
//!
//! [`VendorOptions`] is the streaming decoder fed with the vendor area of a
//! BOOTP/DHCP reply (chunk 0) and, optionally, with the blocks of a
//! BOOTP extension file fetched over TFTP (chunks 1..n). Chunks are copied
//! into one fixed buffer and interpreted when the final chunk arrives.
//! [`OptionWriter`] builds the option blocks of outgoing requests.

use crate::error::{NetbootError, OptionError};
use crate::tftp::{ImageSink, SinkStatus};
use crate::wire::bootp::DHCP_OPT_LEN;
use crate::wire::{ETH_MAX_MTU, be32, ipv4_at};
use std::net::Ipv4Addr;
use std::ops::Range;
use tracing::{debug, error};

/// The magic cookie every RFC1533 option area starts with
pub const RFC1533_COOKIE: [u8; 4] = [99, 130, 83, 99];

/// Room for extension-file data: one full datagram after the BOOTP
/// IP/UDP/fixed headers
pub const MAX_BOOTP_EXTLEN: usize = ETH_MAX_MTU - 20 - 8 - 236;

/// Fixed capacity of the decoder buffer, cookies included
pub const VENDOR_OPTIONS_CAPACITY: usize = DHCP_OPT_LEN + MAX_BOOTP_EXTLEN;

/// Option tags understood by the client
pub mod tag {
    /// Padding, no length byte
    pub const PAD: u8 = 0;
    /// Subnet mask
    pub const NETMASK: u8 = 1;
    /// Routers
    pub const GATEWAY: u8 = 3;
    /// Domain name servers
    pub const DNS: u8 = 6;
    /// Host name
    pub const HOSTNAME: u8 = 12;
    /// Root path, passed on to the booted image
    pub const ROOT_PATH: u8 = 17;
    /// BOOTP extension file
    pub const EXTENSION_PATH: u8 = 18;
    /// Vendor specific information
    pub const VENDOR: u8 = 43;
    /// Requested IP address
    pub const REQUESTED_IP: u8 = 50;
    /// DHCP message type
    pub const MSG_TYPE: u8 = 53;
    /// Server identifier
    pub const SERVER_ID: u8 = 54;
    /// Parameter request list
    pub const PARAM_LIST: u8 = 55;
    /// Maximum DHCP message size
    pub const MAX_SIZE: u8 = 57;
    /// Vendor class identifier
    pub const VENDOR_CLASS_ID: u8 = 60;
    /// Client identifier
    pub const CLIENT_ID: u8 = 61;
    /// User class
    pub const USER_CLASS: u8 = 77;
    /// Etherboot vendor magic and version
    pub const VENDOR_MAGIC: u8 = 128;
    /// Additional kernel parameters
    pub const VENDOR_ADDPARM: u8 = 129;
    /// Ethernet device name for the kernel
    pub const VENDOR_ETHDEV: u8 = 130;
    /// Boot "howto" flags word
    pub const VENDOR_HOWTO: u8 = 132;
    /// Etherboot encapsulated options
    pub const ETHERBOOT_ENCAP: u8 = 150;
    /// Encapsulated: NIC bus type, vendor id, device id
    pub const NIC_DEV_ID: u8 = 175;
    /// Encapsulated: client architecture (ELF machine number)
    pub const ARCH: u8 = 177;
    /// End of options
    pub const END: u8 = 255;
}

/// DHCP message types (option 53)
pub mod msg {
    /// DHCPDISCOVER
    pub const DISCOVER: u8 = 1;
    /// DHCPOFFER
    pub const OFFER: u8 = 2;
    /// DHCPREQUEST
    pub const REQUEST: u8 = 3;
    /// DHCPACK
    pub const ACK: u8 = 5;
    /// DHCPNAK
    pub const NAK: u8 = 6;
}

/// Private magic carried in tag 128 ("\xE4Eth"), followed by major version 0
pub const VENDOR_EXT_MAGIC: [u8; 4] = [0xE4, 0x45, 0x74, 0x68];
const VENDOR_EXT_MAJOR: u8 = 0;

/// One tag/length/value record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    /// Option tag
    pub tag: u8,
    /// Value bytes
    pub value: &'a [u8],
    /// Offset of the value within the slice being iterated
    pub offset: usize,
}

/// Iterator over the records of an option area (cookie already removed).
///
/// Stops at END, at the end of the slice, or at a record whose length
/// byte runs past the slice. PAD bytes are skipped.
#[derive(Debug, Clone)]
pub struct OptionIter<'a> {
    buf: &'a [u8],
    pos: usize,
    end: Option<usize>,
    truncated: bool,
}

impl<'a> OptionIter<'a> {
    /// Iterate the records in `buf`
    #[must_use]
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0, end: None, truncated: false }
    }

    /// Offset of the END tag, once reached
    #[must_use]
    pub fn end_offset(&self) -> Option<usize> {
        self.end
    }

    /// Whether iteration stopped on a record running past the slice
    #[must_use]
    pub fn truncated(&self) -> bool {
        self.truncated
    }
}

impl<'a> Iterator for OptionIter<'a> {
    type Item = Tlv<'a>;

    fn next(&mut self) -> Option<Tlv<'a>> {
        while self.end.is_none() && !self.truncated && self.pos < self.buf.len() {
            let tag = self.buf[self.pos];
            match tag {
                tag::PAD => self.pos += 1,
                tag::END => self.end = Some(self.pos),
                _ => {
                    let Some(&len) = self.buf.get(self.pos + 1) else {
                        self.truncated = true;
                        break;
                    };
                    let offset = self.pos + 2;
                    let Some(value) = self.buf.get(offset..offset + usize::from(len)) else {
                        self.truncated = true;
                        break;
                    };
                    self.pos = offset + value.len();
                    return Some(Tlv { tag, value, offset });
                }
            }
        }
        None
    }
}

/// Find the first record with `wanted` tag in a vendor area that starts with the cookie
#[must_use]
pub fn find_option(vendor_area: &[u8], wanted: u8) -> Option<&[u8]> {
    let body = vendor_area.strip_prefix(&RFC1533_COOKIE[..])?;
    OptionIter::new(body).find(|tlv| tlv.tag == wanted).map(|tlv| tlv.value)
}

/// Values extracted by the final decode pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedOptions {
    /// Subnet mask (tag 1)
    pub netmask: Option<Ipv4Addr>,
    /// First router of the first gateway tag (tag 3)
    pub gateway: Option<Ipv4Addr>,
    /// First DNS server (tag 6)
    pub nameserver: Option<Ipv4Addr>,
    /// DHCP message type (tag 53)
    pub message_type: Option<u8>,
    /// DHCP server identifier (tag 54)
    pub server_id: Option<Ipv4Addr>,
    /// Etherboot vendor magic seen with a supported version
    pub vendor_ext_valid: bool,
    /// Boot flags word (tag 132)
    pub howto: Option<u32>,
    hostname: Option<Range<usize>>,
    extension_path: Option<Range<usize>>,
    root_path: Option<Range<usize>>,
}

impl DecodedOptions {
    fn apply(&mut self, tlv: Tlv<'_>, base: usize) {
        let range = base + tlv.offset..base + tlv.offset + tlv.value.len();
        match tlv.tag {
            tag::NETMASK if tlv.value.len() >= 4 => self.netmask = Some(ipv4_at(tlv.value, 0)),
            tag::GATEWAY if tlv.value.len() >= 4 && self.gateway.is_none() => {
                self.gateway = Some(ipv4_at(tlv.value, 0));
            }
            tag::DNS if tlv.value.len() >= 4 => self.nameserver = Some(ipv4_at(tlv.value, 0)),
            tag::HOSTNAME => self.hostname = Some(range),
            tag::ROOT_PATH => self.root_path = Some(range),
            tag::EXTENSION_PATH => self.extension_path = Some(range),
            tag::MSG_TYPE if !tlv.value.is_empty() => self.message_type = Some(tlv.value[0]),
            tag::SERVER_ID if tlv.value.len() >= 4 => self.server_id = Some(ipv4_at(tlv.value, 0)),
            tag::VENDOR_HOWTO if tlv.value.len() >= 4 => self.howto = Some(be32(tlv.value, 0)),
            tag::VENDOR_MAGIC => self.apply_vendor_magic(tlv.value),
            tag::ETHERBOOT_ENCAP => {
                // One level deep only
                for inner in OptionIter::new(tlv.value).filter(|inner| inner.tag != tag::ETHERBOOT_ENCAP) {
                    self.apply(inner, base + tlv.offset);
                }
            }
            _ => {}
        }
    }

    fn apply_vendor_magic(&mut self, value: &[u8]) {
        if value.len() >= 6 && value[..4] == VENDOR_EXT_MAGIC && value[4] == VENDOR_EXT_MAJOR {
            self.vendor_ext_valid = true;
        }
    }
}

/// Streaming RFC1533 decoder over a fixed buffer.
#[derive(Debug, Clone)]
pub struct VendorOptions {
    buf: [u8; VENDOR_OPTIONS_CAPACITY],
    /// Bytes of `buf` in use
    fill: usize,
    /// Where extension-file data starts (the END of chunk 0)
    ext_start: usize,
    decoded: DecodedOptions,
}

impl Default for VendorOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl VendorOptions {
    /// An empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self {
            buf: [0; VENDOR_OPTIONS_CAPACITY],
            fill: 0,
            ext_start: 0,
            decoded: DecodedOptions::default(),
        }
    }

    /// Forget everything decoded so far
    pub fn reset(&mut self) {
        self.fill = 0;
        self.ext_start = 0;
        self.decoded = DecodedOptions::default();
    }

    /// Feed one chunk.
    ///
    /// Chunk 0 is the vendor area of a reply and restarts decoding. Chunks
    /// 1..n are extension-file blocks appended after chunk 0's END tag.
    /// Chunks 0 and 1 must start with the magic cookie. Records are
    /// interpreted only when `eof` is set.
    ///
    /// # Errors
    ///
    /// [`OptionError::NoVendorHeader`] when a cookie is missing, and
    /// [`OptionError::Overflow`] when the chunk would not fit; neither
    /// leaves a partial write behind.
    pub fn decode(&mut self, chunk: &[u8], block: u32, eof: bool) -> Result<(), OptionError> {
        let data = if block == 0 {
            self.reset();
            if !chunk.starts_with(&RFC1533_COOKIE) {
                return Err(OptionError::NoVendorHeader);
            }
            chunk
        } else if block == 1 {
            chunk.strip_prefix(&RFC1533_COOKIE[..]).ok_or(OptionError::NoVendorHeader)?
        } else {
            chunk
        };

        let needed = self.fill + data.len();
        if needed > VENDOR_OPTIONS_CAPACITY {
            error!("Overflow in vendor data buffer! Aborting...");
            return Err(OptionError::Overflow { needed, capacity: VENDOR_OPTIONS_CAPACITY });
        }
        self.buf[self.fill..needed].copy_from_slice(data);
        self.fill = needed;

        if !eof {
            return Ok(());
        }

        let start = if block == 0 { RFC1533_COOKIE.len() } else { self.ext_start };
        let mut records = OptionIter::new(&self.buf[start..self.fill]);
        for tlv in records.by_ref() {
            self.decoded.apply(tlv, start);
        }
        if records.truncated() {
            debug!("RFC1533 option runs past end of data, ignoring the rest");
        }
        let end = records.end_offset().map_or(self.fill, |offset| start + offset);
        // Extension data overwrites whatever trailed the END tag
        self.fill = end;
        self.ext_start = end;
        Ok(())
    }

    /// Decoded values
    #[must_use]
    pub fn decoded(&self) -> &DecodedOptions {
        &self.decoded
    }

    /// DHCP message type of the last decoded reply
    #[must_use]
    pub fn message_type(&self) -> Option<u8> {
        self.decoded.message_type
    }

    /// Host name bytes, borrowed from the buffer
    #[must_use]
    pub fn hostname(&self) -> Option<&[u8]> {
        self.slice(self.decoded.hostname.as_ref())
    }

    /// Extension file path, if the server named one
    #[must_use]
    pub fn extension_path(&self) -> Option<String> {
        self.slice(self.decoded.extension_path.as_ref())
            .map(|p| String::from_utf8_lossy(p).trim_end_matches('\0').to_string())
    }

    /// Root path for the booted image
    #[must_use]
    pub fn root_path(&self) -> Option<&[u8]> {
        self.slice(self.decoded.root_path.as_ref())
    }

    /// Bytes currently held, cookie included
    #[must_use]
    pub fn len(&self) -> usize {
        self.fill
    }

    /// Whether nothing has been fed since the last reset
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fill == 0
    }

    fn slice(&self, range: Option<&Range<usize>>) -> Option<&[u8]> {
        range.and_then(|r| self.buf.get(r.clone()))
    }
}

/// Extension files are fed block by block straight into the decoder
impl ImageSink for VendorOptions {
    fn accept(&mut self, data: &[u8], block: u32, eof: bool) -> Result<SinkStatus, NetbootError> {
        self.decode(data, block, eof)?;
        Ok(if eof { SinkStatus::Complete } else { SinkStatus::More })
    }
}

/// Writes an option block: cookie, records, END.
#[derive(Debug)]
pub struct OptionWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> OptionWriter<'a> {
    /// Start a block in `buf` with the magic cookie
    pub fn new(buf: &'a mut [u8]) -> Result<Self, OptionError> {
        if buf.len() < RFC1533_COOKIE.len() {
            return Err(OptionError::Truncated);
        }
        buf[..4].copy_from_slice(&RFC1533_COOKIE);
        Ok(Self { buf, pos: 4 })
    }

    /// Append one record
    pub fn put(&mut self, tag: u8, value: &[u8]) -> Result<&mut Self, OptionError> {
        let len = u8::try_from(value.len()).map_err(|_| OptionError::Truncated)?;
        let end = self.pos + 2 + value.len();
        // keep room for END
        if end + 1 > self.buf.len() {
            return Err(OptionError::Truncated);
        }
        self.buf[self.pos] = tag;
        self.buf[self.pos + 1] = len;
        self.buf[self.pos + 2..end].copy_from_slice(value);
        self.pos = end;
        Ok(self)
    }

    /// Append a one-byte record
    pub fn put_u8(&mut self, tag: u8, value: u8) -> Result<&mut Self, OptionError> {
        self.put(tag, &[value])
    }

    /// Append a big-endian two-byte record
    pub fn put_u16(&mut self, tag: u8, value: u16) -> Result<&mut Self, OptionError> {
        self.put(tag, &value.to_be_bytes())
    }

    /// Append an address record
    pub fn put_ip(&mut self, tag: u8, addr: Ipv4Addr) -> Result<&mut Self, OptionError> {
        self.put(tag, &addr.octets())
    }

    /// Terminate with END and return the total length written
    pub fn finish(self) -> usize {
        self.buf[self.pos] = tag::END;
        self.pos + 1
    }
}
