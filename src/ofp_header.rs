use std::mem::size_of;

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};

use crate::ofp_errors::{OfpError, Result};

/// OpenFlow Header
///
/// The first fields of every OpenFlow message, no matter the protocol version.
/// This is parsed to determine version and length of the remaining message, so that
/// it can be properly handled.
#[repr(packed)]
#[allow(dead_code)]
struct OfpHeaderWire(u8, u8, u16, u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    /// Create an `OfpHeader` out of the arguments.
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version: version,
            typ: typ,
            length: length,
            xid: xid,
        }
    }

    /// Return the byte-size of an `OfpHeader`.
    pub fn size() -> usize {
        size_of::<OfpHeaderWire>()
    }

    /// Fills a message buffer with the header fields of an `OfpHeader`.
    pub fn marshal(bytes: &mut Vec<u8>, header: OfpHeader) {
        bytes.push(header.version);
        bytes.push(header.typ);
        bytes.write_u16::<BigEndian>(header.length).unwrap();
        bytes.write_u32::<BigEndian>(header.xid).unwrap();
    }

    /// Parses the header at the front of `buf`.
    pub fn parse(buf: &[u8]) -> Result<OfpHeader> {
        if buf.len() < Self::size() {
            return Err(OfpError::BadLength);
        }
        let mut bytes = buf;
        Ok(OfpHeader {
            version: bytes.read_u8()?,
            typ: bytes.read_u8()?,
            length: bytes.read_u16::<BigEndian>()?,
            xid: bytes.read_u32::<BigEndian>()?,
        })
    }

    /// Rewrite the `length` field of the message in `msg` to match the buffer's size.
    pub fn update_length(msg: &mut [u8]) {
        let len = msg.len();
        assert!(len <= u16::max_value() as usize, "OpenFlow message of {} bytes", len);
        BigEndian::write_u16(&mut msg[2..4], len as u16);
    }

    /// Rewrite the `xid` field of the message in `msg`.
    pub fn set_xid(msg: &mut [u8], xid: u32) {
        BigEndian::write_u32(&mut msg[4..8], xid);
    }

    /// Return the `version` field of a header.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the OpenFlow message type code of a header.
    pub fn type_code(&self) -> u8 {
        self.typ
    }

    /// Return the `length` field of a header. Includes the length of the header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Return the `xid` field of a header, the transaction id associated with this packet.
    ///  Replies use the same id to facilitate pairing.
    pub fn xid(&self) -> u32 {
        self.xid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marshal_then_patch() {
        let mut bytes = vec![];
        OfpHeader::marshal(&mut bytes, OfpHeader::new(0x05, 19, 0, 7));
        bytes.extend_from_slice(&[0; 8]);
        OfpHeader::update_length(&mut bytes);
        OfpHeader::set_xid(&mut bytes, 0x01020304);
        let hdr = OfpHeader::parse(&bytes).unwrap();
        assert_eq!(OfpHeader::size(), 8);
        assert_eq!(hdr.version(), 0x05);
        assert_eq!(hdr.type_code(), 19);
        assert_eq!(hdr.length(), 16);
        assert_eq!(hdr.xid(), 0x01020304);
    }

    #[test]
    fn short_header() {
        assert_eq!(OfpHeader::parse(&[1, 2, 3]), Err(OfpError::BadLength));
    }
}
