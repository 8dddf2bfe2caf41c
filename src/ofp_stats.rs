//! The OpenFlow 1.5 `ofp_stats` block: a length-prefixed list of OXS statistics TLVs.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::bits::{pad_to_8, round_up, try_pull};
use crate::ofp_errors::{OfpError, Result};

const OXS_OF_BASIC: u16 = 0x8002;

const OXS_DURATION: u8 = 0;
const OXS_IDLE_TIME: u8 = 1;
const OXS_FLOW_COUNT: u8 = 3;
const OXS_PACKET_COUNT: u8 = 4;
const OXS_BYTE_COUNT: u8 = 5;

/// Flow statistics carried in OXS form. `u32::MAX` and `u64::MAX` mean a statistic that is
/// unknown, and such statistics are left out on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OxsStats {
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_age: u32,
    pub flow_count: u32,
    pub packet_count: u64,
    pub byte_count: u64,
}

impl Default for OxsStats {
    fn default() -> OxsStats {
        OxsStats {
            duration_sec: u32::MAX,
            duration_nsec: u32::MAX,
            idle_age: u32::MAX,
            flow_count: u32::MAX,
            packet_count: u64::MAX,
            byte_count: u64::MAX,
        }
    }
}

fn put_header(bytes: &mut Vec<u8>, field: u8, len: usize) {
    let header = (OXS_OF_BASIC as u32) << 16 | (field as u32) << 9 | len as u32;
    bytes.write_u32::<BigEndian>(header).unwrap();
}

impl OxsStats {
    /// Append the stats block. Duration is always written.
    pub fn put(&self, bytes: &mut Vec<u8>) {
        let start = bytes.len();
        bytes.write_u16::<BigEndian>(0).unwrap();
        bytes.write_u16::<BigEndian>(0).unwrap();

        put_header(bytes, OXS_DURATION, 8);
        bytes.write_u32::<BigEndian>(self.duration_sec).unwrap();
        bytes.write_u32::<BigEndian>(self.duration_nsec).unwrap();
        if self.idle_age != u32::MAX {
            put_header(bytes, OXS_IDLE_TIME, 8);
            bytes.write_u64::<BigEndian>((self.idle_age as u64) << 32).unwrap();
        }
        if self.flow_count != u32::MAX {
            put_header(bytes, OXS_FLOW_COUNT, 4);
            bytes.write_u32::<BigEndian>(self.flow_count).unwrap();
        }
        if self.packet_count != u64::MAX {
            put_header(bytes, OXS_PACKET_COUNT, 8);
            bytes.write_u64::<BigEndian>(self.packet_count).unwrap();
        }
        if self.byte_count != u64::MAX {
            put_header(bytes, OXS_BYTE_COUNT, 8);
            bytes.write_u64::<BigEndian>(self.byte_count).unwrap();
        }

        let length = bytes.len() - start;
        bytes[start + 2] = (length >> 8) as u8;
        bytes[start + 3] = length as u8;
        pad_to_8(bytes, start);
    }

    /// Pull a stats block, padding included, from the front of `buf`.
    pub fn pull(buf: &mut &[u8]) -> Result<OxsStats> {
        if buf.len() < 4 {
            return Err(OfpError::BadLength);
        }
        let length = (&buf[2..4]).read_u16::<BigEndian>()? as usize;
        if length < 4 {
            return Err(OfpError::BadLength);
        }
        let region = try_pull(buf, round_up(length, 8)).ok_or(OfpError::BadLength)?;
        let mut tlvs = &region[4..length];

        let mut stats = OxsStats::default();
        let mut seen = 0u32;
        while !tlvs.is_empty() {
            let header = try_pull(&mut tlvs, 4).ok_or(OfpError::BadLength)?
                .read_u32::<BigEndian>()?;
            let class = (header >> 16) as u16;
            let field = ((header >> 9) & 0x7f) as u8;
            let len = (header & 0xff) as usize;
            let mut value = try_pull(&mut tlvs, len).ok_or(OfpError::BadLength)?;
            let expected = match field {
                OXS_FLOW_COUNT => 4,
                OXS_DURATION | OXS_IDLE_TIME | OXS_PACKET_COUNT | OXS_BYTE_COUNT => 8,
                _ => return Err(OfpError::BadField),
            };
            if class != OXS_OF_BASIC {
                return Err(OfpError::BadField);
            }
            if len != expected || seen & (1 << field) != 0 {
                return Err(OfpError::BadMatchLength);
            }
            seen |= 1 << field;
            match field {
                OXS_DURATION => {
                    stats.duration_sec = value.read_u32::<BigEndian>()?;
                    stats.duration_nsec = value.read_u32::<BigEndian>()?;
                }
                OXS_IDLE_TIME => stats.idle_age = value.read_u32::<BigEndian>()?,
                OXS_FLOW_COUNT => stats.flow_count = value.read_u32::<BigEndian>()?,
                OXS_PACKET_COUNT => stats.packet_count = value.read_u64::<BigEndian>()?,
                OXS_BYTE_COUNT => stats.byte_count = value.read_u64::<BigEndian>()?,
                _ => return Err(OfpError::BadField),
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_counters_are_omitted() {
        let stats = OxsStats {
            duration_sec: 7,
            duration_nsec: 5,
            packet_count: 12,
            ..OxsStats::default()
        };
        let mut bytes = vec![];
        stats.put(&mut bytes);
        // Header, duration and packet count: 4 + 12 + 12.
        assert_eq!(&bytes[2..4], &[0, 28]);
        assert_eq!(bytes.len(), 32);
        let mut buf = &bytes[..];
        assert_eq!(OxsStats::pull(&mut buf), Ok(stats));
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_bad_blocks() {
        let mut buf: &[u8] = &[0, 0, 0, 2, 0, 0, 0, 0];
        assert_eq!(OxsStats::pull(&mut buf), Err(OfpError::BadLength));
        let mut buf: &[u8] = &[0, 0, 0, 24, 0, 0, 0, 0];
        assert_eq!(OxsStats::pull(&mut buf), Err(OfpError::BadLength));
        // Unknown class.
        let mut buf: &[u8] = &[0, 0, 0, 12, 0x80, 0x00, 0x00, 0x04, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(OxsStats::pull(&mut buf), Err(OfpError::BadField));
        // Unknown field.
        let mut buf: &[u8] = &[0, 0, 0, 12, 0x80, 0x02, 0x04, 0x04, 0, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(OxsStats::pull(&mut buf), Err(OfpError::BadField));
        // Flow count with an 8-byte value.
        let mut buf: &[u8] = &[0, 0, 0, 16, 0x80, 0x02, 0x06, 0x08, 0, 0, 0, 0, 0, 0, 0, 1];
        assert_eq!(OxsStats::pull(&mut buf), Err(OfpError::BadMatchLength));
        // Flow count twice.
        let mut buf: &[u8] = &[0, 0, 0, 20, 0x80, 0x02, 0x06, 0x04, 0, 0, 0, 1, 0x80, 0x02, 0x06,
                               0x04, 0, 0, 0, 2, 0, 0, 0, 0];
        assert_eq!(OxsStats::pull(&mut buf), Err(OfpError::BadMatchLength));
    }
}
