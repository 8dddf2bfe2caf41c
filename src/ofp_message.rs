use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use log::warn;

use crate::bits::put_zeros;
use crate::ofp_errors::{OfpError, Result};
use crate::ofp_header::OfpHeader;
use crate::ofp_protocol::Version;

/// OpenFlow Message
///
/// Version-agnostic API for messages that can be carried whole inside another message.
pub trait OfpMessage: Sized {
    /// Return a marshaled buffer containing an OpenFlow header and the message `msg`.
    fn marshal(msg: &Self, version: Version, xid: u32) -> Vec<u8>;
    /// Parse a complete message `buf`, header included.
    fn parse(buf: &[u8]) -> Result<Self>;
}

/// Nicira vendor id.
pub const NX_VENDOR_ID: u32 = 0x0000_2320;
/// Open Networking Foundation experimenter id.
pub const ONF_VENDOR_ID: u32 = 0x4f4e_4600;

/// Multipart reply flag: more replies follow.
pub const OFPSF_REPLY_MORE: u16 = 1 << 0;

const OFPT_VENDOR: u8 = 4;
const OFPT_FLOW_REMOVED: u8 = 11;
const OFPT_GROUP_MOD: u8 = 15;
const OFPT10_STATS_REQUEST: u8 = 16;
const OFPT10_STATS_REPLY: u8 = 17;
const OFPT11_STATS_REQUEST: u8 = 18;
const OFPT11_STATS_REPLY: u8 = 19;
const OFPT_METER_MOD: u8 = 29;
const OFPT14_REQUESTFORWARD: u8 = 32;

const OFPST_VENDOR: u16 = 0xffff;
const OFPMP_FLOW_MONITOR: u16 = 16;

/// How a message kind is framed on the wire.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Framing {
    /// Plain OpenFlow message type.
    Ofpt(u8),
    /// Vendor/experimenter message: vendor id and subtype.
    Vendor(u32, u32),
    /// Standard stats/multipart message type.
    Stats(u16),
    /// Vendor/experimenter stats/multipart message: vendor id and subtype.
    VendorStats(u32, u32),
}

/// The precise wire kind of a message handled by this crate.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OfpRaw {
    Ofpt10FlowRemoved,
    Ofpt11FlowRemoved,
    Ofpt15FlowRemoved,
    NxtFlowRemoved,

    NxstFlowMonitorRequest,
    Onfst13FlowMonitorRequest,
    Ofpst14FlowMonitorRequest,

    NxstFlowMonitorReply,
    Onfst13FlowMonitorReply,
    Ofpst14FlowMonitorReply,

    NxtFlowMonitorCancel,
    Onft13FlowMonitorCancel,
    NxtFlowMonitorPaused,
    NxtFlowMonitorResumed,
    Onft13FlowMonitorPaused,
    Onft13FlowMonitorResumed,

    NxtRequestForward,
    Onft13RequestForward,
    Ofpt14RequestForward,

    Ofpt11GroupMod,
    Ofpt13MeterMod,
}

const ALL_RAWS: [OfpRaw; 21] = [OfpRaw::Ofpt10FlowRemoved,
                                OfpRaw::Ofpt11FlowRemoved,
                                OfpRaw::Ofpt15FlowRemoved,
                                OfpRaw::NxtFlowRemoved,
                                OfpRaw::NxstFlowMonitorRequest,
                                OfpRaw::Onfst13FlowMonitorRequest,
                                OfpRaw::Ofpst14FlowMonitorRequest,
                                OfpRaw::NxstFlowMonitorReply,
                                OfpRaw::Onfst13FlowMonitorReply,
                                OfpRaw::Ofpst14FlowMonitorReply,
                                OfpRaw::NxtFlowMonitorCancel,
                                OfpRaw::Onft13FlowMonitorCancel,
                                OfpRaw::NxtFlowMonitorPaused,
                                OfpRaw::NxtFlowMonitorResumed,
                                OfpRaw::Onft13FlowMonitorPaused,
                                OfpRaw::Onft13FlowMonitorResumed,
                                OfpRaw::NxtRequestForward,
                                OfpRaw::Onft13RequestForward,
                                OfpRaw::Ofpt14RequestForward,
                                OfpRaw::Ofpt11GroupMod,
                                OfpRaw::Ofpt13MeterMod];

impl OfpRaw {
    fn framing(self) -> Framing {
        match self {
            OfpRaw::Ofpt10FlowRemoved |
            OfpRaw::Ofpt11FlowRemoved |
            OfpRaw::Ofpt15FlowRemoved => Framing::Ofpt(OFPT_FLOW_REMOVED),
            OfpRaw::NxtFlowRemoved => Framing::Vendor(NX_VENDOR_ID, 14),
            OfpRaw::NxstFlowMonitorRequest |
            OfpRaw::NxstFlowMonitorReply => Framing::VendorStats(NX_VENDOR_ID, 2),
            OfpRaw::Onfst13FlowMonitorRequest |
            OfpRaw::Onfst13FlowMonitorReply => Framing::VendorStats(ONF_VENDOR_ID, 1870),
            OfpRaw::Ofpst14FlowMonitorRequest |
            OfpRaw::Ofpst14FlowMonitorReply => Framing::Stats(OFPMP_FLOW_MONITOR),
            OfpRaw::NxtFlowMonitorCancel => Framing::Vendor(NX_VENDOR_ID, 21),
            OfpRaw::NxtFlowMonitorPaused => Framing::Vendor(NX_VENDOR_ID, 22),
            OfpRaw::NxtFlowMonitorResumed => Framing::Vendor(NX_VENDOR_ID, 23),
            OfpRaw::Onft13FlowMonitorCancel => Framing::Vendor(ONF_VENDOR_ID, 1870),
            OfpRaw::Onft13FlowMonitorPaused => Framing::Vendor(ONF_VENDOR_ID, 1871),
            OfpRaw::Onft13FlowMonitorResumed => Framing::Vendor(ONF_VENDOR_ID, 1872),
            OfpRaw::NxtRequestForward => Framing::Vendor(NX_VENDOR_ID, 132),
            OfpRaw::Onft13RequestForward => Framing::Vendor(ONF_VENDOR_ID, 2350),
            OfpRaw::Ofpt14RequestForward => Framing::Ofpt(OFPT14_REQUESTFORWARD),
            OfpRaw::Ofpt11GroupMod => Framing::Ofpt(OFPT_GROUP_MOD),
            OfpRaw::Ofpt13MeterMod => Framing::Ofpt(OFPT_METER_MOD),
        }
    }

    /// The inclusive range of versions in which `self` exists.
    fn versions(self) -> (Version, Version) {
        match self {
            OfpRaw::Ofpt10FlowRemoved => (Version::Ofp10, Version::Ofp10),
            OfpRaw::Ofpt11FlowRemoved => (Version::Ofp11, Version::Ofp14),
            OfpRaw::Ofpt15FlowRemoved => (Version::Ofp15, Version::Ofp15),
            OfpRaw::NxtFlowRemoved => (Version::Ofp10, Version::Ofp15),
            OfpRaw::NxstFlowMonitorRequest |
            OfpRaw::NxstFlowMonitorReply |
            OfpRaw::NxtFlowMonitorCancel |
            OfpRaw::NxtFlowMonitorPaused |
            OfpRaw::NxtFlowMonitorResumed |
            OfpRaw::NxtRequestForward => (Version::Ofp10, Version::Ofp12),
            OfpRaw::Onfst13FlowMonitorRequest |
            OfpRaw::Onfst13FlowMonitorReply |
            OfpRaw::Onft13FlowMonitorCancel |
            OfpRaw::Onft13FlowMonitorPaused |
            OfpRaw::Onft13FlowMonitorResumed |
            OfpRaw::Onft13RequestForward => (Version::Ofp13, Version::Ofp13),
            OfpRaw::Ofpst14FlowMonitorRequest |
            OfpRaw::Ofpst14FlowMonitorReply |
            OfpRaw::Ofpt14RequestForward => (Version::Ofp14, Version::Ofp15),
            OfpRaw::Ofpt11GroupMod => (Version::Ofp11, Version::Ofp15),
            OfpRaw::Ofpt13MeterMod => (Version::Ofp13, Version::Ofp15),
        }
    }

    fn is_reply(self) -> bool {
        match self {
            OfpRaw::NxstFlowMonitorReply |
            OfpRaw::Onfst13FlowMonitorReply |
            OfpRaw::Ofpst14FlowMonitorReply => true,
            _ => false,
        }
    }

    /// True if `self` is a stats/multipart message, whose header carries reply flags.
    pub fn is_multipart(self) -> bool {
        match self.framing() {
            Framing::Stats(_) | Framing::VendorStats(..) => true,
            _ => false,
        }
    }

    /// True if `self` exists in `version`.
    pub fn supports(self, version: Version) -> bool {
        let (lo, hi) = self.versions();
        lo <= version && version <= hi
    }

    /// Byte-size of the header that precedes the body of a `self` message.
    pub fn header_len(self) -> usize {
        match self.framing() {
            Framing::Ofpt(_) => OfpHeader::size(),
            Framing::Vendor(..) => 16,
            Framing::Stats(_) => 16,
            Framing::VendorStats(..) => 24,
        }
    }

    /// Human-readable name, as used in logs.
    pub fn name(self) -> &'static str {
        match self {
            OfpRaw::Ofpt10FlowRemoved |
            OfpRaw::Ofpt11FlowRemoved |
            OfpRaw::Ofpt15FlowRemoved => "OFPT_FLOW_REMOVED",
            OfpRaw::NxtFlowRemoved => "NXT_FLOW_REMOVED",
            OfpRaw::NxstFlowMonitorRequest => "NXST_FLOW_MONITOR request",
            OfpRaw::Onfst13FlowMonitorRequest => "ONFST_FLOW_MONITOR request",
            OfpRaw::Ofpst14FlowMonitorRequest => "OFPST_FLOW_MONITOR request",
            OfpRaw::NxstFlowMonitorReply => "NXST_FLOW_MONITOR reply",
            OfpRaw::Onfst13FlowMonitorReply => "ONFST_FLOW_MONITOR reply",
            OfpRaw::Ofpst14FlowMonitorReply => "OFPST_FLOW_MONITOR reply",
            OfpRaw::NxtFlowMonitorCancel => "NXT_FLOW_MONITOR_CANCEL",
            OfpRaw::Onft13FlowMonitorCancel => "ONFT_FLOW_MONITOR_CANCEL",
            OfpRaw::NxtFlowMonitorPaused => "NXT_FLOW_MONITOR_PAUSED",
            OfpRaw::NxtFlowMonitorResumed => "NXT_FLOW_MONITOR_RESUMED",
            OfpRaw::Onft13FlowMonitorPaused => "ONFT_FLOW_MONITOR_PAUSED",
            OfpRaw::Onft13FlowMonitorResumed => "ONFT_FLOW_MONITOR_RESUMED",
            OfpRaw::NxtRequestForward => "NXT_REQUESTFORWARD",
            OfpRaw::Onft13RequestForward => "ONFT_REQUESTFORWARD",
            OfpRaw::Ofpt14RequestForward => "OFPT_REQUESTFORWARD",
            OfpRaw::Ofpt11GroupMod => "OFPT_GROUP_MOD",
            OfpRaw::Ofpt13MeterMod => "OFPT_METER_MOD",
        }
    }

    /// Append a header for a `self` message in `version` to `bytes`. The length field covers
    /// only the header; callers append a body and then call `OfpHeader::update_length`.
    ///
    /// # Panics
    ///
    /// If `self` does not exist in `version`.
    pub fn put(self, version: Version, xid: u32, bytes: &mut Vec<u8>) {
        assert!(self.supports(version), "{} does not exist in {}", self.name(), version);
        let start = bytes.len();
        let len = self.header_len() as u16;
        match self.framing() {
            Framing::Ofpt(typ) => OfpHeader::marshal(bytes, OfpHeader::new(version.wire(), typ, len, xid)),
            Framing::Vendor(vendor, subtype) => {
                OfpHeader::marshal(bytes, OfpHeader::new(version.wire(), OFPT_VENDOR, len, xid));
                bytes.write_u32::<BigEndian>(vendor).unwrap();
                bytes.write_u32::<BigEndian>(subtype).unwrap();
            }
            Framing::Stats(typ) => {
                let code = Self::stats_code(version, self.is_reply());
                OfpHeader::marshal(bytes, OfpHeader::new(version.wire(), code, len, xid));
                bytes.write_u16::<BigEndian>(typ).unwrap();
                bytes.write_u16::<BigEndian>(0).unwrap();
                put_zeros(bytes, 4);
            }
            Framing::VendorStats(vendor, subtype) => {
                let code = Self::stats_code(version, self.is_reply());
                OfpHeader::marshal(bytes, OfpHeader::new(version.wire(), code, len, xid));
                bytes.write_u16::<BigEndian>(OFPST_VENDOR).unwrap();
                bytes.write_u16::<BigEndian>(0).unwrap();
                if version == Version::Ofp10 {
                    bytes.write_u32::<BigEndian>(vendor).unwrap();
                    bytes.write_u32::<BigEndian>(subtype).unwrap();
                    put_zeros(bytes, 4);
                } else {
                    put_zeros(bytes, 4);
                    bytes.write_u32::<BigEndian>(vendor).unwrap();
                    bytes.write_u32::<BigEndian>(subtype).unwrap();
                }
            }
        }
        debug_assert_eq!(bytes.len() - start, self.header_len());
    }

    fn stats_code(version: Version, reply: bool) -> u8 {
        match (version, reply) {
            (Version::Ofp10, false) => OFPT10_STATS_REQUEST,
            (Version::Ofp10, true) => OFPT10_STATS_REPLY,
            (_, false) => OFPT11_STATS_REQUEST,
            (_, true) => OFPT11_STATS_REPLY,
        }
    }

    fn find(version: Version, framing: Framing, reply: bool) -> Option<OfpRaw> {
        ALL_RAWS.iter()
            .cloned()
            .find(|raw| {
                raw.framing() == framing && raw.supports(version) &&
                (!raw.is_multipart() || raw.is_reply() == reply)
            })
    }
}

/// A classified message: its wire kind, header fields and the body following the header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RawMessage<'a> {
    pub raw: OfpRaw,
    pub version: Version,
    pub xid: u32,
    /// Multipart flags, zero for other messages.
    pub flags: u16,
    pub body: &'a [u8],
}

impl<'a> RawMessage<'a> {
    /// Classify the framed message at the front of `buf`. The message extends for the length
    /// given in its header; bytes past it are ignored.
    pub fn decode(buf: &'a [u8]) -> Result<RawMessage<'a>> {
        let header = OfpHeader::parse(buf)?;
        let version = Version::of_wire(header.version()).ok_or(OfpError::VersionMismatch)?;
        let length = header.length();
        if length < OfpHeader::size() || length > buf.len() {
            warn!("message length {} does not fit in {} bytes", length, buf.len());
            return Err(OfpError::BadLength);
        }
        let msg = &buf[..length];
        let typ = header.type_code();

        let (framing, reply, flags) = if typ == OFPT_VENDOR {
            if msg.len() < 16 {
                return Err(OfpError::BadLength);
            }
            let vendor = BigEndian::read_u32(&msg[8..12]);
            let subtype = BigEndian::read_u32(&msg[12..16]);
            (Framing::Vendor(vendor, subtype), false, 0)
        } else if typ == OfpRaw::stats_code(version, false) ||
                  typ == OfpRaw::stats_code(version, true) {
            let reply = typ == OfpRaw::stats_code(version, true);
            if msg.len() < 12 {
                return Err(OfpError::BadLength);
            }
            let stats_type = BigEndian::read_u16(&msg[8..10]);
            let flags = BigEndian::read_u16(&msg[10..12]);
            if stats_type == OFPST_VENDOR {
                if msg.len() < 24 {
                    return Err(OfpError::BadLength);
                }
                let (vendor, subtype) = if version == Version::Ofp10 {
                    (BigEndian::read_u32(&msg[12..16]), BigEndian::read_u32(&msg[16..20]))
                } else {
                    (BigEndian::read_u32(&msg[16..20]), BigEndian::read_u32(&msg[20..24]))
                };
                (Framing::VendorStats(vendor, subtype), reply, flags)
            } else {
                (Framing::Stats(stats_type), reply, flags)
            }
        } else {
            (Framing::Ofpt(typ), false, 0)
        };

        let raw = match OfpRaw::find(version, framing, reply) {
            Some(raw) => raw,
            None => return Err(Self::unknown(framing)),
        };
        if msg.len() < raw.header_len() {
            return Err(OfpError::BadLength);
        }
        Ok(RawMessage {
            raw: raw,
            version: version,
            xid: header.xid(),
            flags: flags,
            body: &msg[raw.header_len()..],
        })
    }

    fn unknown(framing: Framing) -> OfpError {
        let vendor_known = |vendor| vendor == NX_VENDOR_ID || vendor == ONF_VENDOR_ID;
        match framing {
            Framing::Ofpt(_) => OfpError::BadType,
            Framing::Stats(_) => OfpError::BadMultipart,
            Framing::Vendor(vendor, _) |
            Framing::VendorStats(vendor, _) => {
                if vendor_known(vendor) {
                    OfpError::BadSubtype
                } else {
                    OfpError::BadVendor
                }
            }
        }
    }
}

/// Set the "more replies follow" flag on the multipart message in `msg`.
pub fn set_reply_more(msg: &mut [u8]) {
    let flags = BigEndian::read_u16(&msg[10..12]);
    BigEndian::write_u16(&mut msg[10..12], flags | OFPSF_REPLY_MORE);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(raw: OfpRaw, version: Version, body: &[u8]) -> Vec<u8> {
        let mut bytes = vec![];
        raw.put(version, 42, &mut bytes);
        bytes.extend_from_slice(body);
        OfpHeader::update_length(&mut bytes);
        bytes
    }

    #[test]
    fn every_raw_classifies_in_every_version_it_supports() {
        let versions = [Version::Ofp10, Version::Ofp11, Version::Ofp12, Version::Ofp13,
                        Version::Ofp14, Version::Ofp15];
        for raw in ALL_RAWS.iter() {
            for version in versions.iter() {
                if !raw.supports(*version) {
                    continue;
                }
                let bytes = framed(*raw, *version, &[0; 8]);
                let msg = RawMessage::decode(&bytes).unwrap();
                assert_eq!(msg.raw, *raw, "{} in {}", raw.name(), version);
                assert_eq!(msg.version, *version);
                assert_eq!(msg.xid, 42);
                assert_eq!(msg.body, &[0u8; 8][..]);
            }
        }
    }

    #[test]
    fn nicira_stats_layout_differs_between_10_and_11() {
        let v10 = framed(OfpRaw::NxstFlowMonitorRequest, Version::Ofp10, &[]);
        let v11 = framed(OfpRaw::NxstFlowMonitorRequest, Version::Ofp11, &[]);
        assert_eq!(&v10[12..16], &[0x00, 0x00, 0x23, 0x20]);
        assert_eq!(&v11[16..20], &[0x00, 0x00, 0x23, 0x20]);
        assert_eq!(v10[1], OFPT10_STATS_REQUEST);
        assert_eq!(v11[1], OFPT11_STATS_REQUEST);
    }

    #[test]
    fn unknown_messages() {
        let mut bytes = framed(OfpRaw::NxtFlowMonitorCancel, Version::Ofp10, &[0; 4]);
        bytes[15] = 99;
        assert_eq!(RawMessage::decode(&bytes), Err(OfpError::BadSubtype));
        bytes[11] = 0x21;
        assert_eq!(RawMessage::decode(&bytes), Err(OfpError::BadVendor));

        let bytes = framed(OfpRaw::Ofpt14RequestForward, Version::Ofp14, &[]);
        let mut old = bytes.clone();
        old[0] = Version::Ofp12.wire();
        assert_eq!(RawMessage::decode(&old), Err(OfpError::BadType));
        let mut bad = bytes;
        bad[0] = 0x09;
        assert_eq!(RawMessage::decode(&bad), Err(OfpError::VersionMismatch));
    }

    #[test]
    fn length_must_fit_buffer() {
        let mut bytes = framed(OfpRaw::Ofpt14RequestForward, Version::Ofp14, &[0; 8]);
        bytes.truncate(12);
        assert_eq!(RawMessage::decode(&bytes), Err(OfpError::BadLength));
    }

    #[test]
    fn reply_more_flag() {
        let mut bytes = framed(OfpRaw::Ofpst14FlowMonitorReply, Version::Ofp14, &[]);
        set_reply_more(&mut bytes);
        let msg = RawMessage::decode(&bytes).unwrap();
        assert_eq!(msg.flags, OFPSF_REPLY_MORE);
    }
}
