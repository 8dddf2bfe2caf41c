//! Flow removed notifications.
//!
//! Four wire layouts carry the same notification: the OpenFlow 1.0 message with its fixed
//! match, the OpenFlow 1.1-1.4 message with a standard (1.1) or OXM (1.2 on) match, the OpenFlow 1.5 message whose
//! duration and counters live in an OXS stats block, and the Nicira extension message with
//! an NXM match. All of them decode into one `FlowRemoved`.

use std::fmt;
use std::fmt::Write;
use std::mem::size_of;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::warn;

use crate::bits::try_pull;
use crate::ofp_errors::{OfpError, Result};
use crate::ofp_header::OfpHeader;
use crate::ofp_match::Pattern;
use crate::ofp_message::{OfpRaw, RawMessage};
use crate::ofp_port::PortMap;
use crate::ofp_print::{format_duration, format_table, TableMap};
use crate::ofp_protocol::{Protocol, Version};
use crate::ofp_stats::OxsStats;

/// Why a flow was removed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowRemovedReason {
    IdleTimeout,
    HardTimeout,
    Delete,
    GroupDelete,
    Eviction,
    MeterDelete,
    Unknown(u8),
}

impl FlowRemovedReason {
    pub fn from_wire(code: u8) -> FlowRemovedReason {
        match code {
            0 => FlowRemovedReason::IdleTimeout,
            1 => FlowRemovedReason::HardTimeout,
            2 => FlowRemovedReason::Delete,
            3 => FlowRemovedReason::GroupDelete,
            4 => FlowRemovedReason::Eviction,
            5 => FlowRemovedReason::MeterDelete,
            n => FlowRemovedReason::Unknown(n),
        }
    }

    pub fn wire(self) -> u8 {
        match self {
            FlowRemovedReason::IdleTimeout => 0,
            FlowRemovedReason::HardTimeout => 1,
            FlowRemovedReason::Delete => 2,
            FlowRemovedReason::GroupDelete => 3,
            FlowRemovedReason::Eviction => 4,
            FlowRemovedReason::MeterDelete => 5,
            FlowRemovedReason::Unknown(n) => n,
        }
    }

    /// The reason to send in `version`, which may predate meter-triggered removal.
    fn for_version(self, version: Version) -> FlowRemovedReason {
        match self {
            FlowRemovedReason::MeterDelete if version < Version::Ofp14 => {
                FlowRemovedReason::Delete
            }
            reason => reason,
        }
    }
}

impl fmt::Display for FlowRemovedReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FlowRemovedReason::IdleTimeout => f.write_str("idle"),
            FlowRemovedReason::HardTimeout => f.write_str("hard"),
            FlowRemovedReason::Delete => f.write_str("delete"),
            FlowRemovedReason::GroupDelete => f.write_str("group_delete"),
            FlowRemovedReason::Eviction => f.write_str("eviction"),
            FlowRemovedReason::MeterDelete => f.write_str("meter_delete"),
            FlowRemovedReason::Unknown(n) => write!(f, "{}", n),
        }
    }
}

/// A flow was removed from a flow table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowRemoved {
    pub pattern: Pattern,
    pub cookie: u64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    /// 255 if not known.
    pub table_id: u8,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    /// `u64::MAX` if not known.
    pub packet_count: u64,
    /// `u64::MAX` if not known.
    pub byte_count: u64,
}

#[repr(packed)]
#[allow(dead_code)]
struct OfpFlowRemoved10(u64, u16, u8, u8, u32, u32, u16, u16, u64, u64);

#[repr(packed)]
#[allow(dead_code)]
struct OfpFlowRemoved11(u64, u16, u8, u8, u32, u32, u16, u16, u64, u64);

#[repr(packed)]
#[allow(dead_code)]
struct OfpFlowRemoved15(u64, u16, u8, u8, u16, u16);

#[repr(packed)]
#[allow(dead_code)]
struct NxFlowRemoved(u64, u16, u8, u8, u32, u32, u16, u16, u64, u64);

/// Wire layouts of a flow removed message.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum FlowRemovedFormat {
    Ofp10,
    Ofp11,
    Ofp15,
    Nx,
}

impl FlowRemovedFormat {
    fn of_raw(raw: OfpRaw) -> Option<FlowRemovedFormat> {
        match raw {
            OfpRaw::Ofpt10FlowRemoved => Some(FlowRemovedFormat::Ofp10),
            OfpRaw::Ofpt11FlowRemoved => Some(FlowRemovedFormat::Ofp11),
            OfpRaw::Ofpt15FlowRemoved => Some(FlowRemovedFormat::Ofp15),
            OfpRaw::NxtFlowRemoved => Some(FlowRemovedFormat::Nx),
            _ => None,
        }
    }

    fn of_protocol(protocol: Protocol) -> FlowRemovedFormat {
        match protocol {
            Protocol::Of10Std | Protocol::Of10StdTid => FlowRemovedFormat::Ofp10,
            Protocol::Of10Nxm | Protocol::Of10NxmTid => FlowRemovedFormat::Nx,
            Protocol::Of11Std | Protocol::Of12Oxm | Protocol::Of13Oxm | Protocol::Of14Oxm => {
                FlowRemovedFormat::Ofp11
            }
            Protocol::Of15Oxm => FlowRemovedFormat::Ofp15,
        }
    }

    fn raw(self) -> OfpRaw {
        match self {
            FlowRemovedFormat::Ofp10 => OfpRaw::Ofpt10FlowRemoved,
            FlowRemovedFormat::Ofp11 => OfpRaw::Ofpt11FlowRemoved,
            FlowRemovedFormat::Ofp15 => OfpRaw::Ofpt15FlowRemoved,
            FlowRemovedFormat::Nx => OfpRaw::NxtFlowRemoved,
        }
    }
}

fn pull_fixed<'a>(body: &mut &'a [u8], len: usize) -> Result<&'a [u8]> {
    try_pull(body, len).ok_or(OfpError::BadLength)
}

/// Decode the flow removed message `msg`, in any of its wire layouts.
pub fn decode_flow_removed(msg: &[u8]) -> Result<FlowRemoved> {
    let raw = RawMessage::decode(msg)?;
    let format = FlowRemovedFormat::of_raw(raw.raw).ok_or(OfpError::BadType)?;
    let mut body = raw.body;

    match format {
        FlowRemovedFormat::Ofp15 => {
            let mut fixed = pull_fixed(&mut body, size_of::<OfpFlowRemoved15>())?;
            let (pattern, _) = Pattern::pull_oxm(&mut body)?;
            let stats = OxsStats::pull(&mut body)?;
            Ok(FlowRemoved {
                cookie: fixed.read_u64::<BigEndian>()?,
                priority: fixed.read_u16::<BigEndian>()?,
                reason: FlowRemovedReason::from_wire(fixed.read_u8()?),
                table_id: fixed.read_u8()?,
                idle_timeout: fixed.read_u16::<BigEndian>()?,
                hard_timeout: fixed.read_u16::<BigEndian>()?,
                duration_sec: stats.duration_sec,
                duration_nsec: stats.duration_nsec,
                packet_count: stats.packet_count,
                byte_count: stats.byte_count,
                pattern: pattern,
            })
        }
        FlowRemovedFormat::Ofp11 => {
            let mut fixed = pull_fixed(&mut body, size_of::<OfpFlowRemoved11>())?;
            let (pattern, _) = Pattern::pull_ofp11(&mut body)?;
            Ok(FlowRemoved {
                cookie: fixed.read_u64::<BigEndian>()?,
                priority: fixed.read_u16::<BigEndian>()?,
                reason: FlowRemovedReason::from_wire(fixed.read_u8()?),
                table_id: fixed.read_u8()?,
                duration_sec: fixed.read_u32::<BigEndian>()?,
                duration_nsec: fixed.read_u32::<BigEndian>()?,
                idle_timeout: fixed.read_u16::<BigEndian>()?,
                hard_timeout: fixed.read_u16::<BigEndian>()?,
                packet_count: fixed.read_u64::<BigEndian>()?,
                byte_count: fixed.read_u64::<BigEndian>()?,
                pattern: pattern,
            })
        }
        FlowRemovedFormat::Ofp10 => {
            let pattern = Pattern::pull_ofp10(&mut body)?;
            let mut fixed = pull_fixed(&mut body, size_of::<OfpFlowRemoved10>())?;
            let cookie = fixed.read_u64::<BigEndian>()?;
            let priority = fixed.read_u16::<BigEndian>()?;
            let reason = FlowRemovedReason::from_wire(fixed.read_u8()?);
            let _pad = fixed.read_u8()?;
            let duration_sec = fixed.read_u32::<BigEndian>()?;
            let duration_nsec = fixed.read_u32::<BigEndian>()?;
            let idle_timeout = fixed.read_u16::<BigEndian>()?;
            let _pad2 = fixed.read_u16::<BigEndian>()?;
            Ok(FlowRemoved {
                pattern: pattern,
                cookie: cookie,
                priority: priority,
                reason: reason,
                table_id: 255,
                duration_sec: duration_sec,
                duration_nsec: duration_nsec,
                idle_timeout: idle_timeout,
                hard_timeout: 0,
                packet_count: fixed.read_u64::<BigEndian>()?,
                byte_count: fixed.read_u64::<BigEndian>()?,
            })
        }
        FlowRemovedFormat::Nx => {
            let mut fixed = pull_fixed(&mut body, size_of::<NxFlowRemoved>())?;
            let cookie = fixed.read_u64::<BigEndian>()?;
            let priority = fixed.read_u16::<BigEndian>()?;
            let reason = FlowRemovedReason::from_wire(fixed.read_u8()?);
            let table_id = match fixed.read_u8()? {
                0 => 255,
                n => n - 1,
            };
            let duration_sec = fixed.read_u32::<BigEndian>()?;
            let duration_nsec = fixed.read_u32::<BigEndian>()?;
            let idle_timeout = fixed.read_u16::<BigEndian>()?;
            let match_len = fixed.read_u16::<BigEndian>()? as usize;
            let pattern = Pattern::pull_nxm(&mut body, match_len)?;
            if !body.is_empty() {
                warn!("NXT_FLOW_REMOVED has {} leftover bytes at end", body.len());
                return Err(OfpError::BadLength);
            }
            Ok(FlowRemoved {
                pattern: pattern,
                cookie: cookie,
                priority: priority,
                reason: reason,
                table_id: table_id,
                duration_sec: duration_sec,
                duration_nsec: duration_nsec,
                idle_timeout: idle_timeout,
                hard_timeout: 0,
                packet_count: fixed.read_u64::<BigEndian>()?,
                byte_count: fixed.read_u64::<BigEndian>()?,
            })
        }
    }
}

fn unknown_to_zero(count: u64) -> u64 {
    if count == u64::MAX { 0 } else { count }
}

/// Encode `fr` as a flow removed message for `protocol`, with xid 0.
pub fn encode_flow_removed(fr: &FlowRemoved, protocol: Protocol) -> Vec<u8> {
    let version = protocol.version();
    let reason = fr.reason.for_version(version).wire();
    let format = FlowRemovedFormat::of_protocol(protocol);
    let mut bytes = vec![];
    format.raw().put(version, 0, &mut bytes);

    match format {
        FlowRemovedFormat::Ofp11 => {
            bytes.write_u64::<BigEndian>(fr.cookie).unwrap();
            bytes.write_u16::<BigEndian>(fr.priority).unwrap();
            bytes.push(reason);
            bytes.push(fr.table_id);
            bytes.write_u32::<BigEndian>(fr.duration_sec).unwrap();
            bytes.write_u32::<BigEndian>(fr.duration_nsec).unwrap();
            bytes.write_u16::<BigEndian>(fr.idle_timeout).unwrap();
            bytes.write_u16::<BigEndian>(fr.hard_timeout).unwrap();
            bytes.write_u64::<BigEndian>(fr.packet_count).unwrap();
            bytes.write_u64::<BigEndian>(fr.byte_count).unwrap();
            if version == Version::Ofp11 {
                fr.pattern.put_ofp11_standard(&mut bytes);
            } else {
                fr.pattern.put_oxm(&mut bytes);
            }
        }
        FlowRemovedFormat::Ofp15 => {
            bytes.write_u64::<BigEndian>(fr.cookie).unwrap();
            bytes.write_u16::<BigEndian>(fr.priority).unwrap();
            bytes.push(reason);
            bytes.push(fr.table_id);
            bytes.write_u16::<BigEndian>(fr.idle_timeout).unwrap();
            bytes.write_u16::<BigEndian>(fr.hard_timeout).unwrap();
            fr.pattern.put_oxm(&mut bytes);
            let stats = OxsStats {
                duration_sec: fr.duration_sec,
                duration_nsec: fr.duration_nsec,
                packet_count: fr.packet_count,
                byte_count: fr.byte_count,
                ..OxsStats::default()
            };
            stats.put(&mut bytes);
        }
        FlowRemovedFormat::Ofp10 => {
            fr.pattern.put_ofp10(&mut bytes);
            bytes.write_u64::<BigEndian>(fr.cookie).unwrap();
            bytes.write_u16::<BigEndian>(fr.priority).unwrap();
            bytes.push(reason);
            bytes.push(0);
            bytes.write_u32::<BigEndian>(fr.duration_sec).unwrap();
            bytes.write_u32::<BigEndian>(fr.duration_nsec).unwrap();
            bytes.write_u16::<BigEndian>(fr.idle_timeout).unwrap();
            bytes.write_u16::<BigEndian>(0).unwrap();
            bytes.write_u64::<BigEndian>(unknown_to_zero(fr.packet_count)).unwrap();
            bytes.write_u64::<BigEndian>(unknown_to_zero(fr.byte_count)).unwrap();
        }
        FlowRemovedFormat::Nx => {
            let mut nxm = vec![];
            let match_len = fr.pattern.put_nxm(&mut nxm);
            bytes.write_u64::<BigEndian>(fr.cookie).unwrap();
            bytes.write_u16::<BigEndian>(fr.priority).unwrap();
            bytes.push(reason);
            bytes.push(fr.table_id.wrapping_add(1));
            bytes.write_u32::<BigEndian>(fr.duration_sec).unwrap();
            bytes.write_u32::<BigEndian>(fr.duration_nsec).unwrap();
            bytes.write_u16::<BigEndian>(fr.idle_timeout).unwrap();
            bytes.write_u16::<BigEndian>(match_len as u16).unwrap();
            bytes.write_u64::<BigEndian>(fr.packet_count).unwrap();
            bytes.write_u64::<BigEndian>(fr.byte_count).unwrap();
            bytes.extend_from_slice(&nxm);
        }
    }
    OfpHeader::update_length(&mut bytes);
    bytes
}

/// Append a one-line description of `fr` to `s`.
pub fn format_flow_removed(s: &mut String,
                           fr: &FlowRemoved,
                           port_map: &PortMap,
                           table_map: &TableMap) {
    s.push(' ');
    fr.pattern.format(s, fr.priority, port_map);
    let _ = write!(s, " reason={}", fr.reason);
    if fr.table_id != 255 {
        s.push_str(" table_id=");
        format_table(s, fr.table_id, table_map);
    }
    if fr.cookie != 0 {
        let _ = write!(s, " cookie:{:#x}", fr.cookie);
    }
    s.push_str(" duration");
    format_duration(s, fr.duration_sec, fr.duration_nsec);
    let _ = write!(s, " idle{}", fr.idle_timeout);
    // Hard timeouts only exist from OpenFlow 1.2 on.
    if fr.hard_timeout != 0 {
        let _ = write!(s, " hard{}", fr.hard_timeout);
    }
    let _ = write!(s, " pkts{} bytes{}\n", fr.packet_count, fr.byte_count);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ofp_match::{MatchField, Mf, OFP11_MATCH_LEN};

    fn flow_removed() -> FlowRemoved {
        let mut pattern = Pattern::match_all();
        pattern.set_exact(Mf::EthType, 0x0800);
        FlowRemoved {
            pattern: pattern,
            cookie: 0xabcd,
            priority: 100,
            reason: FlowRemovedReason::HardTimeout,
            table_id: 4,
            duration_sec: 10,
            duration_nsec: 500,
            idle_timeout: 30,
            hard_timeout: 60,
            packet_count: 7,
            byte_count: 700,
        }
    }

    #[test]
    fn standard_layouts_round_trip() {
        let fr = flow_removed();
        for protocol in &[Protocol::Of11Std, Protocol::Of13Oxm, Protocol::Of15Oxm] {
            let bytes = encode_flow_removed(&fr, *protocol);
            assert_eq!(decode_flow_removed(&bytes), Ok(fr.clone()), "{:?}", protocol);
        }
    }

    #[test]
    fn openflow11_uses_the_standard_match() {
        let mut fr = flow_removed();
        fr.pattern.set(MatchField::basic(Mf::EthSrc, &[0, 1, 2, 3, 4, 5], None));
        fr.pattern.set_exact(Mf::IpProto, 6);
        fr.pattern.set(MatchField::basic(Mf::Ipv4Dst, &[10, 1, 0, 0], Some(&[255, 255, 0, 0])));
        fr.pattern.set_exact(Mf::TcpDst, 443);
        let bytes = encode_flow_removed(&fr, Protocol::Of11Std);
        assert_eq!(bytes[0], 0x02);
        assert_eq!(&bytes[48..50], &[0, 0]);
        assert_eq!(&bytes[50..52], &[0, 88]);
        assert_eq!(bytes.len(), 48 + OFP11_MATCH_LEN);
        assert_eq!(decode_flow_removed(&bytes), Ok(fr.clone()));

        let oxm = encode_flow_removed(&fr, Protocol::Of12Oxm);
        assert_eq!(&oxm[48..50], &[0, 1]);
        assert_eq!(decode_flow_removed(&oxm).unwrap().pattern, fr.pattern);
    }

    #[test]
    fn openflow11_accepts_either_match_type() {
        // An OpenFlow 1.1 switch may send OXM as well.
        let fr = flow_removed();
        let mut bytes = encode_flow_removed(&fr, Protocol::Of12Oxm);
        bytes[0] = 0x02;
        assert_eq!(decode_flow_removed(&bytes), Ok(fr.clone()));

        let mut bytes = encode_flow_removed(&fr, Protocol::Of11Std);
        bytes[51] = 80;
        assert_eq!(decode_flow_removed(&bytes), Err(OfpError::BadMatchLength));
    }

    #[test]
    fn openflow10_drops_table_and_hard_timeout() {
        let mut fr = flow_removed();
        fr.byte_count = u64::MAX;
        let bytes = encode_flow_removed(&fr, Protocol::Of10Std);
        assert_eq!(bytes.len(), 88);
        let decoded = decode_flow_removed(&bytes).unwrap();
        assert_eq!(decoded.table_id, 255);
        assert_eq!(decoded.hard_timeout, 0);
        assert_eq!(decoded.byte_count, 0);
        assert_eq!(decoded.packet_count, 7);
        assert_eq!(decoded.pattern, fr.pattern);
    }

    #[test]
    fn nicira_table_id_is_biased() {
        let mut fr = flow_removed();
        fr.hard_timeout = 0;
        for &(table_id, wire) in &[(255u8, 0u8), (0, 1), (4, 5)] {
            fr.table_id = table_id;
            let bytes = encode_flow_removed(&fr, Protocol::Of10Nxm);
            assert_eq!(bytes[27], wire);
            assert_eq!(decode_flow_removed(&bytes), Ok(fr.clone()));
        }
    }

    #[test]
    fn nicira_rejects_leftover_bytes() {
        let mut bytes = encode_flow_removed(&flow_removed(), Protocol::Of10Nxm);
        bytes.extend_from_slice(&[0; 8]);
        OfpHeader::update_length(&mut bytes);
        assert_eq!(decode_flow_removed(&bytes), Err(OfpError::BadLength));
    }

    #[test]
    fn openflow15_unknown_counters_survive() {
        let mut fr = flow_removed();
        fr.packet_count = u64::MAX;
        fr.byte_count = u64::MAX;
        let bytes = encode_flow_removed(&fr, Protocol::Of15Oxm);
        assert_eq!(decode_flow_removed(&bytes), Ok(fr));
    }

    #[test]
    fn meter_delete_downgrade() {
        let mut fr = flow_removed();
        fr.reason = FlowRemovedReason::MeterDelete;
        let old = encode_flow_removed(&fr, Protocol::Of12Oxm);
        assert_eq!(old[18], FlowRemovedReason::Delete.wire());
        let new = encode_flow_removed(&fr, Protocol::Of14Oxm);
        assert_eq!(new[18], FlowRemovedReason::MeterDelete.wire());
    }

    #[test]
    fn format() {
        let mut fr = flow_removed();
        fr.table_id = 255;
        fr.cookie = 0;
        fr.hard_timeout = 0;
        fr.reason = FlowRemovedReason::IdleTimeout;
        fr.duration_sec = 1;
        fr.duration_nsec = 500_000_000;
        let mut s = String::new();
        format_flow_removed(&mut s, &fr, &PortMap::new(), &TableMap::new());
        assert_eq!(s, " priority=100,dl_type=0x0800 reason=idle duration1.5s idle30 pkts7 bytes700\n");

        fr.table_id = 1;
        fr.cookie = 0x1f;
        fr.hard_timeout = 9;
        fr.reason = FlowRemovedReason::Unknown(9);
        let mut s = String::new();
        format_flow_removed(&mut s, &fr, &PortMap::new(), &TableMap::new());
        assert!(s.contains(" reason=9 table_id=1 cookie:0x1f duration1.5s idle30 hard9 "));
    }
}
