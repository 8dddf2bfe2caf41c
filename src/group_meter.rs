//! Group and meter modification messages, as carried inside a request forward.
//!
//! Buckets, group properties and meter bands are validated for framing and kept in their
//! wire form.

use std::fmt::Write;

use bitflags::bitflags;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::warn;

use crate::bits::try_pull;
use crate::ofp_actions::format_actions;
use crate::ofp_errors::{OfpError, Result};
use crate::ofp_header::OfpHeader;
use crate::ofp_message::{OfpMessage, OfpRaw, RawMessage};
use crate::ofp_port::{format_port, port_from_ofp11, PortMap};
use crate::ofp_protocol::Version;

/// Wildcard group id.
pub const OFPG_ANY: u32 = 0xffff_ffff;
const OFPG_ALL: u32 = 0xffff_fffc;

const OFPG15_BUCKET_FIRST: u32 = 0xffff_fffd;
const OFPG15_BUCKET_LAST: u32 = 0xffff_fffe;
const OFPG15_BUCKET_ALL: u32 = 0xffff_ffff;

const OFP11_BUCKET_LEN: usize = 16;
const OFP15_BUCKET_LEN: usize = 8;
const METER_BAND_LEN: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GroupModCommand {
    Add,
    Modify,
    Delete,
    /// OpenFlow 1.5 only.
    InsertBucket,
    /// OpenFlow 1.5 only.
    RemoveBucket,
}

impl GroupModCommand {
    fn from_wire(code: u16, version: Version) -> Option<GroupModCommand> {
        match code {
            0 => Some(GroupModCommand::Add),
            1 => Some(GroupModCommand::Modify),
            2 => Some(GroupModCommand::Delete),
            3 if version >= Version::Ofp15 => Some(GroupModCommand::InsertBucket),
            5 if version >= Version::Ofp15 => Some(GroupModCommand::RemoveBucket),
            _ => None,
        }
    }

    fn wire(self) -> u16 {
        match self {
            GroupModCommand::Add => 0,
            GroupModCommand::Modify => 1,
            GroupModCommand::Delete => 2,
            GroupModCommand::InsertBucket => 3,
            GroupModCommand::RemoveBucket => 5,
        }
    }

    fn name(self) -> &'static str {
        match self {
            GroupModCommand::Add => "ADD",
            GroupModCommand::Modify => "MOD",
            GroupModCommand::Delete => "DEL",
            GroupModCommand::InsertBucket => "INSERT_BUCKET",
            GroupModCommand::RemoveBucket => "REMOVE_BUCKET",
        }
    }

    fn is_bucket_command(self) -> bool {
        self == GroupModCommand::InsertBucket || self == GroupModCommand::RemoveBucket
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GroupType {
    All = 0,
    Select = 1,
    Indirect = 2,
    FastFailover = 3,
}

impl GroupType {
    fn from_wire(code: u8) -> Option<GroupType> {
        match code {
            0 => Some(GroupType::All),
            1 => Some(GroupType::Select),
            2 => Some(GroupType::Indirect),
            3 => Some(GroupType::FastFailover),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            GroupType::All => "all",
            GroupType::Select => "select",
            GroupType::Indirect => "indirect",
            GroupType::FastFailover => "ff",
        }
    }
}

/// Add, change or remove a group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupMod {
    pub command: GroupModCommand,
    pub group_type: GroupType,
    pub group_id: u32,
    /// Bucket an insert or remove applies to. OpenFlow 1.5 only.
    pub command_bucket_id: u32,
    /// Buckets in the wire form of the version they were read under.
    pub buckets: Vec<u8>,
    /// Group properties. OpenFlow 1.5 only.
    pub properties: Vec<u8>,
}

/// Check that `region` is a sequence of records, each at least `min_len` bytes and a
/// multiple of 8, whose 16-bit length sits at `len_ofs` in each record.
fn check_records(mut region: &[u8],
                 len_ofs: usize,
                 min_len: usize,
                 err: OfpError)
                 -> Result<usize> {
    let mut n = 0;
    while !region.is_empty() {
        if region.len() < len_ofs + 2 {
            return Err(err);
        }
        let len = (&region[len_ofs..len_ofs + 2]).read_u16::<BigEndian>()? as usize;
        if len < min_len || len % 8 != 0 {
            return Err(err);
        }
        try_pull(&mut region, len).ok_or(err)?;
        n += 1;
    }
    Ok(n)
}

impl GroupMod {
    /// Encode `self` for `version`.
    ///
    /// Before OpenFlow 1.5 there are no bucket commands: an insert or remove is sent as a
    /// modify of a group that existed, or an add of one that did not, carrying `new_buckets`
    /// (the group's resulting buckets) in place of `self.buckets`.
    ///
    /// # Panics
    ///
    /// If `version` has no group modification, or if a bucket command must be translated and
    /// `group_existed` is unknown.
    pub fn encode(&self,
                  version: Version,
                  xid: u32,
                  new_buckets: Option<&[u8]>,
                  group_existed: Option<bool>)
                  -> Vec<u8> {
        let mut bytes = vec![];
        OfpRaw::Ofpt11GroupMod.put(version, xid, &mut bytes);
        if version < Version::Ofp15 {
            let (command, buckets) = if self.command.is_bucket_command() {
                let existed = match group_existed {
                    Some(existed) => existed,
                    None => panic!("{} before OpenFlow 1.5 needs to know if the group existed",
                                   self.command.name()),
                };
                let command = if existed {
                    GroupModCommand::Modify
                } else {
                    GroupModCommand::Add
                };
                (command, new_buckets.unwrap_or(&self.buckets))
            } else {
                (self.command, &self.buckets[..])
            };
            bytes.write_u16::<BigEndian>(command.wire()).unwrap();
            bytes.push(self.group_type as u8);
            bytes.push(0);
            bytes.write_u32::<BigEndian>(self.group_id).unwrap();
            bytes.extend_from_slice(buckets);
        } else {
            bytes.write_u16::<BigEndian>(self.command.wire()).unwrap();
            bytes.push(self.group_type as u8);
            bytes.push(0);
            bytes.write_u32::<BigEndian>(self.group_id).unwrap();
            bytes.write_u16::<BigEndian>(self.buckets.len() as u16).unwrap();
            bytes.write_u16::<BigEndian>(0).unwrap();
            bytes.write_u32::<BigEndian>(self.command_bucket_id).unwrap();
            bytes.extend_from_slice(&self.buckets);
            bytes.extend_from_slice(&self.properties);
        }
        OfpHeader::update_length(&mut bytes);
        bytes
    }

    /// Append a human-readable description of `self`, read under `version`.
    pub fn format(&self, s: &mut String, version: Version, port_map: &PortMap) {
        let _ = write!(s, "\n {} ", self.command.name());
        if version >= Version::Ofp15 && self.command.is_bucket_command() {
            s.push_str("command_bucket_id:");
            match self.command_bucket_id {
                OFPG15_BUCKET_FIRST => s.push_str("first"),
                OFPG15_BUCKET_LAST => s.push_str("last"),
                OFPG15_BUCKET_ALL => s.push_str("all"),
                id => {
                    let _ = write!(s, "{}", id);
                }
            }
            s.push(',');
        }
        match self.group_id {
            OFPG_ALL => s.push_str("group_id=all"),
            OFPG_ANY => s.push_str("group_id=any"),
            id => {
                let _ = write!(s, "group_id={}", id);
            }
        }
        if !self.command.is_bucket_command() {
            let _ = write!(s, ",type={}", self.group_type.name());
        }

        let mut buckets = &self.buckets[..];
        while buckets.len() >= 2 {
            let len = (&buckets[0..2]).read_u16::<BigEndian>().unwrap_or(0) as usize;
            let bucket = match try_pull(&mut buckets, len) {
                Some(bucket) if len >= OFP15_BUCKET_LEN => bucket,
                _ => break,
            };
            s.push_str(",bucket=");
            self.format_bucket(s, bucket, version, port_map);
        }
    }

    fn format_bucket(&self, s: &mut String, bucket: &[u8], version: Version, port_map: &PortMap) {
        let mut b = &bucket[2..];
        let actions = if version >= Version::Ofp15 {
            let action_len = b.read_u16::<BigEndian>().unwrap_or(0) as usize;
            let bucket_id = b.read_u32::<BigEndian>().unwrap_or(0);
            let _ = write!(s, "bucket_id:{},", bucket_id);
            &b[..action_len.min(b.len())]
        } else {
            if bucket.len() < OFP11_BUCKET_LEN {
                return;
            }
            let weight = b.read_u16::<BigEndian>().unwrap_or(0);
            let watch_port = b.read_u32::<BigEndian>().unwrap_or(0);
            let watch_group = b.read_u32::<BigEndian>().unwrap_or(0);
            if self.group_type == GroupType::Select {
                let _ = write!(s, "weight:{},", weight);
            }
            if watch_port != OFPG_ANY {
                if let Ok(port) = port_from_ofp11(watch_port) {
                    s.push_str("watch_port:");
                    format_port(s, port, port_map);
                    s.push(',');
                }
            }
            if watch_group != OFPG_ANY {
                let _ = write!(s, "watch_group:{},", watch_group);
            }
            &bucket[OFP11_BUCKET_LEN..]
        };
        s.push_str("actions=");
        if actions.is_empty() {
            s.push_str("drop");
        } else {
            format_actions(s, actions, version, port_map);
        }
    }
}

impl OfpMessage for GroupMod {
    fn marshal(gm: &GroupMod, version: Version, xid: u32) -> Vec<u8> {
        gm.encode(version, xid, None, None)
    }

    fn parse(buf: &[u8]) -> Result<GroupMod> {
        let msg = RawMessage::decode(buf)?;
        if msg.raw != OfpRaw::Ofpt11GroupMod {
            return Err(OfpError::BadType);
        }
        let mut body = msg.body;
        let fixed_len = if msg.version >= Version::Ofp15 { 16 } else { 8 };
        let mut fixed = try_pull(&mut body, fixed_len).ok_or(OfpError::BadLength)?;
        let code = fixed.read_u16::<BigEndian>()?;
        let command = GroupModCommand::from_wire(code, msg.version).ok_or_else(|| {
            warn!("group_mod has unknown command {}", code);
            OfpError::BadGroupCommand
        })?;
        let group_type = GroupType::from_wire(fixed.read_u8()?).ok_or(OfpError::BadGroupType)?;
        let _pad = fixed.read_u8()?;
        let group_id = fixed.read_u32::<BigEndian>()?;

        if msg.version < Version::Ofp15 {
            check_records(body, 0, OFP11_BUCKET_LEN, OfpError::BadBucket)?;
            return Ok(GroupMod {
                command: command,
                group_type: group_type,
                group_id: group_id,
                command_bucket_id: OFPG15_BUCKET_ALL,
                buckets: body.to_vec(),
                properties: vec![],
            });
        }

        let bucket_array_len = fixed.read_u16::<BigEndian>()? as usize;
        let _pad2 = fixed.read_u16::<BigEndian>()?;
        let command_bucket_id = fixed.read_u32::<BigEndian>()?;
        let buckets = try_pull(&mut body, bucket_array_len).ok_or(OfpError::BadBucket)?;
        check_records(buckets, 0, OFP15_BUCKET_LEN, OfpError::BadBucket)?;
        Ok(GroupMod {
            command: command,
            group_type: group_type,
            group_id: group_id,
            command_bucket_id: command_bucket_id,
            buckets: buckets.to_vec(),
            properties: body.to_vec(),
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MeterModCommand {
    Add,
    Modify,
    Delete,
}

impl MeterModCommand {
    fn from_wire(code: u16) -> Option<MeterModCommand> {
        match code {
            0 => Some(MeterModCommand::Add),
            1 => Some(MeterModCommand::Modify),
            2 => Some(MeterModCommand::Delete),
            _ => None,
        }
    }

    fn wire(self) -> u16 {
        match self {
            MeterModCommand::Add => 0,
            MeterModCommand::Modify => 1,
            MeterModCommand::Delete => 2,
        }
    }
}

bitflags! {
    pub struct MeterFlags: u16 {
        const KBPS = 1 << 0;
        const PKTPS = 1 << 1;
        const BURST = 1 << 2;
        const STATS = 1 << 3;
    }
}

const OFPMBT_DROP: u16 = 1;
const OFPMBT_DSCP_REMARK: u16 = 2;

/// Add, change or remove a meter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeterMod {
    pub command: MeterModCommand,
    pub flags: MeterFlags,
    pub meter_id: u32,
    /// Meter bands in wire form.
    pub bands: Vec<u8>,
}

impl MeterMod {
    /// Append a human-readable description of `self`.
    pub fn format(&self, s: &mut String) {
        s.push_str(match self.command {
            MeterModCommand::Add => " ADD ",
            MeterModCommand::Modify => " MOD ",
            MeterModCommand::Delete => " DEL ",
        });
        match self.meter_id {
            0xffff_fffd => s.push_str("meter=slowpath "),
            0xffff_fffe => s.push_str("meter=controller "),
            0xffff_ffff => s.push_str("meter=all "),
            id => {
                let _ = write!(s, "meter={} ", id);
            }
        }
        for &(flag, name) in &[(MeterFlags::KBPS, "kbps"),
                               (MeterFlags::PKTPS, "pktps"),
                               (MeterFlags::BURST, "burst"),
                               (MeterFlags::STATS, "stats")] {
            if self.flags.contains(flag) {
                let _ = write!(s, "{} ", name);
            }
        }
        s.push_str("bands=");
        for band in self.bands.chunks(METER_BAND_LEN) {
            if band.len() < METER_BAND_LEN {
                break;
            }
            let mut b = band;
            let typ = b.read_u16::<BigEndian>().unwrap_or(0);
            let _len = b.read_u16::<BigEndian>().unwrap_or(0);
            let rate = b.read_u32::<BigEndian>().unwrap_or(0);
            let burst_size = b.read_u32::<BigEndian>().unwrap_or(0);
            s.push_str(match typ {
                OFPMBT_DROP => "\ntype=drop",
                OFPMBT_DSCP_REMARK => "\ntype=dscp_remark",
                _ => "\ntype=unknown",
            });
            let _ = write!(s, " rate={}", rate);
            if self.flags.contains(MeterFlags::BURST) {
                let _ = write!(s, " burst_size={}", burst_size);
            }
            if typ == OFPMBT_DSCP_REMARK {
                let _ = write!(s, " prec_level={}", b.read_u8().unwrap_or(0));
            }
        }
    }

    /// Append a drop band.
    pub fn push_drop_band(&mut self, rate: u32, burst_size: u32) {
        self.bands.write_u16::<BigEndian>(OFPMBT_DROP).unwrap();
        self.bands.write_u16::<BigEndian>(METER_BAND_LEN as u16).unwrap();
        self.bands.write_u32::<BigEndian>(rate).unwrap();
        self.bands.write_u32::<BigEndian>(burst_size).unwrap();
        self.bands.extend_from_slice(&[0; 4]);
    }
}

impl OfpMessage for MeterMod {
    /// # Panics
    ///
    /// Before OpenFlow 1.3, which has no meters.
    fn marshal(mm: &MeterMod, version: Version, xid: u32) -> Vec<u8> {
        let mut bytes = vec![];
        OfpRaw::Ofpt13MeterMod.put(version, xid, &mut bytes);
        bytes.write_u16::<BigEndian>(mm.command.wire()).unwrap();
        bytes.write_u16::<BigEndian>(mm.flags.bits()).unwrap();
        bytes.write_u32::<BigEndian>(mm.meter_id).unwrap();
        bytes.extend_from_slice(&mm.bands);
        OfpHeader::update_length(&mut bytes);
        bytes
    }

    fn parse(buf: &[u8]) -> Result<MeterMod> {
        let msg = RawMessage::decode(buf)?;
        if msg.raw != OfpRaw::Ofpt13MeterMod {
            return Err(OfpError::BadType);
        }
        let mut body = msg.body;
        let mut fixed = try_pull(&mut body, 8).ok_or(OfpError::BadLength)?;
        let code = fixed.read_u16::<BigEndian>()?;
        let command = MeterModCommand::from_wire(code).ok_or(OfpError::BadMeterCommand)?;
        let flags = MeterFlags::from_bits_truncate(fixed.read_u16::<BigEndian>()?);
        let meter_id = fixed.read_u32::<BigEndian>()?;
        check_records(body, 2, METER_BAND_LEN, OfpError::BadBand)?;
        Ok(MeterMod {
            command: command,
            flags: flags,
            meter_id: meter_id,
            bands: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ofp_actions::put_output;

    /// An OpenFlow 1.1-1.4 bucket with one output action.
    fn ofp11_bucket(weight: u16, port: u16) -> Vec<u8> {
        let mut actions = vec![];
        put_output(&mut actions, port, 0, Version::Ofp13);
        let mut bucket = vec![];
        bucket.write_u16::<BigEndian>((OFP11_BUCKET_LEN + actions.len()) as u16).unwrap();
        bucket.write_u16::<BigEndian>(weight).unwrap();
        bucket.write_u32::<BigEndian>(OFPG_ANY).unwrap();
        bucket.write_u32::<BigEndian>(OFPG_ANY).unwrap();
        bucket.extend_from_slice(&[0; 4]);
        bucket.extend_from_slice(&actions);
        bucket
    }

    fn group_mod(command: GroupModCommand) -> GroupMod {
        GroupMod {
            command: command,
            group_type: GroupType::Select,
            group_id: 7,
            command_bucket_id: OFPG15_BUCKET_ALL,
            buckets: ofp11_bucket(10, 2),
            properties: vec![],
        }
    }

    #[test]
    fn group_mod_round_trip() {
        let gm = group_mod(GroupModCommand::Modify);
        let bytes = GroupMod::marshal(&gm, Version::Ofp13, 9);
        assert_eq!(bytes.len(), 16 + 32);
        assert_eq!(GroupMod::parse(&bytes), Ok(gm));
    }

    #[test]
    fn openflow15_group_mod_round_trip() {
        let mut gm = group_mod(GroupModCommand::InsertBucket);
        gm.command_bucket_id = OFPG15_BUCKET_LAST;
        gm.buckets = vec![0, 8, 0, 0, 0, 0, 0, 1];
        gm.properties = vec![0, 0, 0, 8, 0, 0, 0, 0];
        let bytes = GroupMod::marshal(&gm, Version::Ofp15, 1);
        assert_eq!(GroupMod::parse(&bytes), Ok(gm));
    }

    #[test]
    fn bucket_commands_become_add_or_modify() {
        let gm = group_mod(GroupModCommand::InsertBucket);
        let new_buckets = ofp11_bucket(5, 3);
        let bytes = gm.encode(Version::Ofp13, 0, Some(&new_buckets), Some(true));
        let parsed = GroupMod::parse(&bytes).unwrap();
        assert_eq!(parsed.command, GroupModCommand::Modify);
        assert_eq!(parsed.buckets, new_buckets);

        let bytes = gm.encode(Version::Ofp13, 0, None, Some(false));
        let parsed = GroupMod::parse(&bytes).unwrap();
        assert_eq!(parsed.command, GroupModCommand::Add);
        assert_eq!(parsed.buckets, gm.buckets);
    }

    #[test]
    #[should_panic]
    fn bucket_command_needs_group_existed() {
        group_mod(GroupModCommand::RemoveBucket).encode(Version::Ofp12, 0, None, None);
    }

    #[test]
    fn group_mod_errors() {
        let mut bytes = GroupMod::marshal(&group_mod(GroupModCommand::Add), Version::Ofp13, 0);
        bytes[9] = 3;
        assert_eq!(GroupMod::parse(&bytes), Err(OfpError::BadGroupCommand));
        bytes[9] = 0;
        bytes[10] = 9;
        assert_eq!(GroupMod::parse(&bytes), Err(OfpError::BadGroupType));
        bytes[10] = 0;
        bytes[17] = 12;
        assert_eq!(GroupMod::parse(&bytes), Err(OfpError::BadBucket));
    }

    #[test]
    fn group_mod_format() {
        let mut s = String::new();
        group_mod(GroupModCommand::Add).format(&mut s, Version::Ofp13, &PortMap::new());
        assert_eq!(s, "\n ADD group_id=7,type=select,bucket=weight:10,actions=output:2");
    }

    #[test]
    fn meter_mod_round_trip_and_format() {
        let mut mm = MeterMod {
            command: MeterModCommand::Add,
            flags: MeterFlags::KBPS | MeterFlags::BURST,
            meter_id: 4,
            bands: vec![],
        };
        mm.push_drop_band(1000, 50);
        let bytes = MeterMod::marshal(&mm, Version::Ofp14, 3);
        assert_eq!(MeterMod::parse(&bytes), Ok(mm.clone()));

        let mut s = String::new();
        mm.format(&mut s);
        assert_eq!(s, " ADD meter=4 kbps burst bands=\ntype=drop rate=1000 burst_size=50");
    }

    #[test]
    fn meter_mod_errors() {
        let mm = MeterMod {
            command: MeterModCommand::Delete,
            flags: MeterFlags::empty(),
            meter_id: 1,
            bands: vec![0, 1, 0, 8, 0, 0, 0, 0],
        };
        let bytes = MeterMod::marshal(&mm, Version::Ofp13, 0);
        assert_eq!(MeterMod::parse(&bytes), Err(OfpError::BadBand));
        let mut bytes = bytes;
        bytes[9] = 7;
        assert_eq!(MeterMod::parse(&bytes), Err(OfpError::BadMeterCommand));
    }
}
