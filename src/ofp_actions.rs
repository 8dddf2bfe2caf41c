//! Action and instruction lists.
//!
//! Lists are validated on the way in and kept in their wire form: OpenFlow 1.0-1.2 action
//! lists, or OpenFlow 1.3+ instruction lists. The version a list was read under says which.

use std::fmt::Write;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::bits::try_pull;
use crate::ofp_errors::{OfpError, Result};
use crate::ofp_port::{format_port, port_from_ofp11, port_to_ofp11, PortMap};
use crate::ofp_protocol::Version;

const OFPAT_OUTPUT: u16 = 0;
const OFPAT_EXPERIMENTER: u16 = 0xffff;

const OFPIT_GOTO_TABLE: u16 = 1;
const OFPIT_WRITE_METADATA: u16 = 2;
const OFPIT_WRITE_ACTIONS: u16 = 3;
const OFPIT_APPLY_ACTIONS: u16 = 4;
const OFPIT_CLEAR_ACTIONS: u16 = 5;
const OFPIT_METER: u16 = 6;

/// True if lists read under `version` are instruction lists.
pub fn uses_instructions(version: Version) -> bool {
    version >= Version::Ofp13
}

/// Split the TLVs of a list, checking that each is at least 8 bytes, a multiple of 8 and
/// inside `list`.
fn tlvs(mut list: &[u8], err: OfpError) -> Result<Vec<(u16, &[u8])>> {
    let mut out = vec![];
    while !list.is_empty() {
        if list.len() < 4 {
            return Err(err);
        }
        let typ = (&list[0..2]).read_u16::<BigEndian>()?;
        let len = (&list[2..4]).read_u16::<BigEndian>()? as usize;
        if len < 8 || len % 8 != 0 {
            return Err(err);
        }
        let tlv = try_pull(&mut list, len).ok_or(err)?;
        out.push((typ, tlv));
    }
    Ok(out)
}

fn pull_list(buf: &mut &[u8],
             len: usize,
             ofpacts: &mut Vec<u8>,
             instructions: bool)
             -> Result<()> {
    if len % 8 != 0 {
        return Err(OfpError::BadLength);
    }
    let list = try_pull(buf, len).ok_or(OfpError::BadLength)?;
    if instructions {
        for (typ, tlv) in tlvs(list, OfpError::BadInstructionLength)? {
            if typ == OFPIT_WRITE_ACTIONS || typ == OFPIT_APPLY_ACTIONS {
                tlvs(&tlv[8..], OfpError::BadActionLength)?;
            }
        }
    } else {
        tlvs(list, OfpError::BadActionLength)?;
    }
    ofpacts.extend_from_slice(list);
    Ok(())
}

/// Pull `len` bytes of OpenFlow actions from the front of `buf` into `ofpacts`.
pub fn pull_actions(buf: &mut &[u8], len: usize, ofpacts: &mut Vec<u8>) -> Result<()> {
    pull_list(buf, len, ofpacts, false)
}

/// Pull `len` bytes of OpenFlow instructions from the front of `buf` into `ofpacts`.
pub fn pull_instructions(buf: &mut &[u8], len: usize, ofpacts: &mut Vec<u8>) -> Result<()> {
    pull_list(buf, len, ofpacts, true)
}

/// Append an output action in the form used by `version`.
pub fn put_output(bytes: &mut Vec<u8>, port: u16, max_len: u16, version: Version) {
    bytes.write_u16::<BigEndian>(OFPAT_OUTPUT).unwrap();
    if version == Version::Ofp10 {
        bytes.write_u16::<BigEndian>(8).unwrap();
        bytes.write_u16::<BigEndian>(port).unwrap();
        bytes.write_u16::<BigEndian>(max_len).unwrap();
    } else {
        bytes.write_u16::<BigEndian>(16).unwrap();
        bytes.write_u32::<BigEndian>(port_to_ofp11(port)).unwrap();
        bytes.write_u16::<BigEndian>(max_len).unwrap();
        bytes.extend_from_slice(&[0; 6]);
    }
}

/// Append an apply-actions instruction wrapping `actions`.
pub fn put_apply_actions(bytes: &mut Vec<u8>, actions: &[u8]) {
    bytes.write_u16::<BigEndian>(OFPIT_APPLY_ACTIONS).unwrap();
    bytes.write_u16::<BigEndian>(8 + actions.len() as u16).unwrap();
    bytes.extend_from_slice(&[0; 4]);
    bytes.extend_from_slice(actions);
}

/// Append a human-readable form of the list `ofpacts`, read under `version`.
pub fn format_ofpacts(s: &mut String, ofpacts: &[u8], version: Version, port_map: &PortMap) {
    if ofpacts.is_empty() {
        s.push_str("drop");
        return;
    }
    if uses_instructions(version) {
        format_instructions(s, ofpacts, version, port_map);
    } else {
        format_actions(s, ofpacts, version, port_map);
    }
}

/// Append a human-readable form of the action list `actions`.
pub fn format_actions(s: &mut String, actions: &[u8], version: Version, port_map: &PortMap) {
    let tlvs = match tlvs(actions, OfpError::BadActionLength) {
        Ok(tlvs) => tlvs,
        Err(e) => {
            let _ = write!(s, "***{}***", e);
            return;
        }
    };
    for (i, (typ, tlv)) in tlvs.into_iter().enumerate() {
        if i > 0 {
            s.push(',');
        }
        let mut body = &tlv[4..];
        match typ {
            OFPAT_OUTPUT => {
                let port = if version == Version::Ofp10 {
                    body.read_u16::<BigEndian>().ok()
                } else {
                    body.read_u32::<BigEndian>().ok().and_then(|p| port_from_ofp11(p).ok())
                };
                match port {
                    Some(port) => {
                        s.push_str("output:");
                        format_port(s, port, port_map);
                    }
                    None => s.push_str("output:?"),
                }
            }
            OFPAT_EXPERIMENTER => {
                let vendor = body.read_u32::<BigEndian>().unwrap_or(0);
                let _ = write!(s, "experimenter({:#010x})", vendor);
            }
            _ => {
                let _ = write!(s, "action(type={},len={})", typ, tlv.len());
            }
        }
    }
}

fn format_instructions(s: &mut String, insts: &[u8], version: Version, port_map: &PortMap) {
    let tlvs = match tlvs(insts, OfpError::BadInstructionLength) {
        Ok(tlvs) => tlvs,
        Err(e) => {
            let _ = write!(s, "***{}***", e);
            return;
        }
    };
    for (i, (typ, tlv)) in tlvs.into_iter().enumerate() {
        if i > 0 {
            s.push(',');
        }
        let mut body = &tlv[4..];
        match typ {
            OFPIT_GOTO_TABLE => {
                let _ = write!(s, "goto_table:{}", body.read_u8().unwrap_or(0));
            }
            OFPIT_WRITE_METADATA => {
                body = &body[4..];
                let metadata = body.read_u64::<BigEndian>().unwrap_or(0);
                let mask = body.read_u64::<BigEndian>().unwrap_or(0);
                let _ = write!(s, "write_metadata:{:#x}", metadata);
                if mask != u64::MAX {
                    let _ = write!(s, "/{:#x}", mask);
                }
            }
            OFPIT_WRITE_ACTIONS => {
                s.push_str("write_actions(");
                format_actions(s, &tlv[8..], version, port_map);
                s.push(')');
            }
            OFPIT_APPLY_ACTIONS => format_actions(s, &tlv[8..], version, port_map),
            OFPIT_CLEAR_ACTIONS => s.push_str("clear_actions"),
            OFPIT_METER => {
                let _ = write!(s, "meter:{}", body.read_u32::<BigEndian>().unwrap_or(0));
            }
            _ => {
                let _ = write!(s, "instruction(type={},len={})", typ, tlv.len());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_are_kept_verbatim() {
        let mut wire = vec![];
        put_output(&mut wire, 1, 0, Version::Ofp10);
        put_output(&mut wire, 2, 0, Version::Ofp10);
        wire.extend_from_slice(&[0xff; 8]);
        let mut buf = &wire[..];
        let mut ofpacts = vec![];
        pull_actions(&mut buf, 16, &mut ofpacts).unwrap();
        assert_eq!(ofpacts, &wire[..16]);
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn bad_lengths() {
        let mut ofpacts = vec![];
        let mut buf: &[u8] = &[0, 0, 0, 4, 0, 0, 0, 0];
        assert_eq!(pull_actions(&mut buf, 8, &mut ofpacts), Err(OfpError::BadActionLength));
        let mut buf: &[u8] = &[0, 1, 0, 16, 0, 0, 0, 0];
        assert_eq!(pull_instructions(&mut buf, 8, &mut ofpacts),
                   Err(OfpError::BadInstructionLength));
        let mut buf: &[u8] = &[0; 8];
        assert_eq!(pull_actions(&mut buf, 4, &mut ofpacts), Err(OfpError::BadLength));
        assert_eq!(pull_actions(&mut buf, 16, &mut ofpacts), Err(OfpError::BadLength));
        assert!(ofpacts.is_empty());
    }

    #[test]
    fn format_lists() {
        let map = PortMap::new();
        let mut actions = vec![];
        put_output(&mut actions, 3, 0, Version::Ofp13);
        let mut insts = vec![];
        put_apply_actions(&mut insts, &actions);
        insts.extend_from_slice(&[0, 1, 0, 8, 2, 0, 0, 0]);

        let mut s = String::new();
        format_ofpacts(&mut s, &insts, Version::Ofp14, &map);
        assert_eq!(s, "output:3,goto_table:2");

        let mut s = String::new();
        let mut v10 = vec![];
        put_output(&mut v10, 0xfffd, 0, Version::Ofp10);
        format_ofpacts(&mut s, &v10, Version::Ofp10, &map);
        s.push(' ');
        format_ofpacts(&mut s, &[], Version::Ofp10, &map);
        assert_eq!(s, "output:CONTROLLER drop");
    }
}
