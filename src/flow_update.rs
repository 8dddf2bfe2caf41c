//! Flow updates: the replies a switch streams to a controller that monitors its flows.
//!
//! Each reply message carries a sequence of update records, each starting with a 16-bit
//! length and a 16-bit event code. Full records describe a flow; abbreviated records only
//! echo the xid of the controller's own request; the OpenFlow 1.4 paused and resumed records
//! carry nothing else.

use std::fmt::Write;
use std::mem::size_of;

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use log::warn;

use crate::bits::{put_zeros, try_pull};
use crate::flow_monitor::MonitorFormat;
use crate::flow_removed::FlowRemovedReason;
use crate::monitor_flags::{nx_to_ofp_event, ofp_to_nx_event, NxFlowUpdateEvent,
                           OfpFlowUpdateEvent};
use crate::ofp_actions::{format_ofpacts, pull_actions, pull_instructions};
use crate::ofp_errors::{OfpError, Result};
use crate::ofp_header::OfpHeader;
use crate::ofp_match::{Pattern, OFP_DEFAULT_PRIORITY};
use crate::ofp_message::{set_reply_more, OfpRaw, RawMessage};
use crate::ofp_port::PortMap;
use crate::ofp_print::{format_table, TableMap};
use crate::ofp_protocol::{Protocol, Version};

/// Largest message an OpenFlow length field can describe.
const MAX_MSG_LEN: usize = 0xffff;

/// What happened to the flow described by a full update.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FullUpdateEvent {
    /// The flow was in the table when the monitor was added.
    Initial,
    Added,
    Removed(FlowRemovedReason),
    Modified,
}

/// A full update: the flow as it now stands, or as it was when removed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowUpdateFull<'a> {
    pub event: FullUpdateEvent,
    pub table_id: u8,
    pub cookie: u64,
    pub priority: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub pattern: Pattern,
    /// Actions, or instructions from OpenFlow 1.3 on, in wire form. Empty if the monitor did
    /// not ask for them.
    pub ofpacts: &'a [u8],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowUpdate<'a> {
    Full(FlowUpdateFull<'a>),
    /// The change was made by the controller's own request with this xid.
    Abbrev { xid: u32 },
    Paused,
    Resumed,
}

impl<'a> FlowUpdate<'a> {
    fn event(&self) -> OfpFlowUpdateEvent {
        match *self {
            FlowUpdate::Full(ref full) => {
                match full.event {
                    FullUpdateEvent::Initial => OfpFlowUpdateEvent::Initial,
                    FullUpdateEvent::Added => OfpFlowUpdateEvent::Added,
                    FullUpdateEvent::Removed(_) => OfpFlowUpdateEvent::Removed,
                    FullUpdateEvent::Modified => OfpFlowUpdateEvent::Modified,
                }
            }
            FlowUpdate::Abbrev { .. } => OfpFlowUpdateEvent::Abbrev,
            FlowUpdate::Paused => OfpFlowUpdateEvent::Paused,
            FlowUpdate::Resumed => OfpFlowUpdateEvent::Resumed,
        }
    }
}

/// Update record header: length, event.
#[repr(packed)]
#[allow(dead_code)]
struct FlowUpdateHeader(u16, u16);

/// Nicira and ONF full update: length, event, reason, priority, idle_timeout, hard_timeout,
/// match_len, table_id, pad, cookie.
#[repr(packed)]
#[allow(dead_code)]
struct NxFlowUpdateFull(u16, u16, u16, u16, u16, u16, u16, u8, u8, u64);

/// OpenFlow 1.4 full update: length, event, table_id, reason, idle_timeout, hard_timeout,
/// priority, zeros, cookie.
#[repr(packed)]
#[allow(dead_code)]
struct OfpFlowUpdateFull(u16, u16, u8, u8, u16, u16, u16, [u8; 4], u64);

/// Abbreviated update: length, event, xid. Paused and resumed records have the same size.
#[repr(packed)]
#[allow(dead_code)]
struct FlowUpdateAbbrev(u16, u16, u32);

fn full_event(event: OfpFlowUpdateEvent, reason: u8) -> FullUpdateEvent {
    match event {
        OfpFlowUpdateEvent::Initial => FullUpdateEvent::Initial,
        OfpFlowUpdateEvent::Removed => {
            FullUpdateEvent::Removed(FlowRemovedReason::from_wire(reason))
        }
        OfpFlowUpdateEvent::Modified => FullUpdateEvent::Modified,
        _ => FullUpdateEvent::Added,
    }
}

/// Iterates over the update records of one flow monitor reply.
#[derive(Clone, Debug)]
pub struct FlowUpdateCursor<'m> {
    raw: OfpRaw,
    format: MonitorFormat,
    version: Version,
    body: &'m [u8],
}

impl<'m> FlowUpdateCursor<'m> {
    /// Classify `msg`, which must be a flow monitor reply in any version.
    pub fn new(msg: &'m [u8]) -> Result<FlowUpdateCursor<'m>> {
        let raw = RawMessage::decode(msg)?;
        let format = MonitorFormat::of_reply_raw(raw.raw).ok_or(OfpError::BadType)?;
        Ok(FlowUpdateCursor {
            raw: raw.raw,
            format: format,
            version: raw.version,
            body: raw.body,
        })
    }

    /// Version of the reply, which says how to read the actions of full updates.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Decode the next update, or return `None` once the message is used up. The actions of
    /// a full update are stored in `ofpacts`, which is cleared first, and the update borrows
    /// them from there. After an error the cursor is exhausted.
    pub fn next_update<'a>(&mut self,
                           ofpacts: &'a mut Vec<u8>)
                           -> Result<Option<FlowUpdate<'a>>> {
        ofpacts.clear();
        if self.body.is_empty() {
            return Ok(None);
        }
        let update = match self.decode_record(ofpacts) {
            Ok(update) => update,
            Err(e) => {
                self.body = &[];
                return Err(e);
            }
        };
        let view: &'a Vec<u8> = ofpacts;
        Ok(Some(match update {
            FlowUpdate::Full(full) => {
                FlowUpdate::Full(FlowUpdateFull { ofpacts: &view[..], ..full })
            }
            other => other,
        }))
    }

    fn bad_len(&self) -> OfpError {
        warn!("{} has {} leftover bytes at end", self.raw.name(), self.body.len());
        OfpError::BadLength
    }

    fn decode_record(&mut self, ofpacts: &mut Vec<u8>) -> Result<FlowUpdate<'static>> {
        if self.body.len() < size_of::<FlowUpdateHeader>() {
            return Err(self.bad_len());
        }
        let length = BigEndian::read_u16(&self.body[0..2]) as usize;
        let code = BigEndian::read_u16(&self.body[2..4]);
        if length > self.body.len() || length % 8 != 0 {
            return Err(self.bad_len());
        }

        let event = match self.format {
            MonitorFormat::Nx | MonitorFormat::Onf => {
                NxFlowUpdateEvent::from_wire(code).map(nx_to_ofp_event)
            }
            MonitorFormat::Ofp14 => OfpFlowUpdateEvent::from_wire(code),
        };
        let event = match event {
            Some(event) => event,
            None => {
                warn!("{} has bad event {}", self.raw.name(), code);
                return Err(OfpError::BadEvent);
            }
        };

        match event {
            OfpFlowUpdateEvent::Abbrev => {
                if length != size_of::<FlowUpdateAbbrev>() {
                    return Err(self.bad_len());
                }
                let record = &self.body[..length];
                self.body = &self.body[length..];
                Ok(FlowUpdate::Abbrev { xid: BigEndian::read_u32(&record[4..8]) })
            }
            OfpFlowUpdateEvent::Paused | OfpFlowUpdateEvent::Resumed => {
                if length != size_of::<FlowUpdateAbbrev>() {
                    return Err(self.bad_len());
                }
                self.body = &self.body[length..];
                if event == OfpFlowUpdateEvent::Paused {
                    Ok(FlowUpdate::Paused)
                } else {
                    Ok(FlowUpdate::Resumed)
                }
            }
            _ if self.format == MonitorFormat::Ofp14 => {
                self.decode_ofp14_full(event, length, ofpacts)
            }
            _ => self.decode_nx_full(event, length, ofpacts),
        }
    }

    fn decode_nx_full(&mut self,
                      event: OfpFlowUpdateEvent,
                      length: usize,
                      ofpacts: &mut Vec<u8>)
                      -> Result<FlowUpdate<'static>> {
        let fixed_len = size_of::<NxFlowUpdateFull>();
        if length < fixed_len {
            return Err(self.bad_len());
        }
        let match_len = BigEndian::read_u16(&self.body[12..14]) as usize;
        if fixed_len + match_len > length {
            return Err(self.bad_len());
        }
        let mut record = match try_pull(&mut self.body, length) {
            Some(record) => record,
            None => return Err(self.bad_len()),
        };

        let mut fixed = try_pull(&mut record, fixed_len).ok_or(OfpError::BadLength)?;
        let _length = fixed.read_u16::<BigEndian>()?;
        let _event = fixed.read_u16::<BigEndian>()?;
        // Reasons are 8 bits everywhere else.
        let reason = fixed.read_u16::<BigEndian>()?.min(u8::MAX as u16) as u8;
        let priority = fixed.read_u16::<BigEndian>()?;
        let idle_timeout = fixed.read_u16::<BigEndian>()?;
        let hard_timeout = fixed.read_u16::<BigEndian>()?;
        let _match_len = fixed.read_u16::<BigEndian>()?;
        let table_id = fixed.read_u8()?;
        let _pad = fixed.read_u8()?;
        let cookie = fixed.read_u64::<BigEndian>()?;

        let pattern = if self.format == MonitorFormat::Onf {
            let (pattern, _) = Pattern::pull_oxm(&mut record)?;
            let len = record.len();
            pull_instructions(&mut record, len, ofpacts)?;
            pattern
        } else {
            let pattern = Pattern::pull_nxm(&mut record, match_len)?;
            let len = record.len();
            pull_actions(&mut record, len, ofpacts)?;
            pattern
        };

        Ok(FlowUpdate::Full(FlowUpdateFull {
            event: full_event(event, reason),
            table_id: table_id,
            cookie: cookie,
            priority: priority,
            idle_timeout: idle_timeout,
            hard_timeout: hard_timeout,
            pattern: pattern,
            ofpacts: &[],
        }))
    }

    fn decode_ofp14_full(&mut self,
                         event: OfpFlowUpdateEvent,
                         length: usize,
                         ofpacts: &mut Vec<u8>)
                         -> Result<FlowUpdate<'static>> {
        let fixed_len = size_of::<OfpFlowUpdateFull>();
        if length < fixed_len {
            return Err(self.bad_len());
        }
        let mut record = match try_pull(&mut self.body, length) {
            Some(record) => record,
            None => return Err(self.bad_len()),
        };

        let mut fixed = try_pull(&mut record, fixed_len).ok_or(OfpError::BadLength)?;
        let _length = fixed.read_u16::<BigEndian>()?;
        let _event = fixed.read_u16::<BigEndian>()?;
        let table_id = fixed.read_u8()?;
        let reason = fixed.read_u8()?;
        let idle_timeout = fixed.read_u16::<BigEndian>()?;
        let hard_timeout = fixed.read_u16::<BigEndian>()?;
        let priority = fixed.read_u16::<BigEndian>()?;
        let _zeros = fixed.read_u32::<BigEndian>()?;
        let cookie = fixed.read_u64::<BigEndian>()?;

        let (pattern, _) = Pattern::pull_oxm(&mut record)?;
        let len = record.len();
        pull_instructions(&mut record, len, ofpacts)?;

        Ok(FlowUpdate::Full(FlowUpdateFull {
            event: full_event(event, reason),
            table_id: table_id,
            cookie: cookie,
            priority: priority,
            idle_timeout: idle_timeout,
            hard_timeout: hard_timeout,
            pattern: pattern,
            ofpacts: &[],
        }))
    }
}

/// Builds the sequence of flow monitor replies for one batch of updates.
#[derive(Clone, Debug)]
pub struct FlowUpdateReplies {
    version: Version,
    format: MonitorFormat,
    msgs: Vec<Vec<u8>>,
}

impl FlowUpdateReplies {
    /// Start an empty reply with `xid` for `protocol`.
    pub fn start(xid: u32, protocol: Protocol) -> FlowUpdateReplies {
        let version = protocol.version();
        let format = MonitorFormat::of_version(version);
        let mut msg = vec![];
        format.reply_raw().put(version, xid, &mut msg);
        FlowUpdateReplies {
            version: version,
            format: format,
            msgs: vec![msg],
        }
    }

    /// Append `update` to the last reply, moving it into a new reply if the last one would
    /// outgrow the OpenFlow length field.
    ///
    /// # Panics
    ///
    /// If `update` is paused or resumed and the protocol predates OpenFlow 1.4, if its
    /// actions are not padded to a multiple of 8 bytes, or if the record alone would not fit
    /// in a reply.
    pub fn append(&mut self, update: &FlowUpdate) {
        let format = self.format;
        let msg = match self.msgs.last_mut() {
            Some(msg) => msg,
            None => unreachable!("replies always hold at least one message"),
        };
        let start = msg.len();
        let event = update.event();

        match (format, update) {
            (_, &FlowUpdate::Abbrev { xid }) => {
                put_zeros(msg, size_of::<FlowUpdateAbbrev>());
                BigEndian::write_u32(&mut msg[start + 4..start + 8], xid);
            }
            (MonitorFormat::Ofp14, &FlowUpdate::Paused) |
            (MonitorFormat::Ofp14, &FlowUpdate::Resumed) => {
                put_zeros(msg, size_of::<FlowUpdateAbbrev>());
            }
            (MonitorFormat::Ofp14, &FlowUpdate::Full(ref full)) => {
                put_zeros(msg, size_of::<OfpFlowUpdateFull>());
                full.pattern.put_oxm(msg);
                Self::put_ofpacts(msg, full.ofpacts);
                let rec = &mut msg[start..];
                rec[4] = full.table_id;
                rec[5] = reason_of(full);
                BigEndian::write_u16(&mut rec[6..8], full.idle_timeout);
                BigEndian::write_u16(&mut rec[8..10], full.hard_timeout);
                BigEndian::write_u16(&mut rec[10..12], full.priority);
                BigEndian::write_u64(&mut rec[16..24], full.cookie);
            }
            (_, &FlowUpdate::Full(ref full)) => {
                put_zeros(msg, size_of::<NxFlowUpdateFull>());
                let match_len = if format == MonitorFormat::Onf {
                    full.pattern.put_oxm(msg)
                } else {
                    full.pattern.put_nxm(msg)
                };
                Self::put_ofpacts(msg, full.ofpacts);
                let rec = &mut msg[start..];
                BigEndian::write_u16(&mut rec[4..6], reason_of(full) as u16);
                BigEndian::write_u16(&mut rec[6..8], full.priority);
                BigEndian::write_u16(&mut rec[8..10], full.idle_timeout);
                BigEndian::write_u16(&mut rec[10..12], full.hard_timeout);
                BigEndian::write_u16(&mut rec[12..14], match_len as u16);
                rec[14] = full.table_id;
                BigEndian::write_u64(&mut rec[16..24], full.cookie);
            }
            (_, &FlowUpdate::Paused) |
            (_, &FlowUpdate::Resumed) => {
                panic!("{:?} cannot be sent before OpenFlow 1.4", event);
            }
        }

        let code = if format == MonitorFormat::Ofp14 {
            event as u16
        } else {
            ofp_to_nx_event(event) as u16
        };
        let length = msg.len() - start;
        let header_len = format.reply_raw().header_len();
        assert!(length <= MAX_MSG_LEN - header_len,
                "{:?} flow update record of {} bytes is too long for one reply",
                event,
                length);
        BigEndian::write_u16(&mut msg[start..start + 2], length as u16);
        BigEndian::write_u16(&mut msg[start + 2..start + 4], code);
        self.post_append(start);
    }

    fn put_ofpacts(msg: &mut Vec<u8>, ofpacts: &[u8]) {
        assert_eq!(ofpacts.len() % 8, 0, "actions must be padded to 8 bytes");
        msg.extend_from_slice(ofpacts);
    }

    /// Split off the record that starts at `start` if it made the last message too long.
    fn post_append(&mut self, start: usize) {
        let header_len = self.format.reply_raw().header_len();
        let msg = match self.msgs.last_mut() {
            Some(msg) => msg,
            None => return,
        };
        if msg.len() <= MAX_MSG_LEN {
            OfpHeader::update_length(msg);
            return;
        }
        let mut next = msg[..header_len].to_vec();
        next.extend_from_slice(&msg[start..]);
        msg.truncate(start);
        OfpHeader::update_length(msg);
        set_reply_more(msg);
        OfpHeader::update_length(&mut next);
        self.msgs.push(next);
    }

    /// The version the replies are written in.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Return the finished replies. Every message but the last has the "more" flag set.
    pub fn finish(self) -> Vec<Vec<u8>> {
        self.msgs
    }
}

fn reason_of(full: &FlowUpdateFull) -> u8 {
    match full.event {
        FullUpdateEvent::Removed(reason) => reason.wire(),
        _ => 0,
    }
}

/// Append a human-readable description of `update`, read under `version`, to `s`.
pub fn format_flow_update(s: &mut String,
                          update: &FlowUpdate,
                          version: Version,
                          port_map: &PortMap,
                          table_map: &TableMap) {
    s.push_str("\n event=");
    let full = match *update {
        FlowUpdate::Full(ref full) => full,
        FlowUpdate::Abbrev { xid } => {
            let _ = write!(s, "ABBREV xid={:#x}", xid);
            return;
        }
        FlowUpdate::Paused => {
            s.push_str("PAUSED");
            return;
        }
        FlowUpdate::Resumed => {
            s.push_str("RESUMED");
            return;
        }
    };
    match full.event {
        FullUpdateEvent::Initial => s.push_str("INITIAL"),
        FullUpdateEvent::Added => s.push_str("ADDED"),
        FullUpdateEvent::Removed(reason) => {
            let _ = write!(s, "DELETED reason={}", reason);
        }
        FullUpdateEvent::Modified => s.push_str("MODIFIED"),
    }

    s.push_str(" table=");
    format_table(s, full.table_id, table_map);
    if full.idle_timeout != 0 {
        let _ = write!(s, " idle_timeout={}", full.idle_timeout);
    }
    if full.hard_timeout != 0 {
        let _ = write!(s, " hard_timeout={}", full.hard_timeout);
    }
    if full.cookie == 0 {
        s.push_str(" cookie=0");
    } else {
        let _ = write!(s, " cookie={:#x}", full.cookie);
    }
    s.push(' ');
    full.pattern.format(s, OFP_DEFAULT_PRIORITY, port_map);

    if !full.ofpacts.is_empty() {
        if !s.ends_with(' ') {
            s.push(' ');
        }
        s.push_str("actions=");
        format_ofpacts(s, full.ofpacts, version, port_map);
    }
}
