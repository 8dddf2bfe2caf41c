//! Flow monitor requests and the control messages that go with them.
//!
//! A flow monitor request subscribes a controller to changes in the flow tables. Several
//! requests can be packed into one message. Before OpenFlow 1.3 they travel as a Nicira stats
//! request, in OpenFlow 1.3 as an ONF experimenter multipart request, and from OpenFlow 1.4
//! on as the standard `OFPMP_FLOW_MONITOR` request.

use std::fmt::Write;
use std::mem::size_of;
use std::sync::atomic::{AtomicU32, Ordering};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::warn;

use crate::bits::{is_all_zeros, try_pull};
use crate::flow_update::{FlowUpdate, FlowUpdateCursor};
use crate::monitor_flags::{flag_name, nx_to_ofp_flags, ofp_to_nx_flags, FlowMonitorFlags,
                           NxFlowMonitorFlags, OfpFlowUpdateEvent};
use crate::ofp_errors::{OfpError, ParseError, Result};
use crate::ofp_header::OfpHeader;
use crate::ofp_match::{parse_protocol, Mf, Pattern, OFP_DEFAULT_PRIORITY};
use crate::ofp_message::{OfpRaw, RawMessage};
use crate::ofp_parse::key_values;
use crate::ofp_port::{format_port, parse_port, port_from_ofp11, port_to_ofp11, PortMap,
                      OFPP_NONE};
use crate::ofp_print::{format_bit_names, format_table, parse_table, TableMap};
use crate::ofp_protocol::{Protocol, Version};

pub use crate::group_meter::OFPG_ANY;

/// Wire layouts shared by the flow monitor messages.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum MonitorFormat {
    /// Nicira extension, OpenFlow 1.0-1.2.
    Nx,
    /// ONF extension, OpenFlow 1.3.
    Onf,
    /// Standard, OpenFlow 1.4 and later.
    Ofp14,
}

impl MonitorFormat {
    pub(crate) fn of_version(version: Version) -> MonitorFormat {
        match version {
            Version::Ofp10 | Version::Ofp11 | Version::Ofp12 => MonitorFormat::Nx,
            Version::Ofp13 => MonitorFormat::Onf,
            Version::Ofp14 | Version::Ofp15 => MonitorFormat::Ofp14,
        }
    }

    pub(crate) fn request_raw(self) -> OfpRaw {
        match self {
            MonitorFormat::Nx => OfpRaw::NxstFlowMonitorRequest,
            MonitorFormat::Onf => OfpRaw::Onfst13FlowMonitorRequest,
            MonitorFormat::Ofp14 => OfpRaw::Ofpst14FlowMonitorRequest,
        }
    }

    pub(crate) fn reply_raw(self) -> OfpRaw {
        match self {
            MonitorFormat::Nx => OfpRaw::NxstFlowMonitorReply,
            MonitorFormat::Onf => OfpRaw::Onfst13FlowMonitorReply,
            MonitorFormat::Ofp14 => OfpRaw::Ofpst14FlowMonitorReply,
        }
    }

    fn of_request_raw(raw: OfpRaw) -> Option<MonitorFormat> {
        [MonitorFormat::Nx, MonitorFormat::Onf, MonitorFormat::Ofp14]
            .iter()
            .cloned()
            .find(|f| f.request_raw() == raw)
    }

    pub(crate) fn of_reply_raw(raw: OfpRaw) -> Option<MonitorFormat> {
        [MonitorFormat::Nx, MonitorFormat::Onf, MonitorFormat::Ofp14]
            .iter()
            .cloned()
            .find(|f| f.reply_raw() == raw)
    }
}

/// What a flow monitor request does to the monitor named by its id.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowMonitorCommand {
    Add,
    Modify,
    Delete,
}

impl FlowMonitorCommand {
    fn from_wire(code: u8) -> Option<FlowMonitorCommand> {
        match code {
            0 => Some(FlowMonitorCommand::Add),
            1 => Some(FlowMonitorCommand::Modify),
            2 => Some(FlowMonitorCommand::Delete),
            _ => None,
        }
    }

    fn wire(self) -> u8 {
        match self {
            FlowMonitorCommand::Add => 0,
            FlowMonitorCommand::Modify => 1,
            FlowMonitorCommand::Delete => 2,
        }
    }
}

/// One flow monitor subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowMonitorRequest {
    pub id: u32,
    pub command: FlowMonitorCommand,
    pub flags: FlowMonitorFlags,
    /// `OFPP_NONE` to not filter on output port.
    pub out_port: u16,
    /// `OFPG_ANY` to not filter on output group.
    pub out_group: u32,
    /// 0xff for all tables.
    pub table_id: u8,
    pub pattern: Pattern,
}

impl Default for FlowMonitorRequest {
    /// Monitor every flow in every table, with full updates, for changes made by this
    /// controller.
    fn default() -> FlowMonitorRequest {
        FlowMonitorRequest {
            id: 0,
            command: FlowMonitorCommand::Add,
            flags: FlowMonitorFlags::INITIAL | FlowMonitorFlags::ADD | FlowMonitorFlags::REMOVED |
                   FlowMonitorFlags::MODIFY | FlowMonitorFlags::ONLY_OWN |
                   FlowMonitorFlags::INSTRUCTIONS,
            out_port: OFPP_NONE,
            out_group: OFPG_ANY,
            table_id: 0xff,
            pattern: Pattern::match_all(),
        }
    }
}

/// Nicira flow monitor request: id, flags, out_port, match_len, table_id, zeros.
#[repr(packed)]
#[allow(dead_code)]
struct NxFlowMonitorRequest(u32, u16, u16, u16, u8, [u8; 5]);

/// ONF flow monitor request: id, flags, match_len, out_port, table_id, zeros.
#[repr(packed)]
#[allow(dead_code)]
struct OnfFlowMonitorRequest(u32, u16, u16, u32, u8, [u8; 3]);

/// OpenFlow 1.4 flow monitor request: monitor_id, out_port, out_group, flags, table_id, command.
#[repr(packed)]
#[allow(dead_code)]
struct Ofp14FlowMonitorRequest(u32, u32, u32, u16, u8, u8);

/// Iterates over the requests packed into one flow monitor request message.
#[derive(Clone, Debug)]
pub struct FlowMonitorRequestCursor<'a> {
    format: MonitorFormat,
    body: &'a [u8],
}

impl<'a> FlowMonitorRequestCursor<'a> {
    /// Classify `msg`, which must be a flow monitor request in any version.
    pub fn new(msg: &'a [u8]) -> Result<FlowMonitorRequestCursor<'a>> {
        let raw = RawMessage::decode(msg)?;
        let format = MonitorFormat::of_request_raw(raw.raw).ok_or(OfpError::BadType)?;
        Ok(FlowMonitorRequestCursor {
            format: format,
            body: raw.body,
        })
    }

    /// Decode the next request, or return `None` once the message is used up. After an error
    /// the cursor is exhausted.
    pub fn next_request(&mut self) -> Result<Option<FlowMonitorRequest>> {
        if self.body.is_empty() {
            return Ok(None);
        }
        match self.decode_request() {
            Ok(rq) => Ok(Some(rq)),
            Err(e) => {
                self.body = &[];
                Err(e)
            }
        }
    }

    fn pull_fixed(&mut self, len: usize, name: &str) -> Result<&'a [u8]> {
        match try_pull(&mut self.body, len) {
            Some(fixed) => Ok(fixed),
            None => {
                warn!("{} request has {} leftover bytes at end", name, self.body.len());
                Err(OfpError::BadLength)
            }
        }
    }

    fn decode_request(&mut self) -> Result<FlowMonitorRequest> {
        match self.format {
            MonitorFormat::Nx => {
                let mut fixed = self.pull_fixed(size_of::<NxFlowMonitorRequest>(),
                                                "NXST_FLOW_MONITOR")?;
                let id = fixed.read_u32::<BigEndian>()?;
                let flags = check_nx_flags(fixed.read_u16::<BigEndian>()?, "NXST_FLOW_MONITOR")?;
                let out_port = fixed.read_u16::<BigEndian>()?;
                let match_len = fixed.read_u16::<BigEndian>()? as usize;
                let table_id = fixed.read_u8()?;
                if !is_all_zeros(fixed) {
                    return Err(OfpError::MustBeZero);
                }
                let pattern = Pattern::pull_nxm(&mut self.body, match_len)?;
                Ok(FlowMonitorRequest {
                    id: id,
                    command: FlowMonitorCommand::Add,
                    flags: flags,
                    out_port: out_port,
                    out_group: OFPG_ANY,
                    table_id: table_id,
                    pattern: pattern,
                })
            }
            MonitorFormat::Onf => {
                let mut fixed = self.pull_fixed(size_of::<OnfFlowMonitorRequest>(),
                                                "ONFST_FLOW_MONITOR")?;
                let id = fixed.read_u32::<BigEndian>()?;
                let flags = check_nx_flags(fixed.read_u16::<BigEndian>()?, "ONFST_FLOW_MONITOR")?;
                // The OXM header carries its own length.
                let _match_len = fixed.read_u16::<BigEndian>()?;
                let out_port = fixed.read_u32::<BigEndian>()?;
                let table_id = fixed.read_u8()?;
                if !is_all_zeros(fixed) {
                    return Err(OfpError::MustBeZero);
                }
                let out_port = port_from_ofp11(out_port)?;
                let (pattern, _) = Pattern::pull_oxm(&mut self.body)?;
                Ok(FlowMonitorRequest {
                    id: id,
                    command: FlowMonitorCommand::Add,
                    flags: flags,
                    out_port: out_port,
                    out_group: OFPG_ANY,
                    table_id: table_id,
                    pattern: pattern,
                })
            }
            MonitorFormat::Ofp14 => {
                let mut fixed = self.pull_fixed(size_of::<Ofp14FlowMonitorRequest>(),
                                                "OFPST_FLOW_MONITOR")?;
                let id = fixed.read_u32::<BigEndian>()?;
                let out_port = fixed.read_u32::<BigEndian>()?;
                let out_group = fixed.read_u32::<BigEndian>()?;
                let flags = fixed.read_u16::<BigEndian>()?;
                let table_id = fixed.read_u8()?;
                let code = fixed.read_u8()?;
                let command = FlowMonitorCommand::from_wire(code).ok_or_else(|| {
                    warn!("OFPST_FLOW_MONITOR has unknown command {}", code);
                    OfpError::BadCommand
                })?;

                if command == FlowMonitorCommand::Delete {
                    let (pattern, _) = Pattern::pull_oxm(&mut self.body)?;
                    return Ok(FlowMonitorRequest {
                        id: id,
                        command: command,
                        pattern: pattern,
                        ..FlowMonitorRequest::default()
                    });
                }

                let allowed = FlowMonitorFlags::INITIAL | FlowMonitorFlags::ADD |
                              FlowMonitorFlags::REMOVED |
                              FlowMonitorFlags::MODIFY |
                              FlowMonitorFlags::INSTRUCTIONS |
                              FlowMonitorFlags::ONLY_OWN;
                let changes = FlowMonitorFlags::ADD | FlowMonitorFlags::REMOVED |
                              FlowMonitorFlags::MODIFY;
                let flags = match FlowMonitorFlags::from_bits(flags) {
                    Some(f) if allowed.contains(f) && f.intersects(changes) => f,
                    _ => {
                        warn!("OFPST_FLOW_MONITOR has bad flags {:#x}", flags);
                        return Err(OfpError::BadFlags);
                    }
                };
                let out_port = port_from_ofp11(out_port)?;
                let (pattern, _) = Pattern::pull_oxm(&mut self.body)?;
                Ok(FlowMonitorRequest {
                    id: id,
                    command: command,
                    flags: flags,
                    out_port: out_port,
                    out_group: out_group,
                    table_id: table_id,
                    pattern: pattern,
                })
            }
        }
    }
}

impl<'a> Iterator for FlowMonitorRequestCursor<'a> {
    type Item = Result<FlowMonitorRequest>;

    fn next(&mut self) -> Option<Result<FlowMonitorRequest>> {
        self.next_request().transpose()
    }
}

fn check_nx_flags(bits: u16, name: &str) -> Result<FlowMonitorFlags> {
    let changes = NxFlowMonitorFlags::ADD | NxFlowMonitorFlags::DELETE |
                  NxFlowMonitorFlags::MODIFY;
    match NxFlowMonitorFlags::from_bits(bits) {
        Some(nx) if nx.intersects(changes) => Ok(nx_to_ofp_flags(bits)),
        _ => {
            warn!("{} has bad flags {:#x}", name, bits);
            Err(OfpError::BadFlags)
        }
    }
}

/// Append `rq` to the flow monitor request message in `msg`, starting a new message for
/// `protocol` if `msg` is empty.
pub fn append_flow_monitor_request(rq: &FlowMonitorRequest,
                                   msg: &mut Vec<u8>,
                                   protocol: Protocol) {
    let version = protocol.version();
    let format = MonitorFormat::of_version(version);
    if msg.is_empty() {
        format.request_raw().put(version, 0, msg);
    }

    match format {
        MonitorFormat::Nx => {
            let mut nxm = vec![];
            let match_len = rq.pattern.put_nxm(&mut nxm);
            msg.write_u32::<BigEndian>(rq.id).unwrap();
            msg.write_u16::<BigEndian>(ofp_to_nx_flags(rq.flags).bits()).unwrap();
            msg.write_u16::<BigEndian>(rq.out_port).unwrap();
            msg.write_u16::<BigEndian>(match_len as u16).unwrap();
            msg.push(rq.table_id);
            msg.extend_from_slice(&[0; 5]);
            msg.extend_from_slice(&nxm);
        }
        MonitorFormat::Onf => {
            let mut oxm = vec![];
            let match_len = rq.pattern.put_oxm(&mut oxm);
            msg.write_u32::<BigEndian>(rq.id).unwrap();
            msg.write_u16::<BigEndian>(ofp_to_nx_flags(rq.flags).bits()).unwrap();
            msg.write_u16::<BigEndian>(match_len as u16).unwrap();
            msg.write_u32::<BigEndian>(port_to_ofp11(rq.out_port)).unwrap();
            msg.push(rq.table_id);
            msg.extend_from_slice(&[0; 3]);
            msg.extend_from_slice(&oxm);
        }
        MonitorFormat::Ofp14 => {
            msg.write_u32::<BigEndian>(rq.id).unwrap();
            msg.write_u32::<BigEndian>(port_to_ofp11(rq.out_port)).unwrap();
            msg.write_u32::<BigEndian>(rq.out_group).unwrap();
            msg.write_u16::<BigEndian>(rq.flags.bits()).unwrap();
            msg.push(rq.table_id);
            msg.push(rq.command.wire());
            rq.pattern.put_oxm(msg);
        }
    }
    OfpHeader::update_length(msg);
}

/// Append a human-readable description of `rq` to `s`.
pub fn format_flow_monitor_request(s: &mut String,
                                   rq: &FlowMonitorRequest,
                                   port_map: &PortMap,
                                   table_map: &TableMap) {
    if rq.command == FlowMonitorCommand::Delete {
        let _ = write!(s, "\n id={} command=delete", rq.id);
        return;
    }
    let _ = write!(s, "\n id={} flags=", rq.id);
    format_bit_names(s, rq.flags.bits() as u32, flag_name, ',');

    if rq.out_port != OFPP_NONE {
        s.push_str(" out_port=");
        format_port(s, rq.out_port, port_map);
    }
    if rq.out_group != 0 && rq.out_group != OFPG_ANY {
        let _ = write!(s, " out_group={}", rq.out_group);
    }
    if rq.table_id != 0xff {
        s.push_str(" table=");
        format_table(s, rq.table_id, table_map);
    }
    s.push(' ');
    rq.pattern.format(s, OFP_DEFAULT_PRIORITY, port_map);
    if s.ends_with(' ') {
        s.pop();
    }
}

/// Source of ids for monitors created from text.
pub trait IdGenerator {
    /// Return a fresh id.
    fn next_id(&self) -> u32;
}

/// Hands out 0, 1, 2, ... from a counter that can be shared between threads.
#[derive(Debug, Default)]
pub struct AtomicIdGenerator {
    next: AtomicU32,
}

impl AtomicIdGenerator {
    pub const fn new() -> AtomicIdGenerator {
        AtomicIdGenerator { next: AtomicU32::new(0) }
    }
}

impl IdGenerator for AtomicIdGenerator {
    fn next_id(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

static DEFAULT_IDS: AtomicIdGenerator = AtomicIdGenerator::new();

/// Parse a flow monitor request from text, taking its id from a process-wide counter.
pub fn parse_flow_monitor_request(s: &str,
                                  port_map: &PortMap,
                                  table_map: &TableMap)
                                  -> std::result::Result<FlowMonitorRequest, ParseError> {
    parse_flow_monitor_request_with(s, &DEFAULT_IDS, port_map, table_map)
}

/// Parse a flow monitor request from text, taking its id from `ids`.
///
/// The text is a list of `key[=value]` pairs: `!initial`, `!add`, `!delete`, `!modify`,
/// `!actions`, `!abbrev` and `!own` clear the corresponding flag; a protocol name such as
/// `tcp` or a match field assignment restricts the match; `table`, `out_port` and
/// `out_group` filter on those.
pub fn parse_flow_monitor_request_with(s: &str,
                                       ids: &dyn IdGenerator,
                                       port_map: &PortMap,
                                       table_map: &TableMap)
                                       -> std::result::Result<FlowMonitorRequest, ParseError> {
    let mut rq = FlowMonitorRequest {
        id: ids.next_id(),
        ..FlowMonitorRequest::default()
    };

    for (name, value) in key_values(s) {
        let cleared = match name {
            "!initial" => Some(FlowMonitorFlags::INITIAL),
            "!add" => Some(FlowMonitorFlags::ADD),
            "!delete" => Some(FlowMonitorFlags::REMOVED),
            "!modify" => Some(FlowMonitorFlags::MODIFY),
            "!actions" => Some(FlowMonitorFlags::INSTRUCTIONS),
            "!abbrev" => Some(FlowMonitorFlags::NO_ABBREV),
            "!own" => Some(FlowMonitorFlags::ONLY_OWN),
            _ => None,
        };
        if let Some(flag) = cleared {
            rq.flags.remove(flag);
        } else if let Some((eth_type, ip_proto)) = parse_protocol(name) {
            rq.pattern.set_exact(Mf::EthType, eth_type as u64);
            if let Some(proto) = ip_proto {
                rq.pattern.set_exact(Mf::IpProto, proto as u64);
            }
        } else if let Some(mf) = Mf::from_name(name) {
            rq.pattern.parse_field(mf, value, port_map).map_err(ParseError)?;
            if !mf.of10() {
                return Err(ParseError(format!("{}: match field is not supported for flow \
                                               monitor",
                                              name)));
            }
        } else {
            if value.is_empty() {
                return Err(ParseError(format!("{}: field {} missing value", s, name)));
            }
            match name {
                "table" => {
                    rq.table_id = parse_table(value, table_map)
                        .ok_or_else(|| ParseError(format!("unknown table \"{}\"", value)))?;
                }
                "out_port" => {
                    rq.out_port = parse_port(value, port_map)
                        .ok_or_else(|| ParseError(format!("{}: unknown port", value)))?;
                }
                "out_group" => {
                    rq.out_group = value.parse::<u32>()
                        .map_err(|_| ParseError(format!("{}: invalid group", value)))?;
                }
                _ => return Err(ParseError(format!("{}: unknown keyword {}", s, name))),
            }
        }
    }
    Ok(rq)
}

/// Nicira and ONF flow monitor cancel: the id of the monitor.
#[repr(packed)]
#[allow(dead_code)]
struct NxFlowMonitorCancel(u32);

/// Encode a request to cancel monitor `id`.
pub fn encode_flow_monitor_cancel(id: u32, protocol: Protocol) -> Vec<u8> {
    let version = protocol.version();
    let mut msg = vec![];
    match MonitorFormat::of_version(version) {
        MonitorFormat::Nx | MonitorFormat::Onf => {
            let raw = if version == Version::Ofp13 {
                OfpRaw::Onft13FlowMonitorCancel
            } else {
                OfpRaw::NxtFlowMonitorCancel
            };
            raw.put(version, 0, &mut msg);
            msg.write_u32::<BigEndian>(id).unwrap();
            OfpHeader::update_length(&mut msg);
        }
        MonitorFormat::Ofp14 => {
            let rq = FlowMonitorRequest {
                id: id,
                command: FlowMonitorCommand::Delete,
                ..FlowMonitorRequest::default()
            };
            append_flow_monitor_request(&rq, &mut msg, protocol);
        }
    }
    msg
}

/// Decode a cancel request and return the id of the monitor to cancel.
pub fn decode_flow_monitor_cancel(msg: &[u8]) -> Result<u32> {
    let raw = RawMessage::decode(msg)?;
    match raw.raw {
        OfpRaw::NxtFlowMonitorCancel | OfpRaw::Onft13FlowMonitorCancel => {
            let mut body = raw.body;
            if body.len() != size_of::<NxFlowMonitorCancel>() {
                warn!("{} has length {}", raw.raw.name(), msg.len());
                return Err(OfpError::BadLength);
            }
            Ok(body.read_u32::<BigEndian>()?)
        }
        OfpRaw::Ofpst14FlowMonitorRequest => {
            let mut cursor = FlowMonitorRequestCursor::new(msg)?;
            match cursor.next_request()? {
                Some(ref rq) if rq.command == FlowMonitorCommand::Delete => Ok(rq.id),
                Some(_) => Err(OfpError::BadCommand),
                None => Err(OfpError::BadLength),
            }
        }
        _ => Err(OfpError::BadType),
    }
}

/// Flow monitoring stopped or restarted because the switch's buffers filled or drained.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MonitorPause {
    Paused,
    Resumed,
}

impl MonitorPause {
    fn event(self) -> OfpFlowUpdateEvent {
        match self {
            MonitorPause::Paused => OfpFlowUpdateEvent::Paused,
            MonitorPause::Resumed => OfpFlowUpdateEvent::Resumed,
        }
    }
}

/// Encode a paused or resumed notification, with xid 0.
pub fn encode_flow_monitor_pause(pause: MonitorPause, protocol: Protocol) -> Vec<u8> {
    let version = protocol.version();
    let mut msg = vec![];
    let raw = match (MonitorFormat::of_version(version), pause) {
        (MonitorFormat::Nx, MonitorPause::Paused) => OfpRaw::NxtFlowMonitorPaused,
        (MonitorFormat::Nx, MonitorPause::Resumed) => OfpRaw::NxtFlowMonitorResumed,
        (MonitorFormat::Onf, MonitorPause::Paused) => OfpRaw::Onft13FlowMonitorPaused,
        (MonitorFormat::Onf, MonitorPause::Resumed) => OfpRaw::Onft13FlowMonitorResumed,
        (MonitorFormat::Ofp14, _) => OfpRaw::Ofpst14FlowMonitorReply,
    };
    raw.put(version, 0, &mut msg);
    if raw == OfpRaw::Ofpst14FlowMonitorReply {
        msg.write_u16::<BigEndian>(8).unwrap();
        msg.write_u16::<BigEndian>(pause.event() as u16).unwrap();
        msg.extend_from_slice(&[0; 4]);
    }
    OfpHeader::update_length(&mut msg);
    msg
}

/// Decode a paused or resumed notification.
pub fn decode_flow_monitor_pause(msg: &[u8]) -> Result<MonitorPause> {
    let raw = RawMessage::decode(msg)?;
    match raw.raw {
        OfpRaw::NxtFlowMonitorPaused | OfpRaw::Onft13FlowMonitorPaused => Ok(MonitorPause::Paused),
        OfpRaw::NxtFlowMonitorResumed | OfpRaw::Onft13FlowMonitorResumed => {
            Ok(MonitorPause::Resumed)
        }
        OfpRaw::Ofpst14FlowMonitorReply => {
            let mut cursor = FlowUpdateCursor::new(msg)?;
            let mut ofpacts = vec![];
            match cursor.next_update(&mut ofpacts)? {
                Some(FlowUpdate::Paused) => Ok(MonitorPause::Paused),
                Some(FlowUpdate::Resumed) => Ok(MonitorPause::Resumed),
                Some(_) => Err(OfpError::BadEvent),
                None => Err(OfpError::BadLength),
            }
        }
        _ => Err(OfpError::BadType),
    }
}
