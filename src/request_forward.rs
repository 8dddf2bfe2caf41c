//! Request forwarding: a switch tells its other controllers about a group or meter change
//! made by one of them, by wrapping the request itself in a request forward message.

use byteorder::{BigEndian, ByteOrder};
use log::warn;

use crate::group_meter::{GroupMod, MeterMod};
use crate::ofp_errors::{OfpError, Result};
use crate::ofp_header::OfpHeader;
use crate::ofp_message::{OfpMessage, OfpRaw, RawMessage};
use crate::ofp_port::PortMap;
use crate::ofp_protocol::{Protocol, Version};

/// Why a request was forwarded.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RequestForwardReason {
    GroupMod = 0,
    MeterMod = 1,
}

/// The forwarded request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ForwardedMod {
    GroupMod(GroupMod),
    MeterMod(MeterMod),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestForward<'a> {
    /// Xid of the forwarded request.
    pub xid: u32,
    pub body: ForwardedMod,
    /// Whether the group existed before the change. Only needed to forward an OpenFlow 1.5
    /// bucket command to an older controller.
    pub group_existed: Option<bool>,
    /// The group's buckets after an OpenFlow 1.5 bucket command, for older controllers.
    pub new_buckets: Option<&'a [u8]>,
}

impl<'a> RequestForward<'a> {
    pub fn reason(&self) -> RequestForwardReason {
        match self.body {
            ForwardedMod::GroupMod(_) => RequestForwardReason::GroupMod,
            ForwardedMod::MeterMod(_) => RequestForwardReason::MeterMod,
        }
    }
}

fn outer_raw(version: Version) -> OfpRaw {
    if version < Version::Ofp13 {
        OfpRaw::NxtRequestForward
    } else if version == Version::Ofp13 {
        OfpRaw::Onft13RequestForward
    } else {
        OfpRaw::Ofpt14RequestForward
    }
}

/// Encode `rf` for `protocol`, with xid 0.
///
/// # Panics
///
/// If the forwarded request does not exist in `protocol`, such as a meter modification
/// before OpenFlow 1.3 or any group modification in OpenFlow 1.0.
pub fn encode_request_forward(rf: &RequestForward, protocol: Protocol) -> Vec<u8> {
    let version = protocol.version();
    let mut inner = match rf.body {
        ForwardedMod::GroupMod(ref gm) => {
            gm.encode(version, rf.xid, rf.new_buckets, rf.group_existed)
        }
        ForwardedMod::MeterMod(ref mm) => MeterMod::marshal(mm, version, rf.xid),
    };
    OfpHeader::set_xid(&mut inner, rf.xid);
    OfpHeader::update_length(&mut inner);

    let mut msg = vec![];
    outer_raw(version).put(version, 0, &mut msg);
    msg.extend_from_slice(&inner);
    OfpHeader::update_length(&mut msg);
    msg
}

/// Decode the request forward message `msg` and the request inside it.
pub fn decode_request_forward(msg: &[u8]) -> Result<RequestForward<'static>> {
    let outer = RawMessage::decode(msg)?;
    match outer.raw {
        OfpRaw::NxtRequestForward | OfpRaw::Onft13RequestForward |
        OfpRaw::Ofpt14RequestForward => (),
        _ => return Err(OfpError::BadType),
    }

    let body = outer.body;
    if body.len() < OfpHeader::size() {
        return Err(OfpError::MsgBadLength);
    }
    let inner_len = BigEndian::read_u16(&body[2..4]) as usize;
    if inner_len < OfpHeader::size() || inner_len > body.len() {
        return Err(OfpError::MsgBadLength);
    }
    let inner = &body[..inner_len];
    if inner[0] != outer.version.wire() {
        warn!("{} of version {:#x} carries a message of version {:#x}",
              outer.raw.name(),
              outer.version.wire(),
              inner[0]);
        return Err(OfpError::VersionMismatch);
    }

    let raw = match RawMessage::decode(inner) {
        Ok(m) => Some(m.raw),
        Err(OfpError::BadLength) => return Err(OfpError::BadLength),
        Err(_) => None,
    };
    let body = match raw {
        Some(OfpRaw::Ofpt11GroupMod) => ForwardedMod::GroupMod(GroupMod::parse(inner)?),
        Some(OfpRaw::Ofpt13MeterMod) => ForwardedMod::MeterMod(MeterMod::parse(inner)?),
        _ => return Err(OfpError::UnsupportedBody),
    };
    Ok(RequestForward {
        xid: BigEndian::read_u32(&inner[4..8]),
        body: body,
        group_existed: None,
        new_buckets: None,
    })
}

/// Append a human-readable description of `rf`, read under `version`, to `s`.
pub fn format_request_forward(s: &mut String,
                              version: Version,
                              rf: &RequestForward,
                              port_map: &PortMap) {
    s.push_str(" reason=");
    match rf.body {
        ForwardedMod::GroupMod(ref gm) => {
            s.push_str("group_mod");
            gm.format(s, version, port_map);
        }
        ForwardedMod::MeterMod(ref mm) => {
            s.push_str("meter_mod");
            mm.format(s);
        }
    }
}
