use std::collections::HashMap;
use std::fmt::Write;

use crate::ofp_errors::{OfpError, Result};

/// Reserved OpenFlow 1.0 port numbers. Later versions use the same values offset by
/// `0xffff0000` in a 32-bit field.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OfpPort {
    Max = 0xff00,
    InPort = 0xfff8,
    Table = 0xfff9,
    Normal = 0xfffa,
    Flood = 0xfffb,
    All = 0xfffc,
    Controller = 0xfffd,
    Local = 0xfffe,
    None = 0xffff,
}

/// Port value meaning "no port"; also spelled `ANY`.
pub const OFPP_NONE: u16 = OfpPort::None as u16;

const OFPP11_MAX: u32 = 0xffff_ff00;
const OFPP11_OFFSET: u32 = 0xffff_0000;

const RESERVED: [(OfpPort, &str); 8] = [(OfpPort::InPort, "IN_PORT"),
                                        (OfpPort::Table, "TABLE"),
                                        (OfpPort::Normal, "NORMAL"),
                                        (OfpPort::Flood, "FLOOD"),
                                        (OfpPort::All, "ALL"),
                                        (OfpPort::Controller, "CONTROLLER"),
                                        (OfpPort::Local, "LOCAL"),
                                        (OfpPort::None, "ANY")];

/// Convert a 32-bit OpenFlow 1.1+ port number into the 16-bit form.
pub fn port_from_ofp11(port: u32) -> Result<u16> {
    if port < OfpPort::Max as u32 {
        Ok(port as u16)
    } else if port >= OFPP11_MAX {
        Ok((port - OFPP11_OFFSET) as u16)
    } else {
        Err(OfpError::BadOutPort)
    }
}

/// Convert a 16-bit port number into the 32-bit OpenFlow 1.1+ form.
pub fn port_to_ofp11(port: u16) -> u32 {
    if port < OfpPort::Max as u16 {
        port as u32
    } else {
        port as u32 + OFPP11_OFFSET
    }
}

/// Names for switch ports, used when printing and parsing.
#[derive(Clone, Debug, Default)]
pub struct PortMap {
    by_name: HashMap<String, u16>,
    by_number: HashMap<u16, String>,
}

impl PortMap {
    pub fn new() -> PortMap {
        PortMap::default()
    }

    pub fn insert(&mut self, port: u16, name: &str) {
        self.by_name.insert(name.to_string(), port);
        self.by_number.insert(port, name.to_string());
    }

    pub fn name(&self, port: u16) -> Option<&str> {
        self.by_number.get(&port).map(|s| s.as_str())
    }
}

/// Append a human-readable form of `port` to `s`.
pub fn format_port(s: &mut String, port: u16, port_map: &PortMap) {
    if let Some(&(_, name)) = RESERVED.iter().find(|&&(p, _)| p as u16 == port) {
        s.push_str(name);
    } else if let Some(name) = port_map.name(port) {
        let _ = write!(s, "\"{}\"", name);
    } else {
        let _ = write!(s, "{}", port);
    }
}

/// Parse a port number, a reserved port name or a name from `port_map`.
pub fn parse_port(value: &str, port_map: &PortMap) -> Option<u16> {
    let unquoted = value.trim_matches('"');
    if let Ok(p) = unquoted.parse::<u16>() {
        return Some(p);
    }
    let upper = unquoted.to_ascii_uppercase();
    if upper == "NONE" {
        return Some(OFPP_NONE);
    }
    if let Some(&(p, _)) = RESERVED.iter().find(|&&(_, name)| name == upper) {
        return Some(p as u16);
    }
    port_map.by_name.get(unquoted).cloned()
}
