use std::fmt;
use std::str::FromStr;

/// OpenFlow wire protocol version, as carried in the `version` field of every header.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    Ofp10 = 0x01,
    Ofp11 = 0x02,
    Ofp12 = 0x03,
    Ofp13 = 0x04,
    Ofp14 = 0x05,
    Ofp15 = 0x06,
}

impl Version {
    pub fn of_wire(v: u8) -> Option<Version> {
        match v {
            0x01 => Some(Version::Ofp10),
            0x02 => Some(Version::Ofp11),
            0x03 => Some(Version::Ofp12),
            0x04 => Some(Version::Ofp13),
            0x05 => Some(Version::Ofp14),
            0x06 => Some(Version::Ofp15),
            _ => None,
        }
    }

    pub fn wire(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            Version::Ofp10 => "OpenFlow10",
            Version::Ofp11 => "OpenFlow11",
            Version::Ofp12 => "OpenFlow12",
            Version::Ofp13 => "OpenFlow13",
            Version::Ofp14 => "OpenFlow14",
            Version::Ofp15 => "OpenFlow15",
        };
        write!(f, "{}", s)
    }
}

/// A negotiated protocol: an OpenFlow version plus, for OpenFlow 1.0, the flow format in use.
///
/// The `Std` protocols use the standard OpenFlow 1.0 match, the `Nxm` protocols the Nicira
/// extensible match. `Tid` means the flow_mod table id extension is enabled, which does not
/// change any layout handled here.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Of10Std,
    Of10StdTid,
    Of10Nxm,
    Of10NxmTid,
    Of11Std,
    Of12Oxm,
    Of13Oxm,
    Of14Oxm,
    Of15Oxm,
}

impl Protocol {
    /// The OpenFlow version spoken under `self`.
    pub fn version(self) -> Version {
        match self {
            Protocol::Of10Std | Protocol::Of10StdTid | Protocol::Of10Nxm |
            Protocol::Of10NxmTid => Version::Ofp10,
            Protocol::Of11Std => Version::Ofp11,
            Protocol::Of12Oxm => Version::Ofp12,
            Protocol::Of13Oxm => Version::Ofp13,
            Protocol::Of14Oxm => Version::Ofp14,
            Protocol::Of15Oxm => Version::Ofp15,
        }
    }

    /// The default protocol for `version`.
    pub fn of_version(version: Version) -> Protocol {
        match version {
            Version::Ofp10 => Protocol::Of10Std,
            Version::Ofp11 => Protocol::Of11Std,
            Version::Ofp12 => Protocol::Of12Oxm,
            Version::Ofp13 => Protocol::Of13Oxm,
            Version::Ofp14 => Protocol::Of14Oxm,
            Version::Ofp15 => Protocol::Of15Oxm,
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Protocol, String> {
        match s.to_ascii_lowercase().as_str() {
            "of10" | "openflow10" | "of10-std" => Ok(Protocol::Of10Std),
            "of10-std-tid" => Ok(Protocol::Of10StdTid),
            "of10-nxm" | "nxm" => Ok(Protocol::Of10Nxm),
            "of10-nxm-tid" => Ok(Protocol::Of10NxmTid),
            "of11" | "openflow11" => Ok(Protocol::Of11Std),
            "of12" | "openflow12" => Ok(Protocol::Of12Oxm),
            "of13" | "openflow13" => Ok(Protocol::Of13Oxm),
            "of14" | "openflow14" => Ok(Protocol::Of14Oxm),
            "of15" | "openflow15" => Ok(Protocol::Of15Oxm),
            _ => Err(format!("unknown protocol \"{}\"", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_are_ordered_by_revision() {
        assert!(Version::Ofp10 < Version::Ofp13);
        assert!(Protocol::Of14Oxm.version() >= Version::Ofp14);
        assert_eq!(Version::of_wire(0x04), Some(Version::Ofp13));
        assert_eq!(Version::of_wire(0x07), None);
    }

    #[test]
    fn parse_protocol_names() {
        assert_eq!("of10-nxm".parse::<Protocol>(), Ok(Protocol::Of10Nxm));
        assert_eq!("OpenFlow15".parse::<Protocol>(), Ok(Protocol::Of15Oxm));
        assert!("of16".parse::<Protocol>().is_err());
    }
}
