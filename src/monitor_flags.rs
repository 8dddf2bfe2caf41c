//! Flow monitor flags and update events, in the standard OpenFlow 1.4 numbering and in the
//! Nicira numbering that the NX and ONF extensions share.

use bitflags::bitflags;

bitflags! {
    /// What a flow monitor reports. Every request carries its flags in this form.
    #[derive(Default)]
    pub struct FlowMonitorFlags: u16 {
        /// Report flows already in the table when the monitor is added.
        const INITIAL = 1 << 0;
        const ADD = 1 << 1;
        const REMOVED = 1 << 2;
        const MODIFY = 1 << 3;
        /// Include instructions (actions) in full updates.
        const INSTRUCTIONS = 1 << 4;
        /// Never send abbreviated updates.
        const NO_ABBREV = 1 << 5;
        /// Only report changes made by this controller.
        const ONLY_OWN = 1 << 6;
    }
}

bitflags! {
    /// Nicira flow monitor flags, as carried by NXST and ONFST flow monitor requests.
    pub struct NxFlowMonitorFlags: u16 {
        const INITIAL = 1 << 0;
        const ADD = 1 << 1;
        const DELETE = 1 << 2;
        const MODIFY = 1 << 3;
        const ACTIONS = 1 << 4;
        const OWN = 1 << 5;
    }
}

const FLAG_PAIRS: [(NxFlowMonitorFlags, FlowMonitorFlags); 6] =
    [(NxFlowMonitorFlags::INITIAL, FlowMonitorFlags::INITIAL),
     (NxFlowMonitorFlags::ADD, FlowMonitorFlags::ADD),
     (NxFlowMonitorFlags::DELETE, FlowMonitorFlags::REMOVED),
     (NxFlowMonitorFlags::MODIFY, FlowMonitorFlags::MODIFY),
     (NxFlowMonitorFlags::ACTIONS, FlowMonitorFlags::INSTRUCTIONS),
     (NxFlowMonitorFlags::OWN, FlowMonitorFlags::ONLY_OWN)];

/// Translate Nicira wire flags into the standard form. Bits without a Nicira meaning are
/// dropped.
pub fn nx_to_ofp_flags(bits: u16) -> FlowMonitorFlags {
    let nx = NxFlowMonitorFlags::from_bits_truncate(bits);
    FLAG_PAIRS.iter()
        .filter(|&&(n, _)| nx.contains(n))
        .fold(FlowMonitorFlags::empty(), |acc, &(_, o)| acc | o)
}

/// Translate standard flags into the Nicira form. `NO_ABBREV` has no Nicira equivalent and is
/// dropped.
pub fn ofp_to_nx_flags(flags: FlowMonitorFlags) -> NxFlowMonitorFlags {
    FLAG_PAIRS.iter()
        .filter(|&&(_, o)| flags.contains(o))
        .fold(NxFlowMonitorFlags::empty(), |acc, &(n, _)| acc | n)
}

/// Name of a single standard flag bit, as printed in monitor requests.
pub fn flag_name(bit: u32) -> Option<&'static str> {
    match FlowMonitorFlags::from_bits(bit as u16)? {
        FlowMonitorFlags::INITIAL => Some("initial"),
        FlowMonitorFlags::ADD => Some("add"),
        FlowMonitorFlags::REMOVED => Some("delete"),
        FlowMonitorFlags::MODIFY => Some("modify"),
        FlowMonitorFlags::INSTRUCTIONS => Some("actions"),
        FlowMonitorFlags::NO_ABBREV => Some("no-abbrev"),
        FlowMonitorFlags::ONLY_OWN => Some("own"),
        _ => None,
    }
}

/// Standard flow update event codes.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OfpFlowUpdateEvent {
    Initial = 0,
    Added = 1,
    Removed = 2,
    Modified = 3,
    Abbrev = 4,
    Paused = 5,
    Resumed = 6,
}

impl OfpFlowUpdateEvent {
    pub fn from_wire(code: u16) -> Option<OfpFlowUpdateEvent> {
        match code {
            0 => Some(OfpFlowUpdateEvent::Initial),
            1 => Some(OfpFlowUpdateEvent::Added),
            2 => Some(OfpFlowUpdateEvent::Removed),
            3 => Some(OfpFlowUpdateEvent::Modified),
            4 => Some(OfpFlowUpdateEvent::Abbrev),
            5 => Some(OfpFlowUpdateEvent::Paused),
            6 => Some(OfpFlowUpdateEvent::Resumed),
            _ => None,
        }
    }
}

/// Nicira flow update event codes, shared by the ONF extension.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NxFlowUpdateEvent {
    Added = 0,
    Deleted = 1,
    Modified = 2,
    Abbrev = 3,
}

impl NxFlowUpdateEvent {
    pub fn from_wire(code: u16) -> Option<NxFlowUpdateEvent> {
        match code {
            0 => Some(NxFlowUpdateEvent::Added),
            1 => Some(NxFlowUpdateEvent::Deleted),
            2 => Some(NxFlowUpdateEvent::Modified),
            3 => Some(NxFlowUpdateEvent::Abbrev),
            _ => None,
        }
    }
}

pub fn nx_to_ofp_event(event: NxFlowUpdateEvent) -> OfpFlowUpdateEvent {
    match event {
        NxFlowUpdateEvent::Added => OfpFlowUpdateEvent::Added,
        NxFlowUpdateEvent::Deleted => OfpFlowUpdateEvent::Removed,
        NxFlowUpdateEvent::Modified => OfpFlowUpdateEvent::Modified,
        NxFlowUpdateEvent::Abbrev => OfpFlowUpdateEvent::Abbrev,
    }
}

/// Translate a standard event into the Nicira numbering. `Initial` becomes `Added`, so it
/// does not survive a trip through a Nicira or ONF reply.
///
/// # Panics
///
/// On `Paused` and `Resumed`, which Nicira replies cannot carry.
pub fn ofp_to_nx_event(event: OfpFlowUpdateEvent) -> NxFlowUpdateEvent {
    match event {
        OfpFlowUpdateEvent::Initial |
        OfpFlowUpdateEvent::Added => NxFlowUpdateEvent::Added,
        OfpFlowUpdateEvent::Removed => NxFlowUpdateEvent::Deleted,
        OfpFlowUpdateEvent::Modified => NxFlowUpdateEvent::Modified,
        OfpFlowUpdateEvent::Abbrev => NxFlowUpdateEvent::Abbrev,
        OfpFlowUpdateEvent::Paused |
        OfpFlowUpdateEvent::Resumed => panic!("{:?} has no Nicira event code", event),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_translate_both_ways() {
        let nx = NxFlowMonitorFlags::ADD | NxFlowMonitorFlags::DELETE | NxFlowMonitorFlags::OWN;
        let ofp = nx_to_ofp_flags(nx.bits());
        assert_eq!(ofp,
                   FlowMonitorFlags::ADD | FlowMonitorFlags::REMOVED |
                   FlowMonitorFlags::ONLY_OWN);
        assert_eq!(ofp_to_nx_flags(ofp), nx);
    }

    #[test]
    fn untranslatable_flags_are_dropped() {
        assert_eq!(nx_to_ofp_flags(0xffc0), FlowMonitorFlags::empty());
        assert_eq!(ofp_to_nx_flags(FlowMonitorFlags::NO_ABBREV | FlowMonitorFlags::MODIFY),
                   NxFlowMonitorFlags::MODIFY);
    }

    #[test]
    fn initial_collapses_to_added() {
        assert_eq!(ofp_to_nx_event(OfpFlowUpdateEvent::Initial), NxFlowUpdateEvent::Added);
        assert_eq!(nx_to_ofp_event(ofp_to_nx_event(OfpFlowUpdateEvent::Initial)),
                   OfpFlowUpdateEvent::Added);
        assert_eq!(nx_to_ofp_event(NxFlowUpdateEvent::Deleted), OfpFlowUpdateEvent::Removed);
    }

    #[test]
    #[should_panic]
    fn paused_has_no_nicira_code() {
        ofp_to_nx_event(OfpFlowUpdateEvent::Paused);
    }

    #[test]
    fn wire_codes() {
        assert_eq!(OfpFlowUpdateEvent::from_wire(6), Some(OfpFlowUpdateEvent::Resumed));
        assert_eq!(OfpFlowUpdateEvent::from_wire(7), None);
        assert_eq!(NxFlowUpdateEvent::from_wire(3), Some(NxFlowUpdateEvent::Abbrev));
        assert_eq!(NxFlowUpdateEvent::from_wire(4), None);
        assert_eq!(flag_name(1 << 5), Some("no-abbrev"));
        assert_eq!(flag_name(1 << 9), None);
    }
}
