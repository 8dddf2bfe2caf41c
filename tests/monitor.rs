extern crate ofp_monitor;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use ofp_monitor::flow_monitor::{append_flow_monitor_request, decode_flow_monitor_cancel,
                                decode_flow_monitor_pause, encode_flow_monitor_cancel,
                                encode_flow_monitor_pause, FlowMonitorCommand,
                                FlowMonitorRequest, FlowMonitorRequestCursor, MonitorPause};
use ofp_monitor::flow_removed::{decode_flow_removed, encode_flow_removed, FlowRemoved,
                                FlowRemovedReason};
use ofp_monitor::flow_update::{FlowUpdate, FlowUpdateCursor, FlowUpdateFull, FlowUpdateReplies,
                               FullUpdateEvent};
use ofp_monitor::group_meter::{GroupMod, GroupModCommand, GroupType, MeterFlags, MeterMod,
                               MeterModCommand};
use ofp_monitor::monitor_flags::FlowMonitorFlags;
use ofp_monitor::ofp_actions::{put_apply_actions, put_output};
use ofp_monitor::ofp_errors::OfpError;
use ofp_monitor::ofp_header::OfpHeader;
use ofp_monitor::ofp_match::{MatchField, Mf, Pattern};
use ofp_monitor::ofp_message::{OfpRaw, RawMessage};
use ofp_monitor::ofp_protocol::{Protocol, Version};
use ofp_monitor::request_forward::{decode_request_forward, encode_request_forward,
                                   ForwardedMod, RequestForward};

const MONITOR_PROTOCOLS: [Protocol; 4] =
    [Protocol::Of10Nxm, Protocol::Of13Oxm, Protocol::Of14Oxm, Protocol::Of15Oxm];

fn requests() -> Vec<FlowMonitorRequest> {
    let mut ip = Pattern::match_all();
    ip.set_exact(Mf::EthType, 0x0800);
    vec![FlowMonitorRequest { id: 1, ..FlowMonitorRequest::default() },
         FlowMonitorRequest {
             id: 2,
             table_id: 2,
             out_port: 5,
             pattern: ip,
             ..FlowMonitorRequest::default()
         },
         FlowMonitorRequest {
             id: 3,
             flags: FlowMonitorFlags::ADD,
             ..FlowMonitorRequest::default()
         }]
}

fn pack(requests: &[FlowMonitorRequest], protocol: Protocol) -> Vec<u8> {
    let mut msg = vec![];
    for rq in requests {
        append_flow_monitor_request(rq, &mut msg, protocol);
    }
    msg
}

#[test]
fn packed_requests_come_back_in_order() {
    for &protocol in MONITOR_PROTOCOLS.iter() {
        let requests = requests();
        let msg = pack(&requests, protocol);
        let mut cursor = FlowMonitorRequestCursor::new(&msg).unwrap();
        for rq in &requests {
            assert_eq!(cursor.next_request(), Ok(Some(rq.clone())), "{:?}", protocol);
        }
        assert_eq!(cursor.next_request(), Ok(None));
        assert_eq!(cursor.next_request(), Ok(None));
    }
}

#[test]
fn openflow14_delete_request_packs_with_adds() {
    let mut requests = requests();
    requests.push(FlowMonitorRequest {
        id: 1,
        command: FlowMonitorCommand::Delete,
        ..FlowMonitorRequest::default()
    });
    let msg = pack(&requests, Protocol::Of14Oxm);
    let decoded: Vec<_> = FlowMonitorRequestCursor::new(&msg)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(decoded, requests);
}

/// Set the flags of the first request in a packed message. Every layout puts them at the
/// same offset.
fn set_first_flags(msg: &mut [u8], flags: u16) {
    BigEndian::write_u16(&mut msg[28..30], flags);
}

#[test]
fn request_flags_are_validated() {
    for &protocol in MONITOR_PROTOCOLS.iter() {
        let mut msg = pack(&requests()[2..], protocol);
        let decode = |msg: &[u8]| FlowMonitorRequestCursor::new(msg).unwrap().next_request();

        for &flags in &[0x0002, 0x0004, 0x0008] {
            set_first_flags(&mut msg, flags);
            assert!(decode(&msg[..]).is_ok(), "{:?} {:#x}", protocol, flags);
        }
        set_first_flags(&mut msg, 0);
        assert_eq!(decode(&msg[..]), Err(OfpError::BadFlags), "{:?}", protocol);
        set_first_flags(&mut msg, 0x8002);
        assert_eq!(decode(&msg[..]), Err(OfpError::BadFlags), "{:?}", protocol);
        // Initial alone asks for no changes.
        set_first_flags(&mut msg, 0x0001);
        assert_eq!(decode(&msg[..]), Err(OfpError::BadFlags), "{:?}", protocol);
    }
}

#[test]
fn request_padding_must_be_zero() {
    for &(protocol, offset) in &[(Protocol::Of10Nxm, 35), (Protocol::Of13Oxm, 37)] {
        let mut msg = pack(&requests()[..1], protocol);
        msg[offset] = 1;
        let mut cursor = FlowMonitorRequestCursor::new(&msg).unwrap();
        assert_eq!(cursor.next_request(), Err(OfpError::MustBeZero));
        assert_eq!(cursor.next_request(), Ok(None));
    }
}

fn instructions(port: u16, version: Version) -> Vec<u8> {
    let mut actions = vec![];
    put_output(&mut actions, port, 0, version);
    if version < Version::Ofp13 {
        return actions;
    }
    let mut insts = vec![];
    put_apply_actions(&mut insts, &actions);
    insts
}

fn updates<'a>(ofpacts: &'a [u8]) -> Vec<FlowUpdate<'a>> {
    let mut pattern = Pattern::match_all();
    pattern.set_exact(Mf::EthType, 0x0806);
    let full = FlowUpdateFull {
        event: FullUpdateEvent::Added,
        table_id: 1,
        cookie: 0xfeed,
        priority: 0x8000,
        idle_timeout: 5,
        hard_timeout: 50,
        pattern: pattern,
        ofpacts: ofpacts,
    };
    vec![FlowUpdate::Full(full.clone()),
         FlowUpdate::Abbrev { xid: 0x1234 },
         FlowUpdate::Full(FlowUpdateFull {
             event: FullUpdateEvent::Removed(FlowRemovedReason::IdleTimeout),
             ofpacts: &[],
             ..full.clone()
         }),
         FlowUpdate::Full(FlowUpdateFull { event: FullUpdateEvent::Modified, ..full })]
}

fn reply(updates: &[FlowUpdate], protocol: Protocol) -> Vec<u8> {
    let mut replies = FlowUpdateReplies::start(9, protocol);
    for update in updates {
        replies.append(update);
    }
    let mut msgs = replies.finish();
    assert_eq!(msgs.len(), 1);
    msgs.remove(0)
}

/// Decode every update in `msg`, comparing each with `expected`, and return how many
/// decoded before the message ran out or an error stopped it.
fn check_updates(msg: &[u8], expected: &[FlowUpdate]) -> (usize, Option<OfpError>) {
    let mut cursor = match FlowUpdateCursor::new(msg) {
        Ok(cursor) => cursor,
        Err(e) => return (0, Some(e)),
    };
    let mut ofpacts = vec![];
    let mut n = 0;
    loop {
        match cursor.next_update(&mut ofpacts) {
            Ok(Some(update)) => {
                assert_eq!(&update, &expected[n]);
                n += 1;
            }
            Ok(None) => return (n, None),
            Err(e) => return (n, Some(e)),
        }
    }
}

#[test]
fn updates_round_trip() {
    for &protocol in MONITOR_PROTOCOLS.iter() {
        let ofpacts = instructions(2, protocol.version());
        let updates = updates(&ofpacts);
        let msg = reply(&updates, protocol);
        assert_eq!(check_updates(&msg, &updates), (updates.len(), None), "{:?}", protocol);
    }
}

#[test]
fn initial_becomes_added_on_nicira_layouts() {
    let full = FlowUpdateFull {
        event: FullUpdateEvent::Initial,
        table_id: 0,
        cookie: 0,
        priority: 1,
        idle_timeout: 0,
        hard_timeout: 0,
        pattern: Pattern::match_all(),
        ofpacts: &[],
    };
    for &(protocol, expected) in &[(Protocol::Of10Nxm, FullUpdateEvent::Added),
                                   (Protocol::Of13Oxm, FullUpdateEvent::Added),
                                   (Protocol::Of14Oxm, FullUpdateEvent::Initial)] {
        let msg = reply(&[FlowUpdate::Full(full.clone())], protocol);
        let expected = FlowUpdate::Full(FlowUpdateFull { event: expected, ..full.clone() });
        assert_eq!(check_updates(&msg, &[expected]), (1, None), "{:?}", protocol);
    }
}

/// Offsets, relative to the body, at which each record of a flow update body ends.
fn record_ends(body: &[u8]) -> Vec<usize> {
    let mut ends = vec![];
    let mut ofs = 0;
    while ofs < body.len() {
        ofs += BigEndian::read_u16(&body[ofs..ofs + 2]) as usize;
        ends.push(ofs);
    }
    ends
}

#[test]
fn truncated_updates_never_overrun() {
    for &protocol in MONITOR_PROTOCOLS.iter() {
        let ofpacts = instructions(3, protocol.version());
        let updates = updates(&ofpacts);
        let msg = reply(&updates, protocol);
        let header_len = msg.len() - RawMessage::decode(&msg).unwrap().body.len();
        let ends = record_ends(&msg[header_len..]);

        for cut in 0..msg.len() {
            // A header length that overruns the buffer.
            assert!(FlowUpdateCursor::new(&msg[..cut]).is_err());
            if cut < header_len {
                continue;
            }

            let mut short = msg[..cut].to_vec();
            OfpHeader::update_length(&mut short);
            let complete = ends.iter().filter(|&&end| end <= cut - header_len).count();
            let (n, err) = check_updates(&short, &updates);
            assert_eq!(n, complete, "{:?} cut at {}", protocol, cut);
            if cut == header_len || ends.contains(&(cut - header_len)) {
                assert_eq!(err, None, "{:?} cut at {}", protocol, cut);
            } else {
                assert_eq!(err, Some(OfpError::BadLength), "{:?} cut at {}", protocol, cut);
            }
        }
    }
}

#[test]
fn truncated_requests_never_overrun() {
    for &protocol in MONITOR_PROTOCOLS.iter() {
        let requests = requests();
        let msg = pack(&requests, protocol);
        let ends: Vec<usize> = (1..requests.len())
            .map(|n| pack(&requests[..n], protocol).len())
            .collect();
        let header_len = msg.len() - RawMessage::decode(&msg).unwrap().body.len();
        for cut in header_len + 1..msg.len() {
            let mut short = msg[..cut].to_vec();
            OfpHeader::update_length(&mut short);
            let results: Vec<_> = FlowMonitorRequestCursor::new(&short).unwrap().collect();
            let complete = ends.iter().filter(|&&end| end <= cut).count();
            for (rq, expected) in results.iter().zip(&requests[..complete]) {
                assert_eq!(rq.as_ref(), Ok(expected));
            }
            if ends.contains(&cut) {
                assert_eq!(results.len(), complete, "{:?} cut at {}", protocol, cut);
            } else {
                assert_eq!(results.len(), complete + 1, "{:?} cut at {}", protocol, cut);
                assert!(results[complete].is_err(), "{:?} cut at {}", protocol, cut);
            }
        }
    }
}

#[test]
fn openflow14_added_then_paused() {
    let mut msg = vec![];
    OfpRaw::Ofpst14FlowMonitorReply.put(Version::Ofp14, 1, &mut msg);
    assert_eq!(&msg[..2], &[0x05, 19]);
    assert_eq!(&msg[8..10], &[0, 16]);

    // Added: table 3, cookie 0x10, priority 100, empty match.
    let _ = msg.write_u16::<BigEndian>(32);
    let _ = msg.write_u16::<BigEndian>(1);
    msg.extend_from_slice(&[3, 0, 0, 0, 0, 0, 0, 100, 0, 0, 0, 0]);
    let _ = msg.write_u64::<BigEndian>(0x10);
    msg.extend_from_slice(&[0, 1, 0, 4, 0, 0, 0, 0]);
    // Paused.
    msg.extend_from_slice(&[0, 8, 0, 5, 0, 0, 0, 0]);
    OfpHeader::update_length(&mut msg);

    let mut cursor = FlowUpdateCursor::new(&msg).unwrap();
    assert_eq!(cursor.version(), Version::Ofp14);
    let mut ofpacts = vec![];
    let added = FlowUpdateFull {
        event: FullUpdateEvent::Added,
        table_id: 3,
        cookie: 0x10,
        priority: 100,
        idle_timeout: 0,
        hard_timeout: 0,
        pattern: Pattern::match_all(),
        ofpacts: &[],
    };
    assert_eq!(cursor.next_update(&mut ofpacts), Ok(Some(FlowUpdate::Full(added))));
    assert_eq!(cursor.next_update(&mut ofpacts), Ok(Some(FlowUpdate::Paused)));
    assert_eq!(cursor.next_update(&mut ofpacts), Ok(None));
}

#[test]
fn unknown_event_is_rejected() {
    let msg = encode_flow_monitor_pause(MonitorPause::Resumed, Protocol::Of14Oxm);
    let mut bad = msg.clone();
    bad[16 + 3] = 7;
    let mut ofpacts = vec![];
    assert_eq!(FlowUpdateCursor::new(&bad).unwrap().next_update(&mut ofpacts),
               Err(OfpError::BadEvent));
    assert_eq!(decode_flow_monitor_pause(&msg), Ok(MonitorPause::Resumed));
}

#[test]
fn cancel_and_pause_per_protocol() {
    for &protocol in MONITOR_PROTOCOLS.iter() {
        let cancel = encode_flow_monitor_cancel(0x77, protocol);
        assert_eq!(decode_flow_monitor_cancel(&cancel), Ok(0x77), "{:?}", protocol);
        for &pause in &[MonitorPause::Paused, MonitorPause::Resumed] {
            let msg = encode_flow_monitor_pause(pause, protocol);
            assert_eq!(decode_flow_monitor_pause(&msg), Ok(pause), "{:?}", protocol);
        }
    }
    assert_eq!(encode_flow_monitor_pause(MonitorPause::Paused, Protocol::Of14Oxm).len(), 24);
}

fn flow_removed() -> FlowRemoved {
    let mut pattern = Pattern::match_all();
    pattern.set_exact(Mf::EthType, 0x86dd);
    FlowRemoved {
        pattern: pattern,
        cookie: 0x1122_3344,
        priority: 7,
        reason: FlowRemovedReason::Delete,
        table_id: 255,
        duration_sec: 3,
        duration_nsec: 4,
        idle_timeout: 10,
        hard_timeout: 0,
        packet_count: 1,
        byte_count: 64,
    }
}

#[test]
fn flow_removed_round_trips_everywhere() {
    let protocols = [Protocol::Of10Std,
                     Protocol::Of10StdTid,
                     Protocol::Of10Nxm,
                     Protocol::Of10NxmTid,
                     Protocol::Of11Std,
                     Protocol::Of12Oxm,
                     Protocol::Of13Oxm,
                     Protocol::Of14Oxm,
                     Protocol::Of15Oxm];
    let fr = flow_removed();
    for &protocol in protocols.iter() {
        let msg = encode_flow_removed(&fr, protocol);
        assert_eq!(decode_flow_removed(&msg), Ok(fr.clone()), "{:?}", protocol);
    }
}

#[test]
fn nicira_table_id_bias() {
    let mut fr = flow_removed();
    let msg = encode_flow_removed(&fr, Protocol::Of10Nxm);
    assert_eq!(msg[27], 0);
    assert_eq!(decode_flow_removed(&msg).unwrap().table_id, 255);

    fr.table_id = 0;
    let msg = encode_flow_removed(&fr, Protocol::Of10Nxm);
    assert_eq!(msg[27], 1);
    assert_eq!(decode_flow_removed(&msg).unwrap().table_id, 0);
}

#[test]
fn meter_delete_is_delete_before_openflow14() {
    let mut fr = flow_removed();
    fr.reason = FlowRemovedReason::MeterDelete;
    let msg = encode_flow_removed(&fr, Protocol::Of11Std);
    assert_eq!(msg[18], FlowRemovedReason::Delete.wire());
    assert_eq!(decode_flow_removed(&msg).unwrap().reason, FlowRemovedReason::Delete);
}

#[test]
fn request_forward_inner_version_mismatch() {
    let mut inner = vec![Version::Ofp10.wire(), 15, 0, 16, 0, 0, 0, 5];
    inner.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 1]);
    let mut msg = vec![];
    OfpRaw::Onft13RequestForward.put(Version::Ofp13, 0, &mut msg);
    msg.extend_from_slice(&inner);
    OfpHeader::update_length(&mut msg);
    assert_eq!(decode_request_forward(&msg), Err(OfpError::VersionMismatch));
}

/// Every proper prefix of `msg` must fail to decode, both as cut and with its header length
/// shrunk to match.
fn assert_prefixes_rejected<T, F>(msg: &[u8], what: &str, decode: F)
    where T: std::fmt::Debug,
          F: Fn(&[u8]) -> Result<T, OfpError>
{
    let header_len = msg.len() - RawMessage::decode(msg).unwrap().body.len();
    for cut in 0..msg.len() {
        assert!(decode(&msg[..cut]).is_err(), "{} cut at {}", what, cut);
        if cut < header_len {
            continue;
        }
        let mut short = msg[..cut].to_vec();
        OfpHeader::update_length(&mut short);
        assert!(decode(&short).is_err(), "{} cut at {} with length {}", what, cut, cut);
    }
}

#[test]
fn truncated_flow_removed_never_overruns() {
    let mut fr = flow_removed();
    fr.pattern = Pattern::match_all();
    fr.pattern.set_exact(Mf::EthType, 0x0800);
    fr.pattern.set_exact(Mf::IpProto, 17);
    fr.pattern.set(MatchField::basic(Mf::Ipv4Src, &[192, 168, 0, 0], Some(&[255, 255, 0, 0])));
    fr.pattern.set_exact(Mf::UdpDst, 53);
    // One protocol per layout, plus both OpenFlow 1.1 match types.
    for &protocol in &[Protocol::Of10Std,
                       Protocol::Of10Nxm,
                       Protocol::Of11Std,
                       Protocol::Of13Oxm,
                       Protocol::Of15Oxm] {
        let msg = encode_flow_removed(&fr, protocol);
        assert_eq!(decode_flow_removed(&msg), Ok(fr.clone()), "{:?}", protocol);
        assert_prefixes_rejected(&msg, &format!("{:?}", protocol), decode_flow_removed);
    }
}

#[test]
fn truncated_request_forward_never_overruns() {
    let group = GroupMod {
        command: GroupModCommand::Add,
        group_type: GroupType::All,
        group_id: 10,
        command_bucket_id: 0xffff_ffff,
        buckets: vec![],
        properties: vec![],
    };
    let mut meter = MeterMod {
        command: MeterModCommand::Modify,
        flags: MeterFlags::PKTPS,
        meter_id: 3,
        bands: vec![],
    };
    meter.push_drop_band(100, 0);

    let cases = [(Protocol::Of11Std, ForwardedMod::GroupMod(group.clone())),
                 (Protocol::Of13Oxm, ForwardedMod::MeterMod(meter)),
                 (Protocol::Of14Oxm, ForwardedMod::GroupMod(group.clone())),
                 (Protocol::Of15Oxm,
                  ForwardedMod::GroupMod(GroupMod { command: GroupModCommand::Delete, ..group }))];
    for &(protocol, ref body) in cases.iter() {
        let rf = RequestForward {
            xid: 8,
            body: body.clone(),
            group_existed: None,
            new_buckets: None,
        };
        let msg = encode_request_forward(&rf, protocol);
        assert_eq!(decode_request_forward(&msg), Ok(rf.clone()), "{:?}", protocol);
        assert_prefixes_rejected(&msg, &format!("{:?}", protocol), decode_request_forward);
    }
}
