//! Flow match codecs.
//!
//! A `Pattern` is an ordered list of OXM-style fields. It is read from and written to the
//! three match encodings a flow monitor can meet: the Nicira extensible match (NXM), the
//! OpenFlow 1.2+ extensible match (OXM, wrapped in an `ofp_match` header), and the fixed
//! 40-byte OpenFlow 1.0 match. OpenFlow basic fields are kept in their OXM form; NXM fields
//! with the same meaning are translated on the way in and out. Unknown fields are carried
//! as opaque TLVs.

use std::fmt::Write;
use std::net::{Ipv4Addr, Ipv6Addr};

use byteorder::{BigEndian, ByteOrder, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::bits::{pad_to_8, round_up, test_bit, try_pull};
use crate::ofp_errors::{OfpError, Result};
use crate::ofp_port::{format_port, parse_port, port_from_ofp11, port_to_ofp11, PortMap};

/// OXM class of the OpenFlow basic fields.
pub const OFPXMC_OPENFLOW_BASIC: u16 = 0x8000;
/// NXM class of the Nicira fields that mirror OpenFlow 1.0.
const NXM_OF: u16 = 0x0000;

/// Priority that `Pattern::format` leaves out.
pub const OFP_DEFAULT_PRIORITY: u16 = 0x8000;

const OFPMT_STANDARD: u16 = 0;
const OFPMT_OXM: u16 = 1;

/// Byte-size of an OpenFlow 1.0 match.
pub const OFP10_MATCH_LEN: usize = 40;
/// Byte-size of an OpenFlow 1.1 standard match, header included.
pub const OFP11_MATCH_LEN: usize = 88;

const OFPFW10_IN_PORT: u32 = 1 << 0;
const OFPFW10_DL_VLAN: u32 = 1 << 1;
const OFPFW10_DL_SRC: u32 = 1 << 2;
const OFPFW10_DL_DST: u32 = 1 << 3;
const OFPFW10_DL_TYPE: u32 = 1 << 4;
const OFPFW10_NW_PROTO: u32 = 1 << 5;
const OFPFW10_TP_SRC: u32 = 1 << 6;
const OFPFW10_TP_DST: u32 = 1 << 7;
const OFPFW10_NW_SRC_SHIFT: u32 = 8;
const OFPFW10_NW_DST_SHIFT: u32 = 14;
const OFPFW10_NW_MASK: u32 = 0x3f;
const OFPFW10_DL_VLAN_PCP: u32 = 1 << 20;
const OFPFW10_NW_TOS: u32 = 1 << 21;
const OFPFW10_ALL: u32 = (1 << 22) - 1;

const OFPFW11_IN_PORT: u32 = 1 << 0;
const OFPFW11_DL_VLAN: u32 = 1 << 1;
const OFPFW11_DL_VLAN_PCP: u32 = 1 << 2;
const OFPFW11_DL_TYPE: u32 = 1 << 3;
const OFPFW11_NW_TOS: u32 = 1 << 4;
const OFPFW11_NW_PROTO: u32 = 1 << 5;
const OFPFW11_TP_SRC: u32 = 1 << 6;
const OFPFW11_TP_DST: u32 = 1 << 7;
const OFPFW11_MPLS_LABEL: u32 = 1 << 8;
const OFPFW11_MPLS_TC: u32 = 1 << 9;
const OFPFW11_ALL: u32 = (1 << 10) - 1;

const OFP10_VLAN_NONE: u16 = 0xffff;
const OFPVID11_ANY: u16 = 0xfffe;
const OFPVID11_NONE: u16 = 0xffff;
const OFPVID_PRESENT: u16 = 0x1000;

const ETH_TYPE_IP: u16 = 0x0800;
const ETH_TYPE_ARP: u16 = 0x0806;
const ETH_TYPE_RARP: u16 = 0x8035;
const ETH_TYPE_IPV6: u16 = 0x86dd;
const IPPROTO_ICMP: u8 = 1;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;
const IPPROTO_ICMPV6: u8 = 58;
const IPPROTO_SCTP: u8 = 132;

/// Known OpenFlow basic match fields, in `MF_INFO` order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mf {
    InPort,
    Metadata,
    EthDst,
    EthSrc,
    EthType,
    VlanVid,
    VlanPcp,
    IpDscp,
    IpProto,
    Ipv4Src,
    Ipv4Dst,
    TcpSrc,
    TcpDst,
    UdpSrc,
    UdpDst,
    SctpSrc,
    SctpDst,
    IcmpType,
    IcmpCode,
    ArpOp,
    ArpSpa,
    ArpTpa,
    Ipv6Src,
    Ipv6Dst,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MfFormat {
    Decimal,
    Hex,
    Ethernet,
    Ipv4,
    Ipv6,
    Port,
}

struct MfInfo {
    mf: Mf,
    name: &'static str,
    alias: &'static str,
    oxm: u8,
    width: usize,
    /// NXM_OF field carrying the same value, if any.
    nxm: Option<u8>,
    /// Representable in an OpenFlow 1.0 match.
    of10: bool,
    format: MfFormat,
}

static MF_INFO: [MfInfo; 24] = [
    MfInfo { mf: Mf::InPort, name: "in_port", alias: "in_port", oxm: 0, width: 4, nxm: None, of10: true, format: MfFormat::Port },
    MfInfo { mf: Mf::Metadata, name: "metadata", alias: "metadata", oxm: 2, width: 8, nxm: None, of10: false, format: MfFormat::Hex },
    MfInfo { mf: Mf::EthDst, name: "dl_dst", alias: "eth_dst", oxm: 3, width: 6, nxm: Some(1), of10: true, format: MfFormat::Ethernet },
    MfInfo { mf: Mf::EthSrc, name: "dl_src", alias: "eth_src", oxm: 4, width: 6, nxm: Some(2), of10: true, format: MfFormat::Ethernet },
    MfInfo { mf: Mf::EthType, name: "dl_type", alias: "eth_type", oxm: 5, width: 2, nxm: Some(3), of10: true, format: MfFormat::Hex },
    MfInfo { mf: Mf::VlanVid, name: "vlan_vid", alias: "dl_vlan", oxm: 6, width: 2, nxm: None, of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::VlanPcp, name: "dl_vlan_pcp", alias: "vlan_pcp", oxm: 7, width: 1, nxm: None, of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::IpDscp, name: "ip_dscp", alias: "ip_dscp", oxm: 8, width: 1, nxm: None, of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::IpProto, name: "nw_proto", alias: "ip_proto", oxm: 10, width: 1, nxm: Some(6), of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::Ipv4Src, name: "nw_src", alias: "ip_src", oxm: 11, width: 4, nxm: Some(7), of10: true, format: MfFormat::Ipv4 },
    MfInfo { mf: Mf::Ipv4Dst, name: "nw_dst", alias: "ip_dst", oxm: 12, width: 4, nxm: Some(8), of10: true, format: MfFormat::Ipv4 },
    MfInfo { mf: Mf::TcpSrc, name: "tcp_src", alias: "tcp_src", oxm: 13, width: 2, nxm: Some(9), of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::TcpDst, name: "tcp_dst", alias: "tcp_dst", oxm: 14, width: 2, nxm: Some(10), of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::UdpSrc, name: "udp_src", alias: "udp_src", oxm: 15, width: 2, nxm: Some(11), of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::UdpDst, name: "udp_dst", alias: "udp_dst", oxm: 16, width: 2, nxm: Some(12), of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::SctpSrc, name: "sctp_src", alias: "sctp_src", oxm: 17, width: 2, nxm: None, of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::SctpDst, name: "sctp_dst", alias: "sctp_dst", oxm: 18, width: 2, nxm: None, of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::IcmpType, name: "icmp_type", alias: "icmp_type", oxm: 19, width: 1, nxm: Some(13), of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::IcmpCode, name: "icmp_code", alias: "icmp_code", oxm: 20, width: 1, nxm: Some(14), of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::ArpOp, name: "arp_op", alias: "arp_op", oxm: 21, width: 2, nxm: Some(15), of10: true, format: MfFormat::Decimal },
    MfInfo { mf: Mf::ArpSpa, name: "arp_spa", alias: "arp_spa", oxm: 22, width: 4, nxm: Some(16), of10: true, format: MfFormat::Ipv4 },
    MfInfo { mf: Mf::ArpTpa, name: "arp_tpa", alias: "arp_tpa", oxm: 23, width: 4, nxm: Some(17), of10: true, format: MfFormat::Ipv4 },
    MfInfo { mf: Mf::Ipv6Src, name: "ipv6_src", alias: "ipv6_src", oxm: 26, width: 16, nxm: None, of10: false, format: MfFormat::Ipv6 },
    MfInfo { mf: Mf::Ipv6Dst, name: "ipv6_dst", alias: "ipv6_dst", oxm: 27, width: 16, nxm: None, of10: false, format: MfFormat::Ipv6 },
];

/// NXM_OF_IN_PORT: a 16-bit port, translated to the 32-bit OXM field.
const NXM_OF_IN_PORT: u8 = 0;

impl Mf {
    fn info(self) -> &'static MfInfo {
        &MF_INFO[self as usize]
    }

    fn of_oxm(field: u8) -> Option<Mf> {
        MF_INFO.iter().find(|i| i.oxm == field).map(|i| i.mf)
    }

    fn of_nxm(field: u8) -> Option<Mf> {
        MF_INFO.iter().find(|i| i.nxm == Some(field)).map(|i| i.mf)
    }

    /// Look up a field by its name or alias.
    pub fn from_name(name: &str) -> Option<Mf> {
        MF_INFO.iter().find(|i| i.name == name || i.alias == name).map(|i| i.mf)
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Byte-size of the field's value.
    pub fn width(self) -> usize {
        self.info().width
    }

    /// True if the field has a place in the OpenFlow 1.0 match.
    pub fn of10(self) -> bool {
        self.info().of10
    }
}

/// Map a protocol keyword such as `tcp` to the Ethernet type and IP protocol it implies.
pub fn parse_protocol(name: &str) -> Option<(u16, Option<u8>)> {
    match name {
        "ip" | "ipv4" => Some((ETH_TYPE_IP, None)),
        "ipv6" => Some((ETH_TYPE_IPV6, None)),
        "icmp" => Some((ETH_TYPE_IP, Some(IPPROTO_ICMP))),
        "icmp6" => Some((ETH_TYPE_IPV6, Some(IPPROTO_ICMPV6))),
        "tcp" => Some((ETH_TYPE_IP, Some(IPPROTO_TCP))),
        "tcp6" => Some((ETH_TYPE_IPV6, Some(IPPROTO_TCP))),
        "udp" => Some((ETH_TYPE_IP, Some(IPPROTO_UDP))),
        "udp6" => Some((ETH_TYPE_IPV6, Some(IPPROTO_UDP))),
        "sctp" => Some((ETH_TYPE_IP, Some(IPPROTO_SCTP))),
        "sctp6" => Some((ETH_TYPE_IPV6, Some(IPPROTO_SCTP))),
        "arp" => Some((ETH_TYPE_ARP, None)),
        "rarp" => Some((ETH_TYPE_RARP, None)),
        _ => None,
    }
}

/// One match field: an OXM/NXM class and field number, a value and an optional mask of the
/// same width.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchField {
    pub class: u16,
    pub field: u8,
    pub value: Vec<u8>,
    pub mask: Option<Vec<u8>>,
}

impl MatchField {
    /// An OpenFlow basic field.
    pub fn basic(mf: Mf, value: &[u8], mask: Option<&[u8]>) -> MatchField {
        MatchField {
            class: OFPXMC_OPENFLOW_BASIC,
            field: mf.info().oxm,
            value: value.to_vec(),
            mask: mask.map(|m| m.to_vec()),
        }
    }

    /// The known field `self` holds, if any.
    pub fn mf(&self) -> Option<Mf> {
        if self.class == OFPXMC_OPENFLOW_BASIC {
            Mf::of_oxm(self.field)
        } else {
            None
        }
    }

    fn sort_key(&self) -> (u16, u8) {
        (self.class, self.field)
    }

    fn put(&self, class: u16, field: u8, value: &[u8], bytes: &mut Vec<u8>) {
        let has_mask = self.mask.is_some();
        let len = value.len() * if has_mask { 2 } else { 1 };
        let header = (class as u32) << 16 | (field as u32) << 9 | (has_mask as u32) << 8 |
                     len as u32;
        bytes.write_u32::<BigEndian>(header).unwrap();
        bytes.extend_from_slice(value);
        if let Some(ref mask) = self.mask {
            bytes.extend_from_slice(mask);
        }
    }

    /// Append the field in NXM form, translating OpenFlow basic fields that have an NXM_OF
    /// twin.
    fn put_nxm(&self, bytes: &mut Vec<u8>) {
        match self.mf() {
            Some(Mf::InPort) if self.mask.is_none() => {
                let mut v: &[u8] = &self.value;
                let port = v.read_u32::<BigEndian>().ok().and_then(|p| port_from_ofp11(p).ok());
                if let Some(port) = port {
                    let mut value = vec![];
                    value.write_u16::<BigEndian>(port).unwrap();
                    return self.put(NXM_OF, NXM_OF_IN_PORT, &value, bytes);
                }
            }
            Some(mf) => {
                if let Some(nxm) = mf.info().nxm {
                    return self.put(NXM_OF, nxm, &self.value, bytes);
                }
            }
            None => (),
        }
        self.put(self.class, self.field, &self.value, bytes)
    }

    fn put_oxm(&self, bytes: &mut Vec<u8>) {
        self.put(self.class, self.field, &self.value, bytes)
    }

    fn pull(buf: &mut &[u8], nxm: bool) -> Result<MatchField> {
        let mut hdr = try_pull(buf, 4).ok_or(OfpError::BadMatchLength)?;
        let header = hdr.read_u32::<BigEndian>()?;
        let class = (header >> 16) as u16;
        let field = ((header >> 9) & 0x7f) as u8;
        let has_mask = test_bit(8, header as u64);
        let len = (header & 0xff) as usize;
        if len == 0 || (has_mask && len % 2 != 0) {
            return Err(OfpError::BadMatchLength);
        }
        let payload = try_pull(buf, len).ok_or(OfpError::BadMatchLength)?;
        let (value, mask) = if has_mask {
            let (v, m) = payload.split_at(len / 2);
            (v.to_vec(), Some(m.to_vec()))
        } else {
            (payload.to_vec(), None)
        };
        let mut mf = MatchField {
            class: class,
            field: field,
            value: value,
            mask: mask,
        };
        if nxm && class == NXM_OF {
            mf = mf.of_nxm()?;
        }
        if let Some(known) = mf.mf() {
            if mf.value.len() != known.width() {
                return Err(OfpError::BadMatchLength);
            }
        }
        Ok(mf)
    }

    /// Translate an NXM_OF field into its OpenFlow basic form, if it has one.
    fn of_nxm(self) -> Result<MatchField> {
        if self.field == NXM_OF_IN_PORT && self.mask.is_none() {
            let mut v: &[u8] = &self.value;
            let port = v.read_u16::<BigEndian>().map_err(|_| OfpError::BadMatchLength)?;
            if self.value.len() != 2 {
                return Err(OfpError::BadMatchLength);
            }
            let mut value = vec![];
            value.write_u32::<BigEndian>(port_to_ofp11(port)).unwrap();
            return Ok(MatchField::basic(Mf::InPort, &value, None));
        }
        match Mf::of_nxm(self.field) {
            Some(mf) => {
                Ok(MatchField {
                    class: OFPXMC_OPENFLOW_BASIC,
                    field: mf.info().oxm,
                    value: self.value,
                    mask: self.mask,
                })
            }
            None => Ok(self),
        }
    }

    fn value_u64(&self) -> u64 {
        self.value.iter().fold(0, |acc, b| acc << 8 | *b as u64)
    }
}

/// Fields to match against flows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pattern {
    fields: Vec<MatchField>,
}

impl Pattern {
    /// A pattern that matches every packet.
    pub fn match_all() -> Pattern {
        Pattern { fields: vec![] }
    }

    pub fn is_match_all(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &[MatchField] {
        &self.fields
    }

    pub fn get(&self, mf: Mf) -> Option<&MatchField> {
        self.fields.iter().find(|f| f.mf() == Some(mf))
    }

    /// Add `field`, replacing any field with the same class and number. A mask of all ones is
    /// dropped, and a mask of all zeros removes the field.
    pub fn set(&mut self, mut field: MatchField) {
        let key = field.sort_key();
        self.fields.retain(|f| f.sort_key() != key);
        if let Some(ref mask) = field.mask {
            if mask.iter().all(|b| *b == 0) {
                return;
            }
        }
        if field.mask.as_ref().map_or(false, |m| m.iter().all(|b| *b == 0xff)) {
            field.mask = None;
        }
        if let Some(ref mut mask) = field.mask {
            for (v, m) in field.value.iter_mut().zip(mask.iter()) {
                *v &= *m;
            }
        }
        let pos = self.fields.iter().position(|f| f.sort_key() > key).unwrap_or(self.fields.len());
        self.fields.insert(pos, field);
    }

    /// Match `mf` exactly against the low bytes of `value`.
    pub fn set_exact(&mut self, mf: Mf, value: u64) {
        let width = mf.width();
        let bytes = value.to_be_bytes();
        self.set(MatchField::basic(mf, &bytes[8 - width..], None));
    }

    fn insert_pulled(&mut self, field: MatchField) -> Result<()> {
        if self.fields.iter().any(|f| f.sort_key() == field.sort_key()) {
            return Err(OfpError::DupField);
        }
        self.set(field);
        Ok(())
    }

    /// Pull an NXM match of `match_len` bytes, plus its padding to a multiple of 8, from the
    /// front of `buf`.
    pub fn pull_nxm(buf: &mut &[u8], match_len: usize) -> Result<Pattern> {
        let mut tlvs = match try_pull(buf, round_up(match_len, 8)) {
            Some(region) => &region[..match_len],
            None => return Err(OfpError::BadMatchLength),
        };
        let mut pattern = Pattern::match_all();
        while !tlvs.is_empty() {
            pattern.insert_pulled(MatchField::pull(&mut tlvs, true)?)?;
        }
        Ok(pattern)
    }

    /// Append `self` as an NXM match padded to 8 bytes. Returns the unpadded length.
    pub fn put_nxm(&self, bytes: &mut Vec<u8>) -> usize {
        let start = bytes.len();
        for field in &self.fields {
            field.put_nxm(bytes);
        }
        let match_len = bytes.len() - start;
        pad_to_8(bytes, start);
        match_len
    }

    /// Pull an OpenFlow 1.1+ `ofp_match` from the front of `buf`. Returns the pattern and the
    /// number of bytes consumed, padding included.
    pub fn pull_oxm(buf: &mut &[u8]) -> Result<(Pattern, usize)> {
        if buf.len() < 4 {
            return Err(OfpError::BadMatchLength);
        }
        let mut hdr = &buf[..4];
        let typ = hdr.read_u16::<BigEndian>()?;
        let length = hdr.read_u16::<BigEndian>()? as usize;
        if typ != OFPMT_OXM {
            return Err(OfpError::BadMatchType);
        }
        if length < 4 {
            return Err(OfpError::BadMatchLength);
        }
        let padded = round_up(length, 8);
        let region = try_pull(buf, padded).ok_or(OfpError::BadMatchLength)?;
        let mut tlvs = &region[4..length];
        let mut pattern = Pattern::match_all();
        while !tlvs.is_empty() {
            pattern.insert_pulled(MatchField::pull(&mut tlvs, false)?)?;
        }
        Ok((pattern, padded))
    }

    /// Append `self` as an OpenFlow 1.1+ `ofp_match` padded to 8 bytes. Returns the unpadded
    /// length, header included.
    pub fn put_oxm(&self, bytes: &mut Vec<u8>) -> usize {
        let start = bytes.len();
        bytes.write_u16::<BigEndian>(OFPMT_OXM).unwrap();
        bytes.write_u16::<BigEndian>(0).unwrap();
        for field in &self.fields {
            field.put_oxm(bytes);
        }
        let match_len = bytes.len() - start;
        bytes[start + 2] = (match_len >> 8) as u8;
        bytes[start + 3] = match_len as u8;
        pad_to_8(bytes, start);
        match_len
    }

    /// Pull an OpenFlow 1.1 `ofp_match` of either type from the front of `buf`. Returns the
    /// pattern and the number of bytes consumed.
    pub fn pull_ofp11(buf: &mut &[u8]) -> Result<(Pattern, usize)> {
        if buf.len() < 2 {
            return Err(OfpError::BadMatchLength);
        }
        if BigEndian::read_u16(&buf[..2]) == OFPMT_STANDARD {
            Ok((Self::pull_ofp11_standard(buf)?, OFP11_MATCH_LEN))
        } else {
            Self::pull_oxm(buf)
        }
    }

    /// Pull an 88-byte OpenFlow 1.1 standard match from the front of `buf`.
    pub fn pull_ofp11_standard(buf: &mut &[u8]) -> Result<Pattern> {
        let mut b = try_pull(buf, OFP11_MATCH_LEN).ok_or(OfpError::BadMatchLength)?;
        let typ = b.read_u16::<BigEndian>()?;
        let length = b.read_u16::<BigEndian>()? as usize;
        if typ != OFPMT_STANDARD {
            return Err(OfpError::BadMatchType);
        }
        if length != OFP11_MATCH_LEN {
            return Err(OfpError::BadMatchLength);
        }
        let in_port = b.read_u32::<BigEndian>()?;
        let wc = b.read_u32::<BigEndian>()?;
        let mut eth = [[0u8; 6]; 4];
        for addr in eth.iter_mut() {
            addr.copy_from_slice(try_pull(&mut b, 6).ok_or(OfpError::BadMatchLength)?);
        }
        let [dl_src, dl_src_mask, dl_dst, dl_dst_mask] = eth;
        let dl_vlan = b.read_u16::<BigEndian>()?;
        let dl_vlan_pcp = b.read_u8()?;
        let _ = b.read_u8()?;
        let dl_type = b.read_u16::<BigEndian>()?;
        let nw_tos = b.read_u8()?;
        let nw_proto = b.read_u8()?;
        let nw_src = b.read_u32::<BigEndian>()?;
        let nw_src_mask = b.read_u32::<BigEndian>()?;
        let nw_dst = b.read_u32::<BigEndian>()?;
        let nw_dst_mask = b.read_u32::<BigEndian>()?;
        let tp_src = b.read_u16::<BigEndian>()?;
        let tp_dst = b.read_u16::<BigEndian>()?;
        let _mpls_label = b.read_u32::<BigEndian>()?;
        let _mpls_tc = b.read_u8()?;
        let _ = try_pull(&mut b, 3).ok_or(OfpError::BadMatchLength)?;
        let metadata = b.read_u64::<BigEndian>()?;
        let metadata_mask = b.read_u64::<BigEndian>()?;

        // Mask bits set to 1 are wildcarded.
        let invert = |m: [u8; 6]| {
            let mut out = [0u8; 6];
            for (o, x) in out.iter_mut().zip(m.iter()) {
                *o = !*x;
            }
            out
        };
        let exact = |bit: u32| wc & bit == 0;
        let mut p = Pattern::match_all();
        if exact(OFPFW11_IN_PORT) {
            p.set_exact(Mf::InPort, in_port as u64);
        }
        p.set(MatchField::basic(Mf::EthSrc, &dl_src, Some(&invert(dl_src_mask))));
        p.set(MatchField::basic(Mf::EthDst, &dl_dst, Some(&invert(dl_dst_mask))));
        p.set(MatchField::basic(Mf::Metadata,
                                &metadata.to_be_bytes(),
                                Some(&(!metadata_mask).to_be_bytes())));
        if exact(OFPFW11_DL_VLAN) {
            match dl_vlan {
                OFPVID11_NONE => p.set_exact(Mf::VlanVid, 0),
                OFPVID11_ANY => {
                    let present = OFPVID_PRESENT.to_be_bytes();
                    p.set(MatchField::basic(Mf::VlanVid, &present, Some(&present)));
                }
                vid => p.set_exact(Mf::VlanVid, ((vid & 0xfff) | OFPVID_PRESENT) as u64),
            }
            if exact(OFPFW11_DL_VLAN_PCP) && dl_vlan != OFPVID11_NONE {
                p.set_exact(Mf::VlanPcp, dl_vlan_pcp as u64);
            }
        }
        if !exact(OFPFW11_DL_TYPE) {
            return Ok(p);
        }
        p.set_exact(Mf::EthType, dl_type as u64);

        if dl_type == ETH_TYPE_ARP {
            if exact(OFPFW11_NW_PROTO) {
                p.set_exact(Mf::ArpOp, nw_proto as u64);
            }
            p.set_ipv4(Mf::ArpSpa, nw_src, !nw_src_mask);
            p.set_ipv4(Mf::ArpTpa, nw_dst, !nw_dst_mask);
        } else if dl_type == ETH_TYPE_IP {
            if exact(OFPFW11_NW_TOS) {
                p.set_exact(Mf::IpDscp, (nw_tos >> 2) as u64);
            }
            p.set_ipv4(Mf::Ipv4Src, nw_src, !nw_src_mask);
            p.set_ipv4(Mf::Ipv4Dst, nw_dst, !nw_dst_mask);
            if exact(OFPFW11_NW_PROTO) {
                p.set_exact(Mf::IpProto, nw_proto as u64);
                if let Some((src, dst)) = Self::transport_fields(nw_proto) {
                    if exact(OFPFW11_TP_SRC) {
                        p.set_exact(src, tp_src as u64);
                    }
                    if exact(OFPFW11_TP_DST) {
                        p.set_exact(dst, tp_dst as u64);
                    }
                }
            }
        }
        Ok(p)
    }

    /// Append `self` as an 88-byte OpenFlow 1.1 standard match. Fields it cannot express are
    /// left wildcarded.
    pub fn put_ofp11_standard(&self, bytes: &mut Vec<u8>) {
        let mut wc = OFPFW11_ALL;
        let mut in_port = 0;
        let mut dl_src = [0u8; 6];
        let mut dl_src_mask = [0xffu8; 6];
        let mut dl_dst = [0u8; 6];
        let mut dl_dst_mask = [0xffu8; 6];
        let mut dl_vlan = 0;
        let mut dl_vlan_pcp = 0;
        let mut dl_type = 0;
        let mut nw_tos = 0;
        let mut nw_proto = 0;
        let mut nw_src = 0;
        let mut nw_src_mask = u32::MAX;
        let mut nw_dst = 0;
        let mut nw_dst_mask = u32::MAX;
        let mut tp_src = 0;
        let mut tp_dst = 0;
        let mut metadata = 0;
        let mut metadata_mask = u64::MAX;

        let wire_mask = |f: &MatchField| -> u64 {
            match f.mask {
                Some(ref m) => !m.iter().fold(0u64, |acc, b| acc << 8 | *b as u64),
                None => 0,
            }
        };
        let put_eth = |f: &MatchField, addr: &mut [u8; 6], mask: &mut [u8; 6]| {
            addr.copy_from_slice(&f.value);
            match f.mask {
                Some(ref m) => {
                    for (o, x) in mask.iter_mut().zip(m.iter()) {
                        *o = !*x;
                    }
                }
                None => *mask = [0; 6],
            }
        };

        for f in &self.fields {
            let mf = match f.mf() {
                Some(mf) if mf.of10() || mf == Mf::Metadata => mf,
                _ => {
                    debug!("match field {:#06x}:{} has no OpenFlow 1.1 form", f.class, f.field);
                    continue;
                }
            };
            let v = f.value_u64();
            match (mf, &f.mask) {
                (Mf::EthSrc, _) => {
                    put_eth(f, &mut dl_src, &mut dl_src_mask);
                    continue;
                }
                (Mf::EthDst, _) => {
                    put_eth(f, &mut dl_dst, &mut dl_dst_mask);
                    continue;
                }
                (Mf::Metadata, _) => {
                    metadata = v;
                    metadata_mask = wire_mask(f);
                    continue;
                }
                (Mf::Ipv4Src, _) | (Mf::ArpSpa, _) => {
                    nw_src = v as u32;
                    nw_src_mask = wire_mask(f) as u32;
                    continue;
                }
                (Mf::Ipv4Dst, _) | (Mf::ArpTpa, _) => {
                    nw_dst = v as u32;
                    nw_dst_mask = wire_mask(f) as u32;
                    continue;
                }
                (Mf::VlanVid, &Some(ref m)) => {
                    if v as u16 == OFPVID_PRESENT && m[..] == OFPVID_PRESENT.to_be_bytes() {
                        dl_vlan = OFPVID11_ANY;
                        wc &= !OFPFW11_DL_VLAN;
                        continue;
                    }
                }
                (_, &Some(_)) => (),
                (Mf::InPort, &None) => {
                    in_port = v as u32;
                    wc &= !OFPFW11_IN_PORT;
                    continue;
                }
                (Mf::VlanVid, &None) => {
                    let vid = v as u16;
                    dl_vlan = if vid & OFPVID_PRESENT != 0 {
                        vid & 0xfff
                    } else {
                        OFPVID11_NONE
                    };
                    wc &= !OFPFW11_DL_VLAN;
                    continue;
                }
                (Mf::VlanPcp, &None) => {
                    dl_vlan_pcp = v as u8;
                    wc &= !OFPFW11_DL_VLAN_PCP;
                    continue;
                }
                (Mf::EthType, &None) => {
                    dl_type = v as u16;
                    wc &= !OFPFW11_DL_TYPE;
                    continue;
                }
                (Mf::IpDscp, &None) => {
                    nw_tos = (v as u8) << 2;
                    wc &= !OFPFW11_NW_TOS;
                    continue;
                }
                (Mf::IpProto, &None) | (Mf::ArpOp, &None) => {
                    nw_proto = v as u8;
                    wc &= !OFPFW11_NW_PROTO;
                    continue;
                }
                (Mf::TcpSrc, &None) | (Mf::UdpSrc, &None) | (Mf::SctpSrc, &None) |
                (Mf::IcmpType, &None) => {
                    tp_src = v as u16;
                    wc &= !OFPFW11_TP_SRC;
                    continue;
                }
                (Mf::TcpDst, &None) | (Mf::UdpDst, &None) | (Mf::SctpDst, &None) |
                (Mf::IcmpCode, &None) => {
                    tp_dst = v as u16;
                    wc &= !OFPFW11_TP_DST;
                    continue;
                }
                _ => (),
            }
            debug!("{} match cannot be expressed in OpenFlow 1.1", mf.name());
        }
        // No vlan leaves nothing for the priority to match.
        if dl_vlan == OFPVID11_NONE {
            wc |= OFPFW11_DL_VLAN_PCP;
            dl_vlan_pcp = 0;
        }
        wc |= OFPFW11_MPLS_LABEL | OFPFW11_MPLS_TC;

        bytes.write_u16::<BigEndian>(OFPMT_STANDARD).unwrap();
        bytes.write_u16::<BigEndian>(OFP11_MATCH_LEN as u16).unwrap();
        bytes.write_u32::<BigEndian>(in_port).unwrap();
        bytes.write_u32::<BigEndian>(wc).unwrap();
        bytes.extend_from_slice(&dl_src);
        bytes.extend_from_slice(&dl_src_mask);
        bytes.extend_from_slice(&dl_dst);
        bytes.extend_from_slice(&dl_dst_mask);
        bytes.write_u16::<BigEndian>(dl_vlan).unwrap();
        bytes.push(dl_vlan_pcp);
        bytes.push(0);
        bytes.write_u16::<BigEndian>(dl_type).unwrap();
        bytes.push(nw_tos);
        bytes.push(nw_proto);
        bytes.write_u32::<BigEndian>(nw_src).unwrap();
        bytes.write_u32::<BigEndian>(nw_src_mask).unwrap();
        bytes.write_u32::<BigEndian>(nw_dst).unwrap();
        bytes.write_u32::<BigEndian>(nw_dst_mask).unwrap();
        bytes.write_u16::<BigEndian>(tp_src).unwrap();
        bytes.write_u16::<BigEndian>(tp_dst).unwrap();
        bytes.write_u32::<BigEndian>(0).unwrap();
        bytes.extend_from_slice(&[0; 4]);
        bytes.write_u64::<BigEndian>(metadata).unwrap();
        bytes.write_u64::<BigEndian>(metadata_mask).unwrap();
    }

    fn transport_fields(nw_proto: u8) -> Option<(Mf, Mf)> {
        match nw_proto {
            IPPROTO_TCP => Some((Mf::TcpSrc, Mf::TcpDst)),
            IPPROTO_UDP => Some((Mf::UdpSrc, Mf::UdpDst)),
            IPPROTO_SCTP => Some((Mf::SctpSrc, Mf::SctpDst)),
            IPPROTO_ICMP => Some((Mf::IcmpType, Mf::IcmpCode)),
            _ => None,
        }
    }

    /// Pull a 40-byte OpenFlow 1.0 match from the front of `buf`.
    pub fn pull_ofp10(buf: &mut &[u8]) -> Result<Pattern> {
        let mut b = try_pull(buf, OFP10_MATCH_LEN).ok_or(OfpError::BadLength)?;
        let wc = b.read_u32::<BigEndian>()?;
        let in_port = b.read_u16::<BigEndian>()?;
        let mut dl_src = [0u8; 6];
        let mut dl_dst = [0u8; 6];
        dl_src.copy_from_slice(try_pull(&mut b, 6).ok_or(OfpError::BadLength)?);
        dl_dst.copy_from_slice(try_pull(&mut b, 6).ok_or(OfpError::BadLength)?);
        let dl_vlan = b.read_u16::<BigEndian>()?;
        let dl_vlan_pcp = b.read_u8()?;
        let _ = b.read_u8()?;
        let dl_type = b.read_u16::<BigEndian>()?;
        let nw_tos = b.read_u8()?;
        let nw_proto = b.read_u8()?;
        let _ = b.read_u16::<BigEndian>()?;
        let nw_src = b.read_u32::<BigEndian>()?;
        let nw_dst = b.read_u32::<BigEndian>()?;
        let tp_src = b.read_u16::<BigEndian>()?;
        let tp_dst = b.read_u16::<BigEndian>()?;

        let exact = |bit: u32| wc & bit == 0;
        let mut p = Pattern::match_all();
        if exact(OFPFW10_IN_PORT) {
            p.set_exact(Mf::InPort, port_to_ofp11(in_port) as u64);
        }
        if exact(OFPFW10_DL_SRC) {
            p.set(MatchField::basic(Mf::EthSrc, &dl_src, None));
        }
        if exact(OFPFW10_DL_DST) {
            p.set(MatchField::basic(Mf::EthDst, &dl_dst, None));
        }
        if exact(OFPFW10_DL_VLAN) {
            let vid = if dl_vlan == OFP10_VLAN_NONE {
                0
            } else {
                (dl_vlan & 0xfff) | OFPVID_PRESENT
            };
            p.set_exact(Mf::VlanVid, vid as u64);
        }
        if exact(OFPFW10_DL_VLAN_PCP) {
            p.set_exact(Mf::VlanPcp, dl_vlan_pcp as u64);
        }
        if !exact(OFPFW10_DL_TYPE) {
            return Ok(p);
        }
        p.set_exact(Mf::EthType, dl_type as u64);

        let nw_src_mask = Self::ofp10_nw_mask(wc, OFPFW10_NW_SRC_SHIFT);
        let nw_dst_mask = Self::ofp10_nw_mask(wc, OFPFW10_NW_DST_SHIFT);
        if dl_type == ETH_TYPE_ARP {
            if exact(OFPFW10_NW_PROTO) {
                p.set_exact(Mf::ArpOp, nw_proto as u64);
            }
            p.set_ipv4(Mf::ArpSpa, nw_src, nw_src_mask);
            p.set_ipv4(Mf::ArpTpa, nw_dst, nw_dst_mask);
        } else if dl_type == ETH_TYPE_IP {
            if exact(OFPFW10_NW_TOS) {
                p.set_exact(Mf::IpDscp, (nw_tos >> 2) as u64);
            }
            p.set_ipv4(Mf::Ipv4Src, nw_src, nw_src_mask);
            p.set_ipv4(Mf::Ipv4Dst, nw_dst, nw_dst_mask);
            if exact(OFPFW10_NW_PROTO) {
                p.set_exact(Mf::IpProto, nw_proto as u64);
                if let Some((src, dst)) = Self::transport_fields(nw_proto) {
                    if exact(OFPFW10_TP_SRC) {
                        p.set_exact(src, tp_src as u64);
                    }
                    if exact(OFPFW10_TP_DST) {
                        p.set_exact(dst, tp_dst as u64);
                    }
                }
            }
        }
        Ok(p)
    }

    fn ofp10_nw_mask(wc: u32, shift: u32) -> u32 {
        let n = (wc >> shift) & OFPFW10_NW_MASK;
        if n >= 32 {
            0
        } else {
            !0u32 << n
        }
    }

    fn set_ipv4(&mut self, mf: Mf, addr: u32, mask: u32) {
        if mask != 0 {
            self.set(MatchField::basic(mf, &addr.to_be_bytes(), Some(&mask.to_be_bytes())));
        }
    }

    /// Append `self` as a 40-byte OpenFlow 1.0 match. Fields OpenFlow 1.0 cannot express are
    /// left wildcarded.
    pub fn put_ofp10(&self, bytes: &mut Vec<u8>) {
        let mut wc = OFPFW10_ALL;
        let mut in_port = 0;
        let mut dl_src = [0u8; 6];
        let mut dl_dst = [0u8; 6];
        let mut dl_vlan = 0;
        let mut dl_vlan_pcp = 0;
        let mut dl_type = 0;
        let mut nw_tos = 0;
        let mut nw_proto = 0;
        let mut nw_src = 0;
        let mut nw_dst = 0;
        let mut tp_src = 0;
        let mut tp_dst = 0;

        for f in &self.fields {
            let mf = match f.mf() {
                Some(mf) if mf.of10() => mf,
                _ => {
                    debug!("match field {:#06x}:{} has no OpenFlow 1.0 form", f.class, f.field);
                    continue;
                }
            };
            let v = f.value_u64();
            match (mf, &f.mask) {
                (Mf::Ipv4Src, _) | (Mf::ArpSpa, _) => {
                    if let Some(n) = Self::wildcard_bits(f) {
                        nw_src = v as u32;
                        wc = wc & !(OFPFW10_NW_MASK << OFPFW10_NW_SRC_SHIFT) |
                             n << OFPFW10_NW_SRC_SHIFT;
                        continue;
                    }
                }
                (Mf::Ipv4Dst, _) | (Mf::ArpTpa, _) => {
                    if let Some(n) = Self::wildcard_bits(f) {
                        nw_dst = v as u32;
                        wc = wc & !(OFPFW10_NW_MASK << OFPFW10_NW_DST_SHIFT) |
                             n << OFPFW10_NW_DST_SHIFT;
                        continue;
                    }
                }
                (_, &Some(_)) => (),
                (Mf::InPort, &None) => {
                    if let Ok(p) = port_from_ofp11(v as u32) {
                        in_port = p;
                        wc &= !OFPFW10_IN_PORT;
                        continue;
                    }
                }
                (Mf::EthSrc, &None) => {
                    dl_src.copy_from_slice(&f.value);
                    wc &= !OFPFW10_DL_SRC;
                    continue;
                }
                (Mf::EthDst, &None) => {
                    dl_dst.copy_from_slice(&f.value);
                    wc &= !OFPFW10_DL_DST;
                    continue;
                }
                (Mf::VlanVid, &None) => {
                    let vid = v as u16;
                    dl_vlan = if vid & OFPVID_PRESENT != 0 {
                        vid & 0xfff
                    } else {
                        OFP10_VLAN_NONE
                    };
                    wc &= !OFPFW10_DL_VLAN;
                    continue;
                }
                (Mf::VlanPcp, &None) => {
                    dl_vlan_pcp = v as u8;
                    wc &= !OFPFW10_DL_VLAN_PCP;
                    continue;
                }
                (Mf::EthType, &None) => {
                    dl_type = v as u16;
                    wc &= !OFPFW10_DL_TYPE;
                    continue;
                }
                (Mf::IpDscp, &None) => {
                    nw_tos = (v as u8) << 2;
                    wc &= !OFPFW10_NW_TOS;
                    continue;
                }
                (Mf::IpProto, &None) | (Mf::ArpOp, &None) => {
                    nw_proto = v as u8;
                    wc &= !OFPFW10_NW_PROTO;
                    continue;
                }
                (Mf::TcpSrc, &None) | (Mf::UdpSrc, &None) | (Mf::SctpSrc, &None) |
                (Mf::IcmpType, &None) => {
                    tp_src = v as u16;
                    wc &= !OFPFW10_TP_SRC;
                    continue;
                }
                (Mf::TcpDst, &None) | (Mf::UdpDst, &None) | (Mf::SctpDst, &None) |
                (Mf::IcmpCode, &None) => {
                    tp_dst = v as u16;
                    wc &= !OFPFW10_TP_DST;
                    continue;
                }
                _ => (),
            }
            debug!("{} match cannot be expressed in OpenFlow 1.0", mf.name());
        }

        bytes.write_u32::<BigEndian>(wc).unwrap();
        bytes.write_u16::<BigEndian>(in_port).unwrap();
        bytes.extend_from_slice(&dl_src);
        bytes.extend_from_slice(&dl_dst);
        bytes.write_u16::<BigEndian>(dl_vlan).unwrap();
        bytes.push(dl_vlan_pcp);
        bytes.push(0);
        bytes.write_u16::<BigEndian>(dl_type).unwrap();
        bytes.push(nw_tos);
        bytes.push(nw_proto);
        bytes.extend_from_slice(&[0, 0]);
        bytes.write_u32::<BigEndian>(nw_src).unwrap();
        bytes.write_u32::<BigEndian>(nw_dst).unwrap();
        bytes.write_u16::<BigEndian>(tp_src).unwrap();
        bytes.write_u16::<BigEndian>(tp_dst).unwrap();
    }

    /// Number of wildcarded low bits of an IPv4 field with a CIDR mask, or `None` for a mask
    /// that is not a prefix.
    fn wildcard_bits(f: &MatchField) -> Option<u32> {
        match f.mask {
            None => Some(0),
            Some(ref m) => {
                let mut mb: &[u8] = m;
                let mask = mb.read_u32::<BigEndian>().ok()?;
                let n = mask.trailing_zeros();
                if n < 32 && mask.wrapping_shr(n).count_ones() != 32 - n {
                    None
                } else {
                    Some(n)
                }
            }
        }
    }

    /// Append the pattern in `name=value` form, comma separated, preceded by the priority
    /// unless it is the default.
    pub fn format(&self, s: &mut String, priority: u16, port_map: &PortMap) {
        let start = s.len();
        if priority != OFP_DEFAULT_PRIORITY {
            let _ = write!(s, "priority={},", priority);
        }
        for f in &self.fields {
            match f.mf() {
                Some(mf) => {
                    let _ = write!(s, "{}=", mf.name());
                    Self::format_value(s, mf, &f.value, port_map);
                    if let Some(ref mask) = f.mask {
                        s.push('/');
                        Self::format_value(s, mf, mask, &PortMap::new());
                    }
                }
                None => {
                    let _ = write!(s, "field({:#06x}:{})=0x", f.class, f.field);
                    for b in &f.value {
                        let _ = write!(s, "{:02x}", b);
                    }
                    if let Some(ref mask) = f.mask {
                        s.push_str("/0x");
                        for b in mask {
                            let _ = write!(s, "{:02x}", b);
                        }
                    }
                }
            }
            s.push(',');
        }
        if s.len() > start {
            s.pop();
        }
    }

    fn format_value(s: &mut String, mf: Mf, value: &[u8], port_map: &PortMap) {
        let v = value.iter().fold(0u64, |acc, b| acc << 8 | *b as u64);
        match mf.info().format {
            MfFormat::Decimal => {
                let _ = write!(s, "{}", v);
            }
            MfFormat::Hex => {
                let _ = write!(s, "{:#06x}", v);
            }
            MfFormat::Ethernet => {
                let octets: Vec<String> = value.iter().map(|b| format!("{:02x}", b)).collect();
                s.push_str(&octets.join(":"));
            }
            MfFormat::Ipv4 => {
                let _ = write!(s, "{}", Ipv4Addr::from(v as u32));
            }
            MfFormat::Ipv6 => {
                let mut octets = [0u8; 16];
                octets.copy_from_slice(value);
                let _ = write!(s, "{}", Ipv6Addr::from(octets));
            }
            MfFormat::Port => {
                match port_from_ofp11(v as u32) {
                    Ok(port) => format_port(s, port, port_map),
                    Err(_) => {
                        let _ = write!(s, "{}", v);
                    }
                }
            }
        }
    }

    /// Parse `value`, optionally followed by `/mask`, for field `mf` and add it to `self`.
    pub fn parse_field(&mut self,
                       mf: Mf,
                       value: &str,
                       port_map: &PortMap)
                       -> std::result::Result<(), String> {
        let (v, m) = match value.find('/') {
            Some(i) => (&value[..i], Some(&value[i + 1..])),
            None => (value, None),
        };
        let width = mf.width();
        let parsed = Self::parse_value(mf, v, port_map)
            .ok_or_else(|| format!("{}: invalid value \"{}\"", mf.name(), v))?;
        let mask = match m {
            None => None,
            Some(m) => {
                let prefix = if mf.info().format == MfFormat::Ipv4 {
                    m.parse::<u32>().ok().filter(|n| *n <= 32)
                } else {
                    None
                };
                match prefix {
                    Some(n) => {
                        let mask = if n == 0 { 0 } else { !0u32 << (32 - n) };
                        Some(mask.to_be_bytes().to_vec())
                    }
                    None => {
                        Some(Self::parse_value(mf, m, &PortMap::new())
                            .ok_or_else(|| format!("{}: invalid mask \"{}\"", mf.name(), m))?)
                    }
                }
            }
        };
        debug_assert_eq!(parsed.len(), width);
        self.set(MatchField::basic(mf, &parsed, mask.as_ref().map(|m| m.as_slice())));
        Ok(())
    }

    fn parse_value(mf: Mf, s: &str, port_map: &PortMap) -> Option<Vec<u8>> {
        let width = mf.width();
        match mf.info().format {
            MfFormat::Decimal | MfFormat::Hex => {
                let v = if s.starts_with("0x") || s.starts_with("0X") {
                    u64::from_str_radix(&s[2..], 16).ok()?
                } else {
                    s.parse::<u64>().ok()?
                };
                if width < 8 && v >> (8 * width) != 0 {
                    return None;
                }
                Some(v.to_be_bytes()[8 - width..].to_vec())
            }
            MfFormat::Ethernet => {
                let octets: Vec<u8> = s.split(':')
                    .map(|o| u8::from_str_radix(o, 16).ok())
                    .collect::<Option<Vec<u8>>>()?;
                if octets.len() == 6 { Some(octets) } else { None }
            }
            MfFormat::Ipv4 => s.parse::<Ipv4Addr>().ok().map(|a| a.octets().to_vec()),
            MfFormat::Ipv6 => s.parse::<Ipv6Addr>().ok().map(|a| a.octets().to_vec()),
            MfFormat::Port => {
                parse_port(s, port_map).map(|p| port_to_ofp11(p).to_be_bytes().to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_pattern() -> Pattern {
        let mut p = Pattern::match_all();
        p.set_exact(Mf::InPort, 3);
        p.set_exact(Mf::EthType, ETH_TYPE_IP as u64);
        p.set_exact(Mf::IpProto, IPPROTO_TCP as u64);
        p.set(MatchField::basic(Mf::Ipv4Src, &[10, 0, 0, 0], Some(&[255, 255, 255, 0])));
        p.set_exact(Mf::TcpDst, 80);
        p
    }

    #[test]
    fn nxm_translates_basic_fields() {
        let p = tcp_pattern();
        let mut bytes = vec![];
        let match_len = p.put_nxm(&mut bytes);
        assert_eq!(bytes.len() % 8, 0);
        // NXM_OF_IN_PORT, 16-bit port.
        assert_eq!(&bytes[..6], &[0x00, 0x00, 0x00, 0x02, 0x00, 0x03]);
        let mut buf = &bytes[..];
        assert_eq!(Pattern::pull_nxm(&mut buf, match_len), Ok(p));
        assert!(buf.is_empty());
    }

    #[test]
    fn oxm_round_trip() {
        let p = tcp_pattern();
        let mut bytes = vec![];
        let match_len = p.put_oxm(&mut bytes);
        assert_eq!(&bytes[..4], &[0x00, 0x01, 0x00, match_len as u8]);
        let mut buf = &bytes[..];
        assert_eq!(Pattern::pull_oxm(&mut buf), Ok((p, bytes.len())));
    }

    #[test]
    fn empty_oxm_is_eight_bytes() {
        let mut bytes = vec![];
        assert_eq!(Pattern::match_all().put_oxm(&mut bytes), 4);
        assert_eq!(bytes, vec![0, 1, 0, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn ofp10_round_trip() {
        let p = tcp_pattern();
        let mut bytes = vec![];
        p.put_ofp10(&mut bytes);
        assert_eq!(bytes.len(), OFP10_MATCH_LEN);
        let mut buf = &bytes[..];
        assert_eq!(Pattern::pull_ofp10(&mut buf), Ok(p));
    }

    #[test]
    fn ofp10_match_all() {
        let mut bytes = vec![];
        Pattern::match_all().put_ofp10(&mut bytes);
        assert_eq!(&bytes[..4], &[0x00, 0x3f, 0xff, 0xff]);
        let mut buf = &bytes[..];
        assert!(Pattern::pull_ofp10(&mut buf).unwrap().is_match_all());
    }

    #[test]
    fn ofp11_standard_round_trip() {
        let mut p = tcp_pattern();
        p.set(MatchField::basic(Mf::EthDst,
                                &[0, 0, 0x5e, 0, 0, 0],
                                Some(&[0xff, 0xff, 0xff, 0, 0, 0])));
        p.set(MatchField::basic(Mf::Metadata, &[0, 0, 0, 0, 0, 0, 0x12, 0x34],
                                Some(&[0, 0, 0, 0, 0, 0, 0xff, 0xff])));
        p.set_exact(Mf::VlanVid, (OFPVID_PRESENT | 10) as u64);
        p.set_exact(Mf::VlanPcp, 5);
        let mut bytes = vec![];
        p.put_ofp11_standard(&mut bytes);
        assert_eq!(bytes.len(), OFP11_MATCH_LEN);
        assert_eq!(&bytes[..4], &[0, 0, 0, 88]);
        // dl_dst mask: ones are wildcarded.
        assert_eq!(&bytes[30..36], &[0, 0, 0, 0xff, 0xff, 0xff]);
        let mut buf = &bytes[..];
        assert_eq!(Pattern::pull_ofp11(&mut buf), Ok((p, OFP11_MATCH_LEN)));
        assert!(buf.is_empty());
    }

    #[test]
    fn ofp11_standard_vlans() {
        let mut none = Pattern::match_all();
        none.set_exact(Mf::VlanVid, 0);
        let present = OFPVID_PRESENT.to_be_bytes();
        let mut any = Pattern::match_all();
        any.set(MatchField::basic(Mf::VlanVid, &present, Some(&present)));
        for &(ref p, dl_vlan) in &[(none, OFPVID11_NONE), (any, OFPVID11_ANY)] {
            let mut bytes = vec![];
            p.put_ofp11_standard(&mut bytes);
            assert_eq!(BigEndian::read_u16(&bytes[36..38]), dl_vlan);
            let mut buf = &bytes[..];
            assert_eq!(Pattern::pull_ofp11_standard(&mut buf).as_ref(), Ok(p));
        }
    }

    #[test]
    fn ofp11_standard_match_all() {
        let mut p = Pattern::match_all();
        p.set(MatchField::basic(Mf::Ipv6Src, &[0; 16], None));
        let mut bytes = vec![];
        p.put_ofp11_standard(&mut bytes);
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0x03, 0xff]);
        let mut buf = &bytes[..];
        assert!(Pattern::pull_ofp11_standard(&mut buf).unwrap().is_match_all());

        let mut buf = &bytes[..80];
        assert_eq!(Pattern::pull_ofp11(&mut buf), Err(OfpError::BadMatchLength));
        let mut bad = bytes.clone();
        bad[3] = 40;
        let mut buf = &bad[..];
        assert_eq!(Pattern::pull_ofp11(&mut buf), Err(OfpError::BadMatchLength));
    }

    #[test]
    fn bad_matches() {
        let mut buf: &[u8] = &[0, 0, 0, 8, 0, 0, 0, 0];
        assert_eq!(Pattern::pull_oxm(&mut buf), Err(OfpError::BadMatchType));
        let mut buf: &[u8] = &[0, 1, 0, 16, 0, 0, 0, 0];
        assert_eq!(Pattern::pull_oxm(&mut buf), Err(OfpError::BadMatchLength));
        // Two eth_type fields.
        let mut buf: &[u8] = &[0x80, 0x00, 0x0a, 0x02, 0x08, 0x00, 0x80, 0x00, 0x0a, 0x02, 0x08,
                               0x00, 0, 0, 0, 0];
        assert_eq!(Pattern::pull_nxm(&mut buf, 12), Err(OfpError::DupField));
        // eth_type with a 3-byte value.
        let mut buf: &[u8] = &[0x80, 0x00, 0x0a, 0x03, 0x08, 0x00, 0x00, 0];
        assert_eq!(Pattern::pull_nxm(&mut buf, 7), Err(OfpError::BadMatchLength));
    }

    #[test]
    fn unknown_fields_are_carried() {
        let raw = MatchField {
            class: 0x0001,
            field: 16,
            value: vec![0, 0, 0, 0, 0, 0, 0, 5],
            mask: None,
        };
        let mut p = Pattern::match_all();
        p.set(raw.clone());
        let mut bytes = vec![];
        let len = p.put_nxm(&mut bytes);
        let mut buf = &bytes[..];
        assert_eq!(Pattern::pull_nxm(&mut buf, len).unwrap().fields(), &[raw][..]);
    }

    #[test]
    fn format_and_parse() {
        let mut p = Pattern::match_all();
        let map = PortMap::new();
        p.parse_field(Mf::EthType, "0x0800", &map).unwrap();
        p.parse_field(Mf::Ipv4Src, "10.0.0.0/8", &map).unwrap();
        p.parse_field(Mf::InPort, "LOCAL", &map).unwrap();
        p.parse_field(Mf::EthDst, "aa:bb:cc:dd:ee:ff", &map).unwrap();
        assert!(p.parse_field(Mf::IpProto, "300", &map).is_err());
        let mut s = String::new();
        p.format(&mut s, 100, &map);
        assert_eq!(s,
                   "priority=100,in_port=LOCAL,dl_dst=aa:bb:cc:dd:ee:ff,dl_type=0x0800,\
                    nw_src=10.0.0.0/255.0.0.0");
        let mut s = String::new();
        Pattern::match_all().format(&mut s, OFP_DEFAULT_PRIORITY, &map);
        assert_eq!(s, "");
    }

    #[test]
    fn field_names() {
        assert_eq!(Mf::from_name("eth_type"), Some(Mf::EthType));
        assert_eq!(Mf::from_name("dl_type"), Some(Mf::EthType));
        assert_eq!(Mf::from_name("bogus"), None);
        assert!(!Mf::Ipv6Src.of10());
        assert_eq!(parse_protocol("tcp"), Some((ETH_TYPE_IP, Some(IPPROTO_TCP))));
    }
}
