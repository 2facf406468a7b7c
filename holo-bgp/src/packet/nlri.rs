//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use holo_utils::bytes::{BytesExt, BytesMutExt};
use holo_utils::ip::{AddressFamily, IpAddrLen, IpNetworkExt};
use holo_utils::mpls::LabelStackEntry;
use ipnetwork::{IpNetwork, Ipv4Network, Ipv6Network};
use serde::{Deserialize, Serialize};

use crate::packet::consts::AfiSafi;
use crate::packet::error::NlriError;
use crate::packet::evpn::EvpnRoute;
use crate::packet::flowspec::FlowspecRule;
use crate::packet::linkstate::LinkStateNlri;
use crate::packet::message::{DecodeCxt, EncodeCxt};
use crate::registry::{Codec, ParseError, Registration, Registry};

// Network Layer Reachability Information.
//
// The variant determines the wire encoding, and its `Ord` implementation is
// what orders the RIB tables.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum Nlri {
    Ipv4Unicast(Ipv4Network),
    Ipv6Unicast(Ipv6Network),
    Labeled(LabeledPrefix),
    Vpn(VpnPrefix),
    Evpn(EvpnRoute),
    Flowspec(FlowspecRule),
    LinkState(LinkStateNlri),
}

//
// Labeled unicast prefix (RFC 8277).
//
// Encoding format:
//
// +---------------------------+
// |   Length (1 octet)        |
// +---------------------------+
// |   Label (3 octets)        |
// +---------------------------+
// ...........................
// +---------------------------+
// |   Prefix (variable)       |
// +---------------------------+
//
// The Length field counts bits, and includes the label stack.
//
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LabeledPrefix {
    pub labels: Vec<LabelStackEntry>,
    pub prefix: IpNetwork,
}

//
// VPN-IPv4/VPN-IPv6 prefix (RFC 4364 / RFC 4659).
//
// Same as the labeled unicast encoding, with an 8-octet Route Distinguisher
// between the label stack and the prefix.
//
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct VpnPrefix {
    pub labels: Vec<LabelStackEntry>,
    pub rd: RouteDistinguisher,
    pub prefix: IpNetwork,
}

//
// Route Distinguisher (RFC 4364 - Section 4.2).
//
// Encoding format:
//
// +-------------------------------+
// |   Type (2 octets)             |
// +-------------------------------+
// |   Value (6 octets)            |
// +-------------------------------+
//
// Type 0: Administrator (2-octet ASN) | Assigned Number (4 octets)
// Type 1: Administrator (IPv4 address) | Assigned Number (2 octets)
// Type 2: Administrator (4-octet ASN) | Assigned Number (2 octets)
//
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum RouteDistinguisher {
    As2 { admin: u16, assigned: u32 },
    Ipv4 { admin: Ipv4Addr, assigned: u16 },
    As4 { admin: u32, assigned: u16 },
}

// NLRI entry as carried in an UPDATE message.
//
// The Path Identifier is present only when ADD-PATH was negotiated in the
// receive direction for the corresponding AFI/SAFI (RFC 7911).
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct NlriEntry {
    pub path_id: Option<u32>,
    pub nlri: Nlri,
}

// NLRI codec family, keyed by AFI/SAFI.
pub struct NlriCodec;

// ===== impl Nlri =====

impl Nlri {
    // Decodes a single NLRI of the given AFI/SAFI.
    pub fn decode(
        afi_safi: AfiSafi,
        buf: &mut Bytes,
    ) -> Result<Nlri, NlriError> {
        let nlri = match afi_safi {
            AfiSafi::Ipv4Unicast => Nlri::Ipv4Unicast(decode_ipv4_prefix(buf)?),
            AfiSafi::Ipv6Unicast => Nlri::Ipv6Unicast(decode_ipv6_prefix(buf)?),
            AfiSafi::Ipv4LabeledUnicast => {
                Nlri::Labeled(LabeledPrefix::decode(buf, AddressFamily::Ipv4)?)
            }
            AfiSafi::Ipv6LabeledUnicast => {
                Nlri::Labeled(LabeledPrefix::decode(buf, AddressFamily::Ipv6)?)
            }
            AfiSafi::Ipv4Vpn => {
                Nlri::Vpn(VpnPrefix::decode(buf, AddressFamily::Ipv4)?)
            }
            AfiSafi::Ipv6Vpn => {
                Nlri::Vpn(VpnPrefix::decode(buf, AddressFamily::Ipv6)?)
            }
            AfiSafi::L2vpnEvpn => Nlri::Evpn(EvpnRoute::decode(buf)?),
            AfiSafi::Ipv4Flowspec => Nlri::Flowspec(FlowspecRule::decode(
                buf,
                AddressFamily::Ipv4,
                false,
            )?),
            AfiSafi::Ipv6Flowspec => Nlri::Flowspec(FlowspecRule::decode(
                buf,
                AddressFamily::Ipv6,
                false,
            )?),
            AfiSafi::Ipv4VpnFlowspec => Nlri::Flowspec(FlowspecRule::decode(
                buf,
                AddressFamily::Ipv4,
                true,
            )?),
            AfiSafi::Ipv6VpnFlowspec => Nlri::Flowspec(FlowspecRule::decode(
                buf,
                AddressFamily::Ipv6,
                true,
            )?),
            AfiSafi::LinkState => Nlri::LinkState(LinkStateNlri::decode(buf)?),
        };

        Ok(nlri)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Nlri::Ipv4Unicast(prefix) => encode_ipv4_prefix(buf, prefix),
            Nlri::Ipv6Unicast(prefix) => encode_ipv6_prefix(buf, prefix),
            Nlri::Labeled(prefix) => prefix.encode(buf),
            Nlri::Vpn(prefix) => prefix.encode(buf),
            Nlri::Evpn(route) => route.encode(buf),
            Nlri::Flowspec(rule) => rule.encode(buf),
            Nlri::LinkState(nlri) => nlri.encode(buf),
        }
    }

    pub fn afi_safi(&self) -> AfiSafi {
        match self {
            Nlri::Ipv4Unicast(_) => AfiSafi::Ipv4Unicast,
            Nlri::Ipv6Unicast(_) => AfiSafi::Ipv6Unicast,
            Nlri::Labeled(labeled) => match labeled.prefix {
                IpNetwork::V4(_) => AfiSafi::Ipv4LabeledUnicast,
                IpNetwork::V6(_) => AfiSafi::Ipv6LabeledUnicast,
            },
            Nlri::Vpn(vpn) => match vpn.prefix {
                IpNetwork::V4(_) => AfiSafi::Ipv4Vpn,
                IpNetwork::V6(_) => AfiSafi::Ipv6Vpn,
            },
            Nlri::Evpn(_) => AfiSafi::L2vpnEvpn,
            Nlri::Flowspec(rule) => match (rule.af, rule.rd.is_some()) {
                (AddressFamily::Ipv4, false) => AfiSafi::Ipv4Flowspec,
                (AddressFamily::Ipv6, false) => AfiSafi::Ipv6Flowspec,
                (AddressFamily::Ipv4, true) => AfiSafi::Ipv4VpnFlowspec,
                (AddressFamily::Ipv6, true) => AfiSafi::Ipv6VpnFlowspec,
            },
            Nlri::LinkState(_) => AfiSafi::LinkState,
        }
    }

    // Returns the IP prefix carried by this NLRI, if any.
    pub fn prefix(&self) -> Option<IpNetwork> {
        match self {
            Nlri::Ipv4Unicast(prefix) => Some((*prefix).into()),
            Nlri::Ipv6Unicast(prefix) => Some((*prefix).into()),
            Nlri::Labeled(labeled) => Some(labeled.prefix),
            Nlri::Vpn(vpn) => Some(vpn.prefix),
            Nlri::Evpn(_) | Nlri::Flowspec(_) | Nlri::LinkState(_) => None,
        }
    }

    // Returns false for prefixes that must never be installed.
    pub fn is_routable(&self) -> bool {
        match self.prefix() {
            Some(prefix) => prefix.is_routable(),
            None => true,
        }
    }
}

impl std::fmt::Display for Nlri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Nlri::Ipv4Unicast(prefix) => write!(f, "{prefix}"),
            Nlri::Ipv6Unicast(prefix) => write!(f, "{prefix}"),
            Nlri::Labeled(labeled) => {
                write!(f, "{}", labeled.prefix)?;
                for label in &labeled.labels {
                    write!(f, " label {label}")?;
                }
                Ok(())
            }
            Nlri::Vpn(vpn) => {
                write!(f, "[{}]:{}", vpn.rd, vpn.prefix)?;
                for label in &vpn.labels {
                    write!(f, " label {label}")?;
                }
                Ok(())
            }
            Nlri::Evpn(route) => write!(f, "{route}"),
            Nlri::Flowspec(rule) => write!(f, "{rule}"),
            Nlri::LinkState(nlri) => write!(f, "{nlri}"),
        }
    }
}

// ===== impl LabeledPrefix =====

impl LabeledPrefix {
    fn decode(
        buf: &mut Bytes,
        af: AddressFamily,
    ) -> Result<LabeledPrefix, NlriError> {
        let bits = buf.try_get_u8()?;
        let (labels, plen) = decode_label_stack(buf, bits)?;
        let prefix = decode_prefix_addr(buf, af, plen)?;
        Ok(LabeledPrefix { labels, prefix })
    }

    fn encode(&self, buf: &mut BytesMut) {
        let plen = self.prefix.prefix();
        let bits = self.labels.len() * 24 + plen as usize;
        buf.put_u8(bits as u8);
        encode_label_stack(buf, &self.labels);
        encode_prefix_addr(buf, &self.prefix.ip(), plen);
    }
}

// ===== impl VpnPrefix =====

impl VpnPrefix {
    fn decode(
        buf: &mut Bytes,
        af: AddressFamily,
    ) -> Result<VpnPrefix, NlriError> {
        let bits = buf.try_get_u8()?;
        let (labels, plen) = decode_label_stack(buf, bits)?;
        let rd_bits = (RouteDistinguisher::LENGTH * 8) as u8;
        if plen < rd_bits {
            return Err(NlriError::InvalidPrefixLength(bits));
        }
        let rd = RouteDistinguisher::decode(buf)?;
        let prefix = decode_prefix_addr(buf, af, plen - rd_bits)?;
        Ok(VpnPrefix { labels, rd, prefix })
    }

    fn encode(&self, buf: &mut BytesMut) {
        let plen = self.prefix.prefix();
        let bits = self.labels.len() * 24
            + RouteDistinguisher::LENGTH * 8
            + plen as usize;
        buf.put_u8(bits as u8);
        encode_label_stack(buf, &self.labels);
        self.rd.encode(buf);
        encode_prefix_addr(buf, &self.prefix.ip(), plen);
    }
}

// ===== impl RouteDistinguisher =====

impl RouteDistinguisher {
    pub const LENGTH: usize = 8;

    pub fn decode(buf: &mut Bytes) -> Result<RouteDistinguisher, NlriError> {
        let rd_type = buf.try_get_u16()?;
        let rd = match rd_type {
            0 => {
                let admin = buf.try_get_u16()?;
                let assigned = buf.try_get_u32()?;
                RouteDistinguisher::As2 { admin, assigned }
            }
            1 => {
                let admin = buf.try_get_ipv4()?;
                let assigned = buf.try_get_u16()?;
                RouteDistinguisher::Ipv4 { admin, assigned }
            }
            2 => {
                let admin = buf.try_get_u32()?;
                let assigned = buf.try_get_u16()?;
                RouteDistinguisher::As4 { admin, assigned }
            }
            _ => return Err(NlriError::InvalidRouteDistinguisher(rd_type)),
        };
        Ok(rd)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.rd_type());
        match *self {
            RouteDistinguisher::As2 { admin, assigned } => {
                buf.put_u16(admin);
                buf.put_u32(assigned);
            }
            RouteDistinguisher::Ipv4 { admin, assigned } => {
                buf.put_ipv4(&admin);
                buf.put_u16(assigned);
            }
            RouteDistinguisher::As4 { admin, assigned } => {
                buf.put_u32(admin);
                buf.put_u16(assigned);
            }
        }
    }

    pub fn rd_type(&self) -> u16 {
        match self {
            RouteDistinguisher::As2 { .. } => 0,
            RouteDistinguisher::Ipv4 { .. } => 1,
            RouteDistinguisher::As4 { .. } => 2,
        }
    }
}

impl std::fmt::Display for RouteDistinguisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteDistinguisher::As2 { admin, assigned } => {
                write!(f, "{admin}:{assigned}")
            }
            RouteDistinguisher::Ipv4 { admin, assigned } => {
                write!(f, "{admin}:{assigned}")
            }
            RouteDistinguisher::As4 { admin, assigned } => {
                write!(f, "{admin}:{assigned}")
            }
        }
    }
}

// ===== impl NlriEntry =====

impl NlriEntry {
    pub fn new(nlri: Nlri) -> NlriEntry {
        NlriEntry {
            path_id: None,
            nlri,
        }
    }

    // Decodes all NLRI entries present in the buffer using the NLRI registry.
    pub(crate) fn decode_list(
        buf: &mut Bytes,
        afi_safi: AfiSafi,
        cxt: &DecodeCxt,
    ) -> Result<Vec<NlriEntry>, ParseError<AfiSafi, NlriError>> {
        let add_path = cxt.add_path_rx(afi_safi);
        let mut entries = vec![];
        while buf.has_remaining() {
            let path_id = if add_path {
                let path_id = buf
                    .try_get_u32()
                    .map_err(|error| ParseError::Decode(error.into()))?;
                Some(path_id)
            } else {
                None
            };
            let nlri = cxt.registry.nlri.parse(afi_safi, buf, cxt)?;
            entries.push(NlriEntry { path_id, nlri });
        }
        Ok(entries)
    }

    pub(crate) fn encode(&self, buf: &mut BytesMut, cxt: &EncodeCxt) {
        let start_pos = buf.len();
        if let Some(path_id) = self.path_id {
            buf.put_u32(path_id);
        }
        if cxt.registry.nlri.serialize(&self.nlri, buf, cxt).is_err() {
            buf.truncate(start_pos);
        }
    }
}

// ===== impl NlriCodec =====

impl Codec for NlriCodec {
    const NAME: &'static str = "nlri";

    type Key = AfiSafi;
    type Object = Nlri;
    type DecodeCxt = DecodeCxt;
    type EncodeCxt = EncodeCxt;
    type Error = NlriError;

    fn object_key(nlri: &Nlri) -> AfiSafi {
        nlri.afi_safi()
    }
}

// Registers the built-in NLRI codecs, one pair per supported AFI/SAFI.
pub(crate) fn register_codecs(
    registry: &Registry<NlriCodec>,
) -> Vec<Registration> {
    AfiSafi::ALL
        .into_iter()
        .flat_map(|afi_safi| {
            [
                registry.register_parser(afi_safi, move |buf, _cxt| {
                    Nlri::decode(afi_safi, buf)
                }),
                registry.register_serializer(afi_safi, |nlri, buf, _cxt| {
                    nlri.encode(buf)
                }),
            ]
        })
        .collect()
}

// ===== helper functions =====

pub(crate) fn encode_ipv4_prefix(buf: &mut BytesMut, prefix: &Ipv4Network) {
    // Encode prefix length.
    let plen = prefix.prefix();
    buf.put_u8(plen);

    // Encode prefix address (variable length).
    let prefix_bytes = prefix.ip().octets();
    let plen_wire = prefix_wire_len(plen);
    buf.put(&prefix_bytes[0..plen_wire]);
}

pub(crate) fn encode_ipv6_prefix(buf: &mut BytesMut, prefix: &Ipv6Network) {
    // Encode prefix length.
    let plen = prefix.prefix();
    buf.put_u8(plen);

    // Encode prefix address (variable length).
    let prefix_bytes = prefix.ip().octets();
    let plen_wire = prefix_wire_len(plen);
    buf.put(&prefix_bytes[0..plen_wire]);
}

pub fn decode_ipv4_prefix(buf: &mut Bytes) -> Result<Ipv4Network, NlriError> {
    let plen = buf.try_get_u8()?;
    match decode_prefix_addr(buf, AddressFamily::Ipv4, plen)? {
        IpNetwork::V4(prefix) => Ok(prefix),
        IpNetwork::V6(_) => Err(NlriError::InvalidPrefixLength(plen)),
    }
}

pub fn decode_ipv6_prefix(buf: &mut Bytes) -> Result<Ipv6Network, NlriError> {
    let plen = buf.try_get_u8()?;
    match decode_prefix_addr(buf, AddressFamily::Ipv6, plen)? {
        IpNetwork::V6(prefix) => Ok(prefix),
        IpNetwork::V4(_) => Err(NlriError::InvalidPrefixLength(plen)),
    }
}

// Decodes the address part of a prefix whose length is already known.
pub(crate) fn decode_prefix_addr(
    buf: &mut Bytes,
    af: AddressFamily,
    plen: u8,
) -> Result<IpNetwork, NlriError> {
    if plen > af.max_prefixlen() {
        return Err(NlriError::InvalidPrefixLength(plen));
    }

    let plen_wire = prefix_wire_len(plen);
    let prefix = match af {
        AddressFamily::Ipv4 => {
            let mut bytes = [0; Ipv4Addr::LENGTH];
            buf.try_copy_to_slice(&mut bytes[..plen_wire])?;
            IpNetwork::new(Ipv4Addr::from(bytes).into(), plen)
        }
        AddressFamily::Ipv6 => {
            let mut bytes = [0; Ipv6Addr::LENGTH];
            buf.try_copy_to_slice(&mut bytes[..plen_wire])?;
            IpNetwork::new(Ipv6Addr::from(bytes).into(), plen)
        }
    }
    .map_err(|_| NlriError::InvalidPrefixLength(plen))?;

    Ok(prefix.apply_mask())
}

pub(crate) fn encode_prefix_addr(buf: &mut BytesMut, addr: &IpAddr, plen: u8) {
    let plen_wire = prefix_wire_len(plen);
    match addr {
        IpAddr::V4(addr) => buf.put(&addr.octets()[0..plen_wire]),
        IpAddr::V6(addr) => buf.put(&addr.octets()[0..plen_wire]),
    }
}

// Decodes a label stack, returning it together with the number of bits left
// for the rest of the NLRI.
fn decode_label_stack(
    buf: &mut Bytes,
    bits: u8,
) -> Result<(Vec<LabelStackEntry>, u8), NlriError> {
    let mut bits_left = bits;
    let mut labels = vec![];
    loop {
        if bits_left < 24 {
            return Err(NlriError::InvalidLabelStack);
        }
        let entry = LabelStackEntry::from_raw(buf.try_get_u24()?);
        bits_left -= 24;
        labels.push(entry);

        // RFC 8277 - Section 2.4: the withdrawal value terminates the stack.
        if entry.is_bottom_of_stack() || entry.is_withdrawn() {
            break;
        }
    }
    Ok((labels, bits_left))
}

fn encode_label_stack(buf: &mut BytesMut, labels: &[LabelStackEntry]) {
    for label in labels {
        buf.put_u24(label.raw());
    }
}

// Calculates the number of bytes required to encode a prefix.
pub(crate) fn prefix_wire_len(len: u8) -> usize {
    (len as usize).div_ceil(8)
}

// ===== unit tests =====
