//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut, TryGetError};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use holo_utils::bytes::{BytesExt, BytesMutExt};
use holo_utils::ip::IpAddrLen;
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::neighbor::PeerType;
use crate::packet::consts::{
    Afi, AfiSafi, AsPathSegmentType, AttrFlags, AttrType, Origin, Safi,
};
use crate::packet::error::{AttrError, UpdateMessageError};
use crate::packet::message::{DecodeCxt, EncodeCxt};
use crate::packet::nlri::{NlriEntry, RouteDistinguisher};
use crate::registry::{Codec, ParseError, Registration, Registry};

pub const ATTR_MIN_LEN: u16 = 3;
pub const ATTR_MIN_LEN_EXT: u16 = 4;

// A single decoded path attribute.
//
// This is the unit handled by the attribute codec registry: parsers produce
// one of these from an attribute value, and serializers are selected by the
// variant's attribute type.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(EnumAsInner)]
#[derive(Deserialize, Serialize)]
pub enum Attr {
    Origin(Origin),
    AsPath(AsPath),
    Nexthop(Ipv4Addr),
    Med(u32),
    LocalPref(u32),
    AtomicAggregate,
    Aggregator(Aggregator),
    Communities(Comms),
    OriginatorId(Ipv4Addr),
    ClusterList(ClusterList),
    MpReach(MpReachNlri),
    MpUnreach(MpUnreachNlri),
    ExtCommunities(ExtComms),
    As4Path(AsPath),
    As4Aggregator(Aggregator),
    Extv6Communities(Extv6Comms),
    LinkState(Bytes),
    LargeCommunities(LargeComms),
}

// Path attribute codec family, keyed by the attribute type code.
pub struct AttrCodec;

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Attrs {
    pub base: BaseAttrs,
    pub comm: Option<Comms>,
    pub ext_comm: Option<ExtComms>,
    pub extv6_comm: Option<Extv6Comms>,
    pub large_comm: Option<LargeComms>,
    pub link_state: Option<Bytes>,
    pub unknown: Vec<UnknownAttr>,
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct BaseAttrs {
    pub origin: Origin,
    pub as_path: AsPath,
    pub as4_path: Option<AsPath>,
    pub nexthop: Option<IpAddr>,
    pub ll_nexthop: Option<Ipv6Addr>,
    pub med: Option<u32>,
    pub local_pref: Option<u32>,
    pub aggregator: Option<Aggregator>,
    pub as4_aggregator: Option<Aggregator>,
    pub atomic_aggregate: bool,
    pub originator_id: Option<Ipv4Addr>,
    pub cluster_list: Option<ClusterList>,
}

#[derive(Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct AsPath {
    pub segments: VecDeque<AsPathSegment>,
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct AsPathSegment {
    pub seg_type: AsPathSegmentType,
    pub members: VecDeque<u32>,
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Aggregator {
    pub asn: u32,
    pub identifier: Ipv4Addr,
}

// CLUSTER_LIST attribute. The most recently traversed cluster comes first.
#[derive(Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct ClusterList(pub Vec<Ipv4Addr>);

//
// MP_REACH_NLRI attribute.
//
// Encoding format:
//
// +---------------------------------------------------------+
// | Address Family Identifier (2 octets)                    |
// +---------------------------------------------------------+
// | Subsequent Address Family Identifier (1 octet)          |
// +---------------------------------------------------------+
// | Length of Next Hop Network Address (1 octet)            |
// +---------------------------------------------------------+
// | Network Address of Next Hop (variable)                  |
// +---------------------------------------------------------+
// | Reserved (1 octet)                                      |
// +---------------------------------------------------------+
// | Network Layer Reachability Information (variable)       |
// +---------------------------------------------------------+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct MpReachNlri {
    pub afi_safi: AfiSafi,
    pub nexthop: MpNexthop,
    pub nlri: Vec<NlriEntry>,
}

//
// MP_UNREACH_NLRI attribute.
//
// Encoding format:
//
// +---------------------------------------------------------+
// | Address Family Identifier (2 octets)                    |
// +---------------------------------------------------------+
// | Subsequent Address Family Identifier (1 octet)          |
// +---------------------------------------------------------+
// | Withdrawn Routes (variable)                             |
// +---------------------------------------------------------+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct MpUnreachNlri {
    pub afi_safi: AfiSafi,
    pub nlri: Vec<NlriEntry>,
}

// Next hop carried in the MP_REACH_NLRI attribute.
//
// The variant is determined by the length of the next hop field. VPN next
// hops are prefixed by a Route Distinguisher which is always zero.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum MpNexthop {
    None,
    Ipv4(Ipv4Addr),
    Ipv6 {
        global: Ipv6Addr,
        link_local: Option<Ipv6Addr>,
    },
    VpnIpv4(Ipv4Addr),
    VpnIpv6 {
        global: Ipv6Addr,
        link_local: Option<Ipv6Addr>,
    },
}

// Re-exports for convenience.
pub type Comm = holo_utils::bgp::Comm;
pub type ExtComm = holo_utils::bgp::ExtComm;
pub type Extv6Comm = holo_utils::bgp::Extv6Comm;
pub type LargeComm = holo_utils::bgp::LargeComm;

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct CommList<T: CommType>(pub BTreeSet<T>);

pub trait CommType:
    Clone + std::fmt::Debug + Eq + Ord + PartialEq + PartialOrd
{
    const TYPE: AttrType;
    const LENGTH: usize;

    fn encode(&self, buf: &mut BytesMut);
    fn decode(buf: &mut Bytes) -> Result<Self, TryGetError>;
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(new)]
#[derive(Deserialize, Serialize)]
pub struct UnknownAttr {
    pub attr_type: u8,
    pub flags: AttrFlags,
    pub value: Bytes,
}

// Useful type definitions.
pub type Comms = CommList<Comm>;
pub type ExtComms = CommList<ExtComm>;
pub type Extv6Comms = CommList<Extv6Comm>;
pub type LargeComms = CommList<LargeComm>;

// ===== impl Attr =====

impl Attr {
    pub fn attr_type(&self) -> AttrType {
        match self {
            Attr::Origin(_) => AttrType::Origin,
            Attr::AsPath(_) => AttrType::AsPath,
            Attr::Nexthop(_) => AttrType::Nexthop,
            Attr::Med(_) => AttrType::Med,
            Attr::LocalPref(_) => AttrType::LocalPref,
            Attr::AtomicAggregate => AttrType::AtomicAggregate,
            Attr::Aggregator(_) => AttrType::Aggregator,
            Attr::Communities(_) => AttrType::Communities,
            Attr::OriginatorId(_) => AttrType::OriginatorId,
            Attr::ClusterList(_) => AttrType::ClusterList,
            Attr::MpReach(_) => AttrType::MpReachNlri,
            Attr::MpUnreach(_) => AttrType::MpUnreachNlri,
            Attr::ExtCommunities(_) => AttrType::ExtCommunities,
            Attr::As4Path(_) => AttrType::As4Path,
            Attr::As4Aggregator(_) => AttrType::As4Aggregator,
            Attr::Extv6Communities(_) => AttrType::Extv6Community,
            Attr::LinkState(_) => AttrType::BgpLs,
            Attr::LargeCommunities(_) => AttrType::LargeCommunity,
        }
    }
}

// ===== impl AttrCodec =====

impl Codec for AttrCodec {
    const NAME: &'static str = "path-attribute";

    type Key = u8;
    type Object = Attr;
    type DecodeCxt = DecodeCxt;
    type EncodeCxt = EncodeCxt;
    type Error = AttrError;

    fn object_key(attr: &Attr) -> u8 {
        attr.attr_type() as u8
    }
}

// Registers the built-in path attribute codecs.
pub(crate) fn register_codecs(
    registry: &Registry<AttrCodec>,
) -> Vec<Registration> {
    type ParseFn = fn(&mut Bytes, &DecodeCxt) -> Result<Attr, AttrError>;
    type SerializeFn = fn(&Attr, &mut BytesMut, &EncodeCxt);

    let codecs: [(AttrType, ParseFn, SerializeFn); 18] = [
        (AttrType::Origin, origin::decode, origin::encode),
        (AttrType::AsPath, as_path::decode, as_path::encode),
        (AttrType::Nexthop, nexthop::decode, nexthop::encode),
        (AttrType::Med, med::decode, med::encode),
        (AttrType::LocalPref, local_pref::decode, local_pref::encode),
        (
            AttrType::AtomicAggregate,
            atomic_aggregate::decode,
            atomic_aggregate::encode,
        ),
        (AttrType::Aggregator, aggregator::decode, aggregator::encode),
        (AttrType::Communities, comm::decode, comm::encode),
        (
            AttrType::OriginatorId,
            originator_id::decode,
            originator_id::encode,
        ),
        (AttrType::ClusterList, ClusterList::decode, ClusterList::encode),
        (AttrType::MpReachNlri, MpReachNlri::decode, MpReachNlri::encode),
        (
            AttrType::MpUnreachNlri,
            MpUnreachNlri::decode,
            MpUnreachNlri::encode,
        ),
        (AttrType::ExtCommunities, ext_comm::decode, ext_comm::encode),
        (AttrType::As4Path, as4_path::decode, as4_path::encode),
        (
            AttrType::As4Aggregator,
            as4_aggregator::decode,
            as4_aggregator::encode,
        ),
        (AttrType::Extv6Community, extv6_comm::decode, extv6_comm::encode),
        (AttrType::BgpLs, link_state::decode, link_state::encode),
        (AttrType::LargeCommunity, large_comm::decode, large_comm::encode),
    ];

    codecs
        .into_iter()
        .flat_map(|(attr_type, parser, serializer)| {
            [
                registry.register_parser(attr_type as u8, parser),
                registry.register_serializer(attr_type as u8, serializer),
            ]
        })
        .collect()
}

// ===== impl Attrs =====

impl Attrs {
    pub(crate) fn encode(
        &self,
        buf: &mut BytesMut,
        nexthop: Option<Ipv4Addr>,
        cxt: &EncodeCxt,
    ) {
        // RFC 4271 - Section 5:
        // "The sender of an UPDATE message SHOULD order path attributes within
        // the UPDATE message in ascending order of attribute type".
        let base = &self.base;
        let mut attrs = vec![
            Attr::Origin(base.origin),
            Attr::AsPath(base.as_path.clone()),
        ];
        attrs.extend(nexthop.map(Attr::Nexthop));
        attrs.extend(base.med.map(Attr::Med));
        attrs.extend(base.local_pref.map(Attr::LocalPref));
        if base.atomic_aggregate {
            attrs.push(Attr::AtomicAggregate);
        }
        attrs.extend(base.aggregator.clone().map(Attr::Aggregator));
        attrs.extend(self.comm.clone().map(Attr::Communities));
        attrs.extend(base.originator_id.map(Attr::OriginatorId));
        attrs.extend(base.cluster_list.clone().map(Attr::ClusterList));
        attrs.extend(self.ext_comm.clone().map(Attr::ExtCommunities));
        attrs.extend(base.as4_path.clone().map(Attr::As4Path));
        attrs.extend(base.as4_aggregator.clone().map(Attr::As4Aggregator));
        attrs.extend(self.extv6_comm.clone().map(Attr::Extv6Communities));
        attrs.extend(self.link_state.clone().map(Attr::LinkState));
        attrs.extend(self.large_comm.clone().map(Attr::LargeCommunities));
        for attr in &attrs {
            encode_attr(attr, buf, cxt);
        }

        // Unrecognized transitive attributes are propagated as received.
        for attr in &self.unknown {
            attr.encode(buf);
        }
    }

    pub(crate) fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
        nexthop: &mut Option<Ipv4Addr>,
        nlri_present: bool,
        mp_unreach: &mut Option<MpUnreachNlri>,
        mp_reach: &mut Option<MpReachNlri>,
    ) -> Result<Option<Self>, UpdateMessageError> {
        let mut builder = AttrsBuilder::default();
        let mut seen = HashSet::new();

        while buf.has_remaining() {
            // A truncated attribute header or value leaves the rest of the
            // list unparseable.
            let Some((mut attr_flags, attr_type_raw, value)) =
                decode_attr_header(buf)
            else {
                builder.withdraw = true;
                break;
            };
            let attr_type = AttrType::from_u8(attr_type_raw);

            // RFC 7606 - Section 3.c:
            // "If the value of either the Optional or Transitive bits in the
            // Attribute Flags is in conflict with their specified values, then
            // the attribute MUST be treated as malformed and the
            // "treat-as-withdraw" approach used".
            let category =
                attr_flags & (AttrFlags::OPTIONAL | AttrFlags::TRANSITIVE);
            if attr_type.is_some_and(|attr_type| {
                category != attribute_flags(attr_type)
            }) {
                builder.withdraw = true;
                continue;
            }

            // RFC 7606 - Section 3.g: repeated MP_REACH_NLRI or
            // MP_UNREACH_NLRI attributes are a fatal error, other repeated
            // attributes are discarded.
            if !seen.insert(attr_type_raw) {
                if let Some(AttrType::MpReachNlri | AttrType::MpUnreachNlri) =
                    attr_type
                {
                    return Err(UpdateMessageError::MalformedAttributeList);
                }
                continue;
            }

            let registry = &cxt.registry.attrs;
            let parsed = registry.parse(attr_type_raw, &mut value.clone(), cxt);
            match parsed {
                Ok(Attr::Nexthop(addr)) => *nexthop = Some(addr),
                Ok(Attr::MpReach(attr)) => *mp_reach = Some(attr),
                Ok(Attr::MpUnreach(attr)) => *mp_unreach = Some(attr),
                Ok(attr) => builder.insert(attr),
                Err(ParseError::Decode(error)) => {
                    Debug::NbrAttrError(attr_type_raw, error).log();
                    match error {
                        AttrError::Discard => (),
                        AttrError::Withdraw => builder.withdraw = true,
                        AttrError::Reset => {
                            return Err(
                                UpdateMessageError::OptionalAttributeError,
                            );
                        }
                    }
                }
                // RFC 4271 - Sections 6.3 and 9: unrecognized well-known
                // attributes are an error, optional non-transitive ones are
                // ignored, and optional transitive ones are kept with the
                // Partial bit set.
                Err(ParseError::UnknownType(_)) => {
                    if !attr_flags.contains(AttrFlags::OPTIONAL) {
                        return Err(
                            UpdateMessageError::UnrecognizedWellKnownAttribute,
                        );
                    }
                    if attr_flags.contains(AttrFlags::TRANSITIVE) {
                        attr_flags.insert(AttrFlags::PARTIAL);
                        builder.unknown.push(UnknownAttr::new(
                            attr_type_raw,
                            attr_flags,
                            value,
                        ));
                    }
                }
            }
        }

        // RFC 7606 - Section 3.d:
        // "If any of the well-known mandatory attributes are not present in
        //  an UPDATE message, then "treat-as-withdraw" MUST be used".
        let local_pref_required = cxt.peer_type == PeerType::Internal;
        let nexthop_required = nlri_present;
        if (local_pref_required && builder.local_pref.is_none())
            || (nexthop_required && nexthop.is_none())
        {
            builder.withdraw = true;
        }
        Ok(builder.build())
    }

    // Returns the number of bytes the attributes take on the wire, excluding
    // NEXT_HOP and the multiprotocol attributes.
    pub(crate) fn length(&self, cxt: &EncodeCxt) -> usize {
        let mut buf = BytesMut::new();
        self.encode(&mut buf, None, cxt);
        buf.len()
    }
}

// Attributes collected while walking the path attribute list of an UPDATE
// message.
#[derive(Default)]
struct AttrsBuilder {
    origin: Option<Origin>,
    as_path: Option<AsPath>,
    as4_path: Option<AsPath>,
    med: Option<u32>,
    local_pref: Option<u32>,
    aggregator: Option<Aggregator>,
    as4_aggregator: Option<Aggregator>,
    atomic_aggregate: bool,
    originator_id: Option<Ipv4Addr>,
    cluster_list: Option<ClusterList>,
    comm: Option<Comms>,
    ext_comm: Option<ExtComms>,
    extv6_comm: Option<Extv6Comms>,
    large_comm: Option<LargeComms>,
    link_state: Option<Bytes>,
    unknown: Vec<UnknownAttr>,
    withdraw: bool,
}

// ===== impl AttrsBuilder =====

impl AttrsBuilder {
    // NEXT_HOP and the multiprotocol attributes aren't part of `Attrs` and
    // must be handled by the caller.
    fn insert(&mut self, attr: Attr) {
        match attr {
            Attr::Origin(value) => self.origin = Some(value),
            Attr::AsPath(value) => self.as_path = Some(value),
            Attr::Med(value) => self.med = Some(value),
            Attr::LocalPref(value) => self.local_pref = Some(value),
            Attr::AtomicAggregate => self.atomic_aggregate = true,
            Attr::Aggregator(value) => self.aggregator = Some(value),
            Attr::Communities(value) => self.comm = Some(value),
            Attr::OriginatorId(value) => self.originator_id = Some(value),
            Attr::ClusterList(value) => self.cluster_list = Some(value),
            Attr::ExtCommunities(value) => self.ext_comm = Some(value),
            Attr::As4Path(value) => self.as4_path = Some(value),
            Attr::As4Aggregator(value) => self.as4_aggregator = Some(value),
            Attr::Extv6Communities(value) => self.extv6_comm = Some(value),
            Attr::LinkState(value) => self.link_state = Some(value),
            Attr::LargeCommunities(value) => self.large_comm = Some(value),
            Attr::Nexthop(_) | Attr::MpReach(_) | Attr::MpUnreach(_) => (),
        }
    }

    // Returns `None` when the UPDATE must be treated as a withdrawal,
    // including when ORIGIN or AS_PATH is missing.
    fn build(self) -> Option<Attrs> {
        if self.withdraw {
            return None;
        }
        let base = BaseAttrs {
            origin: self.origin?,
            as_path: self.as_path?,
            as4_path: self.as4_path,
            nexthop: None,
            ll_nexthop: None,
            med: self.med,
            local_pref: self.local_pref,
            aggregator: self.aggregator,
            as4_aggregator: self.as4_aggregator,
            atomic_aggregate: self.atomic_aggregate,
            originator_id: self.originator_id,
            cluster_list: self.cluster_list,
        };
        Some(Attrs {
            base,
            comm: self.comm,
            ext_comm: self.ext_comm,
            extv6_comm: self.extv6_comm,
            large_comm: self.large_comm,
            link_state: self.link_state,
            unknown: self.unknown,
        })
    }
}

// ===== ORIGIN attribute =====

mod origin {
    use super::*;
    const LEN: usize = 1;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::Origin(origin) = attr else { unreachable!() };
        buf.put_u8(*origin as u8);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        if buf.remaining() != LEN {
            return Err(AttrError::Withdraw);
        }

        let value = buf.try_get_u8()?;
        Origin::from_u8(value)
            .map(Attr::Origin)
            .ok_or(AttrError::Withdraw)
    }
}

// ===== AS_PATH and AS4_PATH attributes =====

mod as_path {
    use super::*;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, cxt: &EncodeCxt) {
        let Attr::AsPath(as_path) = attr else { unreachable!() };
        as_path.encode(buf, cxt.four_byte_asn());
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        let value = AsPath::decode(buf, AttrType::AsPath, cxt.four_byte_asn())?;

        // First AS check for eBGP peers.
        if cxt.peer_type == PeerType::External
            && value
                .segments
                .iter()
                .find(|segment| segment.seg_type == AsPathSegmentType::Sequence)
                .and_then(|segment| segment.members.front().copied())
                != Some(cxt.peer_as)
        {
            return Err(AttrError::Withdraw);
        }

        Ok(Attr::AsPath(value))
    }
}

mod as4_path {
    use super::*;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::As4Path(as_path) = attr else { unreachable!() };
        as_path.encode(buf, true);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        // RFC 6793: AS4_PATH received from a NEW speaker is discarded.
        if cxt.four_byte_asn() {
            return Err(AttrError::Discard);
        }

        AsPath::decode(buf, AttrType::As4Path, true).map(Attr::As4Path)
    }
}

// ===== impl AsPath =====

impl AsPath {
    fn encode(&self, buf: &mut BytesMut, four_byte_asns: bool) {
        for segment in &self.segments {
            segment.encode(buf, four_byte_asns);
        }
    }

    fn decode(
        buf: &mut Bytes,
        attr_type: AttrType,
        four_byte_asns: bool,
    ) -> Result<Self, AttrError> {
        let mut segments = VecDeque::new();
        while buf.has_remaining() {
            let segment =
                AsPathSegment::decode(buf, attr_type, four_byte_asns)?;
            segments.push_back(segment);
        }
        Ok(AsPath { segments })
    }

    pub(crate) fn path_length(&self) -> u32 {
        self.segments
            .iter()
            .map(|segment| match segment.seg_type {
                AsPathSegmentType::Set => 1,
                AsPathSegmentType::Sequence => segment.members.len(),
                // RFC 5065 - Section 5.3:
                // "When comparing routes using AS_PATH length, CONFED_SEQUENCE
                // and CONFED_SETs SHOULD NOT be counted".
                AsPathSegmentType::ConfedSequence
                | AsPathSegmentType::ConfedSet => 0,
            })
            .sum::<usize>() as u32
    }

    pub(crate) fn first(&self) -> Option<u32> {
        self.segments
            .front()
            .filter(|segment| segment.seg_type == AsPathSegmentType::Sequence)
            .and_then(|segment| segment.members.front().copied())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.segments
            .iter()
            .flat_map(|segment| segment.members.iter().copied())
    }

    pub(crate) fn prepend(&mut self, asn: u32) {
        if let Some(segment) = self.segments.front_mut()
            && segment.seg_type == AsPathSegmentType::Sequence
            && segment.members.len() < 255
        {
            segment.members.push_front(asn);
        } else {
            self.segments.push_front(AsPathSegment {
                seg_type: AsPathSegmentType::Sequence,
                members: [asn].into(),
            });
        }
    }

    pub(crate) fn contains(&self, asn: u32) -> bool {
        self.segments.iter().any(|segment| segment.contains(asn))
    }

    // Returns whether any confederation segment contains the given ASN.
    pub(crate) fn confed_contains(&self, asn: u32) -> bool {
        self.segments
            .iter()
            .filter(|segment| {
                matches!(
                    segment.seg_type,
                    AsPathSegmentType::ConfedSequence
                        | AsPathSegmentType::ConfedSet
                )
            })
            .any(|segment| segment.contains(asn))
    }
}

impl std::fmt::Display for AsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, " ")?;
            }
            first = false;

            let members = segment
                .members
                .iter()
                .map(|asn| asn.to_string())
                .collect::<Vec<_>>()
                .join(" ");
            match segment.seg_type {
                AsPathSegmentType::Sequence => write!(f, "{members}")?,
                AsPathSegmentType::Set => write!(f, "{{{members}}}")?,
                AsPathSegmentType::ConfedSequence => write!(f, "({members})")?,
                AsPathSegmentType::ConfedSet => write!(f, "[{members}]")?,
            }
        }
        Ok(())
    }
}

// ===== impl AsPathSegment =====

impl AsPathSegment {
    fn encode(&self, buf: &mut BytesMut, four_byte_asns: bool) {
        buf.put_u8(self.seg_type as u8);
        buf.put_u8(self.members.len() as u8);
        for member in &self.members {
            encode_asn(buf, *member, four_byte_asns);
        }
    }

    fn decode(
        buf: &mut Bytes,
        attr_type: AttrType,
        four_byte_asns: bool,
    ) -> Result<Self, AttrError> {
        // Malformed AS_PATH triggers treat-as-withdraw, while a malformed
        // AS4_PATH is simply discarded.
        let malformed = if attr_type == AttrType::AsPath {
            AttrError::Withdraw
        } else {
            AttrError::Discard
        };

        // Decode segment type.
        let seg_type = buf.try_get_u8().map_err(|_| malformed)?;
        let Some(seg_type) = AsPathSegmentType::from_u8(seg_type) else {
            return Err(malformed);
        };

        // Decode segment length.
        let seg_len = buf.try_get_u8().map_err(|_| malformed)?;
        if seg_len == 0 {
            return Err(malformed);
        }

        // Decode segment members.
        let members = (0..seg_len as usize)
            .map(|_| decode_asn(buf, four_byte_asns))
            .collect::<Result<VecDeque<_>, _>>()
            .map_err(|_| malformed)?;
        let segment = AsPathSegment { seg_type, members };

        // RFC 7607's AS 0 processing.
        if segment.contains(0) {
            return Err(malformed);
        }

        Ok(segment)
    }

    fn contains(&self, asn: u32) -> bool {
        self.members.iter().any(|member| asn == *member)
    }
}

// ===== NEXT_HOP attribute =====

mod nexthop {
    use super::*;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::Nexthop(addr) = attr else { unreachable!() };
        buf.put_ipv4(addr);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        if buf.remaining() != Ipv4Addr::LENGTH {
            return Err(AttrError::Withdraw);
        }

        let value = buf.try_get_ipv4()?;
        Ok(Attr::Nexthop(value))
    }
}

// ===== MULTI_EXIT_DISC attribute =====

mod med {
    use super::*;
    const LEN: usize = 4;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::Med(metric) = attr else { unreachable!() };
        buf.put_u32(*metric);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        if buf.remaining() != LEN {
            return Err(AttrError::Withdraw);
        }

        let value = buf.try_get_u32()?;
        Ok(Attr::Med(value))
    }
}

// ===== LOCAL_PREF attribute =====

mod local_pref {
    use super::*;
    const LEN: usize = 4;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::LocalPref(local_pref) = attr else { unreachable!() };
        buf.put_u32(*local_pref);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        if cxt.peer_type == PeerType::External {
            return Err(AttrError::Discard);
        }

        if buf.remaining() != LEN {
            return Err(AttrError::Withdraw);
        }

        let value = buf.try_get_u32()?;
        Ok(Attr::LocalPref(value))
    }
}

// ===== ATOMIC_AGGREGATE attribute =====

mod atomic_aggregate {
    use super::*;

    pub(super) fn encode(
        _attr: &Attr,
        _buf: &mut BytesMut,
        _cxt: &EncodeCxt,
    ) {
        // Zero-length attribute.
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        if buf.has_remaining() {
            return Err(AttrError::Discard);
        }

        Ok(Attr::AtomicAggregate)
    }
}

// ===== AGGREGATOR and AS4_AGGREGATOR attributes =====

mod aggregator {
    use super::*;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, cxt: &EncodeCxt) {
        let Attr::Aggregator(aggregator) = attr else { unreachable!() };
        aggregator.encode(buf, cxt.four_byte_asn());
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        Aggregator::decode(buf, cxt.four_byte_asn()).map(Attr::Aggregator)
    }
}

mod as4_aggregator {
    use super::*;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::As4Aggregator(aggregator) = attr else { unreachable!() };
        aggregator.encode(buf, true);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        if cxt.four_byte_asn() {
            return Err(AttrError::Discard);
        }

        Aggregator::decode(buf, true).map(Attr::As4Aggregator)
    }
}

// ===== impl Aggregator =====

impl Aggregator {
    fn encode(&self, buf: &mut BytesMut, four_byte_asns: bool) {
        encode_asn(buf, self.asn, four_byte_asns);
        buf.put_ipv4(&self.identifier);
    }

    fn decode(
        buf: &mut Bytes,
        four_byte_asns: bool,
    ) -> Result<Self, AttrError> {
        let len = if four_byte_asns { 8 } else { 6 };
        if buf.remaining() != len {
            return Err(AttrError::Discard);
        }

        let asn = decode_asn(buf, four_byte_asns)?;
        let identifier = buf.try_get_ipv4()?;

        // RFC 7607's AS 0 processing.
        if asn == 0 {
            return Err(AttrError::Discard);
        }

        Ok(Aggregator { asn, identifier })
    }
}

// ===== ORIGINATOR_ID attribute =====

mod originator_id {
    use super::*;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::OriginatorId(originator_id) = attr else { unreachable!() };
        buf.put_ipv4(originator_id);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        if cxt.peer_type == PeerType::External {
            return Err(AttrError::Discard);
        }

        if buf.remaining() != Ipv4Addr::LENGTH {
            return Err(AttrError::Withdraw);
        }

        let value = buf.try_get_ipv4()?;
        Ok(Attr::OriginatorId(value))
    }
}

// ===== impl ClusterList =====

impl ClusterList {
    fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::ClusterList(cluster_list) = attr else { unreachable!() };
        for cluster_id in &cluster_list.0 {
            buf.put_ipv4(cluster_id);
        }
    }

    fn decode(buf: &mut Bytes, cxt: &DecodeCxt) -> Result<Attr, AttrError> {
        if cxt.peer_type == PeerType::External {
            return Err(AttrError::Discard);
        }

        if buf.remaining() == 0 || buf.remaining() % Ipv4Addr::LENGTH != 0 {
            return Err(AttrError::Withdraw);
        }

        let mut list = vec![];
        while buf.has_remaining() {
            let cluster_id = buf.try_get_ipv4()?;
            list.push(cluster_id);
        }

        Ok(Attr::ClusterList(ClusterList(list)))
    }

    pub(crate) fn contains(&self, cluster_id: Ipv4Addr) -> bool {
        self.0.contains(&cluster_id)
    }

    pub(crate) fn prepend(&mut self, cluster_id: Ipv4Addr) {
        self.0.insert(0, cluster_id);
    }
}

// ===== impl MpReachNlri =====

impl MpReachNlri {
    pub const MIN_LEN: usize = 5;

    fn encode(attr: &Attr, buf: &mut BytesMut, cxt: &EncodeCxt) {
        let Attr::MpReach(mp_reach) = attr else { unreachable!() };
        buf.put_u16(mp_reach.afi_safi.afi() as u16);
        buf.put_u8(mp_reach.afi_safi.safi() as u8);
        mp_reach.nexthop.encode(buf);
        buf.put_u8(0);
        for entry in &mp_reach.nlri {
            entry.encode(buf, cxt);
        }
    }

    fn decode(buf: &mut Bytes, cxt: &DecodeCxt) -> Result<Attr, AttrError> {
        if buf.remaining() < Self::MIN_LEN {
            return Err(AttrError::Reset);
        }

        // Parse AFI/SAFI.
        let Some(afi_safi) = decode_afi_safi(buf)? else {
            // Ignore unknown address family.
            return Err(AttrError::Discard);
        };

        // Parse nexthop.
        let nexthop_len = buf.try_get_u8()? as usize;
        if nexthop_len + 1 > buf.remaining() {
            return Err(AttrError::Reset);
        }
        let mut buf_nexthop = buf.split_to(nexthop_len);
        let nexthop = MpNexthop::decode(&mut buf_nexthop)?;
        let _reserved = buf.try_get_u8()?;

        // Parse NLRI.
        let nlri = decode_nlri(buf, afi_safi, cxt)?;

        Ok(Attr::MpReach(MpReachNlri {
            afi_safi,
            nexthop,
            nlri,
        }))
    }
}

// ===== impl MpUnreachNlri =====

impl MpUnreachNlri {
    pub const MIN_LEN: usize = 3;

    fn encode(attr: &Attr, buf: &mut BytesMut, cxt: &EncodeCxt) {
        let Attr::MpUnreach(mp_unreach) = attr else { unreachable!() };
        buf.put_u16(mp_unreach.afi_safi.afi() as u16);
        buf.put_u8(mp_unreach.afi_safi.safi() as u8);
        for entry in &mp_unreach.nlri {
            entry.encode(buf, cxt);
        }
    }

    fn decode(buf: &mut Bytes, cxt: &DecodeCxt) -> Result<Attr, AttrError> {
        if buf.remaining() < Self::MIN_LEN {
            return Err(AttrError::Reset);
        }

        // Parse AFI/SAFI.
        let Some(afi_safi) = decode_afi_safi(buf)? else {
            // Ignore unknown address family.
            return Err(AttrError::Discard);
        };

        // Parse withdrawn routes.
        let nlri = decode_nlri(buf, afi_safi, cxt)?;

        Ok(Attr::MpUnreach(MpUnreachNlri { afi_safi, nlri }))
    }
}

// ===== impl MpNexthop =====

impl MpNexthop {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            MpNexthop::None => {
                buf.put_u8(0);
            }
            MpNexthop::Ipv4(addr) => {
                buf.put_u8(Ipv4Addr::LENGTH as u8);
                buf.put_ipv4(addr);
            }
            MpNexthop::Ipv6 { global, link_local } => {
                let len =
                    Ipv6Addr::LENGTH * (1 + link_local.is_some() as usize);
                buf.put_u8(len as u8);
                buf.put_ipv6(global);
                if let Some(link_local) = link_local {
                    buf.put_ipv6(link_local);
                }
            }
            MpNexthop::VpnIpv4(addr) => {
                let len = RouteDistinguisher::LENGTH + Ipv4Addr::LENGTH;
                buf.put_u8(len as u8);
                buf.put_u64(0);
                buf.put_ipv4(addr);
            }
            MpNexthop::VpnIpv6 { global, link_local } => {
                let len = (RouteDistinguisher::LENGTH + Ipv6Addr::LENGTH)
                    * (1 + link_local.is_some() as usize);
                buf.put_u8(len as u8);
                buf.put_u64(0);
                buf.put_ipv6(global);
                if let Some(link_local) = link_local {
                    buf.put_u64(0);
                    buf.put_ipv6(link_local);
                }
            }
        }
    }

    fn decode(buf: &mut Bytes) -> Result<Self, AttrError> {
        const RD_LEN: usize = RouteDistinguisher::LENGTH;
        const V4_LEN: usize = Ipv4Addr::LENGTH;
        const V6_LEN: usize = Ipv6Addr::LENGTH;

        let nexthop = match buf.remaining() {
            0 => MpNexthop::None,
            V4_LEN => MpNexthop::Ipv4(buf.try_get_ipv4()?),
            V6_LEN => MpNexthop::Ipv6 {
                global: buf.try_get_ipv6()?,
                link_local: None,
            },
            len if len == V6_LEN * 2 => MpNexthop::Ipv6 {
                global: buf.try_get_ipv6()?,
                link_local: Some(buf.try_get_ipv6()?),
            },
            len if len == RD_LEN + V4_LEN => {
                buf.advance(RD_LEN);
                MpNexthop::VpnIpv4(buf.try_get_ipv4()?)
            }
            len if len == RD_LEN + V6_LEN => {
                buf.advance(RD_LEN);
                MpNexthop::VpnIpv6 {
                    global: buf.try_get_ipv6()?,
                    link_local: None,
                }
            }
            len if len == (RD_LEN + V6_LEN) * 2 => {
                buf.advance(RD_LEN);
                let global = buf.try_get_ipv6()?;
                buf.advance(RD_LEN);
                let link_local = buf.try_get_ipv6()?;
                MpNexthop::VpnIpv6 {
                    global,
                    link_local: Some(link_local),
                }
            }
            _ => return Err(AttrError::Reset),
        };

        Ok(nexthop)
    }

    // Returns the global next hop address, if any.
    pub fn addr(&self) -> Option<IpAddr> {
        match self {
            MpNexthop::None => None,
            MpNexthop::Ipv4(addr) | MpNexthop::VpnIpv4(addr) => {
                Some((*addr).into())
            }
            MpNexthop::Ipv6 { global, .. }
            | MpNexthop::VpnIpv6 { global, .. } => Some((*global).into()),
        }
    }

    pub fn link_local(&self) -> Option<Ipv6Addr> {
        match self {
            MpNexthop::Ipv6 { link_local, .. }
            | MpNexthop::VpnIpv6 { link_local, .. } => *link_local,
            _ => None,
        }
    }
}

// ===== BGP-LS attribute =====

mod link_state {
    use super::*;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::LinkState(value) = attr else { unreachable!() };
        buf.put_slice(value);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        let value = buf.split_to(buf.remaining());
        Ok(Attr::LinkState(value))
    }
}

// ===== community attributes =====

mod comm {
    use super::*;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::Communities(comm) = attr else { unreachable!() };
        comm.encode(buf);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        Comms::decode(buf).map(Attr::Communities)
    }
}

mod ext_comm {
    use super::*;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::ExtCommunities(comm) = attr else { unreachable!() };
        comm.encode(buf);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        ExtComms::decode(buf).map(Attr::ExtCommunities)
    }
}

mod extv6_comm {
    use super::*;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::Extv6Communities(comm) = attr else { unreachable!() };
        comm.encode(buf);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        Extv6Comms::decode(buf).map(Attr::Extv6Communities)
    }
}

mod large_comm {
    use super::*;

    pub(super) fn encode(attr: &Attr, buf: &mut BytesMut, _cxt: &EncodeCxt) {
        let Attr::LargeCommunities(comm) = attr else { unreachable!() };
        comm.encode(buf);
    }

    pub(super) fn decode(
        buf: &mut Bytes,
        _cxt: &DecodeCxt,
    ) -> Result<Attr, AttrError> {
        LargeComms::decode(buf).map(Attr::LargeCommunities)
    }
}

// ===== impl Comm =====

impl CommType for Comm {
    const TYPE: AttrType = AttrType::Communities;
    const LENGTH: usize = 4;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32(self.0);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, TryGetError> {
        let value = buf.try_get_u32()?;
        Ok(Self(value))
    }
}

// ===== impl ExtComm =====

impl CommType for ExtComm {
    const TYPE: AttrType = AttrType::ExtCommunities;
    const LENGTH: usize = 8;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.0);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, TryGetError> {
        let mut value = [0; 8];
        buf.try_copy_to_slice(&mut value)?;
        Ok(Self(value))
    }
}

// ===== impl Extv6Comm =====

impl CommType for Extv6Comm {
    const TYPE: AttrType = AttrType::Extv6Community;
    const LENGTH: usize = 20;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_ipv6(&self.0);
        buf.put_u32(self.1);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, TryGetError> {
        let addr = buf.try_get_ipv6()?;
        let local = buf.try_get_u32()?;
        Ok(Self(addr, local))
    }
}

// ===== impl LargeComm =====

impl CommType for LargeComm {
    const TYPE: AttrType = AttrType::LargeCommunity;
    const LENGTH: usize = 12;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.0);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, TryGetError> {
        let mut value = [0; 12];
        buf.try_copy_to_slice(&mut value)?;
        Ok(Self(value))
    }
}

// ===== impl CommList =====

impl<T: CommType> CommList<T> {
    fn encode(&self, buf: &mut BytesMut) {
        for value in &self.0 {
            value.encode(buf);
        }
    }

    fn decode(buf: &mut Bytes) -> Result<Self, AttrError> {
        if buf.remaining() == 0 || buf.remaining() % T::LENGTH != 0 {
            return Err(AttrError::Withdraw);
        }

        let mut list = BTreeSet::new();
        while buf.remaining() >= T::LENGTH {
            let value = T::decode(buf)?;
            list.insert(value);
        }

        Ok(CommList(list))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }
}

// ===== impl UnknownAttr =====

impl UnknownAttr {
    fn encode(&self, buf: &mut BytesMut) {
        let start_pos = buf.len();
        buf.put_u8((self.flags - AttrFlags::EXTENDED).bits());
        buf.put_u8(self.attr_type);
        buf.put_u8(0);
        buf.put_slice(&self.value);
        rewrite_attr_len(
            buf,
            start_pos,
            self.flags.contains(AttrFlags::EXTENDED),
        );
    }
}

// ===== global functions =====

// Encodes a path attribute (header and value) using the serializer registered
// for its type.
//
// The one-octet length form is used whenever the value fits in it.
pub(crate) fn encode_attr(attr: &Attr, buf: &mut BytesMut, cxt: &EncodeCxt) {
    let attr_type = attr.attr_type();
    let start_pos = buf.len();
    buf.put_u8(attribute_flags(attr_type).bits());
    buf.put_u8(attr_type as u8);
    // The length field will be initialized later.
    buf.put_u8(0);

    // Encode attribute value.
    if cxt.registry.attrs.serialize(attr, buf, cxt).is_err() {
        buf.truncate(start_pos);
        return;
    }

    // Rewrite attribute length.
    rewrite_attr_len(buf, start_pos, false);
}

// ===== helper functions =====

// Splits off the next attribute, returning its flags, type code and value.
// Returns `None` if the attribute is truncated.
fn decode_attr_header(buf: &mut Bytes) -> Option<(AttrFlags, u8, Bytes)> {
    let attr_flags = AttrFlags::from_bits_truncate(buf.try_get_u8().ok()?);
    let attr_type = buf.try_get_u8().ok()?;
    let attr_len = if attr_flags.contains(AttrFlags::EXTENDED) {
        buf.try_get_u16().ok()? as usize
    } else {
        buf.try_get_u8().ok()? as usize
    };
    let value = buf.try_split_to(attr_len).ok()?;
    Some((attr_flags, attr_type, value))
}

// Rewrites the length of the attribute starting at `start_pos`, assuming a
// one-octet length field placeholder was written. Values longer than 255
// octets are shifted right by one octet to make room for the extended length.
fn rewrite_attr_len(buf: &mut BytesMut, start_pos: usize, extended: bool) {
    let value_pos = start_pos + ATTR_MIN_LEN as usize;
    let value_len = buf.len() - value_pos;
    if !extended && value_len <= u8::MAX as usize {
        buf[start_pos + 2] = value_len as u8;
        return;
    }

    buf.put_u8(0);
    buf.copy_within(value_pos..value_pos + value_len, value_pos + 1);
    buf[start_pos] |= AttrFlags::EXTENDED.bits();
    buf[start_pos + 2..start_pos + 4]
        .copy_from_slice(&(value_len as u16).to_be_bytes());
}

fn attribute_flags(attr_type: AttrType) -> AttrFlags {
    match attr_type {
        // Well-known.
        AttrType::Origin
        | AttrType::AsPath
        | AttrType::Nexthop
        | AttrType::LocalPref
        | AttrType::AtomicAggregate => AttrFlags::TRANSITIVE,

        // Optional non-transitive.
        AttrType::Med
        | AttrType::OriginatorId
        | AttrType::ClusterList
        | AttrType::MpReachNlri
        | AttrType::MpUnreachNlri
        | AttrType::BgpLs => AttrFlags::OPTIONAL,

        // Optional transitive.
        AttrType::Aggregator
        | AttrType::Communities
        | AttrType::ExtCommunities
        | AttrType::As4Path
        | AttrType::As4Aggregator
        | AttrType::Extv6Community
        | AttrType::LargeCommunity => {
            AttrFlags::TRANSITIVE | AttrFlags::OPTIONAL
        }
    }
}

fn decode_afi_safi(buf: &mut Bytes) -> Result<Option<AfiSafi>, AttrError> {
    let afi = buf.try_get_u16()?;
    let safi = buf.try_get_u8()?;
    let (Some(afi), Some(safi)) = (Afi::from_u16(afi), Safi::from_u8(safi))
    else {
        return Ok(None);
    };
    Ok(AfiSafi::new(afi, safi))
}

// Decodes the NLRI list of a multiprotocol attribute.
//
// Address families without a registered NLRI codec cause the attribute to be
// discarded, while malformed NLRI reset the session.
fn decode_nlri(
    buf: &mut Bytes,
    afi_safi: AfiSafi,
    cxt: &DecodeCxt,
) -> Result<Vec<NlriEntry>, AttrError> {
    NlriEntry::decode_list(buf, afi_safi, cxt).map_err(|error| match error {
        ParseError::UnknownType(_) => AttrError::Discard,
        ParseError::Decode(_) => AttrError::Reset,
    })
}

fn encode_asn(buf: &mut BytesMut, asn: u32, four_byte_asns: bool) {
    if four_byte_asns {
        buf.put_u32(asn)
    } else {
        buf.put_u16(asn as u16)
    }
}

fn decode_asn(
    buf: &mut Bytes,
    four_byte_asns: bool,
) -> Result<u32, TryGetError> {
    if four_byte_asns {
        buf.try_get_u32()
    } else {
        buf.try_get_u16().map(|asn| asn as u32)
    }
}
