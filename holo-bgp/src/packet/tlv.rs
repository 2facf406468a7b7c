//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::{Buf, BufMut, Bytes, BytesMut};
use holo_utils::bytes::BytesExt;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::packet::consts::{Afi, AfiSafi, Safi};
use crate::packet::error::TlvError;
use crate::registry::{
    Codec, CodecRegistry, ParseError, Registration, Registry,
};

pub const TLV_HDR_SIZE: usize = 4;

//
// Information TLV.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |          Information Type     |       Information Length      |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                 Information (variable)                        |
// ~                                                               ~
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum InfoTlv {
    String(String),
    Description(String),
    Name(String),
}

//
// Statistics TLV.
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |            Stat Type          |          Stat Len             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                        Stat Data                              |
// ~                                                               ~
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// Counters are 32-bit values, gauges are 64-bit values. The per-AFI/SAFI
// gauges are prefixed by the AFI (2 octets) and the SAFI (1 octet).
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum StatTlv {
    RejectedPrefixes(u32),
    InvalidatedClusterListLoop(u32),
    InvalidatedAsPathLoop(u32),
    InvalidatedOriginatorId(u32),
    InvalidatedAsConfedLoop(u32),
    AdjRibInRoutes(u64),
    LocRibRoutes(u64),
    PerAfiSafiAdjRibIn { afi_safi: AfiSafi, routes: u64 },
    PerAfiSafiLocRib { afi_safi: AfiSafi, routes: u64 },
}

// Statistics TLV types.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum StatTlvType {
    RejectedPrefixes = 0,
    InvalidatedClusterListLoop = 3,
    InvalidatedAsPathLoop = 4,
    InvalidatedOriginatorId = 5,
    InvalidatedAsConfedLoop = 6,
    AdjRibInRoutes = 7,
    LocRibRoutes = 8,
    PerAfiSafiAdjRibIn = 9,
    PerAfiSafiLocRib = 10,
}

// Information TLV types.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum InfoTlvType {
    String = 0,
    Description = 1,
    Name = 2,
}

pub struct InfoTlvCodec;
pub struct StatTlvCodec;

//
// Per-neighbor statistics report.
//
// Encoding format:
//
// +-------------------------------------+
// | Information TLVs Length (2 octets)  |
// +-------------------------------------+
// | Information TLVs (variable)         |
// +-------------------------------------+
// | Stats Count (4 octets)              |
// +-------------------------------------+
// | Statistics TLVs (variable)          |
// +-------------------------------------+
//
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PeerReport {
    pub info: Vec<InfoTlv>,
    pub stats: Vec<StatTlv>,
}

// ===== impl InfoTlv =====

impl InfoTlv {
    pub fn tlv_type(&self) -> InfoTlvType {
        match self {
            InfoTlv::String(_) => InfoTlvType::String,
            InfoTlv::Description(_) => InfoTlvType::Description,
            InfoTlv::Name(_) => InfoTlvType::Name,
        }
    }

    fn value(&self) -> &str {
        match self {
            InfoTlv::String(value)
            | InfoTlv::Description(value)
            | InfoTlv::Name(value) => value,
        }
    }

    fn decode_value(
        tlv_type: u16,
        buf: &mut Bytes,
    ) -> Result<String, TlvError> {
        let value = buf.split_to(buf.remaining());
        String::from_utf8(value.to_vec())
            .map_err(|_| TlvError::InvalidUtf8(tlv_type))
    }
}

// ===== impl StatTlv =====

impl StatTlv {
    const COUNTER_LEN: usize = 4;
    const GAUGE_LEN: usize = 8;
    const AFI_SAFI_GAUGE_LEN: usize = 11;

    pub fn tlv_type(&self) -> StatTlvType {
        match self {
            StatTlv::RejectedPrefixes(_) => StatTlvType::RejectedPrefixes,
            StatTlv::InvalidatedClusterListLoop(_) => {
                StatTlvType::InvalidatedClusterListLoop
            }
            StatTlv::InvalidatedAsPathLoop(_) => {
                StatTlvType::InvalidatedAsPathLoop
            }
            StatTlv::InvalidatedOriginatorId(_) => {
                StatTlvType::InvalidatedOriginatorId
            }
            StatTlv::InvalidatedAsConfedLoop(_) => {
                StatTlvType::InvalidatedAsConfedLoop
            }
            StatTlv::AdjRibInRoutes(_) => StatTlvType::AdjRibInRoutes,
            StatTlv::LocRibRoutes(_) => StatTlvType::LocRibRoutes,
            StatTlv::PerAfiSafiAdjRibIn { .. } => {
                StatTlvType::PerAfiSafiAdjRibIn
            }
            StatTlv::PerAfiSafiLocRib { .. } => StatTlvType::PerAfiSafiLocRib,
        }
    }

    fn encode_value(&self, buf: &mut BytesMut) {
        match self {
            StatTlv::RejectedPrefixes(value)
            | StatTlv::InvalidatedClusterListLoop(value)
            | StatTlv::InvalidatedAsPathLoop(value)
            | StatTlv::InvalidatedOriginatorId(value)
            | StatTlv::InvalidatedAsConfedLoop(value) => {
                buf.put_u32(*value);
            }
            StatTlv::AdjRibInRoutes(value) | StatTlv::LocRibRoutes(value) => {
                buf.put_u64(*value);
            }
            StatTlv::PerAfiSafiAdjRibIn { afi_safi, routes }
            | StatTlv::PerAfiSafiLocRib { afi_safi, routes } => {
                buf.put_u16(afi_safi.afi() as u16);
                buf.put_u8(afi_safi.safi() as u8);
                buf.put_u64(*routes);
            }
        }
    }

    fn decode_counter(
        tlv_type: u16,
        buf: &mut Bytes,
    ) -> Result<u32, TlvError> {
        check_len(tlv_type, buf, Self::COUNTER_LEN)?;
        Ok(buf.try_get_u32()?)
    }

    fn decode_gauge(tlv_type: u16, buf: &mut Bytes) -> Result<u64, TlvError> {
        check_len(tlv_type, buf, Self::GAUGE_LEN)?;
        Ok(buf.try_get_u64()?)
    }

    fn decode_afi_safi_gauge(
        tlv_type: u16,
        buf: &mut Bytes,
    ) -> Result<(AfiSafi, u64), TlvError> {
        check_len(tlv_type, buf, Self::AFI_SAFI_GAUGE_LEN)?;
        let afi = buf.try_get_u16()?;
        let safi = buf.try_get_u8()?;
        let afi_safi = Afi::from_u16(afi)
            .zip(Safi::from_u8(safi))
            .and_then(|(afi, safi)| AfiSafi::new(afi, safi))
            .ok_or(TlvError::InvalidAfiSafi { afi, safi })?;
        let routes = buf.try_get_u64()?;
        Ok((afi_safi, routes))
    }
}

// ===== impl InfoTlvCodec =====

impl Codec for InfoTlvCodec {
    const NAME: &'static str = "information-tlv";

    type Key = u16;
    type Object = InfoTlv;
    type DecodeCxt = ();
    type EncodeCxt = ();
    type Error = TlvError;

    fn object_key(tlv: &InfoTlv) -> u16 {
        tlv.tlv_type() as u16
    }
}

// ===== impl StatTlvCodec =====

impl Codec for StatTlvCodec {
    const NAME: &'static str = "statistics-tlv";

    type Key = u16;
    type Object = StatTlv;
    type DecodeCxt = ();
    type EncodeCxt = ();
    type Error = TlvError;

    fn object_key(tlv: &StatTlv) -> u16 {
        tlv.tlv_type() as u16
    }
}

// ===== impl PeerReport =====

impl PeerReport {
    pub fn encode(&self, registry: &CodecRegistry) -> Bytes {
        let mut buf = BytesMut::new();

        // Information TLVs.
        let start_pos = buf.len();
        buf.put_u16(0);
        for tlv in &self.info {
            encode_tlv(&mut buf, tlv, &registry.info_tlvs);
        }
        let len = (buf.len() - start_pos - 2) as u16;
        buf[start_pos..start_pos + 2].copy_from_slice(&len.to_be_bytes());

        // Statistics TLVs.
        let count_pos = buf.len();
        buf.put_u32(0);
        let mut count: u32 = 0;
        for tlv in &self.stats {
            if encode_tlv(&mut buf, tlv, &registry.stat_tlvs) {
                count += 1;
            }
        }
        buf[count_pos..count_pos + 4].copy_from_slice(&count.to_be_bytes());

        buf.freeze()
    }

    pub fn decode(
        buf: &mut Bytes,
        registry: &CodecRegistry,
    ) -> Result<Self, TlvError> {
        // Information TLVs.
        let info_len = buf.try_get_u16()?;
        let mut buf_info = buf.try_split_to(info_len as usize)?;
        let mut info = vec![];
        while buf_info.has_remaining() {
            if let Some(tlv) = decode_tlv(&mut buf_info, &registry.info_tlvs)?
            {
                info.push(tlv);
            }
        }

        // Statistics TLVs.
        let count = buf.try_get_u32()?;
        let mut stats = vec![];
        for _ in 0..count {
            if let Some(tlv) = decode_tlv(buf, &registry.stat_tlvs)? {
                stats.push(tlv);
            }
        }

        Ok(PeerReport { info, stats })
    }
}

// ===== global functions =====

// Registers the built-in information TLV codecs.
pub(crate) fn register_info_codecs(
    registry: &Registry<InfoTlvCodec>,
) -> Vec<Registration> {
    let parsers: [(InfoTlvType, fn(String) -> InfoTlv); 3] = [
        (InfoTlvType::String, InfoTlv::String),
        (InfoTlvType::Description, InfoTlv::Description),
        (InfoTlvType::Name, InfoTlv::Name),
    ];

    parsers
        .into_iter()
        .flat_map(|(tlv_type, variant)| {
            let tlv_type = tlv_type as u16;
            [
                registry.register_parser(tlv_type, move |buf, _| {
                    InfoTlv::decode_value(tlv_type, buf).map(variant)
                }),
                registry.register_serializer(tlv_type, |tlv, buf, _| {
                    buf.put_slice(tlv.value().as_bytes())
                }),
            ]
        })
        .collect()
}

// Registers the built-in statistics TLV codecs.
pub(crate) fn register_stat_codecs(
    registry: &Registry<StatTlvCodec>,
) -> Vec<Registration> {
    type ParseFn = fn(u16, &mut Bytes) -> Result<StatTlv, TlvError>;

    let parsers: [(StatTlvType, ParseFn); 9] = [
        (StatTlvType::RejectedPrefixes, |tlv_type, buf| {
            StatTlv::decode_counter(tlv_type, buf)
                .map(StatTlv::RejectedPrefixes)
        }),
        (StatTlvType::InvalidatedClusterListLoop, |tlv_type, buf| {
            StatTlv::decode_counter(tlv_type, buf)
                .map(StatTlv::InvalidatedClusterListLoop)
        }),
        (StatTlvType::InvalidatedAsPathLoop, |tlv_type, buf| {
            StatTlv::decode_counter(tlv_type, buf)
                .map(StatTlv::InvalidatedAsPathLoop)
        }),
        (StatTlvType::InvalidatedOriginatorId, |tlv_type, buf| {
            StatTlv::decode_counter(tlv_type, buf)
                .map(StatTlv::InvalidatedOriginatorId)
        }),
        (StatTlvType::InvalidatedAsConfedLoop, |tlv_type, buf| {
            StatTlv::decode_counter(tlv_type, buf)
                .map(StatTlv::InvalidatedAsConfedLoop)
        }),
        (StatTlvType::AdjRibInRoutes, |tlv_type, buf| {
            StatTlv::decode_gauge(tlv_type, buf).map(StatTlv::AdjRibInRoutes)
        }),
        (StatTlvType::LocRibRoutes, |tlv_type, buf| {
            StatTlv::decode_gauge(tlv_type, buf).map(StatTlv::LocRibRoutes)
        }),
        (StatTlvType::PerAfiSafiAdjRibIn, |tlv_type, buf| {
            let (afi_safi, routes) =
                StatTlv::decode_afi_safi_gauge(tlv_type, buf)?;
            Ok(StatTlv::PerAfiSafiAdjRibIn { afi_safi, routes })
        }),
        (StatTlvType::PerAfiSafiLocRib, |tlv_type, buf| {
            let (afi_safi, routes) =
                StatTlv::decode_afi_safi_gauge(tlv_type, buf)?;
            Ok(StatTlv::PerAfiSafiLocRib { afi_safi, routes })
        }),
    ];

    parsers
        .into_iter()
        .flat_map(|(tlv_type, parser)| {
            let tlv_type = tlv_type as u16;
            [
                registry.register_parser(tlv_type, move |buf, _| {
                    parser(tlv_type, buf)
                }),
                registry.register_serializer(tlv_type, |tlv, buf, _| {
                    tlv.encode_value(buf)
                }),
            ]
        })
        .collect()
}

// ===== helper functions =====

fn check_len(
    tlv_type: u16,
    buf: &Bytes,
    expected: usize,
) -> Result<(), TlvError> {
    if buf.remaining() != expected {
        return Err(TlvError::InvalidLength {
            tlv_type,
            length: buf.remaining() as u16,
        });
    }
    Ok(())
}

// Encodes a TLV using the serializer registered for its type. Returns whether
// anything was written.
fn encode_tlv<C>(
    buf: &mut BytesMut,
    tlv: &C::Object,
    registry: &Registry<C>,
) -> bool
where
    C: Codec<Key = u16, EncodeCxt = ()>,
{
    let start_pos = buf.len();
    buf.put_u16(C::object_key(tlv));
    buf.put_u16(0);
    if registry.serialize(tlv, buf, &()).is_err() {
        buf.truncate(start_pos);
        return false;
    }

    // Rewrite TLV length.
    let len = (buf.len() - start_pos - TLV_HDR_SIZE) as u16;
    buf[start_pos + 2..start_pos + 4].copy_from_slice(&len.to_be_bytes());
    true
}

// Decodes a single TLV. Unregistered TLV types are skipped.
fn decode_tlv<C>(
    buf: &mut Bytes,
    registry: &Registry<C>,
) -> Result<Option<C::Object>, TlvError>
where
    C: Codec<Key = u16, DecodeCxt = (), Error = TlvError>,
{
    let tlv_type = buf.try_get_u16()?;
    let tlv_len = buf.try_get_u16()?;
    let mut buf_value = buf.try_split_to(tlv_len as usize)?;

    match registry.parse(tlv_type, &mut buf_value, &()) {
        Ok(tlv) => Ok(Some(tlv)),
        Err(ParseError::UnknownType(_)) => Ok(None),
        Err(ParseError::Decode(error)) => {
            Debug::TlvDecodeError(tlv_type, &error).log();
            Err(error)
        }
    }
}
