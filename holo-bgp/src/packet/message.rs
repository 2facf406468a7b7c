//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::sync::Arc;

use arbitrary::{Arbitrary, Unstructured};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use enum_as_inner::EnumAsInner;
use holo_utils::bytes::{BytesExt, BytesMutExt, TLS_BUF};
use num_traits::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::neighbor::PeerType;
use crate::packet::attribute::{self, Attr, Attrs, MpReachNlri, MpUnreachNlri};
use crate::packet::consts::{
    AddPathMode, Afi, AfiSafi, BGP_VERSION, CapabilityCode, GrFlags,
    MessageType, OpenParamType, Safi,
};
use crate::packet::error::{
    DecodeError, DecodeResult, MessageHeaderError, OpenMessageError,
    UpdateMessageError,
};
use crate::packet::nlri::NlriEntry;
use crate::registry::{CodecRegistry, ParseError};

//
// BGP message.
//
// Encoding format (message header):
//
// 0                   1                   2                   3
// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                                                               |
// +                                                               +
// |                                                               |
// +                                                               +
// |                           Marker                              |
// +                                                               +
// |                                                               |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |          Length               |      Type     |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(EnumAsInner)]
#[derive(Deserialize, Serialize)]
pub enum Message {
    Open(OpenMsg),
    Update(UpdateMsg),
    Notification(NotificationMsg),
    Keepalive(KeepaliveMsg),
    RouteRefresh(RouteRefreshMsg),
}

//
// OPEN Message.
//
// Encoding format (message body):
//
// 0                   1                   2                   3
// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+
// |    Version    |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |     My Autonomous System      |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |           Hold Time           |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                         BGP Identifier                        |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// | Opt Parm Len  |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                                                               |
// |             Optional Parameters (variable)                    |
// |                                                               |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
// Encoding format (optional parameter):
//
// 0                   1
// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Parm. Type   | Parm. Length  |  Parameter Value (variable)
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct OpenMsg {
    pub version: u8,
    pub my_as: u16,
    pub holdtime: u16,
    pub identifier: Ipv4Addr,
    pub capabilities: BTreeSet<Capability>,
}

//
// Capabilities Optional Parameter.
//
// Encoding format:
//
// +------------------------------+
// | Capability Code (1 octet)    |
// +------------------------------+
// | Capability Length (1 octet)  |
// +------------------------------+
// | Capability Value (variable)  |
// ~                              ~
// +------------------------------+
//
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(EnumAsInner)]
#[derive(Deserialize, Serialize)]
pub enum Capability {
    MultiProtocol {
        afi: Afi,
        safi: Safi,
    },
    FourOctetAsNumber {
        asn: u32,
    },
    AddPath(BTreeSet<AddPathTuple>),
    RouteRefresh,
    EnhancedRouteRefresh,
    GracefulRestart {
        flags: GrFlags,
        restart_time: u16,
        afi_safis: BTreeSet<GrTuple>,
    },
}

// This is a stripped down version of `Capability`, containing only data that
// is relevant in terms of capability negotiation.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(EnumAsInner)]
#[derive(Deserialize, Serialize)]
#[derive(Arbitrary)]
pub enum NegotiatedCapability {
    MultiProtocol {
        afi: Afi,
        safi: Safi,
    },
    FourOctetAsNumber,
    AddPath {
        afi: Afi,
        safi: Safi,
        mode: AddPathMode,
    },
    RouteRefresh,
    EnhancedRouteRefresh,
    GracefulRestart,
}

#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct AddPathTuple {
    pub afi: Afi,
    pub safi: Safi,
    pub mode: AddPathMode,
}

//
// Graceful Restart per-AFI/SAFI tuple.
//
// Encoding format:
//
// +--------------------------------------------------+
// | Address Family Identifier (16 bits)              |
// +--------------------------------------------------+
// | Subsequent Address Family Identifier (8 bits)    |
// +--------------------------------------------------+
// | Flags for Address Family (8 bits)                |
// +--------------------------------------------------+
//
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct GrTuple {
    pub afi: Afi,
    pub safi: Safi,
    pub forwarding: bool,
}

//
// UPDATE Message.
//
// Encoding format (message body):
//
// +-----------------------------------------------------+
// |   Withdrawn Routes Length (2 octets)                |
// +-----------------------------------------------------+
// |   Withdrawn Routes (variable)                       |
// +-----------------------------------------------------+
// |   Total Path Attribute Length (2 octets)            |
// +-----------------------------------------------------+
// |   Path Attributes (variable)                        |
// +-----------------------------------------------------+
// |   Network Layer Reachability Information (variable) |
// +-----------------------------------------------------+
//
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[skip_serializing_none]
#[derive(Deserialize, Serialize)]
pub struct UpdateMsg {
    pub reach: Option<ReachNlri>,
    pub unreach: Option<UnreachNlri>,
    pub mp_reach: Option<MpReachNlri>,
    pub mp_unreach: Option<MpUnreachNlri>,
    pub attrs: Option<Attrs>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ReachNlri {
    pub nlri: Vec<NlriEntry>,
    pub nexthop: Ipv4Addr,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct UnreachNlri {
    pub nlri: Vec<NlriEntry>,
}

//
// NOTIFICATION Message.
//
// Encoding format (message body):
//
// 0                   1                   2                   3
// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// | Error code    | Error subcode |   Data (variable)             |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct NotificationMsg {
    pub error_code: u8,
    pub error_subcode: u8,
    pub data: Vec<u8>,
}

//
// KEEPALIVE Message.
//
// A KEEPALIVE message consists of only the message header and has a length of
// 19 octets.
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct KeepaliveMsg {}

//
// Route-REFRESH Message.
//
// Encoding format (message body):
//
// 0       7      15      23      31
// +-------+-------+-------+-------+
// |      AFI      | Res.  | SAFI  |
// +-------+-------+-------+-------+
//
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RouteRefreshMsg {
    pub afi: u16,
    pub safi: u8,
}

// BGP message encoding context.
#[derive(Clone, Debug)]
pub struct EncodeCxt {
    pub capabilities: BTreeSet<NegotiatedCapability>,
    pub registry: Arc<CodecRegistry>,
}

// BGP message decoding context.
#[derive(Clone, Debug)]
pub struct DecodeCxt {
    pub peer_type: PeerType,
    pub peer_as: u32,
    pub capabilities: BTreeSet<NegotiatedCapability>,
    pub registry: Arc<CodecRegistry>,
}

// ===== impl Message =====

impl Message {
    pub const MIN_LEN: u16 = 19;
    pub const MAX_LEN: u16 = 4096;
    const MARKER: u128 = u128::MAX;
    const LEN_FIELD: std::ops::Range<usize> = 16..18;

    // Encodes BGP message into a bytes buffer.
    pub fn encode(&self, cxt: &EncodeCxt) -> Bytes {
        TLS_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();

            // Header. The length field is filled in once the body is known.
            buf.put_u128(Self::MARKER);
            buf.put_u16(0);
            buf.put_u8(self.msg_type() as u8);

            match self {
                Message::Open(msg) => msg.encode(&mut buf),
                Message::Update(msg) => msg.encode(&mut buf, cxt),
                Message::Notification(msg) => msg.encode(&mut buf),
                Message::Keepalive(_) => (),
                Message::RouteRefresh(msg) => msg.encode(&mut buf),
            }

            // UPDATE builders keep every message within the maximum length.
            debug_assert!(buf.len() <= Self::MAX_LEN as usize);
            let msg_len = buf.len() as u16;
            buf[Self::LEN_FIELD].copy_from_slice(&msg_len.to_be_bytes());
            buf.clone().freeze()
        })
    }

    // Decodes a BGP message from the given buffer.
    //
    // The marker is validated before the length, and the length before the
    // message type.
    pub fn decode(data: &[u8], cxt: &DecodeCxt) -> DecodeResult<Self> {
        let mut buf = Bytes::copy_from_slice(data);
        let (msg_type, msg_len) = Self::decode_header(&mut buf, data.len())?;
        buf.truncate((msg_len - Self::MIN_LEN) as usize);

        let msg = match msg_type {
            MessageType::Open => Message::Open(OpenMsg::decode(&mut buf)?),
            MessageType::Update => {
                Message::Update(UpdateMsg::decode(&mut buf, cxt)?)
            }
            MessageType::Notification => {
                Message::Notification(NotificationMsg::decode(&mut buf)?)
            }
            MessageType::Keepalive => {
                Message::Keepalive(KeepaliveMsg::decode(&mut buf)?)
            }
            MessageType::RouteRefresh => {
                Message::RouteRefresh(RouteRefreshMsg::decode(&mut buf)?)
            }
        };
        Ok(msg)
    }

    // Decodes and validates the fixed-size message header.
    fn decode_header(
        buf: &mut Bytes,
        data_len: usize,
    ) -> DecodeResult<(MessageType, u16)> {
        if buf.try_get_u128()? != Self::MARKER {
            return Err(MessageHeaderError::ConnectionNotSynchronized.into());
        }

        let msg_len = buf.try_get_u16()?;
        if !(Self::MIN_LEN..=Self::MAX_LEN).contains(&msg_len)
            || msg_len as usize > data_len
        {
            return Err(MessageHeaderError::BadMessageLength(msg_len).into());
        }

        let msg_type = buf.try_get_u8()?;
        let msg_type = MessageType::from_u8(msg_type)
            .ok_or(MessageHeaderError::BadMessageType(msg_type))?;

        // Per-type length constraints.
        let valid_len = match msg_type {
            MessageType::Open => msg_len >= OpenMsg::MIN_LEN,
            MessageType::Update => msg_len >= UpdateMsg::MIN_LEN,
            MessageType::Notification => msg_len >= NotificationMsg::MIN_LEN,
            MessageType::Keepalive => msg_len == KeepaliveMsg::LEN,
            MessageType::RouteRefresh => msg_len >= RouteRefreshMsg::LEN,
        };
        if !valid_len {
            return Err(MessageHeaderError::BadMessageLength(msg_len).into());
        }

        Ok((msg_type, msg_len))
    }

    // Parses the given buffer to determine if it contains a complete BGP
    // message, and returns the length of the message if successful.
    //
    // A length field smaller than the header yields the header length so
    // that the decoder can reject the message with the proper NOTIFICATION.
    pub fn get_message_len(data: &[u8]) -> Option<usize> {
        let min_len = Self::MIN_LEN as usize;
        if data.len() < min_len {
            return None;
        }

        let msg_len = u16::from_be_bytes([data[16], data[17]]) as usize;
        let msg_len = msg_len.max(min_len);
        (msg_len <= data.len()).then_some(msg_len)
    }

    // Returns the message type.
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Open(_) => MessageType::Open,
            Message::Update(_) => MessageType::Update,
            Message::Notification(_) => MessageType::Notification,
            Message::Keepalive(_) => MessageType::Keepalive,
            Message::RouteRefresh(_) => MessageType::RouteRefresh,
        }
    }
}

// ===== impl OpenMsg =====

impl OpenMsg {
    const MIN_LEN: u16 = 29;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u16(self.my_as);
        buf.put_u16(self.holdtime);
        buf.put_ipv4(&self.identifier);

        // Each capability goes in its own optional parameter.
        buf.put_len8_prefixed(|buf| {
            for capability in &self.capabilities {
                buf.put_u8(OpenParamType::Capabilities as u8);
                buf.put_len8_prefixed(|buf| capability.encode(buf));
            }
        });
    }

    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let msg = OpenMsg {
            version: buf.try_get_u8()?,
            my_as: buf.try_get_u16()?,
            holdtime: buf.try_get_u16()?,
            identifier: buf.try_get_ipv4()?,
            capabilities: Default::default(),
        };
        msg.validate()?;

        let capabilities = decode_opt_params(buf)?;
        Ok(OpenMsg { capabilities, ..msg })
    }

    // Validates the fixed fields (RFC 4271 - Section 6.2).
    fn validate(&self) -> Result<(), OpenMessageError> {
        if self.version != BGP_VERSION {
            return Err(OpenMessageError::UnsupportedVersion(BGP_VERSION));
        }
        if self.my_as == 0 {
            return Err(OpenMessageError::BadPeerAs);
        }
        if matches!(self.holdtime, 1 | 2) {
            return Err(OpenMessageError::UnacceptableHoldTime);
        }
        let id = self.identifier;
        if id.is_unspecified() || id.is_multicast() || id.is_broadcast() {
            return Err(OpenMessageError::BadBgpIdentifier);
        }
        Ok(())
    }

    // Returns the four-octet AS number if advertised, or the 2-octet "My
    // Autonomous System" field otherwise.
    pub fn real_as(&self) -> u32 {
        self.capabilities
            .iter()
            .find_map(|cap| match cap {
                Capability::FourOctetAsNumber { asn } => Some(*asn),
                _ => None,
            })
            .unwrap_or(self.my_as.into())
    }

    // Returns the address families advertised in the Multiprotocol
    // capabilities. IPv4 unicast is implied when none is present.
    pub fn afi_safis(&self) -> BTreeSet<(Afi, Safi)> {
        let afi_safis = self
            .capabilities
            .iter()
            .filter_map(|cap| cap.as_multi_protocol())
            .map(|(afi, safi)| (*afi, *safi))
            .collect::<BTreeSet<_>>();
        if afi_safis.is_empty() {
            return [(Afi::Ipv4, Safi::Unicast)].into();
        }
        afi_safis
    }
}

// ===== impl Capability =====

impl Capability {
    const GR_TIME_MASK: u16 = 0x0FFF;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.code() as u8);
        buf.put_len8_prefixed(|buf| match self {
            Capability::MultiProtocol { afi, safi } => {
                buf.put_u16(*afi as u16);
                buf.put_u8(0);
                buf.put_u8(*safi as u8);
            }
            Capability::FourOctetAsNumber { asn } => buf.put_u32(*asn),
            Capability::AddPath(tuples) => {
                for tuple in tuples {
                    tuple.encode(buf);
                }
            }
            Capability::RouteRefresh | Capability::EnhancedRouteRefresh => (),
            Capability::GracefulRestart {
                flags,
                restart_time,
                afi_safis,
            } => {
                let flags = (flags.bits() as u16) << 12;
                buf.put_u16(flags | (restart_time & Self::GR_TIME_MASK));
                for tuple in afi_safis {
                    tuple.encode(buf);
                }
            }
        });
    }

    // Decodes a single capability. Capabilities that are unknown, or that
    // refer to unknown address families, are skipped.
    pub fn decode(buf: &mut Bytes) -> DecodeResult<Option<Self>> {
        let (cap_type, mut buf_cap) = decode_tlv8(buf)?;
        let Some(code) = CapabilityCode::from_u8(cap_type) else {
            return Ok(None);
        };
        if !Self::valid_len(code, buf_cap.len()) {
            return Err(OpenMessageError::MalformedOptParam.into());
        }

        let cap = match code {
            CapabilityCode::MultiProtocol => {
                let afi = buf_cap.try_get_u16()?;
                let _reserved = buf_cap.try_get_u8()?;
                let safi = buf_cap.try_get_u8()?;
                let (Some(afi), Some(safi)) =
                    (Afi::from_u16(afi), Safi::from_u8(safi))
                else {
                    return Ok(None);
                };
                Capability::MultiProtocol { afi, safi }
            }
            CapabilityCode::FourOctetAsNumber => {
                let asn = buf_cap.try_get_u32()?;
                Capability::FourOctetAsNumber { asn }
            }
            CapabilityCode::AddPath => {
                let mut tuples = BTreeSet::new();
                while buf_cap.has_remaining() {
                    let Some(tuple) = AddPathTuple::decode(&mut buf_cap)?
                    else {
                        return Ok(None);
                    };
                    tuples.insert(tuple);
                }
                Capability::AddPath(tuples)
            }
            CapabilityCode::RouteRefresh => Capability::RouteRefresh,
            CapabilityCode::EnhancedRouteRefresh => {
                Capability::EnhancedRouteRefresh
            }
            CapabilityCode::GracefulRestart => {
                let word = buf_cap.try_get_u16()?;
                let mut afi_safis = BTreeSet::new();
                while buf_cap.has_remaining() {
                    afi_safis.extend(GrTuple::decode(&mut buf_cap)?);
                }
                Capability::GracefulRestart {
                    flags: GrFlags::from_bits_retain((word >> 12) as u8),
                    restart_time: word & Self::GR_TIME_MASK,
                    afi_safis,
                }
            }
        };

        Ok(Some(cap))
    }

    // Checks the length of the capability value.
    fn valid_len(code: CapabilityCode, len: usize) -> bool {
        match code {
            CapabilityCode::MultiProtocol
            | CapabilityCode::FourOctetAsNumber => len == 4,
            CapabilityCode::AddPath => len % 4 == 0,
            CapabilityCode::RouteRefresh
            | CapabilityCode::EnhancedRouteRefresh => len == 0,
            CapabilityCode::GracefulRestart => len >= 2 && (len - 2) % 4 == 0,
        }
    }

    pub fn code(&self) -> CapabilityCode {
        match self {
            Capability::MultiProtocol { .. } => CapabilityCode::MultiProtocol,
            Capability::FourOctetAsNumber { .. } => {
                CapabilityCode::FourOctetAsNumber
            }
            Capability::AddPath { .. } => CapabilityCode::AddPath,
            Capability::RouteRefresh => CapabilityCode::RouteRefresh,
            Capability::EnhancedRouteRefresh => {
                CapabilityCode::EnhancedRouteRefresh
            }
            Capability::GracefulRestart { .. } => {
                CapabilityCode::GracefulRestart
            }
        }
    }
}

// ===== impl AddPathTuple =====

impl AddPathTuple {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.afi as u16);
        buf.put_u8(self.safi as u8);
        buf.put_u8(self.mode as u8);
    }

    // Returns `None` when any of the fields holds an unknown value.
    fn decode(buf: &mut Bytes) -> DecodeResult<Option<Self>> {
        let afi = Afi::from_u16(buf.try_get_u16()?);
        let safi = Safi::from_u8(buf.try_get_u8()?);
        let mode = AddPathMode::from_u8(buf.try_get_u8()?);
        let tuple = afi.zip(safi).zip(mode).map(|((afi, safi), mode)| {
            AddPathTuple { afi, safi, mode }
        });
        Ok(tuple)
    }
}

// ===== impl GrTuple =====

impl GrTuple {
    const FORWARDING: u8 = 0x80;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.afi as u16);
        buf.put_u8(self.safi as u8);
        buf.put_u8(if self.forwarding { Self::FORWARDING } else { 0 });
    }

    // Returns `None` for tuples of unknown address families.
    fn decode(buf: &mut Bytes) -> DecodeResult<Option<Self>> {
        let afi = Afi::from_u16(buf.try_get_u16()?);
        let safi = Safi::from_u8(buf.try_get_u8()?);
        let forwarding = buf.try_get_u8()? & Self::FORWARDING != 0;
        let tuple = afi.zip(safi).map(|(afi, safi)| GrTuple {
            afi,
            safi,
            forwarding,
        });
        Ok(tuple)
    }
}

// ===== impl NegotiatedCapability =====

impl NegotiatedCapability {
    pub fn code(&self) -> CapabilityCode {
        match self {
            NegotiatedCapability::MultiProtocol { .. } => {
                CapabilityCode::MultiProtocol
            }
            NegotiatedCapability::FourOctetAsNumber => {
                CapabilityCode::FourOctetAsNumber
            }
            NegotiatedCapability::AddPath { .. } => CapabilityCode::AddPath,
            NegotiatedCapability::RouteRefresh => CapabilityCode::RouteRefresh,
            NegotiatedCapability::EnhancedRouteRefresh => {
                CapabilityCode::EnhancedRouteRefresh
            }
            NegotiatedCapability::GracefulRestart => {
                CapabilityCode::GracefulRestart
            }
        }
    }

    // Computes the set of capabilities in effect for a session, given the
    // locally advertised and the received OPEN messages.
    pub fn negotiate(
        local: &OpenMsg,
        remote: &OpenMsg,
    ) -> BTreeSet<NegotiatedCapability> {
        let mut negotiated = BTreeSet::new();

        // Address families: intersection of both sides.
        for (afi, safi) in local.afi_safis().intersection(&remote.afi_safis())
        {
            negotiated.insert(NegotiatedCapability::MultiProtocol {
                afi: *afi,
                safi: *safi,
            });
        }

        let both = |code: CapabilityCode| {
            local.capabilities.iter().any(|cap| cap.code() == code)
                && remote.capabilities.iter().any(|cap| cap.code() == code)
        };
        if both(CapabilityCode::FourOctetAsNumber) {
            negotiated.insert(NegotiatedCapability::FourOctetAsNumber);
        }
        if both(CapabilityCode::RouteRefresh) {
            negotiated.insert(NegotiatedCapability::RouteRefresh);
        }
        if both(CapabilityCode::EnhancedRouteRefresh) {
            negotiated.insert(NegotiatedCapability::EnhancedRouteRefresh);
        }
        if both(CapabilityCode::GracefulRestart) {
            negotiated.insert(NegotiatedCapability::GracefulRestart);
        }

        // ADD-PATH: each direction is enabled independently.
        let add_path_tuples = |open: &OpenMsg| {
            open.capabilities
                .iter()
                .filter_map(|cap| cap.as_add_path())
                .flatten()
                .cloned()
                .collect::<Vec<_>>()
        };
        let remote_tuples = add_path_tuples(remote);
        for local_tuple in add_path_tuples(local) {
            let Some(remote_tuple) = remote_tuples.iter().find(|tuple| {
                tuple.afi == local_tuple.afi && tuple.safi == local_tuple.safi
            }) else {
                continue;
            };
            let rx = local_tuple.mode.receives() && remote_tuple.mode.sends();
            let tx = local_tuple.mode.sends() && remote_tuple.mode.receives();
            let mode = match (rx, tx) {
                (true, true) => AddPathMode::ReceiveSend,
                (true, false) => AddPathMode::Receive,
                (false, true) => AddPathMode::Send,
                (false, false) => continue,
            };
            negotiated.insert(NegotiatedCapability::AddPath {
                afi: local_tuple.afi,
                safi: local_tuple.safi,
                mode,
            });
        }

        negotiated
    }
}

// ===== impl AddPathMode =====

impl AddPathMode {
    fn receives(&self) -> bool {
        matches!(self, AddPathMode::Receive | AddPathMode::ReceiveSend)
    }

    fn sends(&self) -> bool {
        matches!(self, AddPathMode::Send | AddPathMode::ReceiveSend)
    }
}

// ===== impl UpdateMsg =====

impl UpdateMsg {
    pub const MIN_LEN: u16 = 23;

    // Creates an End-of-RIB marker for the given address family.
    //
    // For IPv4 unicast this is an empty UPDATE. For any other address family
    // it's an UPDATE carrying only an empty MP_UNREACH_NLRI attribute.
    pub fn new_eor(afi_safi: AfiSafi) -> UpdateMsg {
        let mp_unreach = (afi_safi != AfiSafi::Ipv4Unicast).then(|| {
            MpUnreachNlri {
                afi_safi,
                nlri: vec![],
            }
        });
        UpdateMsg {
            mp_unreach,
            ..Default::default()
        }
    }

    // Returns the address family if this UPDATE is an End-of-RIB marker.
    pub fn eor(&self) -> Option<AfiSafi> {
        if self.reach.is_some()
            || self.unreach.is_some()
            || self.mp_reach.is_some()
            || self.attrs.is_some()
        {
            return None;
        }
        match &self.mp_unreach {
            None => Some(AfiSafi::Ipv4Unicast),
            Some(mp_unreach) if mp_unreach.nlri.is_empty() => {
                Some(mp_unreach.afi_safi)
            }
            Some(_) => None,
        }
    }

    fn encode(&self, buf: &mut BytesMut, cxt: &EncodeCxt) {
        // Withdrawn Routes.
        buf.put_len16_prefixed(|buf| {
            for entry in self.unreach.iter().flat_map(|u| &u.nlri) {
                entry.encode(buf, cxt);
            }
        });

        // Path Attributes. The multiprotocol attributes go first so that
        // receivers find them early (RFC 7606 - Section 5.1).
        buf.put_len16_prefixed(|buf| {
            if let Some(mp_reach) = &self.mp_reach {
                let attr = Attr::MpReach(mp_reach.clone());
                attribute::encode_attr(&attr, buf, cxt);
            }
            if let Some(mp_unreach) = &self.mp_unreach {
                let attr = Attr::MpUnreach(mp_unreach.clone());
                attribute::encode_attr(&attr, buf, cxt);
            }
            if let Some(attrs) = &self.attrs {
                let nexthop = self.reach.as_ref().map(|reach| reach.nexthop);
                attrs.encode(buf, nexthop, cxt);
            }
        });

        // Network Layer Reachability Information.
        for entry in self.reach.iter().flat_map(|r| &r.nlri) {
            entry.encode(buf, cxt);
        }
    }

    pub fn decode(buf: &mut Bytes, cxt: &DecodeCxt) -> DecodeResult<Self> {
        let mut msg = UpdateMsg::default();
        let mut nexthop = None;

        // Withdrawn Routes.
        let mut buf_wdraw = split_len16(buf)?;
        let nlri = decode_ipv4_nlri(&mut buf_wdraw, cxt)?;
        if !nlri.is_empty() {
            msg.unreach = Some(UnreachNlri { nlri });
        }

        // Path Attributes.
        let mut buf_attr = split_len16(buf)?;
        if buf_attr.has_remaining() {
            let nlri_present = buf.has_remaining();
            msg.attrs = Attrs::decode(
                &mut buf_attr,
                cxt,
                &mut nexthop,
                nlri_present,
                &mut msg.mp_unreach,
                &mut msg.mp_reach,
            )?;
        }

        // Network Layer Reachability Information. Without a valid NEXT_HOP
        // the prefixes are treated as withdrawn.
        let nlri = decode_ipv4_nlri(buf, cxt)?;
        if !nlri.is_empty() {
            match nexthop {
                Some(nexthop) => msg.reach = Some(ReachNlri { nlri, nexthop }),
                None => msg
                    .unreach
                    .get_or_insert_with(|| UnreachNlri { nlri: vec![] })
                    .nlri
                    .extend(nlri),
            }
        }

        Ok(msg)
    }
}

// ===== impl NotificationMsg =====

impl NotificationMsg {
    const MIN_LEN: u16 = 21;

    pub(crate) fn new(
        error_code: impl ToPrimitive,
        error_subcode: impl ToPrimitive,
    ) -> Self {
        NotificationMsg {
            error_code: error_code.to_u8().unwrap_or_default(),
            error_subcode: error_subcode.to_u8().unwrap_or_default(),
            data: Default::default(),
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.error_code);
        buf.put_u8(self.error_subcode);
        buf.put_slice(&self.data);
    }

    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let error_code = buf.try_get_u8()?;
        let error_subcode = buf.try_get_u8()?;
        let data = buf.to_vec();
        Ok(NotificationMsg {
            error_code,
            error_subcode,
            data,
        })
    }
}

impl From<DecodeError> for NotificationMsg {
    fn from(error: DecodeError) -> NotificationMsg {
        let (error_code, error_subcode, data) = error.notification();
        NotificationMsg {
            error_code: error_code as u8,
            error_subcode,
            data,
        }
    }
}

// ===== impl KeepaliveMsg =====

impl KeepaliveMsg {
    const LEN: u16 = 19;

    // The message header is all there is.
    pub fn decode(_buf: &mut Bytes) -> DecodeResult<Self> {
        Ok(KeepaliveMsg {})
    }
}

// ===== impl RouteRefreshMsg =====

impl RouteRefreshMsg {
    const LEN: u16 = 23;

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.afi);
        buf.put_u8(0);
        buf.put_u8(self.safi);
    }

    pub fn decode(buf: &mut Bytes) -> DecodeResult<Self> {
        let afi = buf.try_get_u16()?;
        let _reserved = buf.try_get_u8()?;
        let safi = buf.try_get_u8()?;
        Ok(RouteRefreshMsg { afi, safi })
    }

    // Returns the requested address family, if known.
    pub fn afi_safi(&self) -> Option<AfiSafi> {
        let afi = Afi::from_u16(self.afi)?;
        let safi = Safi::from_u8(self.safi)?;
        AfiSafi::new(afi, safi)
    }
}

// ===== impl EncodeCxt =====

impl EncodeCxt {
    pub fn four_byte_asn(&self) -> bool {
        self.capabilities
            .contains(&NegotiatedCapability::FourOctetAsNumber)
    }
}

// ===== impl DecodeCxt =====

impl DecodeCxt {
    pub fn four_byte_asn(&self) -> bool {
        self.capabilities
            .contains(&NegotiatedCapability::FourOctetAsNumber)
    }

    // Returns whether NLRI of the given address family are prefixed with a
    // Path Identifier.
    pub fn add_path_rx(&self, afi_safi: AfiSafi) -> bool {
        self.capabilities.iter().any(|cap| {
            matches!(
                cap,
                NegotiatedCapability::AddPath { afi, safi, mode }
                    if *afi == afi_safi.afi()
                        && *safi == afi_safi.safi()
                        && mode.receives()
            )
        })
    }
}

impl<'a> Arbitrary<'a> for DecodeCxt {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(DecodeCxt {
            peer_type: u.arbitrary()?,
            peer_as: u.arbitrary()?,
            capabilities: u.arbitrary()?,
            registry: Arc::new(CodecRegistry::with_defaults()),
        })
    }
}

// ===== helper functions =====

// Splits off a one-octet type and one-octet length element, as used by both
// the OPEN optional parameters and the capabilities they carry.
fn decode_tlv8(buf: &mut Bytes) -> DecodeResult<(u8, Bytes)> {
    let malformed = |_| OpenMessageError::MalformedOptParam;
    let tlv_type = buf.try_get_u8().map_err(malformed)?;
    let tlv_len = buf.try_get_u8().map_err(malformed)?;
    let value = buf.try_split_to(tlv_len as usize).map_err(malformed)?;
    Ok((tlv_type, value))
}

// Decodes the optional parameters of an OPEN message. Capabilities is the
// only supported parameter type.
fn decode_opt_params(buf: &mut Bytes) -> DecodeResult<BTreeSet<Capability>> {
    let mut capabilities = BTreeSet::new();

    let opt_param_len = buf.try_get_u8()?;
    let mut buf_opts = buf
        .try_split_to(opt_param_len as usize)
        .map_err(|_| OpenMessageError::MalformedOptParam)?;
    while buf_opts.has_remaining() {
        let (param_type, mut buf_param) = decode_tlv8(&mut buf_opts)?;
        let Some(OpenParamType::Capabilities) =
            OpenParamType::from_u8(param_type)
        else {
            return Err(OpenMessageError::UnsupportedOptParam.into());
        };
        while buf_param.has_remaining() {
            capabilities.extend(Capability::decode(&mut buf_param)?);
        }
    }

    Ok(capabilities)
}

// Splits off a field prefixed with a two-octet length, as found in the
// UPDATE message.
fn split_len16(buf: &mut Bytes) -> DecodeResult<Bytes> {
    let malformed = |_| UpdateMessageError::MalformedAttributeList;
    let len = buf.try_get_u16().map_err(malformed)?;
    let field = buf.try_split_to(len as usize).map_err(malformed)?;
    Ok(field)
}

// Decodes a list of plain IPv4 unicast NLRI (withdrawn routes or the NLRI
// field at the end of the UPDATE message).
fn decode_ipv4_nlri(
    buf: &mut Bytes,
    cxt: &DecodeCxt,
) -> DecodeResult<Vec<NlriEntry>> {
    NlriEntry::decode_list(buf, AfiSafi::Ipv4Unicast, cxt).map_err(|error| {
        match error {
            ParseError::UnknownType(_) => {
                UpdateMessageError::InvalidNetworkField.into()
            }
            ParseError::Decode(error) => DecodeError::Nlri(error),
        }
    })
}
