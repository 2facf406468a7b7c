//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::TryGetError;
use serde::{Deserialize, Serialize};

use crate::packet::consts::{
    ErrorCode, MessageHeaderErrorSubcode, OpenMessageErrorSubcode,
    UpdateMessageErrorSubcode,
};

// Type aliases.
pub type DecodeResult<T> = Result<T, DecodeError>;

// BGP message decoding errors.
//
// Every variant maps to the NOTIFICATION sent to the peer before the session
// is torn down.
#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub enum DecodeError {
    ReadOutOfBounds,
    MessageHeader(MessageHeaderError),
    OpenMessage(OpenMessageError),
    UpdateMessage(UpdateMessageError),
    Nlri(NlriError),
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum MessageHeaderError {
    ConnectionNotSynchronized,
    BadMessageLength(u16),
    BadMessageType(u8),
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum OpenMessageError {
    UnsupportedVersion(u8),
    BadPeerAs,
    BadBgpIdentifier,
    UnsupportedOptParam,
    UnacceptableHoldTime,
    UnsupportedCapability,
    MalformedOptParam,
}

// UPDATE message errors.
//
// Most attribute-level errors don't show up here: RFC 7606 downgrades them to
// the `AttrError` approaches below.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum UpdateMessageError {
    ReadOutOfBounds,
    MalformedAttributeList,
    UnrecognizedWellKnownAttribute,
    OptionalAttributeError,
    InvalidNetworkField,
}

// Attribute errors (RFC 7606 error handling approaches).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum AttrError {
    Discard,
    Withdraw,
    Reset,
}

// NLRI decoding errors.
//
// These are produced by the per-AFI/SAFI NLRI parsers, which never read past
// the length announced on the wire.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum NlriError {
    ReadOutOfBounds,
    InvalidPrefixLength(u8),
    InvalidRouteDistinguisher(u16),
    InvalidLabelStack,
    InvalidEvpnRoute(u8),
    InvalidFlowspecLength,
    UnknownFlowspecComponent(u8),
    FlowspecComponentOrder(u8),
    InvalidFlowspecOperator(u8),
    InvalidLinkStateNlri(u16),
    InvalidLinkStateTlv(u16),
}

// TLV decoding errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum TlvError {
    ReadOutOfBounds,
    InvalidLength { tlv_type: u16, length: u16 },
    InvalidAfiSafi { afi: u16, safi: u8 },
    InvalidUtf8(u16),
}

// ===== impl DecodeError =====

impl DecodeError {
    // Returns the error code, error subcode and data of the NOTIFICATION
    // reporting this error.
    pub(crate) fn notification(&self) -> (ErrorCode, u8, Vec<u8>) {
        match self {
            // A message shorter than what its fields announce.
            DecodeError::ReadOutOfBounds => (
                ErrorCode::MessageHeaderError,
                MessageHeaderErrorSubcode::BadMessageLength as u8,
                vec![],
            ),
            DecodeError::MessageHeader(error) => {
                let (subcode, data) = error.subcode();
                (ErrorCode::MessageHeaderError, subcode as u8, data)
            }
            DecodeError::OpenMessage(error) => {
                let (subcode, data) = error.subcode();
                (ErrorCode::OpenMessageError, subcode as u8, data)
            }
            DecodeError::UpdateMessage(error) => (
                ErrorCode::UpdateMessageError,
                error.subcode() as u8,
                vec![],
            ),
            DecodeError::Nlri(_) => (
                ErrorCode::UpdateMessageError,
                UpdateMessageErrorSubcode::InvalidNetworkField as u8,
                vec![],
            ),
        }
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::ReadOutOfBounds => {
                write!(f, "attempt to read out of bounds")
            }
            DecodeError::MessageHeader(error) => error.fmt(f),
            DecodeError::OpenMessage(error) => error.fmt(f),
            DecodeError::UpdateMessage(error) => error.fmt(f),
            DecodeError::Nlri(error) => error.fmt(f),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<TryGetError> for DecodeError {
    fn from(_error: TryGetError) -> DecodeError {
        DecodeError::ReadOutOfBounds
    }
}

impl From<MessageHeaderError> for DecodeError {
    fn from(error: MessageHeaderError) -> DecodeError {
        DecodeError::MessageHeader(error)
    }
}

impl From<OpenMessageError> for DecodeError {
    fn from(error: OpenMessageError) -> DecodeError {
        DecodeError::OpenMessage(error)
    }
}

impl From<UpdateMessageError> for DecodeError {
    fn from(error: UpdateMessageError) -> DecodeError {
        DecodeError::UpdateMessage(error)
    }
}

impl From<NlriError> for DecodeError {
    fn from(error: NlriError) -> DecodeError {
        DecodeError::Nlri(error)
    }
}

// ===== impl MessageHeaderError =====

impl MessageHeaderError {
    // RFC 4271 - Section 6.1: the offending length or type goes in the data
    // field.
    fn subcode(&self) -> (MessageHeaderErrorSubcode, Vec<u8>) {
        match self {
            MessageHeaderError::ConnectionNotSynchronized => {
                (MessageHeaderErrorSubcode::ConnectionNotSynchronized, vec![])
            }
            MessageHeaderError::BadMessageLength(len) => (
                MessageHeaderErrorSubcode::BadMessageLength,
                len.to_be_bytes().to_vec(),
            ),
            MessageHeaderError::BadMessageType(msg_type) => {
                (MessageHeaderErrorSubcode::BadMessageType, vec![*msg_type])
            }
        }
    }
}

impl std::fmt::Display for MessageHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageHeaderError::ConnectionNotSynchronized => {
                write!(f, "connection not synchronized")
            }
            MessageHeaderError::BadMessageLength(len) => {
                write!(f, "invalid message length: {len}")
            }
            MessageHeaderError::BadMessageType(msg_type) => {
                write!(f, "invalid message type: {msg_type}")
            }
        }
    }
}

// ===== impl OpenMessageError =====

impl OpenMessageError {
    fn subcode(&self) -> (OpenMessageErrorSubcode, Vec<u8>) {
        let subcode = match self {
            // RFC 4271 - Section 6.2: the data field carries the largest
            // supported version number.
            OpenMessageError::UnsupportedVersion(version) => {
                let subcode = OpenMessageErrorSubcode::UnsupportedVersionNumber;
                return (subcode, (*version as u16).to_be_bytes().to_vec());
            }
            OpenMessageError::BadPeerAs => OpenMessageErrorSubcode::BadPeerAs,
            OpenMessageError::BadBgpIdentifier => {
                OpenMessageErrorSubcode::BadBgpIdentifier
            }
            OpenMessageError::UnsupportedOptParam => {
                OpenMessageErrorSubcode::UnsupportedOptParam
            }
            OpenMessageError::UnacceptableHoldTime => {
                OpenMessageErrorSubcode::UnacceptableHoldTime
            }
            OpenMessageError::UnsupportedCapability => {
                OpenMessageErrorSubcode::UnsupportedCapability
            }
            OpenMessageError::MalformedOptParam => {
                OpenMessageErrorSubcode::Unspecific
            }
        };
        (subcode, vec![])
    }
}

impl std::fmt::Display for OpenMessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            OpenMessageError::UnsupportedVersion(version) => {
                return write!(
                    f,
                    "OPEN message error: unsupported version number: {version}"
                );
            }
            OpenMessageError::BadPeerAs => "bad peer AS",
            OpenMessageError::BadBgpIdentifier => "bad BGP identifier",
            OpenMessageError::UnsupportedOptParam => {
                "unsupported optional parameter"
            }
            OpenMessageError::UnacceptableHoldTime => "unacceptable hold time",
            OpenMessageError::UnsupportedCapability => "unsupported capability",
            OpenMessageError::MalformedOptParam => {
                "malformed optional parameter"
            }
        };
        write!(f, "OPEN message error: {reason}")
    }
}

// ===== impl UpdateMessageError =====

impl UpdateMessageError {
    fn subcode(&self) -> UpdateMessageErrorSubcode {
        match self {
            UpdateMessageError::ReadOutOfBounds
            | UpdateMessageError::MalformedAttributeList => {
                UpdateMessageErrorSubcode::MalformedAttributeList
            }
            UpdateMessageError::UnrecognizedWellKnownAttribute => {
                UpdateMessageErrorSubcode::UnrecognizedWellKnownAttribute
            }
            UpdateMessageError::OptionalAttributeError => {
                UpdateMessageErrorSubcode::OptionalAttributeError
            }
            UpdateMessageError::InvalidNetworkField => {
                UpdateMessageErrorSubcode::InvalidNetworkField
            }
        }
    }
}

impl std::fmt::Display for UpdateMessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            UpdateMessageError::ReadOutOfBounds => {
                "attempt to read out of bounds"
            }
            UpdateMessageError::MalformedAttributeList => {
                "malformed attribute list"
            }
            UpdateMessageError::UnrecognizedWellKnownAttribute => {
                "unrecognized well-known attribute"
            }
            UpdateMessageError::OptionalAttributeError => {
                "optional attribute error"
            }
            UpdateMessageError::InvalidNetworkField => "invalid network field",
        };
        write!(f, "UPDATE message error: {reason}")
    }
}

impl From<TryGetError> for UpdateMessageError {
    fn from(_error: TryGetError) -> UpdateMessageError {
        UpdateMessageError::ReadOutOfBounds
    }
}

// ===== impl AttrError =====

impl std::fmt::Display for AttrError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrError::Discard => write!(f, "attribute discard"),
            AttrError::Withdraw => write!(f, "treat-as-withdraw"),
            AttrError::Reset => write!(f, "session reset"),
        }
    }
}

// A truncated attribute value is handled as treat-as-withdraw.
impl From<TryGetError> for AttrError {
    fn from(_error: TryGetError) -> AttrError {
        AttrError::Withdraw
    }
}

// ===== impl NlriError =====

impl std::fmt::Display for NlriError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NLRI error: ")?;

        match self {
            NlriError::ReadOutOfBounds => {
                write!(f, "attempt to read out of bounds")
            }
            NlriError::InvalidPrefixLength(plen) => {
                write!(f, "invalid prefix length: {plen}")
            }
            NlriError::InvalidRouteDistinguisher(rd_type) => {
                write!(f, "invalid route distinguisher type: {rd_type}")
            }
            NlriError::InvalidLabelStack => {
                write!(f, "invalid label stack")
            }
            NlriError::InvalidEvpnRoute(route_type) => {
                write!(f, "invalid EVPN route (type {route_type})")
            }
            NlriError::InvalidFlowspecLength => {
                write!(f, "invalid flowspec NLRI length")
            }
            NlriError::UnknownFlowspecComponent(comp_type) => {
                write!(f, "unknown flowspec component: {comp_type}")
            }
            NlriError::FlowspecComponentOrder(comp_type) => {
                write!(f, "flowspec component out of order: {comp_type}")
            }
            NlriError::InvalidFlowspecOperator(op) => {
                write!(f, "invalid flowspec operator: {op:#04x}")
            }
            NlriError::InvalidLinkStateNlri(nlri_type) => {
                write!(f, "invalid link-state NLRI (type {nlri_type})")
            }
            NlriError::InvalidLinkStateTlv(tlv_type) => {
                write!(f, "invalid link-state TLV: {tlv_type}")
            }
        }
    }
}

impl std::error::Error for NlriError {}

impl From<TryGetError> for NlriError {
    fn from(_error: TryGetError) -> NlriError {
        NlriError::ReadOutOfBounds
    }
}

// ===== impl TlvError =====

impl std::fmt::Display for TlvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlvError::ReadOutOfBounds => {
                write!(f, "attempt to read out of bounds")
            }
            TlvError::InvalidLength { tlv_type, length } => {
                write!(f, "invalid length {length} for TLV type {tlv_type}")
            }
            TlvError::InvalidAfiSafi { afi, safi } => {
                write!(f, "invalid AFI/SAFI: {afi}/{safi}")
            }
            TlvError::InvalidUtf8(tlv_type) => {
                write!(f, "invalid UTF-8 string in TLV type {tlv_type}")
            }
        }
    }
}

impl std::error::Error for TlvError {}

impl From<TryGetError> for TlvError {
    fn from(_error: TryGetError) -> TlvError {
        TlvError::ReadOutOfBounds
    }
}
