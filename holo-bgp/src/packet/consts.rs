//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use arbitrary::Arbitrary;
use bitflags::bitflags;
use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

pub const BGP_VERSION: u8 = 4;
pub const AS_TRANS: u16 = 23456;

// BGP Message Types.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-1
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum MessageType {
    Open = 1,
    Update = 2,
    Notification = 3,
    Keepalive = 4,
    // RFC 2918
    RouteRefresh = 5,
}

// BGP OPEN Optional Parameter Types.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-11
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum OpenParamType {
    // RFC5492
    Capabilities = 2,
}

// Capability Codes.
//
// IANA registry:
// https://www.iana.org/assignments/capability-codes/capability-codes.xhtml#capability-codes-2
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum CapabilityCode {
    // RFC 2858
    MultiProtocol = 1,
    // RFC 2918
    RouteRefresh = 2,
    // RFC 4724
    GracefulRestart = 64,
    // RFC 6793
    FourOctetAsNumber = 65,
    // RFC7911
    AddPath = 69,
    // RFC7313
    EnhancedRouteRefresh = 70,
}

// Send/Receive value for a per-AFI/SAFI instance of the ADD-PATH Capability.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
#[derive(Arbitrary)]
pub enum AddPathMode {
    Receive = 1,
    Send = 2,
    ReceiveSend = 3,
}

// Graceful Restart capability flags (RFC 4724 - Section 3).
//
// Only the four most significant bits of the "Restart Flags" field are
// defined, so the values below are already shifted into the low nibble.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct GrFlags: u8 {
        const RESTART_STATE = 0x08;
        const NOTIFICATION = 0x04;
    }
}

// BGP Error (Notification) Codes.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-3
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum ErrorCode {
    MessageHeaderError = 1,
    OpenMessageError = 2,
    UpdateMessageError = 3,
    HoldTimerExpired = 4,
    FiniteStateMachineError = 5,
    Cease = 6,
    // RFC 7313
    RouteRefreshMessageError = 7,
}

// Message Header Error subcodes.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-5
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum MessageHeaderErrorSubcode {
    Unspecific = 0,
    ConnectionNotSynchronized = 1,
    BadMessageLength = 2,
    BadMessageType = 3,
}

// OPEN Message Error subcodes.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-6
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum OpenMessageErrorSubcode {
    Unspecific = 0,
    UnsupportedVersionNumber = 1,
    BadPeerAs = 2,
    BadBgpIdentifier = 3,
    UnsupportedOptParam = 4,
    UnacceptableHoldTime = 6,
    // RFC 5492
    UnsupportedCapability = 7,
}

// UPDATE Message Error subcodes.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-7
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum UpdateMessageErrorSubcode {
    Unspecific = 0,
    MalformedAttributeList = 1,
    UnrecognizedWellKnownAttribute = 2,
    MissingWellKnownAttribute = 3,
    AttributeFlagsError = 4,
    AttributeLengthError = 5,
    InvalidOriginAttribute = 6,
    InvalidNexthopAttribute = 8,
    OptionalAttributeError = 9,
    InvalidNetworkField = 10,
    MalformedAsPath = 11,
}

// BGP Finite State Machine Error Subcodes.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-finite-state-machine-error-subcodes
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum FsmErrorSubcode {
    UnexpectedMessageInOpenSent = 1,
    UnexpectedMessageInOpenConfirm = 2,
    UnexpectedMessageInEstablished = 3,
}

// BGP Cease NOTIFICATION message subcodes.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-8
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum CeaseSubcode {
    MaximumNumberofPrefixesReached = 1,
    AdministrativeShutdown = 2,
    PeerDeConfigured = 3,
    AdministrativeReset = 4,
    ConnectionRejected = 5,
    OtherConfigurationChange = 6,
    ConnectionCollisionResolution = 7,
    OutOfResources = 8,
}

// Address Family identifiers (AFI).
//
// IANA registry:
// http://www.iana.org/assignments/address-family-numbers
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
#[derive(Arbitrary)]
pub enum Afi {
    Ipv4 = 1,
    Ipv6 = 2,
    L2vpn = 25,
    BgpLs = 16388,
}

// Subsequent Address Family Identifiers (SAFI).
//
// IANA registry:
// https://www.iana.org/assignments/safi-namespace/safi-namespace.xhtml#safi-namespace-2
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
#[derive(Arbitrary)]
pub enum Safi {
    Unicast = 1,
    LabeledUnicast = 4,
    Evpn = 70,
    BgpLs = 71,
    LabeledVpn = 128,
    Ipv4FlowSpec = 133,
    Vpnv4FlowSpec = 134,
}

// BGP Path Attribute Flags.
bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct AttrFlags: u8 {
        const OPTIONAL = 0x80;
        const TRANSITIVE = 0x40;
        const PARTIAL = 0x20;
        const EXTENDED = 0x10;
    }
}

// BGP Path Attribute Types.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-parameters/bgp-parameters.xhtml#bgp-parameters-2
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
#[derive(Arbitrary)]
pub enum AttrType {
    Origin = 1,
    AsPath = 2,
    Nexthop = 3,
    Med = 4,
    LocalPref = 5,
    AtomicAggregate = 6,
    Aggregator = 7,
    // RFC 1997
    Communities = 8,
    // RFC 4456
    OriginatorId = 9,
    ClusterList = 10,
    // RFC 4760
    MpReachNlri = 14,
    MpUnreachNlri = 15,
    // RFC 4360
    ExtCommunities = 16,
    // RFC 6793
    As4Path = 17,
    As4Aggregator = 18,
    // RFC 5701
    Extv6Community = 25,
    // RFC 7752
    BgpLs = 29,
    // RFC 8092
    LargeCommunity = 32,
}

// BGP Origin.
pub type Origin = holo_utils::bgp::Origin;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum AsPathSegmentType {
    Set = 1,
    Sequence = 2,
    ConfedSequence = 3,
    ConfedSet = 4,
}

// Re-exports for convenience.
pub type WellKnownCommunities = holo_utils::bgp::WellKnownCommunities;

// Configurable (AFI, SAFI) tuples.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
#[derive(Arbitrary)]
#[serde(rename_all = "kebab-case")]
pub enum AfiSafi {
    Ipv4Unicast,
    Ipv6Unicast,
    Ipv4LabeledUnicast,
    Ipv6LabeledUnicast,
    Ipv4Vpn,
    Ipv6Vpn,
    L2vpnEvpn,
    Ipv4Flowspec,
    Ipv6Flowspec,
    Ipv4VpnFlowspec,
    Ipv6VpnFlowspec,
    LinkState,
}

// ===== impl Afi =====

impl std::fmt::Display for Afi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Afi::Ipv4 => write!(f, "ipv4"),
            Afi::Ipv6 => write!(f, "ipv6"),
            Afi::L2vpn => write!(f, "l2vpn"),
            Afi::BgpLs => write!(f, "bgp-ls"),
        }
    }
}

// ===== impl AfiSafi =====

impl AfiSafi {
    pub const ALL: [AfiSafi; 12] = [
        AfiSafi::Ipv4Unicast,
        AfiSafi::Ipv6Unicast,
        AfiSafi::Ipv4LabeledUnicast,
        AfiSafi::Ipv6LabeledUnicast,
        AfiSafi::Ipv4Vpn,
        AfiSafi::Ipv6Vpn,
        AfiSafi::L2vpnEvpn,
        AfiSafi::Ipv4Flowspec,
        AfiSafi::Ipv6Flowspec,
        AfiSafi::Ipv4VpnFlowspec,
        AfiSafi::Ipv6VpnFlowspec,
        AfiSafi::LinkState,
    ];

    pub fn new(afi: Afi, safi: Safi) -> Option<AfiSafi> {
        let afi_safi = match (afi, safi) {
            (Afi::Ipv4, Safi::Unicast) => AfiSafi::Ipv4Unicast,
            (Afi::Ipv6, Safi::Unicast) => AfiSafi::Ipv6Unicast,
            (Afi::Ipv4, Safi::LabeledUnicast) => AfiSafi::Ipv4LabeledUnicast,
            (Afi::Ipv6, Safi::LabeledUnicast) => AfiSafi::Ipv6LabeledUnicast,
            (Afi::Ipv4, Safi::LabeledVpn) => AfiSafi::Ipv4Vpn,
            (Afi::Ipv6, Safi::LabeledVpn) => AfiSafi::Ipv6Vpn,
            (Afi::L2vpn, Safi::Evpn) => AfiSafi::L2vpnEvpn,
            (Afi::Ipv4, Safi::Ipv4FlowSpec) => AfiSafi::Ipv4Flowspec,
            (Afi::Ipv6, Safi::Ipv4FlowSpec) => AfiSafi::Ipv6Flowspec,
            (Afi::Ipv4, Safi::Vpnv4FlowSpec) => AfiSafi::Ipv4VpnFlowspec,
            (Afi::Ipv6, Safi::Vpnv4FlowSpec) => AfiSafi::Ipv6VpnFlowspec,
            (Afi::BgpLs, Safi::BgpLs) => AfiSafi::LinkState,
            _ => return None,
        };
        Some(afi_safi)
    }

    pub fn afi(&self) -> Afi {
        match self {
            AfiSafi::Ipv4Unicast
            | AfiSafi::Ipv4LabeledUnicast
            | AfiSafi::Ipv4Vpn
            | AfiSafi::Ipv4Flowspec
            | AfiSafi::Ipv4VpnFlowspec => Afi::Ipv4,
            AfiSafi::Ipv6Unicast
            | AfiSafi::Ipv6LabeledUnicast
            | AfiSafi::Ipv6Vpn
            | AfiSafi::Ipv6Flowspec
            | AfiSafi::Ipv6VpnFlowspec => Afi::Ipv6,
            AfiSafi::L2vpnEvpn => Afi::L2vpn,
            AfiSafi::LinkState => Afi::BgpLs,
        }
    }

    pub fn safi(&self) -> Safi {
        match self {
            AfiSafi::Ipv4Unicast | AfiSafi::Ipv6Unicast => Safi::Unicast,
            AfiSafi::Ipv4LabeledUnicast | AfiSafi::Ipv6LabeledUnicast => {
                Safi::LabeledUnicast
            }
            AfiSafi::Ipv4Vpn | AfiSafi::Ipv6Vpn => Safi::LabeledVpn,
            AfiSafi::L2vpnEvpn => Safi::Evpn,
            AfiSafi::Ipv4Flowspec | AfiSafi::Ipv6Flowspec => {
                Safi::Ipv4FlowSpec
            }
            AfiSafi::Ipv4VpnFlowspec | AfiSafi::Ipv6VpnFlowspec => {
                Safi::Vpnv4FlowSpec
            }
            AfiSafi::LinkState => Safi::BgpLs,
        }
    }
}

impl std::fmt::Display for AfiSafi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AfiSafi::Ipv4Unicast => write!(f, "ipv4-unicast"),
            AfiSafi::Ipv6Unicast => write!(f, "ipv6-unicast"),
            AfiSafi::Ipv4LabeledUnicast => write!(f, "ipv4-labeled-unicast"),
            AfiSafi::Ipv6LabeledUnicast => write!(f, "ipv6-labeled-unicast"),
            AfiSafi::Ipv4Vpn => write!(f, "l3vpn-ipv4-unicast"),
            AfiSafi::Ipv6Vpn => write!(f, "l3vpn-ipv6-unicast"),
            AfiSafi::L2vpnEvpn => write!(f, "l2vpn-evpn"),
            AfiSafi::Ipv4Flowspec => write!(f, "ipv4-flowspec"),
            AfiSafi::Ipv6Flowspec => write!(f, "ipv6-flowspec"),
            AfiSafi::Ipv4VpnFlowspec => write!(f, "l3vpn-ipv4-flowspec"),
            AfiSafi::Ipv6VpnFlowspec => write!(f, "l3vpn-ipv6-flowspec"),
            AfiSafi::LinkState => write!(f, "link-state"),
        }
    }
}
