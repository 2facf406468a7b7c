//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use holo_utils::bytes::{BytesExt, BytesMutExt};
use holo_utils::ip::{IpAddrExt, IpAddrLen};
use holo_utils::mac_addr::MacAddr;
use holo_utils::mpls::LabelStackEntry;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::packet::error::NlriError;
use crate::packet::nlri::RouteDistinguisher;

//
// EVPN NLRI (RFC 7432 - Section 7).
//
// Encoding format:
//
// +-----------------------------------+
// |    Route Type (1 octet)           |
// +-----------------------------------+
// |     Length (1 octet)              |
// +-----------------------------------+
// | Route Type specific (variable)    |
// +-----------------------------------+
//
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum EvpnRoute {
    EthernetAd(EthernetAdRoute),
    MacIp(MacIpRoute),
    InclusiveMulticast(InclusiveMulticastRoute),
    EthernetSegment(EthernetSegmentRoute),
    IpPrefix(IpPrefixRoute),
    Unknown { route_type: u8, value: Bytes },
}

// Ethernet Segment Identifier.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Esi(pub [u8; 10]);

//
// Ethernet Auto-Discovery route (type 1).
//
// +---------------------------------------+
// |  Route Distinguisher (RD) (8 octets)  |
// +---------------------------------------+
// |Ethernet Segment Identifier (10 octets)|
// +---------------------------------------+
// |  Ethernet Tag ID (4 octets)           |
// +---------------------------------------+
// |  MPLS Label (3 octets)                |
// +---------------------------------------+
//
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct EthernetAdRoute {
    pub rd: RouteDistinguisher,
    pub esi: Esi,
    pub ethernet_tag: u32,
    pub label: LabelStackEntry,
}

//
// MAC/IP Advertisement route (type 2).
//
// +---------------------------------------+
// |  RD (8 octets)                        |
// +---------------------------------------+
// |Ethernet Segment Identifier (10 octets)|
// +---------------------------------------+
// |  Ethernet Tag ID (4 octets)           |
// +---------------------------------------+
// |  MAC Address Length (1 octet)         |
// +---------------------------------------+
// |  MAC Address (6 octets)               |
// +---------------------------------------+
// |  IP Address Length (1 octet)          |
// +---------------------------------------+
// |  IP Address (0, 4, or 16 octets)      |
// +---------------------------------------+
// |  MPLS Label1 (3 octets)               |
// +---------------------------------------+
// |  MPLS Label2 (0 or 3 octets)          |
// +---------------------------------------+
//
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct MacIpRoute {
    pub rd: RouteDistinguisher,
    pub esi: Esi,
    pub ethernet_tag: u32,
    pub mac: MacAddr,
    pub ip: Option<IpAddr>,
    pub label1: LabelStackEntry,
    pub label2: Option<LabelStackEntry>,
}

//
// Inclusive Multicast Ethernet Tag route (type 3).
//
// +---------------------------------------+
// |  RD (8 octets)                        |
// +---------------------------------------+
// |  Ethernet Tag ID (4 octets)           |
// +---------------------------------------+
// |  IP Address Length (1 octet)          |
// +---------------------------------------+
// |  Originating Router's IP Address      |
// |          (4 or 16 octets)             |
// +---------------------------------------+
//
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct InclusiveMulticastRoute {
    pub rd: RouteDistinguisher,
    pub ethernet_tag: u32,
    pub originator: IpAddr,
}

//
// Ethernet Segment route (type 4).
//
// +---------------------------------------+
// |  RD (8 octets)                        |
// +---------------------------------------+
// |Ethernet Segment Identifier (10 octets)|
// +---------------------------------------+
// |  IP Address Length (1 octet)          |
// +---------------------------------------+
// |  Originating Router's IP Address      |
// |          (4 or 16 octets)             |
// +---------------------------------------+
//
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct EthernetSegmentRoute {
    pub rd: RouteDistinguisher,
    pub esi: Esi,
    pub originator: IpAddr,
}

//
// IP Prefix route (type 5, RFC 9136).
//
// +---------------------------------------+
// |      RD (8 octets)                    |
// +---------------------------------------+
// |Ethernet Segment Identifier (10 octets)|
// +---------------------------------------+
// |  Ethernet Tag ID (4 octets)           |
// +---------------------------------------+
// |  IP Prefix Length (1 octet)           |
// +---------------------------------------+
// |  IP Prefix (4 or 16 octets)           |
// +---------------------------------------+
// |  GW IP Address (4 or 16 octets)       |
// +---------------------------------------+
// |  MPLS Label (3 octets)                |
// +---------------------------------------+
//
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct IpPrefixRoute {
    pub rd: RouteDistinguisher,
    pub esi: Esi,
    pub ethernet_tag: u32,
    pub prefix: IpNetwork,
    pub gateway: IpAddr,
    pub label: LabelStackEntry,
}

// ===== impl EvpnRoute =====

impl EvpnRoute {
    const ETHERNET_AD: u8 = 1;
    const MAC_IP: u8 = 2;
    const INCLUSIVE_MULTICAST: u8 = 3;
    const ETHERNET_SEGMENT: u8 = 4;
    const IP_PREFIX: u8 = 5;

    pub fn decode(buf: &mut Bytes) -> Result<EvpnRoute, NlriError> {
        let route_type = buf.try_get_u8()?;
        let route_len = buf.try_get_u8()?;
        let mut buf = buf.try_split_to(route_len as usize)?;

        let route = match route_type {
            Self::ETHERNET_AD => {
                EvpnRoute::EthernetAd(EthernetAdRoute::decode(&mut buf)?)
            }
            Self::MAC_IP => EvpnRoute::MacIp(MacIpRoute::decode(&mut buf)?),
            Self::INCLUSIVE_MULTICAST => EvpnRoute::InclusiveMulticast(
                InclusiveMulticastRoute::decode(&mut buf)?,
            ),
            Self::ETHERNET_SEGMENT => EvpnRoute::EthernetSegment(
                EthernetSegmentRoute::decode(&mut buf)?,
            ),
            Self::IP_PREFIX => {
                EvpnRoute::IpPrefix(IpPrefixRoute::decode(&mut buf)?)
            }
            _ => {
                let value = buf.split_to(buf.remaining());
                EvpnRoute::Unknown { route_type, value }
            }
        };

        // Trailing data inside the route is an error.
        if buf.has_remaining() {
            return Err(NlriError::InvalidEvpnRoute(route_type));
        }

        Ok(route)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.route_type());

        // The length field will be initialized later.
        let start_pos = buf.len();
        buf.put_u8(0);

        match self {
            EvpnRoute::EthernetAd(route) => route.encode(buf),
            EvpnRoute::MacIp(route) => route.encode(buf),
            EvpnRoute::InclusiveMulticast(route) => route.encode(buf),
            EvpnRoute::EthernetSegment(route) => route.encode(buf),
            EvpnRoute::IpPrefix(route) => route.encode(buf),
            EvpnRoute::Unknown { value, .. } => buf.put_slice(value),
        }

        // Rewrite route length.
        let route_len = buf.len() - start_pos - 1;
        buf[start_pos] = route_len as u8;
    }

    pub fn route_type(&self) -> u8 {
        match self {
            EvpnRoute::EthernetAd(_) => Self::ETHERNET_AD,
            EvpnRoute::MacIp(_) => Self::MAC_IP,
            EvpnRoute::InclusiveMulticast(_) => Self::INCLUSIVE_MULTICAST,
            EvpnRoute::EthernetSegment(_) => Self::ETHERNET_SEGMENT,
            EvpnRoute::IpPrefix(_) => Self::IP_PREFIX,
            EvpnRoute::Unknown { route_type, .. } => *route_type,
        }
    }

    pub fn rd(&self) -> Option<&RouteDistinguisher> {
        match self {
            EvpnRoute::EthernetAd(route) => Some(&route.rd),
            EvpnRoute::MacIp(route) => Some(&route.rd),
            EvpnRoute::InclusiveMulticast(route) => Some(&route.rd),
            EvpnRoute::EthernetSegment(route) => Some(&route.rd),
            EvpnRoute::IpPrefix(route) => Some(&route.rd),
            EvpnRoute::Unknown { .. } => None,
        }
    }
}

impl std::fmt::Display for EvpnRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvpnRoute::EthernetAd(route) => write!(
                f,
                "[1]:[{}]:[{}]:[{}]",
                route.rd, route.esi, route.ethernet_tag
            ),
            EvpnRoute::MacIp(route) => {
                write!(
                    f,
                    "[2]:[{}]:[{}]:[{}]:[{}]",
                    route.rd, route.esi, route.ethernet_tag, route.mac
                )?;
                if let Some(ip) = &route.ip {
                    write!(f, ":[{ip}]")?;
                }
                Ok(())
            }
            EvpnRoute::InclusiveMulticast(route) => write!(
                f,
                "[3]:[{}]:[{}]:[{}]",
                route.rd, route.ethernet_tag, route.originator
            ),
            EvpnRoute::EthernetSegment(route) => write!(
                f,
                "[4]:[{}]:[{}]:[{}]",
                route.rd, route.esi, route.originator
            ),
            EvpnRoute::IpPrefix(route) => write!(
                f,
                "[5]:[{}]:[{}]:[{}]",
                route.rd, route.ethernet_tag, route.prefix
            ),
            EvpnRoute::Unknown { route_type, value } => {
                write!(f, "[{route_type}]:<{} bytes>", value.len())
            }
        }
    }
}

// ===== impl Esi =====

impl Esi {
    pub const LENGTH: usize = 10;

    fn decode(buf: &mut Bytes) -> Result<Esi, NlriError> {
        let mut esi = [0; Self::LENGTH];
        buf.try_copy_to_slice(&mut esi)?;
        Ok(Esi(esi))
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.0);
    }
}

impl std::fmt::Display for Esi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

// ===== impl EthernetAdRoute =====

impl EthernetAdRoute {
    fn decode(buf: &mut Bytes) -> Result<Self, NlriError> {
        let rd = RouteDistinguisher::decode(buf)?;
        let esi = Esi::decode(buf)?;
        let ethernet_tag = buf.try_get_u32()?;
        let label = LabelStackEntry::from_raw(buf.try_get_u24()?);
        Ok(EthernetAdRoute {
            rd,
            esi,
            ethernet_tag,
            label,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.rd.encode(buf);
        self.esi.encode(buf);
        buf.put_u32(self.ethernet_tag);
        buf.put_u24(self.label.raw());
    }
}

// ===== impl MacIpRoute =====

impl MacIpRoute {
    fn decode(buf: &mut Bytes) -> Result<Self, NlriError> {
        let rd = RouteDistinguisher::decode(buf)?;
        let esi = Esi::decode(buf)?;
        let ethernet_tag = buf.try_get_u32()?;

        // MAC address length is expressed in bits.
        let mac_len = buf.try_get_u8()?;
        if mac_len as usize != MacAddr::LENGTH * 8 {
            return Err(NlriError::InvalidEvpnRoute(EvpnRoute::MAC_IP));
        }
        let mut mac = [0; MacAddr::LENGTH];
        buf.try_copy_to_slice(&mut mac)?;
        let mac = MacAddr::from(mac);

        let ip_len = buf.try_get_u8()?;
        let ip = match ip_len {
            0 => None,
            32 => Some(IpAddr::V4(buf.try_get_ipv4()?)),
            128 => Some(IpAddr::V6(buf.try_get_ipv6()?)),
            _ => return Err(NlriError::InvalidEvpnRoute(EvpnRoute::MAC_IP)),
        };

        let label1 = LabelStackEntry::from_raw(buf.try_get_u24()?);
        let label2 = if buf.has_remaining() {
            Some(LabelStackEntry::from_raw(buf.try_get_u24()?))
        } else {
            None
        };

        Ok(MacIpRoute {
            rd,
            esi,
            ethernet_tag,
            mac,
            ip,
            label1,
            label2,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.rd.encode(buf);
        self.esi.encode(buf);
        buf.put_u32(self.ethernet_tag);
        buf.put_u8((MacAddr::LENGTH * 8) as u8);
        buf.put_slice(&self.mac.octets());
        match &self.ip {
            Some(ip) => {
                buf.put_u8((ip.length() * 8) as u8);
                buf.put_ip(ip);
            }
            None => buf.put_u8(0),
        }
        buf.put_u24(self.label1.raw());
        if let Some(label2) = &self.label2 {
            buf.put_u24(label2.raw());
        }
    }
}

// ===== impl InclusiveMulticastRoute =====

impl InclusiveMulticastRoute {
    fn decode(buf: &mut Bytes) -> Result<Self, NlriError> {
        let rd = RouteDistinguisher::decode(buf)?;
        let ethernet_tag = buf.try_get_u32()?;
        let originator =
            decode_originator(buf, EvpnRoute::INCLUSIVE_MULTICAST)?;
        Ok(InclusiveMulticastRoute {
            rd,
            ethernet_tag,
            originator,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.rd.encode(buf);
        buf.put_u32(self.ethernet_tag);
        encode_originator(buf, &self.originator);
    }
}

// ===== impl EthernetSegmentRoute =====

impl EthernetSegmentRoute {
    fn decode(buf: &mut Bytes) -> Result<Self, NlriError> {
        let rd = RouteDistinguisher::decode(buf)?;
        let esi = Esi::decode(buf)?;
        let originator = decode_originator(buf, EvpnRoute::ETHERNET_SEGMENT)?;
        Ok(EthernetSegmentRoute {
            rd,
            esi,
            originator,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.rd.encode(buf);
        self.esi.encode(buf);
        encode_originator(buf, &self.originator);
    }
}

// ===== impl IpPrefixRoute =====

impl IpPrefixRoute {
    const IPV4_LEN: usize = 34;
    const IPV6_LEN: usize = 58;

    fn decode(buf: &mut Bytes) -> Result<Self, NlriError> {
        // The address family is implied by the route length.
        let ipv6 = match buf.remaining() {
            Self::IPV4_LEN => false,
            Self::IPV6_LEN => true,
            _ => return Err(NlriError::InvalidEvpnRoute(EvpnRoute::IP_PREFIX)),
        };

        let rd = RouteDistinguisher::decode(buf)?;
        let esi = Esi::decode(buf)?;
        let ethernet_tag = buf.try_get_u32()?;
        let plen = buf.try_get_u8()?;
        let (addr, gateway) = if ipv6 {
            (
                IpAddr::V6(buf.try_get_ipv6()?),
                IpAddr::V6(buf.try_get_ipv6()?),
            )
        } else {
            (
                IpAddr::V4(buf.try_get_ipv4()?),
                IpAddr::V4(buf.try_get_ipv4()?),
            )
        };
        let prefix = IpNetwork::new(addr, plen).map_err(|_| {
            NlriError::InvalidEvpnRoute(EvpnRoute::IP_PREFIX)
        })?;
        let label = LabelStackEntry::from_raw(buf.try_get_u24()?);

        Ok(IpPrefixRoute {
            rd,
            esi,
            ethernet_tag,
            prefix,
            gateway,
            label,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        self.rd.encode(buf);
        self.esi.encode(buf);
        buf.put_u32(self.ethernet_tag);
        buf.put_u8(self.prefix.prefix());
        buf.put_ip(&self.prefix.ip());
        buf.put_ip(&self.gateway);
        buf.put_u24(self.label.raw());
    }
}

// ===== helper functions =====

fn decode_originator(
    buf: &mut Bytes,
    route_type: u8,
) -> Result<IpAddr, NlriError> {
    let ip_len = buf.try_get_u8()? as usize;
    if ip_len == Ipv4Addr::LENGTH * 8 {
        Ok(IpAddr::V4(buf.try_get_ipv4()?))
    } else if ip_len == Ipv6Addr::LENGTH * 8 {
        Ok(IpAddr::V6(buf.try_get_ipv6()?))
    } else {
        Err(NlriError::InvalidEvpnRoute(route_type))
    }
}

fn encode_originator(buf: &mut BytesMut, originator: &IpAddr) {
    buf.put_u8((originator.length() * 8) as u8);
    buf.put_ip(originator);
}
