//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use holo_utils::bytes::{BytesExt, BytesMutExt};
use holo_utils::ip::{AddressFamily, IpAddrLen};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::packet::error::NlriError;
use crate::packet::nlri::{decode_prefix_addr, encode_prefix_addr};

//
// BGP-LS NLRI (RFC 7752 - Section 3.2).
//
// Encoding format:
//
//  0                   1                   2                   3
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |            NLRI Type          |     Total NLRI Length         |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |  Protocol-ID  |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                           Identifier                          |
// |                            (64 bits)                          |
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// //              Descriptor TLVs (variable)                     //
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LinkStateNlri {
    Node(LsDescriptors),
    Link(LsDescriptors),
    Ipv4Prefix(LsDescriptors),
    Ipv6Prefix(LsDescriptors),
    Unknown { nlri_type: u16, value: Bytes },
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LsDescriptors {
    pub protocol_id: u8,
    pub identifier: u64,
    pub tlvs: Vec<LsDescriptor>,
}

// Node, link and prefix descriptor TLVs.
//
// Unknown TLVs are kept in wire order.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LsDescriptor {
    LocalNode(Vec<NodeDescriptor>),
    RemoteNode(Vec<NodeDescriptor>),
    LinkIds { local: u32, remote: u32 },
    Ipv4InterfaceAddr(Ipv4Addr),
    Ipv4NeighborAddr(Ipv4Addr),
    Ipv6InterfaceAddr(Ipv6Addr),
    Ipv6NeighborAddr(Ipv6Addr),
    MultiTopologyId(Vec<u16>),
    OspfRouteType(u8),
    IpReachability(IpNetwork),
    Unknown { tlv_type: u16, value: Bytes },
}

// Node descriptor sub-TLVs.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum NodeDescriptor {
    AsNumber(u32),
    BgpLsId(u32),
    OspfAreaId(u32),
    IgpRouterId(Bytes),
    Unknown { tlv_type: u16, value: Bytes },
}

// TLV types.
const TLV_LOCAL_NODE: u16 = 256;
const TLV_REMOTE_NODE: u16 = 257;
const TLV_LINK_IDS: u16 = 258;
const TLV_IPV4_INTERFACE_ADDR: u16 = 259;
const TLV_IPV4_NEIGHBOR_ADDR: u16 = 260;
const TLV_IPV6_INTERFACE_ADDR: u16 = 261;
const TLV_IPV6_NEIGHBOR_ADDR: u16 = 262;
const TLV_MT_ID: u16 = 263;
const TLV_OSPF_ROUTE_TYPE: u16 = 264;
const TLV_IP_REACHABILITY: u16 = 265;
const TLV_AS_NUMBER: u16 = 512;
const TLV_BGP_LS_ID: u16 = 513;
const TLV_OSPF_AREA_ID: u16 = 514;
const TLV_IGP_ROUTER_ID: u16 = 515;

const TLV_HDR_LEN: usize = 4;

// ===== impl LinkStateNlri =====

impl LinkStateNlri {
    const NODE: u16 = 1;
    const LINK: u16 = 2;
    const IPV4_PREFIX: u16 = 3;
    const IPV6_PREFIX: u16 = 4;

    pub fn decode(buf: &mut Bytes) -> Result<LinkStateNlri, NlriError> {
        let nlri_type = buf.try_get_u16()?;
        let nlri_len = buf.try_get_u16()?;
        let mut buf = buf.try_split_to(nlri_len as usize)?;

        let nlri = match nlri_type {
            Self::NODE => LinkStateNlri::Node(LsDescriptors::decode(
                &mut buf,
                nlri_type,
                AddressFamily::Ipv4,
            )?),
            Self::LINK => LinkStateNlri::Link(LsDescriptors::decode(
                &mut buf,
                nlri_type,
                AddressFamily::Ipv4,
            )?),
            Self::IPV4_PREFIX => LinkStateNlri::Ipv4Prefix(
                LsDescriptors::decode(
                    &mut buf,
                    nlri_type,
                    AddressFamily::Ipv4,
                )?,
            ),
            Self::IPV6_PREFIX => LinkStateNlri::Ipv6Prefix(
                LsDescriptors::decode(
                    &mut buf,
                    nlri_type,
                    AddressFamily::Ipv6,
                )?,
            ),
            _ => LinkStateNlri::Unknown {
                nlri_type,
                value: buf,
            },
        };

        Ok(nlri)
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(self.nlri_type());

        // The length field will be initialized later.
        let start_pos = buf.len();
        buf.put_u16(0);

        match self {
            LinkStateNlri::Node(descriptors)
            | LinkStateNlri::Link(descriptors)
            | LinkStateNlri::Ipv4Prefix(descriptors)
            | LinkStateNlri::Ipv6Prefix(descriptors) => descriptors.encode(buf),
            LinkStateNlri::Unknown { value, .. } => buf.put_slice(value),
        }

        // Rewrite NLRI length.
        let nlri_len = (buf.len() - start_pos - 2) as u16;
        buf[start_pos..start_pos + 2].copy_from_slice(&nlri_len.to_be_bytes());
    }

    pub fn nlri_type(&self) -> u16 {
        match self {
            LinkStateNlri::Node(_) => Self::NODE,
            LinkStateNlri::Link(_) => Self::LINK,
            LinkStateNlri::Ipv4Prefix(_) => Self::IPV4_PREFIX,
            LinkStateNlri::Ipv6Prefix(_) => Self::IPV6_PREFIX,
            LinkStateNlri::Unknown { nlri_type, .. } => *nlri_type,
        }
    }
}

impl std::fmt::Display for LinkStateNlri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (name, descriptors) = match self {
            LinkStateNlri::Node(descriptors) => ("node", descriptors),
            LinkStateNlri::Link(descriptors) => ("link", descriptors),
            LinkStateNlri::Ipv4Prefix(descriptors) => {
                ("ipv4-prefix", descriptors)
            }
            LinkStateNlri::Ipv6Prefix(descriptors) => {
                ("ipv6-prefix", descriptors)
            }
            LinkStateNlri::Unknown { nlri_type, .. } => {
                return write!(f, "ls-unknown({nlri_type})");
            }
        };
        write!(
            f,
            "ls-{} protocol {} id {:#x} ({} descriptors)",
            name,
            descriptors.protocol_id,
            descriptors.identifier,
            descriptors.tlvs.len()
        )
    }
}

// ===== impl LsDescriptors =====

impl LsDescriptors {
    const MIN_LEN: usize = 9;

    fn decode(
        buf: &mut Bytes,
        nlri_type: u16,
        af: AddressFamily,
    ) -> Result<Self, NlriError> {
        if buf.remaining() < Self::MIN_LEN {
            return Err(NlriError::InvalidLinkStateNlri(nlri_type));
        }
        let protocol_id = buf.try_get_u8()?;
        let identifier = buf.try_get_u64()?;

        let mut tlvs = vec![];
        while buf.has_remaining() {
            let (tlv_type, mut buf_tlv) = decode_tlv_hdr(buf)?;
            let tlv = LsDescriptor::decode(tlv_type, &mut buf_tlv, af)?;
            tlvs.push(tlv);
        }

        Ok(LsDescriptors {
            protocol_id,
            identifier,
            tlvs,
        })
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.protocol_id);
        buf.put_u64(self.identifier);
        for tlv in &self.tlvs {
            tlv.encode(buf);
        }
    }

    // Returns the local node descriptors, if present.
    pub fn local_node(&self) -> Option<&[NodeDescriptor]> {
        self.tlvs.iter().find_map(|tlv| match tlv {
            LsDescriptor::LocalNode(node) => Some(node.as_slice()),
            _ => None,
        })
    }
}

// ===== impl LsDescriptor =====

impl LsDescriptor {
    fn decode(
        tlv_type: u16,
        buf: &mut Bytes,
        af: AddressFamily,
    ) -> Result<Self, NlriError> {
        let tlv_len = buf.remaining();
        let check_len = |len: usize| {
            if tlv_len != len {
                Err(NlriError::InvalidLinkStateTlv(tlv_type))
            } else {
                Ok(())
            }
        };

        let tlv = match tlv_type {
            TLV_LOCAL_NODE => {
                LsDescriptor::LocalNode(NodeDescriptor::decode_list(buf)?)
            }
            TLV_REMOTE_NODE => {
                LsDescriptor::RemoteNode(NodeDescriptor::decode_list(buf)?)
            }
            TLV_LINK_IDS => {
                check_len(8)?;
                let local = buf.try_get_u32()?;
                let remote = buf.try_get_u32()?;
                LsDescriptor::LinkIds { local, remote }
            }
            TLV_IPV4_INTERFACE_ADDR => {
                check_len(Ipv4Addr::LENGTH)?;
                LsDescriptor::Ipv4InterfaceAddr(buf.try_get_ipv4()?)
            }
            TLV_IPV4_NEIGHBOR_ADDR => {
                check_len(Ipv4Addr::LENGTH)?;
                LsDescriptor::Ipv4NeighborAddr(buf.try_get_ipv4()?)
            }
            TLV_IPV6_INTERFACE_ADDR => {
                check_len(Ipv6Addr::LENGTH)?;
                LsDescriptor::Ipv6InterfaceAddr(buf.try_get_ipv6()?)
            }
            TLV_IPV6_NEIGHBOR_ADDR => {
                check_len(Ipv6Addr::LENGTH)?;
                LsDescriptor::Ipv6NeighborAddr(buf.try_get_ipv6()?)
            }
            TLV_MT_ID => {
                if tlv_len == 0 || tlv_len % 2 != 0 {
                    return Err(NlriError::InvalidLinkStateTlv(tlv_type));
                }
                let mut ids = vec![];
                while buf.has_remaining() {
                    ids.push(buf.try_get_u16()?);
                }
                LsDescriptor::MultiTopologyId(ids)
            }
            TLV_OSPF_ROUTE_TYPE => {
                check_len(1)?;
                LsDescriptor::OspfRouteType(buf.try_get_u8()?)
            }
            TLV_IP_REACHABILITY => {
                let plen = buf.try_get_u8()?;
                let prefix = decode_prefix_addr(buf, af, plen)
                    .map_err(|_| NlriError::InvalidLinkStateTlv(tlv_type))?;
                if buf.has_remaining() {
                    return Err(NlriError::InvalidLinkStateTlv(tlv_type));
                }
                LsDescriptor::IpReachability(prefix)
            }
            _ => LsDescriptor::Unknown {
                tlv_type,
                value: buf.split_to(tlv_len),
            },
        };

        Ok(tlv)
    }

    fn encode(&self, buf: &mut BytesMut) {
        let start_pos = encode_tlv_hdr(buf, self.tlv_type());
        match self {
            LsDescriptor::LocalNode(node) | LsDescriptor::RemoteNode(node) => {
                for descriptor in node {
                    descriptor.encode(buf);
                }
            }
            LsDescriptor::LinkIds { local, remote } => {
                buf.put_u32(*local);
                buf.put_u32(*remote);
            }
            LsDescriptor::Ipv4InterfaceAddr(addr)
            | LsDescriptor::Ipv4NeighborAddr(addr) => buf.put_ipv4(addr),
            LsDescriptor::Ipv6InterfaceAddr(addr)
            | LsDescriptor::Ipv6NeighborAddr(addr) => buf.put_ipv6(addr),
            LsDescriptor::MultiTopologyId(ids) => {
                for id in ids {
                    buf.put_u16(*id);
                }
            }
            LsDescriptor::OspfRouteType(route_type) => buf.put_u8(*route_type),
            LsDescriptor::IpReachability(prefix) => {
                buf.put_u8(prefix.prefix());
                encode_prefix_addr(buf, &prefix.ip(), prefix.prefix());
            }
            LsDescriptor::Unknown { value, .. } => buf.put_slice(value),
        }
        encode_tlv_len(buf, start_pos);
    }

    fn tlv_type(&self) -> u16 {
        match self {
            LsDescriptor::LocalNode(_) => TLV_LOCAL_NODE,
            LsDescriptor::RemoteNode(_) => TLV_REMOTE_NODE,
            LsDescriptor::LinkIds { .. } => TLV_LINK_IDS,
            LsDescriptor::Ipv4InterfaceAddr(_) => TLV_IPV4_INTERFACE_ADDR,
            LsDescriptor::Ipv4NeighborAddr(_) => TLV_IPV4_NEIGHBOR_ADDR,
            LsDescriptor::Ipv6InterfaceAddr(_) => TLV_IPV6_INTERFACE_ADDR,
            LsDescriptor::Ipv6NeighborAddr(_) => TLV_IPV6_NEIGHBOR_ADDR,
            LsDescriptor::MultiTopologyId(_) => TLV_MT_ID,
            LsDescriptor::OspfRouteType(_) => TLV_OSPF_ROUTE_TYPE,
            LsDescriptor::IpReachability(_) => TLV_IP_REACHABILITY,
            LsDescriptor::Unknown { tlv_type, .. } => *tlv_type,
        }
    }
}

// ===== impl NodeDescriptor =====

impl NodeDescriptor {
    fn decode_list(buf: &mut Bytes) -> Result<Vec<Self>, NlriError> {
        let mut descriptors = vec![];
        while buf.has_remaining() {
            let (tlv_type, mut buf_tlv) = decode_tlv_hdr(buf)?;
            let tlv_len = buf_tlv.remaining();
            let descriptor = match tlv_type {
                TLV_AS_NUMBER | TLV_BGP_LS_ID | TLV_OSPF_AREA_ID => {
                    if tlv_len != 4 {
                        return Err(NlriError::InvalidLinkStateTlv(tlv_type));
                    }
                    let value = buf_tlv.try_get_u32()?;
                    match tlv_type {
                        TLV_AS_NUMBER => NodeDescriptor::AsNumber(value),
                        TLV_BGP_LS_ID => NodeDescriptor::BgpLsId(value),
                        _ => NodeDescriptor::OspfAreaId(value),
                    }
                }
                TLV_IGP_ROUTER_ID => {
                    // IS-IS system ID, OSPF router ID or pseudonode variants.
                    if !matches!(tlv_len, 4 | 6 | 7 | 8) {
                        return Err(NlriError::InvalidLinkStateTlv(tlv_type));
                    }
                    NodeDescriptor::IgpRouterId(buf_tlv)
                }
                _ => NodeDescriptor::Unknown {
                    tlv_type,
                    value: buf_tlv,
                },
            };
            descriptors.push(descriptor);
        }
        Ok(descriptors)
    }

    fn encode(&self, buf: &mut BytesMut) {
        let start_pos = encode_tlv_hdr(buf, self.tlv_type());
        match self {
            NodeDescriptor::AsNumber(value)
            | NodeDescriptor::BgpLsId(value)
            | NodeDescriptor::OspfAreaId(value) => buf.put_u32(*value),
            NodeDescriptor::IgpRouterId(value)
            | NodeDescriptor::Unknown { value, .. } => buf.put_slice(value),
        }
        encode_tlv_len(buf, start_pos);
    }

    fn tlv_type(&self) -> u16 {
        match self {
            NodeDescriptor::AsNumber(_) => TLV_AS_NUMBER,
            NodeDescriptor::BgpLsId(_) => TLV_BGP_LS_ID,
            NodeDescriptor::OspfAreaId(_) => TLV_OSPF_AREA_ID,
            NodeDescriptor::IgpRouterId(_) => TLV_IGP_ROUTER_ID,
            NodeDescriptor::Unknown { tlv_type, .. } => *tlv_type,
        }
    }
}

// ===== helper functions =====

fn decode_tlv_hdr(buf: &mut Bytes) -> Result<(u16, Bytes), NlriError> {
    if buf.remaining() < TLV_HDR_LEN {
        return Err(NlriError::ReadOutOfBounds);
    }
    let tlv_type = buf.try_get_u16()?;
    let tlv_len = buf.try_get_u16()?;
    let buf_tlv = buf
        .try_split_to(tlv_len as usize)
        .map_err(|_| NlriError::InvalidLinkStateTlv(tlv_type))?;
    Ok((tlv_type, buf_tlv))
}

fn encode_tlv_hdr(buf: &mut BytesMut, tlv_type: u16) -> usize {
    buf.put_u16(tlv_type);
    // The length field will be initialized later.
    let start_pos = buf.len();
    buf.put_u16(0);
    start_pos
}

fn encode_tlv_len(buf: &mut BytesMut, start_pos: usize) {
    let tlv_len = (buf.len() - start_pos - 2) as u16;
    buf[start_pos..start_pos + 2].copy_from_slice(&tlv_len.to_be_bytes());
}
