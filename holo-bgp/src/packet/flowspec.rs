//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use holo_utils::bytes::BytesExt;
use holo_utils::ip::AddressFamily;
use serde::{Deserialize, Serialize};

use crate::packet::error::NlriError;
use crate::packet::nlri::{RouteDistinguisher, prefix_wire_len};

//
// Flow Specification NLRI (RFC 8955 / RFC 8956).
//
// Encoding format:
//
// +-------------------------------+
// |    length (0xnn or 0xfnnn)    |
// +-------------------------------+
// |    [RD (8 octets)]            |
// +-------------------------------+
// |    NLRI value   (variable)    |
// +-------------------------------+
//
// Lengths smaller than 240 octets are encoded in a single octet. Otherwise the
// length is encoded in two octets, with the first nibble set to 0xf.
//
// Components must appear in strictly ascending order of type.
//
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct FlowspecRule {
    pub af: AddressFamily,
    pub rd: Option<RouteDistinguisher>,
    pub components: Vec<FlowComponent>,
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum FlowComponent {
    DestinationPrefix(FlowPrefix),
    SourcePrefix(FlowPrefix),
    IpProtocol(Vec<NumericOp>),
    Port(Vec<NumericOp>),
    DestinationPort(Vec<NumericOp>),
    SourcePort(Vec<NumericOp>),
    IcmpType(Vec<NumericOp>),
    IcmpCode(Vec<NumericOp>),
    TcpFlags(Vec<BitmaskOp>),
    PacketLength(Vec<NumericOp>),
    Dscp(Vec<NumericOp>),
    Fragment(Vec<BitmaskOp>),
    FlowLabel(Vec<NumericOp>),
}

// Prefix component.
//
// IPv6 prefixes carry a bit offset (RFC 8956), in which case the pattern holds
// the bits between the offset and the prefix length. The offset is always zero
// for IPv4.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct FlowPrefix {
    pub length: u8,
    pub offset: u8,
    pub pattern: Bytes,
}

//
// Numeric operator.
//
//    0   1   2   3   4   5   6   7
//  +---+---+---+---+---+---+---+---+
//  | e | a |  len  | 0 |lt |gt |eq |
//  +---+---+---+---+---+---+---+---+
//
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct NumericOp {
    pub flags: NumericOpFlags,
    pub len: u8,
    pub value: u64,
}

//
// Bitmask operator.
//
//    0   1   2   3   4   5   6   7
//  +---+---+---+---+---+---+---+---+
//  | e | a |  len  | 0 | 0 |not| m |
//  +---+---+---+---+---+---+---+---+
//
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct BitmaskOp {
    pub flags: BitmaskOpFlags,
    pub len: u8,
    pub value: u64,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct NumericOpFlags: u8 {
        const AND = 0x40;
        const LT = 0x04;
        const GT = 0x02;
        const EQ = 0x01;
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    #[serde(transparent)]
    pub struct BitmaskOpFlags: u8 {
        const AND = 0x40;
        const NOT = 0x02;
        const MATCH = 0x01;
    }
}

// Operator bits shared by both operator types.
const OP_END_OF_LIST: u8 = 0x80;
const OP_LEN_MASK: u8 = 0x30;
const OP_LEN_SHIFT: u8 = 4;

// ===== impl FlowspecRule =====

impl FlowspecRule {
    pub const MAX_LEN: usize = 0x0FFF;
    const EXTENDED_LEN_THRESHOLD: usize = 0xF0;

    pub fn decode(
        buf: &mut Bytes,
        af: AddressFamily,
        rd_present: bool,
    ) -> Result<FlowspecRule, NlriError> {
        // Parse NLRI length.
        let first = buf.try_get_u8()?;
        let len = if (first as usize) < Self::EXTENDED_LEN_THRESHOLD {
            first as usize
        } else {
            ((first as usize & 0x0F) << 8) | buf.try_get_u8()? as usize
        };
        if len == 0 {
            return Err(NlriError::InvalidFlowspecLength);
        }
        let mut buf = buf
            .try_split_to(len)
            .map_err(|_| NlriError::InvalidFlowspecLength)?;

        // Parse Route Distinguisher (VPN flowspec only).
        let rd = if rd_present {
            Some(RouteDistinguisher::decode(&mut buf)?)
        } else {
            None
        };

        // Parse components.
        let mut components = vec![];
        let mut last_type = None;
        while buf.has_remaining() {
            let comp_type = buf.try_get_u8()?;
            if last_type.is_some_and(|last_type| comp_type <= last_type) {
                return Err(NlriError::FlowspecComponentOrder(comp_type));
            }
            last_type = Some(comp_type);

            let component = FlowComponent::decode(&mut buf, comp_type, af)?;
            components.push(component);
        }

        Ok(FlowspecRule { af, rd, components })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        let mut value = BytesMut::new();
        if let Some(rd) = &self.rd {
            rd.encode(&mut value);
        }
        for component in &self.components {
            component.encode(&mut value, self.af);
        }

        // Encode NLRI length.
        let len = value.len();
        if len < Self::EXTENDED_LEN_THRESHOLD {
            buf.put_u8(len as u8);
        } else {
            buf.put_u16(0xF000 | len as u16);
        }
        buf.put_slice(&value);
    }
}

impl std::fmt::Display for FlowspecRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "flowspec")?;
        if let Some(rd) = &self.rd {
            write!(f, " [{rd}]")?;
        }
        for component in &self.components {
            write!(f, " {}", component.name())?;
        }
        Ok(())
    }
}

// ===== impl FlowComponent =====

impl FlowComponent {
    const DESTINATION_PREFIX: u8 = 1;
    const SOURCE_PREFIX: u8 = 2;
    const IP_PROTOCOL: u8 = 3;
    const PORT: u8 = 4;
    const DESTINATION_PORT: u8 = 5;
    const SOURCE_PORT: u8 = 6;
    const ICMP_TYPE: u8 = 7;
    const ICMP_CODE: u8 = 8;
    const TCP_FLAGS: u8 = 9;
    const PACKET_LENGTH: u8 = 10;
    const DSCP: u8 = 11;
    const FRAGMENT: u8 = 12;
    const FLOW_LABEL: u8 = 13;

    fn decode(
        buf: &mut Bytes,
        comp_type: u8,
        af: AddressFamily,
    ) -> Result<FlowComponent, NlriError> {
        let component = match comp_type {
            Self::DESTINATION_PREFIX => {
                FlowComponent::DestinationPrefix(FlowPrefix::decode(buf, af)?)
            }
            Self::SOURCE_PREFIX => {
                FlowComponent::SourcePrefix(FlowPrefix::decode(buf, af)?)
            }
            Self::IP_PROTOCOL => {
                FlowComponent::IpProtocol(NumericOp::decode_list(buf)?)
            }
            Self::PORT => FlowComponent::Port(NumericOp::decode_list(buf)?),
            Self::DESTINATION_PORT => {
                FlowComponent::DestinationPort(NumericOp::decode_list(buf)?)
            }
            Self::SOURCE_PORT => {
                FlowComponent::SourcePort(NumericOp::decode_list(buf)?)
            }
            Self::ICMP_TYPE => {
                FlowComponent::IcmpType(NumericOp::decode_list(buf)?)
            }
            Self::ICMP_CODE => {
                FlowComponent::IcmpCode(NumericOp::decode_list(buf)?)
            }
            Self::TCP_FLAGS => {
                FlowComponent::TcpFlags(BitmaskOp::decode_list(buf)?)
            }
            Self::PACKET_LENGTH => {
                FlowComponent::PacketLength(NumericOp::decode_list(buf)?)
            }
            Self::DSCP => FlowComponent::Dscp(NumericOp::decode_list(buf)?),
            Self::FRAGMENT => {
                FlowComponent::Fragment(BitmaskOp::decode_list(buf)?)
            }
            Self::FLOW_LABEL if af == AddressFamily::Ipv6 => {
                FlowComponent::FlowLabel(NumericOp::decode_list(buf)?)
            }
            _ => return Err(NlriError::UnknownFlowspecComponent(comp_type)),
        };

        Ok(component)
    }

    fn encode(&self, buf: &mut BytesMut, af: AddressFamily) {
        buf.put_u8(self.comp_type());
        match self {
            FlowComponent::DestinationPrefix(prefix)
            | FlowComponent::SourcePrefix(prefix) => prefix.encode(buf, af),
            FlowComponent::IpProtocol(ops)
            | FlowComponent::Port(ops)
            | FlowComponent::DestinationPort(ops)
            | FlowComponent::SourcePort(ops)
            | FlowComponent::IcmpType(ops)
            | FlowComponent::IcmpCode(ops)
            | FlowComponent::PacketLength(ops)
            | FlowComponent::Dscp(ops)
            | FlowComponent::FlowLabel(ops) => NumericOp::encode_list(buf, ops),
            FlowComponent::TcpFlags(ops) | FlowComponent::Fragment(ops) => {
                BitmaskOp::encode_list(buf, ops)
            }
        }
    }

    pub fn comp_type(&self) -> u8 {
        match self {
            FlowComponent::DestinationPrefix(_) => Self::DESTINATION_PREFIX,
            FlowComponent::SourcePrefix(_) => Self::SOURCE_PREFIX,
            FlowComponent::IpProtocol(_) => Self::IP_PROTOCOL,
            FlowComponent::Port(_) => Self::PORT,
            FlowComponent::DestinationPort(_) => Self::DESTINATION_PORT,
            FlowComponent::SourcePort(_) => Self::SOURCE_PORT,
            FlowComponent::IcmpType(_) => Self::ICMP_TYPE,
            FlowComponent::IcmpCode(_) => Self::ICMP_CODE,
            FlowComponent::TcpFlags(_) => Self::TCP_FLAGS,
            FlowComponent::PacketLength(_) => Self::PACKET_LENGTH,
            FlowComponent::Dscp(_) => Self::DSCP,
            FlowComponent::Fragment(_) => Self::FRAGMENT,
            FlowComponent::FlowLabel(_) => Self::FLOW_LABEL,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            FlowComponent::DestinationPrefix(_) => "dst-prefix",
            FlowComponent::SourcePrefix(_) => "src-prefix",
            FlowComponent::IpProtocol(_) => "protocol",
            FlowComponent::Port(_) => "port",
            FlowComponent::DestinationPort(_) => "dst-port",
            FlowComponent::SourcePort(_) => "src-port",
            FlowComponent::IcmpType(_) => "icmp-type",
            FlowComponent::IcmpCode(_) => "icmp-code",
            FlowComponent::TcpFlags(_) => "tcp-flags",
            FlowComponent::PacketLength(_) => "packet-length",
            FlowComponent::Dscp(_) => "dscp",
            FlowComponent::Fragment(_) => "fragment",
            FlowComponent::FlowLabel(_) => "flow-label",
        }
    }
}

// ===== impl FlowPrefix =====

impl FlowPrefix {
    fn decode(buf: &mut Bytes, af: AddressFamily) -> Result<Self, NlriError> {
        let length = buf.try_get_u8()?;
        if length > af.max_prefixlen() {
            return Err(NlriError::InvalidPrefixLength(length));
        }
        let offset = match af {
            AddressFamily::Ipv4 => 0,
            AddressFamily::Ipv6 => buf.try_get_u8()?,
        };
        if offset > length {
            return Err(NlriError::InvalidPrefixLength(length));
        }

        let pattern = buf.try_split_to(prefix_wire_len(length - offset))?;
        Ok(FlowPrefix {
            length,
            offset,
            pattern,
        })
    }

    fn encode(&self, buf: &mut BytesMut, af: AddressFamily) {
        buf.put_u8(self.length);
        if af == AddressFamily::Ipv6 {
            buf.put_u8(self.offset);
        }
        buf.put_slice(&self.pattern);
    }
}

// ===== impl NumericOp =====

impl NumericOp {
    fn decode_list(buf: &mut Bytes) -> Result<Vec<NumericOp>, NlriError> {
        decode_op_list(buf, |op, len, value| {
            // The reserved bit must be zero.
            if op & 0x08 != 0 {
                return Err(NlriError::InvalidFlowspecOperator(op));
            }
            let flags = NumericOpFlags::from_bits_truncate(op);
            Ok(NumericOp { flags, len, value })
        })
    }

    fn encode_list(buf: &mut BytesMut, ops: &[NumericOp]) {
        for (i, op) in ops.iter().enumerate() {
            let last = i + 1 == ops.len();
            encode_op(buf, op.flags.bits(), op.len, op.value, last);
        }
    }
}

// ===== impl BitmaskOp =====

impl BitmaskOp {
    fn decode_list(buf: &mut Bytes) -> Result<Vec<BitmaskOp>, NlriError> {
        decode_op_list(buf, |op, len, value| {
            // The reserved bits must be zero.
            if op & 0x0C != 0 {
                return Err(NlriError::InvalidFlowspecOperator(op));
            }
            let flags = BitmaskOpFlags::from_bits_truncate(op);
            Ok(BitmaskOp { flags, len, value })
        })
    }

    fn encode_list(buf: &mut BytesMut, ops: &[BitmaskOp]) {
        for (i, op) in ops.iter().enumerate() {
            let last = i + 1 == ops.len();
            encode_op(buf, op.flags.bits(), op.len, op.value, last);
        }
    }
}

// ===== helper functions =====

// Decodes an operator list, stopping after the operator with the end-of-list
// bit set.
fn decode_op_list<T>(
    buf: &mut Bytes,
    build: impl Fn(u8, u8, u64) -> Result<T, NlriError>,
) -> Result<Vec<T>, NlriError> {
    let mut ops = vec![];
    loop {
        let op = buf.try_get_u8()?;
        let len = 1u8 << ((op & OP_LEN_MASK) >> OP_LEN_SHIFT);
        let value = match len {
            1 => buf.try_get_u8()? as u64,
            2 => buf.try_get_u16()? as u64,
            4 => buf.try_get_u32()? as u64,
            _ => buf.try_get_u64()?,
        };
        ops.push(build(op, len, value)?);

        if op & OP_END_OF_LIST != 0 {
            return Ok(ops);
        }
    }
}

fn encode_op(buf: &mut BytesMut, flags: u8, len: u8, value: u64, last: bool) {
    let mut op = flags | ((len.trailing_zeros() as u8) << OP_LEN_SHIFT);
    if last {
        op |= OP_END_OF_LIST;
    }
    buf.put_u8(op);
    match len {
        1 => buf.put_u8(value as u8),
        2 => buf.put_u16(value as u16),
        4 => buf.put_u32(value as u32),
        _ => buf.put_u64(value),
    }
}

// ===== unit tests =====
