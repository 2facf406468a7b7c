//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! BGP value types shared between the codec, the RIB and the routing policy
//! layer.

use std::net::Ipv6Addr;

use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum RouteType {
    Internal,
    External,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
pub enum Origin {
    Igp = 0,
    Egp = 1,
    Incomplete = 2,
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Comm(pub u32);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct ExtComm(pub [u8; 8]);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Extv6Comm(pub Ipv6Addr, pub u32);

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LargeComm(pub [u8; 12]);

// BGP Well-known Communities.
//
// IANA registry:
// https://www.iana.org/assignments/bgp-well-known-communities/bgp-well-known-communities.xhtml
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
#[repr(u32)]
pub enum WellKnownCommunities {
    NoExport = 0xFFFFFF01,
    NoAdvertise = 0xFFFFFF02,
    NoExportSubconfed = 0xFFFFFF03,
}

// ===== impl RouteType =====

impl std::fmt::Display for RouteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteType::Internal => write!(f, "internal"),
            RouteType::External => write!(f, "external"),
        }
    }
}

// ===== impl Origin =====

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Igp => write!(f, "igp"),
            Origin::Egp => write!(f, "egp"),
            Origin::Incomplete => write!(f, "incomplete"),
        }
    }
}

// ===== impl Comm =====

impl std::fmt::Display for Comm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match WellKnownCommunities::from_u32(self.0) {
            Some(WellKnownCommunities::NoExport) => write!(f, "no-export"),
            Some(WellKnownCommunities::NoAdvertise) => {
                write!(f, "no-advertise")
            }
            Some(WellKnownCommunities::NoExportSubconfed) => {
                write!(f, "no-export-subconfed")
            }
            None => write!(f, "{}:{}", self.0 >> 16, self.0 & 0xFFFF),
        }
    }
}

// ===== impl ExtComm =====

impl std::fmt::Display for ExtComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "raw")?;
        for byte in self.0 {
            write!(f, ":{byte:02X}")?;
        }
        Ok(())
    }
}

// ===== impl Extv6Comm =====

impl std::fmt::Display for Extv6Comm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ipv6-raw:{}:{}", self.0, self.1)
    }
}

// ===== impl LargeComm =====

impl LargeComm {
    pub fn new(global: u32, local1: u32, local2: u32) -> LargeComm {
        let mut value = [0; 12];
        value[0..4].copy_from_slice(&global.to_be_bytes());
        value[4..8].copy_from_slice(&local1.to_be_bytes());
        value[8..12].copy_from_slice(&local2.to_be_bytes());
        LargeComm(value)
    }

    fn part(&self, idx: usize) -> u32 {
        let mut part = [0; 4];
        part.copy_from_slice(&self.0[idx * 4..idx * 4 + 4]);
        u32::from_be_bytes(part)
    }
}

impl std::fmt::Display for LargeComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.part(0), self.part(1), self.part(2))
    }
}
