//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use arbitrary::Arbitrary;
use ipnetwork::IpNetwork;
use num_derive::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

// Address Family identifier.
//
// IANA registry:
// http://www.iana.org/assignments/address-family-numbers
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(FromPrimitive, ToPrimitive)]
#[derive(Deserialize, Serialize)]
#[derive(Arbitrary)]
pub enum AddressFamily {
    Ipv4 = 1,
    Ipv6 = 2,
}

// Extension methods for IpAddr.
pub trait IpAddrExt {
    // Returns length of the IP address in octets.
    fn length(&self) -> usize;
}

// Wire length of the fixed-size address types.
pub trait IpAddrLen {
    const LENGTH: usize;
}

// Extension methods for IpNetwork.
pub trait IpNetworkExt {
    // Returns the prefix with its host bits cleared.
    #[must_use]
    fn apply_mask(&self) -> IpNetwork;

    // Returns false for prefixes that must never be installed as routes.
    fn is_routable(&self) -> bool;
}

// ===== impl AddressFamily =====

impl AddressFamily {
    pub fn addr_len(&self) -> usize {
        match self {
            AddressFamily::Ipv4 => Ipv4Addr::LENGTH,
            AddressFamily::Ipv6 => Ipv6Addr::LENGTH,
        }
    }

    pub fn max_prefixlen(&self) -> u8 {
        (self.addr_len() * 8) as u8
    }
}

impl std::fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressFamily::Ipv4 => write!(f, "IPv4"),
            AddressFamily::Ipv6 => write!(f, "IPv6"),
        }
    }
}

// ===== impl IpAddr =====

impl IpAddrExt for IpAddr {
    fn length(&self) -> usize {
        let af = match self {
            IpAddr::V4(_) => AddressFamily::Ipv4,
            IpAddr::V6(_) => AddressFamily::Ipv6,
        };
        af.addr_len()
    }
}

impl IpAddrLen for Ipv4Addr {
    const LENGTH: usize = 4;
}

impl IpAddrLen for Ipv6Addr {
    const LENGTH: usize = 16;
}

// ===== impl IpNetwork =====

impl IpNetworkExt for IpNetwork {
    fn apply_mask(&self) -> IpNetwork {
        IpNetwork::new(self.network(), self.prefix()).unwrap_or(*self)
    }

    fn is_routable(&self) -> bool {
        match self.ip() {
            // The 240.0.0.0/4 block is reserved for future use.
            IpAddr::V4(addr) => {
                !addr.is_broadcast()
                    && !addr.is_loopback()
                    && !addr.is_multicast()
                    && addr.octets()[0] < 240
            }
            IpAddr::V6(addr) => {
                !addr.is_loopback()
                    && !addr.is_multicast()
                    && !addr.is_unicast_link_local()
            }
        }
    }
}

// ===== unit tests =====
