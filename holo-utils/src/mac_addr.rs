//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

// IEEE EUI-48 MAC address, as carried in EVPN routes.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct MacAddr([u8; MacAddr::LENGTH]);

// ===== impl MacAddr =====

impl MacAddr {
    pub const LENGTH: usize = 6;

    pub fn octets(&self) -> [u8; Self::LENGTH] {
        self.0
    }
}

impl From<[u8; MacAddr::LENGTH]> for MacAddr {
    fn from(octets: [u8; MacAddr::LENGTH]) -> Self {
        MacAddr(octets)
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, octet) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{octet:02x}")?;
        }
        Ok(())
    }
}

// ===== unit tests =====
