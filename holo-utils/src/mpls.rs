//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use serde::{Deserialize, Serialize};

// 20-bit MPLS label value.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct Label(u32);

// Three-octet label field carried in labeled NLRI (RFC 8277) and EVPN routes.
//
//  0                   1                   2
//  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
// |                Label                  | TC  |S|
// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct LabelStackEntry(u32);

// ===== impl Label =====

impl Label {
    pub const MAX: u32 = 0x000F_FFFF;

    // Values above `Label::MAX` are truncated to 20 bits.
    pub fn new(value: u32) -> Label {
        Label(value & Self::MAX)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ===== impl LabelStackEntry =====

impl LabelStackEntry {
    const BOS_BIT: u32 = 0x01;
    const FIELD_MASK: u32 = 0x00FF_FFFF;
    // Compatibility value found in withdrawals (RFC 8277, Section 2.4).
    pub const WITHDRAWN: u32 = 0x80_0000;

    pub fn new(label: Label, bottom_of_stack: bool) -> LabelStackEntry {
        let bos = if bottom_of_stack { Self::BOS_BIT } else { 0 };
        LabelStackEntry((label.get() << 4) | bos)
    }

    pub fn from_raw(value: u32) -> LabelStackEntry {
        LabelStackEntry(value & Self::FIELD_MASK)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    pub fn label(&self) -> Label {
        Label::new(self.0 >> 4)
    }

    pub fn is_bottom_of_stack(&self) -> bool {
        self.0 & Self::BOS_BIT != 0
    }

    pub fn is_withdrawn(&self) -> bool {
        self.0 == Self::WITHDRAWN
    }
}

impl std::fmt::Display for LabelStackEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ===== unit tests =====
