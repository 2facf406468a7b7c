//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

#[derive(Debug)]
#[derive(Deserialize, Serialize)]
pub enum PolicyResult<T> {
    Accept(T),
    Reject,
}

// Default policy type.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultPolicyType {
    #[default]
    AcceptRoute,
    RejectRoute,
}

// Range of IP prefixes.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct IpPrefixRange {
    pub prefix: IpNetwork,
    pub masklen_lower: u8,
    pub masklen_upper: u8,
}

// Behavior of a match statement.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchSetRestrictedType {
    // Match is true if given value matches any member of the defined set.
    #[default]
    Any,
    // Match is true if given value does not match any member of the defined set.
    Invert,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BgpEqOperator {
    Equal,
    LessThanOrEqual,
    GreaterThanOrEqual,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BgpNexthop {
    Addr(IpAddr),
    NexthopSelf,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BgpSetMed {
    Add(u32),
    Subtract(u32),
    Set(u32),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BgpSetCommOptions {
    Add,
    Remove,
    Replace,
}

// ===== impl IpPrefixRange =====

impl IpPrefixRange {
    // Returns whether the given prefix falls within this range.
    pub fn matches(&self, prefix: &IpNetwork) -> bool {
        let plen = prefix.prefix();
        if plen < self.masklen_lower || plen > self.masklen_upper {
            return false;
        }
        match (self.prefix, prefix) {
            (IpNetwork::V4(range), IpNetwork::V4(prefix)) => {
                range.is_supernet_of(*prefix)
            }
            (IpNetwork::V6(range), IpNetwork::V6(prefix)) => {
                range.is_supernet_of(*prefix)
            }
            _ => false,
        }
    }
}

// ===== impl MatchSetRestrictedType =====

impl MatchSetRestrictedType {
    // Applies the match-set semantics to the raw "any member matched" result.
    pub fn apply(&self, any_matched: bool) -> bool {
        match self {
            MatchSetRestrictedType::Any => any_matched,
            MatchSetRestrictedType::Invert => !any_matched,
        }
    }
}

// ===== impl BgpEqOperator =====

impl BgpEqOperator {
    pub fn compare<T: Ord>(&self, value: T, reference: T) -> bool {
        match self {
            BgpEqOperator::Equal => value == reference,
            BgpEqOperator::LessThanOrEqual => value <= reference,
            BgpEqOperator::GreaterThanOrEqual => value >= reference,
        }
    }
}

// ===== impl BgpSetMed =====

impl BgpSetMed {
    pub fn apply(&self, med: Option<u32>) -> u32 {
        let med = med.unwrap_or(0);
        match *self {
            BgpSetMed::Add(value) => med.saturating_add(value),
            BgpSetMed::Subtract(value) => med.saturating_sub(value),
            BgpSetMed::Set(value) => value,
        }
    }
}
