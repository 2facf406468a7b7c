//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;
use std::net::IpAddr;

use derive_new::new;
use holo_utils::bgp::RouteType;
use holo_utils::policy::{
    BgpEqOperator, BgpNexthop, BgpSetCommOptions, BgpSetMed,
    DefaultPolicyType, IpPrefixRange, MatchSetRestrictedType, PolicyResult,
};
use serde::{Deserialize, Serialize};

use crate::packet::attribute::{Attrs, Comm, CommList};
use crate::packet::consts::Origin;
use crate::packet::nlri::Nlri;
use crate::rib::RouteOrigin;

// Routing policy: an ordered list of statements and the default action taken
// when none of them matches.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default)]
pub struct Policy {
    pub stmts: Vec<PolicyStmt>,
    pub default: DefaultPolicyType,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyStmt {
    pub name: String,
    pub conditions: Vec<PolicyCondition>,
    pub actions: Vec<PolicyAction>,
    pub result: Option<StmtResult>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StmtResult {
    Accept,
    Reject,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyCondition {
    MatchPrefixSet {
        ranges: Vec<IpPrefixRange>,
        #[serde(default)]
        match_type: MatchSetRestrictedType,
    },
    MatchNeighbor {
        value: BTreeSet<IpAddr>,
        #[serde(default)]
        match_type: MatchSetRestrictedType,
    },
    MatchCommSet {
        value: BTreeSet<Comm>,
        #[serde(default)]
        match_type: MatchSetRestrictedType,
    },
    AsPathLen {
        value: u32,
        op: BgpEqOperator,
    },
    AsPathContains(u32),
    Origin(Origin),
    LocalPref {
        value: u32,
        op: BgpEqOperator,
    },
    Med {
        value: u32,
        op: BgpEqOperator,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyAction {
    SetLocalPref(u32),
    SetMed(BgpSetMed),
    SetComm {
        options: BgpSetCommOptions,
        comms: BTreeSet<Comm>,
    },
    SetAsPathPrepend {
        asn: u32,
        repeat: Option<u8>,
    },
    SetNexthop(BgpNexthop),
    SetRouteOrigin(Origin),
}

// Represents a simplified version of `Route`, containing only information
// relevant for the application of routing policies.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(new)]
#[derive(Deserialize, Serialize)]
pub struct RoutePolicyInfo {
    pub origin: RouteOrigin,
    pub attrs: Attrs,
    pub route_type: RouteType,
}

// Session the policy is being applied for.
#[derive(Clone, Copy, Debug)]
pub struct PolicyCxt {
    pub nbr_addr: IpAddr,
    pub local_addr: IpAddr,
}

// ===== global functions =====

// Applies a routing policy to a single route.
//
// Routes are accepted unchanged when no policy is configured.
pub(crate) fn process_policy(
    policy: Option<&Policy>,
    cxt: &PolicyCxt,
    nlri: &Nlri,
    mut rpinfo: RoutePolicyInfo,
) -> PolicyResult<Attrs> {
    let Some(policy) = policy else {
        return PolicyResult::Accept(rpinfo.attrs);
    };

    let mut matches = false;
    for stmt in &policy.stmts {
        // Check if all conditions in the policy statement are satisfied.
        if !stmt.conditions.iter().all(|condition| {
            process_stmt_condition(cxt, nlri, &rpinfo, condition)
        }) {
            continue;
        }

        matches = true;

        // Process actions defined in the policy statement.
        for action in &stmt.actions {
            process_stmt_action(cxt, &mut rpinfo, action);
        }

        // "policy-result"
        match stmt.result {
            Some(StmtResult::Accept) => {
                return PolicyResult::Accept(rpinfo.attrs);
            }
            Some(StmtResult::Reject) => {
                return PolicyResult::Reject;
            }
            None => {
                // Move to the next statement.
            }
        }
    }

    // Check default policy if no statement in the policy was satisfied.
    if !matches && policy.default == DefaultPolicyType::RejectRoute {
        return PolicyResult::Reject;
    }

    PolicyResult::Accept(rpinfo.attrs)
}

// ===== helper functions =====

// Processes a single condition statement within a routing policy.
//
// Returns a boolean value indicating whether the condition is met.
fn process_stmt_condition(
    cxt: &PolicyCxt,
    nlri: &Nlri,
    rpinfo: &RoutePolicyInfo,
    condition: &PolicyCondition,
) -> bool {
    let attrs = &rpinfo.attrs;
    match condition {
        // "match-prefix-set"
        PolicyCondition::MatchPrefixSet { ranges, match_type } => {
            // Routes without an IP prefix never match a prefix set.
            let Some(prefix) = nlri.prefix() else {
                return false;
            };
            let any = ranges.iter().any(|range| range.matches(&prefix));
            match_type.apply(any)
        }
        // "match-neighbor"
        PolicyCondition::MatchNeighbor { value, match_type } => {
            match_type.apply(value.contains(&cxt.nbr_addr))
        }
        // "match-community-set"
        PolicyCondition::MatchCommSet { value, match_type } => {
            let any = attrs
                .comm
                .as_ref()
                .is_some_and(|comm| comm.0.iter().any(|c| value.contains(c)));
            match_type.apply(any)
        }
        // "as-path-length"
        PolicyCondition::AsPathLen { value, op } => {
            op.compare(attrs.base.as_path.path_length(), *value)
        }
        // "as-path-contains"
        PolicyCondition::AsPathContains(asn) => {
            attrs.base.as_path.contains(*asn)
        }
        // "origin-eq"
        PolicyCondition::Origin(origin) => attrs.base.origin == *origin,
        // "local-pref"
        PolicyCondition::LocalPref { value, op } => match attrs.base.local_pref
        {
            Some(local_pref) => op.compare(local_pref, *value),
            None => false,
        },
        // "med"
        PolicyCondition::Med { value, op } => match attrs.base.med {
            Some(med) => op.compare(med, *value),
            None => false,
        },
    }
}

// Processes a single action statement within a routing policy.
fn process_stmt_action(
    cxt: &PolicyCxt,
    rpinfo: &mut RoutePolicyInfo,
    action: &PolicyAction,
) {
    let attrs = &mut rpinfo.attrs;
    match action {
        // "set-local-pref"
        PolicyAction::SetLocalPref(local_pref) => {
            attrs.base.local_pref = Some(*local_pref);
        }
        // "set-med"
        PolicyAction::SetMed(set_med) => {
            attrs.base.med = Some(set_med.apply(attrs.base.med));
        }
        // "set-community"
        PolicyAction::SetComm { options, comms } => {
            action_set_comm(options, comms, &mut attrs.comm);
        }
        // "set-as-path-prepend"
        PolicyAction::SetAsPathPrepend { asn, repeat } => {
            for _ in 0..repeat.unwrap_or(1) {
                attrs.base.as_path.prepend(*asn);
            }
        }
        // "set-next-hop"
        PolicyAction::SetNexthop(set_nexthop) => {
            attrs.base.nexthop = match set_nexthop {
                BgpNexthop::Addr(addr) => Some(*addr),
                BgpNexthop::NexthopSelf => Some(cxt.local_addr),
            };
            attrs.base.ll_nexthop = None;
        }
        // "set-route-origin"
        PolicyAction::SetRouteOrigin(origin) => {
            attrs.base.origin = *origin;
        }
    }
}

// Modifies the list of communities based on the specified options.
fn action_set_comm(
    options: &BgpSetCommOptions,
    comms: &BTreeSet<Comm>,
    comm_list: &mut Option<CommList<Comm>>,
) {
    // Add, remove or replace communities.
    match options {
        BgpSetCommOptions::Add => {
            if let Some(comm_list) = comm_list {
                comm_list.0.extend(comms.iter().copied());
            } else {
                *comm_list = Some(CommList(comms.clone()));
            }
        }
        BgpSetCommOptions::Remove => {
            if let Some(comm_list) = comm_list {
                comm_list.0.retain(|c| !comms.contains(c))
            }
        }
        BgpSetCommOptions::Replace => {
            *comm_list = Some(CommList(comms.clone()));
        }
    }

    // Remove the community list if it exists and is empty.
    if let Some(list) = comm_list.as_ref()
        && list.0.is_empty()
    {
        *comm_list = None;
    }
}

// ===== unit tests =====
