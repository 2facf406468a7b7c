//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use holo_utils::bgp::RouteType;
use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::neighbor::PeerType;
use crate::packet::attribute::{Attrs, BaseAttrs};
use crate::packet::consts::AfiSafi;
use crate::packet::nlri::Nlri;
use crate::policy::RoutePolicyInfo;

// Default values.
pub const DFLT_LOCAL_PREF: u32 = 100;

// Consumer of Loc-RIB changes.
//
// Invoked by the instance after every best-path change, in the order the
// changes happen.
pub trait RibSink: Send + Sync {
    fn put_routes(&self, table: AfiSafi, destination: &Nlri, attrs: &Attrs);

    fn delete_routes(&self, table: AfiSafi, destination: &Nlri);
}

#[derive(Debug, Default)]
pub struct Rib {
    pub attr_sets: AttrSets<Attrs>,
    pub tables: BTreeMap<AfiSafi, RoutingTable>,
    // IGP metrics of the known next hops.
    pub nht: BTreeMap<IpAddr, u32>,
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    pub destinations: BTreeMap<Nlri, Destination>,
    pub queued: BTreeSet<Nlri>,
}

// Adj-RIB-In key: the peer address and the ADD-PATH path identifier.
//
// Ordering on this key is the canonical iteration order of the best-path
// selection.
pub type AdjRibKey = (IpAddr, Option<u32>);

#[derive(Debug, Default)]
pub struct Destination {
    pub local: Option<Box<LocalRoute>>,
    pub adj_in: BTreeMap<AdjRibKey, AdjRibIn>,
    // Attributes last advertised to each peer.
    pub adj_out: BTreeMap<IpAddr, RouteAttrs>,
}

#[derive(Clone, Debug, Default)]
pub struct AdjRibIn {
    pub pre: Option<Box<Route>>,
    pub post: Option<Box<Route>>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LocalRoute {
    pub origin: RouteOrigin,
    pub attrs: RouteAttrs,
    pub route_type: RouteType,
    pub path_id: Option<u32>,
    pub last_modified: DateTime<Utc>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Route {
    pub origin: RouteOrigin,
    pub attrs: RouteAttrs,
    pub route_type: RouteType,
    pub path_id: Option<u32>,
    pub last_modified: DateTime<Utc>,
    pub ineligible_reason: Option<RouteIneligibleReason>,
    pub reject_reason: Option<RouteRejectReason>,
    pub stale: bool,
}

// Peer a route was learned from.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct RouteOrigin {
    pub identifier: Ipv4Addr,
    pub remote_addr: IpAddr,
}

pub type RouteAttrs = Arc<AttrSet<Attrs>>;

// Interned attribute sets.
#[derive(Debug, Eq, PartialEq)]
pub struct AttrSets<T> {
    pub tree: BTreeMap<T, Arc<AttrSet<T>>>,
    next_index: u64,
}

#[derive(Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct AttrSet<T> {
    pub index: u64,
    pub value: T,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum RouteIneligibleReason {
    ClusterLoop,
    AsLoop,
    Originator,
    Confed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum RouteRejectReason {
    LocalPrefLower,
    AsPathLonger,
    OriginTypeHigher,
    MedHigher,
    PreferExternal,
    NexthopCostHigher,
    HigherRouterId,
    HigherPeerAddress,
    HigherPathId,
    RejectedImportPolicy,
}

// Parameters of the best-path selection.
#[derive(Debug)]
pub struct SelectionCxt<'a> {
    pub always_compare_med: bool,
    pub nht: &'a BTreeMap<IpAddr, u32>,
}

// Local identity used to detect routing loops.
#[derive(Clone, Copy, Debug)]
pub struct EligibilityCxt {
    pub asn: u32,
    pub identifier: Ipv4Addr,
    pub cluster_id: Option<Ipv4Addr>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RouteCompare {
    Preferred(RouteRejectReason),
    LessPreferred(RouteRejectReason),
}

// ===== impl Rib =====

impl Rib {
    pub(crate) fn table(&mut self, afi_safi: AfiSafi) -> &mut RoutingTable {
        self.tables.entry(afi_safi).or_default()
    }

    // Records the IGP metric to reach the given next hop, and schedules all
    // destinations whose candidates use it for re-evaluation.
    pub(crate) fn nexthop_update(&mut self, addr: IpAddr, metric: Option<u32>) {
        Debug::NhtUpdate(addr, metric).log();

        match metric {
            Some(metric) => {
                if self.nht.insert(addr, metric) == Some(metric) {
                    return;
                }
            }
            None => {
                if self.nht.remove(&addr).is_none() {
                    return;
                }
            }
        }

        for table in self.tables.values_mut() {
            let affected = table
                .destinations
                .iter()
                .filter(|(_, dest)| {
                    dest.adj_in
                        .values()
                        .filter_map(|adj_rib| adj_rib.post.as_ref())
                        .any(|route| route.nexthop() == Some(addr))
                })
                .map(|(nlri, _)| nlri.clone())
                .collect::<Vec<_>>();
            table.queued.extend(affected);
        }
    }

    // Releases attribute sets that are no longer referenced by any route.
    pub(crate) fn attr_sets_gc(&mut self) {
        self.attr_sets.gc();
    }
}

// ===== impl RoutingTable =====

impl RoutingTable {
    // Inserts or replaces a route in the Adj-RIB-In of the given peer and
    // schedules the destination for best-path selection.
    pub(crate) fn update_route(
        &mut self,
        nlri: Nlri,
        key: AdjRibKey,
        pre: Box<Route>,
        post: Option<Box<Route>>,
    ) {
        let dest = self.destinations.entry(nlri.clone()).or_default();
        let adj_rib = dest.adj_in.entry(key).or_default();
        adj_rib.pre = Some(pre);
        adj_rib.post = post;
        self.queued.insert(nlri);
    }

    // Removes a route from the Adj-RIB-In of the given peer.
    //
    // Returns whether a route was actually removed.
    pub(crate) fn withdraw_route(
        &mut self,
        nlri: &Nlri,
        key: &AdjRibKey,
    ) -> bool {
        let Some(dest) = self.destinations.get_mut(nlri) else {
            return false;
        };
        if dest.adj_in.remove(key).is_none() {
            return false;
        }
        self.queued.insert(nlri.clone());
        true
    }

    // Removes all routes learned from the given peer.
    //
    // When `stale_only` is set, only routes retained across a graceful
    // restart are removed.
    pub(crate) fn withdraw_peer(&mut self, peer: IpAddr, stale_only: bool) {
        for (nlri, dest) in self.destinations.iter_mut() {
            let before = dest.adj_in.len();
            dest.adj_in.retain(|(addr, _), adj_rib| {
                let stale =
                    adj_rib.pre.as_ref().is_some_and(|route| route.stale);
                *addr != peer || (stale_only && !stale)
            });
            if !stale_only {
                dest.adj_out.remove(&peer);
            }
            if dest.adj_in.len() != before {
                self.queued.insert(nlri.clone());
            }
        }
    }

    // Marks all routes learned from the given peer as stale.
    //
    // The peer's Adj-RIB-Out is cleared since the session it described is
    // gone.
    pub(crate) fn mark_stale(&mut self, peer: IpAddr) {
        for dest in self.destinations.values_mut() {
            dest.adj_out.remove(&peer);
            for adj_rib in dest
                .adj_in
                .range_mut((peer, None)..=(peer, Some(u32::MAX)))
                .map(|(_, adj_rib)| adj_rib)
            {
                for route in
                    adj_rib.pre.iter_mut().chain(adj_rib.post.iter_mut())
                {
                    route.stale = true;
                }
            }
        }
    }

    // Drops destinations that no longer hold any state.
    pub(crate) fn prune(&mut self, nlri: &Nlri) {
        if let Some(dest) = self.destinations.get(nlri)
            && dest.local.is_none()
            && dest.adj_in.is_empty()
            && dest.adj_out.is_empty()
        {
            self.destinations.remove(nlri);
        }
    }
}

// ===== impl Route =====

impl Route {
    pub(crate) fn new(
        origin: RouteOrigin,
        attrs: RouteAttrs,
        route_type: RouteType,
        path_id: Option<u32>,
    ) -> Route {
        Route {
            origin,
            attrs,
            route_type,
            path_id,
            last_modified: Utc::now(),
            ineligible_reason: None,
            reject_reason: None,
            stale: false,
        }
    }

    pub(crate) fn policy_info(&self) -> RoutePolicyInfo {
        RoutePolicyInfo {
            origin: self.origin,
            attrs: self.attrs.value.clone(),
            route_type: self.route_type,
        }
    }

    pub(crate) fn is_eligible(&self) -> bool {
        self.ineligible_reason.is_none()
    }

    pub(crate) fn nexthop(&self) -> Option<IpAddr> {
        self.attrs.value.base.nexthop
    }

    fn igp_cost(&self, nht: &BTreeMap<IpAddr, u32>) -> u32 {
        self.nexthop()
            .and_then(|nexthop| nht.get(&nexthop).copied())
            .unwrap_or(u32::MAX)
    }

    fn compare(&self, other: &Route, cxt: &SelectionCxt<'_>) -> RouteCompare {
        let a = &self.attrs.value.base;
        let b = &other.attrs.value.base;
        let local_pref = |attrs: &BaseAttrs| {
            attrs.local_pref.unwrap_or(DFLT_LOCAL_PREF)
        };
        let med_cmp = if cxt.always_compare_med
            || a.as_path.first() == b.as_path.first()
        {
            a.med.unwrap_or(0).cmp(&b.med.unwrap_or(0))
        } else {
            Ordering::Equal
        };

        // Tie-breakers in order of precedence. `Ordering::Less` means that
        // `self` is the better candidate. Unresolved next hops have infinite
        // IGP cost.
        let tie_breakers = [
            (
                local_pref(b).cmp(&local_pref(a)),
                RouteRejectReason::LocalPrefLower,
            ),
            (
                a.as_path.path_length().cmp(&b.as_path.path_length()),
                RouteRejectReason::AsPathLonger,
            ),
            (a.origin.cmp(&b.origin), RouteRejectReason::OriginTypeHigher),
            (med_cmp, RouteRejectReason::MedHigher),
            (
                other.route_type.cmp(&self.route_type),
                RouteRejectReason::PreferExternal,
            ),
            (
                self.igp_cost(cxt.nht).cmp(&other.igp_cost(cxt.nht)),
                RouteRejectReason::NexthopCostHigher,
            ),
            (
                self.origin.identifier.cmp(&other.origin.identifier),
                RouteRejectReason::HigherRouterId,
            ),
            (
                self.origin.remote_addr.cmp(&other.origin.remote_addr),
                RouteRejectReason::HigherPeerAddress,
            ),
            (
                self.path_id.cmp(&other.path_id),
                RouteRejectReason::HigherPathId,
            ),
        ];

        // Two candidates can't share both the peer address and the path
        // identifier, so a full tie never happens in practice.
        match tie_breakers.into_iter().find(|(order, _)| order.is_ne()) {
            Some((Ordering::Less, reason)) => RouteCompare::Preferred(reason),
            Some((_, reason)) => RouteCompare::LessPreferred(reason),
            None => {
                RouteCompare::LessPreferred(RouteRejectReason::HigherPathId)
            }
        }
    }
}

// ===== impl AttrSets =====

impl<T> AttrSets<T>
where
    T: Clone + Eq + Ord + PartialEq + PartialOrd,
{
    pub(crate) fn get(&mut self, attr: &T) -> Arc<AttrSet<T>> {
        if let Some(attr_set) = self.tree.get(attr) {
            Arc::clone(attr_set)
        } else {
            self.next_index += 1;
            let attr_set = Arc::new(AttrSet {
                index: self.next_index,
                value: attr.clone(),
            });
            self.tree.insert(attr.clone(), Arc::clone(&attr_set));
            attr_set
        }
    }

    fn gc(&mut self) {
        self.tree.retain(|_, attr_set| Arc::strong_count(attr_set) > 1);
    }
}

impl<T> Default for AttrSets<T> {
    fn default() -> AttrSets<T> {
        AttrSets {
            tree: Default::default(),
            next_index: 0,
        }
    }
}

// ===== global functions =====

// Checks whether a received route is usable, detecting routing loops.
pub(crate) fn route_eligibility(
    attrs: &Attrs,
    cxt: &EligibilityCxt,
) -> Option<RouteIneligibleReason> {
    let base = &attrs.base;
    if base.originator_id == Some(cxt.identifier) {
        return Some(RouteIneligibleReason::Originator);
    }
    if let Some(cluster_id) = cxt.cluster_id
        && let Some(cluster_list) = &base.cluster_list
        && cluster_list.contains(cluster_id)
    {
        return Some(RouteIneligibleReason::ClusterLoop);
    }
    if base.as_path.confed_contains(cxt.asn) {
        return Some(RouteIneligibleReason::Confed);
    }
    if base.as_path.contains(cxt.asn) {
        return Some(RouteIneligibleReason::AsLoop);
    }
    None
}

// Updates the attributes of a route before its transmission to a neighbor.
pub(crate) fn attrs_tx_update(
    attrs: &mut Attrs,
    peer_type: PeerType,
    local_asn: u32,
    local_addr: IpAddr,
) {
    match peer_type {
        PeerType::Internal => {
            // Set the default local preference if it's not already set.
            if attrs.base.local_pref.is_none() {
                attrs.base.local_pref = Some(DFLT_LOCAL_PREF);
            }
        }
        PeerType::External => {
            // Prepend local AS number.
            attrs.base.as_path.prepend(local_asn);

            // Set next-hop to self.
            attrs.base.nexthop = Some(local_addr);
            attrs.base.ll_nexthop = None;

            // Attributes that don't cross AS boundaries.
            attrs.base.local_pref = None;
            attrs.base.originator_id = None;
            attrs.base.cluster_list = None;
        }
    }
}

pub(crate) fn best_path(
    dest: &mut Destination,
    cxt: &SelectionCxt<'_>,
) -> Option<Box<Route>> {
    let mut best_route: Option<&mut Box<Route>> = None;

    // Iterate over each post-policy Adj-RIB-In route for the destination, in
    // canonical (peer address, path ID) order.
    for adj_in_route in dest
        .adj_in
        .values_mut()
        .filter_map(|adj_rib| adj_rib.post.as_mut())
    {
        adj_in_route.reject_reason = None;

        // Skip routes that failed the loop checks on reception.
        if !adj_in_route.is_eligible() {
            continue;
        }

        // Compare the current route with the best route found so far.
        match &mut best_route {
            None => {
                // Initialize the best route with the first eligible route.
                best_route = Some(adj_in_route)
            }
            Some(best_route) => {
                // Update the best route if the current route is preferred.
                match adj_in_route.compare(best_route, cxt) {
                    RouteCompare::Preferred(reason) => {
                        best_route.reject_reason = Some(reason);
                        *best_route = adj_in_route;
                    }
                    RouteCompare::LessPreferred(reason) => {
                        adj_in_route.reject_reason = Some(reason);
                    }
                }
            }
        }
    }

    // Return a cloned copy of the best route found, if any.
    best_route.cloned()
}

// Updates the Loc-RIB entry of a destination and notifies the RIB sink.
//
// Returns whether the Loc-RIB changed.
pub(crate) fn loc_rib_update(
    afi_safi: AfiSafi,
    nlri: &Nlri,
    dest: &mut Destination,
    best_route: Option<Box<Route>>,
    sink: &dyn RibSink,
) -> bool {
    if let Some(best_route) = best_route {
        Debug::BestPathFound(nlri, &best_route).log();

        // Return early if no change in Loc-RIB is needed.
        if let Some(local_route) = &dest.local
            && local_route.origin == best_route.origin
            && local_route.attrs == best_route.attrs
            && local_route.route_type == best_route.route_type
            && local_route.path_id == best_route.path_id
        {
            return false;
        }

        // Create new local route.
        let local_route = LocalRoute {
            origin: best_route.origin,
            attrs: best_route.attrs,
            route_type: best_route.route_type,
            path_id: best_route.path_id,
            last_modified: best_route.last_modified,
        };

        // Hand the new best path over to the sink.
        sink.put_routes(afi_safi, nlri, &local_route.attrs.value);

        // Insert local route into the Loc-RIB.
        dest.local = Some(Box::new(local_route));
    } else {
        Debug::BestPathNotFound(nlri).log();

        // Return early if no change in Loc-RIB is needed.
        if dest.local.is_none() {
            return false;
        }

        sink.delete_routes(afi_safi, nlri);

        // Remove route from the Loc-RIB.
        dest.local = None;
    }

    true
}

// ===== unit tests =====
