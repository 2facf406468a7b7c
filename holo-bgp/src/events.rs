//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv6Addr};

use chrono::Utc;
use holo_utils::bgp::RouteType;
use holo_utils::policy::PolicyResult;

use crate::af;
use crate::config::{InstanceCfg, PolicyCfg};
use crate::debug::Debug;
use crate::error::{Error, NbrRxError};
use crate::instance::InstanceUpView;
use crate::neighbor::{Direction, Neighbor, Neighbors, PeerType, Session, fsm};
use crate::network::Connection;
use crate::packet::attribute::Attrs;
use crate::packet::consts::AfiSafi;
use crate::packet::message::{Message, UpdateMsg};
use crate::packet::nlri::{Nlri, NlriEntry};
use crate::policy::{self, PolicyCxt, RoutePolicyInfo};
use crate::rib::{
    self, AttrSets, Destination, EligibilityCxt, Rib, Route, RouteOrigin,
    RouteRejectReason, SelectionCxt,
};
use crate::tasks::messages::input::{NbrRxMsg, NbrTimerMsg, TcpConnectMsg};

// ===== TCP connection request =====

pub(crate) fn process_tcp_accept(
    instance: &mut InstanceUpView<'_>,
    neighbors: &mut Neighbors,
    conn: Connection,
) {
    // Lookup neighbor. Connections from unknown addresses are dropped.
    let Some(nbr) = neighbors.get_mut(&conn.conn_info.remote_addr) else {
        return;
    };

    // Invoke FSM event.
    nbr.fsm_event(instance, fsm::Event::Connected(conn, Direction::Inbound));
}

// ===== TCP connection established =====

pub(crate) fn process_tcp_connect(
    instance: &mut InstanceUpView<'_>,
    neighbors: &mut Neighbors,
    msg: TcpConnectMsg,
) {
    // Lookup neighbor.
    let Some(nbr) = neighbors.get_mut(&msg.nbr_addr) else {
        return;
    };

    // Ignore results of canceled connection attempts.
    if nbr.tasks.connect.is_none() {
        return;
    }

    match msg.result {
        Ok(conn) => {
            let event = fsm::Event::Connected(conn, Direction::Outbound);
            nbr.fsm_event(instance, event);
        }
        Err(error) => {
            Error::NbrReconnect(nbr.remote_addr, error).log();
            nbr.fsm_event(instance, fsm::Event::ConnFail);
        }
    }
}

// ===== neighbor message receipt =====

pub(crate) fn process_nbr_msg(
    instance: &mut InstanceUpView<'_>,
    neighbors: &mut Neighbors,
    msg: NbrRxMsg,
) {
    // Lookup neighbor and session.
    let Some(nbr) = neighbors.get_mut(&msg.nbr_addr) else {
        return;
    };
    if !nbr.sessions.contains_key(&msg.conn_id) {
        return;
    }

    // Process received message.
    let event = match msg.msg {
        Ok(msg) => {
            Debug::NbrMsgRx(&nbr.remote_addr, &msg).log();

            // Update statistics.
            nbr.statistics.msgs_rcvd.update(&msg);

            match msg {
                Message::Open(msg) => fsm::Event::RcvdOpen(msg),
                Message::Update(msg) => fsm::Event::RcvdUpdate(msg),
                Message::Notification(msg) => {
                    // Keep track of the last received notification.
                    nbr.notification_rcvd = Some((Utc::now(), msg.clone()));
                    fsm::Event::RcvdNotif(msg)
                }
                Message::Keepalive(_) => fsm::Event::RcvdKalive,
                Message::RouteRefresh(msg) => fsm::Event::RcvdRouteRefresh(msg),
            }
        }
        Err(error) => {
            let event = match &error {
                NbrRxError::TcpConnClosed => fsm::Event::ConnClosed,
                NbrRxError::MsgDecodeError(error) => {
                    fsm::Event::RcvdError(error.clone())
                }
            };
            Error::NbrRxError(nbr.remote_addr, error).log();
            event
        }
    };

    // Invoke FSM event.
    nbr.session_fsm_event(instance, msg.conn_id, event);
}

// Applies the contents of an UPDATE message to the Adj-RIB-In of the
// neighbor.
pub(crate) fn process_update(
    instance: &mut InstanceUpView<'_>,
    nbr: &mut Neighbor,
    session: &Session,
    msg: UpdateMsg,
) {
    // End-of-RIB marker.
    if let Some(afi_safi) = msg.eor() {
        nbr.gr_stale_purge(instance, afi_safi);
        return;
    }

    let UpdateMsg {
        reach,
        unreach,
        mp_reach,
        mp_unreach,
        attrs,
    } = msg;

    // Process IPv4 unreachable NLRIs.
    if let Some(unreach) = unreach {
        let afi_safi = AfiSafi::Ipv4Unicast;
        process_unreach(instance, nbr, session, afi_safi, unreach.nlri);
    }

    // Process multiprotocol unreachable NLRIs.
    if let Some(mp_unreach) = mp_unreach {
        let afi_safi = mp_unreach.afi_safi;
        process_unreach(instance, nbr, session, afi_safi, mp_unreach.nlri);
    }

    // Process IPv4 reachable NLRIs.
    //
    // Use nexthop from the NEXTHOP attribute.
    if let Some(reach) = reach {
        let nexthop = (Some(reach.nexthop.into()), None);
        process_reach(
            instance,
            nbr,
            session,
            AfiSafi::Ipv4Unicast,
            reach.nlri,
            attrs.clone(),
            nexthop,
        );
    }

    // Process multiprotocol reachable NLRIs.
    //
    // Use nexthop(s) from the MP_REACH_NLRI attribute.
    if let Some(mp_reach) = mp_reach {
        let support = af::rib_support(mp_reach.afi_safi);
        let nexthop = (
            support.nexthop_rx(&mp_reach.nexthop),
            mp_reach.nexthop.link_local(),
        );
        process_reach(
            instance,
            nbr,
            session,
            mp_reach.afi_safi,
            mp_reach.nlri,
            attrs,
            nexthop,
        );
    }
}

fn process_reach(
    instance: &mut InstanceUpView<'_>,
    nbr: &mut Neighbor,
    session: &Session,
    afi_safi: AfiSafi,
    nlri: Vec<NlriEntry>,
    attrs: Option<Attrs>,
    (nexthop, ll_nexthop): (Option<IpAddr>, Option<Ipv6Addr>),
) {
    // Check if the address-family is enabled for this session.
    if !session.is_afi_safi_enabled(afi_safi) {
        return;
    }
    let Some(identifier) = session.identifier else {
        return;
    };

    // Attribute errors and missing next hops lead to the routes being treated
    // as withdrawn (RFC 7606).
    let support = af::rib_support(afi_safi);
    let mut attrs = match attrs {
        Some(attrs) if nexthop.is_some() || !support.nexthop_required() => {
            attrs
        }
        _ => {
            nbr.statistics.erroneous_updates_withdrawn += 1;
            process_unreach(instance, nbr, session, afi_safi, nlri);
            return;
        }
    };
    attrs.base.nexthop = nexthop;
    attrs.base.ll_nexthop = ll_nexthop;

    // Initialize route origin and type.
    let origin = RouteOrigin {
        identifier,
        remote_addr: nbr.remote_addr,
    };
    let route_type = match nbr.peer_type {
        PeerType::Internal => RouteType::Internal,
        PeerType::External => RouteType::External,
    };

    // Check the routes for loops.
    let cxt = EligibilityCxt {
        asn: instance.config.asn,
        identifier: instance.state.identifier,
        cluster_id: instance.config.cluster_id(),
    };
    let ineligible_reason = rib::route_eligibility(&attrs, &cxt);

    // Get import policy.
    let policy = nbr
        .config
        .import_policy
        .as_ref()
        .and_then(|name| instance.policies.policies.get(name));
    let policy_cxt = PolicyCxt {
        nbr_addr: nbr.remote_addr,
        local_addr: session.conn_info.local_addr,
    };

    let rib = &mut instance.state.rib;
    let table = rib.tables.entry(afi_safi).or_default();
    let route_attrs = rib.attr_sets.get(&attrs);
    for entry in nlri {
        if !entry.nlri.is_routable() {
            continue;
        }

        // Update pre-policy Adj-RIB-In route.
        let key = (nbr.remote_addr, entry.path_id);
        let mut route =
            Route::new(origin, route_attrs.clone(), route_type, entry.path_id);
        if let Some(reason) = ineligible_reason {
            Debug::RouteIneligible(&entry.nlri, &nbr.remote_addr, reason).log();
            nbr.route_invalidated(reason);
            route.ineligible_reason = Some(reason);
            let post = route.clone();
            table.update_route(
                entry.nlri,
                key,
                Box::new(route),
                Some(Box::new(post)),
            );
            continue;
        }

        // Apply import policy.
        let rpinfo = route.policy_info();
        let post = match policy::process_policy(
            policy,
            &policy_cxt,
            &entry.nlri,
            rpinfo,
        ) {
            PolicyResult::Accept(attrs) => {
                let mut post = route.clone();
                post.attrs = rib.attr_sets.get(&attrs);
                Some(Box::new(post))
            }
            PolicyResult::Reject => {
                nbr.statistics.rejected_prefixes += 1;
                route.reject_reason =
                    Some(RouteRejectReason::RejectedImportPolicy);
                None
            }
        };

        // Update post-policy Adj-RIB-In route.
        table.update_route(entry.nlri, key, Box::new(route), post);
    }
}

fn process_unreach(
    instance: &mut InstanceUpView<'_>,
    nbr: &Neighbor,
    session: &Session,
    afi_safi: AfiSafi,
    nlri: Vec<NlriEntry>,
) {
    // Check if the address-family is enabled for this session.
    if !session.is_afi_safi_enabled(afi_safi) {
        return;
    }

    // Remove routes from Adj-RIB-In.
    let table = instance.state.rib.table(afi_safi);
    for entry in nlri {
        let key = (nbr.remote_addr, entry.path_id);
        table.withdraw_route(&entry.nlri, &key);
    }
}

// ===== neighbor expired timeout =====

pub(crate) fn process_nbr_timer(
    instance: &mut InstanceUpView<'_>,
    neighbors: &mut Neighbors,
    msg: NbrTimerMsg,
) {
    // Lookup neighbor.
    let Some(nbr) = neighbors.get_mut(&msg.nbr_addr) else {
        return;
    };

    // Invoke FSM event.
    let event = fsm::Event::Timer(msg.timer);
    match msg.conn_id {
        Some(conn_id) => nbr.session_fsm_event(instance, conn_id, event),
        None => nbr.fsm_event(instance, event),
    }
}

// ===== nexthop tracking update =====

pub(crate) fn process_nht_update(
    instance: &mut InstanceUpView<'_>,
    addr: IpAddr,
    metric: Option<u32>,
) {
    instance.state.rib.nexthop_update(addr, metric);
}

// ===== BGP decision process =====

// Runs best-path selection on every queued destination, then propagates the
// Loc-RIB changes to the RIB sink and to the established neighbors.
pub(crate) fn decision_process(
    instance: &mut InstanceUpView<'_>,
    neighbors: &mut Neighbors,
) {
    let Rib {
        attr_sets,
        tables,
        nht,
    } = &mut instance.state.rib;
    let selection_cxt = SelectionCxt {
        always_compare_med: instance.config.always_compare_med,
        nht: &*nht,
    };

    for (afi_safi, table) in tables.iter_mut() {
        let queued = std::mem::take(&mut table.queued);
        for nlri in queued {
            let Some(dest) = table.destinations.get_mut(&nlri) else {
                continue;
            };

            // Perform best-path selection for the destination.
            let best_route = rib::best_path(dest, &selection_cxt);

            // Update the Loc-RIB with the best path.
            let changed = rib::loc_rib_update(
                *afi_safi,
                &nlri,
                dest,
                best_route,
                instance.shared.sink.as_ref(),
            );

            // Route dissemination.
            if changed {
                for nbr in neighbors.values_mut() {
                    let Some(local_addr) = nbr
                        .established_session()
                        .filter(|session| {
                            session.is_afi_safi_enabled(*afi_safi)
                        })
                        .map(|session| session.conn_info.local_addr)
                    else {
                        continue;
                    };
                    export_route(
                        instance.config,
                        instance.policies,
                        attr_sets,
                        nbr,
                        local_addr,
                        *afi_safi,
                        &nlri,
                        dest,
                    );
                }
            }

            // Remove routing table entries that no longer hold any data.
            table.prune(&nlri);
        }
    }
    instance.state.rib.attr_sets_gc();

    // Send UPDATE message(s) to the neighbors.
    for nbr in neighbors.values_mut() {
        nbr.flush_updates(&instance.shared.codecs);
    }
}

// Computes the route that should be advertised to the neighbor for the given
// destination, and queues an update if it differs from the last advertised
// one.
pub(crate) fn export_route(
    config: &InstanceCfg,
    policies: &PolicyCfg,
    attr_sets: &mut AttrSets<Attrs>,
    nbr: &mut Neighbor,
    local_addr: IpAddr,
    afi_safi: AfiSafi,
    nlri: &Nlri,
    dest: &mut Destination,
) {
    let attrs = dest
        .local
        .as_ref()
        .filter(|route| nbr.distribute_filter(route))
        .and_then(|route| {
            // Apply export policy.
            let policy = nbr
                .config
                .export_policy
                .as_ref()
                .and_then(|name| policies.policies.get(name));
            let cxt = PolicyCxt {
                nbr_addr: nbr.remote_addr,
                local_addr,
            };
            let rpinfo = RoutePolicyInfo::new(
                route.origin,
                route.attrs.value.clone(),
                route.route_type,
            );
            match policy::process_policy(policy, &cxt, nlri, rpinfo) {
                PolicyResult::Accept(mut attrs) => {
                    // Update route's attributes before transmission.
                    rib::attrs_tx_update(
                        &mut attrs,
                        nbr.peer_type,
                        config.asn,
                        local_addr,
                    );
                    Some(attrs)
                }
                PolicyResult::Reject => None,
            }
        });

    // Update Adj-RIB-Out and the neighbor's Tx queue.
    let update_queue = nbr.update_queues.entry(afi_safi).or_default();
    match attrs {
        Some(attrs) => {
            if dest
                .adj_out
                .get(&nbr.remote_addr)
                .is_some_and(|adj_out| adj_out.value == attrs)
            {
                return;
            }
            dest.adj_out.insert(nbr.remote_addr, attr_sets.get(&attrs));
            update_queue.advertise(nlri.clone(), attrs);
        }
        None => {
            if dest.adj_out.remove(&nbr.remote_addr).is_some() {
                update_queue.withdraw(nlri.clone());
            }
        }
    }
}
