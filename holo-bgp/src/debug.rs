//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;
use std::time::Duration;

use tracing::{debug, debug_span};

use crate::neighbor::{ConnId, fsm};
use crate::packet::consts::AfiSafi;
use crate::packet::error::{AttrError, TlvError};
use crate::packet::message::Message;
use crate::packet::nlri::Nlri;
use crate::peer_registry::{PeerUpResult, SessionRef};
use crate::rib::{Route, RouteIneligibleReason};

// BGP debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    InstanceStart,
    InstanceStop,
    NbrCreate(&'a IpAddr),
    NbrDelete(&'a IpAddr),
    NbrFsmEvent(&'a IpAddr, &'a fsm::Event),
    NbrFsmTransition(&'a IpAddr, &'a fsm::State, &'a fsm::State),
    SessionFsmEvent(&'a IpAddr, ConnId, &'a fsm::Event),
    SessionFsmTransition(&'a IpAddr, ConnId, &'a fsm::State, &'a fsm::State),
    NbrMsgRx(&'a IpAddr, &'a Message),
    NbrMsgTx(&'a IpAddr, &'a Message),
    NbrAttrError(u8, AttrError),
    NbrReconnectAttempt(&'a IpAddr, u32, &'a std::io::Error, Duration),
    NbrGrStaleMark(&'a IpAddr, AfiSafi),
    NbrGrStalePurge(&'a IpAddr, AfiSafi),
    RouteIneligible(&'a Nlri, &'a IpAddr, RouteIneligibleReason),
    BestPathFound(&'a Nlri, &'a Route),
    BestPathNotFound(&'a Nlri),
    NhtUpdate(IpAddr, Option<u32>),
    CodecUnknownType(&'static str, &'a dyn std::fmt::Debug),
    TlvDecodeError(u16, &'a TlvError),
    PeerRegistryDecision(&'a SessionRef, &'a PeerUpResult),
    UpdateAttrsTooLarge(AfiSafi, usize),
    NlriTooLarge(&'a Nlri, usize),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    //
    // Parent span(s): bgp-instance, plus the "neighbor" span added here for
    // neighbor-related messages.
    pub(crate) fn log(&self) {
        match self.nbr_addr() {
            Some(addr) => {
                debug_span!("neighbor", %addr).in_scope(|| self.log_fields())
            }
            None => self.log_fields(),
        }
    }

    fn log_fields(&self) {
        match self {
            Debug::InstanceStart
            | Debug::InstanceStop
            | Debug::NbrCreate(..)
            | Debug::NbrDelete(..) => debug!("{}", self),
            Debug::NbrFsmEvent(_, event) => {
                debug_span!("fsm").in_scope(|| debug!(?event, "{}", self))
            }
            Debug::NbrFsmTransition(_, old_state, new_state) => {
                debug_span!("fsm").in_scope(|| {
                    debug!(?old_state, ?new_state, "{}", self)
                })
            }
            Debug::SessionFsmEvent(_, conn_id, event) => {
                debug_span!("session", %conn_id)
                    .in_scope(|| debug!(?event, "{}", self))
            }
            Debug::SessionFsmTransition(_, conn_id, old_state, new_state) => {
                debug_span!("session", %conn_id).in_scope(|| {
                    debug!(?old_state, ?new_state, "{}", self)
                })
            }
            Debug::NbrMsgRx(_, msg) => {
                let data = serde_json::to_string(msg).unwrap_or_default();
                debug_span!("input").in_scope(|| debug!(%data, "{}", self))
            }
            Debug::NbrMsgTx(_, msg) => {
                let data = serde_json::to_string(msg).unwrap_or_default();
                debug_span!("output").in_scope(|| debug!(%data, "{}", self))
            }
            // Parent span(s): bgp-instance:neighbor:input
            Debug::NbrAttrError(attr_type, action) => {
                debug!(%attr_type, ?action, "{}", self)
            }
            Debug::NbrReconnectAttempt(_, attempt, error, sleep) => {
                debug!(%attempt, %error, ?sleep, "{}", self)
            }
            Debug::NbrGrStaleMark(_, afi_safi)
            | Debug::NbrGrStalePurge(_, afi_safi) => {
                debug!(%afi_safi, "{}", self)
            }
            Debug::RouteIneligible(nlri, _, reason) => {
                debug!(%nlri, ?reason, "{}", self)
            }
            Debug::BestPathFound(nlri, route) => {
                debug!(%nlri, origin = ?route.origin, "{}", self)
            }
            Debug::BestPathNotFound(nlri) => debug!(%nlri, "{}", self),
            Debug::NhtUpdate(addr, Some(metric)) => {
                debug!(%addr, %metric, "{}", self)
            }
            Debug::NhtUpdate(addr, None) => {
                debug!(%addr, metric = "unreachable", "{}", self)
            }
            Debug::CodecUnknownType(codec, key) => {
                debug!(%codec, ?key, "{}", self)
            }
            Debug::TlvDecodeError(tlv_type, error) => {
                debug!(%tlv_type, %error, "{}", self)
            }
            Debug::PeerRegistryDecision(session, result) => {
                debug!(conn_id = %session.conn_id, ?result, "{}", self)
            }
            Debug::UpdateAttrsTooLarge(afi_safi, routes) => {
                debug!(%afi_safi, %routes, "{}", self)
            }
            Debug::NlriTooLarge(nlri, length) => {
                debug!(%nlri, %length, "{}", self)
            }
        }
    }

    fn nbr_addr(&self) -> Option<IpAddr> {
        match self {
            Debug::NbrCreate(addr)
            | Debug::NbrDelete(addr)
            | Debug::NbrFsmEvent(addr, _)
            | Debug::NbrFsmTransition(addr, ..)
            | Debug::SessionFsmEvent(addr, ..)
            | Debug::SessionFsmTransition(addr, ..)
            | Debug::NbrMsgRx(addr, _)
            | Debug::NbrMsgTx(addr, _)
            | Debug::NbrReconnectAttempt(addr, ..)
            | Debug::NbrGrStaleMark(addr, _)
            | Debug::NbrGrStalePurge(addr, _)
            | Debug::RouteIneligible(_, addr, _) => Some(**addr),
            Debug::PeerRegistryDecision(session, _) => Some(session.nbr_addr),
            _ => None,
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Debug::InstanceStart => "starting instance",
            Debug::InstanceStop => "stopping instance",
            Debug::NbrCreate(..) => "neighbor created",
            Debug::NbrDelete(..) => "neighbor deleted",
            Debug::NbrFsmEvent(..) | Debug::SessionFsmEvent(..) => "event",
            Debug::NbrFsmTransition(..) | Debug::SessionFsmTransition(..) => {
                "state transition"
            }
            Debug::NbrMsgRx(..) | Debug::NbrMsgTx(..) => "message",
            Debug::NbrAttrError(..) => "malformed attribute",
            Debug::NbrReconnectAttempt(..) => "connection attempt failed",
            Debug::NbrGrStaleMark(..) => "retaining routes as stale",
            Debug::NbrGrStalePurge(..) => "purging stale routes",
            Debug::RouteIneligible(..) => "route ineligible",
            Debug::BestPathFound(..) => "best path found",
            Debug::BestPathNotFound(..) => "best path not found",
            Debug::NhtUpdate(..) => "nexthop tracking update",
            Debug::CodecUnknownType(..) => "no codec registered for type",
            Debug::TlvDecodeError(..) => "malformed TLV",
            Debug::PeerRegistryDecision(..) => "session arbitration",
            Debug::UpdateAttrsTooLarge(..) => {
                "attributes too large, withdrawing routes"
            }
            Debug::NlriTooLarge(..) => "NLRI too large, skipping",
        };
        f.write_str(msg)
    }
}
