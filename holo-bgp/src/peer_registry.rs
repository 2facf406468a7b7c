//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::debug::Debug;
use crate::neighbor::ConnId;

// Table of registered sessions, used to detect duplicate connections and to
// resolve connection collisions (RFC 4271 section 6.8).
//
// The lock is only held while deciding; callers act on the result (sending
// NOTIFICATIONs, closing connections) after it's released.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    sessions: Mutex<BTreeMap<SessionId, Registered>>,
}

// Reference to a session owned by a neighbor.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct SessionRef {
    pub nbr_addr: IpAddr,
    pub conn_id: ConnId,
}

// One end of a BGP connection. The `from` end of a session is the speaker
// that initiated the TCP connection.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct PeerIdentity {
    pub identifier: Ipv4Addr,
    pub asn: u32,
}

// Unordered pair of BGP identifiers.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct SessionId(Ipv4Addr, Ipv4Addr);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum PeerUpResult {
    // Session registered.
    Success,
    // A session in the same direction is already registered.
    Duplicate,
    // Collision lost: the new session must be closed.
    Dropped,
    // Collision won: the returned session must be closed.
    DroppedPrevious(SessionRef),
}

#[derive(Clone, Copy, Debug)]
struct Registered {
    session: SessionRef,
    from: PeerIdentity,
    to: PeerIdentity,
}

// ===== impl PeerRegistry =====

impl PeerRegistry {
    pub fn new() -> PeerRegistry {
        Default::default()
    }

    // Registers a session whose OPEN exchange completed.
    pub fn peer_up(
        &self,
        session: SessionRef,
        from: PeerIdentity,
        to: PeerIdentity,
    ) -> PeerUpResult {
        let id = SessionId::new(from.identifier, to.identifier);
        let result = {
            let mut sessions = self.sessions.lock().unwrap();
            match sessions.get(&id) {
                None => {
                    sessions.insert(id, Registered { session, from, to });
                    PeerUpResult::Success
                }
                Some(prev) if prev.session == session => PeerUpResult::Success,
                Some(prev) if prev.from == from && prev.to == to => {
                    PeerUpResult::Duplicate
                }
                Some(prev) => {
                    // The session initiated by the speaker with the higher
                    // BGP identifier survives. The AS number breaks ties.
                    match compare_sources(&from, &prev.from) {
                        Ordering::Greater => {
                            let prev = prev.session;
                            sessions
                                .insert(id, Registered { session, from, to });
                            PeerUpResult::DroppedPrevious(prev)
                        }
                        _ => PeerUpResult::Dropped,
                    }
                }
            }
        };

        Debug::PeerRegistryDecision(&session, &result).log();
        result
    }

    // Unregisters a session. Entries that were taken over by another session
    // are left untouched.
    pub fn peer_down(&self, session: SessionRef) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.retain(|_, registered| registered.session != session);
    }

    // Returns the session registered for the given pair of identifiers.
    pub fn get(&self, a: Ipv4Addr, b: Ipv4Addr) -> Option<SessionRef> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(&SessionId::new(a, b))
            .map(|registered| registered.session)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ===== impl SessionId =====

impl SessionId {
    pub fn new(a: Ipv4Addr, b: Ipv4Addr) -> SessionId {
        if a <= b { SessionId(a, b) } else { SessionId(b, a) }
    }
}

// ===== helper functions =====

fn compare_sources(a: &PeerIdentity, b: &PeerIdentity) -> Ordering {
    u32::from(a.identifier)
        .cmp(&u32::from(b.identifier))
        .then(a.asn.cmp(&b.asn))
}

// ===== unit tests =====
