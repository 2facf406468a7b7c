//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{self, AtomicU32};

use arbitrary::Arbitrary;
use chrono::{DateTime, Utc};
use holo_utils::UnboundedSender;
use holo_utils::bgp::{RouteType, WellKnownCommunities};
use holo_utils::task::{IntervalTask, Task, TimeoutTask};
use num_traits::FromPrimitive;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::af::{self, UpdateQueue};
use crate::config::{InstanceCfg, NeighborCfg};
use crate::debug::Debug;
use crate::error::Error;
use crate::events;
use crate::instance::InstanceUpView;
use crate::network::{ConnInfo, Connection};
use crate::packet::consts::{
    AS_TRANS, AddPathMode, AfiSafi, BGP_VERSION, CeaseSubcode, ErrorCode,
    FsmErrorSubcode, GrFlags, OpenMessageErrorSubcode,
};
use crate::packet::message::{
    AddPathTuple, Capability, DecodeCxt, EncodeCxt, GrTuple, KeepaliveMsg,
    Message, NegotiatedCapability, NotificationMsg, OpenMsg, UpdateMsg,
};
use crate::peer_registry::{PeerIdentity, PeerUpResult, SessionRef};
use crate::registry::CodecRegistry;
use crate::rib::{LocalRoute, RouteIneligibleReason};
use crate::tasks;
use crate::tasks::messages::output::NbrTxMsg;

// Large hold time used while waiting for the peer's OPEN.
pub const LARGE_HOLDTIME: u16 = 240;

// Delay before restarting a session that went down.
const IDLE_HOLD_TIME: u16 = 1;

// Connection identifier, unique within a neighbor.
pub type ConnId = u64;

// BGP neighbor.
//
// A neighbor owns one session per TCP connection. Two sessions coexist only
// while a connection collision is being resolved.
#[derive(Debug)]
pub struct Neighbor {
    pub remote_addr: IpAddr,
    pub config: NeighborCfg,
    pub peer_type: PeerType,
    pub state: fsm::State,
    // Whether the neighbor was started and accepts connections.
    pub started: bool,
    pub sessions: BTreeMap<ConnId, Session>,
    pub established: Option<ConnId>,
    // Address families whose routes are retained across a peer restart.
    pub stale_afi_safis: BTreeSet<AfiSafi>,
    pub notification_sent: Option<(DateTime<Utc>, NotificationMsg)>,
    pub notification_rcvd: Option<(DateTime<Utc>, NotificationMsg)>,
    pub last_established: Option<DateTime<Utc>>,
    pub statistics: NeighborStatistics,
    pub tasks: NeighborTasks,
    pub update_queues: BTreeMap<AfiSafi, UpdateQueue>,
    next_conn_id: ConnId,
}

// BGP peer type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
#[derive(Arbitrary)]
pub enum PeerType {
    Internal,
    External,
}

// BGP session, bound to a single TCP connection.
#[derive(Debug)]
pub struct Session {
    pub conn_id: ConnId,
    pub direction: Direction,
    pub conn_info: ConnInfo,
    pub state: fsm::State,
    pub local_open: OpenMsg,
    pub identifier: Option<Ipv4Addr>,
    pub holdtime_nego: Option<u16>,
    pub capabilities_rcvd: BTreeSet<Capability>,
    pub capabilities_nego: BTreeSet<NegotiatedCapability>,
    // Whether the session is registered in the peer registry.
    pub registered: bool,
    pub tasks: SessionTasks,
    pub msg_txp: UnboundedSender<NbrTxMsg>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

// Neighbor statistics.
#[derive(Debug, Default)]
pub struct NeighborStatistics {
    pub established_transitions: u32,
    pub msgs_rcvd: MessageStatistics,
    pub msgs_sent: MessageStatistics,
    pub rejected_prefixes: u32,
    pub invalidated: InvalidatedStatistics,
    pub erroneous_updates_withdrawn: u32,
}

// Inbound and outbound message counters.
#[derive(Debug, Default)]
pub struct MessageStatistics {
    // Shared with the keepalive task.
    pub total: Arc<AtomicU32>,
    pub updates: u32,
    pub notifications: u32,
    pub route_refreshes: u32,
}

// Routes found unusable by the loop checks.
#[derive(Debug, Default)]
pub struct InvalidatedStatistics {
    pub cluster_loop: u32,
    pub as_loop: u32,
    pub originator: u32,
    pub confed: u32,
}

// Neighbor tasks.
#[derive(Debug, Default)]
pub struct NeighborTasks {
    pub autostart: Option<TimeoutTask>,
    pub connect: Option<Task<()>>,
    pub gr_restart: Option<TimeoutTask>,
}

// Session tasks.
//
// The Tx task isn't tracked: it exits on its own after writing the final
// `Close` message.
#[derive(Debug, Default)]
pub struct SessionTasks {
    pub rx: Option<Task<()>>,
    pub keepalive: Option<IntervalTask>,
}

// Type aliases.
pub type Neighbors = BTreeMap<IpAddr, Neighbor>;

// Finite State Machine.
pub mod fsm {
    use serde::{Deserialize, Serialize};

    use crate::network::Connection;
    use crate::packet::error::DecodeError;
    use crate::packet::message::{
        NotificationMsg, OpenMsg, RouteRefreshMsg, UpdateMsg,
    };

    use super::Direction;

    // FSM states.
    #[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        Idle,
        Connect,
        Active,
        OpenSent,
        OpenConfirm,
        Established,
    }

    // FSM events.
    //
    // The original RFC FSM events are listed above each event for clarity.
    // The first group drives the neighbor, the second group drives one of
    // its sessions.
    #[derive(Debug)]
    pub enum Event {
        // ManualStart
        // ManualStart_with_PassiveTcpEstablishment
        Start,
        // ManualStop
        Stop(Option<NotificationMsg>),
        // Tcp_CR_Acked
        // TcpConnectionConfirmed
        Connected(Connection, Direction),
        // TcpConnectionFails
        ConnFail,
        // BGPHeaderErr
        // BGPOpenMsgErr
        // UpdateMsgErr
        RcvdError(DecodeError),
        // BGPOpen
        RcvdOpen(OpenMsg),
        // NotifMsg
        RcvdNotif(NotificationMsg),
        // KeepAliveMsg
        RcvdKalive,
        // UpdateMsg
        RcvdUpdate(UpdateMsg),
        RcvdRouteRefresh(RouteRefreshMsg),
        // TcpConnectionFails (established connection)
        ConnClosed,
        // HoldTimer_Expires
        // AutomaticStart
        Timer(Timer),
    }

    // BGP timers.
    //
    // Note: KEEPALIVE messages are sent independently, separate from the FSM.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Timer {
        Hold,
        AutoStart,
        GrRestart,
    }
}

// ===== impl Neighbor =====

impl Neighbor {
    pub(crate) fn new(
        remote_addr: IpAddr,
        config: NeighborCfg,
        local_asn: u32,
    ) -> Neighbor {
        Debug::NbrCreate(&remote_addr).log();

        let peer_type = if config.peer_as == local_asn {
            PeerType::Internal
        } else {
            PeerType::External
        };
        Neighbor {
            remote_addr,
            config,
            peer_type,
            state: fsm::State::Idle,
            started: false,
            sessions: Default::default(),
            established: None,
            stale_afi_safis: Default::default(),
            notification_sent: None,
            notification_rcvd: None,
            last_established: None,
            statistics: Default::default(),
            tasks: Default::default(),
            update_queues: Default::default(),
            next_conn_id: 1,
        }
    }

    // Starts over from a clean state with a new configuration. Connection
    // IDs aren't reused.
    pub(crate) fn reset(&mut self, config: NeighborCfg, local_asn: u32) {
        let next_conn_id = self.next_conn_id;
        *self = Neighbor::new(self.remote_addr, config, local_asn);
        self.next_conn_id = next_conn_id;
    }

    // Injects a neighbor-wide event into the FSM.
    pub(crate) fn fsm_event(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        event: fsm::Event,
    ) {
        Debug::NbrFsmEvent(&self.remote_addr, &event).log();

        match event {
            fsm::Event::Start | fsm::Event::Timer(fsm::Timer::AutoStart) => {
                if !self.started && self.config.enabled {
                    self.start(instance);
                }
            }
            fsm::Event::Stop(msg) => {
                self.started = false;
                self.tasks.autostart = None;
                self.tasks.connect = None;
                for conn_id in self.sessions.keys().copied().collect::<Vec<_>>()
                {
                    let event = fsm::Event::Stop(msg.clone());
                    self.session_fsm_event(instance, conn_id, event);
                }

                // Routes retained for a restarting peer go away as well.
                self.gr_stale_purge_all(instance);
                self.tasks.gr_restart = None;
            }
            fsm::Event::Connected(conn, direction) => {
                if direction == Direction::Outbound {
                    self.tasks.connect = None;
                }
                if self.started {
                    self.session_open(instance, conn, direction);
                }
            }
            fsm::Event::ConnFail => {
                // The connect-retry budget is exhausted. Stay down until
                // explicitly started again.
                self.tasks.connect = None;
                if self.sessions.is_empty() {
                    self.started = false;
                }
            }
            fsm::Event::Timer(fsm::Timer::GrRestart) => {
                self.tasks.gr_restart = None;
                self.gr_stale_purge_all(instance);
            }
            _ => {
                // Session events are never delivered to the neighbor.
            }
        }

        self.update_state();
    }

    // Injects an event into the FSM of one of the neighbor's sessions.
    pub(crate) fn session_fsm_event(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        conn_id: ConnId,
        event: fsm::Event,
    ) {
        // The session is taken out of the neighbor while the event is
        // processed, and put back unless it was closed.
        let Some(mut session) = self.sessions.remove(&conn_id) else {
            return;
        };

        Debug::SessionFsmEvent(&self.remote_addr, conn_id, &event).log();

        let next_state = match session.state {
            // OpenSent state
            fsm::State::OpenSent => match event {
                fsm::Event::Stop(msg) => {
                    Some(self.session_close(instance, &mut session, msg, false))
                }
                fsm::Event::RcvdOpen(msg) => {
                    Some(self.open_process(instance, &mut session, msg))
                }
                fsm::Event::RcvdError(error) => {
                    let msg = NotificationMsg::from(error);
                    Some(self.session_close(
                        instance,
                        &mut session,
                        Some(msg),
                        false,
                    ))
                }
                fsm::Event::RcvdNotif(_) | fsm::Event::ConnClosed => {
                    let close =
                        self.session_close(instance, &mut session, None, false);
                    Some(close)
                }
                fsm::Event::Timer(fsm::Timer::Hold) => {
                    let msg = hold_timer_expired_notif();
                    Some(self.session_close(
                        instance,
                        &mut session,
                        Some(msg),
                        false,
                    ))
                }
                _ => {
                    // FSM error.
                    let error_code = ErrorCode::FiniteStateMachineError;
                    let error_subcode =
                        FsmErrorSubcode::UnexpectedMessageInOpenSent;
                    let msg = NotificationMsg::new(error_code, error_subcode);
                    Some(self.session_close(
                        instance,
                        &mut session,
                        Some(msg),
                        false,
                    ))
                }
            },
            // OpenConfirm state
            fsm::State::OpenConfirm => match event {
                fsm::Event::Stop(msg) => {
                    Some(self.session_close(instance, &mut session, msg, false))
                }
                fsm::Event::RcvdKalive => {
                    self.session_init(instance, &session);
                    Some(fsm::State::Established)
                }
                fsm::Event::RcvdError(error) => {
                    let msg = NotificationMsg::from(error);
                    Some(self.session_close(
                        instance,
                        &mut session,
                        Some(msg),
                        false,
                    ))
                }
                fsm::Event::RcvdNotif(_) | fsm::Event::ConnClosed => {
                    let close =
                        self.session_close(instance, &mut session, None, false);
                    Some(close)
                }
                fsm::Event::Timer(fsm::Timer::Hold) => {
                    let msg = hold_timer_expired_notif();
                    Some(self.session_close(
                        instance,
                        &mut session,
                        Some(msg),
                        false,
                    ))
                }
                _ => {
                    // FSM error.
                    let error_code = ErrorCode::FiniteStateMachineError;
                    let error_subcode =
                        FsmErrorSubcode::UnexpectedMessageInOpenConfirm;
                    let msg = NotificationMsg::new(error_code, error_subcode);
                    Some(self.session_close(
                        instance,
                        &mut session,
                        Some(msg),
                        false,
                    ))
                }
            },
            // Established state
            fsm::State::Established => match event {
                fsm::Event::Stop(msg) => {
                    Some(self.session_close(instance, &mut session, msg, false))
                }
                fsm::Event::RcvdKalive => None,
                fsm::Event::RcvdUpdate(msg) => {
                    events::process_update(instance, self, &session, msg);
                    None
                }
                fsm::Event::RcvdRouteRefresh(msg) => {
                    if let Some(afi_safi) = msg.afi_safi()
                        && session.is_afi_safi_enabled(afi_safi)
                    {
                        self.resend_adj_rib_out(instance, &session, afi_safi);
                    }
                    None
                }
                fsm::Event::RcvdError(error) => {
                    let msg = NotificationMsg::from(error);
                    Some(self.session_close(
                        instance,
                        &mut session,
                        Some(msg),
                        false,
                    ))
                }
                fsm::Event::RcvdNotif(_) => {
                    let close =
                        self.session_close(instance, &mut session, None, false);
                    Some(close)
                }
                fsm::Event::ConnClosed => {
                    Some(self.session_close(instance, &mut session, None, true))
                }
                fsm::Event::Timer(fsm::Timer::Hold) => {
                    let msg = hold_timer_expired_notif();
                    Some(self.session_close(
                        instance,
                        &mut session,
                        Some(msg),
                        true,
                    ))
                }
                _ => {
                    // FSM error.
                    let error_code = ErrorCode::FiniteStateMachineError;
                    let error_subcode =
                        FsmErrorSubcode::UnexpectedMessageInEstablished;
                    let msg = NotificationMsg::new(error_code, error_subcode);
                    Some(self.session_close(
                        instance,
                        &mut session,
                        Some(msg),
                        false,
                    ))
                }
            },
            // Sessions are created in the OpenSent state and never go back
            // to an earlier one.
            _ => None,
        };

        // Change to next FSM state when applicable.
        match next_state {
            Some(fsm::State::Idle) => {
                Debug::SessionFsmTransition(
                    &self.remote_addr,
                    conn_id,
                    &session.state,
                    &fsm::State::Idle,
                )
                .log();
            }
            Some(next_state) => {
                if session.state != next_state {
                    Debug::SessionFsmTransition(
                        &self.remote_addr,
                        conn_id,
                        &session.state,
                        &next_state,
                    )
                    .log();
                    if next_state == fsm::State::Established {
                        self.established = Some(conn_id);
                    }
                    session.state = next_state;
                }
                self.sessions.insert(conn_id, session);
            }
            None => {
                self.sessions.insert(conn_id, session);
            }
        }

        // Restart the neighbor after a failure, unless it was stopped.
        if self.sessions.is_empty()
            && self.tasks.connect.is_none()
            && self.started
            && next_state == Some(fsm::State::Idle)
        {
            self.started = false;
            if self.config.enabled {
                self.autostart_start(instance);
            }
        }

        self.update_state();
    }

    // Computes the neighbor state from the state of its sessions.
    fn update_state(&mut self) {
        let next_state = if let Some(state) =
            self.sessions.values().map(|session| session.state).max()
        {
            state
        } else if self.tasks.connect.is_some() {
            fsm::State::Connect
        } else if self.started {
            fsm::State::Active
        } else {
            fsm::State::Idle
        };
        if next_state == self.state {
            return;
        }

        Debug::NbrFsmTransition(&self.remote_addr, &self.state, &next_state)
            .log();

        // Keep track of the time that the BGP session last transitioned in or
        // out of the Established state.
        if self.state == fsm::State::Established
            || next_state == fsm::State::Established
        {
            self.last_established = Some(Utc::now());
        }
        if next_state == fsm::State::Established {
            self.statistics.established_transitions += 1;
        }

        self.state = next_state;
    }

    // Starts the neighbor, initiating a connection unless in passive mode.
    fn start(&mut self, instance: &mut InstanceUpView<'_>) {
        self.started = true;
        self.tasks.autostart = None;
        if !self.config.passive {
            self.connect(instance);
        }
    }

    // Starts a TCP connection task to the neighbor's remote address.
    fn connect(&mut self, instance: &mut InstanceUpView<'_>) {
        let reconnect = self
            .config
            .reconnect
            .as_ref()
            .unwrap_or(&instance.config.reconnect);
        match reconnect.strategy(Instant::now()) {
            Ok(strategy) => {
                let task = tasks::tcp_connect(
                    self.remote_addr,
                    instance.shared.transport.clone(),
                    strategy,
                    &instance.tx.tcp_connect,
                );
                self.tasks.connect = Some(task);
            }
            Err(error) => {
                Error::NbrConfigError(self.remote_addr, error.into()).log();
                self.started = false;
            }
        }
    }

    // Starts the auto-start timer.
    fn autostart_start(&mut self, instance: &mut InstanceUpView<'_>) {
        let task = tasks::nbr_timer(
            self.remote_addr,
            None,
            fsm::Timer::AutoStart,
            IDLE_HOLD_TIME,
            &instance.tx.nbr_timer,
        );
        self.tasks.autostart = Some(task);
    }

    // Creates a session for a new connection and sends the local OPEN.
    fn session_open(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        conn: Connection,
        direction: Direction,
    ) {
        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;
        let local_open =
            self.open_build(instance.config, instance.state.identifier);

        // Spawn session Tx task.
        let (msg_txp, msg_txc) = mpsc::unbounded_channel();
        let cxt = EncodeCxt {
            capabilities: Default::default(),
            registry: instance.shared.codecs.clone(),
        };
        let mut tx_task = tasks::nbr_tx(
            self.remote_addr,
            conn_id,
            cxt,
            conn.write_half,
            msg_txc,
        );
        tx_task.detach();

        // Spawn session Rx task.
        let cxt = DecodeCxt {
            peer_type: self.peer_type,
            peer_as: self.config.peer_as,
            capabilities: Default::default(),
            registry: instance.shared.codecs.clone(),
        };
        let rx_task = tasks::nbr_rx(
            self.remote_addr,
            conn_id,
            local_open.clone(),
            cxt,
            conn.read_half,
            &instance.tx.nbr_msg_rx,
            &instance.tx.nbr_timer,
        );

        let session = Session {
            conn_id,
            direction,
            conn_info: conn.conn_info,
            state: fsm::State::OpenSent,
            local_open: local_open.clone(),
            identifier: None,
            holdtime_nego: None,
            capabilities_rcvd: Default::default(),
            capabilities_nego: Default::default(),
            registered: false,
            tasks: SessionTasks {
                rx: Some(rx_task),
                keepalive: None,
            },
            msg_txp,
        };
        Debug::SessionFsmTransition(
            &self.remote_addr,
            conn_id,
            &fsm::State::Connect,
            &fsm::State::OpenSent,
        )
        .log();
        session.message_send(
            self.remote_addr,
            &mut self.statistics,
            Message::Open(local_open),
        );
        self.sessions.insert(conn_id, session);
    }

    // Initializes an established session, sending the initial routing
    // updates followed by End-of-RIB markers.
    fn session_init(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        session: &Session,
    ) {
        self.update_queues.clear();

        // Routes retained from a previous session are kept only if the peer
        // still supports graceful restart.
        if !session.gr_negotiated() {
            self.gr_stale_purge_all(instance);
            self.tasks.gr_restart = None;
        }

        let afi_safis = session.afi_safis();
        for afi_safi in &afi_safis {
            self.dump_table(instance, session, *afi_safi);
        }
        self.flush_session_updates(&instance.shared.codecs, session);

        for afi_safi in afi_safis {
            let msg = Message::Update(UpdateMsg::new_eor(afi_safi));
            session.message_send(self.remote_addr, &mut self.statistics, msg);
        }
    }

    // Closes a session, releasing its resources.
    //
    // When `retain_routes` is set and graceful restart was negotiated, the
    // routes learned over the session are kept as stale. Otherwise they're
    // withdrawn.
    fn session_close(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        session: &mut Session,
        send_notif: Option<NotificationMsg>,
        retain_routes: bool,
    ) -> fsm::State {
        // Send a notification message.
        if let Some(msg) = send_notif {
            self.notification_sent = Some((Utc::now(), msg.clone()));
            session.message_send(
                self.remote_addr,
                &mut self.statistics,
                Message::Notification(msg),
            );
        }

        // Stop reading (which also cancels the hold timer) and sending
        // keepalives, then let the Tx task drain and exit.
        session.tasks = Default::default();
        let _ = session.msg_txp.send(NbrTxMsg::Close);

        if session.registered {
            instance.shared.peer_registry.peer_down(SessionRef {
                nbr_addr: self.remote_addr,
                conn_id: session.conn_id,
            });
            session.registered = false;
        }

        if session.state == fsm::State::Established {
            self.established = None;
            self.update_queues.clear();
            if retain_routes && session.gr_negotiated() {
                self.gr_retain_routes(instance, session);
            } else {
                self.clear_routes(instance);
            }
        }

        fsm::State::Idle
    }

    // Builds the local OPEN message.
    fn open_build(
        &self,
        instance_cfg: &InstanceCfg,
        identifier: Ipv4Addr,
    ) -> OpenMsg {
        // Base capabilities.
        let mut capabilities: BTreeSet<_> = [
            Capability::RouteRefresh,
            Capability::FourOctetAsNumber {
                asn: instance_cfg.asn,
            },
        ]
        .into();

        // Multiprotocol capabilities.
        for afi_safi in &self.config.afi_safi {
            capabilities.insert(Capability::MultiProtocol {
                afi: afi_safi.afi(),
                safi: afi_safi.safi(),
            });
        }

        // ADD-PATH capability.
        let add_path = self
            .config
            .add_path_rx
            .iter()
            .map(|afi_safi| AddPathTuple {
                afi: afi_safi.afi(),
                safi: afi_safi.safi(),
                mode: AddPathMode::Receive,
            })
            .collect::<BTreeSet<_>>();
        if !add_path.is_empty() {
            capabilities.insert(Capability::AddPath(add_path));
        }

        // Graceful restart capability.
        if self.config.graceful_restart.enabled {
            let afi_safis = self
                .config
                .afi_safi
                .iter()
                .map(|afi_safi| GrTuple {
                    afi: afi_safi.afi(),
                    safi: afi_safi.safi(),
                    forwarding: false,
                })
                .collect();
            capabilities.insert(Capability::GracefulRestart {
                flags: GrFlags::empty(),
                restart_time: self.config.graceful_restart.restart_time,
                afi_safis,
            });
        }

        OpenMsg {
            version: BGP_VERSION,
            my_as: instance_cfg.asn.try_into().unwrap_or(AS_TRANS),
            holdtime: self.config.holdtime.unwrap_or(instance_cfg.holdtime),
            identifier,
            capabilities,
        }
    }

    // Processes the received OPEN message while in the OpenSent state.
    fn open_process(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        session: &mut Session,
        msg: OpenMsg,
    ) -> fsm::State {
        // Validate the received message.
        if let Err(error) = self.open_validate(instance, &msg) {
            error.log();

            // Close the session.
            let error_code = ErrorCode::OpenMessageError;
            let msg = match error {
                Error::NbrBadAs(..) => NotificationMsg::new(
                    error_code,
                    OpenMessageErrorSubcode::BadPeerAs,
                ),
                _ => NotificationMsg::new(
                    error_code,
                    OpenMessageErrorSubcode::BadBgpIdentifier,
                ),
            };
            return self.session_close(instance, session, Some(msg), false);
        }

        // Keep track of the received data.
        session.identifier = Some(msg.identifier);
        session.holdtime_nego =
            negotiated_holdtime(session.local_open.holdtime, msg.holdtime);
        session.capabilities_nego =
            NegotiatedCapability::negotiate(&session.local_open, &msg);

        // Resolve duplicate and colliding connections.
        let local = PeerIdentity {
            identifier: instance.state.identifier,
            asn: instance.config.asn,
        };
        let remote = PeerIdentity {
            identifier: msg.identifier,
            asn: msg.real_as(),
        };
        let (from, to) = match session.direction {
            Direction::Outbound => (local, remote),
            Direction::Inbound => (remote, local),
        };
        let sref = SessionRef {
            nbr_addr: self.remote_addr,
            conn_id: session.conn_id,
        };
        session.capabilities_rcvd = msg.capabilities;
        match instance.shared.peer_registry.peer_up(sref, from, to) {
            PeerUpResult::Success => (),
            PeerUpResult::Duplicate => {
                let msg = NotificationMsg::new(
                    ErrorCode::Cease,
                    CeaseSubcode::ConnectionRejected,
                );
                return self.session_close(instance, session, Some(msg), false);
            }
            PeerUpResult::Dropped => {
                Error::NbrCollision(self.remote_addr, remote.identifier).log();
                return self.session_close(
                    instance,
                    session,
                    Some(collision_notif()),
                    false,
                );
            }
            PeerUpResult::DroppedPrevious(prev) => {
                Error::NbrCollision(self.remote_addr, remote.identifier).log();
                if prev.nbr_addr == self.remote_addr {
                    if let Some(mut prev_session) =
                        self.sessions.remove(&prev.conn_id)
                    {
                        // Ownership already moved to the new session.
                        prev_session.registered = false;
                        self.session_close(
                            instance,
                            &mut prev_session,
                            Some(collision_notif()),
                            false,
                        );
                        Debug::SessionFsmTransition(
                            &self.remote_addr,
                            prev.conn_id,
                            &prev_session.state,
                            &fsm::State::Idle,
                        )
                        .log();
                    }
                } else {
                    instance.state.pending_closes.push(prev);
                }
            }
        }
        session.registered = true;

        // Update the Tx task with the negotiated capabilities.
        let msg =
            NbrTxMsg::UpdateCapabilities(session.capabilities_nego.clone());
        let _ = session.msg_txp.send(msg);

        // Send Keepalive message.
        session.message_send(
            self.remote_addr,
            &mut self.statistics,
            Message::Keepalive(KeepaliveMsg {}),
        );

        // Start Keepalive interval.
        if let Some(holdtime_nego) = session.holdtime_nego {
            let task = tasks::nbr_kalive_interval(
                self.remote_addr,
                holdtime_nego / 3,
                &session.msg_txp,
                &self.statistics.msgs_sent.total,
            );
            session.tasks.keepalive = Some(task);
        }

        // Transition to the OpenConfirm state.
        fsm::State::OpenConfirm
    }

    // Performs semantic validation of the received BGP OPEN message.
    // Syntactic errors are detected during the decoding phase.
    fn open_validate(
        &self,
        instance: &InstanceUpView<'_>,
        msg: &OpenMsg,
    ) -> Result<(), Error> {
        // Validate ASN.
        if self.config.peer_as != msg.real_as() {
            return Err(Error::NbrBadAs(
                self.remote_addr,
                msg.real_as(),
                self.config.peer_as,
            ));
        }

        // Validate BGP identifier for internal peers.
        if self.peer_type == PeerType::Internal
            && msg.identifier == instance.state.identifier
        {
            return Err(Error::NbrBadIdentifier(
                self.remote_addr,
                msg.identifier,
            ));
        }

        Ok(())
    }

    // Re-sends the current Adj-RIB-Out for the given address family.
    fn resend_adj_rib_out(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        session: &Session,
        afi_safi: AfiSafi,
    ) {
        let table = instance.state.rib.table(afi_safi);
        for dest in table.destinations.values_mut() {
            dest.adj_out.remove(&self.remote_addr);
        }
        self.dump_table(instance, session, afi_safi);
        self.flush_session_updates(&instance.shared.codecs, session);
    }

    // Queues all Loc-RIB routes of the given table for advertisement.
    fn dump_table(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        session: &Session,
        afi_safi: AfiSafi,
    ) {
        let rib = &mut instance.state.rib;
        let Some(table) = rib.tables.get_mut(&afi_safi) else {
            return;
        };
        for (nlri, dest) in table.destinations.iter_mut() {
            events::export_route(
                instance.config,
                instance.policies,
                &mut rib.attr_sets,
                self,
                session.conn_info.local_addr,
                afi_safi,
                nlri,
                dest,
            );
        }
    }

    pub(crate) fn established_session(&self) -> Option<&Session> {
        self.established
            .and_then(|conn_id| self.sessions.get(&conn_id))
    }

    // Sends the pending routing updates to the established session, if any.
    pub(crate) fn flush_updates(&mut self, codecs: &Arc<CodecRegistry>) {
        let Some(session) =
            self.established.and_then(|conn_id| self.sessions.get(&conn_id))
        else {
            return;
        };
        let msg_list = build_updates(&mut self.update_queues, session, codecs);
        if !msg_list.is_empty() {
            session.message_list_send(
                self.remote_addr,
                &mut self.statistics,
                msg_list,
            );
        }
    }

    fn flush_session_updates(
        &mut self,
        codecs: &Arc<CodecRegistry>,
        session: &Session,
    ) {
        let msg_list = build_updates(&mut self.update_queues, session, codecs);
        if !msg_list.is_empty() {
            session.message_list_send(
                self.remote_addr,
                &mut self.statistics,
                msg_list,
            );
        }
    }

    // Marks the routes learned over the session as stale and starts the
    // restart timer advertised by the peer.
    fn gr_retain_routes(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        session: &Session,
    ) {
        let Some((restart_time, gr_afi_safis)) = session.gr_rcvd() else {
            self.clear_routes(instance);
            return;
        };

        let rib = &mut instance.state.rib;
        for (afi_safi, table) in rib.tables.iter_mut() {
            if gr_afi_safis.contains(afi_safi) {
                Debug::NbrGrStaleMark(&self.remote_addr, *afi_safi).log();
                table.mark_stale(self.remote_addr);
                self.stale_afi_safis.insert(*afi_safi);
            } else {
                table.withdraw_peer(self.remote_addr, false);
            }
        }

        if restart_time == 0 {
            self.gr_stale_purge_all(instance);
            return;
        }
        let task = tasks::nbr_timer(
            self.remote_addr,
            None,
            fsm::Timer::GrRestart,
            restart_time,
            &instance.tx.nbr_timer,
        );
        self.tasks.gr_restart = Some(task);
    }

    // Purges the stale routes of the given address family.
    pub(crate) fn gr_stale_purge(
        &mut self,
        instance: &mut InstanceUpView<'_>,
        afi_safi: AfiSafi,
    ) {
        if !self.stale_afi_safis.remove(&afi_safi) {
            return;
        }

        Debug::NbrGrStalePurge(&self.remote_addr, afi_safi).log();
        let table = instance.state.rib.table(afi_safi);
        table.withdraw_peer(self.remote_addr, true);
        if self.stale_afi_safis.is_empty() {
            self.tasks.gr_restart = None;
        }
    }

    fn gr_stale_purge_all(&mut self, instance: &mut InstanceUpView<'_>) {
        for afi_safi in std::mem::take(&mut self.stale_afi_safis) {
            Debug::NbrGrStalePurge(&self.remote_addr, afi_safi).log();
            let table = instance.state.rib.table(afi_safi);
            table.withdraw_peer(self.remote_addr, true);
        }
    }

    // Withdraws all routes learned from the neighbor.
    fn clear_routes(&mut self, instance: &mut InstanceUpView<'_>) {
        for table in instance.state.rib.tables.values_mut() {
            table.withdraw_peer(self.remote_addr, false);
        }
        self.stale_afi_safis.clear();
        self.tasks.gr_restart = None;
    }

    // Determines whether the given route is eligible for distribution.
    pub(crate) fn distribute_filter(&self, route: &LocalRoute) -> bool {
        // Never send a route back to the peer it was learned from.
        if route.origin.remote_addr == self.remote_addr {
            return false;
        }

        // RFC 4271 - Section 9.2:
        // "When a BGP speaker receives an UPDATE message from an internal
        // peer, the receiving BGP speaker SHALL NOT re-distribute the
        // routing information contained in that UPDATE message to other
        // internal peers".
        if route.route_type == RouteType::Internal
            && self.peer_type == PeerType::Internal
        {
            return false;
        }

        // Suppress advertisements to peers whose AS number is present in the
        // AS path of the route.
        let attrs = &route.attrs.value;
        if self.peer_type == PeerType::External
            && attrs.base.as_path.contains(self.config.peer_as)
        {
            return false;
        }

        // Handle well-known communities.
        if let Some(comm) = &attrs.comm {
            for comm in comm
                .0
                .iter()
                .filter_map(|comm| WellKnownCommunities::from_u32(comm.0))
            {
                // Do not advertise to any other peer.
                if comm == WellKnownCommunities::NoAdvertise {
                    return false;
                }

                // Do not advertise to external peers.
                if self.peer_type == PeerType::External
                    && (comm == WellKnownCommunities::NoExport
                        || comm == WellKnownCommunities::NoExportSubconfed)
                {
                    return false;
                }
            }
        }

        true
    }

    // Records a route found unusable by the loop checks.
    pub(crate) fn route_invalidated(&mut self, reason: RouteIneligibleReason) {
        let invalidated = &mut self.statistics.invalidated;
        match reason {
            RouteIneligibleReason::ClusterLoop => invalidated.cluster_loop += 1,
            RouteIneligibleReason::AsLoop => invalidated.as_loop += 1,
            RouteIneligibleReason::Originator => invalidated.originator += 1,
            RouteIneligibleReason::Confed => invalidated.confed += 1,
        }
    }
}

impl Drop for Neighbor {
    fn drop(&mut self) {
        Debug::NbrDelete(&self.remote_addr).log();
    }
}

// ===== impl Session =====

impl Session {
    // Enqueues a single BGP message for transmission.
    pub(crate) fn message_send(
        &self,
        nbr_addr: IpAddr,
        statistics: &mut NeighborStatistics,
        msg: Message,
    ) {
        Debug::NbrMsgTx(&nbr_addr, &msg).log();

        // Update statistics.
        statistics.msgs_sent.update(&msg);

        // Ignore any possible error as the connection might have gone down
        // already.
        let msg = NbrTxMsg::SendMessage { nbr_addr, msg };
        let _ = self.msg_txp.send(msg);
    }

    // Enqueues a list of BGP messages for transmission.
    //
    // This method is more efficient for handling a large number of messages,
    // as they are sent all at once.
    pub(crate) fn message_list_send(
        &self,
        nbr_addr: IpAddr,
        statistics: &mut NeighborStatistics,
        msg_list: Vec<Message>,
    ) {
        for msg in &msg_list {
            Debug::NbrMsgTx(&nbr_addr, msg).log();

            // Update statistics.
            statistics.msgs_sent.update(msg);
        }

        // Ignore any possible error as the connection might have gone down
        // already.
        let msg = NbrTxMsg::SendMessageList { nbr_addr, msg_list };
        let _ = self.msg_txp.send(msg);
    }

    // Returns the address families negotiated for this session.
    pub fn afi_safis(&self) -> BTreeSet<AfiSafi> {
        self.capabilities_nego
            .iter()
            .filter_map(|cap| cap.as_multi_protocol())
            .filter_map(|(afi, safi)| AfiSafi::new(*afi, *safi))
            .collect()
    }

    pub fn is_afi_safi_enabled(&self, afi_safi: AfiSafi) -> bool {
        self.afi_safis().contains(&afi_safi)
    }

    pub(crate) fn gr_negotiated(&self) -> bool {
        self.capabilities_nego
            .contains(&NegotiatedCapability::GracefulRestart)
    }

    // Returns the restart time and the address families the peer promised to
    // preserve across a restart.
    fn gr_rcvd(&self) -> Option<(u16, BTreeSet<AfiSafi>)> {
        self.capabilities_rcvd.iter().find_map(|cap| {
            let (_, restart_time, afi_safis) = cap.as_graceful_restart()?;
            let afi_safis = afi_safis
                .iter()
                .filter_map(|tuple| AfiSafi::new(tuple.afi, tuple.safi))
                .filter(|afi_safi| self.is_afi_safi_enabled(*afi_safi))
                .collect();
            Some((*restart_time, afi_safis))
        })
    }
}

// ===== impl MessageStatistics =====

impl MessageStatistics {
    pub(crate) fn update(&mut self, msg: &Message) {
        self.total.fetch_add(1, atomic::Ordering::Relaxed);
        match msg {
            Message::Update(_) => {
                self.updates += 1;
            }
            Message::Notification(_) => {
                self.notifications += 1;
            }
            Message::RouteRefresh(_) => {
                self.route_refreshes += 1;
            }
            _ => {}
        }
    }
}

// ===== helper functions =====

fn build_updates(
    update_queues: &mut BTreeMap<AfiSafi, UpdateQueue>,
    session: &Session,
    codecs: &Arc<CodecRegistry>,
) -> Vec<Message> {
    let cxt = EncodeCxt {
        capabilities: session.capabilities_nego.clone(),
        registry: codecs.clone(),
    };
    let mut msg_list = vec![];
    for (afi_safi, queue) in update_queues.iter_mut() {
        if queue.is_empty() {
            continue;
        }
        msg_list.extend(af::rib_support(*afi_safi).build_updates(queue, &cxt));
    }
    msg_list
}

fn hold_timer_expired_notif() -> NotificationMsg {
    NotificationMsg::new(ErrorCode::HoldTimerExpired, 0u8)
}

fn collision_notif() -> NotificationMsg {
    NotificationMsg::new(
        ErrorCode::Cease,
        CeaseSubcode::ConnectionCollisionResolution,
    )
}

// ===== global functions =====

// Returns the hold time in effect for a session, or `None` if keepalives and
// the hold timer are disabled.
pub(crate) fn negotiated_holdtime(local: u16, remote: u16) -> Option<u16> {
    let holdtime = std::cmp::min(local, remote);
    (holdtime != 0).then_some(holdtime)
}

// ===== unit tests =====
