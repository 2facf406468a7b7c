//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use holo_utils::task::Task;
use holo_utils::{Receiver, Responder, Sender};
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug_span};

use crate::config::{ConfigError, InstanceCfg, NeighborCfg, PolicyCfg};
use crate::debug::Debug;
use crate::error::Error;
use crate::events;
use crate::neighbor::{Neighbor, Neighbors, fsm};
use crate::network::{Connection, Transport};
use crate::packet::consts::{AfiSafi, CeaseSubcode, ErrorCode};
use crate::packet::message::NotificationMsg;
use crate::packet::nlri::Nlri;
use crate::packet::tlv::{InfoTlv, PeerReport, StatTlv};
use crate::peer_registry::{PeerRegistry, SessionRef};
use crate::registry::CodecRegistry;
use crate::rib::{AdjRibIn, LocalRoute, Rib, RibSink};
use crate::tasks::messages::input::{NbrRxMsg, NbrTimerMsg, TcpConnectMsg};

// BGP instance.
//
// The instance runs as a single task that owns all neighbors and the RIB.
// Everything else talks to it through channels: child tasks report network
// and timer events, and users issue requests through an `InstanceHandle`.
#[derive(Debug)]
pub struct Instance {
    // Instance configuration data.
    pub config: InstanceCfg,
    // Routing policies.
    pub policies: PolicyCfg,
    // Instance state data.
    pub state: InstanceState,
    // Instance neighbors.
    pub neighbors: Neighbors,
    // Shared data.
    pub shared: InstanceShared,
    // Instance Tx channels.
    pub tx: InstanceChannelsTx,
}

#[derive(Debug)]
pub struct InstanceState {
    // BGP identifier.
    pub identifier: Ipv4Addr,
    // BGP RIB.
    pub rib: Rib,
    // Sessions of other neighbors that lost a connection collision.
    pub pending_closes: Vec<SessionRef>,
}

// Resources provided by the user of the instance.
#[derive(Clone)]
pub struct InstanceShared {
    pub codecs: Arc<CodecRegistry>,
    pub peer_registry: Arc<PeerRegistry>,
    pub transport: Arc<dyn Transport>,
    pub sink: Arc<dyn RibSink>,
}

#[derive(Clone, Debug)]
pub struct InstanceChannelsTx {
    // TCP connect event.
    pub tcp_connect: Sender<TcpConnectMsg>,
    // TCP neighbor message.
    pub nbr_msg_rx: Sender<NbrRxMsg>,
    // Neighbor timeout event.
    pub nbr_timer: Sender<NbrTimerMsg>,
}

#[derive(Debug)]
pub struct InstanceChannelsRx {
    // User requests.
    pub request: Receiver<Request>,
    // TCP connect event.
    pub tcp_connect: Receiver<TcpConnectMsg>,
    // TCP neighbor message.
    pub nbr_msg_rx: Receiver<NbrRxMsg>,
    // Neighbor timeout event.
    pub nbr_timer: Receiver<NbrTimerMsg>,
}

pub struct InstanceUpView<'a> {
    pub config: &'a InstanceCfg,
    pub policies: &'a PolicyCfg,
    pub state: &'a mut InstanceState,
    pub shared: &'a InstanceShared,
    pub tx: &'a InstanceChannelsTx,
}

// Handle used to control a running instance.
#[derive(Clone, Debug)]
pub struct InstanceHandle {
    requestp: Sender<Request>,
}

// Requests served by the instance task.
#[derive(Debug)]
pub enum Request {
    NeighborStart {
        addr: IpAddr,
        config: NeighborCfg,
        responder: Responder<Result<(), Error>>,
    },
    NeighborStop {
        addr: IpAddr,
        responder: Responder<()>,
    },
    Accept(Connection),
    NexthopUpdate {
        addr: IpAddr,
        metric: Option<u32>,
    },
    NeighborState {
        addr: IpAddr,
        responder: Responder<Option<fsm::State>>,
    },
    LocRib {
        afi_safi: AfiSafi,
        responder: Responder<BTreeMap<Nlri, LocalRoute>>,
    },
    AdjRibIn {
        addr: IpAddr,
        afi_safi: AfiSafi,
        responder: Responder<BTreeMap<(Nlri, Option<u32>), AdjRibIn>>,
    },
    PeerReport {
        addr: IpAddr,
        responder: Responder<Option<PeerReport>>,
    },
    Shutdown(Responder<()>),
}

// ===== impl Instance =====

impl Instance {
    // Validates the configuration and starts the instance task.
    pub fn spawn(
        config: InstanceCfg,
        policies: PolicyCfg,
        shared: InstanceShared,
    ) -> Result<(InstanceHandle, Task<()>), Error> {
        config.validate().map_err(Error::InstanceStartError)?;
        let identifier = config
            .identifier
            .ok_or(ConfigError::MissingIdentifier)
            .map_err(Error::InstanceStartError)?;

        let (requestp, requestc) = mpsc::channel(16);
        let (tcp_connectp, tcp_connectc) = mpsc::channel(4);
        let (nbr_msg_rxp, nbr_msg_rxc) = mpsc::channel(4);
        let (nbr_timerp, nbr_timerc) = mpsc::channel(4);
        let tx = InstanceChannelsTx {
            tcp_connect: tcp_connectp,
            nbr_msg_rx: nbr_msg_rxp,
            nbr_timer: nbr_timerp,
        };
        let rx = InstanceChannelsRx {
            request: requestc,
            tcp_connect: tcp_connectc,
            nbr_msg_rx: nbr_msg_rxc,
            nbr_timer: nbr_timerc,
        };

        let span = debug_span!("bgp-instance", asn = config.asn);
        let instance = Instance {
            config,
            policies,
            state: InstanceState {
                identifier,
                rib: Default::default(),
                pending_closes: Default::default(),
            },
            neighbors: Default::default(),
            shared,
            tx,
        };
        let task = Task::spawn(instance.run(rx).instrument(span));

        Ok((InstanceHandle { requestp }, task))
    }

    // Instance event loop.
    async fn run(mut self, mut rx: InstanceChannelsRx) {
        Debug::InstanceStart.log();

        loop {
            tokio::select! {
                biased;
                Some(msg) = rx.tcp_connect.recv() => {
                    let (mut instance, neighbors) = self.as_up();
                    events::process_tcp_connect(&mut instance, neighbors, msg);
                }
                Some(msg) = rx.nbr_msg_rx.recv() => {
                    let (mut instance, neighbors) = self.as_up();
                    events::process_nbr_msg(&mut instance, neighbors, msg);
                }
                Some(msg) = rx.nbr_timer.recv() => {
                    let (mut instance, neighbors) = self.as_up();
                    events::process_nbr_timer(&mut instance, neighbors, msg);
                }
                request = rx.request.recv() => match request {
                    Some(Request::Shutdown(responder)) => {
                        self.stop();
                        let _ = responder.send(());
                        break;
                    }
                    Some(request) => self.process_request(request),
                    None => {
                        self.stop();
                        break;
                    }
                },
            }

            // Close sessions that lost a collision against a session of
            // another neighbor.
            self.process_pending_closes();

            // Run the BGP Decision Process.
            let (mut instance, neighbors) = self.as_up();
            events::decision_process(&mut instance, neighbors);
        }
    }

    // Stops all neighbors.
    fn stop(&mut self) {
        let (mut instance, neighbors) = self.as_up();

        let error_code = ErrorCode::Cease;
        let error_subcode = CeaseSubcode::AdministrativeShutdown;
        for nbr in neighbors.values_mut() {
            let msg = NotificationMsg::new(error_code, error_subcode);
            nbr.fsm_event(&mut instance, fsm::Event::Stop(Some(msg)));
        }
        events::decision_process(&mut instance, neighbors);

        Debug::InstanceStop.log();
    }

    fn process_request(&mut self, request: Request) {
        match request {
            Request::NeighborStart {
                addr,
                config,
                responder,
            } => {
                let result = self.neighbor_start(addr, config);
                if let Err(error) = &result {
                    error.log();
                }
                let _ = responder.send(result);
            }
            Request::NeighborStop { addr, responder } => {
                let (mut instance, neighbors) = self.as_up();
                if let Some(nbr) = neighbors.get_mut(&addr) {
                    let msg = NotificationMsg::new(
                        ErrorCode::Cease,
                        CeaseSubcode::AdministrativeShutdown,
                    );
                    nbr.fsm_event(&mut instance, fsm::Event::Stop(Some(msg)));
                }
                let _ = responder.send(());
            }
            Request::Accept(conn) => {
                let (mut instance, neighbors) = self.as_up();
                events::process_tcp_accept(&mut instance, neighbors, conn);
            }
            Request::NexthopUpdate { addr, metric } => {
                let (mut instance, _) = self.as_up();
                events::process_nht_update(&mut instance, addr, metric);
            }
            Request::NeighborState { addr, responder } => {
                let state = self.neighbors.get(&addr).map(|nbr| nbr.state);
                let _ = responder.send(state);
            }
            Request::LocRib {
                afi_safi,
                responder,
            } => {
                let routes = self
                    .state
                    .rib
                    .tables
                    .get(&afi_safi)
                    .into_iter()
                    .flat_map(|table| table.destinations.iter())
                    .filter_map(|(nlri, dest)| {
                        let local = dest.local.as_ref()?;
                        Some((nlri.clone(), local.as_ref().clone()))
                    })
                    .collect();
                let _ = responder.send(routes);
            }
            Request::AdjRibIn {
                addr,
                afi_safi,
                responder,
            } => {
                let routes = self
                    .state
                    .rib
                    .tables
                    .get(&afi_safi)
                    .into_iter()
                    .flat_map(|table| table.destinations.iter())
                    .flat_map(|(nlri, dest)| {
                        dest.adj_in
                            .range((addr, None)..=(addr, Some(u32::MAX)))
                            .map(|((_, path_id), adj_rib)| {
                                ((nlri.clone(), *path_id), adj_rib.clone())
                            })
                    })
                    .collect();
                let _ = responder.send(routes);
            }
            Request::PeerReport { addr, responder } => {
                let report = self
                    .neighbors
                    .get(&addr)
                    .map(|nbr| peer_report(nbr, &self.state.rib));
                let _ = responder.send(report);
            }
            Request::Shutdown(_) => unreachable!(),
        }
    }

    // Creates the neighbor if it doesn't exist yet, and starts it.
    fn neighbor_start(
        &mut self,
        addr: IpAddr,
        config: NeighborCfg,
    ) -> Result<(), Error> {
        config
            .validate(&self.policies)
            .map_err(|error| Error::NbrConfigError(addr, error))?;

        let (mut instance, neighbors) = self.as_up();
        let asn = instance.config.asn;
        let nbr = neighbors
            .entry(addr)
            .or_insert_with(|| Neighbor::new(addr, config.clone(), asn));

        // Reset the neighbor so that the new settings take effect.
        if nbr.config != config {
            let msg = NotificationMsg::new(
                ErrorCode::Cease,
                CeaseSubcode::AdministrativeReset,
            );
            nbr.fsm_event(&mut instance, fsm::Event::Stop(Some(msg)));
            nbr.reset(config, asn);
        }

        nbr.fsm_event(&mut instance, fsm::Event::Start);
        Ok(())
    }

    fn process_pending_closes(&mut self) {
        let (mut instance, neighbors) = self.as_up();
        for sref in std::mem::take(&mut instance.state.pending_closes) {
            let Some(nbr) = neighbors.get_mut(&sref.nbr_addr) else {
                continue;
            };

            // Ownership already moved to the winning session.
            if let Some(session) = nbr.sessions.get_mut(&sref.conn_id) {
                session.registered = false;
            }

            let msg = NotificationMsg::new(
                ErrorCode::Cease,
                CeaseSubcode::ConnectionCollisionResolution,
            );
            let event = fsm::Event::Stop(Some(msg));
            nbr.session_fsm_event(&mut instance, sref.conn_id, event);
        }
    }

    // Returns a view struct for the instance.
    pub(crate) fn as_up(&mut self) -> (InstanceUpView<'_>, &mut Neighbors) {
        let instance = InstanceUpView {
            config: &self.config,
            policies: &self.policies,
            state: &mut self.state,
            shared: &self.shared,
            tx: &self.tx,
        };
        (instance, &mut self.neighbors)
    }
}

// ===== impl InstanceShared =====

impl InstanceShared {
    pub fn new(transport: Arc<dyn Transport>, sink: Arc<dyn RibSink>) -> Self {
        InstanceShared {
            codecs: Arc::new(CodecRegistry::with_defaults()),
            peer_registry: Default::default(),
            transport,
            sink,
        }
    }
}

impl std::fmt::Debug for InstanceShared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceShared")
            .field("peer_registry", &self.peer_registry)
            .finish_non_exhaustive()
    }
}

// ===== impl InstanceHandle =====

impl InstanceHandle {
    // Creates the neighbor (or updates its configuration) and starts it.
    pub async fn neighbor_start(
        &self,
        addr: IpAddr,
        config: NeighborCfg,
    ) -> Result<(), Error> {
        let (responder, response) = oneshot::channel();
        self.request(Request::NeighborStart {
            addr,
            config,
            responder,
        })
        .await?;
        response.await.map_err(|_| Error::InstanceClosed)?
    }

    // Stops the neighbor, sending a Cease NOTIFICATION on its sessions.
    pub async fn neighbor_stop(&self, addr: IpAddr) -> Result<(), Error> {
        let (responder, response) = oneshot::channel();
        self.request(Request::NeighborStop { addr, responder })
            .await?;
        response.await.map_err(|_| Error::InstanceClosed)
    }

    // Hands over an inbound connection.
    pub async fn accept(&self, conn: Connection) -> Result<(), Error> {
        self.request(Request::Accept(conn)).await
    }

    // Updates the IGP metric of a next hop. `None` means unreachable.
    pub async fn nexthop_update(
        &self,
        addr: IpAddr,
        metric: Option<u32>,
    ) -> Result<(), Error> {
        self.request(Request::NexthopUpdate { addr, metric }).await
    }

    pub async fn neighbor_state(
        &self,
        addr: IpAddr,
    ) -> Result<Option<fsm::State>, Error> {
        let (responder, response) = oneshot::channel();
        self.request(Request::NeighborState { addr, responder })
            .await?;
        response.await.map_err(|_| Error::InstanceClosed)
    }

    pub async fn loc_rib(
        &self,
        afi_safi: AfiSafi,
    ) -> Result<BTreeMap<Nlri, LocalRoute>, Error> {
        let (responder, response) = oneshot::channel();
        self.request(Request::LocRib {
            afi_safi,
            responder,
        })
        .await?;
        response.await.map_err(|_| Error::InstanceClosed)
    }

    pub async fn adj_rib_in(
        &self,
        addr: IpAddr,
        afi_safi: AfiSafi,
    ) -> Result<BTreeMap<(Nlri, Option<u32>), AdjRibIn>, Error> {
        let (responder, response) = oneshot::channel();
        self.request(Request::AdjRibIn {
            addr,
            afi_safi,
            responder,
        })
        .await?;
        response.await.map_err(|_| Error::InstanceClosed)
    }

    pub async fn peer_report(
        &self,
        addr: IpAddr,
    ) -> Result<Option<PeerReport>, Error> {
        let (responder, response) = oneshot::channel();
        self.request(Request::PeerReport { addr, responder }).await?;
        response.await.map_err(|_| Error::InstanceClosed)
    }

    // Stops all neighbors and terminates the instance task.
    pub async fn shutdown(&self) -> Result<(), Error> {
        let (responder, response) = oneshot::channel();
        self.request(Request::Shutdown(responder)).await?;
        response.await.map_err(|_| Error::InstanceClosed)
    }

    async fn request(&self, request: Request) -> Result<(), Error> {
        self.requestp
            .send(request)
            .await
            .map_err(|_| Error::InstanceClosed)
    }
}

// ===== helper functions =====

// Builds the statistics report of a neighbor.
fn peer_report(nbr: &Neighbor, rib: &Rib) -> PeerReport {
    let addr = nbr.remote_addr;
    let statistics = &nbr.statistics;
    let mut stats = vec![
        StatTlv::RejectedPrefixes(statistics.rejected_prefixes),
        StatTlv::InvalidatedClusterListLoop(
            statistics.invalidated.cluster_loop,
        ),
        StatTlv::InvalidatedAsPathLoop(statistics.invalidated.as_loop),
        StatTlv::InvalidatedOriginatorId(statistics.invalidated.originator),
        StatTlv::InvalidatedAsConfedLoop(statistics.invalidated.confed),
    ];

    // Route gauges, total and per address family.
    let mut adj_rib_in_total = 0;
    let mut loc_rib_total = 0;
    let mut per_afi_safi = vec![];
    for (afi_safi, table) in &rib.tables {
        let mut adj_rib_in = 0;
        let mut loc_rib = 0;
        for dest in table.destinations.values() {
            adj_rib_in += dest
                .adj_in
                .range((addr, None)..=(addr, Some(u32::MAX)))
                .filter(|(_, adj_rib)| adj_rib.post.is_some())
                .count() as u64;
            if dest
                .local
                .as_ref()
                .is_some_and(|route| route.origin.remote_addr == addr)
            {
                loc_rib += 1;
            }
        }
        adj_rib_in_total += adj_rib_in;
        loc_rib_total += loc_rib;
        if nbr.config.afi_safi.contains(afi_safi) {
            per_afi_safi.push(StatTlv::PerAfiSafiAdjRibIn {
                afi_safi: *afi_safi,
                routes: adj_rib_in,
            });
            per_afi_safi.push(StatTlv::PerAfiSafiLocRib {
                afi_safi: *afi_safi,
                routes: loc_rib,
            });
        }
    }
    stats.push(StatTlv::AdjRibInRoutes(adj_rib_in_total));
    stats.push(StatTlv::LocRibRoutes(loc_rib_total));
    stats.extend(per_afi_safi);

    PeerReport {
        info: vec![InfoTlv::Name(addr.to_string())],
        stats,
    }
}
