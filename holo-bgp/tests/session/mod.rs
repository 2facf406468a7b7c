//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod collision;
mod establish;
mod policy;
mod reconnect;

use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use holo_bgp::config::{InstanceCfg, NeighborCfg, PolicyCfg};
use holo_bgp::instance::{Instance, InstanceHandle, InstanceShared};
use holo_bgp::neighbor::{PeerType, fsm};
use holo_bgp::network::{ConnInfo, Connection, Transport};
use holo_bgp::packet::attribute::{AsPath, AsPathSegment, Attrs, BaseAttrs};
use holo_bgp::packet::consts::{
    AS_TRANS, Afi, AfiSafi, AsPathSegmentType, BGP_VERSION, ErrorCode,
    GrFlags, Origin, Safi,
};
use holo_bgp::packet::message::{
    Capability, DecodeCxt, EncodeCxt, GrTuple, KeepaliveMsg, Message,
    NegotiatedCapability, OpenMsg, ReachNlri, UnreachNlri, UpdateMsg,
};
use holo_bgp::packet::nlri::{Nlri, NlriEntry};
use holo_bgp::registry::CodecRegistry;
use holo_bgp::rib::RibSink;
use holo_utils::task::Task;
use ipnetwork::Ipv4Network;
use tokio::io::{
    AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf,
};

pub const LOCAL_ASN: u32 = 65000;
pub const LOCAL_ID: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);
pub const LOCAL_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);

// Transport handing out preconfigured in-memory connections. Connection
// attempts fail once the queue is empty.
#[derive(Default)]
pub struct MockTransport {
    conns: Mutex<VecDeque<Connection>>,
    attempts: AtomicU32,
}

// Calls received by the RIB sink.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SinkEvent {
    Put(AfiSafi, Nlri, Attrs),
    Delete(AfiSafi, Nlri),
}

#[derive(Debug, Default)]
pub struct MockSink {
    events: Mutex<Vec<SinkEvent>>,
}

// Instance under test.
pub struct TestInstance {
    pub handle: InstanceHandle,
    pub transport: Arc<MockTransport>,
    pub sink: Arc<MockSink>,
    _task: Task<()>,
}

// Remote BGP speaker, driven by the test over an in-memory stream.
pub struct Peer {
    read_half: ReadHalf<DuplexStream>,
    write_half: WriteHalf<DuplexStream>,
    encode_cxt: EncodeCxt,
    decode_cxt: DecodeCxt,
}

// ===== impl MockTransport =====

impl MockTransport {
    pub fn push(&self, conn: Connection) {
        self.conns.lock().unwrap().push_back(conn);
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, _remote_addr: IpAddr) -> io::Result<Connection> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.conns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
    }
}

// ===== impl MockSink =====

impl MockSink {
    pub fn take(&self) -> Vec<SinkEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }
}

impl RibSink for MockSink {
    fn put_routes(&self, table: AfiSafi, destination: &Nlri, attrs: &Attrs) {
        let event = SinkEvent::Put(table, destination.clone(), attrs.clone());
        self.events.lock().unwrap().push(event);
    }

    fn delete_routes(&self, table: AfiSafi, destination: &Nlri) {
        let event = SinkEvent::Delete(table, destination.clone());
        self.events.lock().unwrap().push(event);
    }
}

// ===== impl TestInstance =====

impl TestInstance {
    pub fn new(policies: PolicyCfg) -> TestInstance {
        holo_utils::testing::setup();

        let config = InstanceCfg {
            asn: LOCAL_ASN,
            identifier: Some(LOCAL_ID),
            ..Default::default()
        };
        let transport = Arc::new(MockTransport::default());
        let sink = Arc::new(MockSink::default());
        let shared = InstanceShared::new(transport.clone(), sink.clone());
        let (handle, task) = Instance::spawn(config, policies, shared)
            .expect("valid instance configuration");
        TestInstance {
            handle,
            transport,
            sink,
            _task: task,
        }
    }

    // Starts a passive neighbor and hands over an inbound connection for it.
    pub async fn passive_peer(
        &self,
        addr: Ipv4Addr,
        config: NeighborCfg,
    ) -> Peer {
        let peer_type = if config.peer_as == LOCAL_ASN {
            PeerType::Internal
        } else {
            PeerType::External
        };
        let config = NeighborCfg {
            passive: true,
            ..config
        };
        self.handle
            .neighbor_start(addr.into(), config)
            .await
            .unwrap();
        self.inbound(addr, peer_type).await
    }

    // Opens a connection from the given peer address to the instance.
    pub async fn inbound(&self, addr: Ipv4Addr, peer_type: PeerType) -> Peer {
        let (conn, peer) = connection(addr, peer_type);
        self.handle.accept(conn).await.unwrap();
        peer
    }

    // Polls the neighbor state until it matches the expected one.
    pub async fn wait_state(&self, addr: Ipv4Addr, state: fsm::State) {
        for _ in 0..500 {
            let current =
                self.handle.neighbor_state(addr.into()).await.unwrap();
            if current == Some(state) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("neighbor {addr} didn't reach the {state:?} state");
    }

    // Polls the RIB sink until it received the expected number of calls.
    pub async fn wait_sink(&self, count: usize) -> Vec<SinkEvent> {
        let mut events = vec![];
        for _ in 0..100 {
            events.extend(self.sink.take());
            if events.len() >= count {
                return events;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} RIB sink calls, got {events:?}");
    }
}

// ===== impl Peer =====

impl Peer {
    fn new(stream: DuplexStream, peer_type: PeerType) -> Peer {
        let (read_half, write_half) = tokio::io::split(stream);
        let capabilities = [
            NegotiatedCapability::MultiProtocol {
                afi: Afi::Ipv4,
                safi: Safi::Unicast,
            },
            NegotiatedCapability::FourOctetAsNumber,
        ];
        let registry = Arc::new(CodecRegistry::with_defaults());
        Peer {
            read_half,
            write_half,
            encode_cxt: EncodeCxt {
                capabilities: capabilities.clone().into(),
                registry: registry.clone(),
            },
            decode_cxt: DecodeCxt {
                peer_type,
                peer_as: LOCAL_ASN,
                capabilities: capabilities.into(),
                registry,
            },
        }
    }

    pub async fn send(&mut self, msg: Message) {
        let buf = msg.encode(&self.encode_cxt);
        self.write_half.write_all(&buf).await.unwrap();
    }

    // Sends a pre-encoded message, for inputs the encoder can't produce.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.write_half.write_all(bytes).await.unwrap();
    }

    // Returns the next message sent by the instance, or `None` once the
    // connection is closed.
    pub async fn recv(&mut self) -> Option<Message> {
        let hdr_len = Message::MIN_LEN as usize;
        let mut buf = vec![0; hdr_len];
        if self.read_half.read_exact(&mut buf).await.is_err() {
            return None;
        }
        let len = u16::from_be_bytes([buf[16], buf[17]]) as usize;
        buf.resize(len, 0);
        self.read_half
            .read_exact(&mut buf[hdr_len..])
            .await
            .unwrap();
        Some(Message::decode(&buf, &self.decode_cxt).unwrap())
    }

    // Same as `recv`, skipping periodic KEEPALIVE messages.
    pub async fn recv_skip_keepalive(&mut self) -> Option<Message> {
        loop {
            match self.recv().await {
                Some(Message::Keepalive(_)) => continue,
                msg => return msg,
            }
        }
    }

    // Runs the OPEN exchange, returning the instance's OPEN message.
    pub async fn establish(&mut self, open: OpenMsg) -> OpenMsg {
        let Some(Message::Open(local_open)) = self.recv().await else {
            panic!("expected OPEN message");
        };
        self.send(Message::Open(open)).await;
        self.send(Message::Keepalive(KeepaliveMsg {})).await;
        let Some(Message::Keepalive(_)) = self.recv().await else {
            panic!("expected KEEPALIVE message");
        };
        local_open
    }

    pub async fn expect_notification(
        &mut self,
        error_code: ErrorCode,
        error_subcode: u8,
    ) {
        match self.recv_skip_keepalive().await {
            Some(Message::Notification(msg)) => {
                assert_eq!(msg.error_code, error_code as u8);
                assert_eq!(msg.error_subcode, error_subcode);
            }
            msg => panic!("expected NOTIFICATION message, got {msg:?}"),
        }
    }

    // Same as `establish`, also consuming the initial End-of-RIB marker.
    pub async fn establish_eor(&mut self, open: OpenMsg) -> OpenMsg {
        let local_open = self.establish(open).await;
        let msg = self.recv_skip_keepalive().await;
        assert_eq!(msg, Some(Message::Update(UpdateMsg::default())));
        local_open
    }
}

// ===== global functions =====

// Creates a connection pair: the instance end and the remote speaker end.
pub fn connection(addr: Ipv4Addr, peer_type: PeerType) -> (Connection, Peer) {
    let (local, remote) = tokio::io::duplex(65536);
    let (read_half, write_half) = tokio::io::split(local);
    let conn_info = ConnInfo {
        local_addr: LOCAL_ADDR.into(),
        local_port: 179,
        remote_addr: addr.into(),
        remote_port: 50000,
    };
    let conn = Connection::new(conn_info, read_half, write_half);
    (conn, Peer::new(remote, peer_type))
}

pub fn neighbor(peer_as: u32) -> NeighborCfg {
    NeighborCfg {
        peer_as,
        ..Default::default()
    }
}

// OPEN message of a remote speaker supporting IPv4 unicast.
pub fn open(asn: u32, identifier: Ipv4Addr, holdtime: u16) -> OpenMsg {
    OpenMsg {
        version: BGP_VERSION,
        my_as: asn.try_into().unwrap_or(AS_TRANS),
        holdtime,
        identifier,
        capabilities: [
            Capability::MultiProtocol {
                afi: Afi::Ipv4,
                safi: Safi::Unicast,
            },
            Capability::FourOctetAsNumber { asn },
            Capability::RouteRefresh,
        ]
        .into(),
    }
}

// Adds the graceful restart capability to an OPEN message.
pub fn with_graceful_restart(
    mut open: OpenMsg,
    restart_time: u16,
) -> OpenMsg {
    open.capabilities.insert(Capability::GracefulRestart {
        flags: GrFlags::empty(),
        restart_time,
        afi_safis: [GrTuple {
            afi: Afi::Ipv4,
            safi: Safi::Unicast,
            forwarding: true,
        }]
        .into(),
    });
    open
}

pub fn as_path(asns: &[u32]) -> AsPath {
    if asns.is_empty() {
        return AsPath::default();
    }
    AsPath {
        segments: [AsPathSegment {
            seg_type: AsPathSegmentType::Sequence,
            members: asns.iter().copied().collect(),
        }]
        .into(),
    }
}

pub fn attrs(as_path: AsPath, nexthop: Option<IpAddr>) -> Attrs {
    Attrs {
        base: BaseAttrs {
            origin: Origin::Igp,
            as_path,
            as4_path: None,
            nexthop,
            ll_nexthop: None,
            med: None,
            local_pref: None,
            aggregator: None,
            as4_aggregator: None,
            atomic_aggregate: false,
            originator_id: None,
            cluster_list: None,
        },
        comm: None,
        ext_comm: None,
        extv6_comm: None,
        large_comm: None,
        link_state: None,
        unknown: vec![],
    }
}

// UPDATE message announcing IPv4 prefixes.
pub fn update(
    prefixes: &[Ipv4Network],
    path: &[u32],
    nexthop: Ipv4Addr,
) -> Message {
    Message::Update(UpdateMsg {
        reach: Some(ReachNlri {
            nlri: prefixes
                .iter()
                .map(|prefix| NlriEntry::new(Nlri::Ipv4Unicast(*prefix)))
                .collect(),
            nexthop,
        }),
        attrs: Some(attrs(as_path(path), None)),
        ..Default::default()
    })
}

// UPDATE message withdrawing IPv4 prefixes.
pub fn withdraw(prefixes: &[Ipv4Network]) -> Message {
    Message::Update(UpdateMsg {
        unreach: Some(UnreachNlri {
            nlri: prefixes
                .iter()
                .map(|prefix| NlriEntry::new(Nlri::Ipv4Unicast(*prefix)))
                .collect(),
        }),
        ..Default::default()
    })
}
