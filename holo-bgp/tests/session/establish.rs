//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use const_addrs::{ip4, net4};
use holo_bgp::config::{GracefulRestartCfg, NeighborCfg};
use holo_bgp::error::Error;
use holo_bgp::neighbor::{PeerType, fsm};
use holo_bgp::packet::consts::{
    AfiSafi, CeaseSubcode, ErrorCode, OpenMessageErrorSubcode,
};
use holo_bgp::packet::message::{Capability, Message, UpdateMsg};
use holo_bgp::packet::nlri::Nlri;
use holo_bgp::packet::tlv::{InfoTlv, StatTlv};

use super::{
    LOCAL_ASN, LOCAL_ID, SinkEvent, TestInstance, as_path, attrs, neighbor,
    open, update, with_graceful_restart, withdraw,
};

const PEER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const PEER_ID: Ipv4Addr = Ipv4Addr::new(2, 2, 2, 2);
const PEER_ASN: u32 = 65001;

fn graceful_restart_neighbor() -> NeighborCfg {
    NeighborCfg {
        graceful_restart: GracefulRestartCfg {
            enabled: true,
            ..Default::default()
        },
        ..neighbor(PEER_ASN)
    }
}

#[tokio::test(start_paused = true)]
async fn establish_and_learn_route() {
    let inst = TestInstance::new(Default::default());
    let mut peer = inst.passive_peer(PEER_ADDR, neighbor(PEER_ASN)).await;

    let local_open = peer.establish_eor(open(PEER_ASN, PEER_ID, 90)).await;
    assert_eq!(local_open.real_as(), LOCAL_ASN);
    assert_eq!(local_open.holdtime, 90);
    assert_eq!(local_open.identifier, LOCAL_ID);
    assert!(local_open.capabilities.contains(&Capability::RouteRefresh));
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;

    // Announce a route.
    let prefix = net4!("10.0.0.0/24");
    let nexthop = ip4!("192.0.2.1");
    peer.send(update(&[prefix], &[PEER_ASN], nexthop)).await;
    let route_attrs = attrs(as_path(&[PEER_ASN]), Some(nexthop.into()));
    assert_eq!(
        inst.wait_sink(1).await,
        vec![SinkEvent::Put(
            AfiSafi::Ipv4Unicast,
            Nlri::Ipv4Unicast(prefix),
            route_attrs.clone()
        )]
    );

    // Check the Loc-RIB and the peer statistics.
    let loc_rib = inst.handle.loc_rib(AfiSafi::Ipv4Unicast).await.unwrap();
    let route = loc_rib.get(&Nlri::Ipv4Unicast(prefix)).unwrap();
    assert_eq!(route.attrs.value, route_attrs);
    assert_eq!(route.origin.identifier, PEER_ID);
    assert_eq!(route.origin.remote_addr, IpAddr::from(PEER_ADDR));

    let report = inst
        .handle
        .peer_report(PEER_ADDR.into())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.info, vec![InfoTlv::Name("10.0.0.2".to_owned())]);
    assert!(report.stats.contains(&StatTlv::AdjRibInRoutes(1)));
    assert!(report.stats.contains(&StatTlv::LocRibRoutes(1)));
    assert!(report.stats.contains(&StatTlv::RejectedPrefixes(0)));
    assert!(report.stats.contains(&StatTlv::PerAfiSafiAdjRibIn {
        afi_safi: AfiSafi::Ipv4Unicast,
        routes: 1,
    }));

    // Withdraw it.
    peer.send(withdraw(&[prefix])).await;
    assert_eq!(
        inst.wait_sink(1).await,
        vec![SinkEvent::Delete(
            AfiSafi::Ipv4Unicast,
            Nlri::Ipv4Unicast(prefix)
        )]
    );
    let loc_rib = inst.handle.loc_rib(AfiSafi::Ipv4Unicast).await.unwrap();
    assert!(loc_rib.is_empty());
}

#[tokio::test(start_paused = true)]
async fn missing_nexthop_withdraws_route() {
    let inst = TestInstance::new(Default::default());
    let mut peer = inst.passive_peer(PEER_ADDR, neighbor(PEER_ASN)).await;
    peer.establish_eor(open(PEER_ASN, PEER_ID, 90)).await;
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;

    let prefix = net4!("10.0.0.0/24");
    peer.send(update(&[prefix], &[PEER_ASN], ip4!("192.0.2.1"))).await;
    assert_eq!(inst.wait_sink(1).await.len(), 1);

    // Same prefix with ORIGIN and AS_PATH [65001] but no NEXT_HOP.
    peer.send_raw(&[
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0x00, 0x28, 0x02, 0x00, 0x00, 0x00, 0x0d, 0x40,
        0x01, 0x01, 0x00, 0x40, 0x02, 0x06, 0x02, 0x01, 0x00, 0x00, 0xfd, 0xe9,
        0x18, 0x0a, 0x00, 0x00,
    ])
    .await;
    assert_eq!(
        inst.wait_sink(1).await,
        vec![SinkEvent::Delete(
            AfiSafi::Ipv4Unicast,
            Nlri::Ipv4Unicast(prefix)
        )]
    );
    let loc_rib = inst.handle.loc_rib(AfiSafi::Ipv4Unicast).await.unwrap();
    assert!(loc_rib.is_empty());
    assert_eq!(
        inst.handle.neighbor_state(PEER_ADDR.into()).await.unwrap(),
        Some(fsm::State::Established)
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_neighbor_connection_dropped() {
    let inst = TestInstance::new(Default::default());
    let mut peer = inst.inbound(PEER_ADDR, PeerType::External).await;
    assert_eq!(peer.recv().await, None);
    assert_eq!(
        inst.handle.neighbor_state(PEER_ADDR.into()).await.unwrap(),
        None
    );
}

#[tokio::test(start_paused = true)]
async fn hold_timer_expiry() {
    let inst = TestInstance::new(Default::default());
    let mut peer = inst.passive_peer(PEER_ADDR, neighbor(PEER_ASN)).await;
    peer.establish_eor(open(PEER_ASN, PEER_ID, 90)).await;
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;

    let prefix = net4!("10.0.0.0/24");
    peer.send(update(&[prefix], &[PEER_ASN], ip4!("192.0.2.1"))).await;
    inst.wait_sink(1).await;

    // The peer goes silent. The periodic KEEPALIVE messages keep flowing
    // until the hold timer expires.
    peer.expect_notification(ErrorCode::HoldTimerExpired, 0).await;
    assert_eq!(peer.recv().await, None);
    assert_eq!(
        inst.wait_sink(1).await,
        vec![SinkEvent::Delete(
            AfiSafi::Ipv4Unicast,
            Nlri::Ipv4Unicast(prefix)
        )]
    );
    let state = inst.handle.neighbor_state(PEER_ADDR.into()).await.unwrap();
    assert_ne!(state, Some(fsm::State::Established));

    // A passive neighbor waits for the next inbound connection.
    inst.wait_state(PEER_ADDR, fsm::State::Active).await;
}

#[tokio::test(start_paused = true)]
async fn graceful_restart_stale_routes_refreshed() {
    let inst = TestInstance::new(Default::default());
    let config = graceful_restart_neighbor();
    let mut peer = inst.passive_peer(PEER_ADDR, config).await;
    let peer_open = with_graceful_restart(open(PEER_ASN, PEER_ID, 90), 120);
    let local_open = peer.establish_eor(peer_open).await;
    assert!(
        local_open
            .capabilities
            .iter()
            .any(|cap| cap.as_graceful_restart().is_some())
    );
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;

    let prefix = net4!("10.0.0.0/24");
    let nexthop = ip4!("192.0.2.1");
    peer.send(update(&[prefix], &[PEER_ASN], nexthop)).await;
    inst.wait_sink(1).await;

    // The peer restarts: its routes are kept as stale.
    drop(peer);
    inst.wait_state(PEER_ADDR, fsm::State::Active).await;
    assert!(inst.sink.is_empty());
    let loc_rib = inst.handle.loc_rib(AfiSafi::Ipv4Unicast).await.unwrap();
    assert!(loc_rib.contains_key(&Nlri::Ipv4Unicast(prefix)));

    // The new session refreshes the route and ends with an End-of-RIB. No
    // hold time this time around, so the session stays up while idle.
    let peer_open = with_graceful_restart(open(PEER_ASN, PEER_ID, 0), 120);
    let mut peer = inst.inbound(PEER_ADDR, PeerType::External).await;
    peer.establish_eor(peer_open).await;
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;
    peer.send(update(&[prefix], &[PEER_ASN], nexthop)).await;
    peer.send(Message::Update(UpdateMsg::default())).await;

    // Past the restart time, nothing changed.
    tokio::time::sleep(Duration::from_secs(121)).await;
    assert!(inst.sink.is_empty());
    let loc_rib = inst.handle.loc_rib(AfiSafi::Ipv4Unicast).await.unwrap();
    assert!(loc_rib.contains_key(&Nlri::Ipv4Unicast(prefix)));
}

#[tokio::test(start_paused = true)]
async fn graceful_restart_timer_expiry() {
    let inst = TestInstance::new(Default::default());
    let config = graceful_restart_neighbor();
    let mut peer = inst.passive_peer(PEER_ADDR, config).await;
    let peer_open = with_graceful_restart(open(PEER_ASN, PEER_ID, 90), 120);
    peer.establish_eor(peer_open).await;
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;

    let prefix = net4!("10.0.0.0/24");
    peer.send(update(&[prefix], &[PEER_ASN], ip4!("192.0.2.1"))).await;
    inst.wait_sink(1).await;

    drop(peer);
    inst.wait_state(PEER_ADDR, fsm::State::Active).await;
    assert!(inst.sink.is_empty());

    // The peer never comes back.
    tokio::time::sleep(Duration::from_secs(121)).await;
    assert_eq!(
        inst.wait_sink(1).await,
        vec![SinkEvent::Delete(
            AfiSafi::Ipv4Unicast,
            Nlri::Ipv4Unicast(prefix)
        )]
    );
}

#[tokio::test(start_paused = true)]
async fn bad_peer_as() {
    let inst = TestInstance::new(Default::default());
    let mut peer = inst.passive_peer(PEER_ADDR, neighbor(PEER_ASN)).await;

    let Some(Message::Open(_)) = peer.recv().await else {
        panic!("expected OPEN message");
    };
    peer.send(Message::Open(open(65099, PEER_ID, 90))).await;
    peer.expect_notification(
        ErrorCode::OpenMessageError,
        OpenMessageErrorSubcode::BadPeerAs as u8,
    )
    .await;
    assert_eq!(peer.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn internal_peer_same_identifier() {
    let inst = TestInstance::new(Default::default());
    let mut peer = inst.passive_peer(PEER_ADDR, neighbor(LOCAL_ASN)).await;

    let Some(Message::Open(_)) = peer.recv().await else {
        panic!("expected OPEN message");
    };
    peer.send(Message::Open(open(LOCAL_ASN, LOCAL_ID, 90))).await;
    peer.expect_notification(
        ErrorCode::OpenMessageError,
        OpenMessageErrorSubcode::BadBgpIdentifier as u8,
    )
    .await;
}

#[tokio::test(start_paused = true)]
async fn neighbor_stop() {
    let inst = TestInstance::new(Default::default());
    let mut peer = inst.passive_peer(PEER_ADDR, neighbor(PEER_ASN)).await;
    peer.establish_eor(open(PEER_ASN, PEER_ID, 90)).await;
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;

    let prefix = net4!("10.0.0.0/24");
    peer.send(update(&[prefix], &[PEER_ASN], ip4!("192.0.2.1"))).await;
    inst.wait_sink(1).await;

    inst.handle.neighbor_stop(PEER_ADDR.into()).await.unwrap();
    peer.expect_notification(
        ErrorCode::Cease,
        CeaseSubcode::AdministrativeShutdown as u8,
    )
    .await;
    assert_eq!(
        inst.wait_sink(1).await,
        vec![SinkEvent::Delete(
            AfiSafi::Ipv4Unicast,
            Nlri::Ipv4Unicast(prefix)
        )]
    );

    // The neighbor stays down.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(
        inst.handle.neighbor_state(PEER_ADDR.into()).await.unwrap(),
        Some(fsm::State::Idle)
    );
}

#[tokio::test(start_paused = true)]
async fn neighbor_config_change() {
    let inst = TestInstance::new(Default::default());
    let mut peer = inst.passive_peer(PEER_ADDR, neighbor(PEER_ASN)).await;
    peer.establish_eor(open(PEER_ASN, PEER_ID, 90)).await;
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;

    let config = NeighborCfg {
        passive: true,
        holdtime: Some(30),
        ..neighbor(PEER_ASN)
    };
    inst.handle
        .neighbor_start(PEER_ADDR.into(), config)
        .await
        .unwrap();
    peer.expect_notification(
        ErrorCode::Cease,
        CeaseSubcode::AdministrativeReset as u8,
    )
    .await;

    // The new configuration applies to the next session.
    inst.wait_state(PEER_ADDR, fsm::State::Active).await;
    let mut peer = inst.inbound(PEER_ADDR, PeerType::External).await;
    let local_open = peer.establish_eor(open(PEER_ASN, PEER_ID, 90)).await;
    assert_eq!(local_open.holdtime, 30);
}

#[tokio::test(start_paused = true)]
async fn neighbor_invalid_config() {
    let inst = TestInstance::new(Default::default());
    let config = NeighborCfg {
        import_policy: Some("missing".to_owned()),
        ..neighbor(PEER_ASN)
    };
    let result = inst.handle.neighbor_start(PEER_ADDR.into(), config).await;
    assert!(matches!(result, Err(Error::NbrConfigError(..))));
    assert_eq!(
        inst.handle.neighbor_state(PEER_ADDR.into()).await.unwrap(),
        None
    );
}

#[tokio::test(start_paused = true)]
async fn instance_shutdown() {
    let inst = TestInstance::new(Default::default());
    let mut peer = inst.passive_peer(PEER_ADDR, neighbor(PEER_ASN)).await;
    peer.establish_eor(open(PEER_ASN, PEER_ID, 90)).await;
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;

    inst.handle.shutdown().await.unwrap();
    peer.expect_notification(
        ErrorCode::Cease,
        CeaseSubcode::AdministrativeShutdown as u8,
    )
    .await;
    assert_eq!(peer.recv().await, None);

    let result = inst.handle.neighbor_state(PEER_ADDR.into()).await;
    assert!(matches!(result, Err(Error::InstanceClosed)));
}
