//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;

use holo_bgp::neighbor::{PeerType, fsm};
use holo_bgp::packet::consts::{CeaseSubcode, ErrorCode};
use holo_bgp::packet::message::{KeepaliveMsg, Message, UpdateMsg};

use super::{Peer, TestInstance, connection, neighbor, open};

const PEER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const PEER_ID: Ipv4Addr = Ipv4Addr::new(2, 2, 2, 2);
const PEER_ASN: u32 = 65001;

// Starts an active neighbor whose first connection attempt succeeds, and
// hands over an inbound connection from the same peer. Returns the remote
// ends of the outbound and inbound connections, both with the local OPEN
// already consumed.
async fn colliding_sessions(inst: &TestInstance) -> (Peer, Peer) {
    let (conn, mut outbound) = connection(PEER_ADDR, PeerType::External);
    inst.transport.push(conn);
    inst.handle
        .neighbor_start(PEER_ADDR.into(), neighbor(PEER_ASN))
        .await
        .unwrap();
    let Some(Message::Open(_)) = outbound.recv().await else {
        panic!("expected OPEN message on the outbound session");
    };

    let mut inbound = inst.inbound(PEER_ADDR, PeerType::External).await;
    let Some(Message::Open(_)) = inbound.recv().await else {
        panic!("expected OPEN message on the inbound session");
    };
    assert_eq!(inst.transport.attempts(), 1);

    (outbound, inbound)
}

// The remote identifier is higher than the local one, so the session it
// initiated is the one kept.
#[tokio::test(start_paused = true)]
async fn collision_outbound_open_first() {
    let inst = TestInstance::new(Default::default());
    let (mut outbound, mut inbound) = colliding_sessions(&inst).await;

    outbound
        .send(Message::Open(open(PEER_ASN, PEER_ID, 90)))
        .await;
    let Some(Message::Keepalive(_)) = outbound.recv().await else {
        panic!("expected KEEPALIVE message");
    };
    inst.wait_state(PEER_ADDR, fsm::State::OpenConfirm).await;

    inbound.send(Message::Open(open(PEER_ASN, PEER_ID, 90))).await;
    outbound
        .expect_notification(
            ErrorCode::Cease,
            CeaseSubcode::ConnectionCollisionResolution as u8,
        )
        .await;
    assert_eq!(outbound.recv().await, None);

    inbound.send(Message::Keepalive(KeepaliveMsg {})).await;
    let Some(Message::Keepalive(_)) = inbound.recv().await else {
        panic!("expected KEEPALIVE message");
    };
    assert_eq!(
        inbound.recv_skip_keepalive().await,
        Some(Message::Update(UpdateMsg::default()))
    );
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;
}

#[tokio::test(start_paused = true)]
async fn collision_inbound_open_first() {
    let inst = TestInstance::new(Default::default());
    let (mut outbound, mut inbound) = colliding_sessions(&inst).await;

    inbound.send(Message::Open(open(PEER_ASN, PEER_ID, 90))).await;
    let Some(Message::Keepalive(_)) = inbound.recv().await else {
        panic!("expected KEEPALIVE message");
    };

    outbound
        .send(Message::Open(open(PEER_ASN, PEER_ID, 90)))
        .await;
    outbound
        .expect_notification(
            ErrorCode::Cease,
            CeaseSubcode::ConnectionCollisionResolution as u8,
        )
        .await;
    assert_eq!(outbound.recv().await, None);

    inbound.send(Message::Keepalive(KeepaliveMsg {})).await;
    assert_eq!(
        inbound.recv_skip_keepalive().await,
        Some(Message::Update(UpdateMsg::default()))
    );
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;
}

// With a lower remote identifier, the locally initiated session wins.
#[tokio::test(start_paused = true)]
async fn collision_lower_remote_identifier() {
    let inst = TestInstance::new(Default::default());
    let (mut outbound, mut inbound) = colliding_sessions(&inst).await;
    let remote_id = Ipv4Addr::new(1, 0, 0, 9);

    inbound
        .send(Message::Open(open(PEER_ASN, remote_id, 90)))
        .await;
    let Some(Message::Keepalive(_)) = inbound.recv().await else {
        panic!("expected KEEPALIVE message");
    };

    outbound
        .send(Message::Open(open(PEER_ASN, remote_id, 90)))
        .await;
    inbound
        .expect_notification(
            ErrorCode::Cease,
            CeaseSubcode::ConnectionCollisionResolution as u8,
        )
        .await;

    outbound.send(Message::Keepalive(KeepaliveMsg {})).await;
    let Some(Message::Keepalive(_)) = outbound.recv().await else {
        panic!("expected KEEPALIVE message");
    };
    assert_eq!(
        outbound.recv_skip_keepalive().await,
        Some(Message::Update(UpdateMsg::default()))
    );
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;
}

#[tokio::test(start_paused = true)]
async fn duplicate_connection_rejected() {
    let inst = TestInstance::new(Default::default());
    let mut peer = inst.passive_peer(PEER_ADDR, neighbor(PEER_ASN)).await;
    peer.establish_eor(open(PEER_ASN, PEER_ID, 90)).await;
    inst.wait_state(PEER_ADDR, fsm::State::Established).await;

    // Same peer, same direction.
    let mut duplicate = inst.inbound(PEER_ADDR, PeerType::External).await;
    let Some(Message::Open(_)) = duplicate.recv().await else {
        panic!("expected OPEN message");
    };
    duplicate
        .send(Message::Open(open(PEER_ASN, PEER_ID, 90)))
        .await;
    duplicate
        .expect_notification(
            ErrorCode::Cease,
            CeaseSubcode::ConnectionRejected as u8,
        )
        .await;

    // The established session is unaffected.
    assert_eq!(
        inst.handle.neighbor_state(PEER_ADDR.into()).await.unwrap(),
        Some(fsm::State::Established)
    );
}
