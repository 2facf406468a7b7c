//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::time::Duration;

use const_addrs::{ip4, net4};
use holo_bgp::config::{ConfigError, NeighborCfg, PolicyCfg};
use holo_bgp::error::Error;
use holo_bgp::neighbor::fsm;
use holo_bgp::packet::consts::AfiSafi;
use holo_bgp::packet::message::{Message, RouteRefreshMsg, UpdateMsg};
use holo_bgp::packet::nlri::Nlri;
use holo_bgp::packet::tlv::StatTlv;
use holo_bgp::policy::{Policy, PolicyCondition, PolicyStmt, StmtResult};
use holo_utils::policy::{
    DefaultPolicyType, IpPrefixRange, MatchSetRestrictedType,
};
use ipnetwork::Ipv4Network;

use super::{
    LOCAL_ADDR, LOCAL_ASN, Peer, SinkEvent, TestInstance, neighbor, open,
    update, withdraw,
};

const PEER1_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const PEER1_ID: Ipv4Addr = Ipv4Addr::new(2, 2, 2, 2);
const PEER1_ASN: u32 = 65001;
const PEER2_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);
const PEER2_ID: Ipv4Addr = Ipv4Addr::new(3, 3, 3, 3);
const PEER2_ASN: u32 = 65002;
const PEER3_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 4);
const PEER3_ID: Ipv4Addr = Ipv4Addr::new(4, 4, 4, 4);

// Policy rejecting exactly the given prefix.
fn reject_prefix(prefix: Ipv4Network) -> PolicyCfg {
    let policy = Policy {
        stmts: vec![PolicyStmt {
            name: "deny".to_owned(),
            conditions: vec![PolicyCondition::MatchPrefixSet {
                ranges: vec![IpPrefixRange {
                    prefix: prefix.into(),
                    masklen_lower: prefix.prefix(),
                    masklen_upper: prefix.prefix(),
                }],
                match_type: MatchSetRestrictedType::Any,
            }],
            actions: vec![],
            result: Some(StmtResult::Reject),
        }],
        default: DefaultPolicyType::AcceptRoute,
    };
    PolicyCfg {
        policies: [("deny".to_owned(), policy)].into(),
    }
}

// Establishes the session with the route source and announces the given
// prefixes over it.
async fn announce(
    inst: &TestInstance,
    config: NeighborCfg,
    prefixes: &[Ipv4Network],
) -> Peer {
    let mut peer = inst.passive_peer(PEER1_ADDR, config).await;
    peer.establish_eor(open(PEER1_ASN, PEER1_ID, 90)).await;
    inst.wait_state(PEER1_ADDR, fsm::State::Established).await;
    peer.send(update(prefixes, &[PEER1_ASN], ip4!("192.0.2.1")))
        .await;
    peer
}

#[tokio::test(start_paused = true)]
async fn import_policy_reject() {
    let rejected = net4!("10.0.0.0/24");
    let accepted = net4!("10.0.1.0/24");
    let inst = TestInstance::new(reject_prefix(rejected));
    let config = NeighborCfg {
        import_policy: Some("deny".to_owned()),
        ..neighbor(PEER1_ASN)
    };
    let _peer = announce(&inst, config, &[rejected, accepted]).await;

    let events = inst.wait_sink(1).await;
    assert!(matches!(
        &events[..],
        [SinkEvent::Put(AfiSafi::Ipv4Unicast, nlri, _)]
            if *nlri == Nlri::Ipv4Unicast(accepted)
    ));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(inst.sink.is_empty());

    // The rejected route is kept in the pre-policy Adj-RIB-In only.
    let adj_rib_in = inst
        .handle
        .adj_rib_in(PEER1_ADDR.into(), AfiSafi::Ipv4Unicast)
        .await
        .unwrap();
    let route = adj_rib_in
        .get(&(Nlri::Ipv4Unicast(rejected), None))
        .unwrap();
    assert!(route.pre.is_some());
    assert!(route.post.is_none());
    let route = adj_rib_in
        .get(&(Nlri::Ipv4Unicast(accepted), None))
        .unwrap();
    assert!(route.pre.is_some());
    assert!(route.post.is_some());

    let loc_rib = inst.handle.loc_rib(AfiSafi::Ipv4Unicast).await.unwrap();
    assert!(!loc_rib.contains_key(&Nlri::Ipv4Unicast(rejected)));

    let report = inst
        .handle
        .peer_report(PEER1_ADDR.into())
        .await
        .unwrap()
        .unwrap();
    assert!(report.stats.contains(&StatTlv::RejectedPrefixes(1)));
    assert!(report.stats.contains(&StatTlv::AdjRibInRoutes(1)));
}

#[tokio::test(start_paused = true)]
async fn export_to_external_peer() {
    let prefix = net4!("10.0.0.0/24");
    let inst = TestInstance::new(Default::default());
    let mut peer1 = announce(&inst, neighbor(PEER1_ASN), &[prefix]).await;
    inst.wait_sink(1).await;

    // The route is advertised as part of the initial table dump, with the
    // local AS prepended and the next hop set to the local address.
    let mut peer2 = inst.passive_peer(PEER2_ADDR, neighbor(PEER2_ASN)).await;
    peer2.establish(open(PEER2_ASN, PEER2_ID, 90)).await;
    assert_eq!(
        peer2.recv_skip_keepalive().await,
        Some(update(&[prefix], &[LOCAL_ASN, PEER1_ASN], LOCAL_ADDR))
    );
    assert_eq!(
        peer2.recv_skip_keepalive().await,
        Some(Message::Update(UpdateMsg::default()))
    );

    // Route refresh.
    peer2
        .send(Message::RouteRefresh(RouteRefreshMsg { afi: 1, safi: 1 }))
        .await;
    assert_eq!(
        peer2.recv_skip_keepalive().await,
        Some(update(&[prefix], &[LOCAL_ASN, PEER1_ASN], LOCAL_ADDR))
    );

    // Withdrawals are propagated as well.
    peer1.send(withdraw(&[prefix])).await;
    assert_eq!(peer2.recv_skip_keepalive().await, Some(withdraw(&[prefix])));
}

#[tokio::test(start_paused = true)]
async fn export_to_internal_peer() {
    let prefix = net4!("10.0.0.0/24");
    let nexthop = ip4!("192.0.2.1");
    let inst = TestInstance::new(Default::default());
    let _peer1 = announce(&inst, neighbor(PEER1_ASN), &[prefix]).await;
    inst.wait_sink(1).await;

    // The AS path and next hop are left untouched, and the default local
    // preference is added.
    let mut peer3 = inst.passive_peer(PEER3_ADDR, neighbor(LOCAL_ASN)).await;
    peer3.establish(open(LOCAL_ASN, PEER3_ID, 90)).await;
    let Message::Update(mut expected) =
        update(&[prefix], &[PEER1_ASN], nexthop)
    else {
        unreachable!();
    };
    expected.attrs.as_mut().unwrap().base.local_pref = Some(100);
    assert_eq!(
        peer3.recv_skip_keepalive().await,
        Some(Message::Update(expected))
    );
    assert_eq!(
        peer3.recv_skip_keepalive().await,
        Some(Message::Update(UpdateMsg::default()))
    );
}

#[tokio::test(start_paused = true)]
async fn export_policy_reject() {
    let rejected = net4!("10.0.0.0/24");
    let accepted = net4!("10.0.1.0/24");
    let inst = TestInstance::new(reject_prefix(rejected));
    let _peer1 =
        announce(&inst, neighbor(PEER1_ASN), &[rejected, accepted]).await;
    inst.wait_sink(2).await;

    let config = NeighborCfg {
        export_policy: Some("deny".to_owned()),
        ..neighbor(PEER2_ASN)
    };
    let mut peer2 = inst.passive_peer(PEER2_ADDR, config).await;
    peer2.establish(open(PEER2_ASN, PEER2_ID, 90)).await;
    assert_eq!(
        peer2.recv_skip_keepalive().await,
        Some(update(&[accepted], &[LOCAL_ASN, PEER1_ASN], LOCAL_ADDR))
    );
    assert_eq!(
        peer2.recv_skip_keepalive().await,
        Some(Message::Update(UpdateMsg::default()))
    );

    // Both routes are still in the Loc-RIB.
    let loc_rib = inst.handle.loc_rib(AfiSafi::Ipv4Unicast).await.unwrap();
    assert_eq!(
        loc_rib.keys().cloned().collect::<Vec<_>>(),
        vec![Nlri::Ipv4Unicast(rejected), Nlri::Ipv4Unicast(accepted)]
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_policy_rejected() {
    let inst = TestInstance::new(reject_prefix(net4!("10.0.0.0/24")));
    let config = NeighborCfg {
        export_policy: Some("permit".to_owned()),
        ..neighbor(PEER1_ASN)
    };
    let result = inst.handle.neighbor_start(PEER1_ADDR.into(), config).await;
    assert!(matches!(
        result,
        Err(Error::NbrConfigError(_, ConfigError::UnknownPolicy(name)))
            if name == "permit"
    ));
}
