//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use holo_bgp::config::{ConfigError, NeighborCfg, ReconnectCfg};
use holo_bgp::error::Error;
use holo_bgp::neighbor::{PeerType, fsm};
use holo_bgp::network::{
    ReconnectConfigError, ReconnectError, ReconnectStrategy,
    connect_with_retry,
};
use holo_bgp::packet::message::Message;
use tokio::time::Instant;

use super::{MockTransport, TestInstance, connection, neighbor};

const PEER_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const PEER_ASN: u32 = 65001;

fn reconnect_cfg(max_attempts: Option<u32>) -> ReconnectCfg {
    ReconnectCfg {
        min_sleep: 100,
        max_sleep: 1000,
        multiplier: 2.0,
        max_attempts,
        deadline: None,
        jitter: false,
    }
}

#[test]
fn strategy_validation() {
    let sec = Duration::from_secs(1);
    assert_eq!(
        ReconnectStrategy::new(Duration::ZERO, sec, 2.0),
        Err(ReconnectConfigError::MinSleepZero)
    );
    assert_eq!(
        ReconnectStrategy::new(sec * 2, sec, 2.0),
        Err(ReconnectConfigError::MinSleepAboveMax(sec * 2, sec))
    );
    assert_eq!(
        ReconnectStrategy::new(sec, sec, 0.5),
        Err(ReconnectConfigError::InvalidMultiplier(0.5))
    );
    assert!(ReconnectStrategy::new(sec, sec, f64::NAN).is_err());
    assert_eq!(
        ReconnectStrategy::fixed(sec).unwrap().max_attempts(0),
        Err(ReconnectConfigError::MaxAttemptsZero)
    );
}

#[test]
fn strategy_backoff() {
    let strategy = ReconnectStrategy::new(
        Duration::from_millis(100),
        Duration::from_millis(1000),
        2.0,
    )
    .unwrap();
    let backoff = (1..=6)
        .map(|attempt| strategy.backoff(attempt).as_millis())
        .collect::<Vec<_>>();
    assert_eq!(backoff, vec![100, 200, 400, 800, 1000, 1000]);

    let strategy = ReconnectStrategy::fixed(Duration::from_secs(5)).unwrap();
    assert_eq!(strategy.backoff(1), Duration::from_secs(5));
    assert_eq!(strategy.backoff(100), Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn connect_succeeds_after_failures() {
    let transport = MockTransport::default();
    let strategy = ReconnectStrategy::fixed(Duration::from_secs(1)).unwrap();

    // Nothing to connect to yet: keep retrying until a connection shows up.
    let remote_addr = IpAddr::from(PEER_ADDR);
    let start = Instant::now();
    let connect = connect_with_retry(&transport, remote_addr, &strategy);
    tokio::pin!(connect);
    tokio::select! {
        _ = &mut connect => panic!("connection should not succeed yet"),
        _ = tokio::time::sleep(Duration::from_millis(2500)) => (),
    }
    assert_eq!(transport.attempts(), 3);

    let (conn, _peer) = connection(PEER_ADDR, PeerType::External);
    transport.push(conn);
    let conn = connect.await.unwrap();
    assert_eq!(conn.conn_info.remote_addr, remote_addr);
    assert_eq!(transport.attempts(), 4);
    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn connect_attempts_exhausted() {
    let transport = MockTransport::default();
    let strategy = ReconnectStrategy::new(
        Duration::from_millis(100),
        Duration::from_millis(1000),
        2.0,
    )
    .unwrap()
    .max_attempts(3)
    .unwrap();

    let start = Instant::now();
    let result =
        connect_with_retry(&transport, PEER_ADDR.into(), &strategy).await;
    assert!(matches!(
        result,
        Err(ReconnectError::AttemptsExhausted { attempts: 3, .. })
    ));
    assert_eq!(transport.attempts(), 3);

    // Two sleeps: 100ms and 200ms.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(400));
}

#[tokio::test(start_paused = true)]
async fn connect_deadline_exceeded() {
    let transport = MockTransport::default();
    let start = Instant::now();
    let strategy = ReconnectStrategy::fixed(Duration::from_secs(1))
        .unwrap()
        .deadline(start + Duration::from_millis(2500));

    let result =
        connect_with_retry(&transport, PEER_ADDR.into(), &strategy).await;
    assert!(matches!(
        result,
        Err(ReconnectError::DeadlineExceeded { attempts: 3 })
    ));

    // The last sleep would cross the deadline, so it's not even attempted.
    assert!(start.elapsed() <= Duration::from_millis(2500));
}

#[tokio::test(start_paused = true)]
async fn neighbor_gives_up_after_max_attempts() {
    let inst = TestInstance::new(Default::default());
    let config = NeighborCfg {
        reconnect: Some(reconnect_cfg(Some(3))),
        ..neighbor(PEER_ASN)
    };
    inst.handle
        .neighbor_start(PEER_ADDR.into(), config)
        .await
        .unwrap();
    assert_eq!(
        inst.handle.neighbor_state(PEER_ADDR.into()).await.unwrap(),
        Some(fsm::State::Connect)
    );

    inst.wait_state(PEER_ADDR, fsm::State::Idle).await;
    assert_eq!(inst.transport.attempts(), 3);

    // No further attempts until the neighbor is started again.
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(inst.transport.attempts(), 3);
}

#[tokio::test(start_paused = true)]
async fn neighbor_connects_after_retry() {
    let inst = TestInstance::new(Default::default());
    let config = NeighborCfg {
        reconnect: Some(reconnect_cfg(None)),
        ..neighbor(PEER_ASN)
    };
    inst.handle
        .neighbor_start(PEER_ADDR.into(), config)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(inst.transport.attempts(), 3);

    // The next attempt, 400ms after the third one, succeeds.
    let (conn, mut peer) = connection(PEER_ADDR, PeerType::External);
    inst.transport.push(conn);
    let Some(Message::Open(_)) = peer.recv().await else {
        panic!("expected OPEN message");
    };
    assert_eq!(inst.transport.attempts(), 4);
    inst.wait_state(PEER_ADDR, fsm::State::OpenSent).await;
}

#[tokio::test(start_paused = true)]
async fn neighbor_invalid_reconnect_config() {
    let inst = TestInstance::new(Default::default());
    let config = NeighborCfg {
        reconnect: Some(ReconnectCfg {
            multiplier: 0.5,
            ..reconnect_cfg(None)
        }),
        ..neighbor(PEER_ASN)
    };
    let result = inst.handle.neighbor_start(PEER_ADDR.into(), config).await;
    assert!(matches!(
        result,
        Err(Error::NbrConfigError(
            _,
            ConfigError::Reconnect(ReconnectConfigError::InvalidMultiplier(_))
        ))
    ));
}
