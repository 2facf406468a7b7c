//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::LazyLock as Lazy;

use holo_bgp::packet::consts::{Afi, AfiSafi, Safi};
use holo_bgp::packet::message::{Message, RouteRefreshMsg};

use super::{test_decode_msg, test_encode_msg};

static ROUTE_REFRESH1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x17, 0x05, 0x00, 0x02, 0x00,
            0x01,
        ],
        Message::RouteRefresh(RouteRefreshMsg {
            afi: Afi::Ipv6 as u16,
            safi: Safi::Unicast as u8,
        }),
    )
});

#[test]
fn test_encode_route_refresh1() {
    let (ref bytes, ref msg) = *ROUTE_REFRESH1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_route_refresh1() {
    let (ref bytes, ref msg) = *ROUTE_REFRESH1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_route_refresh_afi_safi() {
    let (_, ref msg) = *ROUTE_REFRESH1;
    let msg = msg.as_route_refresh().unwrap();
    assert_eq!(msg.afi_safi(), Some(AfiSafi::Ipv6Unicast));

    let msg = RouteRefreshMsg { afi: 1, safi: 200 };
    assert_eq!(msg.afi_safi(), None);
}
