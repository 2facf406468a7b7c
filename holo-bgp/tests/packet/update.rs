//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::LazyLock as Lazy;

use const_addrs::{ip4, ip6, net4, net6};
use holo_bgp::neighbor::PeerType;
use holo_bgp::packet::attribute::{
    AsPath, AsPathSegment, Attrs, BaseAttrs, CommList, MpNexthop,
    MpReachNlri, MpUnreachNlri,
};
use holo_bgp::packet::consts::{AfiSafi, AsPathSegmentType, Origin};
use holo_bgp::packet::message::{Message, ReachNlri, UnreachNlri, UpdateMsg};
use holo_bgp::packet::nlri::{Nlri, NlriEntry};
use holo_utils::bgp::Comm;

use super::{
    decode_cxt, test_decode_msg, test_decode_msg_from, test_encode_msg,
};

fn base_attrs(as_path: AsPath, local_pref: Option<u32>) -> BaseAttrs {
    BaseAttrs {
        origin: Origin::Igp,
        as_path,
        as4_path: None,
        nexthop: None,
        ll_nexthop: None,
        med: None,
        local_pref,
        aggregator: None,
        as4_aggregator: None,
        atomic_aggregate: false,
        originator_id: None,
        cluster_list: None,
    }
}

static UPDATE1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x2f, 0x02, 0x00, 0x00, 0x00,
            0x14, 0x40, 0x01, 0x01, 0x00, 0x40, 0x02, 0x06, 0x02, 0x01, 0x00,
            0x01, 0x00, 0x0e, 0x40, 0x03, 0x04, 0xc0, 0x00, 0x02, 0x01, 0x18,
            0x0a, 0x00, 0x00,
        ],
        Message::Update(UpdateMsg {
            reach: Some(ReachNlri {
                nlri: vec![NlriEntry::new(Nlri::Ipv4Unicast(net4!(
                    "10.0.0.0/24"
                )))],
                nexthop: ip4!("192.0.2.1"),
            }),
            unreach: None,
            mp_reach: None,
            mp_unreach: None,
            attrs: Some(Attrs {
                base: base_attrs(
                    AsPath {
                        segments: [AsPathSegment {
                            seg_type: AsPathSegmentType::Sequence,
                            members: [65550].into(),
                        }]
                        .into(),
                    },
                    None,
                ),
                comm: None,
                ext_comm: None,
                extv6_comm: None,
                large_comm: None,
                link_state: None,
                unknown: vec![],
            }),
        }),
    )
});

static UPDATE2: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x4b, 0x02, 0x00, 0x00, 0x00,
            0x34, 0x80, 0x0e, 0x1c, 0x00, 0x02, 0x01, 0x10, 0x20, 0x01, 0x0d,
            0xb8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x01, 0x00, 0x30, 0x20, 0x01, 0x0d, 0xb8, 0x00, 0x01, 0x40,
            0x01, 0x01, 0x00, 0x40, 0x02, 0x00, 0x40, 0x05, 0x04, 0x00, 0x00,
            0x00, 0x64, 0xc0, 0x08, 0x04, 0xfd, 0xe8, 0x00, 0x01,
        ],
        Message::Update(UpdateMsg {
            reach: None,
            unreach: None,
            mp_reach: Some(MpReachNlri {
                afi_safi: AfiSafi::Ipv6Unicast,
                nexthop: MpNexthop::Ipv6 {
                    global: ip6!("2001:db8::1"),
                    link_local: None,
                },
                nlri: vec![NlriEntry::new(Nlri::Ipv6Unicast(net6!(
                    "2001:db8:1::/48"
                )))],
            }),
            mp_unreach: None,
            attrs: Some(Attrs {
                base: base_attrs(AsPath::default(), Some(100)),
                comm: Some(CommList([Comm(0xfde80001)].into())),
                ext_comm: None,
                extv6_comm: None,
                large_comm: None,
                link_state: None,
                unknown: vec![],
            }),
        }),
    )
});

static UPDATE3: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x1b, 0x02, 0x00, 0x04, 0x18,
            0x0a, 0x00, 0x00, 0x00, 0x00,
        ],
        Message::Update(UpdateMsg {
            unreach: Some(UnreachNlri {
                nlri: vec![NlriEntry::new(Nlri::Ipv4Unicast(net4!(
                    "10.0.0.0/24"
                )))],
            }),
            ..Default::default()
        }),
    )
});

static EOR_IPV6: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x1d, 0x02, 0x00, 0x00, 0x00,
            0x06, 0x80, 0x0f, 0x03, 0x00, 0x02, 0x01,
        ],
        Message::Update(UpdateMsg {
            mp_unreach: Some(MpUnreachNlri {
                afi_safi: AfiSafi::Ipv6Unicast,
                nlri: vec![],
            }),
            ..Default::default()
        }),
    )
});

#[test]
fn test_encode_update1() {
    let (ref bytes, ref msg) = *UPDATE1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_update1() {
    let (ref bytes, ref msg) = *UPDATE1;
    test_decode_msg_from(bytes, msg, PeerType::External);
}

#[test]
fn test_encode_update2() {
    let (ref bytes, ref msg) = *UPDATE2;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_update2() {
    let (ref bytes, ref msg) = *UPDATE2;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_encode_update3() {
    let (ref bytes, ref msg) = *UPDATE3;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_update3() {
    let (ref bytes, ref msg) = *UPDATE3;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_encode_eor_ipv6() {
    let (ref bytes, ref msg) = *EOR_IPV6;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_eor_ipv6() {
    let (ref bytes, ref msg) = *EOR_IPV6;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_eor() {
    let (_, ref msg) = *EOR_IPV6;
    let msg = msg.as_update().unwrap();
    assert_eq!(msg.eor(), Some(AfiSafi::Ipv6Unicast));
    assert_eq!(UpdateMsg::new_eor(AfiSafi::Ipv6Unicast), *msg);

    let msg = UpdateMsg::new_eor(AfiSafi::Ipv4Unicast);
    assert_eq!(msg, UpdateMsg::default());
    assert_eq!(msg.eor(), Some(AfiSafi::Ipv4Unicast));

    let (_, ref msg) = *UPDATE3;
    assert_eq!(msg.as_update().unwrap().eor(), None);
}

#[test]
fn test_decode_update_first_as_mismatch() {
    // The attributes of an eBGP route whose AS_PATH doesn't start with the
    // peer AS are dropped, so the prefixes are treated as withdrawn.
    let (ref bytes, _) = *UPDATE1;
    let mut bytes = bytes.clone();
    bytes[35] = 0x0f;

    let msg = Message::decode(&bytes, &decode_cxt(PeerType::External)).unwrap();
    let msg = msg.as_update().unwrap();
    assert!(msg.reach.is_some());
    assert_eq!(msg.attrs, None);
}

#[test]
fn test_decode_update_missing_nexthop() {
    // UPDATE1 without the NEXT_HOP attribute. Its prefixes are treated as
    // withdrawn.
    let bytes = [
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0x00, 0x28, 0x02, 0x00, 0x00, 0x00, 0x0d, 0x40,
        0x01, 0x01, 0x00, 0x40, 0x02, 0x06, 0x02, 0x01, 0x00, 0x01, 0x00, 0x0e,
        0x18, 0x0a, 0x00, 0x00,
    ];
    let msg = Message::Update(UpdateMsg {
        unreach: Some(UnreachNlri {
            nlri: vec![NlriEntry::new(Nlri::Ipv4Unicast(net4!("10.0.0.0/24")))],
        }),
        ..Default::default()
    });
    test_decode_msg_from(&bytes, &msg, PeerType::External);
}
