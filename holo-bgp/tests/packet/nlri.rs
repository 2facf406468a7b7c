//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::{Bytes, BytesMut};
use const_addrs::{ip, ip4, net, net4, net6};
use holo_bgp::packet::consts::AfiSafi;
use holo_bgp::packet::error::NlriError;
use holo_bgp::packet::evpn::{EvpnRoute, InclusiveMulticastRoute};
use holo_bgp::packet::linkstate::{
    LinkStateNlri, LsDescriptor, LsDescriptors, NodeDescriptor,
};
use holo_bgp::packet::nlri::{
    LabeledPrefix, Nlri, RouteDistinguisher, VpnPrefix, decode_ipv4_prefix,
    decode_ipv6_prefix,
};
use holo_utils::assert_eq_hex;
use holo_utils::mpls::{Label, LabelStackEntry};

fn test_nlri(afi_safi: AfiSafi, bytes: &[u8], nlri_expected: &Nlri) {
    let mut buf = Bytes::copy_from_slice(bytes);
    let nlri_actual = Nlri::decode(afi_safi, &mut buf).unwrap();
    assert_eq!(*nlri_expected, nlri_actual);
    assert!(buf.is_empty());
    assert_eq!(nlri_actual.afi_safi(), afi_safi);

    let mut buf = BytesMut::new();
    nlri_expected.encode(&mut buf);
    assert_eq_hex!(bytes, &buf[..]);
}

fn rd() -> RouteDistinguisher {
    RouteDistinguisher::As2 {
        admin: 65000,
        assigned: 100,
    }
}

fn label(value: u32) -> LabelStackEntry {
    LabelStackEntry::new(Label::new(value), true)
}

#[test]
fn test_route_distinguisher() {
    let mut buf = Bytes::from_static(&[0, 1, 1, 2, 3, 4, 0, 10]);
    assert_eq!(
        RouteDistinguisher::decode(&mut buf),
        Ok(RouteDistinguisher::Ipv4 {
            admin: ip4!("1.2.3.4"),
            assigned: 10,
        })
    );

    let mut buf = Bytes::from_static(&[0, 0, 0xfd, 0xe8, 0, 0, 0, 100]);
    assert_eq!(RouteDistinguisher::decode(&mut buf), Ok(rd()));

    let mut buf = Bytes::from_static(&[0, 2, 0xfa, 0x56, 0xea, 0, 0, 1]);
    assert_eq!(
        RouteDistinguisher::decode(&mut buf),
        Ok(RouteDistinguisher::As4 {
            admin: 4200000000,
            assigned: 1,
        })
    );

    let mut buf = Bytes::from_static(&[0, 7, 0, 0, 0, 0, 0, 0]);
    assert_eq!(
        RouteDistinguisher::decode(&mut buf),
        Err(NlriError::InvalidRouteDistinguisher(7))
    );
}

#[test]
fn test_ipv4_unicast() {
    test_nlri(
        AfiSafi::Ipv4Unicast,
        &[0x18, 0x0a, 0x00, 0x00],
        &Nlri::Ipv4Unicast(net4!("10.0.0.0/24")),
    );
    test_nlri(
        AfiSafi::Ipv4Unicast,
        &[0x00],
        &Nlri::Ipv4Unicast(net4!("0.0.0.0/0")),
    );
}

#[test]
fn test_ipv6_unicast() {
    test_nlri(
        AfiSafi::Ipv6Unicast,
        &[0x30, 0x20, 0x01, 0x0d, 0xb8, 0x00, 0x01],
        &Nlri::Ipv6Unicast(net6!("2001:db8:1::/48")),
    );
}

#[test]
fn test_prefix_host_bits() {
    // Host bits past the prefix length are cleared.
    let mut buf = Bytes::from_static(&[0x14, 0x0a, 0x00, 0x1f]);
    assert_eq!(decode_ipv4_prefix(&mut buf), Ok(net4!("10.0.16.0/20")));
}

#[test]
fn test_prefix_errors() {
    let mut buf = Bytes::new();
    assert_eq!(decode_ipv4_prefix(&mut buf), Err(NlriError::ReadOutOfBounds));

    let mut buf = Bytes::new();
    assert_eq!(decode_ipv6_prefix(&mut buf), Err(NlriError::ReadOutOfBounds));

    let mut buf = Bytes::from_static(&[0x81]);
    assert_eq!(
        decode_ipv6_prefix(&mut buf),
        Err(NlriError::InvalidPrefixLength(0x81))
    );
}

#[test]
fn test_labeled_unicast() {
    test_nlri(
        AfiSafi::Ipv4LabeledUnicast,
        &[0x28, 0x00, 0x3e, 0x81, 0x0a, 0x01],
        &Nlri::Labeled(LabeledPrefix {
            labels: vec![label(1000)],
            prefix: net!("10.1.0.0/16"),
        }),
    );
}

#[test]
fn test_vpn() {
    let nlri = Nlri::Vpn(VpnPrefix {
        labels: vec![label(1000)],
        rd: rd(),
        prefix: net!("10.1.0.0/16"),
    });
    test_nlri(
        AfiSafi::Ipv4Vpn,
        &[
            0x68, 0x00, 0x3e, 0x81, 0x00, 0x00, 0xfd, 0xe8, 0x00, 0x00, 0x00,
            0x64, 0x0a, 0x01,
        ],
        &nlri,
    );
    assert_eq!(nlri.to_string(), "[65000:100]:10.1.0.0/16 label 1000");
}

#[test]
fn test_vpn_too_short() {
    // The announced length doesn't cover the Route Distinguisher.
    let mut buf = Bytes::from_static(&[0x30, 0x00, 0x3e, 0x81, 0x00, 0x00]);
    assert_eq!(
        Nlri::decode(AfiSafi::Ipv4Vpn, &mut buf),
        Err(NlriError::InvalidPrefixLength(0x30))
    );
}

#[test]
fn test_evpn_inclusive_multicast() {
    test_nlri(
        AfiSafi::L2vpnEvpn,
        &[
            0x03, 0x11, 0x00, 0x00, 0xfd, 0xe8, 0x00, 0x00, 0x00, 0x64, 0x00,
            0x00, 0x00, 0x00, 0x20, 0xc0, 0x00, 0x02, 0x01,
        ],
        &Nlri::Evpn(EvpnRoute::InclusiveMulticast(InclusiveMulticastRoute {
            rd: rd(),
            ethernet_tag: 0,
            originator: ip!("192.0.2.1"),
        })),
    );
}

#[test]
fn test_evpn_trailing_data() {
    let mut buf = Bytes::from_static(&[
        0x03, 0x12, 0x00, 0x00, 0xfd, 0xe8, 0x00, 0x00, 0x00, 0x64, 0x00, 0x00,
        0x00, 0x00, 0x20, 0xc0, 0x00, 0x02, 0x01, 0xff,
    ]);
    assert_eq!(
        Nlri::decode(AfiSafi::L2vpnEvpn, &mut buf),
        Err(NlriError::InvalidEvpnRoute(3))
    );
}

#[test]
fn test_evpn_unknown_route_type() {
    test_nlri(
        AfiSafi::L2vpnEvpn,
        &[0x0b, 0x02, 0xab, 0xcd],
        &Nlri::Evpn(EvpnRoute::Unknown {
            route_type: 11,
            value: Bytes::from_static(&[0xab, 0xcd]),
        }),
    );
}

#[test]
fn test_linkstate_node() {
    let node = vec![
        NodeDescriptor::AsNumber(65000),
        NodeDescriptor::IgpRouterId(Bytes::from_static(&[1, 1, 1, 1])),
    ];
    let descriptors = LsDescriptors {
        protocol_id: 3,
        identifier: 0,
        tlvs: vec![LsDescriptor::LocalNode(node.clone())],
    };
    assert_eq!(descriptors.local_node(), Some(&node[..]));
    test_nlri(
        AfiSafi::LinkState,
        &[
            0x00, 0x01, 0x00, 0x1d, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x01, 0x00, 0x00, 0x10, 0x02, 0x00, 0x00, 0x04, 0x00,
            0x00, 0xfd, 0xe8, 0x02, 0x03, 0x00, 0x04, 0x01, 0x01, 0x01, 0x01,
        ],
        &Nlri::LinkState(LinkStateNlri::Node(descriptors)),
    );
}

#[test]
fn test_linkstate_invalid_tlv() {
    // Link identifiers TLV with a 4-byte value.
    let mut buf = Bytes::from_static(&[
        0x00, 0x02, 0x00, 0x11, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x01, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01,
    ]);
    assert_eq!(
        Nlri::decode(AfiSafi::LinkState, &mut buf),
        Err(NlriError::InvalidLinkStateTlv(258))
    );
}
