//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use bytes::Bytes;
use holo_bgp::neighbor::PeerType;
use holo_bgp::packet::attribute::UnknownAttr;
use holo_bgp::packet::consts::{
    AttrFlags, ErrorCode, UpdateMessageErrorSubcode,
};
use holo_bgp::packet::error::{DecodeError, UpdateMessageError};
use holo_bgp::packet::message::{Message, NotificationMsg};
use holo_utils::assert_eq_hex;

use super::{decode_cxt, encode_cxt};

// Builds an eBGP UPDATE for 10.0.0.0/24 from AS 65550, with the given raw
// attributes appended to the mandatory ones.
fn update_with_attrs(extra: &[u8]) -> Vec<u8> {
    let mut attrs = vec![
        // ORIGIN
        0x40, 0x01, 0x01, 0x00,
        // AS_PATH
        0x40, 0x02, 0x06, 0x02, 0x01, 0x00, 0x01, 0x00, 0x0e,
        // NEXT_HOP
        0x40, 0x03, 0x04, 0xc0, 0x00, 0x02, 0x01,
    ];
    attrs.extend_from_slice(extra);

    let mut body = vec![0x00, 0x00];
    body.extend_from_slice(&(attrs.len() as u16).to_be_bytes());
    body.extend_from_slice(&attrs);
    body.extend_from_slice(&[0x18, 0x0a, 0x00, 0x00]);

    let mut msg = vec![0xff; 16];
    msg.extend_from_slice(&(19 + body.len() as u16).to_be_bytes());
    msg.push(0x02);
    msg.extend_from_slice(&body);
    msg
}

fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    Message::decode(bytes, &decode_cxt(PeerType::External))
}

#[test]
fn test_unknown_optional_non_transitive() {
    let plain = decode(&update_with_attrs(&[])).unwrap();
    let msg = decode(&update_with_attrs(&[0x80, 0xf0, 0x02, 0xab, 0xcd]))
        .unwrap();
    assert_eq!(plain, msg);
}

#[test]
fn test_unknown_optional_transitive() {
    let bytes = update_with_attrs(&[0xc0, 0xf0, 0x02, 0xab, 0xcd]);
    let msg = decode(&bytes).unwrap();
    let attrs = msg.as_update().unwrap().attrs.as_ref().unwrap();
    assert_eq!(
        attrs.unknown,
        vec![UnknownAttr::new(
            0xf0,
            AttrFlags::OPTIONAL | AttrFlags::TRANSITIVE | AttrFlags::PARTIAL,
            Bytes::from_static(&[0xab, 0xcd]),
        )]
    );

    // The attribute is propagated with the Partial bit set.
    let bytes_expected = update_with_attrs(&[0xe0, 0xf0, 0x02, 0xab, 0xcd]);
    let bytes_actual = msg.encode(&encode_cxt());
    assert_eq_hex!(bytes_expected, bytes_actual);
}

#[test]
fn test_unknown_well_known() {
    let bytes = update_with_attrs(&[0x40, 0xf0, 0x02, 0xab, 0xcd]);
    let error = decode(&bytes).unwrap_err();
    assert!(matches!(
        error,
        DecodeError::UpdateMessage(
            UpdateMessageError::UnrecognizedWellKnownAttribute
        )
    ));

    let msg = NotificationMsg::from(error);
    assert_eq!(msg.error_code, ErrorCode::UpdateMessageError as u8);
    assert_eq!(
        msg.error_subcode,
        UpdateMessageErrorSubcode::UnrecognizedWellKnownAttribute as u8
    );
}

#[test]
fn test_duplicate_mp_unreach() {
    let bytes = update_with_attrs(&[
        0x80, 0x0f, 0x03, 0x00, 0x02, 0x01, 0x80, 0x0f, 0x03, 0x00, 0x02, 0x01,
    ]);
    let error = decode(&bytes).unwrap_err();
    assert!(matches!(
        error,
        DecodeError::UpdateMessage(UpdateMessageError::MalformedAttributeList)
    ));
}

#[test]
fn test_duplicate_attribute_discarded() {
    // Only the first MED is kept.
    let bytes = update_with_attrs(&[
        0x80, 0x04, 0x04, 0x00, 0x00, 0x00, 0x0a, 0x80, 0x04, 0x04, 0x00, 0x00,
        0x00, 0x14,
    ]);
    let msg = decode(&bytes).unwrap();
    let attrs = msg.as_update().unwrap().attrs.as_ref().unwrap();
    assert_eq!(attrs.base.med, Some(10));
}

#[test]
fn test_malformed_communities() {
    // Length not a multiple of four: treat-as-withdraw.
    let bytes = update_with_attrs(&[0xc0, 0x08, 0x03, 0xfd, 0xe8, 0x00]);
    let msg = decode(&bytes).unwrap();
    let msg = msg.as_update().unwrap();
    assert!(msg.reach.is_some());
    assert_eq!(msg.attrs, None);
}

#[test]
fn test_attribute_flags_conflict() {
    // LOCAL_PREF flagged as optional.
    let bytes = update_with_attrs(&[0xc0, 0x05, 0x04, 0x00, 0x00, 0x00, 0x64]);
    let msg = decode(&bytes).unwrap();
    assert_eq!(msg.as_update().unwrap().attrs, None);
}

#[test]
fn test_local_pref_from_external_peer() {
    // LOCAL_PREF received from an eBGP peer is discarded.
    let bytes = update_with_attrs(&[0x40, 0x05, 0x04, 0x00, 0x00, 0x00, 0x64]);
    let msg = decode(&bytes).unwrap();
    let attrs = msg.as_update().unwrap().attrs.as_ref().unwrap();
    assert_eq!(attrs.base.local_pref, None);
}
