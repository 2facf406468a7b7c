//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::LazyLock as Lazy;

use holo_bgp::packet::consts::{
    CeaseSubcode, ErrorCode, MessageHeaderErrorSubcode,
    UpdateMessageErrorSubcode,
};
use holo_bgp::packet::error::{
    DecodeError, MessageHeaderError, UpdateMessageError,
};
use holo_bgp::packet::message::{Message, NotificationMsg};

use super::{test_decode_msg, test_encode_msg};

static NOTIFICATION1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x15, 0x03, 0x06, 0x07,
        ],
        Message::Notification(NotificationMsg {
            error_code: ErrorCode::Cease as u8,
            error_subcode: CeaseSubcode::ConnectionCollisionResolution as u8,
            data: vec![],
        }),
    )
});

static NOTIFICATION2: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x17, 0x03, 0x01, 0x02, 0x10,
            0x01,
        ],
        Message::Notification(NotificationMsg {
            error_code: ErrorCode::MessageHeaderError as u8,
            error_subcode: MessageHeaderErrorSubcode::BadMessageLength as u8,
            data: vec![0x10, 0x01],
        }),
    )
});

#[test]
fn test_encode_notification1() {
    let (ref bytes, ref msg) = *NOTIFICATION1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_notification1() {
    let (ref bytes, ref msg) = *NOTIFICATION1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_encode_notification2() {
    let (ref bytes, ref msg) = *NOTIFICATION2;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_notification2() {
    let (ref bytes, ref msg) = *NOTIFICATION2;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_notification_from_decode_error() {
    let (_, ref msg) = *NOTIFICATION2;
    let error = DecodeError::MessageHeader(
        MessageHeaderError::BadMessageLength(4097),
    );
    assert_eq!(NotificationMsg::from(error), *msg.as_notification().unwrap());

    let error = DecodeError::UpdateMessage(
        UpdateMessageError::MalformedAttributeList,
    );
    let msg = NotificationMsg::from(error);
    assert_eq!(msg.error_code, ErrorCode::UpdateMessageError as u8);
    assert_eq!(
        msg.error_subcode,
        UpdateMessageErrorSubcode::MalformedAttributeList as u8
    );
}
