//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod attribute;
pub mod consts;
pub mod error;
pub mod evpn;
pub mod flowspec;
pub mod linkstate;
pub mod message;
pub mod nlri;
pub mod tlv;
