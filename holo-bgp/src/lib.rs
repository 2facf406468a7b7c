//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod af;
pub mod config;
pub mod debug;
pub mod error;
pub mod events;
pub mod instance;
pub mod neighbor;
pub mod network;
pub mod packet;
pub mod peer_registry;
pub mod policy;
pub mod registry;
pub mod rib;
pub mod tasks;
