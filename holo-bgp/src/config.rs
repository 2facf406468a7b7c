//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(clippy::derivable_impls)]

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use tokio::time::Instant;

use crate::network::{ReconnectConfigError, ReconnectStrategy};
use crate::packet::consts::AfiSafi;
use crate::policy::Policy;

// Default values.
pub const DFLT_HOLDTIME: u16 = 90;
pub const DFLT_GR_RESTART_TIME: u16 = 120;
pub const DFLT_RECONNECT_MIN_SLEEP: u64 = 1000;
pub const DFLT_RECONNECT_MAX_SLEEP: u64 = 60000;
pub const DFLT_RECONNECT_MULTIPLIER: f64 = 2.0;

// Instance-wide configuration.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default)]
pub struct InstanceCfg {
    pub asn: u32,
    pub identifier: Option<Ipv4Addr>,
    // Route reflector cluster ID. Defaults to the BGP identifier.
    pub cluster_id: Option<Ipv4Addr>,
    pub always_compare_med: bool,
    pub holdtime: u16,
    pub reconnect: ReconnectCfg,
}

// Per-neighbor configuration.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default)]
pub struct NeighborCfg {
    pub enabled: bool,
    pub peer_as: u32,
    pub passive: bool,
    // Overrides the instance-wide hold time when set.
    pub holdtime: Option<u16>,
    pub afi_safi: BTreeSet<AfiSafi>,
    pub add_path_rx: BTreeSet<AfiSafi>,
    pub graceful_restart: GracefulRestartCfg,
    pub import_policy: Option<String>,
    pub export_policy: Option<String>,
    // Overrides the instance-wide connect-retry strategy when set.
    pub reconnect: Option<ReconnectCfg>,
}

#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default)]
pub struct GracefulRestartCfg {
    pub enabled: bool,
    pub restart_time: u16,
}

// Connect-retry settings. Sleep values are in milliseconds, the deadline is
// in seconds and counts from the moment the neighbor is started.
#[skip_serializing_none]
#[derive(Clone, Debug, PartialEq)]
#[derive(Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectCfg {
    pub min_sleep: u64,
    pub max_sleep: u64,
    pub multiplier: f64,
    pub max_attempts: Option<u32>,
    pub deadline: Option<u64>,
    pub jitter: bool,
}

// Named routing policies.
#[derive(Clone, Debug, Default)]
#[derive(Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyCfg {
    pub policies: BTreeMap<String, Policy>,
}

// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    MissingAsn,
    MissingIdentifier,
    InvalidIdentifier(Ipv4Addr),
    InvalidHoldtime(u16),
    MissingPeerAs,
    NoAddressFamily,
    AddPathNotEnabled(AfiSafi),
    UnknownPolicy(String),
    Reconnect(ReconnectConfigError),
}

// ===== impl InstanceCfg =====

impl InstanceCfg {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.asn == 0 {
            return Err(ConfigError::MissingAsn);
        }
        let identifier =
            self.identifier.ok_or(ConfigError::MissingIdentifier)?;
        if identifier.is_unspecified() || identifier.is_broadcast() {
            return Err(ConfigError::InvalidIdentifier(identifier));
        }
        validate_holdtime(self.holdtime)?;
        self.reconnect.validate()?;
        Ok(())
    }

    pub(crate) fn cluster_id(&self) -> Option<Ipv4Addr> {
        self.cluster_id.or(self.identifier)
    }
}

impl Default for InstanceCfg {
    fn default() -> InstanceCfg {
        InstanceCfg {
            asn: 0,
            identifier: None,
            cluster_id: None,
            always_compare_med: false,
            holdtime: DFLT_HOLDTIME,
            reconnect: Default::default(),
        }
    }
}

// ===== impl NeighborCfg =====

impl NeighborCfg {
    pub fn validate(&self, policies: &PolicyCfg) -> Result<(), ConfigError> {
        if self.peer_as == 0 {
            return Err(ConfigError::MissingPeerAs);
        }
        if let Some(holdtime) = self.holdtime {
            validate_holdtime(holdtime)?;
        }
        if self.afi_safi.is_empty() {
            return Err(ConfigError::NoAddressFamily);
        }
        if let Some(afi_safi) = self
            .add_path_rx
            .iter()
            .find(|afi_safi| !self.afi_safi.contains(*afi_safi))
        {
            return Err(ConfigError::AddPathNotEnabled(*afi_safi));
        }
        for name in self.import_policy.iter().chain(self.export_policy.iter())
        {
            if !policies.policies.contains_key(name) {
                return Err(ConfigError::UnknownPolicy(name.clone()));
            }
        }
        if let Some(reconnect) = &self.reconnect {
            reconnect.validate()?;
        }
        Ok(())
    }
}

impl Default for NeighborCfg {
    fn default() -> NeighborCfg {
        NeighborCfg {
            enabled: true,
            peer_as: 0,
            passive: false,
            holdtime: None,
            afi_safi: [AfiSafi::Ipv4Unicast].into(),
            add_path_rx: Default::default(),
            graceful_restart: Default::default(),
            import_policy: None,
            export_policy: None,
            reconnect: None,
        }
    }
}

// ===== impl GracefulRestartCfg =====

impl Default for GracefulRestartCfg {
    fn default() -> GracefulRestartCfg {
        GracefulRestartCfg {
            enabled: false,
            restart_time: DFLT_GR_RESTART_TIME,
        }
    }
}

// ===== impl ReconnectCfg =====

impl ReconnectCfg {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.strategy(Instant::now())
            .map(|_| ())
            .map_err(ConfigError::Reconnect)
    }

    // Builds the connect-retry strategy, anchoring the optional deadline at
    // the given start time.
    pub fn strategy(
        &self,
        start: Instant,
    ) -> Result<ReconnectStrategy, ReconnectConfigError> {
        let mut strategy = ReconnectStrategy::new(
            Duration::from_millis(self.min_sleep),
            Duration::from_millis(self.max_sleep),
            self.multiplier,
        )?;
        if let Some(max_attempts) = self.max_attempts {
            strategy = strategy.max_attempts(max_attempts)?;
        }
        if let Some(deadline) = self.deadline {
            strategy = strategy.deadline(start + Duration::from_secs(deadline));
        }
        if self.jitter {
            strategy = strategy.jitter();
        }
        Ok(strategy)
    }
}

impl Default for ReconnectCfg {
    fn default() -> ReconnectCfg {
        ReconnectCfg {
            min_sleep: DFLT_RECONNECT_MIN_SLEEP,
            max_sleep: DFLT_RECONNECT_MAX_SLEEP,
            multiplier: DFLT_RECONNECT_MULTIPLIER,
            max_attempts: None,
            deadline: None,
            jitter: true,
        }
    }
}

// ===== impl ConfigError =====

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingAsn => {
                write!(f, "missing local AS number")
            }
            ConfigError::MissingIdentifier => {
                write!(f, "missing BGP identifier")
            }
            ConfigError::InvalidIdentifier(identifier) => {
                write!(f, "invalid BGP identifier: {identifier}")
            }
            ConfigError::InvalidHoldtime(holdtime) => {
                write!(f, "invalid hold time: {holdtime}")
            }
            ConfigError::MissingPeerAs => {
                write!(f, "missing peer AS number")
            }
            ConfigError::NoAddressFamily => {
                write!(f, "no address family enabled")
            }
            ConfigError::AddPathNotEnabled(afi_safi) => {
                write!(f, "ADD-PATH configured for disabled family {afi_safi}")
            }
            ConfigError::UnknownPolicy(name) => {
                write!(f, "unknown routing policy: {name}")
            }
            ConfigError::Reconnect(..) => {
                write!(f, "invalid connect-retry settings")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Reconnect(error) => Some(error),
            _ => None,
        }
    }
}

impl From<ReconnectConfigError> for ConfigError {
    fn from(error: ReconnectConfigError) -> ConfigError {
        ConfigError::Reconnect(error)
    }
}

// ===== helper functions =====

// A hold time of zero disables keepalives. Non-zero values must be at least
// three seconds (RFC 4271 section 4.2).
fn validate_holdtime(holdtime: u16) -> Result<(), ConfigError> {
    if holdtime != 0 && holdtime < 3 {
        return Err(ConfigError::InvalidHoldtime(holdtime));
    }
    Ok(())
}
