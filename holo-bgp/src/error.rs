//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};
use tracing::{error, warn, warn_span};

use crate::config::ConfigError;
use crate::network::ReconnectError;
use crate::packet::error::DecodeError;

// BGP errors.
#[derive(Debug)]
pub enum Error {
    // I/O errors
    IoError(IoError),
    // Network input
    NbrRxError(IpAddr, NbrRxError),
    // Message processing
    NbrBadAs(IpAddr, u32, u32),
    NbrBadIdentifier(IpAddr, Ipv4Addr),
    NbrReconnect(IpAddr, ReconnectError),
    NbrCollision(IpAddr, Ipv4Addr),
    NbrConfigError(IpAddr, ConfigError),
    // Other
    InstanceStartError(ConfigError),
    InstanceClosed,
}

// BGP I/O errors.
#[derive(Debug)]
pub enum IoError {
    TcpAcceptError(std::io::Error),
    TcpInfoError(std::io::Error),
    TcpRecvError(std::io::Error),
    TcpSendError(std::io::Error),
}

// Neighbor Rx errors.
#[derive(Debug)]
#[derive(Deserialize, Serialize)]
pub enum NbrRxError {
    TcpConnClosed,
    MsgDecodeError(DecodeError),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        let Some(addr) = self.nbr_addr() else {
            match self {
                Error::IoError(error) => error.log(),
                Error::InstanceStartError(error) => {
                    error!(error = %with_source(error), "{}", self)
                }
                _ => warn!("{}", self),
            }
            return;
        };

        let _span = warn_span!("neighbor", %addr).entered();
        match self {
            Error::NbrRxError(_, error) => error.log(),
            Error::NbrBadAs(_, received, expected) => {
                warn!(%received, %expected, "{}", self)
            }
            Error::NbrBadIdentifier(_, identifier)
            | Error::NbrCollision(_, identifier) => {
                warn!(%identifier, "{}", self)
            }
            Error::NbrReconnect(_, error) => {
                warn!(error = %with_source(error), "{}", self)
            }
            Error::NbrConfigError(_, error) => {
                warn!(error = %with_source(error), "{}", self)
            }
            _ => warn!("{}", self),
        }
    }

    // Returns the address of the neighbor the error relates to, if any.
    fn nbr_addr(&self) -> Option<IpAddr> {
        match self {
            Error::NbrRxError(addr, _)
            | Error::NbrBadAs(addr, ..)
            | Error::NbrBadIdentifier(addr, _)
            | Error::NbrReconnect(addr, _)
            | Error::NbrCollision(addr, _)
            | Error::NbrConfigError(addr, _) => Some(*addr),
            Error::IoError(_)
            | Error::InstanceStartError(_)
            | Error::InstanceClosed => None,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Error::IoError(error) => return error.fmt(f),
            Error::NbrRxError(_, error) => return error.fmt(f),
            Error::NbrBadAs(..) => "bad peer AS",
            Error::NbrBadIdentifier(..) => "BGP identifier conflict",
            Error::NbrReconnect(..) => "giving up on connecting to neighbor",
            Error::NbrCollision(..) => "connection collision detected",
            Error::NbrConfigError(..) => "invalid neighbor configuration",
            Error::InstanceStartError(..) => "failed to start instance",
            Error::InstanceClosed => "instance is no longer running",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            Error::NbrRxError(_, error) => Some(error),
            Error::NbrReconnect(_, error) => Some(error),
            Error::NbrConfigError(_, error) => Some(error),
            Error::InstanceStartError(error) => Some(error),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        warn!(error = %with_source(self.inner()), "{}", self);
    }

    fn inner(&self) -> &std::io::Error {
        match self {
            IoError::TcpAcceptError(error)
            | IoError::TcpInfoError(error)
            | IoError::TcpRecvError(error)
            | IoError::TcpSendError(error) => error,
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            IoError::TcpAcceptError(..) => {
                "failed to accept connection request"
            }
            IoError::TcpInfoError(..) => {
                "failed to fetch address and port information from the socket"
            }
            IoError::TcpRecvError(..) => "failed to read TCP data",
            IoError::TcpSendError(..) => "failed to send TCP data",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.inner())
    }
}

// ===== impl NbrRxError =====

impl NbrRxError {
    pub(crate) fn log(&self) {
        match self {
            NbrRxError::TcpConnClosed => warn!("{}", self),
            NbrRxError::MsgDecodeError(error) => {
                warn!(error = %with_source(error), "{}", self)
            }
        }
    }
}

impl std::fmt::Display for NbrRxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NbrRxError::TcpConnClosed => {
                write!(f, "connection closed by remote end")
            }
            NbrRxError::MsgDecodeError(..) => {
                write!(f, "failed to decode BGP message")
            }
        }
    }
}

impl std::error::Error for NbrRxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NbrRxError::MsgDecodeError(error) => Some(error),
            NbrRxError::TcpConnClosed => None,
        }
    }
}

// ===== global functions =====

// Formats the error followed by its chain of sources.
pub(crate) fn with_source<E: std::error::Error>(error: E) -> String {
    let mut msg = error.to_string();
    let mut source = error.source();
    while let Some(error) = source {
        msg.push_str(&format!(" ({error})"));
        source = error.source();
    }
    msg
}
