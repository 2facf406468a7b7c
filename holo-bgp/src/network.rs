//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{Sender, UnboundedReceiver};
use tokio::time::Instant;

use crate::debug::Debug;
use crate::error::{IoError, NbrRxError};
use crate::instance::InstanceHandle;
use crate::neighbor::{ConnId, LARGE_HOLDTIME, negotiated_holdtime};
use crate::packet::message::{
    DecodeCxt, EncodeCxt, Message, NegotiatedCapability, OpenMsg,
};
use crate::tasks::messages::input::{NbrRxMsg, NbrTimerMsg};
use crate::tasks::messages::output::NbrTxMsg;

pub const BGP_PORT: u16 = 179;

pub type ReadHalf = Box<dyn AsyncRead + Send + Unpin>;
pub type WriteHalf = Box<dyn AsyncWrite + Send + Unpin>;

// Capability used to open outbound connections.
//
// Session code never touches sockets directly, which allows in-memory
// transports to stand in for TCP.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, remote_addr: IpAddr) -> io::Result<Connection>;
}

// Transport backed by tokio TCP sockets.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    pub port: u16,
    pub local_addr: Option<IpAddr>,
}

// An established byte stream to a peer.
pub struct Connection {
    pub conn_info: ConnInfo,
    pub read_half: ReadHalf,
    pub write_half: WriteHalf,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct ConnInfo {
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_addr: IpAddr,
    pub remote_port: u16,
}

// Connect-retry strategy.
//
// A multiplier of 1.0 yields a fixed retry interval. Larger values grow the
// interval exponentially up to `max_sleep`.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconnectStrategy {
    min_sleep: Duration,
    max_sleep: Duration,
    multiplier: f64,
    max_attempts: Option<u32>,
    deadline: Option<Instant>,
    jitter: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ReconnectConfigError {
    MinSleepZero,
    MinSleepAboveMax(Duration, Duration),
    InvalidMultiplier(f64),
    MaxAttemptsZero,
}

#[derive(Debug)]
pub enum ReconnectError {
    AttemptsExhausted { attempts: u32, error: io::Error },
    DeadlineExceeded { attempts: u32 },
}

// ===== impl TcpTransport =====

impl Default for TcpTransport {
    fn default() -> TcpTransport {
        TcpTransport {
            port: BGP_PORT,
            local_addr: None,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, remote_addr: IpAddr) -> io::Result<Connection> {
        let socket = match remote_addr {
            IpAddr::V4(_) => tokio::net::TcpSocket::new_v4()?,
            IpAddr::V6(_) => tokio::net::TcpSocket::new_v6()?,
        };
        if let Some(local_addr) = self.local_addr {
            socket.set_reuseaddr(true)?;
            socket.bind(SocketAddr::from((local_addr, 0)))?;
        }
        socket.set_nodelay(true)?;

        let sockaddr = SocketAddr::from((remote_addr, self.port));
        let stream = socket.connect(sockaddr).await?;
        Connection::from_tcp(stream)
    }
}

// ===== impl Connection =====

impl Connection {
    pub fn new<R, W>(conn_info: ConnInfo, read_half: R, write_half: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Connection {
            conn_info,
            read_half: Box::new(read_half),
            write_half: Box::new(write_half),
        }
    }

    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        let local = stream.local_addr()?;
        let remote = stream.peer_addr()?;
        let conn_info = ConnInfo {
            local_addr: local.ip(),
            local_port: local.port(),
            remote_addr: remote.ip(),
            remote_port: remote.port(),
        };
        let (read_half, write_half) = stream.into_split();
        Ok(Connection::new(conn_info, read_half, write_half))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("conn_info", &self.conn_info)
            .finish_non_exhaustive()
    }
}

// ===== impl ReconnectStrategy =====

impl ReconnectStrategy {
    pub fn new(
        min_sleep: Duration,
        max_sleep: Duration,
        multiplier: f64,
    ) -> Result<Self, ReconnectConfigError> {
        if min_sleep.is_zero() {
            return Err(ReconnectConfigError::MinSleepZero);
        }
        if min_sleep > max_sleep {
            return Err(ReconnectConfigError::MinSleepAboveMax(
                min_sleep, max_sleep,
            ));
        }
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(ReconnectConfigError::InvalidMultiplier(multiplier));
        }

        Ok(ReconnectStrategy {
            min_sleep,
            max_sleep,
            multiplier,
            max_attempts: None,
            deadline: None,
            jitter: false,
        })
    }

    pub fn fixed(interval: Duration) -> Result<Self, ReconnectConfigError> {
        ReconnectStrategy::new(interval, interval, 1.0)
    }

    pub fn max_attempts(
        mut self,
        max_attempts: u32,
    ) -> Result<Self, ReconnectConfigError> {
        if max_attempts == 0 {
            return Err(ReconnectConfigError::MaxAttemptsZero);
        }
        self.max_attempts = Some(max_attempts);
        Ok(self)
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    // Randomizes each sleep to between 75% and 100% of its nominal value
    // (RFC 4271 section 10).
    pub fn jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    // Returns the nominal sleep time following the given failed attempt
    // (numbered from one).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.min_sleep.as_secs_f64() * self.multiplier.powi(exp);
        Duration::from_secs_f64(secs.min(self.max_sleep.as_secs_f64()))
    }

    fn sleep_time(&self, attempt: u32) -> Duration {
        let sleep = self.backoff(attempt);
        if self.jitter {
            sleep.mul_f64(rand::rng().random_range(0.75..=1.0))
        } else {
            sleep
        }
    }
}

// ===== impl ReconnectConfigError =====

impl std::fmt::Display for ReconnectConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconnectConfigError::MinSleepZero => {
                write!(f, "minimum sleep time must be positive")
            }
            ReconnectConfigError::MinSleepAboveMax(min, max) => {
                write!(f, "minimum sleep ({min:?}) exceeds maximum ({max:?})")
            }
            ReconnectConfigError::InvalidMultiplier(multiplier) => {
                write!(f, "invalid backoff multiplier: {multiplier}")
            }
            ReconnectConfigError::MaxAttemptsZero => {
                write!(f, "maximum number of attempts must be at least one")
            }
        }
    }
}

impl std::error::Error for ReconnectConfigError {}

// ===== impl ReconnectError =====

impl std::fmt::Display for ReconnectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconnectError::AttemptsExhausted { attempts, .. } => {
                write!(f, "gave up after {attempts} connection attempts")
            }
            ReconnectError::DeadlineExceeded { attempts } => {
                write!(f, "connect deadline exceeded after {attempts} tries")
            }
        }
    }
}

impl std::error::Error for ReconnectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReconnectError::AttemptsExhausted { error, .. } => Some(error),
            ReconnectError::DeadlineExceeded { .. } => None,
        }
    }
}

// ===== global functions =====

// Connects to the given address, retrying according to the provided strategy.
//
// The returned future resolves once a connection is established, or when the
// strategy's attempt budget or deadline is exhausted.
pub async fn connect_with_retry(
    transport: &dyn Transport,
    remote_addr: IpAddr,
    strategy: &ReconnectStrategy,
) -> Result<Connection, ReconnectError> {
    let mut attempts = 0;

    loop {
        if let Some(deadline) = strategy.deadline
            && Instant::now() >= deadline
        {
            return Err(ReconnectError::DeadlineExceeded { attempts });
        }
        attempts += 1;

        let result = match strategy.deadline {
            Some(deadline) => {
                match tokio::time::timeout_at(
                    deadline,
                    transport.connect(remote_addr),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        return Err(ReconnectError::DeadlineExceeded {
                            attempts,
                        });
                    }
                }
            }
            None => transport.connect(remote_addr).await,
        };
        let error = match result {
            Ok(conn) => return Ok(conn),
            Err(error) => error,
        };

        if let Some(max_attempts) = strategy.max_attempts
            && attempts >= max_attempts
        {
            return Err(ReconnectError::AttemptsExhausted { attempts, error });
        }

        let sleep = strategy.sleep_time(attempts);
        Debug::NbrReconnectAttempt(&remote_addr, attempts, &error, sleep).log();
        if let Some(deadline) = strategy.deadline
            && Instant::now() + sleep > deadline
        {
            return Err(ReconnectError::DeadlineExceeded { attempts });
        }
        tokio::time::sleep(sleep).await;
    }
}

// Accepts inbound TCP connections and hands them over to the instance.
pub async fn listen_loop(listener: TcpListener, instance: InstanceHandle) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => match Connection::from_tcp(stream) {
                Ok(conn) => {
                    if instance.accept(conn).await.is_err() {
                        return;
                    }
                }
                Err(error) => {
                    IoError::TcpInfoError(error).log();
                }
            },
            Err(error) => {
                IoError::TcpAcceptError(error).log();
            }
        }
    }
}

pub(crate) async fn nbr_write_loop(
    mut stream: WriteHalf,
    mut cxt: EncodeCxt,
    mut nbr_msg_txc: UnboundedReceiver<NbrTxMsg>,
) {
    while let Some(msg) = nbr_msg_txc.recv().await {
        match msg {
            // Send message to the peer.
            NbrTxMsg::SendMessage { msg, .. } => {
                let buf = msg.encode(&cxt);
                if let Err(error) = stream.write_all(&buf).await {
                    IoError::TcpSendError(error).log();
                }
            }
            // Send list of messages to the peer.
            NbrTxMsg::SendMessageList { msg_list, .. } => {
                for msg in msg_list {
                    let buf = msg.encode(&cxt);
                    if let Err(error) = stream.write_all(&buf).await {
                        IoError::TcpSendError(error).log();
                    }
                }
            }
            // Update negotiated capabilities.
            NbrTxMsg::UpdateCapabilities(caps) => cxt.capabilities = caps,
            // Nothing else is written once the session is torn down.
            NbrTxMsg::Close => {
                let _ = stream.flush().await;
                let _ = stream.shutdown().await;
                return;
            }
        }
    }
}

// Reads and decodes messages from the peer.
//
// The hold timer lives here: it's restarted whenever a complete message is
// received, and its expiration is reported to the instance as a timer event.
pub(crate) async fn nbr_read_loop(
    mut stream: ReadHalf,
    nbr_addr: IpAddr,
    conn_id: ConnId,
    local_open: OpenMsg,
    mut cxt: DecodeCxt,
    nbr_msg_rxp: Sender<NbrRxMsg>,
    nbr_timerp: Sender<NbrTimerMsg>,
) -> Result<(), SendError<NbrRxMsg>> {
    const BUF_SIZE: usize = 65535;
    let mut buf = vec![0; BUF_SIZE];
    let mut data = Vec::with_capacity(BUF_SIZE);

    // Large hold time used while waiting for the peer's OPEN.
    let mut holdtime = Some(Duration::from_secs(LARGE_HOLDTIME.into()));
    let holdtimer = tokio::time::sleep(Duration::from_secs(
        LARGE_HOLDTIME.into(),
    ));
    tokio::pin!(holdtimer);

    loop {
        // Read data from the network, unless the hold timer expires first.
        let num_bytes = tokio::select! {
            result = stream.read(&mut buf) => result,
            _ = &mut holdtimer, if holdtime.is_some() => {
                let msg = NbrTimerMsg::hold_timer_expired(nbr_addr, conn_id);
                let _ = nbr_timerp.send(msg).await;
                return Ok(());
            }
        };
        match num_bytes {
            Ok(0) => {
                // Notify that the connection was closed by the remote end.
                let msg = NbrRxMsg {
                    nbr_addr,
                    conn_id,
                    msg: Err(NbrRxError::TcpConnClosed),
                };
                nbr_msg_rxp.send(msg).await?;
                return Ok(());
            }
            Ok(num_bytes) => data.extend_from_slice(&buf[..num_bytes]),
            Err(error) => {
                IoError::TcpRecvError(error).log();
                let msg = NbrRxMsg {
                    nbr_addr,
                    conn_id,
                    msg: Err(NbrRxError::TcpConnClosed),
                };
                nbr_msg_rxp.send(msg).await?;
                return Ok(());
            }
        };

        // Decode message(s).
        while let Some(msg_size) = Message::get_message_len(&data) {
            let msg = Message::decode(&data[0..msg_size], &cxt)
                .map_err(NbrRxError::MsgDecodeError);
            data.drain(..msg_size);

            // Keep track of negotiated capabilities as they influence how
            // some messages should be decoded. The negotiated hold time
            // takes effect right away.
            if let Ok(Message::Open(msg)) = &msg {
                cxt.capabilities =
                    NegotiatedCapability::negotiate(&local_open, msg);
                holdtime =
                    negotiated_holdtime(local_open.holdtime, msg.holdtime)
                        .map(|secs| Duration::from_secs(secs.into()));
            }
            if let Some(holdtime) = holdtime {
                holdtimer.as_mut().reset(Instant::now() + holdtime);
            }

            // Notify that the BGP message was received.
            let stop = msg.is_err();
            let msg = NbrRxMsg {
                nbr_addr,
                conn_id,
                msg,
            };
            nbr_msg_rxp.send(msg).await?;
            if stop {
                return Ok(());
            }
        }
    }
}
