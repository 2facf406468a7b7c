//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;
use std::sync::{Arc, atomic};
use std::time::Duration;

use holo_utils::task::{IntervalTask, Task, TimeoutTask};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{Sender, UnboundedReceiver, UnboundedSender};
use tracing::{Instrument, debug_span, error};

use crate::debug::Debug;
use crate::error::NbrRxError;
use crate::instance::InstanceHandle;
use crate::neighbor::{ConnId, fsm};
use crate::network::{
    self, ReadHalf, ReconnectStrategy, Transport, WriteHalf,
};
use crate::packet::message::{
    DecodeCxt, EncodeCxt, KeepaliveMsg, Message, OpenMsg,
};

//
// BGP tasks diagram:
//                                     +--------------+
//                                     |    handle    |
//                                     +--------------+
//                                           | ^
//                                           | |
//                             request (Nx)  V | (1x) responder
//                                     +--------------+
//                                     |              |
//                 tcp_listener (1x) ->|              |
//                 tcp_connect (Nx) -> |              | -> (Nx) nbr_tx
//                      nbr_rx (Nx) -> |   instance   | -> (Nx) nbr_kalive_interval
//                   nbr_timer (Nx) -> |              |
//                                     |              |
//                                     +--------------+
//                                             |
//                                             V
//                                     +--------------+
//                                     |   RIB sink   |
//                                     +--------------+
//

// BGP inter-task message types.
pub mod messages {
    // Input messages (child task -> main task).
    pub mod input {
        use std::net::IpAddr;

        use serde::{Deserialize, Serialize};

        use crate::error::NbrRxError;
        use crate::neighbor::{ConnId, fsm};
        use crate::network::{Connection, ReconnectError};
        use crate::packet::message::Message;

        #[derive(Debug)]
        pub struct TcpConnectMsg {
            pub nbr_addr: IpAddr,
            pub result: Result<Connection, ReconnectError>,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NbrRxMsg {
            pub nbr_addr: IpAddr,
            pub conn_id: ConnId,
            pub msg: Result<Message, NbrRxError>,
        }

        #[derive(Debug, Deserialize, Serialize)]
        pub struct NbrTimerMsg {
            pub nbr_addr: IpAddr,
            // Session the timer belongs to. Neighbor-wide timers have none.
            pub conn_id: Option<ConnId>,
            pub timer: fsm::Timer,
        }

        impl NbrTimerMsg {
            pub(crate) fn hold_timer_expired(
                nbr_addr: IpAddr,
                conn_id: ConnId,
            ) -> NbrTimerMsg {
                NbrTimerMsg {
                    nbr_addr,
                    conn_id: Some(conn_id),
                    timer: fsm::Timer::Hold,
                }
            }
        }
    }

    // Output messages (main task -> child task).
    pub mod output {
        use std::collections::BTreeSet;
        use std::net::IpAddr;

        use serde::Serialize;

        use crate::packet::message::{Message, NegotiatedCapability};

        #[derive(Debug, Serialize)]
        pub enum NbrTxMsg {
            SendMessage {
                nbr_addr: IpAddr,
                msg: Message,
            },
            SendMessageList {
                nbr_addr: IpAddr,
                msg_list: Vec<Message>,
            },
            UpdateCapabilities(BTreeSet<NegotiatedCapability>),
            // Last message of a session. Nothing is written afterwards.
            Close,
        }
    }
}

// ===== BGP tasks =====

// TCP listening task.
pub fn tcp_listener(
    listener: TcpListener,
    instance: InstanceHandle,
) -> Task<()> {
    let span1 = debug_span!("network");
    let _span1_guard = span1.enter();
    let span2 = debug_span!("input");
    let _span2_guard = span2.enter();

    Task::spawn(
        async move {
            network::listen_loop(listener, instance).await;
        }
        .in_current_span(),
    )
}

// TCP connect task.
//
// Keeps trying according to the given strategy, and reports either the
// established connection or the reason for giving up.
pub(crate) fn tcp_connect(
    nbr_addr: IpAddr,
    transport: Arc<dyn Transport>,
    strategy: ReconnectStrategy,
    tcp_connectp: &Sender<messages::input::TcpConnectMsg>,
) -> Task<()> {
    let span = debug_span!("neighbor", addr = %nbr_addr);
    let _span_guard = span.enter();

    let tcp_connectp = tcp_connectp.clone();
    Task::spawn(
        async move {
            let result = network::connect_with_retry(
                transport.as_ref(),
                nbr_addr,
                &strategy,
            )
            .await;

            // Send message to the parent BGP task.
            let msg = messages::input::TcpConnectMsg { nbr_addr, result };
            let _ = tcp_connectp.send(msg).await;
        }
        .in_current_span(),
    )
}

// Neighbor TCP Rx task.
pub(crate) fn nbr_rx(
    nbr_addr: IpAddr,
    conn_id: ConnId,
    local_open: OpenMsg,
    cxt: DecodeCxt,
    read_half: ReadHalf,
    nbr_msg_rxp: &Sender<messages::input::NbrRxMsg>,
    nbr_timerp: &Sender<messages::input::NbrTimerMsg>,
) -> Task<()> {
    let span1 = debug_span!("neighbor", addr = %nbr_addr);
    let _span1_guard = span1.enter();
    let span2 = debug_span!("input");
    let _span2_guard = span2.enter();

    let nbr_msg_rxp = nbr_msg_rxp.clone();
    let nbr_timerp = nbr_timerp.clone();

    // The read loop runs inside an inner task so that a panic (for example,
    // triggered by malformed input) is contained and reported as a closed
    // connection.
    Task::spawn(
        async move {
            let worker_task = {
                let nbr_msg_rxp = nbr_msg_rxp.clone();
                Task::spawn(
                    async move {
                        let _ = network::nbr_read_loop(
                            read_half,
                            nbr_addr,
                            conn_id,
                            local_open,
                            cxt,
                            nbr_msg_rxp,
                            nbr_timerp,
                        )
                        .await;
                    }
                    .in_current_span(),
                )
            };
            if let Err(error) = worker_task.await
                && error.is_panic()
            {
                error!(%error, "task panicked");
                let msg = messages::input::NbrRxMsg {
                    nbr_addr,
                    conn_id,
                    msg: Err(NbrRxError::TcpConnClosed),
                };
                let _ = nbr_msg_rxp.send(msg).await;
            }
        }
        .in_current_span(),
    )
}

// Neighbor TCP Tx task.
pub(crate) fn nbr_tx(
    nbr_addr: IpAddr,
    conn_id: ConnId,
    cxt: EncodeCxt,
    write_half: WriteHalf,
    msg_txc: UnboundedReceiver<messages::output::NbrTxMsg>,
) -> Task<()> {
    let span1 = debug_span!("neighbor", addr = %nbr_addr);
    let _span1_guard = span1.enter();
    let span2 = debug_span!("session", %conn_id);
    let _span2_guard = span2.enter();
    let span3 = debug_span!("output");
    let _span3_guard = span3.enter();

    Task::spawn(
        async move {
            network::nbr_write_loop(write_half, cxt, msg_txc).await;
        }
        .in_current_span(),
    )
}

// Neighbor timer task.
pub(crate) fn nbr_timer(
    nbr_addr: IpAddr,
    conn_id: Option<ConnId>,
    timer: fsm::Timer,
    seconds: u16,
    nbr_timerp: &Sender<messages::input::NbrTimerMsg>,
) -> TimeoutTask {
    let nbr_timerp = nbr_timerp.clone();

    TimeoutTask::new(Duration::from_secs(seconds.into()), move || async move {
        let msg = messages::input::NbrTimerMsg {
            nbr_addr,
            conn_id,
            timer,
        };
        let _ = nbr_timerp.send(msg).await;
    })
}

// Send periodic keepalive messages.
pub(crate) fn nbr_kalive_interval(
    nbr_addr: IpAddr,
    interval: u16,
    msg_txp: &UnboundedSender<messages::output::NbrTxMsg>,
    msg_counter: &Arc<atomic::AtomicU32>,
) -> IntervalTask {
    let msg_txp = msg_txp.clone();
    let msg_counter = msg_counter.clone();

    IntervalTask::new(
        Duration::from_secs(interval.into()),
        move || {
            let msg_txp = msg_txp.clone();
            let msg_counter = msg_counter.clone();

            async move {
                let msg = Message::Keepalive(KeepaliveMsg {});
                Debug::NbrMsgTx(&nbr_addr, &msg).log();

                let msg = messages::output::NbrTxMsg::SendMessage {
                    nbr_addr,
                    msg,
                };
                let _ = msg_txp.send(msg);
                msg_counter.fetch_add(1, atomic::Ordering::Relaxed);
            }
        },
    )
}
