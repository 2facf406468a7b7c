//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::task::{self, JoinError, JoinHandle};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::Instrument;

/// Handle to a task created by [`Task::spawn`].
///
/// The task is aborted when its handle is dropped, unless [`Task::detach`]
/// was called first.
#[derive(Debug)]
pub struct Task<T> {
    join_handle: JoinHandle<T>,
    detached: bool,
}

/// Handle to a one-shot timer created by [`TimeoutTask::new`].
///
/// Dropping the handle before the timer fires disarms it.
#[derive(Debug)]
pub struct TimeoutTask {
    _task: Task<()>,
}

/// Handle to a periodic timer created by [`IntervalTask::new`].
///
/// Dropping the handle stops the timer.
#[derive(Debug)]
pub struct IntervalTask {
    _task: Task<()>,
}

// ===== impl Task =====

impl<T> Task<T> {
    /// Spawns a new asynchronous task, returning a handle for it.
    ///
    /// The task is instrumented with the caller's current span.
    pub fn spawn<Fut>(future: Fut) -> Task<T>
    where
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        Task {
            join_handle: task::spawn(future.in_current_span()),
            detached: false,
        }
    }

    /// Lets the task run to completion even after its handle is dropped.
    pub fn detach(&mut self) {
        self.detached = true;
    }
}

impl<T> Future for Task<T> {
    type Output = Result<T, JoinError>;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        Pin::new(&mut self.join_handle).poll(cx)
    }
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if !self.detached {
            self.join_handle.abort();
        }
    }
}

// ===== impl TimeoutTask =====

impl TimeoutTask {
    /// Arms a timer that runs `cb` once, after `timeout` has elapsed.
    pub fn new<F, Fut>(timeout: Duration, cb: F) -> TimeoutTask
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let _task = Task::spawn(async move {
            time::sleep(timeout).await;
            cb().await;
        });
        TimeoutTask { _task }
    }
}

// ===== impl IntervalTask =====

impl IntervalTask {
    /// Starts a timer that runs `cb` every `period`. The first run happens one
    /// period from now.
    ///
    /// Ticks missed while `cb` is running are skipped rather than bunched up.
    pub fn new<F, Fut>(period: Duration, mut cb: F) -> IntervalTask
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let _task = Task::spawn(async move {
            let start = Instant::now() + period;
            let mut interval = time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                cb().await;
            }
        });
        IntervalTask { _task }
    }
}

// ===== unit tests =====
