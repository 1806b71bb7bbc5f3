// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-bot timers.
//!
//! A [`TimerSlot`] holds at most one pending timer. Rearming aborts the
//! previous timer before spawning the new one, and dropping the slot aborts
//! whatever is pending, so a discarded controller never leaves a timer behind.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Single-owner slot for one delayed action.
#[derive(Debug, Default)]
pub struct TimerSlot {
    handle: Option<JoinHandle<()>>,
}

impl TimerSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the pending timer (if any) and arm a new one that runs `action`
    /// after `delay`.
    ///
    /// Cancelling is only guaranteed to prevent `action` from starting. Work
    /// that must survive a later rearm should be spawned from `action` as its
    /// own task.
    pub fn rearm<F>(&mut self, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        }));
    }

    /// Cancel the pending timer. No-op if none is armed.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether a timer is armed and has not completed yet.
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// The two timers owned by one bot controller.
#[derive(Debug, Default)]
pub struct BotTimers {
    /// Coalesces configuration updates into one hard reload.
    pub debounce: TimerSlot,
    /// Dead-man's switch; firing marks the bot failed.
    pub liveness: TimerSlot,
}

impl BotTimers {
    /// Cancel both timers.
    pub fn cancel_all(&mut self) {
        self.debounce.cancel();
        self.liveness.cancel();
    }
}
