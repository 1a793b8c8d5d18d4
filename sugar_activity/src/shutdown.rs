/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A one-shot shutdown signal to coordinate between a factory and the
//! process hosting it.
//!
//! The factory holds the [`ShutdownTrigger`] and fires it once when it
//! terminates; the hosting process awaits a [`ShutdownSignal`] and decides
//! how to exit.
//!
//! ```
//! # use sugar_activity::shutdown::{self, ShutdownReason};
//! # tokio_test::block_on(async {
//! let (trigger, signal) = shutdown::channel();
//! assert!(signal.reason().is_none());
//! let waiter = signal.clone();
//! tokio::spawn(async move {
//!     trigger.fire(ShutdownReason::Idle);
//! });
//! assert_eq!(waiter.wait().await, ShutdownReason::Idle);
//! # })
//! ```

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use tokio::sync::watch;

/// Why a factory shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShutdownReason {
    /// The last live instance was destroyed.
    Idle,
    /// The hosting process asked the factory to stop.
    Stopped,
    /// The factory went away without firing its trigger.
    Aborted,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Stopped => write!(f, "stopped"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Create a new shutdown trigger and its signal.
pub fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(None);
    (ShutdownTrigger(Some(tx)), ShutdownSignal(rx))
}

/// Fires the shutdown signal. Dropping an unfired trigger fires it with
/// [`ShutdownReason::Aborted`].
#[derive(Debug)]
pub struct ShutdownTrigger(Option<watch::Sender<Option<ShutdownReason>>>);

impl ShutdownTrigger {
    /// Fire the signal with the given reason.
    pub fn fire(mut self, reason: ShutdownReason) {
        if let Some(tx) = self.0.take() {
            tx.send_replace(Some(reason));
        }
    }
}

impl Drop for ShutdownTrigger {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            tx.send_replace(Some(ShutdownReason::Aborted));
        }
    }
}

/// Observes a shutdown trigger. Signals can be cloned, queried and awaited.
#[derive(Debug, Clone)]
pub struct ShutdownSignal(watch::Receiver<Option<ShutdownReason>>);

impl ShutdownSignal {
    /// The reason the signal fired with, if it has fired.
    pub fn reason(&self) -> Option<ShutdownReason> {
        *self.0.borrow()
    }

    /// Returns true if the signal has fired.
    pub fn is_shutdown(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait for the signal to fire.
    pub async fn wait(&self) -> ShutdownReason {
        let mut rx = self.0.clone();
        let reason = rx.wait_for(Option::is_some).await.map(|reason| *reason);
        reason.ok().flatten().unwrap_or(ShutdownReason::Aborted)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_basic() {
        let (trigger, signal) = channel();
        assert!(!signal.is_shutdown());

        trigger.fire(ShutdownReason::Stopped);
        assert_eq!(signal.reason(), Some(ShutdownReason::Stopped));
        assert_eq!(signal.wait().await, ShutdownReason::Stopped);
    }

    #[tokio::test]
    async fn test_running_wait() {
        let (trigger, signal) = channel();

        let handle = tokio::spawn(async move { signal.wait().await });

        #[allow(clippy::disallowed_methods)]
        tokio::time::sleep(Duration::from_millis(50)).await;

        trigger.fire(ShutdownReason::Idle);
        assert_eq!(handle.await.unwrap(), ShutdownReason::Idle);
    }

    #[tokio::test]
    async fn test_many_waiters() {
        let (trigger, signal) = channel();
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let signal = signal.clone();
                tokio::spawn(async move { signal.wait().await })
            })
            .collect();
        drop(signal);

        trigger.fire(ShutdownReason::Stopped);
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), ShutdownReason::Stopped);
        }
    }

    #[tokio::test]
    async fn test_dropped_trigger_aborts() {
        let (trigger, signal) = channel();
        drop(trigger);
        assert_eq!(signal.reason(), Some(ShutdownReason::Aborted));
        assert_eq!(signal.wait().await, ShutdownReason::Aborted);
    }
}
