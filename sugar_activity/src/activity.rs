/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Activity instances, as seen by the factory that owns them and by the
//! clients that address them over the bus.
//!
//! An [`Activity`] is constructed by its factory with an
//! [`ActivityContext`], which carries the instance's token and its
//! [`DestroyNotifier`]. The instance fires the notifier when it
//! terminates; the factory then forgets it. Clients never hold the
//! instance itself: they talk to it through an [`ActivityProxy`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::bus::BusError;
use crate::bus::Interface;
use crate::bus::Proxy;
use crate::reference::ACTIVITY_INTERFACE;
use crate::reference::ActivityToken;

/// A running activity instance.
#[async_trait]
pub trait Activity: Send + 'static {
    /// A human readable title for the instance.
    fn title(&self) -> String {
        String::new()
    }

    /// A client asked the instance to close. The instance fires `destroy`
    /// once it has terminated; the default implementation does so
    /// immediately.
    async fn close(&mut self, destroy: DestroyNotifier) -> Result<(), anyhow::Error> {
        destroy.notify();
        Ok(())
    }
}

/// An activity type with a static constructor and per-process hooks.
/// Register one with [`crate::register_activity`] or
/// [`crate::registry::ActivityType::of`].
#[async_trait]
pub trait ActivityClass: Activity + Sized {
    /// Construct a new instance.
    async fn new(cx: ActivityContext) -> Result<Self, anyhow::Error>;

    /// Invoked once per process, before the first instance is created.
    fn start() -> Result<(), anyhow::Error> {
        Ok(())
    }

    /// Invoked once per process, after the last instance is destroyed.
    fn stop() -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// What a newly constructed instance knows about itself.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    token: ActivityToken,
    activity_type: String,
    destroy: DestroyNotifier,
}

impl ActivityContext {
    pub(crate) fn new(
        token: ActivityToken,
        activity_type: String,
        destroy: DestroyNotifier,
    ) -> Self {
        Self {
            token,
            activity_type,
            destroy,
        }
    }

    /// The instance's correlation token.
    pub fn token(&self) -> ActivityToken {
        self.token
    }

    /// The name of the instance's activity type.
    pub fn activity_type(&self) -> &str {
        &self.activity_type
    }

    /// The notifier the instance fires when it terminates.
    pub fn destroy_notifier(&self) -> DestroyNotifier {
        self.destroy.clone()
    }
}

/// Delivers an instance's destruction notification to its factory. The
/// notification is delivered at most once, however many clones fire it.
#[derive(Clone)]
pub struct DestroyNotifier {
    token: ActivityToken,
    fired: Arc<AtomicBool>,
    sink: Arc<dyn Fn(ActivityToken) + Send + Sync>,
}

impl DestroyNotifier {
    pub(crate) fn new(
        token: ActivityToken,
        sink: impl Fn(ActivityToken) + Send + Sync + 'static,
    ) -> Self {
        Self {
            token,
            fired: Arc::new(AtomicBool::new(false)),
            sink: Arc::new(sink),
        }
    }

    /// Notify the factory that the instance has terminated.
    pub fn notify(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            (self.sink)(self.token);
        }
    }

    /// Returns true if the notification has been delivered.
    pub fn notified(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for DestroyNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestroyNotifier")
            .field("token", &self.token)
            .field("fired", &self.notified())
            .finish()
    }
}

/// A description of a live instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInfo {
    /// The instance's correlation token.
    pub token: ActivityToken,
    /// The name of the instance's activity type.
    pub activity_type: String,
    /// The instance's title.
    pub title: String,
}

/// Messages understood by the `org.laptop.Activity` interface.
#[derive(Debug)]
pub enum ActivityMessage {
    /// Describe the instance.
    Info {
        /// Receives the description.
        reply: oneshot::Sender<ActivityInfo>,
    },
    /// Ask the instance to close.
    Close,
}

impl Interface for ActivityMessage {
    const NAME: &'static str = ACTIVITY_INTERFACE;
}

/// A live remote reference to an activity instance.
#[derive(Debug, Clone)]
pub struct ActivityProxy {
    token: ActivityToken,
    proxy: Proxy<ActivityMessage>,
}

impl ActivityProxy {
    pub(crate) fn new(token: ActivityToken, proxy: Proxy<ActivityMessage>) -> Self {
        Self { token, proxy }
    }

    /// The instance's correlation token.
    pub fn token(&self) -> ActivityToken {
        self.token
    }

    /// Describe the instance.
    pub async fn info(&self) -> Result<ActivityInfo, BusError> {
        self.proxy.call(|reply| ActivityMessage::Info { reply }).await
    }

    /// Ask the instance to close.
    pub fn close(&self) -> Result<(), BusError> {
        self.proxy.post(ActivityMessage::Close)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn test_notify_once() {
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let notifier = {
            let delivered = Arc::clone(&delivered);
            DestroyNotifier::new(ActivityToken(7), move |token| {
                delivered.lock().unwrap().push(token)
            })
        };
        let clone = notifier.clone();
        assert!(!clone.notified());

        notifier.notify();
        clone.notify();
        notifier.notify();

        assert!(clone.notified());
        assert_eq!(*delivered.lock().unwrap(), vec![ActivityToken(7)]);
    }

    #[test]
    fn test_context() {
        let cx = ActivityContext::new(
            ActivityToken(3),
            "org.example.Foo".to_string(),
            DestroyNotifier::new(ActivityToken(3), |_| {}),
        );
        assert_eq!(cx.token(), ActivityToken(3));
        assert_eq!(cx.activity_type(), "org.example.Foo");
        assert!(!cx.destroy_notifier().notified());
    }
}
