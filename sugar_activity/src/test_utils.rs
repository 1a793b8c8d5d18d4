/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Activities for testing factories and creation clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::activity::Activity;
use crate::activity::ActivityContext;
use crate::activity::DestroyNotifier;
use crate::reference::ActivityToken;
use crate::registry::ActivityType;

#[derive(Debug, Default)]
struct State {
    starts: usize,
    stops: usize,
    constructed: usize,
    failing: bool,
    deferred_close: bool,
    gate: Option<Arc<Notify>>,
    waiting: usize,
    notifiers: HashMap<ActivityToken, DestroyNotifier>,
}

/// A family of test activities sharing observable state: how often the
/// hooks ran, which instances are live, and whether construction fails.
#[derive(Debug, Clone, Default)]
pub struct TestActivities(Arc<Mutex<State>>);

impl TestActivities {
    /// A new family.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// An activity type constructing [`TestActivity`] instances of this
    /// family, with counting start and stop hooks.
    pub fn activity_type(&self, name: &str) -> ActivityType {
        let family = self.clone();
        let starts = self.clone();
        let stops = self.clone();
        ActivityType::new(name, move |cx| {
            let family = family.clone();
            async move {
                let gate = family.state().gate.clone();
                if let Some(gate) = gate {
                    family.state().waiting += 1;
                    gate.notified().await;
                    family.state().waiting -= 1;
                }
                family.construct(cx)
            }
        })
        .with_start(move || {
            starts.state().starts += 1;
            Ok(())
        })
        .with_stop(move || {
            stops.state().stops += 1;
            Ok(())
        })
    }

    fn construct(&self, cx: ActivityContext) -> Result<TestActivity, anyhow::Error> {
        let mut state = self.state();
        if state.failing {
            anyhow::bail!("test activity construction failed");
        }
        state.constructed += 1;
        state.notifiers.insert(cx.token(), cx.destroy_notifier());
        Ok(TestActivity {
            token: cx.token(),
            family: self.clone(),
        })
    }

    /// Make subsequent constructions fail.
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    /// Make instances ignore close requests; they must then be destroyed
    /// with [`TestActivities::destroy`].
    pub fn set_deferred_close(&self, deferred: bool) {
        self.state().deferred_close = deferred;
    }

    /// Make subsequent constructions wait for a notification on `gate`
    /// before completing. `None` lets them complete immediately.
    pub fn set_gate(&self, gate: Option<Arc<Notify>>) {
        self.state().gate = gate;
    }

    /// How many constructions are waiting on a gate.
    pub fn waiting(&self) -> usize {
        self.state().waiting
    }

    /// Destroy an instance, as if it terminated on its own. Returns false
    /// if the instance is unknown or was already destroyed.
    pub fn destroy(&self, token: ActivityToken) -> bool {
        let notifier = self.state().notifiers.remove(&token);
        match notifier {
            Some(notifier) if !notifier.notified() => {
                notifier.notify();
                true
            }
            _ => false,
        }
    }

    /// How many times the start hook ran.
    pub fn starts(&self) -> usize {
        self.state().starts
    }

    /// How many times the stop hook ran.
    pub fn stops(&self) -> usize {
        self.state().stops
    }

    /// How many instances were constructed successfully.
    pub fn constructed(&self) -> usize {
        self.state().constructed
    }
}

/// A test activity instance.
#[derive(Debug)]
pub struct TestActivity {
    token: ActivityToken,
    family: TestActivities,
}

#[async_trait]
impl Activity for TestActivity {
    fn title(&self) -> String {
        format!("test activity {}", self.token)
    }

    async fn close(&mut self, destroy: DestroyNotifier) -> Result<(), anyhow::Error> {
        if !self.family.state().deferred_close {
            self.family.state().notifiers.remove(&self.token);
            destroy.notify();
        }
        Ok(())
    }
}
