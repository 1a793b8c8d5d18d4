/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Management of activity type registration.
//!
//! Factories construct instances through an [`ActivityType`], looked up by
//! name in an [`ActivityRegistry`]. Registries are either assembled
//! explicitly, or collected from every type linked into the image and
//! registered with [`crate::register_activity`]:
//!
//! ```ignore
//! struct Terminal { ... }
//!
//! register_activity!("org.laptop.Terminal", Terminal);
//!
//! let registry = ActivityRegistry::collect();
//! let terminal = registry.get("org.laptop.Terminal")?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::activity::Activity;
use crate::activity::ActivityClass;
use crate::activity::ActivityContext;

/// Register an [`ActivityClass`] under a type name, so that it is included
/// in [`ActivityRegistry::collect`].
///
/// Example:
///
/// ```ignore
/// register_activity!("org.laptop.Terminal", Terminal);
/// ```
#[macro_export]
macro_rules! register_activity {
    ($name:expr, $activity:ty) => {
        $crate::internal_macro_support::inventory::submit! {
            $crate::registry::RegisteredActivity {
                name: $name,
                describe: || $crate::registry::ActivityType::of::<$activity>($name),
            }
        }
    };
}

/// A statically registered activity type. These are constructed via
/// [`crate::register_activity`].
#[derive(Debug)]
pub struct RegisteredActivity {
    /// The activity type name. It is an error to register multiple
    /// activity types with the same name.
    pub name: &'static str,

    /// Builds the activity type.
    pub describe: fn() -> ActivityType,
}

inventory::collect!(RegisteredActivity);

/// Errors produced by registry lookups.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    /// The activity type was registered twice.
    #[error("activity type {0} registered multiple times")]
    Duplicate(String),

    /// The activity type is not registered.
    #[error("activity type {0} not registered")]
    NotRegistered(String),
}

type Constructor = Arc<
    dyn Fn(ActivityContext) -> BoxFuture<'static, Result<Box<dyn Activity>, anyhow::Error>>
        + Send
        + Sync,
>;

type Hook = Arc<dyn Fn() -> Result<(), anyhow::Error> + Send + Sync>;

/// A launchable activity type: its name, its constructor, and its
/// optional per-process `start` and `stop` hooks.
#[derive(Clone)]
pub struct ActivityType {
    name: String,
    constructor: Constructor,
    start: Option<Hook>,
    stop: Option<Hook>,
}

impl fmt::Debug for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityType")
            .field("name", &self.name)
            .field("start", &self.start.is_some())
            .field("stop", &self.stop.is_some())
            .finish()
    }
}

impl ActivityType {
    /// An activity type constructed by the provided async function.
    pub fn new<F, Fut, A>(name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(ActivityContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<A, anyhow::Error>> + Send + 'static,
        A: Activity,
    {
        Self {
            name: name.into(),
            constructor: Arc::new(move |cx| {
                constructor(cx)
                    .map(|result| result.map(|activity| Box::new(activity) as Box<dyn Activity>))
                    .boxed()
            }),
            start: None,
            stop: None,
        }
    }

    /// The activity type described by an [`ActivityClass`], hooks included.
    pub fn of<A: ActivityClass>(name: impl Into<String>) -> Self {
        Self::new(name, |cx| A::new(cx))
            .with_start(A::start)
            .with_stop(A::stop)
    }

    /// Declare a hook to run before the first instance is created.
    pub fn with_start(
        mut self,
        start: impl Fn() -> Result<(), anyhow::Error> + Send + Sync + 'static,
    ) -> Self {
        self.start = Some(Arc::new(start));
        self
    }

    /// Declare a hook to run after the last instance is destroyed.
    pub fn with_stop(
        mut self,
        stop: impl Fn() -> Result<(), anyhow::Error> + Send + Sync + 'static,
    ) -> Self {
        self.stop = Some(Arc::new(stop));
        self
    }

    /// The activity type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) async fn construct(
        &self,
        cx: ActivityContext,
    ) -> Result<Box<dyn Activity>, anyhow::Error> {
        (self.constructor)(cx).await
    }

    pub(crate) fn run_start(&self) -> Result<(), anyhow::Error> {
        match &self.start {
            Some(start) => start(),
            None => Ok(()),
        }
    }

    pub(crate) fn run_stop(&self) -> Result<(), anyhow::Error> {
        match &self.stop {
            Some(stop) => stop(),
            None => Ok(()),
        }
    }
}

/// Registry of activity types, by name.
#[derive(Debug, Clone, Default)]
pub struct ActivityRegistry {
    by_name: HashMap<String, Arc<ActivityType>>,
}

impl ActivityRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a registry of every activity type registered by way of
    /// [`crate::register_activity`]. Panics if there are conflicting
    /// registrations.
    pub fn collect() -> Self {
        let mut registry = Self::new();
        for entry in inventory::iter::<RegisteredActivity> {
            if let Err(err) = registry.register((entry.describe)()) {
                panic!("{}", err);
            }
        }
        registry
    }

    /// Add an activity type.
    pub fn register(&mut self, activity_type: ActivityType) -> Result<(), RegistryError> {
        let name = activity_type.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.by_name.insert(name, Arc::new(activity_type));
        Ok(())
    }

    /// Look up an activity type by name.
    pub fn get(&self, name: &str) -> Result<Arc<ActivityType>, RegistryError> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotRegistered(name.to_string()))
    }

    /// The names of all registered activity types, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::*;
    use crate::activity::DestroyNotifier;
    use crate::reference::ActivityToken;

    static STARTS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug)]
    struct Registered {
        title: String,
    }

    impl Activity for Registered {
        fn title(&self) -> String {
            self.title.clone()
        }
    }

    #[async_trait]
    impl ActivityClass for Registered {
        async fn new(cx: ActivityContext) -> Result<Self, anyhow::Error> {
            if cx.token() == ActivityToken(0) {
                anyhow::bail!("some failure");
            }
            Ok(Self {
                title: format!("registered {}", cx.token()),
            })
        }

        fn start() -> Result<(), anyhow::Error> {
            STARTS.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    crate::register_activity!("org.sugar.tests.Registered", Registered);

    fn context(token: u64) -> ActivityContext {
        ActivityContext::new(
            ActivityToken(token),
            "org.sugar.tests.Registered".to_string(),
            DestroyNotifier::new(ActivityToken(token), |_| {}),
        )
    }

    #[tokio::test]
    async fn test_collect() {
        let registry = ActivityRegistry::collect();
        assert!(registry.names().contains(&"org.sugar.tests.Registered"));

        let activity_type = registry.get("org.sugar.tests.Registered").unwrap();
        assert_eq!(activity_type.name(), "org.sugar.tests.Registered");

        let before = STARTS.load(Ordering::SeqCst);
        activity_type.run_start().unwrap();
        assert_eq!(STARTS.load(Ordering::SeqCst), before + 1);
        activity_type.run_stop().unwrap();

        let activity = activity_type.construct(context(5)).await.unwrap();
        assert_eq!(activity.title(), "registered 5");

        match activity_type.construct(context(0)).await {
            Err(err) => assert_eq!(err.to_string(), "some failure"),
            Ok(activity) => panic!("constructed {:?}", activity.title()),
        }
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry = ActivityRegistry::new();
        registry
            .register(ActivityType::of::<Registered>("org.example.Foo"))
            .unwrap();
        assert!(matches!(
            registry.register(ActivityType::of::<Registered>("org.example.Foo")),
            Err(RegistryError::Duplicate(name)) if name == "org.example.Foo"
        ));
    }

    #[test]
    fn test_not_registered() {
        let registry = ActivityRegistry::new();
        assert!(matches!(
            registry.get("org.example.Missing"),
            Err(RegistryError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let activity_type = ActivityType::new("org.example.Foo", |_cx| async {
            Ok(Registered {
                title: String::new(),
            })
        })
        .with_stop({
            let calls = Arc::clone(&calls);
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        activity_type.run_start().unwrap();
        activity_type.run_stop().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
