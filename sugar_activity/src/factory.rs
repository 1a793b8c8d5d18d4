/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The activity factory: a bus service that creates instances of one
//! activity type, tracks them until they are destroyed, and shuts down
//! when the last of them is gone.
//!
//! Each factory runs a single task that owns its live instances. Create
//! requests, destruction notifications and messages addressed to
//! instances are all delivered to that task's mailbox and handled in
//! arrival order, so the live set is never shared. Constructors run
//! concurrently with the mailbox; an instance is recorded when its
//! construction completes.
//!
//! ```text
//!  Starting ──start hook──▶ Idle ◀──────────┐
//!                            │ create        │ destroy (n > 0 left)
//!                            ▼               │
//!                          Active(n) ────────┘
//!                            │ destroy (none left)
//!                            ▼
//!               Terminating ──stop hook──▶ Terminated
//! ```
//!
//! A factory that has never been active stays idle until it is stopped
//! explicitly through its [`FactoryHandle`]. An emptied factory with
//! constructions still pending waits for them before deciding to
//! terminate.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::activity::Activity;
use crate::activity::ActivityContext;
use crate::activity::ActivityInfo;
use crate::activity::ActivityMessage;
use crate::activity::DestroyNotifier;
use crate::allocator::ActivityHandleAllocator;
use crate::bundle::Bundle;
use crate::bus::Bus;
use crate::bus::BusError;
use crate::bus::Interface;
use crate::bus::Port;
use crate::config::Config;
use crate::logging;
use crate::reference::ACTIVITY_FACTORY_INTERFACE;
use crate::reference::ActivityToken;
use crate::reference::BusName;
use crate::reference::ObjectPath;
use crate::reference::ReferenceError;
use crate::registry::ActivityRegistry;
use crate::registry::ActivityType;
use crate::registry::RegistryError;
use crate::shutdown;
use crate::shutdown::ShutdownReason;
use crate::shutdown::ShutdownSignal;
use crate::shutdown::ShutdownTrigger;

/// The reply to a create request: the new instance's token, or a
/// diagnostic describing why it could not be created.
pub type CreateReply = Result<ActivityToken, String>;

/// Messages understood by the `com.redhat.Sugar.ActivityFactory` interface.
#[derive(Debug)]
pub enum FactoryMessage {
    /// Create a new instance.
    Create {
        /// Receives the new instance's token.
        reply: oneshot::Sender<CreateReply>,
    },
}

impl Interface for FactoryMessage {
    const NAME: &'static str = ACTIVITY_FACTORY_INTERFACE;
}

/// The lifecycle status of a factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactoryStatus {
    /// The factory is running its start hook.
    Starting,
    /// The factory has no live instances.
    Idle,
    /// The factory has the given number of live instances.
    Active(usize),
    /// The factory is running its stop hook and releasing its exports.
    Terminating,
    /// The factory has shut down.
    Terminated(ShutdownReason),
}

impl FactoryStatus {
    /// Tells whether the status is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

/// Errors produced while starting a factory.
#[derive(thiserror::Error, Debug)]
pub enum FactoryError {
    /// The activity type's start hook failed.
    #[error("start hook of activity type {0} failed: {1:#}")]
    StartHook(String, #[source] anyhow::Error),

    /// The factory could not be exported.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The activity type is not known.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The activity type name is not a valid service name.
    #[error(transparent)]
    Reference(#[from] ReferenceError),
}

/// Parameters for starting a factory.
#[derive(Debug, Clone)]
pub struct FactoryParams {
    service_name: BusName,
    activity_type: Arc<ActivityType>,
    allocator: ActivityHandleAllocator,
}

impl FactoryParams {
    /// Parameters for a factory of `activity_type`, exported under
    /// `service_name`, allocating tokens from the process-wide allocator.
    pub fn new(service_name: BusName, activity_type: Arc<ActivityType>) -> Self {
        Self {
            service_name,
            activity_type,
            allocator: ActivityHandleAllocator::global(),
        }
    }

    /// Parameters for a factory exported under its activity type's name.
    pub fn for_type(activity_type: Arc<ActivityType>) -> Result<Self, ReferenceError> {
        let service_name = activity_type.name().parse()?;
        Ok(Self::new(service_name, activity_type))
    }

    /// Allocate tokens from `allocator` instead.
    pub fn with_allocator(mut self, allocator: ActivityHandleAllocator) -> Self {
        self.allocator = allocator;
        self
    }
}

enum Event {
    Create(oneshot::Sender<CreateReply>),
    Destroyed(ActivityToken),
    Activity(ActivityToken, ActivityMessage),
    Stop,
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create(_) => write!(f, "Create"),
            Self::Destroyed(token) => write!(f, "Destroyed({})", token),
            Self::Activity(token, message) => write!(f, "Activity({}, {:?})", token, message),
            Self::Stop => write!(f, "Stop"),
        }
    }
}

struct ActivityInstance {
    activity: Box<dyn Activity>,
    destroy: DestroyNotifier,
}

/// A finished construction, waiting to be recorded by the factory loop.
struct Constructed {
    token: ActivityToken,
    destroy: DestroyNotifier,
    reply: oneshot::Sender<CreateReply>,
    result: Result<Box<dyn Activity>, anyhow::Error>,
}

/// A running factory. Factories are started with [`ActivityFactory::spawn`]
/// and controlled through the returned [`FactoryHandle`].
pub struct ActivityFactory {
    bus: Bus,
    service_name: BusName,
    path: ObjectPath,
    activity_type: Arc<ActivityType>,
    allocator: ActivityHandleAllocator,
    instances: HashMap<ActivityToken, ActivityInstance>,
    constructing: FuturesUnordered<BoxFuture<'static, Constructed>>,
    was_active: bool,
    mailbox: mpsc::UnboundedSender<Event>,
    status: watch::Sender<FactoryStatus>,
}

impl ActivityFactory {
    /// Start a factory on `bus`: run the activity type's start hook, export
    /// the factory, and spawn its task on the current runtime.
    pub fn spawn(bus: Bus, params: FactoryParams) -> Result<FactoryHandle, FactoryError> {
        let FactoryParams {
            service_name,
            activity_type,
            allocator,
        } = params;
        let path = service_name.object_path();
        let (status_tx, status_rx) = watch::channel(FactoryStatus::Starting);

        activity_type
            .run_start()
            .map_err(|err| FactoryError::StartHook(activity_type.name().to_string(), err))?;

        let (mailbox, rx) = mpsc::unbounded_channel();
        let port = {
            let mailbox = mailbox.clone();
            Port::new(move |message: FactoryMessage| {
                if mailbox.is_closed() {
                    return Err(message);
                }
                let FactoryMessage::Create { reply } = message;
                let _ = mailbox.send(Event::Create(reply));
                Ok(())
            })
        };
        if let Err(err) = bus.export(&service_name, &path, port) {
            if let Err(stop_err) = activity_type.run_stop() {
                tracing::error!(
                    "stop hook of activity type {} failed: {:#}",
                    activity_type.name(),
                    stop_err
                );
            }
            return Err(err.into());
        }

        let (trigger, shutdown) = shutdown::channel();
        tracing::info!(
            "factory {} for activity type {} started at {}",
            service_name,
            activity_type.name(),
            path
        );
        status_tx.send_replace(FactoryStatus::Idle);

        let factory = Self {
            bus,
            service_name: service_name.clone(),
            path,
            activity_type,
            allocator,
            instances: HashMap::new(),
            constructing: FuturesUnordered::new(),
            was_active: false,
            mailbox: mailbox.clone(),
            status: status_tx,
        };
        let join = tokio::spawn(factory.run(rx, trigger));

        Ok(FactoryHandle {
            service_name,
            mailbox,
            status: status_rx,
            shutdown,
            join,
        })
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Event>, trigger: ShutdownTrigger) {
        let reason = loop {
            let stop = tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    // The factory holds a sender of its own, so the mailbox
                    // never runs dry on its own.
                    None => Some(ShutdownReason::Aborted),
                },
                Some(constructed) = self.constructing.next() => self.constructed(constructed),
            };
            if let Some(reason) = stop {
                break reason;
            }
        };
        self.terminate(rx, reason);
        trigger.fire(reason);
    }

    async fn handle_event(&mut self, event: Event) -> Option<ShutdownReason> {
        match event {
            Event::Create(reply) => {
                self.create(reply);
                None
            }
            Event::Destroyed(token) => self.destroyed(token),
            Event::Activity(token, message) => {
                self.handle_activity(token, message).await;
                None
            }
            Event::Stop => Some(ShutdownReason::Stopped),
        }
    }

    /// Start constructing a new instance. The reply is sent once the
    /// construction completes.
    fn create(&mut self, reply: oneshot::Sender<CreateReply>) {
        let token = self.allocator.allocate();
        let destroy = {
            let mailbox = self.mailbox.clone();
            DestroyNotifier::new(token, move |token| {
                // The factory may already be gone, in which case there is
                // nothing left to notify.
                let _ = mailbox.send(Event::Destroyed(token));
            })
        };
        let cx = ActivityContext::new(
            token,
            self.activity_type.name().to_string(),
            destroy.clone(),
        );
        tracing::debug!("{}: constructing activity {}", self.service_name, token);

        let activity_type = Arc::clone(&self.activity_type);
        self.constructing.push(
            async move {
                let result = activity_type.construct(cx).await;
                Constructed {
                    token,
                    destroy,
                    reply,
                    result,
                }
            }
            .boxed(),
        );
    }

    /// Record a finished construction and reply to its requester. Returns
    /// the shutdown reason if the factory should terminate.
    fn constructed(&mut self, constructed: Constructed) -> Option<ShutdownReason> {
        let Constructed {
            token,
            destroy,
            reply,
            result,
        } = constructed;
        let result = match result {
            Ok(_) if destroy.notified() => Err(format!(
                "activity {} terminated during construction",
                token
            )),
            Ok(activity) => self.track(token, activity, destroy),
            Err(err) => Err(format!("{:#}", err)),
        };

        match &result {
            Ok(_) => tracing::info!(
                "{}: created activity {} ({} live)",
                self.service_name,
                token,
                self.instances.len()
            ),
            Err(err) => tracing::error!(
                "{}: failed to create activity {}: {}",
                self.service_name,
                token,
                err
            ),
        }
        if reply.send(result).is_err() {
            tracing::warn!(
                "{}: requester of activity {} went away before the reply",
                self.service_name,
                token
            );
        }
        self.idle()
    }

    /// Record a constructed instance and export it. Nothing is recorded
    /// unless both succeed.
    fn track(
        &mut self,
        token: ActivityToken,
        activity: Box<dyn Activity>,
        destroy: DestroyNotifier,
    ) -> CreateReply {
        let port = {
            let mailbox = self.mailbox.clone();
            Port::new(move |message: ActivityMessage| {
                if mailbox.is_closed() {
                    return Err(message);
                }
                let _ = mailbox.send(Event::Activity(token, message));
                Ok(())
            })
        };
        self.bus
            .export(&token.service_name(), &token.object_path(), port)
            .map_err(|err| err.to_string())?;

        self.instances
            .insert(token, ActivityInstance { activity, destroy });
        self.was_active = true;
        self.publish_status();
        Ok(token)
    }

    /// Handle a destruction notification. Returns the shutdown reason if
    /// the factory should terminate.
    fn destroyed(&mut self, token: ActivityToken) -> Option<ShutdownReason> {
        if self.instances.remove(&token).is_none() {
            tracing::warn!(
                "{}: ignoring destruction of unknown activity {}",
                self.service_name,
                token
            );
            return None;
        }
        self.bus.unexport(&token.service_name(), &token.object_path());
        tracing::info!(
            "{}: activity {} destroyed ({} live)",
            self.service_name,
            token,
            self.instances.len()
        );
        self.publish_status();
        self.idle()
    }

    /// The factory terminates once it has been active and has neither
    /// live instances nor pending constructions.
    fn idle(&self) -> Option<ShutdownReason> {
        if self.was_active && self.instances.is_empty() && self.constructing.is_empty() {
            Some(ShutdownReason::Idle)
        } else {
            None
        }
    }

    async fn handle_activity(&mut self, token: ActivityToken, message: ActivityMessage) {
        let Some(instance) = self.instances.get_mut(&token) else {
            tracing::debug!(
                "{}: dropping message for destroyed activity {}",
                self.service_name,
                token
            );
            return;
        };
        match message {
            ActivityMessage::Info { reply } => {
                let _ = reply.send(ActivityInfo {
                    token,
                    activity_type: self.activity_type.name().to_string(),
                    title: instance.activity.title(),
                });
            }
            ActivityMessage::Close => {
                tracing::debug!("{}: closing activity {}", self.service_name, token);
                if let Err(err) = instance.activity.close(instance.destroy.clone()).await {
                    tracing::error!(
                        "{}: failed to close activity {}: {:#}",
                        self.service_name,
                        token,
                        err
                    );
                }
            }
        }
    }

    fn terminate(&mut self, mut rx: mpsc::UnboundedReceiver<Event>, reason: ShutdownReason) {
        tracing::info!("{}: terminating ({})", self.service_name, reason);
        self.status.send_replace(FactoryStatus::Terminating);
        self.bus.unexport(&self.service_name, &self.path);

        rx.close();
        while let Ok(event) = rx.try_recv() {
            if let Event::Create(reply) = event {
                let _ = reply.send(Err(format!(
                    "factory {} is shutting down",
                    self.service_name
                )));
            }
        }

        if !self.constructing.is_empty() {
            tracing::warn!(
                "{}: abandoning {} pending constructions",
                self.service_name,
                self.constructing.len()
            );
            // Dropping a construction drops its reply port; the requester
            // sees the call fail.
            self.constructing.clear();
        }

        if let Err(err) = self.activity_type.run_stop() {
            tracing::error!(
                "{}: stop hook of activity type {} failed: {:#}",
                self.service_name,
                self.activity_type.name(),
                err
            );
        }

        for token in self.instances.keys() {
            self.bus.unexport(&token.service_name(), &token.object_path());
        }
        self.instances.clear();

        self.status.send_replace(FactoryStatus::Terminated(reason));
        tracing::info!("{}: terminated", self.service_name);
    }

    fn publish_status(&self) {
        let status = match self.instances.len() {
            0 => FactoryStatus::Idle,
            n => FactoryStatus::Active(n),
        };
        self.status.send_replace(status);
    }
}

/// Controls a running factory on behalf of the process hosting it.
#[derive(Debug)]
pub struct FactoryHandle {
    service_name: BusName,
    mailbox: mpsc::UnboundedSender<Event>,
    status: watch::Receiver<FactoryStatus>,
    shutdown: ShutdownSignal,
    join: JoinHandle<()>,
}

impl FactoryHandle {
    /// The service name the factory is exported under.
    pub fn service_name(&self) -> &BusName {
        &self.service_name
    }

    /// The factory's current status.
    pub fn status(&self) -> FactoryStatus {
        *self.status.borrow()
    }

    /// The number of live instances.
    pub fn live_instances(&self) -> usize {
        match self.status() {
            FactoryStatus::Active(n) => n,
            _ => 0,
        }
    }

    /// Wait until the factory's status satisfies `predicate`, returning
    /// that status. Returns the last status if the factory goes away first.
    pub async fn wait_for_status(
        &self,
        mut predicate: impl FnMut(&FactoryStatus) -> bool,
    ) -> FactoryStatus {
        let mut rx = self.status.clone();
        let result = rx
            .wait_for(|status| predicate(status))
            .await
            .map(|status| *status);
        result.unwrap_or_else(|_| *rx.borrow())
    }

    /// A signal that fires when the factory shuts down.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Ask the factory to shut down, even though instances may be live.
    pub fn stop(&self) {
        if self.mailbox.send(Event::Stop).is_err() {
            tracing::debug!("{}: already shut down", self.service_name);
        }
    }

    /// Wait for the factory to shut down.
    pub async fn join(self) -> ShutdownReason {
        if let Err(err) = self.join.await {
            tracing::error!("{}: factory task failed: {}", self.service_name, err);
        }
        self.shutdown.wait().await
    }
}

/// Start the factory of a bundle. Once `activity_class` is resolved, this
/// initializes logging for the bundle, publishes the bundle in the
/// environment and exports a factory under the bundle's service name.
pub fn start_factory(
    bus: &Bus,
    registry: &ActivityRegistry,
    activity_class: &str,
    bundle: &Bundle,
    config: &Config,
) -> Result<FactoryHandle, FactoryError> {
    let activity_type = registry.get(activity_class)?;
    logging::initialize_logging(&bundle.name, config);
    bundle.export_env();

    ActivityFactory::spawn(
        bus.clone(),
        FactoryParams::new(bundle.service_name.clone(), activity_type),
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;
    use crate::test_utils::TestActivities;

    fn factory(activities: &TestActivities, first_token: u64) -> (Bus, FactoryHandle) {
        let bus = Bus::new();
        let activity_type = Arc::new(activities.activity_type("org.example.Foo"));
        let params = FactoryParams::for_type(activity_type)
            .unwrap()
            .with_allocator(ActivityHandleAllocator::starting_at(first_token));
        let handle = ActivityFactory::spawn(bus.clone(), params).unwrap();
        (bus, handle)
    }

    async fn create(bus: &Bus) -> CreateReply {
        let name: BusName = "org.example.Foo".parse().unwrap();
        bus.lookup::<FactoryMessage>(&name, &name.object_path())
            .unwrap()
            .call(|reply| FactoryMessage::Create { reply })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_exports_instance() {
        let activities = TestActivities::new();
        let (bus, handle) = factory(&activities, 42);
        assert_eq!(activities.starts(), 1);
        assert_eq!(handle.status(), FactoryStatus::Idle);

        let token = create(&bus).await.unwrap();
        assert_eq!(token, ActivityToken(42));
        assert_eq!(handle.live_instances(), 1);
        assert!(bus.is_exported(&token.service_name(), &token.object_path()));
    }

    #[tokio::test]
    async fn test_construction_failure_records_nothing() {
        let activities = TestActivities::new();
        let (bus, handle) = factory(&activities, 1);

        activities.set_failing(true);
        let err = create(&bus).await.unwrap_err();
        assert!(err.contains("test activity construction failed"), "{}", err);
        assert_eq!(handle.status(), FactoryStatus::Idle);
        assert!(!bus.is_exported(
            &ActivityToken(1).service_name(),
            &ActivityToken(1).object_path()
        ));

        // A failure does not count as having been active.
        activities.set_failing(false);
        let token = create(&bus).await.unwrap();
        assert_eq!(token, ActivityToken(2));
        assert_eq!(handle.live_instances(), 1);
    }

    #[tokio::test]
    async fn test_idle_without_create_never_terminates() {
        let activities = TestActivities::new();
        let (_bus, handle) = factory(&activities, 1);

        let waited = tokio::time::timeout(
            Duration::from_millis(100),
            handle.wait_for_status(FactoryStatus::is_terminal),
        )
        .await;
        assert!(waited.is_err());
        assert_eq!(handle.status(), FactoryStatus::Idle);
        assert_eq!(activities.stops(), 0);
    }

    #[tokio::test]
    async fn test_terminates_once_when_emptied() {
        let activities = TestActivities::new();
        let (bus, handle) = factory(&activities, 1);
        let name: BusName = "org.example.Foo".parse().unwrap();

        let first = create(&bus).await.unwrap();
        let second = create(&bus).await.unwrap();
        assert_eq!(handle.live_instances(), 2);

        assert!(activities.destroy(first));
        handle
            .wait_for_status(|status| *status == FactoryStatus::Active(1))
            .await;
        assert_eq!(activities.stops(), 0);

        // Notifications for unknown instances are ignored.
        handle
            .mailbox
            .send(Event::Destroyed(ActivityToken(999)))
            .unwrap();
        assert!(activities.destroy(second));
        // A racing duplicate notification is ignored, or finds the
        // factory already gone.
        let _ = handle.mailbox.send(Event::Destroyed(second));

        let signal = handle.shutdown_signal();
        assert_eq!(handle.join().await, ShutdownReason::Idle);
        assert_eq!(signal.reason(), Some(ShutdownReason::Idle));
        assert_eq!(activities.stops(), 1);
        assert!(!bus.is_exported(&name, &name.object_path()));
        assert!(!bus.is_exported(&second.service_name(), &second.object_path()));
    }

    /// Start a create request whose construction waits on a gate, and
    /// return once the construction is under way.
    async fn create_gated(
        bus: &Bus,
        activities: &TestActivities,
    ) -> (Arc<Notify>, JoinHandle<CreateReply>) {
        let gate = Arc::new(Notify::new());
        activities.set_gate(Some(Arc::clone(&gate)));
        let request = tokio::spawn({
            let bus = bus.clone();
            async move { create(&bus).await }
        });
        while activities.waiting() == 0 {
            tokio::task::yield_now().await;
        }
        activities.set_gate(None);
        (gate, request)
    }

    #[tokio::test]
    async fn test_slow_construction_does_not_block() {
        let activities = TestActivities::new();
        let (bus, handle) = factory(&activities, 1);
        let first = create(&bus).await.unwrap();
        let (gate, slow) = create_gated(&bus, &activities).await;

        // The live instance and new requests are served meanwhile.
        let proxy = bus
            .lookup::<ActivityMessage>(&first.service_name(), &first.object_path())
            .unwrap();
        let info = tokio::time::timeout(
            Duration::from_secs(5),
            proxy.call(|reply| ActivityMessage::Info { reply }),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(info.token, first);
        let third = create(&bus).await.unwrap();
        assert_eq!(third, ActivityToken(3));
        assert_eq!(handle.live_instances(), 2);

        // A pending construction keeps an emptied factory alive.
        assert!(activities.destroy(first));
        assert!(activities.destroy(third));
        handle
            .wait_for_status(|status| *status == FactoryStatus::Idle)
            .await;
        assert_eq!(activities.stops(), 0);

        gate.notify_one();
        assert_eq!(slow.await.unwrap(), Ok(ActivityToken(2)));
        assert_eq!(handle.status(), FactoryStatus::Active(1));
        assert_eq!(activities.stops(), 0);
    }

    #[tokio::test]
    async fn test_failed_pending_construction_terminates_emptied_factory() {
        let activities = TestActivities::new();
        let (bus, handle) = factory(&activities, 1);
        let first = create(&bus).await.unwrap();
        let (gate, slow) = create_gated(&bus, &activities).await;

        activities.set_failing(true);
        assert!(activities.destroy(first));
        handle
            .wait_for_status(|status| *status == FactoryStatus::Idle)
            .await;
        assert_eq!(activities.stops(), 0);

        gate.notify_one();
        assert!(slow.await.unwrap().is_err());
        assert_eq!(handle.join().await, ShutdownReason::Idle);
        assert_eq!(activities.stops(), 1);
    }

    #[tokio::test]
    async fn test_stop_abandons_pending_construction() {
        let activities = TestActivities::new();
        let (bus, handle) = factory(&activities, 1);
        let (_gate, slow) = create_gated(&bus, &activities).await;

        handle.stop();
        assert_eq!(handle.join().await, ShutdownReason::Stopped);
        // The requester's reply port was dropped with the construction.
        assert!(slow.await.is_err());
        assert_eq!(activities.stops(), 1);
    }

    #[tokio::test]
    async fn test_stop_while_active() {
        let activities = TestActivities::new();
        let (bus, handle) = factory(&activities, 1);
        let token = create(&bus).await.unwrap();

        handle.stop();
        assert_eq!(
            handle.wait_for_status(FactoryStatus::is_terminal).await,
            FactoryStatus::Terminated(ShutdownReason::Stopped)
        );
        assert_eq!(activities.stops(), 1);
        assert!(!bus.is_exported(&token.service_name(), &token.object_path()));
        assert_eq!(handle.join().await, ShutdownReason::Stopped);
    }

    #[tokio::test]
    async fn test_start_hook_failure() {
        let activities = TestActivities::new();
        let bus = Bus::new();
        let activity_type = activities
            .activity_type("org.example.Foo")
            .with_start(|| Err(anyhow::anyhow!("no display")));
        let result = ActivityFactory::spawn(
            bus.clone(),
            FactoryParams::for_type(Arc::new(activity_type)).unwrap(),
        );
        assert!(matches!(result, Err(FactoryError::StartHook(_, _))));
        let name: BusName = "org.example.Foo".parse().unwrap();
        assert!(!bus.is_exported(&name, &name.object_path()));
    }

    #[tokio::test]
    async fn test_duplicate_factory() {
        let activities = TestActivities::new();
        let (bus, _handle) = factory(&activities, 1);
        let activity_type = Arc::new(activities.activity_type("org.example.Foo"));
        let result = ActivityFactory::spawn(bus, FactoryParams::for_type(activity_type).unwrap());
        assert!(matches!(
            result,
            Err(FactoryError::Bus(BusError::AlreadyExported(_, _)))
        ));
        // The rejected factory's start hook was paired with its stop hook.
        assert_eq!(activities.starts(), 2);
        assert_eq!(activities.stops(), 1);
    }
}
