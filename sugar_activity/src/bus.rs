/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! An in-process message bus.
//!
//! The bus is both the service registry and the transport: objects are
//! exported under a ([`BusName`], [`ObjectPath`]) pair together with a
//! [`Port`] that accepts messages of the object's [`Interface`], and
//! clients resolve a [`Proxy`] for the same pair in order to post
//! messages or make calls.
//!
//! ```
//! # use sugar_activity::bus::{Bus, Interface, Port};
//! # use tokio::sync::oneshot;
//! struct Echo(String, oneshot::Sender<String>);
//!
//! impl Interface for Echo {
//!     const NAME: &'static str = "org.example.Echo";
//! }
//!
//! # tokio_test::block_on(async {
//! let bus = Bus::new();
//! let name = "org.example.Echo".parse().unwrap();
//! let path = "/org/example/Echo".parse().unwrap();
//! bus.export(
//!     &name,
//!     &path,
//!     Port::new(|Echo(msg, reply): Echo| {
//!         let _ = reply.send(msg);
//!         Ok(())
//!     }),
//! )
//! .unwrap();
//!
//! let proxy = bus.lookup::<Echo>(&name, &path).unwrap();
//! let echoed = proxy.call(|reply| Echo("hello".into(), reply)).await.unwrap();
//! assert_eq!(echoed, "hello");
//! # })
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

use crate::reference::BusName;
use crate::reference::ObjectPath;

/// A message type that can be exported on the bus. The interface name
/// identifies the protocol to remote peers.
pub trait Interface: Send + 'static {
    /// The globally unique name of this interface.
    const NAME: &'static str;
}

/// Errors produced by bus operations.
#[derive(thiserror::Error, Debug)]
pub enum BusError {
    /// An object is already exported at this address.
    #[error("object {1} is already exported by {0}")]
    AlreadyExported(BusName, ObjectPath),

    /// Nothing is exported at this address.
    #[error("no object {1} exported by {0}")]
    NoSuchObject(BusName, ObjectPath),

    /// The exported object does not implement the requested interface.
    #[error("object {1} exported by {0} implements {3}, not {2}")]
    InterfaceMismatch(BusName, ObjectPath, &'static str, &'static str),

    /// The object stopped serving, or dropped the reply.
    #[error("object {1} exported by {0} is closed")]
    Closed(BusName, ObjectPath),

    /// No reply arrived within the allotted time.
    #[error("call to object {1} exported by {0} timed out after {2:?}")]
    Timeout(BusName, ObjectPath, Duration),
}

/// The serving end of an exported object. Delivery hands the message
/// back when the object can no longer accept it.
pub struct Port<M> {
    deliver: Arc<dyn Fn(M) -> Result<(), M> + Send + Sync>,
}

impl<M: Send + 'static> Port<M> {
    /// Create a port from a delivery function.
    pub fn new(deliver: impl Fn(M) -> Result<(), M> + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Create a port that forwards messages into an unbounded channel.
    pub fn from_sender(sender: mpsc::UnboundedSender<M>) -> Self {
        Self::new(move |message| sender.send(message).map_err(|err| err.0))
    }

    fn deliver(&self, message: M) -> Result<(), M> {
        (self.deliver)(message)
    }
}

impl<M> Clone for Port<M> {
    fn clone(&self) -> Self {
        Self {
            deliver: Arc::clone(&self.deliver),
        }
    }
}

impl<M> fmt::Debug for Port<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Port").finish_non_exhaustive()
    }
}

struct Export {
    interface: &'static str,
    // Always a `Port<I>` for the interface named above.
    port: Box<dyn Any + Send + Sync>,
}

/// The bus. Clones share the same object table.
#[derive(Clone, Default)]
pub struct Bus {
    objects: Arc<DashMap<(BusName, ObjectPath), Export>>,
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("objects", &self.objects.len())
            .finish()
    }
}

impl Bus {
    /// Create a new, empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Export an object implementing `I` at the given address.
    pub fn export<I: Interface>(
        &self,
        name: &BusName,
        path: &ObjectPath,
        port: Port<I>,
    ) -> Result<(), BusError> {
        match self.objects.entry((name.clone(), path.clone())) {
            Entry::Occupied(_) => Err(BusError::AlreadyExported(name.clone(), path.clone())),
            Entry::Vacant(entry) => {
                entry.insert(Export {
                    interface: I::NAME,
                    port: Box::new(port),
                });
                tracing::debug!("exported {} at {} by {}", I::NAME, path, name);
                Ok(())
            }
        }
    }

    /// Remove the object at the given address. Returns whether an object
    /// was exported there.
    pub fn unexport(&self, name: &BusName, path: &ObjectPath) -> bool {
        let removed = self
            .objects
            .remove(&(name.clone(), path.clone()))
            .is_some();
        if removed {
            tracing::debug!("unexported {} by {}", path, name);
        }
        removed
    }

    /// Tells whether an object is exported at the given address.
    pub fn is_exported(&self, name: &BusName, path: &ObjectPath) -> bool {
        self.objects.contains_key(&(name.clone(), path.clone()))
    }

    /// Resolve a proxy for the object at the given address.
    pub fn lookup<I: Interface>(
        &self,
        name: &BusName,
        path: &ObjectPath,
    ) -> Result<Proxy<I>, BusError> {
        let export = self
            .objects
            .get(&(name.clone(), path.clone()))
            .ok_or_else(|| BusError::NoSuchObject(name.clone(), path.clone()))?;
        let port = export.port.downcast_ref::<Port<I>>().ok_or_else(|| {
            BusError::InterfaceMismatch(name.clone(), path.clone(), I::NAME, export.interface)
        })?;
        Ok(Proxy {
            name: name.clone(),
            path: path.clone(),
            port: port.clone(),
        })
    }
}

/// A client-side reference to an exported object.
pub struct Proxy<M> {
    name: BusName,
    path: ObjectPath,
    port: Port<M>,
}

impl<M> Clone for Proxy<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            path: self.path.clone(),
            port: self.port.clone(),
        }
    }
}

impl<M> fmt::Debug for Proxy<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish()
    }
}

impl<M: Interface> Proxy<M> {
    /// The bus name of the object.
    pub fn name(&self) -> &BusName {
        &self.name
    }

    /// The object path of the object.
    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Post a message to the object without waiting for a reply.
    pub fn post(&self, message: M) -> Result<(), BusError> {
        self.port
            .deliver(message)
            .map_err(|_| self.closed())
    }

    /// Make a call: `make_message` receives the reply port to embed
    /// in the message; the call resolves with whatever is sent on it.
    pub async fn call<R>(
        &self,
        make_message: impl FnOnce(oneshot::Sender<R>) -> M,
    ) -> Result<R, BusError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.post(make_message(reply_tx))?;
        reply_rx.await.map_err(|_| self.closed())
    }

    /// Like [`Proxy::call`], failing with [`BusError::Timeout`] if no
    /// reply arrives within `timeout`.
    pub async fn call_with_timeout<R>(
        &self,
        timeout: Duration,
        make_message: impl FnOnce(oneshot::Sender<R>) -> M,
    ) -> Result<R, BusError> {
        match tokio::time::timeout(timeout, self.call(make_message)).await {
            Ok(result) => result,
            Err(_) => Err(BusError::Timeout(
                self.name.clone(),
                self.path.clone(),
                timeout,
            )),
        }
    }

    fn closed(&self) -> BusError {
        BusError::Closed(self.name.clone(), self.path.clone())
    }
}
