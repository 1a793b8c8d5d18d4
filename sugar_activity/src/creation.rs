/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Client-side creation of activity instances.
//!
//! An [`ActivityCreationHandler`] resolves the factory of a service, asks
//! it to create an instance, and turns the returned token into an
//! [`ActivityProxy`]. The request is in flight as soon as the handler
//! exists; its single outcome is collected by awaiting the handler.
//!
//! All failures (unknown service, undeliverable or timed out call,
//! failed construction) are reported the same way, as an opaque
//! [`CreationError`].

use std::future::IntoFuture;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::activity::ActivityMessage;
use crate::activity::ActivityProxy;
use crate::bundle::BundleError;
use crate::bundle::BundleRegistry;
use crate::bus::Bus;
use crate::bus::BusError;
use crate::bus::Proxy;
use crate::config;
use crate::config::Config;
use crate::factory::FactoryMessage;

/// Why an activity could not be created.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("couldn't create activity: {0}")]
pub struct CreationError(String);

impl CreationError {
    /// The diagnostic describing the failure.
    pub fn detail(&self) -> &str {
        &self.0
    }
}

impl From<BusError> for CreationError {
    fn from(err: BusError) -> Self {
        Self(err.to_string())
    }
}

impl From<BundleError> for CreationError {
    fn from(err: BundleError) -> Self {
        Self(err.to_string())
    }
}

type Outcome = Result<ActivityProxy, CreationError>;

/// An outstanding request to create an activity instance.
#[derive(Debug)]
pub struct ActivityCreationHandler {
    service_name: String,
    outcome: oneshot::Receiver<Outcome>,
}

impl ActivityCreationHandler {
    /// Issue a request for a new instance of the activity providing
    /// `service_name`. Lookup failures are reported without contacting any
    /// factory; otherwise the call proceeds on a spawned task.
    pub fn new(bus: &Bus, bundles: &BundleRegistry, service_name: &str, config: &Config) -> Self {
        let (outcome_tx, outcome) = oneshot::channel();
        let handler = Self {
            service_name: service_name.to_string(),
            outcome,
        };

        let factory = bundles
            .get_bundle(service_name)
            .map_err(CreationError::from)
            .and_then(|bundle| {
                bus.lookup::<FactoryMessage>(&bundle.service_name, &bundle.object_path())
                    .map_err(CreationError::from)
            });
        let factory = match factory {
            Ok(factory) => factory,
            Err(err) => {
                tracing::debug!("{}", err);
                let _ = outcome_tx.send(Err(err));
                return handler;
            }
        };

        let bus = bus.clone();
        let timeout = config.create_timeout();
        tokio::spawn(async move {
            let result = request(&bus, &factory, timeout).await;
            match &result {
                Ok(activity) => tracing::debug!(
                    "created activity {} from {}",
                    activity.token(),
                    factory.name()
                ),
                Err(err) => tracing::debug!("{}", err),
            }
            let _ = outcome_tx.send(result);
        });
        handler
    }

    /// The service the instance was requested from.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Wait for the outcome of the request.
    pub async fn outcome(self) -> Outcome {
        self.outcome
            .await
            .unwrap_or_else(|_| Err(CreationError("creation request was abandoned".to_string())))
    }
}

impl IntoFuture for ActivityCreationHandler {
    type Output = Outcome;
    type IntoFuture = BoxFuture<'static, Outcome>;

    fn into_future(self) -> Self::IntoFuture {
        self.outcome().boxed()
    }
}

async fn request(bus: &Bus, factory: &Proxy<FactoryMessage>, timeout: Duration) -> Outcome {
    let token = factory
        .call_with_timeout(timeout, |reply| FactoryMessage::Create { reply })
        .await?
        .map_err(CreationError)?;
    // The reply only carries the token; the instance is found by its
    // well-known address.
    let proxy = bus.lookup::<ActivityMessage>(&token.service_name(), &token.object_path())?;
    Ok(ActivityProxy::new(token, proxy))
}

/// Create a new instance of the activity providing `service_name`, using
/// the global configuration.
pub fn create(bus: &Bus, bundles: &BundleRegistry, service_name: &str) -> ActivityCreationHandler {
    ActivityCreationHandler::new(bus, bundles, service_name, &config::global::get())
}
