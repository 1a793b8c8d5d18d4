/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Bundle metadata consumed by factories and creation clients.
//!
//! Parsing installed bundle packages is done elsewhere; this module only
//! carries the resulting metadata. A factory process learns its bundle
//! from the environment ([`Bundle::from_env`]); a creation client finds
//! the factory of a service through a [`BundleRegistry`].

use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::reference::BusName;
use crate::reference::ObjectPath;
use crate::reference::ReferenceError;
use crate::reference::get_path;

/// Environment variable holding the bundle's install path.
pub const BUNDLE_PATH_ENV: &str = "SUGAR_BUNDLE_PATH";
/// Environment variable holding the bundle's service name.
pub const BUNDLE_SERVICE_NAME_ENV: &str = "SUGAR_BUNDLE_SERVICE_NAME";
/// Environment variable holding the bundle's default activity type.
pub const BUNDLE_DEFAULT_TYPE_ENV: &str = "SUGAR_BUNDLE_DEFAULT_TYPE";
/// Environment variable holding the bundle's display name.
pub const BUNDLE_NAME_ENV: &str = "SUGAR_BUNDLE_NAME";

/// Errors produced while resolving bundles.
#[derive(thiserror::Error, Debug)]
pub enum BundleError {
    /// No bundle provides the service.
    #[error("no bundle provides service {0}")]
    NotFound(String),

    /// A required environment variable is not set.
    #[error("parameter '{0}' missing: {1}")]
    MissingParameter(&'static str, env::VarError),

    /// A name in the bundle metadata is invalid.
    #[error("invalid bundle name: {0}")]
    InvalidName(#[from] ReferenceError),

    /// The registry file could not be read or parsed.
    #[error("failed to load bundle registry: {0}")]
    Load(#[source] anyhow::Error),
}

/// Metadata of an installed activity bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// The bundle's display name.
    pub name: String,
    /// The service name the bundle's factory is exported under.
    pub service_name: BusName,
    /// The activity type instantiated by default.
    pub default_type: String,
    /// Where the bundle is installed.
    pub path: PathBuf,
}

impl Bundle {
    /// The object path of the bundle's factory.
    pub fn object_path(&self) -> ObjectPath {
        get_path(self.service_name.as_str())
    }

    /// Read the bundle of the current process from the environment.
    pub fn from_env() -> Result<Self, BundleError> {
        fn var(key: &'static str) -> Result<String, BundleError> {
            env::var(key).map_err(|err| BundleError::MissingParameter(key, err))
        }

        let service_name: BusName = var(BUNDLE_SERVICE_NAME_ENV)?.parse()?;
        Ok(Self {
            name: env::var(BUNDLE_NAME_ENV).unwrap_or_else(|_| service_name.to_string()),
            default_type: var(BUNDLE_DEFAULT_TYPE_ENV)?,
            path: PathBuf::from(var(BUNDLE_PATH_ENV)?),
            service_name,
        })
    }

    /// Publish the bundle in the environment of the current process, where
    /// activity code and child processes can find it.
    pub fn export_env(&self) {
        env::set_var(BUNDLE_PATH_ENV, &self.path);
        env::set_var(BUNDLE_SERVICE_NAME_ENV, self.service_name.as_str());
        env::set_var(BUNDLE_DEFAULT_TYPE_ENV, &self.default_type);
        env::set_var(BUNDLE_NAME_ENV, &self.name);
    }
}

/// Installed bundles, by service name.
#[derive(Debug, Clone, Default)]
pub struct BundleRegistry {
    bundles: HashMap<BusName, Bundle>,
}

impl BundleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry from a YAML list of bundles.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, BundleError> {
        let contents =
            std::fs::read_to_string(path).map_err(|err| BundleError::Load(err.into()))?;
        let bundles: Vec<Bundle> =
            serde_yaml::from_str(&contents).map_err(|err| BundleError::Load(err.into()))?;
        let mut registry = Self::new();
        for bundle in bundles {
            registry.add_bundle(bundle);
        }
        Ok(registry)
    }

    /// Add a bundle, replacing any bundle with the same service name.
    pub fn add_bundle(&mut self, bundle: Bundle) -> Option<Bundle> {
        self.bundles.insert(bundle.service_name.clone(), bundle)
    }

    /// Look up the bundle providing a service.
    pub fn get_bundle(&self, service_name: &str) -> Result<&Bundle, BundleError> {
        service_name
            .parse::<BusName>()
            .ok()
            .and_then(|name| self.bundles.get(&name))
            .ok_or_else(|| BundleError::NotFound(service_name.to_string()))
    }

    /// All bundles, in no particular order.
    pub fn bundles(&self) -> impl Iterator<Item = &Bundle> {
        self.bundles.values()
    }
}
