/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Configuration for activity factories and creation clients.
//!
//! Settings have defaults, can be overridden from environment variables,
//! and can be loaded from YAML files. A YAML file only needs to name the
//! settings it overrides.

use std::env;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Default time a creation client waits for a factory's reply.
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(25);

/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration settings. Unset settings read as their defaults; only
/// settings that were set explicitly override others in [`Config::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    create_timeout: Option<Duration>,
    log_level: Option<String>,
    logs_dir: Option<PathBuf>,
}

/// The on-disk form of [`Config`]. Every field is optional.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    create_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logs_dir: Option<PathBuf>,
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables. Variables that are
    /// not set leave their settings unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("SUGAR_ACTIVITY_CREATE_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => config.create_timeout = Some(Duration::from_secs(secs)),
                Err(err) => tracing::warn!(
                    "ignoring invalid SUGAR_ACTIVITY_CREATE_TIMEOUT_SECS {:?}: {}",
                    val,
                    err
                ),
            }
        }

        if let Ok(val) = env::var("SUGAR_LOGGER_LEVEL") {
            config.log_level = Some(val);
        }

        if let Ok(val) = env::var("SUGAR_LOGS_DIR") {
            config.logs_dir = Some(PathBuf::from(val));
        }

        config
    }

    /// Load configuration from a YAML file. Settings the file does not
    /// name are left unset.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let file: ConfigFile = serde_yaml::from_str(&contents)?;
        Ok(Self {
            create_timeout: file.create_timeout_secs.map(Duration::from_secs),
            log_level: file.log_level,
            logs_dir: file.logs_dir,
        })
    }

    /// Save the settings that were set explicitly to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), anyhow::Error> {
        let file = ConfigFile {
            create_timeout_secs: self.create_timeout.map(|timeout| timeout.as_secs()),
            log_level: self.log_level.clone(),
            logs_dir: self.logs_dir.clone(),
        };
        std::fs::write(path, serde_yaml::to_string(&file)?)?;
        Ok(())
    }

    /// Merge with another configuration; settings set in `other` take
    /// precedence, even when they are set to their default values.
    pub fn merge(&mut self, other: &Self) {
        if other.create_timeout.is_some() {
            self.create_timeout = other.create_timeout;
        }
        if other.log_level.is_some() {
            self.log_level = other.log_level.clone();
        }
        if other.logs_dir.is_some() {
            self.logs_dir = other.logs_dir.clone();
        }
    }

    /// How long a creation client waits for a factory's reply.
    pub fn create_timeout(&self) -> Duration {
        self.create_timeout.unwrap_or(DEFAULT_CREATE_TIMEOUT)
    }

    /// The log filter directive.
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Where per-bundle log files are written; stderr if unset.
    pub fn logs_dir(&self) -> Option<&Path> {
        self.logs_dir.as_deref()
    }

    /// Set the creation timeout.
    pub fn set_create_timeout(&mut self, value: Duration) {
        self.create_timeout = Some(value);
    }

    /// Set the log filter directive.
    pub fn set_log_level(&mut self, value: impl Into<String>) {
        self.log_level = Some(value.into());
    }

    /// Set the logs directory.
    pub fn set_logs_dir(&mut self, value: Option<PathBuf>) {
        self.logs_dir = value;
    }
}

/// Global configuration functions
///
/// Tests can override global configuration using [`global::lock`]. This
/// ensures that such tests are serialized and cannot clobber each other's
/// overrides.
pub mod global {
    use std::sync::LazyLock;
    use std::sync::Mutex;
    use std::sync::MutexGuard;
    use std::sync::RwLock;

    use super::*;

    /// Global configuration instance, initialized from environment variables.
    static CONFIG: LazyLock<RwLock<Config>> = LazyLock::new(|| RwLock::new(Config::from_env()));

    /// Get a copy of the global configuration.
    pub fn get() -> Config {
        CONFIG.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the global configuration.
    pub fn set(config: Config) {
        *CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
    }

    /// Initialize the global configuration from environment variables.
    pub fn init_from_env() {
        set(Config::from_env());
    }

    /// Initialize the global configuration from a YAML file.
    pub fn init_from_yaml<P: AsRef<Path>>(path: P) -> Result<(), anyhow::Error> {
        set(Config::from_yaml(path)?);
        Ok(())
    }

    /// Acquire the global configuration lock for testing. Overrides made
    /// through the returned lock are reverted when it is dropped.
    pub fn lock() -> ConfigLock {
        static MUTEX: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));
        let guard = MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        ConfigLock {
            _guard: guard,
            saved: get(),
        }
    }

    /// A lock serializing tests that modify the global configuration.
    pub struct ConfigLock {
        _guard: MutexGuard<'static, ()>,
        saved: Config,
    }

    impl ConfigLock {
        /// Override the global configuration until the lock is dropped.
        pub fn override_with(&self, f: impl FnOnce(&mut Config)) {
            let mut config = get();
            f(&mut config);
            set(config);
        }
    }

    impl Drop for ConfigLock {
        fn drop(&mut self) {
            set(self.saved.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.create_timeout(), Duration::from_secs(25));
        assert_eq!(config.log_level(), "info");
        assert_eq!(config.logs_dir(), None);
    }

    #[test]
    fn test_partial_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "create_timeout_secs: 3\n").unwrap();

        let config = Config::from_yaml(&path).unwrap();
        assert_eq!(config.create_timeout(), Duration::from_secs(3));
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn test_yaml_unknown_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "bogus: 1\n").unwrap();
        assert!(Config::from_yaml(&path).is_err());
    }

    #[test]
    fn test_yaml_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let mut config = Config::new();
        config.set_log_level("debug");
        config.set_logs_dir(Some(dir.path().to_path_buf()));
        config.to_yaml(&path).unwrap();
        assert_eq!(Config::from_yaml(&path).unwrap(), config);
    }

    #[test]
    fn test_merge() {
        let mut config = Config::new();
        config.set_log_level("debug");
        let mut other = Config::new();
        other.set_create_timeout(Duration::from_secs(1));
        config.merge(&other);
        assert_eq!(config.create_timeout(), Duration::from_secs(1));
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn test_merge_back_to_default() {
        let mut config = Config::new();
        config.set_create_timeout(Duration::from_secs(1));
        config.set_log_level("debug");

        let mut other = Config::new();
        other.set_create_timeout(DEFAULT_CREATE_TIMEOUT);
        other.set_log_level(DEFAULT_LOG_LEVEL);
        config.merge(&other);
        assert_eq!(config.create_timeout(), DEFAULT_CREATE_TIMEOUT);
        assert_eq!(config.log_level(), DEFAULT_LOG_LEVEL);

        // Unset settings leave the target alone.
        config.set_log_level("trace");
        config.merge(&Config::new());
        assert_eq!(config.log_level(), "trace");
    }

    #[test]
    fn test_global_override() {
        let lock = global::lock();
        let before = global::get();
        lock.override_with(|config| config.set_create_timeout(Duration::from_millis(10)));
        assert_eq!(global::get().create_timeout(), Duration::from_millis(10));
        drop(lock);
        assert_eq!(global::get(), before);
    }
}
