/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Logging setup for factory processes.

use std::fs::OpenOptions;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::config::DEFAULT_LOG_LEVEL;

/// The log file of the bundle with the given name, under `logs_dir`.
pub fn log_file(logs_dir: &Path, name: &str) -> PathBuf {
    let name: String = name
        .chars()
        .map(|c| if c == '/' || c.is_whitespace() { '_' } else { c })
        .collect();
    logs_dir.join(format!("{}.log", name))
}

/// Install the global tracing subscriber for the process running the
/// bundle `name`. Logs go to the bundle's log file when a logs directory is
/// configured, to stderr otherwise. Only the first call in a process has
/// any effect.
pub fn initialize_logging(name: &str, config: &Config) {
    let filter = || {
        EnvFilter::try_new(config.log_level()).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL))
    };

    let mut file_error = None;
    if let Some(logs_dir) = config.logs_dir() {
        let path = log_file(logs_dir, name);
        let file = std::fs::create_dir_all(logs_dir)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(&path));
        match file {
            Ok(file) => {
                let result = tracing_subscriber::fmt()
                    .with_env_filter(filter())
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .try_init();
                if result.is_ok() {
                    tracing::info!("logging for {} to {}", name, path.display());
                }
                return;
            }
            Err(err) => file_error = Some((path, err)),
        }
    }

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .try_init();
    if result.is_ok() {
        if let Some((path, err)) = file_error {
            tracing::warn!(
                "failed to open log file {}, logging to stderr: {}",
                path.display(),
                err
            );
        }
    }
}
