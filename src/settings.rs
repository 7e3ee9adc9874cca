/*
 * Copyright 2020 Actyx AG
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */
//! The settings document
//!
//! Settings are read once at startup. When there is no settings file the defaults are
//! used and written out at shutdown, so that the user finds a file to edit. An existing
//! file is never written to, even if it could not be parsed.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_TIME_INTERVAL_MS: u64 = 10_000;
/// name of the storage directory created next to the settings file by default
pub const DEFAULT_STORAGE_DIR: &str = "machine-time";

fn default_time_interval() -> u64 {
    DEFAULT_TIME_INTERVAL_MS
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// directory holding the production and machine-time documents
    pub storage_location: PathBuf,
    /// flush interval in milliseconds
    #[serde(default = "default_time_interval")]
    pub time_interval: u64,
}

impl Settings {
    pub fn defaults_for(settings_path: &Path) -> Self {
        let dir = settings_path.parent().unwrap_or_else(|| Path::new("."));
        Self {
            storage_location: dir.join(DEFAULT_STORAGE_DIR),
            time_interval: DEFAULT_TIME_INTERVAL_MS,
        }
    }

    /// The flush interval; never shorter than one millisecond
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.time_interval.max(1))
    }

    /// Create the storage directory if needed
    ///
    /// Failure is only logged: later writes into the directory will report their own
    /// errors, and reads from a missing directory behave like a fresh install.
    pub fn ensure_storage_location(&self) {
        if let Err(e) = fs::create_dir_all(&self.storage_location) {
            warn!(
                path = %self.storage_location.display(),
                "cannot create storage location: {}",
                e
            );
        }
    }
}

/// Settings together with where they came from
#[derive(Clone, Debug)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub path: PathBuf,
    /// true if there was no settings file at startup
    pub first_run: bool,
}

impl LoadedSettings {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let parsed = match fs::read_to_string(&path) {
            Ok(body) => serde_json::from_str::<Option<Settings>>(&body)
                .map_err(|e| warn!(path = %path.display(), "ignoring malformed settings: {}", e))
                .ok()
                .flatten(),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), "cannot read settings: {}", e);
                None
            }
        };
        let first_run = !path.exists();
        let settings = parsed.unwrap_or_else(|| Settings::defaults_for(&path));
        info!(
            path = %path.display(),
            first_run,
            storage = %settings.storage_location.display(),
            interval_ms = settings.time_interval,
            "settings loaded"
        );
        Self {
            settings,
            path,
            first_run,
        }
    }

    /// Write the settings file if it did not exist at startup and still does not exist
    ///
    /// Returns whether the file was written.
    pub fn persist_if_first_run(&self) -> Result<bool> {
        if !self.first_run || self.path.exists() {
            return Ok(false);
        }
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating directory {}", dir.display()))?;
            }
        }
        let body = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.path, body)
            .with_context(|| format!("writing settings {}", self.path.display()))?;
        info!(path = %self.path.display(), "settings written");
        Ok(true)
    }
}
