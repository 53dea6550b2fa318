// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration and its on-disk persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PrintTraceError, Result};
use crate::types::{Preset, ProcessingParameters};

const CONFIG_FILE: &str = "config.json";

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Parameter preset used for new requests.
    pub preset: Preset,
    /// Where DXF files are written when no explicit path is given.
    pub output_dir: Option<PathBuf>,
    /// Ask the engine to emit its intermediate debug images.
    pub debug_output: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            preset: Preset::Default,
            output_dir: None,
            debug_output: false,
        }
    }
}

impl AppConfig {
    /// Processing parameters for the configured preset.
    pub fn parameters(&self) -> ProcessingParameters {
        ProcessingParameters {
            enable_debug_output: self.debug_output,
            ..ProcessingParameters::from_preset(self.preset)
        }
    }

    /// Load the config from `dir`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_or_default(dir: &Path) -> Self {
        match Self::load(dir) {
            Ok(Some(config)) => config,
            Ok(None) => {
                debug!(dir = %dir.display(), "no config file, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!(error = %e, "config unreadable, using defaults");
                Self::default()
            }
        }
    }

    /// Load the config from `dir`. `Ok(None)` if there is no config file.
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&path)
            .map_err(|e| PrintTraceError::Config(format!("read {}: {e}", path.display())))?;
        let config = serde_json::from_str(&data)
            .map_err(|e| PrintTraceError::Config(format!("parse {}: {e}", path.display())))?;
        Ok(Some(config))
    }

    /// Persist the config into `dir` as pretty-printed JSON.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)
            .map_err(|e| PrintTraceError::Config(format!("create {}: {e}", dir.display())))?;
        let path = dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PrintTraceError::Config(format!("serialize: {e}")))?;
        std::fs::write(&path, json)
            .map_err(|e| PrintTraceError::Config(format!("write {}: {e}", path.display())))?;
        Ok(())
    }
}

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let dir = dirs_fallback().join("printtrace");
    std::fs::create_dir_all(&dir).ok();
    dir
}

fn dirs_fallback() -> PathBuf {
    // Try XDG data dir, then fallback to home
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    std::env::temp_dir()
}
