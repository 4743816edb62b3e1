// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-network configuration and collaborators.
//!
//! Nothing here is global: each network owns its context, so two networks in
//! the same process can log errors differently or run with different limits.

use crate::error::{ErrorHandler, LoggingErrorHandler};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Error loading a configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid RON for a config
    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Evaluation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Run a pass as soon as something requests one and the gate is idle.
    /// When off, requests only mark the network pending.
    pub auto_evaluate: bool,
    /// Passes chained after the first one within a single `evaluate` call
    pub max_follow_up_passes: usize,
    /// Turn panics in processor hooks into reported failures
    pub catch_panics: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            auto_evaluate: true,
            max_follow_up_passes: 8,
            catch_panics: true,
        }
    }
}

impl NetworkConfig {
    /// Parse a RON document; missing fields take their defaults
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Load a RON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }

    /// Render as pretty RON
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }
}

/// Configuration plus the error handler a network reports failures to
pub struct NetworkContext {
    /// Settings
    pub config: NetworkConfig,
    /// Receives per-node evaluation failures
    pub error_handler: Box<dyn ErrorHandler>,
}

impl NetworkContext {
    /// Context with the given config and the logging error handler
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            error_handler: Box::new(LoggingErrorHandler),
        }
    }

    /// Replace the error handler
    #[must_use]
    pub fn with_error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Box::new(handler);
        self
    }
}

impl Default for NetworkContext {
    fn default() -> Self {
        Self::new(NetworkConfig::default())
    }
}

impl fmt::Debug for NetworkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
