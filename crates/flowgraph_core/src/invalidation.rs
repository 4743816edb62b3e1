// SPDX-License-Identifier: MIT OR Apache-2.0
//! Validity levels tracked per processor.

use serde::{Deserialize, Serialize};

/// How much of a processor's state is stale.
///
/// Levels are ordered: `InvalidResources` implies `InvalidOutput`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum InvalidationLevel {
    /// Outputs are up to date
    #[default]
    Valid,
    /// Outputs must be recomputed
    InvalidOutput,
    /// Resources must be rebuilt before outputs are recomputed
    InvalidResources,
}

impl InvalidationLevel {
    /// Whether nothing is stale
    pub fn is_valid(self) -> bool {
        self == Self::Valid
    }

    /// Whether resource setup has to run before processing
    pub fn requires_resources(self) -> bool {
        self == Self::InvalidResources
    }

    /// Combine two levels, never lowering the current one
    #[must_use]
    pub fn raised(self, other: Self) -> Self {
        self.max(other)
    }
}
