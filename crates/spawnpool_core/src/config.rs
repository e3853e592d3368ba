//! # Pool Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! document is a valid configuration.
//!
//! ```toml
//! default_capacity = 3
//! reclaim_assets_on_destroy = true
//! collect_garbage_on_sweep = true
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PoolError, PoolResult};

/// Free-list capacity reserved for pools created implicitly by a spawn.
pub const DEFAULT_POOL_CAPACITY: usize = 3;

/// Registry-wide pool settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolConfig {
    /// Initial free-list capacity for pools created by `spawn`.
    pub default_capacity: usize,
    /// Request an unused-asset pass after a pool is destroyed.
    pub reclaim_assets_on_destroy: bool,
    /// Request a garbage-collection pass after each context-switch sweep.
    pub collect_garbage_on_sweep: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_POOL_CAPACITY,
            reclaim_assets_on_destroy: true,
            collect_garbage_on_sweep: true,
        }
    }
}

impl PoolConfig {
    /// Parses a configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConfig`] if the document is malformed or
    /// names an unknown field.
    pub fn from_toml_str(source: &str) -> PoolResult<Self> {
        toml::from_str(source).map_err(|e| PoolError::InvalidConfig(e.to_string()))
    }
}
