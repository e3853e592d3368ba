//! Context-switch events.
//!
//! A host broadcasts [`ContextLoaded`] every time a new level/scene has
//! finished loading. Pool registries listen for it to forget pools whose
//! containers were torn down with the previous context.

use serde::{Deserialize, Serialize};

/// How a new context is brought in.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Replace the current context. Every non-persistent root is destroyed.
    #[default]
    Single = 0,
    /// Load on top of the current context. Nothing is destroyed.
    Additive = 1,
}

impl LoadMode {
    /// Returns true if loading in this mode tears down the previous context.
    #[must_use]
    pub const fn tears_down(self) -> bool {
        matches!(self, Self::Single)
    }
}

/// Notification that a context has finished loading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLoaded {
    /// Identifier of the context (level or scene name).
    pub context: String,
    /// Activation mode.
    pub mode: LoadMode,
}

impl ContextLoaded {
    /// Creates a new notification
    #[must_use]
    pub fn new(context: impl Into<String>, mode: LoadMode) -> Self {
        Self {
            context: context.into(),
            mode,
        }
    }
}
