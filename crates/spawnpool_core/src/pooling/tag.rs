//! # Identity Tags
//!
//! A tag on an instance names the pool that produced it, so despawning
//! needs only the instance. The tag is a plain value: it does not keep the
//! pool alive, and a tag whose pool is gone simply fails to resolve.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::stage::NodeId;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique pool identifier.
///
/// Never reused, so a pool recreated for the same prototype is
/// distinguishable from the one it replaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(u64);

impl PoolId {
    pub(super) fn next() -> Self {
        Self(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

/// Back-reference from an instance to its owning pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PoolTag {
    /// Prototype the pool is keyed on.
    pub prototype: NodeId,
    /// The pool itself.
    pub pool: PoolId,
}
