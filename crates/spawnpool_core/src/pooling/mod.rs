//! # Pooling
//!
//! Per-prototype object pools and the registry that owns them.
//!
//! ## Flow
//!
//! ```text
//! registry.spawn(P) ──> pools[P] (created lazily) ──> free list pop
//!                                                    └─> or instantiate + tag
//! registry.despawn(I) ──> tag on I ──> owning pool ──> deactivate + push
//! ```
//!
//! Instances are never freed one by one. They are reused until their pool
//! is destroyed, either explicitly or because the context its container
//! lived in was torn down.

mod pool;
mod registry;
mod tag;

pub use pool::{Pool, PoolStats};
pub use registry::PoolRegistry;
pub use tag::{PoolId, PoolTag};
