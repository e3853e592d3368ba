//! # SPAWNPOOL Core
//!
//! Object pooling for frame-driven hosts:
//! - One pool per prototype, created on first use
//! - Free-list reuse, most recently freed first
//! - Identity tags, so despawning needs only the instance
//! - Stale pools forgotten automatically when a new context is loaded
//!
//! ## Architecture Rules
//!
//! 1. **Reuse before allocate** - a spawn only instantiates when the free
//!    list is exhausted
//! 2. **The stage owns nodes** - pools and tags hold generational ids, never
//!    the nodes themselves
//! 3. **Degrade, don't fail** - registry anomalies become logged no-ops;
//!    only misuse of a [`Pool`] directly is an error
//!
//! ## Example
//!
//! ```rust,ignore
//! use spawnpool_core::{PoolConfig, PoolRegistry, Stage};
//! use spawnpool_shared::{LoadMode, Placement};
//!
//! let mut stage = Stage::new();
//! let bullet = stage.create_prototype("Bullet");
//!
//! let mut pools = PoolRegistry::new(PoolConfig::default());
//! pools.activate(&stage);
//!
//! pools.preload(&mut stage, bullet, 32);
//! let shot = pools.spawn(&mut stage, bullet, Placement::IDENTITY).unwrap();
//! pools.despawn(&mut stage, shot);
//!
//! // Tears down the level; the bullet pool is forgotten before this returns
//! pools.load_context(&mut stage, "level_02", LoadMode::Single);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod pooling;
pub mod stage;

pub use config::{PoolConfig, DEFAULT_POOL_CAPACITY};
pub use error::{PoolError, PoolResult};
pub use pooling::{Pool, PoolId, PoolRegistry, PoolStats, PoolTag};
pub use stage::{
    ContextSignal, Facet, FacetBag, Node, NodeId, ReclaimStats, Stage, Subscription,
};
