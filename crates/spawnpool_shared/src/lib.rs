//! # SPAWNPOOL Shared
//!
//! Common types used by the pool core and by the host that drives it.
//!
//! - [`math`]: placement of an instance (position, rotation, scale)
//! - [`events`]: the context-switch notification a host broadcasts when a
//!   new level/scene finishes loading
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on the host environment. If you need
//! stage/scene types, put them in `spawnpool_core`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod events;
pub mod math;

pub use events::{ContextLoaded, LoadMode};
pub use math::{Placement, Quaternion, Vec3};
