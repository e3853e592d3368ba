//! # Pool Error Types
//!
//! Most pool anomalies degrade to no-ops at the registry level. These
//! errors surface from [`Pool`](crate::Pool) directly so that callers holding
//! a pool can tell the cases apart.

use thiserror::Error;

use crate::pooling::PoolId;
use crate::stage::NodeId;

/// Errors that can occur in the pooling system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool was used after `destroy_all`.
    #[error("pool {0} used after destroy")]
    UseAfterDestroy(PoolId),

    /// The pool's container was destroyed behind its back.
    #[error("pool {0} lost its container")]
    ContainerGone(PoolId),

    /// The prototype does not exist (never created or destroyed).
    #[error("invalid prototype: {0}")]
    InvalidPrototype(NodeId),

    /// The instance no longer exists on the stage.
    #[error("instance {0} is not alive")]
    DeadInstance(NodeId),

    /// The instance is already inactive; pushing it again would hand it out twice.
    #[error("instance {0} is already despawned")]
    AlreadyDespawned(NodeId),

    /// The instance is not tagged as belonging to this pool.
    #[error("instance {instance} does not belong to pool {pool}")]
    ForeignInstance {
        /// The offending instance.
        instance: NodeId,
        /// The pool it was returned to.
        pool: PoolId,
    },

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;
