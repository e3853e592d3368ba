//! # Stage Nodes
//!
//! Nodes are addressed by lightweight identifiers consisting of:
//! - An index into the stage's slot array
//! - A generation counter for safe reuse
//!
//! A destroyed node's slot is recycled with a bumped generation, so any
//! reference still held to the old node stops resolving.

use std::fmt;

use spawnpool_shared::Placement;

use super::facet::FacetBag;
use crate::pooling::PoolTag;

/// Unique identifier for a node.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index into the slot array
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Creates a new node ID from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the node ID.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the node ID.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Null/invalid node ID.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks if this node ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("node(null)")
        } else {
            write!(f, "node({}v{})", self.index(), self.generation())
        }
    }
}

/// A live node on the stage.
#[derive(Clone, Debug)]
pub struct Node {
    /// The identifier this node is reachable under.
    pub id: NodeId,
    /// Human-readable name.
    pub name: String,
    /// Whether the node is active.
    pub active: bool,
    /// Placement relative to the parent (or the stage root).
    pub local: Placement,
    /// Parent node, [`NodeId::NULL`] for roots.
    pub parent: NodeId,
    /// Children in attach order.
    pub children: Vec<NodeId>,
    /// Survives context loads that tear down the previous context.
    pub persistent: bool,
    /// Back-reference to the owning pool, if this node was produced by one.
    pub tag: Option<PoolTag>,
    /// Typed data attached to the node.
    pub facets: FacetBag,
}

impl Node {
    pub(super) fn new(id: NodeId, name: String) -> Self {
        Self {
            id,
            name,
            active: true,
            local: Placement::IDENTITY,
            parent: NodeId::NULL,
            children: Vec::new(),
            persistent: false,
            tag: None,
            facets: FacetBag::default(),
        }
    }

    /// Returns true if this node has no parent.
    #[inline]
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.parent.is_null()
    }
}

/// One slot of the stage's node array.
#[derive(Debug, Default)]
pub(super) struct Slot {
    pub(super) generation: u32,
    pub(super) node: Option<Node>,
}
