//! # Stage
//!
//! The host environment pooled instances live in: a node graph with
//! generational ids, active flags, parenting, and context (level/scene)
//! loading.
//!
//! The stage is the only owner of node storage. Pools hold node ids, which
//! can go stale at any time if the host destroys a node out-of-band. Every
//! lookup goes through the liveness check in [`Stage::is_alive`].
//!
//! ## Context loads
//!
//! ```text
//! load_context("level_02", Single)
//!   1. destroy every non-persistent root (and its subtree)
//!   2. broadcast ContextLoaded to subscribers
//! ```

mod facet;
mod node;
mod signal;

pub use facet::{Facet, FacetBag};
pub use node::{Node, NodeId};
pub use signal::{ContextSignal, Subscription};

use spawnpool_shared::{ContextLoaded, LoadMode, Placement};

use crate::pooling::PoolTag;
use node::Slot;

/// Counters for reclamation requests made to the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    /// Unused-asset passes requested.
    pub asset_unloads: u64,
    /// Garbage-collection passes requested.
    pub gc_passes: u64,
}

/// The node graph.
///
/// # Thread Safety
///
/// The stage is NOT thread-safe. It is driven from the frame thread only.
#[derive(Debug, Default)]
pub struct Stage {
    /// All node slots, dead or alive.
    slots: Vec<Slot>,
    /// Free list of slot indices for reuse.
    free_indices: Vec<u32>,
    /// Number of currently alive nodes.
    alive_count: usize,
    /// Total nodes ever produced by [`Stage::instantiate`].
    instantiated: u64,
    /// Name of the current context.
    context: String,
    signal: ContextSignal,
    reclaim: ReclaimStats,
}

impl Stage {
    /// Creates an empty stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of currently alive nodes.
    #[inline]
    #[must_use]
    pub const fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Total nodes ever produced by [`Stage::instantiate`].
    #[inline]
    #[must_use]
    pub const fn instantiated(&self) -> u64 {
        self.instantiated
    }

    /// Name of the current context.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Reclamation requests made so far.
    #[must_use]
    pub const fn reclaim_stats(&self) -> ReclaimStats {
        self.reclaim
    }

    /// The context-switch notification source.
    #[must_use]
    pub const fn signal(&self) -> &ContextSignal {
        &self.signal
    }

    // =========================================================================
    // Creation / destruction
    // =========================================================================

    /// Creates an active root node.
    ///
    /// # Panics
    ///
    /// Panics if all `u32::MAX - 1` node slots are alive at once.
    pub fn create_node(&mut self, name: impl Into<String>) -> NodeId {
        self.insert(name.into())
    }

    /// Creates a prototype: a persistent, inactive root that lives outside
    /// any context and is only used as an instantiation template.
    ///
    /// # Panics
    ///
    /// Panics if all `u32::MAX - 1` node slots are alive at once.
    pub fn create_prototype(&mut self, name: impl Into<String>) -> NodeId {
        let id = self.insert(name.into());
        if let Some(node) = self.node_mut(id) {
            node.persistent = true;
            node.active = false;
        }
        id
    }

    /// Clones `prototype` into a new active root at `placement`.
    ///
    /// Name, facets and tag are copied; children are not. The copy is never
    /// persistent.
    ///
    /// # Returns
    ///
    /// The new node's ID, or `None` if the prototype is not alive.
    ///
    /// # Panics
    ///
    /// Panics if all `u32::MAX - 1` node slots are alive at once.
    pub fn instantiate(&mut self, prototype: NodeId, placement: Placement) -> Option<NodeId> {
        let (name, facets, tag) = {
            let proto = self.node(prototype)?;
            (proto.name.clone(), proto.facets.clone(), proto.tag)
        };

        let id = self.insert(name);
        if let Some(node) = self.node_mut(id) {
            node.facets = facets;
            node.tag = tag;
            node.local = placement;
        }
        self.instantiated += 1;
        Some(id)
    }

    fn insert(&mut self, name: String) -> NodeId {
        let index = if let Some(index) = self.free_indices.pop() {
            index
        } else {
            // u32::MAX is reserved for NodeId::NULL
            let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            assert!(index < u32::MAX, "stage node capacity exhausted");
            self.slots.push(Slot::default());
            index
        };

        let slot = &mut self.slots[index as usize];
        let id = NodeId::new(index, slot.generation);
        slot.node = Some(Node::new(id, name));
        self.alive_count += 1;
        id
    }

    /// Destroys a node and its whole subtree.
    ///
    /// # Returns
    ///
    /// `true` if the node was destroyed, `false` if it was already dead or
    /// the ID was stale.
    pub fn destroy(&mut self, id: NodeId) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        self.detach(id);

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let slot = &mut self.slots[current.index() as usize];
            if let Some(node) = slot.node.take() {
                stack.extend(node.children);
                // Bump generation to invalidate old references
                slot.generation = slot.generation.wrapping_add(1);
                self.free_indices.push(current.index());
                self.alive_count -= 1;
            }
        }
        true
    }

    /// Checks if a node is alive.
    #[inline]
    #[must_use]
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Gets a node by ID.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        if id.is_null() {
            return None;
        }
        let slot = self.slots.get(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_ref()
    }

    /// Gets a node mutably by ID.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if id.is_null() {
            return None;
        }
        let slot = self.slots.get_mut(id.index() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.node.as_mut()
    }

    // =========================================================================
    // Node state
    // =========================================================================

    /// Name of a live node.
    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    /// Renames a node.
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> bool {
        self.node_mut(id).map(|n| n.name = name.into()).is_some()
    }

    /// Whether a live node is active. `None` for dead nodes.
    #[must_use]
    pub fn is_active(&self, id: NodeId) -> Option<bool> {
        self.node(id).map(|n| n.active)
    }

    /// Activates or deactivates a node.
    pub fn set_active(&mut self, id: NodeId, active: bool) -> bool {
        self.node_mut(id).map(|n| n.active = active).is_some()
    }

    /// Marks a node as surviving (or not) context teardown.
    pub fn set_persistent(&mut self, id: NodeId, persistent: bool) -> bool {
        self.node_mut(id).map(|n| n.persistent = persistent).is_some()
    }

    /// The pool tag on a node, if any.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<PoolTag> {
        self.node(id).and_then(|n| n.tag)
    }

    /// Writes the pool tag on a node.
    pub fn set_tag(&mut self, id: NodeId, tag: PoolTag) -> bool {
        self.node_mut(id).map(|n| n.tag = Some(tag)).is_some()
    }

    /// Attaches a facet to a node.
    pub fn add_facet<T: Facet>(&mut self, id: NodeId, value: T) -> bool {
        self.node_mut(id).map(|n| n.facets.insert(value)).is_some()
    }

    /// Resolves a facet on a node.
    #[must_use]
    pub fn facet<T: Facet>(&self, id: NodeId) -> Option<&T> {
        self.node(id)?.facets.get::<T>()
    }

    /// Resolves a facet on a node mutably.
    pub fn facet_mut<T: Facet>(&mut self, id: NodeId) -> Option<&mut T> {
        self.node_mut(id)?.facets.get_mut::<T>()
    }

    /// Children of a node. Empty for dead nodes.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id)
            .map_or(&[] as &[NodeId], |n| n.children.as_slice())
    }

    /// Parent of a node, if it has one.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)
            .map(|n| n.parent)
            .filter(|parent| !parent.is_null())
    }

    /// Iterates over all live nodes.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.slots.iter().filter_map(|slot| slot.node.as_ref())
    }

    /// Every active node carrying a pool tag.
    #[must_use]
    pub fn active_tagged_nodes(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|n| n.active && n.tag.is_some())
            .map(|n| n.id)
            .collect()
    }

    // =========================================================================
    // Placement and hierarchy
    // =========================================================================

    /// Placement of a node in stage space.
    #[must_use]
    pub fn world_placement(&self, id: NodeId) -> Option<Placement> {
        let node = self.node(id)?;
        let mut placement = node.local;
        let mut parent = node.parent;
        while let Some(p) = self.node(parent) {
            placement = Placement::compose(p.local, placement);
            parent = p.parent;
        }
        Some(placement)
    }

    /// Moves a node to `placement`.
    ///
    /// Position and rotation are taken in stage space, scale is local, which
    /// is how spawn placements are expressed.
    pub fn place(&mut self, id: NodeId, placement: Placement) -> bool {
        let parent_world = self
            .parent(id)
            .and_then(|p| self.world_placement(p))
            .unwrap_or(Placement::IDENTITY);

        let mut local = Placement::relative_to(parent_world, placement);
        local.scale = placement.scale;

        self.node_mut(id).map(|n| n.local = local).is_some()
    }

    /// Re-parents `child` under `parent` ([`NodeId::NULL`] makes it a root).
    ///
    /// With `world_position_stays` the child keeps its stage-space
    /// placement; otherwise its local placement is kept as-is.
    ///
    /// # Returns
    ///
    /// `false` if either node is dead or `parent` is inside `child`'s subtree.
    pub fn set_parent(&mut self, child: NodeId, parent: NodeId, world_position_stays: bool) -> bool {
        if !self.is_alive(child) || (!parent.is_null() && !self.is_alive(parent)) {
            return false;
        }
        if self.is_self_or_ancestor(child, parent) {
            return false;
        }

        let world = self.world_placement(child);
        self.detach(child);

        if let Some(p) = self.node_mut(parent) {
            p.children.push(child);
        }
        let parent_world = self.world_placement(parent).unwrap_or(Placement::IDENTITY);

        if let Some(node) = self.node_mut(child) {
            node.parent = parent;
            if let (true, Some(world)) = (world_position_stays, world) {
                node.local = Placement::relative_to(parent_world, world);
            }
        }
        true
    }

    fn is_self_or_ancestor(&self, candidate: NodeId, mut node: NodeId) -> bool {
        while let Some(n) = self.node(node) {
            if n.id == candidate {
                return true;
            }
            node = n.parent;
        }
        false
    }

    fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = NodeId::NULL;
        }
    }

    // =========================================================================
    // Context lifecycle
    // =========================================================================

    /// Loads a new context and notifies subscribers.
    ///
    /// In [`LoadMode::Single`] every non-persistent root is destroyed first,
    /// taking its subtree with it.
    pub fn load_context(&mut self, context: impl Into<String>, mode: LoadMode) -> ContextLoaded {
        let event = ContextLoaded::new(context, mode);

        if mode.tears_down() {
            let doomed: Vec<NodeId> = self
                .iter()
                .filter(|n| n.is_root() && !n.persistent)
                .map(|n| n.id)
                .collect();
            for id in &doomed {
                self.destroy(*id);
            }
            tracing::debug!(
                "context '{}' tore down {} roots",
                event.context,
                doomed.len()
            );
        }

        self.context.clone_from(&event.context);
        let delivered = self.signal.broadcast(&event);
        tracing::debug!("context '{}' loaded, {} subscribers notified", event.context, delivered);
        event
    }

    /// Requests release of assets nothing references anymore.
    ///
    /// Advisory: the stage only records the request.
    pub fn unload_unused_assets(&mut self) {
        self.reclaim.asset_unloads += 1;
        tracing::debug!("unused asset pass #{}", self.reclaim.asset_unloads);
    }

    /// Requests a garbage-collection pass.
    ///
    /// Trims the free index list so recycled slots are handed out lowest
    /// index first.
    pub fn collect_garbage(&mut self) {
        self.reclaim.gc_passes += 1;
        self.free_indices.sort_unstable_by(|a, b| b.cmp(a));
        self.free_indices.shrink_to_fit();
        tracing::debug!("gc pass #{}", self.reclaim.gc_passes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spawnpool_shared::{Quaternion, Vec3};

    #[derive(Clone, Debug, PartialEq)]
    struct Ammo(u32);

    #[test]
    fn test_destroy_invalidates_id() {
        let mut stage = Stage::new();
        let a = stage.create_node("a");
        assert!(stage.destroy(a));
        assert!(!stage.is_alive(a));
        assert!(!stage.destroy(a));

        // Slot is recycled with a new generation
        let b = stage.create_node("b");
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(!stage.is_alive(a));
        assert_eq!(stage.alive_count(), 1);
    }

    #[test]
    fn test_destroy_takes_subtree() {
        let mut stage = Stage::new();
        let root = stage.create_node("root");
        let child = stage.create_node("child");
        let grandchild = stage.create_node("grandchild");
        assert!(stage.set_parent(child, root, true));
        assert!(stage.set_parent(grandchild, child, true));

        stage.destroy(child);

        assert!(stage.is_alive(root));
        assert!(!stage.is_alive(grandchild));
        assert!(stage.children(root).is_empty());
    }

    #[test]
    fn test_instantiate_copies_facets() {
        let mut stage = Stage::new();
        let proto = stage.create_prototype("Bullet");
        stage.add_facet(proto, Ammo(30));

        let copy = stage.instantiate(proto, Placement::IDENTITY).unwrap();
        stage.facet_mut::<Ammo>(copy).unwrap().0 = 5;

        assert_eq!(stage.name(copy), Some("Bullet"));
        assert_eq!(stage.is_active(copy), Some(true));
        assert_eq!(stage.facet::<Ammo>(proto), Some(&Ammo(30)));
        assert_eq!(stage.instantiated(), 1);
    }

    #[test]
    fn test_instantiate_dead_prototype() {
        let mut stage = Stage::new();
        let proto = stage.create_prototype("Gone");
        stage.destroy(proto);
        assert!(stage.instantiate(proto, Placement::IDENTITY).is_none());
        assert!(stage.instantiate(NodeId::NULL, Placement::IDENTITY).is_none());
    }

    #[test]
    fn test_set_parent_keeps_world_position() {
        let mut stage = Stage::new();
        let parent = stage.create_node("parent");
        stage.place(parent, Placement::at(Vec3::new(10.0, 0.0, 0.0), Quaternion::IDENTITY));

        let child = stage.create_node("child");
        stage.place(child, Placement::at(Vec3::new(3.0, 4.0, 5.0), Quaternion::IDENTITY));

        assert!(stage.set_parent(child, parent, true));
        let world = stage.world_placement(child).unwrap();
        assert!((world.position - Vec3::new(3.0, 4.0, 5.0)).length() < 1e-4);

        let other = stage.create_node("other");
        stage.place(other, Placement::at(Vec3::new(3.0, 4.0, 5.0), Quaternion::IDENTITY));
        assert!(stage.set_parent(other, parent, false));
        let world = stage.world_placement(other).unwrap();
        assert!((world.position - Vec3::new(13.0, 4.0, 5.0)).length() < 1e-4);
    }

    #[test]
    fn test_set_parent_rejects_cycle() {
        let mut stage = Stage::new();
        let a = stage.create_node("a");
        let b = stage.create_node("b");
        assert!(stage.set_parent(b, a, true));
        assert!(!stage.set_parent(a, b, true));
        assert!(!stage.set_parent(a, a, true));
    }

    #[test]
    fn test_single_load_spares_persistent_roots() {
        let mut stage = Stage::new();
        let proto = stage.create_prototype("Coin");
        let level = stage.create_node("level");
        let keeper = stage.create_node("keeper");
        stage.set_persistent(keeper, true);

        let event = stage.load_context("level_02", LoadMode::Single);

        assert_eq!(event.context, "level_02");
        assert_eq!(stage.context(), "level_02");
        assert!(stage.is_alive(proto));
        assert!(stage.is_alive(keeper));
        assert!(!stage.is_alive(level));
    }

    #[test]
    fn test_additive_load_destroys_nothing() {
        let mut stage = Stage::new();
        let level = stage.create_node("level");
        let sub = stage.signal().subscribe();

        stage.load_context("overlay", LoadMode::Additive);

        assert!(stage.is_alive(level));
        assert_eq!(sub.pending_count(), 1);
    }

    #[test]
    fn test_reclaim_requests_are_counted() {
        let mut stage = Stage::new();
        stage.unload_unused_assets();
        stage.collect_garbage();
        stage.collect_garbage();
        assert_eq!(
            stage.reclaim_stats(),
            ReclaimStats { asset_unloads: 1, gc_passes: 2 }
        );
    }
}
