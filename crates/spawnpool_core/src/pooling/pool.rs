//! # Prototype Pool
//!
//! Free list and allocation policy for the instances of one prototype.

use spawnpool_shared::Placement;

use super::tag::{PoolId, PoolTag};
use crate::error::{PoolError, PoolResult};
use crate::stage::{NodeId, Stage};

/// Counters kept by a pool over its lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Successful spawns.
    pub spawned: u64,
    /// Spawns served from the free list.
    pub reused: u64,
    /// Spawns that had to instantiate a new instance.
    pub allocated: u64,
    /// Free-list entries skipped because the instance was destroyed out-of-band.
    pub stale_skipped: u64,
    /// Successful despawns.
    pub despawned: u64,
}

/// A pool of reusable instances of one prototype.
///
/// Every instance the pool ever produced is in exactly one state:
/// - active (handed out, not in the free list)
/// - inactive and in the free list
/// - destroyed (gone from the stage; stale free-list entries are skipped)
///
/// All instances are created under the pool's container node, so tearing
/// down the container tears down the whole pool.
///
/// # Thread Safety
///
/// This pool is NOT thread-safe. Wrap it (and the stage) in a mutex if it
/// must be shared.
///
/// # Example
///
/// ```rust,ignore
/// let mut pool = Pool::new(&mut stage, bullet, 16)?;
///
/// let a = pool.spawn(&mut stage, Placement::IDENTITY)?; // allocates "Bullet_00"
/// pool.despawn(&mut stage, a)?;
/// let b = pool.spawn(&mut stage, Placement::IDENTITY)?; // reuses "Bullet_00"
/// assert_eq!(a, b);
/// ```
#[derive(Debug)]
pub struct Pool {
    id: PoolId,
    /// Released by `destroy_all`; `None` marks the pool as inert.
    prototype: Option<NodeId>,
    /// Prototype name at creation, used for instance names.
    name: String,
    /// Inactive instances, most recently freed on top.
    free_list: Vec<NodeId>,
    /// Grouping node every instance is created under.
    container: NodeId,
    next_sequence: u32,
    reclaim_assets_on_destroy: bool,
    stats: PoolStats,
}

impl Pool {
    /// Creates a pool for `prototype` with room for `capacity` free instances.
    ///
    /// The container node `Pool::<name>` is created on the stage right away.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidPrototype`] if the prototype is not alive.
    pub fn new(stage: &mut Stage, prototype: NodeId, capacity: usize) -> PoolResult<Self> {
        let name = stage
            .name(prototype)
            .ok_or(PoolError::InvalidPrototype(prototype))?
            .to_owned();
        let container = stage.create_node(format!("Pool::{name}"));
        let id = PoolId::next();

        tracing::debug!("{} created for '{}' (capacity {})", id, name, capacity);

        Ok(Self {
            id,
            prototype: Some(prototype),
            name,
            free_list: Vec::with_capacity(capacity),
            container,
            next_sequence: 0,
            reclaim_assets_on_destroy: true,
            stats: PoolStats::default(),
        })
    }

    /// Sets whether `destroy_all` requests an unused-asset pass.
    #[must_use]
    pub const fn with_asset_reclaim(mut self, enabled: bool) -> Self {
        self.reclaim_assets_on_destroy = enabled;
        self
    }

    /// Returns the pool's identifier.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> PoolId {
        self.id
    }

    /// The prototype, or `None` once the pool has been destroyed.
    #[inline]
    #[must_use]
    pub const fn prototype(&self) -> Option<NodeId> {
        self.prototype
    }

    /// The grouping node instances are created under.
    #[inline]
    #[must_use]
    pub const fn container(&self) -> NodeId {
        self.container
    }

    /// Number of instances waiting in the free list (stale entries included).
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Sequence number the next allocated instance will be named with.
    #[inline]
    #[must_use]
    pub const fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Lifetime counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Returns true once `destroy_all` has run.
    #[inline]
    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.prototype.is_none()
    }

    /// Returns true while the container is alive on the stage.
    ///
    /// False after `destroy_all`, and also when the host tore the container
    /// down behind the pool's back (e.g. a context load).
    #[must_use]
    pub fn pool_exists(&self, stage: &Stage) -> bool {
        stage.is_alive(self.container)
    }

    fn live_prototype(&self) -> PoolResult<NodeId> {
        self.prototype.ok_or(PoolError::UseAfterDestroy(self.id))
    }

    /// Hands out an instance at `placement`, active.
    ///
    /// Pops the most recently freed instance if there is one, skipping
    /// entries destroyed out-of-band. Otherwise instantiates a new one,
    /// names it `<prototype>_<NN>`, tags it, and files it under the
    /// container.
    ///
    /// Stale entries are skipped in a loop, so a free list made entirely of
    /// stale references costs one pass over it, never unbounded recursion.
    ///
    /// # Errors
    ///
    /// - [`PoolError::UseAfterDestroy`] after `destroy_all`
    /// - [`PoolError::ContainerGone`] if the container was destroyed
    ///   out-of-band; nothing is allocated, so no instance ends up outside it
    /// - [`PoolError::InvalidPrototype`] if a new instance is needed and the
    ///   prototype was destroyed out-of-band
    pub fn spawn(&mut self, stage: &mut Stage, placement: Placement) -> PoolResult<NodeId> {
        let prototype = self.live_prototype()?;
        if !self.pool_exists(stage) {
            return Err(PoolError::ContainerGone(self.id));
        }

        let instance = loop {
            match self.free_list.pop() {
                Some(candidate) if stage.is_alive(candidate) => {
                    self.stats.reused += 1;
                    break candidate;
                }
                Some(stale) => {
                    self.stats.stale_skipped += 1;
                    tracing::debug!("{} skipped stale {}", self.id, stale);
                }
                None => break self.allocate(stage, prototype, placement)?,
            }
        };

        stage.place(instance, placement);
        stage.set_active(instance, true);
        self.stats.spawned += 1;
        Ok(instance)
    }

    fn allocate(
        &mut self,
        stage: &mut Stage,
        prototype: NodeId,
        placement: Placement,
    ) -> PoolResult<NodeId> {
        let instance = stage
            .instantiate(prototype, placement)
            .ok_or(PoolError::InvalidPrototype(prototype))?;

        // Two digits up to 99, then plain decimal: Foo_09, Foo_10, Foo_100
        stage.set_name(instance, format!("{}_{:02}", self.name, self.next_sequence));
        self.next_sequence += 1;

        // Overwrites any tag copied from the prototype
        stage.set_tag(
            instance,
            PoolTag {
                prototype,
                pool: self.id,
            },
        );
        stage.set_parent(instance, self.container, true);

        self.stats.allocated += 1;
        Ok(instance)
    }

    /// Deactivates `instance` and pushes it onto the free list.
    ///
    /// # Errors
    ///
    /// - [`PoolError::UseAfterDestroy`] after `destroy_all`
    /// - [`PoolError::DeadInstance`] if the instance no longer exists
    /// - [`PoolError::ForeignInstance`] if the instance is not tagged with this pool
    /// - [`PoolError::AlreadyDespawned`] if the instance is already inactive;
    ///   the free list is left untouched so the instance is never handed
    ///   out twice
    pub fn despawn(&mut self, stage: &mut Stage, instance: NodeId) -> PoolResult<()> {
        self.live_prototype()?;

        let node = stage.node(instance).ok_or(PoolError::DeadInstance(instance))?;
        if node.tag.map(|t| t.pool) != Some(self.id) {
            return Err(PoolError::ForeignInstance {
                instance,
                pool: self.id,
            });
        }
        if !node.active {
            return Err(PoolError::AlreadyDespawned(instance));
        }

        stage.set_active(instance, false);
        self.free_list.push(instance);
        self.stats.despawned += 1;
        Ok(())
    }

    /// Despawns every active instance still filed under the container.
    ///
    /// Instances re-parented elsewhere after spawning are not reached.
    ///
    /// # Returns
    ///
    /// How many instances went back to the free list.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UseAfterDestroy`] after `destroy_all`.
    pub fn return_all(&mut self, stage: &mut Stage) -> PoolResult<usize> {
        self.live_prototype()?;

        let active: Vec<NodeId> = stage
            .children(self.container)
            .iter()
            .copied()
            .filter(|child| stage.is_active(*child) == Some(true))
            .collect();

        let mut returned = 0;
        for child in active {
            match self.despawn(stage, child) {
                Ok(()) => returned += 1,
                Err(e) => tracing::warn!("{} could not return {}: {}", self.id, child, e),
            }
        }
        Ok(returned)
    }

    /// Destroys the container and every instance under it.
    ///
    /// Releases the prototype and clears the free list without touching
    /// the entries individually, then requests an unused-asset pass. The
    /// pool is inert afterwards: every further call fails with
    /// [`PoolError::UseAfterDestroy`].
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::UseAfterDestroy`] if already destroyed.
    pub fn destroy_all(&mut self, stage: &mut Stage) -> PoolResult<()> {
        self.live_prototype()?;

        self.prototype = None;
        self.free_list.clear();

        let children = stage.children(self.container).to_vec();
        for child in children {
            stage.destroy(child);
        }
        stage.destroy(self.container);

        if self.reclaim_assets_on_destroy {
            stage.unload_unused_assets();
        }

        tracing::debug!("{} for '{}' destroyed", self.id, self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spawnpool_shared::{Quaternion, Vec3};

    fn setup(name: &str) -> (Stage, NodeId, Pool) {
        let mut stage = Stage::new();
        let proto = stage.create_prototype(name);
        let pool = Pool::new(&mut stage, proto, 4).unwrap();
        (stage, proto, pool)
    }

    #[test]
    fn test_pool_spawn_despawn() {
        let (mut stage, _, mut pool) = setup("Orb");

        let a = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        assert_eq!(stage.is_active(a), Some(true));
        assert_eq!(stage.parent(a), Some(pool.container()));

        pool.despawn(&mut stage, a).unwrap();
        assert_eq!(stage.is_active(a), Some(false));
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_pool_reuse_is_lifo() {
        let (mut stage, _, mut pool) = setup("Orb");

        let a = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        let b = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        pool.despawn(&mut stage, b).unwrap();
        pool.despawn(&mut stage, a).unwrap();

        assert_eq!(pool.spawn(&mut stage, Placement::IDENTITY).unwrap(), a);
        assert_eq!(pool.spawn(&mut stage, Placement::IDENTITY).unwrap(), b);
        assert_eq!(pool.stats().allocated, 2);
        assert_eq!(pool.stats().reused, 2);
    }

    #[test]
    fn test_spawn_applies_placement_on_reuse() {
        let (mut stage, _, mut pool) = setup("Orb");
        let a = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        pool.despawn(&mut stage, a).unwrap();

        let target = Placement::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quaternion::IDENTITY,
            Vec3::new(2.0, 2.0, 2.0),
        );
        let again = pool.spawn(&mut stage, target).unwrap();
        let world = stage.world_placement(again).unwrap();
        assert_eq!(world.position, target.position);
        assert_eq!(world.scale, target.scale);
    }

    #[test]
    fn test_instance_names() {
        let (mut stage, _, mut pool) = setup("Foo");
        let names: Vec<String> = (0..101)
            .map(|_| {
                let id = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
                stage.name(id).unwrap().to_owned()
            })
            .collect();

        assert_eq!(names[0], "Foo_00");
        assert_eq!(names[9], "Foo_09");
        assert_eq!(names[10], "Foo_10");
        assert_eq!(names[99], "Foo_99");
        assert_eq!(names[100], "Foo_100");
        assert_eq!(stage.name(pool.container()), Some("Pool::Foo"));
    }

    #[test]
    fn test_stale_free_entries_are_skipped() {
        let (mut stage, _, mut pool) = setup("Orb");
        let a = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        let b = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        pool.despawn(&mut stage, a).unwrap();
        pool.despawn(&mut stage, b).unwrap();

        stage.destroy(b);

        assert_eq!(pool.spawn(&mut stage, Placement::IDENTITY).unwrap(), a);
        assert_eq!(pool.stats().stale_skipped, 1);
    }

    #[test]
    fn test_all_stale_falls_through_to_allocation() {
        let (mut stage, _, mut pool) = setup("Orb");
        let spawned: Vec<NodeId> = (0..3)
            .map(|_| pool.spawn(&mut stage, Placement::IDENTITY).unwrap())
            .collect();
        for id in &spawned {
            pool.despawn(&mut stage, *id).unwrap();
            stage.destroy(*id);
        }

        let fresh = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        assert!(!spawned.contains(&fresh));
        assert_eq!(pool.free_count(), 0);
        assert_eq!(stage.name(fresh), Some("Orb_03"));
    }

    #[test]
    fn test_double_despawn_rejected() {
        let (mut stage, _, mut pool) = setup("Orb");
        let a = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        pool.despawn(&mut stage, a).unwrap();

        assert_eq!(pool.despawn(&mut stage, a), Err(PoolError::AlreadyDespawned(a)));
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_foreign_instance_rejected() {
        let (mut stage, _, mut pool) = setup("Orb");
        let stray = stage.create_node("stray");
        assert!(matches!(
            pool.despawn(&mut stage, stray),
            Err(PoolError::ForeignInstance { .. })
        ));
    }

    #[test]
    fn test_destroy_all_then_use_fails() {
        let (mut stage, _, mut pool) = setup("Orb");
        let a = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        let b = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        pool.despawn(&mut stage, b).unwrap();

        pool.destroy_all(&mut stage).unwrap();

        assert!(pool.is_destroyed());
        assert!(!pool.pool_exists(&stage));
        assert!(!stage.is_alive(a));
        assert!(!stage.is_alive(b));
        assert_eq!(pool.free_count(), 0);
        assert_eq!(stage.reclaim_stats().asset_unloads, 1);

        let id = pool.id();
        assert_eq!(
            pool.spawn(&mut stage, Placement::IDENTITY),
            Err(PoolError::UseAfterDestroy(id))
        );
        assert_eq!(pool.destroy_all(&mut stage), Err(PoolError::UseAfterDestroy(id)));
    }

    #[test]
    fn test_return_all_only_touches_active() {
        let (mut stage, _, mut pool) = setup("Orb");
        let a = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        let _b = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        pool.despawn(&mut stage, a).unwrap();

        assert_eq!(pool.return_all(&mut stage).unwrap(), 1);
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.return_all(&mut stage).unwrap(), 0);
    }

    #[test]
    fn test_pool_exists_tracks_container() {
        let (mut stage, _, pool) = setup("Orb");
        assert!(pool.pool_exists(&stage));
        stage.destroy(pool.container());
        assert!(!pool.pool_exists(&stage));
    }

    #[test]
    fn test_spawn_refuses_without_container() {
        let (mut stage, _, mut pool) = setup("Orb");
        let a = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        pool.despawn(&mut stage, a).unwrap();
        stage.destroy(pool.container());

        let before = stage.instantiated();
        assert_eq!(
            pool.spawn(&mut stage, Placement::IDENTITY),
            Err(PoolError::ContainerGone(pool.id()))
        );
        assert_eq!(stage.instantiated(), before);
        assert!(stage.active_tagged_nodes().is_empty());
    }

    #[test]
    fn test_despawn_counts_and_dead_instance() {
        let (mut stage, _, mut pool) = setup("Orb");
        let a = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        let b = pool.spawn(&mut stage, Placement::IDENTITY).unwrap();
        pool.despawn(&mut stage, a).unwrap();
        assert_eq!(pool.stats().despawned, 1);

        stage.destroy(b);
        assert_eq!(pool.despawn(&mut stage, b), Err(PoolError::DeadInstance(b)));
        assert_eq!(pool.stats().despawned, 1);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_invalid_prototype() {
        let mut stage = Stage::new();
        assert_eq!(
            Pool::new(&mut stage, NodeId::NULL, 1).unwrap_err(),
            PoolError::InvalidPrototype(NodeId::NULL)
        );
    }
}
