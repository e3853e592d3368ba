//! # Pool Registry
//!
//! Maps each prototype to its pool and forgets pools whose containers were
//! torn down with a previous context.
//!
//! ## Lifecycle
//!
//! ```text
//! PoolRegistry::new(config)      pools created lazily on first spawn/preload
//!   .activate(&stage)            subscribe to ContextLoaded
//!   ... spawn / despawn ...
//!   .load_context(&mut stage, ..) context loaded, sweep runs before return
//!   stage.load_context(..)       notification queued; the sweep runs at the
//!                                 start of the next registry call that takes
//!                                 the stage, or in .dispatch_pending()
//!   .deactivate()                unsubscribe
//! ```
//!
//! The registry is an explicit context object: one per process is the
//! intended use, but nothing global backs it. No teardown is required.
//!
//! ## Degradation
//!
//! Anomalies never surface as errors here. Invalid prototypes spawn `None`,
//! double despawns and stray instances are logged and ignored.

use std::collections::HashMap;

use spawnpool_shared::{ContextLoaded, LoadMode, Placement, Quaternion, Vec3};

use super::pool::Pool;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::stage::{Facet, NodeId, Stage, Subscription};

/// Prototype -> pool mapping.
#[derive(Debug, Default)]
pub struct PoolRegistry {
    config: PoolConfig,
    /// At most one live pool per prototype.
    pools: HashMap<NodeId, Pool>,
    subscription: Option<Subscription>,
    sweeps: u64,
}

impl PoolRegistry {
    /// Creates an empty, inactive registry.
    #[must_use]
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// The settings this registry was created with.
    #[must_use]
    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Number of registered pools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Returns true if no pool is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Returns true if a pool is registered for `prototype`.
    #[must_use]
    pub fn contains(&self, prototype: NodeId) -> bool {
        self.pools.contains_key(&prototype)
    }

    /// The pool registered for `prototype`.
    #[must_use]
    pub fn pool(&self, prototype: NodeId) -> Option<&Pool> {
        self.pools.get(&prototype)
    }

    /// Number of context-switch sweeps run so far.
    #[must_use]
    pub const fn sweeps(&self) -> u64 {
        self.sweeps
    }

    // =========================================================================
    // Activation
    // =========================================================================

    /// Starts listening for context switches on `stage`. Idempotent.
    pub fn activate(&mut self, stage: &Stage) {
        if self.subscription.is_none() {
            self.subscription = Some(stage.signal().subscribe());
            tracing::debug!("pool registry activated");
        }
    }

    /// Stops listening. Notifications not yet dispatched are dropped.
    pub fn deactivate(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            tracing::debug!("pool registry deactivated");
        }
    }

    /// Returns true while subscribed.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// Runs the sweep for every queued context-switch notification.
    ///
    /// # Returns
    ///
    /// How many notifications were handled.
    pub fn dispatch_pending(&mut self, stage: &mut Stage) -> usize {
        let events: Vec<ContextLoaded> = match &self.subscription {
            Some(subscription) => subscription.pending().collect(),
            None => return 0,
        };
        for event in &events {
            self.on_context_loaded(stage, event);
        }
        events.len()
    }

    /// Loads a context on `stage` and handles the resulting notification
    /// before returning.
    ///
    /// The sweep has run by the time this returns, so stage-free queries
    /// (`len`, `contains`, `pool`) already reflect the new context. Other
    /// subscribers still get the event queued as usual.
    pub fn load_context(
        &mut self,
        stage: &mut Stage,
        context: impl Into<String>,
        mode: LoadMode,
    ) -> ContextLoaded {
        let event = stage.load_context(context, mode);
        self.dispatch_pending(stage);
        event
    }

    /// Context-switch handler.
    ///
    /// Forgets every pool whose container no longer exists, then requests
    /// an unused-asset pass and (if configured) a garbage-collection pass.
    ///
    /// # Returns
    ///
    /// How many pools were forgotten.
    pub fn on_context_loaded(&mut self, stage: &mut Stage, event: &ContextLoaded) -> usize {
        let before = self.pools.len();
        self.pools.retain(|_, pool| pool.pool_exists(stage));
        let forgotten = before - self.pools.len();
        self.sweeps += 1;

        tracing::debug!(
            "context '{}' ({:?}): forgot {} stale pools, {} remain",
            event.context,
            event.mode,
            forgotten,
            self.pools.len()
        );

        stage.unload_unused_assets();
        if self.config.collect_garbage_on_sweep {
            stage.collect_garbage();
        }
        forgotten
    }

    // =========================================================================
    // Pool management
    // =========================================================================

    /// Creates a pool for `prototype` if there is none. Idempotent: an
    /// existing pool and its free list are left untouched, unless its
    /// container was destroyed out-of-band, in which case it is replaced.
    ///
    /// # Returns
    ///
    /// `false` if the prototype is not alive.
    pub fn ensure_pool(&mut self, stage: &mut Stage, prototype: NodeId, capacity: usize) -> bool {
        self.dispatch_pending(stage);
        self.ensure_pool_inner(stage, prototype, capacity).is_some()
    }

    fn ensure_pool_inner(
        &mut self,
        stage: &mut Stage,
        prototype: NodeId,
        capacity: usize,
    ) -> Option<&mut Pool> {
        if !stage.is_alive(prototype) {
            return None;
        }
        let stale = self
            .pools
            .get(&prototype)
            .is_some_and(|pool| !pool.pool_exists(stage));
        if stale {
            // Container went away without a sweep; the old pool can't track anything
            if let Some(old) = self.pools.remove(&prototype) {
                tracing::debug!("{} replaced, its container is gone", old.id());
            }
        }
        if !self.pools.contains_key(&prototype) {
            let pool = Pool::new(stage, prototype, capacity)
                .ok()?
                .with_asset_reclaim(self.config.reclaim_assets_on_destroy);
            self.pools.insert(prototype, pool);
        }
        self.pools.get_mut(&prototype)
    }

    /// Primes the free list of `prototype`'s pool with `count` instances.
    ///
    /// Spawns `count` instances at the neutral placement, then despawns all
    /// of them, so no live instance is left behind.
    ///
    /// # Returns
    ///
    /// How many instances ended up in the free list.
    pub fn preload(&mut self, stage: &mut Stage, prototype: NodeId, count: usize) -> usize {
        self.dispatch_pending(stage);
        let Some(pool) = self.ensure_pool_inner(stage, prototype, count) else {
            return 0;
        };

        let mut spawned = Vec::with_capacity(count);
        for _ in 0..count {
            match pool.spawn(stage, Placement::IDENTITY) {
                Ok(instance) => spawned.push(instance),
                Err(e) => {
                    tracing::warn!("preload of {} stopped: {}", prototype, e);
                    break;
                }
            }
        }

        spawned
            .into_iter()
            .filter(|instance| pool.despawn(stage, *instance).is_ok())
            .count()
    }

    /// Destroys `prototype`'s pool and every instance it produced.
    ///
    /// # Returns
    ///
    /// `false` if there was no pool.
    pub fn destroy_pool(&mut self, stage: &mut Stage, prototype: NodeId) -> bool {
        self.dispatch_pending(stage);
        let Some(mut pool) = self.pools.remove(&prototype) else {
            return false;
        };
        if let Err(e) = pool.destroy_all(stage) {
            tracing::warn!("destroying pool for {} failed: {}", prototype, e);
        }
        true
    }

    /// Despawns every active instance of `prototype`'s pool.
    ///
    /// # Returns
    ///
    /// How many instances were returned; 0 if there is no pool.
    pub fn return_pool(&mut self, stage: &mut Stage, prototype: NodeId) -> usize {
        self.dispatch_pending(stage);
        self.pools
            .get_mut(&prototype)
            .and_then(|pool| pool.return_all(stage).ok())
            .unwrap_or(0)
    }

    /// Despawns every active tagged instance on the stage, across all pools.
    ///
    /// # Returns
    ///
    /// How many instances went back to a free list.
    pub fn return_pool_all(&mut self, stage: &mut Stage) -> usize {
        self.dispatch_pending(stage);
        stage
            .active_tagged_nodes()
            .into_iter()
            .filter(|instance| self.despawn_inner(stage, *instance))
            .count()
    }

    // =========================================================================
    // Spawn / despawn
    // =========================================================================

    /// Spawns an instance of `prototype` at `placement`.
    ///
    /// # Returns
    ///
    /// `None` if the prototype is null or not alive.
    pub fn spawn(
        &mut self,
        stage: &mut Stage,
        prototype: NodeId,
        placement: Placement,
    ) -> Option<NodeId> {
        self.dispatch_pending(stage);
        let capacity = self.config.default_capacity;
        let pool = self.ensure_pool_inner(stage, prototype, capacity)?;
        match pool.spawn(stage, placement) {
            Ok(instance) => Some(instance),
            Err(e) => {
                tracing::warn!("spawn of {} failed: {}", prototype, e);
                None
            }
        }
    }

    /// Spawns at `position` and `rotation` with unit scale.
    pub fn spawn_at(
        &mut self,
        stage: &mut Stage,
        prototype: NodeId,
        position: Vec3,
        rotation: Quaternion,
    ) -> Option<NodeId> {
        self.spawn(stage, prototype, Placement::at(position, rotation))
    }

    /// Spawns at `position` and `rotation`, then re-parents under `parent`.
    ///
    /// A dead or null `parent` leaves the instance where it was spawned.
    pub fn spawn_under(
        &mut self,
        stage: &mut Stage,
        prototype: NodeId,
        position: Vec3,
        rotation: Quaternion,
        parent: NodeId,
        world_position_stays: bool,
    ) -> Option<NodeId> {
        let instance = self.spawn_at(stage, prototype, position, rotation)?;
        if stage.is_alive(parent) {
            stage.set_parent(instance, parent, world_position_stays);
        }
        Some(instance)
    }

    /// Spawns and resolves facet `T` on the new instance.
    ///
    /// The instance is spawned even if it carries no `T`.
    pub fn spawn_facet<'s, T: Facet>(
        &mut self,
        stage: &'s mut Stage,
        prototype: NodeId,
        position: Vec3,
        rotation: Quaternion,
    ) -> Option<&'s mut T> {
        let instance = self.spawn_at(stage, prototype, position, rotation)?;
        stage.facet_mut::<T>(instance)
    }

    /// [`PoolRegistry::spawn_under`] followed by facet resolution.
    pub fn spawn_facet_under<'s, T: Facet>(
        &mut self,
        stage: &'s mut Stage,
        prototype: NodeId,
        position: Vec3,
        rotation: Quaternion,
        parent: NodeId,
        world_position_stays: bool,
    ) -> Option<&'s mut T> {
        let instance = self.spawn_under(
            stage,
            prototype,
            position,
            rotation,
            parent,
            world_position_stays,
        )?;
        stage.facet_mut::<T>(instance)
    }

    /// Returns `instance` to its pool.
    ///
    /// Untagged instances, and instances whose pool is gone, are only
    /// deactivated.
    ///
    /// # Returns
    ///
    /// `true` if the instance went back to a free list.
    pub fn despawn(&mut self, stage: &mut Stage, instance: NodeId) -> bool {
        self.dispatch_pending(stage);
        self.despawn_inner(stage, instance)
    }

    fn despawn_inner(&mut self, stage: &mut Stage, instance: NodeId) -> bool {
        let pool = stage
            .tag(instance)
            .and_then(|tag| self.pools.get_mut(&tag.prototype).filter(|p| p.id() == tag.pool));

        let Some(pool) = pool else {
            stage.set_active(instance, false);
            return false;
        };

        match pool.despawn(stage, instance) {
            Ok(()) => true,
            Err(PoolError::AlreadyDespawned(_)) => {
                tracing::warn!("ignored double despawn of {}", instance);
                false
            }
            Err(e) => {
                tracing::warn!("despawn of {} ignored: {}", instance, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Stage, PoolRegistry, NodeId) {
        let mut stage = Stage::new();
        let proto = stage.create_prototype("Foo");
        let mut registry = PoolRegistry::new(PoolConfig::default());
        registry.activate(&stage);
        (stage, registry, proto)
    }

    #[test]
    fn test_spawn_null_prototype_returns_none() {
        let (mut stage, mut registry, _) = setup();
        assert!(registry.spawn(&mut stage, NodeId::NULL, Placement::IDENTITY).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_spawn_creates_pool_lazily() {
        let (mut stage, mut registry, proto) = setup();
        assert!(!registry.contains(proto));
        registry.spawn(&mut stage, proto, Placement::IDENTITY).unwrap();
        assert!(registry.contains(proto));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_ensure_pool_is_idempotent() {
        let (mut stage, mut registry, proto) = setup();
        assert!(registry.ensure_pool(&mut stage, proto, 3));
        let a = registry.spawn(&mut stage, proto, Placement::IDENTITY).unwrap();
        registry.despawn(&mut stage, a);
        let id = registry.pool(proto).unwrap().id();

        assert!(registry.ensure_pool(&mut stage, proto, 3));

        let pool = registry.pool(proto).unwrap();
        assert_eq!(pool.id(), id);
        assert_eq!(pool.free_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_despawn_untagged_only_deactivates() {
        let (mut stage, mut registry, _) = setup();
        let loose = stage.create_node("loose");
        assert!(!registry.despawn(&mut stage, loose));
        assert_eq!(stage.is_active(loose), Some(false));
    }

    #[test]
    fn test_double_despawn_is_noop() {
        let (mut stage, mut registry, proto) = setup();
        let a = registry.spawn(&mut stage, proto, Placement::IDENTITY).unwrap();
        assert!(registry.despawn(&mut stage, a));
        assert!(!registry.despawn(&mut stage, a));
        assert_eq!(registry.pool(proto).unwrap().free_count(), 1);
    }

    #[test]
    fn test_missing_pool_operations_are_noops() {
        let (mut stage, mut registry, proto) = setup();
        assert!(!registry.destroy_pool(&mut stage, proto));
        assert_eq!(registry.return_pool(&mut stage, proto), 0);
    }

    #[test]
    fn test_sweep_runs_on_context_load() {
        let (mut stage, mut registry, proto) = setup();
        registry.spawn(&mut stage, proto, Placement::IDENTITY).unwrap();

        stage.load_context("level_02", LoadMode::Single);
        assert_eq!(registry.dispatch_pending(&mut stage), 1);

        assert!(registry.is_empty());
        assert_eq!(registry.sweeps(), 1);
        assert_eq!(stage.reclaim_stats().gc_passes, 1);
        assert_eq!(stage.reclaim_stats().asset_unloads, 1);
    }

    #[test]
    fn test_load_context_sweeps_before_returning() {
        let (mut stage, mut registry, proto) = setup();
        registry.spawn(&mut stage, proto, Placement::IDENTITY).unwrap();

        let event = registry.load_context(&mut stage, "level_02", LoadMode::Single);

        assert_eq!(event.context, "level_02");
        assert!(!registry.contains(proto));
        assert_eq!(registry.len(), 0);
        assert_eq!(registry.sweeps(), 1);
        assert_eq!(stage.reclaim_stats().gc_passes, 1);
        assert_eq!(stage.reclaim_stats().asset_unloads, 1);
        assert_eq!(registry.dispatch_pending(&mut stage), 0);
    }

    #[test]
    fn test_spawn_replaces_pool_with_dead_container() {
        let (mut stage, mut registry, proto) = setup();
        let a = registry.spawn(&mut stage, proto, Placement::IDENTITY).unwrap();
        let old = registry.pool(proto).unwrap().id();
        stage.destroy(registry.pool(proto).unwrap().container());
        assert!(!stage.is_alive(a));

        let b = registry.spawn(&mut stage, proto, Placement::IDENTITY).unwrap();

        let pool = registry.pool(proto).unwrap();
        assert_ne!(pool.id(), old);
        assert_eq!(stage.parent(b), Some(pool.container()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_deactivated_registry_misses_notifications() {
        let (mut stage, mut registry, proto) = setup();
        registry.spawn(&mut stage, proto, Placement::IDENTITY).unwrap();
        registry.deactivate();
        assert!(!registry.is_active());
        assert_eq!(stage.signal().subscriber_count(), 0);

        stage.load_context("level_02", LoadMode::Single);

        assert_eq!(registry.dispatch_pending(&mut stage), 0);
        assert_eq!(registry.len(), 1);
        assert!(!registry.pool(proto).unwrap().pool_exists(&stage));
    }

    #[test]
    fn test_gc_on_sweep_can_be_disabled() {
        let mut stage = Stage::new();
        let config = PoolConfig {
            collect_garbage_on_sweep: false,
            ..PoolConfig::default()
        };
        let mut registry = PoolRegistry::new(config);
        registry.activate(&stage);

        stage.load_context("level_02", LoadMode::Additive);
        registry.dispatch_pending(&mut stage);

        assert_eq!(stage.reclaim_stats().gc_passes, 0);
        assert_eq!(stage.reclaim_stats().asset_unloads, 1);
    }
}
