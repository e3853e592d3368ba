//! # Facets
//!
//! Typed data attached to a node and resolved by type. Facets are cloned
//! along with the node when a prototype is instantiated.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

/// Data that can live on a node.
///
/// Implemented for every `Clone + Debug + Send + Sync + 'static` type.
pub trait Facet: Any + Send + Sync + fmt::Debug {
    /// Clones the facet behind a fresh box.
    fn clone_facet(&self) -> Box<dyn Facet>;
    /// Upcast for downcasting by type.
    fn as_any(&self) -> &dyn Any;
    /// Mutable upcast for downcasting by type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Clone + Send + Sync + fmt::Debug> Facet for T {
    fn clone_facet(&self) -> Box<dyn Facet> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// At most one facet per type.
#[derive(Debug, Default)]
pub struct FacetBag {
    facets: HashMap<TypeId, Box<dyn Facet>>,
}

impl FacetBag {
    /// Attaches `value`, replacing any facet of the same type.
    pub fn insert<T: Facet>(&mut self, value: T) {
        self.facets.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Resolves the facet of type `T`.
    #[must_use]
    pub fn get<T: Facet>(&self) -> Option<&T> {
        self.facets
            .get(&TypeId::of::<T>())
            .and_then(|f| (**f).as_any().downcast_ref::<T>())
    }

    /// Resolves the facet of type `T` mutably.
    pub fn get_mut<T: Facet>(&mut self) -> Option<&mut T> {
        self.facets
            .get_mut(&TypeId::of::<T>())
            .and_then(|f| (**f).as_any_mut().downcast_mut::<T>())
    }

    /// Detaches the facet of type `T`.
    pub fn remove<T: Facet>(&mut self) -> bool {
        self.facets.remove(&TypeId::of::<T>()).is_some()
    }

    /// Number of attached facets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.facets.len()
    }

    /// Returns true if no facet is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }
}

impl Clone for FacetBag {
    fn clone(&self) -> Self {
        Self {
            facets: self
                .facets
                .iter()
                .map(|(ty, facet)| (*ty, (**facet).clone_facet()))
                .collect(),
        }
    }
}
