//! Process-lifetime cache of recipe sets, one per type.
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::descriptor::TypeDescriptor;
use crate::recipe::Recipe;

static GLOBAL: Lazy<Catalog> = Lazy::new(Catalog::new);

/// Recipe sets keyed by type. Safe to share across threads; a set computed
/// twice in a race is identical, and the first insert wins. A set computed
/// while a registration was landing is discarded and recomputed.
#[derive(Default)]
pub struct Catalog {
    cache: DashMap<TypeId, Arc<[Recipe]>>,
    custom: DashMap<TypeId, Vec<Recipe>>,
    builds: AtomicUsize,
    /// Bumped by every registration, under the cache entry lock.
    revision: AtomicU64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance used by the crate-level entry points.
    pub fn global() -> &'static Catalog {
        &GLOBAL
    }

    /// Candidates for `ty`, highest priority first, declaration order within
    /// a priority.
    pub fn recipes(&self, ty: &TypeDescriptor) -> Arc<[Recipe]> {
        loop {
            if let Some(cached) = self.cache.get(&ty.id()) {
                return cached.clone();
            }
            let seen = self.revision.load(Ordering::Acquire);
            let computed = self.compute(ty);
            if let Some(set) = self.install(ty.id(), seen, computed) {
                return set;
            }
            debug!(ty = ty.name(), "recipe set went stale during computation");
        }
    }

    /// Cache `computed` unless a registration happened since `seen`.
    fn install(&self, id: TypeId, seen: u64, computed: Arc<[Recipe]>) -> Option<Arc<[Recipe]>> {
        match self.cache.entry(id) {
            Entry::Occupied(entry) => Some(entry.get().clone()),
            Entry::Vacant(_) if self.revision.load(Ordering::Acquire) != seen => None,
            Entry::Vacant(entry) => Some(entry.insert(computed).clone()),
        }
    }

    /// Add a recipe for its return type. Custom recipes join the built-in
    /// ones; their default priority puts them first.
    pub fn register(&self, recipe: Recipe) {
        let id = recipe.returns().id();
        debug!(ty = recipe.returns().name(), recipe = recipe.label(), "registered custom recipe");
        self.custom.entry(id).or_default().push(recipe);
        // a lookup installs under this same lock, so it either sees the new
        // revision or has its stale set removed here
        let entry = self.cache.entry(id);
        self.revision.fetch_add(1, Ordering::AcqRel);
        if let Entry::Occupied(entry) = entry {
            entry.remove();
        }
    }

    /// Drop the cached set for `ty`; the next lookup recomputes it.
    pub fn evict(&self, ty: &TypeDescriptor) -> bool {
        self.cache.remove(&ty.id()).is_some()
    }

    pub fn is_cached(&self, ty: &TypeDescriptor) -> bool {
        self.cache.contains_key(&ty.id())
    }

    /// How many recipe sets have been computed so far, races included.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    fn compute(&self, ty: &TypeDescriptor) -> Arc<[Recipe]> {
        let mut recipes = self
            .custom
            .get(&ty.id())
            .map(|custom| custom.clone())
            .unwrap_or_default();
        recipes.extend(ty.build_recipes());
        recipes.sort_by_key(|recipe| std::cmp::Reverse(recipe.priority()));
        self.builds.fetch_add(1, Ordering::Relaxed);
        debug!(ty = ty.name(), count = recipes.len(), "computed recipe set");
        recipes.into()
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("cached", &self.cache.len())
            .field("custom", &self.custom.len())
            .field("builds", &self.build_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Mapped;
    use crate::element::Element;
    use rayon::prelude::*;

    #[test]
    fn recipe_sets_are_computed_once() {
        let catalog = Catalog::new();
        let ty = <Vec<u32>>::descriptor();
        let first = catalog.recipes(&ty);
        let second = catalog.recipes(&ty);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(catalog.build_count(), 1);
    }

    #[test]
    fn concurrent_lookups_share_one_set() {
        let catalog = Catalog::new();
        let ty = <Option<String>>::descriptor();
        let sets = (0..64).into_par_iter().map(|_| catalog.recipes(&ty)).collect::<Vec<_>>();
        let kept = catalog.recipes(&ty);
        assert!(sets.iter().all(|set| set.len() == kept.len()));
        assert!(catalog.build_count() >= 1);
        let settled = catalog.build_count();
        catalog.recipes(&ty);
        assert_eq!(catalog.build_count(), settled);
    }

    #[test]
    fn registering_evicts_and_sorts_first() {
        let catalog = Catalog::new();
        let ty = u8::descriptor();
        assert_eq!(catalog.recipes(&ty).len(), 1);
        catalog.register(
            Recipe::custom::<u8>("from string")
                .leaf(Element::is_string, |e| Ok(e.as_str().unwrap_or_default().parse()?), |v| Ok(Element::from(v.to_string()))),
        );
        assert!(!catalog.is_cached(&ty));
        let set = catalog.recipes(&ty);
        assert_eq!(set.len(), 2);
        assert_eq!(set[0].label(), "from string");
        assert_eq!(catalog.build_count(), 2);
        assert!(catalog.evict(&ty));
        assert!(!catalog.evict(&ty));
    }

    #[test]
    fn set_computed_before_a_registration_is_not_cached() {
        let catalog = Catalog::new();
        let ty = u16::descriptor();
        let seen = catalog.revision.load(Ordering::Acquire);
        let stale = catalog.compute(&ty);
        catalog.register(
            Recipe::custom::<u16>("from string")
                .leaf(Element::is_string, |e| Ok(e.as_str().unwrap_or_default().parse()?), |v| Ok(Element::from(v.to_string()))),
        );
        assert!(catalog.install(ty.id(), seen, stale).is_none());
        assert!(!catalog.is_cached(&ty));
        assert_eq!(catalog.recipes(&ty)[0].label(), "from string");
    }

    #[test]
    fn registrations_racing_lookups_are_never_lost() {
        let catalog = Catalog::new();
        let ty = i16::descriptor();
        (0..64).into_par_iter().for_each(|i| {
            if i == 32 {
                catalog.register(
                    Recipe::custom::<i16>("from string")
                        .leaf(Element::is_string, |e| Ok(e.as_str().unwrap_or_default().parse()?), |v| Ok(Element::from(v.to_string()))),
                );
            } else {
                catalog.recipes(&ty);
            }
        });
        assert_eq!(catalog.recipes(&ty)[0].label(), "from string");
    }
}
