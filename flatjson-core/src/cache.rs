//! Descriptor caches.
//!
//! Descriptors are immutable once built, so every strategy here hands out `Arc`s and decoding
//! behaves the same whichever one is selected. Strategies differ only in where the memoized
//! descriptors live.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::*;

use crate::config::{CacheMode, DescriptorConfig};
use crate::descriptor::SchemaDescriptor;
use crate::error::SchemaError;
use crate::shape::{SchemaSet, SchemaSetId, ShapeId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub schema: SchemaSetId,
    pub shape: ShapeId,
    pub config: DescriptorConfig,
}

type DescriptorMap = FxHashMap<CacheKey, Arc<SchemaDescriptor>>;

thread_local! {
    /// Keys whose descriptors are being built on this thread.
    static UNDER_CONSTRUCTION: RefCell<FxHashSet<CacheKey>> = RefCell::new(FxHashSet::default());

    static THREAD_LOCAL: RefCell<DescriptorMap> = RefCell::new(DescriptorMap::default());
}

fn shared_map() -> &'static RwLock<DescriptorMap> {
    static SHARED: OnceLock<RwLock<DescriptorMap>> = OnceLock::new();
    SHARED.get_or_init(|| RwLock::new(DescriptorMap::default()))
}

pub trait DescriptorCache: Send + Sync + fmt::Debug {
    fn get(&self, key: &CacheKey) -> Option<Arc<SchemaDescriptor>>;

    /// Publishes a freshly built descriptor. When another thread won the race the already
    /// published descriptor is returned instead.
    fn insert(&self, key: CacheKey, descriptor: Arc<SchemaDescriptor>) -> Arc<SchemaDescriptor>;

    fn get_or_build(
        &self,
        schema: &SchemaSet,
        shape: ShapeId,
        config: &DescriptorConfig,
    ) -> Result<Arc<SchemaDescriptor>, SchemaError> {
        let key = CacheKey {
            schema: schema.id(),
            shape,
            config: config.clone(),
        };
        if let Some(found) = self.get(&key) {
            return Ok(found);
        }

        let _guard = ConstructionGuard::enter(&key).ok_or_else(|| SchemaError::CyclicFlatten {
            shape: schema
                .shape(shape)
                .map_or_else(|_| format!("#{}", shape.index()), |s| s.name.clone()),
        })?;

        debug!(shape = shape.index(), "descriptor cache miss");
        let built = SchemaDescriptor::build(schema, shape, config, &mut |sub| {
            self.get_or_build(schema, sub, config)
        })?;
        Ok(self.insert(key, Arc::new(built)))
    }
}

/// Marks a key as under construction for as long as it is alive.
struct ConstructionGuard {
    key: CacheKey,
}

impl ConstructionGuard {
    fn enter(key: &CacheKey) -> Option<Self> {
        let fresh = UNDER_CONSTRUCTION.with(|keys| keys.borrow_mut().insert(key.clone()));
        fresh.then(|| ConstructionGuard { key: key.clone() })
    }
}

impl Drop for ConstructionGuard {
    fn drop(&mut self) {
        UNDER_CONSTRUCTION.with(|keys| keys.borrow_mut().remove(&self.key));
    }
}

/// Process-wide cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct SharedCache;

impl DescriptorCache for SharedCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<SchemaDescriptor>> {
        shared_map().read().get(key).cloned()
    }

    fn insert(&self, key: CacheKey, descriptor: Arc<SchemaDescriptor>) -> Arc<SchemaDescriptor> {
        shared_map().write().entry(key).or_insert(descriptor).clone()
    }
}

/// A cache owned by one codec.
#[derive(Debug, Default)]
pub struct ExclusiveCache {
    map: RwLock<DescriptorMap>,
}

impl ExclusiveCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl DescriptorCache for ExclusiveCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<SchemaDescriptor>> {
        self.map.read().get(key).cloned()
    }

    fn insert(&self, key: CacheKey, descriptor: Arc<SchemaDescriptor>) -> Arc<SchemaDescriptor> {
        self.map.write().entry(key).or_insert(descriptor).clone()
    }
}

/// One cache per thread; no locking on the hot path.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadLocalCache;

impl DescriptorCache for ThreadLocalCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<SchemaDescriptor>> {
        THREAD_LOCAL.with(|map| map.borrow().get(key).cloned())
    }

    fn insert(&self, key: CacheKey, descriptor: Arc<SchemaDescriptor>) -> Arc<SchemaDescriptor> {
        THREAD_LOCAL.with(|map| map.borrow_mut().entry(key).or_insert(descriptor).clone())
    }
}

/// Thread-local front backed by the process-wide cache.
#[derive(Debug, Default, Clone, Copy)]
pub struct TwoLevelCache;

impl DescriptorCache for TwoLevelCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<SchemaDescriptor>> {
        if let Some(found) = ThreadLocalCache.get(key) {
            return Some(found);
        }
        let found = SharedCache.get(key)?;
        Some(ThreadLocalCache.insert(key.clone(), found))
    }

    fn insert(&self, key: CacheKey, descriptor: Arc<SchemaDescriptor>) -> Arc<SchemaDescriptor> {
        let published = SharedCache.insert(key.clone(), descriptor);
        ThreadLocalCache.insert(key, published)
    }
}

pub fn cache_for(mode: CacheMode) -> Arc<dyn DescriptorCache> {
    match mode {
        CacheMode::Shared => Arc::new(SharedCache),
        CacheMode::Exclusive => Arc::new(ExclusiveCache::new()),
        CacheMode::ThreadLocal => Arc::new(ThreadLocalCache),
        CacheMode::TwoLevel => Arc::new(TwoLevelCache),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Element, ScalarKind, SchemaBuilder, ShapeKind};

    fn schema() -> SchemaSet {
        let mut b = SchemaBuilder::new();
        let int = b.scalar(ScalarKind::Int);
        b.add(
            "Point",
            ShapeKind::Object {
                elements: vec![Element::new("x", int), Element::new("y", int)],
            },
        )
        .unwrap();
        b.build().unwrap()
    }

    #[test]
    fn every_mode_memoizes() {
        let schema = schema();
        let point = schema.shape_id("Point").unwrap();
        let config = DescriptorConfig::default();
        for mode in [
            CacheMode::Shared,
            CacheMode::Exclusive,
            CacheMode::ThreadLocal,
            CacheMode::TwoLevel,
        ] {
            let cache = cache_for(mode);
            let a = cache.get_or_build(&schema, point, &config).unwrap();
            let b = cache.get_or_build(&schema, point, &config).unwrap();
            assert!(Arc::ptr_eq(&a, &b), "{mode:?}");
            assert_eq!(a.element_count(), 2);
        }
    }

    #[test]
    fn config_is_part_of_the_key() {
        let schema = schema();
        let point = schema.shape_id("Point").unwrap();
        let cache = ExclusiveCache::new();
        let strict = DescriptorConfig::default();
        let lenient = DescriptorConfig {
            ignore_unknown_keys: true,
            ..DescriptorConfig::default()
        };
        let a = cache.get_or_build(&schema, point, &strict).unwrap();
        let b = cache.get_or_build(&schema, point, &lenient).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn two_level_publishes_to_shared() {
        let schema = schema();
        let point = schema.shape_id("Point").unwrap();
        let config = DescriptorConfig::default();
        let built = TwoLevelCache.get_or_build(&schema, point, &config).unwrap();
        let key = CacheKey {
            schema: schema.id(),
            shape: point,
            config,
        };
        let shared = SharedCache.get(&key).unwrap();
        assert!(Arc::ptr_eq(&built, &shared));
    }

    #[test]
    fn reentrant_construction_fails_fast() {
        let schema = schema();
        let point = schema.shape_id("Point").unwrap();
        let key = CacheKey {
            schema: schema.id(),
            shape: point,
            config: DescriptorConfig::default(),
        };
        let _outer = ConstructionGuard::enter(&key).unwrap();
        let err = ExclusiveCache::new()
            .get_or_build(&schema, point, &DescriptorConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::CyclicFlatten {
                shape: "Point".into()
            }
        );
    }
}
