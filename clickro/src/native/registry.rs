use lru::LruCache;
use std::{
    num::NonZeroUsize,
    sync::{Arc, Mutex, PoisonError},
};

use super::{ColumnType, UnsupportedTypeError, type_parser};

pub(crate) const DEFAULT_TYPE_CACHE: NonZeroUsize = NonZeroUsize::new(256).unwrap();

/// Type name resolver with LRU cache.
///
/// Resolving is a pure function of the name, the cache only saves reparsing
/// the same header for every block of a result.
#[derive(Debug)]
pub struct TypeRegistry {
    cache: Mutex<LruCache<String, Arc<ColumnType>>>,
}

impl TypeRegistry {
    /// Create registry caching at most `capacity` type names.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self { cache: Mutex::new(LruCache::new(capacity)) }
    }

    /// Resolve type name into its descriptor.
    pub fn resolve(&self, name: &str) -> Result<Arc<ColumnType>, UnsupportedTypeError> {
        if let Some(ty) = self.lock().get(name) {
            return Ok(ty.clone());
        }

        // parse outside the lock, a racing resolve of the same name is harmless
        let ty = Arc::new(type_parser::parse(name)?);
        self.lock().put(name.to_owned(), ty.clone());
        Ok(ty)
    }

    /// Number of cached type names.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Arc<ColumnType>>> {
        // cache content is always consistent, poisoning can be ignored
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_TYPE_CACHE)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cached_by_name() {
        let registry = TypeRegistry::new(NonZeroUsize::new(2).unwrap());
        let a = registry.resolve("Array(String)").unwrap();
        let b = registry.resolve("Array(String)").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);

        registry.resolve("UInt8").unwrap();
        registry.resolve("Int8").unwrap();
        assert_eq!(registry.len(), 2);
        let c = registry.resolve("Array(String)").unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn failure_not_cached() {
        let registry = TypeRegistry::default();
        assert!(registry.resolve("Int256").is_err());
        assert!(registry.is_empty());
    }
}
