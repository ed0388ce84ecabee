//! Run-scoped cache of loaded classes.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use dashmap::DashMap;
use log::debug;

use crate::descriptor::to_internal_name;
use crate::error::DesugarError;
use crate::resolver::SymbolResolver;
use crate::unit::ClassUnit;

/// Shared handle to the single live instance of a class.
pub type ClassHandle = Arc<Mutex<ClassUnit>>;

/// Why a class could not be loaded. Cached like successes so that every
/// caller sees the same outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadFailure {
    NotFound,
    Malformed(String),
}

impl LoadFailure {
    pub fn into_error(self, name: &str) -> DesugarError {
        match self {
            LoadFailure::NotFound => DesugarError::ClassNotFound { name: name.into() },
            LoadFailure::Malformed(reason) => DesugarError::MalformedClass {
                name: name.into(),
                reason,
            },
        }
    }
}

type Slot = Arc<OnceLock<Result<ClassHandle, LoadFailure>>>;

/// Loads each class at most once per run, even under concurrent requests.
pub struct ClassLoader<'r> {
    resolver: &'r SymbolResolver,
    cache: DashMap<String, Slot>,
}

impl<'r> ClassLoader<'r> {
    pub fn new(resolver: &'r SymbolResolver) -> Self {
        ClassLoader {
            resolver,
            cache: DashMap::new(),
        }
    }

    pub fn resolver(&self) -> &'r SymbolResolver {
        self.resolver
    }

    /// Return the cached instance for `qualified_name`, resolving it on the
    /// first request. Concurrent first requests wait on one resolution.
    pub fn load(&self, qualified_name: &str) -> Result<ClassHandle, LoadFailure> {
        let key = to_internal_name(qualified_name);
        // Clone the slot out so the map shard is unlocked while resolving.
        let slot = self.cache.entry(key).or_default().value().clone();
        slot.get_or_init(|| {
            debug!("loading {qualified_name}");
            match self.resolver.resolve(qualified_name) {
                Ok(unit) => Ok(Arc::new(Mutex::new(unit))),
                Err(DesugarError::ClassNotFound { .. }) => Err(LoadFailure::NotFound),
                Err(e) => Err(LoadFailure::Malformed(e.to_string())),
            }
        })
        .clone()
    }

    /// Drop the cached instance once its class has been emitted.
    pub fn release(&self, qualified_name: &str) {
        self.cache.remove(&to_internal_name(qualified_name));
    }

    /// Number of names with a cached outcome.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Lock a class, recovering it if another worker panicked while holding it.
pub fn lock(handle: &ClassHandle) -> MutexGuard<'_, ClassUnit> {
    handle.lock().unwrap_or_else(|p| p.into_inner())
}
