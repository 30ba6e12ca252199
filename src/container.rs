//! Service container handed to checkers.
//!
//! Populated during startup and read-only once the server runs, so lookups
//! take no locks.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

/// Type-keyed registry of shared services.
#[derive(Default, Clone)]
pub struct Container {
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, replacing any previous one of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, service: Arc<T>) -> &mut Self {
        debug!("Registered service: {}", std::any::type_name::<T>());
        self.services.insert(TypeId::of::<T>(), service);
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|s| Arc::clone(s).downcast::<T>().ok())
    }

    /// Resolve a service, failing with an internal error if it is missing.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> crate::Result<Arc<T>> {
        self.get::<T>().ok_or_else(|| {
            crate::Error::Internal(format!(
                "Service not registered: {}",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.services.contains_key(&TypeId::of::<T>())
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("services", &self.services.len())
            .finish()
    }
}
