//! Service registry.

use std::collections::HashMap;
use std::sync::Arc;

use tether_core::Service;
use tracing::{debug, warn};

/// Services indexed by id.
///
/// Populated before the server starts, then shared read-only behind an `Arc`.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<Service>>,
}

impl ServiceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service. A later registration with the same id replaces the
    /// earlier one, which is returned.
    pub fn register(&mut self, service: Service) -> Option<Arc<Service>> {
        let id = service.id().to_owned();
        let previous = self.services.insert(id.clone(), Arc::new(service));
        if previous.is_some() {
            warn!(service = %id, "service re-registered, replacing previous");
        } else {
            debug!(service = %id, "service registered");
        }
        previous
    }

    /// Look up a service.
    pub fn get(&self, id: &str) -> Option<Arc<Service>> {
        self.services.get(id).cloned()
    }

    /// Whether a service is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.services.contains_key(id)
    }

    /// All service ids (sorted).
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.services.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// Whether no services are registered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
