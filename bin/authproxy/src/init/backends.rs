//! State store backends registration and lookup.
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use authproxy_store::StoreFactory;

/// The configured state store backend is not supported by this build.
#[derive(Debug, thiserror::Error)]
#[error("state store backend '{0}' not recognised")]
pub struct BackendNotFound(String);

/// Register of state store factories for implementations supported by the process/build.
#[derive(Clone, Default)]
pub struct Backends {
    /// Supported state store backends.
    stores: HashMap<String, Arc<dyn StoreFactory>>,
}

impl Backends {
    /// Register a new factory for a state store implementation.
    ///
    /// # Panics
    ///
    /// This method panics if the identifier of the new state store backend is already in use.
    pub fn register_store<B, S>(&mut self, id: S, backend: B) -> &mut Self
    where
        B: StoreFactory + 'static,
        S: Into<String>,
    {
        match self.stores.entry(id.into()) {
            Entry::Occupied(entry) => {
                panic!(
                    "a StoreBackend with id '{}' is already registered",
                    entry.key()
                )
            }
            Entry::Vacant(entry) => entry.insert(Arc::new(backend)),
        };
        self
    }

    /// Lookup a [`StoreFactory`] by ID.
    pub fn store(&self, id: &str) -> Result<&dyn StoreFactory> {
        let factory = self
            .stores
            .get(id)
            .ok_or_else(|| BackendNotFound(id.to_string()))?;
        Ok(factory.as_ref())
    }
}
