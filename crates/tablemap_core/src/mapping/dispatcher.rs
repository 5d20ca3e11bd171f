//! Resolves storage-method identifiers and routes calls to cached instances.

use super::{
    resolve_method_id, MappingError, MappingResult, MethodParams, MethodRegistry, StorageMethod,
};
use crate::adapter::QueryAdapter;
use crate::diagnostics::SharedSink;
use crate::model::entity::Entity;
use log::debug;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Per-connection cache of storage methods.
///
/// Instances are created on first use of a resolved identifier and kept for
/// the dispatcher's lifetime.
#[derive(Default)]
pub struct MappingDispatcher {
    registry: MethodRegistry,
    cache: HashMap<String, Box<dyn StorageMethod>>,
    sink: Option<SharedSink>,
}

impl MappingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: MethodRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// Sink handed to every storage method constructed from now on.
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Resolves `method_id` against the adapter's provider and runs it.
    ///
    /// # Errors
    /// - `UnknownMethod` when nothing is registered for the resolved id.
    /// - Whatever the storage method reports.
    pub fn execute(
        &mut self,
        adapter: &dyn QueryAdapter,
        method_id: &str,
        entity: &mut Entity,
        params: &MethodParams,
    ) -> MappingResult<bool> {
        let resolved = resolve_method_id(method_id, adapter.provider().as_str());
        let method = match self.cache.entry(resolved) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let constructor = self
                    .registry
                    .get(entry.key())
                    .ok_or_else(|| MappingError::UnknownMethod(entry.key().clone()))?;
                debug!(
                    "event=storage_method_resolve module=mapping status=ok method={}",
                    entry.key()
                );
                entry.insert(constructor(self.sink.clone()))
            }
        };
        method.execute(adapter, entity, params)
    }

    /// Whether an instance for the resolved identifier is cached.
    pub fn is_cached(&self, resolved_id: &str) -> bool {
        self.cache.contains_key(resolved_id)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}
