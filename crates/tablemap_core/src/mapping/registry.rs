//! Constructors for storage methods, keyed by resolved identifier.

use super::sqlite::{SqliteCreate, SqliteLoad, SqliteRemove, SqliteStore};
use super::{
    resolve_method_id, MappingError, MappingResult, StorageMethod, CREATE, LOAD,
    PROVIDER_PLACEHOLDER, REMOVE, STORE,
};
use crate::db::Provider;
use crate::diagnostics::SharedSink;
use std::collections::BTreeMap;

/// Builds one storage method; receives the optional diagnostic sink.
pub type MethodConstructor = fn(Option<SharedSink>) -> Box<dyn StorageMethod>;

/// Resolved identifier → constructor table.
#[derive(Clone)]
pub struct MethodRegistry {
    constructors: BTreeMap<String, MethodConstructor>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl MethodRegistry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry holding the SQLite create/load/store/remove methods.
    pub fn with_builtin() -> Self {
        let sqlite = Provider::Sqlite.as_str();
        let builtin: [(&str, MethodConstructor); 4] = [
            (CREATE, |sink| Box::new(SqliteCreate::new(sink))),
            (LOAD, |sink| Box::new(SqliteLoad::new(sink))),
            (STORE, |sink| Box::new(SqliteStore::new(sink))),
            (REMOVE, |sink| Box::new(SqliteRemove::new(sink))),
        ];

        let constructors = builtin
            .into_iter()
            .map(|(template, constructor)| (resolve_method_id(template, sqlite), constructor))
            .collect();
        Self { constructors }
    }

    /// Registers a constructor under an already-resolved identifier.
    ///
    /// # Errors
    /// - `InvalidMethodId` for blank identifiers or ones still holding
    ///   `{provider}`.
    /// - `DuplicateMethod` when the identifier is taken.
    pub fn register(&mut self, method_id: &str, constructor: MethodConstructor) -> MappingResult<()> {
        let method_id = method_id.trim();
        if method_id.is_empty() || method_id.contains(PROVIDER_PLACEHOLDER) {
            return Err(MappingError::InvalidMethodId(method_id.to_string()));
        }
        if self.constructors.contains_key(method_id) {
            return Err(MappingError::DuplicateMethod(method_id.to_string()));
        }
        self.constructors.insert(method_id.to_string(), constructor);
        Ok(())
    }

    pub fn get(&self, method_id: &str) -> Option<MethodConstructor> {
        self.constructors.get(method_id).copied()
    }

    /// Sorted registered identifiers.
    pub fn method_ids(&self) -> Vec<String> {
        self.constructors.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}
