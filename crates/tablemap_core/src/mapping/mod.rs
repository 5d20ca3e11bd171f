//! Storage methods and the dispatcher that resolves them per provider.
//!
//! # Responsibility
//! - Define the `StorageMethod` contract shared by create/load/store/remove.
//! - Derive statement inputs (table, key, fields, soft delete) from metadata.
//! - Resolve `{provider}` identifiers and cache one method per identifier.
//!
//! # Invariants
//! - Storage methods keep no per-entity state between calls.
//! - `{provider}` is substituted exactly once, case-sensitively.
//! - Not-found is `Ok(false)`, never an error.

use crate::adapter::{QueryAdapter, SqlValue};
use crate::db::DbError;
use crate::model::entity::{Entity, EntityMeta, SoftDeleteDescriptor};
use crate::model::field::FieldDescriptor;
use crate::model::{MetadataError, MetadataResult};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod dispatcher;
mod registry;
pub mod sqlite;

pub use dispatcher::MappingDispatcher;
pub use registry::{MethodConstructor, MethodRegistry};

/// Token replaced by the connection's provider name.
pub const PROVIDER_PLACEHOLDER: &str = "{provider}";

pub const CREATE: &str = "{provider}.create";
pub const LOAD: &str = "{provider}.load";
pub const STORE: &str = "{provider}.store";
pub const REMOVE: &str = "{provider}.remove";

/// Substitutes the first `{provider}` in `template` with `provider`.
pub fn resolve_method_id(template: &str, provider: &str) -> String {
    template.replacen(PROVIDER_PLACEHOLDER, provider, 1)
}

pub type MappingResult<T> = Result<T, MappingError>;

/// Error surfaced by the dispatcher and storage methods.
#[derive(Debug)]
pub enum MappingError {
    Metadata(MetadataError),
    Db(DbError),
    /// No constructor is registered for the resolved identifier.
    UnknownMethod(String),
    InvalidMethodId(String),
    DuplicateMethod(String),
}

impl Display for MappingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Metadata(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::UnknownMethod(id) => write!(f, "no storage method registered as `{id}`"),
            Self::InvalidMethodId(id) => write!(f, "invalid storage method identifier `{id}`"),
            Self::DuplicateMethod(id) => write!(f, "storage method already registered: {id}"),
        }
    }
}

impl Error for MappingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Metadata(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MetadataError> for MappingError {
    fn from(value: MetadataError) -> Self {
        Self::Metadata(value)
    }
}

impl From<DbError> for MappingError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

/// Per-call options for a storage method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodParams {
    /// Primary key to operate on instead of the entity's own.
    pub key: Option<SqlValue>,
    /// Restricts load/store to these logical fields.
    pub fields: Option<Vec<String>>,
}

impl MethodParams {
    pub fn by_key(key: impl Into<SqlValue>) -> Self {
        Self {
            key: Some(key.into()),
            fields: None,
        }
    }

    pub fn only_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    fn includes(&self, name: &str) -> bool {
        self.fields
            .as_ref()
            .map_or(true, |fields| fields.iter().any(|field| field == name))
    }
}

/// One CRUD action for one provider.
pub trait StorageMethod {
    /// Runs the action for `entity`.
    ///
    /// Returns `Ok(false)` when storage reports nothing to act on (insert of
    /// zero rows, load finding no row).
    fn execute(
        &self,
        adapter: &dyn QueryAdapter,
        entity: &mut Entity,
        params: &MethodParams,
    ) -> MappingResult<bool>;
}

/// One persisted field with its value in storage form.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue<'a> {
    pub descriptor: &'a FieldDescriptor,
    pub value: SqlValue,
}

impl FieldValue<'_> {
    pub fn column(&self) -> &str {
        self.descriptor.column().unwrap_or_default()
    }
}

/// Everything a storage method needs from entity metadata for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementInputs<'a> {
    pub meta: &'a EntityMeta,
    pub table: &'a str,
    pub primary_column: &'a str,
    pub fields: Vec<FieldValue<'a>>,
    pub soft_delete: Option<&'a SoftDeleteDescriptor>,
}

impl<'a> StatementInputs<'a> {
    /// Collects persisted fields of `entity` converted to storage form.
    pub fn new(meta: &'a EntityMeta, entity: &Entity) -> MetadataResult<Self> {
        let fields = meta
            .fields()
            .iter()
            .filter(|descriptor| descriptor.is_persisted())
            .map(|descriptor| {
                let current = entity.get(&descriptor.name).unwrap_or(&SqlValue::Null);
                Ok(FieldValue {
                    descriptor,
                    value: descriptor.to_storage(current)?,
                })
            })
            .collect::<MetadataResult<Vec<_>>>()?;

        Ok(Self {
            meta,
            table: meta.table(),
            primary_column: meta.primary_column(),
            fields,
            soft_delete: meta.soft_delete(),
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue<'a>> {
        self.fields
            .iter()
            .find(|field| field.descriptor.name == name)
    }

    /// Primary key in storage form, from `params` or the entity.
    pub fn key(&self, params: &MethodParams) -> MetadataResult<SqlValue> {
        let key_field = self.meta.primary_key();
        let key = match &params.key {
            Some(key) => key_field.to_storage(key)?,
            None => self
                .field(&key_field.name)
                .map(|field| field.value.clone())
                .unwrap_or_default(),
        };
        if key.is_empty() {
            return Err(MetadataError::MissingPrimaryKeyValue {
                entity: self.meta.entity().to_string(),
            });
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve_method_id, MethodParams, CREATE};

    #[test]
    fn resolve_substitutes_placeholder_once() {
        assert_eq!(resolve_method_id(CREATE, "sqlite"), "sqlite.create");
        assert_eq!(
            resolve_method_id("{provider}.{provider}", "sqlite"),
            "sqlite.{provider}"
        );
        assert_eq!(resolve_method_id("{Provider}.load", "sqlite"), "{Provider}.load");
    }

    #[test]
    fn params_field_filter_defaults_to_everything() {
        assert!(MethodParams::default().includes("any"));
        let params = MethodParams::by_key(3).only_fields(["name"]);
        assert!(params.includes("name"));
        assert!(!params.includes("email"));
    }
}
