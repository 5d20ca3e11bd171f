//! Entity metadata tables and caller-owned entity instances.
//!
//! # Invariants
//! - `EntityMeta` is only constructed through validation.
//! - An `Entity` never holds values for complex fields.
//! - Only persisted, writable fields are tracked as changed.

use super::field::{FieldDescriptor, FieldKind};
use super::{MetadataError, MetadataResult};
use crate::adapter::fragment::is_sql_identifier;
use crate::adapter::SqlValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Status-flag deletion settings for one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftDeleteDescriptor {
    /// Column holding the status flag.
    pub status_column: String,
    /// Status value that marks a row as removed.
    pub removed_value: SqlValue,
    /// Column recording when the row was marked removed.
    pub removed_at_column: String,
}

impl SoftDeleteDescriptor {
    pub fn new(
        status_column: &str,
        removed_value: impl Into<SqlValue>,
        removed_at_column: &str,
    ) -> Self {
        Self {
            status_column: status_column.to_string(),
            removed_value: removed_value.into(),
            removed_at_column: removed_at_column.to_string(),
        }
    }
}

/// Unvalidated wire form of [`EntityMeta`].
#[derive(Debug, Clone, Deserialize)]
pub struct EntityMetaDef {
    pub entity: String,
    pub table: String,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub soft_delete: Option<SoftDeleteDescriptor>,
}

/// Validated descriptor table of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EntityMetaDef")]
pub struct EntityMeta {
    entity: String,
    table: String,
    fields: Vec<FieldDescriptor>,
    soft_delete: Option<SoftDeleteDescriptor>,
    #[serde(skip)]
    primary_index: usize,
}

impl TryFrom<EntityMetaDef> for EntityMeta {
    type Error = MetadataError;

    fn try_from(def: EntityMetaDef) -> Result<Self, Self::Error> {
        let meta = Self::new(&def.entity, &def.table, def.fields)?;
        match def.soft_delete {
            Some(soft_delete) => meta.with_soft_delete(soft_delete),
            None => Ok(meta),
        }
    }
}

impl EntityMeta {
    /// Validates `fields` and builds the metadata table.
    ///
    /// # Errors
    /// - Duplicate field names, missing or repeated primary key, empty
    ///   primary column, non-identifier table/column names, persisted fields
    ///   without a column, computed fields with nothing to select.
    pub fn new(entity: &str, table: &str, fields: Vec<FieldDescriptor>) -> MetadataResult<Self> {
        ensure_identifier(table)?;
        let primary_index = validate_fields(entity, &fields)?;
        Ok(Self {
            entity: entity.to_string(),
            table: table.to_string(),
            fields,
            soft_delete: None,
            primary_index,
        })
    }

    /// Enables status-flag deletion for this entity type.
    pub fn with_soft_delete(mut self, soft_delete: SoftDeleteDescriptor) -> MetadataResult<Self> {
        ensure_identifier(&soft_delete.status_column)?;
        ensure_identifier(&soft_delete.removed_at_column)?;
        self.soft_delete = Some(soft_delete);
        Ok(self)
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_by_column(&self, column: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.column() == Some(column))
    }

    pub fn primary_key(&self) -> &FieldDescriptor {
        &self.fields[self.primary_index]
    }

    /// Physical primary-key column; non-empty by construction.
    pub fn primary_column(&self) -> &str {
        self.primary_key().column().unwrap_or_default()
    }

    pub fn soft_delete(&self) -> Option<&SoftDeleteDescriptor> {
        self.soft_delete.as_ref()
    }
}

/// Checks the descriptor table and returns the primary-key position.
fn validate_fields(entity: &str, fields: &[FieldDescriptor]) -> MetadataResult<usize> {
    let mut names = BTreeSet::new();
    let mut primary_index = None;
    for (index, field) in fields.iter().enumerate() {
        if !names.insert(field.name.as_str()) {
            return Err(MetadataError::DuplicateField(field.name.clone()));
        }

        if field.primary_key {
            if primary_index.replace(index).is_some() {
                return Err(MetadataError::MultiplePrimaryKeys {
                    entity: entity.to_string(),
                });
            }
            if field.column().is_none() {
                return Err(MetadataError::EmptyPrimaryColumn {
                    entity: entity.to_string(),
                });
            }
        }

        match field.kind {
            FieldKind::Persisted if field.column().is_none() => {
                return Err(MetadataError::MissingColumn(field.name.clone()));
            }
            FieldKind::Computed if field.column().is_none() && field.select_expr.is_none() => {
                return Err(MetadataError::MissingSelectExpression(field.name.clone()));
            }
            _ => {}
        }

        if field.select_item().is_some() {
            ensure_identifier(&field.name)?;
        }
        if let Some(column) = field.column() {
            ensure_identifier(column)?;
        }
    }

    primary_index.ok_or_else(|| MetadataError::MissingPrimaryKey {
        entity: entity.to_string(),
    })
}

fn ensure_identifier(name: &str) -> MetadataResult<()> {
    if is_sql_identifier(name) {
        Ok(())
    } else {
        Err(MetadataError::InvalidIdentifier(name.to_string()))
    }
}

/// Lifecycle state of an in-memory entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Never written to storage.
    New,
    /// Matches the last loaded or written storage state.
    Loaded,
    /// Loaded, then modified in memory.
    Dirty,
    /// Removed from storage (physically or by status flag).
    Removed,
}

/// One caller-owned entity instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    meta: Arc<EntityMeta>,
    values: BTreeMap<String, SqlValue>,
    changed: BTreeSet<String>,
    state: EntityState,
}

impl Entity {
    pub fn new(meta: Arc<EntityMeta>) -> Self {
        let values = meta
            .fields()
            .iter()
            .filter(|field| field.kind != FieldKind::Complex)
            .map(|field| (field.name.clone(), SqlValue::Null))
            .collect();
        Self {
            meta,
            values,
            changed: BTreeSet::new(),
            state: EntityState::New,
        }
    }

    pub fn meta(&self) -> &Arc<EntityMeta> {
        &self.meta
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values.get(name)
    }

    /// Assigns one field after validating it against its descriptor.
    ///
    /// # Errors
    /// - `UnknownField` for undeclared or complex fields.
    /// - `ReadOnlyField` for computed/read-only fields, for a generated
    ///   primary key, and for any primary key once the entity exists in
    ///   storage.
    /// - Value errors from [`FieldDescriptor::normalize`].
    pub fn set(&mut self, name: &str, value: impl Into<SqlValue>) -> MetadataResult<()> {
        let field = self
            .meta
            .field(name)
            .filter(|field| field.kind != FieldKind::Complex)
            .ok_or_else(|| MetadataError::UnknownField(name.to_string()))?;

        // Storage assigns generated keys; create would discard a caller value.
        let locked_key =
            field.primary_key && (field.generated || self.state != EntityState::New);
        if field.kind == FieldKind::Computed || field.read_only || locked_key {
            return Err(MetadataError::ReadOnlyField(name.to_string()));
        }

        let value = field.normalize(value.into())?;
        let tracked = field.is_writable() && !field.primary_key;
        self.values.insert(name.to_string(), value);
        if tracked {
            self.changed.insert(name.to_string());
            if self.state == EntityState::Loaded {
                self.state = EntityState::Dirty;
            }
        }
        Ok(())
    }

    /// Current primary-key value, if one is set.
    pub fn primary_key_value(&self) -> Option<&SqlValue> {
        self.values
            .get(&self.meta.primary_key().name)
            .filter(|value| !value.is_null())
    }

    /// Names of persisted fields modified since the last load or write.
    pub fn changed_fields(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }

    pub fn is_changed(&self) -> bool {
        !self.changed.is_empty()
    }

    pub(crate) fn mark_created(&mut self, primary_key: SqlValue) {
        let key_name = self.meta.primary_key().name.clone();
        self.values.insert(key_name, primary_key);
        self.changed.clear();
        self.state = EntityState::Loaded;
    }

    pub(crate) fn mark_loaded(&mut self, values: Vec<(String, SqlValue)>) {
        for (name, value) in values {
            self.values.insert(name, value);
        }
        self.changed.clear();
        self.state = EntityState::Loaded;
    }

    pub(crate) fn mark_stored(&mut self) {
        self.changed.clear();
        self.state = EntityState::Loaded;
    }

    pub(crate) fn mark_removed(&mut self) {
        self.changed.clear();
        self.state = EntityState::Removed;
    }
}

#[cfg(test)]
mod tests {
    use super::{Entity, EntityMeta, EntityState, SoftDeleteDescriptor};
    use crate::adapter::SqlValue;
    use crate::model::field::{FieldDescriptor, FieldType};
    use crate::model::MetadataError;

    fn account_fields() -> Vec<FieldDescriptor> {
        vec![
            FieldDescriptor::persisted("id", "id", FieldType::Integer).generated_key(),
            FieldDescriptor::persisted("email", "email", FieldType::String),
            FieldDescriptor::computed("email_length", "length(email)", FieldType::Integer),
            FieldDescriptor::helper("display", FieldType::String),
            FieldDescriptor::complex("roles"),
        ]
    }

    #[test]
    fn new_requires_exactly_one_primary_key() {
        let no_key = vec![FieldDescriptor::persisted("email", "email", FieldType::String)];
        assert!(matches!(
            EntityMeta::new("account", "accounts", no_key),
            Err(MetadataError::MissingPrimaryKey { .. })
        ));

        let two_keys = vec![
            FieldDescriptor::persisted("a", "a", FieldType::Integer).primary_key(),
            FieldDescriptor::persisted("b", "b", FieldType::Integer).primary_key(),
        ];
        assert!(matches!(
            EntityMeta::new("account", "accounts", two_keys),
            Err(MetadataError::MultiplePrimaryKeys { .. })
        ));

        let empty_column = vec![FieldDescriptor::persisted("id", "", FieldType::Integer).primary_key()];
        assert!(matches!(
            EntityMeta::new("account", "accounts", empty_column),
            Err(MetadataError::EmptyPrimaryColumn { .. })
        ));
    }

    #[test]
    fn new_rejects_duplicates_and_bad_identifiers() {
        let mut fields = account_fields();
        fields.push(FieldDescriptor::persisted("email", "email2", FieldType::String));
        assert!(matches!(
            EntityMeta::new("account", "accounts", fields),
            Err(MetadataError::DuplicateField(name)) if name == "email"
        ));

        assert!(matches!(
            EntityMeta::new("account", "accounts;--", account_fields()),
            Err(MetadataError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn set_tracks_changes_and_guards_read_only_fields() {
        let meta = EntityMeta::new("account", "accounts", account_fields())
            .unwrap()
            .into_shared();
        let mut entity = Entity::new(meta);
        assert_eq!(entity.state(), EntityState::New);
        assert_eq!(entity.get("roles"), None);

        entity.set("email", "a@example.com").unwrap();
        entity.set("display", "Alice").unwrap();
        assert_eq!(entity.changed_fields().collect::<Vec<_>>(), vec!["email"]);

        assert!(matches!(
            entity.set("email_length", 3),
            Err(MetadataError::ReadOnlyField(_))
        ));
        assert!(matches!(
            entity.set("roles", "admin"),
            Err(MetadataError::UnknownField(_))
        ));
    }

    #[test]
    fn generated_key_is_refused_on_new_entity() {
        let meta = EntityMeta::new("account", "accounts", account_fields())
            .unwrap()
            .into_shared();
        let mut entity = Entity::new(meta);
        assert!(matches!(
            entity.set("id", 99),
            Err(MetadataError::ReadOnlyField(ref name)) if name == "id"
        ));
        assert_eq!(entity.primary_key_value(), None);
        assert!(!entity.is_changed());
    }

    #[test]
    fn loaded_entity_becomes_dirty_and_locks_its_key() {
        let meta = EntityMeta::new("account", "accounts", account_fields())
            .unwrap()
            .into_shared();
        let mut entity = Entity::new(meta);
        entity.mark_loaded(vec![
            ("id".to_string(), SqlValue::Int(4)),
            ("email".to_string(), SqlValue::from("x@example.com")),
        ]);
        assert_eq!(entity.state(), EntityState::Loaded);

        entity.set("email", "y@example.com").unwrap();
        assert_eq!(entity.state(), EntityState::Dirty);
        assert!(matches!(entity.set("id", 5), Err(MetadataError::ReadOnlyField(_))));
    }

    #[test]
    fn meta_deserializes_with_soft_delete_wire_shape() {
        let meta: EntityMeta = serde_json::from_str(
            r#"{
                "entity": "account",
                "table": "accounts",
                "fields": [
                    {"name": "id", "column": "id", "type": "integer", "primary_key": true, "generated": true},
                    {"name": "status", "column": "status", "type": "string"}
                ],
                "soft_delete": {
                    "status_column": "status",
                    "removed_value": "removed",
                    "removed_at_column": "removed_at"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(meta.primary_column(), "id");
        assert_eq!(
            meta.soft_delete(),
            Some(&SoftDeleteDescriptor::new("status", "removed", "removed_at"))
        );
    }

    #[test]
    fn meta_deserialization_runs_validation() {
        let result: Result<EntityMeta, _> = serde_json::from_str(
            r#"{"entity": "x", "table": "xs", "fields": [{"name": "a", "column": "a", "type": "string"}]}"#,
        );
        let err = result.unwrap_err();
        assert!(err.to_string().contains("declares no primary key"));
    }
}
