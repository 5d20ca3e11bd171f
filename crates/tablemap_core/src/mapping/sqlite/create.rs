use crate::adapter::{QueryAdapter, SqlValue};
use crate::diagnostics::{emit, DiagnosticEvent, SharedSink};
use crate::mapping::{MappingResult, MethodParams, StatementInputs, StorageMethod};
use crate::model::entity::Entity;
use crate::model::MetadataError;
use log::debug;
use std::sync::Arc;

/// `INSERT` of the entity's writable, non-null persisted fields.
pub struct SqliteCreate {
    sink: Option<SharedSink>,
}

impl SqliteCreate {
    pub fn new(sink: Option<SharedSink>) -> Self {
        Self { sink }
    }
}

impl StorageMethod for SqliteCreate {
    fn execute(
        &self,
        adapter: &dyn QueryAdapter,
        entity: &mut Entity,
        _params: &MethodParams,
    ) -> MappingResult<bool> {
        let meta = Arc::clone(entity.meta());
        let inputs = StatementInputs::new(&meta, entity)?;
        let key_field = meta.primary_key();

        let supplied_key = if key_field.generated {
            None
        } else {
            let key = inputs
                .field(&key_field.name)
                .map(|field| field.value.clone())
                .filter(|value| !value.is_empty())
                .ok_or_else(|| MetadataError::MissingPrimaryKeyValue {
                    entity: meta.entity().to_string(),
                })?;
            reject_zero_key(&key, meta.entity())?;
            Some(key)
        };

        // Null columns are left to their storage defaults.
        let assignments: Vec<(String, SqlValue)> = inputs
            .fields
            .iter()
            .filter(|field| field.descriptor.is_writable() && !field.value.is_null())
            .map(|field| (field.column().to_string(), field.value.clone()))
            .collect();

        let affected = if assignments.is_empty() {
            adapter.exec_query(&format!("INSERT INTO {} DEFAULT VALUES", inputs.table))?
        } else {
            adapter.insert(inputs.table, &assignments)?
        };

        if affected == 0 {
            emit(
                self.sink.as_ref(),
                DiagnosticEvent::warning(
                    "create_no_rows",
                    adapter.provider().as_str(),
                    format!("insert into {} affected no rows", inputs.table),
                ),
            );
            return Ok(false);
        }

        let key = match supplied_key {
            Some(key) => key,
            None => {
                let key = SqlValue::Int(adapter.last_inserted_id()?);
                reject_zero_key(&key, meta.entity())?;
                key
            }
        };

        debug!(
            "event=entity_create module=mapping status=ok entity={} key={}",
            meta.entity(),
            key.raw_text()
        );
        entity.mark_created(key_field.from_storage(key)?);
        Ok(true)
    }
}

fn reject_zero_key(key: &SqlValue, entity: &str) -> Result<(), MetadataError> {
    if key.as_i64() == Some(0) {
        return Err(MetadataError::ZeroPrimaryKey {
            entity: entity.to_string(),
        });
    }
    Ok(())
}
