use super::{assignment_list, row_conditions};
use crate::adapter::{push_where, QueryAdapter, SqlValue};
use crate::diagnostics::{emit, DiagnosticEvent, SharedSink};
use crate::mapping::{MappingResult, MethodParams, StatementInputs, StorageMethod};
use crate::model::entity::Entity;
use crate::model::MetadataError;
use log::debug;
use std::sync::Arc;

/// `UPDATE` of changed fields by primary key.
///
/// Soft-deleted rows are excluded, so an update cannot bring them back.
/// Zero affected rows is not a failure.
pub struct SqliteStore {
    sink: Option<SharedSink>,
}

impl SqliteStore {
    pub fn new(sink: Option<SharedSink>) -> Self {
        Self { sink }
    }
}

impl StorageMethod for SqliteStore {
    fn execute(
        &self,
        adapter: &dyn QueryAdapter,
        entity: &mut Entity,
        params: &MethodParams,
    ) -> MappingResult<bool> {
        let meta = Arc::clone(entity.meta());
        let inputs = StatementInputs::new(&meta, entity)?;
        let key = inputs.key(params)?;

        let names: Vec<String> = match &params.fields {
            Some(fields) => fields.clone(),
            None => entity.changed_fields().map(str::to_string).collect(),
        };

        let mut assignments: Vec<(String, SqlValue)> = Vec::with_capacity(names.len());
        for name in &names {
            let field = inputs
                .field(name)
                .ok_or_else(|| MetadataError::UnknownField(name.clone()))?;
            if !field.descriptor.is_writable() || field.descriptor.primary_key {
                return Err(MetadataError::ReadOnlyField(name.clone()).into());
            }
            assignments.push((field.column().to_string(), field.value.clone()));
        }

        if assignments.is_empty() {
            entity.mark_stored();
            return Ok(true);
        }

        let conditions = row_conditions(adapter, inputs.primary_column, &key, inputs.soft_delete);
        let mut sql = format!(
            "UPDATE {} SET {}",
            inputs.table,
            assignment_list(adapter, &assignments)
        );
        push_where(&mut sql, &adapter.where_expr(&conditions));
        let affected = adapter.exec_query(&sql)?;
        if affected == 0 {
            emit(
                self.sink.as_ref(),
                DiagnosticEvent::debug(
                    "store_no_rows",
                    adapter.provider().as_str(),
                    format!("{} {}", meta.entity(), key.raw_text()),
                ),
            );
        }

        debug!(
            "event=entity_store module=mapping status=ok entity={} affected={affected}",
            meta.entity()
        );
        entity.mark_stored();
        Ok(true)
    }
}
