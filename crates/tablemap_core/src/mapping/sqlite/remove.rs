use super::{key_condition, now_expression};
use crate::adapter::{push_where, QueryAdapter};
use crate::diagnostics::{emit, DiagnosticEvent, SharedSink};
use crate::mapping::{MappingResult, MethodParams, StatementInputs, StorageMethod};
use crate::model::entity::Entity;
use log::debug;
use std::sync::Arc;

/// Physical `DELETE`, or a status-flag `UPDATE` when soft delete is set.
///
/// The soft path writes the marker and the removal time in one statement.
pub struct SqliteRemove {
    sink: Option<SharedSink>,
}

impl SqliteRemove {
    pub fn new(sink: Option<SharedSink>) -> Self {
        Self { sink }
    }
}

impl StorageMethod for SqliteRemove {
    fn execute(
        &self,
        adapter: &dyn QueryAdapter,
        entity: &mut Entity,
        params: &MethodParams,
    ) -> MappingResult<bool> {
        let meta = Arc::clone(entity.meta());
        let inputs = StatementInputs::new(&meta, entity)?;
        let key = inputs.key(params)?;
        let conditions = [key_condition(adapter, inputs.primary_column, &key)];

        let affected = match inputs.soft_delete {
            None => adapter.delete(inputs.table, &conditions)?,
            Some(soft_delete) => {
                let removed_at_type = meta
                    .field_by_column(&soft_delete.removed_at_column)
                    .map(|field| field.field_type);
                let mut sql = format!(
                    "UPDATE {} SET {} = {}, {} = {}",
                    inputs.table,
                    soft_delete.status_column,
                    adapter.escape_value(&soft_delete.removed_value),
                    soft_delete.removed_at_column,
                    now_expression(removed_at_type)
                );
                push_where(&mut sql, &adapter.where_expr(&conditions));
                adapter.exec_query(&sql)?
            }
        };

        if affected == 0 {
            emit(
                self.sink.as_ref(),
                DiagnosticEvent::debug(
                    "remove_no_rows",
                    adapter.provider().as_str(),
                    format!("{} {}", meta.entity(), key.raw_text()),
                ),
            );
        }
        debug!(
            "event=entity_remove module=mapping status=ok entity={} soft={} affected={affected}",
            meta.entity(),
            inputs.soft_delete.is_some()
        );
        entity.mark_removed();
        Ok(true)
    }
}
