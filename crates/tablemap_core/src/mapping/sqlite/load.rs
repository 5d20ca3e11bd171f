use super::row_conditions;
use crate::adapter::{push_where, QueryAdapter};
use crate::diagnostics::{emit, DiagnosticEvent, SharedSink};
use crate::mapping::{MappingResult, MethodParams, StatementInputs, StorageMethod};
use crate::model::entity::Entity;
use crate::model::MetadataResult;
use std::sync::Arc;

/// Single-row `SELECT` by primary key, hiding soft-deleted rows.
pub struct SqliteLoad {
    sink: Option<SharedSink>,
}

impl SqliteLoad {
    pub fn new(sink: Option<SharedSink>) -> Self {
        Self { sink }
    }
}

impl StorageMethod for SqliteLoad {
    fn execute(
        &self,
        adapter: &dyn QueryAdapter,
        entity: &mut Entity,
        params: &MethodParams,
    ) -> MappingResult<bool> {
        let meta = Arc::clone(entity.meta());
        let inputs = StatementInputs::new(&meta, entity)?;
        let key = inputs.key(params)?;
        let key_name = meta.primary_key().name.as_str();

        let selected: Vec<_> = meta
            .fields()
            .iter()
            .filter(|field| field.name == key_name || params.includes(&field.name))
            .filter_map(|field| field.select_item().map(|item| (field, item)))
            .collect();
        let select_list = selected
            .iter()
            .map(|(_, item)| item.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let conditions = row_conditions(adapter, inputs.primary_column, &key, inputs.soft_delete);
        let mut sql = format!("SELECT {select_list} FROM {}", inputs.table);
        push_where(&mut sql, &adapter.where_expr(&conditions));
        sql.push_str(" LIMIT 1");

        let Some(row) = adapter.fetch_row(&sql)? else {
            emit(
                self.sink.as_ref(),
                DiagnosticEvent::debug(
                    "load_not_found",
                    adapter.provider().as_str(),
                    format!("{} {}", meta.entity(), key.raw_text()),
                ),
            );
            return Ok(false);
        };

        let values = selected
            .iter()
            .map(|(field, _)| {
                let stored = row.get(&field.name).cloned().unwrap_or_default();
                Ok((field.name.clone(), field.from_storage(stored)?))
            })
            .collect::<MetadataResult<Vec<_>>>()?;
        entity.mark_loaded(values);
        Ok(true)
    }
}
