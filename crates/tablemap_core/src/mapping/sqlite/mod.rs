//! SQLite statement text for the four storage methods.
//!
//! # Invariants
//! - Every statement filtering by primary key renders `(<pk> = <value>)`.
//! - With soft delete, load and store add `(<status> IS NOT <marker>)`.
//! - `Null` in assignments renders as `NULL`, not as an empty literal.

mod create;
mod load;
mod remove;
mod store;

pub use create::SqliteCreate;
pub use load::SqliteLoad;
pub use remove::SqliteRemove;
pub use store::SqliteStore;

use crate::adapter::{QueryAdapter, SqlValue};
use crate::model::entity::SoftDeleteDescriptor;
use crate::model::field::FieldType;

/// `(<column> = <key>)` condition.
fn key_condition(adapter: &dyn QueryAdapter, column: &str, key: &SqlValue) -> SqlValue {
    SqlValue::Text(format!("{column} = {}", adapter.escape_value(key)))
}

/// Condition hiding rows whose status equals the removal marker.
///
/// `IS NOT` keeps rows whose status is `NULL`.
fn removal_exclusion(adapter: &dyn QueryAdapter, soft_delete: &SoftDeleteDescriptor) -> SqlValue {
    SqlValue::Text(format!(
        "{} IS NOT {}",
        soft_delete.status_column,
        adapter.escape_value(&soft_delete.removed_value)
    ))
}

/// Primary-key condition plus the removal exclusion when configured.
fn row_conditions(
    adapter: &dyn QueryAdapter,
    primary_column: &str,
    key: &SqlValue,
    soft_delete: Option<&SoftDeleteDescriptor>,
) -> Vec<SqlValue> {
    let mut conditions = vec![key_condition(adapter, primary_column, key)];
    if let Some(soft_delete) = soft_delete {
        conditions.push(removal_exclusion(adapter, soft_delete));
    }
    conditions
}

/// `col = val, ...` with `Null` kept as SQL `NULL`.
fn assignment_list(adapter: &dyn QueryAdapter, assignments: &[(String, SqlValue)]) -> String {
    assignments
        .iter()
        .map(|(column, value)| match value {
            SqlValue::Null => format!("{column} = NULL"),
            other => format!("{column} = {}", adapter.escape_value(other)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Current-time expression matching the removal timestamp column type.
fn now_expression(column_type: Option<FieldType>) -> &'static str {
    match column_type {
        Some(FieldType::Timestamp | FieldType::Integer) => "CAST(strftime('%s', 'now') AS INTEGER)",
        _ => "CURRENT_TIMESTAMP",
    }
}

#[cfg(test)]
mod tests {
    use super::{assignment_list, now_expression, row_conditions};
    use crate::adapter::{QueryAdapter, SqlValue};
    use crate::db::{Connection, ConnectionConfig};
    use crate::model::entity::SoftDeleteDescriptor;
    use crate::model::field::FieldType;

    #[test]
    fn row_conditions_add_exclusion_only_with_soft_delete() {
        let conn = Connection::new(ConnectionConfig::memory());
        let key = SqlValue::Int(7);
        let hard = row_conditions(&conn, "id", &key, None);
        assert_eq!(conn.where_expr(&hard), "(id = 7)");

        let soft_delete = SoftDeleteDescriptor::new("status", "removed", "removed_at");
        let soft = row_conditions(&conn, "id", &key, Some(&soft_delete));
        assert_eq!(
            conn.where_expr(&soft),
            "(id = 7) AND (status IS NOT 'removed')"
        );
    }

    #[test]
    fn assignment_list_keeps_null() {
        let conn = Connection::new(ConnectionConfig::memory());
        let assignments = vec![
            ("name".to_string(), SqlValue::from("it's")),
            ("note".to_string(), SqlValue::Null),
        ];
        assert_eq!(
            assignment_list(&conn, &assignments),
            "name = 'it''s', note = NULL"
        );
    }

    #[test]
    fn now_expression_follows_column_type() {
        assert_eq!(
            now_expression(Some(FieldType::Timestamp)),
            "CAST(strftime('%s', 'now') AS INTEGER)"
        );
        assert_eq!(now_expression(Some(FieldType::DateTime)), "CURRENT_TIMESTAMP");
        assert_eq!(now_expression(None), "CURRENT_TIMESTAMP");
    }
}
