//! Query adapter contract: escaping, fragment building and execution.
//!
//! # Responsibility
//! - Turn values, assignment lists and condition lists into SQL text.
//! - Execute statements on one open connection and shape their results.
//!
//! # Invariants
//! - Every statement is a synchronous round-trip, executed in issue order.
//! - Driver errors surface as [`DbError::Statement`] with the SQL attached.

pub mod fragment;
pub mod value;

pub use value::{Row, SqlValue};

use crate::db::{DbError, DbResult, Provider};

/// One column as reported by the backend's schema introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub declared_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// Provider-specific query adapter over a single connection.
///
/// Implementors supply escaping and the execution primitives; fragment
/// building, binding and the fetch variants are derived from them.
pub trait QueryAdapter {
    fn provider(&self) -> Provider;

    /// Quoted string literal; `like` also escapes pattern wildcards.
    fn escape(&self, value: &str, like: bool) -> String;

    /// Executes one statement and returns the number of affected rows.
    fn exec_query(&self, sql: &str) -> DbResult<u64>;

    /// Executes one query and returns every row.
    fn fetch_all(&self, sql: &str) -> DbResult<Vec<Row>>;

    /// Rows changed by the most recent data-changing statement.
    fn affected_rows(&self) -> DbResult<u64>;

    /// Row id generated by the most recent successful insert.
    fn last_inserted_id(&self) -> DbResult<i64>;

    fn table_structure(&self, table: &str) -> DbResult<Vec<ColumnInfo>>;

    /// Literal form of one value: empty values become `''`, booleans `1`/`0`,
    /// numbers stay unquoted, lists are comma-joined.
    fn escape_value(&self, value: &SqlValue) -> String {
        fragment::escape_value_with(value, &|text| self.escape(text, false))
    }

    /// Substitutes each `?` with the escaped form of the next value.
    fn bind(&self, expression: &str, values: &SqlValue) -> DbResult<String> {
        fragment::bind_with(expression, values, |value| self.escape_value(value))
    }

    /// `col = val, ...`; with `escape == false` values are written raw and
    /// `false` collapses to an empty right-hand side.
    fn set_expr(&self, assignments: &[(String, SqlValue)], escape: bool) -> String {
        if escape {
            fragment::set_expr_with(assignments, |value| self.escape_value(value))
        } else {
            fragment::set_expr_with(assignments, SqlValue::raw_text)
        }
    }

    fn where_expr(&self, conditions: &[SqlValue]) -> String {
        fragment::where_expr(conditions)
    }

    fn fetch_row(&self, sql: &str) -> DbResult<Option<Row>> {
        Ok(self.fetch_all(sql)?.into_iter().next())
    }

    /// First column of every row.
    fn fetch_col(&self, sql: &str) -> DbResult<Vec<SqlValue>> {
        self.fetch_all(sql)?
            .into_iter()
            .map(|row| {
                row.into_values()
                    .into_iter()
                    .next()
                    .ok_or_else(|| DbError::ResultShape("query returned no columns".to_string()))
            })
            .collect()
    }

    /// First two columns of every row as key/value pairs.
    fn fetch_pairs(&self, sql: &str) -> DbResult<Vec<(SqlValue, SqlValue)>> {
        self.fetch_all(sql)?
            .into_iter()
            .map(|row| {
                let mut values = row.into_values().into_iter();
                match (values.next(), values.next()) {
                    (Some(key), Some(value)) => Ok((key, value)),
                    _ => Err(DbError::ResultShape(
                        "pairs require at least two columns".to_string(),
                    )),
                }
            })
            .collect()
    }

    /// First column of the first row, if any.
    fn fetch_one(&self, sql: &str) -> DbResult<Option<SqlValue>> {
        Ok(self
            .fetch_row(sql)?
            .and_then(|row| row.into_values().into_iter().next()))
    }

    fn insert(&self, table: &str, assignments: &[(String, SqlValue)]) -> DbResult<u64> {
        let columns = assignments
            .iter()
            .map(|(column, _)| column.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let values = assignments
            .iter()
            .map(|(_, value)| self.escape_value(value))
            .collect::<Vec<_>>()
            .join(", ");
        self.exec_query(&format!("INSERT INTO {table} ({columns}) VALUES ({values})"))
    }

    fn update(
        &self,
        table: &str,
        assignments: &[(String, SqlValue)],
        conditions: &[SqlValue],
    ) -> DbResult<u64> {
        let mut sql = format!("UPDATE {table} SET {}", self.set_expr(assignments, true));
        push_where(&mut sql, &self.where_expr(conditions));
        self.exec_query(&sql)
    }

    fn delete(&self, table: &str, conditions: &[SqlValue]) -> DbResult<u64> {
        let mut sql = format!("DELETE FROM {table}");
        push_where(&mut sql, &self.where_expr(conditions));
        self.exec_query(&sql)
    }
}

/// Appends ` WHERE <clause>` unless the clause is empty.
pub fn push_where(sql: &mut String, clause: &str) {
    if !clause.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
}
