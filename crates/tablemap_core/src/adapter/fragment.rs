//! SQL fragment builders shared by every provider.
//!
//! # Invariants
//! - Building never fails, except `bind_with` running out of values.
//! - Escaping of string literals is delegated to the provider.

use super::value::SqlValue;
use crate::db::{DbError, DbResult};
use once_cell::sync::Lazy;
use regex::Regex;

/// Positional placeholder recognized by [`bind_with`].
pub const PLACEHOLDER: char = '?';

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern must compile")
});

/// Whether `name` can be spliced into SQL unquoted as a table or column name.
pub fn is_sql_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// SQLite string literal: wrapped in single quotes, inner quotes doubled.
///
/// With `like`, `%`, `_` and `\` are prefixed with `\`; the surrounding
/// `LIKE` must declare `ESCAPE '\'`.
pub fn escape_sqlite(value: &str, like: bool) -> String {
    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('\'');
    for ch in value.chars() {
        match ch {
            '\'' => escaped.push_str("''"),
            '%' | '_' | '\\' if like => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped.push('\'');
    escaped
}

/// Renders one value as a literal, using `escape` for non-empty strings.
pub fn escape_value_with(value: &SqlValue, escape: &dyn Fn(&str) -> String) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    match value {
        SqlValue::Bool(true) => "1".to_string(),
        SqlValue::Bool(false) => "0".to_string(),
        SqlValue::Int(number) => number.to_string(),
        SqlValue::Float(number) if number.is_finite() => number.to_string(),
        SqlValue::Float(_) => "NULL".to_string(),
        SqlValue::Text(text) => escape(text),
        SqlValue::List(items) => items
            .iter()
            .map(|item| escape_value_with(item, escape))
            .collect::<Vec<_>>()
            .join(", "),
        SqlValue::Null => "''".to_string(),
    }
}

/// Replaces each `?` in `expression` with the rendering of the next value.
///
/// A `List` is consumed element by element; any other value binds once.
/// Values left over after the last placeholder are ignored.
pub fn bind_with(
    expression: &str,
    values: &SqlValue,
    render: impl Fn(&SqlValue) -> String,
) -> DbResult<String> {
    let values: &[SqlValue] = match values {
        SqlValue::List(items) => items.as_slice(),
        single => std::slice::from_ref(single),
    };

    let mut remaining = values.iter();
    let mut bound = String::with_capacity(expression.len());
    let mut placeholder = 0;
    for ch in expression.chars() {
        if ch != PLACEHOLDER {
            bound.push(ch);
            continue;
        }
        placeholder += 1;
        let value = remaining
            .next()
            .ok_or(DbError::MissingBindValue { placeholder })?;
        bound.push_str(&render(value));
    }
    Ok(bound)
}

/// Renders `col = val, col2 = val2` with `render` producing each right side.
pub fn set_expr_with<K: AsRef<str>>(
    assignments: &[(K, SqlValue)],
    render: impl Fn(&SqlValue) -> String,
) -> String {
    assignments
        .iter()
        .map(|(column, value)| format!("{} = {}", column.as_ref(), render(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parenthesizes each non-empty condition and joins them with `AND`.
///
/// `true` renders as `1`; empty strings and `Null` are skipped.
pub fn where_expr(conditions: &[SqlValue]) -> String {
    conditions
        .iter()
        .filter_map(condition_text)
        .map(|condition| format!("({condition})"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn condition_text(condition: &SqlValue) -> Option<String> {
    match condition {
        SqlValue::Bool(true) => Some("1".to_string()),
        SqlValue::Bool(false) => Some("0".to_string()),
        other if other.is_empty() => None,
        other => Some(other.raw_text()),
    }
}
