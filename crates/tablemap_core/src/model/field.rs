//! Field descriptors and per-type value conversion.

use super::{MetadataError, MetadataResult};
use crate::adapter::SqlValue;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

const BITSET_WIDTH: i64 = 63;

/// Semantic type of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Integer,
    Boolean,
    Float,
    Time,
    Date,
    DateTime,
    Timestamp,
    String,
    Enum,
    BitSet,
    Array,
    IpAddress,
    IpAsInteger,
}

/// How a field participates in persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Stored in its own column.
    #[default]
    Persisted,
    /// Held client-side only.
    Helper,
    /// Produced by the server on read; never written.
    Computed,
    /// Composite value handled outside simple CRUD.
    Complex,
}

/// Maps one logical field onto storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub empty_to_null: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub max_length: Option<usize>,
    /// Expression selected instead of the plain column.
    #[serde(default)]
    pub select_expr: Option<String>,
    #[serde(default)]
    pub primary_key: bool,
    /// Primary key value is assigned by the store on insert.
    #[serde(default)]
    pub generated: bool,
}

impl FieldDescriptor {
    pub fn persisted(name: &str, column: &str, field_type: FieldType) -> Self {
        Self::with_kind(name, Some(column), field_type, FieldKind::Persisted)
    }

    pub fn helper(name: &str, field_type: FieldType) -> Self {
        Self::with_kind(name, None, field_type, FieldKind::Helper)
    }

    pub fn computed(name: &str, select_expr: &str, field_type: FieldType) -> Self {
        let mut field = Self::with_kind(name, None, field_type, FieldKind::Computed);
        field.select_expr = Some(select_expr.to_string());
        field.read_only = true;
        field
    }

    pub fn complex(name: &str) -> Self {
        Self::with_kind(name, None, FieldType::Array, FieldKind::Complex)
    }

    /// Marks the field as a store-generated primary key.
    pub fn generated_key(mut self) -> Self {
        self.primary_key = true;
        self.generated = true;
        self
    }

    /// Marks the field as a caller-assigned primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.generated = false;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn empty_to_null(mut self) -> Self {
        self.empty_to_null = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn select_expr(mut self, expr: &str) -> Self {
        self.select_expr = Some(expr.to_string());
        self
    }

    pub fn column(&self) -> Option<&str> {
        self.column.as_deref().filter(|column| !column.is_empty())
    }

    pub fn is_persisted(&self) -> bool {
        self.kind == FieldKind::Persisted
    }

    /// Persisted, not read-only and not a generated key.
    pub fn is_writable(&self) -> bool {
        self.is_persisted() && !self.read_only && !(self.primary_key && self.generated)
    }

    /// Select-list item for this field, aliased to the logical name.
    ///
    /// Returns `None` for fields that are never read from storage.
    pub fn select_item(&self) -> Option<String> {
        match self.kind {
            FieldKind::Helper | FieldKind::Complex => None,
            FieldKind::Persisted | FieldKind::Computed => {
                if let Some(expr) = self.select_expr.as_deref() {
                    return Some(format!("({expr}) AS {}", self.name));
                }
                let column = self.column()?;
                if column == self.name {
                    Some(column.to_string())
                } else {
                    Some(format!("{column} AS {}", self.name))
                }
            }
        }
    }

    /// Validates and normalizes a caller-assigned value.
    pub fn normalize(&self, value: SqlValue) -> MetadataResult<SqlValue> {
        let value = match value {
            SqlValue::Text(text) if text.is_empty() && self.empty_to_null => SqlValue::Null,
            other => other,
        };

        if value.is_null() {
            if !self.nullable && !self.primary_key {
                return Err(MetadataError::NullNotAllowed(self.name.clone()));
            }
            return Ok(value);
        }

        if let (Some(max_length), SqlValue::Text(text)) = (self.max_length, &value) {
            if text.chars().count() > max_length {
                return Err(MetadataError::TooLong {
                    field: self.name.clone(),
                    max_length,
                });
            }
        }

        self.to_storage(&value)?;
        Ok(value)
    }

    /// Converts an entity value to the form written to storage.
    pub fn to_storage(&self, value: &SqlValue) -> MetadataResult<SqlValue> {
        let converted = match (self.field_type, value) {
            (_, SqlValue::Null) => Some(SqlValue::Null),
            (FieldType::Boolean, SqlValue::Bool(flag)) => Some(SqlValue::Int(i64::from(*flag))),
            (FieldType::Boolean, SqlValue::Int(0 | 1)) => Some(value.clone()),
            (FieldType::Boolean, _) => None,
            (FieldType::Integer, SqlValue::Int(_)) => Some(value.clone()),
            (FieldType::Integer, _) => value.as_i64().map(SqlValue::Int),
            (FieldType::Float, SqlValue::Int(_) | SqlValue::Float(_)) => Some(value.clone()),
            (FieldType::Float, _) => None,
            (FieldType::IpAsInteger, SqlValue::Text(text)) => text
                .parse::<Ipv4Addr>()
                .ok()
                .map(|ip| SqlValue::Int(i64::from(u32::from(ip)))),
            (FieldType::IpAsInteger, SqlValue::Int(number)) => {
                u32::try_from(*number).ok().map(|_| value.clone())
            }
            (FieldType::IpAsInteger, _) => None,
            (FieldType::BitSet, SqlValue::List(bits)) => bits_to_mask(bits).map(SqlValue::Int),
            (FieldType::BitSet, SqlValue::Int(_)) => Some(value.clone()),
            (FieldType::BitSet, _) => None,
            (FieldType::Array, SqlValue::List(_)) => encode_array(value).map(SqlValue::Text),
            (_, SqlValue::List(_)) => None,
            (_, other) => Some(other.clone()),
        };

        converted.ok_or_else(|| MetadataError::InvalidValue {
            field: self.name.clone(),
            value: value.clone(),
        })
    }

    /// Converts a stored value back to its entity form.
    pub fn from_storage(&self, value: SqlValue) -> MetadataResult<SqlValue> {
        let converted = match (self.field_type, value) {
            (_, SqlValue::Null) => Ok(SqlValue::Null),
            (FieldType::Boolean, stored) => match stored.as_i64() {
                Some(number) => Ok(SqlValue::Bool(number != 0)),
                None => Err(stored),
            },
            (FieldType::Float, SqlValue::Int(number)) => Ok(SqlValue::Float(number as f64)),
            (FieldType::IpAsInteger, SqlValue::Int(number)) => u32::try_from(number)
                .map(|raw| SqlValue::Text(Ipv4Addr::from(raw).to_string()))
                .map_err(|_| SqlValue::Int(number)),
            (FieldType::BitSet, SqlValue::Int(mask)) => Ok(mask_to_bits(mask)),
            (FieldType::Array, SqlValue::Text(text)) => {
                match serde_json::from_str::<SqlValue>(&text) {
                    Ok(list @ SqlValue::List(_)) => Ok(list),
                    _ => Err(SqlValue::Text(text)),
                }
            }
            (_, stored) => Ok(stored),
        };

        converted.map_err(|value| MetadataError::InvalidValue {
            field: self.name.clone(),
            value,
        })
    }

    fn with_kind(name: &str, column: Option<&str>, field_type: FieldType, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            column: column.map(str::to_string),
            field_type,
            kind,
            nullable: false,
            empty_to_null: false,
            read_only: false,
            max_length: None,
            select_expr: None,
            primary_key: false,
            generated: false,
        }
    }
}

/// JSON text of a list; `None` when a float would not survive the trip.
fn encode_array(list: &SqlValue) -> Option<String> {
    if !all_floats_finite(list) {
        return None;
    }
    serde_json::to_string(list).ok()
}

fn all_floats_finite(value: &SqlValue) -> bool {
    match value {
        SqlValue::Float(number) => number.is_finite(),
        SqlValue::List(items) => items.iter().all(all_floats_finite),
        _ => true,
    }
}

fn bits_to_mask(bits: &[SqlValue]) -> Option<i64> {
    bits.iter().try_fold(0_i64, |mask, bit| {
        let position = bit.as_i64().filter(|position| (0..BITSET_WIDTH).contains(position))?;
        Some(mask | (1_i64 << position))
    })
}

fn mask_to_bits(mask: i64) -> SqlValue {
    SqlValue::List(
        (0..BITSET_WIDTH)
            .filter(|position| mask & (1_i64 << *position) != 0)
            .map(SqlValue::Int)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::{FieldDescriptor, FieldType};
    use crate::adapter::SqlValue;
    use crate::model::MetadataError;

    #[test]
    fn select_item_aliases_columns_and_expressions() {
        let plain = FieldDescriptor::persisted("title", "title", FieldType::String);
        assert_eq!(plain.select_item().as_deref(), Some("title"));

        let renamed = FieldDescriptor::persisted("title", "doc_title", FieldType::String);
        assert_eq!(renamed.select_item().as_deref(), Some("doc_title AS title"));

        let computed = FieldDescriptor::computed("words", "length(body)", FieldType::Integer);
        assert_eq!(
            computed.select_item().as_deref(),
            Some("(length(body)) AS words")
        );

        assert_eq!(FieldDescriptor::helper("tmp", FieldType::String).select_item(), None);
    }

    #[test]
    fn normalize_applies_empty_to_null_and_length_bound() {
        let field = FieldDescriptor::persisted("nick", "nick", FieldType::String)
            .nullable()
            .empty_to_null()
            .max_length(3);
        assert_eq!(field.normalize(SqlValue::from("")).unwrap(), SqlValue::Null);
        assert!(matches!(
            field.normalize(SqlValue::from("abcd")),
            Err(MetadataError::TooLong { max_length: 3, .. })
        ));

        let required = FieldDescriptor::persisted("name", "name", FieldType::String);
        assert!(matches!(
            required.normalize(SqlValue::Null),
            Err(MetadataError::NullNotAllowed(_))
        ));
    }

    #[test]
    fn integer_rejects_floats_beyond_i64() {
        let field = FieldDescriptor::persisted("size", "size", FieldType::Integer);
        assert_eq!(
            field.to_storage(&SqlValue::Float(12.0)).unwrap(),
            SqlValue::Int(12)
        );
        assert!(matches!(
            field.normalize(SqlValue::Float(1e20)),
            Err(MetadataError::InvalidValue { .. })
        ));
    }

    #[test]
    fn boolean_round_trips_through_integer() {
        let field = FieldDescriptor::persisted("active", "active", FieldType::Boolean);
        let stored = field.to_storage(&SqlValue::Bool(true)).unwrap();
        assert_eq!(stored, SqlValue::Int(1));
        assert_eq!(field.from_storage(stored).unwrap(), SqlValue::Bool(true));
    }

    #[test]
    fn ip_as_integer_converts_dotted_quads() {
        let field = FieldDescriptor::persisted("ip", "ip", FieldType::IpAsInteger);
        let stored = field.to_storage(&SqlValue::from("10.0.0.1")).unwrap();
        assert_eq!(stored, SqlValue::Int(167_772_161));
        assert_eq!(
            field.from_storage(stored).unwrap(),
            SqlValue::from("10.0.0.1")
        );
        assert!(field.to_storage(&SqlValue::from("not-an-ip")).is_err());
    }

    #[test]
    fn bitset_packs_positions_into_mask() {
        let field = FieldDescriptor::persisted("flags", "flags", FieldType::BitSet);
        let stored = field
            .to_storage(&SqlValue::List(vec![SqlValue::Int(0), SqlValue::Int(3)]))
            .unwrap();
        assert_eq!(stored, SqlValue::Int(9));
        assert_eq!(
            field.from_storage(stored).unwrap(),
            SqlValue::List(vec![SqlValue::Int(0), SqlValue::Int(3)])
        );
    }

    #[test]
    fn array_is_stored_as_json_and_keeps_item_types() {
        let field = FieldDescriptor::persisted("tags", "tags", FieldType::Array);
        let list = SqlValue::List(vec![
            SqlValue::from("a,b"),
            SqlValue::Int(7),
            SqlValue::Float(2.0),
            SqlValue::Bool(false),
            SqlValue::from(""),
            SqlValue::List(vec![SqlValue::Null]),
        ]);
        let stored = field.to_storage(&list).unwrap();
        assert_eq!(stored, SqlValue::from(r#"["a,b",7,2.0,false,"",[null]]"#));
        assert_eq!(field.from_storage(stored).unwrap(), list);
    }

    #[test]
    fn array_rejects_non_finite_items_and_foreign_text() {
        let field = FieldDescriptor::persisted("tags", "tags", FieldType::Array);
        assert!(matches!(
            field.to_storage(&SqlValue::List(vec![SqlValue::Float(f64::NAN)])),
            Err(MetadataError::InvalidValue { .. })
        ));
        assert!(matches!(
            field.from_storage(SqlValue::from("a,b")),
            Err(MetadataError::InvalidValue { .. })
        ));
        assert!(matches!(
            field.from_storage(SqlValue::from("5")),
            Err(MetadataError::InvalidValue { .. })
        ));
    }

    #[test]
    fn descriptor_deserializes_with_defaults() {
        let field: FieldDescriptor = serde_json::from_str(
            r#"{"name": "id", "column": "id", "type": "integer", "primary_key": true, "generated": true}"#,
        )
        .unwrap();
        assert_eq!(field, FieldDescriptor::persisted("id", "id", FieldType::Integer).generated_key());
    }
}
