//! Entity metadata and in-memory entity instances.
//!
//! # Responsibility
//! - Describe how logical fields map onto physical columns.
//! - Hold caller-owned entity values and their lifecycle state.
//!
//! # Invariants
//! - Exactly one field declares the primary key, with a non-empty column.
//! - Table and column names are plain SQL identifiers.
//! - Metadata is validated once and shared immutably.

use crate::adapter::SqlValue;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod entity;
pub mod field;

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Malformed metadata or an entity value that violates it.
///
/// Always fatal; never retried.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataError {
    DuplicateField(String),
    MissingPrimaryKey { entity: String },
    MultiplePrimaryKeys { entity: String },
    EmptyPrimaryColumn { entity: String },
    InvalidIdentifier(String),
    MissingColumn(String),
    MissingSelectExpression(String),
    UnknownField(String),
    ReadOnlyField(String),
    NullNotAllowed(String),
    TooLong { field: String, max_length: usize },
    InvalidValue { field: String, value: SqlValue },
    /// The store reported a successful insert but produced a zero key.
    ZeroPrimaryKey { entity: String },
    /// Load/store/remove without a primary-key value to filter on.
    MissingPrimaryKeyValue { entity: String },
}

impl Display for MetadataError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateField(name) => write!(f, "field `{name}` is declared twice"),
            Self::MissingPrimaryKey { entity } => {
                write!(f, "entity `{entity}` declares no primary key")
            }
            Self::MultiplePrimaryKeys { entity } => {
                write!(f, "entity `{entity}` declares more than one primary key")
            }
            Self::EmptyPrimaryColumn { entity } => {
                write!(f, "primary key of `{entity}` has no column name")
            }
            Self::InvalidIdentifier(name) => write!(f, "invalid SQL identifier `{name}`"),
            Self::MissingColumn(name) => write!(f, "persisted field `{name}` has no column"),
            Self::MissingSelectExpression(name) => {
                write!(f, "computed field `{name}` has neither column nor select expression")
            }
            Self::UnknownField(name) => write!(f, "unknown field `{name}`"),
            Self::ReadOnlyField(name) => write!(f, "field `{name}` is read-only"),
            Self::NullNotAllowed(name) => write!(f, "field `{name}` is not nullable"),
            Self::TooLong { field, max_length } => {
                write!(f, "field `{field}` exceeds {max_length} characters")
            }
            Self::InvalidValue { field, value } => {
                write!(f, "value {value:?} is not valid for field `{field}`")
            }
            Self::ZeroPrimaryKey { entity } => {
                write!(f, "insert into `{entity}` produced a zero primary key")
            }
            Self::MissingPrimaryKeyValue { entity } => {
                write!(f, "entity `{entity}` has no primary key value")
            }
        }
    }
}

impl Error for MetadataError {}
