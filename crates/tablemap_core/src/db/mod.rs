//! Relational storage bootstrap, connection lifecycle and storage errors.
//!
//! # Responsibility
//! - Describe how a connection is configured and which provider it talks to.
//! - Own the single physical handle behind a [`Connection`].
//! - Define storage-layer errors that carry statement and provider context.
//!
//! # Invariants
//! - A connection owns zero or one open physical handle.
//! - Driver failures are never swallowed; they are wrapped with context.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod config;
mod connection;
mod open;

pub use config::{ConnectionConfig, StorageTarget};
pub use connection::{Connection, ConnectionState, TransactionHandle};

pub type DbResult<T> = Result<T, DbError>;

/// Relational backend a connection talks to.
///
/// The lowercase name is what replaces `{provider}` in storage-method
/// identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Sqlite,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
        }
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage-layer error for connection, statement and transaction failures.
#[derive(Debug)]
pub enum DbError {
    /// Driver failure outside of a specific statement (open, pragmas).
    Sqlite(rusqlite::Error),
    /// Driver-reported statement failure with the offending SQL attached.
    Statement {
        provider: Provider,
        sql: String,
        source: rusqlite::Error,
    },
    /// `begin_transaction` could not start a transaction.
    TransactionNotStarted {
        provider: Provider,
        reason: String,
        source: Option<rusqlite::Error>,
    },
    /// The operation requires no active transaction.
    TransactionActive,
    /// Commit or rollback without an active transaction.
    NoTransaction,
    /// Statement issued on a connection that is not open.
    ConnectionClosed,
    /// `bind` ran out of values for a `?` placeholder.
    MissingBindValue { placeholder: usize },
    /// Result column holds a value the adapter cannot represent.
    UnsupportedColumnType { column: String },
    /// Result shape does not fit the requested fetch variant.
    ResultShape(String),
    /// Table or column name is not a plain SQL identifier.
    InvalidIdentifier(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Statement {
                provider,
                sql,
                source,
            } => write!(f, "{provider} statement failed: {source}; statement: {sql}"),
            Self::TransactionNotStarted {
                provider, reason, ..
            } => write!(f, "{provider} transaction not started: {reason}"),
            Self::TransactionActive => write!(f, "a transaction is still active"),
            Self::NoTransaction => write!(f, "no active transaction"),
            Self::ConnectionClosed => write!(f, "connection is not open"),
            Self::MissingBindValue { placeholder } => {
                write!(f, "no value to bind for placeholder #{placeholder}")
            }
            Self::UnsupportedColumnType { column } => {
                write!(f, "unsupported value type in column `{column}`")
            }
            Self::ResultShape(message) => write!(f, "unexpected result shape: {message}"),
            Self::InvalidIdentifier(name) => write!(f, "invalid SQL identifier `{name}`"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Statement { source, .. } => Some(source),
            Self::TransactionNotStarted { source, .. } => {
                source.as_ref().map(|err| err as &(dyn Error + 'static))
            }
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
