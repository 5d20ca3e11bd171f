//! Connection lifecycle and the SQLite query adapter.
//!
//! # Responsibility
//! - Hold the single physical handle of one manager and open it lazily.
//! - Implement [`QueryAdapter`] for SQLite.
//! - Expose begin/commit/rollback and act as the transaction handle.
//!
//! # Invariants
//! - State moves `Closed -> Open -> InTransaction -> Open -> Closed` only.
//! - Closing with an active transaction is refused.
//! - Statement failures carry the statement text and the provider name.

use super::open::open_handle;
use super::{ConnectionConfig, DbError, DbResult, Provider};
use crate::adapter::fragment::{escape_sqlite, is_sql_identifier};
use crate::adapter::{ColumnInfo, QueryAdapter, Row, SqlValue};
use crate::diagnostics::{emit, DiagnosticEvent, SharedSink};
use log::{debug, error, info, warn};
use rusqlite::types::ValueRef;
use uuid::Uuid;

/// Observable lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
    InTransaction,
}

/// Handle returned when a transaction is started.
pub trait TransactionHandle {
    fn commit(&mut self) -> DbResult<()>;
    fn rollback(&mut self) -> DbResult<()>;
    fn in_transaction(&self) -> bool;
}

/// One configured connection owning at most one physical SQLite handle.
pub struct Connection {
    id: Uuid,
    config: ConnectionConfig,
    handle: Option<rusqlite::Connection>,
    in_transaction: bool,
    sink: Option<SharedSink>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Creates a configured connection; nothing is opened yet.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            handle: None,
            in_transaction: false,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn sink(&self) -> Option<&SharedSink> {
        self.sink.as_ref()
    }

    pub fn state(&self) -> ConnectionState {
        match &self.handle {
            None => ConnectionState::Closed,
            Some(_) if self.driver_in_transaction() => ConnectionState::InTransaction,
            Some(_) => ConnectionState::Open,
        }
    }

    /// Whether the driver holds an open transaction, however it was begun.
    fn driver_in_transaction(&self) -> bool {
        self.in_transaction || self.handle.as_ref().is_some_and(|handle| !handle.is_autocommit())
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Opens the physical handle unless it is already open.
    pub fn open(&mut self) -> DbResult<()> {
        if self.handle.is_none() {
            self.handle = Some(open_handle(&self.config, self.id)?);
        }
        Ok(())
    }

    /// Closes the physical handle. Closing a closed connection is a no-op.
    pub fn close(&mut self) -> DbResult<()> {
        self.sync_transaction_flag();
        if self.in_transaction {
            return Err(DbError::TransactionActive);
        }
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        match handle.close() {
            Ok(()) => {
                info!(
                    "event=db_close module=db status=ok conn_id={}",
                    self.id
                );
                Ok(())
            }
            Err((handle, err)) => {
                error!(
                    "event=db_close module=db status=error conn_id={} error={err}",
                    self.id
                );
                self.handle = Some(handle);
                Err(err.into())
            }
        }
    }

    /// Starts a transaction on the open handle.
    ///
    /// # Errors
    /// - [`DbError::TransactionNotStarted`] when the connection is closed, a
    ///   transaction is already active, or the driver rejects `BEGIN`.
    pub fn begin_transaction(&mut self) -> DbResult<()> {
        let provider = self.provider();
        let Some(handle) = self.handle.as_ref() else {
            return Err(DbError::TransactionNotStarted {
                provider,
                reason: "connection is not open".to_string(),
                source: None,
            });
        };
        self.in_transaction = !handle.is_autocommit();
        if self.in_transaction {
            return Err(DbError::TransactionNotStarted {
                provider,
                reason: "a transaction is already active".to_string(),
                source: None,
            });
        }

        if let Err(err) = handle.execute_batch("BEGIN") {
            warn!(
                "event=db_transaction module=db status=error action=begin conn_id={} error={err}",
                self.id
            );
            emit(
                self.sink.as_ref(),
                DiagnosticEvent::warning("transaction_not_started", provider.as_str(), err.to_string()),
            );
            return Err(DbError::TransactionNotStarted {
                provider,
                reason: err.to_string(),
                source: Some(err),
            });
        }

        self.in_transaction = true;
        debug!(
            "event=db_transaction module=db status=ok action=begin conn_id={}",
            self.id
        );
        Ok(())
    }

    fn finish_transaction(&mut self, sql: &'static str) -> DbResult<()> {
        self.sync_transaction_flag();
        if !self.in_transaction {
            return Err(DbError::NoTransaction);
        }
        let handle = self.handle.as_ref().ok_or(DbError::ConnectionClosed)?;
        let outcome = handle.execute_batch(sql);
        self.in_transaction = !handle.is_autocommit();
        match outcome {
            Ok(()) => {
                debug!(
                    "event=db_transaction module=db status=ok action={} conn_id={}",
                    sql.to_ascii_lowercase(),
                    self.id
                );
                Ok(())
            }
            Err(err) => Err(self.statement_error(sql, err)),
        }
    }

    /// Adopts the driver's view of the transaction, covering a `BEGIN`
    /// issued through `exec_query`.
    fn sync_transaction_flag(&mut self) {
        if let Some(handle) = self.handle.as_ref() {
            self.in_transaction = !handle.is_autocommit();
        }
    }

    fn handle(&self) -> DbResult<&rusqlite::Connection> {
        self.handle.as_ref().ok_or(DbError::ConnectionClosed)
    }

    fn statement_error(&self, sql: &str, err: rusqlite::Error) -> DbError {
        warn!(
            "event=db_statement module=db status=error conn_id={} error={err} sql={sql}",
            self.id
        );
        emit(
            self.sink.as_ref(),
            DiagnosticEvent::warning(
                "statement_failed",
                self.provider().as_str(),
                format!("{err}; statement: {sql}"),
            ),
        );
        DbError::Statement {
            provider: self.provider(),
            sql: sql.to_string(),
            source: err,
        }
    }

    fn query_rows(&self, sql: &str, limit: Option<usize>) -> DbResult<Vec<Row>> {
        debug!(
            "event=db_statement module=db status=start conn_id={} sql={sql}",
            self.id
        );
        let handle = self.handle()?;
        let fail = |err: rusqlite::Error| self.statement_error(sql, err);

        let mut stmt = handle.prepare(sql).map_err(&fail)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = stmt.query([]).map_err(&fail)?;

        let mut fetched = Vec::new();
        while let Some(row) = rows.next().map_err(&fail)? {
            let mut values = Vec::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                let value = row.get_ref(index).map_err(&fail)?;
                values.push(value_from_sql(value, column)?);
            }
            fetched.push(Row::new(columns.clone(), values));
            if limit.is_some_and(|limit| fetched.len() >= limit) {
                break;
            }
        }
        Ok(fetched)
    }
}

impl QueryAdapter for Connection {
    fn provider(&self) -> Provider {
        self.config.provider
    }

    fn escape(&self, value: &str, like: bool) -> String {
        match self.config.provider {
            Provider::Sqlite => escape_sqlite(value, like),
        }
    }

    fn exec_query(&self, sql: &str) -> DbResult<u64> {
        debug!(
            "event=db_statement module=db status=start conn_id={} sql={sql}",
            self.id
        );
        let handle = self.handle()?;
        let changed = handle
            .execute(sql, [])
            .map_err(|err| self.statement_error(sql, err))?;
        Ok(changed as u64)
    }

    fn fetch_all(&self, sql: &str) -> DbResult<Vec<Row>> {
        self.query_rows(sql, None)
    }

    fn fetch_row(&self, sql: &str) -> DbResult<Option<Row>> {
        Ok(self.query_rows(sql, Some(1))?.into_iter().next())
    }

    fn affected_rows(&self) -> DbResult<u64> {
        Ok(self.handle()?.changes() as u64)
    }

    fn last_inserted_id(&self) -> DbResult<i64> {
        Ok(self.handle()?.last_insert_rowid())
    }

    fn table_structure(&self, table: &str) -> DbResult<Vec<ColumnInfo>> {
        if !is_sql_identifier(table) {
            return Err(DbError::InvalidIdentifier(table.to_string()));
        }
        let rows = self.fetch_all(&format!("PRAGMA table_info({table})"))?;
        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: text_column(row, "name").unwrap_or_default(),
                declared_type: text_column(row, "type").unwrap_or_default(),
                not_null: int_column(row, "notnull") != 0,
                default_value: text_column(row, "dflt_value"),
                primary_key: int_column(row, "pk") != 0,
            })
            .collect())
    }
}

impl TransactionHandle for Connection {
    fn commit(&mut self) -> DbResult<()> {
        self.finish_transaction("COMMIT")
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.finish_transaction("ROLLBACK")
    }

    fn in_transaction(&self) -> bool {
        self.driver_in_transaction()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.driver_in_transaction() {
            // The driver rolls the open transaction back when the handle drops.
            warn!(
                "event=db_close module=db status=error conn_id={} error_code=transaction_left_open",
                self.id
            );
        }
    }
}

fn value_from_sql(value: ValueRef<'_>, column: &str) -> DbResult<SqlValue> {
    match value {
        ValueRef::Null => Ok(SqlValue::Null),
        ValueRef::Integer(number) => Ok(SqlValue::Int(number)),
        ValueRef::Real(number) => Ok(SqlValue::Float(number)),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .map(|text| SqlValue::Text(text.to_string()))
            .map_err(|_| DbError::UnsupportedColumnType {
                column: column.to_string(),
            }),
        ValueRef::Blob(_) => Err(DbError::UnsupportedColumnType {
            column: column.to_string(),
        }),
    }
}

fn text_column(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        SqlValue::Null => None,
        other => Some(other.raw_text()),
    }
}

fn int_column(row: &Row, column: &str) -> i64 {
    row.get(column).and_then(SqlValue::as_i64).unwrap_or(0)
}
