//! Physical handle bootstrap.
//!
//! # Responsibility
//! - Open file or in-memory SQLite handles from a [`ConnectionConfig`].
//! - Apply connection pragmas and the optional init batch.
//!
//! # Invariants
//! - A returned handle has its busy timeout and `foreign_keys` pragma applied.
//! - A handle whose bootstrap fails is dropped, never returned.

use super::{ConnectionConfig, DbResult, StorageTarget};
use log::{error, info};
use std::time::Instant;
use uuid::Uuid;

/// Opens the physical handle described by `config`.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub(super) fn open_handle(config: &ConnectionConfig, conn_id: Uuid) -> DbResult<rusqlite::Connection> {
    let started_at = Instant::now();
    let mode = config.mode();
    info!(
        "event=db_open module=db status=start provider={} mode={mode} conn_id={conn_id}",
        config.provider
    );

    let opened = match &config.target {
        StorageTarget::Memory => rusqlite::Connection::open_in_memory(),
        StorageTarget::File { path } => rusqlite::Connection::open(path),
    };
    let handle = match opened {
        Ok(handle) => handle,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} conn_id={conn_id} duration_ms={} error_code=db_open_failed error={err}",
                started_at.elapsed().as_millis()
            );
            return Err(err.into());
        }
    };

    if let Err(err) = bootstrap_handle(&handle, config) {
        error!(
            "event=db_open module=db status=error mode={mode} conn_id={conn_id} duration_ms={} error_code=db_bootstrap_failed error={err}",
            started_at.elapsed().as_millis()
        );
        return Err(err);
    }

    info!(
        "event=db_open module=db status=ok mode={mode} conn_id={conn_id} duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(handle)
}

fn bootstrap_handle(handle: &rusqlite::Connection, config: &ConnectionConfig) -> DbResult<()> {
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };
    handle.execute_batch(&format!("PRAGMA foreign_keys = {foreign_keys};"))?;
    handle.busy_timeout(config.busy_timeout())?;
    if let Some(sql) = config.init_sql.as_deref() {
        handle.execute_batch(sql)?;
    }
    Ok(())
}
