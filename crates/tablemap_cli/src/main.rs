//! CLI smoke entry point.
//!
//! # Responsibility
//! - Open a database file through `tablemap_core` and print one table's
//!   column layout.
//! - Keep output deterministic for quick local sanity checks.

use std::process::ExitCode;
use tablemap_core::{Connection, ConnectionConfig, EntityManager, QueryAdapter};

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [db_path, table] = args.as_slice() else {
        println!("tablemap_core version={}", tablemap_core::core_version());
        eprintln!("usage: tablemap_cli <db-path> <table>");
        return ExitCode::from(2);
    };

    match describe(db_path, table) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn describe(db_path: &str, table: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut manager = EntityManager::new(Connection::new(ConnectionConfig::file(db_path)));
    let connection = manager.connection()?;
    for column in connection.table_structure(table)? {
        println!(
            "{}\t{}\tnot_null={}\tpk={}\tdefault={}",
            column.name,
            column.declared_type,
            column.not_null,
            column.primary_key,
            column.default_value.as_deref().unwrap_or("-")
        );
    }
    manager.close()?;
    Ok(())
}
