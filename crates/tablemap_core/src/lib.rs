//! Table-mapped entity persistence over SQLite.
//! Query adapter, storage-method dispatch and an entity manager with
//! transactions and soft delete.

pub mod adapter;
pub mod db;
pub mod diagnostics;
pub mod logging;
pub mod manager;
pub mod mapping;
pub mod model;

pub use adapter::{ColumnInfo, QueryAdapter, Row, SqlValue};
pub use db::{
    Connection, ConnectionConfig, ConnectionState, DbError, DbResult, Provider, StorageTarget,
    TransactionHandle,
};
pub use diagnostics::{DiagnosticEvent, EventLevel, EventSink, LogSink, SharedSink};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use manager::{EntityManager, EntityRepository, Repository, RepositoryContext};
pub use mapping::{
    MappingDispatcher, MappingError, MappingResult, MethodParams, MethodRegistry, StorageMethod,
};
pub use model::entity::{Entity, EntityMeta, EntityState, SoftDeleteDescriptor};
pub use model::field::{FieldDescriptor, FieldKind, FieldType};
pub use model::{MetadataError, MetadataResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
