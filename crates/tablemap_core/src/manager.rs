//! Entity manager: connection lifecycle, transactions and repositories.
//!
//! # Responsibility
//! - Open the injected connection lazily and keep it for the manager's life.
//! - Bracket statement sequences with begin/commit/rollback.
//! - Hand out repositories bound to the connection and mapping dispatcher.
//!
//! # Invariants
//! - One connection and one dispatcher per manager; no pooling.
//! - Repositories are only built over an already-open connection.
//! - No retries: errors reach the caller unchanged.

use crate::adapter::SqlValue;
use crate::db::{Connection, ConnectionState, DbError, DbResult, TransactionHandle};
use crate::mapping::{MappingDispatcher, MappingResult, MethodParams, CREATE, LOAD, REMOVE, STORE};
use crate::model::entity::{Entity, EntityMeta};
use log::warn;
use std::sync::Arc;

/// Owner of one connection and its storage-method dispatcher.
pub struct EntityManager {
    connection: Connection,
    dispatcher: MappingDispatcher,
}

impl EntityManager {
    /// Wraps a configured, not yet opened connection.
    pub fn new(connection: Connection) -> Self {
        let dispatcher = match connection.sink() {
            Some(sink) => MappingDispatcher::new().with_sink(Arc::clone(sink)),
            None => MappingDispatcher::new(),
        };
        Self::with_dispatcher(connection, dispatcher)
    }

    pub fn with_dispatcher(connection: Connection, dispatcher: MappingDispatcher) -> Self {
        Self {
            connection,
            dispatcher,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn dispatcher(&self) -> &MappingDispatcher {
        &self.dispatcher
    }

    /// Returns the connection, opening it on first use.
    pub fn connection(&mut self) -> DbResult<&mut Connection> {
        self.connection.open()?;
        Ok(&mut self.connection)
    }

    /// Begins a transaction and returns the connection as its handle.
    ///
    /// # Errors
    /// - `DbError::TransactionNotStarted` naming the provider when `BEGIN`
    ///   fails or a transaction is already active.
    pub fn start_transaction(&mut self) -> DbResult<&mut Connection> {
        let connection = self.connection()?;
        connection.begin_transaction()?;
        Ok(connection)
    }

    pub fn commit(&mut self) -> DbResult<()> {
        self.connection.commit()
    }

    pub fn rollback(&mut self) -> DbResult<()> {
        self.connection.rollback()
    }

    /// Runs `work` inside a transaction: commit on `Ok`, rollback on `Err`.
    pub fn transactional<T, E, F>(&mut self, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
        E: From<DbError>,
    {
        self.start_transaction()?;
        match work(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    warn!(
                        "event=db_transaction module=manager status=error action=rollback error={rollback_err}"
                    );
                }
                Err(err)
            }
        }
    }

    /// Builds a repository of type `R` over the opened connection.
    pub fn repository<'m, R: Repository<'m>>(&'m mut self) -> DbResult<R> {
        self.connection.open()?;
        Ok(R::bind(RepositoryContext {
            connection: &self.connection,
            dispatcher: &mut self.dispatcher,
        }))
    }

    /// Builds the generic CRUD repository for one entity type.
    pub fn entity_repository(&mut self, meta: Arc<EntityMeta>) -> DbResult<EntityRepository<'_>> {
        self.connection.open()?;
        Ok(EntityRepository {
            context: RepositoryContext {
                connection: &self.connection,
                dispatcher: &mut self.dispatcher,
            },
            meta,
        })
    }

    /// Closes the connection; refused while a transaction is active.
    pub fn close(&mut self) -> DbResult<()> {
        self.connection.close()
    }
}

/// Connection and dispatcher handed to a repository at construction.
pub struct RepositoryContext<'m> {
    pub connection: &'m Connection,
    pub dispatcher: &'m mut MappingDispatcher,
}

/// Repository that can be built by [`EntityManager::repository`].
pub trait Repository<'m>: Sized {
    fn bind(context: RepositoryContext<'m>) -> Self;
}

/// CRUD façade for one entity type over the built-in storage methods.
pub struct EntityRepository<'m> {
    context: RepositoryContext<'m>,
    meta: Arc<EntityMeta>,
}

impl<'m> EntityRepository<'m> {
    pub fn meta(&self) -> &Arc<EntityMeta> {
        &self.meta
    }

    pub fn connection(&self) -> &Connection {
        self.context.connection
    }

    /// Fresh entity of this repository's type.
    pub fn new_entity(&self) -> Entity {
        Entity::new(Arc::clone(&self.meta))
    }

    pub fn create(&mut self, entity: &mut Entity) -> MappingResult<bool> {
        self.execute(CREATE, entity, &MethodParams::default())
    }

    /// Loads one entity by primary key; `None` when no visible row exists.
    pub fn load(&mut self, key: impl Into<SqlValue>) -> MappingResult<Option<Entity>> {
        let mut entity = self.new_entity();
        let found = self.execute(LOAD, &mut entity, &MethodParams::by_key(key))?;
        Ok(found.then_some(entity))
    }

    /// Re-reads `entity` from storage by its own primary key.
    pub fn reload(&mut self, entity: &mut Entity) -> MappingResult<bool> {
        self.execute(LOAD, entity, &MethodParams::default())
    }

    pub fn store(&mut self, entity: &mut Entity) -> MappingResult<bool> {
        self.execute(STORE, entity, &MethodParams::default())
    }

    pub fn remove(&mut self, entity: &mut Entity) -> MappingResult<bool> {
        self.execute(REMOVE, entity, &MethodParams::default())
    }

    /// Runs any registered storage method by identifier template.
    pub fn execute(
        &mut self,
        method_id: &str,
        entity: &mut Entity,
        params: &MethodParams,
    ) -> MappingResult<bool> {
        self.context
            .dispatcher
            .execute(self.context.connection, method_id, entity, params)
    }
}

impl<'m> Repository<'m> for RepositoryContext<'m> {
    fn bind(context: RepositoryContext<'m>) -> Self {
        context
    }
}
