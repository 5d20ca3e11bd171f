use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tablemap_core::adapter::ColumnInfo;
use tablemap_core::mapping::{CREATE, LOAD, REMOVE, STORE};
use tablemap_core::{
    Connection, ConnectionConfig, DbResult, DiagnosticEvent, Entity, EntityManager, EntityMeta,
    EventSink, FieldDescriptor, FieldType, MappingDispatcher, MappingError, MappingResult,
    MetadataError, MethodParams, MethodRegistry, Provider, QueryAdapter, Repository,
    RepositoryContext, Row, SoftDeleteDescriptor, SqlValue, StorageMethod,
};

/// Adapter double that records statements and replays canned results.
struct ScriptedAdapter {
    affected: u64,
    last_id: i64,
    rows: Vec<Row>,
    statements: RefCell<Vec<String>>,
}

impl ScriptedAdapter {
    fn new(affected: u64, last_id: i64) -> Self {
        Self {
            affected,
            last_id,
            rows: Vec::new(),
            statements: RefCell::new(Vec::new()),
        }
    }

    fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }
}

impl QueryAdapter for ScriptedAdapter {
    fn provider(&self) -> Provider {
        Provider::Sqlite
    }

    fn escape(&self, value: &str, _like: bool) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn exec_query(&self, sql: &str) -> DbResult<u64> {
        self.statements.borrow_mut().push(sql.to_string());
        Ok(self.affected)
    }

    fn fetch_all(&self, sql: &str) -> DbResult<Vec<Row>> {
        self.statements.borrow_mut().push(sql.to_string());
        Ok(self.rows.clone())
    }

    fn affected_rows(&self) -> DbResult<u64> {
        Ok(self.affected)
    }

    fn last_inserted_id(&self) -> DbResult<i64> {
        Ok(self.last_id)
    }

    fn table_structure(&self, _table: &str) -> DbResult<Vec<ColumnInfo>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl EventSink for RecordingSink {
    fn record(&self, event: &DiagnosticEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn task_meta() -> Arc<EntityMeta> {
    EntityMeta::new(
        "Task",
        "tasks",
        vec![
            FieldDescriptor::persisted("id", "task_id", FieldType::Integer).generated_key(),
            FieldDescriptor::persisted("title", "title", FieldType::String),
            FieldDescriptor::persisted("note", "note", FieldType::String).nullable(),
        ],
    )
    .unwrap()
    .with_soft_delete(SoftDeleteDescriptor::new("state", 9, "removed_on"))
    .unwrap()
    .into_shared()
}

fn titled_task(title: &str) -> Entity {
    let mut task = Entity::new(task_meta());
    task.set("title", title).unwrap();
    task
}

#[test]
fn create_renders_insert_of_non_null_fields() {
    let adapter = ScriptedAdapter::new(1, 12);
    let mut dispatcher = MappingDispatcher::new();
    let mut task = titled_task("write docs");

    assert!(dispatcher
        .execute(&adapter, CREATE, &mut task, &MethodParams::default())
        .unwrap());
    assert_eq!(
        adapter.statements(),
        ["INSERT INTO tasks (title) VALUES ('write docs')"]
    );
    assert_eq!(task.primary_key_value(), Some(&SqlValue::Int(12)));
}

#[test]
fn create_with_zero_generated_key_is_fatal() {
    let adapter = ScriptedAdapter::new(1, 0);
    let mut dispatcher = MappingDispatcher::new();
    let mut task = titled_task("ghost");

    let err = dispatcher
        .execute(&adapter, CREATE, &mut task, &MethodParams::default())
        .unwrap_err();
    assert!(matches!(
        err,
        MappingError::Metadata(MetadataError::ZeroPrimaryKey { ref entity }) if entity == "Task"
    ));
    assert_eq!(task.primary_key_value(), None);
}

#[test]
fn create_with_zero_supplied_key_runs_no_statement() {
    let meta = EntityMeta::new(
        "Slot",
        "slots",
        vec![
            FieldDescriptor::persisted("number", "number", FieldType::Integer).primary_key(),
            FieldDescriptor::persisted("label", "label", FieldType::String),
        ],
    )
    .unwrap()
    .into_shared();
    let adapter = ScriptedAdapter::new(1, 0);
    let mut dispatcher = MappingDispatcher::new();
    let mut slot = Entity::new(meta);
    slot.set("number", 0).unwrap();
    slot.set("label", "zero").unwrap();

    let err = dispatcher
        .execute(&adapter, CREATE, &mut slot, &MethodParams::default())
        .unwrap_err();
    assert!(matches!(
        err,
        MappingError::Metadata(MetadataError::ZeroPrimaryKey { ref entity }) if entity == "Slot"
    ));
    assert!(adapter.statements().is_empty());
    assert_eq!(slot.state(), tablemap_core::EntityState::New);
}

#[test]
fn create_with_zero_affected_rows_returns_false() {
    let sink = Arc::new(RecordingSink::default());
    let adapter = ScriptedAdapter::new(0, 0);
    let mut dispatcher = MappingDispatcher::new().with_sink(sink.clone());
    let mut task = titled_task("ignored");

    assert!(!dispatcher
        .execute(&adapter, CREATE, &mut task, &MethodParams::default())
        .unwrap());
    let events = sink.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "create_no_rows");
}

#[test]
fn store_and_remove_succeed_on_zero_affected_rows() {
    let sink = Arc::new(RecordingSink::default());
    let adapter = ScriptedAdapter::new(0, 0);
    let mut dispatcher = MappingDispatcher::new().with_sink(sink.clone());
    let mut task = titled_task("renamed");

    let params = MethodParams::by_key(5);
    assert!(dispatcher.execute(&adapter, STORE, &mut task, &params).unwrap());
    assert!(dispatcher.execute(&adapter, REMOVE, &mut task, &params).unwrap());

    assert_eq!(
        adapter.statements(),
        [
            "UPDATE tasks SET title = 'renamed' WHERE (task_id = 5) AND (state IS NOT 9)",
            "UPDATE tasks SET state = 9, removed_on = CURRENT_TIMESTAMP WHERE (task_id = 5)",
        ]
    );
    let names: Vec<&str> = sink
        .events
        .lock()
        .unwrap()
        .iter()
        .map(|event| event.name)
        .collect();
    assert_eq!(names, ["store_no_rows", "remove_no_rows"]);
}

#[test]
fn load_selects_aliased_columns_and_reports_not_found() {
    let sink = Arc::new(RecordingSink::default());
    let adapter = ScriptedAdapter::new(0, 0);
    let mut dispatcher = MappingDispatcher::new().with_sink(sink.clone());
    let mut task = Entity::new(task_meta());

    assert!(!dispatcher
        .execute(&adapter, LOAD, &mut task, &MethodParams::by_key(3))
        .unwrap());
    assert_eq!(
        adapter.statements(),
        ["SELECT task_id AS id, title, note FROM tasks WHERE (task_id = 3) AND (state IS NOT 9) LIMIT 1"]
    );
    assert_eq!(sink.events.lock().unwrap()[0].name, "load_not_found");
}

#[test]
fn load_maps_row_by_logical_name() {
    let mut adapter = ScriptedAdapter::new(0, 0);
    adapter.rows = vec![Row::new(
        vec!["id".to_string(), "title".to_string(), "note".to_string()],
        vec![SqlValue::Int(3), SqlValue::from("plan"), SqlValue::Null],
    )];
    let mut dispatcher = MappingDispatcher::new();
    let mut task = Entity::new(task_meta());

    assert!(dispatcher
        .execute(&adapter, LOAD, &mut task, &MethodParams::by_key(3))
        .unwrap());
    assert_eq!(task.get("id"), Some(&SqlValue::Int(3)));
    assert_eq!(task.get("title"), Some(&SqlValue::from("plan")));
}

#[test]
fn operations_without_key_fail() {
    let adapter = ScriptedAdapter::new(1, 1);
    let mut dispatcher = MappingDispatcher::new();
    let mut task = titled_task("keyless");

    for method in [LOAD, STORE, REMOVE] {
        assert!(matches!(
            dispatcher.execute(&adapter, method, &mut task, &MethodParams::default()),
            Err(MappingError::Metadata(MetadataError::MissingPrimaryKeyValue { .. }))
        ));
    }
    assert!(adapter.statements().is_empty());
}

#[test]
fn dispatcher_caches_one_instance_per_resolved_id() {
    let adapter = ScriptedAdapter::new(1, 7);
    let mut dispatcher = MappingDispatcher::new();
    assert_eq!(dispatcher.cached_len(), 0);

    let mut first = titled_task("a");
    let mut second = titled_task("b");
    dispatcher
        .execute(&adapter, CREATE, &mut first, &MethodParams::default())
        .unwrap();
    dispatcher
        .execute(&adapter, "sqlite.create", &mut second, &MethodParams::default())
        .unwrap();

    assert!(dispatcher.is_cached("sqlite.create"));
    assert_eq!(dispatcher.cached_len(), 1);
}

#[test]
fn unknown_method_is_reported_with_resolved_id() {
    let adapter = ScriptedAdapter::new(1, 1);
    let mut dispatcher = MappingDispatcher::new();
    let mut task = titled_task("x");

    let err = dispatcher
        .execute(&adapter, "{provider}.archive", &mut task, &MethodParams::default())
        .unwrap_err();
    assert!(matches!(err, MappingError::UnknownMethod(ref id) if id == "sqlite.archive"));
    assert_eq!(dispatcher.cached_len(), 0);
}

static TOUCH_BUILDS: AtomicUsize = AtomicUsize::new(0);

struct Touch;

impl StorageMethod for Touch {
    fn execute(
        &self,
        adapter: &dyn QueryAdapter,
        entity: &mut Entity,
        _params: &MethodParams,
    ) -> MappingResult<bool> {
        let sql = adapter.bind(
            "UPDATE ? SET touched = 1",
            &SqlValue::from(entity.meta().table()),
        )?;
        Ok(adapter.exec_query(&sql)? > 0)
    }
}

#[test]
fn custom_method_is_built_once_and_runs() {
    let mut registry = MethodRegistry::default();
    registry
        .register("sqlite.touch", |_sink| {
            TOUCH_BUILDS.fetch_add(1, Ordering::SeqCst);
            Box::new(Touch)
        })
        .unwrap();
    assert!(matches!(
        registry.register("sqlite.touch", |_sink| Box::new(Touch)),
        Err(MappingError::DuplicateMethod(_))
    ));
    assert!(matches!(
        registry.register("{provider}.touch", |_sink| Box::new(Touch)),
        Err(MappingError::InvalidMethodId(_))
    ));

    let adapter = ScriptedAdapter::new(1, 1);
    let mut dispatcher = MappingDispatcher::with_registry(registry);
    let mut task = titled_task("x");
    for _ in 0..3 {
        assert!(dispatcher
            .execute(&adapter, "{provider}.touch", &mut task, &MethodParams::default())
            .unwrap());
    }
    assert_eq!(TOUCH_BUILDS.load(Ordering::SeqCst), 1);
    assert_eq!(adapter.statements()[0], "UPDATE 'tasks' SET touched = 1");
}

#[test]
fn builtin_registry_lists_sqlite_methods() {
    let registry = MethodRegistry::default();
    assert_eq!(
        registry.method_ids(),
        ["sqlite.create", "sqlite.load", "sqlite.remove", "sqlite.store"]
    );
    assert!(MethodRegistry::empty().is_empty());
}

/// Minimal custom repository built through the manager.
struct CountingRepository<'m> {
    context: RepositoryContext<'m>,
}

impl<'m> Repository<'m> for CountingRepository<'m> {
    fn bind(context: RepositoryContext<'m>) -> Self {
        Self { context }
    }
}

impl CountingRepository<'_> {
    fn count(&self, table: &str) -> DbResult<Option<SqlValue>> {
        self.context
            .connection
            .fetch_one(&format!("SELECT COUNT(*) FROM {table}"))
    }
}

#[test]
fn manager_builds_custom_repository_over_open_connection() {
    let config = ConnectionConfig::memory().init_sql(
        "CREATE TABLE tasks (task_id INTEGER PRIMARY KEY, title TEXT NOT NULL, note TEXT, state INTEGER, removed_on TEXT);",
    );
    let mut manager = EntityManager::new(Connection::new(config));

    {
        let mut repo = manager.entity_repository(task_meta()).unwrap();
        let mut task = repo.new_entity();
        task.set("title", "wired").unwrap();
        repo.create(&mut task).unwrap();
        repo.remove(&mut task).unwrap();
    }

    let repo: CountingRepository<'_> = manager.repository().unwrap();
    assert_eq!(repo.count("tasks").unwrap(), Some(SqlValue::Int(1)));
    assert_eq!(
        repo.context
            .connection
            .fetch_one("SELECT state FROM tasks")
            .unwrap(),
        Some(SqlValue::Int(9))
    );
    assert!(repo.context.dispatcher.is_cached("sqlite.remove"));
}
