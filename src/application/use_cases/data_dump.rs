// ============================================================
// DATA DUMP USE CASE
// ============================================================
// Split one source CSV into the tables of a model schema and
// append each produced table to the store, in declaration order

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::error::{AppError, Result};
use crate::domain::schema::{MergeStep, ModelSchema, TableSpec};
use crate::domain::table::Table;
use crate::infrastructure::csv::CsvTableReader;
use crate::infrastructure::db::TableStore;

/// Message returned once every table is loaded
pub const DUMP_SUCCESS: &str = "Data dump success.";

/// One table appended to the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadEvent {
    pub table: String,
    pub rows: u64,
    pub message: String,
}

impl LoadEvent {
    fn new(table: &str, rows: u64) -> Self {
        Self {
            table: table.to_string(),
            rows,
            message: format!("{} loaded to database.", table),
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct DumpReport {
    pub message: String,
    pub events: Vec<LoadEvent>,
    pub duration_ms: u64,
}

/// Transform-and-load pipeline
pub struct DataDumpUseCase {
    schema: ModelSchema,
    store: Arc<dyn TableStore>,
    reader: CsvTableReader,
}

impl DataDumpUseCase {
    pub fn new(schema: ModelSchema, store: Arc<dyn TableStore>) -> Self {
        Self {
            schema,
            store,
            reader: CsvTableReader::default(),
        }
    }

    /// Use a reader with non-default CSV options
    pub fn with_reader(mut self, reader: CsvTableReader) -> Self {
        self.reader = reader;
        self
    }

    /// Read `source_path` and load every schema table from it
    pub async fn run(&self, source_path: &Path) -> Result<DumpReport> {
        let source = self.reader.read_file(source_path)?;
        self.run_table(&source).await
    }

    /// Load every schema table from an already-read source table.
    ///
    /// Stops at the first error; tables appended before it stay in the store.
    pub async fn run_table(&self, source: &Table) -> Result<DumpReport> {
        let start = Instant::now();
        let mut produced: Vec<Table> = Vec::with_capacity(self.schema.len());
        let mut events = Vec::with_capacity(self.schema.len());

        for (table_name, spec) in self.schema.tables() {
            let table = Self::build_table(source, spec, &produced)?;
            debug!(
                table = %table_name,
                rows = table.row_count(),
                columns = ?table.column_names(),
                "Built table"
            );

            let rows = self.store.append(table_name, &table).await?;
            let event = LoadEvent::new(table_name, rows);
            info!(table = %table_name, rows, "{}", event.message);

            events.push(event);
            produced.push(table);
        }

        info!(tables = events.len(), "{}", DUMP_SUCCESS);

        Ok(DumpReport {
            message: DUMP_SUCCESS.to_string(),
            events,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Final form of one schema entry, given the tables produced before it
    pub fn build_table(source: &Table, spec: &TableSpec, produced: &[Table]) -> Result<Table> {
        let spliced = source.project(spec.initial_columns())?.drop_duplicates();

        let shaped = match spec {
            TableSpec::Leaf { primary_key, .. } => spliced.with_surrogate_key(primary_key),
            TableSpec::Merge { merges, .. } => {
                let seed = match spec.surrogate_key() {
                    Some(key) => spliced.with_surrogate_key(key),
                    None => spliced,
                };
                Self::merge_chain(seed, merges, produced)?
            }
        };

        shaped
            .project(spec.all_columns())?
            .sort_by(&spec.sort_columns())
    }

    fn merge_chain(seed: Table, merges: &[MergeStep], produced: &[Table]) -> Result<Table> {
        merges.iter().try_fold(seed, |acc, step| {
            let right = produced.get(step.frame).ok_or_else(|| {
                AppError::SchemaError(format!(
                    "Merge frame {} has not been produced (only {} so far)",
                    step.frame,
                    produced.len()
                ))
            })?;
            acc.inner_join(right, &step.key)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{PrimaryKey, RawTableEntry};
    use crate::domain::table::{Column, Value};
    use crate::infrastructure::db::SqlTableStore;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    const SOURCE_CSV: &str = "\
user_id_src,name,dept
10,ann,ops
11,bob,dev
10,ann,ops
12,cy,dev
";

    #[derive(Default)]
    struct RecordingStore {
        loads: Mutex<Vec<(String, Table)>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl TableStore for RecordingStore {
        async fn append(&self, table_name: &str, table: &Table) -> Result<u64> {
            if self.fail_on.as_deref() == Some(table_name) {
                return Err(AppError::LoadError(format!("no relation {}", table_name)));
            }
            self.loads
                .lock()
                .unwrap()
                .push((table_name.to_string(), table.clone()));
            Ok(table.row_count() as u64)
        }
    }

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn entry(
        name: &str,
        initial: &[&str],
        primary_key: PrimaryKey,
        merges: Vec<(usize, &str)>,
        all: &[&str],
    ) -> RawTableEntry {
        RawTableEntry {
            name: name.to_string(),
            initial_column: strings(initial),
            primary_key,
            transform: !merges.is_empty(),
            merge_frame_locations: merges.iter().map(|(frame, _)| *frame).collect(),
            merge_keys: merges.iter().map(|(_, key)| key.to_string()).collect(),
            all_columns: strings(all),
        }
    }

    fn surrogate(name: &str) -> PrimaryKey {
        PrimaryKey::Surrogate(name.to_string())
    }

    fn users_and_dept_users() -> ModelSchema {
        ModelSchema::from_entries(vec![
            entry("users", &["name"], surrogate("id"), vec![], &["id", "name"]),
            entry(
                "dept_users",
                &["name", "dept"],
                surrogate("dept_user_id"),
                vec![(0, "name")],
                &["dept_user_id", "id", "dept"],
            ),
        ])
        .unwrap()
    }

    fn source() -> Table {
        CsvTableReader::default().read_content(SOURCE_CSV).unwrap()
    }

    fn write_source(test_name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "datadump-{}-{}.csv",
            test_name,
            std::process::id()
        ));
        std::fs::write(&path, SOURCE_CSV).unwrap();
        path
    }

    fn ints(table: &Table, column: &str) -> Vec<i64> {
        table
            .column(column)
            .unwrap()
            .values
            .iter()
            .map(|v| match v {
                Value::Int(i) => *i,
                other => panic!("expected int, got {:?}", other),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_run_table_loads_in_declaration_order() {
        let store = Arc::new(RecordingStore::default());
        let use_case = DataDumpUseCase::new(users_and_dept_users(), store.clone());

        let report = use_case.run_table(&source()).await.unwrap();

        assert_eq!(report.message, "Data dump success.");
        let messages: Vec<_> = report.events.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["users loaded to database.", "dept_users loaded to database."]
        );

        let loads = store.loads.lock().unwrap();
        let (name, users) = &loads[0];
        assert_eq!(name, "users");
        assert_eq!(users.column_names(), vec!["id", "name"]);
        assert_eq!(ints(users, "id"), vec![1, 2, 3]);

        let (name, dept_users) = &loads[1];
        assert_eq!(name, "dept_users");
        assert_eq!(dept_users.column_names(), vec!["dept_user_id", "id", "dept"]);
        assert_eq!(ints(dept_users, "dept_user_id"), vec![1, 2, 3]);
        assert_eq!(ints(dept_users, "id"), vec![1, 2, 3]);
    }

    #[test]
    fn test_merge_drops_rows_missing_from_joined_table() {
        let schema = users_and_dept_users();
        let (_, spec) = &schema.tables()[1];
        let known_users = Table::new(vec![
            Column::int64("id", vec![Some(7), Some(8)]),
            Column::utf8("name", vec![Some("cy"), Some("ann")]),
        ])
        .unwrap();

        let dept_users =
            DataDumpUseCase::build_table(&source(), spec, &[known_users]).unwrap();

        // bob is not a known user, so his row is gone
        assert_eq!(dept_users.row_count(), 2);
        assert_eq!(ints(&dept_users, "dept_user_id"), vec![1, 3]);
        assert_eq!(ints(&dept_users, "id"), vec![8, 7]);
    }

    #[test]
    fn test_multiple_merges_with_natural_key() {
        let schema = ModelSchema::from_entries(vec![
            entry("users", &["name"], surrogate("id"), vec![], &["id", "name"]),
            entry("depts", &["dept"], surrogate("dept_id"), vec![], &["dept_id", "dept"]),
            entry(
                "memberships",
                &["name", "dept"],
                PrimaryKey::Natural(strings(&["dept_id", "id"])),
                vec![(0, "name"), (1, "dept")],
                &["id", "dept_id"],
            ),
        ])
        .unwrap();

        let source = source();
        let mut produced = Vec::new();
        for (_, spec) in schema.tables() {
            let table = DataDumpUseCase::build_table(&source, spec, &produced).unwrap();
            produced.push(table);
        }

        let memberships = &produced[2];
        assert_eq!(memberships.column_names(), vec!["id", "dept_id"]);
        // sorted by dept_id first: dev (2) holds bob and cy, ops (1) holds ann
        assert_eq!(ints(memberships, "dept_id"), vec![1, 2, 2]);
        assert_eq!(ints(memberships, "id"), vec![1, 2, 3]);
    }

    #[test]
    fn test_multiple_merges_keep_surrogate_key() {
        let schema = ModelSchema::from_entries(vec![
            entry("users", &["name"], surrogate("id"), vec![], &["id", "name"]),
            entry("depts", &["dept"], surrogate("dept_id"), vec![], &["dept_id", "dept"]),
            entry(
                "memberships",
                &["name", "dept"],
                surrogate("membership_id"),
                vec![(0, "name"), (1, "dept")],
                &["membership_id", "id", "dept_id"],
            ),
        ])
        .unwrap();

        let source = source();
        let mut produced = Vec::new();
        for (_, spec) in schema.tables() {
            let table = DataDumpUseCase::build_table(&source, spec, &produced).unwrap();
            produced.push(table);
        }

        let memberships = &produced[2];
        assert_eq!(memberships.column_names(), vec!["membership_id", "id", "dept_id"]);
        assert_eq!(ints(memberships, "membership_id"), vec![1, 2, 3]);
        assert_eq!(ints(memberships, "id"), vec![1, 2, 3]);
        // ops is the first dept seen, dev the second
        assert_eq!(ints(memberships, "dept_id"), vec![1, 2, 2]);
    }

    #[test]
    fn test_unknown_source_column_is_schema_error() {
        let schema = ModelSchema::from_entries(vec![entry(
            "users",
            &["email"],
            surrogate("id"),
            vec![],
            &["id", "email"],
        )])
        .unwrap();
        let result = DataDumpUseCase::build_table(&source(), &schema.tables()[0].1, &[]);
        assert!(matches!(result, Err(AppError::SchemaError(_))));
    }

    #[tokio::test]
    async fn test_first_failure_stops_the_run() {
        let store = Arc::new(RecordingStore {
            fail_on: Some("dept_users".to_string()),
            ..RecordingStore::default()
        });
        let use_case = DataDumpUseCase::new(users_and_dept_users(), store.clone());

        let result = use_case.run_table(&source()).await;

        assert!(matches!(result, Err(AppError::LoadError(_))));
        let loads = store.loads.lock().unwrap();
        assert_eq!(loads.len(), 1);
        assert_eq!(loads[0].0, "users");
    }

    #[tokio::test]
    async fn test_end_to_end_into_sqlite() {
        let store = SqlTableStore::connect("sqlite::memory:").await.unwrap();
        let SqlTableStore::Sqlite(pool) = store.clone() else {
            panic!("expected sqlite store");
        };
        sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE dept_users (dept_user_id INTEGER PRIMARY KEY, id INTEGER, dept TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let path = write_source("end_to_end");
        let use_case = DataDumpUseCase::new(users_and_dept_users(), Arc::new(store));
        let report = use_case.run(&path).await.unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(report.message, DUMP_SUCCESS);
        assert_eq!(report.events[0].rows, 3);

        let users: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM users ORDER BY id")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(
            users,
            vec![(1, "ann".to_string()), (2, "bob".to_string()), (3, "cy".to_string())]
        );

        let dept_users: Vec<(i64, i64, String)> =
            sqlx::query_as("SELECT dept_user_id, id, dept FROM dept_users ORDER BY rowid")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(
            dept_users,
            vec![
                (1, 1, "ops".to_string()),
                (2, 2, "dev".to_string()),
                (3, 3, "dev".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_sqlite_receives_only_joined_rows() {
        let store = SqlTableStore::connect("sqlite::memory:").await.unwrap();
        let SqlTableStore::Sqlite(pool) = store.clone() else {
            panic!("expected sqlite store");
        };
        sqlx::query(
            "CREATE TABLE dept_users (dept_user_id INTEGER PRIMARY KEY, id INTEGER, dept TEXT)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let schema = users_and_dept_users();
        let known_users = Table::new(vec![
            Column::int64("id", vec![Some(7), Some(8)]),
            Column::utf8("name", vec![Some("cy"), Some("ann")]),
        ])
        .unwrap();
        let dept_users =
            DataDumpUseCase::build_table(&source(), &schema.tables()[1].1, &[known_users]).unwrap();

        let rows = store.append("dept_users", &dept_users).await.unwrap();
        assert_eq!(rows, 2);

        // bob never reaches the relation
        let stored: Vec<(i64, i64, String)> =
            sqlx::query_as("SELECT dept_user_id, id, dept FROM dept_users ORDER BY rowid")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(
            stored,
            vec![(1, 8, "ops".to_string()), (3, 7, "dev".to_string())]
        );
    }

    #[tokio::test]
    async fn test_missing_relation_keeps_earlier_tables() {
        let store = SqlTableStore::connect("sqlite::memory:").await.unwrap();
        let SqlTableStore::Sqlite(pool) = store.clone() else {
            panic!("expected sqlite store");
        };
        sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)")
            .execute(&pool)
            .await
            .unwrap();

        let use_case = DataDumpUseCase::new(users_and_dept_users(), Arc::new(store));
        let result = use_case.run_table(&source()).await;
        assert!(matches!(result, Err(AppError::LoadError(_))));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_unreadable_source_is_load_error() {
        let use_case =
            DataDumpUseCase::new(users_and_dept_users(), Arc::new(RecordingStore::default()));
        let result = use_case.run(Path::new("/nonexistent/source.csv")).await;
        assert!(matches!(result, Err(AppError::LoadError(_))));
    }
}
