// End-to-end runs against real SQLite files as source and target.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::config::EngineConfig;
use relay_core::types::{new_id, DatabaseKind, ErrorKind, IntegrationLog, MappingSpec, NewIntegration};
use relay_engine::{ExecutionEngine, NotifyError, RunNotifier};
use relay_store::{db, ConnectionRepo, IntegrationRepo, RunLogRepo, RunLogStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Fixture {
    connections: ConnectionRepo,
    integrations: Arc<IntegrationRepo>,
    logs: Arc<RunLogRepo>,
    source_path: PathBuf,
    target_path: PathBuf,
}

impl Fixture {
    /// Source table `src(col_a, col_b)` holding `values`; empty target `dst(v)`.
    fn new(values: &[i64], target_ddl: &str) -> Self {
        let source_path = temp_db("source");
        let target_path = temp_db("target");

        let src = rusqlite::Connection::open(&source_path).unwrap();
        src.execute_batch("CREATE TABLE src (col_a INTEGER, col_b TEXT)").unwrap();
        for v in values {
            src.execute(
                "INSERT INTO src (col_a, col_b) VALUES (?1, ?2)",
                rusqlite::params![v, format!("row-{v}")],
            )
            .unwrap();
        }
        rusqlite::Connection::open(&target_path)
            .unwrap()
            .execute_batch(target_ddl)
            .unwrap();

        let shared = db::open_in_memory().unwrap();
        Self {
            connections: ConnectionRepo::new(shared.clone()),
            integrations: Arc::new(IntegrationRepo::new(shared.clone())),
            logs: Arc::new(RunLogRepo::new(shared)),
            source_path,
            target_path,
        }
    }

    fn engine(&self) -> ExecutionEngine {
        ExecutionEngine::new(self.integrations.clone(), self.logs.clone(), EngineConfig::default())
    }

    /// Create source/target connections and one integration; returns its id.
    fn integration(&self, target_kind: DatabaseKind, mappings: Vec<MappingSpec>, target_query: &str) -> String {
        let src = self
            .connections
            .create(&new_id(), DatabaseKind::Sqlite, path_str(&self.source_path))
            .unwrap();
        let dst = self
            .connections
            .create(&new_id(), target_kind, path_str(&self.target_path))
            .unwrap();
        self.integrations
            .create(NewIntegration {
                name: "copy".into(),
                source_connection_id: src.id,
                target_connection_id: dst.id,
                source_query: "SELECT col_a, col_b FROM src ORDER BY col_a".into(),
                target_query: target_query.into(),
                group_name: None,
                execution_order: 0,
                mappings,
            })
            .unwrap()
            .id
    }

    fn target_rows(&self) -> i64 {
        rusqlite::Connection::open(&self.target_path)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM dst", [], |r| r.get(0))
            .unwrap()
    }

    fn logs_for(&self, integration_id: &str) -> Vec<IntegrationLog> {
        self.logs.get_by_integration_id(integration_id).unwrap()
    }
}

fn temp_db(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!("relay-engine-{label}-{}.db", new_id()))
}

fn path_str(path: &std::path::Path) -> &str {
    path.to_str().unwrap()
}

const DST: &str = "CREATE TABLE dst (v INTEGER)";
const INSERT: &str = "INSERT INTO dst (v) VALUES (@p1)";

#[tokio::test(flavor = "multi_thread")]
async fn transfers_every_source_row() {
    let f = Fixture::new(&[1, 2, 3], DST);
    let id = f.integration(DatabaseKind::Sqlite, vec![MappingSpec::new("col_a", "@p1")], INSERT);

    let outcome = f.engine().execute_by_id(&id, &CancellationToken::new()).await;

    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.row_count, 3);
    assert_eq!(f.target_rows(), 3);
    let logs = f.logs_for(&id);
    assert_eq!(logs.len(), 1);
    assert!(logs[0].success);
    assert_eq!(logs[0].row_count, 3);
    assert!(logs[0].error_detail.is_none());
    assert_eq!(outcome.log_id.as_deref(), Some(logs[0].id.as_str()));
}

#[tokio::test(flavor = "multi_thread")]
async fn copies_within_one_file_past_the_row_buffer() {
    let values: Vec<i64> = (0..600).collect();
    let f = Fixture::new(&values, DST);
    rusqlite::Connection::open(&f.source_path)
        .unwrap()
        .execute_batch(DST)
        .unwrap();
    let same = f
        .connections
        .create("same-file", DatabaseKind::Sqlite, path_str(&f.source_path))
        .unwrap();
    let id = f
        .integrations
        .create(NewIntegration {
            name: "in-place".into(),
            source_connection_id: same.id.clone(),
            target_connection_id: same.id,
            source_query: "SELECT col_a, col_b FROM src ORDER BY col_a".into(),
            target_query: INSERT.into(),
            group_name: None,
            execution_order: 0,
            mappings: vec![MappingSpec::new("col_a", "@p1")],
        })
        .unwrap()
        .id;
    let config = EngineConfig {
        row_buffer: 16,
        ..EngineConfig::default()
    };
    let engine = ExecutionEngine::new(f.integrations.clone(), f.logs.clone(), config);

    let outcome = tokio::time::timeout(
        Duration::from_secs(30),
        engine.execute_by_id(&id, &CancellationToken::new()),
    )
    .await
    .unwrap();

    assert!(outcome.success, "{outcome:?}");
    assert_eq!(outcome.row_count, 600);
    let copied: i64 = rusqlite::Connection::open(&f.source_path)
        .unwrap()
        .query_row("SELECT COUNT(*) FROM dst", [], |r| r.get(0))
        .unwrap();
    assert_eq!(copied, 600);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_source_is_a_successful_zero_row_run() {
    let f = Fixture::new(&[], DST);
    let id = f.integration(DatabaseKind::Sqlite, vec![MappingSpec::new("col_a", "@p1")], INSERT);

    let outcome = f.engine().execute_by_id(&id, &CancellationToken::new()).await;

    assert!(outcome.success);
    assert_eq!(outcome.row_count, 0);
    assert_eq!(f.logs_for(&id).len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn inactive_connection_fails_fast_and_logs_once() {
    let f = Fixture::new(&[1, 2, 3], DST);
    let id = f.integration(DatabaseKind::Sqlite, vec![MappingSpec::new("col_a", "@p1")], INSERT);
    let resolved = relay_store::IntegrationStore::get_by_id(f.integrations.as_ref(), &id)
        .unwrap()
        .unwrap();
    f.connections.set_active(&resolved.target.id, false).unwrap();

    let outcome = f.engine().execute_by_id(&id, &CancellationToken::new()).await;

    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::InactiveConnection));
    assert_eq!(outcome.row_count, 0);
    assert_eq!(f.target_rows(), 0);
    let logs = f.logs_for(&id);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].error_kind, Some(ErrorKind::InactiveConnection));
    assert_eq!(logs[0].row_count, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_mapped_column_aborts_before_any_write() {
    let f = Fixture::new(&[1, 2, 3], DST);
    let id = f.integration(
        DatabaseKind::Sqlite,
        vec![MappingSpec::new("col_missing", "@p1")],
        INSERT,
    );

    let outcome = f.engine().execute_by_id(&id, &CancellationToken::new()).await;

    assert_eq!(outcome.error_kind, Some(ErrorKind::MappingError));
    assert_eq!(outcome.row_count, 0);
    assert_eq!(f.target_rows(), 0);
    let detail = outcome.error_detail.unwrap();
    assert!(detail.contains("col_missing"));
    assert!(detail.contains("col_a, col_b"));
}

#[tokio::test(flavor = "multi_thread")]
async fn target_failure_keeps_rows_already_written() {
    let f = Fixture::new(&[1, 2, 2, 3], "CREATE TABLE dst (v INTEGER UNIQUE)");
    let id = f.integration(DatabaseKind::Sqlite, vec![MappingSpec::new("col_a", "@p1")], INSERT);

    let outcome = f.engine().execute_by_id(&id, &CancellationToken::new()).await;

    assert_eq!(outcome.error_kind, Some(ErrorKind::TargetQueryError));
    assert_eq!(outcome.row_count, 2);
    assert_eq!(f.target_rows(), 2);
    assert!(outcome.message.unwrap().contains("row 3"));
    assert_eq!(f.logs_for(&id)[0].row_count, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelled_run_is_logged_as_cancelled() {
    let f = Fixture::new(&[1, 2, 3], DST);
    let id = f.integration(DatabaseKind::Sqlite, vec![MappingSpec::new("col_a", "@p1")], INSERT);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = f.engine().execute_by_id(&id, &cancel).await;

    assert_eq!(outcome.error_kind, Some(ErrorKind::Cancelled));
    assert_eq!(f.target_rows(), 0);
    let logs = f.logs_for(&id);
    assert_eq!(logs.len(), 1);
    assert!(logs[0].message.as_deref().unwrap().contains("cancelled"));
}

#[tokio::test(flavor = "multi_thread")]
async fn kind_without_driver_is_unsupported() {
    let f = Fixture::new(&[1], DST);
    let id = f.integration(DatabaseKind::Oracle, vec![MappingSpec::new("col_a", "@p1")], INSERT);

    let outcome = f.engine().execute_by_id(&id, &CancellationToken::new()).await;

    assert_eq!(outcome.error_kind, Some(ErrorKind::UnsupportedDatabase));
    assert_eq!(f.logs_for(&id).len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_integration_is_logged_as_not_found() {
    let f = Fixture::new(&[], DST);

    let outcome = f.engine().execute_by_id("nope", &CancellationToken::new()).await;

    assert_eq!(outcome.error_kind, Some(ErrorKind::NotFound));
    assert_eq!(f.logs_for("nope").len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_source_query_is_a_source_error() {
    let f = Fixture::new(&[1], DST);
    let id = f.integration(DatabaseKind::Sqlite, vec![MappingSpec::new("col_a", "@p1")], INSERT);
    {
        // Break the source table after the integration was defined.
        let src = rusqlite::Connection::open(&f.source_path).unwrap();
        src.execute_batch("DROP TABLE src").unwrap();
    }

    let outcome = f.engine().execute_by_id(&id, &CancellationToken::new()).await;

    assert_eq!(outcome.error_kind, Some(ErrorKind::SourceQueryError));
    assert_eq!(outcome.row_count, 0);
}

struct ChannelNotifier(mpsc::UnboundedSender<IntegrationLog>);

#[async_trait]
impl RunNotifier for ChannelNotifier {
    fn name(&self) -> &str {
        "channel"
    }

    async fn notify(&self, log: &IntegrationLog) -> Result<(), NotifyError> {
        self.0.send(log.clone()).map_err(|e| NotifyError(e.to_string()))
    }
}

struct FailingNotifier;

#[async_trait]
impl RunNotifier for FailingNotifier {
    fn name(&self) -> &str {
        "failing"
    }

    async fn notify(&self, _log: &IntegrationLog) -> Result<(), NotifyError> {
        Err(NotifyError("smtp down".into()))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn notifiers_see_the_log_and_cannot_fail_the_run() {
    let f = Fixture::new(&[1, 2], DST);
    let id = f.integration(DatabaseKind::Sqlite, vec![MappingSpec::new("col_a", "@p1")], INSERT);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = f
        .engine()
        .with_notifier(Arc::new(FailingNotifier))
        .with_notifier(Arc::new(ChannelNotifier(tx)));

    let outcome = engine.execute_by_id(&id, &CancellationToken::new()).await;
    assert!(outcome.success);

    let seen = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(Some(seen.id), outcome.log_id);
    assert_eq!(seen.row_count, 2);
}

struct SlowNotifier(mpsc::UnboundedSender<String>);

#[async_trait]
impl RunNotifier for SlowNotifier {
    fn name(&self) -> &str {
        "slow"
    }

    async fn notify(&self, log: &IntegrationLog) -> Result<(), NotifyError> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        self.0.send(log.id.clone()).map_err(|e| NotifyError(e.to_string()))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn flush_waits_for_notifications_in_progress() {
    let f = Fixture::new(&[1], DST);
    let id = f.integration(DatabaseKind::Sqlite, vec![MappingSpec::new("col_a", "@p1")], INSERT);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = f.engine().with_notifier(Arc::new(SlowNotifier(tx)));

    let outcome = engine.execute_by_id(&id, &CancellationToken::new()).await;
    assert!(rx.try_recv().is_err());

    assert!(engine.flush_notifications(Duration::from_secs(5)).await);
    assert_eq!(rx.try_recv().ok(), outcome.log_id);

    // The engine keeps accepting runs after a flush.
    engine.execute_by_id(&id, &CancellationToken::new()).await;
    assert!(engine.flush_notifications(Duration::from_secs(5)).await);
    assert!(rx.try_recv().is_ok());
}
