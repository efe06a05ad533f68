// Repository behaviour against an in-memory catalog.

use relay_core::types::{DatabaseKind, ErrorKind, IntegrationLog, MappingSpec, NewIntegration};
use relay_store::{
    db, ConnectionRepo, ConnectionStore, IntegrationRepo, IntegrationStore, RunLogRepo,
    RunLogStore, ScheduledJobRepo, ScheduledJobStore, StoreError,
};

struct Catalog {
    connections: ConnectionRepo,
    integrations: IntegrationRepo,
    logs: RunLogRepo,
    jobs: ScheduledJobRepo,
}

fn catalog() -> Catalog {
    let shared = db::open_in_memory().unwrap();
    Catalog {
        connections: ConnectionRepo::new(shared.clone()),
        integrations: IntegrationRepo::new(shared.clone()),
        logs: RunLogRepo::new(shared.clone()),
        jobs: ScheduledJobRepo::new(shared),
    }
}

fn new_integration(src: &str, dst: &str, name: &str, group: Option<&str>, order: i32) -> NewIntegration {
    NewIntegration {
        name: name.to_string(),
        source_connection_id: src.to_string(),
        target_connection_id: dst.to_string(),
        source_query: "SELECT a, b FROM src".to_string(),
        target_query: "INSERT INTO dst (x, y) VALUES (@x, @y)".to_string(),
        group_name: group.map(String::from),
        execution_order: order,
        mappings: vec![MappingSpec::new("b", "@y"), MappingSpec::new("a", "@x")],
    }
}

fn log(integration_id: &str, run_at: &str, success: bool) -> IntegrationLog {
    IntegrationLog {
        id: relay_core::types::new_id(),
        integration_id: integration_id.to_string(),
        run_at: run_at.to_string(),
        success,
        message: None,
        row_count: 3,
        duration_ms: 12,
        error_kind: (!success).then_some(ErrorKind::TargetQueryError),
        error_detail: (!success).then(|| "constraint failed".to_string()),
    }
}

#[test]
fn resolves_integration_with_ordered_mappings() {
    let c = catalog();
    let src = c.connections.create("src", DatabaseKind::Sqlite, "/tmp/a.db").unwrap();
    let dst = c.connections.create("dst", DatabaseKind::PostgreSql, "postgres://u:p@h/db").unwrap();
    let created = c
        .integrations
        .create(new_integration(&src.id, &dst.id, "copy", None, 0))
        .unwrap();

    let resolved = c.integrations.get_by_id(&created.id).unwrap().expect("integration exists");
    assert_eq!(resolved.source.id, src.id);
    assert_eq!(resolved.target.kind, DatabaseKind::PostgreSql);
    let params: Vec<_> = resolved.mappings.iter().map(|m| m.target_parameter.as_str()).collect();
    assert_eq!(params, ["@y", "@x"]);
    assert_eq!(resolved.mappings[1].position, 1);
}

#[test]
fn unknown_integration_is_none() {
    let c = catalog();
    assert!(c.integrations.get_by_id("missing").unwrap().is_none());
}

#[test]
fn duplicate_target_parameter_rejected() {
    let c = catalog();
    let src = c.connections.create("src", DatabaseKind::Sqlite, "a.db").unwrap();
    let mut new = new_integration(&src.id, &src.id, "dup", None, 0);
    new.mappings.push(MappingSpec::new("c", "@x"));

    let err = c.integrations.create(new).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateParameter { ref parameter } if parameter == "@x"));
    assert!(c.integrations.list().unwrap().is_empty());
}

#[test]
fn integration_with_unknown_connection_rejected() {
    let c = catalog();
    let src = c.connections.create("src", DatabaseKind::Sqlite, "a.db").unwrap();
    let err = c
        .integrations
        .create(new_integration(&src.id, "nope", "bad", None, 0))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { entity: "connection", .. }));
}

#[test]
fn connection_delete_blocked_while_referenced() {
    let c = catalog();
    let src = c.connections.create("src", DatabaseKind::Sqlite, "a.db").unwrap();
    let dst = c.connections.create("dst", DatabaseKind::Sqlite, "b.db").unwrap();
    let integration = c
        .integrations
        .create(new_integration(&src.id, &dst.id, "copy", None, 0))
        .unwrap();

    let err = c.connections.delete(&dst.id).unwrap_err();
    assert!(matches!(err, StoreError::ConnectionInUse { integrations: 1, .. }));

    c.integrations.delete(&integration.id).unwrap();
    c.connections.delete(&dst.id).unwrap();
    assert!(c.connections.get_by_id(&dst.id).unwrap().is_none());
}

#[test]
fn get_active_skips_deactivated() {
    let c = catalog();
    let a = c.connections.create("a", DatabaseKind::Sqlite, "a.db").unwrap();
    c.connections.create("b", DatabaseKind::Sqlite, "b.db").unwrap();
    c.connections.set_active(&a.id, false).unwrap();

    let active: Vec<_> = c.connections.get_active().unwrap().into_iter().map(|c| c.name).collect();
    assert_eq!(active, ["b"]);
}

#[test]
fn replace_mappings_keeps_new_order() {
    let c = catalog();
    let src = c.connections.create("src", DatabaseKind::Sqlite, "a.db").unwrap();
    let i = c
        .integrations
        .create(new_integration(&src.id, &src.id, "copy", None, 0))
        .unwrap();
    c.integrations
        .replace_mappings(&i.id, &[MappingSpec::new("z", "@p1")])
        .unwrap();

    let resolved = c.integrations.get_by_id(&i.id).unwrap().unwrap();
    assert_eq!(resolved.mappings.len(), 1);
    assert_eq!(resolved.mappings[0].source_column, "z");
}

#[test]
fn grouped_ordering() {
    let c = catalog();
    let s = c.connections.create("s", DatabaseKind::Sqlite, "a.db").unwrap();
    c.integrations.create(new_integration(&s.id, &s.id, "b2", Some("nightly"), 2)).unwrap();
    c.integrations.create(new_integration(&s.id, &s.id, "solo", None, 0)).unwrap();
    c.integrations.create(new_integration(&s.id, &s.id, "a1", Some("nightly"), 1)).unwrap();
    c.integrations.create(new_integration(&s.id, &s.id, "m1", Some("hourly"), 1)).unwrap();

    let group: Vec<_> = c
        .integrations
        .get_by_group("nightly")
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(group, ["a1", "b2"]);

    let all: Vec<_> = c
        .integrations
        .get_all_grouped_ordered()
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(all, ["solo", "m1", "a1", "b2"]);
}

#[test]
fn run_log_is_append_only_and_newest_first() {
    let c = catalog();
    c.logs.append(&log("i1", "2026-01-01T00:00:00+00:00", true)).unwrap();
    c.logs.append(&log("i2", "2026-01-02T00:00:00+00:00", false)).unwrap();
    c.logs.append(&log("i1", "2026-01-03T00:00:00+00:00", true)).unwrap();

    let recent = c.logs.get_recent(2).unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].run_at, "2026-01-03T00:00:00+00:00");

    let failed = &c.logs.get_by_integration_id("i2").unwrap()[0];
    assert!(!failed.success);
    assert_eq!(failed.error_kind, Some(ErrorKind::TargetQueryError));
    assert_eq!(failed.error_detail.as_deref(), Some("constraint failed"));

    assert_eq!(c.logs.get_by_integration_id("i1").unwrap().len(), 2);
}

#[test]
fn scheduled_job_lifecycle() {
    let c = catalog();
    let a = c.jobs.create("i1", "0 * * * *").unwrap();
    let b = c.jobs.create("i1", "*/5 * * * *").unwrap();

    c.jobs.set_trigger_handle(&a.id, Some("trigger-1")).unwrap();
    c.jobs.set_suspended(&b.id, true).unwrap();

    let active = c.jobs.get_all_active().unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].trigger_handle.as_deref(), Some("trigger-1"));
    assert_eq!(c.jobs.get_by_integration_id("i1").unwrap().len(), 2);
    assert_eq!(c.jobs.list().unwrap().len(), 2);

    c.jobs.set_cron_expression(&a.id, "@daily").unwrap();
    assert_eq!(c.jobs.get_by_id(&a.id).unwrap().unwrap().cron_expression, "@daily");

    assert!(c.jobs.delete(&a.id).unwrap());
    assert!(!c.jobs.delete(&a.id).unwrap());
    assert!(c.jobs.get_by_id(&a.id).unwrap().is_none());
    assert!(matches!(
        c.jobs.set_suspended(&a.id, false),
        Err(StoreError::NotFound { .. })
    ));
    assert!(matches!(
        c.jobs.set_cron_expression(&a.id, "@hourly"),
        Err(StoreError::NotFound { .. })
    ));
}
