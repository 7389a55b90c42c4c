//! Trigger binder behavior.

mod common;

use stratus_cloud::{CloudClient, Env, Identity, SubKind};
use stratus_core::{AttrMap, Mode, Outcome, ResourceKind};
use stratus_reconcile::{
    BindingAttrs, ReconcileError, Reconciler, TriggerBinder, TriggerBinding, TriggerSource,
};

use common::{cloud, orders_table, policy};

fn env() -> Env {
    Env::new("us-east-1", "123456789012")
}

async fn seed_function(cloud: &stratus_cloud_memory::MemoryCloud, name: &str) {
    cloud
        .create(ResourceKind::Function, name, &AttrMap::new())
        .await
        .unwrap();
}

fn stream_binding() -> TriggerBinding {
    TriggerBinding::new(
        TriggerSource::Stream {
            table: "orders".into(),
        },
        "process-orders",
    )
    .with_attrs(BindingAttrs {
        batch_size: Some(100),
        starting_position: Some("trim_horizon".into()),
        ..Default::default()
    })
}

#[tokio::test]
async fn stream_binding_is_created_once() {
    let cloud = cloud();
    seed_function(&cloud, "process-orders").await;
    Reconciler::with_policy(&cloud, policy())
        .ensure(&orders_table(5), Mode::Apply)
        .await
        .unwrap();

    let binder = TriggerBinder::with_policy(&cloud, env(), policy());
    let binding = stream_binding();

    let first = binder.reconcile_trigger(&binding, Mode::Apply).await.unwrap();
    assert!(matches!(first, Outcome::Created));

    let bindings = cloud.subs_of(ResourceKind::Function, "process-orders", SubKind::EventBinding);
    assert_eq!(bindings.len(), 1);
    let permissions = cloud.subs_of(
        ResourceKind::Function,
        "process-orders",
        SubKind::InvokePermission,
    );
    assert_eq!(permissions.len(), 1);

    // Second run: same binding, same permission, no new mutations.
    let mutations = cloud.mutation_count();
    let second = binder.reconcile_trigger(&binding, Mode::Apply).await.unwrap();
    assert!(matches!(second, Outcome::Unchanged));
    assert_eq!(cloud.mutation_count(), mutations);
}

#[tokio::test]
async fn binding_attr_mismatch_is_fatal() {
    let cloud = cloud();
    seed_function(&cloud, "process-orders").await;
    Reconciler::with_policy(&cloud, policy())
        .ensure(&orders_table(5), Mode::Apply)
        .await
        .unwrap();

    let binder = TriggerBinder::with_policy(&cloud, env(), policy());
    binder
        .reconcile_trigger(&stream_binding(), Mode::Apply)
        .await
        .unwrap();

    let mut changed = stream_binding();
    changed.attrs.batch_size = Some(200);
    let err = binder
        .reconcile_trigger(&changed, Mode::Apply)
        .await
        .unwrap_err();
    match err {
        ReconcileError::BindingMismatch { path, .. } => assert_eq!(path, "BatchSize"),
        other => panic!("expected binding mismatch, got {}", other),
    }
}

#[tokio::test]
async fn starting_position_is_exempt_from_comparison() {
    let cloud = cloud();
    seed_function(&cloud, "process-orders").await;
    Reconciler::with_policy(&cloud, policy())
        .ensure(&orders_table(5), Mode::Apply)
        .await
        .unwrap();

    let binder = TriggerBinder::with_policy(&cloud, env(), policy());
    binder
        .reconcile_trigger(&stream_binding(), Mode::Apply)
        .await
        .unwrap();

    let mut changed = stream_binding();
    changed.attrs.starting_position = Some("latest".into());
    let outcome = binder.reconcile_trigger(&changed, Mode::Apply).await.unwrap();
    assert!(matches!(outcome, Outcome::Unchanged));
}

#[tokio::test]
async fn missing_dependencies_are_fatal_user_errors() {
    let cloud = cloud();
    let binder = TriggerBinder::with_policy(&cloud, env(), policy());

    // Target function does not exist.
    let err = binder
        .reconcile_trigger(&stream_binding(), Mode::Apply)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::MissingDependency(_)));

    // Function exists but the table does not.
    seed_function(&cloud, "process-orders").await;
    let err = binder
        .reconcile_trigger(&stream_binding(), Mode::Apply)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::MissingDependency(_)));

    // Table exists but carries no stream.
    cloud
        .create(ResourceKind::Table, "orders", &AttrMap::new())
        .await
        .unwrap();
    let err = binder
        .reconcile_trigger(&stream_binding(), Mode::Apply)
        .await
        .unwrap_err();
    match err {
        ReconcileError::MissingDependency(what) => {
            assert!(what.contains("stream"), "unexpected: {}", what)
        }
        other => panic!("expected missing dependency, got {}", other),
    }
    assert_eq!(cloud.mutation_count(), 2);
}

#[tokio::test]
async fn queue_binding_resolves_through_queue_lookup() {
    let cloud = cloud();
    seed_function(&cloud, "worker").await;
    cloud.seed_queue("jobs");

    let binder = TriggerBinder::with_policy(&cloud, env(), policy());
    let binding = TriggerBinding::new(TriggerSource::Queue { name: "jobs".into() }, "worker");

    let outcome = binder.reconcile_trigger(&binding, Mode::Apply).await.unwrap();
    assert!(matches!(outcome, Outcome::Created));
    let outcome = binder.reconcile_trigger(&binding, Mode::Apply).await.unwrap();
    assert!(matches!(outcome, Outcome::Unchanged));
}

#[tokio::test]
async fn schedule_keeps_only_the_earliest_target() {
    let cloud = cloud();
    seed_function(&cloud, "job").await;

    // Two pre-existing targets on the rule, pointing at different
    // functions: everything but the earliest goes.
    cloud.put_schedule_rule("job", "rate(5 minutes)").await.unwrap();
    cloud
        .put_schedule_target("job", "1", &Identity::new("arn:aws:lambda:::function:job"))
        .await
        .unwrap();
    cloud
        .put_schedule_target("job", "2", &Identity::new("arn:aws:lambda:::function:other"))
        .await
        .unwrap();

    let binder = TriggerBinder::with_policy(&cloud, env(), policy());
    let binding = TriggerBinding::new(
        TriggerSource::Schedule {
            expression: "rate(5 minutes)".into(),
        },
        "job",
    );
    let outcome = binder.reconcile_trigger(&binding, Mode::Apply).await.unwrap();
    assert!(matches!(outcome, Outcome::Updated { .. }));

    let targets = cloud.list_schedule_targets("job").await.unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].id, "1");
}

#[tokio::test]
async fn schedule_with_single_foreign_target_is_fatal() {
    let cloud = cloud();
    seed_function(&cloud, "job").await;
    cloud.put_schedule_rule("job", "rate(5 minutes)").await.unwrap();
    cloud
        .put_schedule_target("job", "1", &Identity::new("arn:aws:lambda:::function:other"))
        .await
        .unwrap();

    let binder = TriggerBinder::with_policy(&cloud, env(), policy());
    let binding = TriggerBinding::new(
        TriggerSource::Schedule {
            expression: "rate(5 minutes)".into(),
        },
        "job",
    );
    let err = binder
        .reconcile_trigger(&binding, Mode::Apply)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::ForeignScheduleTarget { .. }));
}

#[tokio::test]
async fn schedule_create_and_converge() {
    let cloud = cloud();
    seed_function(&cloud, "job").await;

    let binder = TriggerBinder::with_policy(&cloud, env(), policy());
    let binding = TriggerBinding::new(
        TriggerSource::Schedule {
            expression: "rate(1 hour)".into(),
        },
        "job",
    );

    let outcome = binder.reconcile_trigger(&binding, Mode::Apply).await.unwrap();
    assert!(matches!(outcome, Outcome::Created));
    let outcome = binder.reconcile_trigger(&binding, Mode::Apply).await.unwrap();
    assert!(matches!(outcome, Outcome::Unchanged));

    let targets = cloud.list_schedule_targets("job").await.unwrap();
    assert_eq!(targets.len(), 1);
}

#[tokio::test]
async fn object_events_dedup_by_target_and_events() {
    let cloud = cloud();
    seed_function(&cloud, "ingest").await;
    cloud
        .create(ResourceKind::Bucket, "uploads", &AttrMap::new())
        .await
        .unwrap();

    let binder = TriggerBinder::with_policy(&cloud, env(), policy());
    let binding = TriggerBinding::new(
        TriggerSource::ObjectEvents {
            bucket: "uploads".into(),
        },
        "ingest",
    );

    let first = binder.reconcile_trigger(&binding, Mode::Apply).await.unwrap();
    assert!(matches!(first, Outcome::Created));
    let second = binder.reconcile_trigger(&binding, Mode::Apply).await.unwrap();
    assert!(matches!(second, Outcome::Unchanged));

    let notifications = cloud.subs_of(ResourceKind::Bucket, "uploads", SubKind::Notification);
    assert_eq!(notifications.len(), 1);
}

#[tokio::test]
async fn gateway_wiring_is_idempotent() {
    let cloud = cloud();
    seed_function(&cloud, "api").await;

    let binder = TriggerBinder::with_policy(&cloud, env(), policy());
    let binding = TriggerBinding::new(TriggerSource::Gateway, "api");

    let first = binder.reconcile_trigger(&binding, Mode::Apply).await.unwrap();
    assert!(matches!(first, Outcome::Created));

    let api = cloud.find_gateway("api").await.unwrap().expect("api exists");
    assert!(
        cloud
            .find_route(&api, "/{proxy+}")
            .await
            .unwrap()
            .is_some()
    );

    let second = binder.reconcile_trigger(&binding, Mode::Apply).await.unwrap();
    assert!(matches!(second, Outcome::Unchanged));

    let permissions = cloud.subs_of(ResourceKind::Function, "api", SubKind::InvokePermission);
    assert_eq!(permissions.len(), 1);
}

#[tokio::test]
async fn trigger_preview_reports_without_wiring() {
    let cloud = cloud();
    seed_function(&cloud, "process-orders").await;
    Reconciler::with_policy(&cloud, policy())
        .ensure(&orders_table(5), Mode::Apply)
        .await
        .unwrap();
    let mutations = cloud.mutation_count();

    let binder = TriggerBinder::with_policy(&cloud, env(), policy());
    let outcome = binder
        .reconcile_trigger(&stream_binding(), Mode::Preview)
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::WouldCreate));
    assert_eq!(cloud.mutation_count(), mutations);
}
