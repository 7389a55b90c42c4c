//! Permission grantor behavior.

mod common;

use stratus_cloud::{CloudClient, Identity, SubKind, SubResource};
use stratus_core::{AttrMap, AttrValue, Mode, ResourceKind, ResourceSpec};
use stratus_reconcile::{
    GrantSpec, Grantor, KeyGrantOutcome, ReconcileError, Reconciler, grants::KEY_USE_SID,
};

use common::{attrs, cloud, policy};

async fn ensure_role(cloud: &stratus_cloud_memory::MemoryCloud, name: &str) {
    let spec = ResourceSpec::new(
        ResourceKind::Role,
        name,
        attrs(&[
            ("Path", AttrValue::from(format!("/lambda/{name}-path/"))),
            ("Principal", AttrValue::from("lambda.amazonaws.com")),
        ]),
    )
    .unwrap();
    Reconciler::with_policy(cloud, policy())
        .ensure(&spec, Mode::Apply)
        .await
        .unwrap();
}

#[tokio::test]
async fn reapplying_grants_issues_no_calls() {
    let cloud = cloud();
    ensure_role(&cloud, "app").await;
    let grantor = Grantor::with_policy(&cloud, policy());

    let desired = vec![
        GrantSpec::new("dynamodb:*", "arn:aws:dynamodb:*:*:table/orders"),
        GrantSpec::new("s3:PutObject", "arn:aws:s3:::data/*"),
    ];

    let first = grantor
        .reconcile_grants("app", &desired, Mode::Apply)
        .await
        .unwrap();
    assert_eq!(first.added.len(), 2);
    assert!(first.removed.is_empty());

    let mutations = cloud.mutation_count();
    let second = grantor
        .reconcile_grants("app", &desired, Mode::Apply)
        .await
        .unwrap();
    assert!(second.is_noop());
    assert_eq!(second.unchanged, 2);
    assert_eq!(cloud.mutation_count(), mutations);
}

#[tokio::test]
async fn stale_owned_grants_are_removed() {
    let cloud = cloud();
    ensure_role(&cloud, "app").await;
    let grantor = Grantor::with_policy(&cloud, policy());

    let old = vec![GrantSpec::new("sqs:SendMessage", "arn:aws:sqs:*:*:jobs")];
    grantor
        .reconcile_grants("app", &old, Mode::Apply)
        .await
        .unwrap();

    let report = grantor
        .reconcile_grants("app", &[], Mode::Apply)
        .await
        .unwrap();
    assert_eq!(report.removed, vec![old[0].statement_name()]);
    assert!(
        cloud
            .subs_of(ResourceKind::Role, "app", SubKind::InlinePolicy)
            .is_empty()
    );
}

#[tokio::test]
async fn foreign_statements_survive() {
    let cloud = cloud();
    ensure_role(&cloud, "app").await;
    let grantor = Grantor::with_policy(&cloud, policy());

    // A statement somebody created by hand, outside the naming scheme.
    let foreign = SubResource::new(SubKind::InlinePolicy, "AllowConsoleAccess", AttrMap::new());
    cloud
        .put_sub(ResourceKind::Role, "app", &foreign)
        .await
        .unwrap();

    let report = grantor
        .reconcile_grants("app", &[], Mode::Apply)
        .await
        .unwrap();
    assert!(report.removed.is_empty());

    let remaining = cloud.subs_of(ResourceKind::Role, "app", SubKind::InlinePolicy);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, "AllowConsoleAccess");
}

#[tokio::test]
async fn grant_preview_reports_without_writing() {
    let cloud = cloud();
    ensure_role(&cloud, "app").await;
    let grantor = Grantor::with_policy(&cloud, policy());

    let desired = vec![GrantSpec::new("s3:GetObject", "arn:aws:s3:::data/*")];
    let report = grantor
        .reconcile_grants("app", &desired, Mode::Preview)
        .await
        .unwrap();
    assert_eq!(report.added.len(), 1);
    assert_eq!(cloud.mutation_count(), 1); // only the role create
}

#[tokio::test]
async fn attached_policy_resolution() {
    let cloud = cloud();
    ensure_role(&cloud, "app").await;
    let grantor = Grantor::with_policy(&cloud, policy());

    cloud.seed_managed_policy("ReadOnlyAccess");
    let report = grantor
        .reconcile_attached("app", &["ReadOnlyAccess".to_string()], Mode::Apply)
        .await
        .unwrap();
    assert_eq!(report.added, vec!["ReadOnlyAccess".to_string()]);

    // Unknown policy name is a fatal missing dependency.
    let err = grantor
        .reconcile_attached("app", &["NoSuchPolicy".to_string()], Mode::Apply)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::MissingDependency(_)));

    // A name matching more than one policy is fatal too.
    cloud.seed_managed_policy("TeamPolicy");
    cloud.seed_managed_policy("TeamPolicy");
    let err = grantor
        .reconcile_attached("app", &["TeamPolicy".to_string()], Mode::Apply)
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::AmbiguousMatch { .. }));
}

#[tokio::test]
async fn detaching_policies_not_desired() {
    let cloud = cloud();
    ensure_role(&cloud, "app").await;
    let grantor = Grantor::with_policy(&cloud, policy());

    cloud.seed_managed_policy("OldPolicy");
    grantor
        .reconcile_attached("app", &["OldPolicy".to_string()], Mode::Apply)
        .await
        .unwrap();

    let report = grantor
        .reconcile_attached("app", &[], Mode::Apply)
        .await
        .unwrap();
    assert_eq!(report.removed, vec!["OldPolicy".to_string()]);
    assert!(
        cloud
            .subs_of(ResourceKind::Role, "app", SubKind::AttachedPolicy)
            .is_empty()
    );
}

#[tokio::test]
async fn key_grant_read_modify_write() {
    let cloud = cloud();
    ensure_role(&cloud, "app").await;
    cloud
        .create(ResourceKind::Key, "app", &AttrMap::new())
        .await
        .unwrap();
    let grantor = Grantor::with_policy(&cloud, policy());
    let role_arn = Identity::new("arn:aws:iam::123456789012:role/lambda/app-path/app");

    let outcome = grantor
        .ensure_key_grant("app", &role_arn, Mode::Apply)
        .await
        .unwrap();
    assert_eq!(outcome, KeyGrantOutcome::Granted);

    let doc = cloud.read_key_policy("app").await.unwrap();
    let statement = doc
        .statement
        .iter()
        .find(|s| s.sid.as_deref() == Some(KEY_USE_SID))
        .expect("key-use statement present");
    assert!(
        statement
            .principal
            .as_ref()
            .unwrap()
            .aws
            .contains(&role_arn.arn().to_string())
    );

    // Second grant converges to a no-op.
    let mutations = cloud.mutation_count();
    let outcome = grantor
        .ensure_key_grant("app", &role_arn, Mode::Apply)
        .await
        .unwrap();
    assert_eq!(outcome, KeyGrantOutcome::AlreadyGranted);
    assert_eq!(cloud.mutation_count(), mutations);
}

#[tokio::test]
async fn key_grant_drops_orphaned_principals() {
    let cloud = cloud();
    cloud
        .create(ResourceKind::Key, "app", &AttrMap::new())
        .await
        .unwrap();
    let grantor = Grantor::with_policy(&cloud, policy());
    let role_arn = Identity::new("arn:aws:iam::123456789012:role/app");

    // Simulate a deleted role leaving an opaque principal id behind.
    let mut doc = cloud.read_key_policy("app").await.unwrap();
    doc.statement.push(stratus_cloud::PolicyStatement::allow(
        KEY_USE_SID,
        vec!["AROAORPHANEDROLEID".to_string()],
        vec!["kms:Decrypt".to_string()],
    ));
    cloud.write_key_policy("app", &doc).await.unwrap();

    grantor
        .ensure_key_grant("app", &role_arn, Mode::Apply)
        .await
        .unwrap();

    let doc = cloud.read_key_policy("app").await.unwrap();
    let statement = doc
        .statement
        .iter()
        .find(|s| s.sid.as_deref() == Some(KEY_USE_SID))
        .unwrap();
    let principals = &statement.principal.as_ref().unwrap().aws;
    assert!(!principals.iter().any(|p| p == "AROAORPHANEDROLEID"));
    assert!(principals.iter().any(|p| p == role_arn.arn()));
}

#[tokio::test]
async fn role_removal_unwinds_policies_first() {
    let cloud = cloud();
    ensure_role(&cloud, "app").await;
    let grantor = Grantor::with_policy(&cloud, policy());

    cloud.seed_managed_policy("ReadOnlyAccess");
    grantor
        .reconcile_grants(
            "app",
            &[GrantSpec::new("s3:GetObject", "arn:aws:s3:::data/*")],
            Mode::Apply,
        )
        .await
        .unwrap();
    grantor
        .reconcile_attached("app", &["ReadOnlyAccess".to_string()], Mode::Apply)
        .await
        .unwrap();

    let outcome = Reconciler::with_policy(&cloud, policy())
        .remove(ResourceKind::Role, "app", Mode::Apply)
        .await
        .unwrap();
    assert!(matches!(outcome, stratus_core::Outcome::Deleted));
    assert!(
        cloud
            .describe(ResourceKind::Role, "app")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn key_grant_preview_makes_no_calls() {
    let cloud = cloud();
    cloud
        .create(ResourceKind::Key, "app", &AttrMap::new())
        .await
        .unwrap();
    let grantor = Grantor::with_policy(&cloud, policy());
    let mutations = cloud.mutation_count();

    let outcome = grantor
        .ensure_key_grant(
            "app",
            &Identity::new("arn:aws:iam::123456789012:role/app"),
            Mode::Preview,
        )
        .await
        .unwrap();
    assert_eq!(outcome, KeyGrantOutcome::WouldGrant);
    assert_eq!(cloud.mutation_count(), mutations);
}
