//! Boot-time reconciliation against a file-backed database.
//!
//! Restarts are simulated by reconnecting to the same file.

use serde_json::json;
use warden::rbac::{ADMIN_ROLE, RoleDef, USER_ROLE, store, sync};
use warden::{App, db};

use super::harness::{Blog, EDITOR_ROLE, ROOT_EMAIL, config, seed};

fn database_url(dir: &tempfile::TempDir) -> String {
    dir.path().join("warden.db").to_string_lossy().into_owned()
}

#[tokio::test]
async fn restart_with_unchanged_modules_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let url = database_url(&dir);

    let first = db::connect(&url).await.unwrap();
    seed(&first).await;
    drop(first);

    let second = db::connect(&url).await.unwrap();
    let resolver = App::new(config()).module(Blog).resolver();
    let report = sync::synchronize(second.connection(), &resolver, None)
        .await
        .unwrap();

    assert!(report.is_noop(), "unexpected changes: {report:?}");
}

#[tokio::test]
async fn removed_module_is_pruned_but_custom_roles_survive() {
    let dir = tempfile::tempdir().unwrap();
    let url = database_url(&dir);

    let handle = db::connect(&url).await.unwrap();
    let users = seed(&handle).await;
    let conn = handle.connection();
    store::insert_role(conn, &RoleDef::new("moderator"), false)
        .await
        .unwrap();
    drop(handle);

    let handle = db::connect(&url).await.unwrap();
    let conn = handle.connection();
    let resolver = App::new(config()).resolver();
    let report = sync::synchronize(conn, &resolver, None).await.unwrap();

    assert_eq!(report.roles_pruned, 1, "only the editor role is module-owned");
    assert_eq!(report.permissions_pruned, 3);
    assert!(store::find_role(conn, EDITOR_ROLE).await.unwrap().is_none());
    assert!(store::find_role(conn, "moderator").await.unwrap().is_some());
    assert!(store::find_permission(conn, "post.read").await.unwrap().is_none());

    let alice = store::load_user(conn, &users.alice).await.unwrap().unwrap();
    let names: Vec<_> = alice.roles.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec![USER_ROLE]);
    assert!(alice.all_permissions().next().is_none());
}

#[tokio::test]
async fn super_admin_roles_are_replaced_on_every_boot() {
    let dir = tempfile::tempdir().unwrap();
    let url = database_url(&dir);

    let handle = db::connect(&url).await.unwrap();
    let users = seed(&handle).await;
    let conn = handle.connection();
    let resolver = App::new(config()).module(Blog).resolver();

    let report = sync::synchronize(conn, &resolver, Some(ROOT_EMAIL))
        .await
        .unwrap();
    assert!(report.super_admin_assigned);

    let editor = store::find_role(conn, EDITOR_ROLE).await.unwrap().unwrap();
    store::assign_role(conn, &users.root, &editor.id).await.unwrap();

    sync::synchronize(conn, &resolver, Some("root")).await.unwrap();
    let root = store::load_user(conn, &users.root).await.unwrap().unwrap();
    let names: Vec<_> = root.roles.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec![ADMIN_ROLE]);
}

#[tokio::test]
async fn unknown_super_admin_is_skipped() {
    let handle = db::connect(":memory:").await.unwrap();
    seed(&handle).await;
    let resolver = App::new(config()).module(Blog).resolver();

    let report = sync::synchronize(handle.connection(), &resolver, Some("nobody@example.com"))
        .await
        .unwrap();
    assert!(!report.super_admin_assigned);
}

#[tokio::test]
async fn failed_sync_does_not_stop_the_boot() {
    let handle = db::connect(":memory:").await.unwrap();
    let resolver = App::new(config()).module(Blog).resolver();

    // No schema yet: every statement fails.
    assert!(sync::run(handle.connection(), &resolver, None).await.is_none());

    db::migrate(handle.connection()).await.unwrap();
    let report = sync::run(handle.connection(), &resolver, None).await.unwrap();
    assert_eq!(report.permissions_inserted, 4);

    let conn = handle.connection();
    let user = store::insert_user(conn, "carol", None, &json!({})).await.unwrap();
    assert!(store::load_user(conn, &user).await.unwrap().is_some());
}
