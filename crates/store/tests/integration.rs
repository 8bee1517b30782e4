//! Integration tests for the store crate

use appfw_config::Scope;
use appfw_store::{DiskSpaceTracker, LocalStore};
use appfw_types::{CrInfo, CrKind};
use std::io::Cursor;
use tempfile::tempdir;

#[tokio::test]
async fn download_accounting_balances_after_cleanup() {
    let temp = tempdir().unwrap();
    let store = LocalStore::new(temp.path());
    let tracker = DiskSpaceTracker::new(1024 * 1024);
    let initial = tracker.available();

    let cr = CrInfo::new(CrKind::Standalone, "s1", "test");
    let dir = store
        .ensure_app_pkg_dir(&cr, Scope::Local, "appSrc1")
        .await
        .unwrap();

    // Download: reserve, stage, verify.
    let body = vec![1u8; 10];
    tracker.reserve(body.len() as u64).unwrap();
    let dest = dir.join("app1.tgz_abcd1111");
    store
        .stage_from_reader(Cursor::new(body), &dest)
        .await
        .unwrap();
    assert_eq!(tracker.available(), initial - 10);

    // Install complete: delete and credit the budget back.
    store.delete_app_pkg(&dest).await.unwrap();
    tracker.release(10);
    assert_eq!(tracker.available(), initial);
}

#[tokio::test]
async fn staged_package_skip_leaves_accounting_untouched() {
    let temp = tempdir().unwrap();
    let store = LocalStore::new(temp.path());
    let tracker = DiskSpaceTracker::new(1024);

    let cr = CrInfo::new(CrKind::Standalone, "s1", "test");
    let dir = store
        .ensure_app_pkg_dir(&cr, Scope::Local, "appSrc1")
        .await
        .unwrap();
    let dest = dir.join("app1.tgz_abcd1111");

    tracker.reserve(10).unwrap();
    store
        .stage_from_reader(Cursor::new(vec![0u8; 10]), &dest)
        .await
        .unwrap();
    let after_first = tracker.available();

    // A second pass sees the staged file and does not touch the tracker.
    assert!(store.is_app_pkg_staged(&dest, 10).await);
    assert_eq!(tracker.available(), after_first);
}
