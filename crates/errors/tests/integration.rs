//! Integration tests for the errors crate

use appfw_errors::{ConfigError, Error, ObjectStoreError, PlaybookError, StorageError};

#[test]
fn error_conversion_from_domains() {
    let err: Error = ObjectStoreError::Timeout {
        key: "appSrc1/app1.tgz".to_string(),
    }
    .into();
    assert!(matches!(err, Error::ObjectStore(_)));
    assert!(err.is_retryable());

    let err: Error = ConfigError::AppSourceNotFound {
        app_src: "invalidAppSrcName".to_string(),
    }
    .into();
    assert!(!err.is_retryable());
}

#[test]
fn io_error_preserves_path() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
    let err = Error::io_with_path(&io, "/opt/appfw/downloadedApps");
    match err {
        Error::Io { kind, path, .. } => {
            assert_eq!(kind, std::io::ErrorKind::NotFound);
            assert_eq!(
                path.unwrap().to_string_lossy(),
                "/opt/appfw/downloadedApps"
            );
        }
        other => panic!("expected Io error, got {other:?}"),
    }
}

#[test]
fn disk_pressure_is_not_retried() {
    // The scheduler parks the worker instead of spending retry budget.
    let err: Error = StorageError::InsufficientDiskSpace {
        required: 2048,
        available: 1024,
    }
    .into();
    assert!(!err.is_retryable());
}

#[test]
fn playbook_stage_violations_are_terminal() {
    let err: Error = PlaybookError::AlreadyComplete.into();
    assert!(!err.is_retryable());

    let err: Error = PlaybookError::ApplyFailed {
        pod: "splunk-cm1-cluster-manager-0".to_string(),
        stderr: "apply bundle refused".to_string(),
    }
    .into();
    assert!(err.is_retryable());
}

#[test]
fn error_display_is_prefixed_by_domain() {
    let err: Error = ObjectStoreError::EmptyObjectHash {
        app_name: "app1.tgz".to_string(),
    }
    .into();
    assert_eq!(
        err.to_string(),
        "object store error: empty object hash for app app1.tgz"
    );
}
