//! Shared fixtures for the pipeline unit tests

use crate::context::DeployInfoHandle;
use crate::pipeline::{AppInstallPipeline, PipelineEnv};
use appfw_config::{AppFrameworkSpec, AppSourceSpec, Scope, VolumeSpec};
use appfw_objstore::mock::MockObjectStoreClient;
use appfw_objstore::{ObjectStoreClient, ProviderRegistry, RemoteVolumeCredentials};
use appfw_podexec::mock::MockPodExecClient;
use appfw_podexec::PodExecClient;
use appfw_store::{DiskSpaceTracker, LocalStore};
use appfw_types::{
    AppDeploymentContext, AppDeploymentInfo, AppSrcDeployInfo, CrInfo, StsSnapshot,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

pub(crate) struct TestHarness {
    pub pipeline: Arc<AppInstallPipeline>,
    pub objstore: Arc<MockObjectStoreClient>,
    pub podexec: Arc<MockPodExecClient>,
    pub disk: Arc<DiskSpaceTracker>,
    pub store: Arc<LocalStore>,
    pub _root: tempfile::TempDir,
}

pub(crate) fn afw_spec(scope: Scope) -> AppFrameworkSpec {
    AppFrameworkSpec {
        apps_repo_poll_interval_seconds: 60,
        max_concurrent_app_downloads: 5,
        vol_list: vec![VolumeSpec {
            name: "test_volume".to_string(),
            endpoint: "https://s3-eu-west-2.amazonaws.com".to_string(),
            path: "testbucket-rs-london".to_string(),
            secret_ref: "s3-secret".to_string(),
            provider: "aws".to_string(),
        }],
        app_sources: vec![AppSourceSpec {
            name: "appSrc1".to_string(),
            location: "adminAppsRepo".to_string(),
            vol_name: Some("test_volume".to_string()),
            scope: Some(scope),
        }],
        ..AppFrameworkSpec::default()
    }
}

pub(crate) fn build_harness(
    cr: CrInfo,
    replicas: u32,
    scope: Scope,
    status: &AppDeploymentContext,
) -> TestHarness {
    let root = tempdir().unwrap();
    let store = Arc::new(LocalStore::new(root.path()));
    let disk = Arc::new(DiskSpaceTracker::new(1024 * 1024));
    let objstore = Arc::new(MockObjectStoreClient::new());
    let podexec = Arc::new(MockPodExecClient::new(cr.pod_name(0)));

    let registry = ProviderRegistry::new();
    let shared = Arc::clone(&objstore);
    registry.register(
        "aws",
        Arc::new(move |_, _| Ok(Arc::clone(&shared) as Arc<dyn ObjectStoreClient>)),
    );

    let mut credentials = HashMap::new();
    credentials.insert(
        "test_volume".to_string(),
        RemoteVolumeCredentials {
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
        },
    );

    let exec = Arc::clone(&podexec);
    let sts_name = format!("splunk-{}-{}", cr.name, cr.kind.instance_suffix());
    let (tx, rx) = appfw_events::channel();
    // Events are advisory in these tests.
    drop(rx);

    let pipeline = AppInstallPipeline::init(
        cr,
        StsSnapshot::new(sts_name, replicas),
        afw_spec(scope),
        status,
        PipelineEnv {
            local_store: Arc::clone(&store),
            disk: Arc::clone(&disk),
            registry,
            credentials,
            pod_exec_factory: Arc::new(move |_pod| Arc::clone(&exec) as Arc<dyn PodExecClient>),
            tx,
        },
    )
    .unwrap();

    TestHarness {
        pipeline,
        objstore,
        podexec,
        disk,
        store,
        _root: root,
    }
}

pub(crate) fn handle(app: &str, hash: &str, size: u64) -> DeployInfoHandle {
    Arc::new(Mutex::new(AppDeploymentInfo::new(app, hash, size)))
}

pub(crate) fn status_with_apps(apps: &[(&str, &str, u64)]) -> AppDeploymentContext {
    let mut status = AppDeploymentContext::default();
    let mut src = AppSrcDeployInfo::default();
    for (app, hash, size) in apps {
        src.app_deploy_info_list
            .push(AppDeploymentInfo::new(*app, *hash, *size));
    }
    status
        .apps_src_deploy_status
        .insert("appSrc1".to_string(), src);
    status
}
