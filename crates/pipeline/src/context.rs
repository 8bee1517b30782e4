//! Runtime deployment context shared across phases
//!
//! The persisted [`AppDeploymentContext`] is plain data. For the lifetime
//! of one pipeline run each app record is wrapped in a shared handle so
//! that workers can mutate their own phase state while the context keeps
//! ownership of the collection. `snapshot()` folds everything back into
//! plain data for the reconciler to persist.

use appfw_config::{AppFrameworkSpec, Scope};
use appfw_types::{
    AppDeploymentContext, AppDeploymentInfo, AppSrcDeployInfo, BundlePushStage, BundlePushTracker,
    DeployStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Shared handle to one app's deployment record
pub type DeployInfoHandle = std::sync::Arc<Mutex<AppDeploymentInfo>>;

pub(crate) fn lock_info(handle: &DeployInfoHandle) -> MutexGuard<'_, AppDeploymentInfo> {
    handle.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runtime view of the per-CR deployment context
pub struct PipelineContext {
    apps: HashMap<String, Vec<DeployInfoHandle>>,
    bundle_push: Mutex<BundlePushTracker>,
    max_concurrent_app_downloads: u64,
    deployment_in_progress: AtomicBool,
    last_app_info_check_time: i64,
}

impl PipelineContext {
    /// Build the runtime context from the persisted CR status.
    ///
    /// The effective download concurrency prefers the value recorded in
    /// the status and falls back to the spec.
    #[must_use]
    pub fn from_status(status: &AppDeploymentContext, config: &AppFrameworkSpec) -> Self {
        let apps = status
            .apps_src_deploy_status
            .iter()
            .map(|(src, deploy_info)| {
                let handles = deploy_info
                    .app_deploy_info_list
                    .iter()
                    .cloned()
                    .map(|info| std::sync::Arc::new(Mutex::new(info)))
                    .collect();
                (src.clone(), handles)
            })
            .collect();

        let max_downloads = if status.apps_status_max_concurrent_app_downloads == 0 {
            config.max_concurrent_app_downloads()
        } else {
            status.apps_status_max_concurrent_app_downloads
        };

        Self {
            apps,
            bundle_push: Mutex::new(status.bundle_push_status.clone()),
            max_concurrent_app_downloads: max_downloads,
            deployment_in_progress: AtomicBool::new(status.is_deployment_in_progress),
            last_app_info_check_time: status.last_app_info_check_time,
        }
    }

    #[must_use]
    pub fn max_concurrent_app_downloads(&self) -> u64 {
        self.max_concurrent_app_downloads
    }

    /// Handles for one app source, in deployment order.
    #[must_use]
    pub fn app_handles(&self, app_src: &str) -> &[DeployInfoHandle] {
        self.apps.get(app_src).map_or(&[], Vec::as_slice)
    }

    /// Iterate (app source, handle) pairs across all sources.
    pub fn iter_apps(&self) -> impl Iterator<Item = (&str, &DeployInfoHandle)> {
        self.apps
            .iter()
            .flat_map(|(src, handles)| handles.iter().map(move |h| (src.as_str(), h)))
    }

    pub(crate) fn with_bundle_push<T>(&self, f: impl FnOnce(&mut BundlePushTracker) -> T) -> T {
        let mut tracker = self.bundle_push.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tracker)
    }

    #[must_use]
    pub fn bundle_push_stage(&self) -> BundlePushStage {
        self.with_bundle_push(|tracker| tracker.bundle_push_stage)
    }

    #[must_use]
    pub fn is_deployment_in_progress(&self) -> bool {
        self.deployment_in_progress.load(Ordering::Acquire)
    }

    pub fn set_deployment_in_progress(&self, in_progress: bool) {
        self.deployment_in_progress.store(in_progress, Ordering::Release);
    }

    /// Whether any app source with the given scope has apps recorded.
    #[must_use]
    pub fn has_apps_with_scope(&self, config: &AppFrameworkSpec, scope: Scope) -> bool {
        self.apps.iter().any(|(src, handles)| {
            !handles.is_empty() && config.scope_for_app_source(src).is_ok_and(|s| s == scope)
        })
    }

    /// Whether every app in cluster-scoped sources reached the given
    /// deploy status check.
    pub(crate) fn all_apps_in_scope_satisfy(
        &self,
        config: &AppFrameworkSpec,
        scope: Scope,
        check: impl Fn(&AppDeploymentInfo) -> bool,
    ) -> bool {
        self.apps
            .iter()
            .filter(|(src, _)| config.scope_for_app_source(src).is_ok_and(|s| s == scope))
            .flat_map(|(_, handles)| handles.iter())
            .all(|handle| check(&lock_info(handle)))
    }

    /// Fold the runtime state back into plain persisted data.
    #[must_use]
    pub fn snapshot(&self) -> AppDeploymentContext {
        let apps_src_deploy_status = self
            .apps
            .iter()
            .map(|(src, handles)| {
                let list = handles.iter().map(|h| lock_info(h).clone()).collect();
                (
                    src.clone(),
                    AppSrcDeployInfo {
                        app_deploy_info_list: list,
                    },
                )
            })
            .collect();

        AppDeploymentContext {
            apps_src_deploy_status,
            bundle_push_status: self.with_bundle_push(|tracker| tracker.clone()),
            apps_status_max_concurrent_app_downloads: self.max_concurrent_app_downloads,
            is_deployment_in_progress: self.is_deployment_in_progress(),
            last_app_info_check_time: self.last_app_info_check_time,
        }
    }

    /// Count apps whose deployment finished.
    #[must_use]
    pub fn installed_count(&self) -> usize {
        self.iter_apps()
            .filter(|(_, handle)| lock_info(handle).deploy_status == DeployStatus::Complete)
            .count()
    }

    /// Count apps that ran out of retry budget in some phase.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.iter_apps()
            .filter(|(_, handle)| {
                let info = lock_info(handle);
                let main_failed = info.phase_info.retries_exhausted();
                let aux_failed = info.aux_phase_info.iter().any(appfw_types::PhaseInfo::retries_exhausted);
                main_failed || aux_failed
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appfw_types::AppDeploymentInfo;

    fn status_with_one_app() -> AppDeploymentContext {
        let mut status = AppDeploymentContext::default();
        let mut src = AppSrcDeployInfo::default();
        src.app_deploy_info_list
            .push(AppDeploymentInfo::new("app1.tgz", "abcd1111", 10));
        status.apps_src_deploy_status.insert("appSrc1".to_string(), src);
        status
    }

    #[test]
    fn snapshot_round_trips() {
        let status = status_with_one_app();
        let ctx = PipelineContext::from_status(&status, &AppFrameworkSpec::default());
        let snap = ctx.snapshot();
        assert_eq!(
            snap.apps_src_deploy_status["appSrc1"].app_deploy_info_list[0].app_name,
            "app1.tgz"
        );
    }

    #[test]
    fn status_concurrency_overrides_spec() {
        let mut status = status_with_one_app();
        status.apps_status_max_concurrent_app_downloads = 2;
        let ctx = PipelineContext::from_status(&status, &AppFrameworkSpec::default());
        assert_eq!(ctx.max_concurrent_app_downloads(), 2);
    }

    #[test]
    fn zero_status_concurrency_falls_back_to_spec() {
        let status = status_with_one_app();
        let ctx = PipelineContext::from_status(&status, &AppFrameworkSpec::default());
        assert_eq!(
            ctx.max_concurrent_app_downloads(),
            appfw_config::DEFAULT_MAX_CONCURRENT_APP_DOWNLOADS
        );
    }

    #[test]
    fn worker_mutation_is_visible_in_snapshot() {
        let status = status_with_one_app();
        let ctx = PipelineContext::from_status(&status, &AppFrameworkSpec::default());

        let handle = ctx.app_handles("appSrc1")[0].clone();
        lock_info(&handle).deploy_status = DeployStatus::Complete;

        assert_eq!(ctx.installed_count(), 1);
        let snap = ctx.snapshot();
        assert_eq!(
            snap.apps_src_deploy_status["appSrc1"].app_deploy_info_list[0].deploy_status,
            DeployStatus::Complete
        );
    }
}
