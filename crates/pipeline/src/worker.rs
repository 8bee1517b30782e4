//! The unit of work: one (app package, target pod) pairing

use crate::context::{lock_info, DeployInfoHandle};
use appfw_config::AppFrameworkSpec;
use appfw_errors::{Error, Result};
use appfw_types::{ordinal_from_pod_name, CrInfo, CrKind, Phase, PhaseInfo, StsSnapshot};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One unit of pipeline work.
///
/// The worker borrows its deployment record from the pipeline context
/// through a shared handle; all status flows through that handle. A
/// worker belongs to exactly one phase queue at any moment.
pub struct PipelineWorker {
    pub(crate) app_src_name: String,
    pub(crate) target_pod_name: String,
    pub(crate) cr: CrInfo,
    pub(crate) sts: StsSnapshot,
    pub(crate) afw_config: Arc<AppFrameworkSpec>,
    pub(crate) app_deploy_info: DeployInfoHandle,
    is_active: AtomicBool,
}

impl PipelineWorker {
    pub(crate) fn new(
        app_deploy_info: DeployInfoHandle,
        app_src_name: impl Into<String>,
        target_pod_name: impl Into<String>,
        afw_config: Arc<AppFrameworkSpec>,
        cr: CrInfo,
        sts: StsSnapshot,
    ) -> Arc<Self> {
        Arc::new(Self {
            app_src_name: app_src_name.into(),
            target_pod_name: target_pod_name.into(),
            cr,
            sts,
            afw_config,
            app_deploy_info,
            is_active: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn app_src_name(&self) -> &str {
        &self.app_src_name
    }

    #[must_use]
    pub fn target_pod_name(&self) -> &str {
        &self.target_pod_name
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.is_active.store(active, Ordering::Release);
    }

    /// (app name, object hash) identity of the deployment record.
    #[must_use]
    pub fn app_identity(&self) -> (String, String) {
        let info = lock_info(&self.app_deploy_info);
        (info.app_name.clone(), info.object_hash.clone())
    }

    #[must_use]
    pub fn app_name(&self) -> String {
        lock_info(&self.app_deploy_info).app_name.clone()
    }

    /// Whether pod copy / install state for this worker lives in
    /// `AuxPhaseInfo` rather than the main record. True only for
    /// scale-out standalones; the download phase always uses the main
    /// record.
    #[must_use]
    pub fn uses_aux_phase_info(&self, phase: Phase) -> bool {
        phase != Phase::Download && self.cr.kind == CrKind::Standalone && self.sts.replicas > 1
    }

    /// Run `f` against the phase record this worker owns for `phase`.
    ///
    /// # Errors
    ///
    /// Returns an error when the target pod name carries no parseable
    /// ordinal or the aux entry for that ordinal does not exist.
    pub fn with_phase_info<T>(&self, phase: Phase, f: impl FnOnce(&mut PhaseInfo) -> T) -> Result<T> {
        let mut info = lock_info(&self.app_deploy_info);
        if self.uses_aux_phase_info(phase) {
            let ordinal = ordinal_from_pod_name(&self.target_pod_name)? as usize;
            let aux = info.aux_phase_info.get_mut(ordinal).ok_or_else(|| {
                Error::internal(format!(
                    "no aux phase entry for ordinal {ordinal} of {}",
                    self.target_pod_name
                ))
            })?;
            Ok(f(aux))
        } else {
            Ok(f(&mut info.phase_info))
        }
    }

    /// Copy of the phase record this worker owns for `phase`.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::with_phase_info`].
    pub fn phase_info(&self, phase: Phase) -> Result<PhaseInfo> {
        self.with_phase_info(phase, |info| info.clone())
    }

    /// Whether the scheduler may hand this worker to the phase's pool:
    /// not already active, not complete, retry budget left.
    #[must_use]
    pub fn is_eligible_for_run(&self, phase: Phase) -> bool {
        if self.is_active() {
            return false;
        }
        match self.phase_info(phase) {
            Ok(info) => {
                !info.retries_exhausted() && info.status != phase.complete_status()
            }
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for PipelineWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineWorker")
            .field("app_src", &self.app_src_name)
            .field("pod", &self.target_pod_name)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use appfw_types::{AppDeploymentInfo, PhaseStatus, MAX_PHASE_RETRY_COUNT};
    use std::sync::Mutex;

    fn worker(kind: CrKind, replicas: u32, pod: &str) -> Arc<PipelineWorker> {
        let info = Arc::new(Mutex::new(AppDeploymentInfo::new("app1.tgz", "abcd1111", 10)));
        PipelineWorker::new(
            info,
            "appSrc1",
            pod,
            Arc::new(AppFrameworkSpec::default()),
            CrInfo::new(kind, "stack1", "test"),
            StsSnapshot::new("splunk-stack1-standalone", replicas),
        )
    }

    #[test]
    fn fresh_worker_is_eligible() {
        let w = worker(CrKind::ClusterManager, 1, "splunk-stack1-cluster-manager-0");
        assert!(w.is_eligible_for_run(Phase::Download));
    }

    #[test]
    fn active_worker_is_not_eligible() {
        let w = worker(CrKind::ClusterManager, 1, "splunk-stack1-cluster-manager-0");
        w.set_active(true);
        assert!(!w.is_eligible_for_run(Phase::Download));
    }

    #[test]
    fn exhausted_retries_make_worker_ineligible() {
        let w = worker(CrKind::ClusterManager, 1, "splunk-stack1-cluster-manager-0");
        w.with_phase_info(Phase::Download, |info| {
            info.retry_count = MAX_PHASE_RETRY_COUNT + 1;
        })
        .unwrap();
        assert!(!w.is_eligible_for_run(Phase::Download));
    }

    #[test]
    fn completed_worker_is_not_eligible() {
        let w = worker(CrKind::ClusterManager, 1, "splunk-stack1-cluster-manager-0");
        w.with_phase_info(Phase::Download, |info| {
            info.status = PhaseStatus::DownloadComplete;
        })
        .unwrap();
        assert!(!w.is_eligible_for_run(Phase::Download));
    }

    #[test]
    fn aux_applies_only_to_scale_out_standalone_past_download() {
        let scaled = worker(CrKind::Standalone, 5, "splunk-stack1-standalone-3");
        assert!(!scaled.uses_aux_phase_info(Phase::Download));
        assert!(scaled.uses_aux_phase_info(Phase::PodCopy));
        assert!(scaled.uses_aux_phase_info(Phase::Install));

        let single = worker(CrKind::Standalone, 1, "splunk-stack1-standalone-0");
        assert!(!single.uses_aux_phase_info(Phase::PodCopy));

        let cm = worker(CrKind::ClusterManager, 5, "splunk-stack1-cluster-manager-0");
        assert!(!cm.uses_aux_phase_info(Phase::PodCopy));
    }

    #[test]
    fn aux_record_is_selected_by_pod_ordinal() {
        let w = worker(CrKind::Standalone, 5, "splunk-stack1-standalone-3");
        lock_info(&w.app_deploy_info).aux_phase_info = vec![PhaseInfo::new(Phase::PodCopy); 5];

        w.with_phase_info(Phase::PodCopy, |info| {
            info.status = PhaseStatus::PodCopyComplete;
        })
        .unwrap();

        let info = lock_info(&w.app_deploy_info);
        assert_eq!(info.aux_phase_info[3].status, PhaseStatus::PodCopyComplete);
        assert_eq!(info.aux_phase_info[2].status, PhaseStatus::PodCopyPending);
        // The main record stays untouched.
        assert_eq!(info.phase_info.status, PhaseStatus::DownloadPending);
    }

    #[test]
    fn invalid_pod_name_fails_aux_lookup() {
        let w = worker(CrKind::Standalone, 5, "invalid-podName");
        lock_info(&w.app_deploy_info).aux_phase_info = vec![PhaseInfo::new(Phase::PodCopy); 5];
        assert!(w.phase_info(Phase::PodCopy).is_err());
        assert!(!w.is_eligible_for_run(Phase::PodCopy));
    }
}
