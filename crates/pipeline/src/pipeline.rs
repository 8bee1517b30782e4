//! Pipeline orchestration: wiring, worker transitions, run loop

use crate::context::{lock_info, DeployInfoHandle, PipelineContext};
use crate::phase::PipelinePhase;
use crate::term::TerminationSignal;
use crate::worker::PipelineWorker;
use crate::PHASE_SCHEDULER_TICK;
use appfw_config::{AppFrameworkSpec, Scope};
use appfw_errors::Result;
use appfw_events::{Event, EventSender, EventSenderExt};
use appfw_objstore::{ObjectStoreManager, ProviderRegistry, RemoteVolumeCredentials};
use appfw_podexec::PodExecClient;
use appfw_store::{DiskSpaceTracker, LocalStore};
use appfw_types::{
    AppDeploymentContext, BundlePushStage, CrInfo, CrKind, DeployStatus, Phase, PhaseInfo,
    PhaseStatus, RepoState, StsSnapshot,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Constructs a pod exec client bound to the named pod.
pub type PodExecFactory = Arc<dyn Fn(&str) -> Arc<dyn PodExecClient> + Send + Sync>;

/// External collaborators the pipeline depends on.
pub struct PipelineEnv {
    pub local_store: Arc<LocalStore>,
    pub disk: Arc<DiskSpaceTracker>,
    pub registry: ProviderRegistry,
    /// Key material per volume name, resolved from secret refs by the
    /// reconciler.
    pub credentials: HashMap<String, RemoteVolumeCredentials>,
    pub pod_exec_factory: PodExecFactory,
    pub tx: EventSender,
}

/// Outcome of one pipeline run, persisted back into the CR status.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub status: AppDeploymentContext,
    pub installed: usize,
    pub failed: usize,
    pub needs_revisit: bool,
}

/// Whether the bundle push obligation for a CR kind is discharged.
#[must_use]
pub fn check_if_bundle_push_is_done(kind: CrKind, stage: BundlePushStage) -> bool {
    !kind.is_cluster_scoped() || stage == BundlePushStage::Complete
}

/// What a scheduling tick decided for one queued worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickAction {
    /// Retry budget spent or phase record unreachable; drop from queue.
    Evict,
    /// Phase complete; transition or finalize.
    Complete,
    /// Hand to the phase's worker pool.
    Dispatch,
    /// Active or parked; leave queued.
    Skip,
}

/// The orchestrator: owns the three phases, the termination signal, the
/// deployment context and the external client seams.
pub struct AppInstallPipeline {
    pub(crate) cr: CrInfo,
    pub(crate) sts: StsSnapshot,
    pub(crate) afw_config: Arc<AppFrameworkSpec>,
    pub(crate) context: Arc<PipelineContext>,
    download: PipelinePhase,
    pod_copy: PipelinePhase,
    install: PipelinePhase,
    pub(crate) sig_term: TerminationSignal,
    pub(crate) local_store: Arc<LocalStore>,
    pub(crate) disk: Arc<DiskSpaceTracker>,
    pub(crate) object_stores: HashMap<String, ObjectStoreManager>,
    pub(crate) pod_exec_factory: PodExecFactory,
    pub(crate) bundle_push_attempts: AtomicU32,
    pub(crate) tx: EventSender,
}

impl AppInstallPipeline {
    /// Build an empty pipeline for one CR.
    ///
    /// # Errors
    ///
    /// Returns an error if the app framework spec fails validation, a
    /// volume's credentials are missing, or a provider is not registered.
    pub fn init(
        cr: CrInfo,
        sts: StsSnapshot,
        afw_config: AppFrameworkSpec,
        status: &AppDeploymentContext,
        env: PipelineEnv,
    ) -> Result<Arc<Self>> {
        afw_config.validate()?;

        let mut object_stores = HashMap::new();
        for src in &afw_config.app_sources {
            let volume = afw_config.volume_for_app_source(&src.name)?.clone();
            let credentials = env
                .credentials
                .get(&volume.name)
                .cloned()
                .unwrap_or_default();
            if !volume.secret_ref.is_empty() {
                credentials.validate_for(&volume)?;
            }
            let client = env.registry.client_for(&volume, &credentials)?;
            object_stores.insert(
                src.name.clone(),
                ObjectStoreManager::new(client, volume, src.location.clone()),
            );
        }

        let context = Arc::new(PipelineContext::from_status(status, &afw_config));

        Ok(Arc::new(Self {
            cr,
            sts,
            afw_config: Arc::new(afw_config),
            context,
            download: PipelinePhase::new(Phase::Download),
            pod_copy: PipelinePhase::new(Phase::PodCopy),
            install: PipelinePhase::new(Phase::Install),
            sig_term: TerminationSignal::new(),
            local_store: env.local_store,
            disk: env.disk,
            object_stores,
            pod_exec_factory: env.pod_exec_factory,
            bundle_push_attempts: AtomicU32::new(0),
            tx: env.tx,
        }))
    }

    #[must_use]
    pub fn phase(&self, phase: Phase) -> &PipelinePhase {
        match phase {
            Phase::Download => &self.download,
            Phase::PodCopy => &self.pod_copy,
            Phase::Install => &self.install,
        }
    }

    #[must_use]
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    #[must_use]
    pub fn cr(&self) -> &CrInfo {
        &self.cr
    }

    /// Create a worker for (app, target pod) and queue it on `phase`.
    /// Idempotent per (app name, object hash, pod): a duplicate is a
    /// no-op. Returns whether a worker was added.
    pub fn create_and_add_worker(
        &self,
        phase: Phase,
        app_deploy_info: &DeployInfoHandle,
        app_src_name: &str,
        target_pod_name: &str,
    ) -> bool {
        let worker = PipelineWorker::new(
            Arc::clone(app_deploy_info),
            app_src_name,
            target_pod_name,
            Arc::clone(&self.afw_config),
            self.cr.clone(),
            self.sts.clone(),
        );
        self.phase(phase).add_worker(worker)
    }

    /// Signal all phase managers to drain and exit.
    ///
    /// # Errors
    ///
    /// Returns an error on a second call; the termination signal must not
    /// be closed twice.
    pub fn terminate(&self) -> Result<()> {
        self.sig_term.terminate()
    }

    /// Move a worker whose phase completed into the next phase.
    ///
    /// For a scale-out standalone leaving Download, the single worker
    /// expands into one worker per replica, each bound to its
    /// `AuxPhaseInfo` entry: entries already at Install:Complete are
    /// skipped, entries parked in Install re-enter the install queue, and
    /// everything else goes to pod copy.
    pub fn transition_worker_phase(&self, worker: &Arc<PipelineWorker>, from: Phase, to: Phase) {
        let from_phase = self.phase(from);

        if from == Phase::Download && worker.uses_aux_phase_info(Phase::PodCopy) {
            let replicas = worker.sts.replicas as usize;
            let mut plan: Vec<(u32, Phase)> = Vec::new();
            {
                let mut info = lock_info(&worker.app_deploy_info);
                if info.aux_phase_info.len() < replicas {
                    info.aux_phase_info
                        .resize(replicas, PhaseInfo::new(Phase::PodCopy));
                }
                for (ordinal, aux) in info.aux_phase_info.iter().enumerate().take(replicas) {
                    if aux.phase == Phase::Install && aux.status == PhaseStatus::InstallComplete {
                        continue;
                    }
                    let target = if aux.phase == Phase::Install {
                        Phase::Install
                    } else {
                        Phase::PodCopy
                    };
                    plan.push((u32::try_from(ordinal).unwrap_or(0), target));
                }
            }

            for (ordinal, target) in plan {
                let pod = self.cr.pod_name(ordinal);
                let expanded = PipelineWorker::new(
                    Arc::clone(&worker.app_deploy_info),
                    &worker.app_src_name,
                    pod.clone(),
                    Arc::clone(&self.afw_config),
                    self.cr.clone(),
                    self.sts.clone(),
                );
                self.phase(target).add_worker(expanded);
                self.tx.emit(Event::WorkerTransitioned {
                    app_name: worker.app_name(),
                    pod,
                    from,
                    to: target,
                });
            }
            from_phase.delete_worker(worker);
            return;
        }

        // Plain move: the same worker carries over with a fresh phase
        // record. Status must be final before the worker appears on the
        // next queue.
        let _ = worker.with_phase_info(to, |info| info.reset_for(to));
        worker.set_active(false);
        from_phase.move_worker_to(self.phase(to), worker, Arc::clone(worker));
        self.tx.emit(Event::WorkerTransitioned {
            app_name: worker.app_name(),
            pod: worker.target_pod_name().to_string(),
            from,
            to,
        });
    }

    /// Decide what the scheduling tick does with one queued worker.
    pub(crate) fn tick_action(worker: &Arc<PipelineWorker>, phase: Phase) -> TickAction {
        let Ok(info) = worker.phase_info(phase) else {
            return TickAction::Evict;
        };
        if info.status == phase.complete_status() {
            return TickAction::Complete;
        }
        if info.retries_exhausted() {
            return TickAction::Evict;
        }
        if worker.is_active() {
            return TickAction::Skip;
        }
        TickAction::Dispatch
    }

    /// Drop a worker whose retry budget is spent. Its deploy status stays
    /// at the last non-Complete value.
    pub(crate) fn evict_worker(&self, worker: &Arc<PipelineWorker>, phase: Phase) {
        self.phase(phase).delete_worker(worker);
        let (status, retry_count) = worker
            .phase_info(phase)
            .map_or((phase.error_status(), 0), |info| (info.status, info.retry_count));
        self.tx.emit(Event::WorkerEvicted {
            app_name: worker.app_name(),
            pod: worker.target_pod_name().to_string(),
            status,
            retry_count,
        });
    }

    /// Queue workers for every app the persisted status says is not done.
    pub(crate) fn enqueue_pending_workers(&self) {
        let mut plans: Vec<(String, DeployInfoHandle, Phase, String)> = Vec::new();

        for (src, handle) in self.context.iter_apps() {
            let info = lock_info(handle);
            if info.repo_state != RepoState::Active || info.deploy_status == DeployStatus::Complete
            {
                continue;
            }

            if info.aux_phase_info.is_empty() || info.phase_info.phase == Phase::Download {
                plans.push((
                    src.to_string(),
                    Arc::clone(handle),
                    info.phase_info.phase,
                    self.cr.pod_name(0),
                ));
            } else {
                // Resumed scale-out standalone: one worker per replica
                // still in flight.
                for (ordinal, aux) in info.aux_phase_info.iter().enumerate() {
                    if aux.status == PhaseStatus::InstallComplete {
                        continue;
                    }
                    plans.push((
                        src.to_string(),
                        Arc::clone(handle),
                        aux.phase,
                        self.cr.pod_name(u32::try_from(ordinal).unwrap_or(0)),
                    ));
                }
            }
        }

        for (src, handle, phase, pod) in plans {
            self.create_and_add_worker(phase, &handle, &src, &pod);
        }
    }

    /// Every worker is out of every queue.
    #[must_use]
    pub fn is_pipeline_empty(&self) -> bool {
        self.download.is_empty() && self.pod_copy.is_empty() && self.install.is_empty()
    }

    /// Cluster-scoped work that still has to happen before this run can
    /// finish.
    #[must_use]
    pub fn is_pending_cluster_scope_work(&self) -> bool {
        self.cr.kind.is_cluster_scoped()
            && self
                .context
                .has_apps_with_scope(&self.afw_config, Scope::Cluster)
            && matches!(
                self.context.bundle_push_stage(),
                BundlePushStage::Pending | BundlePushStage::InProgress
            )
    }

    /// Whether the reconciler should requeue this CR for more app
    /// framework work.
    #[must_use]
    pub fn needs_revisit(&self) -> bool {
        if !self.is_pipeline_empty() || self.is_pending_cluster_scope_work() {
            return true;
        }
        self.context.iter_apps().any(|(_, handle)| {
            let info = lock_info(handle);
            if info.deploy_status == DeployStatus::Complete {
                return false;
            }
            // Apps that burned their retry budget wait for a spec change,
            // not a requeue.
            let terminally_failed = if info.aux_phase_info.is_empty() {
                info.phase_info.retries_exhausted()
            } else {
                info.aux_phase_info.iter().all(PhaseInfo::retries_exhausted)
            };
            !terminally_failed
        })
    }

    /// Fold the run's outcome back into the progress flag.
    pub(crate) fn check_and_update_deployment_progress(&self) {
        if !self.needs_revisit() {
            self.context.set_deployment_in_progress(false);
        }
    }

    /// Start the three phase managers and block until the pipeline
    /// drains or the termination signal closes. Returns the run summary
    /// with the status snapshot to persist.
    ///
    /// # Errors
    ///
    /// Currently infallible at the orchestration level; the signature
    /// leaves room for join faults to surface.
    pub async fn run(self: Arc<Self>) -> Result<PipelineSummary> {
        self.context.set_deployment_in_progress(true);
        let app_count = self.context.iter_apps().count();
        self.tx.emit(Event::PipelineStarted {
            cr_name: self.cr.name.clone(),
            app_count,
        });

        self.enqueue_pending_workers();

        let mut managers = JoinSet::new();
        managers.spawn(Arc::clone(&self).download_phase_manager());
        managers.spawn(Arc::clone(&self).pod_copy_phase_manager());
        managers.spawn(Arc::clone(&self).install_phase_manager());

        let mut tick = tokio::time::interval(PHASE_SCHEDULER_TICK);
        loop {
            tokio::select! {
                () = self.sig_term.cancelled() => break,
                _ = tick.tick() => {
                    if self.is_pipeline_empty() && !self.is_pending_cluster_scope_work() {
                        // May race with an external terminate(); either
                        // close wins, a second is not attempted here.
                        if self.sig_term.terminate().is_ok() {
                            self.tx.emit(Event::PipelineTerminated {
                                cr_name: self.cr.name.clone(),
                            });
                        }
                        break;
                    }
                }
            }
        }

        while managers.join_next().await.is_some() {}

        self.check_and_update_deployment_progress();

        let installed = self.context.installed_count();
        let failed = self.context.failed_count();
        self.tx.emit(Event::PipelineCompleted {
            cr_name: self.cr.name.clone(),
            installed,
            failed,
        });

        Ok(PipelineSummary {
            status: self.context.snapshot(),
            installed,
            failed,
            needs_revisit: self.needs_revisit(),
        })
    }
}
