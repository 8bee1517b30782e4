//! Install phase: per-pod installs and the cluster bundle push gate

use crate::context::{lock_info, DeployInfoHandle};
use crate::pipeline::{AppInstallPipeline, TickAction};
use crate::playbook::cluster_scope_playbook_context;
use crate::worker::PipelineWorker;
use crate::{PHASE_SCHEDULER_TICK, POD_STAGING_DIR};
use appfw_config::Scope;
use appfw_errors::{InstallError, Result};
use appfw_events::{Event, EventSenderExt};
use appfw_types::{
    ordinal_from_pod_name, BundlePushStage, DeployStatus, Phase, PhaseInfo, PhaseStatus,
    MAX_PHASE_RETRY_COUNT,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

/// At most one install runs inside any pod at a time.
pub const MAX_PARALLEL_INSTALLS_PER_POD: usize = 1;

/// Non-blocking install slot acquisition for a pod. `None` when the pod
/// name carries no valid ordinal or the pod is already saturated; the
/// slot frees when the permit drops.
#[must_use]
pub fn get_install_slot_for_pod(
    slots: &[Arc<Semaphore>],
    pod_name: &str,
) -> Option<OwnedSemaphorePermit> {
    let ordinal = ordinal_from_pod_name(pod_name).ok()?;
    let slot = slots.get(ordinal as usize)?;
    Arc::clone(slot).try_acquire_owned().ok()
}

/// Whether every replica of a scale-out standalone finished its install.
#[must_use]
pub fn is_app_installation_complete_on_all_replicas(aux: &[PhaseInfo]) -> bool {
    !aux.is_empty()
        && aux
            .iter()
            .all(|info| info.phase == Phase::Install && info.status == PhaseStatus::InstallComplete)
}

impl AppInstallPipeline {
    /// Install phase manager. Besides the usual scheduling it owns the
    /// cluster bundle push: once every cluster-scoped app is placed and
    /// the queues drain, the playbook advances the tracker each tick.
    pub(crate) async fn install_phase_manager(self: Arc<Self>) {
        let replicas = usize::try_from(self.sts.replicas).unwrap_or(1).max(1);
        let slots: Arc<Vec<Arc<Semaphore>>> = Arc::new(
            (0..replicas)
                .map(|_| Arc::new(Semaphore::new(MAX_PARALLEL_INSTALLS_PER_POD)))
                .collect(),
        );
        let handler = tokio::spawn(Arc::clone(&self).install_worker_handler(Arc::clone(&slots)));

        let mut tick = tokio::time::interval(PHASE_SCHEDULER_TICK);
        loop {
            tokio::select! {
                () = self.sig_term.cancelled() => break,
                _ = tick.tick() => {
                    for worker in self.phase(Phase::Install).workers() {
                        match Self::tick_action(&worker, Phase::Install) {
                            TickAction::Evict => self.evict_worker(&worker, Phase::Install),
                            // Install is terminal per worker; a completed
                            // worker just leaves the pipeline.
                            TickAction::Complete => {
                                self.phase(Phase::Install).delete_worker(&worker);
                            }
                            TickAction::Dispatch => {
                                worker.set_active(true);
                                if !self.phase(Phase::Install).try_send_worker(Arc::clone(&worker)) {
                                    worker.set_active(false);
                                }
                            }
                            TickAction::Skip => {}
                        }
                    }

                    if self.need_to_run_cluster_scoped_playbook() {
                        self.run_cluster_scoped_playbook().await;
                    }
                }
            }
        }

        let phase = self.phase(Phase::Install);
        phase.mark_queued_inactive();
        phase.close_channel();
        let _ = handler.await;
    }

    async fn install_worker_handler(self: Arc<Self>, slots: Arc<Vec<Arc<Semaphore>>>) {
        let Some(mut rx) = self.phase(Phase::Install).take_receiver() else {
            return;
        };

        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                () = self.sig_term.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(Some(worker)) => {
                        let scope = self.afw_config.scope_for_app_source(worker.app_src_name());
                        match scope {
                            Err(_) => {
                                let _ = worker.with_phase_info(Phase::Install, PhaseInfo::mark_terminal);
                                worker.set_active(false);
                            }
                            Ok(Scope::Cluster) => {
                                self.run_cluster_install_worker(&worker);
                                worker.set_active(false);
                            }
                            Ok(Scope::Local) => {
                                let Some(permit) =
                                    get_install_slot_for_pod(&slots, worker.target_pod_name())
                                else {
                                    // Pod saturated; back to the queue for
                                    // the next tick.
                                    worker.set_active(false);
                                    continue;
                                };
                                let pipeline = Arc::clone(&self);
                                in_flight.spawn(async move {
                                    pipeline.run_local_install_worker(worker).await;
                                    drop(permit);
                                });
                            }
                        }
                    }
                    Some(None) => {}
                    None => break,
                }
            }
        }

        while in_flight.join_next().await.is_some() {}
    }

    /// Run the local-scope install playbook inside the target pod.
    pub(crate) async fn run_local_install_worker(&self, worker: Arc<PipelineWorker>) {
        let app_name = worker.app_name();
        let _ = worker.with_phase_info(Phase::Install, |info| {
            info.status = PhaseStatus::InstallInProgress;
        });
        self.tx.emit(Event::InstallStarted {
            app_name: app_name.clone(),
            pod: worker.target_pod_name().to_string(),
        });

        match self.install_app_on_pod(&worker).await {
            Ok(()) => {
                let _ = worker.with_phase_info(Phase::Install, |info| {
                    info.status = PhaseStatus::InstallComplete;
                });
                self.tx.emit(Event::InstallCompleted {
                    app_name,
                    pod: worker.target_pod_name().to_string(),
                });
                self.handle_install_complete(&worker).await;
            }
            Err(err) => {
                let retry_count = worker
                    .with_phase_info(Phase::Install, |info| {
                        info.record_failure();
                        if !err.is_retryable() {
                            info.mark_terminal();
                        }
                        info.retry_count
                    })
                    .unwrap_or(0);
                self.tx.emit(Event::InstallFailed {
                    app_name,
                    pod: worker.target_pod_name().to_string(),
                    error: err.to_string(),
                    retry_count,
                });
            }
        }

        worker.set_active(false);
    }

    async fn install_app_on_pod(&self, worker: &Arc<PipelineWorker>) -> Result<()> {
        let app_name = worker.app_name();
        let client = (self.pod_exec_factory)(worker.target_pod_name());
        let cmd = format!(
            "/opt/splunk/bin/splunk install app {POD_STAGING_DIR}/{}/{app_name} -update 1 -auth admin:$(cat /mnt/splunk-secrets/password)",
            worker.app_src_name()
        );
        let output = client.run_pod_exec_command(&cmd).await?;
        if !output.success() {
            return Err(InstallError::CommandFailed {
                app_name,
                pod: worker.target_pod_name().to_string(),
                message: output.stderr,
            }
            .into());
        }
        Ok(())
    }

    /// A cluster-scoped app's install step is its placement on the
    /// manager/deployer pod, which the pod copy phase already finished.
    /// Mark it complete and make sure the tracker is armed for a push.
    pub(crate) fn run_cluster_install_worker(&self, worker: &Arc<PipelineWorker>) {
        let _ = worker.with_phase_info(Phase::Install, |info| {
            info.status = PhaseStatus::InstallComplete;
        });
        self.tx.emit(Event::InstallCompleted {
            app_name: worker.app_name(),
            pod: worker.target_pod_name().to_string(),
        });

        self.context.with_bundle_push(|tracker| {
            // A completed tracker means these apps are a new generation.
            if tracker.bundle_push_stage == BundlePushStage::Complete {
                let _ = tracker.reset_for_new_generation();
            }
        });
    }

    /// After a local install completes: collapse aux state on scale-out
    /// standalones and clean the staged package once nothing depends on
    /// it.
    pub(crate) async fn handle_install_complete(&self, worker: &Arc<PipelineWorker>) {
        let cleanup = {
            let mut info = lock_info(&worker.app_deploy_info);
            if info.deploy_status == DeployStatus::Complete {
                // Another replica's worker already finalized this app.
                false
            } else if info.aux_phase_info.is_empty() {
                info.deploy_status = DeployStatus::Complete;
                true
            } else if is_app_installation_complete_on_all_replicas(&info.aux_phase_info) {
                // All replicas done: fold aux state back into the main
                // record.
                info.phase_info = PhaseInfo {
                    phase: Phase::Install,
                    status: PhaseStatus::InstallComplete,
                    retry_count: 0,
                };
                info.deploy_status = DeployStatus::Complete;
                true
            } else {
                false
            }
        };

        if cleanup {
            self.delete_app_pkg_from_operator(worker.app_src_name(), &worker.app_deploy_info)
                .await;
        }
    }

    /// Remove a staged package from the operator volume and give its
    /// bytes back to the disk budget.
    pub(crate) async fn delete_app_pkg_from_operator(
        &self,
        app_src: &str,
        handle: &DeployInfoHandle,
    ) {
        let Ok(scope) = self.afw_config.scope_for_app_source(app_src) else {
            return;
        };
        let (app_name, pkg_name, size) = {
            let info = lock_info(handle);
            (info.app_name.clone(), info.package_file_name(), info.size)
        };
        let path = self.local_store.app_pkg_path(&self.cr, scope, app_src, &pkg_name);

        match self.local_store.delete_app_pkg(&path).await {
            Ok(()) => {
                self.disk.release(size);
                self.tx.emit(Event::AppPkgDeleted {
                    app_name,
                    path: path.display().to_string(),
                });
            }
            Err(err) => {
                self.tx.emit(Event::Warning {
                    message: format!("failed to clean up app package: {err}"),
                    context: Some(app_name),
                });
            }
        }
    }

    /// The bundle push runs only on cluster-scoped kinds, once every
    /// cluster-scoped app is placed and all queues drained.
    #[must_use]
    pub fn need_to_run_cluster_scoped_playbook(&self) -> bool {
        self.cr.kind.is_cluster_scoped()
            && self
                .context
                .has_apps_with_scope(&self.afw_config, Scope::Cluster)
            && matches!(
                self.context.bundle_push_stage(),
                BundlePushStage::Pending | BundlePushStage::InProgress
            )
            && self.is_pipeline_empty()
            && self.context.all_apps_in_scope_satisfy(
                &self.afw_config,
                Scope::Cluster,
                |info| info.phase_info.status == PhaseStatus::InstallComplete,
            )
    }

    /// One playbook step per scheduling tick. Apply failures burn bundle
    /// push attempts; exhausting them parks the tracker in `Error` for
    /// the reconciler to surface.
    pub(crate) async fn run_cluster_scoped_playbook(&self) {
        let pod = self.cr.pod_name(0);
        let client = (self.pod_exec_factory)(&pod);
        let Some(playbook) = cluster_scope_playbook_context(
            self.cr.kind,
            &self.cr.name,
            Arc::clone(&self.context),
            client,
            self.tx.clone(),
        ) else {
            return;
        };

        if self.context.bundle_push_stage() == BundlePushStage::Pending {
            self.tx.emit(Event::BundlePushStarted {
                cr_name: self.cr.name.clone(),
                pod,
            });
        }

        match playbook.run_playbook().await {
            Ok(()) => {
                self.bundle_push_attempts.store(0, Ordering::Release);
                if self.context.bundle_push_stage() == BundlePushStage::Complete {
                    self.finalize_cluster_scoped_apps().await;
                }
            }
            Err(err) => {
                let attempts = self.bundle_push_attempts.fetch_add(1, Ordering::AcqRel) + 1;
                self.context
                    .with_bundle_push(|tracker| tracker.message = err.to_string());
                if attempts > MAX_PHASE_RETRY_COUNT {
                    let _ = self
                        .context
                        .with_bundle_push(|tracker| tracker.advance(BundlePushStage::Error));
                    self.tx.emit(Event::BundlePushFailed {
                        cr_name: self.cr.name.clone(),
                        error: err.to_string(),
                    });
                } else {
                    self.tx.emit(Event::Warning {
                        message: format!("bundle push attempt {attempts} failed: {err}"),
                        context: Some(self.cr.name.clone()),
                    });
                }
            }
        }
    }

    /// The push reached every member: complete the cluster-scoped apps
    /// and drop their staged packages.
    async fn finalize_cluster_scoped_apps(&self) {
        let cluster_apps: Vec<(String, DeployInfoHandle)> = self
            .context
            .iter_apps()
            .filter(|(src, _)| {
                self.afw_config
                    .scope_for_app_source(src)
                    .is_ok_and(|scope| scope == Scope::Cluster)
            })
            .map(|(src, handle)| (src.to_string(), Arc::clone(handle)))
            .collect();

        for (src, handle) in cluster_apps {
            lock_info(&handle).deploy_status = DeployStatus::Complete;
            self.delete_app_pkg_from_operator(&src, &handle).await;
        }

        self.tx.emit(Event::BundlePushCompleted {
            cr_name: self.cr.name.clone(),
        });
    }
}
