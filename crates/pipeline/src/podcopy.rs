//! Pod copy phase: operator volume into target pods

use crate::pipeline::{AppInstallPipeline, TickAction};
use crate::worker::PipelineWorker;
use crate::{MAX_POD_COPY_WORKERS, PHASE_SCHEDULER_TICK, POD_STAGING_DIR};
use appfw_config::Scope;
use appfw_errors::{Error, PodExecError, Result, StorageError};
use appfw_events::{Event, EventSenderExt};
use appfw_types::{CrKind, Phase, PhaseStatus};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Where cluster-scoped apps are unpacked on the cluster manager.
const IDXC_CLUSTER_APPS_DIR: &str = "/opt/splunk/etc/master-apps";

/// Where cluster-scoped apps are unpacked on the deployer.
const SHC_CLUSTER_APPS_DIR: &str = "/opt/splunk/etc/shcluster/apps";

impl AppInstallPipeline {
    /// Pod copy phase manager: same scheduling shape as the download
    /// manager, with completed workers moving to install.
    pub(crate) async fn pod_copy_phase_manager(self: Arc<Self>) {
        let handler = tokio::spawn(Arc::clone(&self).pod_copy_worker_handler());

        let mut tick = tokio::time::interval(PHASE_SCHEDULER_TICK);
        loop {
            tokio::select! {
                () = self.sig_term.cancelled() => break,
                _ = tick.tick() => {
                    for worker in self.phase(Phase::PodCopy).workers() {
                        match Self::tick_action(&worker, Phase::PodCopy) {
                            TickAction::Evict => self.evict_worker(&worker, Phase::PodCopy),
                            TickAction::Complete => {
                                self.transition_worker_phase(&worker, Phase::PodCopy, Phase::Install);
                            }
                            TickAction::Dispatch => {
                                worker.set_active(true);
                                if !self.phase(Phase::PodCopy).try_send_worker(Arc::clone(&worker)) {
                                    worker.set_active(false);
                                }
                            }
                            TickAction::Skip => {}
                        }
                    }
                }
            }
        }

        let phase = self.phase(Phase::PodCopy);
        phase.mark_queued_inactive();
        phase.close_channel();
        let _ = handler.await;
    }

    /// Drains the pod copy channel FIFO. Nil sentinels are ignored;
    /// channel close terminates the handler once in-flight copies finish.
    pub(crate) async fn pod_copy_worker_handler(self: Arc<Self>) {
        let Some(mut rx) = self.phase(Phase::PodCopy).take_receiver() else {
            return;
        };

        let slots = Arc::new(Semaphore::new(MAX_POD_COPY_WORKERS));
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                () = self.sig_term.cancelled() => break,
                msg = rx.recv() => match msg {
                    Some(Some(worker)) => {
                        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                            break;
                        };
                        let pipeline = Arc::clone(&self);
                        in_flight.spawn(async move {
                            pipeline.run_pod_copy_worker(worker).await;
                            drop(permit);
                        });
                    }
                    Some(None) => {}
                    None => break,
                }
            }
        }

        while in_flight.join_next().await.is_some() {}
    }

    /// One pod copy attempt for one (app, pod) pairing.
    pub(crate) async fn run_pod_copy_worker(&self, worker: Arc<PipelineWorker>) {
        let app_name = worker.app_name();
        let _ = worker.with_phase_info(Phase::PodCopy, |info| {
            info.status = PhaseStatus::PodCopyInProgress;
        });

        match self.copy_app_pkg_to_pod(&worker).await {
            Ok(()) => {
                let _ = worker.with_phase_info(Phase::PodCopy, |info| {
                    info.status = PhaseStatus::PodCopyComplete;
                });
                self.tx.emit(Event::PodCopyCompleted {
                    app_name,
                    pod: worker.target_pod_name().to_string(),
                });
            }
            Err(Error::Storage(StorageError::AppPkgMissing { path })) => {
                // The staged file vanished between download and copy; the
                // next pass re-downloads once the worker cycles back.
                let retry_count = worker
                    .with_phase_info(Phase::PodCopy, |info| {
                        info.status = PhaseStatus::AppPkgMissingFromOperator;
                        info.retry_count += 1;
                        info.retry_count
                    })
                    .unwrap_or(0);
                self.tx.emit(Event::PodCopyFailed {
                    app_name,
                    pod: worker.target_pod_name().to_string(),
                    error: format!("app package missing from operator: {path}"),
                    retry_count,
                });
            }
            Err(err) => {
                let retry_count = worker
                    .with_phase_info(Phase::PodCopy, |info| {
                        info.record_failure();
                        if !err.is_retryable() {
                            info.mark_terminal();
                        }
                        info.retry_count
                    })
                    .unwrap_or(0);
                self.tx.emit(Event::PodCopyFailed {
                    app_name,
                    pod: worker.target_pod_name().to_string(),
                    error: err.to_string(),
                    retry_count,
                });
            }
        }

        worker.set_active(false);
    }

    async fn copy_app_pkg_to_pod(&self, worker: &Arc<PipelineWorker>) -> Result<()> {
        let scope = self.afw_config.scope_for_app_source(worker.app_src_name())?;
        let (app_name, pkg_name) = {
            let info = crate::context::lock_info(&worker.app_deploy_info);
            (info.app_name.clone(), info.package_file_name())
        };

        let local_path =
            self.local_store
                .app_pkg_path(&self.cr, scope, worker.app_src_name(), &pkg_name);
        let staged = tokio::fs::try_exists(&local_path).await.unwrap_or(false);
        if !staged {
            return Err(StorageError::AppPkgMissing {
                path: local_path.display().to_string(),
            }
            .into());
        }

        self.tx.emit(Event::PodCopyStarted {
            app_name: app_name.clone(),
            pod: worker.target_pod_name().to_string(),
        });

        let client = (self.pod_exec_factory)(worker.target_pod_name());
        let pod_dir = format!("{POD_STAGING_DIR}/{}", worker.app_src_name());
        let cmd = format!(
            "mkdir -p {pod_dir} && cp {} {pod_dir}/{app_name}",
            local_path.display()
        );
        let output = client.run_pod_exec_command(&cmd).await?;
        if !output.success() {
            return Err(PodExecError::CommandFailed {
                pod: worker.target_pod_name().to_string(),
                status: output.exit_code,
                stderr: output.stderr,
            }
            .into());
        }

        if scope == Scope::Cluster {
            self.extract_cluster_scoped_app_on_pod(worker, scope, &pod_dir, &app_name)
                .await?;
        }

        Ok(())
    }

    /// Unpack a cluster-scoped app into the manager/deployer staging
    /// directory so the bundle push picks it up. A no-op for local scope
    /// and for CR kinds without a cluster bundle.
    pub(crate) async fn extract_cluster_scoped_app_on_pod(
        &self,
        worker: &Arc<PipelineWorker>,
        scope: Scope,
        pod_dir: &str,
        app_name: &str,
    ) -> Result<()> {
        if scope != Scope::Cluster {
            return Ok(());
        }
        let target_dir = match worker.cr.kind {
            CrKind::ClusterManager => IDXC_CLUSTER_APPS_DIR,
            CrKind::SearchHeadCluster => SHC_CLUSTER_APPS_DIR,
            _ => return Ok(()),
        };

        let client = (self.pod_exec_factory)(worker.target_pod_name());
        let cmd = format!("tar -C {target_dir} -zxf {pod_dir}/{app_name}");
        let output = client.run_pod_exec_command(&cmd).await?;
        if !output.success() {
            return Err(PodExecError::CommandFailed {
                pod: worker.target_pod_name().to_string(),
                status: output.exit_code,
                stderr: output.stderr,
            }
            .into());
        }
        Ok(())
    }
}
