//! Download phase: remote bucket to operator volume

use crate::context::lock_info;
use crate::pipeline::{AppInstallPipeline, TickAction};
use crate::worker::PipelineWorker;
use crate::PHASE_SCHEDULER_TICK;
use appfw_errors::{ConfigError, Error, ObjectStoreError, Result, StorageError};
use appfw_events::{Event, EventSenderExt};
use appfw_types::{DeployStatus, Phase, PhaseStatus};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

enum DownloadOutcome {
    Downloaded(u64),
    AlreadyStaged,
}

impl AppInstallPipeline {
    /// Download phase manager. Schedules eligible workers into the
    /// download pool every tick, moves completed workers to pod copy, and
    /// drains cleanly on termination.
    pub(crate) async fn download_phase_manager(self: Arc<Self>) {
        let scheduler = tokio::spawn(Arc::clone(&self).download_worker_scheduler());

        let mut tick = tokio::time::interval(PHASE_SCHEDULER_TICK);
        loop {
            tokio::select! {
                () = self.sig_term.cancelled() => break,
                _ = tick.tick() => {
                    for worker in self.phase(Phase::Download).workers() {
                        match Self::tick_action(&worker, Phase::Download) {
                            TickAction::Evict => self.evict_worker(&worker, Phase::Download),
                            TickAction::Complete => {
                                self.transition_worker_phase(&worker, Phase::Download, Phase::PodCopy);
                            }
                            TickAction::Dispatch => {
                                worker.set_active(true);
                                if !self.phase(Phase::Download).try_send_worker(Arc::clone(&worker)) {
                                    // Channel full; retry next tick.
                                    worker.set_active(false);
                                }
                            }
                            TickAction::Skip => {}
                        }
                    }
                }
            }
        }

        let phase = self.phase(Phase::Download);
        phase.mark_queued_inactive();
        phase.close_channel();
        let _ = scheduler.await;
    }

    /// Consumes the download channel, launching one task per worker under
    /// the concurrency semaphore. In-flight downloads run to completion
    /// on termination.
    async fn download_worker_scheduler(self: Arc<Self>) {
        let Some(mut rx) = self.phase(Phase::Download).take_receiver() else {
            return;
        };

        let max_downloads = usize::try_from(self.context.max_concurrent_app_downloads())
            .unwrap_or(1)
            .max(1);
        let slots = Arc::new(Semaphore::new(max_downloads));
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
                            pipeline.run_download_worker(worker).await;
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

    /// One download attempt. Translates every failure into phase status;
    /// never propagates to the manager.
    pub(crate) async fn run_download_worker(&self, worker: Arc<PipelineWorker>) {
        let app_name = worker.app_name();
        let _ = worker.with_phase_info(Phase::Download, |info| {
            info.status = PhaseStatus::DownloadInProgress;
        });
        lock_info(&worker.app_deploy_info).deploy_status = DeployStatus::InProgress;

        match self.download_app_pkg(&worker).await {
            Ok(DownloadOutcome::AlreadyStaged) => {
                let _ = worker.with_phase_info(Phase::Download, |info| {
                    info.status = PhaseStatus::DownloadComplete;
                });
                self.tx.emit(Event::AppDownloadSkipped {
                    app_name,
                    app_src: worker.app_src_name().to_string(),
                });
            }
            Ok(DownloadOutcome::Downloaded(size)) => {
                let _ = worker.with_phase_info(Phase::Download, |info| {
                    info.status = PhaseStatus::DownloadComplete;
                });
                self.tx.emit(Event::AppDownloadCompleted {
                    app_name,
                    app_src: worker.app_src_name().to_string(),
                    size,
                });
            }
            Err(Error::Storage(StorageError::InsufficientDiskSpace { required, available })) => {
                // Not a failure: park the worker as Pending and let the
                // scheduler try again once capacity returns.
                let _ = worker.with_phase_info(Phase::Download, |info| {
                    info.status = PhaseStatus::DownloadPending;
                });
                self.tx.emit(Event::DiskSpaceExhausted {
                    app_name,
                    required,
                    available,
                });
            }
            Err(err) => {
                let retry_count = worker
                    .with_phase_info(Phase::Download, |info| {
                        info.record_failure();
                        if !err.is_retryable() {
                            info.mark_terminal();
                        }
                        info.retry_count
                    })
                    .unwrap_or(0);
                self.tx.emit(Event::AppDownloadFailed {
                    app_name,
                    app_src: worker.app_src_name().to_string(),
                    error: err.to_string(),
                    retry_count,
                });
            }
        }

        worker.set_active(false);
    }

    async fn download_app_pkg(&self, worker: &Arc<PipelineWorker>) -> Result<DownloadOutcome> {
        // Config must resolve before anything touches the store.
        let scope = self.afw_config.scope_for_app_source(worker.app_src_name())?;

        let (app_name, object_hash, size, pkg_name) = {
            let info = lock_info(&worker.app_deploy_info);
            (
                info.app_name.clone(),
                info.object_hash.clone(),
                info.size,
                info.package_file_name(),
            )
        };
        if object_hash.is_empty() {
            return Err(ObjectStoreError::EmptyObjectHash { app_name }.into());
        }

        let dest = self
            .local_store
            .app_pkg_path(&self.cr, scope, worker.app_src_name(), &pkg_name);
        if self.local_store.is_app_pkg_staged(&dest, size).await {
            return Ok(DownloadOutcome::AlreadyStaged);
        }

        let mgr = self.object_stores.get(worker.app_src_name()).ok_or_else(|| {
            Error::Config(ConfigError::AppSourceNotFound {
                app_src: worker.app_src_name().to_string(),
            })
        })?;

        self.tx.emit(Event::AppDownloadStarted {
            app_name: app_name.clone(),
            app_src: worker.app_src_name().to_string(),
            size,
        });

        self.local_store
            .ensure_app_pkg_dir(&self.cr, scope, worker.app_src_name())
            .await?;
        self.disk.reserve(size)?;

        let staged = async {
            let stream = mgr.fetch_app_package(&app_name).await?;
            self.local_store.stage_from_reader(stream, &dest).await
        }
        .await;

        match staged {
            Ok(written) => Ok(DownloadOutcome::Downloaded(written)),
            Err(err) => {
                self.disk.release(size);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_harness, handle};
    use appfw_config::Scope;
    use appfw_types::{AppDeploymentContext, CrInfo, CrKind, MAX_PHASE_RETRY_COUNT};

    fn standalone() -> CrInfo {
        CrInfo::new(CrKind::Standalone, "s1", "test")
    }

    #[tokio::test]
    async fn download_stages_package_and_completes() {
        let h = build_harness(standalone(), 1, Scope::Local, &AppDeploymentContext::default());
        h.objstore
            .put_object("adminAppsRepo/app1.tgz", "abcd1111", &[9u8; 10]);

        let info = handle("app1.tgz", "abcd1111", 10);
        h.pipeline
            .create_and_add_worker(Phase::Download, &info, "appSrc1", "splunk-s1-standalone-0");
        let worker = h.pipeline.phase(Phase::Download).workers()[0].clone();

        let initial_disk = h.disk.available();
        h.pipeline.run_download_worker(Arc::clone(&worker)).await;

        assert_eq!(
            lock_info(&info).phase_info.status,
            PhaseStatus::DownloadComplete
        );
        assert!(!worker.is_active());
        assert_eq!(h.disk.available(), initial_disk - 10);

        let dest = h.store.app_pkg_path(
            h.pipeline.cr(),
            Scope::Local,
            "appSrc1",
            "app1.tgz_abcd1111",
        );
        assert!(h.store.is_app_pkg_staged(&dest, 10).await);
    }

    #[tokio::test]
    async fn invalid_app_src_is_terminal_without_store_side_effects() {
        let h = build_harness(standalone(), 1, Scope::Local, &AppDeploymentContext::default());

        let info = handle("app1.tgz", "abcd1111", 10);
        h.pipeline.create_and_add_worker(
            Phase::Download,
            &info,
            "invalidAppSrcName",
            "splunk-s1-standalone-0",
        );
        let worker = h.pipeline.phase(Phase::Download).workers()[0].clone();

        let initial_disk = h.disk.available();
        h.pipeline.run_download_worker(worker).await;

        let guard = lock_info(&info);
        assert_eq!(guard.phase_info.status, PhaseStatus::DownloadError);
        assert!(guard.phase_info.retries_exhausted());
        drop(guard);
        assert_eq!(h.disk.available(), initial_disk);
    }

    #[tokio::test]
    async fn empty_object_hash_short_circuits() {
        let h = build_harness(standalone(), 1, Scope::Local, &AppDeploymentContext::default());

        let info = handle("app1.tgz", "", 10);
        h.pipeline
            .create_and_add_worker(Phase::Download, &info, "appSrc1", "splunk-s1-standalone-0");
        let worker = h.pipeline.phase(Phase::Download).workers()[0].clone();

        h.pipeline.run_download_worker(worker).await;

        let guard = lock_info(&info);
        assert_eq!(guard.phase_info.status, PhaseStatus::DownloadError);
        assert!(guard.phase_info.retries_exhausted());
    }

    #[tokio::test]
    async fn staged_package_is_not_refetched() {
        let h = build_harness(standalone(), 1, Scope::Local, &AppDeploymentContext::default());
        h.objstore
            .put_object("adminAppsRepo/app1.tgz", "abcd1111", &[9u8; 10]);

        let info = handle("app1.tgz", "abcd1111", 10);
        h.pipeline
            .create_and_add_worker(Phase::Download, &info, "appSrc1", "splunk-s1-standalone-0");
        let worker = h.pipeline.phase(Phase::Download).workers()[0].clone();

        h.pipeline.run_download_worker(Arc::clone(&worker)).await;
        let disk_after_first = h.disk.available();

        // Second pass: the staged file short-circuits the transfer even
        // with the remote unreachable.
        h.objstore.fail_gets(true);
        let _ = worker.with_phase_info(Phase::Download, |i| {
            i.status = PhaseStatus::DownloadPending;
        });
        h.pipeline.run_download_worker(Arc::clone(&worker)).await;

        assert_eq!(
            lock_info(&info).phase_info.status,
            PhaseStatus::DownloadComplete
        );
        assert_eq!(h.disk.available(), disk_after_first);
    }

    #[tokio::test]
    async fn transient_failure_burns_one_retry() {
        let h = build_harness(standalone(), 1, Scope::Local, &AppDeploymentContext::default());
        h.objstore.fail_gets(true);

        let info = handle("app1.tgz", "abcd1111", 10);
        h.pipeline
            .create_and_add_worker(Phase::Download, &info, "appSrc1", "splunk-s1-standalone-0");
        let worker = h.pipeline.phase(Phase::Download).workers()[0].clone();

        let initial_disk = h.disk.available();
        h.pipeline.run_download_worker(worker).await;

        let guard = lock_info(&info);
        assert_eq!(guard.phase_info.status, PhaseStatus::DownloadError);
        assert_eq!(guard.phase_info.retry_count, 1);
        assert!(guard.phase_info.retry_count <= MAX_PHASE_RETRY_COUNT);
        drop(guard);
        // The failed reservation was returned.
        assert_eq!(h.disk.available(), initial_disk);
    }

    #[tokio::test]
    async fn disk_pressure_parks_the_worker() {
        let h = build_harness(standalone(), 1, Scope::Local, &AppDeploymentContext::default());
        let oversized = h.disk.available() + 1;
        h.objstore
            .put_object("adminAppsRepo/huge.tgz", "ffff9999", b"x");

        let info = handle("huge.tgz", "ffff9999", oversized);
        h.pipeline
            .create_and_add_worker(Phase::Download, &info, "appSrc1", "splunk-s1-standalone-0");
        let worker = h.pipeline.phase(Phase::Download).workers()[0].clone();

        h.pipeline.run_download_worker(Arc::clone(&worker)).await;

        let guard = lock_info(&info);
        // Still Pending, no retry charged; the scheduler revisits it.
        assert_eq!(guard.phase_info.status, PhaseStatus::DownloadPending);
        assert_eq!(guard.phase_info.retry_count, 0);
        drop(guard);
        assert!(worker.is_eligible_for_run(Phase::Download));
    }
}
