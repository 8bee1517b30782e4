//! Cluster bundle push playbooks
//!
//! Per-pod installs cannot distribute cluster-scoped apps; the cluster
//! manager (indexer clusters) or the deployer (search head clusters)
//! pushes the staged bundle to the members out of band. Each CR kind has
//! its own playbook; callers depend only on the capability set.

use crate::context::PipelineContext;
use appfw_errors::{Error, PlaybookError, Result};
use appfw_events::{Event, EventSender, EventSenderExt};
use appfw_podexec::PodExecClient;
use appfw_types::{BundlePushStage, CrKind};
use async_trait::async_trait;
use std::sync::Arc;

/// Marker in `show cluster-bundle-status` output once the indexer
/// cluster has finished applying the bundle.
pub const IDXC_BUNDLE_PUSH_COMPLETE_MARKER: &str = "cluster_status=None";

/// Message the deployer prints once the bundle reached all search head
/// cluster members.
pub const SHC_BUNDLE_PUSH_COMPLETE_MSG: &str =
    "Bundle has been pushed successfully onto the search head cluster members";

const IDXC_APPLY_BUNDLE_CMD: &str = "/opt/splunk/bin/splunk apply cluster-bundle --answer-yes -auth admin:$(cat /mnt/splunk-secrets/password)";

const IDXC_SHOW_BUNDLE_STATUS_CMD: &str = "/opt/splunk/bin/splunk show cluster-bundle-status -auth admin:$(cat /mnt/splunk-secrets/password)";

const SHC_APPLY_BUNDLE_CMD: &str = "/opt/splunk/bin/splunk apply shcluster-bundle --answer-yes -target https://localhost:8089 -auth admin:$(cat /mnt/splunk-secrets/password) > /opt/splunk/var/run/splunk/shc_bundle_push_status 2>&1";

const SHC_SHOW_BUNDLE_STATUS_CMD: &str = "cat /opt/splunk/var/run/splunk/shc_bundle_push_status";

/// Capability set of a cluster-scope playbook.
#[async_trait]
pub trait PlaybookContext: Send + Sync {
    /// Advance the bundle push by one step: issue the apply from
    /// `Pending`, poll for completion from `InProgress`.
    ///
    /// # Errors
    ///
    /// A rejected apply is an error the manager retries; a call with the
    /// tracker already `Complete` is an invariant violation.
    async fn run_playbook(&self) -> Result<()>;

    /// Poll the target pod for bundle push completion.
    async fn is_bundle_push_complete(&self) -> bool;

    /// The manager or deployer pod this playbook drives.
    fn target_pod_name(&self) -> &str;
}

/// Build the playbook for a CR kind; `None` for kinds without a cluster
/// bundle.
#[must_use]
pub fn cluster_scope_playbook_context(
    kind: CrKind,
    cr_name: &str,
    context: Arc<PipelineContext>,
    client: Arc<dyn PodExecClient>,
    tx: EventSender,
) -> Option<Box<dyn PlaybookContext>> {
    let target_pod_name = client.pod_name().to_string();
    match kind {
        CrKind::ClusterManager => Some(Box::new(IdxcPlaybookContext {
            cr_name: cr_name.to_string(),
            context,
            client,
            target_pod_name,
            tx,
        })),
        CrKind::SearchHeadCluster => Some(Box::new(ShcPlaybookContext {
            cr_name: cr_name.to_string(),
            context,
            client,
            target_pod_name,
            tx,
        })),
        _ => None,
    }
}

fn advance_tracker(
    context: &PipelineContext,
    tx: &EventSender,
    cr_name: &str,
    to: BundlePushStage,
) -> Result<()> {
    context.with_bundle_push(|tracker| tracker.advance(to))?;
    tx.emit(Event::BundlePushStageChanged {
        cr_name: cr_name.to_string(),
        stage: to,
    });
    Ok(())
}

/// Bundle push driver for indexer clusters (ClusterManager CRs).
pub struct IdxcPlaybookContext {
    cr_name: String,
    context: Arc<PipelineContext>,
    client: Arc<dyn PodExecClient>,
    target_pod_name: String,
    tx: EventSender,
}

#[async_trait]
impl PlaybookContext for IdxcPlaybookContext {
    async fn run_playbook(&self) -> Result<()> {
        match self.context.bundle_push_stage() {
            BundlePushStage::Pending | BundlePushStage::Error => {
                let output = self.client.run_pod_exec_command(IDXC_APPLY_BUNDLE_CMD).await?;
                // The apply command acknowledges on stderr.
                if output.stderr.contains("OK") {
                    advance_tracker(
                        &self.context,
                        &self.tx,
                        &self.cr_name,
                        BundlePushStage::InProgress,
                    )
                } else {
                    Err(Error::Playbook(PlaybookError::ApplyFailed {
                        pod: self.target_pod_name.clone(),
                        stderr: output.stderr,
                    }))
                }
            }
            BundlePushStage::InProgress => {
                if self.is_bundle_push_complete().await {
                    advance_tracker(
                        &self.context,
                        &self.tx,
                        &self.cr_name,
                        BundlePushStage::Complete,
                    )?;
                }
                Ok(())
            }
            BundlePushStage::Complete => Err(PlaybookError::AlreadyComplete.into()),
        }
    }

    async fn is_bundle_push_complete(&self) -> bool {
        match self.client.run_pod_exec_command(IDXC_SHOW_BUNDLE_STATUS_CMD).await {
            Ok(output) => {
                output.stderr.trim().is_empty()
                    && output.stdout.contains(IDXC_BUNDLE_PUSH_COMPLETE_MARKER)
            }
            Err(_) => false,
        }
    }

    fn target_pod_name(&self) -> &str {
        &self.target_pod_name
    }
}

/// Bundle push driver for search head clusters; runs on the deployer.
pub struct ShcPlaybookContext {
    cr_name: String,
    context: Arc<PipelineContext>,
    client: Arc<dyn PodExecClient>,
    target_pod_name: String,
    tx: EventSender,
}

#[async_trait]
impl PlaybookContext for ShcPlaybookContext {
    async fn run_playbook(&self) -> Result<()> {
        match self.context.bundle_push_stage() {
            BundlePushStage::Pending | BundlePushStage::Error => {
                let output = self.client.run_pod_exec_command(SHC_APPLY_BUNDLE_CMD).await?;
                if output.stderr.trim().is_empty() {
                    advance_tracker(
                        &self.context,
                        &self.tx,
                        &self.cr_name,
                        BundlePushStage::InProgress,
                    )
                } else {
                    Err(Error::Playbook(PlaybookError::ApplyFailed {
                        pod: self.target_pod_name.clone(),
                        stderr: output.stderr,
                    }))
                }
            }
            BundlePushStage::InProgress => {
                if self.is_bundle_push_complete().await {
                    advance_tracker(
                        &self.context,
                        &self.tx,
                        &self.cr_name,
                        BundlePushStage::Complete,
                    )?;
                }
                Ok(())
            }
            BundlePushStage::Complete => Err(PlaybookError::AlreadyComplete.into()),
        }
    }

    async fn is_bundle_push_complete(&self) -> bool {
        match self.client.run_pod_exec_command(SHC_SHOW_BUNDLE_STATUS_CMD).await {
            Ok(output) => {
                output.stderr.trim().is_empty()
                    && output.stdout.contains(SHC_BUNDLE_PUSH_COMPLETE_MSG)
            }
            Err(_) => false,
        }
    }

    fn target_pod_name(&self) -> &str {
        &self.target_pod_name
    }
}
