//! Persisted per-CR deployment context and the bundle push tracker

use crate::app::AppSrcDeployInfo;
use appfw_errors::{Error, PlaybookError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stage of the cluster-wide bundle push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BundlePushStage {
    Pending,
    InProgress,
    Complete,
    Error,
}

impl std::fmt::Display for BundlePushStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundlePushStage::Pending => f.write_str("pending"),
            BundlePushStage::InProgress => f.write_str("inProgress"),
            BundlePushStage::Complete => f.write_str("complete"),
            BundlePushStage::Error => f.write_str("error"),
        }
    }
}

/// Tracker for the out-of-band bundle push on cluster-scoped CRs.
///
/// The stage advances monotonically within one reconciliation; `Complete`
/// is terminal until a new generation of apps resets it to `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlePushTracker {
    pub bundle_push_stage: BundlePushStage,
    /// Last stderr recorded from a failed apply attempt.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Default for BundlePushTracker {
    fn default() -> Self {
        Self {
            bundle_push_stage: BundlePushStage::Pending,
            message: String::new(),
        }
    }
}

impl BundlePushTracker {
    /// Advance the tracker to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error for any transition out of `Complete` and for
    /// backwards transitions; invariant violations are never silent.
    pub fn advance(&mut self, to: BundlePushStage) -> Result<(), Error> {
        use BundlePushStage::{Complete, Error as StageError, InProgress, Pending};

        let valid = matches!(
            (self.bundle_push_stage, to),
            (Pending, InProgress | StageError)
                | (InProgress, Complete | StageError)
                | (StageError, Pending | InProgress)
        );

        if self.bundle_push_stage == Complete {
            return Err(PlaybookError::AlreadyComplete.into());
        }
        if !valid {
            return Err(PlaybookError::InvalidStage {
                stage: self.bundle_push_stage.to_string(),
            }
            .into());
        }

        self.bundle_push_stage = to;
        Ok(())
    }

    /// Re-arm a completed tracker when a new generation of cluster apps
    /// arrives. Only valid from `Complete`.
    pub fn reset_for_new_generation(&mut self) -> Result<(), Error> {
        if self.bundle_push_stage != BundlePushStage::Complete {
            return Err(PlaybookError::InvalidStage {
                stage: self.bundle_push_stage.to_string(),
            }
            .into());
        }
        self.bundle_push_stage = BundlePushStage::Pending;
        self.message.clear();
        Ok(())
    }
}

/// Persistent, per-CR state describing every app source, every app's
/// lifecycle phase, and the cluster bundle push tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDeploymentContext {
    #[serde(default)]
    pub apps_src_deploy_status: HashMap<String, AppSrcDeployInfo>,
    #[serde(default)]
    pub bundle_push_status: BundlePushTracker,
    /// Effective download concurrency for this reconciliation.
    #[serde(default)]
    pub apps_status_max_concurrent_app_downloads: u64,
    #[serde(default)]
    pub is_deployment_in_progress: bool,
    /// Epoch seconds of the last remote repository poll.
    #[serde(default)]
    pub last_app_info_check_time: i64,
}
