//! App deployment records

use crate::phase::{Phase, PhaseInfo};
use serde::{Deserialize, Serialize};

/// Whether an app is still present in the remote repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepoState {
    Active,
    Inactive,
}

/// Coarse deployment progress surfaced in the CR status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeployStatus {
    Pending,
    InProgress,
    Complete,
}

/// One record per (app source, app file).
///
/// `object_hash` identifies the remote binary; a hash change retriggers
/// the full pipeline for the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDeploymentInfo {
    pub app_name: String,
    pub object_hash: String,
    #[serde(default)]
    pub size: u64,
    pub repo_state: RepoState,
    pub deploy_status: DeployStatus,
    pub phase_info: PhaseInfo,
    /// Per-replica phase state, populated only for scale-out standalones.
    /// When present it overrides `phase_info` for pod copy and install;
    /// the download phase always uses `phase_info`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aux_phase_info: Vec<PhaseInfo>,
}

impl AppDeploymentInfo {
    #[must_use]
    pub fn new(app_name: impl Into<String>, object_hash: impl Into<String>, size: u64) -> Self {
        Self {
            app_name: app_name.into(),
            object_hash: object_hash.into(),
            size,
            repo_state: RepoState::Active,
            deploy_status: DeployStatus::Pending,
            phase_info: PhaseInfo::new(Phase::Download),
            aux_phase_info: Vec::new(),
        }
    }

    /// The staged file name on the operator volume: `{appName}_{objectHash}`.
    #[must_use]
    pub fn package_file_name(&self) -> String {
        format!("{}_{}", self.app_name, self.object_hash.trim_matches('"'))
    }
}

/// Ordered deployment records for one app source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSrcDeployInfo {
    #[serde(default)]
    pub app_deploy_info_list: Vec<AppDeploymentInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseStatus;

    #[test]
    fn package_file_name_appends_hash() {
        let info = AppDeploymentInfo::new("app1.tgz", "abcd1111", 10);
        assert_eq!(info.package_file_name(), "app1.tgz_abcd1111");
    }

    #[test]
    fn package_file_name_strips_quoted_etag() {
        // Object store etags often arrive quoted.
        let info = AppDeploymentInfo::new("app1.tgz", "\"abcd1111\"", 10);
        assert_eq!(info.package_file_name(), "app1.tgz_abcd1111");
    }

    #[test]
    fn new_record_starts_in_download_pending() {
        let info = AppDeploymentInfo::new("app1.tgz", "abcd1111", 10);
        assert_eq!(info.deploy_status, DeployStatus::Pending);
        assert_eq!(info.phase_info.phase, Phase::Download);
        assert_eq!(info.phase_info.status, PhaseStatus::DownloadPending);
        assert!(info.aux_phase_info.is_empty());
    }

    #[test]
    fn serialization_uses_camel_case() {
        let info = AppDeploymentInfo::new("app1.tgz", "abcd1111", 10);
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"appName\""));
        assert!(json.contains("\"objectHash\""));
        assert!(json.contains("\"phaseInfo\""));
        // Empty aux phase info stays out of the CR status.
        assert!(!json.contains("auxPhaseInfo"));
    }
}
