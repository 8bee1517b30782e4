//! Custom resource identities and pod name derivation
//!
//! The pipeline never talks to the Kubernetes API directly; the
//! reconciler hands it a [`CrInfo`] and a [`StsSnapshot`] and the pipeline
//! derives target pod names from them.

use appfw_errors::{Error, PodExecError};
use serde::{Deserialize, Serialize};

/// Custom resource kinds whose statefulsets receive app packages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrKind {
    ClusterManager,
    Standalone,
    LicenseManager,
    SearchHeadCluster,
    MonitoringConsole,
}

impl CrKind {
    /// Instance suffix used in statefulset and pod names.
    ///
    /// For a search head cluster the app framework targets the deployer,
    /// not the search head members.
    #[must_use]
    pub fn instance_suffix(self) -> &'static str {
        match self {
            CrKind::ClusterManager => "cluster-manager",
            CrKind::Standalone => "standalone",
            CrKind::LicenseManager => "license-manager",
            CrKind::SearchHeadCluster => "deployer",
            CrKind::MonitoringConsole => "monitoring-console",
        }
    }

    /// Cluster-scoped kinds distribute apps through a bundle push instead
    /// of a per-pod install.
    #[must_use]
    pub fn is_cluster_scoped(self) -> bool {
        matches!(self, CrKind::ClusterManager | CrKind::SearchHeadCluster)
    }
}

impl std::fmt::Display for CrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            CrKind::ClusterManager => "ClusterManager",
            CrKind::Standalone => "Standalone",
            CrKind::LicenseManager => "LicenseManager",
            CrKind::SearchHeadCluster => "SearchHeadCluster",
            CrKind::MonitoringConsole => "MonitoringConsole",
        };
        f.write_str(kind)
    }
}

/// Identity of the custom resource a pipeline run serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrInfo {
    pub kind: CrKind,
    pub name: String,
    pub namespace: String,
}

impl CrInfo {
    #[must_use]
    pub fn new(kind: CrKind, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Pod name for the given statefulset ordinal, e.g.
    /// `splunk-stack1-cluster-manager-0`.
    #[must_use]
    pub fn pod_name(&self, ordinal: u32) -> String {
        format!("splunk-{}-{}-{ordinal}", self.name, self.kind.instance_suffix())
    }
}

/// Statefulset snapshot carried by pipeline workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StsSnapshot {
    pub name: String,
    pub replicas: u32,
}

impl StsSnapshot {
    #[must_use]
    pub fn new(name: impl Into<String>, replicas: u32) -> Self {
        Self {
            name: name.into(),
            replicas,
        }
    }
}

/// Extract the statefulset ordinal from a pod name.
///
/// # Errors
///
/// Returns an error if the name does not follow the
/// `splunk-{cr}-{suffix}-{ordinal}` convention.
pub fn ordinal_from_pod_name(pod_name: &str) -> Result<u32, Error> {
    let invalid = || {
        Error::PodExec(PodExecError::InvalidPodName {
            pod: pod_name.to_string(),
        })
    };

    if !pod_name.starts_with("splunk-") {
        return Err(invalid());
    }

    pod_name
        .rsplit_once('-')
        .and_then(|(_, ordinal)| ordinal.parse::<u32>().ok())
        .ok_or_else(invalid)
}
