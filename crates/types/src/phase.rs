//! Pipeline phases and per-phase lifecycle state

use serde::{Deserialize, Serialize};

/// Retry budget per phase. A worker whose retry count exceeds this is
/// evicted from its queue on the next scheduling pass.
pub const MAX_PHASE_RETRY_COUNT: u32 = 3;

/// The three pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Download,
    PodCopy,
    Install,
}

impl Phase {
    /// The phase a worker transitions into once this one completes.
    #[must_use]
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Download => Some(Phase::PodCopy),
            Phase::PodCopy => Some(Phase::Install),
            Phase::Install => None,
        }
    }

    #[must_use]
    pub fn pending_status(self) -> PhaseStatus {
        match self {
            Phase::Download => PhaseStatus::DownloadPending,
            Phase::PodCopy => PhaseStatus::PodCopyPending,
            Phase::Install => PhaseStatus::InstallPending,
        }
    }

    #[must_use]
    pub fn in_progress_status(self) -> PhaseStatus {
        match self {
            Phase::Download => PhaseStatus::DownloadInProgress,
            Phase::PodCopy => PhaseStatus::PodCopyInProgress,
            Phase::Install => PhaseStatus::InstallInProgress,
        }
    }

    #[must_use]
    pub fn complete_status(self) -> PhaseStatus {
        match self {
            Phase::Download => PhaseStatus::DownloadComplete,
            Phase::PodCopy => PhaseStatus::PodCopyComplete,
            Phase::Install => PhaseStatus::InstallComplete,
        }
    }

    #[must_use]
    pub fn error_status(self) -> PhaseStatus {
        match self {
            Phase::Download => PhaseStatus::DownloadError,
            Phase::PodCopy => PhaseStatus::PodCopyError,
            Phase::Install => PhaseStatus::InstallError,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Download => f.write_str("download"),
            Phase::PodCopy => f.write_str("podCopy"),
            Phase::Install => f.write_str("install"),
        }
    }
}

/// Status values across all three phase state spaces.
///
/// `AppPkgMissingFromOperator` belongs to the pod copy space: the staged
/// package vanished from the operator volume between download and copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PhaseStatus {
    DownloadPending,
    DownloadInProgress,
    DownloadComplete,
    DownloadError,
    PodCopyPending,
    PodCopyInProgress,
    PodCopyComplete,
    PodCopyError,
    AppPkgMissingFromOperator,
    InstallPending,
    InstallInProgress,
    InstallComplete,
    InstallError,
}

impl PhaseStatus {
    #[must_use]
    pub fn is_complete(self, phase: Phase) -> bool {
        self == phase.complete_status()
    }
}

/// Mutable lifecycle record for one app in one phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseInfo {
    pub phase: Phase,
    pub status: PhaseStatus,
    #[serde(default)]
    pub retry_count: u32,
}

impl PhaseInfo {
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            status: phase.pending_status(),
            retry_count: 0,
        }
    }

    /// Whether the retry budget for this phase is spent.
    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count > MAX_PHASE_RETRY_COUNT
    }

    /// Push the retry count past the budget so the next scheduling pass
    /// evicts the worker. Used for non-retryable failures.
    pub fn mark_terminal(&mut self) {
        self.retry_count = MAX_PHASE_RETRY_COUNT + 1;
    }

    /// Record a failed attempt in this phase.
    pub fn record_failure(&mut self) {
        self.status = self.phase.error_status();
        self.retry_count += 1;
    }

    /// Move this record to the given phase, resetting status and budget.
    pub fn reset_for(&mut self, phase: Phase) {
        self.phase = phase;
        self.status = phase.pending_status();
        self.retry_count = 0;
    }
}

impl Default for PhaseInfo {
    fn default() -> Self {
        Self::new(Phase::Download)
    }
}
