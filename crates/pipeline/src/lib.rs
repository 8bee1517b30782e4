#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Three-stage app install pipeline
//!
//! Apps flow through Download, PodCopy and Install phases. Each phase
//! keeps a FIFO queue of workers, a bounded message channel feeding its
//! worker pool, and a manager task that schedules eligible workers every
//! tick. A single termination signal drains all three managers.
//!
//! ```text
//! remote bucket --download--> operator volume --pod copy--> target pods
//!                                                             |
//!                                          local scope: per-pod install
//!                                          cluster scope: bundle push
//! ```
//!
//! Status flows through the shared deployment context; the reconciler
//! persists the [`PipelineSummary`] snapshot back into the CR status.

mod context;
mod download;
mod install;
mod phase;
mod pipeline;
mod playbook;
mod podcopy;
mod term;
#[cfg(test)]
mod testutil;
mod worker;

pub use context::{DeployInfoHandle, PipelineContext};
pub use install::{
    get_install_slot_for_pod, is_app_installation_complete_on_all_replicas,
    MAX_PARALLEL_INSTALLS_PER_POD,
};
pub use phase::PipelinePhase;
pub use pipeline::{
    check_if_bundle_push_is_done, AppInstallPipeline, PipelineEnv, PipelineSummary,
    PodExecFactory,
};
pub use playbook::{
    cluster_scope_playbook_context, IdxcPlaybookContext, PlaybookContext, ShcPlaybookContext,
    IDXC_BUNDLE_PUSH_COMPLETE_MARKER, SHC_BUNDLE_PUSH_COMPLETE_MSG,
};
pub use term::TerminationSignal;
pub use worker::PipelineWorker;

use std::time::Duration;

/// Scheduling cadence of the three phase managers.
pub(crate) const PHASE_SCHEDULER_TICK: Duration = Duration::from_millis(200);

/// Capacity of each phase's worker hand-off channel.
pub(crate) const PHASE_CHANNEL_CAPACITY: usize = 32;

/// Pod copy worker pool size.
pub(crate) const MAX_POD_COPY_WORKERS: usize = 5;

/// Pod-side staging directory that receives copied app packages.
pub(crate) const POD_STAGING_DIR: &str = "/init-apps";
