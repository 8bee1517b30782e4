#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for the app framework install pipeline
//!
//! This crate provides the persisted data model: app deployment records,
//! per-phase lifecycle state, the cluster bundle push tracker, and the
//! custom resource identities that drive target pod selection. Everything
//! here round-trips through the custom resource status JSON, so all types
//! carry serde derives with camelCase field names.

pub mod app;
pub mod context;
pub mod cr;
pub mod phase;

pub use app::{AppDeploymentInfo, AppSrcDeployInfo, DeployStatus, RepoState};
pub use context::{AppDeploymentContext, BundlePushStage, BundlePushTracker};
pub use cr::{ordinal_from_pod_name, CrInfo, CrKind, StsSnapshot};
pub use phase::{Phase, PhaseInfo, PhaseStatus, MAX_PHASE_RETRY_COUNT};
