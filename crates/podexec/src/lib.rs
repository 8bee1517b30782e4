#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Pod exec client contract
//!
//! Running a shell command inside a target pod is the pipeline's only
//! channel into the cluster: pod copies, local installs, and bundle push
//! playbooks all go through it. The Kubernetes streaming transport lives
//! in the operator's collaborator layer; this crate owns the contract and
//! a scripted mock.
//!
//! A non-zero exit status is still an `Ok` result: playbooks read stdout
//! and stderr content to decide state transitions, so only transport
//! failures surface as errors.

pub mod mock;

use appfw_errors::Error;
use async_trait::async_trait;

/// Captured output of one exec invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecOutput {
    #[must_use]
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run shell commands inside one pod. The target pod is bound at
/// construction.
#[async_trait]
pub trait PodExecClient: Send + Sync {
    /// Execute `cmd` with `sh -c` semantics inside the pod.
    ///
    /// # Errors
    ///
    /// Returns an error only for transport failures (pod gone, stream
    /// broken). Command failures are reported through
    /// [`ExecOutput::exit_code`].
    async fn run_pod_exec_command(&self, cmd: &str) -> Result<ExecOutput, Error>;

    /// The pod this client is bound to.
    fn pod_name(&self) -> &str;
}
