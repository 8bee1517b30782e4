//! Scripted pod exec client for tests

use crate::{ExecOutput, PodExecClient};
use appfw_errors::{Error, PodExecError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Mock [`PodExecClient`] with a FIFO of scripted responses.
///
/// When the script runs dry the mock keeps returning the last scripted
/// response, which matches how the playbook tests poll a stable remote
/// state.
#[derive(Debug)]
pub struct MockPodExecClient {
    pod_name: String,
    responses: Mutex<VecDeque<Result<ExecOutput, PodExecError>>>,
    last: Mutex<Option<ExecOutput>>,
    commands: Mutex<Vec<String>>,
}

impl MockPodExecClient {
    #[must_use]
    pub fn new(pod_name: impl Into<String>) -> Self {
        Self {
            pod_name: pod_name.into(),
            responses: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Queue one successful response.
    pub fn push_output(&self, stdout: &str, stderr: &str, exit_code: i32) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(ExecOutput::new(stdout, stderr, exit_code)));
    }

    /// Queue one transport failure.
    pub fn push_error(&self, err: PodExecError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    /// Commands the mock has executed, oldest first.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl PodExecClient for MockPodExecClient {
    async fn run_pod_exec_command(&self, cmd: &str) -> Result<ExecOutput, Error> {
        self.commands.lock().unwrap().push(cmd.to_string());

        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return match response {
                Ok(output) => {
                    *self.last.lock().unwrap() = Some(output.clone());
                    Ok(output)
                }
                Err(err) => Err(err.into()),
            };
        }

        self.last.lock().unwrap().clone().map_or_else(
            || {
                Err(Error::PodExec(PodExecError::StreamFailed {
                    pod: self.pod_name.clone(),
                    message: "no scripted response".to_string(),
                }))
            },
            Ok,
        )
    }

    fn pod_name(&self) -> &str {
        &self.pod_name
    }
}
