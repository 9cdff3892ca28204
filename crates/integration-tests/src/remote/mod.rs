//! Remote command execution on the compute instance that can reach the database
//!
//! [`RemoteExecutor`] is the seam: production uses [`ssm::SsmExecutor`], tests use
//! scripted executors. Executors do not retry; callers decide.

pub mod ssm;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// The instance commands are sent to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTarget {
    pub instance_id: String,
    pub region: String,
    /// Role assumed to reach the instance's account
    pub role_arn: Option<String>,
}

/// Outcome of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote channel unavailable: {0}")]
    Transport(String),

    #[error("remote command did not finish within {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` through a shell on `target`.
    ///
    /// Commands may use `sudo`; the remote agent runs them as root.
    async fn execute(
        &self,
        target: &RemoteTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult, RemoteError>;
}

#[async_trait]
impl<T: RemoteExecutor + ?Sized> RemoteExecutor for Arc<T> {
    async fn execute(
        &self,
        target: &RemoteTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult, RemoteError> {
        (**self).execute(target, command, timeout).await
    }
}
