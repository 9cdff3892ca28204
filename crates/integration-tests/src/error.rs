//! Error taxonomy of the harness

use std::convert::Infallible;
use std::time::Duration;

use pmm_common::PollError;
use thiserror::Error;

use crate::remote::RemoteError;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Remote channel or cloud API unreachable
    #[error("Transport error: {0}")]
    Transport(String),

    /// A single bounded operation ran out of time
    #[error("{operation} timed out after {timeout:?}")]
    Timeout { operation: String, timeout: Duration },

    /// A polling loop ran out of time
    #[error("{operation} did not complete within {timeout:?} ({attempts} attempts, {elapsed:?} elapsed)")]
    DeadlineExceeded {
        operation: String,
        timeout: Duration,
        elapsed: Duration,
        attempts: u32,
    },

    /// Remote installation step did not report completion
    #[error("Setup failed: {message}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}")]
    Setup {
        message: String,
        stdout: String,
        stderr: String,
    },

    /// Remote configuration script exited non-zero
    #[error("Database configuration failed with exit code {exit_code}\n--- stderr ---\n{stderr}\n--- stdout ---\n{stdout}")]
    ConfigurationFailed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    /// PMM API call failed; registration failures carry the response body
    #[error("PMM API error: {0}")]
    Api(#[from] pmm_sdk::ApiError),

    /// A required upstream value could not be resolved
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Backup job {job_id} ended in state {state}\n{description}")]
    BackupFailed {
        job_id: String,
        state: String,
        description: String,
    },

    #[error("terraform {command} failed ({status})\n{stderr}")]
    Terraform {
        command: String,
        status: String,
        stderr: String,
    },

    /// One or more provider runs failed; the others still ran to completion
    #[error("{failed} of {total} scenario runs failed\n{summary}")]
    ScenarioRuns {
        failed: usize,
        total: usize,
        summary: String,
    },

    #[error("Terraform output `{0}` is missing or has an unexpected type")]
    MissingOutput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;

impl HarnessError {
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            HarnessError::Timeout { .. } | HarnessError::DeadlineExceeded { .. }
        )
    }
}

impl From<RemoteError> for HarnessError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Transport(message) => HarnessError::Transport(message),
            RemoteError::Timeout(timeout) => HarnessError::Timeout {
                operation: "remote command".to_string(),
                timeout,
            },
        }
    }
}

impl From<PollError<HarnessError>> for HarnessError {
    fn from(err: PollError<HarnessError>) -> Self {
        match err {
            PollError::DeadlineExceeded {
                operation,
                timeout,
                elapsed,
                attempts,
            } => HarnessError::DeadlineExceeded {
                operation,
                timeout,
                elapsed,
                attempts,
            },
            PollError::Aborted(inner) => inner,
        }
    }
}

impl From<PollError<Infallible>> for HarnessError {
    fn from(err: PollError<Infallible>) -> Self {
        err.widen::<HarnessError>().into()
    }
}
