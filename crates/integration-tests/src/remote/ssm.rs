//! Remote execution through AWS Systems Manager Run Command

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_ssm::error::DisplayErrorContext;
use aws_sdk_ssm::operation::get_command_invocation::GetCommandInvocationOutput;
use aws_sdk_ssm::types::CommandInvocationStatus;
use pmm_common::{poll_until, PollError, PollSettings, ProbeOutcome};
use tracing::{debug, info, warn};

use super::{CommandResult, RemoteError, RemoteExecutor, RemoteTarget};
use crate::aws::load_sdk_config;

const RUN_SHELL_SCRIPT: &str = "AWS-RunShellScript";

/// Extra time allowed on top of the command timeout for delivery to the agent
const DELIVERY_GRACE: Duration = Duration::from_secs(30);

const INVOCATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct SsmExecutor {
    client: aws_sdk_ssm::Client,
    poll_interval: Duration,
}

impl SsmExecutor {
    pub fn new(client: aws_sdk_ssm::Client) -> Self {
        Self {
            client,
            poll_interval: INVOCATION_POLL_INTERVAL,
        }
    }

    /// Build a client for the target's region and role
    pub async fn for_target(target: &RemoteTarget) -> Self {
        let config = load_sdk_config(&target.region, target.role_arn.as_deref()).await;
        Self::new(aws_sdk_ssm::Client::new(&config))
    }

    async fn fetch_invocation(&self, command_id: &str, instance_id: &str) -> InvocationPoll {
        match self
            .client
            .get_command_invocation()
            .command_id(command_id)
            .instance_id(instance_id)
            .send()
            .await
        {
            Ok(output) => InvocationPoll::Reported {
                status: output.status().cloned(),
                result: command_result(&output),
            },
            // The invocation is not visible for a moment after SendCommand
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_invocation_does_not_exist()) =>
            {
                InvocationPoll::NotVisible
            }
            Err(e) => InvocationPoll::Unavailable(format!(
                "GetCommandInvocation {command_id} on {instance_id}: {}",
                DisplayErrorContext(&e)
            )),
        }
    }
}

/// One `GetCommandInvocation` answer
#[derive(Debug, Clone)]
enum InvocationPoll {
    NotVisible,
    Unavailable(String),
    Reported {
        status: Option<CommandInvocationStatus>,
        result: CommandResult,
    },
}

fn invocation_outcome(
    poll: InvocationPoll,
    command_id: &str,
    timeout: Duration,
) -> ProbeOutcome<CommandResult, RemoteError> {
    let (status, result) = match poll {
        InvocationPoll::NotVisible => {
            debug!(command_id, "Invocation not visible yet");
            return ProbeOutcome::Pending;
        }
        InvocationPoll::Unavailable(message) => {
            warn!(command_id, error = %message, "Invocation status unavailable, retrying");
            return ProbeOutcome::Pending;
        }
        InvocationPoll::Reported { status, result } => (status, result),
    };

    match status {
        Some(CommandInvocationStatus::Success) | Some(CommandInvocationStatus::Failed) => {
            ProbeOutcome::Ready(result)
        }
        Some(CommandInvocationStatus::TimedOut) => {
            warn!(command_id, "SSM reported command timeout");
            ProbeOutcome::Abort(RemoteError::Timeout(timeout))
        }
        Some(CommandInvocationStatus::Cancelled) => ProbeOutcome::Abort(RemoteError::Transport(
            format!("command {command_id} was cancelled"),
        )),
        status => {
            debug!(command_id, status = ?status, "Command still running");
            ProbeOutcome::Pending
        }
    }
}

/// Poll `fetch` until the invocation settles. The wait covers `timeout` plus
/// delivery grace; running out of it is a command timeout.
async fn wait_for_invocation<F, Fut>(
    command_id: &str,
    timeout: Duration,
    poll_interval: Duration,
    mut fetch: F,
) -> Result<CommandResult, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = InvocationPoll>,
{
    let settings = PollSettings::new(timeout + DELIVERY_GRACE, poll_interval);
    poll_until("ssm command invocation", settings, || {
        let fetched = fetch();
        async move { invocation_outcome(fetched.await, command_id, timeout) }
    })
    .await
    .map_err(|e| match e {
        PollError::DeadlineExceeded { .. } => RemoteError::Timeout(timeout),
        PollError::Aborted(inner) => inner,
    })
}

fn command_result(output: &GetCommandInvocationOutput) -> CommandResult {
    CommandResult {
        exit_code: output.response_code(),
        stdout: output
            .standard_output_content()
            .unwrap_or_default()
            .to_string(),
        stderr: output
            .standard_error_content()
            .unwrap_or_default()
            .to_string(),
    }
}

#[async_trait]
impl RemoteExecutor for SsmExecutor {
    async fn execute(
        &self,
        target: &RemoteTarget,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandResult, RemoteError> {
        let timeout_secs = timeout.as_secs().max(1);

        let sent = self
            .client
            .send_command()
            .instance_ids(&target.instance_id)
            .document_name(RUN_SHELL_SCRIPT)
            .comment("pmm integration tests")
            .parameters("commands", vec![command.to_string()])
            .parameters("executionTimeout", vec![timeout_secs.to_string()])
            .send()
            .await
            .map_err(|e| {
                RemoteError::Transport(format!(
                    "SendCommand to {}: {}",
                    target.instance_id,
                    DisplayErrorContext(&e)
                ))
            })?;

        let command_id = sent
            .command()
            .and_then(|c| c.command_id())
            .ok_or_else(|| RemoteError::Transport("SendCommand returned no command id".into()))?
            .to_string();

        info!(
            instance_id = %target.instance_id,
            command_id = %command_id,
            timeout_secs,
            "Sent remote command"
        );

        let instance_id = target.instance_id.as_str();
        let result = wait_for_invocation(&command_id, timeout, self.poll_interval, || {
            self.fetch_invocation(&command_id, instance_id)
        })
        .await?;

        debug!(
            command_id = %command_id,
            exit_code = result.exit_code,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "Remote command finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn reported(status: CommandInvocationStatus, exit_code: i32, stdout: &str) -> InvocationPoll {
        InvocationPoll::Reported {
            status: Some(status),
            result: CommandResult {
                exit_code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        }
    }

    /// Hands out `answers` in order, repeating the last one
    fn scripted(answers: Vec<InvocationPoll>) -> (Mutex<Vec<InvocationPoll>>, Mutex<u32>) {
        (Mutex::new(answers.into_iter().rev().collect()), Mutex::new(0))
    }

    async fn next_answer(script: &(Mutex<Vec<InvocationPoll>>, Mutex<u32>)) -> InvocationPoll {
        *script.1.lock().unwrap() += 1;
        let mut answers = script.0.lock().unwrap();
        if answers.len() > 1 {
            answers.pop().unwrap()
        } else {
            answers[0].clone()
        }
    }

    #[test]
    fn test_failed_command_is_a_result() {
        let outcome = invocation_outcome(
            reported(CommandInvocationStatus::Failed, 2, "no pg_stat_statements"),
            "cmd-1",
            Duration::from_secs(60),
        );
        match outcome {
            ProbeOutcome::Ready(result) => {
                assert_eq!(result.exit_code, 2);
                assert!(!result.success());
            }
            other => panic!("expected a command result, got {other:?}"),
        }
    }

    #[test]
    fn test_terminal_statuses_abort() {
        let timeout = Duration::from_secs(60);
        assert!(matches!(
            invocation_outcome(reported(CommandInvocationStatus::TimedOut, -1, ""), "cmd-1", timeout),
            ProbeOutcome::Abort(RemoteError::Timeout(t)) if t == timeout
        ));
        assert!(matches!(
            invocation_outcome(reported(CommandInvocationStatus::Cancelled, -1, ""), "cmd-1", timeout),
            ProbeOutcome::Abort(RemoteError::Transport(_))
        ));
    }

    #[test]
    fn test_unsettled_answers_keep_waiting() {
        let timeout = Duration::from_secs(60);
        for poll in [
            InvocationPoll::NotVisible,
            InvocationPoll::Unavailable("ThrottlingException: Rate exceeded".into()),
            reported(CommandInvocationStatus::InProgress, -1, ""),
            reported(CommandInvocationStatus::Pending, -1, ""),
            InvocationPoll::Reported {
                status: None,
                result: CommandResult::default(),
            },
        ] {
            assert!(matches!(
                invocation_outcome(poll, "cmd-1", timeout),
                ProbeOutcome::Pending
            ));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_status_call_is_retried() {
        let script = scripted(vec![
            InvocationPoll::NotVisible,
            InvocationPoll::Unavailable("ThrottlingException: Rate exceeded".into()),
            reported(CommandInvocationStatus::InProgress, -1, ""),
            reported(CommandInvocationStatus::Success, 0, "PMM_CLIENT_INSTALL_COMPLETE"),
        ]);

        let result = wait_for_invocation(
            "cmd-1",
            Duration::from_secs(60),
            Duration::from_secs(2),
            || next_answer(&script),
        )
        .await
        .unwrap();

        assert_eq!(result.stdout, "PMM_CLIENT_INSTALL_COMPLETE");
        assert_eq!(*script.1.lock().unwrap(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_invocation_is_a_timeout() {
        let script = scripted(vec![reported(CommandInvocationStatus::InProgress, -1, "")]);
        let started = tokio::time::Instant::now();

        let err = wait_for_invocation(
            "cmd-1",
            Duration::from_secs(60),
            Duration::from_secs(10),
            || next_answer(&script),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RemoteError::Timeout(t) if t == Duration::from_secs(60)));
        // Command timeout plus delivery grace
        assert_eq!(started.elapsed(), Duration::from_secs(90));
        assert_eq!(*script.1.lock().unwrap(), 9);
    }
}
