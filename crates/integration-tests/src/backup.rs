//! On-demand AWS Backup validation
//!
//! Starts one backup job for the deployment's EBS volume and polls it to a terminal
//! state. `Partial` counts as a failure. Describe calls that fail in transit are
//! retried on the next interval; only the deadline or a terminal job state ends the wait.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_backup::error::DisplayErrorContext;
use chrono::{SecondsFormat, Utc};
use pmm_common::{poll_until, PollSettings, ProbeOutcome};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::aws::{load_sdk_config, parse_account};
use crate::error::{HarnessError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupJobState {
    Created,
    Pending,
    Running,
    Aborting,
    Aborted,
    Completed,
    Failed,
    Expired,
    Partial,
    Unknown(String),
}

impl BackupJobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BackupJobState::Completed
                | BackupJobState::Failed
                | BackupJobState::Aborted
                | BackupJobState::Expired
                | BackupJobState::Partial
        )
    }
}

impl FromStr for BackupJobState {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let state = match s.to_ascii_uppercase().as_str() {
            "CREATED" => BackupJobState::Created,
            "PENDING" => BackupJobState::Pending,
            "RUNNING" | "IN_PROGRESS" | "INPROGRESS" => BackupJobState::Running,
            "ABORTING" => BackupJobState::Aborting,
            "ABORTED" => BackupJobState::Aborted,
            "COMPLETED" => BackupJobState::Completed,
            "FAILED" => BackupJobState::Failed,
            "EXPIRED" => BackupJobState::Expired,
            "PARTIAL" => BackupJobState::Partial,
            _ => BackupJobState::Unknown(s.to_string()),
        };
        Ok(state)
    }
}

impl fmt::Display for BackupJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupJobState::Created => write!(f, "CREATED"),
            BackupJobState::Pending => write!(f, "PENDING"),
            BackupJobState::Running => write!(f, "RUNNING"),
            BackupJobState::Aborting => write!(f, "ABORTING"),
            BackupJobState::Aborted => write!(f, "ABORTED"),
            BackupJobState::Completed => write!(f, "COMPLETED"),
            BackupJobState::Failed => write!(f, "FAILED"),
            BackupJobState::Expired => write!(f, "EXPIRED"),
            BackupJobState::Partial => write!(f, "PARTIAL"),
            BackupJobState::Unknown(other) => write!(f, "{other}"),
        }
    }
}

/// Snapshot of one describe-backup-job answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupJob {
    pub job_id: String,
    pub state: BackupJobState,
    pub status_message: Option<String>,
    pub recovery_point_arn: Option<String>,
    pub percent_done: Option<String>,
    /// Full job description for diagnostics
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    pub vault_name: String,
    pub resource_arn: String,
    pub iam_role_arn: String,
    pub idempotency_token: String,
    pub recovery_point_tags: Vec<(String, String)>,
}

impl BackupRequest {
    pub fn new(vault_name: &str, resource_arn: &str, iam_role_arn: &str) -> Self {
        let run_id = Uuid::new_v4().to_string();
        Self {
            vault_name: vault_name.to_string(),
            resource_arn: resource_arn.to_string(),
            iam_role_arn: iam_role_arn.to_string(),
            idempotency_token: run_id.clone(),
            recovery_point_tags: vec![
                ("CreatedBy".to_string(), "pmm-integration-tests".to_string()),
                ("Purpose".to_string(), "backup-validation".to_string()),
                ("RunId".to_string(), run_id),
                (
                    "CreatedAt".to_string(),
                    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
                ),
            ],
        }
    }
}

#[async_trait]
pub trait BackupService: Send + Sync {
    /// Start a job and return its id
    async fn start_backup_job(&self, request: &BackupRequest) -> Result<String>;

    async fn describe_backup_job(&self, job_id: &str) -> Result<BackupJob>;
}

/// [`BackupService`] backed by the AWS Backup API
#[derive(Debug, Clone)]
pub struct AwsBackupService {
    client: aws_sdk_backup::Client,
}

impl AwsBackupService {
    pub fn new(client: aws_sdk_backup::Client) -> Self {
        Self { client }
    }

    pub async fn connect(region: &str, role_arn: Option<&str>) -> Self {
        let config = load_sdk_config(region, role_arn).await;
        Self::new(aws_sdk_backup::Client::new(&config))
    }
}

#[async_trait]
impl BackupService for AwsBackupService {
    async fn start_backup_job(&self, request: &BackupRequest) -> Result<String> {
        let mut call = self
            .client
            .start_backup_job()
            .backup_vault_name(&request.vault_name)
            .resource_arn(&request.resource_arn)
            .iam_role_arn(&request.iam_role_arn)
            .idempotency_token(&request.idempotency_token);
        for (key, value) in &request.recovery_point_tags {
            call = call.recovery_point_tags(key, value);
        }

        let output = call.send().await.map_err(|e| {
            HarnessError::Transport(format!(
                "StartBackupJob for {}: {}",
                request.resource_arn,
                DisplayErrorContext(&e)
            ))
        })?;

        output
            .backup_job_id()
            .map(str::to_string)
            .ok_or_else(|| HarnessError::Transport("StartBackupJob returned no job id".into()))
    }

    async fn describe_backup_job(&self, job_id: &str) -> Result<BackupJob> {
        let output = self
            .client
            .describe_backup_job()
            .backup_job_id(job_id)
            .send()
            .await
            .map_err(|e| {
                HarnessError::Transport(format!(
                    "DescribeBackupJob {job_id}: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        let state = output
            .state()
            .map(|s| s.as_str())
            .unwrap_or("UNKNOWN")
            .parse::<BackupJobState>()
            .unwrap_or_else(|never| match never {});

        Ok(BackupJob {
            job_id: job_id.to_string(),
            state,
            status_message: output.status_message().map(str::to_string),
            recovery_point_arn: output.recovery_point_arn().map(str::to_string),
            percent_done: output.percent_done().map(str::to_string),
            description: format!("{output:#?}"),
        })
    }
}

/// ARN of an EBS volume in the account and partition of `role_arn`
pub fn volume_arn(region: &str, role_arn: &str, volume_id: &str) -> Result<String> {
    let (partition, account) = parse_account(role_arn).ok_or_else(|| {
        HarnessError::Precondition(format!(
            "cannot derive account id from backup role ARN {role_arn}"
        ))
    })?;
    Ok(format!(
        "arn:{partition}:ec2:{region}:{account}:volume/{volume_id}"
    ))
}

pub struct BackupValidator<S> {
    service: S,
    region: String,
    poll_interval: Duration,
}

impl<S: BackupService> BackupValidator<S> {
    pub fn new(service: S, region: &str) -> Self {
        Self {
            service,
            region: region.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Back up `volume_id` into `vault_name` and wait for the recovery point.
    pub async fn run_backup_and_wait(
        &self,
        volume_id: &str,
        vault_name: &str,
        role_arn: &str,
        timeout: Duration,
    ) -> Result<String> {
        let resource_arn = volume_arn(&self.region, role_arn, volume_id)?;
        let request = BackupRequest::new(vault_name, &resource_arn, role_arn);

        info!(
            vault = vault_name,
            resource_arn = %resource_arn,
            "Starting on-demand backup job"
        );
        let job_id = self.service.start_backup_job(&request).await?;
        info!(job_id = %job_id, "Backup job started");

        let settings = PollSettings::new(timeout, self.poll_interval);
        let recovery_point = poll_until("backup job", settings, || self.probe_job(&job_id)).await?;

        info!(
            job_id = %job_id,
            recovery_point_arn = %recovery_point,
            "Backup job completed"
        );
        Ok(recovery_point)
    }

    async fn probe_job(&self, job_id: &str) -> ProbeOutcome<String, HarnessError> {
        let job = match self.service.describe_backup_job(job_id).await {
            Ok(job) => job,
            Err(HarnessError::Transport(message)) => {
                warn!(job_id, error = %message, "Backup job status unavailable, retrying");
                return ProbeOutcome::Pending;
            }
            Err(e) => return ProbeOutcome::Abort(e),
        };

        debug!(
            job_id,
            state = %job.state,
            percent_done = job.percent_done.as_deref().unwrap_or("-"),
            "Backup job status"
        );

        match job.state {
            BackupJobState::Completed => match job.recovery_point_arn {
                Some(arn) => ProbeOutcome::Ready(arn),
                None => ProbeOutcome::Abort(HarnessError::BackupFailed {
                    job_id: job.job_id,
                    state: "COMPLETED without recovery point".to_string(),
                    description: job.description,
                }),
            },
            ref state if state.is_terminal() => {
                error!(
                    job_id,
                    state = %state,
                    status_message = job.status_message.as_deref().unwrap_or(""),
                    "Backup job did not complete"
                );
                ProbeOutcome::Abort(HarnessError::BackupFailed {
                    job_id: job.job_id.clone(),
                    state: state.to_string(),
                    description: job.description.clone(),
                })
            }
            _ => ProbeOutcome::Pending,
        }
    }
}
