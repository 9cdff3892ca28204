//! Deployment and validation harness for the PMM ECS Terraform module
//!
//! Provisions the module with Terraform, waits for PMM, prepares the RDS PostgreSQL
//! instance over SSM, registers it with PMM and validates AWS Backup.

pub mod aws;
pub mod backup;
pub mod config;
pub mod configurator;
pub mod error;
pub mod remote;
pub mod scenario;
pub mod terraform;

pub use backup::{AwsBackupService, BackupJob, BackupJobState, BackupService, BackupValidator};
pub use config::TestConfig;
pub use configurator::DatabaseConfigurator;
pub use error::{HarnessError, Result};
pub use remote::{ssm::SsmExecutor, CommandResult, RemoteError, RemoteExecutor, RemoteTarget};
pub use scenario::{PmmScenario, ScenarioReport};
pub use terraform::{DeploymentOutputs, TerraformModule};
