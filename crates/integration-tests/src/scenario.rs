//! The PMM deployment scenario
//!
//! provision → read outputs → wait for PMM → configure the database over SSM →
//! register it with PMM → verify → back up the EBS volume → destroy (unless kept).
//!
//! The step functions are public so they can be exercised against mock servers and
//! scripted executors without a deployment.

use pmm_common::{wait_ready, DatabaseConnection, PollSettings};
use pmm_sdk::{is_registered, ClientBuilder, PmmClient, RegisteredService};
use tracing::{error, info, warn};

use crate::backup::{AwsBackupService, BackupValidator};
use crate::config::TestConfig;
use crate::configurator::DatabaseConfigurator;
use crate::error::{HarnessError, Result};
use crate::remote::ssm::SsmExecutor;
use crate::terraform::{DeploymentOutputs, TerraformModule};

/// What the registration step did
#[derive(Debug, Clone)]
pub enum Registration {
    AlreadyRegistered,
    Registered(RegisteredService),
}

/// Summary of one successful scenario run
#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub aws_provider_version: Option<String>,
    pub pmm_version: Option<String>,
    pub service_name: String,
    pub newly_registered: bool,
    pub recovery_point_arn: String,
}

/// PMM service name for a database host, e.g. `rds-postgres-pmm-test`
pub fn service_name_for(host: &str) -> String {
    let prefix = host.split('.').next().unwrap_or(host);
    format!("rds-postgres-{prefix}")
}

/// Block until `/v1/readyz` answers success or `settings.timeout` passes.
pub async fn wait_for_pmm(client: &PmmClient, settings: PollSettings) -> Result<()> {
    info!(
        url = %client.base_url(),
        timeout = ?settings.timeout,
        interval = ?settings.interval,
        "Waiting for PMM server to become ready"
    );
    wait_ready("PMM readiness", settings, || client.is_ready()).await?;
    info!(url = %client.base_url(), "PMM server is ready");
    Ok(())
}

/// Register `db` with PMM unless a service for its host already exists.
///
/// The inline node is tagged with the AWS `region` hosting the database.
pub async fn register_database(
    client: &PmmClient,
    db: &DatabaseConnection,
    environment: &str,
    region: &str,
) -> Result<Registration> {
    if let Some(services) = client.list_services().await {
        if is_registered(&services.services, &db.host) {
            info!(host = %db.host, "Database already registered with PMM, skipping");
            return Ok(Registration::AlreadyRegistered);
        }
        info!(
            existing = services.services.len(),
            "Database not registered yet"
        );
    }

    let agent = client.find_agent().await?.ok_or_else(|| {
        HarnessError::Precondition("no pmm-agent available to own the database service".into())
    })?;

    let service_name = service_name_for(&db.host);
    let request = pmm_sdk::AddServiceRequest::postgresql(db, &agent.agent_id, &service_name)
        .with_environment(environment)
        .with_region(region);
    let registered = client.register(request).await?;

    info!(
        service_id = %registered.service.service_id,
        service_name = %service_name,
        "Registered database with PMM"
    );
    if let Some(qan) = &registered.qan_agent {
        if qan.is_waiting() {
            info!(
                agent_id = %qan.agent_id,
                "QAN agent is waiting; query analytics start after pg_stat_statements reports"
            );
        } else {
            info!(agent_id = %qan.agent_id, status = %qan.status, "QAN agent status");
        }
    } else {
        warn!("Registration response did not include a QAN agent");
    }

    Ok(Registration::Registered(registered))
}

/// Confirm the database shows up in the service listing.
pub async fn verify_registration(client: &PmmClient, db: &DatabaseConnection) -> Result<()> {
    let services = client.list_services().await.ok_or_else(|| {
        HarnessError::Precondition("could not list PMM services to verify registration".into())
    })?;

    if !is_registered(&services.services, &db.host) {
        return Err(HarnessError::Precondition(format!(
            "{} is not among the {} registered PMM services",
            db.host,
            services.services.len()
        )));
    }
    info!(host = %db.host, "Database registration verified");
    Ok(())
}

pub struct PmmScenario {
    config: TestConfig,
}

impl PmmScenario {
    pub fn new(config: TestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Run the scenario once per configured AWS provider constraint.
    ///
    /// A failing constraint does not stop the others; every failure is reported at the end.
    pub async fn run_all(&self) -> Result<Vec<ScenarioReport>> {
        let total = self.config.aws_provider_versions.len();
        let mut reports = Vec::with_capacity(total);
        let mut failures = Vec::new();

        for version in &self.config.aws_provider_versions {
            match self.run_for_provider(version).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(aws_provider_version = %version, error = %e, "Scenario run failed");
                    failures.push(format!("aws provider {version}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            Ok(reports)
        } else {
            Err(HarnessError::ScenarioRuns {
                failed: failures.len(),
                total,
                summary: failures.join("\n"),
            })
        }
    }

    fn module(&self) -> TerraformModule {
        TerraformModule::new(self.config.module_dir()).with_binary(&self.config.terraform_binary)
    }

    /// Deploy with `aws_provider_version`, run the checks, and tear down.
    pub async fn run_for_provider(&self, aws_provider_version: &str) -> Result<ScenarioReport> {
        let module = self.module();
        info!(
            dir = %module.dir().display(),
            aws_provider_version,
            "Starting PMM deployment scenario"
        );

        module.clean_cache().await?;
        module
            .write_files(aws_provider_version, &self.config.terraform_vars())
            .await?;
        module.init().await?;

        let result = self
            .apply_and_verify(&module)
            .await
            .map(|report| ScenarioReport {
                aws_provider_version: Some(aws_provider_version.to_string()),
                ..report
            });

        if self.config.keep_after {
            info!(dir = %module.dir().display(), "keep_after set, leaving deployment in place");
            return result;
        }

        match (result, module.destroy().await) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(destroy_err)) => Err(destroy_err),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(destroy_err)) => {
                error!(error = %destroy_err, "terraform destroy failed after scenario failure");
                Err(e)
            }
        }
    }

    /// Run the checks against a deployment that is already applied.
    pub async fn run_existing(&self) -> Result<ScenarioReport> {
        let module = self.module();
        let outputs = self.read_outputs(&module).await?;
        self.run_deployed(&outputs).await
    }

    async fn apply_and_verify(&self, module: &TerraformModule) -> Result<ScenarioReport> {
        module.apply().await?;
        let outputs = self.read_outputs(module).await?;
        info!("PMM deployment successful");
        self.run_deployed(&outputs).await
    }

    async fn read_outputs(&self, module: &TerraformModule) -> Result<DeploymentOutputs> {
        let outputs = module.output().await?;
        info!("Terraform outputs:\n{}", outputs.masked_json());
        DeploymentOutputs::from_outputs(&outputs)
    }

    /// Every check after provisioning; logs full context when one fails.
    pub async fn run_deployed(&self, outputs: &DeploymentOutputs) -> Result<ScenarioReport> {
        let result = self.verify_deployment(outputs).await;
        if let Err(e) = &result {
            error!(error = %e, "PMM scenario failed");
            error!("Deployment context:\n{}", outputs.log_context());
        }
        result
    }

    async fn verify_deployment(&self, outputs: &DeploymentOutputs) -> Result<ScenarioReport> {
        let client = ClientBuilder::new()
            .base_url(&outputs.pmm_url)
            .password(&outputs.admin_password)
            .danger_accept_invalid_certs(self.config.accept_invalid_certs)
            .build()?;

        wait_for_pmm(&client, self.config.readiness.settings()).await?;

        let pmm_version = client.get_version().await.map(|v| {
            info!(version = %v.version, "PMM server version");
            v.version
        });

        let role_arn = self.config.test_role_arn.as_deref();
        let target = outputs.remote_target(&self.config.aws_region, role_arn);
        let configurator = DatabaseConfigurator::new(SsmExecutor::for_target(&target).await)
            .with_package_manager(self.config.package_manager)
            .with_timeouts(
                self.config.install_timeout(),
                self.config.configure_timeout(),
            );
        configurator.configure(&target, &outputs.database).await?;

        let registration = register_database(
            &client,
            &outputs.database,
            &self.config.environment,
            &self.config.aws_region,
        )
        .await?;
        verify_registration(&client, &outputs.database).await?;

        let backup = BackupValidator::new(
            AwsBackupService::connect(&self.config.aws_region, role_arn).await,
            &self.config.aws_region,
        )
        .with_poll_interval(self.config.backup.settings().interval);
        let recovery_point_arn = backup
            .run_backup_and_wait(
                &outputs.ebs_volume_id,
                &outputs.backup_vault_name,
                &outputs.backup_role_arn,
                self.config.backup.settings().timeout,
            )
            .await?;

        Ok(ScenarioReport {
            aws_provider_version: None,
            pmm_version,
            service_name: service_name_for(&outputs.database.host),
            newly_registered: matches!(registration, Registration::Registered(_)),
            recovery_point_arn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    /// Terraform stand-in: logs each subcommand, fails `apply`, exits with
    /// `destroy_exit` on `destroy`.
    #[cfg(unix)]
    fn fake_terraform(root: &Path, destroy_exit: i32) -> TestConfig {
        use std::os::unix::fs::PermissionsExt;

        let script = root.join("terraform");
        std::fs::write(
            &script,
            format!(
                r#"#!/bin/sh
echo "$1" >> "$(dirname "$0")/calls.log"
case "$1" in
  init) exit 0 ;;
  apply) echo "Error: creating ECS Cluster: AccessDeniedException" >&2; exit 1 ;;
  destroy) exit {destroy_exit} ;;
esac
exit 1
"#
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::create_dir(root.join("module")).unwrap();

        TestConfig {
            terraform_binary: script,
            terraform_root_dir: root.to_path_buf(),
            module_name: "module".into(),
            public_subnet_ids: vec!["subnet-a".into()],
            private_subnet_ids: vec!["subnet-b".into()],
            zone_id: "Z0123456789".into(),
            ..TestConfig::default()
        }
    }

    fn terraform_calls(root: &Path) -> Vec<String> {
        std::fs::read_to_string(root.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_apply_still_destroys() {
        let root = tempfile::tempdir().unwrap();
        let scenario = PmmScenario::new(fake_terraform(root.path(), 0));

        let err = scenario.run_for_provider("~> 6.0").await.unwrap_err();

        match err {
            HarnessError::Terraform { command, stderr, .. } => {
                assert_eq!(command, "apply");
                assert!(stderr.contains("AccessDeniedException"));
            }
            other => panic!("expected apply failure, got {other:?}"),
        }
        assert_eq!(terraform_calls(root.path()), vec!["init", "apply", "destroy"]);
        let tf = std::fs::read_to_string(root.path().join("module/terraform.tf")).unwrap();
        assert!(tf.contains(r#"version = "~> 6.0""#));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_apply_error_wins_over_destroy_error() {
        let root = tempfile::tempdir().unwrap();
        let scenario = PmmScenario::new(fake_terraform(root.path(), 1));

        let err = scenario.run_for_provider("~> 5.31").await.unwrap_err();

        assert!(matches!(err, HarnessError::Terraform { ref command, .. } if command == "apply"));
        assert_eq!(terraform_calls(root.path()), vec!["init", "apply", "destroy"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_keep_after_skips_destroy() {
        let root = tempfile::tempdir().unwrap();
        let mut config = fake_terraform(root.path(), 0);
        config.keep_after = true;
        let scenario = PmmScenario::new(config);

        assert!(scenario.run_for_provider("~> 6.0").await.is_err());
        assert_eq!(terraform_calls(root.path()), vec!["init", "apply"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_all_continues_after_failure() {
        let root = tempfile::tempdir().unwrap();
        let scenario = PmmScenario::new(fake_terraform(root.path(), 0));

        let err = scenario.run_all().await.unwrap_err();

        match err {
            HarnessError::ScenarioRuns {
                failed,
                total,
                summary,
            } => {
                assert_eq!((failed, total), (2, 2));
                assert!(summary.contains("aws provider ~> 5.31: terraform apply failed"));
                assert!(summary.contains("aws provider ~> 6.0: terraform apply failed"));
            }
            other => panic!("expected aggregated failure, got {other:?}"),
        }
        let calls = terraform_calls(root.path());
        assert_eq!(calls.iter().filter(|c| *c == "apply").count(), 2);
        assert_eq!(calls.iter().filter(|c| *c == "destroy").count(), 2);
    }

    #[test]
    fn test_service_name_uses_host_prefix() {
        assert_eq!(
            service_name_for("pmm-test.c9akciq32.us-west-2.rds.amazonaws.com"),
            "rds-postgres-pmm-test"
        );
        assert_eq!(service_name_for("10.0.1.15"), "rds-postgres-10");
        assert_eq!(service_name_for("localhost"), "rds-postgres-localhost");
    }
}
