//! Terraform driver for the module under test
//!
//! Renders the provider and variable files into the module directory, then shells out
//! to the `terraform` CLI. Each run starts from a clean provider cache so the requested
//! AWS provider constraint is honoured.

pub mod outputs;

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{HarnessError, Result};

pub use outputs::{DeploymentOutputs, OutputValue, TerraformOutputs};

const RANDOM_PROVIDER_VERSION: &str = "~> 3.6";

/// Values written to `terraform.tfvars`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerraformVars {
    pub region: String,
    pub public_subnet_ids: Vec<String>,
    pub private_subnet_ids: Vec<String>,
    pub zone_id: String,
    pub environment: String,
    pub role_arn: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TerraformModule {
    dir: PathBuf,
    binary: PathBuf,
}

impl TerraformModule {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            binary: PathBuf::from("terraform"),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove `.terraform/` and the lock file; either may be absent.
    pub async fn clean_cache(&self) -> Result<()> {
        match tokio::fs::remove_dir_all(self.dir.join(".terraform")).await {
            Ok(()) => debug!(dir = %self.dir.display(), "Removed .terraform"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match tokio::fs::remove_file(self.dir.join(".terraform.lock.hcl")).await {
            Ok(()) => debug!(dir = %self.dir.display(), "Removed .terraform.lock.hcl"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Write `terraform.tf`, `provider.tf` and `terraform.tfvars`.
    pub async fn write_files(&self, aws_provider_version: &str, vars: &TerraformVars) -> Result<()> {
        let files = [
            ("terraform.tf", render_terraform_tf(aws_provider_version)),
            ("provider.tf", render_provider_tf(vars.role_arn.is_some())),
            ("terraform.tfvars", render_tfvars(vars)),
        ];
        for (name, contents) in files {
            tokio::fs::write(self.dir.join(name), contents).await?;
        }
        info!(
            dir = %self.dir.display(),
            aws_provider_version,
            assume_role = vars.role_arn.is_some(),
            "Wrote Terraform configuration"
        );
        Ok(())
    }

    pub async fn init(&self) -> Result<()> {
        self.run("init", &["init", "-input=false", "-no-color"]).await?;
        Ok(())
    }

    pub async fn apply(&self) -> Result<()> {
        self.run(
            "apply",
            &["apply", "-auto-approve", "-input=false", "-no-color"],
        )
        .await?;
        Ok(())
    }

    pub async fn output(&self) -> Result<TerraformOutputs> {
        let stdout = self.run("output", &["output", "-json", "-no-color"]).await?;
        TerraformOutputs::from_json(&stdout)
    }

    pub async fn destroy(&self) -> Result<()> {
        self.run(
            "destroy",
            &["destroy", "-auto-approve", "-input=false", "-no-color"],
        )
        .await?;
        Ok(())
    }

    async fn run(&self, command: &str, args: &[&str]) -> Result<String> {
        info!(dir = %self.dir.display(), "Running terraform {}", command);

        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| HarnessError::Terraform {
                command: command.to_string(),
                status: "failed to start".to_string(),
                stderr: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        // `output -json` carries secrets, everything else is plain progress
        if command != "output" {
            for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
                debug!(target: "terraform", "{}", line);
            }
        }

        if !output.status.success() {
            warn!(command, status = %output.status, "terraform exited with failure");
            return Err(HarnessError::Terraform {
                command: command.to_string(),
                status: output.status.to_string(),
                stderr,
            });
        }

        Ok(stdout)
    }
}

pub fn render_terraform_tf(aws_provider_version: &str) -> String {
    format!(
        r#"terraform {{
  required_providers {{
    aws = {{
      source  = "hashicorp/aws"
      version = "{aws_provider_version}"
    }}
    random = {{
      source  = "hashicorp/random"
      version = "{RANDOM_PROVIDER_VERSION}"
    }}
  }}
}}
"#
    )
}

pub fn render_provider_tf(assume_role: bool) -> String {
    let assume_role_block = if assume_role {
        "\n  assume_role {\n    role_arn = var.role_arn\n  }"
    } else {
        ""
    };
    format!(
        r#"provider "aws" {{
  region = var.region{assume_role_block}
}}

provider "aws" {{
  region = var.region
  alias  = "dns"{assume_role_block}
}}
"#
    )
}

pub fn render_tfvars(vars: &TerraformVars) -> String {
    let mut tfvars = format!(
        "region = {}\n\npublic_subnet_ids  = {}\nprivate_subnet_ids = {}\n\nzone_id = {}\n\nenvironment = {}\n",
        hcl_string(&vars.region),
        hcl_list(&vars.public_subnet_ids),
        hcl_list(&vars.private_subnet_ids),
        hcl_string(&vars.zone_id),
        hcl_string(&vars.environment),
    );
    if let Some(role_arn) = &vars.role_arn {
        tfvars.push_str(&format!("role_arn = {}\n", hcl_string(role_arn)));
    }
    tfvars
}

// JSON string and list literals are valid HCL
fn hcl_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

fn hcl_list(values: &[String]) -> String {
    serde_json::Value::from(values.to_vec()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vars(role_arn: Option<&str>) -> TerraformVars {
        TerraformVars {
            region: "us-west-2".into(),
            public_subnet_ids: vec!["subnet-a".into(), "subnet-b".into()],
            private_subnet_ids: vec!["subnet-c".into()],
            zone_id: "Z0123456789".into(),
            environment: "test".into(),
            role_arn: role_arn.map(str::to_string),
        }
    }

    #[test]
    fn test_terraform_tf_pins_providers() {
        let rendered = render_terraform_tf("~> 6.0");
        assert!(rendered.contains(r#"version = "~> 6.0""#));
        assert!(rendered.contains(r#"source  = "hashicorp/random""#));
        assert!(rendered.contains(r#"version = "~> 3.6""#));
    }

    #[test]
    fn test_provider_tf_without_role() {
        let rendered = render_provider_tf(false);
        assert!(!rendered.contains("assume_role"));
        assert!(rendered.contains(r#"alias  = "dns""#));
        assert_eq!(rendered.matches("provider \"aws\"").count(), 2);
    }

    #[test]
    fn test_provider_tf_with_role() {
        let rendered = render_provider_tf(true);
        assert_eq!(rendered.matches("assume_role {").count(), 2);
        assert_eq!(rendered.matches("role_arn = var.role_arn").count(), 2);
    }

    #[test]
    fn test_tfvars_role_only_when_configured() {
        let without = render_tfvars(&vars(None));
        assert!(without.contains(r#"public_subnet_ids  = ["subnet-a","subnet-b"]"#));
        assert!(without.contains(r#"zone_id = "Z0123456789""#));
        assert!(!without.contains("role_arn"));

        let with = render_tfvars(&vars(Some("arn:aws:iam::123456789012:role/tester")));
        assert!(with.contains(r#"role_arn = "arn:aws:iam::123456789012:role/tester""#));
    }

    #[tokio::test]
    async fn test_clean_cache_removes_files() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".terraform/providers")).unwrap();
        std::fs::write(dir.path().join(".terraform.lock.hcl"), "# lock").unwrap();

        let module = TerraformModule::new(dir.path());
        module.clean_cache().await.unwrap();

        assert!(!dir.path().join(".terraform").exists());
        assert!(!dir.path().join(".terraform.lock.hcl").exists());
    }

    #[tokio::test]
    async fn test_clean_cache_tolerates_missing_cache() {
        let dir = TempDir::new().unwrap();
        let module = TerraformModule::new(dir.path());
        module.clean_cache().await.unwrap();
        module.clean_cache().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_files() {
        let dir = TempDir::new().unwrap();
        let module = TerraformModule::new(dir.path());

        module
            .write_files("~> 5.31", &vars(Some("arn:aws:iam::123456789012:role/tester")))
            .await
            .unwrap();

        let provider = std::fs::read_to_string(dir.path().join("provider.tf")).unwrap();
        assert!(provider.contains("assume_role"));
        let terraform = std::fs::read_to_string(dir.path().join("terraform.tf")).unwrap();
        assert!(terraform.contains("~> 5.31"));
        assert!(dir.path().join("terraform.tfvars").exists());
    }

    #[tokio::test]
    async fn test_missing_binary_is_terraform_error() {
        let dir = TempDir::new().unwrap();
        let module =
            TerraformModule::new(dir.path()).with_binary(dir.path().join("no-such-terraform"));

        match module.init().await.unwrap_err() {
            HarnessError::Terraform {
                command, status, ..
            } => {
                assert_eq!(command, "init");
                assert_eq!(status, "failed to start");
            }
            other => panic!("expected terraform error, got {other:?}"),
        }
    }
}
