//! Configuration for the PMM deployment scenario
//!
//! Values are layered: built-in defaults, then an optional TOML file
//! (`pmm-tests.toml` in the working directory, or an explicit path), then
//! `PMM_TEST_`-prefixed environment variables. Nested sections use a double
//! underscore, e.g. `PMM_TEST_BACKUP__TIMEOUT_SECS=3600`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use pmm_common::logging::LoggingConfig;
use pmm_common::{PackageManager, PollSettings};
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::terraform::TerraformVars;

pub const DEFAULT_CONFIG_FILE: &str = "pmm-tests.toml";
pub const ENV_PREFIX: &str = "PMM_TEST_";

/// Deadline and interval of one polling step
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

impl PollConfig {
    pub fn settings(&self) -> PollSettings {
        PollSettings::from_secs(self.timeout_secs, self.interval_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub aws_region: String,
    /// Role assumed by Terraform and the AWS SDK clients
    pub test_role_arn: Option<String>,
    /// Skip `terraform destroy` after the scenario
    pub keep_after: bool,
    /// Terraform executable, looked up on `PATH` unless absolute
    pub terraform_binary: PathBuf,
    pub terraform_root_dir: PathBuf,
    pub module_name: String,
    /// AWS provider constraints; the scenario runs once per entry
    pub aws_provider_versions: Vec<String>,
    pub public_subnet_ids: Vec<String>,
    pub private_subnet_ids: Vec<String>,
    pub zone_id: String,
    pub environment: String,
    pub debug: bool,
    pub debug_aws_sdk: bool,
    /// Accept a self-signed certificate on the PMM endpoint
    pub accept_invalid_certs: bool,
    pub readiness: PollConfig,
    pub backup: PollConfig,
    pub install_timeout_secs: u64,
    pub configure_timeout_secs: u64,
    pub package_manager: PackageManager,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            aws_region: "us-west-2".to_string(),
            test_role_arn: None,
            keep_after: false,
            terraform_binary: PathBuf::from("terraform"),
            terraform_root_dir: PathBuf::from("test_data"),
            module_name: "test_basic".to_string(),
            aws_provider_versions: vec!["~> 5.31".to_string(), "~> 6.0".to_string()],
            public_subnet_ids: Vec::new(),
            private_subnet_ids: Vec::new(),
            zone_id: String::new(),
            environment: "test".to_string(),
            debug: true,
            debug_aws_sdk: false,
            accept_invalid_certs: false,
            readiness: PollConfig {
                timeout_secs: 900,
                interval_secs: 10,
            },
            backup: PollConfig {
                timeout_secs: 3600,
                interval_secs: 30,
            },
            install_timeout_secs: 600,
            configure_timeout_secs: 300,
            package_manager: PackageManager::Dnf,
        }
    }
}

impl TestConfig {
    pub fn load(path_override: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(TestConfig::default()));

        if let Some(path) = path_override {
            if !path.exists() {
                return Err(HarnessError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        } else {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                figment = figment.merge(Toml::file(default_path));
            }
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .map_err(|e| HarnessError::Config(e.to_string()))
    }

    /// Create configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Check the values a live run cannot do without
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.aws_region.is_empty() {
            missing.push("aws_region");
        }
        if self.public_subnet_ids.is_empty() {
            missing.push("public_subnet_ids");
        }
        if self.private_subnet_ids.is_empty() {
            missing.push("private_subnet_ids");
        }
        if self.zone_id.is_empty() {
            missing.push("zone_id");
        }
        if self.aws_provider_versions.is_empty() {
            missing.push("aws_provider_versions");
        }

        if !missing.is_empty() {
            return Err(HarnessError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        for (name, poll) in [("readiness", &self.readiness), ("backup", &self.backup)] {
            if poll.interval_secs == 0 {
                return Err(HarnessError::Config(format!(
                    "{name}.interval_secs must be at least 1"
                )));
            }
        }
        Ok(())
    }

    pub fn module_dir(&self) -> PathBuf {
        self.terraform_root_dir.join(&self.module_name)
    }

    pub fn terraform_vars(&self) -> TerraformVars {
        TerraformVars {
            region: self.aws_region.clone(),
            public_subnet_ids: self.public_subnet_ids.clone(),
            private_subnet_ids: self.private_subnet_ids.clone(),
            zone_id: self.zone_id.clone(),
            environment: self.environment.clone(),
            role_arn: self.test_role_arn.clone(),
        }
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig::new(self.debug, self.debug_aws_sdk)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn configure_timeout(&self) -> Duration {
        Duration::from_secs(self.configure_timeout_secs)
    }
}
