//! Typed view of `terraform output -json`

use std::collections::BTreeMap;

use pmm_common::DatabaseConnection;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{HarnessError, Result};
use crate::remote::RemoteTarget;

const MASK: &str = "********";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputValue {
    pub value: Value,
    #[serde(default)]
    pub sensitive: bool,
}

/// Raw outputs keyed by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerraformOutputs(BTreeMap<String, OutputValue>);

impl TerraformOutputs {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(Self(serde_json::from_str(raw)?))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).map(|o| &o.value)
    }

    pub fn string(&self, name: &str) -> Result<String> {
        match self.get(name) {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(HarnessError::MissingOutput(name.to_string())),
        }
    }

    /// Accepts a JSON number or a numeric string
    pub fn port(&self, name: &str) -> Result<u16> {
        let port = match self.get(name) {
            Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            Some(Value::String(s)) => s.trim().parse::<u16>().ok(),
            _ => None,
        };
        port.ok_or_else(|| HarnessError::MissingOutput(name.to_string()))
    }

    /// Pretty JSON of all outputs with sensitive values masked
    pub fn masked_json(&self) -> String {
        let masked: BTreeMap<&str, Value> = self
            .0
            .iter()
            .map(|(name, output)| {
                let value = if output.sensitive {
                    Value::String(MASK.to_string())
                } else {
                    output.value.clone()
                };
                (name.as_str(), value)
            })
            .collect();
        serde_json::to_string_pretty(&masked).unwrap_or_default()
    }
}

/// Everything the scenario needs from one deployment
#[derive(Clone, PartialEq, Eq)]
pub struct DeploymentOutputs {
    pub pmm_url: String,
    pub admin_password: String,
    pub database: DatabaseConnection,
    pub backup_vault_name: String,
    pub ebs_volume_id: String,
    pub backup_role_arn: String,
    pub instance_id: String,
}

impl std::fmt::Debug for DeploymentOutputs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentOutputs")
            .field("pmm_url", &self.pmm_url)
            .field("admin_password", &MASK)
            .field("database", &self.database)
            .field("backup_vault_name", &self.backup_vault_name)
            .field("ebs_volume_id", &self.ebs_volume_id)
            .field("backup_role_arn", &self.backup_role_arn)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

impl DeploymentOutputs {
    pub fn from_outputs(outputs: &TerraformOutputs) -> Result<Self> {
        Ok(Self {
            pmm_url: outputs.string("pmm_url")?,
            admin_password: outputs.string("admin_password")?,
            database: DatabaseConnection {
                host: outputs.string("rds_address")?,
                port: outputs.port("rds_port")?,
                database: outputs.string("rds_database")?,
                username: outputs.string("rds_username")?,
                password: outputs.string("rds_password")?,
            },
            backup_vault_name: outputs.string("backup_vault_name")?,
            ebs_volume_id: outputs.string("ebs_volume_id")?,
            backup_role_arn: outputs.string("backup_role_arn")?,
            instance_id: outputs.string("instance_id")?,
        })
    }

    pub fn remote_target(&self, region: &str, role_arn: Option<&str>) -> RemoteTarget {
        RemoteTarget {
            instance_id: self.instance_id.clone(),
            region: region.to_string(),
            role_arn: role_arn.map(str::to_string),
        }
    }

    /// Multi-line summary for failure diagnostics, credentials included
    pub fn log_context(&self) -> String {
        format!(
            "PMM URL: {}\nPMM admin password: {}\nDatabase: {}/{} as {}\nInstance: {}\nBackup vault: {}\nEBS volume: {}",
            self.pmm_url,
            self.admin_password,
            self.database.endpoint(),
            self.database.database,
            self.database.username,
            self.instance_id,
            self.backup_vault_name,
            self.ebs_volume_id,
        )
    }
}
