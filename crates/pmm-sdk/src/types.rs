//! Type definitions for the PMM API

use pmm_common::DatabaseConnection;
use serde::{Deserialize, Serialize};

/// Service type reported for PostgreSQL services
pub const POSTGRESQL_SERVICE_TYPE: &str = "SERVICE_TYPE_POSTGRESQL_SERVICE";

/// Agent type queried when resolving the agent that will own a new service
pub const PMM_AGENT_TYPE: &str = "AGENT_TYPE_PMM_AGENT";

/// Node type requested for the inline node created with a service
pub const REMOTE_NODE_TYPE: &str = "NODE_TYPE_REMOTE_NODE";

/// `GET /v1/version` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Short version string, e.g. "3.1.0"
    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<VersionDetails>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed: Option<VersionDetails>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_method: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionDetails {
    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// One registered service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(default)]
    pub service_id: String,

    #[serde(default)]
    pub service_name: String,

    #[serde(default)]
    pub service_type: String,

    /// Host the service listens on; may carry a port or domain suffix
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub port: u32,

    #[serde(default)]
    pub node_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
}

/// `GET /v1/management/services` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceList {
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
}

/// One monitoring agent as returned by the inventory API
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: String,

    #[serde(default)]
    pub runs_on_node_id: String,

    #[serde(default)]
    pub connected: bool,
}

/// `GET /v1/inventory/agents?agent_type=AGENT_TYPE_PMM_AGENT` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentList {
    #[serde(default)]
    pub pmm_agent: Vec<AgentRecord>,
}

/// Status of an agent created alongside a service (exporter, QAN)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentStatus {
    #[serde(default)]
    pub agent_id: String,

    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub disabled: bool,
}

impl AgentStatus {
    /// Agent is created but has not started collecting yet
    pub fn is_waiting(&self) -> bool {
        self.status.eq_ignore_ascii_case("AGENT_STATUS_WAITING")
            || self.status.eq_ignore_ascii_case("WAITING")
    }
}

/// Inline node creation attached to a service registration
#[derive(Debug, Clone, Serialize)]
pub struct AddNodeParams {
    pub node_type: String,
    pub node_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// PostgreSQL part of `POST /v1/management/services`
#[derive(Debug, Clone, Serialize)]
pub struct AddPostgresServiceParams {
    pub add_node: AddNodeParams,
    pub service_name: String,
    pub address: String,
    pub port: u16,
    pub database: String,
    pub pmm_agent_id: String,
    pub username: String,
    pub password: String,
    pub qan_postgresql_pgstatements_agent: bool,
    pub tls: bool,
    pub tls_skip_verify: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// `POST /v1/management/services` request body
#[derive(Debug, Clone, Serialize)]
pub struct AddServiceRequest {
    pub postgresql: AddPostgresServiceParams,
}

impl AddServiceRequest {
    /// Registration of a PostgreSQL service with QAN through `pg_stat_statements`.
    ///
    /// The hosting node is created inline and named after the service.
    pub fn postgresql(db: &DatabaseConnection, agent_id: &str, service_name: &str) -> Self {
        Self {
            postgresql: AddPostgresServiceParams {
                add_node: AddNodeParams {
                    node_type: REMOTE_NODE_TYPE.to_string(),
                    node_name: format!("{service_name}-node"),
                    region: None,
                },
                service_name: service_name.to_string(),
                address: db.host.clone(),
                port: db.port,
                database: db.database.clone(),
                pmm_agent_id: agent_id.to_string(),
                username: db.username.clone(),
                password: db.password.clone(),
                qan_postgresql_pgstatements_agent: true,
                tls: true,
                tls_skip_verify: true,
                environment: None,
            },
        }
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.postgresql.environment = Some(environment.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.postgresql.add_node.region = Some(region.into());
        self
    }
}

/// PostgreSQL part of the registration response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisteredPostgres {
    #[serde(default)]
    pub service: ServiceRecord,

    #[serde(default)]
    pub postgres_exporter: Option<AgentStatus>,

    #[serde(default)]
    pub qan_postgresql_pgstatements_agent: Option<AgentStatus>,
}

/// `POST /v1/management/services` response
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddServiceResponse {
    #[serde(default)]
    pub postgresql: RegisteredPostgres,
}

/// A freshly registered service with the agents created for it
#[derive(Debug, Clone, Default)]
pub struct RegisteredService {
    pub service: ServiceRecord,
    pub exporter: Option<AgentStatus>,
    pub qan_agent: Option<AgentStatus>,
}

impl From<AddServiceResponse> for RegisteredService {
    fn from(response: AddServiceResponse) -> Self {
        let mut service = response.postgresql.service;
        // Registration responses omit the type tag
        if service.service_type.is_empty() {
            service.service_type = POSTGRESQL_SERVICE_TYPE.to_string();
        }
        Self {
            service,
            exporter: response.postgresql.postgres_exporter,
            qan_agent: response.postgresql.qan_postgresql_pgstatements_agent,
        }
    }
}
