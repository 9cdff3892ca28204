//! HTTP client for the PMM server API
//!
//! Every request carries HTTP Basic credentials (`admin` and the provisioned password).
//!
//! Read-only diagnostic queries ([`PmmClient::get_version`], [`PmmClient::list_services`])
//! fail soft: errors are logged and turned into `None`. Operations the scenario depends
//! on return [`Result`].
//!
//! ```rust,no_run
//! use pmm_sdk::ClientBuilder;
//!
//! # async fn example() -> pmm_sdk::Result<()> {
//! let client = ClientBuilder::default()
//!     .base_url("https://pmm.example.com")
//!     .password("admin-password")
//!     .build()?;
//!
//! if client.is_ready().await? {
//!     println!("{:?}", client.get_version().await);
//! }
//! # Ok(())
//! # }
//! ```

use crate::{
    error::{ApiError, Result},
    inventory::select_agent,
    types::{
        AddServiceRequest, AddServiceResponse, AgentList, AgentRecord, RegisteredService,
        ServiceList, VersionInfo, PMM_AGENT_TYPE,
    },
};
use pmm_common::DatabaseConnection;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default username of the PMM server administrator
pub const DEFAULT_USERNAME: &str = "admin";

/// Default timeout in seconds for API requests
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP client for the PMM server
#[derive(Debug, Clone)]
pub struct PmmClient {
    http_client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl PmmClient {
    /// Create a new client (private - use ClientBuilder instead)
    fn new(
        base_url: String,
        username: String,
        password: String,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            http_client,
            base_url,
            username,
            password,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ===== Health & Discovery =====

    /// One readiness probe against `/v1/readyz`
    pub async fn is_ready(&self) -> Result<bool> {
        let response = self.request(self.http_client.get(self.url("/v1/readyz"))).await?;
        let status = response.status();
        debug!(status = %status, "PMM readiness probe");
        Ok(status.is_success())
    }

    /// Server version, best-effort
    pub async fn get_version(&self) -> Option<VersionInfo> {
        match self.get::<VersionInfo>("/v1/version").await {
            Ok(version) => Some(version),
            Err(e) => {
                warn!(url = %self.base_url, error = %e, "Failed to fetch PMM version");
                None
            }
        }
    }

    // ===== Inventory =====

    /// Registered services, best-effort
    pub async fn list_services(&self) -> Option<ServiceList> {
        match self.get::<ServiceList>("/v1/management/services").await {
            Ok(services) => Some(services),
            Err(e) => {
                warn!(url = %self.base_url, error = %e, "Failed to list PMM services");
                None
            }
        }
    }

    /// Resolve the pmm-agent that will own new services.
    ///
    /// Prefers a connected agent, falls back to the first one listed.
    pub async fn find_agent(&self) -> Result<Option<AgentRecord>> {
        let request = self
            .http_client
            .get(self.url("/v1/inventory/agents"))
            .query(&[("agent_type", PMM_AGENT_TYPE)]);
        let response = self.request(request).await?;
        let agents: AgentList = self.handle_response(response).await?;

        let selected = select_agent(&agents.pmm_agent).cloned();
        match &selected {
            Some(agent) => debug!(
                agent_id = %agent.agent_id,
                connected = agent.connected,
                candidates = agents.pmm_agent.len(),
                "Selected pmm-agent"
            ),
            None => warn!("No pmm-agent registered on the PMM server"),
        }
        Ok(selected)
    }

    /// Register `db` as a PostgreSQL service owned by `agent_id`.
    ///
    /// The hosting node is created in the same request.
    pub async fn register_service(
        &self,
        db: &DatabaseConnection,
        agent_id: &str,
        service_name: &str,
    ) -> Result<RegisteredService> {
        self.register(AddServiceRequest::postgresql(db, agent_id, service_name))
            .await
    }

    /// Send a prepared registration request
    pub async fn register(&self, request: AddServiceRequest) -> Result<RegisteredService> {
        if request.postgresql.pmm_agent_id.is_empty() {
            return Err(ApiError::InvalidRequest {
                message: "pmm_agent_id is required to register a service".into(),
            });
        }

        info!(
            service_name = %request.postgresql.service_name,
            address = %request.postgresql.address,
            port = request.postgresql.port,
            agent_id = %request.postgresql.pmm_agent_id,
            "Registering PostgreSQL service with PMM"
        );

        let response = self.post_raw("/v1/management/services", &request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Registration {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let parsed: AddServiceResponse = serde_json::from_str(&text)?;
        Ok(parsed.into())
    }

    // ===== Private Helper Methods =====

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Apply authentication and send
    async fn request(&self, request: RequestBuilder) -> Result<Response> {
        request
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(ApiError::HttpClient)
    }

    /// Generic GET request
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(self.http_client.get(self.url(path))).await?;
        self.handle_response(response).await
    }

    /// POST returning the raw response
    async fn post_raw<B: Serialize>(&self, path: &str, body: &B) -> Result<Response> {
        self.request(self.http_client.post(self.url(path)).json(body))
            .await
    }

    /// Handle successful response
    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        if response.status().is_success() {
            let text = response.text().await?;
            Ok(serde_json::from_str(&text)?)
        } else {
            self.handle_error_response(response).await
        }
    }

    /// Handle error response
    async fn handle_error_response<T>(&self, response: Response) -> Result<T> {
        let status = response.status();
        let url = response.url().to_string();
        let body = response.text().await.unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Authentication {
                message: if body.is_empty() {
                    "Authentication failed".into()
                } else {
                    body
                },
            }),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound { resource: url }),
            StatusCode::SERVICE_UNAVAILABLE => Err(ApiError::ServiceUnavailable),
            _ => Err(ApiError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

/// Builder for constructing a PmmClient with custom configuration
#[derive(Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    accept_invalid_certs: bool,
}

impl ClientBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the PMM server URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Override the basic-auth username (defaults to `admin`)
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the basic-auth password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Accept self-signed certificates on the PMM endpoint
    pub fn danger_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Build the client
    pub fn build(self) -> Result<PmmClient> {
        let base_url = self
            .base_url
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ApiError::InvalidRequest {
                message: "base_url is required".into(),
            })?;
        let password = self.password.ok_or_else(|| ApiError::InvalidRequest {
            message: "password is required".into(),
        })?;
        let username = self
            .username
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());

        let mut http = reqwest::Client::builder()
            .timeout(
                self.timeout
                    .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            )
            .danger_accept_invalid_certs(self.accept_invalid_certs);
        if let Some(connect_timeout) = self.connect_timeout {
            http = http.connect_timeout(connect_timeout);
        }
        let http_client = http.build().map_err(ApiError::HttpClient)?;

        Ok(PmmClient::new(base_url, username, password, http_client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // base64("admin:secret")
    const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";

    fn client(server: &MockServer) -> PmmClient {
        ClientBuilder::default()
            .base_url(server.uri())
            .password("secret")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_is_ready_sends_basic_auth() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/readyz"))
            .and(header("Authorization", BASIC_AUTH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        assert!(client(&mock_server).is_ready().await.unwrap());
    }

    #[tokio::test]
    async fn test_is_ready_false_on_bad_gateway() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/readyz"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&mock_server)
            .await;

        assert!(!client(&mock_server).is_ready().await.unwrap());
    }

    #[tokio::test]
    async fn test_find_agent_filters_by_type() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/inventory/agents"))
            .and(query_param("agent_type", PMM_AGENT_TYPE))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "pmm_agent": [
                    { "agent_id": "a-offline", "runs_on_node_id": "n1", "connected": false },
                    { "agent_id": "pmm-server", "runs_on_node_id": "pmm-server", "connected": true }
                ]
            })))
            .mount(&mock_server)
            .await;

        let agent = client(&mock_server).find_agent().await.unwrap().unwrap();
        assert_eq!(agent.agent_id, "pmm-server");
    }

    #[test]
    fn test_builder_requires_password() {
        let result = ClientBuilder::default()
            .base_url("https://pmm.example.com")
            .build();
        assert!(matches!(
            result.unwrap_err(),
            ApiError::InvalidRequest { .. }
        ));
    }

    #[test]
    fn test_builder_trims_trailing_slash() {
        let client = ClientBuilder::default()
            .base_url("https://pmm.example.com/")
            .password("secret")
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .danger_accept_invalid_certs(true)
            .build()
            .unwrap();
        assert_eq!(client.base_url(), "https://pmm.example.com");
    }
}
