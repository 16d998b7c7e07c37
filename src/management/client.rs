//! HTTP client for the host management plane.
//!
//! Replace and terminate are `DELETE` calls that carry the instance id as a
//! JSON array body, addressed per environment and cluster. Host status is a
//! `GET` returning the host's records, most recent first; an empty list means
//! the host no longer exists.

use super::error::ManagementError;
use crate::config::ManagementConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Request, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// One status record for a host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HostStatus {
    pub host_name: Option<String>,
    pub host_id: Option<String>,
    pub state: Option<String>,
    pub pending_terminate: bool,
}

/// Node lifecycle operations against the management plane
#[async_trait]
pub trait HostManager: Send + Sync {
    /// Terminate `instance_id` and let the environment provision a replacement
    async fn replace_host(&self, cluster: &str, instance_id: &str) -> Result<(), ManagementError>;

    /// Terminate `instance_id` without a replacement
    async fn terminate_host(&self, cluster: &str, instance_id: &str) -> Result<(), ManagementError>;

    async fn host_status(&self, host_name: &str) -> Result<Vec<HostStatus>, ManagementError>;

    async fn is_pending_termination(&self, host_name: &str) -> Result<bool, ManagementError> {
        let records = self.host_status(host_name).await?;
        // No record left means termination already went through.
        Ok(records.first().map_or(true, |latest| latest.pending_terminate))
    }

    async fn is_terminated(&self, host_name: &str) -> Result<bool, ManagementError> {
        Ok(self.host_status(host_name).await?.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct HostManagementClient {
    http: Client,
    base_url: String,
    environment: String,
    token: Option<String>,
}

impl HostManagementClient {
    pub fn new(config: &ManagementConfig) -> Result<Self, ManagementError> {
        Url::parse(&config.base_url).map_err(|e| ManagementError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let http = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(format!("orion-control-plane/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ManagementError::request("build_client", e))?;

        info!(
            base_url = %config.base_url,
            environment = %config.environment,
            timeout_ms = config.request_timeout_ms,
            "Created host management client"
        );

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            environment: config.environment.clone(),
            token: config.token.clone().filter(|token| !token.is_empty()),
        })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn replace_host_url(&self, cluster: &str, replace: bool) -> Result<Url, ManagementError> {
        self.url(&format!(
            "v1/envs/{}/{cluster}/hosts?replaceHost={replace}",
            self.environment
        ))
    }

    pub fn host_url(&self, host_name: &str) -> Result<Url, ManagementError> {
        self.url(&format!("v1/hosts/{host_name}"))
    }

    /// The `DELETE` that removes `instance_id`, replacing it if `replace` is set
    pub fn host_removal_request(
        &self,
        cluster: &str,
        instance_id: &str,
        replace: bool,
    ) -> Result<Request, ManagementError> {
        let operation = removal_operation(replace);
        self.http
            .delete(self.replace_host_url(cluster, replace)?)
            .header(AUTHORIZATION, self.authorization()?)
            .json(&[instance_id])
            .build()
            .map_err(|e| ManagementError::request(operation, e))
    }

    pub fn host_status_request(&self, host_name: &str) -> Result<Request, ManagementError> {
        self.http
            .get(self.host_url(host_name)?)
            .header(AUTHORIZATION, self.authorization()?)
            .build()
            .map_err(|e| ManagementError::request("host_status", e))
    }

    async fn remove_host(&self, cluster: &str, instance_id: &str, replace: bool) -> Result<(), ManagementError> {
        let operation = removal_operation(replace);
        let request = self.host_removal_request(cluster, instance_id, replace)?;
        info!(
            cluster = %cluster,
            instance_id = %instance_id,
            url = %request.url(),
            "🔁 MANAGEMENT: {}",
            operation
        );

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| ManagementError::request(operation, e))?;
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            status => Err(unexpected_status(operation, status, response).await),
        }
    }

    fn url(&self, path: &str) -> Result<Url, ManagementError> {
        let raw = format!("{}/{path}", self.base_url);
        Url::parse(&raw).map_err(|e| ManagementError::InvalidUrl {
            url: raw,
            reason: e.to_string(),
        })
    }

    fn authorization(&self) -> Result<HeaderValue, ManagementError> {
        let token = self.token.as_deref().ok_or(ManagementError::MissingToken)?;
        let mut value = HeaderValue::from_str(&format!("token {token}"))
            .map_err(|e| ManagementError::request("authorize", e))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

#[async_trait]
impl HostManager for HostManagementClient {
    async fn replace_host(&self, cluster: &str, instance_id: &str) -> Result<(), ManagementError> {
        self.remove_host(cluster, instance_id, true).await
    }

    async fn terminate_host(&self, cluster: &str, instance_id: &str) -> Result<(), ManagementError> {
        self.remove_host(cluster, instance_id, false).await
    }

    async fn host_status(&self, host_name: &str) -> Result<Vec<HostStatus>, ManagementError> {
        let request = self.host_status_request(host_name)?;
        debug!(host = %host_name, url = %request.url(), "MANAGEMENT: Checking host status");

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| ManagementError::request("host_status", e))?;
        if response.status() != StatusCode::OK {
            return Err(unexpected_status("host_status", response.status(), response).await);
        }
        response
            .json::<Vec<HostStatus>>()
            .await
            .map_err(|e| ManagementError::invalid_response("host_status", e))
    }
}

fn removal_operation(replace: bool) -> &'static str {
    if replace {
        "replace_host"
    } else {
        "terminate_host"
    }
}

async fn unexpected_status(operation: &str, status: StatusCode, response: reqwest::Response) -> ManagementError {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    error!(status = %status, error = %body, "❌ MANAGEMENT: {} failed", operation);
    ManagementError::UnexpectedStatus {
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    }
}
