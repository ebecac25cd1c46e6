//! HTTP client for the Tractive telemetry API.
//!
//! [`TelemetryApi`] is the seam the authenticator and the report gateway call
//! through; [`TractiveClient`] is the reqwest-backed implementation.

use async_trait::async_trait;
use reqwest::{Client, Response, header};

use crate::config::{AccountCredentials, GatewayConfig};
use crate::credential::Credential;
use crate::error::{GatewayError, Result};
use crate::types::{ReportKind, TrackerId};

/// Fixed client identifier the upstream expects on every call
pub const TRACTIVE_CLIENT_ID: &str = "625e533dc3c3b41c28a669f0";
const CLIENT_HEADER: &str = "X-Tractive-Client";

/// Outbound calls to the telemetry provider.
#[async_trait]
pub trait TelemetryApi: Send + Sync {
    /// `POST auth/token` with the account's email and password.
    async fn issue_token(&self, account: &AccountCredentials) -> Result<Credential>;

    /// `GET {kind}/{tracker_id}` with a bearer token. Returns the raw JSON body.
    async fn fetch_report(
        &self,
        kind: ReportKind,
        tracker_id: &TrackerId,
        bearer: &str,
    ) -> Result<serde_json::Value>;
}

pub struct TractiveClient {
    http_client: Client,
    base_url: String,
}

impl TractiveClient {
    /// Build a client from the gateway config. `config.timeout` bounds every call.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TelemetryApi for TractiveClient {
    async fn issue_token(&self, account: &AccountCredentials) -> Result<Credential> {
        let url = format!("{}/auth/token", self.base_url);

        let response = self
            .http_client
            .post(&url)
            .query(&[
                ("platform_email", account.email.as_str()),
                ("platform_token", account.password.as_str()),
                ("grant_type", "tractive"),
            ])
            .header(CLIENT_HEADER, TRACTIVE_CLIENT_ID)
            .header(header::CONTENT_TYPE, "application/json")
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<Credential>().await?)
    }

    async fn fetch_report(
        &self,
        kind: ReportKind,
        tracker_id: &TrackerId,
        bearer: &str,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/{}/{}", self.base_url, kind.path(), tracker_id);

        let response = self
            .http_client
            .get(&url)
            .header(CLIENT_HEADER, TRACTIVE_CLIENT_ID)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(bearer)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<serde_json::Value>().await?)
    }
}

/// Turn a non-2xx response into [`GatewayError::Upstream`] carrying its status and body.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Upstream {
        status: Some(status.as_u16()),
        message: format!("{} {}", status, body).trim_end().to_string(),
    })
}
