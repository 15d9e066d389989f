use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;

use crate::error::ApiError;
use crate::types::{AnalyzeResponse, ScanRequest};

/// Public SSL Labs assessment API.
pub const DEFAULT_API_URL: &str = "https://api.ssllabs.com/api/v3/";

/// The one remote call the poller depends on.
#[async_trait]
pub trait AnalyzeApi: Send + Sync {
    async fn analyze(&self, request: &ScanRequest) -> Result<AnalyzeResponse, ApiError>;
}

/// HTTP client for the `analyze` endpoint.
#[derive(Debug, Clone)]
pub struct SslLabsClient {
    http: reqwest::Client,
    analyze_url: Url,
    timeout: Duration,
}

impl SslLabsClient {
    /// Build a client rooted at `base_url`; `analyze` is resolved relative to it.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let analyze_url = Url::parse(&base)
            .and_then(|u| u.join("analyze"))
            .with_context(|| format!("invalid API url: {base_url}"))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lts-scan/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            analyze_url,
            timeout,
        })
    }

    pub fn analyze_url(&self) -> &Url {
        &self.analyze_url
    }

    fn classify(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else {
            ApiError::Transport(err)
        }
    }
}

#[async_trait]
impl AnalyzeApi for SslLabsClient {
    async fn analyze(&self, request: &ScanRequest) -> Result<AnalyzeResponse, ApiError> {
        let response = self
            .http
            .get(self.analyze_url.clone())
            .query(request)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: self.analyze_url.to_string(),
            });
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}
