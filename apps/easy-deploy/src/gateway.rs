//! The one REST call the controllers need: which registry account the
//! executor should push built images with.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

const LOGIN_ACCOUNT_PATH: &str = "api/docker_account/query_login_account";

/// The registry account currently logged in for builds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCredential {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub is_default: bool,
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("invalid gateway configuration: {0}")]
    InvalidConfig(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
    #[error("gateway rejected request: {0}")]
    Rejected(String),
    #[error("no registry account is logged in; log in to a registry account on the profile page first")]
    MissingCredential,
}

#[async_trait]
pub trait CredentialGateway: Send + Sync {
    async fn default_build_credential(&self) -> Result<BuildCredential, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

impl ApiEnvelope<BuildCredential> {
    fn into_credential(self) -> Result<BuildCredential, GatewayError> {
        if self.code != 200 {
            return Err(GatewayError::Rejected(
                self.message
                    .filter(|message| !message.trim().is_empty())
                    .unwrap_or_else(|| format!("code {}", self.code)),
            ));
        }
        self.data.ok_or(GatewayError::MissingCredential)
    }
}

/// Talks to the dashboard API over HTTP with a bearer token.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

impl HttpGateway {
    pub fn new(base_url: impl AsRef<str>, token: impl Into<String>) -> Result<Self, GatewayError> {
        let mut base = base_url.as_ref().trim().to_string();
        if base.is_empty() {
            return Err(GatewayError::InvalidConfig(
                "api base url cannot be empty".into(),
            ));
        }
        if !base.starts_with("http://") && !base.starts_with("https://") {
            base = format!("http://{base}");
        }
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base)
            .map_err(|err| GatewayError::InvalidConfig(format!("invalid api base url: {err}")))?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

#[async_trait]
impl CredentialGateway for HttpGateway {
    async fn default_build_credential(&self) -> Result<BuildCredential, GatewayError> {
        let endpoint = self.base_url.join(LOGIN_ACCOUNT_PATH).map_err(|err| {
            GatewayError::InvalidConfig(format!("invalid login account endpoint: {err}"))
        })?;
        debug!(target = "gateway", url = %endpoint, "querying login account");
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GatewayError::HttpStatus(response.status()));
        }
        let envelope = response.json::<ApiEnvelope<BuildCredential>>().await?;
        envelope.into_credential()
    }
}
