use thiserror::Error;
use url::Url;

/// Executor endpoint a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Docker,
    K8s,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("websocket base url cannot be empty")]
    EmptyBase,
    #[error("session token cannot be empty")]
    EmptyToken,
    #[error("invalid websocket url: {0}")]
    Invalid(String),
}

impl Channel {
    pub fn path(self) -> &'static str {
        match self {
            Channel::Docker => "/ws/docker",
            Channel::K8s => "/ws/k8s",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Channel::Docker => "docker",
            Channel::K8s => "k8s",
        }
    }

    /// Builds `ws://<host>/ws/<channel>?token=<token>` from a host or base url.
    /// `http`/`https` bases are mapped onto `ws`/`wss`.
    pub fn endpoint(self, base: &str, token: &str) -> Result<Url, EndpointError> {
        let trimmed = base.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(EndpointError::EmptyBase);
        }
        if token.trim().is_empty() {
            return Err(EndpointError::EmptyToken);
        }

        let raw = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("ws://{trimmed}")
        };
        let mut url =
            Url::parse(&raw).map_err(|err| EndpointError::Invalid(format!("{raw}: {err}")))?;
        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => {
                return Err(EndpointError::Invalid(format!(
                    "unsupported scheme {other} in {raw}"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| EndpointError::Invalid(format!("cannot use scheme {scheme} for {raw}")))?;
        url.set_path(self.path());
        url.set_fragment(None);
        url.query_pairs_mut().clear().append_pair("token", token);
        Ok(url)
    }
}
