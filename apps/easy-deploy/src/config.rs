use std::env;
use std::time::Duration;

use crate::console::OperationTimeouts;

pub const DEFAULT_WS_BASE: &str = "ws://localhost:53801";
pub const DEFAULT_API_BASE: &str = "http://localhost:18081";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub ws_base: String,
    pub api_base: String,
    pub token: Option<String>,
    pub connect_timeout: Duration,
    pub deploy_timeout: Duration,
    pub stop_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, fallback: Duration| {
            normalize_opt(lookup(key))
                .and_then(|value| value.parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Self {
            ws_base: normalize_opt(lookup("EASY_DEPLOY_WS_BASE")).unwrap_or(defaults.ws_base),
            api_base: normalize_opt(lookup("EASY_DEPLOY_API_BASE")).unwrap_or(defaults.api_base),
            token: normalize_opt(lookup("EASY_DEPLOY_TOKEN")),
            connect_timeout: secs("EASY_DEPLOY_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            deploy_timeout: secs("EASY_DEPLOY_DEPLOY_TIMEOUT_SECS", defaults.deploy_timeout),
            stop_timeout: secs("EASY_DEPLOY_STOP_TIMEOUT_SECS", defaults.stop_timeout),
        }
    }

    /// Applies command-line values over whatever the environment provided.
    pub fn with_overrides(
        mut self,
        ws_base: Option<String>,
        api_base: Option<String>,
        token: Option<String>,
    ) -> Self {
        if let Some(ws_base) = normalize_opt(ws_base) {
            self.ws_base = ws_base;
        }
        if let Some(api_base) = normalize_opt(api_base) {
            self.api_base = api_base;
        }
        if let Some(token) = normalize_opt(token) {
            self.token = Some(token);
        }
        self
    }

    pub fn operation_timeouts(&self) -> OperationTimeouts {
        OperationTimeouts {
            deploy: self.deploy_timeout,
            stop: self.stop_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let timeouts = OperationTimeouts::default();
        Self {
            ws_base: DEFAULT_WS_BASE.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            token: None,
            connect_timeout: deploy_transport::DEFAULT_CONNECT_TIMEOUT,
            deploy_timeout: timeouts.deploy,
            stop_timeout: timeouts.stop,
        }
    }
}

fn normalize_opt(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
