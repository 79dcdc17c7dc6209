use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::auth::{AuthError, AuthResult};

/// Which backend the controller talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendMode {
    /// In-process user table plus the persistent key-value store.
    #[default]
    Mock,
    /// The HTTP authority under `api_base_url`.
    Remote,
}

impl FromStr for BackendMode {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mock" => Ok(BackendMode::Mock),
            "remote" | "real" => Ok(BackendMode::Remote),
            other => Err(AuthError::Config(format!(
                "unsupported auth mode '{other}', expected 'mock' or 'remote'"
            ))),
        }
    }
}

/// Session core configuration, injected into the controller at construction.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub mode: BackendMode,
    pub api_base_url: String,
    pub store_path: PathBuf,
    pub request_timeout: Option<Duration>,
}

impl AuthConfig {
    pub fn new(mode: BackendMode, api_base_url: impl Into<String>) -> Self {
        Self {
            mode,
            api_base_url: api_base_url.into(),
            store_path: PathBuf::from(".portal-session.json"),
            request_timeout: None,
        }
    }

    pub fn from_env() -> AuthResult<Self> {
        let mode = match env::var("PORTAL_AUTH_MODE") {
            Ok(value) => value.parse::<BackendMode>()?,
            Err(_) => BackendMode::default(),
        };
        let api_base_url = env::var("PORTAL_API_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000/api".into());
        let store_path = env::var("PORTAL_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".portal-session.json"));
        let request_timeout = env::var("PORTAL_AUTH_TIMEOUT_MS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_millis);

        Ok(Self {
            mode,
            api_base_url,
            store_path,
            request_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_modes() {
        assert_eq!("mock".parse::<BackendMode>().unwrap(), BackendMode::Mock);
        assert_eq!(" Remote ".parse::<BackendMode>().unwrap(), BackendMode::Remote);
        assert!(matches!(
            "offline".parse::<BackendMode>(),
            Err(AuthError::Config(_))
        ));
    }
}
