use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};

use crate::auth::messages::NETWORK_ERROR;
use crate::auth::principal::{Principal, ProfileUpdate};
use crate::auth::storage::{KeyValueStore, COOKIE_KEY};
use crate::auth::{AuthConfig, AuthError, AuthResult};

/// Normalized answer from the remote authority, independent of the HTTP status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteReply {
    pub ok: bool,
    pub user: Option<Principal>,
    pub message: Option<String>,
}

impl RemoteReply {
    fn network_failure() -> Self {
        Self {
            ok: false,
            user: None,
            message: Some(NETWORK_ERROR.to_string()),
        }
    }

    pub fn message_or(&self, fallback: &str) -> String {
        self.message
            .clone()
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplyBody {
    #[serde(default)]
    is_authenticated: Option<bool>,
    #[serde(default)]
    user: Option<Principal>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

/// Client for the `/auth/*` endpoints of the remote authority.
///
/// Session cookies set by the authority are kept in the client's cookie jar
/// and sent with every later request. When built with a backing store, the jar
/// is restored from `portal.auth.cookies` and written back after every reply,
/// so a later process resumes the same remote session. Requests are never retried.
#[derive(Clone)]
pub struct RemoteAuthClient {
    http: Client,
    base_url: String,
    origin: Url,
    jar: Arc<Jar>,
    cookies: Option<Arc<dyn KeyValueStore>>,
}

impl RemoteAuthClient {
    /// Client whose cookies live only as long as the process.
    pub fn new(config: &AuthConfig) -> AuthResult<Self> {
        Self::build(config, None)
    }

    /// Client whose cookies persist in `store`.
    pub fn with_cookie_store(
        config: &AuthConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> AuthResult<Self> {
        Self::build(config, Some(store))
    }

    fn build(config: &AuthConfig, cookies: Option<Arc<dyn KeyValueStore>>) -> AuthResult<Self> {
        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        let origin = Url::parse(&base_url).map_err(|err| {
            AuthError::Config(format!("invalid api base url '{}': {}", base_url, err))
        })?;

        let jar = Arc::new(Jar::default());
        let mut builder = Client::builder()
            .cookie_provider(jar.clone())
            .connect_timeout(Duration::from_secs(10))
            .user_agent("portal-session/0.1");
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }

        let client = Self {
            http: builder.build()?,
            base_url,
            origin,
            jar,
            cookies,
        };
        client.restore_cookies();
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `Cookie` header value the next request to the authority would carry.
    pub fn cookie_header(&self) -> Option<String> {
        self.jar
            .cookies(&self.origin)
            .and_then(|value| value.to_str().ok().map(str::to_string))
            .filter(|header| !header.is_empty())
    }

    /// Expires every cookie held for the authority, in memory and in the store.
    pub fn forget_session(&self) {
        if let Some(header) = self.cookie_header() {
            let names = header
                .split(';')
                .filter_map(|pair| pair.split_once('='))
                .map(|(name, _)| name.trim());
            for name in names {
                self.jar
                    .add_cookie_str(&format!("{}=; Max-Age=0; Path=/", name), &self.origin);
            }
        }
        self.save_cookies();
    }

    fn restore_cookies(&self) {
        let Some(store) = &self.cookies else {
            return;
        };
        let header = match store.get(COOKIE_KEY) {
            Ok(Some(header)) => header,
            Ok(None) => return,
            Err(err) => {
                warn!("remote auth: failed to read saved cookies: {}", err);
                return;
            }
        };

        for pair in header.split(';').map(str::trim).filter(|pair| pair.contains('=')) {
            self.jar
                .add_cookie_str(&format!("{}; Path=/", pair), &self.origin);
        }
        debug!("remote auth: restored saved cookies for {}", self.origin);
    }

    fn save_cookies(&self) {
        let Some(store) = &self.cookies else {
            return;
        };
        let result = match self.cookie_header() {
            Some(header) => store.set(COOKIE_KEY, &header),
            None => store.remove(COOKIE_KEY),
        };
        if let Err(err) = result {
            warn!("remote auth: failed to save cookies: {}", err);
        }
    }

    pub async fn status(&self) -> RemoteReply {
        let (success, body) = match self.dispatch(Method::GET, "/auth/status", None::<&()>).await {
            Some(result) => result,
            None => return RemoteReply::network_failure(),
        };

        let authenticated = success && body.is_authenticated.unwrap_or(false) && body.user.is_some();
        RemoteReply {
            ok: authenticated,
            user: if authenticated { body.user } else { None },
            message: body.message.or(body.error),
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> RemoteReply {
        let payload = LoginRequest { email, password };
        self.call(Method::POST, "/auth/login", Some(&payload)).await
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> RemoteReply {
        let payload = RegisterRequest {
            name,
            email,
            password,
        };
        self.call(Method::POST, "/auth/register", Some(&payload))
            .await
    }

    pub async fn logout(&self) -> RemoteReply {
        self.call(Method::POST, "/auth/logout", None::<&()>).await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> RemoteReply {
        self.call(Method::PUT, "/auth/profile", Some(update)).await
    }

    pub async fn change_password(&self, current: &str, next: &str) -> RemoteReply {
        let payload = ChangePasswordRequest {
            current_password: current,
            new_password: next,
        };
        self.call(Method::POST, "/auth/change-password", Some(&payload))
            .await
    }

    /// Any 2xx counts as a successful refresh.
    pub async fn refresh(&self) -> RemoteReply {
        self.call(Method::POST, "/auth/refresh", None::<&()>).await
    }

    async fn call<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&T>,
    ) -> RemoteReply {
        match self.dispatch(method, path, payload).await {
            Some((success, body)) => RemoteReply {
                ok: success,
                user: body.user,
                message: body.message.or(body.error),
            },
            None => RemoteReply::network_failure(),
        }
    }

    /// `None` on transport failure; otherwise the 2xx flag and the parsed body.
    async fn dispatch<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: Option<&T>,
    ) -> Option<(bool, ReplyBody)> {
        let url = format!("{}{}", self.base_url, path);
        debug!("remote auth: {} {}", method, url);

        let mut request: RequestBuilder = self.http.request(method.clone(), url.as_str());
        if let Some(payload) = payload {
            request = request.json(payload);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!("remote auth: {} {} failed: {}", method, url, err);
                return None;
            }
        };

        let status = response.status();
        self.save_cookies();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("remote auth: failed to read {} {} response: {}", method, url, err);
                return None;
            }
        };

        let body = if bytes.is_empty() {
            ReplyBody::default()
        } else {
            serde_json::from_slice::<ReplyBody>(&bytes).unwrap_or_else(|err| {
                warn!("remote auth: unreadable body from {} {} ({}): {}", method, url, status, err);
                ReplyBody::default()
            })
        };

        debug!("remote auth: {} {} -> {}", method, url, status.as_u16());
        Some((status.is_success(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::storage::MemoryStore;
    use crate::auth::BackendMode;

    #[test]
    fn trims_trailing_slashes_from_base_url() {
        let config = AuthConfig::new(BackendMode::Remote, "http://example.test/api///");
        let client = RemoteAuthClient::new(&config).expect("client");
        assert_eq!(client.base_url(), "http://example.test/api");
    }

    #[test]
    fn rejects_a_base_url_that_does_not_parse() {
        let config = AuthConfig::new(BackendMode::Remote, "not a url");
        assert!(matches!(
            RemoteAuthClient::new(&config),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn saved_cookies_are_restored_into_a_new_client() {
        let config = AuthConfig::new(BackendMode::Remote, "http://example.test/api");
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(COOKIE_KEY, "portal_session=abc123").unwrap();

        let client = RemoteAuthClient::with_cookie_store(&config, store).expect("client");
        assert_eq!(client.cookie_header().as_deref(), Some("portal_session=abc123"));
        assert_eq!(RemoteAuthClient::new(&config).expect("client").cookie_header(), None);
    }

    #[test]
    fn forgetting_the_session_drops_saved_cookies() {
        let config = AuthConfig::new(BackendMode::Remote, "http://example.test/api");
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set(COOKIE_KEY, "portal_session=abc123").unwrap();

        let client = RemoteAuthClient::with_cookie_store(&config, store.clone()).expect("client");
        client.forget_session();
        assert_eq!(client.cookie_header(), None);
        assert_eq!(store.get(COOKIE_KEY).unwrap(), None);
    }

    #[test]
    fn reply_messages_fall_back_when_missing_or_empty() {
        let reply = RemoteReply {
            ok: false,
            user: None,
            message: Some(String::new()),
        };
        assert_eq!(reply.message_or("fallback"), "fallback");
        assert_eq!(RemoteReply::network_failure().message_or("x"), NETWORK_ERROR);
    }

    #[tokio::test]
    async fn unreachable_authority_yields_the_network_message() {
        let config = AuthConfig::new(BackendMode::Remote, "http://127.0.0.1:9/api");
        let client = RemoteAuthClient::new(&config).expect("client");
        let reply = client.login("a@b.c", "pw").await;
        assert!(!reply.ok);
        assert_eq!(reply.message.as_deref(), Some(NETWORK_ERROR));
    }
}
