pub mod auth;

use std::sync::Once;

use env_logger::Env;

static LOGGER: Once = Once::new();

/// Initialise `env_logger` once per process, honouring `RUST_LOG`.
pub fn init_logger() {
    LOGGER.call_once(|| {
        env_logger::Builder::from_env(Env::default().default_filter_or("info"))
            .format_timestamp(None)
            .init();
    });
}

pub mod test_support {
    //! A Rocket stand-in for the remote authority, served on an ephemeral port
    //! so `RemoteAuthClient` can be exercised over real HTTP.

    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use chrono::Utc;
    use parking_lot::Mutex;
    use rocket::config::LogLevel;
    use rocket::http::{Cookie, CookieJar, Status};
    use rocket::serde::json::Json;
    use rocket::{Build, Rocket, Shutdown, State, get, post, put, routes};
    use serde::Deserialize;
    use serde_json::{Value, json};
    use thiserror::Error;
    use uuid::Uuid;

    use crate::auth::messages::{
        EMAIL_TAKEN, INVALID_CREDENTIALS, LOGIN_SUCCEEDED, NOT_SIGNED_IN, PASSWORD_CHANGED,
        PROFILE_UPDATED, REGISTER_SUCCEEDED,
    };
    use crate::auth::{MockDirectory, Principal, ProfileUpdate};

    pub const SESSION_COOKIE: &str = "portal_session";
    pub const WRONG_CURRENT_PASSWORD: &str = "目前密碼不正確";

    #[derive(Debug, Error)]
    pub enum TestAuthorityError {
        #[error("io error: {0}")]
        Io(#[from] std::io::Error),
        #[error("rocket error: {0}")]
        Rocket(#[from] Box<rocket::Error>),
        #[error("authority did not start listening on port {0}")]
        NotListening(u16),
    }

    /// Failure switches flipped by tests while the authority is running.
    #[derive(Debug, Default)]
    pub struct AuthorityControls {
        reject_refresh: AtomicBool,
        fail_logout: AtomicBool,
    }

    impl AuthorityControls {
        pub fn reject_refresh(&self, reject: bool) {
            self.reject_refresh.store(reject, Ordering::SeqCst);
        }

        pub fn fail_logout(&self, fail: bool) {
            self.fail_logout.store(fail, Ordering::SeqCst);
        }
    }

    struct AuthorityState {
        directory: MockDirectory,
        sessions: Mutex<HashMap<String, String>>,
        controls: Arc<AuthorityControls>,
    }

    type Reply = (Status, Json<Value>);

    fn session_user(state: &AuthorityState, cookies: &CookieJar<'_>) -> Option<Principal> {
        let token = cookies.get(SESSION_COOKIE)?.value().to_string();
        let id = state.sessions.lock().get(&token).cloned()?;
        state.directory.find_by_id(&id)
    }

    fn open_session(state: &AuthorityState, cookies: &CookieJar<'_>, principal: &Principal) {
        let token = Uuid::new_v4().to_string();
        if let Some(id) = principal.id.clone() {
            state.sessions.lock().insert(token.clone(), id);
        }
        cookies.add(Cookie::new(SESSION_COOKIE, token));
    }

    fn close_session(state: &AuthorityState, cookies: &CookieJar<'_>) {
        if let Some(cookie) = cookies.get(SESSION_COOKIE) {
            state.sessions.lock().remove(cookie.value());
        }
        cookies.remove(Cookie::from(SESSION_COOKIE));
    }

    fn message(status: Status, message: &str) -> Reply {
        (status, Json(json!({ "message": message })))
    }

    #[get("/auth/status")]
    fn status(state: &State<AuthorityState>, cookies: &CookieJar<'_>) -> Json<Value> {
        match session_user(state, cookies) {
            Some(user) => Json(json!({ "isAuthenticated": true, "user": user })),
            None => Json(json!({ "isAuthenticated": false, "user": null })),
        }
    }

    #[derive(Deserialize)]
    struct Credentials {
        email: String,
        password: String,
    }

    #[post("/auth/login", data = "<payload>")]
    fn login(
        state: &State<AuthorityState>,
        cookies: &CookieJar<'_>,
        payload: Json<Credentials>,
    ) -> Reply {
        match state.directory.verify(&payload.email, &payload.password) {
            Some(mut user) => {
                user.last_login = Some(Utc::now());
                open_session(state, cookies, &user);
                (
                    Status::Ok,
                    Json(json!({ "user": user, "message": LOGIN_SUCCEEDED })),
                )
            }
            None => message(Status::Unauthorized, INVALID_CREDENTIALS),
        }
    }

    #[derive(Deserialize)]
    struct Registration {
        name: String,
        email: String,
        password: String,
    }

    #[post("/auth/register", data = "<payload>")]
    fn register(
        state: &State<AuthorityState>,
        cookies: &CookieJar<'_>,
        payload: Json<Registration>,
    ) -> Reply {
        if state.directory.contains_email(&payload.email) {
            return message(Status::Conflict, EMAIL_TAKEN);
        }

        let user = Principal::new_member(Uuid::new_v4().to_string(), &payload.name, &payload.email);
        state.directory.insert(user.clone(), payload.password.clone());
        open_session(state, cookies, &user);
        (
            Status::Created,
            Json(json!({ "user": user, "message": REGISTER_SUCCEEDED })),
        )
    }

    #[post("/auth/logout")]
    fn logout(state: &State<AuthorityState>, cookies: &CookieJar<'_>) -> Reply {
        if state.controls.fail_logout.load(Ordering::SeqCst) {
            return message(Status::InternalServerError, "logout unavailable");
        }
        close_session(state, cookies);
        (Status::Ok, Json(json!({})))
    }

    #[put("/auth/profile", data = "<payload>")]
    fn profile(
        state: &State<AuthorityState>,
        cookies: &CookieJar<'_>,
        payload: Json<ProfileUpdate>,
    ) -> Reply {
        let Some(id) = session_user(state, cookies).and_then(|user| user.id) else {
            return message(Status::Unauthorized, NOT_SIGNED_IN);
        };

        match state.directory.update(&id, payload.into_inner()) {
            Some(user) => (
                Status::Ok,
                Json(json!({ "user": user, "message": PROFILE_UPDATED })),
            ),
            None => message(Status::NotFound, NOT_SIGNED_IN),
        }
    }

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct PasswordChange {
        current_password: String,
        new_password: String,
    }

    #[post("/auth/change-password", data = "<payload>")]
    fn change_password(
        state: &State<AuthorityState>,
        cookies: &CookieJar<'_>,
        payload: Json<PasswordChange>,
    ) -> Reply {
        let Some(id) = session_user(state, cookies).and_then(|user| user.id) else {
            return message(Status::Unauthorized, NOT_SIGNED_IN);
        };

        if state
            .directory
            .change_password(&id, &payload.current_password, &payload.new_password)
        {
            message(Status::Ok, PASSWORD_CHANGED)
        } else {
            message(Status::BadRequest, WRONG_CURRENT_PASSWORD)
        }
    }

    #[post("/auth/refresh")]
    fn refresh(state: &State<AuthorityState>, cookies: &CookieJar<'_>) -> Reply {
        if state.controls.reject_refresh.load(Ordering::SeqCst) {
            close_session(state, cookies);
            return message(Status::Unauthorized, "refresh rejected");
        }
        match session_user(state, cookies) {
            Some(_) => (Status::Ok, Json(json!({}))),
            None => message(Status::Unauthorized, NOT_SIGNED_IN),
        }
    }

    /// Builder for the stub authority.
    pub struct StubAuthority {
        directory: MockDirectory,
        controls: Arc<AuthorityControls>,
    }

    impl StubAuthority {
        /// Authority backed by the demo account table.
        pub fn new() -> Self {
            Self::with_directory(MockDirectory::with_demo_accounts())
        }

        pub fn with_directory(directory: MockDirectory) -> Self {
            Self {
                directory,
                controls: Arc::new(AuthorityControls::default()),
            }
        }

        /// Rocket instance with the auth routes mounted under `/api`.
        pub fn build(&self, port: u16) -> Rocket<Build> {
            let figment = rocket::Config::figment()
                .merge(("address", "127.0.0.1"))
                .merge(("port", port))
                .merge(("log_level", LogLevel::Off))
                .merge(("cli_colors", false));

            rocket::custom(figment)
                .manage(AuthorityState {
                    directory: self.directory.clone(),
                    sessions: Mutex::new(HashMap::new()),
                    controls: self.controls.clone(),
                })
                .mount(
                    "/api",
                    routes![
                        status,
                        login,
                        register,
                        logout,
                        profile,
                        change_password,
                        refresh
                    ],
                )
        }

        /// Serve on a free local port until the returned handle is dropped.
        pub async fn launch(self) -> Result<RunningAuthority, TestAuthorityError> {
            let port = std::net::TcpListener::bind("127.0.0.1:0")?
                .local_addr()?
                .port();

            let rocket = self.build(port).ignite().await.map_err(Box::new)?;
            let shutdown = rocket.shutdown();
            tokio::spawn(async move {
                if let Err(err) = rocket.launch().await {
                    log::error!("stub authority stopped: {}", err);
                }
            });

            for _ in 0..100 {
                if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                    return Ok(RunningAuthority {
                        base_url: format!("http://127.0.0.1:{port}/api"),
                        directory: self.directory,
                        controls: self.controls,
                        shutdown,
                    });
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }

            shutdown.notify();
            Err(TestAuthorityError::NotListening(port))
        }
    }

    impl Default for StubAuthority {
        fn default() -> Self {
            Self::new()
        }
    }

    pub struct RunningAuthority {
        base_url: String,
        directory: MockDirectory,
        controls: Arc<AuthorityControls>,
        shutdown: Shutdown,
    }

    impl RunningAuthority {
        pub fn base_url(&self) -> &str {
            &self.base_url
        }

        /// The account table the authority serves; shared, not copied.
        pub fn directory(&self) -> &MockDirectory {
            &self.directory
        }

        pub fn controls(&self) -> &AuthorityControls {
            &self.controls
        }
    }

    impl Drop for RunningAuthority {
        fn drop(&mut self) {
            self.shutdown.clone().notify();
        }
    }
}
