//! The session state machine: `uninitialized -> loading -> {authenticated, anonymous}`.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::RwLock;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::auth::directory::MockDirectory;
use crate::auth::messages::*;
use crate::auth::principal::{Principal, ProfileUpdate};
use crate::auth::remote::RemoteAuthClient;
use crate::auth::roles::{
    Role, DELETE, MANAGE_ANNOUNCEMENTS, MANAGE_EVENTS, MANAGE_USERS, WRITE,
};
use crate::auth::session_store::SessionStore;
use crate::auth::storage::{FileStore, KeyValueStore};
use crate::auth::{AuthConfig, AuthOutcome, AuthResult, BackendMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Uninitialized,
    Loading,
    Authenticated,
    Anonymous,
}

#[derive(Debug, Default)]
struct SessionState {
    principal: Option<Principal>,
    initialized: bool,
    in_flight: bool,
}

impl SessionState {
    fn phase(&self) -> AuthPhase {
        if self.in_flight {
            AuthPhase::Loading
        } else if !self.initialized {
            AuthPhase::Uninitialized
        } else if self.principal.is_some() {
            AuthPhase::Authenticated
        } else {
            AuthPhase::Anonymous
        }
    }
}

/// Point-in-time copy of the session, consumed by route guards and views.
///
/// `is_authenticated` is derived from `principal`, never stored separately.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: AuthPhase,
    pub principal: Option<Principal>,
}

impl SessionSnapshot {
    pub fn anonymous() -> Self {
        Self {
            phase: AuthPhase::Anonymous,
            principal: None,
        }
    }

    pub fn authenticated(principal: Principal) -> Self {
        Self {
            phase: AuthPhase::Authenticated,
            principal: Some(principal),
        }
    }

    pub fn loading(principal: Option<Principal>) -> Self {
        Self {
            phase: AuthPhase::Loading,
            principal,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.phase == AuthPhase::Loading
    }

    /// Settled means a guard may make a decision.
    pub fn is_settled(&self) -> bool {
        matches!(self.phase, AuthPhase::Authenticated | AuthPhase::Anonymous)
    }

    pub fn has_role(&self, required: Role) -> bool {
        self.principal
            .as_ref()
            .is_some_and(|principal| principal.has_role(required))
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.principal
            .as_ref()
            .is_some_and(|principal| principal.has_permission(permission))
    }
}

/// Owns the current session and mediates between the mock and remote backends.
///
/// Operations are serialized through a single-slot gate: a call made while
/// another is outstanding waits for it to finish. Reads never wait. There is
/// no timeout or cancellation at this level; a hung remote call keeps the
/// controller in [`AuthPhase::Loading`].
pub struct SessionController {
    mode: BackendMode,
    sessions: SessionStore,
    directory: MockDirectory,
    remote: RemoteAuthClient,
    state: RwLock<SessionState>,
    gate: Mutex<()>,
}

struct Operation<'a> {
    state: &'a RwLock<SessionState>,
    _slot: MutexGuard<'a, ()>,
}

impl Drop for Operation<'_> {
    fn drop(&mut self) {
        let mut state = self.state.write();
        state.in_flight = false;
        state.initialized = true;
        debug!("session: settled as {:?}", state.phase());
    }
}

impl SessionController {
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn KeyValueStore>,
        directory: MockDirectory,
    ) -> AuthResult<Self> {
        Ok(Self {
            mode: config.mode,
            remote: RemoteAuthClient::with_cookie_store(config, store.clone())?,
            sessions: SessionStore::new(store),
            directory,
            state: RwLock::new(SessionState::default()),
            gate: Mutex::new(()),
        })
    }

    /// Builds a controller and runs the initial status probe.
    pub async fn connect(
        config: &AuthConfig,
        store: Arc<dyn KeyValueStore>,
        directory: MockDirectory,
    ) -> AuthResult<Self> {
        let controller = Self::new(config, store, directory)?;
        controller.check_status().await;
        Ok(controller)
    }

    /// File-backed store at `config.store_path` and the demo account table.
    pub async fn from_config(config: &AuthConfig) -> AuthResult<Self> {
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.store_path));
        Self::connect(config, store, MockDirectory::with_demo_accounts()).await
    }

    async fn begin(&self) -> Operation<'_> {
        let slot = self.gate.lock().await;
        self.state.write().in_flight = true;
        debug!("session: operation started");
        Operation {
            state: &self.state,
            _slot: slot,
        }
    }

    fn replace_principal(&self, principal: Option<Principal>) {
        self.state.write().principal = principal;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read();
        SessionSnapshot {
            phase: state.phase(),
            principal: state.principal.clone(),
        }
    }

    pub fn phase(&self) -> AuthPhase {
        self.state.read().phase()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.state.read().principal.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.read().principal.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().in_flight
    }

    /// Synthetic token of the persisted mock session, if any.
    pub fn token(&self) -> Option<String> {
        self.sessions.token()
    }

    /// Probes the current session. Never fails: any problem resolves to anonymous.
    pub async fn check_status(&self) {
        let _op = self.begin().await;
        self.probe().await;
    }

    async fn probe(&self) {
        let principal = match self.mode {
            BackendMode::Mock => self.sessions.read(),
            BackendMode::Remote => {
                let reply = self.remote.status().await;
                if !reply.ok {
                    if let Some(message) = reply.message.as_deref() {
                        debug!("session: status probe reported '{}'", message);
                    }
                }
                reply.user
            }
        };
        self.replace_principal(principal);
    }

    /// Signing in over an existing session is refused; log out first.
    pub async fn login(&self, email: &str, password: &str) -> AuthOutcome {
        let _op = self.begin().await;
        if self.is_authenticated() {
            return AuthOutcome::failure(ALREADY_SIGNED_IN);
        }

        match self.mode {
            BackendMode::Mock => self.login_mock(email, password),
            BackendMode::Remote => {
                let reply = self.remote.login(email, password).await;
                match reply.user.clone() {
                    Some(user) if reply.ok => {
                        info!("session: signed in as {}", user.email);
                        self.replace_principal(Some(user));
                        AuthOutcome::success(reply.message_or(LOGIN_SUCCEEDED))
                    }
                    None if reply.ok => AuthOutcome::failure(REQUEST_FAILED),
                    _ => AuthOutcome::failure(reply.message_or(INVALID_CREDENTIALS)),
                }
            }
        }
    }

    fn login_mock(&self, email: &str, password: &str) -> AuthOutcome {
        let Some(mut principal) = self.directory.verify(email, password) else {
            debug!("session: rejected credentials for {}", email);
            return AuthOutcome::failure(INVALID_CREDENTIALS);
        };

        principal.last_login = Some(Utc::now());
        if let Err(err) = self.sessions.write(Some(&principal)) {
            warn!("session: failed to persist login for {}: {}", email, err);
            return AuthOutcome::failure(STORAGE_FAILED);
        }

        info!("session: signed in as {}", principal.email);
        self.replace_principal(Some(principal));
        AuthOutcome::success(LOGIN_SUCCEEDED)
    }

    /// Creates a member account and signs it in. Refused over an existing session.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> AuthOutcome {
        let _op = self.begin().await;
        if self.is_authenticated() {
            return AuthOutcome::failure(ALREADY_SIGNED_IN);
        }

        match self.mode {
            BackendMode::Mock => self.register_mock(name, email, password),
            BackendMode::Remote => {
                let reply = self.remote.register(name, email, password).await;
                match reply.user.clone() {
                    Some(user) if reply.ok => {
                        info!("session: registered {}", user.email);
                        self.replace_principal(Some(user));
                        AuthOutcome::success(reply.message_or(REGISTER_SUCCEEDED))
                    }
                    _ => AuthOutcome::failure(reply.message_or(REQUEST_FAILED)),
                }
            }
        }
    }

    fn register_mock(&self, name: &str, email: &str, password: &str) -> AuthOutcome {
        if self.directory.contains_email(email) {
            return AuthOutcome::failure(EMAIL_TAKEN);
        }

        let principal = Principal::new_member(Uuid::new_v4().to_string(), name, email);
        if let Err(err) = self.sessions.write(Some(&principal)) {
            warn!("session: failed to persist registration for {}: {}", email, err);
            return AuthOutcome::failure(STORAGE_FAILED);
        }

        self.directory.insert(principal.clone(), password);
        info!("session: registered {}", principal.email);
        self.replace_principal(Some(principal));
        AuthOutcome::success(REGISTER_SUCCEEDED)
    }

    /// Always ends anonymous, whatever the store or the authority reports.
    pub async fn logout(&self) -> AuthOutcome {
        let _op = self.begin().await;
        match self.mode {
            BackendMode::Mock => {
                if let Err(err) = self.sessions.write(None) {
                    warn!("session: failed to clear persisted session: {}", err);
                }
            }
            BackendMode::Remote => {
                let reply = self.remote.logout().await;
                if !reply.ok {
                    warn!(
                        "session: remote logout failed: {}",
                        reply.message_or(REQUEST_FAILED)
                    );
                }
                self.remote.forget_session();
            }
        }

        self.replace_principal(None);
        info!("session: signed out");
        AuthOutcome::success(LOGGED_OUT)
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> AuthOutcome {
        let _op = self.begin().await;
        match self.mode {
            BackendMode::Mock => self.update_profile_mock(update),
            BackendMode::Remote => {
                let reply = self.remote.update_profile(&update).await;
                if !reply.ok {
                    return AuthOutcome::failure(reply.message_or(REQUEST_FAILED));
                }

                let next = match reply.user.clone() {
                    Some(user) => Some(user),
                    None => self.principal().map(|mut current| {
                        current.apply(update);
                        current
                    }),
                };
                self.replace_principal(next);
                AuthOutcome::success(reply.message_or(PROFILE_UPDATED))
            }
        }
    }

    fn update_profile_mock(&self, update: ProfileUpdate) -> AuthOutcome {
        let Some(mut principal) = self.principal() else {
            return AuthOutcome::failure(NOT_SIGNED_IN);
        };

        principal.apply(update.clone());
        if let Err(err) = self.sessions.write(Some(&principal)) {
            warn!("session: failed to persist profile update: {}", err);
            return AuthOutcome::failure(STORAGE_FAILED);
        }

        if let Some(id) = principal.id.as_deref() {
            self.directory.update(id, update);
        }
        self.replace_principal(Some(principal));
        AuthOutcome::success(PROFILE_UPDATED)
    }

    /// Remote in every mode: there is no mock implementation of this operation.
    pub async fn change_password(&self, current: &str, next: &str) -> AuthOutcome {
        let _op = self.begin().await;
        let reply = self.remote.change_password(current, next).await;
        if reply.ok {
            AuthOutcome::success(reply.message_or(PASSWORD_CHANGED))
        } else {
            AuthOutcome::failure(reply.message_or(PASSWORD_CHANGE_FAILED))
        }
    }

    /// Remote in every mode. Success re-probes the session; failure ends it.
    pub async fn refresh_token(&self) -> AuthOutcome {
        let _op = self.begin().await;
        let reply = self.remote.refresh().await;
        if reply.ok {
            self.probe().await;
            return if self.is_authenticated() {
                AuthOutcome::success(SESSION_REFRESHED)
            } else {
                AuthOutcome::failure(SESSION_EXPIRED)
            };
        }

        warn!(
            "session: token refresh failed, ending session: {}",
            reply.message_or(REQUEST_FAILED)
        );
        if let Err(err) = self.sessions.write(None) {
            warn!("session: failed to clear persisted session: {}", err);
        }
        self.remote.forget_session();
        self.replace_principal(None);
        AuthOutcome::failure(SESSION_EXPIRED)
    }

    fn check(&self, predicate: impl FnOnce(&Principal) -> bool) -> bool {
        self.state.read().principal.as_ref().is_some_and(predicate)
    }

    /// Hierarchical: the current role is `required` or above.
    pub fn has_role(&self, required: Role) -> bool {
        self.check(|principal| principal.has_role(required))
    }

    /// Exact membership in the principal's stored permission set.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.check(|principal| principal.has_permission(permission))
    }

    /// Role-bucket evaluator: ignores the stored set entirely.
    pub fn role_grants(&self, permission: &str) -> bool {
        self.check(|principal| principal.role.grants(permission))
    }

    /// Stored set when present, role bucket otherwise.
    pub fn permits(&self, permission: &str) -> bool {
        self.check(|principal| principal.permits(permission))
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_core_team(&self) -> bool {
        self.has_role(Role::Core)
    }

    pub fn is_member(&self) -> bool {
        self.has_role(Role::Member)
    }

    pub fn can_manage_users(&self) -> bool {
        self.has_permission(MANAGE_USERS)
    }

    pub fn can_manage_events(&self) -> bool {
        self.has_permission(MANAGE_EVENTS)
    }

    pub fn can_manage_announcements(&self) -> bool {
        self.has_permission(MANAGE_ANNOUNCEMENTS)
    }

    pub fn can_write(&self) -> bool {
        self.has_permission(WRITE)
    }

    pub fn can_delete(&self) -> bool {
        self.has_permission(DELETE)
    }
}
