use std::sync::Arc;

use chrono::Utc;

use crate::auth::principal::Principal;
use crate::auth::storage::{KeyValueStore, PRINCIPAL_KEY, TOKEN_KEY};
use crate::auth::AuthResult;

/// Mock-mode persistence of the current principal and its synthetic token.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persisted principal, or `None` when absent, unreadable or corrupt.
    pub fn read(&self) -> Option<Principal> {
        let raw = match self.store.get(PRINCIPAL_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                log::warn!("session store: failed to read principal: {}", err);
                return None;
            }
        };

        match serde_json::from_str::<Principal>(&raw) {
            Ok(principal) => Some(principal),
            Err(err) => {
                log::warn!("session store: discarding corrupt principal snapshot: {}", err);
                None
            }
        }
    }

    pub fn token(&self) -> Option<String> {
        match self.store.get(TOKEN_KEY) {
            Ok(token) => token,
            Err(err) => {
                log::warn!("session store: failed to read token: {}", err);
                None
            }
        }
    }

    /// Persist `principal` with a freshly minted token, or clear both keys on `None`.
    ///
    /// A failed write leaves no principal snapshot behind.
    pub fn write(&self, principal: Option<&Principal>) -> AuthResult<()> {
        match principal {
            Some(principal) => {
                let raw = serde_json::to_string(principal)?;
                self.store.set(PRINCIPAL_KEY, &raw)?;
                if let Err(err) = self.store.set(TOKEN_KEY, &mint_token(principal)) {
                    if let Err(rollback) = self.store.remove(PRINCIPAL_KEY) {
                        log::warn!(
                            "session store: failed to roll back principal snapshot: {}",
                            rollback
                        );
                    }
                    return Err(err);
                }
            }
            None => {
                self.store.remove(PRINCIPAL_KEY)?;
                self.store.remove(TOKEN_KEY)?;
            }
        }
        Ok(())
    }
}

/// `mock_token_<id>_<epoch-ms>`.
pub fn mint_token(principal: &Principal) -> String {
    format!(
        "mock_token_{}_{}",
        principal.id.as_deref().unwrap_or("anonymous"),
        Utc::now().timestamp_millis()
    )
}
