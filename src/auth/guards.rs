//! Navigation guards over a [`SessionSnapshot`].
//!
//! Every guard answers [`GuardDecision::Pending`] until the session has settled,
//! so no redirect is ever decided from a half-loaded state.

use crate::auth::controller::SessionSnapshot;
use crate::auth::roles::Role;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session still loading: render a placeholder.
    Pending,
    Allow,
    /// Navigate to `to`; `return_to` is the location to resume after signing in.
    Redirect {
        to: String,
        return_to: Option<String>,
    },
    /// Render the access-denied view, or `fallback` when one was supplied.
    Deny { fallback: Option<String> },
}

/// A requested location plus the post-login target carried by a previous redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub path: String,
    pub return_to: Option<String>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            return_to: None,
        }
    }

    pub fn with_return_to(mut self, return_to: impl Into<String>) -> Self {
        self.return_to = Some(return_to.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardPaths {
    pub login: String,
    pub home: String,
}

impl Default for GuardPaths {
    fn default() -> Self {
        Self {
            login: "/login".into(),
            home: "/dashboard".into(),
        }
    }
}

pub trait RouteGuard {
    fn evaluate(&self, session: &SessionSnapshot, location: &Location) -> GuardDecision;
}

fn to_login(paths: &GuardPaths, location: &Location) -> GuardDecision {
    GuardDecision::Redirect {
        to: paths.login.clone(),
        return_to: Some(location.path.clone()),
    }
}

/// Sends anonymous callers to the login view.
#[derive(Debug, Clone, Default)]
pub struct AuthenticationGuard {
    pub paths: GuardPaths,
}

impl RouteGuard for AuthenticationGuard {
    fn evaluate(&self, session: &SessionSnapshot, location: &Location) -> GuardDecision {
        if !session.is_settled() {
            GuardDecision::Pending
        } else if session.is_authenticated() {
            GuardDecision::Allow
        } else {
            to_login(&self.paths, location)
        }
    }
}

/// For login and registration views: signed-in callers are sent on to the
/// location they originally asked for, or home.
#[derive(Debug, Clone, Default)]
pub struct GuestOnlyGuard {
    pub paths: GuardPaths,
}

impl RouteGuard for GuestOnlyGuard {
    fn evaluate(&self, session: &SessionSnapshot, location: &Location) -> GuardDecision {
        if !session.is_settled() {
            GuardDecision::Pending
        } else if session.is_authenticated() {
            GuardDecision::Redirect {
                to: location
                    .return_to
                    .clone()
                    .unwrap_or_else(|| self.paths.home.clone()),
                return_to: None,
            }
        } else {
            GuardDecision::Allow
        }
    }
}

/// Authenticated callers below `required` are denied in place, not redirected.
#[derive(Debug, Clone)]
pub struct RoleGuard {
    pub required: Role,
    pub fallback: Option<String>,
    pub paths: GuardPaths,
}

impl RoleGuard {
    pub fn new(required: Role) -> Self {
        Self {
            required,
            fallback: None,
            paths: GuardPaths::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }
}

impl RouteGuard for RoleGuard {
    fn evaluate(&self, session: &SessionSnapshot, location: &Location) -> GuardDecision {
        if !session.is_settled() {
            GuardDecision::Pending
        } else if !session.is_authenticated() {
            to_login(&self.paths, location)
        } else if session.has_role(self.required) {
            GuardDecision::Allow
        } else {
            GuardDecision::Deny {
                fallback: self.fallback.clone(),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PermissionGuard {
    pub permission: String,
    pub fallback: Option<String>,
    pub paths: GuardPaths,
}

impl PermissionGuard {
    pub fn new(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            fallback: None,
            paths: GuardPaths::default(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }
}

impl RouteGuard for PermissionGuard {
    fn evaluate(&self, session: &SessionSnapshot, location: &Location) -> GuardDecision {
        if !session.is_settled() {
            GuardDecision::Pending
        } else if !session.is_authenticated() {
            to_login(&self.paths, location)
        } else if session.has_permission(&self.permission) {
            GuardDecision::Allow
        } else {
            GuardDecision::Deny {
                fallback: self.fallback.clone(),
            }
        }
    }
}
