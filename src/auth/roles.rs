use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const READ: &str = "read";
pub const WRITE: &str = "write";
pub const DELETE: &str = "delete";
pub const COMMENT: &str = "comment";
pub const JOIN_EVENTS: &str = "join_events";
pub const MANAGE_USERS: &str = "manage_users";
pub const MANAGE_EVENTS: &str = "manage_events";
pub const MANAGE_ANNOUNCEMENTS: &str = "manage_announcements";

/// Portal roles, ordered from least to most privileged.
///
/// Unknown role names parse as [`Role::Guest`] so a malformed record can never
/// gain privileges.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(from = "String", into = "&'static str")]
pub enum Role {
    #[default]
    Guest,
    Member,
    Core,
    Admin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Guest, Role::Member, Role::Core, Role::Admin];

    pub fn level(&self) -> u8 {
        match self {
            Role::Guest => 0,
            Role::Member => 1,
            Role::Core => 2,
            Role::Admin => 3,
        }
    }

    /// Hierarchical check: `self` is at least as privileged as `required`.
    pub fn at_least(&self, required: Role) -> bool {
        self.level() >= required.level()
    }

    /// Static role-bucket permissions. Independent of any principal's stored set.
    pub fn permissions(&self) -> BTreeSet<String> {
        let tokens: &[&str] = match self {
            Role::Guest => &[READ],
            Role::Member => &[READ, COMMENT, JOIN_EVENTS],
            Role::Core => &[
                READ,
                COMMENT,
                JOIN_EVENTS,
                WRITE,
                MANAGE_EVENTS,
                MANAGE_ANNOUNCEMENTS,
            ],
            Role::Admin => &[
                READ,
                COMMENT,
                JOIN_EVENTS,
                WRITE,
                DELETE,
                MANAGE_USERS,
                MANAGE_EVENTS,
                MANAGE_ANNOUNCEMENTS,
            ],
        };
        tokens.iter().map(|token| token.to_string()).collect()
    }

    /// Role-bucket evaluator: whether the role name alone carries `permission`.
    pub fn grants(&self, permission: &str) -> bool {
        self.permissions().contains(permission)
    }

    pub fn from_str(role: &str) -> Self {
        match role {
            "admin" => Role::Admin,
            "core" => Role::Core,
            "member" => Role::Member,
            _ => Role::Guest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Member => "member",
            Role::Core => "core",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Role::from_str(&value)
    }
}

impl From<Role> for &'static str {
    fn from(role: Role) -> Self {
        role.as_str()
    }
}

/// Level of a role given by name; unknown names sit at the bottom of the order.
pub fn level_of(role: &str) -> u8 {
    Role::from_str(role).level()
}

pub fn permissions_of_role(role: &str) -> BTreeSet<String> {
    Role::from_str(role).permissions()
}
