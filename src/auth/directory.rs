//! In-memory user table used as the credential validator in mock mode.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use parking_lot::RwLock;

use crate::auth::principal::{Principal, Profile, ProfileUpdate, SocialLinks};
use crate::auth::roles::{
    Role, COMMENT, DELETE, JOIN_EVENTS, MANAGE_ANNOUNCEMENTS, MANAGE_EVENTS, MANAGE_USERS, READ,
    WRITE,
};

#[derive(Debug, Clone)]
pub struct MockAccount {
    pub principal: Principal,
    pub password: String,
}

/// Shared, cloneable handle to the account table.
#[derive(Debug, Clone, Default)]
pub struct MockDirectory {
    accounts: Arc<RwLock<Vec<MockAccount>>>,
}

impl MockDirectory {
    pub fn new(accounts: Vec<MockAccount>) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(accounts)),
        }
    }

    pub fn with_demo_accounts() -> Self {
        Self::new(demo_accounts())
    }

    /// First account whose email and password both match exactly.
    pub fn verify(&self, email: &str, password: &str) -> Option<Principal> {
        self.accounts
            .read()
            .iter()
            .find(|account| account.principal.email == email && account.password == password)
            .map(|account| account.principal.clone())
    }

    /// Case-sensitive exact match.
    pub fn contains_email(&self, email: &str) -> bool {
        self.accounts
            .read()
            .iter()
            .any(|account| account.principal.email == email)
    }

    pub fn find_by_id(&self, id: &str) -> Option<Principal> {
        self.accounts
            .read()
            .iter()
            .find(|account| account.principal.id.as_deref() == Some(id))
            .map(|account| account.principal.clone())
    }

    pub fn insert(&self, principal: Principal, password: impl Into<String>) {
        self.accounts.write().push(MockAccount {
            principal,
            password: password.into(),
        });
    }

    /// Applies `update` to the stored record and returns the result.
    pub fn update(&self, id: &str, update: ProfileUpdate) -> Option<Principal> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .iter_mut()
            .find(|account| account.principal.id.as_deref() == Some(id))?;
        account.principal.apply(update);
        Some(account.principal.clone())
    }

    /// Returns false when the account is unknown or `current` does not match.
    pub fn change_password(&self, id: &str, current: &str, next: &str) -> bool {
        let mut accounts = self.accounts.write();
        match accounts
            .iter_mut()
            .find(|account| account.principal.id.as_deref() == Some(id))
        {
            Some(account) if account.password == current => {
                account.password = next.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.read().is_empty()
    }
}

fn tokens(list: &[&str]) -> Option<BTreeSet<String>> {
    Some(list.iter().map(|token| token.to_string()).collect())
}

fn social(github: &str, linkedin: &str) -> Option<SocialLinks> {
    Some(SocialLinks {
        github: Some(format!("https://github.com/{github}")),
        linkedin: Some(format!("https://www.linkedin.com/in/{linkedin}")),
        ..Default::default()
    })
}

pub fn demo_accounts() -> Vec<MockAccount> {
    vec![
        MockAccount {
            principal: Principal {
                id: Some("1".into()),
                name: "系統管理員".into(),
                email: "admin@gdg.dev.tw".into(),
                role: Role::Admin,
                permissions: tokens(&[
                    READ,
                    WRITE,
                    DELETE,
                    MANAGE_USERS,
                    MANAGE_EVENTS,
                    MANAGE_ANNOUNCEMENTS,
                ]),
                profile: Profile {
                    title: Some("社群負責人".into()),
                    department: Some("營運團隊".into()),
                    bio: Some("負責社群整體營運與平台管理。".into()),
                    skills: vec!["Community".into(), "Cloud".into(), "Leadership".into()],
                    social: social("gdg-admin", "gdg-admin"),
                    avatar: Some("/images/avatars/admin.png".into()),
                    banner: None,
                },
                join_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).single(),
                last_login: None,
                is_active: true,
            },
            password: "Admin123!".into(),
        },
        MockAccount {
            principal: Principal {
                id: Some("2".into()),
                name: "核心成員".into(),
                email: "core@gdg.dev.tw".into(),
                role: Role::Core,
                permissions: tokens(&[READ, WRITE, MANAGE_EVENTS, MANAGE_ANNOUNCEMENTS]),
                profile: Profile {
                    title: Some("活動策劃".into()),
                    department: Some("活動組".into()),
                    bio: Some("籌辦技術聚會與工作坊。".into()),
                    skills: vec!["Android".into(), "Kotlin".into()],
                    social: social("gdg-core", "gdg-core"),
                    avatar: Some("/images/avatars/core.png".into()),
                    banner: None,
                },
                join_date: Utc.with_ymd_and_hms(2021, 3, 15, 0, 0, 0).single(),
                last_login: None,
                is_active: true,
            },
            password: "Core123!".into(),
        },
        MockAccount {
            principal: Principal {
                id: Some("3".into()),
                name: "一般會員".into(),
                email: "member@gdg.dev.tw".into(),
                role: Role::Member,
                permissions: tokens(&[READ, COMMENT, JOIN_EVENTS]),
                profile: Profile {
                    title: Some("前端工程師".into()),
                    department: None,
                    bio: Some("喜歡參加社群活動。".into()),
                    skills: vec!["JavaScript".into(), "React".into()],
                    social: None,
                    avatar: None,
                    banner: None,
                },
                join_date: Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).single(),
                last_login: None,
                is_active: true,
            },
            password: "Member123!".into(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::principal::ProfilePatch;

    #[test]
    fn verifies_exact_credentials_only() {
        let directory = MockDirectory::with_demo_accounts();
        let member = directory
            .verify("member@gdg.dev.tw", "Member123!")
            .expect("member credentials");
        assert_eq!(member.role, Role::Member);

        assert!(directory.verify("member@gdg.dev.tw", "member123!").is_none());
        assert!(directory.verify("Member@gdg.dev.tw", "Member123!").is_none());
        assert!(directory.verify("x@x.com", "anything").is_none());
    }

    #[test]
    fn email_lookup_is_case_sensitive() {
        let directory = MockDirectory::with_demo_accounts();
        assert!(directory.contains_email("core@gdg.dev.tw"));
        assert!(!directory.contains_email("CORE@gdg.dev.tw"));
    }

    #[test]
    fn inserted_accounts_can_sign_in() {
        let directory = MockDirectory::default();
        assert!(directory.is_empty());
        directory.insert(Principal::new_member("n1", "New", "new@gdg.dev.tw"), "pw");
        assert_eq!(directory.len(), 1);
        assert!(directory.verify("new@gdg.dev.tw", "pw").is_some());
    }

    #[test]
    fn updates_and_password_changes_apply_to_the_stored_record() {
        let directory = MockDirectory::with_demo_accounts();
        let updated = directory
            .update(
                "3",
                ProfileUpdate {
                    profile: Some(ProfilePatch {
                        bio: Some("更新".into()),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            )
            .expect("member exists");
        assert_eq!(updated.profile.bio.as_deref(), Some("更新"));
        assert_eq!(
            directory.find_by_id("3").and_then(|p| p.profile.title),
            Some("前端工程師".to_string())
        );

        assert!(!directory.change_password("3", "wrong", "Next123!"));
        assert!(directory.change_password("3", "Member123!", "Next123!"));
        assert!(directory.verify("member@gdg.dev.tw", "Next123!").is_some());
        assert!(!directory.change_password("404", "a", "b"));
    }
}
