use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::roles::Role;

/// Identity record held by a live session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    /// Stored capability tokens. `None` when the record carries no set at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<BTreeSet<String>>,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social: Option<SocialLinks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SocialLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Partial update accepted by `update_profile`.
///
/// The top level and `profile` merge shallowly: every `Some` field replaces the
/// current value, `None` leaves it alone. `skills` and `social` are replaced
/// wholesale, never merged element by element.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfilePatch>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social: Option<SocialLinks>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

impl Principal {
    /// Fresh account with the default member permission set.
    pub fn new_member(
        id: impl Into<String>,
        name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(id.into()),
            name: name.into(),
            email: email.into(),
            role: Role::Member,
            permissions: Some(Role::Member.permissions()),
            profile: Profile::default(),
            join_date: Some(Utc::now()),
            last_login: None,
            is_active: true,
        }
    }

    pub fn has_role(&self, required: Role) -> bool {
        self.role.at_least(required)
    }

    /// Exact-membership evaluator over the stored permission set.
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .as_ref()
            .is_some_and(|set| set.contains(permission))
    }

    /// Stored set when the record carries one, otherwise the role bucket.
    pub fn permits(&self, permission: &str) -> bool {
        match &self.permissions {
            Some(set) => set.contains(permission),
            None => self.role.grants(permission),
        }
    }

    pub fn apply(&mut self, update: ProfileUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(email) = update.email {
            self.email = email;
        }
        if let Some(patch) = update.profile {
            self.profile.apply(patch);
        }
    }
}

impl Profile {
    fn apply(&mut self, patch: ProfilePatch) {
        let ProfilePatch {
            title,
            department,
            bio,
            skills,
            social,
            avatar,
            banner,
        } = patch;

        if title.is_some() {
            self.title = title;
        }
        if department.is_some() {
            self.department = department;
        }
        if bio.is_some() {
            self.bio = bio;
        }
        if let Some(skills) = skills {
            self.skills = skills;
        }
        if social.is_some() {
            self.social = social;
        }
        if avatar.is_some() {
            self.avatar = avatar;
        }
        if banner.is_some() {
            self.banner = banner;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::{COMMENT, MANAGE_EVENTS, READ};

    fn sample() -> Principal {
        let mut principal = Principal::new_member("u-1", "Ada", "ada@example.com");
        principal.profile = Profile {
            title: Some("Organizer".into()),
            department: Some("Events".into()),
            bio: Some("old bio".into()),
            skills: vec!["rust".into(), "go".into()],
            social: Some(SocialLinks {
                github: Some("ada".into()),
                twitter: Some("@ada".into()),
                ..Default::default()
            }),
            avatar: None,
            banner: None,
        };
        principal
    }

    #[test]
    fn profile_patch_merges_one_level_deep() {
        let mut principal = sample();
        principal.apply(ProfileUpdate {
            profile: Some(ProfilePatch {
                bio: Some("x".into()),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert_eq!(principal.profile.bio.as_deref(), Some("x"));
        assert_eq!(principal.profile.title.as_deref(), Some("Organizer"));
        assert_eq!(principal.profile.department.as_deref(), Some("Events"));
        assert_eq!(principal.profile.skills, vec!["rust", "go"]);
        assert_eq!(principal.name, "Ada");
    }

    #[test]
    fn nested_profile_values_are_replaced_wholesale() {
        let mut principal = sample();
        principal.apply(ProfileUpdate {
            profile: Some(ProfilePatch {
                skills: Some(vec!["design".into()]),
                social: Some(SocialLinks {
                    linkedin: Some("ada-l".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert_eq!(principal.profile.skills, vec!["design"]);
        let social = principal.profile.social.expect("social links");
        assert_eq!(social.linkedin.as_deref(), Some("ada-l"));
        assert_eq!(social.github, None);
        assert_eq!(social.twitter, None);
    }

    #[test]
    fn stored_and_role_bucket_evaluators_stay_distinct() {
        let mut principal = sample();
        principal.permissions = Some([READ.to_string()].into_iter().collect());

        assert!(principal.has_permission(READ));
        assert!(!principal.has_permission(COMMENT));
        assert!(principal.role.grants(COMMENT));
        assert!(!principal.permits(COMMENT));

        principal.permissions = None;
        assert!(!principal.has_permission(READ));
        assert!(principal.permits(COMMENT));
        assert!(!principal.permits(MANAGE_EVENTS));
    }

    #[test]
    fn deserializes_camel_case_records() {
        let json = r#"{
            "id": "42",
            "name": "Lin",
            "email": "lin@gdg.dev.tw",
            "role": "core",
            "permissions": ["read", "write"],
            "profile": {"title": "Lead", "social": {"github": "lin"}},
            "joinDate": "2024-01-15T00:00:00Z",
            "isActive": true
        }"#;
        let principal: Principal = serde_json::from_str(json).expect("valid principal");
        assert_eq!(principal.role, Role::Core);
        assert!(principal.has_permission("write"));
        assert_eq!(principal.profile.title.as_deref(), Some("Lead"));
        assert!(principal.join_date.is_some());
        assert!(principal.last_login.is_none());
    }
}
