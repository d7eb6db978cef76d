//! Access flags derived from the current user's role

use super::UserRole;
use crate::types::UserProfile;
use serde::{Deserialize, Serialize};

/// Authorization flags for the current session
///
/// Always built from the session's token and user at the moment of reading;
/// holding on to a value does not track later session changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessFlags {
    pub is_authenticated: bool,
    pub is_admin: bool,
    pub is_analyst: bool,
    pub is_policy_maker: bool,
}

impl AccessFlags {
    /// Flags for a session holding `has_token` and `user`
    pub fn derive(has_token: bool, user: Option<&UserProfile>) -> Self {
        let role = user.map(|u| &u.role);
        let is_admin = matches!(role, Some(UserRole::Admin));

        Self {
            is_authenticated: has_token && user.is_some(),
            is_admin,
            is_analyst: is_admin || matches!(role, Some(UserRole::Analyst)),
            is_policy_maker: is_admin || matches!(role, Some(UserRole::PolicyMaker)),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Check whether these flags satisfy a route requirement
    pub fn allows(&self, requirement: AccessRequirement) -> bool {
        requirement.is_satisfied_by(self)
    }
}

/// What a route or view requires from the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRequirement {
    /// Anyone, including anonymous visitors
    Public,
    /// Any signed-in user
    Authenticated,
    /// Analysts and admins
    Analyst,
    /// Policy makers and admins
    PolicyMaker,
    /// Admins only
    Admin,
}

impl AccessRequirement {
    pub fn is_satisfied_by(&self, flags: &AccessFlags) -> bool {
        match self {
            AccessRequirement::Public => true,
            AccessRequirement::Authenticated => flags.is_authenticated,
            AccessRequirement::Analyst => flags.is_authenticated && flags.is_analyst,
            AccessRequirement::PolicyMaker => flags.is_authenticated && flags.is_policy_maker,
            AccessRequirement::Admin => flags.is_authenticated && flags.is_admin,
        }
    }
}

impl std::fmt::Display for AccessRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessRequirement::Public => write!(f, "public"),
            AccessRequirement::Authenticated => write!(f, "authenticated"),
            AccessRequirement::Analyst => write!(f, "analyst"),
            AccessRequirement::PolicyMaker => write!(f, "policy_maker"),
            AccessRequirement::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for AccessRequirement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" => Ok(AccessRequirement::Public),
            "authenticated" => Ok(AccessRequirement::Authenticated),
            "analyst" => Ok(AccessRequirement::Analyst),
            "policy_maker" => Ok(AccessRequirement::PolicyMaker),
            "admin" => Ok(AccessRequirement::Admin),
            _ => Err(format!("Unknown access requirement: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> UserProfile {
        UserProfile::new(1, role)
    }

    #[test]
    fn test_admin_implies_every_elevated_flag() {
        let roles = [
            UserRole::Admin,
            UserRole::Analyst,
            UserRole::PolicyMaker,
            UserRole::Viewer,
            UserRole::Other("guest".to_string()),
        ];

        for role in roles {
            let profile = user(role.clone());
            for has_token in [true, false] {
                let flags = AccessFlags::derive(has_token, Some(&profile));
                if flags.is_admin {
                    assert!(flags.is_analyst, "admin must imply analyst ({})", role);
                    assert!(flags.is_policy_maker, "admin must imply policy maker ({})", role);
                }
            }
        }
    }

    #[test]
    fn test_role_mapping() {
        let analyst = AccessFlags::derive(true, Some(&user(UserRole::Analyst)));
        assert!(analyst.is_analyst);
        assert!(!analyst.is_admin);
        assert!(!analyst.is_policy_maker);

        let policy = AccessFlags::derive(true, Some(&user(UserRole::PolicyMaker)));
        assert!(policy.is_policy_maker);
        assert!(!policy.is_analyst);

        let viewer = AccessFlags::derive(true, Some(&user(UserRole::Viewer)));
        assert!(viewer.is_authenticated);
        assert!(!viewer.is_analyst && !viewer.is_policy_maker && !viewer.is_admin);
    }

    #[test]
    fn test_authentication_needs_token_and_user() {
        assert!(!AccessFlags::derive(true, None).is_authenticated);
        assert!(!AccessFlags::derive(false, Some(&user(UserRole::Viewer))).is_authenticated);
        assert_eq!(AccessFlags::derive(false, None), AccessFlags::anonymous());
    }

    #[test]
    fn test_requirements() {
        let anonymous = AccessFlags::anonymous();
        assert!(anonymous.allows(AccessRequirement::Public));
        assert!(!anonymous.allows(AccessRequirement::Authenticated));

        let admin = AccessFlags::derive(true, Some(&user(UserRole::Admin)));
        for requirement in [
            AccessRequirement::Public,
            AccessRequirement::Authenticated,
            AccessRequirement::Analyst,
            AccessRequirement::PolicyMaker,
            AccessRequirement::Admin,
        ] {
            assert!(admin.allows(requirement), "admin should satisfy {}", requirement);
        }

        let analyst = AccessFlags::derive(true, Some(&user(UserRole::Analyst)));
        assert!(analyst.allows(AccessRequirement::Analyst));
        assert!(!analyst.allows(AccessRequirement::PolicyMaker));
        assert!(!analyst.allows(AccessRequirement::Admin));
    }

    #[test]
    fn test_requirement_parsing() {
        assert_eq!(
            "policy_maker".parse::<AccessRequirement>().unwrap(),
            AccessRequirement::PolicyMaker
        );
        assert!("superuser".parse::<AccessRequirement>().is_err());
    }
}
