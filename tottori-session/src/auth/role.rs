//! User roles

use serde::{Deserialize, Serialize};

/// Role assigned to a dashboard user by the Auth Service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UserRole {
    /// Full access, implies every elevated capability
    Admin,
    /// Analysis and reporting
    Analyst,
    /// Forecasting and policy optimization
    PolicyMaker,
    /// Read-only access
    Viewer,
    /// Any role this client does not know about
    Other(String),
}

impl UserRole {
    pub fn as_str(&self) -> &str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Analyst => "analyst",
            UserRole::PolicyMaker => "policy_maker",
            UserRole::Viewer => "viewer",
            UserRole::Other(name) => name,
        }
    }
}

impl From<String> for UserRole {
    fn from(value: String) -> Self {
        match value.as_str() {
            "admin" => UserRole::Admin,
            "analyst" => UserRole::Analyst,
            "policy_maker" => UserRole::PolicyMaker,
            "viewer" => UserRole::Viewer,
            _ => UserRole::Other(value),
        }
    }
}

impl From<UserRole> for String {
    fn from(role: UserRole) -> Self {
        role.as_str().to_string()
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(UserRole::from(s.to_string()))
    }
}
