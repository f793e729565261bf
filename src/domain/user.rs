use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform roles. Parsed case-insensitively; rendered lower-case, which is
/// the form the rest of the client compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Builder,
    Telecaller,
    Broker,
    CharteredAccountant,
    SalesAgent,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Builder => "builder",
            Self::Telecaller => "telecaller",
            Self::Broker => "broker",
            Self::CharteredAccountant => "ca",
            Self::SalesAgent => "sales_agent",
            Self::Admin => "admin",
        }
    }

    /// Fixed role-to-permission table. No wildcards, no inheritance; the
    /// backend remains the authority, this only drives client-side gating.
    #[must_use]
    pub const fn permissions(self) -> &'static [Permission] {
        match self {
            Self::Builder => &[
                Permission::ManageProjects,
                Permission::ViewProjects,
                Permission::ManageProperties,
                Permission::ViewProperties,
                Permission::ViewLeads,
                Permission::ViewReports,
            ],
            Self::Telecaller => &[
                Permission::ViewProjects,
                Permission::ViewLeads,
                Permission::ManageLeads,
            ],
            Self::Broker => &[
                Permission::ViewProjects,
                Permission::ViewLeads,
                Permission::ManageProperties,
                Permission::ViewProperties,
                Permission::ViewLoanOffers,
            ],
            Self::CharteredAccountant => &[
                Permission::ViewLeads,
                Permission::RecommendLoans,
                Permission::ViewLoanOffers,
                Permission::ViewReports,
            ],
            Self::SalesAgent => &[
                Permission::ViewProjects,
                Permission::ViewLeads,
                Permission::ManageLeads,
                Permission::ViewProperties,
            ],
            Self::Admin => &[
                Permission::ManageProjects,
                Permission::ViewProjects,
                Permission::ManageLeads,
                Permission::ViewLeads,
                Permission::AssignLeads,
                Permission::ManageProperties,
                Permission::ViewProperties,
                Permission::RecommendLoans,
                Permission::ViewLoanOffers,
                Permission::ManageUsers,
                Permission::ViewReports,
            ],
        }
    }
}

impl FromStr for Role {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "builder" => Ok(Self::Builder),
            "telecaller" => Ok(Self::Telecaller),
            "broker" => Ok(Self::Broker),
            "ca" | "chartered_accountant" => Ok(Self::CharteredAccountant),
            "sales_agent" | "salesagent" => Ok(Self::SalesAgent),
            "admin" => Ok(Self::Admin),
            _ => Err(ApiError::InvalidResponse),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Role {
    type Error = ApiError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ManageProjects,
    ViewProjects,
    ManageLeads,
    ViewLeads,
    AssignLeads,
    ManageProperties,
    ViewProperties,
    RecommendLoans,
    ViewLoanOffers,
    ManageUsers,
    ViewReports,
}

/// Profile cached at login time. Field names match the JSON blob the backend
/// returns and the session file persists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!("BUILDER".parse::<Role>().unwrap(), Role::Builder);
        assert_eq!("builder".parse::<Role>().unwrap(), Role::Builder);
        assert_eq!("Sales Agent".parse::<Role>().unwrap(), Role::SalesAgent);
        assert_eq!("SALES_AGENT".parse::<Role>().unwrap(), Role::SalesAgent);
        assert_eq!("CA".parse::<Role>().unwrap(), Role::CharteredAccountant);
    }

    #[test]
    fn test_role_renders_lower_case() {
        assert_eq!(Role::Builder.to_string(), "builder");
        assert_eq!(Role::SalesAgent.to_string(), "sales_agent");
        assert_eq!(Role::CharteredAccountant.to_string(), "ca");
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert!("superuser".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn test_permission_table() {
        assert!(Role::Builder.permissions().contains(&Permission::ManageProjects));
        assert!(!Role::Builder.permissions().contains(&Permission::ManageUsers));
        assert!(Role::Telecaller.permissions().contains(&Permission::ManageLeads));
        assert!(!Role::Telecaller.permissions().contains(&Permission::ManageProperties));
        assert!(Role::CharteredAccountant.permissions().contains(&Permission::RecommendLoans));
        assert!(Role::Admin.permissions().contains(&Permission::ManageUsers));
    }

    #[test]
    fn test_user_profile_json_field_names() {
        let profile = UserProfile {
            user_id: "u1".to_string(),
            email: "a@b.com".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            role: Role::Broker,
            phone: None,
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["userId"], "u1");
        assert_eq!(json["firstName"], "A");
        assert_eq!(json["role"], "broker");
    }

    #[test]
    fn test_user_profile_parses_upper_case_role() {
        let profile: UserProfile = serde_json::from_value(serde_json::json!({
            "userId": "u1",
            "email": "a@b.com",
            "firstName": "A",
            "lastName": "B",
            "role": "BUILDER"
        }))
        .unwrap();
        assert_eq!(profile.role, Role::Builder);
    }
}
