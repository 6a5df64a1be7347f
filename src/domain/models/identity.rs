//! Authenticated caller identity as presented by the platform's auth layer.

use serde::{Deserialize, Serialize};

/// Platform role. Unknown role strings never map to a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Supervisor,
    Analyst,
    Manager,
    Technician,
    Operator,
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Supervisor => "supervisor",
            Self::Analyst => "analyst",
            Self::Manager => "manager",
            Self::Technician => "technician",
            Self::Operator => "operator",
            Self::Viewer => "viewer",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "supervisor" => Some(Self::Supervisor),
            "analyst" => Some(Self::Analyst),
            "manager" => Some(Self::Manager),
            "technician" => Some(Self::Technician),
            "operator" => Some(Self::Operator),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    /// Roles allowed to create, edit, trigger or delete schedules.
    pub fn can_manage_schedules(&self) -> bool {
        matches!(self, Self::Admin | Self::Supervisor | Self::Analyst)
    }
}

/// An authenticated, active platform user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            role,
        }
    }

    pub fn can_manage_schedules(&self) -> bool {
        self.role.can_manage_schedules()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_three_roles_manage() {
        let managers: Vec<&str> = [
            Role::Admin,
            Role::Supervisor,
            Role::Analyst,
            Role::Manager,
            Role::Technician,
            Role::Operator,
            Role::Viewer,
        ]
        .iter()
        .filter(|r| r.can_manage_schedules())
        .map(Role::as_str)
        .collect();
        assert_eq!(managers, ["admin", "supervisor", "analyst"]);
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        assert_eq!(Role::from_str("Analyst"), Some(Role::Analyst));
        assert_eq!(Role::from_str("superuser"), None);
        assert_eq!(Role::from_str(""), None);
    }
}
