// src/db/models/role.rs
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::engine::levels::ApprovalLevel;

/// Global role of a user as stored in `users.role`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, ToSchema)]
#[sqlx(type_name = "user_role", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Employee,
    HeadOfSection,
    HeadOfDept,
    Committee,
    MedicalDirector,
    Admin,
}

impl Role {
    /// Roles allowed to act on a privilege request. Employees only submit.
    pub fn can_approve(self) -> bool {
        !matches!(self, Role::Employee)
    }

    /// Position of this role in the approval chain. `Admin` acts outside of it.
    pub fn approval_level(self) -> Option<ApprovalLevel> {
        match self {
            Role::HeadOfSection => Some(ApprovalLevel::HeadOfSection),
            Role::HeadOfDept => Some(ApprovalLevel::HeadOfDept),
            Role::Committee => Some(ApprovalLevel::Committee),
            Role::MedicalDirector => Some(ApprovalLevel::MedicalDirector),
            Role::Employee | Role::Admin => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Employee => "EMPLOYEE",
            Role::HeadOfSection => "HEAD_OF_SECTION",
            Role::HeadOfDept => "HEAD_OF_DEPT",
            Role::Committee => "COMMITTEE",
            Role::MedicalDirector => "MEDICAL_DIRECTOR",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
