use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A step in the approval chain. Declaration order is the review order.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, sqlx::Type, ToSchema,
)]
#[sqlx(type_name = "approval_level", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalLevel {
    HeadOfSection,
    HeadOfDept,
    Committee,
    MedicalDirector,
}

impl ApprovalLevel {
    /// Every level, lowest first.
    pub const ORDER: [ApprovalLevel; 4] = [
        ApprovalLevel::HeadOfSection,
        ApprovalLevel::HeadOfDept,
        ApprovalLevel::Committee,
        ApprovalLevel::MedicalDirector,
    ];

    /// Level a new or returned request waits on.
    pub const FIRST: ApprovalLevel = ApprovalLevel::HeadOfSection;

    /// The level that acts after this one, `None` for the final sign-off.
    pub fn next(self) -> Option<ApprovalLevel> {
        match self {
            ApprovalLevel::HeadOfSection => Some(ApprovalLevel::HeadOfDept),
            ApprovalLevel::HeadOfDept => Some(ApprovalLevel::Committee),
            ApprovalLevel::Committee => Some(ApprovalLevel::MedicalDirector),
            ApprovalLevel::MedicalDirector => None,
        }
    }

    pub fn is_final(self) -> bool {
        self.next().is_none()
    }

    /// Zero-based rank in [`ApprovalLevel::ORDER`].
    pub fn rank(self) -> usize {
        self as usize
    }
}
