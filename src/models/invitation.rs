use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::MembershipRole;

/// An offer to join an organization. Pending until the invited identity
/// accepts (creating a membership) or rejects (deleting the row).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: String,
    pub org_id: String,
    pub inviter_id: Option<String>,
    /// Resolved at create time when the email matches a known account.
    pub invited_user_id: Option<String>,
    pub email: String,
    /// Role granted on acceptance.
    pub role: MembershipRole,
    pub accepted: bool,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Invitation {
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateInvitation {
    pub email: String,
    #[serde(default = "default_invite_role")]
    pub role: MembershipRole,
    /// Days until the invitation expires. Unset = never expires.
    #[serde(default)]
    pub expires_in_days: Option<i64>,
}

fn default_invite_role() -> MembershipRole {
    MembershipRole::Member
}

impl CreateInvitation {
    pub fn validate(&self) -> Result<()> {
        if !self.email.contains('@') {
            return Err(AppError::BadRequest("invalid email address".into()));
        }
        if let Some(days) = self.expires_in_days
            && days <= 0
        {
            return Err(AppError::BadRequest(
                "expires_in_days must be positive".into(),
            ));
        }
        Ok(())
    }
}
