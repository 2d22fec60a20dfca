use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Owner,
    Admin,
    Member,
}

impl MembershipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Owner => "owner",
            MembershipRole::Admin => "admin",
            MembershipRole::Member => "member",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(MembershipRole::Owner),
            "admin" => Some(MembershipRole::Admin),
            "member" => Some(MembershipRole::Member),
            _ => None,
        }
    }

    /// Rank for role comparisons (invite-role capping). Higher outranks lower.
    pub fn rank(&self) -> u8 {
        match self {
            MembershipRole::Owner => 2,
            MembershipRole::Admin => 1,
            MembershipRole::Member => 0,
        }
    }
}

impl std::str::FromStr for MembershipRole {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        MembershipRole::from_str(s).ok_or(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: String,
    pub user_id: String,
    pub org_id: String,
    pub role: MembershipRole,
    pub is_active: bool,
    pub joined_at: i64,
}

/// Membership joined with the user row, for list responses.
#[derive(Debug, Clone, Serialize)]
pub struct MembershipWithUser {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub org_id: String,
    pub role: MembershipRole,
    pub is_active: bool,
    pub joined_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMembership {
    pub role: MembershipRole,
}
