use serde::{Deserialize, Serialize};

/// Subscription plan catalog entry (Free / Pro / Enterprise).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub max_users: i64,
    pub created_at: i64,
}
