use serde::{Deserialize, Serialize};

/// In-app notification, created by the surrounding logic when a task is
/// assigned. Email dispatch is asynchronous and best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub org_id: String,
    pub recipient_id: String,
    pub actor_id: Option<String>,
    pub verb: String,
    pub title: String,
    pub data: Option<serde_json::Value>,
    pub read: bool,
    pub sent_via_email: bool,
    pub created_at: i64,
}
