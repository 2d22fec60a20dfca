//! Shared utility functions for the Crewdeck application.

use axum::http::HeaderMap;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{ActorType, AuditAction, AuditLog, User};

/// Extract client IP address and user-agent from request headers.
///
/// Tries `x-forwarded-for` first (for proxied requests), then `x-real-ip`,
/// and extracts the `user-agent` header for audit logging.
pub fn extract_request_info(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let user_agent = headers
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    (ip, user_agent)
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Builder for creating audit log entries.
///
/// Provides a fluent API for constructing audit logs with named methods
/// instead of positional parameters. Audit writes are best-effort: call
/// sites log a warning on failure instead of failing the operation.
///
/// # Example
/// ```ignore
/// if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers, &org.id)
///     .actor(ActorType::User, Some(&user))
///     .action(AuditAction::InviteSent)
///     .object("invitation", Some(&invitation.id))
///     .message(format!("Invited {} as {}", input.email, input.role.as_str()))
///     .save()
/// {
///     tracing::warn!("Failed to write audit log: {}", e);
/// }
/// ```
pub struct AuditLogBuilder<'a> {
    conn: &'a Connection,
    enabled: bool,
    headers: &'a HeaderMap,
    org_id: &'a str,
    actor_type: ActorType,
    actor: Option<&'a User>,
    action: AuditAction,
    object_type: &'a str,
    object_id: Option<&'a str>,
    message: String,
    metadata: Option<&'a serde_json::Value>,
}

impl<'a> AuditLogBuilder<'a> {
    /// Create a new audit log builder with required parameters.
    pub fn new(
        conn: &'a Connection,
        enabled: bool,
        headers: &'a HeaderMap,
        org_id: &'a str,
    ) -> Self {
        Self {
            conn,
            enabled,
            headers,
            org_id,
            actor_type: ActorType::System,
            actor: None,
            action: AuditAction::InviteSent, // Placeholder, should always be set
            object_type: "",
            object_id: None,
            message: String::new(),
            metadata: None,
        }
    }

    /// Set the actor type and optional acting user.
    pub fn actor(mut self, actor_type: ActorType, actor: Option<&'a User>) -> Self {
        self.actor_type = actor_type;
        self.actor = actor;
        self
    }

    /// Set the action being performed.
    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = action;
        self
    }

    /// Set the object type and optional id being acted upon.
    pub fn object(mut self, object_type: &'a str, object_id: Option<&'a str>) -> Self {
        self.object_type = object_type;
        self.object_id = object_id;
        self
    }

    /// Set the human-readable message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set optional structured metadata.
    pub fn metadata(mut self, metadata: &'a serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Save the audit log entry to the audit database.
    pub fn save(self) -> Result<AuditLog> {
        let (ip, ua) = extract_request_info(self.headers);
        queries::create_audit_log(
            self.conn,
            self.enabled,
            self.org_id,
            self.actor_type,
            self.actor,
            self.action,
            self.object_type,
            self.object_id,
            &self.message,
            self.metadata,
            ip.as_deref(),
            ua.as_deref(),
        )
    }
}
