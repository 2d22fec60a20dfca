//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! This module provides a `FromRow` trait that models can implement to
//! define how they are constructed from database rows, plus helper functions
//! for common query patterns.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// This provides graceful error handling instead of panicking when database
/// contains invalid enum values (from corruption, migration errors, etc.).
fn parse_enum<T>(
    row: &Row,
    col: usize,
    col_name: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let value: String = row.get(col)?;
    parse(&value).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
///
/// Implementing this trait allows using the `query_one` and `query_all`
/// helper functions, reducing repetitive row mapping closures.
pub trait FromRow: Sized {
    /// Construct an instance from a database row.
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, name, api_key_hash, created_at, updated_at";

pub const PLAN_COLS: &str = "id, name, max_users, created_at";

pub const ORGANIZATION_COLS: &str = "id, name, slug, owner_id, plan_id, is_active, created_at";

pub const MEMBERSHIP_COLS: &str = "id, user_id, org_id, role, is_active, joined_at";

pub const MEMBERSHIP_WITH_USER_COLS: &str =
    "m.id, m.user_id, u.email, u.name, m.org_id, m.role, m.is_active, m.joined_at";

pub const INVITATION_COLS: &str =
    "id, org_id, inviter_id, invited_user_id, email, role, accepted, created_at, expires_at";

pub const PROJECT_COLS: &str =
    "id, org_id, name, slug, description, owner_id, is_public, archived, created_at, updated_at";

pub const PROJECT_MEMBER_COLS: &str = "id, project_id, user_id, role, joined_at";

pub const TASK_COLS: &str = "id, project_id, org_id, title, description, priority, status, assigned_to, due_date, is_archived, created_by, created_at, updated_at";

pub const TASK_COMMENT_COLS: &str = "id, task_id, user_id, body, created_at";

pub const WEBHOOK_SUBSCRIPTION_COLS: &str =
    "id, org_id, url, events, secret, is_active, created_at, updated_at";

pub const NOTIFICATION_COLS: &str = "id, org_id, recipient_id, actor_id, verb, title, data, read, sent_via_email, created_at";

pub const AUDIT_LOG_COLS: &str = "id, timestamp, org_id, actor_type, actor_id, actor_email, actor_name, action, object_type, object_id, message, metadata, ip_address, user_agent";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            api_key_hash: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl FromRow for Plan {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Plan {
            id: row.get(0)?,
            name: row.get(1)?,
            max_users: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}

impl FromRow for Organization {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Organization {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            owner_id: row.get(3)?,
            plan_id: row.get(4)?,
            is_active: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for Membership {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Membership {
            id: row.get(0)?,
            user_id: row.get(1)?,
            org_id: row.get(2)?,
            role: parse_enum(row, 3, "role", MembershipRole::from_str)?,
            is_active: row.get(4)?,
            joined_at: row.get(5)?,
        })
    }
}

impl FromRow for MembershipWithUser {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(MembershipWithUser {
            id: row.get(0)?,
            user_id: row.get(1)?,
            email: row.get(2)?,
            name: row.get(3)?,
            org_id: row.get(4)?,
            role: parse_enum(row, 5, "role", MembershipRole::from_str)?,
            is_active: row.get(6)?,
            joined_at: row.get(7)?,
        })
    }
}

impl FromRow for Invitation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Invitation {
            id: row.get(0)?,
            org_id: row.get(1)?,
            inviter_id: row.get(2)?,
            invited_user_id: row.get(3)?,
            email: row.get(4)?,
            role: parse_enum(row, 5, "role", MembershipRole::from_str)?,
            accepted: row.get(6)?,
            created_at: row.get(7)?,
            expires_at: row.get(8)?,
        })
    }
}

impl FromRow for Project {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Project {
            id: row.get(0)?,
            org_id: row.get(1)?,
            name: row.get(2)?,
            slug: row.get(3)?,
            description: row.get(4)?,
            owner_id: row.get(5)?,
            is_public: row.get(6)?,
            archived: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl FromRow for ProjectMember {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(ProjectMember {
            id: row.get(0)?,
            project_id: row.get(1)?,
            user_id: row.get(2)?,
            role: parse_enum(row, 3, "role", ProjectMemberRole::from_str)?,
            joined_at: row.get(4)?,
        })
    }
}

impl FromRow for Task {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Task {
            id: row.get(0)?,
            project_id: row.get(1)?,
            org_id: row.get(2)?,
            title: row.get(3)?,
            description: row.get(4)?,
            priority: parse_enum(row, 5, "priority", TaskPriority::from_str)?,
            status: parse_enum(row, 6, "status", TaskStatus::from_str)?,
            assigned_to: row.get(7)?,
            due_date: row.get(8)?,
            is_archived: row.get(9)?,
            created_by: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }
}

impl FromRow for TaskComment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(TaskComment {
            id: row.get(0)?,
            task_id: row.get(1)?,
            user_id: row.get(2)?,
            body: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for WebhookSubscription {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        // events is stored as a JSON array; unknown names are dropped rather
        // than failing the whole row (they can only appear via manual edits)
        let events_json: String = row.get(3)?;
        let names: Vec<String> = serde_json::from_str(&events_json).unwrap_or_default();
        let events = names
            .iter()
            .filter_map(|n| WebhookEvent::from_str(n))
            .collect();
        Ok(WebhookSubscription {
            id: row.get(0)?,
            org_id: row.get(1)?,
            url: row.get(2)?,
            events,
            secret: row.get(4)?,
            is_active: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl FromRow for Notification {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let data: Option<String> = row.get(6)?;
        Ok(Notification {
            id: row.get(0)?,
            org_id: row.get(1)?,
            recipient_id: row.get(2)?,
            actor_id: row.get(3)?,
            verb: row.get(4)?,
            title: row.get(5)?,
            data: data.and_then(|d| serde_json::from_str(&d).ok()),
            read: row.get(7)?,
            sent_via_email: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

impl FromRow for AuditLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let metadata: Option<String> = row.get(11)?;
        Ok(AuditLog {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            org_id: row.get(2)?,
            actor_type: parse_enum(row, 3, "actor_type", |s| s.parse::<ActorType>().ok())?,
            actor_id: row.get(4)?,
            actor_email: row.get(5)?,
            actor_name: row.get(6)?,
            action: row.get(7)?,
            object_type: row.get(8)?,
            object_id: row.get(9)?,
            message: row.get(10)?,
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
            ip_address: row.get(12)?,
            user_agent: row.get(13)?,
        })
    }
}
