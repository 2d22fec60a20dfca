use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior, params, types::Value};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

use super::from_row::{
    AUDIT_LOG_COLS, INVITATION_COLS, MEMBERSHIP_COLS, MEMBERSHIP_WITH_USER_COLS,
    NOTIFICATION_COLS, ORGANIZATION_COLS, PLAN_COLS, PROJECT_COLS, PROJECT_MEMBER_COLS,
    TASK_COLS, TASK_COMMENT_COLS, USER_COLS, WEBHOOK_SUBSCRIPTION_COLS, query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a raw API key. Returned to the caller exactly once;
/// only the hash is stored.
pub fn generate_api_key() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();
    format!("cd_{}", suffix)
}

/// SHA-256 hex of an API key, used for storage and lookup.
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Generate a webhook signing secret.
pub fn generate_webhook_secret() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(40)
        .map(char::from)
        .collect();
    format!("whsec_{}", suffix)
}

/// Builder for dynamic UPDATE statements with optional fields.
/// Combines multiple field updates into a single query for efficiency.
struct UpdateBuilder {
    table: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
    track_updated_at: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id: &str) -> Self {
        Self {
            table,
            id: id.to_string(),
            fields: Vec::new(),
            track_updated_at: false,
        }
    }

    fn with_updated_at(mut self) -> Self {
        self.track_updated_at = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a column to an explicit value (including NULL).
    /// Use this for Option<T> where Some(v) = set to v, None = set to NULL.
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.fields.push((column, v.into())),
            None => self.fields.push((column, Value::Null)),
        }
        self
    }

    fn execute(mut self, conn: &Connection) -> Result<bool> {
        if self.fields.is_empty() {
            return Ok(false);
        }
        if self.track_updated_at {
            self.fields.push(("updated_at", now().into()));
        }
        let sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.table, sets.join(", "));
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(affected > 0)
    }
}

// ============ Users ============

pub fn create_user(conn: &Connection, input: &RegisterUser) -> Result<(User, String)> {
    if get_user_by_email(conn, &input.email)?.is_some() {
        return Err(AppError::Conflict("email already registered".into()));
    }

    let id = gen_id();
    let ts = now();
    let api_key = generate_api_key();
    let api_key_hash = hash_api_key(&api_key);

    conn.execute(
        "INSERT INTO users (id, email, name, api_key_hash, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![&id, &input.email, &input.name, &api_key_hash, ts, ts],
    )?;

    let user = User {
        id,
        email: input.email.clone(),
        name: input.name.clone(),
        api_key_hash,
        created_at: ts,
        updated_at: ts,
    };
    Ok((user, api_key))
}

pub fn get_user_by_id(conn: &Connection, id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLS),
        &[&id],
    )
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE email = ?1", USER_COLS),
        &[&email],
    )
}

pub fn get_user_by_api_key(conn: &Connection, api_key: &str) -> Result<Option<User>> {
    let hash = hash_api_key(api_key);
    query_one(
        conn,
        &format!("SELECT {} FROM users WHERE api_key_hash = ?1", USER_COLS),
        &[&hash],
    )
}

pub fn update_user(conn: &Connection, id: &str, input: &UpdateUser) -> Result<Option<User>> {
    UpdateBuilder::new("users", id)
        .with_updated_at()
        .set_opt("name", input.name.clone())
        .execute(conn)?;
    get_user_by_id(conn, id)
}

// ============ Plans ============

pub fn create_plan(conn: &Connection, name: &str, max_users: i64) -> Result<Plan> {
    let id = gen_id();
    let ts = now();
    conn.execute(
        "INSERT INTO plans (id, name, max_users, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![&id, name, max_users, ts],
    )?;
    Ok(Plan {
        id,
        name: name.to_string(),
        max_users,
        created_at: ts,
    })
}

pub fn list_plans(conn: &Connection) -> Result<Vec<Plan>> {
    query_all(
        conn,
        &format!("SELECT {} FROM plans ORDER BY max_users", PLAN_COLS),
        &[],
    )
}

pub fn get_plan_by_id(conn: &Connection, id: &str) -> Result<Option<Plan>> {
    query_one(
        conn,
        &format!("SELECT {} FROM plans WHERE id = ?1", PLAN_COLS),
        &[&id],
    )
}

// ============ Organizations ============

/// Create an organization and its owner-role membership atomically.
pub fn create_organization(
    conn: &mut Connection,
    owner: &User,
    input: &CreateOrganization,
) -> Result<Organization> {
    let slug = input.slug();
    if slug.is_empty() {
        return Err(AppError::BadRequest("slug cannot be empty".into()));
    }

    let tx = conn.transaction()?;

    let taken: Option<Organization> = query_one(
        &tx,
        &format!("SELECT {} FROM organizations WHERE slug = ?1", ORGANIZATION_COLS),
        &[&slug],
    )?;
    if taken.is_some() {
        return Err(AppError::Conflict("slug already in use".into()));
    }

    if let Some(ref plan_id) = input.plan_id
        && get_plan_by_id(&tx, plan_id)?.is_none()
    {
        return Err(AppError::BadRequest("plan not found".into()));
    }

    let id = gen_id();
    let ts = now();
    tx.execute(
        "INSERT INTO organizations (id, name, slug, owner_id, plan_id, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)",
        params![&id, &input.name, &slug, &owner.id, &input.plan_id, ts],
    )?;
    tx.execute(
        "INSERT INTO memberships (id, user_id, org_id, role, is_active, joined_at)
         VALUES (?1, ?2, ?3, 'owner', 1, ?4)",
        params![gen_id(), &owner.id, &id, ts],
    )?;

    tx.commit()?;

    Ok(Organization {
        id,
        name: input.name.clone(),
        slug,
        owner_id: Some(owner.id.clone()),
        plan_id: input.plan_id.clone(),
        is_active: true,
        created_at: ts,
    })
}

pub fn get_organization_by_id(conn: &Connection, id: &str) -> Result<Option<Organization>> {
    query_one(
        conn,
        &format!("SELECT {} FROM organizations WHERE id = ?1", ORGANIZATION_COLS),
        &[&id],
    )
}

/// Tenant resolution lookup: only active organizations resolve.
pub fn get_active_organization_by_id(conn: &Connection, id: &str) -> Result<Option<Organization>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM organizations WHERE id = ?1 AND is_active = 1",
            ORGANIZATION_COLS
        ),
        &[&id],
    )
}

/// Organizations where the user holds an active membership.
pub fn list_organizations_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Organization>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM organizations
             WHERE id IN (SELECT org_id FROM memberships WHERE user_id = ?1 AND is_active = 1)
             ORDER BY created_at DESC",
            ORGANIZATION_COLS
        ),
        &[&user_id],
    )
}

pub fn update_organization(
    conn: &Connection,
    id: &str,
    input: &UpdateOrganization,
) -> Result<Option<Organization>> {
    if let Some(ref plan_id) = input.plan_id
        && get_plan_by_id(conn, plan_id)?.is_none()
    {
        return Err(AppError::BadRequest("plan not found".into()));
    }
    UpdateBuilder::new("organizations", id)
        .set_opt("name", input.name.clone())
        .set_opt("plan_id", input.plan_id.clone())
        .execute(conn)?;
    get_organization_by_id(conn, id)
}

/// Hard delete. Memberships, invitations, projects, tasks, webhooks and
/// notifications go with it via FK cascade; audit rows live in the audit
/// store and are purged separately.
pub fn delete_organization(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM organizations WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

// ============ Memberships ============

pub fn get_active_membership(
    conn: &Connection,
    user_id: &str,
    org_id: &str,
) -> Result<Option<Membership>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM memberships WHERE user_id = ?1 AND org_id = ?2 AND is_active = 1",
            MEMBERSHIP_COLS
        ),
        &[&user_id, &org_id],
    )
}

pub fn get_membership_by_id(conn: &Connection, id: &str) -> Result<Option<Membership>> {
    query_one(
        conn,
        &format!("SELECT {} FROM memberships WHERE id = ?1", MEMBERSHIP_COLS),
        &[&id],
    )
}

pub fn list_memberships_with_user_paginated(
    conn: &Connection,
    org_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<MembershipWithUser>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM memberships WHERE org_id = ?1 AND is_active = 1",
        params![org_id],
        |row| row.get(0),
    )?;
    let members = query_all(
        conn,
        &format!(
            "SELECT {} FROM memberships m JOIN users u ON m.user_id = u.id
             WHERE m.org_id = ?1 AND m.is_active = 1
             ORDER BY m.joined_at DESC LIMIT ?2 OFFSET ?3",
            MEMBERSHIP_WITH_USER_COLS
        ),
        &[&org_id, &limit, &offset],
    )?;
    Ok((members, total))
}

pub fn update_membership_role(
    conn: &Connection,
    id: &str,
    role: MembershipRole,
) -> Result<Option<Membership>> {
    UpdateBuilder::new("memberships", id)
        .set("role", role.as_str().to_string())
        .execute(conn)?;
    get_membership_by_id(conn, id)
}

/// Soft removal: the row stays (unique (user, org) preserved), only the
/// active flag drops.
pub fn deactivate_membership(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE memberships SET is_active = 0 WHERE id = ?1 AND is_active = 1",
        params![id],
    )?;
    Ok(affected > 0)
}

// ============ Invitations ============

pub fn create_invitation(
    conn: &Connection,
    org_id: &str,
    inviter_id: &str,
    invited_user_id: Option<&str>,
    input: &CreateInvitation,
) -> Result<Invitation> {
    let id = gen_id();
    let ts = now();
    let expires_at = input.expires_in_days.map(|days| ts + days * 86400);

    conn.execute(
        "INSERT INTO invitations (id, org_id, inviter_id, invited_user_id, email, role, accepted, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7, ?8)",
        params![
            &id,
            org_id,
            inviter_id,
            invited_user_id,
            &input.email,
            input.role.as_str(),
            ts,
            expires_at
        ],
    )?;

    Ok(Invitation {
        id,
        org_id: org_id.to_string(),
        inviter_id: Some(inviter_id.to_string()),
        invited_user_id: invited_user_id.map(String::from),
        email: input.email.clone(),
        role: input.role,
        accepted: false,
        created_at: ts,
        expires_at,
    })
}

/// Pending invitations addressed to this user (by resolved account or email).
pub fn list_pending_invitations_for_user(
    conn: &Connection,
    user: &User,
) -> Result<Vec<Invitation>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM invitations
             WHERE accepted = 0 AND (invited_user_id = ?1 OR email = ?2)
             ORDER BY created_at DESC",
            INVITATION_COLS
        ),
        &[&user.id, &user.email],
    )
}

/// Look up a pending invitation the given user is allowed to act on.
///
/// The identity guard (email or resolved account match) is part of the
/// query: an invitation addressed to someone else behaves exactly like a
/// missing one.
pub fn find_pending_invitation_for(
    conn: &Connection,
    invite_id: &str,
    user: &User,
) -> Result<Option<Invitation>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM invitations
             WHERE id = ?1 AND accepted = 0 AND (invited_user_id = ?2 OR email = ?3)",
            INVITATION_COLS
        ),
        &[&invite_id, &user.id, &user.email],
    )
}

pub fn delete_invitation(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "DELETE FROM invitations WHERE id = ?1 AND accepted = 0",
        params![id],
    )?;
    Ok(affected > 0)
}

/// Accept an invitation: flip the accepted flag and create (or reactivate)
/// the membership as one atomic unit.
///
/// The transaction starts IMMEDIATE so competing accepts serialize on the
/// write lock; the `accepted = 0` filter on the UPDATE makes the loser
/// observe NotFound. Accepting when a membership row already exists for
/// (user, org) is an idempotent success: the row takes the invitation's
/// role and is reactivated.
pub fn accept_invitation(
    conn: &mut Connection,
    invitee: &User,
    invite_id: &str,
) -> Result<(Invitation, Membership)> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let invitation = find_pending_invitation_for(&tx, invite_id, invitee)?
        .ok_or_else(|| AppError::NotFound("Invitation not found".into()))?;

    if invitation.is_expired(now()) {
        return Err(AppError::BadRequest("invitation has expired".into()));
    }

    let affected = tx.execute(
        "UPDATE invitations SET accepted = 1 WHERE id = ?1 AND accepted = 0",
        params![invite_id],
    )?;
    if affected == 0 {
        // Lost the race to a concurrent accept.
        return Err(AppError::NotFound("Invitation not found".into()));
    }

    let ts = now();
    let existing: Option<Membership> = query_one(
        &tx,
        &format!(
            "SELECT {} FROM memberships WHERE user_id = ?1 AND org_id = ?2",
            MEMBERSHIP_COLS
        ),
        &[&invitee.id, &invitation.org_id],
    )?;

    let membership = match existing {
        Some(mut member) => {
            tx.execute(
                "UPDATE memberships SET role = ?1, is_active = 1 WHERE id = ?2",
                params![invitation.role.as_str(), &member.id],
            )?;
            member.role = invitation.role;
            member.is_active = true;
            member
        }
        None => {
            let member = Membership {
                id: gen_id(),
                user_id: invitee.id.clone(),
                org_id: invitation.org_id.clone(),
                role: invitation.role,
                is_active: true,
                joined_at: ts,
            };
            tx.execute(
                "INSERT INTO memberships (id, user_id, org_id, role, is_active, joined_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                params![
                    &member.id,
                    &member.user_id,
                    &member.org_id,
                    member.role.as_str(),
                    member.joined_at
                ],
            )?;
            member
        }
    };

    tx.commit()?;

    Ok((invitation, membership))
}

// ============ Projects ============

/// Create a project and its owner-role project membership atomically.
pub fn create_project(
    conn: &mut Connection,
    org_id: &str,
    owner: &User,
    input: &CreateProject,
) -> Result<Project> {
    let slug = input.slug();
    if slug.is_empty() {
        return Err(AppError::BadRequest("slug cannot be empty".into()));
    }

    let tx = conn.transaction()?;

    let taken: Option<Project> = query_one(
        &tx,
        &format!(
            "SELECT {} FROM projects WHERE org_id = ?1 AND slug = ?2",
            PROJECT_COLS
        ),
        &[&org_id, &slug],
    )?;
    if taken.is_some() {
        return Err(AppError::Conflict("slug already in use".into()));
    }

    let id = gen_id();
    let ts = now();
    tx.execute(
        "INSERT INTO projects (id, org_id, name, slug, description, owner_id, is_public, archived, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8)",
        params![&id, org_id, &input.name, &slug, &input.description, &owner.id, input.is_public, ts],
    )?;
    tx.execute(
        "INSERT INTO project_members (id, project_id, user_id, role, joined_at)
         VALUES (?1, ?2, ?3, 'owner', ?4)",
        params![gen_id(), &id, &owner.id, ts],
    )?;

    tx.commit()?;

    Ok(Project {
        id,
        org_id: org_id.to_string(),
        name: input.name.clone(),
        slug,
        description: input.description.clone(),
        owner_id: owner.id.clone(),
        is_public: input.is_public,
        archived: false,
        created_at: ts,
        updated_at: ts,
    })
}

pub fn get_project_by_id(conn: &Connection, id: &str) -> Result<Option<Project>> {
    query_one(
        conn,
        &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLS),
        &[&id],
    )
}

/// Projects in the org visible to the user: public ones, those they are a
/// member of, and those they own. Org managers see everything via the
/// `see_all` flag.
pub fn list_projects_visible_to(
    conn: &Connection,
    org_id: &str,
    user_id: &str,
    see_all: bool,
) -> Result<Vec<Project>> {
    if see_all {
        return query_all(
            conn,
            &format!(
                "SELECT {} FROM projects WHERE org_id = ?1 AND archived = 0 ORDER BY updated_at DESC",
                PROJECT_COLS
            ),
            &[&org_id],
        );
    }
    query_all(
        conn,
        &format!(
            "SELECT {} FROM projects
             WHERE org_id = ?1 AND archived = 0
               AND (is_public = 1 OR owner_id = ?2
                    OR id IN (SELECT project_id FROM project_members WHERE user_id = ?2))
             ORDER BY updated_at DESC",
            PROJECT_COLS
        ),
        &[&org_id, &user_id],
    )
}

pub fn update_project(
    conn: &Connection,
    id: &str,
    input: &UpdateProject,
) -> Result<Option<Project>> {
    UpdateBuilder::new("projects", id)
        .with_updated_at()
        .set_opt("name", input.name.clone())
        .set_opt("description", input.description.clone())
        .set_opt("is_public", input.is_public)
        .set_opt("archived", input.archived)
        .execute(conn)?;
    get_project_by_id(conn, id)
}

pub fn delete_project(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
    Ok(affected > 0)
}

pub fn get_project_member(
    conn: &Connection,
    project_id: &str,
    user_id: &str,
) -> Result<Option<ProjectMember>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM project_members WHERE project_id = ?1 AND user_id = ?2",
            PROJECT_MEMBER_COLS
        ),
        &[&project_id, &user_id],
    )
}

pub fn create_project_member(
    conn: &Connection,
    project_id: &str,
    input: &CreateProjectMember,
) -> Result<ProjectMember> {
    if get_project_member(conn, project_id, &input.user_id)?.is_some() {
        return Err(AppError::Conflict("user is already a project member".into()));
    }
    let id = gen_id();
    let ts = now();
    conn.execute(
        "INSERT INTO project_members (id, project_id, user_id, role, joined_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, project_id, &input.user_id, input.role.as_str(), ts],
    )?;
    Ok(ProjectMember {
        id,
        project_id: project_id.to_string(),
        user_id: input.user_id.clone(),
        role: input.role,
        joined_at: ts,
    })
}

pub fn list_project_members(conn: &Connection, project_id: &str) -> Result<Vec<ProjectMember>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM project_members WHERE project_id = ?1 ORDER BY joined_at",
            PROJECT_MEMBER_COLS
        ),
        &[&project_id],
    )
}

// ============ Tasks ============

pub fn create_task(
    conn: &Connection,
    project_id: &str,
    org_id: &str,
    created_by: &str,
    input: &CreateTask,
) -> Result<Task> {
    if let Some(ref assignee) = input.assigned_to
        && get_user_by_id(conn, assignee)?.is_none()
    {
        return Err(AppError::BadRequest("assignee not found".into()));
    }

    let id = gen_id();
    let ts = now();
    conn.execute(
        "INSERT INTO tasks (id, project_id, org_id, title, description, priority, status, assigned_to, due_date, is_archived, created_by, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11, ?11)",
        params![
            &id,
            project_id,
            org_id,
            &input.title,
            &input.description,
            input.priority.as_str(),
            input.status.as_str(),
            &input.assigned_to,
            input.due_date,
            created_by,
            ts
        ],
    )?;

    Ok(Task {
        id,
        project_id: project_id.to_string(),
        org_id: org_id.to_string(),
        title: input.title.clone(),
        description: input.description.clone(),
        priority: input.priority,
        status: input.status,
        assigned_to: input.assigned_to.clone(),
        due_date: input.due_date,
        is_archived: false,
        created_by: Some(created_by.to_string()),
        created_at: ts,
        updated_at: ts,
    })
}

pub fn get_task_by_id(conn: &Connection, id: &str) -> Result<Option<Task>> {
    query_one(
        conn,
        &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLS),
        &[&id],
    )
}

pub fn list_tasks_for_project_paginated(
    conn: &Connection,
    project_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Task>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE project_id = ?1 AND is_archived = 0",
        params![project_id],
        |row| row.get(0),
    )?;
    let tasks = query_all(
        conn,
        &format!(
            "SELECT {} FROM tasks WHERE project_id = ?1 AND is_archived = 0
             ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
            TASK_COLS
        ),
        &[&project_id, &limit, &offset],
    )?;
    Ok((tasks, total))
}

pub fn update_task(conn: &Connection, id: &str, input: &UpdateTask) -> Result<Option<Task>> {
    if let Some(Some(ref assignee)) = input.assigned_to
        && get_user_by_id(conn, assignee)?.is_none()
    {
        return Err(AppError::BadRequest("assignee not found".into()));
    }

    let mut builder = UpdateBuilder::new("tasks", id)
        .with_updated_at()
        .set_opt("title", input.title.clone())
        .set_opt("description", input.description.clone())
        .set_opt("priority", input.priority.map(|p| p.as_str().to_string()))
        .set_opt("status", input.status.map(|s| s.as_str().to_string()));
    if let Some(ref assigned_to) = input.assigned_to {
        builder = builder.set_nullable("assigned_to", assigned_to.clone());
    }
    if let Some(due_date) = input.due_date {
        builder = builder.set_nullable("due_date", due_date);
    }
    builder.execute(conn)?;
    get_task_by_id(conn, id)
}

/// Deletion is archival: the row stays for history, list queries skip it.
pub fn archive_task(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE tasks SET is_archived = 1, updated_at = ?1 WHERE id = ?2 AND is_archived = 0",
        params![now(), id],
    )?;
    Ok(affected > 0)
}

pub fn create_task_comment(
    conn: &Connection,
    task_id: &str,
    user_id: &str,
    input: &CreateTaskComment,
) -> Result<TaskComment> {
    let id = gen_id();
    let ts = now();
    conn.execute(
        "INSERT INTO task_comments (id, task_id, user_id, body, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![&id, task_id, user_id, &input.body, ts],
    )?;
    Ok(TaskComment {
        id,
        task_id: task_id.to_string(),
        user_id: Some(user_id.to_string()),
        body: input.body.clone(),
        created_at: ts,
    })
}

pub fn list_task_comments(conn: &Connection, task_id: &str) -> Result<Vec<TaskComment>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM task_comments WHERE task_id = ?1 ORDER BY created_at",
            TASK_COMMENT_COLS
        ),
        &[&task_id],
    )
}

// ============ Webhook subscriptions ============

pub fn create_webhook_subscription(
    conn: &Connection,
    org_id: &str,
    url: &str,
    events: &[WebhookEvent],
    secret: &str,
) -> Result<WebhookSubscription> {
    let id = gen_id();
    let ts = now();
    let names: Vec<&str> = events.iter().map(|e| e.as_str()).collect();
    let events_json = serde_json::to_string(&names)?;

    conn.execute(
        "INSERT INTO webhook_subscriptions (id, org_id, url, events, secret, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
        params![&id, org_id, url, &events_json, secret, ts],
    )?;

    Ok(WebhookSubscription {
        id,
        org_id: org_id.to_string(),
        url: url.to_string(),
        events: events.to_vec(),
        secret: secret.to_string(),
        is_active: true,
        created_at: ts,
        updated_at: ts,
    })
}

pub fn get_webhook_subscription_by_id(
    conn: &Connection,
    id: &str,
) -> Result<Option<WebhookSubscription>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM webhook_subscriptions WHERE id = ?1",
            WEBHOOK_SUBSCRIPTION_COLS
        ),
        &[&id],
    )
}

pub fn list_webhook_subscriptions(
    conn: &Connection,
    org_id: &str,
) -> Result<Vec<WebhookSubscription>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM webhook_subscriptions WHERE org_id = ?1 AND is_active = 1
             ORDER BY created_at DESC",
            WEBHOOK_SUBSCRIPTION_COLS
        ),
        &[&org_id],
    )
}

pub fn update_webhook_subscription(
    conn: &Connection,
    id: &str,
    url: Option<String>,
    events: Option<&[WebhookEvent]>,
    is_active: Option<bool>,
) -> Result<Option<WebhookSubscription>> {
    let events_json = match events {
        Some(events) => {
            let names: Vec<&str> = events.iter().map(|e| e.as_str()).collect();
            Some(serde_json::to_string(&names)?)
        }
        None => None,
    };
    UpdateBuilder::new("webhook_subscriptions", id)
        .with_updated_at()
        .set_opt("url", url)
        .set_opt("events", events_json)
        .set_opt("is_active", is_active)
        .execute(conn)?;
    get_webhook_subscription_by_id(conn, id)
}

/// Soft delete: mark inactive, keep the row.
pub fn disable_webhook_subscription(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE webhook_subscriptions SET is_active = 0, updated_at = ?1 WHERE id = ?2 AND is_active = 1",
        params![now(), id],
    )?;
    Ok(affected > 0)
}

/// Active subscriptions of the org whose event set contains the event.
/// The event list is a JSON array in SQLite, so membership is checked here
/// after the indexed org/active filter.
pub fn find_active_subscriptions_for_event(
    conn: &Connection,
    org_id: &str,
    event: WebhookEvent,
) -> Result<Vec<WebhookSubscription>> {
    let subs: Vec<WebhookSubscription> = query_all(
        conn,
        &format!(
            "SELECT {} FROM webhook_subscriptions WHERE org_id = ?1 AND is_active = 1",
            WEBHOOK_SUBSCRIPTION_COLS
        ),
        &[&org_id],
    )?;
    Ok(subs.into_iter().filter(|s| s.subscribes_to(event)).collect())
}

// ============ Notifications ============

#[allow(clippy::too_many_arguments)]
pub fn create_notification(
    conn: &Connection,
    org_id: &str,
    recipient_id: &str,
    actor_id: Option<&str>,
    verb: &str,
    title: &str,
    data: Option<&serde_json::Value>,
) -> Result<Notification> {
    let id = gen_id();
    let ts = now();
    let data_str = data.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO notifications (id, org_id, recipient_id, actor_id, verb, title, data, read, sent_via_email, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, ?8)",
        params![&id, org_id, recipient_id, actor_id, verb, title, &data_str, ts],
    )?;
    Ok(Notification {
        id,
        org_id: org_id.to_string(),
        recipient_id: recipient_id.to_string(),
        actor_id: actor_id.map(String::from),
        verb: verb.to_string(),
        title: title.to_string(),
        data: data.cloned(),
        read: false,
        sent_via_email: false,
        created_at: ts,
    })
}

pub fn list_notifications_for_recipient(
    conn: &Connection,
    org_id: &str,
    recipient_id: &str,
    limit: i64,
    offset: i64,
) -> Result<(Vec<Notification>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE org_id = ?1 AND recipient_id = ?2",
        params![org_id, recipient_id],
        |row| row.get(0),
    )?;
    let notifications = query_all(
        conn,
        &format!(
            "SELECT {} FROM notifications WHERE org_id = ?1 AND recipient_id = ?2
             ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
            NOTIFICATION_COLS
        ),
        &[&org_id, &recipient_id, &limit, &offset],
    )?;
    Ok((notifications, total))
}

/// Mark read, guarded by recipient so users cannot touch others' rows.
pub fn mark_notification_read(conn: &Connection, id: &str, recipient_id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE notifications SET read = 1 WHERE id = ?1 AND recipient_id = ?2",
        params![id, recipient_id],
    )?;
    Ok(affected > 0)
}

pub fn mark_notification_email_sent(conn: &Connection, id: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE notifications SET sent_via_email = 1 WHERE id = ?1",
        params![id],
    )?;
    Ok(affected > 0)
}

// ============ Audit Logs ============

#[allow(clippy::too_many_arguments)]
pub fn create_audit_log(
    conn: &Connection,
    enabled: bool,
    org_id: &str,
    actor_type: ActorType,
    actor: Option<&User>,
    action: AuditAction,
    object_type: &str,
    object_id: Option<&str>,
    message: &str,
    metadata: Option<&serde_json::Value>,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) -> Result<AuditLog> {
    let id = gen_id();
    let timestamp = now();

    let log = AuditLog {
        id: id.clone(),
        timestamp,
        org_id: org_id.to_string(),
        actor_type,
        actor_id: actor.map(|u| u.id.clone()),
        actor_email: actor.map(|u| u.email.clone()),
        actor_name: actor.map(|u| u.name.clone()),
        action: action.as_ref().to_string(),
        object_type: object_type.to_string(),
        object_id: object_id.map(String::from),
        message: message.to_string(),
        metadata: metadata.cloned(),
        ip_address: ip_address.map(String::from),
        user_agent: user_agent.map(String::from),
    };

    // Skip database insert if audit logging is disabled
    if !enabled {
        return Ok(log);
    }

    let metadata_str = metadata.map(|m| m.to_string());
    conn.execute(
        "INSERT INTO audit_logs (id, timestamp, org_id, actor_type, actor_id, actor_email, actor_name, action, object_type, object_id, message, metadata, ip_address, user_agent)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            &id,
            timestamp,
            org_id,
            actor_type.as_ref(),
            &log.actor_id,
            &log.actor_email,
            &log.actor_name,
            &log.action,
            object_type,
            object_id,
            message,
            &metadata_str,
            ip_address,
            user_agent
        ],
    )?;

    Ok(log)
}

/// Org-scoped audit query, newest first. The org filter is always applied;
/// callers cannot widen it through query parameters.
pub fn query_audit_logs(
    conn: &Connection,
    org_id: &str,
    query: &AuditLogQuery,
) -> Result<(Vec<AuditLog>, i64)> {
    let mut clauses = vec!["org_id = ?".to_string()];
    let mut values: Vec<Value> = vec![org_id.to_string().into()];

    if let Some(ref action) = query.action {
        clauses.push("action = ?".to_string());
        values.push(action.clone().into());
    }
    if let Some(ref actor_id) = query.actor_id {
        clauses.push("actor_id = ?".to_string());
        values.push(actor_id.clone().into());
    }
    if let Some(ref object_type) = query.object_type {
        clauses.push("object_type = ?".to_string());
        values.push(object_type.clone().into());
    }
    if let Some(ref object_id) = query.object_id {
        clauses.push("object_id = ?".to_string());
        values.push(object_id.clone().into());
    }
    if let Some(from) = query.from_timestamp {
        clauses.push("timestamp >= ?".to_string());
        values.push(from.into());
    }
    if let Some(to) = query.to_timestamp {
        clauses.push("timestamp <= ?".to_string());
        values.push(to.into());
    }

    let where_clause = format!("WHERE {}", clauses.join(" AND "));

    let count_sql = format!("SELECT COUNT(*) FROM audit_logs {}", where_clause);
    let total: i64 = conn.query_row(
        &count_sql,
        rusqlite::params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM audit_logs {} ORDER BY timestamp DESC LIMIT ? OFFSET ?",
        AUDIT_LOG_COLS, where_clause
    );
    values.push(query.limit().into());
    values.push(query.offset().into());

    let mut stmt = conn.prepare(&sql)?;
    let logs = stmt
        .query_map(rusqlite::params_from_iter(values), |row| {
            use super::from_row::FromRow;
            AuditLog::from_row(row)
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((logs, total))
}

/// Organization cascade across the store boundary: when an org is deleted
/// from the main database, its audit trail goes too.
pub fn purge_audit_logs_for_org(conn: &Connection, org_id: &str) -> Result<usize> {
    let affected = conn.execute("DELETE FROM audit_logs WHERE org_id = ?1", params![org_id])?;
    Ok(affected)
}
