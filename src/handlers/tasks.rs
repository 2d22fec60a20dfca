use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};

use crate::authz::{self, ALL_ROLES};
use crate::db::{AppState, queries};
use crate::email::spawn_notification_email;
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::middleware::{CurrentUser, TenantContext};
use crate::models::{
    ActorType, AuditAction, CreateTask, CreateTaskComment, Organization, Task, TaskComment,
    UpdateTask, User, WebhookEvent,
};
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::AuditLogBuilder;
use crate::webhooks::dispatcher;

/// Fetch a task in the current tenant the caller may see. Task visibility
/// follows its project's visibility rules.
fn visible_task(
    conn: &rusqlite::Connection,
    user: &User,
    org: &Organization,
    task_id: &str,
) -> Result<Task> {
    let task = queries::get_task_by_id(conn, task_id)?
        .filter(|t| !t.is_archived)
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;
    if task.org_id != org.id {
        return Err(AppError::NotFound("Task not found".into()));
    }
    let project = queries::get_project_by_id(conn, &task.project_id)?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;
    if !authz::can_view_project(conn, user, org, &project) {
        return Err(AppError::NotFound("Task not found".into()));
    }
    Ok(task)
}

/// Assignment side effects: audit record, in-app notification, and a
/// best-effort email. Never fails the triggering operation.
fn record_assignment(
    state: &AppState,
    headers: &HeaderMap,
    org: &Organization,
    actor: &User,
    task: &Task,
    assignee_id: &str,
) {
    let conn = match state.db.get() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!("assignment side effects skipped, pool error: {}", e);
            return;
        }
    };

    if let Ok(audit_conn) = state.audit.get()
        && let Err(e) =
            AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, headers, &org.id)
                .actor(ActorType::User, Some(actor))
                .action(AuditAction::TaskAssigned)
                .object("task", Some(&task.id))
                .message(format!("Assigned \"{}\" to {}", task.title, assignee_id))
                .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    let assignee = match queries::get_user_by_id(&conn, assignee_id) {
        Ok(Some(user)) => user,
        Ok(None) => return,
        Err(e) => {
            tracing::warn!("assignment notification skipped, lookup error: {}", e);
            return;
        }
    };

    let data = serde_json::json!({
        "task_id": task.id,
        "project_id": task.project_id,
        "message": format!("Task assigned: {}", task.title),
    });
    match queries::create_notification(
        &conn,
        &org.id,
        &assignee.id,
        Some(&actor.id),
        "task_assigned",
        &format!("You've been assigned: {}", task.title),
        Some(&data),
    ) {
        Ok(notification) => {
            spawn_notification_email(state.clone(), notification, assignee.email);
        }
        Err(e) => {
            tracing::warn!("Failed to create assignment notification: {}", e);
        }
    }
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(project_id): Path<String>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<Task>>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let project = queries::get_project_by_id(&conn, &project_id)?
        .ok_or_else(|| AppError::NotFound("Project not found".into()))?;
    if project.org_id != org.id || !authz::can_view_project(&conn, &user, org, &project) {
        return Err(AppError::NotFound("Project not found".into()));
    }

    let limit = pagination.limit();
    let offset = pagination.offset();
    let (tasks, total) = queries::list_tasks_for_project_paginated(&conn, &project_id, limit, offset)?;
    Ok(Json(Paginated::new(tasks, total, limit, offset)))
}

/// Create a task. Emits `task.created` after the insert has committed.
pub async fn create_task(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<CreateTask>,
) -> Result<(StatusCode, Json<Task>)> {
    let org = authz::require_tenant(&tenant)?;
    input.validate()?;

    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let project = queries::get_project_by_id(&conn, &project_id)?
        .ok_or_else(|| AppError::NotFound("Project not found".into()))?;
    if project.org_id != org.id || !authz::can_view_project(&conn, &user, org, &project) {
        return Err(AppError::NotFound("Project not found".into()));
    }

    let task = queries::create_task(&conn, &project.id, &org.id, &user.id, &input)?;

    if let Ok(audit_conn) = state.audit.get()
        && let Err(e) =
            AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers, &org.id)
                .actor(ActorType::User, Some(&user))
                .action(AuditAction::TaskCreated)
                .object("task", Some(&task.id))
                .message(format!("Created task \"{}\"", task.title))
                .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    if let Some(ref assignee_id) = task.assigned_to {
        record_assignment(&state, &headers, org, &user, &task, assignee_id);
    }

    // Post-commit: the insert is durable before anything is scheduled.
    dispatcher::emit(&state, &org.id, WebhookEvent::TaskCreated, task.webhook_payload());

    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn get_task(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(task_id): Path<String>,
) -> Result<Json<Task>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let task = visible_task(&conn, &user, org, &task_id)?;
    Ok(Json(task))
}

/// Partial update. Emits `task.updated`; a changed assignee additionally
/// produces the assignment side effects.
pub async fn update_task(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateTask>,
) -> Result<Json<Task>> {
    let org = authz::require_tenant(&tenant)?;
    input.validate()?;

    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let existing = visible_task(&conn, &user, org, &task_id)?;

    let updated = queries::update_task(&conn, &task_id, &input)?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;

    if let Ok(audit_conn) = state.audit.get()
        && let Err(e) =
            AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers, &org.id)
                .actor(ActorType::User, Some(&user))
                .action(AuditAction::TaskUpdated)
                .object("task", Some(&updated.id))
                .message(format!("Updated task \"{}\"", updated.title))
                .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    if let Some(ref assignee_id) = updated.assigned_to
        && existing.assigned_to.as_deref() != Some(assignee_id.as_str())
    {
        record_assignment(&state, &headers, org, &user, &updated, assignee_id);
    }

    dispatcher::emit(&state, &org.id, WebhookEvent::TaskUpdated, updated.webhook_payload());

    Ok(Json(updated))
}

/// Deletion is archival. Narrower rule than other task writes: only the
/// project owner or org managers may delete.
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let task = visible_task(&conn, &user, org, &task_id)?;
    let project = queries::get_project_by_id(&conn, &task.project_id)?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))?;
    if !authz::can_edit_project(&conn, &user, org, &project) {
        return Err(AppError::Forbidden("Access denied".into()));
    }

    if !queries::archive_task(&conn, &task_id)? {
        return Err(AppError::NotFound("Task not found".into()));
    }

    if let Ok(audit_conn) = state.audit.get()
        && let Err(e) =
            AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers, &org.id)
                .actor(ActorType::User, Some(&user))
                .action(AuditAction::TaskDeleted)
                .object("task", Some(&task.id))
                .message(format!("Deleted task \"{}\"", task.title))
                .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    dispatcher::emit(&state, &org.id, WebhookEvent::TaskDeleted, task.webhook_payload());

    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn list_comments(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(task_id): Path<String>,
) -> Result<Json<Vec<TaskComment>>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let task = visible_task(&conn, &user, org, &task_id)?;
    Ok(Json(queries::list_task_comments(&conn, &task.id)?))
}

/// Add a comment. Emits `comment.added` after the insert has committed.
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<CreateTaskComment>,
) -> Result<(StatusCode, Json<TaskComment>)> {
    let org = authz::require_tenant(&tenant)?;
    input.validate()?;

    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let task = visible_task(&conn, &user, org, &task_id)?;
    let comment = queries::create_task_comment(&conn, &task.id, &user.id, &input)?;

    if let Ok(audit_conn) = state.audit.get()
        && let Err(e) =
            AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers, &org.id)
                .actor(ActorType::User, Some(&user))
                .action(AuditAction::CommentAdded)
                .object("task", Some(&task.id))
                .message(format!("Commented on \"{}\"", task.title))
                .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    dispatcher::emit(
        &state,
        &org.id,
        WebhookEvent::CommentAdded,
        comment.webhook_payload(),
    );

    Ok((StatusCode::CREATED, Json(comment)))
}
