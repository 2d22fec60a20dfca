use axum::{
    extract::{Extension, State},
    http::HeaderMap,
};

use crate::authz::{self, ALL_ROLES, MANAGER_ROLES};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::middleware::{CurrentUser, TenantContext};
use crate::models::{
    ActorType, AuditAction, Membership, MembershipRole, MembershipWithUser, UpdateMembership,
};
use crate::pagination::{Paginated, PaginationQuery};
use crate::util::AuditLogBuilder;

/// List active members of the current tenant.
pub async fn list_memberships(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<MembershipWithUser>>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let limit = pagination.limit();
    let offset = pagination.offset();
    let (members, total) =
        queries::list_memberships_with_user_paginated(&conn, &org.id, limit, offset)?;
    Ok(Json(Paginated::new(members, total, limit, offset)))
}

/// Change a member's role. Owner-role rows are immutable here, and
/// granting the owner role requires being the owner.
pub async fn update_membership(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(membership_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<UpdateMembership>,
) -> Result<Json<Membership>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, MANAGER_ROLES)?;

    let existing = queries::get_membership_by_id(&conn, &membership_id)?
        .ok_or_else(|| AppError::NotFound("Member not found".into()))?;
    if existing.org_id != org.id {
        return Err(AppError::NotFound("Member not found".into()));
    }

    if existing.role == MembershipRole::Owner {
        return Err(AppError::BadRequest(
            "Cannot change an owner membership".into(),
        ));
    }
    if existing.user_id == user.id {
        return Err(AppError::BadRequest("Cannot change your own role".into()));
    }

    // Same cap as invitations: nobody grants a role above their own.
    let granter_role = authz::effective_role(&conn, &user, org)?
        .ok_or_else(|| AppError::Forbidden("Access denied".into()))?;
    if input.role.rank() > granter_role.rank() {
        return Err(AppError::Forbidden(
            "Cannot grant a role above your own".into(),
        ));
    }

    let updated = queries::update_membership_role(&conn, &membership_id, input.role)?
        .ok_or_else(|| AppError::NotFound("Member not found".into()))?;

    let audit_conn = state.audit.get()?;
    if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers, &org.id)
        .actor(ActorType::User, Some(&user))
        .action(AuditAction::MemberRoleUpdated)
        .object("membership", Some(&membership_id))
        .message(format!(
            "Changed role of {} to {}",
            existing.user_id,
            input.role.as_str()
        ))
        .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    Ok(Json(updated))
}

/// Soft-remove a member (is_active = 0). Owner-role memberships are never
/// removable through this operation.
pub async fn remove_membership(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(membership_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, MANAGER_ROLES)?;

    let existing = queries::get_membership_by_id(&conn, &membership_id)?
        .ok_or_else(|| AppError::NotFound("Member not found".into()))?;
    if existing.org_id != org.id || !existing.is_active {
        return Err(AppError::NotFound("Member not found".into()));
    }

    if existing.role == MembershipRole::Owner {
        return Err(AppError::BadRequest(
            "Cannot remove an owner membership".into(),
        ));
    }
    if existing.user_id == user.id {
        return Err(AppError::BadRequest("Cannot remove yourself".into()));
    }

    queries::deactivate_membership(&conn, &membership_id)?;

    let audit_conn = state.audit.get()?;
    if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers, &org.id)
        .actor(ActorType::User, Some(&user))
        .action(AuditAction::MemberRemoved)
        .object("membership", Some(&membership_id))
        .message(format!("Removed member {}", existing.user_id))
        .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    Ok(Json(serde_json::json!({ "success": true })))
}
