use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};

use crate::authz::{self, ALL_ROLES, MANAGER_ROLES};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::middleware::CurrentUser;
use crate::models::{
    ActorType, AuditAction, CreateOrganization, MembershipRole, Organization, UpdateOrganization,
};
use crate::util::AuditLogBuilder;

/// Create an organization. The creator becomes its owner and gets an
/// owner-role membership in the same transaction.
pub async fn create_organization(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(input): Json<CreateOrganization>,
) -> Result<(StatusCode, Json<Organization>)> {
    input.validate()?;

    let mut conn = state.db.get()?;
    let org = queries::create_organization(&mut conn, &user, &input)?;

    let audit_conn = state.audit.get()?;
    if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers, &org.id)
        .actor(ActorType::User, Some(&user))
        .action(AuditAction::CreateOrganization)
        .object("organization", Some(&org.id))
        .message(format!("Created organization \"{}\"", org.name))
        .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    Ok((StatusCode::CREATED, Json(org)))
}

/// Organizations the caller holds an active membership in.
pub async fn list_my_organizations(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<Organization>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_organizations_for_user(&conn, &user.id)?))
}

pub async fn get_organization(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
) -> Result<Json<Organization>> {
    let conn = state.db.get()?;
    let org = queries::get_organization_by_id(&conn, &org_id)?
        .ok_or_else(|| AppError::NotFound("Organization not found".into()))?;

    // Non-members get the same 404 as a missing org.
    if !authz::authorize(&conn, Some(&user), &org, ALL_ROLES) {
        return Err(AppError::NotFound("Organization not found".into()));
    }

    Ok(Json(org))
}

pub async fn update_organization(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
    Json(input): Json<UpdateOrganization>,
) -> Result<Json<Organization>> {
    input.validate()?;

    let conn = state.db.get()?;
    let org = queries::get_organization_by_id(&conn, &org_id)?
        .ok_or_else(|| AppError::NotFound("Organization not found".into()))?;

    authz::require_roles(&conn, &user, &org, MANAGER_ROLES)?;

    let updated = queries::update_organization(&conn, &org_id, &input)?
        .ok_or_else(|| AppError::NotFound("Organization not found".into()))?;

    Ok(Json(updated))
}

/// Delete an organization and everything it owns. Owner only.
/// The audit trail is purged with it (ownership cascade across stores).
pub async fn delete_organization(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(org_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    let org = queries::get_organization_by_id(&conn, &org_id)?
        .ok_or_else(|| AppError::NotFound("Organization not found".into()))?;

    authz::require_roles(&conn, &user, &org, &[MembershipRole::Owner])?;

    queries::delete_organization(&conn, &org_id)?;

    let audit_conn = state.audit.get()?;
    let purged = queries::purge_audit_logs_for_org(&audit_conn, &org_id)?;
    tracing::info!(
        "Organization {} deleted by {}; purged {} audit entries",
        org_id,
        user.id,
        purged
    );

    Ok(Json(serde_json::json!({ "success": true })))
}
