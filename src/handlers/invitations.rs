use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};
use rusqlite::TransactionBehavior;

use crate::authz::{self, MANAGER_ROLES};
use crate::db::{AppState, queries};
use crate::email::spawn_invitation_email;
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::middleware::{CurrentUser, TenantContext};
use crate::models::{ActorType, AuditAction, CreateInvitation, Invitation, Membership};
use crate::util::AuditLogBuilder;

/// Invite a user to the current tenant. Owner/admin only, and the granted
/// role is capped at the inviter's own effective role.
pub async fn create_invitation(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    headers: HeaderMap,
    Json(input): Json<CreateInvitation>,
) -> Result<(StatusCode, Json<Invitation>)> {
    let org = authz::require_tenant(&tenant)?;
    input.validate()?;

    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, MANAGER_ROLES)?;

    let inviter_role = authz::effective_role(&conn, &user, org)?
        .ok_or_else(|| AppError::Forbidden("Access denied".into()))?;
    if input.role.rank() > inviter_role.rank() {
        return Err(AppError::Forbidden(
            "Cannot grant a role above your own".into(),
        ));
    }

    // Bind the invitation to a resolved account when the email is known.
    let invited_user = queries::get_user_by_email(&conn, &input.email)?;

    let invitation = queries::create_invitation(
        &conn,
        &org.id,
        &user.id,
        invited_user.as_ref().map(|u| u.id.as_str()),
        &input,
    )?;

    let audit_conn = state.audit.get()?;
    if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers, &org.id)
        .actor(ActorType::User, Some(&user))
        .action(AuditAction::InviteSent)
        .object("invitation", Some(&invitation.id))
        .message(format!(
            "Invited {} as {}",
            invitation.email,
            invitation.role.as_str()
        ))
        .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    spawn_invitation_email(state.clone(), invitation.clone(), org.name.clone());

    Ok((StatusCode::CREATED, Json(invitation)))
}

/// Pending invitations addressed to the caller (by account or email).
pub async fn list_my_invitations(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<Json<Vec<Invitation>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_pending_invitations_for_user(
        &conn, &user,
    )?))
}

#[derive(serde::Serialize)]
pub struct AcceptedInvitation {
    pub invitation: Invitation,
    pub membership: Membership,
}

/// Accept an invitation addressed to the caller. The membership creation
/// and the accepted-flag flip are one atomic unit; a concurrent second
/// accept observes NotFound.
pub async fn accept_invitation(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(invite_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<AcceptedInvitation>> {
    let mut conn = state.db.get()?;
    let (invitation, membership) = queries::accept_invitation(&mut conn, &user, &invite_id)?;

    let audit_conn = state.audit.get()?;
    if let Err(e) = AuditLogBuilder::new(
        &audit_conn,
        state.audit_log_enabled,
        &headers,
        &invitation.org_id,
    )
    .actor(ActorType::User, Some(&user))
    .action(AuditAction::InviteAccepted)
    .object("invitation", Some(&invitation.id))
    .message(format!(
        "{} accepted invitation as {}",
        user.email,
        invitation.role.as_str()
    ))
    .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    Ok(Json(AcceptedInvitation {
        invitation: Invitation {
            accepted: true,
            ..invitation
        },
        membership,
    }))
}

/// Reject an invitation addressed to the caller: the audit record is
/// written first (reflecting the still-pending state), then the row is
/// deleted. The whole transition runs under the write lock so concurrent
/// reject/accept attempts see either the pending row or nothing.
pub async fn reject_invitation(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(invite_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let mut conn = state.db.get()?;
    let audit_conn = state.audit.get()?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let invitation = queries::find_pending_invitation_for(&tx, &invite_id, &user)?
        .ok_or_else(|| AppError::NotFound("Invitation not found".into()))?;

    if let Err(e) = AuditLogBuilder::new(
        &audit_conn,
        state.audit_log_enabled,
        &headers,
        &invitation.org_id,
    )
    .actor(ActorType::User, Some(&user))
    .action(AuditAction::InviteRejected)
    .object("invitation", Some(&invitation.id))
    .message(format!(
        "{} rejected invitation to join as {}",
        user.email,
        invitation.role.as_str()
    ))
    .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    if !queries::delete_invitation(&tx, &invite_id)? {
        return Err(AppError::NotFound("Invitation not found".into()));
    }

    tx.commit()?;

    Ok(Json(serde_json::json!({ "success": true })))
}
