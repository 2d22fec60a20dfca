//! Role and object-level authorization decisions.
//!
//! Every permission rule in the API funnels through this module so that
//! equivalent checks cannot drift apart across handlers. Decisions are
//! pure functions of (user, organization, membership lookup); any lookup
//! failure denies.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::middleware::TenantContext;
use crate::models::{MembershipRole, Organization, Project, User};

/// Roles allowed to manage tenant-owned resources.
pub const MANAGER_ROLES: &[MembershipRole] = &[MembershipRole::Owner, MembershipRole::Admin];

/// Any active membership.
pub const ALL_ROLES: &[MembershipRole] = &[
    MembershipRole::Owner,
    MembershipRole::Admin,
    MembershipRole::Member,
];

/// Gate for tenant-scoped endpoints: the resolver must have attached an
/// organization.
pub fn require_tenant(ctx: &TenantContext) -> Result<&Organization> {
    ctx.organization.as_ref().ok_or_else(|| {
        AppError::Forbidden(
            "Organization (tenant) is required in request header: X-ORGANIZATION-ID".into(),
        )
    })
}

/// True iff `user` may act on `org` with one of `roles`.
///
/// The organization owner is the implicit top authority regardless of
/// membership table contents. Everything else requires an active
/// membership whose role is in `roles`. Lookup errors deny (fail-closed),
/// never allow.
pub fn authorize(
    conn: &Connection,
    user: Option<&User>,
    org: &Organization,
    roles: &[MembershipRole],
) -> bool {
    let Some(user) = user else {
        return false;
    };

    if org.owner_id.as_deref() == Some(user.id.as_str()) {
        return true;
    }

    match queries::get_active_membership(conn, &user.id, &org.id) {
        Ok(Some(membership)) => roles.contains(&membership.role),
        Ok(None) => false,
        Err(e) => {
            tracing::warn!(
                "membership lookup failed for user {} in org {}, denying: {}",
                user.id,
                org.id,
                e
            );
            false
        }
    }
}

/// `authorize` as a guard, for handler preambles.
pub fn require_roles(
    conn: &Connection,
    user: &User,
    org: &Organization,
    roles: &[MembershipRole],
) -> Result<()> {
    if authorize(conn, Some(user), org, roles) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Access denied".into()))
    }
}

/// The user's effective role in the org, for invite-role capping.
/// The owner counts as `owner` even without a membership row.
pub fn effective_role(
    conn: &Connection,
    user: &User,
    org: &Organization,
) -> Result<Option<MembershipRole>> {
    if org.owner_id.as_deref() == Some(user.id.as_str()) {
        return Ok(Some(MembershipRole::Owner));
    }
    Ok(queries::get_active_membership(conn, &user.id, &org.id)?.map(|m| m.role))
}

/// Read visibility for projects: public ones are visible to any org
/// member; private ones to project members, the project owner, and org
/// managers.
pub fn can_view_project(
    conn: &Connection,
    user: &User,
    org: &Organization,
    project: &Project,
) -> bool {
    if project.owner_id == user.id || project.is_public {
        return true;
    }
    if authorize(conn, Some(user), org, MANAGER_ROLES) {
        return true;
    }
    matches!(
        queries::get_project_member(conn, &project.id, &user.id),
        Ok(Some(_))
    )
}

/// Writes go to the project owner or org managers. Project roles and org
/// roles are independent spaces; a project "owner" grants nothing org-wide.
pub fn can_edit_project(
    conn: &Connection,
    user: &User,
    org: &Organization,
    project: &Project,
) -> bool {
    project.owner_id == user.id || authorize(conn, Some(user), org, MANAGER_ROLES)
}
