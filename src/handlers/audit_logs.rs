use axum::extract::{Extension, State};

use crate::authz::{self, MANAGER_ROLES};
use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::middleware::{CurrentUser, TenantContext};
use crate::models::{AuditLog, AuditLogQuery};
use crate::pagination::Paginated;

/// Query audit logs scoped to the current tenant, newest first.
/// The org filter always comes from the resolved tenant - query params
/// cannot widen it.
pub async fn query_org_audit_logs(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<AuditLogQuery>,
) -> Result<Json<Paginated<AuditLog>>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, MANAGER_ROLES)?;

    let limit = query.limit();
    let offset = query.offset();
    let audit_conn = state.audit.get()?;
    let (logs, total) = queries::query_audit_logs(&audit_conn, &org.id, &query)?;
    Ok(Json(Paginated::new(logs, total, limit, offset)))
}
