use axum::extract::{Extension, State};

use crate::authz;
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path, Query};
use crate::middleware::{CurrentUser, TenantContext};
use crate::models::Notification;
use crate::pagination::{Paginated, PaginationQuery};

/// The caller's notifications in the current tenant, newest first.
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<Json<Paginated<Notification>>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;

    let limit = pagination.limit();
    let offset = pagination.offset();
    let (notifications, total) =
        queries::list_notifications_for_recipient(&conn, &org.id, &user.id, limit, offset)?;
    Ok(Json(Paginated::new(notifications, total, limit, offset)))
}

/// Mark one of the caller's notifications as read.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    if !queries::mark_notification_read(&conn, &id, &user.id)? {
        return Err(AppError::NotFound("Notification not found".into()));
    }
    Ok(Json(serde_json::json!({ "success": true })))
}
