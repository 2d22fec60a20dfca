use axum::{
    extract::{Extension, State},
    http::StatusCode,
};

use crate::authz::{self, ALL_ROLES, MANAGER_ROLES};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::middleware::{CurrentUser, TenantContext};
use crate::models::{
    CreateProject, CreateProjectMember, Organization, Project, ProjectMember, UpdateProject, User,
};

/// Any active member can create a project; the creator becomes its owner.
pub async fn create_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Json(input): Json<CreateProject>,
) -> Result<(StatusCode, Json<Project>)> {
    let org = authz::require_tenant(&tenant)?;
    input.validate()?;

    let mut conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let project = queries::create_project(&mut conn, &org.id, &user, &input)?;
    Ok((StatusCode::CREATED, Json(project)))
}

/// Projects visible to the caller: all of them for org managers, otherwise
/// public ones plus those they own or belong to.
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Vec<Project>>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let see_all = authz::authorize(&conn, Some(&user), org, MANAGER_ROLES);
    let projects = queries::list_projects_visible_to(&conn, &org.id, &user.id, see_all)?;
    Ok(Json(projects))
}

/// Fetch a project in the current tenant, hiding ones the caller cannot
/// see behind the same 404 as missing ones.
fn visible_project(
    conn: &rusqlite::Connection,
    user: &User,
    org: &Organization,
    project_id: &str,
) -> Result<Project> {
    let project = queries::get_project_by_id(conn, project_id)?
        .ok_or_else(|| AppError::NotFound("Project not found".into()))?;
    if project.org_id != org.id {
        return Err(AppError::NotFound("Project not found".into()));
    }
    if !authz::can_view_project(conn, user, org, &project) {
        return Err(AppError::NotFound("Project not found".into()));
    }
    Ok(project)
}

pub async fn get_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(project_id): Path<String>,
) -> Result<Json<Project>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let project = visible_project(&conn, &user, org, &project_id)?;
    Ok(Json(project))
}

/// Writes go to the project owner or org managers.
pub async fn update_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(project_id): Path<String>,
    Json(input): Json<UpdateProject>,
) -> Result<Json<Project>> {
    let org = authz::require_tenant(&tenant)?;
    input.validate()?;

    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let project = visible_project(&conn, &user, org, &project_id)?;
    if !authz::can_edit_project(&conn, &user, org, &project) {
        return Err(AppError::Forbidden("Access denied".into()));
    }

    let updated = queries::update_project(&conn, &project_id, &input)?
        .ok_or_else(|| AppError::NotFound("Project not found".into()))?;
    Ok(Json(updated))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(project_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let project = visible_project(&conn, &user, org, &project_id)?;
    if !authz::can_edit_project(&conn, &user, org, &project) {
        return Err(AppError::Forbidden("Access denied".into()));
    }

    queries::delete_project(&conn, &project_id)?;
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn list_project_members(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(project_id): Path<String>,
) -> Result<Json<Vec<ProjectMember>>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let project = visible_project(&conn, &user, org, &project_id)?;
    Ok(Json(queries::list_project_members(&conn, &project.id)?))
}

pub async fn add_project_member(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(project_id): Path<String>,
    Json(input): Json<CreateProjectMember>,
) -> Result<(StatusCode, Json<ProjectMember>)> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    let project = visible_project(&conn, &user, org, &project_id)?;
    if !authz::can_edit_project(&conn, &user, org, &project) {
        return Err(AppError::Forbidden("Access denied".into()));
    }

    // The new member must hold an active membership in the tenant.
    let target = queries::get_user_by_id(&conn, &input.user_id)?
        .ok_or_else(|| AppError::BadRequest("user not found".into()))?;
    if !authz::authorize(&conn, Some(&target), org, ALL_ROLES) {
        return Err(AppError::BadRequest(
            "user is not a member of this organization".into(),
        ));
    }

    let member = queries::create_project_member(&conn, &project.id, &input)?;
    Ok((StatusCode::CREATED, Json(member)))
}
