pub mod audit_logs;
pub mod auth;
pub mod invitations;
pub mod memberships;
pub mod notifications;
pub mod organizations;
pub mod plans;
pub mod projects;
pub mod tasks;
pub mod webhooks;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::db::AppState;
use crate::middleware::{require_api_key, resolve_tenant};

pub fn router(state: AppState) -> Router<AppState> {
    // Public endpoints (no auth)
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/plans", get(plans::list_plans));

    // Everything else requires a Bearer API key; tenant-scoped handlers
    // additionally gate on the resolved organization.
    let authed = Router::new()
        .route("/auth/me", get(auth::me).put(auth::update_me))
        .route(
            "/organizations",
            get(organizations::list_my_organizations).post(organizations::create_organization),
        )
        .route(
            "/organizations/{id}",
            get(organizations::get_organization)
                .put(organizations::update_organization)
                .delete(organizations::delete_organization),
        )
        .route(
            "/invitations",
            get(invitations::list_my_invitations).post(invitations::create_invitation),
        )
        .route("/invitations/{id}/accept", post(invitations::accept_invitation))
        .route("/invitations/{id}/reject", post(invitations::reject_invitation))
        .route("/memberships", get(memberships::list_memberships))
        .route(
            "/memberships/{id}",
            axum::routing::put(memberships::update_membership).delete(memberships::remove_membership),
        )
        .route(
            "/webhooks",
            get(webhooks::list_subscriptions).post(webhooks::create_subscription),
        )
        .route(
            "/webhooks/{id}",
            get(webhooks::get_subscription)
                .put(webhooks::update_subscription)
                .delete(webhooks::delete_subscription),
        )
        .route("/audit-logs", get(audit_logs::query_org_audit_logs))
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/projects/{id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/projects/{project_id}/members",
            get(projects::list_project_members).post(projects::add_project_member),
        )
        .route(
            "/projects/{project_id}/tasks",
            get(tasks::list_tasks).post(tasks::create_task),
        )
        .route(
            "/tasks/{id}",
            get(tasks::get_task)
                .patch(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route(
            "/tasks/{task_id}/comments",
            get(tasks::list_comments).post(tasks::create_comment),
        )
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/{id}/read", post(notifications::mark_read))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    // Tenant resolution wraps everything: it is permissive when the header
    // is absent and hard-fails on an invalid id before any handler runs.
    public
        .merge(authed)
        .layer(middleware::from_fn_with_state(state, resolve_tenant))
}
