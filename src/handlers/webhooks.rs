use axum::{
    extract::{Extension, State},
    http::{HeaderMap, StatusCode},
};

use crate::authz::{self, ALL_ROLES, MANAGER_ROLES};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Path};
use crate::middleware::{CurrentUser, TenantContext};
use crate::models::{
    ActorType, AuditAction, CreateWebhookSubscription, UpdateWebhookSubscription,
    WebhookSubscription,
};
use crate::util::AuditLogBuilder;

/// Active subscriptions of the current tenant. Secrets are never
/// serialized in responses.
pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
) -> Result<Json<Vec<WebhookSubscription>>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    Ok(Json(queries::list_webhook_subscriptions(&conn, &org.id)?))
}

/// Register a subscription. Event names are validated against the fixed
/// vocabulary; a signing secret is generated when none is supplied.
pub async fn create_subscription(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    headers: HeaderMap,
    Json(input): Json<CreateWebhookSubscription>,
) -> Result<(StatusCode, Json<WebhookSubscription>)> {
    let org = authz::require_tenant(&tenant)?;
    let events = input.validated_events()?;

    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, MANAGER_ROLES)?;

    let secret = input
        .secret
        .clone()
        .unwrap_or_else(queries::generate_webhook_secret);

    let subscription =
        queries::create_webhook_subscription(&conn, &org.id, &input.url, &events, &secret)?;

    let audit_conn = state.audit.get()?;
    if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers, &org.id)
        .actor(ActorType::User, Some(&user))
        .action(AuditAction::WebhookCreated)
        .object("webhook_subscription", Some(&subscription.id))
        .message(format!("Registered webhook for {}", subscription.url))
        .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    Ok((StatusCode::CREATED, Json(subscription)))
}

fn subscription_in_org(
    conn: &rusqlite::Connection,
    org_id: &str,
    id: &str,
) -> Result<WebhookSubscription> {
    let subscription = queries::get_webhook_subscription_by_id(conn, id)?
        .ok_or_else(|| AppError::NotFound("Webhook not found".into()))?;
    if subscription.org_id != org_id {
        return Err(AppError::NotFound("Webhook not found".into()));
    }
    Ok(subscription)
}

pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
) -> Result<Json<WebhookSubscription>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, ALL_ROLES)?;

    Ok(Json(subscription_in_org(&conn, &org.id, &id)?))
}

pub async fn update_subscription(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    Json(input): Json<UpdateWebhookSubscription>,
) -> Result<Json<WebhookSubscription>> {
    let org = authz::require_tenant(&tenant)?;
    let events = input.validated_events()?;

    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, MANAGER_ROLES)?;

    subscription_in_org(&conn, &org.id, &id)?;

    let updated = queries::update_webhook_subscription(
        &conn,
        &id,
        input.url.clone(),
        events.as_deref(),
        input.is_active,
    )?
    .ok_or_else(|| AppError::NotFound("Webhook not found".into()))?;

    Ok(Json(updated))
}

/// Soft delete: the subscription is disabled, not removed.
pub async fn delete_subscription(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let org = authz::require_tenant(&tenant)?;
    let conn = state.db.get()?;
    authz::require_roles(&conn, &user, org, MANAGER_ROLES)?;

    let subscription = subscription_in_org(&conn, &org.id, &id)?;
    if !queries::disable_webhook_subscription(&conn, &subscription.id)? {
        return Err(AppError::NotFound("Webhook not found".into()));
    }

    let audit_conn = state.audit.get()?;
    if let Err(e) = AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &headers, &org.id)
        .actor(ActorType::User, Some(&user))
        .action(AuditAction::WebhookDisabled)
        .object("webhook_subscription", Some(&subscription.id))
        .message(format!("Disabled webhook for {}", subscription.url))
        .save()
    {
        tracing::warn!("Failed to write audit log: {}", e);
    }

    Ok(Json(serde_json::json!({ "id": subscription.id, "is_active": false })))
}
