//! Bearer API-key authentication.
//!
//! Resolves the `Authorization: Bearer <key>` header to a user and
//! attaches it to request extensions. Tenant-independent; tenant scoping
//! is handled by the tenant resolver and the authorization engine.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::AppError;
use crate::models::User;
use crate::util::extract_bearer_token;

#[derive(Clone)]
pub struct CurrentUser(pub User);

pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key = extract_bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;

    let conn = state
        .db
        .get()
        .map_err(|e| AppError::Internal(format!("pool error: {}", e)))?;

    let user = queries::get_user_by_api_key(&conn, api_key)?.ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}
