use axum::{
    extract::{Extension, State},
    http::StatusCode,
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::middleware::CurrentUser;
use crate::models::{RegisterUser, RegisteredUser, UpdateUser, User};

/// Register a new account. The API key is returned exactly once;
/// only its hash is stored.
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterUser>,
) -> Result<(StatusCode, Json<RegisteredUser>)> {
    input.validate()?;

    let conn = state.db.get()?;
    let (user, api_key) = queries::create_user(&conn, &input)?;

    Ok((StatusCode::CREATED, Json(RegisteredUser { user, api_key })))
}

pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<User> {
    Json(user)
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(input): Json<UpdateUser>,
) -> Result<Json<User>> {
    input.validate()?;

    let conn = state.db.get()?;
    let updated = queries::update_user(&conn, &user.id, &input)?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    Ok(Json(updated))
}
