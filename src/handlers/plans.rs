use axum::extract::State;

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Json;
use crate::models::Plan;

pub async fn list_plans(State(state): State<AppState>) -> Result<Json<Vec<Plan>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_plans(&conn)?))
}
