use axum::extract::State;
use axum::Json;

use crate::app_error::AppError;
use crate::engine;
use crate::models::room::RecentDecision;
use crate::web::state::AppState;

pub async fn recent_decisions(
    State(state): State<AppState>,
) -> Result<Json<Vec<RecentDecision>>, AppError> {
    let decisions = engine::recent_decisions(state.store.as_ref()).await?;
    Ok(Json(decisions))
}
