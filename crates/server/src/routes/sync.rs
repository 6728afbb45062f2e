//! Manual reconciliation trigger.

use axum::{Router, extract::State, response::Json as ResponseJson, routing::post};
use services::services::reconcile::ReconcileOutcome;
use utils::response::ApiResponse;

use crate::{error::ApiError, state::AppState};

/// Run a reconciliation pass now. If one is already in flight the trigger
/// is dropped and the outcome says so (`started: false`).
pub async fn trigger_sync(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<ReconcileOutcome>>, ApiError> {
    let outcome = state.reconciler.run_once().await?;
    Ok(ResponseJson(ApiResponse::success(outcome)))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/sync", post(trigger_sync))
}
