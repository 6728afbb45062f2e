//! Routes for chore templates.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::get,
};
use db::cache::TemplateCache;
use db::models::chore::{ChoreTemplate, CreateTemplate};
use utils::response::ApiResponse;
use uuid::Uuid;

use super::chores::ActorQuery;
use crate::{error::ApiError, state::AppState};

pub async fn list_templates(
    State(state): State<AppState>,
) -> Result<ResponseJson<ApiResponse<Vec<ChoreTemplate>>>, ApiError> {
    let templates = TemplateCache::find_all(&state.db.pool).await?;
    Ok(ResponseJson(ApiResponse::success(templates)))
}

/// Creating a template also materializes its first instance; the
/// reconciler only keeps an already-started schedule current.
pub async fn create_template(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<CreateTemplate>,
) -> Result<ResponseJson<ApiResponse<ChoreTemplate>>, ApiError> {
    let template = state.chores.create_template(payload).await?;
    Ok(ResponseJson(ApiResponse::success(template)))
}

pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let actor = query.actor_id.unwrap_or_else(|| "unknown".to_string());
    state.chores.delete_template(id, &actor).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/templates",
        Router::new()
            .route("/", get(list_templates).post(create_template))
            .route("/{id}", axum::routing::delete(delete_template)),
    )
}
