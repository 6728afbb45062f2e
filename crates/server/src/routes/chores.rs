//! Routes for chore instances: cache-backed reads and the mutation facade.

use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::cache::ChoreCache;
use db::models::chore::{ChoreInstance, CreateChore, UpdateChore};
use serde::{Deserialize, Serialize};
use services::services::chores::ChoreServiceError;
use ts_rs::TS;
use utils::response::ApiResponse;
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ChoreListQuery {
    pub assignee_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct CompleteChoreRequest {
    pub completed_by: String,
    pub photo_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct VerifyChoreRequest {
    pub verified_by: String,
    pub approved: bool,
}

/// Reads come from the local cache and never block on the remote store.
pub async fn list_chores(
    State(state): State<AppState>,
    Query(query): Query<ChoreListQuery>,
) -> Result<ResponseJson<ApiResponse<Vec<ChoreInstance>>>, ApiError> {
    let chores = match query.assignee_id {
        Some(assignee) => ChoreCache::find_by_assignee(&state.db.pool, &assignee).await?,
        None => ChoreCache::find_all(&state.db.pool).await?,
    };
    Ok(ResponseJson(ApiResponse::success(chores)))
}

pub async fn get_chore(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ResponseJson<ApiResponse<ChoreInstance>>, ApiError> {
    let chore = ChoreCache::find_by_id(&state.db.pool, &id.to_string())
        .await?
        .ok_or(ChoreServiceError::NotFound(id))?;
    Ok(ResponseJson(ApiResponse::success(chore)))
}

pub async fn create_chore(
    State(state): State<AppState>,
    axum::Json(payload): axum::Json<CreateChore>,
) -> Result<ResponseJson<ApiResponse<ChoreInstance>>, ApiError> {
    let chore = state.chores.create_chore(payload).await?;
    Ok(ResponseJson(ApiResponse::success(chore)))
}

pub async fn update_chore(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    axum::Json(payload): axum::Json<UpdateChore>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    state.chores.update_chore(id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn delete_chore(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ActorQuery>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    let actor = query.actor_id.unwrap_or_else(|| "unknown".to_string());
    state.chores.delete_chore(id, &actor).await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn complete_chore(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    axum::Json(payload): axum::Json<CompleteChoreRequest>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    state
        .chores
        .complete_chore(id, &payload.completed_by, payload.photo_ref.as_deref())
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub async fn verify_chore(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    axum::Json(payload): axum::Json<VerifyChoreRequest>,
) -> Result<ResponseJson<ApiResponse<()>>, ApiError> {
    state
        .chores
        .verify_chore(id, &payload.verified_by, payload.approved)
        .await?;
    Ok(ResponseJson(ApiResponse::success(())))
}

pub fn router() -> Router<AppState> {
    Router::new().nest(
        "/chores",
        Router::new()
            .route("/", get(list_chores).post(create_chore))
            .route(
                "/{id}",
                get(get_chore).put(update_chore).delete(delete_chore),
            )
            .route("/{id}/complete", post(complete_chore))
            .route("/{id}/verify", post(verify_chore)),
    )
}
