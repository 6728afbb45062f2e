use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use remote::RemoteError;
use serde_json::json;
use services::services::{
    cache_sync::CacheSyncError, chores::ChoreServiceError, reconcile::ReconcileError,
};
use thiserror::Error;
use tracing::error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Chores(#[from] ChoreServiceError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Db(#[from] db::DbError),
}

impl ApiError {
    fn remote(&self) -> Option<&RemoteError> {
        match self {
            ApiError::Chores(ChoreServiceError::Remote(e)) => Some(e),
            ApiError::Chores(ChoreServiceError::CacheSync(CacheSyncError::Remote(e))) => Some(e),
            ApiError::Reconcile(ReconcileError::Remote(e)) => Some(e),
            ApiError::Reconcile(ReconcileError::CacheSync(CacheSyncError::Remote(e))) => Some(e),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // The one outcome that must stay distinct: the remote requires a
        // one-time consent step, and the client needs the URL to offer it.
        if let Some(RemoteError::AuthorizationRequired { url, message }) = self.remote() {
            let body = ApiResponse {
                success: false,
                data: Some(json!({
                    "kind": "authorization_required",
                    "auth_url": url,
                })),
                message: Some(message.clone()),
            };
            return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        }

        let status = match &self {
            ApiError::Chores(ChoreServiceError::NotFound(_))
            | ApiError::Chores(ChoreServiceError::TemplateNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Chores(ChoreServiceError::InvalidStatus { .. }) => StatusCode::CONFLICT,
            _ => match self.remote() {
                Some(RemoteError::Unauthorized) | Some(RemoteError::NoCredential) => {
                    StatusCode::UNAUTHORIZED
                }
                Some(_) => StatusCode::BAD_GATEWAY,
                None => StatusCode::INTERNAL_SERVER_ERROR,
            },
        };

        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        let body: ApiResponse<serde_json::Value> = ApiResponse::error(self.to_string());
        (status, Json(body)).into_response()
    }
}
