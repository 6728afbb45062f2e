pub mod chores;
pub mod sync;
pub mod templates;

use axum::Router;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(chores::router())
        .merge(templates::router())
        .merge(sync::router())
}
