pub mod health;
pub mod locks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// ```text
/// /locks/...                                       lease endpoints (see locks::router)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/locks", locks::router())
}
