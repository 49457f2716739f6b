//! Route definitions for resource locks.
//!
//! All endpoints require authentication; listing and force-release require
//! the admin role.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::locks;
use crate::state::AppState;

/// Lock routes mounted at `/locks`.
///
/// ```text
/// GET    /                                   -> list_active_locks (admin)
/// POST   /acquire                            -> acquire_lock
/// POST   /heartbeat                          -> heartbeat
/// POST   /release                            -> release_lock
/// POST   /check-batch                        -> check_batch
/// POST   /cleanup                            -> cleanup
/// GET    /{resource_id}?resourceType=        -> get_lock_status
/// DELETE /{resource_type}/{resource_id}      -> force_release_lock (admin)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(locks::list_active_locks))
        .route("/acquire", post(locks::acquire_lock))
        .route("/heartbeat", post(locks::heartbeat))
        .route("/release", post(locks::release_lock))
        .route("/check-batch", post(locks::check_batch))
        .route("/cleanup", post(locks::cleanup))
        .route("/{resource_id}", get(locks::get_lock_status))
        .route(
            "/{resource_type}/{resource_id}",
            delete(locks::force_release_lock),
        )
}
