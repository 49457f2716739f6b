//! Handlers for lease-based resource locks.
//!
//! Lock endpoints let an editor acquire, renew, release and query an
//! exclusive lease on a semester, section or subject. List screens use the
//! batch check to render "locked" badges without taking any lease.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use buksu_core::error::CoreError;
use buksu_core::locks::{
    validate_batch, validate_target, AcquireLockResponse, ActiveLocksResponse, BatchCheckRequest,
    BatchCheckResponse, CleanupResponse, HeartbeatResponse, LockStatus, LockStatusQuery,
    LockTarget, ReleaseLockResponse,
};
use buksu_db::store::AcquireOutcome;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{AuthUser, BeaconAuthUser};
use crate::middleware::rbac::RequireAdmin;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Holder endpoints
// ---------------------------------------------------------------------------

/// POST /api/locks/acquire
///
/// Take an exclusive lease. Returns 423 with the holder's name when another
/// user holds it. Re-acquiring an own lease renews it.
pub async fn acquire_lock(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<LockTarget>,
) -> AppResult<impl IntoResponse> {
    validate_target(&input).map_err(CoreError::Validation)?;

    let outcome = state
        .store
        .acquire(&input, &auth.owner(), state.config.lock_ttl_secs)
        .await?;

    match outcome {
        AcquireOutcome::Acquired(lock) => {
            tracing::info!(
                user_id = auth.user_id,
                resource_type = %input.resource_type,
                resource_id = %input.resource_id,
                expires_at = %lock.expires_at,
                "Lock acquired"
            );
            Ok(Json(AcquireLockResponse {
                message: "Lock acquired".to_string(),
                lock: lock.grant(),
            }))
        }
        AcquireOutcome::Held(holder) => {
            tracing::debug!(
                user_id = auth.user_id,
                holder_id = holder.owner_id,
                resource_type = %input.resource_type,
                resource_id = %input.resource_id,
                "Lock denied"
            );
            Err(AppError::Core(CoreError::Locked {
                message: format!(
                    "This {} is currently being edited by {}",
                    input.resource_type, holder.owner_name
                ),
                locked_by: holder.owner_name,
                until: holder.expires_at,
            }))
        }
    }
}

/// POST /api/locks/heartbeat
///
/// Extend the caller's lease. Returns 404 `LOCK_LOST` if the caller is not
/// the current holder (never held it, released it, or let it lapse).
pub async fn heartbeat(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<LockTarget>,
) -> AppResult<impl IntoResponse> {
    validate_target(&input).map_err(CoreError::Validation)?;

    let lock = state
        .store
        .heartbeat(&input, auth.user_id, state.config.lock_ttl_secs)
        .await?
        .ok_or_else(|| {
            AppError::LockLost(format!("You do not hold an active lock on {input}"))
        })?;

    tracing::debug!(
        user_id = auth.user_id,
        resource_type = %input.resource_type,
        resource_id = %input.resource_id,
        new_expires_at = %lock.expires_at,
        "Lock extended"
    );

    Ok(Json(HeartbeatResponse {
        message: "Lock renewed".to_string(),
        expires_at: lock.expires_at,
    }))
}

/// POST /api/locks/release
///
/// Release the caller's lease. Also reachable with an `access_token` query
/// parameter for unload-time requests. Releasing something not held is not
/// an error: clients release best-effort.
pub async fn release_lock(
    BeaconAuthUser(auth): BeaconAuthUser,
    State(state): State<AppState>,
    Json(input): Json<LockTarget>,
) -> AppResult<impl IntoResponse> {
    validate_target(&input).map_err(CoreError::Validation)?;

    let released = state.store.release(&input, auth.user_id).await?;

    if released {
        tracing::info!(
            user_id = auth.user_id,
            resource_type = %input.resource_type,
            resource_id = %input.resource_id,
            "Lock released"
        );
    }

    Ok(Json(ReleaseLockResponse {
        message: if released {
            "Lock released".to_string()
        } else {
            "No active lock held".to_string()
        },
        released,
    }))
}

// ---------------------------------------------------------------------------
// Status endpoints
// ---------------------------------------------------------------------------

/// GET /api/locks/{resource_id}?resourceType=
///
/// Lock status of one resource from the caller's point of view.
pub async fn get_lock_status(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(resource_id): Path<String>,
    Query(query): Query<LockStatusQuery>,
) -> AppResult<impl IntoResponse> {
    let resource_type = query.resource_type.ok_or_else(|| {
        AppError::BadRequest("resourceType query parameter is required".into())
    })?;
    let target = LockTarget::new(resource_type, resource_id);
    validate_target(&target).map_err(CoreError::Validation)?;

    let status = state
        .store
        .get_active(&target)
        .await?
        .map(|lock| lock.status_for(auth.user_id))
        .unwrap_or_default();

    Ok(Json(status))
}

/// POST /api/locks/check-batch
///
/// Lock status of many resources at once, keyed `"<type>-<id>"`. Every
/// requested resource appears in the result; free ones as unlocked.
pub async fn check_batch(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<BatchCheckRequest>,
) -> AppResult<impl IntoResponse> {
    validate_batch(&input.resources).map_err(CoreError::Validation)?;

    let mut locks: HashMap<String, LockStatus> = input
        .resources
        .iter()
        .map(|target| (target.key(), LockStatus::unlocked()))
        .collect();

    for lock in state.store.get_active_many(&input.resources).await? {
        locks.insert(lock.target().key(), lock.status_for(auth.user_id));
    }

    Ok(Json(BatchCheckResponse { locks }))
}

/// POST /api/locks/cleanup
///
/// Sweep expired leases now instead of waiting for the background sweeper.
pub async fn cleanup(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let cleaned = state.store.cleanup_expired().await?;

    if cleaned > 0 {
        tracing::info!(user_id = auth.user_id, cleaned, "Expired locks cleaned up");
    }

    Ok(Json(CleanupResponse {
        message: format!("Cleaned up {cleaned} expired lock(s)"),
        cleaned,
    }))
}

// ---------------------------------------------------------------------------
// Admin endpoints
// ---------------------------------------------------------------------------

/// GET /api/locks
///
/// Every active lease, soonest expiry first. Admin only.
pub async fn list_active_locks(
    RequireAdmin(_admin): RequireAdmin,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let locks = state
        .store
        .list_active()
        .await?
        .iter()
        .map(|lock| lock.to_active_lock())
        .collect();

    Ok(Json(ActiveLocksResponse { locks }))
}

/// DELETE /api/locks/{resource_type}/{resource_id}
///
/// Release a lease held by anyone. Admin only.
pub async fn force_release_lock(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path((resource_type, resource_id)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let target = LockTarget::new(resource_type, resource_id);
    validate_target(&target).map_err(CoreError::Validation)?;

    let released = state.store.force_release(&target).await?;

    if released {
        tracing::warn!(
            admin_id = admin.user_id,
            resource_type = %target.resource_type,
            resource_id = %target.resource_id,
            "Lock force-released"
        );
    }

    Ok(Json(ReleaseLockResponse {
        message: if released {
            "Lock force-released".to_string()
        } else {
            "No active lock on this resource".to_string()
        },
        released,
    }))
}
