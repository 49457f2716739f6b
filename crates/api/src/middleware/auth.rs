//! JWT-based authentication extractors for Axum handlers.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use buksu_core::error::CoreError;
use buksu_core::types::DbId;
use buksu_db::models::resource_lock::LockOwner;
use serde::Deserialize;

use crate::auth::jwt::verify_access_token;
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated user extracted from a JWT Bearer token in the `Authorization` header.
///
/// ```ignore
/// async fn my_handler(user: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = user.user_id, role = %user.role, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user's internal database id (from `claims.sub`).
    pub user_id: DbId,
    /// The user's role name (e.g. `"admin"`, `"instructor"`).
    pub role: String,
    /// Display name from the `name` claim, if the token carries one.
    pub name: Option<String>,
}

impl AuthUser {
    /// Validate a raw bearer token against the configured secret.
    fn from_token(token: &str, state: &AppState) -> Result<Self, AppError> {
        let claims = verify_access_token(token, &state.config.jwt).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;

        Ok(AuthUser {
            user_id: claims.sub,
            name: claims.holder_name().map(str::to_owned),
            role: claims.role,
        })
    }

    /// Name shown to other users while this user holds a lock.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("User {}", self.user_id))
    }

    /// The lease owner identity for this user.
    pub fn owner(&self) -> LockOwner {
        LockOwner {
            id: self.user_id,
            name: self.display_name(),
        }
    }
}

/// Read the bearer token from the `Authorization` header.
fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(header) = parts.headers.get("authorization") else {
        return Ok(None);
    };
    let value = header.to_str().map_err(|_| {
        AppError::Core(CoreError::Unauthorized(
            "Invalid Authorization header".into(),
        ))
    })?;
    value.strip_prefix("Bearer ").map(Some).ok_or_else(|| {
        AppError::Core(CoreError::Unauthorized(
            "Invalid Authorization format. Expected: Bearer <token>".into(),
        ))
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?.ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Missing Authorization header".into(),
            ))
        })?;
        AuthUser::from_token(token, state)
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Authenticated user for unload-time requests.
///
/// Beacon-style transports cannot set headers, so the token may also arrive
/// as an `access_token` query parameter. The header wins when both exist.
#[derive(Debug, Clone)]
pub struct BeaconAuthUser(pub AuthUser);

impl FromRequestParts<AppState> for BeaconAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(parts)? {
            return AuthUser::from_token(token, state).map(BeaconAuthUser);
        }

        let query = Query::<TokenQuery>::try_from_uri(&parts.uri)
            .map_err(|_| AppError::BadRequest("Malformed query string".into()))?;
        let token = query.0.access_token.ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Missing Authorization header or access_token".into(),
            ))
        })?;
        AuthUser::from_token(&token, state).map(BeaconAuthUser)
    }
}
