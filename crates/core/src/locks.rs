//! Resource lease constants, wire types, and validation.
//!
//! This module lives in `core` so that the store backends, the HTTP handlers
//! and the client library all reference the same lease durations, resource
//! types and JSON shapes. Wire types serialize in camelCase to match the
//! grading system's front end.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Lease timing constants
// ---------------------------------------------------------------------------

/// Default lease length in seconds (10 minutes).
pub const LOCK_TTL_SECS: i64 = 600;

/// Shortest lease the server may be configured with.
pub const MIN_LOCK_TTL_SECS: i64 = 30;

/// Longest lease the server may be configured with (4 hours).
pub const MAX_LOCK_TTL_SECS: i64 = 14_400;

/// Heartbeat period used by clients (80% of the default lease).
pub const HEARTBEAT_INTERVAL_SECS: u64 = 480;

/// How often list views re-poll batch lock status.
pub const BATCH_POLL_INTERVAL_SECS: u64 = 5;

/// Delay before the follow-up poll callers issue after a lock action.
pub const REFRESH_FOLLOWUP_SECS: u64 = 5;

/// How often the server sweeps expired leases.
pub const LOCK_SWEEP_INTERVAL_SECS: u64 = 60;

/// Upper bound on resources in one `/check-batch` request.
pub const MAX_BATCH_RESOURCES: usize = 200;

/// Upper bound on the length of a resource id.
pub const MAX_RESOURCE_ID_LEN: u64 = 128;

// ---------------------------------------------------------------------------
// Resource types
// ---------------------------------------------------------------------------

/// Known resource types that can be leased.
pub mod resource_types {
    pub const SEMESTER: &str = "semester";
    pub const SECTION: &str = "section";
    pub const SUBJECT: &str = "subject";
}

/// The set of all lockable resource types.
pub const VALID_RESOURCE_TYPES: &[&str] = &[
    resource_types::SEMESTER,
    resource_types::SECTION,
    resource_types::SUBJECT,
];

/// Returns `true` if the given resource type can be leased.
pub fn is_valid_resource_type(resource_type: &str) -> bool {
    VALID_RESOURCE_TYPES.contains(&resource_type)
}

/// Map key used for batch status results: `"<type>-<id>"`.
pub fn lock_key(resource_type: &str, resource_id: &str) -> String {
    format!("{resource_type}-{resource_id}")
}

/// Heartbeat period for a given lease length: 80% of the lease.
pub fn heartbeat_interval_for(lease: Duration) -> Duration {
    lease * 4 / 5
}

// ---------------------------------------------------------------------------
// LockTarget
// ---------------------------------------------------------------------------

/// Identifies the resource being protected, e.g. `("section", "sec-42")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LockTarget {
    #[validate(length(min = 1, message = "resourceType is required"))]
    pub resource_type: String,
    #[validate(length(min = 1, message = "resourceId is required"))]
    pub resource_id: String,
}

impl LockTarget {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    /// The `"<type>-<id>"` map key for this target.
    pub fn key(&self) -> String {
        lock_key(&self.resource_type, &self.resource_id)
    }
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource_type, self.resource_id)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Lock status as seen by one caller.
///
/// `is_you` distinguishes "I hold this lock" from "someone else holds it".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub locked: bool,
    pub by: Option<String>,
    pub until: Option<Timestamp>,
    pub is_you: bool,
}

impl LockStatus {
    /// Status of a resource nobody holds.
    pub fn unlocked() -> Self {
        Self::default()
    }

    /// Someone other than the caller holds the lease.
    pub fn held_by_other(&self) -> bool {
        self.locked && !self.is_you
    }

    /// The caller holds the lease.
    pub fn held_by_me(&self) -> bool {
        self.locked && self.is_you
    }
}

/// Lease details returned on a successful acquire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockGrant {
    pub resource_type: String,
    pub resource_id: String,
    pub owner_name: String,
    pub expires_at: Timestamp,
}

/// Response body of `POST /acquire`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireLockResponse {
    pub message: String,
    pub lock: LockGrant,
}

/// Body fields of the 423 response when another user holds the lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockConflict {
    pub message: String,
    pub locked_by: String,
    pub until: Timestamp,
}

/// Response body of `POST /heartbeat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatResponse {
    pub message: String,
    pub expires_at: Timestamp,
}

/// Response body of `POST /release` and the admin force-release endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseLockResponse {
    pub message: String,
    pub released: bool,
}

/// Query string of `GET /{resourceId}?resourceType=`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatusQuery {
    pub resource_type: Option<String>,
}

/// Request body of `POST /check-batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCheckRequest {
    pub resources: Vec<LockTarget>,
}

/// Response body of `POST /check-batch`, keyed by [`lock_key`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchCheckResponse {
    pub locks: HashMap<String, LockStatus>,
}

/// Response body of `POST /cleanup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub message: String,
    pub cleaned: u64,
}

/// One active lease in the admin listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLock {
    pub resource_type: String,
    pub resource_id: String,
    pub owner_id: DbId,
    pub owner_name: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

/// Response body of the admin `GET /` listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveLocksResponse {
    pub locks: Vec<ActiveLock>,
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Validate a lock target. Returns `Ok(())` or an error message.
pub fn validate_target(target: &LockTarget) -> Result<(), String> {
    target.validate().map_err(|e| e.to_string())?;
    if target.resource_id.trim().is_empty() {
        return Err("resourceId must not be blank".to_string());
    }
    if target.resource_id.chars().count() as u64 > MAX_RESOURCE_ID_LEN {
        return Err(format!(
            "resourceId must be at most {MAX_RESOURCE_ID_LEN} characters"
        ));
    }
    if !is_valid_resource_type(&target.resource_type) {
        return Err(format!(
            "Invalid resourceType '{}'. Must be one of: {}",
            target.resource_type,
            VALID_RESOURCE_TYPES.join(", ")
        ));
    }
    Ok(())
}

/// Validate a configured lease length in seconds.
pub fn validate_lease_ttl(secs: i64) -> Result<(), String> {
    if secs < MIN_LOCK_TTL_SECS {
        return Err(format!(
            "Lease TTL must be at least {MIN_LOCK_TTL_SECS} seconds, got {secs}"
        ));
    }
    if secs > MAX_LOCK_TTL_SECS {
        return Err(format!(
            "Lease TTL must be at most {MAX_LOCK_TTL_SECS} seconds, got {secs}"
        ));
    }
    Ok(())
}

/// Validate a batch of targets: bounded size, every entry valid.
pub fn validate_batch(resources: &[LockTarget]) -> Result<(), String> {
    if resources.len() > MAX_BATCH_RESOURCES {
        return Err(format!(
            "At most {MAX_BATCH_RESOURCES} resources may be checked at once, got {}",
            resources.len()
        ));
    }
    for target in resources {
        validate_target(target)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
