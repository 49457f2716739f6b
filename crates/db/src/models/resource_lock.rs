//! Resource lease model.

use buksu_core::locks::{ActiveLock, LockGrant, LockStatus, LockTarget};
use buksu_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `resource_locks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ResourceLock {
    pub id: DbId,
    pub resource_type: String,
    pub resource_id: String,
    pub owner_id: DbId,
    pub owner_name: String,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
    pub released_at: Option<Timestamp>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// The identity a lease is acquired on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOwner {
    pub id: DbId,
    pub name: String,
}

impl ResourceLock {
    pub fn target(&self) -> LockTarget {
        LockTarget::new(&self.resource_type, &self.resource_id)
    }

    /// Whether the lease has lapsed at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }

    /// Status of this lease as seen by `viewer_id`.
    pub fn status_for(&self, viewer_id: DbId) -> LockStatus {
        LockStatus {
            locked: true,
            by: Some(self.owner_name.clone()),
            until: Some(self.expires_at),
            is_you: self.owner_id == viewer_id,
        }
    }

    pub fn grant(&self) -> LockGrant {
        LockGrant {
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id.clone(),
            owner_name: self.owner_name.clone(),
            expires_at: self.expires_at,
        }
    }

    pub fn to_active_lock(&self) -> ActiveLock {
        ActiveLock {
            resource_type: self.resource_type.clone(),
            resource_id: self.resource_id.clone(),
            owner_id: self.owner_id,
            owner_name: self.owner_name.clone(),
            acquired_at: self.acquired_at,
            expires_at: self.expires_at,
        }
    }
}
