//! Backend-agnostic lease storage.
//!
//! The HTTP handlers hold an `Arc<dyn LockStore>` so the same service runs
//! against PostgreSQL in production and an in-memory map in development and
//! tests. Every backend must treat an expired lease as absent on every read
//! and on acquire, whether or not it has been swept yet.

mod memory;
mod postgres;

use async_trait::async_trait;
use buksu_core::locks::LockTarget;
use buksu_core::types::DbId;

pub use memory::MemoryLockStore;
pub use postgres::PgLockStore;

use crate::models::resource_lock::{LockOwner, ResourceLock};

/// Outcome of [`LockStore::acquire`].
#[derive(Debug, Clone)]
pub enum AcquireOutcome {
    /// The caller holds the lease now. Re-acquiring an own lease renews it.
    Acquired(ResourceLock),
    /// Another owner holds an unexpired lease.
    Held(ResourceLock),
}

/// Errors raised by lease storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The lease changed hands mid-acquire; the caller may retry.
    #[error("Lease on {0} changed while acquiring, retry")]
    Contention(String),
}

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Short backend name for health reporting.
    fn backend(&self) -> &'static str;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Try to take an exclusive lease on `target` for `ttl_secs` seconds.
    async fn acquire(
        &self,
        target: &LockTarget,
        owner: &LockOwner,
        ttl_secs: i64,
    ) -> Result<AcquireOutcome, StoreError>;

    /// Extend the caller's lease. `None` if the caller is not the holder.
    async fn heartbeat(
        &self,
        target: &LockTarget,
        owner_id: DbId,
        ttl_secs: i64,
    ) -> Result<Option<ResourceLock>, StoreError>;

    /// Release the caller's lease. `false` if the caller held nothing.
    async fn release(&self, target: &LockTarget, owner_id: DbId) -> Result<bool, StoreError>;

    /// Release a lease regardless of owner.
    async fn force_release(&self, target: &LockTarget) -> Result<bool, StoreError>;

    /// The unexpired lease on `target`, if any.
    async fn get_active(&self, target: &LockTarget) -> Result<Option<ResourceLock>, StoreError>;

    /// The unexpired leases among `targets`.
    async fn get_active_many(
        &self,
        targets: &[LockTarget],
    ) -> Result<Vec<ResourceLock>, StoreError>;

    /// Every unexpired lease, soonest expiry first.
    async fn list_active(&self) -> Result<Vec<ResourceLock>, StoreError>;

    /// Deactivate expired leases. Returns how many were swept.
    async fn cleanup_expired(&self) -> Result<u64, StoreError>;
}
