use async_trait::async_trait;
use buksu_core::locks::LockTarget;
use buksu_core::types::DbId;

use super::{AcquireOutcome, LockStore, StoreError};
use crate::models::resource_lock::{LockOwner, ResourceLock};
use crate::repositories::resource_lock_repo::AcquireResult;
use crate::repositories::ResourceLockRepo;
use crate::DbPool;

/// [`LockStore`] backed by the `resource_locks` table.
#[derive(Clone)]
pub struct PgLockStore {
    pool: DbPool,
}

impl PgLockStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl LockStore for PgLockStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    async fn acquire(
        &self,
        target: &LockTarget,
        owner: &LockOwner,
        ttl_secs: i64,
    ) -> Result<AcquireOutcome, StoreError> {
        match ResourceLockRepo::acquire(&self.pool, target, owner, ttl_secs).await? {
            AcquireResult::Acquired(lock) => Ok(AcquireOutcome::Acquired(lock)),
            AcquireResult::Held(lock) => Ok(AcquireOutcome::Held(lock)),
            AcquireResult::Raced => Err(StoreError::Contention(target.to_string())),
        }
    }

    async fn heartbeat(
        &self,
        target: &LockTarget,
        owner_id: DbId,
        ttl_secs: i64,
    ) -> Result<Option<ResourceLock>, StoreError> {
        Ok(ResourceLockRepo::extend(&self.pool, target, owner_id, ttl_secs).await?)
    }

    async fn release(&self, target: &LockTarget, owner_id: DbId) -> Result<bool, StoreError> {
        Ok(ResourceLockRepo::release(&self.pool, target, owner_id).await?)
    }

    async fn force_release(&self, target: &LockTarget) -> Result<bool, StoreError> {
        Ok(ResourceLockRepo::force_release(&self.pool, target).await?)
    }

    async fn get_active(&self, target: &LockTarget) -> Result<Option<ResourceLock>, StoreError> {
        Ok(ResourceLockRepo::get_active(&self.pool, target).await?)
    }

    async fn get_active_many(
        &self,
        targets: &[LockTarget],
    ) -> Result<Vec<ResourceLock>, StoreError> {
        Ok(ResourceLockRepo::get_active_many(&self.pool, targets).await?)
    }

    async fn list_active(&self) -> Result<Vec<ResourceLock>, StoreError> {
        Ok(ResourceLockRepo::list_active(&self.pool).await?)
    }

    async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        Ok(ResourceLockRepo::cleanup_expired(&self.pool).await?)
    }
}
