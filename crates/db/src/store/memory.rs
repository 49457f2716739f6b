use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use buksu_core::clock::{Clock, SystemClock};
use buksu_core::locks::LockTarget;
use buksu_core::types::{DbId, Timestamp};
use tokio::sync::RwLock;

use super::{AcquireOutcome, LockStore, StoreError};
use crate::models::resource_lock::{LockOwner, ResourceLock};

/// In-process [`LockStore`] for single-node deployments and tests.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application. Leases do not survive a restart.
pub struct MemoryLockStore {
    leases: RwLock<HashMap<LockTarget, ResourceLock>>,
    next_id: AtomicI64,
    clock: Arc<dyn Clock>,
}

impl MemoryLockStore {
    /// Create an empty store that reads wall-clock time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store driven by the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
            clock,
        }
    }

    fn live<'a>(
        leases: &'a HashMap<LockTarget, ResourceLock>,
        target: &LockTarget,
        now: Timestamp,
    ) -> Option<&'a ResourceLock> {
        leases.get(target).filter(|lock| !lock.is_expired_at(now))
    }
}

impl Default for MemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn acquire(
        &self,
        target: &LockTarget,
        owner: &LockOwner,
        ttl_secs: i64,
    ) -> Result<AcquireOutcome, StoreError> {
        let now = self.clock.now();
        let expires_at = now + chrono::Duration::seconds(ttl_secs);
        let mut leases = self.leases.write().await;

        let outcome = match Self::live(&leases, target, now) {
            Some(lock) if lock.owner_id == owner.id => {
                let mut renewed = lock.clone();
                renewed.expires_at = expires_at;
                renewed.owner_name = owner.name.clone();
                renewed.updated_at = now;
                leases.insert(target.clone(), renewed.clone());
                AcquireOutcome::Acquired(renewed)
            }
            Some(lock) => AcquireOutcome::Held(lock.clone()),
            None => {
                let lock = ResourceLock {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    resource_type: target.resource_type.clone(),
                    resource_id: target.resource_id.clone(),
                    owner_id: owner.id,
                    owner_name: owner.name.clone(),
                    acquired_at: now,
                    expires_at,
                    released_at: None,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                };
                leases.insert(target.clone(), lock.clone());
                AcquireOutcome::Acquired(lock)
            }
        };
        Ok(outcome)
    }

    async fn heartbeat(
        &self,
        target: &LockTarget,
        owner_id: DbId,
        ttl_secs: i64,
    ) -> Result<Option<ResourceLock>, StoreError> {
        let now = self.clock.now();
        let mut leases = self.leases.write().await;
        let Some(lock) = leases.get_mut(target) else {
            return Ok(None);
        };
        if lock.is_expired_at(now) || lock.owner_id != owner_id {
            return Ok(None);
        }
        lock.expires_at = now + chrono::Duration::seconds(ttl_secs);
        lock.updated_at = now;
        Ok(Some(lock.clone()))
    }

    async fn release(&self, target: &LockTarget, owner_id: DbId) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut leases = self.leases.write().await;
        let held = Self::live(&leases, target, now).is_some_and(|lock| lock.owner_id == owner_id);
        if held {
            leases.remove(target);
        }
        Ok(held)
    }

    async fn force_release(&self, target: &LockTarget) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut leases = self.leases.write().await;
        let live = Self::live(&leases, target, now).is_some();
        leases.remove(target);
        Ok(live)
    }

    async fn get_active(&self, target: &LockTarget) -> Result<Option<ResourceLock>, StoreError> {
        let now = self.clock.now();
        let leases = self.leases.read().await;
        Ok(Self::live(&leases, target, now).cloned())
    }

    async fn get_active_many(
        &self,
        targets: &[LockTarget],
    ) -> Result<Vec<ResourceLock>, StoreError> {
        let now = self.clock.now();
        let leases = self.leases.read().await;
        Ok(targets
            .iter()
            .filter_map(|target| Self::live(&leases, target, now).cloned())
            .collect())
    }

    async fn list_active(&self) -> Result<Vec<ResourceLock>, StoreError> {
        let now = self.clock.now();
        let leases = self.leases.read().await;
        let mut active: Vec<_> = leases
            .values()
            .filter(|lock| !lock.is_expired_at(now))
            .cloned()
            .collect();
        active.sort_by_key(|lock| lock.expires_at);
        Ok(active)
    }

    async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let now = self.clock.now();
        let mut leases = self.leases.write().await;
        let before = leases.len();
        leases.retain(|_, lock| !lock.is_expired_at(now));
        Ok((before - leases.len()) as u64)
    }
}
