//! In-process [`LockApi`] for unit tests.
//!
//! Backed by a real [`MemoryLockStore`] whose clock follows tokio time, so
//! `start_paused` tests see leases expire and renew exactly as the server
//! would. Siblings share the store but act as different users.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use buksu_core::clock::Clock;
use buksu_core::locks::{
    validate_batch, CleanupResponse, HeartbeatResponse, LockGrant, LockStatus, LockTarget,
    ReleaseLockResponse, LOCK_TTL_SECS,
};
use buksu_core::types::Timestamp;
use buksu_db::models::resource_lock::LockOwner;
use buksu_db::store::{AcquireOutcome, LockStore, MemoryLockStore, StoreError};
use tokio::time::Instant;

use crate::api::LockApi;
use crate::error::ClientError;

/// Wall-clock anchored at creation, advanced by tokio's (pausable) clock.
struct TokioClock {
    wall: Timestamp,
    start: Instant,
}

impl Clock for TokioClock {
    fn now(&self) -> Timestamp {
        self.wall + chrono::Duration::from_std(self.start.elapsed()).unwrap()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Identity {
    Ana,
    Ben,
}

impl Identity {
    fn owner(self) -> LockOwner {
        match self {
            Identity::Ana => LockOwner {
                id: 1,
                name: "Registrar Ana".to_string(),
            },
            Identity::Ben => LockOwner {
                id: 2,
                name: "Dean Ben".to_string(),
            },
        }
    }
}

pub(crate) struct FakeLockApi {
    store: Arc<MemoryLockStore>,
    owner: LockOwner,
    ttl_secs: i64,
    acquires: Mutex<Vec<LockTarget>>,
    releases: Mutex<Vec<LockTarget>>,
    dispatched: Mutex<Vec<LockTarget>>,
    heartbeats: AtomicUsize,
    batches: AtomicUsize,
    fail_heartbeats: AtomicBool,
    fail_batches: AtomicBool,
}

fn store_error(e: StoreError) -> ClientError {
    ClientError::Api {
        status: 500,
        body: e.to_string(),
    }
}

impl FakeLockApi {
    pub(crate) fn new(identity: Identity) -> Arc<Self> {
        let clock = Arc::new(TokioClock {
            wall: chrono::Utc::now(),
            start: Instant::now(),
        });
        Self::on_store(Arc::new(MemoryLockStore::with_clock(clock)), identity, LOCK_TTL_SECS)
    }

    /// A server configured with a shorter (or longer) lease.
    pub(crate) fn with_ttl(identity: Identity, ttl_secs: i64) -> Arc<Self> {
        let clock = Arc::new(TokioClock {
            wall: chrono::Utc::now(),
            start: Instant::now(),
        });
        Self::on_store(Arc::new(MemoryLockStore::with_clock(clock)), identity, ttl_secs)
    }

    /// Another user talking to the same server.
    pub(crate) fn sibling(&self, identity: Identity) -> Arc<Self> {
        Self::on_store(Arc::clone(&self.store), identity, self.ttl_secs)
    }

    fn on_store(store: Arc<MemoryLockStore>, identity: Identity, ttl_secs: i64) -> Arc<Self> {
        Arc::new(Self {
            store,
            owner: identity.owner(),
            ttl_secs,
            acquires: Mutex::new(Vec::new()),
            releases: Mutex::new(Vec::new()),
            dispatched: Mutex::new(Vec::new()),
            heartbeats: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
            fail_heartbeats: AtomicBool::new(false),
            fail_batches: AtomicBool::new(false),
        })
    }

    /// Take a lease directly, bypassing any session.
    pub(crate) async fn hold(&self, resource_type: &str, resource_id: &str) {
        let target = LockTarget::new(resource_type, resource_id);
        let outcome = self
            .store
            .acquire(&target, &self.owner, self.ttl_secs)
            .await
            .unwrap();
        assert!(matches!(outcome, AcquireOutcome::Acquired(_)));
    }

    pub(crate) fn fail_heartbeats(&self, fail: bool) {
        self.fail_heartbeats.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn acquires(&self) -> Vec<LockTarget> {
        self.acquires.lock().unwrap().clone()
    }

    pub(crate) fn releases(&self) -> Vec<LockTarget> {
        self.releases.lock().unwrap().clone()
    }

    pub(crate) fn dispatched(&self) -> Vec<LockTarget> {
        self.dispatched.lock().unwrap().clone()
    }

    pub(crate) fn heartbeat_count(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }

    pub(crate) fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LockApi for FakeLockApi {
    async fn acquire(&self, target: &LockTarget) -> Result<LockGrant, ClientError> {
        self.acquires.lock().unwrap().push(target.clone());
        match self
            .store
            .acquire(target, &self.owner, self.ttl_secs)
            .await
            .map_err(store_error)?
        {
            AcquireOutcome::Acquired(lock) => Ok(lock.grant()),
            AcquireOutcome::Held(holder) => Err(ClientError::Locked {
                message: format!(
                    "This {} is currently being edited by {}",
                    target.resource_type, holder.owner_name
                ),
                locked_by: holder.owner_name,
                until: holder.expires_at,
            }),
        }
    }

    async fn heartbeat(&self, target: &LockTarget) -> Result<HeartbeatResponse, ClientError> {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
        if self.fail_heartbeats.load(Ordering::SeqCst) {
            return Err(ClientError::Api {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        let lock = self
            .store
            .heartbeat(target, self.owner.id, self.ttl_secs)
            .await
            .map_err(store_error)?
            .ok_or_else(|| ClientError::Api {
                status: 404,
                body: "LOCK_LOST".to_string(),
            })?;
        Ok(HeartbeatResponse {
            message: "Lock renewed".to_string(),
            expires_at: lock.expires_at,
        })
    }

    async fn release(&self, target: &LockTarget) -> Result<ReleaseLockResponse, ClientError> {
        self.releases.lock().unwrap().push(target.clone());
        let released = self
            .store
            .release(target, self.owner.id)
            .await
            .map_err(store_error)?;
        Ok(ReleaseLockResponse {
            message: "Lock released".to_string(),
            released,
        })
    }

    async fn status(&self, target: &LockTarget) -> Result<LockStatus, ClientError> {
        Ok(self
            .store
            .get_active(target)
            .await
            .map_err(store_error)?
            .map(|lock| lock.status_for(self.owner.id))
            .unwrap_or_default())
    }

    async fn check_batch(
        &self,
        resources: &[LockTarget],
    ) -> Result<HashMap<String, LockStatus>, ClientError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(ClientError::Api {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        validate_batch(resources).map_err(|body| ClientError::Api { status: 400, body })?;
        let mut locks: HashMap<String, LockStatus> = resources
            .iter()
            .map(|target| (target.key(), LockStatus::unlocked()))
            .collect();
        for lock in self
            .store
            .get_active_many(resources)
            .await
            .map_err(store_error)?
        {
            locks.insert(lock.target().key(), lock.status_for(self.owner.id));
        }
        Ok(locks)
    }

    async fn cleanup(&self) -> Result<CleanupResponse, ClientError> {
        let cleaned = self.store.cleanup_expired().await.map_err(store_error)?;
        Ok(CleanupResponse {
            message: format!("Cleaned up {cleaned} expired lock(s)"),
            cleaned,
        })
    }

    fn dispatch_release(&self, target: &LockTarget) {
        self.dispatched.lock().unwrap().push(target.clone());
    }
}
