//! Batch lock status for list views.
//!
//! A [`BatchLockPoller`] watches one resource type and a list of ids, asks
//! the server for all of their statuses in one request, and repeats on a
//! fixed period. It never takes a lease itself. Rows the caller holds are
//! not reported as locked so the caller's own edit buttons stay enabled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use buksu_core::locks::{
    lock_key, LockStatus, LockTarget, BATCH_POLL_INTERVAL_SECS, MAX_BATCH_RESOURCES,
    REFRESH_FOLLOWUP_SECS,
};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::LockApi;

/// Tunables for a [`BatchLockPoller`].
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    /// Delay of the second poll in [`BatchLockPoller::refresh_after_action`].
    pub refresh_followup: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(BATCH_POLL_INTERVAL_SECS),
            refresh_followup: Duration::from_secs(REFRESH_FOLLOWUP_SECS),
        }
    }
}

#[derive(Default)]
struct PollState {
    resource_type: Option<String>,
    ids: Vec<String>,
    timer: Option<CancellationToken>,
    /// Bumped whenever the watched set changes; late responses for an older
    /// set are discarded.
    generation: u64,
}

struct Inner {
    api: Arc<dyn LockApi>,
    config: PollerConfig,
    state: Mutex<PollState>,
    locks: watch::Sender<HashMap<String, LockStatus>>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Batched status requests for the watched set, split to the server's
    /// per-request cap. All chunks must succeed for the map to be replaced.
    async fn poll(&self) {
        let (generation, targets) = {
            let state = self.state();
            let Some(resource_type) = state.resource_type.as_deref() else {
                return;
            };
            let targets: Vec<LockTarget> = state
                .ids
                .iter()
                .map(|id| LockTarget::new(resource_type, id.as_str()))
                .collect();
            (state.generation, targets)
        };
        if targets.is_empty() {
            return;
        }

        let mut locks = HashMap::with_capacity(targets.len());
        for chunk in targets.chunks(MAX_BATCH_RESOURCES) {
            match self.api.check_batch(chunk).await {
                Ok(statuses) => locks.extend(statuses),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        resources = targets.len(),
                        "Batch lock check failed, keeping previous statuses"
                    );
                    return;
                }
            }
        }

        if self.state().generation == generation {
            self.locks.send_replace(locks);
        }
    }
}

/// Periodic lock status for a set of resources of one type.
pub struct BatchLockPoller {
    inner: Arc<Inner>,
}

impl BatchLockPoller {
    pub fn new(api: Arc<dyn LockApi>) -> Self {
        Self::with_config(api, PollerConfig::default())
    }

    pub fn with_config(api: Arc<dyn LockApi>, config: PollerConfig) -> Self {
        let (locks, _) = watch::channel(HashMap::new());
        Self {
            inner: Arc::new(Inner {
                api,
                config,
                state: Mutex::new(PollState::default()),
                locks,
            }),
        }
    }

    /// Watch a new set of resources.
    ///
    /// Polls once right away and then every `poll_interval`. With no type or
    /// no ids the map is cleared and polling stops. Passing the set already
    /// being watched is a no-op.
    pub async fn set_resources(&self, resource_type: Option<&str>, ids: Vec<String>) {
        let cancel = {
            let mut state = self.inner.state();
            if state.resource_type.as_deref() == resource_type
                && state.ids == ids
                && (state.timer.is_some() || ids.is_empty())
            {
                return;
            }
            if let Some(timer) = state.timer.take() {
                timer.cancel();
            }
            state.generation += 1;
            state.resource_type = resource_type.map(str::to_owned);
            state.ids = ids;

            if state.resource_type.is_none() || state.ids.is_empty() {
                None
            } else {
                let cancel = CancellationToken::new();
                state.timer = Some(cancel.clone());
                Some(cancel)
            }
        };

        let Some(cancel) = cancel else {
            self.inner.locks.send_replace(HashMap::new());
            return;
        };

        self.inner.poll().await;
        spawn_timer(Arc::downgrade(&self.inner), self.inner.config.poll_interval, cancel);
    }

    /// Poll now.
    pub async fn refresh(&self) {
        self.inner.poll().await;
    }

    /// Poll once more after `delay`, e.g. a few seconds after a lock action
    /// so other users' changes show up promptly.
    pub fn refresh_later(&self, delay: Duration) {
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.poll().await;
            }
        });
    }

    /// Poll now and once more after `refresh_followup`. Call after a lock
    /// action so both the action and other users' reactions show up.
    pub async fn refresh_after_action(&self) {
        self.refresh().await;
        self.refresh_later(self.inner.config.refresh_followup);
    }

    /// Locked by someone other than the caller.
    pub fn is_locked(&self, resource_id: &str) -> bool {
        self.status_of(resource_id)
            .is_some_and(|status| status.held_by_other())
    }

    /// Who holds `resource_id`, when [`is_locked`](Self::is_locked) is true.
    pub fn locked_by(&self, resource_id: &str) -> Option<String> {
        self.status_of(resource_id)
            .filter(LockStatus::held_by_other)
            .and_then(|status| status.by)
    }

    /// The full status map, keyed `"<type>-<id>"`.
    pub fn snapshot(&self) -> HashMap<String, LockStatus> {
        self.inner.locks.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HashMap<String, LockStatus>> {
        self.inner.locks.subscribe()
    }

    fn status_of(&self, resource_id: &str) -> Option<LockStatus> {
        let resource_type = self.inner.state().resource_type.clone()?;
        self.inner
            .locks
            .borrow()
            .get(&lock_key(&resource_type, resource_id))
            .cloned()
    }
}

impl Drop for BatchLockPoller {
    fn drop(&mut self) {
        if let Some(timer) = self.inner.state().timer.take() {
            timer.cancel();
        }
    }
}

fn spawn_timer(inner: Weak<Inner>, period: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.poll().await;
        }
    });
}
