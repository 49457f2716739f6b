//! Single-resource lock session.
//!
//! A [`LockSession`] belongs to one editor screen. It remembers a default
//! target given at construction and the "current" target of the last call,
//! holds at most one lease, and renews that lease on a heartbeat timer until
//! it is released, lost, unloaded or dropped.
//!
//! ```text
//! UNLOCKED      -> acquire ok        -> HELD_BY_ME (heartbeat running)
//! UNLOCKED      -> acquire conflict  -> HELD_BY_OTHER
//! HELD_BY_ME    -> release | heartbeat failure | unload | drop -> UNLOCKED
//! HELD_BY_ME    -> acquire other target -> release, then as UNLOCKED
//! HELD_BY_OTHER -> status shows free -> UNLOCKED
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use buksu_core::locks::{
    heartbeat_interval_for, validate_target, LockGrant, LockStatus, LockTarget,
    HEARTBEAT_INTERVAL_SECS,
};
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::LockApi;
use crate::error::ClientError;

/// Tunables for a [`LockSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on the period between lease renewals. A grant with a
    /// shorter lease renews at 80% of that lease instead.
    pub heartbeat_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
        }
    }
}

/// What the UI renders: the lock status plus the last user-facing error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub status: LockStatus,
    pub error: Option<String>,
}

#[derive(Default)]
struct SessionState {
    current_type: Option<String>,
    current_id: Option<String>,
    held: Option<LockTarget>,
    heartbeat: Option<CancellationToken>,
    /// Bumped on every grant so a stale heartbeat task cannot clear a newer lease.
    epoch: u64,
}

struct Inner {
    api: Arc<dyn LockApi>,
    config: SessionConfig,
    default_type: Option<String>,
    default_id: Option<String>,
    state: Mutex<SessionState>,
    view: watch::Sender<SessionView>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, status: LockStatus, error: Option<String>) {
        self.view.send_replace(SessionView { status, error });
    }

    /// Called by the heartbeat task when a renewal fails.
    fn lose_lease(&self, epoch: u64, target: &LockTarget) {
        let mut state = self.state();
        if state.epoch != epoch || state.held.is_none() {
            return;
        }
        state.held = None;
        state.heartbeat = None;
        drop(state);

        self.publish(
            LockStatus::unlocked(),
            Some(format!("Your edit lock on this {} was lost", target.resource_type)),
        );
    }
}

/// Never renew more often than this, however short the lease.
const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Acquire/heartbeat/release state machine for one editor.
pub struct LockSession {
    inner: Arc<Inner>,
}

impl LockSession {
    /// Create a session with an optional default target.
    pub fn new(
        api: Arc<dyn LockApi>,
        resource_type: Option<String>,
        resource_id: Option<String>,
    ) -> Self {
        Self::with_config(api, resource_type, resource_id, SessionConfig::default())
    }

    pub fn with_config(
        api: Arc<dyn LockApi>,
        resource_type: Option<String>,
        resource_id: Option<String>,
        config: SessionConfig,
    ) -> Self {
        let (view, _) = watch::channel(SessionView::default());
        Self {
            inner: Arc::new(Inner {
                api,
                config,
                default_type: resource_type,
                default_id: resource_id,
                state: Mutex::new(SessionState::default()),
                view,
            }),
        }
    }

    // ---------------------------------------------------------------------
    // Operations
    // ---------------------------------------------------------------------

    /// Try to take the lease on the resolved target.
    ///
    /// Returns `false` when the target cannot be resolved, when another user
    /// holds it (the view then shows who), or when the request fails.
    ///
    /// A lease held on a different target is released first, so the session
    /// never holds two leases and a failed switch leaves it holding none.
    pub async fn acquire_lock(
        &self,
        resource_id: Option<&str>,
        resource_type: Option<&str>,
    ) -> bool {
        let target = match self.resolve(resource_id, resource_type) {
            Ok(target) => target,
            Err(e) => {
                self.inner.publish(self.status(), Some(e.to_string()));
                return false;
            }
        };

        self.release_other_than(&target).await;

        match self.inner.api.acquire(&target).await {
            Ok(grant) => {
                let period = heartbeat_period(&grant, self.inner.config.heartbeat_interval);
                let cancel = CancellationToken::new();
                let epoch = {
                    let mut state = self.inner.state();
                    if let Some(previous) = state.heartbeat.take() {
                        previous.cancel();
                    }
                    state.held = Some(target.clone());
                    state.heartbeat = Some(cancel.clone());
                    state.epoch += 1;
                    state.epoch
                };
                spawn_heartbeat(&self.inner, target.clone(), epoch, period, cancel);

                tracing::debug!(
                    %target,
                    expires_at = %grant.expires_at,
                    heartbeat_secs = period.as_secs(),
                    "Lock acquired"
                );
                self.inner.publish(
                    LockStatus {
                        locked: true,
                        by: Some(grant.owner_name),
                        until: Some(grant.expires_at),
                        is_you: true,
                    },
                    None,
                );
                true
            }
            Err(ClientError::Locked {
                message,
                locked_by,
                until,
            }) => {
                tracing::debug!(%target, %locked_by, "Lock held by another user");
                self.inner.publish(
                    LockStatus {
                        locked: true,
                        by: Some(locked_by),
                        until: Some(until),
                        is_you: false,
                    },
                    Some(message),
                );
                false
            }
            Err(e) => {
                tracing::warn!(%target, error = %e, "Failed to acquire lock");
                self.inner
                    .publish(self.status(), Some("Failed to acquire lock".to_string()));
                false
            }
        }
    }

    /// Give up the lease. Always returns `true` once local state is clear.
    ///
    /// Without a held lease this makes no request. Otherwise the heartbeat
    /// stops first, then the release is sent and any error is ignored.
    pub async fn release_lock(
        &self,
        resource_id: Option<&str>,
        resource_type: Option<&str>,
    ) -> bool {
        let resolved = self.resolve(resource_id, resource_type).ok();

        let (held, heartbeat) = {
            let mut state = self.inner.state();
            (state.held.take(), state.heartbeat.take())
        };
        if let Some(heartbeat) = heartbeat {
            heartbeat.cancel();
        }

        if let Some(held) = held {
            let target = resolved.unwrap_or(held);
            match self.inner.api.release(&target).await {
                Ok(response) => {
                    tracing::debug!(%target, released = response.released, "Lock released");
                }
                Err(e) => {
                    tracing::debug!(%target, error = %e, "Lock release failed, lease will expire");
                }
            }
        }

        self.inner.publish(LockStatus::unlocked(), None);
        true
    }

    /// Refresh the view from the server without changing ownership.
    pub async fn check_lock_status(&self, resource_id: Option<&str>, resource_type: Option<&str>) {
        let Ok(target) = self.resolve(resource_id, resource_type) else {
            return;
        };

        match self.inner.api.status(&target).await {
            Ok(status) => {
                let error = self.last_error();
                self.inner.publish(status, error);
            }
            Err(e) => {
                tracing::debug!(%target, error = %e, "Lock status check failed");
            }
        }
    }

    /// Release for page unload: one detached request, no waiting.
    pub fn on_unload(&self) {
        if self.abandon() {
            self.inner.publish(LockStatus::unlocked(), None);
        }
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn status(&self) -> LockStatus {
        self.inner.view.borrow().status.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.view.borrow().error.clone()
    }

    /// Someone else holds the resource.
    pub fn is_locked(&self) -> bool {
        self.inner.view.borrow().status.held_by_other()
    }

    /// This session holds the resource.
    pub fn has_lock(&self) -> bool {
        self.inner.view.borrow().status.held_by_me()
    }

    /// The target the next argument-less call will use.
    pub fn current_target(&self) -> Option<LockTarget> {
        self.resolve(None, None).ok()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.inner.view.subscribe()
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    /// Explicit argument, else the remembered current target, else the
    /// default. The result is remembered as the current target.
    fn resolve(
        &self,
        resource_id: Option<&str>,
        resource_type: Option<&str>,
    ) -> Result<LockTarget, ClientError> {
        let mut state = self.inner.state();

        let resource_type = resource_type
            .map(str::to_owned)
            .or_else(|| state.current_type.clone())
            .or_else(|| self.inner.default_type.clone());
        let resource_id = resource_id
            .map(str::to_owned)
            .or_else(|| state.current_id.clone())
            .or_else(|| self.inner.default_id.clone());

        let (Some(resource_type), Some(resource_id)) = (resource_type, resource_id) else {
            return Err(ClientError::InvalidTarget(
                "No resource selected to lock".to_string(),
            ));
        };
        let target = LockTarget::new(resource_type, resource_id);
        validate_target(&target).map_err(ClientError::InvalidTarget)?;

        state.current_type = Some(target.resource_type.clone());
        state.current_id = Some(target.resource_id.clone());
        Ok(target)
    }

    /// Stop renewing and release a lease held on anything but `target`.
    async fn release_other_than(&self, target: &LockTarget) {
        let (previous, heartbeat) = {
            let mut state = self.inner.state();
            match state.held.take() {
                Some(held) if held != *target => (held, state.heartbeat.take()),
                held => {
                    state.held = held;
                    return;
                }
            }
        };
        if let Some(heartbeat) = heartbeat {
            heartbeat.cancel();
        }

        match self.inner.api.release(&previous).await {
            Ok(response) => {
                tracing::debug!(
                    previous = %previous,
                    released = response.released,
                    "Switched away from lock"
                );
            }
            Err(e) => {
                tracing::debug!(
                    previous = %previous,
                    error = %e,
                    "Lock release failed, lease will expire"
                );
            }
        }
        self.inner.publish(LockStatus::unlocked(), None);
    }

    /// Stop the heartbeat and dispatch a detached release if a lease is held.
    fn abandon(&self) -> bool {
        let (held, heartbeat) = {
            let mut state = self.inner.state();
            (state.held.take(), state.heartbeat.take())
        };
        if let Some(heartbeat) = heartbeat {
            heartbeat.cancel();
        }
        match held {
            Some(target) => {
                self.inner.api.dispatch_release(&target);
                true
            }
            None => false,
        }
    }
}

impl Drop for LockSession {
    fn drop(&mut self) {
        self.abandon();
    }
}

/// 80% of the lease the server actually granted, capped at `max`.
fn heartbeat_period(grant: &LockGrant, max: Duration) -> Duration {
    let lease = (grant.expires_at - chrono::Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO);
    heartbeat_interval_for(lease).clamp(MIN_HEARTBEAT_INTERVAL, max.max(MIN_HEARTBEAT_INTERVAL))
}

fn spawn_heartbeat(
    inner: &Arc<Inner>,
    target: LockTarget,
    epoch: u64,
    period: Duration,
    cancel: CancellationToken,
) {
    let inner = Arc::clone(inner);

    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = inner.api.heartbeat(&target) => result,
            };

            match result {
                Ok(renewed) => {
                    tracing::trace!(%target, expires_at = %renewed.expires_at, "Lock renewed");
                    inner.view.send_modify(|view| {
                        if view.status.held_by_me() {
                            view.status.until = Some(renewed.expires_at);
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(%target, error = %e, "Heartbeat failed, giving up lock");
                    inner.lose_lease(epoch, &target);
                    break;
                }
            }
        }
    });
}
