//! Periodic sweep of expired leases.
//!
//! Reads already ignore expired leases, so the sweep only keeps the store
//! tidy and frees the partial unique index for the next acquire. Clients may
//! also trigger a sweep through `POST /api/locks/cleanup`.

use std::sync::Arc;
use std::time::Duration;

use buksu_db::store::LockStore;
use tokio_util::sync::CancellationToken;

/// Run the lease sweep loop until `cancel` is triggered.
pub async fn run(store: Arc<dyn LockStore>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(
        interval_secs = interval.as_secs(),
        backend = store.backend(),
        "Lock sweeper started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Lock sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                match store.cleanup_expired().await {
                    Ok(0) => tracing::debug!("Lock sweep: nothing expired"),
                    Ok(swept) => tracing::info!(swept, "Lock sweep: released expired leases"),
                    Err(e) => tracing::error!(error = %e, "Lock sweep failed"),
                }
            }
        }
    }
}
