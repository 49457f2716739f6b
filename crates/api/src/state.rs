use std::sync::Arc;

use buksu_db::store::LockStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    /// Lease storage backend (PostgreSQL or in-memory).
    pub store: Arc<dyn LockStore>,
    /// Server configuration (lease TTL, JWT secret, ...).
    pub config: Arc<ServerConfig>,
}
