//! Client side of the resource lock service.
//!
//! [`LockSession`] drives the acquire/heartbeat/release lifecycle of one
//! editor's lease. [`BatchLockPoller`] keeps list views informed about which
//! rows are being edited by someone else. Both talk to the server through the
//! [`LockApi`] trait; [`HttpLockApi`] is the reqwest implementation.

pub mod api;
pub mod error;
pub mod poller;
pub mod session;

#[cfg(test)]
mod testing;

pub use api::{HttpLockApi, LockApi, StaticToken, TokenSource};
pub use error::ClientError;
pub use poller::{BatchLockPoller, PollerConfig};
pub use session::{LockSession, SessionConfig, SessionView};
