//! Request handlers.
//!
//! Handlers delegate to the configured [`LockStore`] and map errors via
//! [`AppError`].
//!
//! [`LockStore`]: buksu_db::store::LockStore
//! [`AppError`]: crate::error::AppError

pub mod locks;
