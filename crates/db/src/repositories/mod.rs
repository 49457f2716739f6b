//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod resource_lock_repo;

pub use resource_lock_repo::ResourceLockRepo;
