//! Shared domain types for the BUKSU resource-lock service.
//!
//! This crate has zero internal dependencies so that the store backends,
//! the HTTP service and the client library all agree on the same lease
//! durations, wire shapes and validation rules.

pub mod clock;
pub mod error;
pub mod locks;
pub mod roles;
pub mod types;
