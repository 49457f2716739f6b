//! Authentication primitives.
//!
//! - [`jwt`] -- validation of access tokens issued by the grading system's
//!   auth service, plus token generation for tooling and tests.

pub mod jwt;
