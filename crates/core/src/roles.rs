//! Well-known role name constants.
//!
//! These must match the `role` claim issued by the grading system's auth
//! service.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_INSTRUCTOR: &str = "instructor";
pub const ROLE_STUDENT: &str = "student";
