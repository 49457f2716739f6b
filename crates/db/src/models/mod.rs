//! Domain model structs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row, plus conversions into the wire types in `buksu_core`.

pub mod resource_lock;
