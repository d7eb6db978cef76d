//! Roles and role-derived authorization
//!
//! Authorization here is always computed from the current user's role at
//! read time. Nothing in this module stores a permission independently.

pub mod access;
pub mod role;

pub use access::{AccessFlags, AccessRequirement};
pub use role::UserRole;
