//! Access grant types
//!
//! A grant ("membership") attaches a [`Principal`] to a collection or a
//! document at some [`Permission`] level. The types here are the pure
//! vocabulary; how grants cascade down a document subtree lives with the
//! engine that owns the rows.

mod permission;
mod principal;

pub use permission::Permission;
pub use principal::{Principal, PrincipalKind};
