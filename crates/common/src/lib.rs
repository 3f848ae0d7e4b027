/**
 * Access grant types.
 *  - Permission levels and their ordering
 *  - Principals (users and groups) that grants attach to
 */
pub mod grant;
/**
 * Common types that describe a collection's navigation
 *  structure and the operations on it.
 * Represents the ordering of published documents within
 *  a collection at a given moment.
 */
pub mod structure;

pub mod prelude {
    pub use crate::grant::{Permission, Principal, PrincipalKind};
    pub use crate::structure::{DocumentStructure, NavigationNode, RemovedNode, Sort};
}
