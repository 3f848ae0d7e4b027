/**
 * Engine configuration.
 *  Where the database lives and how loud to log.
 */
pub mod config;
/**
 * Storage layer implementation.
 *  Sqlite-backed rows for collections, documents, and
 *  memberships, plus the typed column wrappers.
 */
pub mod database;
/**
 * The transactional operations: document lifecycle,
 *  tree maintenance, and grant management, all under
 *  the per-collection lock discipline.
 */
pub mod lifecycle;
/**
 * Per-collection exclusive locks serializing every
 *  structural mutation.
 */
pub mod locks;
/**
 * Reconciliation of derived (sourced) membership rows
 *  against their roots and the current document tree.
 */
pub mod propagation;

pub mod prelude {
    pub use crate::config::Config;
    pub use crate::database::models::{Collection, Document, Membership};
    pub use crate::database::{Database, DatabaseSetupError};
    pub use crate::lifecycle::{Engine, EngineError, EngineSetupError};
    pub use crate::locks::CollectionLocks;
}
