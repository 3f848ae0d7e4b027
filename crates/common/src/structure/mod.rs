//! Navigation structure types and operations
//!
//! This module defines the core types for a collection's document ordering:
//!
//! - **[`NavigationNode`]**: One entry in the tree (document id + cached display fields)
//! - **[`DocumentStructure`]**: The whole per-collection tree with its mutation operations
//! - **[`RemovedNode`]**: A node lifted out of the tree together with its former position
//! - **[`Sort`]**: Read-time ordering configuration for sibling nodes
//!
//! # Architecture
//!
//! ## Collections as trees
//!
//! A collection's navigation structure is a single owned tree of nodes,
//! persisted whole as one JSON value:
//! ```text
//! DocumentStructure
//!     |
//!     +----------------+----------------+
//!     |                |                |
//!   Doc A            Doc B            Doc C
//!     |
//!     +-------+
//!     |       |
//!   Doc D   Doc E
//! ```
//!
//! Sibling order in the stored value is the manual display order. The tree
//! carries only *visible* documents: published, not a template, not archived,
//! not deleted. Drafts and archived subtrees have no node at all.
//!
//! ## Mutation model
//!
//! Operations locate and rebuild the touched part of the tree and leave the
//! rest alone. They never fail on absent ids: an insert under a missing
//! parent is a no-op, a remove of a missing id returns `None`. Callers that
//! need hard errors layer them on top. Sorting happens at read time only
//! ([`DocumentStructure::node`]) and never reorders the stored value.

mod node;
mod sort;
mod tree;

pub use node::NavigationNode;
pub use sort::{Sort, SortDirection, SortField};
pub use tree::{DocumentStructure, RemovedNode};
