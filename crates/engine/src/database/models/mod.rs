mod collection;
mod document;
mod membership;

pub use collection::Collection;
pub use document::Document;
pub use membership::Membership;
