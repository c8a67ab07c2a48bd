//! Sync layer: label resolution, the graph publication protocol, and the
//! Wikibase HTTP transport.

pub mod kb;
pub mod labels;
pub mod memory;
pub mod publish;

#[cfg(feature = "http")]
pub mod wikibase;

pub use kb::{Claim, KbError, KnowledgeBase};
pub use labels::{LabelError, LabelMap};
pub use memory::MemoryKnowledgeBase;
pub use publish::{PublishError, Publisher};

#[cfg(feature = "http")]
pub use wikibase::WikibaseClient;
