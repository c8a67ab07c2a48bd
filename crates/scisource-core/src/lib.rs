//! Core of the ScienceSource ingest: term dictionaries, the annotation
//! builder, and the article → anchor point → annotation record model.

mod error;
pub use error::CoreError;

pub mod annotate;
pub mod dictionary;
pub mod feed;
pub mod jats;
pub mod record;
pub mod schema;

pub use annotate::{PHRASE_TARGET_SIZE, SearchDirection, build_anchor_points, find_phrase};
pub use dictionary::{Dictionary, DictionaryEntry, DictionaryMatch, find_all_matches, load_dictionaries};
pub use feed::{DataValue, Library, Paper, PaperFeed};
pub use jats::FrontMatter;
pub use record::{AnchorPoint, Annotation, ItemId, PublishPhase, ScienceSourceArticle};
pub use schema::{ClaimValue, ItemClass, Property};
