//! The knowledge-base seam consumed by the publisher.

use async_trait::async_trait;
use scisource_core::{ClaimValue, ItemId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KbError {
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[cfg(feature = "http")]
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("API error {code}: {info}")]
    Api { code: String, info: String },
    #[error("page already exists: {title}")]
    PageExists { title: String },
    #[error("unexpected response: {0}")]
    Unexpected(String),
}

/// A claim with its property already resolved to a server property id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub property: String,
    pub value: ClaimValue,
}

/// Operations the publisher needs from the remote store.
///
/// Every call is an independent network request; the store offers no
/// transactions.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Property ids whose label matches `label`.
    async fn search_properties(&self, label: &str) -> Result<Vec<String>, KbError>;

    /// Item ids whose label matches `label`.
    async fn search_items(&self, label: &str) -> Result<Vec<ItemId>, KbError>;

    /// Create a new item labelled `label` and return its id.
    async fn create_item(&self, label: &str) -> Result<ItemId, KbError>;

    /// Create a wiki page. Fails with [`KbError::PageExists`] if the title
    /// is taken.
    async fn create_page(&self, title: &str, content: &str) -> Result<u64, KbError>;

    /// Id of an existing page, if any.
    async fn page_id(&self, title: &str) -> Result<Option<u64>, KbError>;

    /// Set claims on an item, replacing any existing claim for the same
    /// property.
    async fn upload_claims(&self, item: &ItemId, claims: &[Claim]) -> Result<(), KbError>;
}
