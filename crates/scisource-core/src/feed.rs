//! The paper feed: SPARQL query results listing the articles to ingest.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::CoreError;

/// One SPARQL binding value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataValue {
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub value: String,
    #[serde(rename = "xml:lang", default)]
    pub language: Option<String>,
}

/// One article in the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    #[serde(default)]
    pub date: DataValue,
    #[serde(default)]
    pub item: DataValue,
    #[serde(rename = "itemLabel", default)]
    pub item_label: DataValue,
    #[serde(rename = "journalLabel", default)]
    pub journal_label: DataValue,
    #[serde(rename = "licenseLabel", default)]
    pub license_label: DataValue,
    #[serde(rename = "mainsubjectLabel", default)]
    pub main_subject_label: DataValue,
    #[serde(default)]
    pub pmcid: DataValue,
    #[serde(default)]
    pub title: DataValue,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub vars: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Results {
    #[serde(rename = "bindings", default)]
    pub papers: Vec<Paper>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaperFeed {
    #[serde(rename = "head", default)]
    pub header: Header,
    pub results: Results,
}

/// The feed with duplicate papers removed.
#[derive(Debug, Clone, Default)]
pub struct Library {
    /// Unique papers, in feed order (first occurrence wins).
    pub papers: Vec<Paper>,
    /// Identifiers of the discarded later occurrences.
    pub duplicates: Vec<String>,
    /// Bindings dropped for having no PMC identifier.
    pub missing_id: usize,
}

impl Paper {
    /// The PubMed Central identifier, without the `PMC` prefix.
    pub fn id(&self) -> &str {
        self.pmcid.value.trim().trim_start_matches("PMC")
    }

    /// Wikidata Q-code, taken from the last segment of the item URI.
    pub fn wikidata_id(&self) -> &str {
        self.item
            .value
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

impl PaperFeed {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let data = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        serde_json::from_str(&data).map_err(|e| CoreError::json(path, e))
    }

    /// Collapse papers sharing an identifier; the SPARQL results can repeat
    /// a paper once per matching subject. Papers without an identifier have
    /// no working folder and are skipped.
    pub fn library(&self) -> Library {
        let mut seen = HashSet::new();
        let mut library = Library::default();
        for paper in &self.results.papers {
            if paper.id().is_empty() {
                warn!(item = %paper.item.value, "skipping a paper with no PMC id");
                library.missing_id += 1;
            } else if seen.insert(paper.id().to_string()) {
                library.papers.push(paper.clone());
            } else {
                warn!(paper = %paper.id(), "found a duplicate paper in the feed");
                library.duplicates.push(paper.id().to_string());
            }
        }
        library
    }
}
