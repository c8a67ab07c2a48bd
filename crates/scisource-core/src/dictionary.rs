//! Term dictionaries and multi-pattern matching over article text.
//!
//! Each dictionary compiles its terms into a single Aho-Corasick automaton at
//! load time, so one linear pass over the text finds every occurrence of every
//! term in that dictionary. Offsets are UTF-8 byte offsets into the text.

use std::collections::HashMap;
use std::path::Path;

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::CoreError;

/// External identifiers attached to a dictionary entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryIdentifiers {
    #[serde(default)]
    pub contentmine: String,
    #[serde(default)]
    pub wikidata: String,
}

/// One matchable term.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub name: String,
    pub term: String,
    #[serde(default)]
    pub identifiers: EntryIdentifiers,
}

/// On-disk shape. Other keys (e.g. the build `log`) are ignored.
#[derive(Deserialize)]
struct RawDictionary {
    id: String,
    #[serde(default)]
    entries: Vec<DictionaryEntry>,
}

/// A loaded dictionary with its compiled matcher.
///
/// Immutable after construction. A term that appears more than once is
/// matched against its first entry only.
#[derive(Debug)]
pub struct Dictionary {
    pub id: String,
    entries: Vec<DictionaryEntry>,
    matcher: Option<AhoCorasick>,
    /// Automaton pattern index → entry index.
    pattern_entries: Vec<usize>,
}

/// A single term hit.
#[derive(Debug, Clone, Copy)]
pub struct DictionaryMatch<'a> {
    /// Byte offset of the first byte of the term.
    pub offset: usize,
    pub entry: &'a DictionaryEntry,
    pub dictionary: &'a Dictionary,
}

impl Dictionary {
    /// Build a dictionary and its matcher from entries.
    pub fn new(id: impl Into<String>, entries: Vec<DictionaryEntry>) -> Result<Self, CoreError> {
        let id = id.into();

        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut patterns = Vec::with_capacity(entries.len());
        let mut pattern_entries = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            if entry.term.is_empty() {
                return Err(CoreError::EmptyTerm {
                    dictionary: id,
                    index,
                });
            }
            if let Some(first) = seen.get(entry.term.as_str()) {
                debug!(dictionary = %id, term = %entry.term, first, index, "duplicate term ignored");
                continue;
            }
            seen.insert(entry.term.as_str(), index);
            patterns.push(entry.term.as_str());
            pattern_entries.push(index);
        }

        let matcher = if patterns.is_empty() {
            None
        } else {
            let built = AhoCorasick::new(&patterns).map_err(|source| CoreError::Matcher {
                dictionary: id.clone(),
                source,
            })?;
            Some(built)
        };

        Ok(Self {
            id,
            entries,
            matcher,
            pattern_entries,
        })
    }

    /// Load a dictionary from a JSON file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let data = std::fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        let raw: RawDictionary =
            serde_json::from_str(&data).map_err(|e| CoreError::json(path, e))?;
        Self::new(raw.id, raw.entries)
    }

    pub fn entries(&self) -> &[DictionaryEntry] {
        &self.entries
    }

    /// Every occurrence of every term, ordered by offset then entry order.
    ///
    /// Overlapping and nested terms are all reported, e.g. both `cell` and
    /// `cell wall` at the same offset.
    pub fn find_matches<'a>(&'a self, text: &str) -> Vec<DictionaryMatch<'a>> {
        let Some(matcher) = &self.matcher else {
            return Vec::new();
        };

        let mut hits: Vec<(usize, usize)> = matcher
            .find_overlapping_iter(text)
            .map(|m| (m.start(), self.pattern_entries[m.pattern().as_usize()]))
            .collect();
        hits.sort_unstable();

        hits.into_iter()
            .map(|(offset, index)| DictionaryMatch {
                offset,
                entry: &self.entries[index],
                dictionary: self,
            })
            .collect()
    }
}

/// Load every `*.json` dictionary in `dir`, in file-name order.
///
/// Any malformed dictionary fails the whole load.
pub fn load_dictionaries(dir: &Path) -> Result<Vec<Dictionary>, CoreError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| CoreError::io(dir, e))? {
        let path = entry.map_err(|e| CoreError::io(dir, e))?.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut dictionaries = Vec::with_capacity(paths.len());
    for path in &paths {
        let dictionary = Dictionary::load(path)?;
        info!(
            dictionary = %dictionary.id,
            entries = dictionary.entries.len(),
            "loaded dictionary"
        );
        dictionaries.push(dictionary);
    }
    Ok(dictionaries)
}

/// Matches from all dictionaries, concatenated in dictionary order.
///
/// Identical terms in different dictionaries produce independent matches.
pub fn find_all_matches<'a>(dictionaries: &'a [Dictionary], text: &str) -> Vec<DictionaryMatch<'a>> {
    dictionaries
        .iter()
        .flat_map(|d| d.find_matches(text))
        .collect()
}
