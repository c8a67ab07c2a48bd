//! The per-article record tree published to ScienceSource.
//!
//! An article owns its anchor points in offset order; each anchor point owns
//! one annotation. Cross-references between records (neighbouring anchors,
//! the owning article, the terminus) are stored as remote [`ItemId`]s and are
//! only known once every record has been created remotely.
//!
//! The whole tree is checkpointed to a JSON snapshot after every publication
//! phase; a later run resumes from whatever the snapshot says was finished.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::CoreError;
use crate::schema::{ClaimValue, Property};

/// A remote item identifier such as `Q42`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How far publication of a tree has progressed.
///
/// Phases only move forward. A tree is checkpointed after every attempt, so
/// the persisted phase is the last one that completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishPhase {
    /// Built locally, nothing guaranteed to exist remotely.
    #[default]
    Materialized,
    /// Every record has a remote identifier.
    NodesCreated,
    /// Cross-references are filled in.
    Reconciled,
    /// All claims are on the server.
    ClaimsUploaded,
}

/// The term identity of one match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemId>,

    #[serde(rename = "term")]
    pub term_found: String,
    #[serde(rename = "length")]
    pub length_of_term_found: usize,
    #[serde(rename = "wikidata", default)]
    pub wikidata_item_code: String,
    #[serde(rename = "dictionary")]
    pub dictionary_name: String,
    #[serde(rename = "time", default)]
    pub time_code: String,

    /// The owning anchor point.
    #[serde(default)]
    pub based_on: Option<ItemId>,
    #[serde(default)]
    pub instance_of: Option<ItemId>,
}

/// Position and context of one match, linked to its neighbours.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemId>,

    pub preceding_phrase: String,
    pub following_phrase: String,
    /// Absent for the first anchor.
    #[serde(rename = "preceding_distance", default)]
    pub distance_to_preceding: Option<usize>,
    /// Absent for the last anchor.
    #[serde(rename = "following_distance", default)]
    pub distance_to_following: Option<usize>,
    #[serde(rename = "character")]
    pub character_number: usize,
    #[serde(rename = "time", default)]
    pub time_code: String,

    #[serde(default)]
    pub instance_of: Option<ItemId>,
    #[serde(rename = "science_source_title", default)]
    pub article_title: String,
    /// The owning article.
    #[serde(rename = "point", default)]
    pub anchor_point_in: Option<ItemId>,
    #[serde(rename = "preceding_anchor", default)]
    pub preceding_anchor_point: Option<ItemId>,
    #[serde(rename = "following_anchor", default)]
    pub following_anchor_point: Option<ItemId>,
    /// The owned annotation.
    #[serde(default)]
    pub anchors: Option<ItemId>,

    pub annotation: Annotation,
}

/// Root of the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScienceSourceArticle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemId>,

    /// Title of the display page on ScienceSource.
    #[serde(rename = "science_source_title")]
    pub article_title: String,
    #[serde(rename = "wikidata", default)]
    pub wikidata_item_code: String,
    #[serde(rename = "title")]
    pub article_text_title: String,
    #[serde(default)]
    pub publication_date: String,
    #[serde(rename = "time", default)]
    pub time_code: String,

    #[serde(default)]
    pub instance_of: Option<ItemId>,
    #[serde(default)]
    pub page_id: Option<u64>,
    #[serde(rename = "following_anchor", default)]
    pub following_anchor_point: Option<ItemId>,

    #[serde(default)]
    pub phase: PublishPhase,

    /// Offset-ascending; never re-sorted once built.
    #[serde(rename = "annotations", default)]
    pub anchor_points: Vec<AnchorPoint>,
}

impl Annotation {
    pub fn claims(&self) -> Vec<(Property, ClaimValue)> {
        let mut claims = Vec::with_capacity(7);
        push_string(&mut claims, Property::TermFound, &self.term_found);
        claims.push((
            Property::LengthOfTermFound,
            ClaimValue::quantity(self.length_of_term_found),
        ));
        push_string(&mut claims, Property::WikidataItemCode, &self.wikidata_item_code);
        push_string(&mut claims, Property::DictionaryName, &self.dictionary_name);
        push_string(&mut claims, Property::TimeCode, &self.time_code);
        push_item(&mut claims, Property::BasedOn, &self.based_on);
        push_item(&mut claims, Property::InstanceOf, &self.instance_of);
        claims
    }
}

impl AnchorPoint {
    pub fn claims(&self) -> Vec<(Property, ClaimValue)> {
        let mut claims = Vec::with_capacity(12);
        push_string(&mut claims, Property::PrecedingPhrase, &self.preceding_phrase);
        push_string(&mut claims, Property::FollowingPhrase, &self.following_phrase);
        if let Some(d) = self.distance_to_preceding {
            claims.push((Property::DistanceToPreceding, ClaimValue::quantity(d)));
        }
        if let Some(d) = self.distance_to_following {
            claims.push((Property::DistanceToFollowing, ClaimValue::quantity(d)));
        }
        claims.push((
            Property::CharacterNumber,
            ClaimValue::quantity(self.character_number),
        ));
        push_string(&mut claims, Property::TimeCode, &self.time_code);
        push_item(&mut claims, Property::InstanceOf, &self.instance_of);
        push_string(&mut claims, Property::ArticleTitle, &self.article_title);
        push_item(&mut claims, Property::AnchorPointIn, &self.anchor_point_in);
        push_item(&mut claims, Property::PrecedingAnchorPoint, &self.preceding_anchor_point);
        push_item(&mut claims, Property::FollowingAnchorPoint, &self.following_anchor_point);
        push_item(&mut claims, Property::Anchors, &self.anchors);
        claims
    }
}

impl ScienceSourceArticle {
    pub fn claims(&self) -> Vec<(Property, ClaimValue)> {
        let mut claims = Vec::with_capacity(8);
        push_string(&mut claims, Property::ArticleTitle, &self.article_title);
        push_string(&mut claims, Property::WikidataItemCode, &self.wikidata_item_code);
        push_string(&mut claims, Property::ArticleTextTitle, &self.article_text_title);
        push_string(&mut claims, Property::PublicationDate, &self.publication_date);
        push_string(&mut claims, Property::TimeCode, &self.time_code);
        push_item(&mut claims, Property::InstanceOf, &self.instance_of);
        if let Some(page_id) = self.page_id {
            claims.push((
                Property::PageId,
                ClaimValue::Quantity(i64::try_from(page_id).unwrap_or(i64::MAX)),
            ));
        }
        push_item(&mut claims, Property::FollowingAnchorPoint, &self.following_anchor_point);
        claims
    }

    /// Number of records in the tree still lacking a remote identifier.
    pub fn unidentified_count(&self) -> usize {
        let anchors = self
            .anchor_points
            .iter()
            .map(|a| usize::from(a.item.is_none()) + usize::from(a.annotation.item.is_none()))
            .sum::<usize>();
        usize::from(self.item.is_none()) + anchors
    }

    /// Total number of records in the tree.
    pub fn record_count(&self) -> usize {
        1 + 2 * self.anchor_points.len()
    }

    /// Write the snapshot atomically: a sibling temp file renamed into place.
    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| CoreError::json(path, e))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| CoreError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| CoreError::io(path, e))
    }

    /// Load a snapshot. `Ok(None)` when none has been written yet.
    pub fn load(path: &Path) -> Result<Option<Self>, CoreError> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CoreError::io(path, e)),
        };
        let article = serde_json::from_slice(&data).map_err(|e| CoreError::json(path, e))?;
        Ok(Some(article))
    }
}

fn push_string(claims: &mut Vec<(Property, ClaimValue)>, property: Property, value: &str) {
    if !value.is_empty() {
        claims.push((property, ClaimValue::String(value.to_string())));
    }
}

fn push_item(claims: &mut Vec<(Property, ClaimValue)>, property: Property, value: &Option<ItemId>) {
    if let Some(id) = value {
        claims.push((property, ClaimValue::Item(id.clone())));
    }
}
