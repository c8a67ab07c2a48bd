//! Static table of the ScienceSource data schema.
//!
//! Every property a record uploads, and every item class a record is an
//! instance of, is enumerated here with the label it carries on the server.
//! The label set resolved at startup is exactly [`Property::ALL`] plus
//! [`ItemClass::ALL`].
//!
//! Schema reference: <https://sciencesource.wmflabs.org/wiki/Data_schema>

use crate::record::ItemId;

/// A property that records assert claims for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Property {
    TermFound,
    LengthOfTermFound,
    WikidataItemCode,
    DictionaryName,
    TimeCode,
    BasedOn,
    InstanceOf,
    PrecedingPhrase,
    FollowingPhrase,
    DistanceToPreceding,
    DistanceToFollowing,
    CharacterNumber,
    ArticleTitle,
    AnchorPointIn,
    PrecedingAnchorPoint,
    FollowingAnchorPoint,
    Anchors,
    ArticleTextTitle,
    PublicationDate,
    PageId,
}

impl Property {
    pub const ALL: [Property; 20] = [
        Property::TermFound,
        Property::LengthOfTermFound,
        Property::WikidataItemCode,
        Property::DictionaryName,
        Property::TimeCode,
        Property::BasedOn,
        Property::InstanceOf,
        Property::PrecedingPhrase,
        Property::FollowingPhrase,
        Property::DistanceToPreceding,
        Property::DistanceToFollowing,
        Property::CharacterNumber,
        Property::ArticleTitle,
        Property::AnchorPointIn,
        Property::PrecedingAnchorPoint,
        Property::FollowingAnchorPoint,
        Property::Anchors,
        Property::ArticleTextTitle,
        Property::PublicationDate,
        Property::PageId,
    ];

    /// Server-side label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TermFound => "term found",
            Self::LengthOfTermFound => "length of term found",
            Self::WikidataItemCode => "Wikidata item code",
            Self::DictionaryName => "dictionary name",
            Self::TimeCode => "time code1",
            Self::BasedOn => "based on",
            Self::InstanceOf => "instance of",
            Self::PrecedingPhrase => "preceding phrase",
            Self::FollowingPhrase => "following phrase",
            Self::DistanceToPreceding => "distance to preceding",
            Self::DistanceToFollowing => "distance to following",
            Self::CharacterNumber => "character number",
            Self::ArticleTitle => "ScienceSource article title",
            Self::AnchorPointIn => "anchor point in",
            Self::PrecedingAnchorPoint => "preceding anchor point",
            Self::FollowingAnchorPoint => "following anchor point",
            Self::Anchors => "anchors",
            Self::ArticleTextTitle => "article text title",
            Self::PublicationDate => "publication date",
            Self::PageId => "page ID",
        }
    }
}

/// Item classes records are instances of, plus the chain sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ItemClass {
    Article,
    AnchorPoint,
    Annotation,
    /// Stands in for "no neighbour" at both ends of the anchor chain.
    Terminus,
}

impl ItemClass {
    pub const ALL: [ItemClass; 4] = [
        ItemClass::Article,
        ItemClass::AnchorPoint,
        ItemClass::Annotation,
        ItemClass::Terminus,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Article => "article",
            Self::AnchorPoint => "anchor point",
            Self::Annotation => "annotation",
            Self::Terminus => "terminus",
        }
    }

    /// Label given to each newly created instance of this class.
    pub fn instance_label(&self) -> &'static str {
        match self {
            Self::Article => "article instance",
            Self::AnchorPoint => "anchor instance",
            Self::Annotation => "annotation instance",
            Self::Terminus => "terminus",
        }
    }
}

/// The value side of a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimValue {
    String(String),
    Quantity(i64),
    Item(ItemId),
}

impl ClaimValue {
    pub(crate) fn quantity(n: usize) -> Self {
        Self::Quantity(i64::try_from(n).unwrap_or(i64::MAX))
    }
}
