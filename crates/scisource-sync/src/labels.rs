//! Resolution of schema labels to server identifiers.
//!
//! Property and item ids differ between ScienceSource instances, so every
//! label in the static schema table is looked up once at startup. The
//! resulting map is immutable and shared read-only by every article pipeline.

use scisource_core::{ClaimValue, ItemClass, ItemId, Property};
use thiserror::Error;
use tracing::{debug, info};

use crate::kb::{Claim, KbError, KnowledgeBase};

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("no {kind} ID was found for {label:?}")]
    NotFound { kind: &'static str, label: &'static str },
    #[error("multiple {kind} IDs found for {label:?}: {ids:?}")]
    Ambiguous {
        kind: &'static str,
        label: &'static str,
        ids: Vec<String>,
    },
    #[error("looking up {label:?}: {source}")]
    Lookup {
        label: &'static str,
        #[source]
        source: KbError,
    },
}

/// Every schema label resolved to exactly one server id.
#[derive(Debug, Clone)]
pub struct LabelMap {
    /// Indexed by `Property as usize`, in [`Property::ALL`] order.
    properties: Vec<String>,
    /// Indexed by `ItemClass as usize`, in [`ItemClass::ALL`] order.
    items: Vec<ItemId>,
}

impl LabelMap {
    /// Look up every property and item class label, one at a time.
    pub async fn resolve(kb: &dyn KnowledgeBase) -> Result<Self, LabelError> {
        let mut properties = Vec::with_capacity(Property::ALL.len());
        for property in Property::ALL {
            let label = property.label();
            let ids = kb
                .search_properties(label)
                .await
                .map_err(|source| LabelError::Lookup { label, source })?;
            let id = exactly_one("property", label, ids)?;
            debug!(label, id = %id, "resolved property");
            properties.push(id);
        }

        let mut items = Vec::with_capacity(ItemClass::ALL.len());
        for class in ItemClass::ALL {
            let label = class.label();
            let ids = kb
                .search_items(label)
                .await
                .map_err(|source| LabelError::Lookup { label, source })?;
            let id = exactly_one("item", label, ids)?;
            debug!(label, id = %id, "resolved item");
            items.push(id);
        }

        info!(
            properties = properties.len(),
            items = items.len(),
            "resolved schema labels"
        );
        Ok(Self { properties, items })
    }

    pub fn property(&self, property: Property) -> &str {
        &self.properties[property as usize]
    }

    pub fn class(&self, class: ItemClass) -> &ItemId {
        &self.items[class as usize]
    }

    pub fn terminus(&self) -> &ItemId {
        self.class(ItemClass::Terminus)
    }

    /// Attach resolved property ids to a record's claims.
    pub fn claims(&self, claims: Vec<(Property, ClaimValue)>) -> Vec<Claim> {
        claims
            .into_iter()
            .map(|(property, value)| Claim {
                property: self.property(property).to_string(),
                value,
            })
            .collect()
    }
}

fn exactly_one<T: ToString>(
    kind: &'static str,
    label: &'static str,
    mut ids: Vec<T>,
) -> Result<T, LabelError> {
    match ids.len() {
        0 => Err(LabelError::NotFound { kind, label }),
        1 => Ok(ids.remove(0)),
        _ => Err(LabelError::Ambiguous {
            kind,
            label,
            ids: ids.iter().map(ToString::to_string).collect(),
        }),
    }
}
