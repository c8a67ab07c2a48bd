//! In-process knowledge base.
//!
//! Backs `--dry-run` and the publisher tests. Counts every remote call so
//! idempotence can be observed, and can be told to fail creations or uploads.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use scisource_core::{ClaimValue, ItemClass, ItemId, Property};
use tracing::debug;

use crate::kb::{Claim, KbError, KnowledgeBase};

#[derive(Default)]
struct State {
    properties: HashMap<String, Vec<String>>,
    items: HashMap<String, Vec<ItemId>>,
    pages: HashMap<String, u64>,
    claims: HashMap<ItemId, BTreeMap<String, ClaimValue>>,
    created: Vec<(ItemId, String)>,
    next_item: u64,
    next_page: u64,
    create_calls: usize,
    upload_calls: usize,
    page_calls: usize,
    /// Creations allowed before `create_item` starts failing.
    create_budget: Option<usize>,
    fail_uploads: bool,
}

pub struct MemoryKnowledgeBase {
    state: Mutex<State>,
}

impl Default for MemoryKnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKnowledgeBase {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_item: 1000,
                next_page: 1,
                ..Default::default()
            }),
        }
    }

    /// A store that already knows every property and item class label.
    pub fn with_schema() -> Self {
        let kb = Self::new();
        for (i, property) in Property::ALL.iter().enumerate() {
            kb.add_property(property.label(), format!("P{}", i + 1));
        }
        for (i, class) in ItemClass::ALL.iter().enumerate() {
            kb.add_item(class.label(), ItemId::new(format!("Q{}", i + 1)));
        }
        kb
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_property(&self, label: &str, id: impl Into<String>) {
        self.lock()
            .properties
            .entry(label.to_string())
            .or_default()
            .push(id.into());
    }

    pub fn add_item(&self, label: &str, id: ItemId) {
        self.lock()
            .items
            .entry(label.to_string())
            .or_default()
            .push(id);
    }

    pub fn add_page(&self, title: &str, id: u64) {
        self.lock().pages.insert(title.to_string(), id);
    }

    /// Let `n` more creations succeed, then fail every later one.
    pub fn fail_creates_after(&self, n: usize) {
        self.lock().create_budget = Some(n);
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.lock().fail_uploads = fail;
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.create_budget = None;
        state.fail_uploads = false;
    }

    pub fn create_calls(&self) -> usize {
        self.lock().create_calls
    }

    pub fn upload_calls(&self) -> usize {
        self.lock().upload_calls
    }

    pub fn page_calls(&self) -> usize {
        self.lock().page_calls
    }

    /// Labels of created items, in creation order.
    pub fn created_labels(&self) -> Vec<String> {
        self.lock().created.iter().map(|(_, l)| l.clone()).collect()
    }

    /// Current claims on an item, ordered by property id.
    pub fn claims_for(&self, item: &ItemId) -> Vec<Claim> {
        self.lock()
            .claims
            .get(item)
            .map(|claims| {
                claims
                    .iter()
                    .map(|(property, value)| Claim {
                        property: property.clone(),
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl KnowledgeBase for MemoryKnowledgeBase {
    async fn search_properties(&self, label: &str) -> Result<Vec<String>, KbError> {
        Ok(self.lock().properties.get(label).cloned().unwrap_or_default())
    }

    async fn search_items(&self, label: &str) -> Result<Vec<ItemId>, KbError> {
        Ok(self.lock().items.get(label).cloned().unwrap_or_default())
    }

    async fn create_item(&self, label: &str) -> Result<ItemId, KbError> {
        let mut state = self.lock();
        state.create_calls += 1;
        if let Some(budget) = state.create_budget {
            if budget == 0 {
                return Err(KbError::Api {
                    code: "failed-save".into(),
                    info: "injected creation failure".into(),
                });
            }
            state.create_budget = Some(budget - 1);
        }
        let id = ItemId::new(format!("Q{}", state.next_item));
        state.next_item += 1;
        state.created.push((id.clone(), label.to_string()));
        debug!(item = %id, label, "created item");
        Ok(id)
    }

    async fn create_page(&self, title: &str, _content: &str) -> Result<u64, KbError> {
        let mut state = self.lock();
        state.page_calls += 1;
        if state.pages.contains_key(title) {
            return Err(KbError::PageExists {
                title: title.to_string(),
            });
        }
        let id = state.next_page;
        state.next_page += 1;
        state.pages.insert(title.to_string(), id);
        Ok(id)
    }

    async fn page_id(&self, title: &str) -> Result<Option<u64>, KbError> {
        Ok(self.lock().pages.get(title).copied())
    }

    async fn upload_claims(&self, item: &ItemId, claims: &[Claim]) -> Result<(), KbError> {
        let mut state = self.lock();
        state.upload_calls += 1;
        if state.fail_uploads {
            return Err(KbError::Server {
                status: 503,
                body: "injected upload failure".into(),
            });
        }
        let stored = state.claims.entry(item.clone()).or_default();
        for claim in claims {
            stored.insert(claim.property.clone(), claim.value.clone());
        }
        Ok(())
    }
}
