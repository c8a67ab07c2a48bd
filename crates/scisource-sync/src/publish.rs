//! Publication of an article tree to ScienceSource.
//!
//! The store has no transactions and the records reference each other in
//! cycles (an anchor points at its neighbours, an annotation back at its
//! anchor, the article at its first anchor). Publication is therefore split
//! into three phases:
//!
//! 1. **create nodes**: give every record a remote id;
//! 2. **reconcile**: fill in every cross-reference locally, no network;
//! 3. **upload claims**: push each record's full claim set.
//!
//! The tree's [`PublishPhase`] records which phases have completed, and the
//! tree is checkpointed to its snapshot after every phase whether or not the
//! phase succeeded, so a rerun picks up where the last one stopped without
//! recreating anything.

use std::path::Path;
use std::sync::Arc;

use scisource_core::{
    ClaimValue, CoreError, ItemClass, ItemId, Property, PublishPhase, ScienceSourceArticle,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::kb::{KbError, KnowledgeBase};
use crate::labels::LabelMap;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("publishing page {title:?} failed: {source}")]
    Page {
        title: String,
        #[source]
        source: KbError,
    },
    #[error("{failed} item creation(s) failed, {created} succeeded; first failure: {first}")]
    CreateNodes {
        created: usize,
        failed: usize,
        #[source]
        first: KbError,
    },
    #[error("{missing} record(s) have no remote identifier yet")]
    Unidentified { missing: usize },
    #[error("claims cannot be uploaded before the tree is reconciled")]
    NotReconciled,
    #[error("uploading claims for {item} failed: {source}")]
    Upload {
        item: ItemId,
        #[source]
        source: KbError,
    },
    #[error("saving checkpoint failed: {0}")]
    Checkpoint(#[source] CoreError),
    #[error("{error}; saving checkpoint also failed: {checkpoint}")]
    Checkpointed {
        #[source]
        error: Box<PublishError>,
        checkpoint: CoreError,
    },
}

/// Publishes article trees. Cheap to clone; shared by every pipeline.
#[derive(Clone)]
pub struct Publisher {
    kb: Arc<dyn KnowledgeBase>,
    labels: Arc<LabelMap>,
}

impl Publisher {
    pub fn new(kb: Arc<dyn KnowledgeBase>, labels: Arc<LabelMap>) -> Self {
        Self { kb, labels }
    }

    /// Run every outstanding step for `article`, checkpointing to `snapshot`
    /// after each one. Stops at the first failing step.
    ///
    /// `page` is the rendered display document; the page step runs only
    /// while the article has no page id.
    pub async fn publish(
        &self,
        article: &mut ScienceSourceArticle,
        page: Option<&str>,
        snapshot: &Path,
    ) -> Result<(), PublishError> {
        if article.page_id.is_none()
            && let Some(content) = page
        {
            let outcome = self.publish_page(article, content).await;
            checkpoint(article, snapshot, outcome)?;
        }

        if article.phase < PublishPhase::NodesCreated {
            let outcome = self.create_nodes(article).await;
            checkpoint(article, snapshot, outcome)?;
        }

        if article.phase < PublishPhase::Reconciled {
            let outcome = self.reconcile(article);
            checkpoint(article, snapshot, outcome)?;
        }

        if article.phase < PublishPhase::ClaimsUploaded {
            let outcome = self.upload_claims(article).await;
            checkpoint(article, snapshot, outcome)?;
        }

        Ok(())
    }

    /// Upload the display page unless it already has an id.
    ///
    /// If the title is already taken the existing page is adopted.
    pub async fn publish_page(
        &self,
        article: &mut ScienceSourceArticle,
        content: &str,
    ) -> Result<(), PublishError> {
        if article.page_id.is_some() {
            return Ok(());
        }
        let title = article.article_title.clone();
        let page_error = |source: KbError| PublishError::Page {
            title: title.clone(),
            source,
        };

        let page_id = match self.kb.create_page(&title, content).await {
            Ok(id) => id,
            Err(KbError::PageExists { .. }) => {
                warn!(page = %title, "page already exists, adopting it");
                self.kb
                    .page_id(&title)
                    .await
                    .map_err(page_error)?
                    .ok_or_else(|| {
                        page_error(KbError::Unexpected(format!(
                            "page {title:?} reported as existing but not found"
                        )))
                    })?
            }
            Err(e) => return Err(page_error(e)),
        };

        info!(page = %title, page_id, "published page");
        article.page_id = Some(page_id);
        Ok(())
    }

    /// Phase 1: create a remote item for every record without one.
    ///
    /// Records that already have an id are skipped, so rerunning after a
    /// partial failure only creates what is still missing. Every missing
    /// record is attempted even after a failure; ids that were assigned
    /// stay on the tree. Returns the number of items created.
    pub async fn create_nodes(
        &self,
        article: &mut ScienceSourceArticle,
    ) -> Result<usize, PublishError> {
        let mut batch = CreateBatch::default();

        if article.item.is_none() {
            article.item = self.create(ItemClass::Article, &mut batch).await;
        }
        for anchor in &mut article.anchor_points {
            if anchor.item.is_none() {
                anchor.item = self.create(ItemClass::AnchorPoint, &mut batch).await;
            }
            if anchor.annotation.item.is_none() {
                anchor.annotation.item = self.create(ItemClass::Annotation, &mut batch).await;
            }
        }

        let CreateBatch {
            created,
            failed,
            first,
        } = batch;
        if let Some(first) = first {
            return Err(PublishError::CreateNodes {
                created,
                failed,
                first,
            });
        }

        article.phase = article.phase.max(PublishPhase::NodesCreated);
        info!(
            created,
            records = article.record_count(),
            "created article items"
        );
        Ok(created)
    }

    async fn create(&self, class: ItemClass, batch: &mut CreateBatch) -> Option<ItemId> {
        match self.kb.create_item(class.instance_label()).await {
            Ok(id) => {
                debug!(item = %id, class = class.label(), "created item");
                batch.created += 1;
                Some(id)
            }
            Err(e) => {
                warn!(class = class.label(), error = %e, "item creation failed");
                batch.failed += 1;
                batch.first.get_or_insert(e);
                None
            }
        }
    }

    /// Phase 2: fill in every cross-reference. No network calls.
    ///
    /// The chain ends point at the terminus: the first anchor has no
    /// predecessor, the last has no successor, and an article without
    /// anchors points straight at the terminus.
    pub fn reconcile(&self, article: &mut ScienceSourceArticle) -> Result<(), PublishError> {
        let missing = article.unidentified_count();
        if missing > 0 {
            return Err(PublishError::Unidentified { missing });
        }

        let terminus = self.labels.terminus();
        let anchor_class = self.labels.class(ItemClass::AnchorPoint);
        let annotation_class = self.labels.class(ItemClass::Annotation);

        article.instance_of = Some(self.labels.class(ItemClass::Article).clone());
        article.following_anchor_point = Some(
            article
                .anchor_points
                .first()
                .and_then(|a| a.item.clone())
                .unwrap_or_else(|| terminus.clone()),
        );

        let ids: Vec<Option<ItemId>> = article.anchor_points.iter().map(|a| a.item.clone()).collect();
        let article_id = article.item.clone();
        let title = article.article_title.clone();

        for (i, anchor) in article.anchor_points.iter_mut().enumerate() {
            let preceding = i.checked_sub(1).and_then(|p| ids[p].clone());
            let following = ids.get(i + 1).cloned().flatten();

            anchor.instance_of = Some(anchor_class.clone());
            anchor.article_title = title.clone();
            anchor.preceding_anchor_point = Some(preceding.unwrap_or_else(|| terminus.clone()));
            anchor.following_anchor_point = Some(following.unwrap_or_else(|| terminus.clone()));
            anchor.anchor_point_in = article_id.clone();
            anchor.anchors = anchor.annotation.item.clone();

            anchor.annotation.instance_of = Some(annotation_class.clone());
            anchor.annotation.based_on = anchor.item.clone();
        }

        article.phase = article.phase.max(PublishPhase::Reconciled);
        debug!(anchors = ids.len(), "reconciled article tree");
        Ok(())
    }

    /// Phase 3: upload every record's claims. Returns the number of records
    /// uploaded.
    ///
    /// Uploads replace claims per property, so rerunning is harmless.
    pub async fn upload_claims(
        &self,
        article: &mut ScienceSourceArticle,
    ) -> Result<usize, PublishError> {
        if article.phase < PublishPhase::Reconciled {
            return Err(PublishError::NotReconciled);
        }

        let mut uploaded = 0;
        self.upload(&article.item, article.claims()).await?;
        uploaded += 1;
        for anchor in &article.anchor_points {
            self.upload(&anchor.item, anchor.claims()).await?;
            self.upload(&anchor.annotation.item, anchor.annotation.claims())
                .await?;
            uploaded += 2;
        }

        article.phase = PublishPhase::ClaimsUploaded;
        info!(uploaded, "uploaded article claims");
        Ok(uploaded)
    }

    async fn upload(
        &self,
        item: &Option<ItemId>,
        claims: Vec<(Property, ClaimValue)>,
    ) -> Result<(), PublishError> {
        let item = item
            .as_ref()
            .ok_or(PublishError::Unidentified { missing: 1 })?;
        let claims = self.labels.claims(claims);
        self.kb
            .upload_claims(item, &claims)
            .await
            .map_err(|source| PublishError::Upload {
                item: item.clone(),
                source,
            })
    }
}

#[derive(Default)]
struct CreateBatch {
    created: usize,
    failed: usize,
    first: Option<KbError>,
}

/// Persist the tree, folding a save failure into the step's own outcome.
fn checkpoint<T>(
    article: &ScienceSourceArticle,
    snapshot: &Path,
    outcome: Result<T, PublishError>,
) -> Result<T, PublishError> {
    match (outcome, article.save(snapshot)) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(PublishError::Checkpoint(e)),
        (Err(error), Ok(())) => Err(error),
        (Err(error), Err(checkpoint)) => Err(PublishError::Checkpointed {
            error: Box::new(error),
            checkpoint,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKnowledgeBase;
    use scisource_core::{AnchorPoint, Annotation};

    async fn setup() -> (Arc<MemoryKnowledgeBase>, Publisher) {
        let kb = Arc::new(MemoryKnowledgeBase::with_schema());
        let labels = LabelMap::resolve(kb.as_ref()).await.unwrap();
        let publisher = Publisher::new(kb.clone(), Arc::new(labels));
        (kb, publisher)
    }

    fn article_with(anchors: usize) -> ScienceSourceArticle {
        ScienceSourceArticle {
            article_title: "Zika in Brazil (PMC5334599)".into(),
            article_text_title: "Zika in Brazil".into(),
            wikidata_item_code: "Q28818435".into(),
            anchor_points: (0..anchors)
                .map(|i| AnchorPoint {
                    character_number: i * 10,
                    annotation: Annotation {
                        term_found: "zika".into(),
                        length_of_term_found: 4,
                        dictionary_name: "viruses".into(),
                        ..Default::default()
                    },
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn id(s: &str) -> Option<ItemId> {
        Some(ItemId::new(s))
    }

    #[tokio::test]
    async fn full_publish_links_and_uploads_everything() {
        let (kb, publisher) = setup().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let snapshot = tmp.path().join("scisource.json");

        let mut article = article_with(2);
        publisher
            .publish(&mut article, Some("<p>body</p>"), &snapshot)
            .await
            .unwrap();

        assert_eq!(article.phase, PublishPhase::ClaimsUploaded);
        assert_eq!(article.page_id, Some(1));
        assert_eq!(kb.create_calls(), 5);
        assert_eq!(kb.upload_calls(), 5);
        assert_eq!(
            kb.created_labels(),
            vec![
                "article instance",
                "anchor instance",
                "annotation instance",
                "anchor instance",
                "annotation instance"
            ]
        );

        let first = article.anchor_points[0].item.clone().unwrap();
        let claims = kb.claims_for(article.item.as_ref().unwrap());
        assert!(claims.iter().any(|c| c.value == ClaimValue::Item(first.clone())));
        assert!(claims.iter().any(|c| c.value == ClaimValue::Quantity(1)));

        let saved = ScienceSourceArticle::load(&snapshot).unwrap().unwrap();
        assert_eq!(saved, article);
    }

    #[tokio::test]
    async fn create_nodes_is_idempotent() {
        let (kb, publisher) = setup().await;
        let mut article = article_with(3);

        assert_eq!(publisher.create_nodes(&mut article).await.unwrap(), 7);
        assert_eq!(kb.create_calls(), 7);
        let ids_before = article.clone();

        assert_eq!(publisher.create_nodes(&mut article).await.unwrap(), 0);
        assert_eq!(kb.create_calls(), 7);
        assert_eq!(article, ids_before);
    }

    #[tokio::test]
    async fn reconcile_without_anchors_points_at_terminus() {
        let (_kb, publisher) = setup().await;
        let mut article = article_with(0);
        article.item = id("Q500");

        publisher.reconcile(&mut article).unwrap();
        assert_eq!(article.following_anchor_point, id("Q4"));
        assert_eq!(article.instance_of, id("Q1"));
        assert_eq!(article.phase, PublishPhase::Reconciled);
    }

    #[tokio::test]
    async fn reconcile_links_neighbours_and_ends() {
        let (_kb, publisher) = setup().await;
        let mut article = article_with(3);
        article.item = id("Q500");
        for (i, anchor) in article.anchor_points.iter_mut().enumerate() {
            anchor.item = id(&format!("Q60{i}"));
            anchor.annotation.item = id(&format!("Q70{i}"));
        }

        publisher.reconcile(&mut article).unwrap();

        let a = &article.anchor_points;
        assert_eq!(article.following_anchor_point, id("Q600"));
        assert_eq!(a[0].preceding_anchor_point, id("Q4"));
        assert_eq!(a[0].following_anchor_point, id("Q601"));
        assert_eq!(a[1].preceding_anchor_point, id("Q600"));
        assert_eq!(a[1].following_anchor_point, id("Q602"));
        assert_eq!(a[2].preceding_anchor_point, id("Q601"));
        assert_eq!(a[2].following_anchor_point, id("Q4"));
        for (i, anchor) in a.iter().enumerate() {
            assert_eq!(anchor.anchor_point_in, id("Q500"));
            assert_eq!(anchor.anchors, id(&format!("Q70{i}")));
            assert_eq!(anchor.annotation.based_on, id(&format!("Q60{i}")));
            assert_eq!(anchor.instance_of, id("Q2"));
            assert_eq!(anchor.annotation.instance_of, id("Q3"));
            assert_eq!(anchor.article_title, "Zika in Brazil (PMC5334599)");
        }
    }

    #[tokio::test]
    async fn single_anchor_has_terminus_on_both_sides() {
        let (_kb, publisher) = setup().await;
        let mut article = article_with(1);
        article.item = id("Q500");
        article.anchor_points[0].item = id("Q600");
        article.anchor_points[0].annotation.item = id("Q700");

        publisher.reconcile(&mut article).unwrap();
        assert_eq!(article.anchor_points[0].preceding_anchor_point, id("Q4"));
        assert_eq!(article.anchor_points[0].following_anchor_point, id("Q4"));
    }

    #[tokio::test]
    async fn reconcile_requires_every_id() {
        let (_kb, publisher) = setup().await;
        let mut article = article_with(2);
        article.item = id("Q500");
        let err = publisher.reconcile(&mut article).unwrap_err();
        assert!(matches!(err, PublishError::Unidentified { missing: 4 }));
        assert_eq!(article.phase, PublishPhase::Materialized);
    }

    #[tokio::test]
    async fn upload_before_reconcile_is_rejected() {
        let (kb, publisher) = setup().await;
        let mut article = article_with(1);
        let err = publisher.upload_claims(&mut article).await.unwrap_err();
        assert!(matches!(err, PublishError::NotReconciled));
        assert_eq!(kb.upload_calls(), 0);
    }

    #[tokio::test]
    async fn resume_after_phase_one_skips_creation() {
        let (kb, publisher) = setup().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let snapshot = tmp.path().join("scisource.json");

        let mut article = article_with(2);
        article.page_id = Some(9);
        publisher.create_nodes(&mut article).await.unwrap();
        article.save(&snapshot).unwrap();
        let calls_after_phase_one = kb.create_calls();

        // Process restarts: only the snapshot survives.
        let mut resumed = ScienceSourceArticle::load(&snapshot).unwrap().unwrap();
        assert_eq!(resumed.phase, PublishPhase::NodesCreated);
        publisher.publish(&mut resumed, None, &snapshot).await.unwrap();

        assert_eq!(kb.create_calls(), calls_after_phase_one);
        assert_eq!(resumed.phase, PublishPhase::ClaimsUploaded);
        assert_eq!(kb.upload_calls(), 5);
    }

    #[tokio::test]
    async fn partial_creation_failure_keeps_progress() {
        let (kb, publisher) = setup().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let snapshot = tmp.path().join("scisource.json");

        kb.fail_creates_after(2);
        let mut article = article_with(2);
        let err = publisher
            .publish(&mut article, None, &snapshot)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PublishError::CreateNodes {
                created: 2,
                failed: 3,
                ..
            }
        ));
        // Every missing record was attempted.
        assert_eq!(kb.create_calls(), 5);

        let saved = ScienceSourceArticle::load(&snapshot).unwrap().unwrap();
        assert_eq!(saved.phase, PublishPhase::Materialized);
        assert_eq!(saved.unidentified_count(), 3);
        assert!(saved.item.is_some());
        assert!(saved.anchor_points[0].item.is_some());

        kb.clear_failures();
        let mut resumed = saved;
        publisher.publish(&mut resumed, None, &snapshot).await.unwrap();
        assert_eq!(kb.create_calls(), 8);
        assert_eq!(resumed.unidentified_count(), 0);
        assert_eq!(resumed.item, article.item);
    }

    #[tokio::test]
    async fn failed_upload_is_retried_on_rerun() {
        let (kb, publisher) = setup().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let snapshot = tmp.path().join("scisource.json");

        kb.fail_uploads(true);
        let mut article = article_with(1);
        let err = publisher
            .publish(&mut article, None, &snapshot)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Upload { .. }));
        assert_eq!(article.phase, PublishPhase::Reconciled);

        kb.clear_failures();
        publisher.publish(&mut article, None, &snapshot).await.unwrap();
        assert_eq!(article.phase, PublishPhase::ClaimsUploaded);
        assert_eq!(kb.create_calls(), 3);
    }

    #[tokio::test]
    async fn creation_and_checkpoint_failures_are_combined() {
        let (kb, publisher) = setup().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let snapshot = tmp.path().join("missing-dir").join("scisource.json");

        kb.fail_creates_after(0);
        let mut article = article_with(1);
        let err = publisher
            .publish(&mut article, None, &snapshot)
            .await
            .unwrap_err();
        match err {
            PublishError::Checkpointed { error, checkpoint } => {
                assert!(matches!(
                    *error,
                    PublishError::CreateNodes {
                        created: 0,
                        failed: 3,
                        ..
                    }
                ));
                assert!(matches!(checkpoint, CoreError::Io { .. }));
            }
            other => panic!("expected combined error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn checkpoint_failure_alone_is_reported() {
        let (_kb, publisher) = setup().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let snapshot = tmp.path().join("missing-dir").join("scisource.json");

        let mut article = article_with(0);
        let err = publisher
            .publish(&mut article, None, &snapshot)
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Checkpoint(_)));
        // The phase itself completed before the save failed.
        assert_eq!(article.phase, PublishPhase::NodesCreated);
    }

    #[tokio::test]
    async fn completed_tree_makes_no_calls() {
        let (kb, publisher) = setup().await;
        let tmp = tempfile::TempDir::new().unwrap();
        let snapshot = tmp.path().join("scisource.json");

        let mut article = article_with(2);
        publisher
            .publish(&mut article, Some("page"), &snapshot)
            .await
            .unwrap();
        let (creates, uploads, pages) = (kb.create_calls(), kb.upload_calls(), kb.page_calls());

        publisher
            .publish(&mut article, Some("page"), &snapshot)
            .await
            .unwrap();
        assert_eq!(kb.create_calls(), creates);
        assert_eq!(kb.upload_calls(), uploads);
        assert_eq!(kb.page_calls(), pages);
    }

    #[tokio::test]
    async fn existing_page_is_adopted() {
        let (kb, publisher) = setup().await;
        let mut article = article_with(0);
        kb.add_page(&article.article_title, 42);

        publisher.publish_page(&mut article, "content").await.unwrap();
        assert_eq!(article.page_id, Some(42));
        assert_eq!(kb.page_calls(), 1);
    }

    #[tokio::test]
    async fn page_step_skipped_once_known() {
        let (kb, publisher) = setup().await;
        let mut article = article_with(0);
        article.page_id = Some(3);
        publisher.publish_page(&mut article, "content").await.unwrap();
        assert_eq!(kb.page_calls(), 0);
        assert_eq!(article.page_id, Some(3));
    }
}
