//! Per-paper processing: fetch, transform, annotate, publish.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use scisource_core::{
    Dictionary, FrontMatter, Paper, ScienceSourceArticle, build_anchor_points, find_all_matches,
};
use scisource_sync::Publisher;
use tracing::{info, warn};

use crate::fetch::DocumentSource;
use crate::render;
use crate::transform::Transformer;

/// Everything a paper pipeline needs, shared across the pool.
pub struct Pipeline {
    pub output: PathBuf,
    pub dictionaries: Vec<Dictionary>,
    pub source: DocumentSource,
    pub transformer: Transformer,
    pub display_stylesheet: PathBuf,
    pub text_stylesheet: PathBuf,
    pub publisher: Publisher,
}

/// Working files for one paper under `<output>/<pmcid>/`.
pub struct PaperProcessor {
    paper: Paper,
    folder: PathBuf,
}

impl PaperProcessor {
    pub fn new(paper: Paper, output: &Path) -> Self {
        let folder = output.join(paper.id());
        Self { paper, folder }
    }

    fn file(&self, name: &str) -> PathBuf {
        self.folder.join(name)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.file("scisource.json")
    }

    /// The feed title, falling back to the JATS article title and then the
    /// alternative title when the feed left it empty.
    pub fn article_title<'a>(&'a self, front: &'a FrontMatter) -> &'a str {
        let title = self.paper.title.value.trim();
        if title.is_empty() {
            front.best_title()
        } else {
            title
        }
    }

    /// Title of the display page, also recorded on every anchor point.
    pub fn page_title(&self, title: &str) -> String {
        format!("{title} (PMC{})", self.paper.id())
    }

    pub async fn process(&self, ctx: &Pipeline) -> anyhow::Result<()> {
        let id = self.paper.id();
        tokio::fs::create_dir_all(&self.folder)
            .await
            .with_context(|| format!("creating {}", self.folder.display()))?;

        let xml = self.file("paper.xml");
        ctx.source
            .fetch(&ctx.source.full_text_url(id), &xml)
            .await
            .context("fetching full text")?;

        if let Err(e) = ctx
            .source
            .fetch(
                &ctx.source.supplementary_url(id),
                &self.file("supplementary.zip"),
            )
            .await
        {
            warn!(paper = %id, error = %e, "no supplementary files");
        }

        let front = FrontMatter::load(&xml).context("reading front matter")?;
        let title = self.article_title(&front);
        if title.is_empty() {
            warn!(paper = %id, "paper has no title in the feed or the article");
        }

        let body = ctx
            .transformer
            .apply(&ctx.display_stylesheet, &xml)
            .await
            .context("rendering display page")?;
        let page = render::display_page(
            &render::header(&self.paper, title, &front),
            &body,
            &render::footer(&self.paper, Utc::now().date_naive()),
        );
        write(&self.file("paper.html"), &page).await?;

        let text = ctx
            .transformer
            .apply(&ctx.text_stylesheet, &xml)
            .await
            .context("rendering text")?;
        write(&self.file("paper.txt"), &text).await?;
        let text = String::from_utf8_lossy(&text);

        let snapshot = self.snapshot_path();
        let mut article = self.materialize(title, &ctx.dictionaries, &text, &snapshot);
        info!(
            paper = %id,
            anchors = article.anchor_points.len(),
            phase = ?article.phase,
            "article tree ready"
        );

        let page = String::from_utf8_lossy(&page);
        ctx.publisher
            .publish(&mut article, Some(page.as_ref()), &snapshot)
            .await
            .context("publishing")?;
        info!(paper = %id, "published");
        Ok(())
    }

    /// Reload the checkpointed tree, or build a fresh one when there is no
    /// usable snapshot.
    pub fn materialize(
        &self,
        title: &str,
        dictionaries: &[Dictionary],
        text: &str,
        snapshot: &Path,
    ) -> ScienceSourceArticle {
        match ScienceSourceArticle::load(snapshot) {
            Ok(Some(article)) => return article,
            Ok(None) => {}
            Err(e) => warn!(paper = %self.paper.id(), error = %e, "discarding unreadable snapshot"),
        }

        let time_code = Utc::now().to_rfc3339();
        let matches = find_all_matches(dictionaries, text);
        let page_title = self.page_title(title);

        let mut anchor_points = build_anchor_points(text, matches, &time_code);
        for anchor in &mut anchor_points {
            anchor.article_title = page_title.clone();
        }

        ScienceSourceArticle {
            article_title: page_title,
            wikidata_item_code: self.paper.wikidata_id().to_string(),
            article_text_title: title.to_string(),
            publication_date: self.paper.date.value.clone(),
            time_code,
            anchor_points,
            ..Default::default()
        }
    }
}

async fn write(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    tokio::fs::write(path, data)
        .await
        .with_context(|| format!("writing {}", path.display()))
}
