mod config;
mod fetch;
mod ingest;
mod pipeline;
mod render;
mod transform;

use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use scisource_core::{PaperFeed, load_dictionaries};
use scisource_sync::{KnowledgeBase, LabelMap, MemoryKnowledgeBase, Publisher, WikibaseClient};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::fetch::DocumentSource;
use crate::ingest::run_bounded;
use crate::pipeline::{PaperProcessor, Pipeline};
use crate::transform::Transformer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::parse();
    info!("scisource v{}", env!("CARGO_PKG_VERSION"));

    let summary = run(config).await?;
    if !summary.is_success() {
        bail!(
            "{} paper(s) failed: {}",
            summary.failed.len(),
            summary.failed.join(", ")
        );
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: Config) -> anyhow::Result<ingest::RunSummary> {
    info!(feed = %config.feed.display(), "loading feed");
    let feed = PaperFeed::load(&config.feed).context("loading paper feed")?;
    let mut library = feed.library();
    if !library.duplicates.is_empty() {
        warn!(count = library.duplicates.len(), "feed contained duplicate papers");
    }
    if library.missing_id > 0 {
        warn!(count = library.missing_id, "feed contained papers without a PMC id");
    }
    if let Some(limit) = config.limit {
        library.papers.truncate(limit);
    }
    info!(count = library.papers.len(), "papers to process");

    let dictionaries = match &config.dictionaries {
        Some(dir) => load_dictionaries(dir).context("loading dictionaries")?,
        None => {
            warn!("no dictionary directory given, no terms will be matched");
            Vec::new()
        }
    };
    info!(count = dictionaries.len(), "loaded dictionaries");

    let kb: Arc<dyn KnowledgeBase> = if config.dry_run {
        info!("dry run, publishing to an in-process store");
        Arc::new(MemoryKnowledgeBase::with_schema())
    } else {
        Arc::new(WikibaseClient::new(
            &config.url_base,
            config.access_token.clone(),
        ))
    };
    let labels = LabelMap::resolve(kb.as_ref())
        .await
        .context("resolving ScienceSource schema labels")?;

    let pipeline = Arc::new(Pipeline {
        output: config.output.clone(),
        dictionaries,
        source: DocumentSource::new(&config.europepmc_url),
        transformer: Transformer::new(&config.xsltproc),
        display_stylesheet: config.display_stylesheet.clone(),
        text_stylesheet: config.text_stylesheet.clone(),
        publisher: Publisher::new(kb, Arc::new(labels)),
    });

    let items = library
        .papers
        .into_iter()
        .map(|paper| (paper.id().to_string(), paper))
        .collect();

    let summary = run_bounded(items, config.concurrency, move |paper| {
        let pipeline = pipeline.clone();
        async move {
            let processor = PaperProcessor::new(paper, &pipeline.output);
            processor.process(&pipeline).await
        }
    })
    .await;
    Ok(summary)
}
