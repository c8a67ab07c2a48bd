//! Command-line configuration.

use std::path::PathBuf;

use clap::Parser;

use crate::fetch::EUROPE_PMC_URL;

/// Annotate open-access papers against term dictionaries and publish the
/// results to a ScienceSource Wikibase.
#[derive(Parser, Debug, Clone)]
#[command(name = "scisource", version, about)]
pub struct Config {
    /// SPARQL result feed (JSON) listing the papers to process.
    #[arg(long, env = "SCISOURCE_FEED")]
    pub feed: PathBuf,

    /// Directory receiving one folder per paper.
    #[arg(long, default_value = ".")]
    pub output: PathBuf,

    /// Directory of `*.json` term dictionaries.
    #[arg(long, env = "SCISOURCE_DICTIONARIES")]
    pub dictionaries: Option<PathBuf>,

    /// Base URL of the ScienceSource instance.
    #[arg(long, env = "SCISOURCE_URL_BASE", default_value = "http://localhost:8181")]
    pub url_base: String,

    /// Bearer token sent with every Wikibase request.
    #[arg(long, env = "SCISOURCE_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Maximum number of papers processed at once.
    #[arg(long, default_value_t = 5, value_parser = parse_concurrency)]
    pub concurrency: usize,

    /// Europe PMC REST endpoint.
    #[arg(long, default_value = EUROPE_PMC_URL)]
    pub europepmc_url: String,

    /// The XSLT processor to run.
    #[arg(long, default_value = "xsltproc")]
    pub xsltproc: PathBuf,

    /// Stylesheet producing the display page body.
    #[arg(long, default_value = "jats-parsoid.xsl")]
    pub display_stylesheet: PathBuf,

    /// Stylesheet producing the plain text that is scanned for terms.
    #[arg(long, default_value = "jats-text.xsl")]
    pub text_stylesheet: PathBuf,

    /// Process only the first N unique papers of the feed.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Publish to an in-process store instead of the Wikibase instance.
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_concurrency(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("concurrency must be at least 1".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
