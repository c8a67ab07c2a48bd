//! Europe PMC document source with an on-disk cache.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tracing::{debug, info};

pub const EUROPE_PMC_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest";

/// Downloads article resources, skipping anything already on disk.
#[derive(Clone)]
pub struct DocumentSource {
    client: reqwest::Client,
    base_url: String,
}

impl DocumentSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn full_text_url(&self, id: &str) -> String {
        format!("{}/PMC{id}/fullTextXML", self.base_url)
    }

    pub fn supplementary_url(&self, id: &str) -> String {
        format!("{}/PMC{id}/supplementaryFiles", self.base_url)
    }

    /// Download `url` to `dest` unless `dest` already exists.
    ///
    /// The body is written to a sibling `.part` file and renamed into place,
    /// so an interrupted download is never mistaken for a cached one.
    /// Returns whether anything was downloaded.
    pub async fn fetch(&self, url: &str, dest: &Path) -> anyhow::Result<bool> {
        if tokio::fs::try_exists(dest)
            .await
            .with_context(|| format!("checking {}", dest.display()))?
        {
            debug!(path = %dest.display(), "using cached copy");
            return Ok(false);
        }

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("{url} returned {status}");
        }
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("reading body of {url}"))?;

        let part = part_path(dest);
        tokio::fs::write(&part, &body)
            .await
            .with_context(|| format!("writing {}", part.display()))?;
        tokio::fs::rename(&part, dest)
            .await
            .with_context(|| format!("renaming {} into place", part.display()))?;

        info!(url, bytes = body.len(), path = %dest.display(), "downloaded");
        Ok(true)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}
