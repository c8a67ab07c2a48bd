//! XSLT transformation through an external processor.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Transformer {
    program: PathBuf,
}

impl Transformer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run `<program> <stylesheet> <document>` and return its stdout.
    pub async fn apply(&self, stylesheet: &Path, document: &Path) -> anyhow::Result<Vec<u8>> {
        let output = Command::new(&self.program)
            .arg(stylesheet)
            .arg(document)
            .output()
            .await
            .with_context(|| format!("running {}", self.program.display()))?;

        if !output.status.success() {
            bail!(
                "{} {} {} exited with {}: {}",
                self.program.display(),
                stylesheet.display(),
                document.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        debug!(
            stylesheet = %stylesheet.display(),
            bytes = output.stdout.len(),
            "transformed document"
        );
        Ok(output.stdout)
    }
}
