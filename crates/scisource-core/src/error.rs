use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("dictionary {dictionary}: entry {index} has an empty term")]
    EmptyTerm { dictionary: String, index: usize },

    #[error("dictionary {dictionary}: failed to build matcher: {source}")]
    Matcher {
        dictionary: String,
        #[source]
        source: aho_corasick::BuildError,
    },

    #[error("markup error: {0}")]
    Markup(#[from] quick_xml::Error),
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
