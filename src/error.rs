//! Error taxonomy shared by every importer component.

use std::path::Path;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImporterError>;

#[derive(Debug, Error)]
pub enum ImporterError {
    /// Missing or malformed settings. Fatal at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Filesystem or process I/O failed for the named operation.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// The VMS could not be reached at all (no HTTP response).
    #[error("transport error: {0}")]
    Transport(String),

    /// A metadata file could not be used.
    #[error("data error: {0}")]
    Data(String),
}

impl ImporterError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn io_at(action: &str, path: &Path, source: std::io::Error) -> Self {
        Self::io(format!("{action} {}", path.display()), source)
    }
}
