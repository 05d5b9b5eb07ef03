//! Error type shared by every stage of the conversion pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for vcxninja operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal conditions.  Lookup misses (unknown flag symbols, unresolved
/// dependency identifiers) are not represented here: they produce empty
/// results instead.
#[derive(Error, Debug)]
pub enum Error {
    /// A file could not be read or written.
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An item-list document is not well-formed XML.
    #[error("{}: XML Error: {source}", path.display())]
    Xml {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },

    /// Expected structure is missing from a project or solution file.
    #[error("{}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    /// A `Condition` attribute could not be parsed.
    #[error("{0}")]
    Condition(String),

    /// The workspace itself is unusable (no solution, bad option, ...).
    #[error("{0}")]
    Workspace(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Malformed { path: path.into(), message: message.into() }
    }
}
