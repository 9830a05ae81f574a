//! Error types for KFX generation.

use thiserror::Error;

/// Errors that abort generation of one document.
///
/// Mapping gaps (unknown CSS properties, unresolvable references) are never
/// reported here; they are logged and skipped.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("duplicate fragment id {fid:?} (type ${ftype})")]
    DuplicateFragment { ftype: u32, fid: String },

    #[error("entity map is incomplete: {0:?} not listed")]
    EntityMapIncomplete(Vec<String>),

    #[error("missing entity {0:?} referenced by the dependency graph")]
    MissingEntity(String),

    #[error("fragment {fid:?} nests deeper than {limit} levels")]
    NestingTooDeep { fid: String, limit: usize },

    #[error("malformed content: {0}")]
    MalformedContent(String),

    #[error("generation cancelled")]
    Cancelled,

    #[error("generation panicked: {0}")]
    Panicked(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
