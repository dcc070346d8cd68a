// crates/core/src/error.rs
//! Leaf error types, classified by kind (spec §7).
//!
//! Follows `claude-view-core`'s `ParseError`/`DiscoveryError` shape: an
//! `io(path, source)` constructor reclassifies a raw `io::Error` by its
//! `ErrorKind` so callers get a typed variant instead of matching strings.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from `AtomicFileStore` (spec §4.2). Per spec, these are always
/// caught at the call site and degrade to "failed write, logged" — this
/// type exists so that degrade-path can be precise about *why*.
#[derive(Debug, Error)]
pub enum AtomicWriteError {
    #[error("failed to create parent directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write temp file {path}: {source}")]
    WriteTemp {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rename {from} onto {to}: {source}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors scanning an incremental transcript tail (spec §4.8).
#[derive(Debug, Error)]
pub enum TranscriptScanError {
    #[error("transcript file too large to scan safely: {size} bytes (cap {cap} bytes)")]
    TooLarge { size: u64, cap: u64 },

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TranscriptScanError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors from the freshness/refresh-intent subsystem (spec §4.3, §4.4).
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("unregistered freshness category: {0}")]
    UnknownCategory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
