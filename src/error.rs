//! Error taxonomy of the core.
//!
//! RDF content problems (syntax errors, unresolved references) are not
//! errors here; they are reported as diagnostics. These types cover the
//! failures a caller has to handle.

use std::path::PathBuf;

use thiserror::Error;
use tower_lsp::lsp_types::Url;

use crate::document::ConstructId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("document {uri} is at version {current}, refusing version {received}")]
    StaleVersion {
        uri: Url,
        current: i32,
        received: i32,
    },
    #[error("document {0} is not open")]
    NotFound(Url),
    #[error("{0:?} does not exist in the current parse")]
    ConstructNotFound(ConstructId),
}

/// Disk failures of the vocabulary cache. Logged and treated as a cache miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cache file {path} could not be parsed: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Network failures. Resolution degrades to local-only data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network access is disabled")]
    Offline,
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
}
