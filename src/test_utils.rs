//! Shared test utilities for ldls.
//!
//! This module provides common helpers used across multiple test modules.
//! It is only compiled when running tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tower_lsp::lsp_types::Url;

use crate::document::Document;
use crate::error::FetchError;
use crate::syntax::Dialect;
use crate::vocab::{CacheOptions, FetchedDocument, Fetcher, VocabularyCache};

/// Creates a vocabulary cache rooted in a fresh temporary directory.
///
/// Returns a tuple of (TempDir, VocabularyCache) where:
/// - TempDir: The temp directory handle (must be kept alive for the test duration)
/// - VocabularyCache: A cache with default options using `fetcher`
///
/// # Example
///
/// ```ignore
/// use crate::test_utils::{cache_with, CountingFetcher};
///
/// let fetcher = CountingFetcher::new();
/// let (_dir, cache) = cache_with(fetcher.clone());
/// assert_eq!(fetcher.count(), 0);
/// ```
pub fn cache_with<F: Fetcher + 'static>(fetcher: F) -> (TempDir, VocabularyCache) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let cache = VocabularyCache::new(dir.path(), Arc::new(fetcher), CacheOptions::default());
    (dir, cache)
}

/// Parses `text` as an open document at version 1.
pub fn document(text: &str, dialect: Dialect) -> Document {
    let name = match dialect {
        Dialect::Turtle => "doc.ttl",
        Dialect::TriG => "doc.trig",
        Dialect::JsonLd => "doc.jsonld",
    };
    let uri = Url::parse(&format!("file:///test/{name}")).expect("valid test uri");
    Document::new(uri, text.to_string(), 1, dialect)
}

/// A fetcher serving canned bodies and counting every request.
///
/// Clones share the counter, so a test can keep one clone and hand the
/// other to the cache. Unknown URLs answer 404.
#[derive(Clone, Default)]
pub struct CountingFetcher {
    calls: Arc<AtomicUsize>,
    bodies: Arc<HashMap<String, String>>,
    fail: bool,
    delay: Option<Duration>,
}

impl CountingFetcher {
    pub fn new() -> CountingFetcher {
        CountingFetcher::default()
    }

    /// Every request fails with a network error.
    pub fn failing() -> CountingFetcher {
        CountingFetcher {
            fail: true,
            ..CountingFetcher::default()
        }
    }

    pub fn with_body(mut self, url: &str, body: &str) -> CountingFetcher {
        Arc::make_mut(&mut self.bodies).insert(url.to_string(), body.to_string());
        self
    }

    /// Holds every response back by `millis`, so concurrent callers overlap.
    pub fn with_delay(mut self, millis: u64) -> CountingFetcher {
        self.delay = Some(Duration::from_millis(millis));
        self
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(FetchError::Network {
                url: url.to_string(),
                message: "connection refused".to_string(),
            });
        }
        match self.bodies.get(url) {
            Some(body) => Ok(FetchedDocument {
                url: url.to_string(),
                content_type: Some("text/turtle".to_string()),
                body: body.clone(),
            }),
            None => Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

/// Fails the test if anything reaches the network.
pub struct ForbiddenFetcher;

#[async_trait]
impl Fetcher for ForbiddenFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        panic!("unexpected fetch of {url}");
    }
}
