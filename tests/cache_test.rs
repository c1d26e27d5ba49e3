//! Vocabulary cache behaviour under concurrent use.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;

use ldls::error::FetchError;
use ldls::vocab::{CacheEvent, CacheOptions, FetchedDocument, Fetcher, VocabularyCache, PREFIX_FILE};

const EX: &str = "http://example.org/vocab#";

const EX_VOCAB: &str = r#"
@prefix rdf: <http://www.w3.org/1999/02/22-rdf-syntax-ns#> .
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
@prefix ex: <http://example.org/vocab#> .

ex:Person a rdfs:Class ;
    rdfs:label "Person" .

ex:knows a rdf:Property ;
    rdfs:label "knows" .
"#;

/// Serves one vocabulary slowly and counts requests.
#[derive(Clone)]
struct SlowFetcher {
    calls: Arc<AtomicUsize>,
    body: &'static str,
}

impl SlowFetcher {
    fn serving(body: &'static str) -> SlowFetcher {
        SlowFetcher {
            calls: Arc::new(AtomicUsize::new(0)),
            body,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for SlowFetcher {
    fn default() -> SlowFetcher {
        SlowFetcher::serving(EX_VOCAB)
    }
}

#[async_trait]
impl Fetcher for SlowFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(FetchedDocument {
            url: url.to_string(),
            content_type: Some("text/turtle".to_string()),
            body: self.body.to_string(),
        })
    }
}

fn cache_files(dir: &TempDir) -> Vec<String> {
    std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".ttl") && name != PREFIX_FILE)
        .collect()
}

/// Every stored vocabulary announces itself once, so the events count the writes.
async fn assert_stored_once(events: &mut Receiver<CacheEvent>) {
    let first = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("no vocabulary was stored")
        .unwrap();
    assert_eq!(
        first,
        CacheEvent::VocabularyUpdated {
            namespace: EX.to_string()
        }
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_fetches_share_one_request() {
    let dir = TempDir::new().unwrap();
    let fetcher = SlowFetcher::default();
    let cache = VocabularyCache::new(dir.path(), Arc::new(fetcher.clone()), CacheOptions::default());
    let mut events = cache.subscribe();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.fetch(EX).await })
        })
        .collect();
    for task in tasks {
        let entry = task.await.unwrap().unwrap();
        assert_eq!(entry.terms.len(), 2);
    }

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(cache_files(&dir).len(), 1);
    assert_stored_once(&mut events).await;
}

/// Test: lookups racing from several threads start a single background fetch
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_gets_start_one_fetch() {
    let dir = TempDir::new().unwrap();
    let fetcher = SlowFetcher::default();
    let cache = VocabularyCache::new(dir.path(), Arc::new(fetcher.clone()), CacheOptions::default());
    let mut events = cache.subscribe();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move {
                for _ in 0..4 {
                    cache.get(EX);
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_stored_once(&mut events).await;
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(cache.get(EX).terms.len(), 2);
    assert_eq!(cache_files(&dir).len(), 1);
}

/// Test: repeated misses start one background fetch, and later reads hit memory
#[tokio::test]
async fn get_misses_fetch_once_in_the_background() {
    let dir = TempDir::new().unwrap();
    let fetcher = SlowFetcher::default();
    let cache = VocabularyCache::new(dir.path(), Arc::new(fetcher.clone()), CacheOptions::default());

    for _ in 0..5 {
        assert!(cache.get(EX).is_empty());
    }
    let fetched = cache.fetch(EX).await.unwrap();
    assert!(fetched.term("knows").is_some());

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(cache.get(EX).terms.len(), 2);
    assert_eq!(cache_files(&dir).len(), 1);
}

#[tokio::test]
async fn stored_vocabulary_survives_restart() {
    let dir = TempDir::new().unwrap();
    let fetcher = SlowFetcher::default();
    let cache = VocabularyCache::new(dir.path(), Arc::new(fetcher.clone()), CacheOptions::default());
    cache.fetch(EX).await.unwrap();

    let options = CacheOptions {
        offline: true,
        ..CacheOptions::default()
    };
    let restarted = VocabularyCache::new(dir.path(), Arc::new(fetcher.clone()), options);
    let entry = restarted.get(EX);
    assert_eq!(entry.term("Person").and_then(|t| t.label.as_deref()), Some("Person"));
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn escaped_labels_survive_restart() {
    const QUOTED: &str = r#"
@prefix rdfs: <http://www.w3.org/2000/01/rdf-schema#> .
<http://example.org/vocab#quote> a rdfs:Class ;
    rdfs:label "a\"b\n"@en, "x"@de ;
    rdfs:comment """Says "hi"
on two lines.""" .
"#;
    let dir = TempDir::new().unwrap();
    let fetcher = SlowFetcher::serving(QUOTED);
    let cache = VocabularyCache::new(dir.path(), Arc::new(fetcher.clone()), CacheOptions::default());
    cache.fetch(EX).await.unwrap();

    let options = CacheOptions {
        offline: true,
        ..CacheOptions::default()
    };
    let restarted = VocabularyCache::new(dir.path(), Arc::new(fetcher.clone()), options);
    let entry = restarted.get(EX);
    let quote = entry.term("quote").unwrap();
    assert_eq!(quote.label.as_deref(), Some("a\"b\n"));
    assert_eq!(quote.comment.as_deref(), Some("Says \"hi\"\non two lines."));
}
