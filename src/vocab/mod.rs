//! Process-wide vocabulary cache.
//!
//! Lookups go memory, then disk, then network. A miss never blocks: [`get`]
//! returns whatever is known (possibly nothing) and starts a background fetch
//! that stores the vocabulary for later queries. Every namespace is fetched
//! at most once per process; a failed fetch is remembered and not retried
//! until restart.
//!
//! [`get`]: VocabularyCache::get

mod fetch;
mod inflight;
mod store;
pub mod well_known;

pub use fetch::{FetchedDocument, Fetcher, HttpFetcher, OfflineFetcher};
pub use store::{parse_vocabulary, render_turtle, DiskStore, PREFIX_FILE};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use tokio::sync::broadcast;
use tower_lsp::lsp_types::Url;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::syntax::Dialect;
use inflight::InFlight;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TermKind {
    Class,
    Property,
    Other,
}

impl TermKind {
    pub fn name(&self) -> &'static str {
        match self {
            TermKind::Class => "Class",
            TermKind::Property => "Property",
            TermKind::Other => "Resource",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermInfo {
    pub kind: TermKind,
    pub label: Option<String>,
    pub comment: Option<String>,
}

/// What is known about one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyEntry {
    pub namespace: String,
    pub preferred_prefix: Option<String>,
    /// Keyed by local name.
    pub terms: BTreeMap<String, TermInfo>,
}

impl VocabularyEntry {
    pub fn empty(namespace: &str) -> VocabularyEntry {
        VocabularyEntry {
            namespace: namespace.to_string(),
            preferred_prefix: None,
            terms: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn term(&self, local: &str) -> Option<&TermInfo> {
        self.terms.get(local)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    VocabularyUpdated { namespace: String },
    PrefixLearned { prefix: String, namespace: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    pub offline: bool,
    /// Namespace to the URL or local file actually read for it.
    pub vocab_sources: HashMap<String, String>,
    /// URL template with a `{prefix}` placeholder.
    pub prefix_lookup_url: String,
    /// URL template with a `{namespace}` placeholder.
    pub namespace_lookup_url: String,
}

impl CacheOptions {
    pub fn from_settings(settings: &Settings) -> CacheOptions {
        CacheOptions {
            offline: settings.offline,
            vocab_sources: settings.vocab_sources.clone(),
            prefix_lookup_url: settings.prefix_lookup_url.clone(),
            namespace_lookup_url: settings.namespace_lookup_url.clone(),
        }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions::from_settings(&Settings::default())
    }
}

/// Learned `(prefix, namespace)` pairs in learning order.
#[derive(Debug, Default)]
struct PrefixTable {
    entries: Vec<(String, String)>,
}

impl PrefixTable {
    fn namespace(&self, prefix: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, ns)| ns.as_str())
    }

    fn prefix(&self, namespace: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, ns)| ns == namespace)
            .map(|(p, _)| p.as_str())
    }

    /// Returns whether anything changed.
    fn learn(&mut self, prefix: &str, namespace: &str) -> bool {
        match self.entries.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, ns)) if ns == namespace => false,
            Some((_, ns)) => {
                *ns = namespace.to_string();
                true
            }
            None => {
                self.entries.push((prefix.to_string(), namespace.to_string()));
                true
            }
        }
    }
}

struct LocalVocabulary {
    modified: SystemTime,
    entry: Arc<VocabularyEntry>,
}

struct Inner {
    store: DiskStore,
    fetcher: Arc<dyn Fetcher>,
    options: CacheOptions,
    entries: RwLock<HashMap<String, Arc<VocabularyEntry>>>,
    local: Mutex<HashMap<String, LocalVocabulary>>,
    prefixes: RwLock<PrefixTable>,
    vocab_fetches: InFlight<Option<Arc<VocabularyEntry>>>,
    prefix_lookups: InFlight<Option<String>>,
    namespace_lookups: InFlight<Option<String>>,
    events: broadcast::Sender<CacheEvent>,
}

/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct VocabularyCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for VocabularyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VocabularyCache")
            .field("root", &self.inner.store.root())
            .field("offline", &self.inner.options.offline)
            .finish()
    }
}

impl VocabularyCache {
    pub fn new(
        root: impl Into<PathBuf>,
        fetcher: Arc<dyn Fetcher>,
        options: CacheOptions,
    ) -> VocabularyCache {
        let store = DiskStore::new(root);
        let table = match store.read_prefixes() {
            Ok(entries) => PrefixTable { entries },
            Err(e) => {
                warn!("could not load the prefix table: {e}");
                PrefixTable::default()
            }
        };
        info!(
            root = %store.root().display(),
            prefixes = table.entries.len(),
            offline = options.offline,
            "vocabulary cache ready"
        );

        let (events, _) = broadcast::channel(64);
        VocabularyCache {
            inner: Arc::new(Inner {
                store,
                fetcher,
                options,
                entries: RwLock::new(HashMap::new()),
                local: Mutex::new(HashMap::new()),
                prefixes: RwLock::new(table),
                vocab_fetches: InFlight::new(),
                prefix_lookups: InFlight::new(),
                namespace_lookups: InFlight::new(),
                events,
            }),
        }
    }

    pub fn root(&self) -> &Path {
        self.inner.store.root()
    }

    pub fn is_offline(&self) -> bool {
        self.inner.options.offline
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    fn notify(&self, event: CacheEvent) {
        // no receivers is fine
        let _ = self.inner.events.send(event);
    }

    /// Best-known data for `namespace`, never waiting on the network.
    ///
    /// On a miss this returns an empty entry and starts a background fetch.
    pub fn get(&self, namespace: &str) -> Arc<VocabularyEntry> {
        if let Some(path) = self.local_source(namespace) {
            return self.get_local(namespace, &path);
        }
        if let Some(entry) = self.cached(namespace) {
            return entry;
        }
        if let Some(Some(entry)) = self.inner.vocab_fetches.settled(namespace) {
            return entry;
        }
        self.schedule_fetch(namespace);
        Arc::new(VocabularyEntry::empty(namespace))
    }

    /// Memory, then disk. No network access.
    pub fn cached(&self, namespace: &str) -> Option<Arc<VocabularyEntry>> {
        if let Some(entry) = self.read_entries().get(namespace) {
            debug!(namespace, "vocabulary cache hit");
            return Some(entry.clone());
        }

        match self.inner.store.read(namespace) {
            Ok(Some(entry)) => {
                debug!(namespace, "vocabulary loaded from disk");
                let entry = Arc::new(entry);
                self.write_entries()
                    .insert(namespace.to_string(), entry.clone());
                Some(entry)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("treating as a cache miss: {e}");
                None
            }
        }
    }

    /// Writes `entry` to disk, then makes it visible in memory.
    ///
    /// The memory copy is updated even when the disk write fails.
    pub fn put(
        &self,
        namespace: &str,
        mut entry: VocabularyEntry,
    ) -> Result<Arc<VocabularyEntry>, crate::error::CacheError> {
        entry.namespace = namespace.to_string();
        let written = self.inner.store.write(&entry);
        let entry = Arc::new(entry);
        self.write_entries()
            .insert(namespace.to_string(), entry.clone());
        self.notify(CacheEvent::VocabularyUpdated {
            namespace: namespace.to_string(),
        });
        written.map(|_| entry)
    }

    /// Fetches and stores `namespace`, sharing one request among concurrent callers.
    ///
    /// `None` when the vocabulary is unavailable.
    pub async fn fetch(&self, namespace: &str) -> Option<Arc<VocabularyEntry>> {
        self.inner
            .vocab_fetches
            .run(namespace, || self.fetch_and_store(namespace))
            .await
    }

    async fn fetch_and_store(&self, namespace: &str) -> Option<Arc<VocabularyEntry>> {
        let url = self
            .inner
            .options
            .vocab_sources
            .get(namespace)
            .map(String::as_str)
            .unwrap_or(namespace);

        let document = match self.inner.fetcher.fetch(url).await {
            Ok(document) => document,
            Err(e) => {
                warn!(namespace, "vocabulary unavailable: {e}");
                return None;
            }
        };

        let dialect = dialect_of(&document);
        let mut entry =
            match parse_vocabulary(namespace, &document.body, dialect, Some(&document.url)) {
                Ok(entry) => entry,
                Err(message) => {
                    warn!(namespace, url, "malformed vocabulary: {message}");
                    return None;
                }
            };
        if entry.preferred_prefix.is_none() {
            entry.preferred_prefix = self.prefix_for_namespace(namespace);
        }
        info!(namespace, terms = entry.terms.len(), "fetched vocabulary");

        match self.put(namespace, entry) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("vocabulary kept in memory only: {e}");
                self.read_entries().get(namespace).cloned()
            }
        }
    }

    fn schedule_fetch(&self, namespace: &str) {
        if self.inner.options.offline || self.inner.vocab_fetches.started(namespace) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let cache = self.clone();
        let namespace = namespace.to_string();
        handle.spawn(async move {
            cache.fetch(&namespace).await;
        });
    }

    /// Vocabularies configured as local files are read straight from disk
    /// and re-read whenever the file changes.
    fn local_source(&self, namespace: &str) -> Option<PathBuf> {
        let source = self
            .inner
            .options
            .vocab_sources
            .get(namespace)
            .map(String::as_str)
            .unwrap_or(namespace);
        if source.starts_with("file:") {
            Url::parse(source).ok()?.to_file_path().ok()
        } else if source.starts_with('/') || source.starts_with('~') {
            Some(PathBuf::from(shellexpand::tilde(source).as_ref()))
        } else {
            None
        }
    }

    fn get_local(&self, namespace: &str, path: &Path) -> Arc<VocabularyEntry> {
        let modified = match store::modified(path) {
            Ok(modified) => modified,
            Err(e) => {
                warn!("local vocabulary unavailable: {e}");
                return Arc::new(VocabularyEntry::empty(namespace));
            }
        };

        let mut local = self.inner.local.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(known) = local.get(namespace) {
            if known.modified >= modified {
                return known.entry.clone();
            }
        }

        debug!(namespace, path = %path.display(), "reading local vocabulary");
        let dialect = Dialect::from_path(&path.to_string_lossy()).unwrap_or(Dialect::Turtle);
        let entry = std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| parse_vocabulary(namespace, &text, dialect, None));
        let entry = match entry {
            Ok(entry) => Arc::new(entry),
            Err(message) => {
                warn!(path = %path.display(), "could not read local vocabulary: {message}");
                Arc::new(VocabularyEntry::empty(namespace))
            }
        };
        local.insert(
            namespace.to_string(),
            LocalVocabulary {
                modified,
                entry: entry.clone(),
            },
        );
        drop(local);

        self.notify(CacheEvent::VocabularyUpdated {
            namespace: namespace.to_string(),
        });
        entry
    }

    /// Learned namespace for `prefix`. No network access.
    pub fn namespace_for_prefix(&self, prefix: &str) -> Option<String> {
        self.read_prefixes().namespace(prefix).map(str::to_string)
    }

    /// Preferred prefix for `namespace` from the prefix table or a cached vocabulary.
    pub fn prefix_for_namespace(&self, namespace: &str) -> Option<String> {
        if let Some(prefix) = self.read_prefixes().prefix(namespace) {
            return Some(prefix.to_string());
        }
        self.read_entries()
            .get(namespace)
            .and_then(|entry| entry.preferred_prefix.clone())
    }

    /// The learned prefix table: bindings loaded at start sorted by prefix,
    /// then the ones learned since in learning order.
    pub fn learned_prefixes(&self) -> Vec<(String, String)> {
        self.read_prefixes().entries.clone()
    }

    /// Adds a binding to the prefix table and persists the table.
    pub fn learn_prefix(&self, prefix: &str, namespace: &str) {
        let snapshot = {
            let mut table = self.write_prefixes();
            if !table.learn(prefix, namespace) {
                return;
            }
            table.entries.clone()
        };
        if let Err(e) = self.inner.store.write_prefixes(&snapshot) {
            warn!("prefix table kept in memory only: {e}");
        }
        info!(prefix, namespace, "learned prefix");
        self.notify(CacheEvent::PrefixLearned {
            prefix: prefix.to_string(),
            namespace: namespace.to_string(),
        });
    }

    /// Asks the prefix lookup service for `prefix`, once per process.
    pub async fn lookup_prefix(&self, prefix: &str) -> Option<String> {
        if let Some(namespace) = self.namespace_for_prefix(prefix) {
            return Some(namespace);
        }
        let url = self.inner.options.prefix_lookup_url.replace("{prefix}", prefix);
        self.inner
            .prefix_lookups
            .run(prefix, || async {
                self.learn_from(&url).await;
                self.namespace_for_prefix(prefix)
            })
            .await
    }

    /// Asks the prefix lookup service for a prefix of `namespace`, once per process.
    pub async fn lookup_namespace(&self, namespace: &str) -> Option<String> {
        if let Some(prefix) = self.prefix_for_namespace(namespace) {
            return Some(prefix);
        }
        let url = self
            .inner
            .options
            .namespace_lookup_url
            .replace("{namespace}", &urlencoding::encode(namespace));
        self.inner
            .namespace_lookups
            .run(namespace, || async {
                self.learn_from(&url).await;
                self.prefix_for_namespace(namespace)
            })
            .await
    }

    async fn learn_from(&self, url: &str) {
        match self.inner.fetcher.fetch(url).await {
            Ok(document) => match store::prefix_declarations(&document.body) {
                Ok(declarations) => {
                    for (prefix, namespace) in declarations {
                        self.learn_prefix(&prefix, &namespace);
                    }
                }
                Err(message) => debug!(url, "malformed prefix lookup response: {message}"),
            },
            Err(e) => debug!(url, "prefix lookup failed: {e}"),
        }
    }

    pub fn schedule_prefix_lookup(&self, prefix: &str) {
        if self.inner.options.offline || self.inner.prefix_lookups.started(prefix) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let cache = self.clone();
        let prefix = prefix.to_string();
        handle.spawn(async move {
            cache.lookup_prefix(&prefix).await;
        });
    }

    pub fn schedule_namespace_lookup(&self, namespace: &str) {
        if self.inner.options.offline || self.inner.namespace_lookups.started(namespace) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let cache = self.clone();
        let namespace = namespace.to_string();
        handle.spawn(async move {
            cache.lookup_namespace(&namespace).await;
        });
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Arc<VocabularyEntry>>> {
        self.inner.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<VocabularyEntry>>> {
        self.inner.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_prefixes(&self) -> std::sync::RwLockReadGuard<'_, PrefixTable> {
        self.inner.prefixes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_prefixes(&self) -> std::sync::RwLockWriteGuard<'_, PrefixTable> {
        self.inner.prefixes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Format of a fetched vocabulary. N-Triples and unlabelled text read as Turtle.
fn dialect_of(document: &FetchedDocument) -> Dialect {
    match document.content_type.as_deref() {
        Some("application/ld+json") | Some("application/json") => Dialect::JsonLd,
        Some("application/trig") => Dialect::TriG,
        _ if document.body.trim_start().starts_with(&['{', '['][..]) => Dialect::JsonLd,
        _ => Dialect::Turtle,
    }
}
