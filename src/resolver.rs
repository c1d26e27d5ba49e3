//! Short name and IRI resolution.
//!
//! Local declarations always win. After those come the well-known bindings,
//! then whatever the vocabulary cache has learned. A prefix nobody knows is
//! looked up in the background so a later query can find it.

use itertools::Itertools;
use tower_lsp::lsp_types::Url;
use tracing::debug;

use crate::document::Document;
use crate::syntax::{self, BindingKind, IriRef, PrefixDecl};
use crate::vocab::{well_known, VocabularyCache};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<'d> {
    /// Declared in the document at the queried offset.
    Local(&'d PrefixDecl),
    WellKnown(&'static str),
    /// From the learned prefix table.
    Cached(String),
    Unresolved,
}

impl Resolution<'_> {
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Resolution::Local(decl) => Some(&decl.namespace),
            Resolution::WellKnown(ns) => Some(ns),
            Resolution::Cached(ns) => Some(ns),
            Resolution::Unresolved => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Resolution::Local(_))
    }
}

#[derive(Debug, Clone)]
pub struct PrefixResolver {
    cache: VocabularyCache,
}

impl PrefixResolver {
    pub fn new(cache: VocabularyCache) -> PrefixResolver {
        PrefixResolver { cache }
    }

    pub fn cache(&self) -> &VocabularyCache {
        &self.cache
    }

    pub fn resolve_short_name<'d>(
        &self,
        document: &'d Document,
        offset: usize,
        short_name: &str,
    ) -> Resolution<'d> {
        if let Some(decl) = local_prefix(document, offset, short_name) {
            return Resolution::Local(decl);
        }
        match self.suggest_namespace(short_name) {
            Some(resolution) => resolution,
            None => {
                debug!(prefix = short_name, "unresolved prefix, scheduling lookup");
                self.cache.schedule_prefix_lookup(short_name);
                Resolution::Unresolved
            }
        }
    }

    /// A namespace for `prefix` from outside the document, without network access.
    pub fn suggest_namespace(&self, prefix: &str) -> Option<Resolution<'static>> {
        if prefix.is_empty() {
            return None;
        }
        if let Some(ns) = well_known::namespace(prefix) {
            return Some(Resolution::WellKnown(ns));
        }
        self.cache.namespace_for_prefix(prefix).map(Resolution::Cached)
    }

    /// The full IRI `iri_ref` denotes at `offset`.
    pub fn expand(&self, document: &Document, offset: usize, iri_ref: &IriRef) -> Option<String> {
        document.expand(iri_ref, offset)
    }

    /// A prefix to declare `namespace` with.
    pub fn suggest_short_name(&self, namespace: &str) -> String {
        if let Some(prefix) = self.cache.prefix_for_namespace(namespace) {
            return prefix;
        }
        if let Some(prefix) = well_known::prefix(namespace) {
            return prefix.to_string();
        }
        self.cache.schedule_namespace_lookup(namespace);
        short_name_from_iri(namespace)
    }

    /// Well-known bindings followed by learned ones, one per prefix.
    pub fn known_prefixes(&self) -> Vec<(String, String)> {
        well_known::WELL_KNOWN
            .iter()
            .map(|(prefix, ns)| (prefix.to_string(), ns.to_string()))
            .chain(self.cache.learned_prefixes())
            .unique_by(|(prefix, _)| prefix.clone())
            .collect()
    }

    /// `prefix:local` for `iri` using the bindings active at `offset`, else known prefixes.
    pub fn compact(&self, document: &Document, offset: usize, iri: &str) -> Option<String> {
        let local = document
            .prefix_bindings_at(offset)
            .into_iter()
            .filter(|decl| decl.is_prefix() && iri.starts_with(decl.namespace.as_str()))
            .max_by_key(|decl| decl.namespace.len())
            .map(|decl| (decl.label.clone(), &iri[decl.namespace.len()..]));
        if let Some((prefix, rest)) = local {
            return Some(format!("{prefix}:{rest}"));
        }

        let (namespace, rest) = syntax::split_iri(iri);
        let prefix = self
            .cache
            .prefix_for_namespace(namespace)
            .or_else(|| well_known::prefix(namespace).map(str::to_string))?;
        Some(format!("{prefix}:{rest}"))
    }
}

/// A binding usable as a prefix; JSON-LD `@vocab` is not one.
pub fn local_prefix<'d>(document: &'d Document, offset: usize, label: &str) -> Option<&'d PrefixDecl> {
    document
        .prefix_bindings_at(offset)
        .into_iter()
        .find(|decl| decl.label == label && !matches!(decl.kind, BindingKind::Vocab))
}

/// Last path segment (or first host label) reduced to lower-case alphanumerics.
fn short_name_from_iri(namespace: &str) -> String {
    let candidate = Url::parse(namespace).ok().and_then(|url| {
        let segment = url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last().map(str::to_string));
        segment.or_else(|| {
            url.host_str()?
                .split('.')
                .find(|label| *label != "www")
                .map(str::to_string)
        })
    });

    let name: String = candidate
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        "ns".to_string()
    } else {
        name
    }
}
