//! End-to-end checks of the analyses through the public API.
//!
//! Every test here runs with a fetcher that fails the test on any network
//! access, so results depend only on the document and the cache contents.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tower_lsp::lsp_types::Url;

use ldls::completion::{complete, CandidateKind};
use ldls::config::Settings;
use ldls::diagnostics::diagnose;
use ldls::document::{DocumentStore, TextEdit};
use ldls::error::{FetchError, ModelError};
use ldls::gotodef::definition;
use ldls::hover::hover_info;
use ldls::resolver::PrefixResolver;
use ldls::syntax::{Dialect, SourceSpan};
use ldls::vocab::{
    CacheOptions, FetchedDocument, Fetcher, TermInfo, TermKind, VocabularyCache, VocabularyEntry,
};

const FOAF: &str = "@prefix foaf: <http://xmlns.com/foaf/0.1/> .\n<#me> foaf:name \"A\" .";
const FOAF_NS: &str = "http://xmlns.com/foaf/0.1/";

struct ForbiddenFetcher;

#[async_trait]
impl Fetcher for ForbiddenFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        panic!("unexpected fetch of {url}");
    }
}

/// Helper: a resolver over an empty cache in a temporary directory.
///
/// Keep the TempDir alive for the test duration.
fn offline_resolver() -> (TempDir, PrefixResolver) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let cache = VocabularyCache::new(
        dir.path(),
        Arc::new(ForbiddenFetcher),
        CacheOptions::default(),
    );
    (dir, PrefixResolver::new(cache))
}

fn open(store: &mut DocumentStore, name: &str, text: &str, dialect: Dialect) -> Url {
    let uri = Url::parse(&format!("file:///workspace/{name}")).unwrap();
    store.open(uri.clone(), text.to_string(), 1, dialect);
    uri
}

fn foaf_name_entry() -> VocabularyEntry {
    let mut entry = VocabularyEntry::empty(FOAF_NS);
    entry.preferred_prefix = Some("foaf".to_string());
    entry.terms.insert(
        "name".to_string(),
        TermInfo {
            kind: TermKind::Property,
            label: Some("name".to_string()),
            comment: Some("A name for some thing.".to_string()),
        },
    );
    entry
}

#[test]
fn valid_documents_have_no_findings() {
    let (_dir, resolver) = offline_resolver();
    let settings = Settings::default();
    let mut store = DocumentStore::new();

    let documents = [
        (
            "a.ttl",
            "@prefix ex: <http://example.org/> .\n@base <http://example.org/base/> .\nex:a a ex:C ;\n    ex:p [ ex:q \"x\"@en ], ( 1 2.5 true ) ;\n    ex:r <rel> .\n",
            Dialect::Turtle,
        ),
        (
            "a.trig",
            "PREFIX ex: <http://example.org/>\nex:g { ex:a ex:b ex:c . }\n{ ex:d ex:e \"f\"^^ex:T . }\n",
            Dialect::TriG,
        ),
        (
            "a.jsonld",
            r#"{"@context": {"foaf": "http://xmlns.com/foaf/0.1/", "name": "foaf:name"}, "@id": "http://example.org/me", "name": "A", "foaf:age": 3}"#,
            Dialect::JsonLd,
        ),
        (
            "b.jsonld",
            r#"{"@context": {"@vocab": "http://schema.org/"}, "@id": "did:example:123", "@type": "isbn:0451450523", "name": "B"}"#,
            Dialect::JsonLd,
        ),
    ];

    for (name, text, dialect) in documents {
        let uri = open(&mut store, name, text, dialect);
        let document = store.get(&uri).unwrap();
        assert!(document.errors_snapshot().is_empty(), "{name}: {:?}", document.errors_snapshot());
        assert_eq!(diagnose(document, &resolver, &settings), vec![], "{name}");
    }
}

/// Test: every construct found at an offset contains that offset
#[test]
fn lookup_returns_constructs_containing_the_offset() {
    let mut store = DocumentStore::new();
    let texts = [
        (FOAF, Dialect::Turtle),
        (
            "@prefix ex: <http://example.org/> .\nex:s ex:p [ ex:q ( ex:a ex:b ) ] ; ex:r \"lit\"^^ex:T .",
            Dialect::Turtle,
        ),
        (
            r#"{"@context": {"@vocab": "http://example.org/"}, "@id": "s", "p": {"q": ["a", "b"]}}"#,
            Dialect::JsonLd,
        ),
    ];

    for (i, (text, dialect)) in texts.into_iter().enumerate() {
        let uri = open(&mut store, &format!("doc{i}"), text, dialect);
        let document = store.get(&uri).unwrap();
        for offset in 0..text.len() {
            let Some(construct) = document.lookup(offset) else {
                panic!("no construct at {offset} in {text:?}");
            };
            assert!(construct.span.contains(offset), "{construct:?} at {offset}");
            assert_eq!(document.index().span_of(construct.id), Ok(construct.span));
        }
        assert!(document.lookup(text.len()).is_none());
    }
}

#[test]
fn stale_edits_change_nothing() {
    let mut store = DocumentStore::new();
    let uri = open(&mut store, "a.ttl", FOAF, Dialect::Turtle);
    store
        .apply_change(&uri, format!("{FOAF}\n<#you> foaf:name \"B\" ."), 3)
        .unwrap();
    let before = store.get(&uri).unwrap().text().to_string();

    let stale = store.apply_change(&uri, String::new(), 2);
    assert!(matches!(
        stale,
        Err(ModelError::StaleVersion {
            current: 3,
            received: 2,
            ..
        })
    ));
    let replayed = store.apply_edits(
        &uri,
        3,
        &[TextEdit {
            range: None,
            text: String::new(),
        }],
    );
    assert!(matches!(replayed, Err(ModelError::StaleVersion { .. })));

    let document = store.get(&uri).unwrap();
    assert_eq!(document.text(), before);
    assert_eq!(document.version(), 3);
    assert_eq!(document.statements().len(), 2);
}

#[test]
fn unknown_documents_are_not_found() {
    let mut store = DocumentStore::new();
    let uri = Url::parse("file:///workspace/missing.ttl").unwrap();
    assert_eq!(store.get(&uri).err(), Some(ModelError::NotFound(uri.clone())));
    assert!(store.apply_change(&uri, String::new(), 2).is_err());
    assert!(store.close(&uri).is_err());
}

/// Test: the local prefix is offered before any suggested prefix
#[test]
fn completion_lists_local_prefix_first() {
    let (_dir, resolver) = offline_resolver();
    let settings = Settings::default();
    let mut store = DocumentStore::new();

    for text in [
        "@prefix ex: <http://example.org/> .\nex:",
        "@prefix ex: <http://example.org/> .\n",
    ] {
        let uri = open(&mut store, "a.ttl", text, Dialect::Turtle);
        let document = store.get(&uri).unwrap();
        let candidates = complete(document, text.len(), &resolver, &settings);

        assert_eq!(candidates[0].label, "ex:");
        assert_eq!(candidates[0].kind, CandidateKind::LocalPrefix);
        let first_suggestion = candidates
            .iter()
            .position(|c| c.kind == CandidateKind::SuggestedPrefix)
            .unwrap_or(candidates.len());
        assert!(first_suggestion > 0);
        assert!(candidates[first_suggestion..]
            .iter()
            .all(|c| c.kind != CandidateKind::LocalPrefix));
    }
}

#[tokio::test]
async fn hover_uses_cached_label_without_network() {
    const EX: &str = "http://example.org/";
    let (_dir, resolver) = offline_resolver();
    let mut entry = VocabularyEntry::empty(EX);
    entry.terms.insert(
        "knows".to_string(),
        TermInfo {
            kind: TermKind::Property,
            label: Some("knows".to_string()),
            comment: Some("A person known by this person.".to_string()),
        },
    );
    resolver.cache().put(EX, entry).unwrap();

    let text = "@prefix ex: <http://example.org/> .\nex:alice ex:knows ex:bob .";
    let mut store = DocumentStore::new();
    let uri = open(&mut store, "a.ttl", text, Dialect::Turtle);
    let document = store.get(&uri).unwrap();

    let info = hover_info(document, text.find("ex:knows").unwrap() + 4, &resolver).unwrap();
    assert!(info.markdown.contains("**knows**"));
    assert!(info.markdown.contains("A person known by this person."));
    assert_eq!(info.span.slice(text), "ex:knows");

    resolver.cache().put(FOAF_NS, foaf_name_entry()).unwrap();
    let uri = open(&mut store, "me.ttl", FOAF, Dialect::Turtle);
    let document = store.get(&uri).unwrap();
    let info = hover_info(document, FOAF.find("foaf:name").unwrap(), &resolver).unwrap();
    assert!(info.markdown.starts_with("`foaf:name` · Property"));
}

#[test]
fn foaf_scenario() {
    let (_dir, resolver) = offline_resolver();
    let mut store = DocumentStore::new();
    let uri = open(&mut store, "me.ttl", FOAF, Dialect::Turtle);
    let document = store.get(&uri).unwrap();
    let name = FOAF.find("foaf:name").unwrap();

    assert_eq!(diagnose(document, &resolver, &Settings::default()), vec![]);

    let info = hover_info(document, name, &resolver).unwrap();
    assert!(info.markdown.contains("foaf:name"));

    assert_eq!(definition(document, name), Some(SourceSpan::new(0, 44)));
}

#[test]
fn undeclared_prefix_is_reported_with_a_suggestion() {
    let (_dir, resolver) = offline_resolver();
    let mut store = DocumentStore::new();
    let text = "<#me> foaf:name \"A\" .";
    let uri = open(&mut store, "a.ttl", text, Dialect::Turtle);

    let findings = diagnose(store.get(&uri).unwrap(), &resolver, &Settings::default());
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].span.slice(text), "foaf:name");
    assert!(findings[0].message.starts_with("Undeclared prefix 'foaf'"));
    assert!(findings[0].message.contains(FOAF_NS));
}
