//! On-disk layout of the vocabulary cache.
//!
//! ```text
//! <cache root>/
//!   prefixes.ttl                        learned prefix table
//!   http%3A%2F%2Fxmlns.com%2Ffoaf%2F0.1%2F.ttl
//!   ...                                 one Turtle file per namespace
//! ```
//!
//! Files are written to a temporary file in the same directory and renamed
//! into place, so other processes sharing the directory never read a
//! partial entry. Removing a file is enough to forget a namespace.
//!
//! Vocabularies are parsed strictly: unlike editor documents, a fetched or
//! cached vocabulary with a syntax error is rejected as a whole.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use oxrdf::vocab::{rdf, rdfs};
use oxrdf::{
    Graph, IriParseError, Literal, LiteralRef, NamedNode, NamedNodeRef, NamedOrBlankNodeRef, Term,
    TermRef, TripleRef,
};
use oxttl::{TriGParser, TurtleParser, TurtleSerializer};
use tempfile::NamedTempFile;

use super::{TermInfo, TermKind, VocabularyEntry};
use crate::error::CacheError;
use crate::syntax::{self, Dialect, TermValue};

pub const PREFIX_FILE: &str = "prefixes.ttl";

const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";
const VANN_NS: &str = "http://purl.org/vocab/vann/";
const VANN_PREFERRED_PREFIX: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://purl.org/vocab/vann/preferredNamespacePrefix");

const OWL_CLASS: NamedNodeRef<'static> =
    NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#Class");
const OWL_PROPERTIES: [NamedNodeRef<'static>; 3] = [
    NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#ObjectProperty"),
    NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#DatatypeProperty"),
    NamedNodeRef::new_unchecked("http://www.w3.org/2002/07/owl#AnnotationProperty"),
];

const LABELS: [NamedNodeRef<'static>; 2] = [
    rdfs::LABEL,
    NamedNodeRef::new_unchecked("http://www.w3.org/2004/02/skos/core#prefLabel"),
];
const COMMENTS: [NamedNodeRef<'static>; 3] = [
    rdfs::COMMENT,
    NamedNodeRef::new_unchecked("http://www.w3.org/2004/02/skos/core#definition"),
    NamedNodeRef::new_unchecked("http://purl.org/dc/terms/description"),
];

#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> DiskStore {
        DiskStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, namespace: &str) -> PathBuf {
        self.root
            .join(format!("{}.ttl", urlencoding::encode(namespace)))
    }

    /// `Ok(None)` when the namespace has no (or an empty) cache file.
    pub fn read(&self, namespace: &str) -> Result<Option<VocabularyEntry>, CacheError> {
        let path = self.path_for(namespace);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        if text.trim().is_empty() {
            return Ok(None);
        }
        parse_vocabulary(namespace, &text, Dialect::Turtle, None)
            .map(Some)
            .map_err(|message| CacheError::Parse { path, message })
    }

    pub fn write(&self, entry: &VocabularyEntry) -> Result<(), CacheError> {
        let path = self.path_for(&entry.namespace);
        let text = render_turtle(entry).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        write_atomic(&path, &text)
    }

    pub fn read_prefixes(&self) -> Result<Vec<(String, String)>, CacheError> {
        let path = self.root.join(PREFIX_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(CacheError::Io { path, source }),
        };
        prefix_declarations(&text).map_err(|message| CacheError::Parse { path, message })
    }

    /// One `PREFIX` line per binding. Namespaces that are not valid IRIs are skipped.
    pub fn write_prefixes(&self, table: &[(String, String)]) -> Result<(), CacheError> {
        let mut text = String::new();
        for (prefix, namespace) in table {
            if NamedNode::new(namespace.as_str()).is_err() {
                continue;
            }
            let _ = writeln!(text, "PREFIX {prefix}: <{namespace}>");
        }
        write_atomic(&self.root.join(PREFIX_FILE), &text)
    }
}

pub fn write_atomic(path: &Path, contents: &str) -> Result<(), CacheError> {
    let io_error = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(io_error)?;

    let mut file = NamedTempFile::new_in(dir).map_err(io_error)?;
    file.write_all(contents.as_bytes()).map_err(io_error)?;
    file.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}

pub fn modified(path: &Path) -> Result<SystemTime, CacheError> {
    std::fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// `(prefix, namespace)` pairs declared in a Turtle text, sorted by prefix.
pub fn prefix_declarations(text: &str) -> Result<Vec<(String, String)>, String> {
    let mut parser = TurtleParser::new().for_reader(text.as_bytes());
    for result in parser.by_ref() {
        result.map_err(|e| e.to_string())?;
    }
    let mut declarations: Vec<(String, String)> = parser
        .prefixes()
        .filter(|(_, namespace)| !namespace.is_empty())
        .map(|(prefix, namespace)| (prefix.to_string(), namespace.to_string()))
        .collect();
    declarations.sort();
    Ok(declarations)
}

/// Extracts the terms of `namespace` from an RDF text.
///
/// Only subjects with at least one `rdf:type` count as terms. Parsing stops
/// at the first syntax error, so a malformed text never yields a partial
/// entry. Relative IRIs resolve against `base`, usually the URL the text was
/// fetched from.
pub fn parse_vocabulary(
    namespace: &str,
    text: &str,
    dialect: Dialect,
    base: Option<&str>,
) -> Result<VocabularyEntry, String> {
    let graph = read_graph(text, dialect, base)?;
    Ok(describe(namespace, &graph))
}

fn read_graph(text: &str, dialect: Dialect, base: Option<&str>) -> Result<Graph, String> {
    let mut graph = Graph::new();
    match dialect {
        Dialect::Turtle => {
            let mut parser = TurtleParser::new();
            if let Some(base) = base {
                parser = parser.with_base_iri(base).map_err(|e| e.to_string())?;
            }
            for result in parser.for_reader(text.as_bytes()) {
                let triple = result.map_err(|e| e.to_string())?;
                graph.insert(&triple);
            }
        }
        Dialect::TriG => {
            let mut parser = TriGParser::new();
            if let Some(base) = base {
                parser = parser.with_base_iri(base).map_err(|e| e.to_string())?;
            }
            for result in parser.for_reader(text.as_bytes()) {
                let quad = result.map_err(|e| e.to_string())?;
                graph.insert(TripleRef::new(
                    quad.subject.as_ref(),
                    quad.predicate.as_ref(),
                    quad.object.as_ref(),
                ));
            }
        }
        Dialect::JsonLd => read_jsonld(text, base, &mut graph)?,
    }
    Ok(graph)
}

/// JSON-LD goes through the document reader, rejecting any syntax error.
fn read_jsonld(text: &str, base: Option<&str>, graph: &mut Graph) -> Result<(), String> {
    let parsed = syntax::parse(text, Dialect::JsonLd);
    if let Some(error) = parsed.errors.first() {
        return Err(error.message.clone());
    }

    let node = |term: &syntax::Term| {
        let iri = syntax::expand_ref(&parsed, term.iri_ref()?, term.span.start, base)?;
        NamedNode::new(iri).ok()
    };
    for statement in &parsed.statements {
        let (Some(subject), Some(predicate)) = (node(&statement.subject), node(&statement.predicate))
        else {
            continue;
        };
        let object: Option<Term> = match &statement.object.value {
            TermValue::Iri(_) => node(&statement.object).map(Term::from),
            TermValue::Literal {
                value,
                language: Some(language),
                ..
            } => Literal::new_language_tagged_literal(value.as_str(), language.as_str())
                .ok()
                .map(Term::from),
            TermValue::Literal {
                value,
                datatype: Some(datatype),
                ..
            } => node(datatype.as_ref())
                .map(|datatype| Literal::new_typed_literal(value.as_str(), datatype).into()),
            TermValue::Literal { value, .. } => {
                Some(Literal::new_simple_literal(value.as_str()).into())
            }
            TermValue::BlankNode(_) => None,
        };
        if let Some(object) = object {
            graph.insert(TripleRef::new(
                subject.as_ref(),
                predicate.as_ref(),
                object.as_ref(),
            ));
        }
    }
    Ok(())
}

#[derive(Default)]
struct Description<'a> {
    types: Vec<NamedNodeRef<'a>>,
    labels: Vec<(Option<&'a str>, &'a str)>,
    comments: Vec<(Option<&'a str>, &'a str)>,
}

fn describe(namespace: &str, graph: &Graph) -> VocabularyEntry {
    let mut entry = VocabularyEntry::empty(namespace);
    let mut descriptions: HashMap<&str, Description<'_>> = HashMap::new();

    for triple in graph.iter() {
        let NamedOrBlankNodeRef::NamedNode(subject) = triple.subject else {
            continue;
        };
        if triple.predicate == VANN_PREFERRED_PREFIX && same_namespace(subject.as_str(), namespace) {
            if let TermRef::Literal(prefix) = triple.object {
                entry.preferred_prefix = Some(prefix.value().to_string());
            }
            continue;
        }

        let description = descriptions.entry(subject.as_str()).or_default();
        match triple.object {
            TermRef::NamedNode(class) if triple.predicate == rdf::TYPE => {
                description.types.push(class);
            }
            TermRef::Literal(literal) if LABELS.iter().any(|p| *p == triple.predicate) => {
                description.labels.push((literal.language(), literal.value()));
            }
            TermRef::Literal(literal) if COMMENTS.iter().any(|p| *p == triple.predicate) => {
                description.comments.push((literal.language(), literal.value()));
            }
            _ => {}
        }
    }

    for (iri, description) in descriptions {
        let (term_namespace, local) = syntax::split_iri(iri);
        if term_namespace != namespace || local.is_empty() || description.types.is_empty() {
            continue;
        }
        entry.terms.insert(
            local.to_string(),
            TermInfo {
                kind: TermKind::from_types(&description.types),
                label: preferred_language(&description.labels),
                comment: preferred_language(&description.comments),
            },
        );
    }
    entry
}

/// The vocabulary IRI itself is often written without its trailing `#` or `/`.
fn same_namespace(subject: &str, namespace: &str) -> bool {
    subject == namespace || subject == namespace.trim_end_matches(&['#', '/'][..])
}

/// English first, then untagged, then whatever comes first.
fn preferred_language(values: &[(Option<&str>, &str)]) -> Option<String> {
    let tagged = |wanted: Option<&str>| {
        values.iter().find(|(language, _)| match (language, wanted) {
            (Some(language), Some(wanted)) => language.eq_ignore_ascii_case(wanted),
            (None, None) => true,
            _ => false,
        })
    };
    tagged(Some("en"))
        .or_else(|| tagged(None))
        .or_else(|| values.first())
        .map(|(_, value)| value.to_string())
}

impl TermKind {
    fn from_types(types: &[NamedNodeRef<'_>]) -> TermKind {
        let is_class = |t: &NamedNodeRef<'_>| *t == rdfs::CLASS || *t == rdfs::DATATYPE || *t == OWL_CLASS;
        let is_property =
            |t: &NamedNodeRef<'_>| *t == rdf::PROPERTY || OWL_PROPERTIES.iter().any(|p| p == t);
        if types.iter().any(is_class) {
            TermKind::Class
        } else if types.iter().any(is_property) {
            TermKind::Property
        } else {
            TermKind::Other
        }
    }

    fn type_iri(&self) -> NamedNodeRef<'static> {
        match self {
            TermKind::Class => rdfs::CLASS,
            TermKind::Property => rdf::PROPERTY,
            TermKind::Other => rdfs::RESOURCE,
        }
    }
}

/// Serializes an entry as Turtle, readable by [`parse_vocabulary`].
///
/// Terms whose IRI would not be valid are left out.
pub fn render_turtle(entry: &VocabularyEntry) -> io::Result<String> {
    let invalid = |e: IriParseError| io::Error::new(io::ErrorKind::InvalidInput, e);
    let mut writer = TurtleSerializer::new()
        .with_prefix("rdfs", RDFS_NS)
        .map_err(invalid)?
        .with_prefix("vann", VANN_NS)
        .map_err(invalid)?
        .for_writer(Vec::new());

    if let (Some(prefix), Ok(vocabulary)) = (
        &entry.preferred_prefix,
        NamedNode::new(entry.namespace.as_str()),
    ) {
        writer.serialize_triple(TripleRef::new(
            vocabulary.as_ref(),
            VANN_PREFERRED_PREFIX,
            LiteralRef::new_simple_literal(prefix),
        ))?;
    }

    for (local, info) in &entry.terms {
        let Ok(node) = NamedNode::new(format!("{}{local}", entry.namespace)) else {
            continue;
        };
        let term = node.as_ref();
        writer.serialize_triple(TripleRef::new(term, rdf::TYPE, info.kind.type_iri()))?;
        if let Some(label) = &info.label {
            writer.serialize_triple(TripleRef::new(
                term,
                rdfs::LABEL,
                LiteralRef::new_simple_literal(label),
            ))?;
        }
        if let Some(comment) = &info.comment {
            writer.serialize_triple(TripleRef::new(
                term,
                rdfs::COMMENT,
                LiteralRef::new_simple_literal(comment),
            ))?;
        }
    }

    String::from_utf8(writer.finish()?).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
