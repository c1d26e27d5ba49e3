//! Parser capability for the supported RDF syntaxes.
//!
//! Every dialect is parsed into the same [`ParseOutput`]: statements with a
//! source span per term, the prefix and base declarations that were seen,
//! and the syntax errors that were recovered from. The parsers are lenient
//! editor parsers: an error in one statement never discards the statements
//! parsed before it.
//!
//! | Dialect | Implementation |
//! |---------|----------------|
//! | Turtle  | [`turtle::TurtleParser`] |
//! | TriG    | [`turtle::TurtleParser`] with graph blocks enabled |
//! | JSON-LD | [`jsonld::JsonLdParser`] |

mod json;
mod jsonld;
mod lexer;
mod slot;
mod turtle;

pub use jsonld::JsonLdParser;
pub use slot::{slot_at, Slot};
pub use turtle::TurtleParser;

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::Url;

pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// The concrete syntax of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Turtle,
    TriG,
    JsonLd,
}

impl Dialect {
    /// Maps an LSP language identifier to a dialect.
    pub fn from_language_id(language_id: &str) -> Option<Dialect> {
        match language_id.to_ascii_lowercase().as_str() {
            "turtle" | "ttl" => Some(Dialect::Turtle),
            "trig" => Some(Dialect::TriG),
            "jsonld" | "json-ld" => Some(Dialect::JsonLd),
            _ => None,
        }
    }

    /// Guesses the dialect from a file name or URI path.
    pub fn from_path(path: &str) -> Option<Dialect> {
        let extension = path.rsplit_once('.')?.1.to_ascii_lowercase();
        match extension.as_str() {
            "ttl" | "turtle" => Some(Dialect::Turtle),
            "trig" => Some(Dialect::TriG),
            "jsonld" => Some(Dialect::JsonLd),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Turtle => "turtle",
            Dialect::TriG => "trig",
            Dialect::JsonLd => "jsonld",
        }
    }

    /// Keywords offered by completion after names and prefixes.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Dialect::Turtle => &["a", "@prefix", "@base", "PREFIX", "BASE"],
            Dialect::TriG => &["a", "@prefix", "@base", "PREFIX", "BASE", "GRAPH"],
            Dialect::JsonLd => &[
                "@context",
                "@vocab",
                "@base",
                "@id",
                "@type",
                "@language",
                "@container",
                "@list",
                "@set",
                "@index",
                "@graph",
                "@value",
            ],
        }
    }
}

/// Half-open byte range `[start, end)` in the current text of a document.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn new(start: usize, end: usize) -> SourceSpan {
        SourceSpan {
            start,
            end: end.max(start),
        }
    }

    pub fn empty(at: usize) -> SourceSpan {
        SourceSpan { start: at, end: at }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    pub fn contains_span(&self, other: &SourceSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn overlaps(&self, other: &SourceSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Smallest span covering both.
    pub fn hull(&self, other: &SourceSpan) -> SourceSpan {
        SourceSpan {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn slice<'t>(&self, text: &'t str) -> &'t str {
        text.get(self.start..self.end).unwrap_or("")
    }
}

/// How an IRI was written in the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IriRef {
    /// `<http://...>` in Turtle, or an absolute/relative IRI string in JSON-LD.
    Full(String),
    /// `prefix:local`
    Prefixed { prefix: String, local: String },
    /// A bare JSON-LD term, expanded through the active context.
    Vocab(String),
    /// Turtle `a` or the JSON-LD `@type` key.
    RdfType,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermValue {
    Iri(IriRef),
    BlankNode(String),
    Literal {
        value: String,
        language: Option<String>,
        datatype: Option<Box<Term>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Term {
    pub value: TermValue,
    pub span: SourceSpan,
}

impl Term {
    pub fn iri(iri_ref: IriRef, span: SourceSpan) -> Term {
        Term {
            value: TermValue::Iri(iri_ref),
            span,
        }
    }

    pub fn blank(label: impl Into<String>, span: SourceSpan) -> Term {
        Term {
            value: TermValue::BlankNode(label.into()),
            span,
        }
    }

    pub fn literal(value: impl Into<String>, span: SourceSpan) -> Term {
        Term {
            value: TermValue::Literal {
                value: value.into(),
                language: None,
                datatype: None,
            },
            span,
        }
    }

    pub fn iri_ref(&self) -> Option<&IriRef> {
        match &self.value {
            TermValue::Iri(iri_ref) => Some(iri_ref),
            _ => None,
        }
    }

    pub fn datatype(&self) -> Option<&Term> {
        match &self.value {
            TermValue::Literal { datatype, .. } => datatype.as_deref(),
            _ => None,
        }
    }
}

/// Position of a term inside its statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TermPosition {
    Subject,
    Predicate,
    Object,
}

/// One parsed triple (or quad, when `graph` is set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    /// Index into [`ParseOutput::graphs`].
    pub graph: Option<usize>,
    pub span: SourceSpan,
}

impl Statement {
    pub fn new(subject: Term, predicate: Term, object: Term, graph: Option<usize>) -> Statement {
        let span = subject.span.hull(&predicate.span).hull(&object.span);
        Statement {
            subject,
            predicate,
            object,
            graph,
            span,
        }
    }

    pub fn term(&self, position: TermPosition) -> &Term {
        match position {
            TermPosition::Subject => &self.subject,
            TermPosition::Predicate => &self.predicate,
            TermPosition::Object => &self.object,
        }
    }

    pub fn terms(&self) -> [(TermPosition, &Term); 3] {
        [
            (TermPosition::Subject, &self.subject),
            (TermPosition::Predicate, &self.predicate),
            (TermPosition::Object, &self.object),
        ]
    }
}

/// Where a declaration is in effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingScope {
    /// Turtle and TriG: everything after the declaration starts.
    FromOffset(usize),
    /// JSON-LD: the whole object holding the context, including nested objects.
    Within(SourceSpan),
}

impl BindingScope {
    pub fn applies_at(&self, offset: usize) -> bool {
        match self {
            BindingScope::FromOffset(start) => *start <= offset,
            BindingScope::Within(span) => span.contains(offset),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingKind {
    Prefix,
    /// JSON-LD `@vocab`; the label is empty.
    Vocab,
    /// A JSON-LD term definition, optionally coercing string values (`@id`, `@vocab`, a datatype).
    Term { type_coercion: Option<String> },
}

/// A prefix declaration or JSON-LD context entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrefixDecl {
    pub label: String,
    pub namespace: String,
    pub kind: BindingKind,
    /// The whole declaration, e.g. `@prefix ex: <http://example.org/> .`
    pub span: SourceSpan,
    pub label_span: SourceSpan,
    pub namespace_span: SourceSpan,
    pub scope: BindingScope,
}

impl PrefixDecl {
    pub fn is_prefix(&self) -> bool {
        matches!(self.kind, BindingKind::Prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BaseDecl {
    pub iri: String,
    pub span: SourceSpan,
    pub scope: BindingScope,
}

/// A TriG graph block or a JSON-LD `@graph` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphBlock {
    pub label: Option<Term>,
    pub span: SourceSpan,
}

/// A JSON-LD context given by reference, e.g. `"@context": "https://schema.org/"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteContext {
    pub iri: String,
    pub span: SourceSpan,
    pub scope: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    pub span: SourceSpan,
    pub message: String,
}

impl SyntaxError {
    pub fn new(span: SourceSpan, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            span,
            message: message.into(),
        }
    }
}

/// Everything a parser reports about one text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutput {
    pub statements: Vec<Statement>,
    pub prefixes: Vec<PrefixDecl>,
    pub bases: Vec<BaseDecl>,
    pub graphs: Vec<GraphBlock>,
    /// Terms that are not part of a statement, such as collection members.
    pub members: Vec<Term>,
    pub remote_contexts: Vec<RemoteContext>,
    pub errors: Vec<SyntaxError>,
}

/// The parser capability consumed by the document model.
pub trait RdfParser: Send + Sync {
    fn parse(&self, text: &str) -> ParseOutput;
}

static TURTLE: TurtleParser = TurtleParser { trig: false };
static TRIG: TurtleParser = TurtleParser { trig: true };
static JSONLD: JsonLdParser = JsonLdParser;

pub fn parser_for(dialect: Dialect) -> &'static dyn RdfParser {
    match dialect {
        Dialect::Turtle => &TURTLE,
        Dialect::TriG => &TRIG,
        Dialect::JsonLd => &JSONLD,
    }
}

pub fn parse(text: &str, dialect: Dialect) -> ParseOutput {
    parser_for(dialect).parse(text)
}

/// The binding for `label` in effect at `offset`.
///
/// Turtle declarations shadow earlier ones with the same label. JSON-LD
/// bindings from the innermost enclosing context win.
pub fn active_binding<'a>(
    prefixes: &'a [PrefixDecl],
    label: &str,
    offset: usize,
) -> Option<&'a PrefixDecl> {
    active_bindings(prefixes, offset)
        .into_iter()
        .find(|decl| decl.label == label)
}

/// All bindings in effect at `offset`, one per label, in declaration order.
pub fn active_bindings(prefixes: &[PrefixDecl], offset: usize) -> Vec<&PrefixDecl> {
    let mut winners: Vec<&PrefixDecl> = Vec::new();
    for decl in prefixes.iter().filter(|decl| decl.scope.applies_at(offset)) {
        match winners.iter().position(|w| w.label == decl.label) {
            Some(i) if shadows(decl, winners[i]) => winners[i] = decl,
            Some(_) => {}
            None => winners.push(decl),
        }
    }
    winners
}

fn shadows(candidate: &PrefixDecl, current: &PrefixDecl) -> bool {
    match (candidate.scope, current.scope) {
        (BindingScope::Within(inner), BindingScope::Within(outer)) => {
            inner.len() < outer.len() || (inner == outer && candidate.span.start > current.span.start)
        }
        _ => candidate.span.start > current.span.start,
    }
}

/// The base declaration in effect at `offset`; the innermost JSON-LD one wins.
pub fn active_base(bases: &[BaseDecl], offset: usize) -> Option<&BaseDecl> {
    bases
        .iter()
        .filter(|base| base.scope.applies_at(offset))
        .reduce(|current, candidate| match (candidate.scope, current.scope) {
            (BindingScope::Within(inner), BindingScope::Within(outer))
                if inner.len() > outer.len() =>
            {
                current
            }
            _ => candidate,
        })
}

/// Expands a reference written at `offset` to a full IRI.
///
/// Relative IRIs are joined with the base in effect, else `fallback_base`.
/// Returns `None` when a prefix or JSON-LD term has no binding.
pub fn expand_ref(
    parsed: &ParseOutput,
    iri_ref: &IriRef,
    offset: usize,
    fallback_base: Option<&str>,
) -> Option<String> {
    match iri_ref {
        IriRef::RdfType => Some(RDF_TYPE.to_string()),
        IriRef::Full(iri) => {
            if is_absolute_iri(iri) {
                return Some(iri.clone());
            }
            let base = active_base(&parsed.bases, offset)
                .map(|base| base.iri.as_str())
                .or(fallback_base);
            Some(base.and_then(|base| join_iri(base, iri)).unwrap_or_else(|| iri.clone()))
        }
        IriRef::Prefixed { prefix, local } => {
            let decl = active_binding(&parsed.prefixes, prefix, offset)?;
            if matches!(decl.kind, BindingKind::Vocab) {
                return None;
            }
            Some(format!("{}{}", namespace_iri(parsed, decl, offset), local))
        }
        IriRef::Vocab(term) => {
            if let Some(decl) = active_binding(&parsed.prefixes, term, offset) {
                if !matches!(decl.kind, BindingKind::Vocab) {
                    return Some(namespace_iri(parsed, decl, offset));
                }
            }
            let vocab = active_binding(&parsed.prefixes, "", offset)?;
            Some(format!("{}{}", vocab.namespace, term))
        }
    }
}

/// JSON-LD term definitions may themselves use a compact IRI.
fn namespace_iri(parsed: &ParseOutput, decl: &PrefixDecl, offset: usize) -> String {
    if is_absolute_iri(&decl.namespace) {
        return decl.namespace.clone();
    }
    match decl.namespace.split_once(':') {
        Some((prefix, local)) if prefix != decl.label => {
            match active_binding(&parsed.prefixes, prefix, offset) {
                Some(outer) if is_absolute_iri(&outer.namespace) => {
                    format!("{}{}", outer.namespace, local)
                }
                _ => decl.namespace.clone(),
            }
        }
        _ => decl.namespace.clone(),
    }
}

fn join_iri(base: &str, relative: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(relative).ok().map(String::from)
}

static IRI_LOCAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^:/?#\[\]@]*$").unwrap());

/// Splits an IRI into namespace and local name at the last delimiter.
///
/// `http://example.org/ns#term` gives `("http://example.org/ns#", "term")`.
pub fn split_iri(iri: &str) -> (&str, &str) {
    match IRI_LOCAL.find(iri) {
        Some(m) => (&iri[..m.start()], m.as_str()),
        None => (iri, ""),
    }
}

/// Whether a JSON-LD or Turtle string looks like an absolute IRI.
pub fn is_absolute_iri(value: &str) -> bool {
    match value.split_once(':') {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                && (rest.starts_with("//") || matches!(scheme, "urn" | "mailto" | "tag" | "data"))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(label: &str, ns: &str, start: usize, scope: BindingScope) -> PrefixDecl {
        PrefixDecl {
            label: label.to_string(),
            namespace: ns.to_string(),
            kind: BindingKind::Prefix,
            span: SourceSpan::new(start, start + 5),
            label_span: SourceSpan::new(start, start + 1),
            namespace_span: SourceSpan::new(start + 2, start + 5),
            scope,
        }
    }

    #[test]
    fn split_iri_at_last_delimiter() {
        assert_eq!(
            split_iri("http://example.org/ns#term"),
            ("http://example.org/ns#", "term")
        );
        assert_eq!(
            split_iri("http://example.org/ns/term"),
            ("http://example.org/ns/", "term")
        );
        assert_eq!(split_iri("urn:x-test:a"), ("urn:x-test:", "a"));
        assert_eq!(split_iri("http://example.org/"), ("http://example.org/", ""));
    }

    #[test]
    fn dialect_detection() {
        assert_eq!(Dialect::from_language_id("turtle"), Some(Dialect::Turtle));
        assert_eq!(Dialect::from_language_id("json-ld"), Some(Dialect::JsonLd));
        assert_eq!(Dialect::from_language_id("sparql"), None);
        assert_eq!(Dialect::from_path("/tmp/data.trig"), Some(Dialect::TriG));
        assert_eq!(Dialect::from_path("file:///a/b.jsonld"), Some(Dialect::JsonLd));
        assert_eq!(Dialect::from_path("README"), None);
    }

    #[test]
    fn later_turtle_declaration_shadows_earlier() {
        let prefixes = vec![
            decl("ex", "http://one/", 0, BindingScope::FromOffset(0)),
            decl("ex", "http://two/", 20, BindingScope::FromOffset(20)),
        ];

        assert_eq!(active_binding(&prefixes, "ex", 10).unwrap().namespace, "http://one/");
        assert_eq!(active_binding(&prefixes, "ex", 30).unwrap().namespace, "http://two/");
    }

    #[test]
    fn inner_jsonld_context_shadows_outer() {
        let prefixes = vec![
            decl("ex", "http://outer/", 5, BindingScope::Within(SourceSpan::new(0, 100))),
            decl("ex", "http://inner/", 40, BindingScope::Within(SourceSpan::new(30, 60))),
        ];

        assert_eq!(active_binding(&prefixes, "ex", 10).unwrap().namespace, "http://outer/");
        assert_eq!(active_binding(&prefixes, "ex", 35).unwrap().namespace, "http://inner/");
        assert_eq!(active_binding(&prefixes, "ex", 70).unwrap().namespace, "http://outer/");
        assert!(active_binding(&prefixes, "ex", 100).is_none());
    }

    #[test]
    fn absolute_iri_detection() {
        assert!(is_absolute_iri("http://example.org/"));
        assert!(is_absolute_iri("urn:isbn:123"));
        assert!(!is_absolute_iri("foaf:name"));
        assert!(!is_absolute_iri("#me"));
    }
}
