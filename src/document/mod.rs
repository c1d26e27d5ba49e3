//! Open documents and their parse state.
//!
//! A [`Document`] owns the current text, the last [`ParseOutput`] and the
//! [`SpanIndex`] built from it. Every accepted edit re-parses the whole text
//! synchronously, so reads always see a consistent snapshot.
//!
//! ```text
//! Opened -> Parsing -> Ready | Errored
//!             ^            |
//!             +-- edit ----+
//! ```

mod span_index;
mod types;

pub use span_index::{Construct, ConstructId, SpanIndex};
pub use types::{offset_to_position, position_to_offset, LspRange};

use std::collections::HashMap;

use ropey::Rope;
use tower_lsp::lsp_types::{Position, Range, Url};
use tracing::debug;

use crate::error::ModelError;
use crate::syntax::{
    self, BaseDecl, Dialect, IriRef, ParseOutput, PrefixDecl, SourceSpan, Statement,
    SyntaxError, Term, TermValue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    Opened,
    Parsing,
    /// Parsed without syntax errors.
    Ready,
    /// Parsed with at least one recovered syntax error.
    Errored,
}

/// One incremental change: `range` of `None` replaces the whole text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEdit {
    pub range: Option<Range>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct Document {
    uri: Url,
    version: i32,
    dialect: Dialect,
    text: String,
    rope: Rope,
    state: DocumentState,
    parsed: ParseOutput,
    index: SpanIndex,
}

impl Document {
    pub fn new(uri: Url, text: String, version: i32, dialect: Dialect) -> Document {
        let rope = Rope::from_str(&text);
        let mut document = Document {
            uri,
            version,
            dialect,
            text,
            rope,
            state: DocumentState::Opened,
            parsed: ParseOutput::default(),
            index: SpanIndex::default(),
        };
        document.reparse();
        document
    }

    fn reparse(&mut self) {
        self.state = DocumentState::Parsing;
        self.parsed = syntax::parse(&self.text, self.dialect);
        self.index = SpanIndex::build(&self.parsed, self.text.len());
        self.state = if self.parsed.errors.is_empty() {
            DocumentState::Ready
        } else {
            DocumentState::Errored
        };
        debug!(
            uri = %self.uri,
            version = self.version,
            statements = self.parsed.statements.len(),
            errors = self.parsed.errors.len(),
            "parsed document"
        );
    }

    fn replace_text(&mut self, text: String, version: i32) {
        self.rope = Rope::from_str(&text);
        self.text = text;
        self.version = version;
        self.reparse();
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    pub fn state(&self) -> DocumentState {
        self.state
    }

    pub fn parsed(&self) -> &ParseOutput {
        &self.parsed
    }

    pub fn statements(&self) -> &[Statement] {
        &self.parsed.statements
    }

    pub fn prefixes(&self) -> &[PrefixDecl] {
        &self.parsed.prefixes
    }

    pub fn index(&self) -> &SpanIndex {
        &self.index
    }

    pub fn lookup(&self, offset: usize) -> Option<Construct> {
        self.index.lookup(offset)
    }

    /// Statements whose span contains `offset`, with their indices.
    pub fn statements_at(&self, offset: usize) -> Vec<(usize, &Statement)> {
        self.parsed
            .statements
            .iter()
            .enumerate()
            .filter(|(_, statement)| statement.span.contains(offset))
            .collect()
    }

    /// The bindings in effect at `offset`, one per label.
    pub fn prefix_bindings_at(&self, offset: usize) -> Vec<&PrefixDecl> {
        syntax::active_bindings(&self.parsed.prefixes, offset)
    }

    pub fn binding_for(&self, label: &str, offset: usize) -> Option<&PrefixDecl> {
        syntax::active_binding(&self.parsed.prefixes, label, offset)
    }

    /// The base IRI declaration in effect at `offset`, if any.
    pub fn base_at(&self, offset: usize) -> Option<&BaseDecl> {
        syntax::active_base(&self.parsed.bases, offset)
    }

    /// Full IRI of a reference written at `offset`. Relative IRIs fall back
    /// to the document URI when no base is declared.
    pub fn expand(&self, iri_ref: &IriRef, offset: usize) -> Option<String> {
        syntax::expand_ref(&self.parsed, iri_ref, offset, Some(self.uri.as_str()))
    }

    pub fn errors_snapshot(&self) -> Vec<SyntaxError> {
        self.parsed.errors.clone()
    }

    /// The term a construct id points at, for ids that name a term.
    pub fn term(&self, id: ConstructId) -> Option<&Term> {
        match id {
            ConstructId::Term(i, position) => {
                Some(self.parsed.statements.get(i)?.term(position))
            }
            ConstructId::Datatype(i, position) => {
                self.parsed.statements.get(i)?.term(position).datatype()
            }
            ConstructId::Member(i) => self.parsed.members.get(i),
            ConstructId::GraphLabel(i) => self.parsed.graphs.get(i)?.label.as_ref(),
            _ => None,
        }
    }

    /// The innermost IRI or prefixed name at `offset`.
    pub fn iri_term_at(&self, offset: usize) -> Option<&Term> {
        let construct = self.lookup(offset)?;
        let term = self.term(construct.id)?;
        match term.value {
            TermValue::Iri(_) => Some(term),
            _ => None,
        }
    }

    pub fn offset_at(&self, position: Position) -> usize {
        position_to_offset(&self.rope, position)
    }

    pub fn position_at(&self, offset: usize) -> Position {
        offset_to_position(&self.rope, offset)
    }

    pub fn range_of(&self, span: SourceSpan) -> Range {
        LspRange::from_span(&self.rope, span).into()
    }
}

/// All open documents, keyed by URI.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: HashMap<Url, Document>,
}

impl DocumentStore {
    pub fn new() -> DocumentStore {
        DocumentStore::default()
    }

    /// Opens (or re-opens) a document and parses it.
    pub fn open(&mut self, uri: Url, text: String, version: i32, dialect: Dialect) -> &Document {
        let document = Document::new(uri.clone(), text, version, dialect);
        self.documents.insert(uri.clone(), document);
        &self.documents[&uri]
    }

    /// Replaces the whole text.
    pub fn apply_change(
        &mut self,
        uri: &Url,
        text: String,
        version: i32,
    ) -> Result<&Document, ModelError> {
        let document = self.accept_version(uri, version)?;
        document.replace_text(text, version);
        Ok(document)
    }

    /// Applies LSP content changes in order, then re-parses once.
    ///
    /// A stale version leaves the document untouched.
    pub fn apply_edits(
        &mut self,
        uri: &Url,
        version: i32,
        edits: &[TextEdit],
    ) -> Result<&Document, ModelError> {
        let document = self.accept_version(uri, version)?;
        let mut rope = document.rope.clone();
        for edit in edits {
            match edit.range {
                Some(range) => {
                    let start = rope.byte_to_char(position_to_offset(&rope, range.start));
                    let end = rope.byte_to_char(position_to_offset(&rope, range.end));
                    let (start, end) = (start.min(end), start.max(end));
                    rope.remove(start..end);
                    rope.insert(start, &edit.text);
                }
                None => rope = Rope::from_str(&edit.text),
            }
        }
        document.replace_text(rope.to_string(), version);
        Ok(document)
    }

    pub fn close(&mut self, uri: &Url) -> Result<(), ModelError> {
        self.documents
            .remove(uri)
            .map(|_| ())
            .ok_or_else(|| ModelError::NotFound(uri.clone()))
    }

    pub fn get(&self, uri: &Url) -> Result<&Document, ModelError> {
        self.documents
            .get(uri)
            .ok_or_else(|| ModelError::NotFound(uri.clone()))
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn accept_version(&mut self, uri: &Url, version: i32) -> Result<&mut Document, ModelError> {
        let document = self
            .documents
            .get_mut(uri)
            .ok_or_else(|| ModelError::NotFound(uri.clone()))?;
        if version <= document.version {
            return Err(ModelError::StaleVersion {
                uri: uri.clone(),
                current: document.version,
                received: version,
            });
        }
        Ok(document)
    }
}
