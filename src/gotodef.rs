use tower_lsp::lsp_types::{Location, Position};

use crate::{
    document::Document,
    resolver::local_prefix,
    syntax::{BindingKind, IriRef, SourceSpan, TermValue},
};

/// The span of the declaration the IRI at `offset` depends on.
///
/// Prefixed names go to their prefix declaration and JSON-LD terms to their
/// context entry (or `@vocab`). A full IRI goes to the declaration whose
/// namespace is its longest match, else to the first statement that has it
/// as subject. Only the same document is searched.
pub fn definition(document: &Document, offset: usize) -> Option<SourceSpan> {
    let term = document.iri_term_at(offset)?;
    let start = term.span.start;
    match term.iri_ref()? {
        IriRef::Prefixed { prefix, .. } => local_prefix(document, start, prefix).map(|decl| decl.span),
        IriRef::Vocab(name) => {
            let decl = document
                .binding_for(name, start)
                .filter(|decl| !matches!(decl.kind, BindingKind::Vocab))
                .or_else(|| {
                    document
                        .binding_for("", start)
                        .filter(|decl| matches!(decl.kind, BindingKind::Vocab))
                })?;
            Some(decl.span)
        }
        IriRef::Full(_) => {
            let iri = document.expand(term.iri_ref()?, start)?;
            let declared = document
                .prefix_bindings_at(start)
                .into_iter()
                .filter(|decl| decl.is_prefix() || matches!(decl.kind, BindingKind::Vocab))
                .filter(|decl| iri.starts_with(decl.namespace.as_str()))
                .max_by_key(|decl| decl.namespace.len())
                .map(|decl| decl.span);
            declared.or_else(|| subject_definition(document, &iri, term.span))
        }
        IriRef::RdfType => None,
    }
}

fn subject_definition(document: &Document, iri: &str, from: SourceSpan) -> Option<SourceSpan> {
    document
        .statements()
        .iter()
        .map(|statement| &statement.subject)
        .filter(|subject| subject.span != from)
        .find(|subject| match &subject.value {
            TermValue::Iri(iri_ref) => {
                document.expand(iri_ref, subject.span.start).as_deref() == Some(iri)
            }
            _ => false,
        })
        .map(|subject| subject.span)
}

pub fn goto_definition(document: &Document, cursor_position: Position) -> Option<Vec<Location>> {
    let offset = document.offset_at(cursor_position);
    let span = definition(document, offset)?;

    Some(vec![Location {
        uri: document.uri().clone(),
        range: document.range_of(span),
    }])
}
