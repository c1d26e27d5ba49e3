//! Hover provider for RDF documents.
//!
//! This module implements the LSP `textDocument/hover` capability,
//! describing the IRI under the cursor with what the vocabulary cache
//! knows about it.
//!
//! # Hover Targets
//!
//! | Target | Shows |
//! |--------|-------|
//! | Prefixed name, IRI, `a` | Label, kind and comment of the term, or its compact name and IRI |
//! | Undeclared prefixed name | The same, resolved through a known prefix, with a note |
//! | Prefix declaration | The namespace and how many terms of it are known |
//! | JSON-LD term definition | The term it defines |
//!
//! Literals, blank nodes, punctuation and whitespace have no hover.
//!
//! # Configuration
//!
//! Hover can be disabled via [`Settings::hover`]:
//!
//! ```toml
//! hover = false
//! ```

use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position};

use crate::{
    config::Settings,
    document::{ConstructId, Document},
    resolver::{local_prefix, PrefixResolver},
    syntax::{self, BindingKind, IriRef, PrefixDecl, SourceSpan},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverInfo {
    /// The construct the description is about.
    pub span: SourceSpan,
    pub markdown: String,
}

/// Describe the construct at `offset`.
///
/// Only the vocabulary cache's current contents are used; a namespace that
/// is not cached yet is fetched in the background and described by name
/// until then.
pub fn hover_info(document: &Document, offset: usize, resolver: &PrefixResolver) -> Option<HoverInfo> {
    let construct = document.lookup(offset)?;
    match construct.id {
        ConstructId::Prefix(i) | ConstructId::PrefixLabel(i) | ConstructId::PrefixNamespace(i) => {
            let decl = document.prefixes().get(i)?;
            let markdown = match decl.kind {
                BindingKind::Term { .. } => {
                    let iri = document.expand(&IriRef::Vocab(decl.label.clone()), decl.label_span.start)?;
                    describe_iri(document, resolver, decl.label_span.start, &iri, &decl.label, None)
                }
                _ => describe_namespace(resolver, decl),
            };
            Some(HoverInfo {
                span: construct.span,
                markdown,
            })
        }
        ConstructId::Term(..)
        | ConstructId::Datatype(..)
        | ConstructId::Member(_)
        | ConstructId::GraphLabel(_) => {
            let term = document.term(construct.id)?;
            let iri_ref = term.iri_ref()?;
            let start = term.span.start;
            let written = term.span.slice(document.text()).to_string();

            let (iri, note) = match document.expand(iri_ref, start) {
                Some(iri) => (iri, None),
                None => undeclared(document, resolver, start, iri_ref)?,
            };
            Some(HoverInfo {
                span: term.span,
                markdown: describe_iri(document, resolver, start, &iri, &written, note),
            })
        }
        _ => None,
    }
}

/// An undeclared prefix the resolver still knows a namespace for.
fn undeclared(
    document: &Document,
    resolver: &PrefixResolver,
    offset: usize,
    iri_ref: &IriRef,
) -> Option<(String, Option<String>)> {
    let IriRef::Prefixed { prefix, local } = iri_ref else {
        return None;
    };
    if local_prefix(document, offset, prefix).is_some() {
        return None;
    }
    let resolution = resolver.resolve_short_name(document, offset, prefix);
    let namespace = resolution.namespace()?;
    Some((
        format!("{namespace}{local}"),
        Some(format!("Prefix `{prefix}` is not declared in this document.")),
    ))
}

fn describe_iri(
    document: &Document,
    resolver: &PrefixResolver,
    offset: usize,
    iri: &str,
    written: &str,
    note: Option<String>,
) -> String {
    let (namespace, local) = syntax::split_iri(iri);
    let name = resolver
        .compact(document, offset, iri)
        .unwrap_or_else(|| written.to_string());
    let entry = resolver.cache().get(namespace);

    let mut sections = Vec::new();
    match entry.term(local) {
        Some(info) => {
            sections.push(format!("`{name}` · {}", info.kind.name()));
            if let Some(label) = &info.label {
                sections.push(format!("**{label}**"));
            }
            if let Some(comment) = &info.comment {
                sections.push(comment.clone());
            }
        }
        None => sections.push(format!("`{name}`")),
    }
    sections.push(format!("<{iri}>"));
    if let Some(note) = note {
        sections.push(format!("*{note}*"));
    }
    sections.join("\n\n")
}

fn describe_namespace(resolver: &PrefixResolver, decl: &PrefixDecl) -> String {
    let heading = match decl.kind {
        BindingKind::Vocab => "`@vocab`".to_string(),
        _ => format!("`{}:`", decl.label),
    };
    let entry = resolver.cache().get(&decl.namespace);
    let mut markdown = format!("{heading} <{}>", decl.namespace);
    if !entry.is_empty() {
        markdown.push_str(&format!("\n\n{} known terms", entry.terms.len()));
    }
    markdown
}

/// Generate hover content for the element at the cursor position.
///
/// # Returns
///
/// `Some(Hover)` with markdown content, or `None` if:
/// - Hover is disabled in settings
/// - The cursor is not on an IRI or a declaration
pub fn hover(
    document: &Document,
    position: Position,
    resolver: &PrefixResolver,
    settings: &Settings,
) -> Option<Hover> {
    if !settings.hover {
        return None;
    }

    let offset = document.offset_at(position);
    let info = hover_info(document, offset, resolver)?;
    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: info.markdown,
        }),
        range: Some(document.range_of(info.span)),
    })
}
