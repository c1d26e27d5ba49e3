use std::collections::{BTreeMap, HashSet};

use rayon::prelude::*;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use crate::{
    config::Settings,
    document::Document,
    resolver::{local_prefix, PrefixResolver, Resolution},
    syntax::{self, IriRef, SourceSpan, Term},
};

pub const SOURCE: &str = "ldls";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Information,
}

impl From<Severity> for DiagnosticSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Error => DiagnosticSeverity::ERROR,
            Severity::Warning => DiagnosticSeverity::WARNING,
            Severity::Information => DiagnosticSeverity::INFORMATION,
        }
    }
}

/// One problem found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub span: SourceSpan,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    pub fn to_diagnostic(&self, document: &Document) -> Diagnostic {
        Diagnostic {
            range: document.range_of(self.span),
            severity: Some(self.severity.into()),
            source: Some(SOURCE.into()),
            message: self.message.clone(),
            ..Default::default()
        }
    }
}

/// How an IRI reference in the document fares against its local bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Reference {
    /// `prefix:local` with no declaration in effect.
    UndeclaredPrefix { prefix: String },
    /// A JSON-LD term the active context does not define.
    UnboundTerm { term: String },
    /// Expanded through a prefix or context; `written` is the source form.
    Expanded { iri: String, written: String },
}

/// Every IRI term the document mentions, once per source span.
fn iri_terms(document: &Document) -> Vec<&Term> {
    let parsed = document.parsed();
    let statement_terms = parsed.statements.iter().flat_map(|statement| {
        statement
            .terms()
            .into_iter()
            .flat_map(|(_, term)| std::iter::once(term).chain(term.datatype()))
    });
    let graph_labels = parsed.graphs.iter().filter_map(|graph| graph.label.as_ref());

    let mut seen = HashSet::new();
    statement_terms
        .chain(parsed.members.iter())
        .chain(graph_labels)
        .filter(|term| term.iri_ref().is_some())
        .filter(|term| seen.insert(term.span))
        .collect()
}

fn classify(document: &Document, term: &Term) -> Option<Reference> {
    let offset = term.span.start;
    match term.iri_ref()? {
        IriRef::Prefixed { prefix, local } => match local_prefix(document, offset, prefix) {
            None => Some(Reference::UndeclaredPrefix {
                prefix: prefix.clone(),
            }),
            Some(_) => Some(Reference::Expanded {
                iri: document.expand(term.iri_ref()?, offset)?,
                written: format!("{prefix}:{local}"),
            }),
        },
        IriRef::Vocab(name) => match document.expand(term.iri_ref()?, offset) {
            Some(iri) => Some(Reference::Expanded {
                iri,
                written: name.clone(),
            }),
            None => Some(Reference::UnboundTerm { term: name.clone() }),
        },
        IriRef::Full(_) | IriRef::RdfType => None,
    }
}

/// JSON-LD contexts loaded by reference can define anything, so names
/// under one are not reported.
fn under_remote_context(document: &Document, offset: usize) -> bool {
    document
        .parsed()
        .remote_contexts
        .iter()
        .any(|context| context.scope.contains(offset))
}

/// Syntax errors, undeclared prefixes and terms missing from known vocabularies.
///
/// Syntax errors are always reported. Everything else is governed by
/// [`Settings::unresolved_diagnostics`] and [`Settings::term_diagnostics`].
/// Vocabulary checks use only what the cache already holds; a namespace
/// that is not cached yet is fetched in the background and checked on a
/// later call.
pub fn diagnose(document: &Document, resolver: &PrefixResolver, settings: &Settings) -> Vec<Finding> {
    let mut findings: Vec<Finding> = document
        .parsed()
        .errors
        .iter()
        .map(|error| Finding {
            span: error.span,
            severity: Severity::Error,
            message: error.message.clone(),
        })
        .collect();

    if settings.unresolved_diagnostics || settings.term_diagnostics {
        let references: Vec<(SourceSpan, Reference)> = iri_terms(document)
            .into_par_iter()
            .filter(|term| !under_remote_context(document, term.span.start))
            .filter_map(|term| Some((term.span, classify(document, term)?)))
            .collect();

        if settings.unresolved_diagnostics {
            findings.extend(unresolved_findings(document, resolver, &references));
        }
        if settings.term_diagnostics {
            findings.extend(term_findings(resolver, &references));
        }
    }

    findings.sort_by_key(|finding| (finding.span.start, finding.span.end, finding.severity));
    findings
}

fn unresolved_findings(
    document: &Document,
    resolver: &PrefixResolver,
    references: &[(SourceSpan, Reference)],
) -> Vec<Finding> {
    references
        .iter()
        .filter_map(|(span, reference)| match reference {
            Reference::UndeclaredPrefix { prefix } => {
                let message = match resolver.resolve_short_name(document, span.start, prefix) {
                    Resolution::WellKnown(ns) => {
                        format!("Undeclared prefix '{prefix}' (usually <{ns}>)")
                    }
                    Resolution::Cached(ns) => format!("Undeclared prefix '{prefix}' (usually <{ns}>)"),
                    _ => format!("Undeclared prefix '{prefix}'"),
                };
                Some(Finding {
                    span: *span,
                    severity: Severity::Error,
                    message,
                })
            }
            Reference::UnboundTerm { term } => Some(Finding {
                span: *span,
                severity: Severity::Warning,
                message: format!("'{term}' is not defined by the active context"),
            }),
            Reference::Expanded { .. } => None,
        })
        .collect()
}

fn term_findings(resolver: &PrefixResolver, references: &[(SourceSpan, Reference)]) -> Vec<Finding> {
    // one cache lookup per namespace
    let mut by_namespace: BTreeMap<&str, Vec<(SourceSpan, &str, &str)>> = BTreeMap::new();
    for (span, reference) in references {
        if let Reference::Expanded { iri, written } = reference {
            let (namespace, local) = syntax::split_iri(iri);
            if local.is_empty() || !namespace.starts_with("http") {
                continue;
            }
            by_namespace
                .entry(namespace)
                .or_default()
                .push((*span, local, written));
        }
    }

    let mut findings = Vec::new();
    for (namespace, uses) in by_namespace {
        let entry = resolver.cache().get(namespace);
        if entry.is_empty() {
            continue;
        }
        findings.extend(
            uses.into_iter()
                .filter(|(_, local, _)| entry.term(local).is_none())
                .map(|(span, _, written)| Finding {
                    span,
                    severity: Severity::Warning,
                    message: format!("'{written}' is not defined in <{namespace}>"),
                }),
        );
    }
    findings
}

/// Diagnostics for publishing to the editor.
pub fn diagnostics(
    document: &Document,
    resolver: &PrefixResolver,
    settings: &Settings,
) -> Vec<Diagnostic> {
    diagnose(document, resolver, settings)
        .iter()
        .map(|finding| finding.to_diagnostic(document))
        .collect()
}
