//! Completion of names in statements.
//!
//! ## Ordering
//! 1. Prefixes (and JSON-LD terms) declared in the document, in declaration order
//! 2. Terms of the vocabulary the typed prefix names, alphabetically
//!    ignoring case
//! 3. Known prefixes the document does not declare, each with the edit
//!    that declares it
//! 4. Keywords
//!
//! After `a`, `rdf:type` or `@type` only classes are offered from the
//! vocabulary; in predicate position only properties.

use itertools::Itertools;

use crate::document::Document;
use crate::resolver::Resolution;
use crate::syntax::{BindingKind, Dialect, SourceSpan, Slot};
use crate::vocab::TermKind;

use super::util::{declaration_insertion, slot_of, word_at};
use super::{Candidate, CandidateKind, Completer, Context, Insertion};

pub struct NameCompleter<'a> {
    context: Context<'a>,
    slot: Slot,
    replace: SourceSpan,
    typed: &'a str,
}

impl<'a> Completer<'a> for NameCompleter<'a> {
    fn construct(context: Context<'a>, offset: usize) -> Option<Self> {
        let document = context.document;
        let slot = slot_of(document, offset);
        if !matches!(slot, Slot::Subject | Slot::Predicate | Slot::Object { .. }) {
            return None;
        }
        let (start, typed) = word_at(document.text(), document.dialect(), offset);

        Some(NameCompleter {
            context,
            slot,
            replace: SourceSpan::new(start, offset),
            typed,
        })
    }

    fn completions(&self) -> Vec<Candidate> {
        let mut candidates = self.local_candidates();
        candidates.extend(self.term_candidates());
        candidates.extend(self.suggested_prefixes());
        candidates.extend(self.keywords());
        candidates
    }
}

impl NameCompleter<'_> {
    fn document(&self) -> &Document {
        self.context.document
    }

    /// Where bindings are looked up. The start of the typed word is inside
    /// every scope the cursor is in, even in a document cut off at the cursor.
    fn scope_offset(&self) -> usize {
        self.replace.start
    }

    /// The prefix part of the typed word, if it has one.
    fn typed_prefix(&self) -> Option<(&str, &str)> {
        self.typed.split_once(':')
    }

    fn matches_prefix(&self, label: &str) -> bool {
        match self.typed_prefix() {
            Some((prefix, _)) => label == prefix,
            None => label.starts_with(self.typed),
        }
    }

    fn candidate(&self, label: String, kind: CandidateKind) -> Candidate {
        Candidate {
            insert_text: label.clone(),
            label,
            kind,
            replace: self.replace,
            detail: None,
            documentation: None,
            additional_edit: None,
        }
    }

    fn local_candidates(&self) -> Vec<Candidate> {
        self.document()
            .prefix_bindings_at(self.scope_offset())
            .into_iter()
            .filter_map(|decl| match decl.kind {
                BindingKind::Prefix if self.matches_prefix(&decl.label) => {
                    let mut candidate =
                        self.candidate(format!("{}:", decl.label), CandidateKind::LocalPrefix);
                    candidate.detail = Some(decl.namespace.clone());
                    Some(candidate)
                }
                BindingKind::Term { .. }
                    if self.typed_prefix().is_none() && decl.label.starts_with(self.typed) =>
                {
                    let mut candidate = self.candidate(decl.label.clone(), CandidateKind::ContextTerm);
                    candidate.detail = Some(decl.namespace.clone());
                    Some(candidate)
                }
                _ => None,
            })
            .collect()
    }

    /// The vocabulary the typed word draws from, with the declaration it
    /// still needs, if any.
    fn vocabulary(&self) -> Option<(String, &str, Option<Insertion>)> {
        let document = self.document();
        match self.typed_prefix() {
            Some((prefix, local)) => {
                match self
                    .context
                    .resolver
                    .resolve_short_name(document, self.scope_offset(), prefix)
                {
                    Resolution::Local(decl) => Some((decl.namespace.clone(), local, None)),
                    Resolution::Unresolved => None,
                    other => {
                        let namespace = other.namespace()?.to_string();
                        let insertion = declaration_insertion(document, prefix, &namespace);
                        Some((namespace, local, insertion))
                    }
                }
            }
            None if document.dialect() == Dialect::JsonLd => {
                let vocab = document
                    .binding_for("", self.scope_offset())
                    .filter(|decl| matches!(decl.kind, BindingKind::Vocab))?;
                Some((vocab.namespace.clone(), self.typed, None))
            }
            None => None,
        }
    }

    fn wanted(&self, kind: TermKind) -> bool {
        match self.slot {
            Slot::Object { after_type: true } => kind == TermKind::Class,
            Slot::Predicate => kind != TermKind::Class,
            _ => true,
        }
    }

    fn term_candidates(&self) -> Vec<Candidate> {
        let Some((namespace, local, insertion)) = self.vocabulary() else {
            return vec![];
        };
        let entry = self.context.resolver.cache().get(&namespace);
        let prefix = self.typed_prefix().map(|(prefix, _)| prefix);

        entry
            .terms
            .iter()
            .filter(|(name, info)| name.starts_with(local) && self.wanted(info.kind))
            .sorted_by_cached_key(|(name, _)| name.to_lowercase())
            .map(|(name, info)| {
                let label = match prefix {
                    Some(prefix) => format!("{prefix}:{name}"),
                    None => name.clone(),
                };
                let mut candidate = self.candidate(label, CandidateKind::Term(info.kind));
                candidate.detail = Some(match &info.label {
                    Some(label) => format!("{} ({})", label, info.kind.name()),
                    None => info.kind.name().to_string(),
                });
                candidate.documentation = info.comment.clone();
                candidate.additional_edit = insertion.clone();
                candidate
            })
            .collect()
    }

    fn suggested_prefixes(&self) -> Vec<Candidate> {
        let document = self.document();
        let declared = document.prefix_bindings_at(self.scope_offset());
        let jsonld = document.dialect() == Dialect::JsonLd;

        self.context
            .resolver
            .known_prefixes()
            .into_iter()
            .filter(|(prefix, _)| self.matches_prefix(prefix))
            .filter(|(prefix, _)| !declared.iter().any(|decl| decl.label == *prefix))
            .filter_map(|(prefix, namespace)| {
                let insertion = declaration_insertion(document, &prefix, &namespace);
                // a JSON-LD document with a remote context cannot take the declaration
                if jsonld && insertion.is_none() {
                    return None;
                }
                let mut candidate =
                    self.candidate(format!("{prefix}:"), CandidateKind::SuggestedPrefix);
                candidate.detail = Some(namespace);
                candidate.additional_edit = insertion;
                Some(candidate)
            })
            .collect()
    }

    fn keywords(&self) -> Vec<Candidate> {
        if self.typed_prefix().is_some() {
            return vec![];
        }
        let dialect = self.document().dialect();
        let typed = self.typed.to_ascii_lowercase();

        dialect
            .keywords()
            .iter()
            .filter(|keyword| keyword.to_ascii_lowercase().starts_with(&typed))
            .filter(|keyword| match (dialect, &self.slot) {
                (Dialect::JsonLd, slot) => *slot == Slot::Predicate,
                (_, Slot::Predicate) => **keyword == "a",
                (_, Slot::Subject) => **keyword != "a",
                _ => false,
            })
            .map(|keyword| self.candidate(keyword.to_string(), CandidateKind::Keyword))
            .collect()
    }
}
