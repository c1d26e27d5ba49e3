//! Completion inside prefix declarations.
//!
//! In the label position every known prefix the document has not declared
//! yet is offered together with its namespace. In the namespace position
//! the namespace known for the label just written is offered.

use crate::syntax::{Dialect, SourceSpan, Slot};

use super::util::{slot_of, turtle_style_directive, word_at};
use super::{Candidate, CandidateKind, Completer, Context};

pub struct PrefixDeclCompleter<'a> {
    context: Context<'a>,
    slot: Slot,
    /// Typed text the candidate replaces.
    replace: SourceSpan,
    typed: &'a str,
    /// `@prefix` needs a closing dot; SPARQL `PREFIX` and JSON-LD do not.
    terminated: bool,
}

impl<'a> Completer<'a> for PrefixDeclCompleter<'a> {
    fn construct(context: Context<'a>, offset: usize) -> Option<Self> {
        let document = context.document;
        let slot = slot_of(document, offset);
        if !matches!(slot, Slot::PrefixLabel | Slot::PrefixNamespace { .. }) {
            return None;
        }

        let (start, typed) = word_at(document.text(), document.dialect(), offset);
        let terminated = document.dialect() != Dialect::JsonLd
            && turtle_style_directive(document.text(), start);

        Some(PrefixDeclCompleter {
            context,
            slot,
            replace: SourceSpan::new(start, offset),
            typed,
            terminated,
        })
    }

    fn completions(&self) -> Vec<Candidate> {
        match &self.slot {
            Slot::PrefixLabel => self.labels(),
            Slot::PrefixNamespace { label } => self.namespaces(label),
            _ => vec![],
        }
    }
}

impl PrefixDeclCompleter<'_> {
    fn labels(&self) -> Vec<Candidate> {
        let document = self.context.document;
        let jsonld = document.dialect() == Dialect::JsonLd;
        let typed = self.typed.trim_end_matches(':');
        let declared = document.prefix_bindings_at(self.replace.start);

        self.context
            .resolver
            .known_prefixes()
            .into_iter()
            .filter(|(prefix, _)| prefix.starts_with(typed))
            .filter(|(prefix, _)| !declared.iter().any(|decl| decl.label == *prefix))
            .map(|(prefix, namespace)| {
                let insert_text = if jsonld {
                    prefix.clone()
                } else if self.terminated {
                    format!("{prefix}: <{namespace}> .")
                } else {
                    format!("{prefix}: <{namespace}>")
                };
                Candidate {
                    label: if jsonld { prefix.clone() } else { format!("{prefix}:") },
                    kind: CandidateKind::SuggestedPrefix,
                    insert_text,
                    replace: self.replace,
                    detail: Some(namespace),
                    documentation: None,
                    additional_edit: None,
                }
            })
            .collect()
    }

    fn namespaces(&self, label: &str) -> Vec<Candidate> {
        let document = self.context.document;
        let Some(resolution) = self.context.resolver.suggest_namespace(label) else {
            return vec![];
        };
        let Some(namespace) = resolution.namespace() else {
            return vec![];
        };
        if !namespace.starts_with(self.typed) {
            return vec![];
        }

        let insert_text = match document.dialect() {
            Dialect::JsonLd => namespace.to_string(),
            _ if self.terminated => format!("<{namespace}> ."),
            _ => format!("<{namespace}>"),
        };
        vec![Candidate {
            label: namespace.to_string(),
            kind: CandidateKind::Namespace,
            insert_text,
            replace: self.replace,
            detail: Some(format!("{label}:")),
            documentation: None,
            additional_edit: None,
        }]
    }
}

#[cfg(test)]
mod tests {
    use crate::completion::{complete, CandidateKind};
    use crate::config::Settings;
    use crate::resolver::PrefixResolver;
    use crate::syntax::Dialect;
    use crate::test_utils::{cache_with, document, CountingFetcher};

    fn resolver() -> (tempfile::TempDir, PrefixResolver) {
        let (dir, cache) = cache_with(CountingFetcher::new());
        (dir, PrefixResolver::new(cache))
    }

    #[test]
    fn label_position_offers_whole_declarations() {
        let (_dir, resolver) = resolver();
        let text = "@prefix fo";
        let doc = document(text, Dialect::Turtle);

        let candidates = complete(&doc, text.len(), &resolver, &Settings::default());
        let foaf = candidates.iter().find(|c| c.label == "foaf:").unwrap();
        assert_eq!(foaf.insert_text, "foaf: <http://xmlns.com/foaf/0.1/> .");
        assert_eq!(foaf.replace.start, 8);
        assert!(candidates.iter().all(|c| c.label.starts_with("fo")));
        assert!(candidates.iter().all(|c| c.kind == CandidateKind::SuggestedPrefix));
    }

    #[test]
    fn sparql_style_has_no_dot() {
        let (_dir, resolver) = resolver();
        let text = "PREFIX rdf";
        let doc = document(text, Dialect::Turtle);

        let candidates = complete(&doc, text.len(), &resolver, &Settings::default());
        let rdfs = candidates.iter().find(|c| c.label == "rdfs:").unwrap();
        assert_eq!(rdfs.insert_text, "rdfs: <http://www.w3.org/2000/01/rdf-schema#>");
    }

    /// Test: prefixes already declared are not offered again
    #[test]
    fn declared_prefixes_are_skipped() {
        let (_dir, resolver) = resolver();
        let text = "@prefix foaf: <http://xmlns.com/foaf/0.1/> .\n@prefix ";
        let doc = document(text, Dialect::Turtle);

        let candidates = complete(&doc, text.len(), &resolver, &Settings::default());
        assert!(!candidates.is_empty());
        assert!(candidates.iter().all(|c| c.label != "foaf:"));
    }

    #[test]
    fn namespace_position_offers_known_namespace() {
        let (_dir, resolver) = resolver();
        let text = "@prefix skos: ";
        let doc = document(text, Dialect::Turtle);

        let candidates = complete(&doc, text.len(), &resolver, &Settings::default());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, CandidateKind::Namespace);
        assert_eq!(
            candidates[0].insert_text,
            "<http://www.w3.org/2004/02/skos/core#> ."
        );

        let text = "@prefix unknownthing: ";
        let doc = document(text, Dialect::Turtle);
        assert!(complete(&doc, text.len(), &resolver, &Settings::default()).is_empty());
    }

    #[test]
    fn jsonld_context_entries() {
        let (_dir, resolver) = resolver();
        let text = r#"{"@context": {"sko"#;
        let doc = document(text, Dialect::JsonLd);
        let candidates = complete(&doc, text.len(), &resolver, &Settings::default());
        assert_eq!(candidates[0].label, "skos");
        assert_eq!(candidates[0].insert_text, "skos");

        let text = r#"{"@context": {"skos": "http"#;
        let doc = document(text, Dialect::JsonLd);
        let candidates = complete(&doc, text.len(), &resolver, &Settings::default());
        assert_eq!(candidates[0].insert_text, "http://www.w3.org/2004/02/skos/core#");
        assert_eq!(candidates[0].replace.start, text.len() - 4);
    }
}
