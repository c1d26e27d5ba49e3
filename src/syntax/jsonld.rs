//! JSON-LD statement extraction.
//!
//! Works in two passes over the span-annotated JSON tree. The first collects
//! every `@context` into scoped bindings: a context applies to the whole
//! object holding it and everything nested inside, and inner contexts shadow
//! outer ones. The second walks node objects and emits statements, using the
//! bindings in effect at each value for `@type` coercion.

use super::json::{self, JsonMember, JsonNode, JsonValue};
use super::{
    active_binding, is_absolute_iri, BaseDecl, BindingKind, BindingScope, GraphBlock, IriRef,
    ParseOutput, PrefixDecl, RdfParser, RemoteContext, SourceSpan, Statement, SyntaxError, Term,
    TermValue,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonLdParser;

impl RdfParser for JsonLdParser {
    fn parse(&self, text: &str) -> ParseOutput {
        let (root, error) = json::read(text);
        let mut extractor = Extractor {
            out: ParseOutput::default(),
            blank_nodes: 0,
        };
        if let Some(root) = &root {
            extractor.contexts(root);
            extractor.top_level(root);
        }
        extractor.out.errors.extend(error);
        extractor.out
    }
}

/// Characters after which a context value can be used as a prefix.
const GEN_DELIMS: &[char] = &[':', '/', '?', '#', '[', ']', '@'];

struct Extractor {
    out: ParseOutput,
    blank_nodes: usize,
}

impl Extractor {
    fn fresh_blank_node(&mut self) -> String {
        self.blank_nodes += 1;
        format!("b{}", self.blank_nodes)
    }

    fn error(&mut self, span: SourceSpan, message: impl Into<String>) {
        self.out.errors.push(SyntaxError::new(span, message));
    }

    fn contexts(&mut self, node: &JsonNode) {
        match &node.value {
            JsonValue::Object(members) => {
                for member in members {
                    if member.key == "@context" {
                        self.context_value(&member.value, node.span);
                    } else {
                        self.contexts(&member.value);
                    }
                }
            }
            JsonValue::Array(items) => items.iter().for_each(|item| self.contexts(item)),
            _ => {}
        }
    }

    fn context_value(&mut self, value: &JsonNode, scope: SourceSpan) {
        match &value.value {
            JsonValue::String(iri) => self.out.remote_contexts.push(RemoteContext {
                iri: iri.clone(),
                span: value.inner_span(),
                scope,
            }),
            JsonValue::Array(items) => {
                for item in items {
                    self.context_value(item, scope);
                }
            }
            JsonValue::Object(members) => {
                for member in members {
                    self.context_entry(member, scope);
                }
            }
            JsonValue::Null => {}
            _ => self.error(value.span, "Invalid @context value"),
        }
    }

    fn context_entry(&mut self, member: &JsonMember, scope: SourceSpan) {
        let key = member.key.as_str();
        match (key, &member.value.value) {
            ("@vocab", JsonValue::String(iri)) => {
                self.bind("", iri, BindingKind::Vocab, member, scope);
            }
            ("@base", JsonValue::String(iri)) => self.out.bases.push(BaseDecl {
                iri: iri.clone(),
                span: member.span(),
                scope: BindingScope::Within(scope),
            }),
            (key, _) if key.starts_with('@') => {}
            (_, JsonValue::String(iri)) => {
                let kind = if iri.ends_with(GEN_DELIMS) {
                    BindingKind::Prefix
                } else {
                    BindingKind::Term {
                        type_coercion: None,
                    }
                };
                self.bind(key, iri, kind, member, scope);
            }
            (_, JsonValue::Object(_)) => {
                let definition = &member.value;
                let type_coercion = definition
                    .get("@type")
                    .and_then(|m| m.value.as_str())
                    .map(str::to_string);
                let is_prefix = matches!(
                    definition.get("@prefix").map(|m| &m.value.value),
                    Some(JsonValue::Bool(true))
                );
                let Some(id) = definition.get("@id") else {
                    return;
                };
                let Some(iri) = id.value.as_str() else {
                    self.error(id.value.span, "@id in a term definition must be a string");
                    return;
                };
                let kind = if is_prefix {
                    BindingKind::Prefix
                } else {
                    BindingKind::Term { type_coercion }
                };
                let iri = iri.to_string();
                let namespace_span = id.value.inner_span();
                self.out.prefixes.push(PrefixDecl {
                    label: key.to_string(),
                    namespace: iri,
                    kind,
                    span: member.span(),
                    label_span: member.inner_key_span(),
                    namespace_span,
                    scope: BindingScope::Within(scope),
                });
            }
            (_, JsonValue::Null) => {}
            _ => self.error(member.value.span, format!("Invalid term definition for '{key}'")),
        }
    }

    fn bind(
        &mut self,
        label: &str,
        iri: &str,
        kind: BindingKind,
        member: &JsonMember,
        scope: SourceSpan,
    ) {
        self.out.prefixes.push(PrefixDecl {
            label: label.to_string(),
            namespace: iri.to_string(),
            kind,
            span: member.span(),
            label_span: member.inner_key_span(),
            namespace_span: member.value.inner_span(),
            scope: BindingScope::Within(scope),
        });
    }

    fn top_level(&mut self, root: &JsonNode) {
        match &root.value {
            JsonValue::Array(items) => {
                for item in items {
                    self.value_term(item, false, None);
                }
            }
            JsonValue::Object(_) => {
                self.value_term(root, false, None);
            }
            _ => self.error(root.span, "A JSON-LD document must be an object or an array"),
        }
    }

    /// The term a JSON value denotes; nested node objects emit their own statements.
    fn value_term(&mut self, node: &JsonNode, coerce_iri: bool, graph: Option<usize>) -> Option<Term> {
        match &node.value {
            JsonValue::Object(_) if node.get("@value").is_some() => Some(self.value_object(node)),
            JsonValue::Object(_) => {
                for key in ["@list", "@set"] {
                    if let Some(list) = node.get(key) {
                        self.members(&list.value, coerce_iri, graph);
                        let label = self.fresh_blank_node();
                        return Some(Term::blank(label, node.span));
                    }
                }
                Some(self.node_object(node, graph))
            }
            JsonValue::String(s) if coerce_iri => Some(self.reference(s, node.inner_span(), false)),
            JsonValue::String(s) => Some(Term::literal(s.clone(), node.span)),
            JsonValue::Number(n) => Some(Term::literal(n.clone(), node.span)),
            JsonValue::Bool(b) => Some(Term::literal(b.to_string(), node.span)),
            JsonValue::Null => None,
            JsonValue::Array(_) => {
                self.members(node, coerce_iri, graph);
                None
            }
        }
    }

    fn members(&mut self, node: &JsonNode, coerce_iri: bool, graph: Option<usize>) {
        let items: Vec<&JsonNode> = match &node.value {
            JsonValue::Array(items) => items.iter().collect(),
            _ => vec![node],
        };
        for item in items {
            if let Some(term) = self.value_term(item, coerce_iri, graph) {
                self.out.members.push(term);
            }
        }
    }

    fn value_object(&mut self, node: &JsonNode) -> Term {
        let value = match node.get("@value").map(|m| &m.value.value) {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Number(n)) => n.clone(),
            Some(JsonValue::Bool(b)) => b.to_string(),
            _ => String::new(),
        };
        let language = node
            .get("@language")
            .and_then(|m| m.value.as_str())
            .map(str::to_string);
        let datatype = node.get("@type").and_then(|m| {
            let iri = m.value.as_str()?;
            Some(Box::new(self.reference(iri, m.value.inner_span(), true)))
        });
        Term {
            value: TermValue::Literal {
                value,
                language,
                datatype,
            },
            span: node.span,
        }
    }

    fn node_object(&mut self, node: &JsonNode, graph: Option<usize>) -> Term {
        let subject = match node.get("@id") {
            Some(id) => match id.value.as_str() {
                Some(iri) => self.reference(iri, id.value.inner_span(), false),
                None => {
                    self.error(id.value.span, "@id must be a string");
                    self.anonymous(node)
                }
            },
            None => self.anonymous(node),
        };
        let Some(members) = node.members() else {
            return subject;
        };

        for member in members {
            match member.key.as_str() {
                "@type" => {
                    let predicate = Term::iri(IriRef::RdfType, member.inner_key_span());
                    for type_node in flatten(&member.value) {
                        match type_node.as_str() {
                            Some(iri) => {
                                let object = self.reference(iri, type_node.inner_span(), true);
                                self.emit(&subject, &predicate, object, graph);
                            }
                            None => self.error(type_node.span, "@type values must be strings"),
                        }
                    }
                }
                "@graph" => {
                    let index = self.out.graphs.len();
                    let label = node.get("@id").map(|_| subject.clone());
                    self.out.graphs.push(GraphBlock {
                        label,
                        span: member.value.span,
                    });
                    self.members_without_statements(&member.value, Some(index));
                }
                "@reverse" | "@included" | "@nest" => {
                    if let Some(nested) = member.value.members() {
                        for inner in nested {
                            self.members_without_statements(&inner.value, graph);
                        }
                    } else {
                        self.members_without_statements(&member.value, graph);
                    }
                }
                key if key.starts_with('@') => {}
                key => {
                    let predicate = Term::iri(
                        self.key_ref(key, member.key_span.start),
                        member.inner_key_span(),
                    );
                    let coerce = self.coerces_to_iri(key, member.key_span.start);
                    for value in flatten(&member.value) {
                        if let Some(object) = self.value_term(value, coerce, graph) {
                            self.emit(&subject, &predicate, object, graph);
                        }
                    }
                }
            }
        }
        subject
    }

    /// Node objects nested under keywords that do not produce a statement of their own.
    fn members_without_statements(&mut self, node: &JsonNode, graph: Option<usize>) {
        for item in flatten(node) {
            if matches!(item.value, JsonValue::Object(_)) {
                self.value_term(item, false, graph);
            }
        }
    }

    fn anonymous(&mut self, node: &JsonNode) -> Term {
        let label = self.fresh_blank_node();
        Term::blank(label, SourceSpan::new(node.span.start, node.span.start + 1))
    }

    fn emit(&mut self, subject: &Term, predicate: &Term, object: Term, graph: Option<usize>) {
        self.out.statements.push(Statement::new(
            subject.clone(),
            predicate.clone(),
            object,
            graph,
        ));
    }

    fn coerces_to_iri(&self, key: &str, offset: usize) -> bool {
        match active_binding(&self.out.prefixes, key, offset).map(|decl| &decl.kind) {
            Some(BindingKind::Term {
                type_coercion: Some(coercion),
            }) => coercion == "@id" || coercion == "@vocab",
            _ => false,
        }
    }

    /// A property key: compact IRI, absolute IRI or vocabulary term.
    fn key_ref(&self, key: &str, offset: usize) -> IriRef {
        self.colon_ref(key, offset)
            .unwrap_or_else(|| IriRef::Vocab(key.to_string()))
    }

    /// `p:x` is a compact IRI only where `p` may be defined, by a binding in
    /// effect at `offset` or by a context loaded by reference. Anywhere else
    /// it is an absolute IRI such as `did:example:123`. `None` without a colon.
    fn colon_ref(&self, value: &str, offset: usize) -> Option<IriRef> {
        let (prefix, local) = value.split_once(':')?;
        let definable = active_binding(&self.out.prefixes, prefix, offset).is_some()
            || self
                .out
                .remote_contexts
                .iter()
                .any(|context| context.scope.contains(offset));
        if is_absolute_iri(value) || !definable {
            return Some(IriRef::Full(value.to_string()));
        }
        Some(IriRef::Prefixed {
            prefix: prefix.to_string(),
            local: local.to_string(),
        })
    }

    /// An IRI-valued string. `vocab_relative` is set for `@type` values, which
    /// resolve bare words against the vocabulary rather than the base.
    fn reference(&self, value: &str, span: SourceSpan, vocab_relative: bool) -> Term {
        if let Some(label) = value.strip_prefix("_:") {
            return Term::blank(label, span);
        }
        let iri_ref = if let Some(iri_ref) = self.colon_ref(value, span.start) {
            iri_ref
        } else if vocab_relative {
            IriRef::Vocab(value.to_string())
        } else {
            IriRef::Full(value.to_string())
        };
        Term::iri(iri_ref, span)
    }
}

fn flatten(node: &JsonNode) -> Vec<&JsonNode> {
    match &node.value {
        JsonValue::Array(items) => items.iter().flat_map(flatten).collect(),
        _ => vec![node],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParseOutput {
        JsonLdParser.parse(text)
    }

    #[test]
    fn context_prefixes_and_statements() {
        let text = r#"{
  "@context": {"foaf": "http://xmlns.com/foaf/0.1/", "knows": {"@id": "foaf:knows", "@type": "@id"}},
  "@id": "http://example.org/me",
  "@type": "foaf:Person",
  "foaf:name": "A",
  "knows": "http://example.org/you"
}"#;
        let out = parse(text);
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert_eq!(out.prefixes.len(), 2);
        assert_eq!(out.prefixes[0].label_span.slice(text), "foaf");
        assert_eq!(out.prefixes[0].namespace_span.slice(text), "http://xmlns.com/foaf/0.1/");
        assert!(out.prefixes[0].is_prefix());
        assert_eq!(
            out.prefixes[1].kind,
            BindingKind::Term {
                type_coercion: Some("@id".into())
            }
        );

        assert_eq!(out.statements.len(), 3);
        let type_statement = &out.statements[0];
        assert_eq!(type_statement.predicate.value, TermValue::Iri(IriRef::RdfType));
        assert_eq!(type_statement.object.span.slice(text), "foaf:Person");

        let name = &out.statements[1];
        assert_eq!(name.predicate.span.slice(text), "foaf:name");
        assert!(matches!(name.object.value, TermValue::Literal { .. }));

        let knows = &out.statements[2];
        assert_eq!(
            knows.object.value,
            TermValue::Iri(IriRef::Full("http://example.org/you".into()))
        );
    }

    #[test]
    fn nested_nodes_and_value_objects() {
        let text = r#"{"@context": {"@vocab": "http://schema.org/"},
 "name": {"@value": "x", "@language": "en"},
 "author": {"name": "B"}}"#;
        let out = parse(text);
        assert!(out.errors.is_empty());
        assert_eq!(out.prefixes[0].kind, BindingKind::Vocab);
        assert_eq!(out.statements.len(), 3);
        for statement in &out.statements {
            assert!(!statement.subject.span.overlaps(&statement.predicate.span));
            assert!(!statement.predicate.span.overlaps(&statement.object.span));
            assert!(!statement.subject.span.overlaps(&statement.object.span));
        }
    }

    #[test]
    fn nested_context_scope() {
        let text = r#"{"@context": {"ex": "http://outer/"},
 "ex:a": {"@context": {"ex": "http://inner/"}, "ex:b": "c"}}"#;
        let out = parse(text);
        assert_eq!(out.prefixes.len(), 2);
        let inner_offset = text.find("ex:b").unwrap();
        let outer_offset = text.find("ex:a").unwrap();
        assert_eq!(
            active_binding(&out.prefixes, "ex", inner_offset).unwrap().namespace,
            "http://inner/"
        );
        assert_eq!(
            active_binding(&out.prefixes, "ex", outer_offset).unwrap().namespace,
            "http://outer/"
        );
    }

    #[test]
    fn undefined_prefixes_are_absolute_iris() {
        let text = r#"{"@context": {"ex": "http://example.org/"},
 "@id": "did:example:123", "@type": "isbn:0451450523", "ex:p": "x", "urn:q": "y"}"#;
        let out = parse(text);
        assert!(out.errors.is_empty(), "{:?}", out.errors);

        let iri = |slice: &str| {
            out.statements
                .iter()
                .flat_map(|s| [&s.subject, &s.predicate, &s.object])
                .find(|term| term.span.slice(text) == slice)
                .and_then(|term| term.iri_ref().cloned())
        };
        assert_eq!(iri("did:example:123"), Some(IriRef::Full("did:example:123".into())));
        assert_eq!(iri("isbn:0451450523"), Some(IriRef::Full("isbn:0451450523".into())));
        assert_eq!(iri("urn:q"), Some(IriRef::Full("urn:q".into())));
        assert_eq!(
            iri("ex:p"),
            Some(IriRef::Prefixed {
                prefix: "ex".into(),
                local: "p".into()
            })
        );
    }

    #[test]
    fn prefixes_under_a_remote_context_stay_compact() {
        let text = r#"{"@context": "https://schema.org/", "schema:name": "x"}"#;
        let out = parse(text);
        assert!(matches!(
            out.statements[0].predicate.iri_ref(),
            Some(IriRef::Prefixed { prefix, .. }) if prefix == "schema"
        ));
    }

    #[test]
    fn remote_context_is_recorded() {
        let out = parse(r#"{"@context": "https://schema.org/", "name": "x"}"#);
        assert_eq!(out.remote_contexts.len(), 1);
        assert_eq!(out.remote_contexts[0].iri, "https://schema.org/");
    }

    #[test]
    fn graph_members() {
        let out = parse(
            r#"{"@context": {"ex": "http://example.org/"}, "@graph": [{"@id": "ex:a", "ex:p": "1"}, {"@id": "ex:b", "ex:p": "2"}]}"#,
        );
        assert!(out.errors.is_empty());
        assert_eq!(out.graphs.len(), 1);
        assert_eq!(out.statements.len(), 2);
        assert!(out.statements.iter().all(|s| s.graph == Some(0)));
    }

    #[test]
    fn json_error_keeps_earlier_statements() {
        let out = parse(r#"{"@id": "http://a/", "http://p/": "x", "http://q/" "y"}"#);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.statements.len(), 1);
    }
}
