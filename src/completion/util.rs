use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::{ConstructId, Document};
use crate::syntax::{self, Dialect, IriRef, Slot, TermPosition, RDF_TYPE};

use super::Insertion;

/// The partial word before `offset` and the offset it starts at.
///
/// In Turtle this is a prefixed name or keyword. In JSON-LD it is the
/// string content between the opening quote and the cursor.
pub fn word_at(text: &str, dialect: Dialect, offset: usize) -> (usize, &str) {
    let before = &text[..offset.min(text.len())];
    let start = match dialect {
        Dialect::JsonLd => before
            .char_indices()
            .rev()
            .take_while(|(_, c)| *c != '"' && *c != '\n')
            .last()
            .map(|(i, _)| i)
            .unwrap_or(before.len()),
        Dialect::Turtle | Dialect::TriG => {
            let start = before
                .char_indices()
                .rev()
                .take_while(|(_, c)| c.is_alphanumeric() || matches!(c, '_' | '-' | ':'))
                .last()
                .map(|(i, _)| i)
                .unwrap_or(before.len());
            if before[..start].ends_with('@') {
                start - 1
            } else {
                start
            }
        }
    };
    (start, &before[start..])
}

/// The slot of the name being typed at `offset`.
///
/// When the last parse has a statement term starting where the word starts,
/// the span index decides. Text being typed rarely parses that far, so the
/// token scan of [`syntax::slot_at`] covers everything else.
pub fn slot_of(document: &Document, offset: usize) -> Slot {
    let (start, typed) = word_at(document.text(), document.dialect(), offset);
    let parsed = (!typed.is_empty())
        .then(|| document.lookup(start))
        .flatten()
        .and_then(|construct| match construct.id {
            ConstructId::Term(i, position) if construct.span.start == start => {
                statement_slot(document, i, position)
            }
            _ => None,
        });
    parsed.unwrap_or_else(|| syntax::slot_at(document.text(), document.dialect(), offset))
}

fn statement_slot(document: &Document, index: usize, position: TermPosition) -> Option<Slot> {
    let statement = document.statements().get(index)?;
    if !matches!(statement.term(position).iri_ref(), Some(IriRef::Prefixed { .. } | IriRef::Vocab(_))) {
        return None;
    }
    Some(match position {
        TermPosition::Subject => Slot::Subject,
        TermPosition::Predicate => Slot::Predicate,
        TermPosition::Object => Slot::Object {
            after_type: is_type_predicate(document, &statement.predicate),
        },
    })
}

fn is_type_predicate(document: &Document, predicate: &syntax::Term) -> bool {
    match predicate.iri_ref() {
        Some(IriRef::RdfType) => true,
        Some(IriRef::Prefixed { prefix, local }) if prefix == "rdf" && local == "type" => true,
        Some(iri_ref) => document.expand(iri_ref, predicate.span.start).as_deref() == Some(RDF_TYPE),
        None => false,
    }
}

/// Whether the declaration around `offset` uses `@prefix` rather than SPARQL `PREFIX`.
pub fn turtle_style_directive(text: &str, offset: usize) -> bool {
    let before = text[..offset.min(text.len())].to_ascii_lowercase();
    match before.rfind("prefix") {
        Some(i) => before[..i].ends_with('@'),
        None => true,
    }
}

static CONTEXT_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""@context"\s*:\s*\{"#).unwrap());

/// The edit declaring `prefix` so a completion using it is valid.
///
/// Turtle declarations go after the last existing one, in the same style.
/// JSON-LD entries go at the start of the top-level context object; a
/// document whose context is given by reference gets none.
pub fn declaration_insertion(document: &Document, prefix: &str, namespace: &str) -> Option<Insertion> {
    let text = document.text();
    match document.dialect() {
        Dialect::Turtle | Dialect::TriG => {
            let last = document
                .prefixes()
                .iter()
                .filter(|decl| decl.is_prefix())
                .max_by_key(|decl| decl.span.end);
            let Some(last) = last else {
                return Some(Insertion {
                    offset: 0,
                    text: format!("@prefix {prefix}: <{namespace}> .\n"),
                });
            };
            let declaration = if last.span.slice(text).starts_with('@') {
                format!("@prefix {prefix}: <{namespace}> .")
            } else {
                format!("PREFIX {prefix}: <{namespace}>")
            };
            Some(match text[last.span.end..].find('\n') {
                Some(i) => Insertion {
                    offset: last.span.end + i + 1,
                    text: format!("{declaration}\n"),
                },
                None => Insertion {
                    offset: text.len(),
                    text: format!("\n{declaration}"),
                },
            })
        }
        Dialect::JsonLd => {
            let entry = format!("\"{prefix}\": \"{namespace}\"");
            if let Some(m) = CONTEXT_OBJECT.find(text) {
                let separator = if next_non_whitespace(text, m.end()) == Some('}') {
                    ""
                } else {
                    ", "
                };
                return Some(Insertion {
                    offset: m.end(),
                    text: format!("{entry}{separator}"),
                });
            }
            if text.contains("\"@context\"") {
                return None;
            }
            let open = text.find('{')?;
            let separator = if next_non_whitespace(text, open + 1) == Some('}') {
                ""
            } else {
                ", "
            };
            Some(Insertion {
                offset: open + 1,
                text: format!("\"@context\": {{{entry}}}{separator}"),
            })
        }
    }
}

fn next_non_whitespace(text: &str, from: usize) -> Option<char> {
    text[from..].chars().find(|c| !c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::document;

    #[test]
    fn turtle_words() {
        let text = "ex:a foaf:na";
        assert_eq!(word_at(text, Dialect::Turtle, text.len()), (5, "foaf:na"));
        assert_eq!(word_at("@pre", Dialect::Turtle, 4), (0, "@pre"));
        assert_eq!(word_at("ex:a ", Dialect::Turtle, 5), (5, ""));
    }

    #[test]
    fn jsonld_words() {
        let text = r#"{"@type": "foaf:Pe"#;
        assert_eq!(word_at(text, Dialect::JsonLd, text.len()), (11, "foaf:Pe"));
    }

    /// Test: a parsed statement term decides the slot; unparsed text falls back to the scan
    #[test]
    fn slot_from_parsed_terms() {
        let text = "@prefix ex: <http://example.org/> .\nex:a a ex:Cl .\nex:b ex:p ex:o .";
        let doc = document(text, Dialect::Turtle);
        let end_of = |word: &str| text.find(word).unwrap() + word.len();
        assert_eq!(slot_of(&doc, end_of("ex:Cl")), Slot::Object { after_type: true });
        assert_eq!(slot_of(&doc, end_of("ex:p")), Slot::Predicate);
        assert_eq!(slot_of(&doc, end_of("ex:o")), Slot::Object { after_type: false });
        assert_eq!(slot_of(&doc, end_of("ex:b")), Slot::Subject);

        let text = "@prefix ex: <http://example.org/> .\nex:a ex:";
        let doc = document(text, Dialect::Turtle);
        assert_eq!(slot_of(&doc, text.len()), Slot::Predicate);

        let text = r#"{"@context": {"ex": "http://example.org/"}, "@type": "ex:Thing"}"#;
        let doc = document(text, Dialect::JsonLd);
        assert_eq!(slot_of(&doc, end_of_in(text, "ex:Thing")), Slot::Object { after_type: true });
    }

    fn end_of_in(text: &str, word: &str) -> usize {
        text.find(word).unwrap() + word.len()
    }

    #[test]
    fn directive_style() {
        assert!(turtle_style_directive("@prefix fo", 10));
        assert!(!turtle_style_directive("PREFIX fo", 9));
        assert!(!turtle_style_directive("@prefix a: <a> .\nprefix fo", 26));
    }

    /// Test: a new declaration follows the last one, in its style
    #[test]
    fn turtle_insertion_after_last_declaration() {
        let doc = document(
            "@prefix ex: <http://example.org/> .\n\nex:a ex:b ex:c .",
            Dialect::Turtle,
        );
        let insertion = declaration_insertion(&doc, "foaf", "http://xmlns.com/foaf/0.1/").unwrap();
        assert_eq!(insertion.offset, 36);
        assert_eq!(insertion.text, "@prefix foaf: <http://xmlns.com/foaf/0.1/> .\n");

        let doc = document("PREFIX ex: <http://example.org/>", Dialect::Turtle);
        let insertion = declaration_insertion(&doc, "foaf", "http://xmlns.com/foaf/0.1/").unwrap();
        assert_eq!(insertion.offset, doc.text().len());
        assert_eq!(insertion.text, "\nPREFIX foaf: <http://xmlns.com/foaf/0.1/>");

        let doc = document("<a> <b> <c> .", Dialect::Turtle);
        let insertion = declaration_insertion(&doc, "ex", "http://example.org/").unwrap();
        assert_eq!(insertion.offset, 0);
    }

    #[test]
    fn jsonld_insertion() {
        let doc = document(r#"{"@context": {"a": "http://a/"}, "b": 1}"#, Dialect::JsonLd);
        let insertion = declaration_insertion(&doc, "ex", "http://example.org/").unwrap();
        assert_eq!(insertion.offset, 14);
        assert_eq!(insertion.text, r#""ex": "http://example.org/", "#);

        let doc = document(r#"{"@context": {}}"#, Dialect::JsonLd);
        let insertion = declaration_insertion(&doc, "ex", "http://example.org/").unwrap();
        assert_eq!(insertion.text, r#""ex": "http://example.org/""#);

        let doc = document(r#"{"@context": "https://schema.org/"}"#, Dialect::JsonLd);
        assert!(declaration_insertion(&doc, "ex", "http://example.org/").is_none());

        let doc = document(r#"{"b": 1}"#, Dialect::JsonLd);
        let insertion = declaration_insertion(&doc, "ex", "http://example.org/").unwrap();
        assert_eq!(insertion.offset, 1);
        assert_eq!(insertion.text, r#""@context": {"ex": "http://example.org/"}, "#);
    }
}
