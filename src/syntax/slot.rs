//! What the grammar expects at a cursor.
//!
//! Completion runs on text that is being typed and rarely parses, so this
//! works from tokens (Turtle, TriG) or raw characters (JSON-LD) up to the
//! cursor instead of from the parse tree. Completion asks the span index
//! first and only falls back to this scan when no parsed statement term
//! starts at the word being typed.

use super::lexer::{tokenize, TokenKind};
use super::{Dialect, RDF_TYPE};

/// The syntactic role of the word under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Slot {
    Subject,
    Predicate,
    /// `after_type` is set after `a`, `rdf:type` or a JSON-LD `@type` key.
    Object { after_type: bool },
    /// The label of a prefix declaration or a JSON-LD context key.
    PrefixLabel,
    /// The namespace of the declaration binding `label`.
    PrefixNamespace { label: String },
    /// Inside a literal, comment or IRI, or between tokens.
    Other,
}

pub fn slot_at(text: &str, dialect: Dialect, offset: usize) -> Slot {
    let offset = floor_char_boundary(text, offset);
    match dialect {
        Dialect::Turtle | Dialect::TriG => turtle_slot(&text[..offset]),
        Dialect::JsonLd => jsonld_slot(&text[..offset]),
    }
}

fn floor_char_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Subject,
    Verb,
    Object,
    AfterObject,
    Datatype,
    GraphLabel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Root,
    Graph,
    PropertyList,
    Collection,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    kind: FrameKind,
    expect: Expect,
    after_type: bool,
}

impl Frame {
    fn new(kind: FrameKind, expect: Expect) -> Frame {
        Frame {
            kind,
            expect,
            after_type: false,
        }
    }

    /// A complete term was read in the current position.
    fn consume(&mut self, kind: &TokenKind) {
        self.expect = match self.expect {
            Expect::Subject | Expect::AfterObject => Expect::Verb,
            Expect::Verb => {
                self.after_type = is_type_predicate(kind);
                Expect::Object
            }
            Expect::Object if self.kind == FrameKind::Collection => Expect::Object,
            Expect::Object | Expect::Datatype => Expect::AfterObject,
            Expect::GraphLabel => Expect::Subject,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive {
    Label { turtle: bool },
    Namespace { turtle: bool, label: String },
    Base { turtle: bool },
    End,
}

fn is_type_predicate(kind: &TokenKind) -> bool {
    match kind {
        TokenKind::A => true,
        TokenKind::PrefixedName { prefix, local } => prefix == "rdf" && local == "type",
        TokenKind::IriRef(iri) => iri == RDF_TYPE,
        _ => false,
    }
}

fn turtle_slot(before: &str) -> Slot {
    let mut tokens = tokenize(before);

    let last_end = tokens.last().map(|t| t.span.end).unwrap_or(0);
    let tail = &before[last_end..];
    if tail.rsplit('\n').next().is_some_and(|line| line.contains('#')) {
        return Slot::Other;
    }

    // the word being typed is not part of the context
    if let Some(last) = tokens.last() {
        if last.span.end == before.len() {
            if before[last.span.start..].starts_with(&['"', '\'', '<'][..]) {
                return Slot::Other;
            }
            if !is_punctuation(&last.kind) {
                tokens.pop();
            }
        }
    }

    let mut frames = vec![Frame::new(FrameKind::Root, Expect::Subject)];
    let mut directive: Option<Directive> = None;

    for token in &tokens {
        if let Some(current) = directive.take() {
            let (next, handled) = match (current, &token.kind) {
                (Directive::Label { turtle }, TokenKind::PrefixedName { prefix, local })
                    if local.is_empty() =>
                {
                    let label = prefix.clone();
                    (Some(Directive::Namespace { turtle, label }), true)
                }
                (Directive::Namespace { turtle: true, .. }, TokenKind::IriRef(_))
                | (Directive::Base { turtle: true }, TokenKind::IriRef(_)) => {
                    (Some(Directive::End), true)
                }
                (Directive::Namespace { turtle: false, .. }, TokenKind::IriRef(_))
                | (Directive::Base { turtle: false }, TokenKind::IriRef(_))
                | (Directive::End, TokenKind::Dot) => (None, true),
                // a broken directive ends it; the token starts a statement
                _ => {
                    frames.truncate(1);
                    frames[0] = Frame::new(FrameKind::Root, Expect::Subject);
                    (None, false)
                }
            };
            directive = next;
            if handled {
                continue;
            }
        }

        let Some(top) = frames.last_mut() else {
            frames.push(Frame::new(FrameKind::Root, Expect::Subject));
            continue;
        };
        match &token.kind {
            TokenKind::PrefixDirective => directive = Some(Directive::Label { turtle: true }),
            TokenKind::SparqlPrefix => directive = Some(Directive::Label { turtle: false }),
            TokenKind::BaseDirective => directive = Some(Directive::Base { turtle: true }),
            TokenKind::SparqlBase => directive = Some(Directive::Base { turtle: false }),
            TokenKind::Graph => top.expect = Expect::GraphLabel,
            TokenKind::DoubleCaret => top.expect = Expect::Datatype,
            TokenKind::Comma => top.expect = Expect::Object,
            TokenKind::Semicolon => {
                top.expect = Expect::Verb;
                top.after_type = false;
            }
            TokenKind::Dot => {
                if matches!(top.kind, FrameKind::Root | FrameKind::Graph) {
                    top.expect = Expect::Subject;
                    top.after_type = false;
                }
            }
            TokenKind::LBracket => {
                top.consume(&token.kind);
                frames.push(Frame::new(FrameKind::PropertyList, Expect::Verb));
            }
            TokenKind::LParen => {
                top.consume(&token.kind);
                frames.push(Frame::new(FrameKind::Collection, Expect::Object));
            }
            TokenKind::LBrace => {
                top.expect = Expect::Subject;
                frames.push(Frame::new(FrameKind::Graph, Expect::Subject));
            }
            TokenKind::RBracket => {
                if top.kind == FrameKind::PropertyList {
                    frames.pop();
                }
            }
            TokenKind::RParen => {
                if top.kind == FrameKind::Collection {
                    frames.pop();
                }
            }
            TokenKind::RBrace => {
                while let Some(frame) = frames.pop() {
                    if frame.kind == FrameKind::Graph {
                        break;
                    }
                }
                if frames.is_empty() {
                    frames.push(Frame::new(FrameKind::Root, Expect::Subject));
                }
            }
            TokenKind::LangTag(_) | TokenKind::Error(_) => {}
            TokenKind::IriRef(_)
            | TokenKind::PrefixedName { .. }
            | TokenKind::BlankNodeLabel(_)
            | TokenKind::String(_)
            | TokenKind::Number(_)
            | TokenKind::Boolean(_)
            | TokenKind::A => top.consume(&token.kind),
        }
    }

    match directive {
        Some(Directive::Label { .. }) => return Slot::PrefixLabel,
        Some(Directive::Namespace { label, .. }) => return Slot::PrefixNamespace { label },
        Some(_) => return Slot::Other,
        None => {}
    }
    match frames.last() {
        Some(frame) => match frame.expect {
            Expect::Subject => Slot::Subject,
            Expect::Verb => Slot::Predicate,
            Expect::Object => Slot::Object {
                after_type: frame.after_type,
            },
            Expect::Datatype => Slot::Object { after_type: false },
            Expect::AfterObject | Expect::GraphLabel => Slot::Other,
        },
        None => Slot::Subject,
    }
}

fn is_punctuation(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Dot
            | TokenKind::Semicolon
            | TokenKind::Comma
            | TokenKind::LBracket
            | TokenKind::RBracket
            | TokenKind::LParen
            | TokenKind::RParen
            | TokenKind::LBrace
            | TokenKind::RBrace
            | TokenKind::DoubleCaret
    )
}

#[derive(Debug, Clone)]
struct Container {
    object: bool,
    key: Option<String>,
    in_value: bool,
    in_context: bool,
}

/// Completion in JSON-LD only happens inside strings.
fn jsonld_slot(before: &str) -> Slot {
    let mut stack: Vec<Container> = Vec::new();
    let mut string: Option<String> = None;
    let mut escaped = false;

    for c in before.chars() {
        if let Some(current) = string.as_mut() {
            match c {
                _ if escaped => {
                    escaped = false;
                    current.push(c);
                }
                '\\' => escaped = true,
                '"' => {
                    let finished = string.take().unwrap_or_default();
                    if let Some(top) = stack.last_mut() {
                        if top.object && !top.in_value {
                            top.key = Some(finished);
                        }
                    }
                }
                _ => current.push(c),
            }
            continue;
        }
        match c {
            '"' => string = Some(String::new()),
            '{' | '[' => {
                let (key, in_value, in_context) = match stack.last() {
                    Some(parent) => (
                        parent.key.clone(),
                        parent.in_value,
                        parent.in_context
                            || (parent.in_value && parent.key.as_deref() == Some("@context")),
                    ),
                    None => (None, false, false),
                };
                let object = c == '{';
                stack.push(Container {
                    object,
                    // arrays keep the key their items belong to
                    key: if object { None } else { key },
                    in_value: !object && in_value,
                    in_context,
                });
            }
            '}' | ']' => {
                stack.pop();
            }
            ':' => {
                if let Some(top) = stack.last_mut() {
                    if top.object {
                        top.in_value = true;
                    }
                }
            }
            ',' => {
                if let Some(top) = stack.last_mut() {
                    if top.object {
                        top.in_value = false;
                        top.key = None;
                    }
                }
            }
            _ => {}
        }
    }

    if string.is_none() {
        return Slot::Other;
    }
    let Some(top) = stack.last() else {
        return Slot::Other;
    };
    if !top.in_value {
        return if top.in_context {
            Slot::PrefixLabel
        } else {
            Slot::Predicate
        };
    }
    match top.key.as_deref() {
        Some("@type") if !top.in_context => Slot::Object { after_type: true },
        Some("@id") if !top.in_context => Slot::Subject,
        Some("@context") | Some("@vocab") | Some("@base") | Some("@language") => Slot::Other,
        Some(key) if top.in_context && !key.starts_with('@') => Slot::PrefixNamespace {
            label: key.to_string(),
        },
        Some(_) if top.in_context => Slot::Other,
        _ => Slot::Object { after_type: false },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turtle(text: &str) -> Slot {
        slot_at(text, Dialect::Turtle, text.len())
    }

    fn jsonld(text: &str) -> Slot {
        slot_at(text, Dialect::JsonLd, text.len())
    }

    #[test]
    fn turtle_statement_positions() {
        assert_eq!(turtle(""), Slot::Subject);
        assert_eq!(turtle("ex:a "), Slot::Predicate);
        assert_eq!(turtle("ex:a ex:"), Slot::Predicate);
        assert_eq!(turtle("ex:a ex:b "), Slot::Object { after_type: false });
        assert_eq!(turtle("ex:a a fo"), Slot::Object { after_type: true });
        assert_eq!(turtle("ex:a rdf:type ex:C , "), Slot::Object { after_type: true });
        assert_eq!(turtle("ex:a ex:b ex:c ; "), Slot::Predicate);
        assert_eq!(turtle("ex:a ex:b ex:c .\n"), Slot::Subject);
        assert_eq!(turtle("ex:a ex:b ex:c "), Slot::Other);
    }

    #[test]
    fn turtle_nested_positions() {
        assert_eq!(turtle("ex:a ex:b [ "), Slot::Predicate);
        assert_eq!(turtle("ex:a ex:b [ ex:c ex:d ] ; "), Slot::Predicate);
        assert_eq!(turtle("ex:a ex:b ( ex:c "), Slot::Object { after_type: false });
        assert_eq!(turtle("ex:a ex:b \"x\"^^"), Slot::Object { after_type: false });
    }

    #[test]
    fn turtle_directives() {
        assert_eq!(turtle("@prefix "), Slot::PrefixLabel);
        assert_eq!(turtle("@prefix fo"), Slot::PrefixLabel);
        assert_eq!(
            turtle("@prefix foaf: "),
            Slot::PrefixNamespace {
                label: "foaf".to_string()
            }
        );
        assert_eq!(turtle("PREFIX ex: <http://example.org/>\n"), Slot::Subject);
        assert_eq!(turtle("@prefix ex: <http://example.org/> .\nex:"), Slot::Subject);
    }

    #[test]
    fn turtle_literals_comments_and_iris() {
        assert_eq!(turtle("ex:a ex:b \"hel"), Slot::Other);
        assert_eq!(turtle("ex:a ex:b <http://exa"), Slot::Other);
        assert_eq!(turtle("# a comment ex:"), Slot::Other);
        assert_eq!(turtle("# a comment\nex:"), Slot::Subject);
    }

    #[test]
    fn trig_graph_blocks() {
        let text = "GRAPH ex:g { ex:a ";
        assert_eq!(slot_at(text, Dialect::TriG, text.len()), Slot::Predicate);
        let text = "ex:g { ex:a ex:b ex:c } ";
        assert_eq!(slot_at(text, Dialect::TriG, text.len()), Slot::Subject);
    }

    #[test]
    fn jsonld_positions() {
        assert_eq!(jsonld(r#"{"na"#), Slot::Predicate);
        assert_eq!(jsonld(r#"{"name": "A", "@type": "Per"#), Slot::Object { after_type: true });
        assert_eq!(jsonld(r#"{"@type": ["foaf:Person", "sc"#), Slot::Object { after_type: true });
        assert_eq!(jsonld(r#"{"knows": "ex:"#), Slot::Object { after_type: false });
        assert_eq!(jsonld(r#"{"@context": {"fo"#), Slot::PrefixLabel);
        assert_eq!(
            jsonld(r#"{"@context": {"foaf": "http"#),
            Slot::PrefixNamespace {
                label: "foaf".to_string()
            }
        );
        assert_eq!(jsonld(r#"{"name": 3"#), Slot::Other);
    }
}
