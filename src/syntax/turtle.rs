//! Error-recovering Turtle and TriG parser.
//!
//! On a syntax error the parser records it, skips to the end of the current
//! statement (the next `.` outside brackets, or the closing `}` of a graph
//! block) and continues. Triples completed before the error are kept.

use super::lexer::{tokenize, Token, TokenKind};
use super::{
    BaseDecl, BindingKind, BindingScope, GraphBlock, IriRef, ParseOutput, PrefixDecl, RdfParser,
    SourceSpan, Statement, SyntaxError, Term, TermValue,
};

/// Turtle parser; with `trig` set it also accepts graph blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurtleParser {
    pub trig: bool,
}

impl RdfParser for TurtleParser {
    fn parse(&self, text: &str) -> ParseOutput {
        let tokens = tokenize(text);
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            text_len: text.len(),
            trig: self.trig,
            graph: None,
            blank_nodes: 0,
            out: ParseOutput::default(),
        };
        parser.document();
        parser.out
    }
}

type PResult<T> = Result<T, SyntaxError>;

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    text_len: usize,
    trig: bool,
    graph: Option<usize>,
    blank_nodes: usize,
    out: ParseOutput,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&'t TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn peek_kind_at(&self, n: usize) -> Option<&'t TokenKind> {
        self.tokens.get(self.pos + n).map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn eof_span(&self) -> SourceSpan {
        SourceSpan::empty(self.text_len)
    }

    fn unexpected(&self, expected: &str) -> SyntaxError {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Error(message),
                span,
            }) => SyntaxError::new(*span, message.clone()),
            Some(token) => SyntaxError::new(
                token.span,
                format!("Expected {expected}, found {}", token.kind.describe()),
            ),
            None => SyntaxError::new(
                self.eof_span(),
                format!("Expected {expected}, found end of input"),
            ),
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> PResult<&'t Token> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                self.pos += 1;
                Ok(token)
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn fresh_blank_node(&mut self) -> String {
        self.blank_nodes += 1;
        format!("b{}", self.blank_nodes)
    }

    fn document(&mut self) {
        while self.peek().is_some() {
            let before = self.pos;
            if let Err(error) = self.statement() {
                self.out.errors.push(error);
                self.recover(false);
            }
            if self.pos == before {
                self.pos += 1;
            }
        }
    }

    /// Skips to just after the next top-level `.`, or to the `}` closing the current graph.
    fn recover(&mut self, in_graph: bool) {
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::LBracket | TokenKind::LParen => depth += 1,
                TokenKind::RBracket | TokenKind::RParen => depth = depth.saturating_sub(1),
                TokenKind::Dot if depth == 0 => {
                    self.pos += 1;
                    return;
                }
                TokenKind::RBrace if in_graph => return,
                TokenKind::PrefixDirective
                | TokenKind::BaseDirective
                | TokenKind::SparqlPrefix
                | TokenKind::SparqlBase
                    if depth == 0 =>
                {
                    return
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    fn statement(&mut self) -> PResult<()> {
        match self.peek_kind() {
            Some(TokenKind::PrefixDirective) => self.prefix_directive(true),
            Some(TokenKind::SparqlPrefix) => self.prefix_directive(false),
            Some(TokenKind::BaseDirective) => self.base_directive(true),
            Some(TokenKind::SparqlBase) => self.base_directive(false),
            Some(TokenKind::Graph) if self.trig => {
                self.advance();
                let label = self.graph_label()?;
                self.wrapped_graph(Some(label))
            }
            Some(TokenKind::LBrace) if self.trig => self.wrapped_graph(None),
            Some(TokenKind::IriRef(_) | TokenKind::PrefixedName { .. } | TokenKind::BlankNodeLabel(_))
                if self.trig && self.peek_kind_at(1) == Some(&TokenKind::LBrace) =>
            {
                let label = self.graph_label()?;
                self.wrapped_graph(Some(label))
            }
            Some(TokenKind::LBrace) => Err(self.unexpected("a subject")),
            _ => {
                self.triples()?;
                self.expect(TokenKind::Dot, "'.'")?;
                Ok(())
            }
        }
    }

    fn prefix_directive(&mut self, turtle_style: bool) -> PResult<()> {
        let start = self.advance().map(|t| t.span.start).unwrap_or(self.text_len);
        let (label, label_span) = match self.peek() {
            Some(Token {
                kind: TokenKind::PrefixedName { prefix, local },
                span,
            }) if local.is_empty() => {
                self.pos += 1;
                (prefix.clone(), *span)
            }
            _ => return Err(self.unexpected("a prefix name ending in ':'")),
        };
        let (namespace, namespace_span) = match self.peek() {
            Some(Token {
                kind: TokenKind::IriRef(iri),
                span,
            }) => {
                self.pos += 1;
                (iri.clone(), *span)
            }
            _ => return Err(self.unexpected("a namespace IRI")),
        };
        let end = self.directive_end(turtle_style, namespace_span.end, "'.' after @prefix");
        self.out.prefixes.push(PrefixDecl {
            label,
            namespace,
            kind: BindingKind::Prefix,
            span: SourceSpan::new(start, end),
            label_span,
            namespace_span,
            scope: BindingScope::FromOffset(start),
        });
        Ok(())
    }

    fn base_directive(&mut self, turtle_style: bool) -> PResult<()> {
        let start = self.advance().map(|t| t.span.start).unwrap_or(self.text_len);
        let (iri, iri_span) = match self.peek() {
            Some(Token {
                kind: TokenKind::IriRef(iri),
                span,
            }) => {
                self.pos += 1;
                (iri.clone(), *span)
            }
            _ => return Err(self.unexpected("a base IRI")),
        };
        let end = self.directive_end(turtle_style, iri_span.end, "'.' after @base");
        self.out.bases.push(BaseDecl {
            iri,
            span: SourceSpan::new(start, end),
            scope: BindingScope::FromOffset(start),
        });
        Ok(())
    }

    /// A missing `.` after a directive is reported without discarding the directive.
    fn directive_end(&mut self, turtle_style: bool, end: usize, expected: &str) -> usize {
        if !turtle_style {
            return end;
        }
        match self.expect(TokenKind::Dot, expected) {
            Ok(dot) => dot.span.end,
            Err(error) => {
                self.out.errors.push(error);
                end
            }
        }
    }

    fn graph_label(&mut self) -> PResult<Term> {
        match self.peek_kind() {
            Some(TokenKind::LBracket) if self.peek_kind_at(1) == Some(&TokenKind::RBracket) => {
                let start = self.advance().map(|t| t.span.start).unwrap_or(self.text_len);
                let end = self.advance().map(|t| t.span.end).unwrap_or(self.text_len);
                let label = self.fresh_blank_node();
                Ok(Term::blank(label, SourceSpan::new(start, end)))
            }
            Some(TokenKind::BlankNodeLabel(_)) => self.blank_node_label(),
            _ => self.iri(),
        }
    }

    fn wrapped_graph(&mut self, label: Option<Term>) -> PResult<()> {
        let open = self.expect(TokenKind::LBrace, "'{'")?;
        let start = label.as_ref().map(|l| l.span.start).unwrap_or(open.span.start);
        let index = self.out.graphs.len();
        self.out.graphs.push(GraphBlock {
            label,
            span: SourceSpan::new(start, open.span.end),
        });

        let outer = self.graph.replace(index);
        let result = self.graph_body();
        self.graph = outer;

        let end = match result {
            Ok(end) => end,
            Err(error) => {
                self.out.graphs[index].span.end = self.text_len;
                return Err(error);
            }
        };
        self.out.graphs[index].span.end = end;
        Ok(())
    }

    /// Statements of a graph block up to and including the closing brace.
    fn graph_body(&mut self) -> PResult<usize> {
        loop {
            match self.peek_kind() {
                Some(TokenKind::RBrace) => {
                    let close = self.advance().map(|t| t.span.end).unwrap_or(self.text_len);
                    return Ok(close);
                }
                None => return Err(self.unexpected("'}'")),
                _ => {}
            }
            let before = self.pos;
            let result = self.triples().and_then(|_| match self.peek_kind() {
                Some(TokenKind::Dot) => {
                    self.pos += 1;
                    Ok(())
                }
                Some(TokenKind::RBrace) => Ok(()),
                _ => Err(self.unexpected("'.' or '}'")),
            });
            if let Err(error) = result {
                self.out.errors.push(error);
                self.recover(true);
            }
            if self.pos == before {
                self.pos += 1;
            }
        }
    }

    fn triples(&mut self) -> PResult<()> {
        match self.peek_kind() {
            Some(TokenKind::LBracket) => {
                let subject = self.blank_node_property_list()?;
                if self.starts_verb() {
                    self.predicate_object_list(&subject)?;
                }
                Ok(())
            }
            _ => {
                let subject = self.subject()?;
                self.predicate_object_list(&subject)
            }
        }
    }

    fn starts_verb(&self) -> bool {
        matches!(
            self.peek_kind(),
            Some(TokenKind::A | TokenKind::IriRef(_) | TokenKind::PrefixedName { .. })
        )
    }

    fn subject(&mut self) -> PResult<Term> {
        match self.peek_kind() {
            Some(TokenKind::BlankNodeLabel(_)) => self.blank_node_label(),
            Some(TokenKind::LParen) => self.collection(),
            Some(TokenKind::IriRef(_) | TokenKind::PrefixedName { .. }) => self.iri(),
            _ => Err(self.unexpected("a subject")),
        }
    }

    fn iri(&mut self) -> PResult<Term> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::IriRef(iri),
                span,
            }) => {
                self.pos += 1;
                Ok(Term::iri(IriRef::Full(iri.clone()), *span))
            }
            Some(Token {
                kind: TokenKind::PrefixedName { prefix, local },
                span,
            }) => {
                self.pos += 1;
                Ok(Term::iri(
                    IriRef::Prefixed {
                        prefix: prefix.clone(),
                        local: local.clone(),
                    },
                    *span,
                ))
            }
            _ => Err(self.unexpected("an IRI")),
        }
    }

    fn blank_node_label(&mut self) -> PResult<Term> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::BlankNodeLabel(label),
                span,
            }) => {
                self.pos += 1;
                Ok(Term::blank(label.clone(), *span))
            }
            _ => Err(self.unexpected("a blank node")),
        }
    }

    fn verb(&mut self) -> PResult<Term> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::A,
                span,
            }) => {
                self.pos += 1;
                Ok(Term::iri(IriRef::RdfType, *span))
            }
            _ => self.iri().map_err(|_| self.unexpected("a predicate")),
        }
    }

    fn predicate_object_list(&mut self, subject: &Term) -> PResult<()> {
        loop {
            let predicate = self.verb()?;
            self.object_list(subject, &predicate)?;

            if self.peek_kind() != Some(&TokenKind::Semicolon) {
                return Ok(());
            }
            while self.peek_kind() == Some(&TokenKind::Semicolon) {
                self.pos += 1;
            }
            if !self.starts_verb() {
                return Ok(());
            }
        }
    }

    fn object_list(&mut self, subject: &Term, predicate: &Term) -> PResult<()> {
        loop {
            let object = self.object()?;
            self.out.statements.push(Statement::new(
                subject.clone(),
                predicate.clone(),
                object,
                self.graph,
            ));
            if self.peek_kind() != Some(&TokenKind::Comma) {
                return Ok(());
            }
            self.pos += 1;
        }
    }

    fn object(&mut self) -> PResult<Term> {
        match self.peek_kind() {
            Some(TokenKind::IriRef(_) | TokenKind::PrefixedName { .. }) => self.iri(),
            Some(TokenKind::BlankNodeLabel(_)) => self.blank_node_label(),
            Some(TokenKind::LParen) => self.collection(),
            Some(TokenKind::LBracket) => self.blank_node_property_list(),
            Some(TokenKind::String(_)) => self.rdf_literal(),
            Some(TokenKind::Number(n)) => {
                let span = self.advance().map(|t| t.span).unwrap_or_default();
                Ok(Term::literal(n.clone(), span))
            }
            Some(TokenKind::Boolean(b)) => {
                let span = self.advance().map(|t| t.span).unwrap_or_default();
                Ok(Term::literal(b.to_string(), span))
            }
            _ => Err(self.unexpected("an object")),
        }
    }

    fn rdf_literal(&mut self) -> PResult<Term> {
        let (value, span) = match self.advance() {
            Some(Token {
                kind: TokenKind::String(value),
                span,
            }) => (value.clone(), *span),
            _ => return Err(self.unexpected("a string literal")),
        };
        match self.peek() {
            Some(Token {
                kind: TokenKind::LangTag(tag),
                span: tag_span,
            }) => {
                self.pos += 1;
                Ok(Term {
                    value: TermValue::Literal {
                        value,
                        language: Some(tag.clone()),
                        datatype: None,
                    },
                    span: span.hull(tag_span),
                })
            }
            Some(Token {
                kind: TokenKind::DoubleCaret,
                ..
            }) => {
                self.pos += 1;
                let datatype = self.iri()?;
                let full = span.hull(&datatype.span);
                Ok(Term {
                    value: TermValue::Literal {
                        value,
                        language: None,
                        datatype: Some(Box::new(datatype)),
                    },
                    span: full,
                })
            }
            _ => Ok(Term::literal(value, span)),
        }
    }

    /// `[ p o ; ... ]`; the inner triples use the opening bracket as their subject span.
    fn blank_node_property_list(&mut self) -> PResult<Term> {
        let open = self.expect(TokenKind::LBracket, "'['")?;
        let label = self.fresh_blank_node();
        let inner_subject = Term::blank(label.clone(), open.span);
        if self.starts_verb() {
            self.predicate_object_list(&inner_subject)?;
        }
        let close = self.expect(TokenKind::RBracket, "']'")?;
        Ok(Term::blank(label, open.span.hull(&close.span)))
    }

    fn collection(&mut self) -> PResult<Term> {
        let open = self.expect(TokenKind::LParen, "'('")?;
        loop {
            if let Some(TokenKind::RParen) = self.peek_kind() {
                let close = self.advance().map(|t| t.span).unwrap_or(open.span);
                let label = self.fresh_blank_node();
                return Ok(Term::blank(label, open.span.hull(&close)));
            }
            let member = self.object()?;
            self.out.members.push(member);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParseOutput {
        TurtleParser { trig: false }.parse(text)
    }

    fn parse_trig(text: &str) -> ParseOutput {
        TurtleParser { trig: true }.parse(text)
    }

    #[test]
    fn foaf_document() {
        let text = "@prefix foaf: <http://xmlns.com/foaf/0.1/> .\n<#me> foaf:name \"A\" .";
        let out = parse(text);

        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert_eq!(out.prefixes.len(), 1);
        assert_eq!(out.prefixes[0].label, "foaf");
        assert_eq!(out.prefixes[0].namespace, "http://xmlns.com/foaf/0.1/");
        assert_eq!(out.prefixes[0].span, SourceSpan::new(0, 44));
        assert_eq!(out.prefixes[0].label_span.slice(text), "foaf:");

        assert_eq!(out.statements.len(), 1);
        let statement = &out.statements[0];
        assert_eq!(statement.subject.span.slice(text), "<#me>");
        assert_eq!(statement.predicate.span.slice(text), "foaf:name");
        assert_eq!(statement.object.span.slice(text), "\"A\"");
        assert_eq!(statement.span.slice(text), "<#me> foaf:name \"A\"");
    }

    #[test]
    fn predicate_and_object_lists() {
        let out = parse("@prefix ex: <http://example.org/> .\nex:a a ex:C ; ex:p ex:o1, ex:o2 .");
        assert!(out.errors.is_empty());
        assert_eq!(out.statements.len(), 3);
        assert_eq!(out.statements[0].predicate.value, TermValue::Iri(IriRef::RdfType));
    }

    #[test]
    fn sparql_style_directives() {
        let out = parse("PREFIX ex: <http://example.org/>\nBASE <http://base/>\nex:a ex:b ex:c .");
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert_eq!(out.prefixes.len(), 1);
        assert_eq!(out.bases[0].iri, "http://base/");
        assert_eq!(out.statements.len(), 1);
    }

    #[test]
    fn blank_node_terms_do_not_overlap() {
        let text = "@prefix ex: <http://example.org/> .\nex:a ex:p [ ex:q \"v\" ] .";
        let out = parse(text);
        assert!(out.errors.is_empty());
        assert_eq!(out.statements.len(), 2);
        for statement in &out.statements {
            let terms = statement.terms();
            for (i, (_, a)) in terms.iter().enumerate() {
                assert!(statement.span.contains_span(&a.span));
                for (_, b) in terms.iter().skip(i + 1) {
                    assert!(!a.span.overlaps(&b.span), "{:?} overlaps {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn literal_with_datatype() {
        let text = "@prefix xsd: <http://www.w3.org/2001/XMLSchema#> .\n<a> <b> \"1\"^^xsd:int .";
        let out = parse(text);
        let object = &out.statements[0].object;
        assert_eq!(object.span.slice(text), "\"1\"^^xsd:int");
        assert_eq!(object.datatype().unwrap().span.slice(text), "xsd:int");
    }

    #[test]
    fn recovers_after_error_and_keeps_earlier_statements() {
        let text = "<a> <b> <c> .\n<d> <e> .\n<f> <g> <h> .";
        let out = parse(text);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.statements.len(), 2);
        assert_eq!(out.statements[1].subject.span.slice(text), "<f>");
    }

    #[test]
    fn partial_triple_before_error_is_kept() {
        let out = parse("<a> <b> <c> ; <d> .");
        assert_eq!(out.statements.len(), 1);
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn missing_final_dot() {
        let text = "<a> <b> <c>";
        let out = parse(text);
        assert_eq!(out.statements.len(), 1);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].span, SourceSpan::empty(text.len()));
    }

    #[test]
    fn prefix_without_dot_still_binds() {
        let out = parse("@prefix ex: <http://example.org/>\nex:a ex:b ex:c .");
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.prefixes.len(), 1);
        assert_eq!(out.statements.len(), 1);
    }

    #[test]
    fn collection_members() {
        let out = parse("<a> <b> ( <c> \"d\" ) .");
        assert!(out.errors.is_empty());
        assert_eq!(out.statements.len(), 1);
        assert_eq!(out.members.len(), 2);
    }

    #[test]
    fn trig_graph_blocks() {
        let text = "@prefix ex: <http://example.org/> .\nex:g { ex:a ex:b ex:c . ex:d ex:e ex:f }\nGRAPH ex:h { ex:i ex:j ex:k }";
        let out = parse_trig(text);
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert_eq!(out.graphs.len(), 2);
        assert_eq!(out.statements.len(), 3);
        assert_eq!(out.statements[0].graph, Some(0));
        assert_eq!(out.statements[2].graph, Some(1));
        assert_eq!(out.graphs[0].span.slice(text), "ex:g { ex:a ex:b ex:c . ex:d ex:e ex:f }");
    }

    #[test]
    fn braces_are_rejected_in_turtle() {
        let out = parse("{ <a> <b> <c> }");
        assert!(!out.errors.is_empty());
    }

    #[test]
    fn trig_error_inside_graph_recovers_at_brace() {
        let out = parse_trig("<g> { <a> <b> . <c> <d> <e> }\n<f> <g> <h> .");
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.statements.len(), 2);
    }
}
