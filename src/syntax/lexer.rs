//! Tokenizer shared by the Turtle and TriG parsers.
//!
//! Lexical problems never stop tokenization; they become
//! [`TokenKind::Error`] tokens that the parser reports and recovers from.

use super::SourceSpan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    IriRef(String),
    PrefixedName { prefix: String, local: String },
    BlankNodeLabel(String),
    String(String),
    LangTag(String),
    Number(String),
    Boolean(bool),
    A,
    /// `@prefix`
    PrefixDirective,
    /// `@base`
    BaseDirective,
    /// SPARQL-style `PREFIX`
    SparqlPrefix,
    /// SPARQL-style `BASE`
    SparqlBase,
    Graph,
    Dot,
    Semicolon,
    Comma,
    LBracket,
    RBracket,
    LParen,
    RParen,
    LBrace,
    RBrace,
    DoubleCaret,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: SourceSpan,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::IriRef(iri) => format!("<{iri}>"),
            TokenKind::PrefixedName { prefix, local } => format!("{prefix}:{local}"),
            TokenKind::BlankNodeLabel(label) => format!("_:{label}"),
            TokenKind::String(_) => "string literal".to_string(),
            TokenKind::LangTag(tag) => format!("@{tag}"),
            TokenKind::Number(n) => n.clone(),
            TokenKind::Boolean(b) => b.to_string(),
            TokenKind::A => "'a'".to_string(),
            TokenKind::PrefixDirective => "@prefix".to_string(),
            TokenKind::BaseDirective => "@base".to_string(),
            TokenKind::SparqlPrefix => "PREFIX".to_string(),
            TokenKind::SparqlBase => "BASE".to_string(),
            TokenKind::Graph => "GRAPH".to_string(),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Semicolon => "';'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBrace => "'{'".to_string(),
            TokenKind::RBrace => "'}'".to_string(),
            TokenKind::DoubleCaret => "'^^'".to_string(),
            TokenKind::Error(message) => message.clone(),
        }
    }
}

pub(crate) fn tokenize(text: &str) -> Vec<Token> {
    let mut lexer = Lexer { text, pos: 0 };
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next_token() {
        tokens.push(token);
    }
    tokens
}

struct Lexer<'t> {
    text: &'t str,
    pos: usize,
}

impl<'t> Lexer<'t> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.text[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.bump();
                }
            } else {
                break;
            }
        }
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            span: SourceSpan::new(start, self.pos),
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        self.skip_trivia();
        let start = self.pos;
        let c = self.peek()?;

        let token = match c {
            '<' => self.iri(start),
            '"' | '\'' => self.string(start, c),
            '@' => self.at_word(start),
            '^' => {
                self.bump();
                if self.peek() == Some('^') {
                    self.bump();
                    self.token(TokenKind::DoubleCaret, start)
                } else {
                    self.token(TokenKind::Error("Expected '^^'".into()), start)
                }
            }
            '_' if self.peek_at(1) == Some(':') => {
                self.bump();
                self.bump();
                let name = self.name_chars();
                self.token(TokenKind::BlankNodeLabel(name), start)
            }
            '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.number(start),
            '+' | '-' => self.number(start),
            c if c.is_ascii_digit() => self.number(start),
            '.' => self.punct(TokenKind::Dot, start),
            ';' => self.punct(TokenKind::Semicolon, start),
            ',' => self.punct(TokenKind::Comma, start),
            '[' => self.punct(TokenKind::LBracket, start),
            ']' => self.punct(TokenKind::RBracket, start),
            '(' => self.punct(TokenKind::LParen, start),
            ')' => self.punct(TokenKind::RParen, start),
            '{' => self.punct(TokenKind::LBrace, start),
            '}' => self.punct(TokenKind::RBrace, start),
            c if is_name_start(c) || c == ':' => self.word(start),
            c => {
                self.bump();
                self.token(TokenKind::Error(format!("Unexpected character '{c}'")), start)
            }
        };
        Some(token)
    }

    fn punct(&mut self, kind: TokenKind, start: usize) -> Token {
        self.bump();
        self.token(kind, start)
    }

    fn iri(&mut self, start: usize) -> Token {
        self.bump();
        let content_start = self.pos;
        while let Some(c) = self.peek() {
            match c {
                '>' => {
                    let iri = self.text[content_start..self.pos].to_string();
                    self.bump();
                    return self.token(TokenKind::IriRef(iri), start);
                }
                c if c.is_whitespace() || c == '<' || c == '"' => break,
                _ => {
                    self.bump();
                }
            }
        }
        self.token(TokenKind::Error("Unterminated IRI".into()), start)
    }

    fn string(&mut self, start: usize, quote: char) -> Token {
        let long = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        let delimiter_len = if long { 3 } else { 1 };
        for _ in 0..delimiter_len {
            self.bump();
        }

        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                return self.token(TokenKind::Error("Unterminated string literal".into()), start);
            };
            if c == quote {
                if !long {
                    self.bump();
                    return self.token(TokenKind::String(value), start);
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.bump();
                    self.bump();
                    self.bump();
                    return self.token(TokenKind::String(value), start);
                }
            }
            if !long && (c == '\n' || c == '\r') {
                return self.token(TokenKind::Error("Unterminated string literal".into()), start);
            }
            self.bump();
            if c == '\\' {
                match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('b') => value.push('\u{8}'),
                    Some('f') => value.push('\u{c}'),
                    Some('u') => value.push(self.unicode_escape(4)),
                    Some('U') => value.push(self.unicode_escape(8)),
                    Some(other) => value.push(other),
                    None => {}
                }
            } else {
                value.push(c);
            }
        }
    }

    fn unicode_escape(&mut self, digits: usize) -> char {
        let hex_start = self.pos;
        for _ in 0..digits {
            if self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.bump();
            }
        }
        u32::from_str_radix(&self.text[hex_start..self.pos], 16)
            .ok()
            .and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    fn at_word(&mut self, start: usize) -> Token {
        self.bump();
        let word_start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '-' {
                self.bump();
            } else {
                break;
            }
        }
        match &self.text[word_start..self.pos] {
            "prefix" => self.token(TokenKind::PrefixDirective, start),
            "base" => self.token(TokenKind::BaseDirective, start),
            "" => self.token(TokenKind::Error("Expected a directive or language tag".into()), start),
            tag => {
                let tag = tag.to_string();
                self.token(TokenKind::LangTag(tag), start)
            }
        }
    }

    fn number(&mut self, start: usize) -> Token {
        if matches!(self.peek(), Some('+' | '-')) {
            self.bump();
        }
        let digits_start = self.pos;
        self.digits();
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let exponent_ok = match self.peek_at(1) {
                Some('+' | '-') => self.peek_at(2).is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if exponent_ok {
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
                self.digits();
            }
        }
        if self.pos == digits_start {
            return self.token(TokenKind::Error("Expected a number".into()), start);
        }
        let number = self.text[start..self.pos].to_string();
        self.token(TokenKind::Number(number), start)
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    /// Reads name characters, leaving a trailing `.` for the statement terminator.
    fn name_chars(&mut self) -> String {
        let name_start = self.pos;
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.bump();
                self.bump();
            } else if is_name_char(c) || c == ':' || c == '.' || c == '%' {
                self.bump();
            } else {
                break;
            }
        }
        while self.pos > name_start && self.text[..self.pos].ends_with('.') {
            self.pos -= 1;
        }
        self.text[name_start..self.pos].to_string()
    }

    fn word(&mut self, start: usize) -> Token {
        let word = self.name_chars();
        if let Some((prefix, local)) = word.split_once(':') {
            return self.token(
                TokenKind::PrefixedName {
                    prefix: prefix.to_string(),
                    local: local.replace('\\', ""),
                },
                start,
            );
        }
        let kind = match word.as_str() {
            "a" => TokenKind::A,
            "true" => TokenKind::Boolean(true),
            "false" => TokenKind::Boolean(false),
            w if w.eq_ignore_ascii_case("prefix") => TokenKind::SparqlPrefix,
            w if w.eq_ignore_ascii_case("base") => TokenKind::SparqlBase,
            w if w.eq_ignore_ascii_case("graph") => TokenKind::Graph,
            w => TokenKind::Error(format!("Unexpected word '{w}'")),
        };
        self.token(kind, start)
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '\u{b7}'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn prefix_directive_tokens() {
        let tokens = tokenize("@prefix ex: <http://example.org/> .");
        assert_eq!(tokens[0].kind, TokenKind::PrefixDirective);
        assert_eq!(
            tokens[1].kind,
            TokenKind::PrefixedName {
                prefix: "ex".into(),
                local: "".into()
            }
        );
        assert_eq!(tokens[1].span, SourceSpan::new(8, 11));
        assert_eq!(tokens[2].kind, TokenKind::IriRef("http://example.org/".into()));
        assert_eq!(tokens[3].kind, TokenKind::Dot);
    }

    #[test]
    fn trailing_dot_is_not_part_of_name() {
        assert_eq!(
            kinds("ex:a ex:b ex:c."),
            vec![
                TokenKind::PrefixedName {
                    prefix: "ex".into(),
                    local: "a".into()
                },
                TokenKind::PrefixedName {
                    prefix: "ex".into(),
                    local: "b".into()
                },
                TokenKind::PrefixedName {
                    prefix: "ex".into(),
                    local: "c".into()
                },
                TokenKind::Dot,
            ]
        );
    }

    #[test]
    fn literals_and_numbers() {
        assert_eq!(
            kinds(r#""a\"b"@en 42. """x"y""" -1.5e3"#),
            vec![
                TokenKind::String("a\"b".into()),
                TokenKind::LangTag("en".into()),
                TokenKind::Number("42".into()),
                TokenKind::Dot,
                TokenKind::String("x\"y".into()),
                TokenKind::Number("-1.5e3".into()),
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(kinds("# comment\n a # more\n"), vec![TokenKind::A]);
    }

    #[test]
    fn unterminated_string_is_an_error_token() {
        let tokens = tokenize("\"abc\nex:a");
        assert!(matches!(tokens[0].kind, TokenKind::Error(_)));
        assert_eq!(tokens.len(), 2);
    }
}
