//! Span-tracking JSON reader.
//!
//! Unlike a conformance parser this keeps the byte span of every value and
//! key, and on a syntax error returns the containers read so far (closed at
//! the error position) together with the error.

use super::{SourceSpan, SyntaxError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum JsonValue {
    Null,
    Bool(bool),
    Number(String),
    String(String),
    Array(Vec<JsonNode>),
    Object(Vec<JsonMember>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JsonNode {
    pub value: JsonValue,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JsonMember {
    pub key: String,
    /// Includes the quotes.
    pub key_span: SourceSpan,
    pub value: JsonNode,
}

impl JsonNode {
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            JsonValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn members(&self) -> Option<&[JsonMember]> {
        match &self.value {
            JsonValue::Object(members) => Some(members),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&JsonMember> {
        self.members()?.iter().find(|m| m.key == key)
    }

    /// The span between the quotes of a string value.
    pub fn inner_span(&self) -> SourceSpan {
        match self.value {
            JsonValue::String(_) if self.span.len() >= 2 => {
                SourceSpan::new(self.span.start + 1, self.span.end - 1)
            }
            _ => self.span,
        }
    }
}

impl JsonMember {
    pub fn inner_key_span(&self) -> SourceSpan {
        if self.key_span.len() >= 2 {
            SourceSpan::new(self.key_span.start + 1, self.key_span.end - 1)
        } else {
            self.key_span
        }
    }

    pub fn span(&self) -> SourceSpan {
        self.key_span.hull(&self.value.span)
    }
}

pub(crate) fn read(text: &str) -> (Option<JsonNode>, Option<SyntaxError>) {
    let mut reader = Reader {
        text,
        pos: 0,
        error: None,
    };
    reader.skip_ws();
    if reader.pos >= text.len() {
        return (None, None);
    }
    let root = reader.value();
    if reader.error.is_none() {
        reader.skip_ws();
        if reader.pos < text.len() {
            let span = SourceSpan::new(reader.pos, reader.pos + 1);
            reader.fail(span, "Unexpected content after the JSON document");
        }
    }
    (root, reader.error)
}

struct Reader<'t> {
    text: &'t str,
    pos: usize,
    error: Option<SyntaxError>,
}

impl<'t> Reader<'t> {
    fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| c.is_whitespace()) {
            self.bump();
        }
    }

    fn fail(&mut self, span: SourceSpan, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(SyntaxError::new(span, message));
        }
    }

    fn here(&self) -> SourceSpan {
        let len = self.peek().map(|c| c.len_utf8()).unwrap_or(0);
        SourceSpan::new(self.pos, self.pos + len)
    }

    fn value(&mut self) -> Option<JsonNode> {
        self.skip_ws();
        let start = self.pos;
        let value = match self.peek() {
            Some('{') => return Some(self.object()),
            Some('[') => return Some(self.array()),
            Some('"') => JsonValue::String(self.string()?),
            Some('t') => self.literal("true", JsonValue::Bool(true))?,
            Some('f') => self.literal("false", JsonValue::Bool(false))?,
            Some('n') => self.literal("null", JsonValue::Null)?,
            Some(c) if c == '-' || c.is_ascii_digit() => self.number()?,
            Some(c) => {
                let span = self.here();
                self.fail(span, format!("Unexpected character '{c}'"));
                return None;
            }
            None => {
                self.fail(SourceSpan::empty(self.pos), "Unexpected end of input");
                return None;
            }
        };
        Some(JsonNode {
            value,
            span: SourceSpan::new(start, self.pos),
        })
    }

    fn literal(&mut self, word: &str, value: JsonValue) -> Option<JsonValue> {
        if self.text[self.pos..].starts_with(word) {
            self.pos += word.len();
            Some(value)
        } else {
            let span = self.here();
            self.fail(span, format!("Expected '{word}'"));
            None
        }
    }

    fn number(&mut self) -> Option<JsonValue> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.bump();
        }
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        {
            self.bump();
        }
        let number = &self.text[start..self.pos];
        if number.parse::<f64>().is_err() {
            self.fail(SourceSpan::new(start, self.pos), format!("Invalid number '{number}'"));
            return None;
        }
        Some(JsonValue::Number(number.to_string()))
    }

    fn string(&mut self) -> Option<String> {
        let start = self.pos;
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => return Some(value),
                Some('\\') => match self.bump() {
                    Some('n') => value.push('\n'),
                    Some('t') => value.push('\t'),
                    Some('r') => value.push('\r'),
                    Some('b') => value.push('\u{8}'),
                    Some('f') => value.push('\u{c}'),
                    Some('u') => {
                        let c = self.unicode_escape();
                        value.push(c);
                    }
                    Some(c @ ('"' | '\\' | '/')) => value.push(c),
                    Some(other) => {
                        let span = SourceSpan::new(self.pos - 1 - other.len_utf8(), self.pos);
                        self.fail(span, format!("Invalid escape '\\{other}'"));
                        value.push(other);
                    }
                    None => break,
                },
                Some('\n') | None => break,
                Some(c) => value.push(c),
            }
        }
        self.fail(SourceSpan::new(start, self.pos), "Unterminated string");
        None
    }

    /// Exactly four hex digits; `from_str_radix` alone would accept a sign.
    fn hex4(&mut self) -> Option<u32> {
        let digits = self.text.get(self.pos..self.pos + 4)?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let code = u32::from_str_radix(digits, 16).ok()?;
        self.pos += 4;
        Some(code)
    }

    fn unicode_escape(&mut self) -> char {
        let Some(high) = self.hex4() else {
            let span = SourceSpan::new(self.pos - 2, self.pos);
            self.fail(span, "Invalid unicode escape");
            return char::REPLACEMENT_CHARACTER;
        };
        if (0xD800..0xDC00).contains(&high) && self.text[self.pos..].starts_with("\\u") {
            self.pos += 2;
            if let Some(low) = self.hex4() {
                let code = 0x10000 + ((high - 0xD800) << 10) + (low.wrapping_sub(0xDC00) & 0x3FF);
                return char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
            }
        }
        char::from_u32(high).unwrap_or(char::REPLACEMENT_CHARACTER)
    }

    fn object(&mut self) -> JsonNode {
        let start = self.pos;
        self.bump();
        let mut members = Vec::new();
        self.skip_ws();
        if self.peek() == Some('}') {
            self.bump();
            return self.node(JsonValue::Object(members), start);
        }
        loop {
            self.skip_ws();
            if self.peek() != Some('"') {
                let span = self.here();
                self.fail(span, "Expected a string key");
                break;
            }
            let key_start = self.pos;
            let Some(key) = self.string() else { break };
            let key_span = SourceSpan::new(key_start, self.pos);
            self.skip_ws();
            if self.peek() != Some(':') {
                let span = self.here();
                self.fail(span, "Expected ':'");
                break;
            }
            self.bump();
            let Some(value) = self.value() else { break };
            members.push(JsonMember {
                key,
                key_span,
                value,
            });
            if self.error.is_some() {
                break;
            }
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some('}') => {
                    self.bump();
                    return self.node(JsonValue::Object(members), start);
                }
                _ => {
                    let span = self.here();
                    self.fail(span, "Expected ',' or '}'");
                    break;
                }
            }
        }
        self.node(JsonValue::Object(members), start)
    }

    fn array(&mut self) -> JsonNode {
        let start = self.pos;
        self.bump();
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(']') {
            self.bump();
            return self.node(JsonValue::Array(items), start);
        }
        loop {
            let Some(item) = self.value() else { break };
            items.push(item);
            if self.error.is_some() {
                break;
            }
            self.skip_ws();
            match self.peek() {
                Some(',') => {
                    self.bump();
                }
                Some(']') => {
                    self.bump();
                    return self.node(JsonValue::Array(items), start);
                }
                _ => {
                    let span = self.here();
                    self.fail(span, "Expected ',' or ']'");
                    break;
                }
            }
        }
        self.node(JsonValue::Array(items), start)
    }

    fn node(&self, value: JsonValue, start: usize) -> JsonNode {
        JsonNode {
            value,
            span: SourceSpan::new(start, self.pos),
        }
    }
}
