//! Turtle lexer.
//!
//! Tokenizes a Turtle document into a flat token stream for the parser.
//! Escape sequences in strings and IRIs are resolved here, so token payloads
//! carry the unescaped content.

use std::sync::Arc;

use crate::error::{Result, TurtleError};

/// A token with its source position.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    /// The token kind
    pub kind: TokenKind,
    /// Source location (start byte offset)
    pub start: usize,
}

/// Token kinds for Turtle.
#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    /// Full IRI: `<http://example.org/>`
    Iri(Arc<str>),

    /// Prefixed name: `prefix:local` (either part may be empty)
    PrefixedName {
        /// Namespace prefix (without colon)
        prefix: Arc<str>,
        /// Local name
        local: Arc<str>,
    },

    /// Labeled blank node: `_:name`
    BlankNodeLabel(Arc<str>),

    /// String literal (unescaped content)
    String(Arc<str>),

    /// Numeric literal, lexical form preserved
    Number(Arc<str>),

    /// Language tag (without the `@`)
    LangTag(Arc<str>),

    /// `@prefix` / `PREFIX`
    KwPrefix,

    /// `@base` / `BASE`
    KwBase,

    /// `a` keyword (shorthand for rdf:type)
    KwA,

    /// `true` / `false`
    Boolean(bool),

    /// `.`
    Dot,
    /// `,`
    Comma,
    /// `;`
    Semicolon,
    /// `^^` (datatype marker)
    DoubleCaret,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `(`
    LParen,
    /// `)`
    RParen,

    /// End of input
    Eof,
}

/// Tokenize a Turtle document.
pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    Lexer::new(input).run()
}

struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    start,
                });
                return Ok(tokens);
            };

            let kind = match c {
                '<' => self.lex_iri()?,
                '"' | '\'' => self.lex_string(c)?,
                '@' => self.lex_at_keyword()?,
                '_' if self.peek_at(1) == Some(':') => self.lex_blank_node()?,
                '^' => {
                    if self.peek_at(1) == Some('^') {
                        self.pos += 2;
                        TokenKind::DoubleCaret
                    } else {
                        return Err(TurtleError::lexer(start, "expected '^^'"));
                    }
                }
                ',' => {
                    self.pos += 1;
                    TokenKind::Comma
                }
                ';' => {
                    self.pos += 1;
                    TokenKind::Semicolon
                }
                '[' => {
                    self.pos += 1;
                    TokenKind::LBracket
                }
                ']' => {
                    self.pos += 1;
                    TokenKind::RBracket
                }
                '(' => {
                    self.pos += 1;
                    TokenKind::LParen
                }
                ')' => {
                    self.pos += 1;
                    TokenKind::RParen
                }
                '.' if !self.next_is_digit(1) => {
                    self.pos += 1;
                    TokenKind::Dot
                }
                c if c.is_ascii_digit() || c == '+' || c == '-' || c == '.' => self.lex_number()?,
                _ => self.lex_name()?,
            };
            tokens.push(Token { kind, start });
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        let mut chars = self.input[self.pos..].chars();
        for _ in 0..offset {
            chars.next()?;
        }
        chars.next()
    }

    fn next_is_digit(&self, offset: usize) -> bool {
        self.bytes
            .get(self.pos + offset)
            .is_some_and(|b| b.is_ascii_digit())
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
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// `<...>` with `\u`/`\U` escapes.
    fn lex_iri(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        self.bump(); // consume '<'
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(TurtleError::lexer(start, "unterminated IRI")),
                Some('>') => return Ok(TokenKind::Iri(Arc::from(out.as_str()))),
                Some('\n') | Some('\r') => {
                    return Err(TurtleError::lexer(start, "newline inside IRI"))
                }
                Some('\\') => out.push(self.unicode_escape(start)?),
                Some(c) => out.push(c),
            }
        }
    }

    /// Short or long string in either quote style.
    fn lex_string(&mut self, quote: char) -> Result<TokenKind> {
        let start = self.pos;
        self.bump(); // first quote

        let long = if self.peek() == Some(quote) {
            self.bump();
            if self.peek() == Some(quote) {
                self.bump();
                true
            } else {
                // Empty short string
                return Ok(TokenKind::String(Arc::from("")));
            }
        } else {
            false
        };

        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(TurtleError::lexer(start, "unterminated string"));
            };
            match c {
                c if c == quote => {
                    if !long {
                        return Ok(TokenKind::String(Arc::from(out.as_str())));
                    }
                    // In a long string, a run of N >= 3 quotes closes on the
                    // last three; the earlier N-3 belong to the content.
                    let mut run = 1;
                    while self.peek() == Some(quote) {
                        self.bump();
                        run += 1;
                    }
                    if run >= 3 {
                        for _ in 0..run - 3 {
                            out.push(quote);
                        }
                        return Ok(TokenKind::String(Arc::from(out.as_str())));
                    }
                    for _ in 0..run {
                        out.push(quote);
                    }
                }
                '\n' | '\r' if !long => {
                    return Err(TurtleError::lexer(start, "newline in short string"))
                }
                '\\' => out.push(self.string_escape(start)?),
                c => out.push(c),
            }
        }
    }

    fn string_escape(&mut self, start: usize) -> Result<char> {
        match self.bump() {
            Some('t') => Ok('\t'),
            Some('b') => Ok('\u{8}'),
            Some('n') => Ok('\n'),
            Some('r') => Ok('\r'),
            Some('f') => Ok('\u{c}'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('\\') => Ok('\\'),
            Some('u') => self.hex_escape(start, 4),
            Some('U') => self.hex_escape(start, 8),
            _ => Err(TurtleError::lexer(start, "invalid escape sequence")),
        }
    }

    /// `\uXXXX` / `\UXXXXXXXX` after the backslash has been consumed.
    fn unicode_escape(&mut self, start: usize) -> Result<char> {
        match self.bump() {
            Some('u') => self.hex_escape(start, 4),
            Some('U') => self.hex_escape(start, 8),
            _ => Err(TurtleError::lexer(start, "invalid escape in IRI")),
        }
    }

    fn hex_escape(&mut self, start: usize, digits: usize) -> Result<char> {
        let mut value = 0u32;
        for _ in 0..digits {
            let d = self
                .bump()
                .and_then(|c| c.to_digit(16))
                .ok_or_else(|| TurtleError::lexer(start, "invalid hex escape"))?;
            value = value * 16 + d;
        }
        char::from_u32(value).ok_or_else(|| TurtleError::lexer(start, "invalid codepoint"))
    }

    /// `@prefix`, `@base`, or a language tag.
    fn lex_at_keyword(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        self.bump(); // consume '@'
        let word_start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '-')
        {
            self.bump();
        }
        let word = &self.input[word_start..self.pos];
        match word {
            "prefix" => Ok(TokenKind::KwPrefix),
            "base" => Ok(TokenKind::KwBase),
            "" => Err(TurtleError::lexer(start, "bare '@'")),
            tag => Ok(TokenKind::LangTag(Arc::from(tag))),
        }
    }

    fn lex_blank_node(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        self.pos += 2; // consume '_:'
        let label_start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            self.bump();
        }
        // A trailing dot terminates the statement, not the label
        while self.input[label_start..self.pos].ends_with('.') {
            self.pos -= 1;
        }
        let label = &self.input[label_start..self.pos];
        if label.is_empty() {
            return Err(TurtleError::lexer(start, "empty blank node label"));
        }
        Ok(TokenKind::BlankNodeLabel(Arc::from(label)))
    }

    fn lex_number(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        if matches!(self.peek(), Some('+') | Some('-')) {
            self.bump();
        }
        let mut seen_digit = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            seen_digit = true;
            self.bump();
        }
        if self.peek() == Some('.') && self.next_is_digit(1) {
            self.bump();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                seen_digit = true;
                self.bump();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) && seen_digit {
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.bump();
            }
        }
        if !seen_digit {
            return Err(TurtleError::lexer(start, "expected number"));
        }
        Ok(TokenKind::Number(Arc::from(&self.input[start..self.pos])))
    }

    /// Bare name: keyword (`a`, `true`, `false`, `PREFIX`, `BASE`) or a
    /// prefixed name `prefix:local`.
    fn lex_name(&mut self) -> Result<TokenKind> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '%')
        {
            self.bump();
        }
        // A trailing dot after a bare keyword is the statement terminator
        // (e.g. `ex:s ex:p true.`)
        if self.peek() != Some(':') {
            while self.input[start..self.pos].ends_with('.') {
                self.pos -= 1;
            }
        }
        let word = &self.input[start..self.pos];

        if self.peek() == Some(':') {
            self.bump(); // consume ':'
            let local_start = self.pos;
            while self.peek().is_some_and(|c| {
                c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '%'
            }) {
                self.bump();
            }
            // Trailing dots belong to the statement terminator
            while self.input[local_start..self.pos].ends_with('.') {
                self.pos -= 1;
            }
            let local = &self.input[local_start..self.pos];
            return Ok(TokenKind::PrefixedName {
                prefix: Arc::from(word),
                local: Arc::from(local),
            });
        }

        match word {
            "a" => Ok(TokenKind::KwA),
            "true" => Ok(TokenKind::Boolean(true)),
            "false" => Ok(TokenKind::Boolean(false)),
            "PREFIX" => Ok(TokenKind::KwPrefix),
            "BASE" => Ok(TokenKind::KwBase),
            "" => Err(TurtleError::lexer(
                start,
                format!("unexpected character '{}'", self.peek().unwrap_or('?')),
            )),
            other => Err(TurtleError::lexer(
                start,
                format!("unexpected bare word '{}'", other),
            )),
        }
    }
}
