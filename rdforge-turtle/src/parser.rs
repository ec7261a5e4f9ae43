//! Turtle parser.
//!
//! Recursive-descent parser over the token stream, collecting statements
//! directly into a [`Graph`]. Blank node labels are namespaced with a
//! caller-supplied scope so that graphs parsed from different rows never
//! share blank nodes when unioned into the run accumulator.

use std::collections::HashMap;

use rdforge_graph::{Graph, Term};
use rdforge_vocab::rdf;

use crate::error::{Result, TurtleError};
use crate::lex::{tokenize, Token, TokenKind};

/// Turtle parser state.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    graph: Graph,
    /// Prefix mappings (prefix -> namespace IRI)
    prefixes: HashMap<String, String>,
    /// Scope prepended to every blank node label
    blank_scope: String,
    /// Counter for anonymous blank nodes
    next_blank: usize,
}

impl Parser {
    /// Create a new parser.
    ///
    /// `blank_scope` is prepended to every blank node label (and to the
    /// generated labels of anonymous nodes); pass `""` when parsing a
    /// standalone document.
    pub fn new(input: &str, blank_scope: &str) -> Result<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
            graph: Graph::new(),
            prefixes: HashMap::new(),
            blank_scope: blank_scope.to_string(),
            next_blank: 0,
        })
    }

    /// Parse the entire document and return the collected graph.
    pub fn parse(mut self) -> Result<Graph> {
        while !self.is_at_end() {
            self.parse_statement()?;
        }
        Ok(self.graph)
    }

    fn is_at_end(&self) -> bool {
        matches!(self.current().kind, TokenKind::Eof)
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> &Token {
        let token = &self.tokens[self.pos];
        if !matches!(token.kind, TokenKind::Eof) {
            self.pos += 1;
        }
        token
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.current().kind) == std::mem::discriminant(kind)
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<&Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(TurtleError::parse(
                self.current().start,
                format!("expected {:?}, found {:?}", kind, self.current().kind),
            ))
        }
    }

    fn fresh_blank(&mut self) -> Term {
        let term = Term::blank(format!("{}a{}", self.blank_scope, self.next_blank));
        self.next_blank += 1;
        term
    }

    fn scoped_blank(&self, label: &str) -> Term {
        Term::blank(format!("{}{}", self.blank_scope, label))
    }

    /// Parse a single statement (directive or triples).
    fn parse_statement(&mut self) -> Result<()> {
        match &self.current().kind {
            TokenKind::KwPrefix => self.parse_prefix_directive(),
            TokenKind::KwBase => self.parse_base_directive(),
            TokenKind::Eof => Ok(()),
            _ => self.parse_triples(),
        }
    }

    /// Parse @prefix / PREFIX directive.
    fn parse_prefix_directive(&mut self) -> Result<()> {
        self.advance(); // consume @prefix or PREFIX

        let prefix = match &self.current().kind {
            TokenKind::PrefixedName { prefix, local } if local.is_empty() => prefix.to_string(),
            _ => {
                return Err(TurtleError::parse(
                    self.current().start,
                    "expected prefix namespace",
                ))
            }
        };
        self.advance();

        let namespace = match &self.current().kind {
            TokenKind::Iri(iri) => iri.to_string(),
            _ => {
                return Err(TurtleError::parse(
                    self.current().start,
                    "expected IRI for prefix namespace",
                ))
            }
        };
        self.advance();

        self.prefixes.insert(prefix, namespace);

        // Trailing dot is required for @prefix, optional for PREFIX
        if matches!(self.current().kind, TokenKind::Dot) {
            self.advance();
        }

        Ok(())
    }

    /// Parse @base / BASE directive.
    ///
    /// The synthesizer always renders absolute IRIs or prefixed names, so
    /// the base is consumed and discarded rather than used for resolution.
    fn parse_base_directive(&mut self) -> Result<()> {
        self.advance(); // consume @base or BASE

        match &self.current().kind {
            TokenKind::Iri(_) => {
                self.advance();
            }
            _ => {
                return Err(TurtleError::parse(
                    self.current().start,
                    "expected IRI for base",
                ))
            }
        }

        if matches!(self.current().kind, TokenKind::Dot) {
            self.advance();
        }

        Ok(())
    }

    /// Parse a triple statement.
    fn parse_triples(&mut self) -> Result<()> {
        let subject = self.parse_subject()?;
        self.parse_predicate_object_list(&subject)?;
        self.expect(&TokenKind::Dot)?;
        Ok(())
    }

    /// Parse a subject term.
    fn parse_subject(&mut self) -> Result<Term> {
        match &self.current().kind.clone() {
            TokenKind::Iri(iri) => {
                let term = Term::iri(iri.as_ref());
                self.advance();
                Ok(term)
            }
            TokenKind::PrefixedName { prefix, local } => {
                let iri = self.expand_prefixed_name(prefix, local)?;
                self.advance();
                Ok(Term::iri(iri))
            }
            TokenKind::BlankNodeLabel(label) => {
                let term = self.scoped_blank(label);
                self.advance();
                Ok(term)
            }
            TokenKind::LBracket => self.parse_blank_node_property_list(),
            TokenKind::LParen => self.parse_collection(),
            _ => Err(TurtleError::parse(
                self.current().start,
                format!("expected subject, found {:?}", self.current().kind),
            )),
        }
    }

    /// Parse a predicate-object list.
    fn parse_predicate_object_list(&mut self, subject: &Term) -> Result<()> {
        loop {
            let predicate = self.parse_predicate()?;
            self.parse_object_list(subject, &predicate)?;

            if matches!(self.current().kind, TokenKind::Semicolon) {
                self.advance();
                // A semicolon may be followed by the end of the block
                if matches!(
                    self.current().kind,
                    TokenKind::Dot | TokenKind::RBracket | TokenKind::Eof
                ) {
                    break;
                }
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Parse a predicate.
    fn parse_predicate(&mut self) -> Result<Term> {
        match &self.current().kind.clone() {
            TokenKind::Iri(iri) => {
                let term = Term::iri(iri.as_ref());
                self.advance();
                Ok(term)
            }
            TokenKind::PrefixedName { prefix, local } => {
                let iri = self.expand_prefixed_name(prefix, local)?;
                self.advance();
                Ok(Term::iri(iri))
            }
            TokenKind::KwA => {
                self.advance();
                Ok(Term::iri(rdf::TYPE))
            }
            _ => Err(TurtleError::parse(
                self.current().start,
                format!("expected predicate, found {:?}", self.current().kind),
            )),
        }
    }

    /// Parse an object list (comma-separated objects).
    fn parse_object_list(&mut self, subject: &Term, predicate: &Term) -> Result<()> {
        loop {
            let object = self.parse_object()?;
            self.graph
                .insert_triple(subject.clone(), predicate.clone(), object);

            if matches!(self.current().kind, TokenKind::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(())
    }

    /// Parse an object term.
    fn parse_object(&mut self) -> Result<Term> {
        match &self.current().kind.clone() {
            TokenKind::Iri(iri) => {
                let term = Term::iri(iri.as_ref());
                self.advance();
                Ok(term)
            }
            TokenKind::PrefixedName { prefix, local } => {
                let iri = self.expand_prefixed_name(prefix, local)?;
                self.advance();
                Ok(Term::iri(iri))
            }
            TokenKind::BlankNodeLabel(label) => {
                let term = self.scoped_blank(label);
                self.advance();
                Ok(term)
            }
            TokenKind::LBracket => self.parse_blank_node_property_list(),
            TokenKind::LParen => self.parse_collection(),
            TokenKind::String(_)
            | TokenKind::Number(_)
            | TokenKind::Boolean(_) => self.parse_literal(),
            _ => Err(TurtleError::parse(
                self.current().start,
                format!("expected object, found {:?}", self.current().kind),
            )),
        }
    }

    /// Parse a literal (string with optional language tag or datatype,
    /// number, or boolean).
    fn parse_literal(&mut self) -> Result<Term> {
        match &self.current().kind.clone() {
            TokenKind::String(value) => {
                let value = value.clone();
                self.advance();

                match &self.current().kind.clone() {
                    TokenKind::LangTag(lang) => {
                        let lang = lang.clone();
                        self.advance();
                        Ok(Term::lang_string(value.as_ref(), lang.as_ref()))
                    }
                    TokenKind::DoubleCaret => {
                        self.advance();
                        let datatype = self.parse_datatype_iri()?;
                        Ok(Term::typed(value.as_ref(), datatype))
                    }
                    _ => Ok(Term::string(value.as_ref())),
                }
            }
            TokenKind::Number(lexical) => {
                let lexical = lexical.clone();
                self.advance();
                let datatype = if lexical.contains('e') || lexical.contains('E') {
                    rdforge_vocab::xsd::DOUBLE
                } else if lexical.contains('.') {
                    rdforge_vocab::xsd::DECIMAL
                } else {
                    rdforge_vocab::xsd::INTEGER
                };
                Ok(Term::typed(lexical.as_ref(), datatype))
            }
            TokenKind::Boolean(b) => {
                let b = *b;
                self.advance();
                Ok(Term::typed(b.to_string(), rdforge_vocab::xsd::BOOLEAN))
            }
            _ => Err(TurtleError::parse(
                self.current().start,
                format!("expected literal, found {:?}", self.current().kind),
            )),
        }
    }

    /// Parse a datatype IRI after ^^.
    fn parse_datatype_iri(&mut self) -> Result<String> {
        match &self.current().kind.clone() {
            TokenKind::Iri(iri) => {
                let iri = iri.to_string();
                self.advance();
                Ok(iri)
            }
            TokenKind::PrefixedName { prefix, local } => {
                let iri = self.expand_prefixed_name(prefix, local)?;
                self.advance();
                Ok(iri)
            }
            _ => Err(TurtleError::parse(
                self.current().start,
                format!("expected datatype IRI, found {:?}", self.current().kind),
            )),
        }
    }

    /// Parse a blank node property list: `[ predicate object ; ... ]`
    fn parse_blank_node_property_list(&mut self) -> Result<Term> {
        self.expect(&TokenKind::LBracket)?;

        let bnode = self.fresh_blank();

        if !matches!(self.current().kind, TokenKind::RBracket) {
            self.parse_predicate_object_list(&bnode)?;
        }

        self.expect(&TokenKind::RBracket)?;

        Ok(bnode)
    }

    /// Parse a collection (RDF list): `( item1 item2 ... )`
    fn parse_collection(&mut self) -> Result<Term> {
        self.expect(&TokenKind::LParen)?;

        if matches!(self.current().kind, TokenKind::RParen) {
            self.advance();
            return Ok(Term::iri(rdf::NIL));
        }

        let first_node = self.fresh_blank();
        let mut current_node = first_node.clone();

        loop {
            let item = self.parse_object()?;
            self.graph
                .insert_triple(current_node.clone(), Term::iri(rdf::FIRST), item);

            if matches!(self.current().kind, TokenKind::RParen) {
                self.graph.insert_triple(
                    current_node.clone(),
                    Term::iri(rdf::REST),
                    Term::iri(rdf::NIL),
                );
                break;
            } else {
                let next_node = self.fresh_blank();
                self.graph.insert_triple(
                    current_node.clone(),
                    Term::iri(rdf::REST),
                    next_node.clone(),
                );
                current_node = next_node;
            }
        }

        self.expect(&TokenKind::RParen)?;

        Ok(first_node)
    }

    /// Expand a prefixed name to a full IRI.
    fn expand_prefixed_name(&self, prefix: &str, local: &str) -> Result<String> {
        if let Some(namespace) = self.prefixes.get(prefix) {
            Ok(format!("{}{}", namespace, local))
        } else {
            Err(TurtleError::UndefinedPrefix(prefix.to_string()))
        }
    }
}

/// Parse a Turtle document into a [`Graph`].
///
/// `blank_scope` is prepended to every blank node label; pass a per-row
/// unique scope when parsed graphs will be unioned.
pub fn parse(input: &str, blank_scope: &str) -> Result<Graph> {
    Parser::new(input, blank_scope)?.parse()
}
