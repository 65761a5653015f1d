//! Recursive-descent parser from tokens to a [`Document`].
//!
//! The parser stops at the first syntax error. Comments are dropped except
//! for the block heading the file, and newlines only matter inside
//! `#define` lines.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::ast::*;
use crate::error::{Error, ParseError};
use crate::lexer::{tokenize, Token, TokenKind};

/// Knobs for [`parse_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    /// Deepest node nesting accepted, root included.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self { max_depth: 256 }
    }
}

/// Parse a token stream produced by [`tokenize`].
pub fn parse(tokens: Vec<Token>) -> Result<Document, ParseError> {
    parse_with(tokens, &ParseOptions::default())
}

/// Parse a token stream with explicit options.
pub fn parse_with(tokens: Vec<Token>, options: &ParseOptions) -> Result<Document, ParseError> {
    Parser::new(tokens, options.clone()).document()
}

/// Parse a standalone property value list, e.g. `<0x1 0x2>, "name"`.
///
/// A trailing `;` is accepted.
pub fn parse_values(source: &str) -> Result<Vec<Value>, Error> {
    let mut parser = Parser::new(tokenize(source)?, ParseOptions::default());
    let values = parser.values()?;
    parser.eat(TokenKind::Semicolon);
    if !parser.at(TokenKind::Eof) {
        return Err(parser.expected("end of value list").into());
    }
    Ok(values)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    header: Vec<String>,
    options: ParseOptions,
    /// Label to the node carrying it.
    labels: HashMap<String, NodeId>,
}

impl Parser {
    fn new(tokens: Vec<Token>, options: ParseOptions) -> Self {
        let mut tokens = tokens.into_iter().peekable();
        let mut header = Vec::new();

        while let Some(token) = tokens.next_if(|t| {
            matches!(
                t.kind,
                TokenKind::LineComment | TokenKind::BlockComment | TokenKind::Newline
            )
        }) {
            if token.kind != TokenKind::Newline {
                header.push(token.text);
            }
        }

        let mut tokens: Vec<Token> = tokens
            .filter(|t| !matches!(t.kind, TokenKind::LineComment | TokenKind::BlockComment))
            .collect();

        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (line, offset) = tokens.last().map_or((1, 0), |t| (t.line, t.end()));
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                line,
                column: 1,
                offset,
                len: 0,
            });
        }

        Self {
            tokens,
            pos: 0,
            header,
            options,
            labels: HashMap::new(),
        }
    }

    /* === Token stream === */

    /// The raw token at the cursor, newlines included.
    fn raw(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn skip_newlines(&mut self) {
        while self.tokens[self.pos].kind == TokenKind::Newline {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> TokenKind {
        self.skip_newlines();
        self.raw().kind
    }

    /// The `n`-th significant token ahead of the cursor.
    fn nth(&self, n: usize) -> &Token {
        self.tokens[self.pos..]
            .iter()
            .filter(|t| t.kind != TokenKind::Newline)
            .nth(n)
            .unwrap_or(&self.tokens[self.tokens.len() - 1])
    }

    fn at(&mut self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn bump(&mut self) -> Token {
        self.skip_newlines();
        let token = self.raw().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.bump())
        } else {
            Err(self.expected(what))
        }
    }

    fn expected(&mut self, what: &str) -> ParseError {
        self.skip_newlines();
        let token = self.raw();
        error_at(token, format!("expected {what}, found {}", token.describe()))
    }

    /* === Top level === */

    /// Parse a whole source file.
    fn document(mut self) -> Result<Document, ParseError> {
        let mut doc = Document::new();
        doc.comments = std::mem::take(&mut self.header);

        loop {
            match self.peek() {
                TokenKind::Slash => {
                    let (kind, text) = {
                        let next = self.nth(1);
                        (next.kind, next.text.clone())
                    };
                    match (kind, text.as_str()) {
                        (TokenKind::LBrace, _) => {
                            self.root_node(&mut doc)?;
                            break;
                        }
                        (TokenKind::Ident, "dts-v1") => {
                            self.keyword()?;
                            self.expect(TokenKind::Semicolon, "';' after /dts-v1/")?;
                            doc.version = Some(text.clone());
                        }
                        (TokenKind::Ident, "plugin") => {
                            self.keyword()?;
                            self.expect(TokenKind::Semicolon, "';' after /plugin/")?;
                            doc.plugin = true;
                        }
                        (TokenKind::Ident, "memreserve") => {
                            let reserve = self.memreserve()?;
                            doc.memreserves.push(reserve);
                        }
                        (TokenKind::Ident, "include") => {
                            self.keyword()?;
                            let path = self.expect(TokenKind::Str, "a quoted path after /include/")?;
                            doc.includes.push(Include {
                                path: path.text,
                                style: IncludeStyle::Directive,
                            });
                        }
                        _ => return Err(self.expected("a directive or the root node")),
                    }
                }
                TokenKind::Include => {
                    let include = self.cpp_include()?;
                    doc.includes.push(include);
                }
                TokenKind::Define => {
                    let define = self.define()?;
                    doc.defines.push(define);
                }
                TokenKind::Eof => return Err(self.expected("the root node '/ { ... };'")),
                _ => return Err(self.expected("a directive or the root node")),
            }
        }

        // Later root blocks and `&label { ... }` overrides merge into the tree.
        loop {
            match self.peek() {
                TokenKind::Eof => break,
                TokenKind::Slash if self.nth(1).kind == TokenKind::LBrace => {
                    self.root_node(&mut doc)?;
                }
                TokenKind::Ampersand => self.node_override(&mut doc)?,
                _ => return Err(self.expected("end of file after the root node")),
            }
        }

        debug!(nodes = doc.len(), labels = self.labels.len(), "parsed document");
        Ok(doc)
    }

    /// Parse a `/word/` keyword and return the word.
    fn keyword(&mut self) -> Result<String, ParseError> {
        self.expect(TokenKind::Slash, "'/'")?;
        let word = self.expect(TokenKind::Ident, "a directive name")?;
        self.expect(TokenKind::Slash, "'/' closing the directive")?;
        Ok(word.text)
    }

    /// Parse `/memreserve/ <address> <size>;`.
    fn memreserve(&mut self) -> Result<MemReserve, ParseError> {
        self.keyword()?;
        let address = self.number()?;
        let size = self.number()?;
        self.expect(TokenKind::Semicolon, "';' after /memreserve/")?;
        Ok(MemReserve { address, size })
    }

    /// Parse `#include "file"` or `#include <file>`.
    fn cpp_include(&mut self) -> Result<Include, ParseError> {
        let directive = self.bump();

        if self.raw().kind == TokenKind::Str {
            let path = self.bump();
            return Ok(Include {
                path: path.text,
                style: IncludeStyle::Quoted,
            });
        }

        if self.raw().kind != TokenKind::LAngle {
            return Err(error_at(&directive, "expected a file name after #include"));
        }
        self.pos += 1;

        let start = self.pos;
        while !matches!(
            self.raw().kind,
            TokenKind::RAngle | TokenKind::Newline | TokenKind::Eof
        ) {
            self.pos += 1;
        }
        if self.raw().kind != TokenKind::RAngle {
            return Err(error_at(&directive, "unterminated #include <...> path"));
        }
        let path = join_tokens(&self.tokens[start..self.pos]);
        self.pos += 1;

        Ok(Include {
            path,
            style: IncludeStyle::Angled,
        })
    }

    /// Parse `#define NAME rest-of-line`. A parameter list written against
    /// the name, as in `#define MASK(n) ...`, stays part of the name.
    fn define(&mut self) -> Result<Define, ParseError> {
        let directive = self.bump();

        if self.raw().kind != TokenKind::Ident {
            return Err(error_at(&directive, "expected a macro name after #define"));
        }
        let name_start = self.pos;
        self.pos += 1;

        if self.raw().kind == TokenKind::LParen && self.tokens[name_start].touches(self.raw()) {
            loop {
                let token = self.raw();
                match token.kind {
                    TokenKind::RParen => break,
                    TokenKind::Newline | TokenKind::Eof => {
                        return Err(error_at(token, "unterminated macro parameter list"));
                    }
                    _ => self.pos += 1,
                }
            }
            self.pos += 1;
        }
        let name = join_tokens(&self.tokens[name_start..self.pos]);

        let start = self.pos;
        while !matches!(self.raw().kind, TokenKind::Newline | TokenKind::Eof) {
            self.pos += 1;
        }

        Ok(Define {
            name,
            value: join_tokens(&self.tokens[start..self.pos]),
        })
    }

    /* === Nodes === */

    /// Parse `/ { ... };`, merging into the existing root.
    fn root_node(&mut self, doc: &mut Document) -> Result<(), ParseError> {
        let slash = self.expect(TokenKind::Slash, "'/'")?;
        let root = doc.root();
        if doc[root].line == 0 {
            doc[root].line = slash.line;
        }
        self.node_body(doc, root, 1)
    }

    /// Parse `&label { ... };` or `&{/path} { ... };`.
    fn node_override(&mut self, doc: &mut Document) -> Result<(), ParseError> {
        let start = self.nth(0).clone();
        let reference = self.reference()?;

        let target = match reference.label() {
            Some(label) => self.labels.get(label).copied(),
            None => doc.find_by_path(&reference.0),
        };
        let Some(target) = target else {
            return Err(error_at(&start, format!("cannot resolve {reference}")));
        };

        self.node_body(doc, target, ancestors(doc, target) + 1)
    }

    /// Parse `{ items };` into `node`.
    fn node_body(&mut self, doc: &mut Document, node: NodeId, depth: usize) -> Result<(), ParseError> {
        self.expect(TokenKind::LBrace, "'{'")?;

        loop {
            match self.peek() {
                TokenKind::RBrace => break,
                TokenKind::Ident | TokenKind::Number | TokenKind::HexNumber => {
                    self.node_item(doc, node, depth)?;
                }
                _ => return Err(self.expected("a property, a child node or '}'")),
            }
        }

        self.expect(TokenKind::RBrace, "'}'")?;
        self.eat(TokenKind::Semicolon);
        Ok(())
    }

    /// Parse one property or child node inside a body.
    fn node_item(&mut self, doc: &mut Document, parent: NodeId, depth: usize) -> Result<(), ParseError> {
        let (name, start) = self.name()?;

        match self.peek() {
            TokenKind::Colon => {
                self.bump();
                check_label(&name, &start)?;
                if self.nth(1).kind == TokenKind::Colon {
                    return Err(error_at(self.nth(0), "a node can carry only one label"));
                }
                let (node_name, _) = self.name()?;
                self.child_node(doc, parent, Some(name), &node_name, &start, depth)
            }
            TokenKind::LBrace => self.child_node(doc, parent, None, &name, &start, depth),
            TokenKind::Equals => {
                self.bump();
                let values = self.values()?;
                self.expect(TokenKind::Semicolon, "';' after the property value")?;
                set_property(doc, parent, name, values, start.line);
                Ok(())
            }
            TokenKind::Semicolon => {
                self.bump();
                set_property(doc, parent, name, Vec::new(), start.line);
                Ok(())
            }
            _ => Err(self.expected("'=', ';', ':' or '{' after a name")),
        }
    }

    /// Parse a node body, creating the node or merging into an existing one.
    fn child_node(
        &mut self,
        doc: &mut Document,
        parent: NodeId,
        label: Option<String>,
        full_name: &str,
        start: &Token,
        depth: usize,
    ) -> Result<(), ParseError> {
        if depth >= self.options.max_depth {
            return Err(error_at(
                start,
                format!("nodes nested deeper than {} levels", self.options.max_depth),
            ));
        }

        let (name, address) = split_unit_address(full_name);
        if name.is_empty() {
            return Err(error_at(start, format!("invalid node name '{full_name}'")));
        }

        let id = match doc.find_child(parent, name, address) {
            Some(existing) => {
                trace!(path = %doc.path(existing), "merging node");
                existing
            }
            None => {
                let mut node = Node::new(name);
                node.unit_address = address.map(str::to_string);
                node.line = start.line;
                doc.append_child(parent, node)
            }
        };

        if let Some(label) = label {
            self.define_label(doc, id, label, start)?;
        }

        self.node_body(doc, id, depth + 1)
    }

    fn define_label(&mut self, doc: &mut Document, id: NodeId, label: String, at: &Token) -> Result<(), ParseError> {
        match self.labels.get(&label) {
            Some(&owner) if owner != id => {
                return Err(error_at(at, format!("duplicate label '{label}'")));
            }
            _ => {}
        }

        match &doc[id].label {
            Some(existing) if *existing != label => Err(error_at(
                at,
                format!("node already carries label '{existing}'"),
            )),
            _ => {
                doc[id].label = Some(label.clone());
                self.labels.insert(label, id);
                Ok(())
            }
        }
    }

    /// Parse a node or property name: a word plus any comma-joined words
    /// written without spaces, as in `ti,hwmods` or `ethernet@0,0`.
    fn name(&mut self) -> Result<(String, Token), ParseError> {
        let first = match self.peek() {
            TokenKind::Ident | TokenKind::Number | TokenKind::HexNumber => self.bump(),
            _ => return Err(self.expected("a name")),
        };

        let mut text = first.text.clone();
        let mut end = first.end();
        loop {
            let comma = &self.tokens[self.pos];
            if comma.kind != TokenKind::Comma || comma.offset != end {
                break;
            }
            let word = &self.tokens[self.pos + 1];
            if !matches!(
                word.kind,
                TokenKind::Ident | TokenKind::Number | TokenKind::HexNumber
            ) || !comma.touches(word)
            {
                break;
            }
            text.push(',');
            text.push_str(&word.text);
            end = word.end();
            self.pos += 2;
        }

        Ok((text, first))
    }

    /* === Property values === */

    fn values(&mut self) -> Result<Vec<Value>, ParseError> {
        let mut values = vec![self.value()?];
        while self.eat(TokenKind::Comma) {
            values.push(self.value()?);
        }
        Ok(values)
    }

    fn value(&mut self) -> Result<Value, ParseError> {
        match self.peek() {
            TokenKind::Str => {
                let first = self.bump().text;
                if !(self.at(TokenKind::Comma) && self.nth(1).kind == TokenKind::Str) {
                    return Ok(Value::String(first));
                }
                let mut list = vec![first];
                while self.at(TokenKind::Comma) && self.nth(1).kind == TokenKind::Str {
                    self.bump();
                    list.push(self.bump().text);
                }
                Ok(Value::StringList(list))
            }
            TokenKind::LAngle => Ok(Value::CellArray(self.cell_array()?)),
            TokenKind::LBracket => Ok(Value::ByteArray(self.byte_array()?)),
            TokenKind::Ampersand => Ok(Value::Reference(self.reference()?)),
            TokenKind::Number | TokenKind::HexNumber => Ok(Value::Number(self.number()?)),
            TokenKind::Slash if self.nth(1).text == "bits" => self.bits(),
            _ => Err(self.expected("a property value")),
        }
    }

    fn number(&mut self) -> Result<Number, ParseError> {
        match self.peek() {
            TokenKind::Number | TokenKind::HexNumber => {
                let token = self.bump();
                Number::parse(&token.text)
                    .ok_or_else(|| error_at(&token, format!("invalid number '{}'", token.text)))
            }
            _ => Err(self.expected("a number")),
        }
    }

    /// Parse `/bits/ N <...>[, <...>]*`.
    fn bits(&mut self) -> Result<Value, ParseError> {
        self.keyword()?;
        let width_token = self.nth(0).clone();
        let width = self.number()?.value;
        let width = match width {
            8 | 16 | 32 | 64 => width as u32,
            _ => {
                return Err(error_at(
                    &width_token,
                    format!("/bits/ width must be 8, 16, 32 or 64, not {width}"),
                ))
            }
        };

        let mut arrays = vec![self.cell_array()?];
        while self.at(TokenKind::Comma) && self.nth(1).kind == TokenKind::LAngle {
            self.bump();
            arrays.push(self.cell_array()?);
        }

        Ok(Value::Bits { width, arrays })
    }

    /// Parse `< cell* >`.
    fn cell_array(&mut self) -> Result<Vec<Cell>, ParseError> {
        self.expect(TokenKind::LAngle, "'<'")?;

        let mut cells = Vec::new();
        loop {
            match self.peek() {
                TokenKind::RAngle => {
                    self.bump();
                    break;
                }
                TokenKind::Eof => return Err(self.expected("'>'")),
                TokenKind::Number | TokenKind::HexNumber if self.number_stands_alone() => {
                    cells.push(Cell::Number(self.number()?));
                }
                TokenKind::Ampersand => cells.push(Cell::Reference(self.reference()?)),
                _ => cells.push(Cell::Raw(self.raw_cell()?)),
            }
        }

        Ok(cells)
    }

    /// Whether the number at the cursor is a whole cell rather than the start
    /// of an expression such as `1+2`.
    fn number_stands_alone(&self) -> bool {
        let number = self.raw();
        let next = &self.tokens[self.pos + 1];
        !number.touches(next) || matches!(next.kind, TokenKind::RAngle | TokenKind::Newline)
    }

    /// Collect one opaque cell: adjacent tokens plus anything inside balanced
    /// parentheses, kept as source text.
    fn raw_cell(&mut self) -> Result<String, ParseError> {
        self.skip_newlines();
        let start = self.pos;
        let mut depth = 0usize;

        loop {
            let token = self.raw();
            match token.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen if depth == 0 => {
                    return Err(error_at(token, "unbalanced ')' in cell array"));
                }
                TokenKind::RParen => depth -= 1,
                TokenKind::RAngle if depth == 0 => break,
                TokenKind::Eof | TokenKind::Semicolon | TokenKind::LBrace | TokenKind::RBrace => {
                    let what = if depth > 0 { "')'" } else { "'>'" };
                    return Err(self.expected(what));
                }
                _ => {}
            }
            self.pos += 1;

            if depth == 0 {
                let previous = &self.tokens[self.pos - 1];
                let next = self.raw();
                if !previous.touches(next) || next.kind == TokenKind::Newline {
                    break;
                }
            }
        }

        let parts: Vec<Token> = self.tokens[start..self.pos]
            .iter()
            .filter(|t| t.kind != TokenKind::Newline)
            .cloned()
            .collect();
        Ok(join_tokens(&parts))
    }

    /// Parse `&label` or `&{/path}`.
    fn reference(&mut self) -> Result<Reference, ParseError> {
        self.expect(TokenKind::Ampersand, "'&'")?;

        match self.peek() {
            TokenKind::Ident => Ok(Reference(self.bump().text)),
            TokenKind::LBrace => {
                let open = self.bump();
                let start = self.pos;
                while !matches!(
                    self.raw().kind,
                    TokenKind::RBrace | TokenKind::Newline | TokenKind::Semicolon | TokenKind::Eof
                ) {
                    self.pos += 1;
                }
                let path = join_tokens(&self.tokens[start..self.pos]);
                self.expect(TokenKind::RBrace, "'}' closing the path reference")?;
                if !path.starts_with('/') {
                    return Err(error_at(&open, format!("path reference '{path}' must be absolute")));
                }
                Ok(Reference(path))
            }
            _ => Err(self.expected("a label or '{/path}' after '&'")),
        }
    }

    /// Parse `[ hex-bytes ]`. Bytes may be written together (`[0011aabb]`)
    /// or apart (`[00 11 aa bb]`).
    fn byte_array(&mut self) -> Result<Vec<u8>, ParseError> {
        self.expect(TokenKind::LBracket, "'['")?;

        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                TokenKind::RBracket => {
                    self.bump();
                    break;
                }
                TokenKind::Number | TokenKind::Ident => {
                    let token = self.bump();
                    let text = token.text.as_str();
                    if text.len() % 2 != 0 || !text.chars().all(|c| c.is_ascii_hexdigit()) {
                        return Err(error_at(
                            &token,
                            format!("'{text}' is not a sequence of hex byte pairs"),
                        ));
                    }
                    for i in (0..text.len()).step_by(2) {
                        let byte = u8::from_str_radix(&text[i..i + 2], 16)
                            .map_err(|e| error_at(&token, e.to_string()))?;
                        bytes.push(byte);
                    }
                }
                _ => return Err(self.expected("hex bytes or ']'")),
            }
        }

        Ok(bytes)
    }
}

/// Store a property, replacing the value of an earlier one with the same name.
fn set_property(doc: &mut Document, node: NodeId, name: String, values: Vec<Value>, line: u32) {
    match doc[node].property_mut(&name) {
        Some(existing) => {
            trace!(property = %name, "overriding property");
            existing.values = values;
            existing.line = line;
        }
        None => doc[node].properties.push(Property { name, values, line }),
    }
}

/// Depth of `id` below the root.
fn ancestors(doc: &Document, id: NodeId) -> usize {
    let mut depth = 0;
    let mut current = doc.parent(id);
    while let Some(parent) = current {
        depth += 1;
        current = doc.parent(parent);
    }
    depth
}

fn check_label(label: &str, at: &Token) -> Result<(), ParseError> {
    let mut chars = label.chars();
    let valid = chars
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(error_at(at, format!("invalid label '{label}'")))
    }
}

/// Rebuild source text from tokens, with a space wherever the source had a gap.
fn join_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut previous: Option<&Token> = None;

    for token in tokens {
        if previous.map_or(false, |p| !p.touches(token)) {
            out.push(' ');
        }
        out.push_str(&token.source_text());
        previous = Some(token);
    }

    out
}

fn error_at(token: &Token, message: impl Into<String>) -> ParseError {
    ParseError {
        message: message.into(),
        line: token.line,
        column: token.column,
        offset: token.offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(input: &str) -> Result<Document, ParseError> {
        parse(tokenize(input).unwrap())
    }

    fn props(input: &str) -> Vec<Property> {
        let doc = parse_str(&format!("/dts-v1/;\n/ {{\n{input}\n}};")).unwrap();
        doc[doc.root()].properties.clone()
    }

    fn single_value(input: &str) -> Value {
        let mut props = props(&format!("prop = {input};"));
        assert_eq!(props[0].values.len(), 1, "{input}");
        props.remove(0).values.remove(0)
    }

    #[test]
    fn function_like_defines() {
        for (input, name, value) in [
            ("#define MASK(n) ((1 << (n)) - 1)", "MASK(n)", "((1 << (n)) - 1)"),
            ("#define PAIR(a, b) ((a) + (b))", "PAIR(a, b)", "((a) + (b))"),
            ("#define GROUP (1 << 2)", "GROUP", "(1 << 2)"),
        ] {
            let doc = parse_str(&format!("{}\n/ {{ }};", dbg!(input))).unwrap();

            assert_eq!(
                doc.defines,
                [Define {
                    name: name.to_string(),
                    value: value.to_string(),
                }]
            );
            assert_eq!(crate::generator::generate(&doc), format!("{input}\n\n/ {{\n}};\n"));
        }

        assert!(parse_str("#define BAD(a\n/ { };").is_err());
    }

    #[test]
    fn minimal_document() {
        let doc = parse_str("/dts-v1/;\n\n/ {\n};\n").unwrap();

        assert_eq!(doc.version.as_deref(), Some("dts-v1"));
        assert_eq!(doc.len(), 1);
        assert_eq!(doc[doc.root()].name, "/");
    }

    #[test]
    fn header_directives() {
        let doc = parse_str(
            r#"// Board file
/* Copyright */

/dts-v1/;
/plugin/;
/memreserve/ 0x10000000 0x4000;
/memreserve/ 0x20000000 0x100;
#include "soc.dtsi"
#include <dt-bindings/gpio/gpio.h>
/include/ "extra.dtsi"
#define GPIO_ACTIVE_LOW 1
#define EMPTY

/ { };
"#,
        )
        .unwrap();

        assert_eq!(doc.comments, ["// Board file", "/* Copyright */"]);
        assert!(doc.plugin);
        assert_eq!(
            doc.memreserves,
            [
                MemReserve {
                    address: Number::hex(0x1000_0000, 8),
                    size: Number::hex(0x4000, 4),
                },
                MemReserve {
                    address: Number::hex(0x2000_0000, 8),
                    size: Number::hex(0x100, 3),
                },
            ]
        );
        assert_eq!(
            doc.includes,
            [
                Include {
                    path: "soc.dtsi".into(),
                    style: IncludeStyle::Quoted
                },
                Include {
                    path: "dt-bindings/gpio/gpio.h".into(),
                    style: IncludeStyle::Angled
                },
                Include {
                    path: "extra.dtsi".into(),
                    style: IncludeStyle::Directive
                },
            ]
        );
        assert_eq!(
            doc.defines,
            [
                Define {
                    name: "GPIO_ACTIVE_LOW".into(),
                    value: "1".into()
                },
                Define {
                    name: "EMPTY".into(),
                    value: "".into()
                },
            ]
        );
    }

    #[test]
    fn property_names() {
        for input in [
            "compatible",
            "#address-cells",
            "ti,hwmods",
            "linux,code",
            "pinctrl-0",
            "fsl,has-rstcr",
            "a,b,c",
        ] {
            let props = props(&format!("{input};"));
            assert_eq!(props[0].name, input);
            assert!(props[0].is_flag());
        }
    }

    #[test]
    fn string_values() {
        for (input, expected) in [
            (r#""okay""#, Value::string("okay")),
            (r#""""#, Value::string("")),
            (r#""a\"b""#, Value::string("a\"b")),
            (
                r#""ns16550a", "ns16550""#,
                Value::StringList(vec!["ns16550a".into(), "ns16550".into()]),
            ),
            (
                "\"a\",\n\t\"b\", \"c\"",
                Value::StringList(vec!["a".into(), "b".into(), "c".into()]),
            ),
        ] {
            assert_eq!(single_value(dbg!(input)), expected);
        }
    }

    #[test]
    fn cell_values() {
        let r = |s: &str| Cell::Reference(Reference::new(s));
        let raw = |s: &str| Cell::Raw(s.into());

        for (input, expected) in [
            ("<>", vec![]),
            ("<0>", vec![0u64.into()]),
            ("<0x08>", vec![Cell::Number(Number::hex(8, 2))]),
            (
                "<0xDEADBEEF 10>",
                vec![
                    Cell::Number(Number {
                        uppercase: true,
                        ..Number::hex(0xdead_beef, 8)
                    }),
                    10u64.into(),
                ],
            ),
            ("<&gic 0 1>", vec![r("gic"), 0u64.into(), 1u64.into()]),
            ("<&{/soc/gpio@0}>", vec![r("/soc/gpio@0")]),
            ("<GIC_SPI 4 IRQ_TYPE_LEVEL_HIGH>", vec![raw("GIC_SPI"), 4u64.into(), raw("IRQ_TYPE_LEVEL_HIGH")]),
            ("<(1 << 4)>", vec![raw("(1 << 4)")]),
            ("<(FOO + (2 * 3)) 7>", vec![raw("(FOO + (2 * 3))"), 7u64.into()]),
            ("<-1>", vec![raw("-1")]),
            ("<1+2>", vec![raw("1+2")]),
            ("<'A'>", vec![raw("'A'")]),
            ("<0x1\n\t0x2>", vec![Cell::Number(Number::hex(1, 1)), Cell::Number(Number::hex(2, 1))]),
        ] {
            assert_eq!(single_value(dbg!(input)), Value::CellArray(expected));
        }
    }

    #[test]
    fn other_values() {
        for (input, expected) in [
            ("[00 11 aa BB]", Value::ByteArray(vec![0x00, 0x11, 0xaa, 0xbb])),
            ("[0011aabb]", Value::ByteArray(vec![0x00, 0x11, 0xaa, 0xbb])),
            ("[]", Value::ByteArray(vec![])),
            ("&uart0", Value::reference("uart0")),
            ("&{/chosen}", Value::reference("/chosen")),
            ("42", Value::Number(Number::decimal(42))),
            (
                "/bits/ 8 <0x1 0x2>, <0x3>",
                Value::Bits {
                    width: 8,
                    arrays: vec![
                        vec![Cell::Number(Number::hex(1, 1)), Cell::Number(Number::hex(2, 1))],
                        vec![Cell::Number(Number::hex(3, 1))],
                    ],
                },
            ),
        ] {
            assert_eq!(single_value(dbg!(input)), expected);
        }
    }

    #[test]
    fn mixed_values() {
        let props = props(r#"data = <0x1 0x2>, "text", [ff], &lbl;"#);
        assert_eq!(
            props[0].values,
            [
                Value::CellArray(vec![Cell::Number(Number::hex(1, 1)), Cell::Number(Number::hex(2, 1))]),
                Value::string("text"),
                Value::ByteArray(vec![0xff]),
                Value::reference("lbl"),
            ]
        );
    }

    #[test]
    fn nodes() {
        let doc = parse_str(
            r#"/dts-v1/;
/ {
    #address-cells = <1>;

    cpus {
        cpu0: cpu@0 {
            device_type = "cpu";
            reg = <0>;
        };
    };

    ethernet@0,0 { };
    0x10 { };
};
"#,
        )
        .unwrap();

        let root = doc.root();
        assert_eq!(doc.children(root).len(), 3);

        let cpu = doc.find_by_path("/cpus/cpu@0").unwrap();
        assert_eq!(doc[cpu].label.as_deref(), Some("cpu0"));
        assert_eq!(doc[cpu].unit_address.as_deref(), Some("0"));
        assert_eq!(doc[cpu].line, 6);
        assert_eq!(doc[cpu].properties[1].line, 8);

        let eth = doc.find_by_path("/ethernet@0,0").unwrap();
        assert_eq!(doc[eth].name, "ethernet");
        assert_eq!(doc[eth].unit_address.as_deref(), Some("0,0"));
        assert!(doc.find_by_path("/0x10").is_some());
    }

    #[test]
    fn siblings_differ_by_unit_address() {
        let doc = parse_str(
            "/ {\n\tuart@1000 { id = <1>; };\n\tuart@2000 { id = <2>; };\n\tuart { id = <3>; };\n};",
        )
        .unwrap();
        let root = doc.root();
        assert_eq!(doc.children(root).len(), 3);

        for (address, id) in [(Some("1000"), 1u64), (Some("2000"), 2), (None, 3)] {
            let uart = doc.find_child(root, "uart", dbg!(address)).unwrap();
            assert_eq!(doc[uart].unit_address.as_deref(), address);
            assert_eq!(doc[uart].property("id").unwrap().cells().next(), Some(&Cell::from(id)));
        }

        assert_eq!(doc.find_child(root, "uart", Some("3000")), None);
        assert_eq!(doc.find_nodes_by_name("uart").len(), 3);
    }

    #[test]
    fn later_blocks_merge() {
        let doc = parse_str(
            r#"/dts-v1/;
/ {
    uart0: serial@1000 {
        status = "disabled";
        clock-frequency = <0>;
    };
};

/ {
    serial@1000 { clock-frequency = <100>; };
};

&uart0 {
    status = "okay";
    child { };
};
"#,
        )
        .unwrap();

        let uart = doc.find_by_path("/serial@1000").unwrap();
        assert_eq!(doc.children(doc.root()).len(), 1);
        assert_eq!(doc[uart].property("status").unwrap().as_str(), Some("okay"));
        assert_eq!(
            doc[uart].property("clock-frequency").unwrap().values,
            [Value::cells([100u64])]
        );
        assert_eq!(doc[uart].properties.len(), 2);
        assert!(doc.find_by_path("/serial@1000/child").is_some());
    }

    #[test]
    fn errors() {
        for (input, line) in [
            ("", 1),
            ("/dts-v1/", 1),
            ("/dts-v1/;\n/ {\n  a = <1>\n};", 4),
            ("/ {\n  a = ;\n};", 2),
            ("/ {\n  node {\n};", 3),
            ("/ { };\n/ { };\nextra", 3),
            ("/ {\n  a: x { };\n  a: y { };\n};", 3),
            ("/ {\n  a: b: x { };\n};", 2),
            ("/ {\n  1bad: x { };\n};", 2),
            ("/ { p = /bits/ 12 <1>; };", 1),
            ("/ { p = [abc]; };", 1),
            ("/ { p = <(1 2>; };", 1),
            ("/ { p = <1 2; };", 1),
            ("&missing { };\n", 1),
            ("/ { };\n&missing { };\n", 2),
            ("#include\n/ { };", 1),
            ("/unknown/;", 1),
        ] {
            let err = parse_str(dbg!(input)).unwrap_err();
            assert_eq!(err.line, line, "{err}");
        }
    }

    #[test]
    fn depth_limit() {
        let mut input = String::from("/ {");
        for i in 0..10 {
            input.push_str(&format!(" n{i} {{"));
        }
        for _ in 0..10 {
            input.push_str(" };");
        }
        input.push_str(" };");

        let tokens = tokenize(&input).unwrap();
        assert!(parse_with(tokens.clone(), &ParseOptions { max_depth: 11 }).is_ok());
        let err = parse_with(tokens, &ParseOptions { max_depth: 10 }).unwrap_err();
        assert!(err.message.contains("deeper than 10"));
    }

    #[test]
    fn standalone_values() {
        assert_eq!(
            parse_values(r#"<0x1 0x2>, "x";"#).unwrap(),
            [
                Value::CellArray(vec![Cell::Number(Number::hex(1, 1)), Cell::Number(Number::hex(2, 1))]),
                Value::string("x"),
            ]
        );
        assert!(parse_values("<1> <2>").is_err());
        assert!(parse_values("\"open").is_err());
    }
}
