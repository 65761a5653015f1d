//! Error types for every stage of the pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Any failure turning source text into a [`Document`](crate::ast::Document).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl Error {
    /// Line of the offending input.
    pub fn line(&self) -> u32 {
        match self {
            Error::Lex(e) => e.line,
            Error::Parse(e) => e.line,
        }
    }

    /// Byte offset of the offending input.
    pub fn offset(&self) -> usize {
        match self {
            Error::Lex(e) => e.offset,
            Error::Parse(e) => e.offset,
        }
    }
}

/// What went wrong while tokenizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedString,
    UnterminatedChar,
    UnterminatedComment,
    UnexpectedCharacter(char),
    InvalidEscape,
}

/// A fatal tokenization failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{column}: {}", describe_lex(.kind))]
pub struct LexError {
    pub kind: LexErrorKind,
    pub line: u32,
    pub column: usize,
    pub offset: usize,
}

fn describe_lex(kind: &LexErrorKind) -> String {
    match kind {
        LexErrorKind::UnterminatedString => "unterminated string literal".to_string(),
        LexErrorKind::UnterminatedChar => "unterminated character literal".to_string(),
        LexErrorKind::UnterminatedComment => "unterminated block comment".to_string(),
        LexErrorKind::UnexpectedCharacter(c) => format!("unexpected character {c:?}"),
        LexErrorKind::InvalidEscape => "invalid escape sequence in string".to_string(),
    }
}

/// A fatal syntax error. Parsing stops at the first one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: usize,
    pub offset: usize,
}

/// Failure while inlining `#include` directives.
#[derive(Debug, Error)]
pub enum IncludeError {
    #[error("{}:{line}: cannot find include file {path:?}", .included_from.display())]
    NotFound {
        path: String,
        included_from: PathBuf,
        line: usize,
    },

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a path-addressed tree mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("node not found: {0}")]
    NotFound(String),

    #[error("property '{property}' not found in {path}")]
    PropertyNotFound { path: String, property: String },

    #[error("label '{0}' is already defined")]
    DuplicateLabel(String),

    #[error("node {0} already exists")]
    DuplicateNode(String),

    #[error("property '{property}' already exists in {path}")]
    DuplicateProperty { path: String, property: String },

    #[error("the root node cannot be removed or moved")]
    RootNode,

    #[error("cannot move {source_path} into its own subtree {target_path}")]
    InvalidMove {
        source_path: String,
        target_path: String,
    },
}

/// Failure evaluating a literal cell expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExprError {
    #[error("malformed expression: {0}")]
    Syntax(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("macro expansion of '{0}' is too deep")]
    Recursion(String),

    #[error("expression is too long or too deeply nested")]
    TooComplex,
}
