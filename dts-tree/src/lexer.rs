//! Tokenizer for Device Tree Source text.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_until, take_while, take_while_m_n},
    character::complete::{anychar, char, none_of, one_of, satisfy},
    combinator::{cut, map, map_opt, not, recognize, value},
    multi::fold_many0,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use nom_locate::LocatedSpan;
use tracing::trace;

use crate::error::{LexError, LexErrorKind};

pub(crate) type Span<'a> = LocatedSpan<&'a str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    LBrace,
    RBrace,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LAngle,
    RAngle,
    Comma,
    Semicolon,
    Colon,
    Equals,
    Ampersand,
    Slash,
    Plus,
    Minus,
    Star,
    Percent,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Question,
    LShift,
    RShift,
    LogicalAnd,
    LogicalOr,
    Ident,
    Number,
    HexNumber,
    Str,
    Char,
    LineComment,
    BlockComment,
    Include,
    Define,
    Newline,
    Eof,
}

/// A lexical unit with its position in the source.
///
/// For string literals `text` holds the decoded contents; for character
/// literals the raw contents between the quotes; for everything else the
/// source slice itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: usize,
    pub offset: usize,
    pub len: usize,
}

impl Token {
    /// Byte offset just past the token.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Whether `next` starts exactly where this token ends.
    pub fn touches(&self, next: &Token) -> bool {
        self.end() == next.offset
    }

    /// The token written back in source form.
    pub fn source_text(&self) -> String {
        match self.kind {
            TokenKind::Str => format!("\"{}\"", crate::ast::escape_string(&self.text)),
            TokenKind::Char => format!("'{}'", self.text),
            _ => self.text.clone(),
        }
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Eof => "end of file".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Ident => format!("identifier '{}'", self.text),
            TokenKind::Number | TokenKind::HexNumber => format!("number '{}'", self.text),
            TokenKind::Str => format!("string {:?}", self.text),
            _ => format!("'{}'", self.source_text()),
        }
    }
}

/// Turn source text into tokens, ending with a single [`TokenKind::Eof`].
///
/// Spaces and tabs are dropped; newlines and comments are kept so the parser
/// can delimit `#define` lines and recover the header comment block.
pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    let mut input = Span::new(source);
    let mut tokens = Vec::new();

    loop {
        if let Ok((rest, _)) = blank(input) {
            input = rest;
        }

        if input.fragment().is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                line: input.location_line(),
                column: input.get_utf8_column(),
                offset: input.location_offset(),
                len: 0,
            });
            break;
        }

        match token(input) {
            Ok((rest, (kind, text))) => {
                tokens.push(Token {
                    kind,
                    text,
                    line: input.location_line(),
                    column: input.get_utf8_column(),
                    offset: input.location_offset(),
                    len: rest.location_offset() - input.location_offset(),
                });
                input = rest;
            }
            Err(_) => return Err(lex_error(input)),
        }
    }

    trace!(count = tokens.len(), "tokenized source");
    Ok(tokens)
}

/// Work out why no token matched at `input`.
fn lex_error(input: Span) -> LexError {
    let rest = *input.fragment();
    if let Some(at) = rest.strip_prefix('"').and_then(invalid_escape) {
        let at = at + 1;
        return LexError {
            kind: LexErrorKind::InvalidEscape,
            line: input.location_line() + rest[..at].matches('\n').count() as u32,
            column: match rest[..at].rfind('\n') {
                Some(newline) => rest[newline + 1..at].chars().count() + 1,
                None => input.get_utf8_column() + rest[..at].chars().count(),
            },
            offset: input.location_offset() + at,
        };
    }

    let kind = if rest.starts_with('"') {
        LexErrorKind::UnterminatedString
    } else if rest.starts_with('\'') {
        LexErrorKind::UnterminatedChar
    } else if rest.starts_with("/*") {
        LexErrorKind::UnterminatedComment
    } else {
        LexErrorKind::UnexpectedCharacter(rest.chars().next().unwrap_or('\0'))
    };

    LexError {
        kind,
        line: input.location_line(),
        column: input.get_utf8_column(),
        offset: input.location_offset(),
    }
}

type Lexed = (TokenKind, String);

/// Consume horizontal whitespace. Never fails.
fn blank(input: Span) -> IResult<Span, Span> {
    take_while(|c: char| matches!(c, ' ' | '\t' | '\r' | '\x0c' | '\u{feff}'))(input)
}

/// Lex a single token. Ordering is important here!
fn token(input: Span) -> IResult<Span, Lexed> {
    alt((
        comment,
        preprocessor,
        string,
        character,
        number_or_word,
        identifier,
        operator,
        punctuation,
        value(
            (TokenKind::Newline, "\n".to_string()),
            char('\n'),
        ),
    ))(input)
}

/// Lex a `//` or `/* */` comment, keeping its full text.
fn comment(input: Span) -> IResult<Span, Lexed> {
    alt((
        map(
            recognize(pair(tag("//"), take_while(|c: char| c != '\n'))),
            |s: Span| {
                (
                    TokenKind::LineComment,
                    s.fragment().trim_end_matches('\r').to_string(),
                )
            },
        ),
        map(
            recognize(preceded(tag("/*"), cut(pair(take_until("*/"), tag("*/"))))),
            |s: Span| (TokenKind::BlockComment, s.fragment().to_string()),
        ),
    ))(input)
}

/// Lex `#include` or `#define`, but not `#address-cells`.
fn preprocessor(input: Span) -> IResult<Span, Lexed> {
    let keyword = |word: &'static str, kind: TokenKind| {
        map(terminated(tag(word), not(satisfy(is_ident_char))), move |_| {
            (kind, word.to_string())
        })
    };

    alt((
        keyword("#include", TokenKind::Include),
        keyword("#define", TokenKind::Define),
    ))(input)
}

/// Lex a double-quoted string, decoding escapes with [`escape`].
fn string(input: Span) -> IResult<Span, Lexed> {
    let body = fold_many0(
        alt((
            map(is_not("\"\\"), |s: Span| s.fragment().to_string()),
            map(preceded(char('\\'), escape), String::from),
        )),
        String::new,
        |mut acc: String, piece: String| {
            acc.push_str(&piece);
            acc
        },
    );

    map(delimited(char('"'), body, char('"')), |s| (TokenKind::Str, s))(input)
}

/// Decode the escape after a backslash the way dtc does: C letter escapes,
/// up to three octal digits, `x` with up to two hex digits, and any other
/// character standing for itself. Escapes naming a byte above 0x7f fail.
fn escape(input: Span) -> IResult<Span, char> {
    let ascii = |digits: Span, radix| u8::from_str_radix(digits.fragment(), radix).ok().filter(u8::is_ascii).map(char::from);

    alt((
        map_opt(
            preceded(char('x'), take_while_m_n(1, 2, |c: char| c.is_ascii_hexdigit())),
            move |d: Span| ascii(d, 16),
        ),
        map_opt(take_while_m_n(1, 3, |c: char| c.is_digit(8)), move |d: Span| ascii(d, 8)),
        map(none_of("x01234567"), |c: char| match c {
            'a' => '\x07',
            'b' => '\x08',
            't' => '\t',
            'n' => '\n',
            'v' => '\x0b',
            'f' => '\x0c',
            'r' => '\r',
            other => other,
        }),
    ))(input)
}

/// Byte offset, within a string body, of the first backslash starting an
/// escape that [`escape`] rejects. `None` when the body closes first.
fn invalid_escape(body: &str) -> Option<usize> {
    let mut chars = body.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return None,
            '\\' if i + 1 < body.len() => {
                if escape(Span::new(&body[i + 1..])).is_err() {
                    return Some(i);
                }
                chars.next();
            }
            _ => {}
        }
    }
    None
}

/// Lex a character literal such as `'A'` or `'\n'`.
fn character(input: Span) -> IResult<Span, Lexed> {
    map(
        delimited(
            char('\''),
            recognize(alt((
                recognize(pair(char('\\'), anychar)),
                recognize(none_of("\\'\n")),
            ))),
            char('\''),
        ),
        |s: Span| (TokenKind::Char, s.fragment().to_string()),
    )(input)
}

/// Lex a run starting with a digit.
///
/// `0x` followed by hex digits is a hex number and all digits is a decimal
/// number. Anything else (`1a2b`, `3com`) is a word, as found in byte strings
/// and node names.
fn number_or_word(input: Span) -> IResult<Span, Lexed> {
    map(
        recognize(pair(
            satisfy(|c| c.is_ascii_digit()),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        )),
        |s: Span| {
            let text = *s.fragment();
            let kind = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                Some(digits) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()) => {
                    TokenKind::HexNumber
                }
                _ if text.chars().all(|c| c.is_ascii_digit()) => TokenKind::Number,
                _ => TokenKind::Ident,
            };
            (kind, text.to_string())
        },
    )(input)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '#'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@' | '#' | '+' | '?')
}

/// Lex labels, node names, property names and macro names.
fn identifier(input: Span) -> IResult<Span, Lexed> {
    map(
        recognize(pair(satisfy(is_ident_start), take_while(is_ident_char))),
        |s: Span| (TokenKind::Ident, s.fragment().to_string()),
    )(input)
}

/// Lex a two-character operator.
fn operator(input: Span) -> IResult<Span, Lexed> {
    let op = |text: &'static str, kind: TokenKind| map(tag(text), move |_| (kind, text.to_string()));

    alt((
        op("<<", TokenKind::LShift),
        op(">>", TokenKind::RShift),
        op("&&", TokenKind::LogicalAnd),
        op("||", TokenKind::LogicalOr),
    ))(input)
}

/// Lex a single-character control or operator token.
fn punctuation(input: Span) -> IResult<Span, Lexed> {
    map(one_of("{}()[]<>,;:=&/+-*%|^~!?"), |c| {
        let kind = match c {
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '<' => TokenKind::LAngle,
            '>' => TokenKind::RAngle,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            ':' => TokenKind::Colon,
            '=' => TokenKind::Equals,
            '&' => TokenKind::Ampersand,
            '/' => TokenKind::Slash,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '%' => TokenKind::Percent,
            '|' => TokenKind::Pipe,
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '!' => TokenKind::Bang,
            _ => TokenKind::Question,
        };
        (kind, c.to_string())
    })(input)
}
