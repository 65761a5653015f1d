//! Evaluation of integer expressions found in cell arrays.
//!
//! Cells such as `(1 << 4)` or `GIC_SPI` are stored verbatim by the parser.
//! This module parses them with C precedence and evaluates them with
//! unsigned 64-bit wrap-around arithmetic, expanding `#define`d names.

use std::collections::HashMap;

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{
        alpha1, alphanumeric1, anychar, char, digit1, hex_digit1, multispace0, none_of, oct_digit1,
    },
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::many0_count,
    sequence::{delimited, pair, preceded, terminated},
    Finish, IResult,
};

use crate::ast::{Cell, Document};
use crate::error::ExprError;

/// How many nested macro expansions are followed before giving up.
const MAX_EXPANSION_DEPTH: usize = 32;

/// Limits on a single expression text: operator count and parenthesis depth.
const MAX_OPERATORS: usize = 256;
const MAX_PARENS: usize = 64;

/// Deepest evaluation, counting every sub-expression across macro expansions.
const MAX_EVAL_DEPTH: usize = 1024;

/// Source of macro definitions for [`Expression::Symbol`].
pub trait Symbols {
    fn lookup(&self, name: &str) -> Option<&str>;
}

impl Symbols for Document {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.define(name)
    }
}

impl Symbols for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).map(String::as_str)
    }
}

impl Symbols for () {
    fn lookup(&self, _: &str) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Lit(IntLiteral),
    Symbol(String),
    Unary(UnaryOp, Box<Expression>),
    Binary(Box<Expression>, BinaryOp, Box<Expression>),
    Ternary {
        cond: Box<Expression>,
        then: Box<Expression>,
        else_: Box<Expression>,
    },
}

impl Expression {
    pub fn eval(&self, symbols: &dyn Symbols) -> Result<u64, ExprError> {
        self.eval_at(symbols, 0, 0)
    }

    fn eval_at(&self, symbols: &dyn Symbols, depth: usize, expansions: usize) -> Result<u64, ExprError> {
        if depth >= MAX_EVAL_DEPTH {
            return Err(ExprError::TooComplex);
        }
        let eval = |e: &Expression| e.eval_at(symbols, depth + 1, expansions);

        match self {
            Expression::Lit(l) => Ok(l.eval()),
            Expression::Symbol(name) => {
                let text = symbols
                    .lookup(name)
                    .ok_or_else(|| ExprError::UnknownIdentifier(name.clone()))?;
                if expansions >= MAX_EXPANSION_DEPTH {
                    return Err(ExprError::Recursion(name.clone()));
                }
                parse(text)?.eval_at(symbols, depth + 1, expansions + 1)
            }
            Expression::Unary(op, e) => Ok(op.apply(eval(&**e)?)),
            Expression::Binary(lhs, op, rhs) => {
                let l = eval(&**lhs)?;
                match op {
                    BinaryOp::And if l == 0 => Ok(0),
                    BinaryOp::Or if l != 0 => Ok(1),
                    _ => op.apply(l, eval(&**rhs)?),
                }
            }
            Expression::Ternary { cond, then, else_ } => {
                if eval(&**cond)? != 0 {
                    eval(&**then)
                } else {
                    eval(&**else_)
                }
            }
        }
    }
}

impl From<u64> for Box<Expression> {
    fn from(n: u64) -> Self {
        Expression::Lit(n.into()).into()
    }
}

impl From<char> for Box<Expression> {
    fn from(c: char) -> Self {
        Expression::Lit(c.into()).into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntLiteral {
    Num(u64),
    Char(char),
}

impl IntLiteral {
    pub fn eval(&self) -> u64 {
        match self {
            IntLiteral::Num(n) => *n,
            IntLiteral::Char(c) => *c as u64,
        }
    }
}

impl From<u64> for IntLiteral {
    fn from(n: u64) -> Self {
        IntLiteral::Num(n)
    }
}

impl From<char> for IntLiteral {
    fn from(c: char) -> Self {
        IntLiteral::Char(c)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    BitNot,
    LogicalNot,
}

impl UnaryOp {
    pub fn apply(&self, v: u64) -> u64 {
        match self {
            UnaryOp::Neg => v.wrapping_neg(),
            UnaryOp::BitNot => !v,
            UnaryOp::LogicalNot => (v == 0) as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
    And,
    Or,
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinaryOp {
    /// Binding strength; higher binds tighter.
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 10,
            BinaryOp::Add | BinaryOp::Sub => 9,
            BinaryOp::LShift | BinaryOp::RShift => 8,
            BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => 7,
            BinaryOp::Eq | BinaryOp::Neq => 6,
            BinaryOp::BitAnd => 5,
            BinaryOp::BitXor => 4,
            BinaryOp::BitOr => 3,
            BinaryOp::And => 2,
            BinaryOp::Or => 1,
        }
    }

    pub fn apply(&self, l: u64, r: u64) -> Result<u64, ExprError> {
        let shift = |r: u64| u32::try_from(r).map_err(|_| ExprError::Overflow);

        Ok(match self {
            BinaryOp::Add => l.wrapping_add(r),
            BinaryOp::Sub => l.wrapping_sub(r),
            BinaryOp::Mul => l.wrapping_mul(r),
            BinaryOp::Div => l.checked_div(r).ok_or(ExprError::DivisionByZero)?,
            BinaryOp::Mod => l.checked_rem(r).ok_or(ExprError::DivisionByZero)?,
            BinaryOp::BitAnd => l & r,
            BinaryOp::BitOr => l | r,
            BinaryOp::BitXor => l ^ r,
            BinaryOp::LShift => l.checked_shl(shift(r)?).ok_or(ExprError::Overflow)?,
            BinaryOp::RShift => l.checked_shr(shift(r)?).ok_or(ExprError::Overflow)?,
            BinaryOp::And => (l != 0 && r != 0) as u64,
            BinaryOp::Or => (l != 0 || r != 0) as u64,
            BinaryOp::Eq => (l == r) as u64,
            BinaryOp::Neq => (l != r) as u64,
            BinaryOp::Lt => (l < r) as u64,
            BinaryOp::Gt => (l > r) as u64,
            BinaryOp::Le => (l <= r) as u64,
            BinaryOp::Ge => (l >= r) as u64,
        })
    }
}

/// Parse an expression such as `(GIC_SPI + 4) << 1`.
pub fn parse(text: &str) -> Result<Expression, ExprError> {
    check_size(text)?;
    all_consuming(terminated(expression, multispace0))(text)
        .finish()
        .map(|(_, expr)| expr)
        .map_err(|_| ExprError::Syntax(text.to_string()))
}

/// Parse and evaluate in one step.
pub fn evaluate(text: &str, symbols: &dyn Symbols) -> Result<u64, ExprError> {
    parse(text)?.eval(symbols)
}

/// Numeric value of a cell, or `None` for references whose phandle is only
/// known after compilation.
pub fn cell_value(cell: &Cell, symbols: &dyn Symbols) -> Result<Option<u64>, ExprError> {
    match cell {
        Cell::Number(n) => Ok(Some(n.value)),
        Cell::Reference(_) => Ok(None),
        Cell::Raw(text) => evaluate(text, symbols).map(Some),
    }
}

/// Reject text whose parse tree would be deeper than the limits allow.
/// Counts operator characters, so `<<` counts twice.
fn check_size(text: &str) -> Result<(), ExprError> {
    let mut operators = 0;
    let mut parens = 0usize;

    for c in text.chars() {
        match c {
            '(' => {
                operators += 1;
                parens += 1;
                if parens > MAX_PARENS {
                    return Err(ExprError::TooComplex);
                }
            }
            ')' => parens = parens.saturating_sub(1),
            '+' | '-' | '*' | '/' | '%' | '&' | '|' | '^' | '~' | '!' | '<' | '>' | '=' | '?' => operators += 1,
            _ => {}
        }
    }

    if operators > MAX_OPERATORS {
        return Err(ExprError::TooComplex);
    }
    Ok(())
}

/// Parse a parser surrounded by optional whitespace on the left.
fn ws<'a, O>(inner: impl FnMut(&'a str) -> IResult<&'a str, O>) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    preceded(multispace0, inner)
}

/// Parse a full expression, including the ternary operator.
fn expression(input: &str) -> IResult<&str, Expression> {
    let (input, cond) = binary(input, 1)?;
    let (input, branches) = opt(pair(
        preceded(ws(char('?')), expression),
        preceded(ws(char(':')), expression),
    ))(input)?;

    Ok(match branches {
        Some((then, else_)) => (
            input,
            Expression::Ternary {
                cond: cond.into(),
                then: then.into(),
                else_: else_.into(),
            },
        ),
        None => (input, cond),
    })
}

/// Parse a chain of binary operators binding at least as tight as `min_precedence`.
fn binary(input: &str, min_precedence: u8) -> IResult<&str, Expression> {
    let (mut input, mut lhs) = unary(input)?;

    loop {
        let Ok((rest, op)) = ws(binary_op)(input) else {
            break;
        };
        let precedence = op.precedence();
        if precedence < min_precedence {
            break;
        }

        let (rest, rhs) = binary(rest, precedence + 1)?;
        lhs = Expression::Binary(lhs.into(), op, rhs.into());
        input = rest;
    }

    Ok((input, lhs))
}

/// Parse a binary operator. Longer operators are tried first.
fn binary_op(input: &str) -> IResult<&str, BinaryOp> {
    alt((
        value(BinaryOp::LShift, tag("<<")),
        value(BinaryOp::RShift, tag(">>")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Neq, tag("!=")),
        value(BinaryOp::And, tag("&&")),
        value(BinaryOp::Or, tag("||")),
        value(BinaryOp::Add, char('+')),
        value(BinaryOp::Sub, char('-')),
        value(BinaryOp::Mul, char('*')),
        value(BinaryOp::Div, char('/')),
        value(BinaryOp::Mod, char('%')),
        value(BinaryOp::BitAnd, char('&')),
        value(BinaryOp::BitOr, char('|')),
        value(BinaryOp::BitXor, char('^')),
        value(BinaryOp::Lt, char('<')),
        value(BinaryOp::Gt, char('>')),
    ))(input)
}

/// Parse a prefix-operator chain applied to a primary expression.
fn unary(input: &str) -> IResult<&str, Expression> {
    let op = alt((
        value(UnaryOp::Neg, char('-')),
        value(UnaryOp::BitNot, char('~')),
        value(UnaryOp::LogicalNot, char('!')),
    ));

    alt((
        map(pair(ws(op), unary), |(op, e)| Expression::Unary(op, e.into())),
        primary,
    ))(input)
}

/// Parse a literal, a macro name or a parenthesized expression.
fn primary(input: &str) -> IResult<&str, Expression> {
    ws(alt((
        map(integer, |n| Expression::Lit(IntLiteral::Num(n))),
        map(char_literal, |c| Expression::Lit(IntLiteral::Char(c))),
        map(identifier, |s: &str| Expression::Symbol(s.to_string())),
        delimited(char('('), expression, ws(char(')'))),
    )))(input)
}

/// Parse a hex, octal or decimal integer with an optional C suffix (`U`, `UL`, `ULL`...).
fn integer(input: &str) -> IResult<&str, u64> {
    terminated(
        alt((
            map_res(preceded(tag_no_case("0x"), hex_digit1), |d: &str| u64::from_str_radix(d, 16)),
            map_res(recognize(pair(char('0'), oct_digit1)), |d: &str| u64::from_str_radix(d, 8)),
            map_res(digit1, |d: &str| d.parse::<u64>()),
        )),
        opt(alt((
            tag_no_case("ull"),
            tag_no_case("ul"),
            tag_no_case("ll"),
            tag_no_case("u"),
            tag_no_case("l"),
        ))),
    )(input)
}

/// Parse a character literal such as `'A'` or `'\n'`.
fn char_literal(input: &str) -> IResult<&str, char> {
    delimited(
        char('\''),
        alt((
            preceded(
                char('\\'),
                map(anychar, |c: char| match c {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                }),
            ),
            none_of("\\'"),
        )),
        char('\''),
    )(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(n: u64) -> Box<Expression> {
        n.into()
    }

    #[test]
    fn parse_unsigned_numbers() {
        for (input, expected) in [
            ("0", 0),
            ("1", 1),
            ("25", 25),
            ("0x1", 0x1),
            ("0x25", 0x25),
            ("0X1F", 0x1f),
            ("010", 8),
            ("4096UL", 4096),
            ("0x10ull", 0x10),
        ] {
            assert_eq!(Expression::Lit(IntLiteral::Num(expected)), parse(dbg!(input)).unwrap());
        }
    }

    #[test]
    fn parse_and_eval_unary_op() {
        use Expression::Unary;
        use UnaryOp::*;

        for (input, res, ast) in [
            ("-1", u64::MAX, Unary(Neg, lit(1))),
            ("- ~0xf", 16, Unary(Neg, Unary(BitNot, lit(0xf)).into())),
            ("!!0", 0, Unary(LogicalNot, Unary(LogicalNot, lit(0)).into())),
        ] {
            let expr = parse(dbg!(input)).unwrap();

            assert_eq!(ast, expr);
            assert_eq!(res, expr.eval(&()).unwrap());
        }
    }

    #[test]
    fn parse_and_eval_binary_op() {
        use BinaryOp::*;
        use Expression::*;
        use UnaryOp::*;

        for (input, res, ast) in [
            ("1+1", 2, Binary(lit(1), Add, lit(1))),
            ("2 * 1", 2, Binary(lit(2), Mul, lit(1))),
            (
                "(3+2) * 1",
                5,
                Binary(Binary(lit(3), Add, lit(2)).into(), Mul, lit(1)),
            ),
            (
                "(1-4*2+~0)",
                -8i64 as u64,
                Binary(
                    Binary(lit(1), Sub, Binary(lit(4), Mul, lit(2)).into()).into(),
                    Add,
                    Unary(BitNot, lit(0)).into(),
                ),
            ),
            (
                "~1 << (2 >> 1)",
                -4i64 as u64,
                Binary(
                    Unary(BitNot, lit(1)).into(),
                    LShift,
                    Binary(lit(2), RShift, lit(1)).into(),
                ),
            ),
            (
                "1 <= 2 > 3 == 5",
                0,
                Binary(
                    Binary(Binary(lit(1), Le, lit(2)).into(), Gt, lit(3)).into(),
                    Eq,
                    lit(5),
                ),
            ),
            (
                "2-1 != 0",
                1,
                Binary(Binary(lit(2), Sub, lit(1)).into(), Neq, lit(0)),
            ),
            (
                "1 | 2 & 3 ^ 4",
                7,
                Binary(
                    lit(1),
                    BitOr,
                    Binary(Binary(lit(2), BitAnd, lit(3)).into(), BitXor, lit(4)).into(),
                ),
            ),
            (
                "((2 + 'A') != 0) ? (5 << 1) : ~0",
                10,
                Ternary {
                    cond: Binary(Binary(lit(2), Add, 'A'.into()).into(), Neq, lit(0)).into(),
                    then: Binary(lit(5), LShift, lit(1)).into(),
                    else_: Unary(BitNot, lit(0)).into(),
                },
            ),
        ] {
            let expr = parse(dbg!(input)).unwrap();

            assert_eq!(ast, expr);
            assert_eq!(res, expr.eval(&()).unwrap());
        }
    }

    #[test]
    fn macros() {
        let symbols: HashMap<String, String> = [
            ("GIC_SPI", "0"),
            ("IRQ_TYPE_LEVEL_HIGH", "4"),
            ("BASE", "(0x1000 + OFFSET)"),
            ("OFFSET", "0x20"),
            ("LOOP", "LOOP + 1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        for (input, expected) in [
            ("GIC_SPI", Ok(0)),
            ("IRQ_TYPE_LEVEL_HIGH | 1", Ok(5)),
            ("BASE", Ok(0x1020)),
            ("MISSING", Err(ExprError::UnknownIdentifier("MISSING".into()))),
            ("LOOP", Err(ExprError::Recursion("LOOP".into()))),
            ("1 / 0", Err(ExprError::DivisionByZero)),
            ("1 << 64", Err(ExprError::Overflow)),
            ("0 && MISSING", Ok(0)),
            ("(1", Err(ExprError::Syntax("(1".into()))),
        ] {
            assert_eq!(evaluate(dbg!(input), &symbols), expected);
        }
    }

    #[test]
    fn size_limits() {
        let nested = |n| format!("{}1{}", "(".repeat(n), ")".repeat(n));
        let chain = |n| vec!["1"; n].join(" + ");

        for (input, expected) in [
            (nested(60), Ok(1)),
            (nested(1000), Err(ExprError::TooComplex)),
            (chain(200), Ok(200)),
            (chain(200_000), Err(ExprError::TooComplex)),
            (format!("{}1", "~".repeat(300)), Err(ExprError::TooComplex)),
        ] {
            assert_eq!(evaluate(&input, &()), expected, "{} chars", input.len());
        }
    }

    #[test]
    fn deep_macro_chains() {
        // Each macro adds 200 levels of negation before the next one.
        let symbols: HashMap<String, String> = (0..20)
            .map(|i| {
                let value = if i == 19 {
                    "1".to_string()
                } else {
                    format!("{}M{}", "-".repeat(200), i + 1)
                };
                (format!("M{i}"), value)
            })
            .collect();

        assert_eq!(evaluate("M18", &symbols), Ok(1));
        assert_eq!(evaluate("M0", &symbols), Err(ExprError::TooComplex));
    }

    #[test]
    fn cells() {
        use crate::ast::{Number, Reference};

        assert_eq!(cell_value(&Cell::Number(Number::hex(0x10, 2)), &()), Ok(Some(0x10)));
        assert_eq!(cell_value(&Cell::Reference(Reference::new("gic")), &()), Ok(None));
        assert_eq!(cell_value(&Cell::Raw("(1 << 4)".into()), &()), Ok(Some(16)));
        assert_eq!(cell_value(&Cell::Raw("-1".into()), &()), Ok(Some(u64::MAX)));
    }
}
