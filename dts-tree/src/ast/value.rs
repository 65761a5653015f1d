use std::fmt::{self, Write as _};

/// The base an integer literal was written in. A leading `0` on a decimal
/// run makes it octal, as in C and dtc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Radix {
    Decimal,
    Octal,
    Hex,
}

/// An unsigned integer literal, remembering how it was written.
///
/// Hex and octal literals keep their digit count so that `0x08` and `0x8`
/// are regenerated distinctly. Hex literals also keep the case of their
/// digits and of the `0x` prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Number {
    pub value: u64,
    pub radix: Radix,
    /// Digits written, leading zeros included; for hex, after the prefix.
    pub width: usize,
    pub uppercase: bool,
    pub upper_prefix: bool,
}

impl Number {
    pub fn decimal(value: u64) -> Self {
        Self {
            value,
            radix: Radix::Decimal,
            width: 0,
            uppercase: false,
            upper_prefix: false,
        }
    }

    /// A lowercase hex literal padded to at least `width` digits.
    pub fn hex(value: u64, width: usize) -> Self {
        Self {
            radix: Radix::Hex,
            width,
            ..Self::decimal(value)
        }
    }

    /// Parse a literal in the form produced by the lexer (`0x1f`, `0X1F`,
    /// `017` or `31`).
    pub fn parse(text: &str) -> Option<Self> {
        if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            if digits.is_empty() {
                return None;
            }
            let value = u64::from_str_radix(digits, 16).ok()?;
            return Some(Self {
                uppercase: digits.chars().any(|c| c.is_ascii_uppercase()),
                upper_prefix: text.starts_with("0X"),
                ..Self::hex(value, digits.len())
            });
        }

        if text.is_empty() || !text.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        if text.len() > 1 && text.starts_with('0') {
            return Some(Self {
                value: u64::from_str_radix(text, 8).ok()?,
                radix: Radix::Octal,
                width: text.len(),
                ..Self::decimal(0)
            });
        }
        text.parse().ok().map(Self::decimal)
    }
}

impl From<u64> for Number {
    fn from(value: u64) -> Self {
        Self::decimal(value)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.width;
        match self.radix {
            Radix::Decimal => write!(f, "{}", self.value),
            Radix::Octal => write!(f, "{:0width$o}", self.value),
            Radix::Hex => {
                f.write_str(if self.upper_prefix { "0X" } else { "0x" })?;
                if self.uppercase {
                    write!(f, "{:0width$X}", self.value)
                } else {
                    write!(f, "{:0width$x}", self.value)
                }
            }
        }
    }
}

/// A symbolic pointer to another node: either a label (`&gic`) or an
/// absolute path (`&{/cpus/cpu@0}`).
///
/// References are never turned into live pointers; they are resolved on
/// demand against a [`LabelTable`](crate::labels::LabelTable).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference(pub String);

impl Reference {
    pub fn new(target: impl Into<String>) -> Self {
        Self(target.into())
    }

    pub fn is_path(&self) -> bool {
        self.0.starts_with('/')
    }

    /// The referenced label, if this is a label reference.
    pub fn label(&self) -> Option<&str> {
        (!self.is_path()).then_some(self.0.as_str())
    }

    /// The referenced path, if this is a path reference.
    pub fn path(&self) -> Option<&str> {
        self.is_path().then_some(self.0.as_str())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_path() {
            write!(f, "&{{{}}}", self.0)
        } else {
            write!(f, "&{}", self.0)
        }
    }
}

/// One entry of a `< ... >` cell array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Cell {
    Number(Number),
    Reference(Reference),
    /// Anything else, kept verbatim: macro names, `(1 << 4)`, `-1`, `'A'`.
    Raw(String),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(n) => n.fmt(f),
            Cell::Reference(r) => r.fmt(f),
            Cell::Raw(text) => f.write_str(text),
        }
    }
}

impl From<u64> for Cell {
    fn from(value: u64) -> Self {
        Cell::Number(value.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    String(String),
    StringList(Vec<String>),
    Number(Number),
    CellArray(Vec<Cell>),
    ByteArray(Vec<u8>),
    Reference(Reference),
    Bits { width: u32, arrays: Vec<Vec<Cell>> },
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn cells<I, C>(cells: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        Value::CellArray(cells.into_iter().map(Into::into).collect())
    }

    pub fn reference(target: impl Into<String>) -> Self {
        Value::Reference(Reference::new(target))
    }

    /// Every reference held by this value, including those inside arrays.
    pub fn references(&self) -> Vec<&Reference> {
        match self {
            Value::Reference(r) => vec![r],
            Value::CellArray(cells) => cell_references(cells).collect(),
            Value::Bits { arrays, .. } => arrays
                .iter()
                .flat_map(|cells| cell_references(cells))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The strings held by a string or string-list value.
    pub fn strings(&self) -> Vec<&str> {
        match self {
            Value::String(s) => vec![s.as_str()],
            Value::StringList(list) => list.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_) | Value::StringList(_))
    }
}

fn cell_references(cells: &[Cell]) -> impl Iterator<Item = &Reference> {
    cells.iter().filter_map(|cell| match cell {
        Cell::Reference(r) => Some(r),
        _ => None,
    })
}

/// Escape a decoded string so that the lexer reads it back unchanged.
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c.is_ascii_control() => out.push_str(&format!("\\x{:02x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out
}

pub(crate) fn write_cells(f: &mut impl fmt::Write, cells: &[Cell]) -> fmt::Result {
    f.write_char('<')?;
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            f.write_char(' ')?;
        }
        write!(f, "{cell}")?;
    }
    f.write_char('>')
}

impl fmt::Display for Value {
    /// Single-line form. The generator breaks bits arrays over several
    /// lines instead.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", escape_string(s)),
            Value::StringList(list) => {
                for (i, s) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "\"{}\"", escape_string(s))?;
                }
                Ok(())
            }
            Value::Number(n) => n.fmt(f),
            Value::CellArray(cells) => write_cells(f, cells),
            Value::ByteArray(bytes) => {
                f.write_char('[')?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_char(' ')?;
                    }
                    write!(f, "{b:02x}")?;
                }
                f.write_char(']')
            }
            Value::Reference(r) => r.fmt(f),
            Value::Bits { width, arrays } => {
                write!(f, "/bits/ {width} ")?;
                for (i, cells) in arrays.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write_cells(f, cells)?;
                }
                Ok(())
            }
        }
    }
}
