//! Parse, inspect, edit and regenerate Device Tree Source files.
//!
//! Text goes through [`lexer::tokenize`] and [`parser::parse`] into an
//! [`ast::Document`], and back out through [`generator::generate`]. Parsing
//! canonical output again yields an equal document.
//!
//! ```
//! let doc = dts_tree::from_str("/dts-v1/;\n/ { model = \"board\"; };").unwrap();
//! let root = doc.root();
//! assert_eq!(doc[root].property("model").unwrap().as_str(), Some("board"));
//! assert_eq!(dts_tree::to_string(&doc), "/dts-v1/;\n\n/ {\n\tmodel = \"board\";\n};\n");
//! ```

pub mod ast;
pub mod compare;
pub mod editor;
mod error;
pub mod expr;
pub mod generator;
pub mod include;
pub mod labels;
pub mod lexer;
pub mod parser;
pub mod validator;

pub use error::*;

use tracing::debug;

use crate::ast::Document;
use crate::parser::ParseOptions;

/// Tokenize and parse `source` with default options.
pub fn from_str(source: &str) -> Result<Document, Error> {
    from_str_with(source, &ParseOptions::default())
}

pub fn from_str_with(source: &str, options: &ParseOptions) -> Result<Document, Error> {
    let tokens = lexer::tokenize(source)?;
    debug!(tokens = tokens.len(), "tokenized source");
    Ok(parser::parse_with(tokens, options)?)
}

/// Regenerate canonical source text.
pub fn to_string(doc: &Document) -> String {
    generator::generate(doc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_positions() {
        for (input, line) in [
            ("/dts-v1/;\n/ {\n\tname = \"open;\n};", 3),
            ("/ {\n\ta = <1>;\n\tb = <2>\n};", 4),
            ("/ {\n};\n$", 3),
        ] {
            let err = from_str(dbg!(input)).unwrap_err();
            assert_eq!(err.line(), line);
            assert!(err.offset() < input.len());
        }
    }

    #[test]
    fn depth_is_configurable() {
        let source = "/ { a { b { c { }; }; }; };";
        assert!(from_str(source).is_ok());
        assert!(from_str_with(source, &ParseOptions { max_depth: 3 }).is_err());
    }
}
