//! Turn a [`Document`] back into Device Tree Source text.
//!
//! Output layout is fixed: header comments, directives, then the node tree
//! indented one level per depth. Generating a parsed document and parsing
//! the result again yields an equal document.

use crate::ast::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOptions {
    /// One level of indentation.
    pub indent: String,
    /// Separate sibling nodes, and a node's properties from its children,
    /// with an empty line.
    pub blank_line_between_nodes: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            indent: "\t".to_string(),
            blank_line_between_nodes: true,
        }
    }
}

/// Render a document with the default layout.
pub fn generate(doc: &Document) -> String {
    generate_with(doc, &GenerateOptions::default())
}

pub fn generate_with(doc: &Document, options: &GenerateOptions) -> String {
    let mut out = String::new();
    header(&mut out, doc);
    tree(&mut out, doc, doc.root(), 0, options);
    out
}

/// Render one node and its subtree, starting at column zero.
pub fn generate_node(doc: &Document, id: NodeId, options: &GenerateOptions) -> String {
    let mut out = String::new();
    if doc.contains(id) {
        tree(&mut out, doc, id, 0, options);
    }
    out
}

/// Render a single property statement, e.g. `reg = <0x0 0x1000>;`.
pub fn generate_property(property: &Property, options: &GenerateOptions) -> String {
    let mut out = String::new();
    property_line(&mut out, property, 0, options);
    out.truncate(out.trim_end().len());
    out
}

fn header(out: &mut String, doc: &Document) {
    for comment in &doc.comments {
        out.push_str(comment);
        out.push('\n');
    }
    if !doc.comments.is_empty() {
        out.push('\n');
    }

    if let Some(version) = &doc.version {
        out.push_str(&format!("/{version}/;\n"));
    }
    if doc.plugin {
        out.push_str("/plugin/;\n");
    }
    if doc.version.is_some() || doc.plugin {
        out.push('\n');
    }

    for reserve in &doc.memreserves {
        out.push_str(&format!("/memreserve/ {} {};\n", reserve.address, reserve.size));
    }
    if !doc.memreserves.is_empty() {
        out.push('\n');
    }

    for include in &doc.includes {
        let line = match include.style {
            IncludeStyle::Quoted => format!("#include \"{}\"", include.path),
            IncludeStyle::Angled => format!("#include <{}>", include.path),
            IncludeStyle::Directive => format!("/include/ \"{}\"", include.path),
        };
        out.push_str(&line);
        out.push('\n');
    }
    for define in &doc.defines {
        if define.value.is_empty() {
            out.push_str(&format!("#define {}\n", define.name));
        } else {
            out.push_str(&format!("#define {} {}\n", define.name, define.value));
        }
    }
    if !doc.includes.is_empty() || !doc.defines.is_empty() {
        out.push('\n');
    }
}

enum Step {
    Open(NodeId, usize),
    Close(usize),
    Blank,
}

/// Walk the subtree with an explicit stack so deep trees cannot overflow.
fn tree(out: &mut String, doc: &Document, top: NodeId, base: usize, options: &GenerateOptions) {
    let mut stack = vec![Step::Open(top, base)];

    while let Some(step) = stack.pop() {
        match step {
            Step::Open(id, depth) => {
                let node = &doc[id];
                indent(out, depth, options);
                if let Some(label) = &node.label {
                    out.push_str(label);
                    out.push_str(": ");
                }
                out.push_str(&node.full_name());
                out.push_str(" {\n");

                for property in &node.properties {
                    property_line(out, property, depth + 1, options);
                }

                stack.push(Step::Close(depth));
                for (i, &child) in node.children().iter().enumerate().rev() {
                    stack.push(Step::Open(child, depth + 1));
                    if i > 0 {
                        stack.push(Step::Blank);
                    }
                }
                if !node.properties.is_empty() && !node.children().is_empty() {
                    stack.push(Step::Blank);
                }
            }
            Step::Close(depth) => {
                indent(out, depth, options);
                out.push_str("};\n");
            }
            Step::Blank => {
                if options.blank_line_between_nodes {
                    out.push('\n');
                }
            }
        }
    }
}

fn property_line(out: &mut String, property: &Property, depth: usize, options: &GenerateOptions) {
    indent(out, depth, options);
    out.push_str(&property.name);

    if !property.values.is_empty() {
        let continuation = format!(",\n{}", options.indent.repeat(depth + 1));
        out.push_str(" = ");
        for (i, value) in property.values.iter().enumerate() {
            if i > 0 {
                out.push_str(&continuation);
            }
            value_text(out, value, &continuation);
        }
    }

    out.push_str(";\n");
}

fn value_text(out: &mut String, value: &Value, continuation: &str) {
    match value {
        Value::Bits { width, arrays } => {
            out.push_str(&format!("/bits/ {width} "));
            for (i, cells) in arrays.iter().enumerate() {
                if i > 0 {
                    out.push_str(continuation);
                }
                // Writing to a String cannot fail.
                let _ = write_cells(out, cells);
            }
        }
        other => out.push_str(&other.to_string()),
    }
}

fn indent(out: &mut String, depth: usize, options: &GenerateOptions) {
    for _ in 0..depth {
        out.push_str(&options.indent);
    }
}
