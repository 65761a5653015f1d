//! Built-in validation rules.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Context, Diagnostic, Rule, Severity};
use crate::ast::{Document, NodeId, Value};
use crate::expr;

static NODE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9,._+-]*$").unwrap());

static COMPATIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*,[a-zA-Z0-9][a-zA-Z0-9_.-]*$").unwrap());

/// Node names start with a letter or digit and use only `[a-zA-Z0-9,._+-]`.
pub struct NodeName;

impl Rule for NodeName {
    fn name(&self) -> &'static str {
        "node-name"
    }

    fn check(&self, cx: &Context<'_>, out: &mut Vec<Diagnostic>) {
        if cx.node == cx.document.root() {
            return;
        }

        let name = &cx.document[cx.node].name;
        if !NODE_NAME.is_match(name) {
            out.push(cx.node_diagnostic(
                self.name(),
                Severity::Error,
                format!(
                    "invalid node name '{name}': names start with a letter or digit and \
                     contain only letters, digits, ',', '.', '_', '+' or '-'"
                ),
            ));
        }
    }
}

/// `cpu` and `memory` nodes need `device_type` and `reg`; an
/// `interrupt-controller` node needs the `interrupt-controller` flag.
pub struct RequiredProperties;

impl RequiredProperties {
    fn required(node_name: &str) -> &'static [&'static str] {
        match node_name {
            "cpu" | "memory" => &["device_type", "reg"],
            "interrupt-controller" => &["interrupt-controller"],
            _ => &[],
        }
    }
}

impl Rule for RequiredProperties {
    fn name(&self) -> &'static str {
        "required-properties"
    }

    fn check(&self, cx: &Context<'_>, out: &mut Vec<Diagnostic>) {
        let node = &cx.document[cx.node];
        for &property in Self::required(&node.name) {
            if !node.has_property(property) {
                out.push(cx.node_diagnostic(
                    self.name(),
                    Severity::Error,
                    format!("missing required property '{property}' for {} node", node.name),
                ));
            }
        }
    }
}

/// Well-known properties carry the value types their bindings expect.
pub struct PropertyType;

impl Rule for PropertyType {
    fn name(&self) -> &'static str {
        "property-type"
    }

    fn check(&self, cx: &Context<'_>, out: &mut Vec<Diagnostic>) {
        for property in &cx.document[cx.node].properties {
            let cells_only = property
                .values
                .iter()
                .all(|v| matches!(v, Value::CellArray(_)));
            let strings_only = property.values.iter().all(Value::is_string);

            let problem = match property.name.as_str() {
                "reg" if property.is_flag() || !cells_only => Some("must be a cell array"),
                "ranges" if !cells_only => Some("must be empty or a cell array"),
                "compatible" | "model" | "status" | "device_type" if property.is_flag() || !strings_only => {
                    Some("must be a string")
                }
                "#address-cells" | "#size-cells" | "#interrupt-cells"
                    if property.cells().count() != 1 || !cells_only =>
                {
                    Some("must be a single cell")
                }
                _ => None,
            };

            if let Some(problem) = problem {
                out.push(cx.property_diagnostic(
                    self.name(),
                    Severity::Warning,
                    &property.name,
                    format!("'{}' {problem}", property.name),
                ));
            }
        }
    }
}

/// Every `&label` and `&{/path}` points at an existing node.
pub struct References;

impl Rule for References {
    fn name(&self) -> &'static str {
        "references"
    }

    fn check(&self, cx: &Context<'_>, out: &mut Vec<Diagnostic>) {
        for property in &cx.document[cx.node].properties {
            for reference in property.references() {
                if cx.labels.resolve(cx.document, reference).is_some() {
                    continue;
                }
                let message = match reference.label() {
                    Some(label) => format!("reference to undefined label '{label}'"),
                    None => format!("reference to missing node '{}'", reference.0),
                };
                out.push(cx.property_diagnostic(self.name(), Severity::Error, &property.name, message));
            }
        }
    }
}

/// A node whose children carry unit addresses declares how to read them.
pub struct AddressCells;

impl Rule for AddressCells {
    fn name(&self) -> &'static str {
        "address-cells"
    }

    fn check(&self, cx: &Context<'_>, out: &mut Vec<Diagnostic>) {
        let doc = cx.document;
        let addressed = doc
            .children(cx.node)
            .iter()
            .any(|&child| doc[child].unit_address.is_some());
        if !addressed {
            return;
        }

        for property in ["#address-cells", "#size-cells"] {
            if !doc[cx.node].has_property(property) {
                out.push(cx.node_diagnostic(
                    self.name(),
                    Severity::Warning,
                    format!("node with addressed children should have a {property} property"),
                ));
            }
        }
    }
}

/// Compatible strings follow `manufacturer,model`.
pub struct Compatible;

impl Rule for Compatible {
    fn name(&self) -> &'static str {
        "compatible"
    }

    fn check(&self, cx: &Context<'_>, out: &mut Vec<Diagnostic>) {
        let Some(property) = cx.document[cx.node].property("compatible") else {
            return;
        };

        for s in property.strings() {
            if !COMPATIBLE.is_match(s) {
                out.push(cx.property_diagnostic(
                    self.name(),
                    Severity::Warning,
                    "compatible",
                    format!("compatible string '{s}' should follow the 'manufacturer,model' format"),
                ));
            }
        }
    }
}

/// `reg` holds whole (address, size) tuples as sized by the parent.
pub struct RegFormat;

impl RegFormat {
    /// Value of a `#...-cells` property of `node`, or `default` when absent.
    /// `None` when the property is present but cannot be evaluated.
    fn cells(doc: &Document, node: NodeId, property: &str, default: u64) -> Option<u64> {
        match doc[node].property(property) {
            None => Some(default),
            Some(p) => {
                let cell = p.cells().next()?;
                expr::cell_value(cell, doc).ok().flatten()
            }
        }
    }
}

impl Rule for RegFormat {
    fn name(&self) -> &'static str {
        "reg-format"
    }

    fn check(&self, cx: &Context<'_>, out: &mut Vec<Diagnostic>) {
        let doc = cx.document;
        let Some(parent) = doc.parent(cx.node) else {
            return;
        };
        let Some(reg) = doc[cx.node].property("reg") else {
            return;
        };
        if reg.is_flag() || !reg.values.iter().all(|v| matches!(v, Value::CellArray(_))) {
            return;
        }

        let (Some(address_cells), Some(size_cells)) = (
            Self::cells(doc, parent, "#address-cells", 2),
            Self::cells(doc, parent, "#size-cells", 1),
        ) else {
            return;
        };
        let stride = address_cells + size_cells;
        if stride == 0 {
            return;
        }

        let count = reg.cells().count() as u64;
        if count == 0 || count % stride != 0 {
            out.push(cx.property_diagnostic(
                self.name(),
                Severity::Warning,
                "reg",
                format!(
                    "'reg' has {count} cells, expected a multiple of {stride} \
                     (#address-cells = {address_cells}, #size-cells = {size_cells})"
                ),
            ));
        }
    }
}
