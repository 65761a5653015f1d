//! Rule-based checks over a parsed [`Document`].
//!
//! Diagnostics are plain output, not errors: [`Validator::validate`] always
//! returns, listing whatever the rules found.

use std::fmt;

use tracing::debug;

use crate::ast::{Document, NodeId};
use crate::labels::LabelTable;

pub mod rules;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

/// One finding reported by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub path: String,
    pub property: Option<String>,
    pub line: u32,
    pub rule: &'static str,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.path)?;
        if let Some(property) = &self.property {
            write!(f, " ({property})")?;
        }
        if self.line > 0 {
            write!(f, " line {}", self.line)?;
        }
        write!(f, ": {} [{}]", self.message, self.rule)
    }
}

/// What a rule sees while checking one node.
pub struct Context<'a> {
    pub document: &'a Document,
    pub labels: &'a LabelTable,
    pub node: NodeId,
}

impl Context<'_> {
    pub fn path(&self) -> String {
        self.document.path(self.node)
    }

    /// A diagnostic about the current node.
    pub fn node_diagnostic(&self, rule: &'static str, severity: Severity, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            severity,
            message: message.into(),
            path: self.path(),
            property: None,
            line: self.document[self.node].line,
            rule,
        }
    }

    /// A diagnostic about one property of the current node.
    pub fn property_diagnostic(
        &self,
        rule: &'static str,
        severity: Severity,
        property: &str,
        message: impl Into<String>,
    ) -> Diagnostic {
        let node = &self.document[self.node];
        Diagnostic {
            severity,
            message: message.into(),
            path: self.path(),
            property: Some(property.to_string()),
            line: node.property(property).map_or(node.line, |p| p.line),
            rule,
        }
    }
}

/// A named check applied to every node.
pub trait Rule {
    fn name(&self) -> &'static str;

    fn check(&self, cx: &Context<'_>, out: &mut Vec<Diagnostic>);
}

/// An ordered set of rules.
#[derive(Default)]
pub struct Validator {
    rules: Vec<Box<dyn Rule>>,
}

impl Validator {
    /// A validator with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// A validator with every built-in rule.
    pub fn standard() -> Self {
        let mut validator = Self::new();
        validator.add_rule(rules::NodeName);
        validator.add_rule(rules::RequiredProperties);
        validator.add_rule(rules::PropertyType);
        validator.add_rule(rules::References);
        validator.add_rule(rules::AddressCells);
        validator.add_rule(rules::Compatible);
        validator.add_rule(rules::RegFormat);
        validator
    }

    /// Add a rule, replacing any rule with the same name.
    pub fn add_rule(&mut self, rule: impl Rule + 'static) {
        self.remove_rule(rule.name());
        self.rules.push(Box::new(rule));
    }

    pub fn remove_rule(&mut self, name: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|rule| rule.name() != name);
        self.rules.len() != before
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Run every rule over every node, in document order.
    pub fn validate(&self, doc: &Document) -> Vec<Diagnostic> {
        let (labels, duplicates) = LabelTable::collect(doc);
        let mut out = Vec::new();

        for (label, id) in duplicates {
            out.push(Diagnostic {
                severity: Severity::Error,
                message: format!("label '{label}' is defined more than once"),
                path: doc.path(id),
                property: None,
                line: doc[id].line,
                rule: "labels",
            });
        }

        for node in doc.iter() {
            let cx = Context {
                document: doc,
                labels: &labels,
                node,
            };
            for rule in &self.rules {
                rule.check(&cx, &mut out);
            }
        }

        debug!(
            rules = self.rules.len(),
            diagnostics = out.len(),
            "validated document"
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::from_str;

    struct NoChosen;

    impl Rule for NoChosen {
        fn name(&self) -> &'static str {
            "no-chosen"
        }

        fn check(&self, cx: &Context<'_>, out: &mut Vec<Diagnostic>) {
            if cx.document[cx.node].name == "chosen" {
                out.push(cx.node_diagnostic(self.name(), Severity::Info, "found /chosen"));
            }
        }
    }

    #[test]
    fn custom_rules() {
        let doc = from_str("/dts-v1/;\n/ {\n    chosen { };\n};\n").unwrap();
        let mut validator = Validator::new();
        assert!(validator.validate(&doc).is_empty());

        validator.add_rule(NoChosen);
        validator.add_rule(NoChosen);
        assert_eq!(validator.rule_names(), ["no-chosen"]);

        let diagnostics = validator.validate(&doc);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].path, "/chosen");
        assert_eq!(diagnostics[0].line, 3);
        assert_eq!(
            diagnostics[0].to_string(),
            "info: /chosen line 3: found /chosen [no-chosen]"
        );

        assert!(validator.remove_rule("no-chosen"));
        assert!(!validator.remove_rule("no-chosen"));
    }

    #[test]
    fn standard_rule_set() {
        assert_eq!(
            Validator::standard().rule_names(),
            [
                "node-name",
                "required-properties",
                "property-type",
                "references",
                "address-cells",
                "compatible",
                "reg-format",
            ]
        );
    }

    #[test]
    fn duplicate_labels_are_reported() {
        let mut doc = from_str("/ { a: x { }; y { }; };").unwrap();
        let y = doc.find_by_path("/y").unwrap();
        doc[y].label = Some("a".into());

        let diagnostics = Validator::new().validate(&doc);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].rule, "labels");
        assert_eq!(diagnostics[0].path, "/y");
    }
}
