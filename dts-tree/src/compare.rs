//! Structural differences between two documents.

use std::fmt;

use tracing::debug;

use crate::ast::{Document, NodeId, Property, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffKind {
    NodeAdded,
    NodeRemoved,
    PropertyAdded,
    PropertyRemoved,
    PropertyModified,
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One change between the old and the new tree.
///
/// `path` is the node path; for property changes `property` names the
/// property and `old`/`new` hold its values on each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    pub kind: DiffKind,
    pub path: String,
    pub property: Option<String>,
    pub old: Option<Vec<Value>>,
    pub new: Option<Vec<Value>>,
}

impl Difference {
    fn node(kind: DiffKind, path: String) -> Self {
        Self {
            kind,
            path,
            property: None,
            old: None,
            new: None,
        }
    }

    fn property(kind: DiffKind, path: &str, name: &str, old: Option<&Property>, new: Option<&Property>) -> Self {
        Self {
            kind,
            path: path.to_string(),
            property: Some(name.to_string()),
            old: old.map(|p| p.values.clone()),
            new: new.map(|p| p.values.clone()),
        }
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let property = self.property.as_deref().unwrap_or_default();
        let old = self.old.as_deref().map(values_text).unwrap_or_default();
        let new = self.new.as_deref().map(values_text).unwrap_or_default();

        match self.kind {
            DiffKind::NodeAdded => write!(f, "+ Node added: {}", self.path),
            DiffKind::NodeRemoved => write!(f, "- Node removed: {}", self.path),
            DiffKind::PropertyAdded => write!(f, "+ Property added: {}.{property} = {new}", self.path),
            DiffKind::PropertyRemoved => write!(f, "- Property removed: {}.{property} = {old}", self.path),
            DiffKind::PropertyModified => {
                write!(f, "* Property modified: {}.{property}: {old} -> {new}", self.path)
            }
        }
    }
}

fn values_text(values: &[Value]) -> String {
    if values.is_empty() {
        return "(empty)".to_string();
    }
    values
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

enum Task {
    Both(NodeId, NodeId),
    Added(NodeId),
    Removed(NodeId),
}

/// Compare `old` against `new`, matching children by name and unit address.
///
/// Records come out in pre-order: a node's property changes, then its
/// children's. Comments, labels and source lines are ignored.
pub fn compare(old: &Document, new: &Document) -> Vec<Difference> {
    let mut out = Vec::new();
    let mut stack = vec![Task::Both(old.root(), new.root())];

    while let Some(task) = stack.pop() {
        let mut next = Vec::new();

        match task {
            Task::Both(o, n) => {
                let path = new.path(n);
                compare_properties(&path, &old[o].properties, &new[n].properties, &mut out);

                for &child in new.children(n) {
                    let node = &new[child];
                    match old.find_child(o, &node.name, node.unit_address.as_deref()) {
                        Some(matching) => next.push(Task::Both(matching, child)),
                        None => next.push(Task::Added(child)),
                    }
                }
                for &child in old.children(o) {
                    let node = &old[child];
                    if new.find_child(n, &node.name, node.unit_address.as_deref()).is_none() {
                        next.push(Task::Removed(child));
                    }
                }
            }
            Task::Added(n) => {
                let path = new.path(n);
                out.push(Difference::node(DiffKind::NodeAdded, path.clone()));
                for p in &new[n].properties {
                    out.push(Difference::property(DiffKind::PropertyAdded, &path, &p.name, None, Some(p)));
                }
                next.extend(new.children(n).iter().map(|&c| Task::Added(c)));
            }
            Task::Removed(o) => {
                let path = old.path(o);
                out.push(Difference::node(DiffKind::NodeRemoved, path.clone()));
                for p in &old[o].properties {
                    out.push(Difference::property(DiffKind::PropertyRemoved, &path, &p.name, Some(p), None));
                }
                next.extend(old.children(o).iter().map(|&c| Task::Removed(c)));
            }
        }

        stack.extend(next.into_iter().rev());
    }

    debug!(differences = out.len(), "compared documents");
    out
}

fn compare_properties(path: &str, old: &[Property], new: &[Property], out: &mut Vec<Difference>) {
    for n in new {
        match old.iter().find(|o| o.name == n.name) {
            None => out.push(Difference::property(DiffKind::PropertyAdded, path, &n.name, None, Some(n))),
            Some(o) if o.values != n.values => out.push(Difference::property(
                DiffKind::PropertyModified,
                path,
                &n.name,
                Some(o),
                Some(n),
            )),
            Some(_) => {}
        }
    }

    for o in old {
        if !new.iter().any(|n| n.name == o.name) {
            out.push(Difference::property(DiffKind::PropertyRemoved, path, &o.name, Some(o), None));
        }
    }
}

/// Human-readable summary of `differences`, grouped by kind in order of
/// first appearance.
pub fn report(differences: &[Difference]) -> String {
    const TITLE: &str = "Device Tree Comparison Report";

    let mut groups: Vec<(DiffKind, Vec<&Difference>)> = Vec::new();
    for difference in differences {
        match groups.iter_mut().find(|(kind, _)| *kind == difference.kind) {
            Some((_, members)) => members.push(difference),
            None => groups.push((difference.kind, vec![difference])),
        }
    }

    let mut out = format!(
        "{TITLE}\n{}\nTotal changes: {}\n\n",
        "=".repeat(TITLE.len()),
        differences.len()
    );
    for (kind, members) in groups {
        out.push_str(&format!("{kind} ({}):\n", members.len()));
        for difference in members {
            out.push_str(&format!("  {difference}\n"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::from_str;

    fn kinds(old: &str, new: &str) -> Vec<(DiffKind, String, Option<String>)> {
        compare(&from_str(old).unwrap(), &from_str(new).unwrap())
            .into_iter()
            .map(|d| (d.kind, d.path, d.property))
            .collect()
    }

    #[test]
    fn single_modified_property() {
        let old = from_str("/ { foo { bar = \"x\"; }; };").unwrap();
        let new = from_str("/ { foo { bar = \"y\"; }; };").unwrap();

        let differences = compare(&old, &new);
        assert_eq!(
            differences,
            [Difference {
                kind: DiffKind::PropertyModified,
                path: "/foo".into(),
                property: Some("bar".into()),
                old: Some(vec![Value::string("x")]),
                new: Some(vec![Value::string("y")]),
            }]
        );
        assert_eq!(
            differences[0].to_string(),
            r#"* Property modified: /foo.bar: "x" -> "y""#
        );
    }

    #[test]
    fn identical_documents() {
        let source = "/dts-v1/;\n/ { a: a@1 { reg = <1>; b { flag; }; }; };";
        assert!(kinds(source, source).is_empty());
        assert!(kinds(source, "/dts-v1/;\n// comment\n/ { a@1 { reg = <1>; b { flag; }; }; };").is_empty());
    }

    #[test]
    fn properties_before_children() {
        let old = r#"/ {
    model = "old";
    gone = <1>;
    soc { uart@1000 { status = "okay"; }; };
};"#;
        let new = r#"/ {
    compatible = "acme,board";
    model = "new";
    soc { uart@1000 { status = "disabled"; }; };
};"#;

        let differences = kinds(old, new);
        assert_eq!(
            differences,
            [
                (DiffKind::PropertyAdded, "/".into(), Some("compatible".into())),
                (DiffKind::PropertyModified, "/".into(), Some("model".into())),
                (DiffKind::PropertyRemoved, "/".into(), Some("gone".into())),
                (
                    DiffKind::PropertyModified,
                    "/soc/uart@1000".into(),
                    Some("status".into())
                ),
            ]
        );
    }

    #[test]
    fn whole_subtrees() {
        let old = "/ { a { x = <1>; a1 { }; }; keep { }; };";
        let new = "/ { keep { }; b@10 { y; b1 { z = \"z\"; }; }; };";

        let differences = kinds(old, new);
        assert_eq!(
            differences,
            [
                (DiffKind::NodeAdded, "/b@10".into(), None),
                (DiffKind::PropertyAdded, "/b@10".into(), Some("y".into())),
                (DiffKind::NodeAdded, "/b@10/b1".into(), None),
                (DiffKind::PropertyAdded, "/b@10/b1".into(), Some("z".into())),
                (DiffKind::NodeRemoved, "/a".into(), None),
                (DiffKind::PropertyRemoved, "/a".into(), Some("x".into())),
                (DiffKind::NodeRemoved, "/a/a1".into(), None),
            ]
        );
    }

    #[test]
    fn unit_address_is_part_of_identity() {
        assert_eq!(
            kinds("/ { uart@1000 { }; };", "/ { uart@2000 { }; };"),
            [
                (DiffKind::NodeAdded, "/uart@2000".into(), None),
                (DiffKind::NodeRemoved, "/uart@1000".into(), None),
            ]
        );
    }

    #[test]
    fn display() {
        let old = from_str("/ { a { p = <1 2>; f; }; };").unwrap();
        let new = from_str("/ { a { p = <3>, \"s\"; }; n { }; };").unwrap();

        let lines: Vec<_> = compare(&old, &new).iter().map(ToString::to_string).collect();
        assert_eq!(
            lines,
            [
                "* Property modified: /a.p: <1 2> -> <3>, \"s\"",
                "- Property removed: /a.f = (empty)",
                "+ Node added: /n",
            ]
        );
    }

    #[test]
    fn grouped_report() {
        let old = from_str("/ { a { p = <1>; }; };").unwrap();
        let new = from_str("/ { a { p = <2>; q = <3>; }; b { }; };").unwrap();

        let expected = "\
Device Tree Comparison Report
=============================
Total changes: 3

PropertyModified (1):
  * Property modified: /a.p: <1> -> <2>

PropertyAdded (1):
  + Property added: /a.q = <3>

NodeAdded (1):
  + Node added: /b

";
        assert_eq!(report(&compare(&old, &new)), expected);
        assert_eq!(
            report(&[]),
            "Device Tree Comparison Report\n=============================\nTotal changes: 0\n\n"
        );
    }
}
