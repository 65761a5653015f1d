//! Label bookkeeping and reference resolution.

use std::collections::HashMap;

use crate::ast::{Document, NodeId, Reference};
use crate::error::EditError;

/// Map from label name to the node carrying it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: HashMap<String, NodeId>,
}

/// A reference that does not point at any node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedReference {
    pub node: NodeId,
    pub property: String,
    pub reference: Reference,
    pub line: u32,
}

impl LabelTable {
    /// Collect every label in the document. Fails on the first duplicate.
    pub fn build(doc: &Document) -> Result<Self, EditError> {
        let (table, duplicates) = Self::collect(doc);
        match duplicates.into_iter().next() {
            Some((label, _)) => Err(EditError::DuplicateLabel(label)),
            None => Ok(table),
        }
    }

    /// Collect every label, keeping the first owner of a duplicated label and
    /// returning the later ones separately.
    pub fn collect(doc: &Document) -> (Self, Vec<(String, NodeId)>) {
        let mut table = Self::default();
        let mut duplicates = Vec::new();

        for id in doc.iter() {
            if let Some(label) = &doc[id].label {
                if table.labels.contains_key(label) {
                    duplicates.push((label.clone(), id));
                } else {
                    table.labels.insert(label.clone(), id);
                }
            }
        }

        (table, duplicates)
    }

    pub fn get(&self, label: &str) -> Option<NodeId> {
        self.labels.get(label).copied()
    }

    pub fn insert(&mut self, label: impl Into<String>, id: NodeId) -> Result<(), EditError> {
        let label = label.into();
        match self.labels.get(&label) {
            Some(&owner) if owner != id => Err(EditError::DuplicateLabel(label)),
            _ => {
                self.labels.insert(label, id);
                Ok(())
            }
        }
    }

    pub fn remove(&mut self, label: &str) -> Option<NodeId> {
        self.labels.remove(label)
    }

    /// Drop entries whose node is no longer in the document.
    pub fn prune(&mut self, doc: &Document) {
        self.labels.retain(|_, id| doc.contains(*id));
    }

    /// Find the node a reference points at.
    pub fn resolve(&self, doc: &Document, reference: &Reference) -> Option<NodeId> {
        match reference.path() {
            Some(path) => doc.find_by_path(path),
            None => self.get(&reference.0).filter(|&id| doc.contains(id)),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.labels.iter().map(|(label, &id)| (label.as_str(), id))
    }
}

/// Every reference in the document that names a missing label or path.
pub fn unresolved_references(doc: &Document, labels: &LabelTable) -> Vec<UnresolvedReference> {
    let mut unresolved = Vec::new();

    for id in doc.iter() {
        for property in &doc[id].properties {
            for reference in property.references() {
                if labels.resolve(doc, reference).is_none() {
                    unresolved.push(UnresolvedReference {
                        node: id,
                        property: property.name.clone(),
                        reference: reference.clone(),
                        line: property.line,
                    });
                }
            }
        }
    }

    unresolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::from_str;

    const SOURCE: &str = r#"/dts-v1/;
/ {
    intc: interrupt-controller@1000 { };
    serial@2000 {
        interrupt-parent = <&intc>;
        clocks = <&clk 1>;
        other = &{/serial@2000}, &{/nowhere};
    };
};
"#;

    #[test]
    fn resolves_labels_and_paths() {
        let doc = from_str(SOURCE).unwrap();
        let labels = LabelTable::build(&doc).unwrap();
        let intc = doc.find_by_path("/interrupt-controller@1000").unwrap();
        let serial = doc.find_by_path("/serial@2000").unwrap();

        for (reference, expected) in [
            ("intc", Some(intc)),
            ("/serial@2000", Some(serial)),
            ("clk", None),
            ("/nowhere", None),
        ] {
            assert_eq!(labels.resolve(&doc, &Reference::new(reference)), expected);
        }
    }

    #[test]
    fn reports_dangling_references() {
        let doc = from_str(SOURCE).unwrap();
        let labels = LabelTable::build(&doc).unwrap();

        let missing: Vec<_> = unresolved_references(&doc, &labels)
            .into_iter()
            .map(|u| (u.property, u.reference.0, u.line))
            .collect();
        assert_eq!(
            missing,
            [
                ("clocks".to_string(), "clk".to_string(), 6),
                ("other".to_string(), "/nowhere".to_string(), 7),
            ]
        );
    }

    #[test]
    fn prune_forgets_removed_nodes() {
        let mut doc = from_str(SOURCE).unwrap();
        let mut labels = LabelTable::build(&doc).unwrap();
        let intc = labels.get("intc").unwrap();

        doc.remove(intc);
        labels.prune(&doc);
        assert!(labels.is_empty());
    }

    #[test]
    fn duplicates() {
        let mut doc = from_str(SOURCE).unwrap();
        let serial = doc.find_by_path("/serial@2000").unwrap();
        doc[serial].label = Some("intc".into());

        assert_eq!(
            LabelTable::build(&doc),
            Err(EditError::DuplicateLabel("intc".into()))
        );
        let (table, duplicates) = LabelTable::collect(&doc);
        assert_eq!(table.len(), 1);
        assert_eq!(duplicates, [("intc".to_string(), serial)]);

        let mut table = table;
        assert!(table.insert("intc", serial).is_err());
        assert!(table.insert("uart", serial).is_ok());
    }
}
