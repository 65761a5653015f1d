//! In-memory model of a Device Tree Source document.
//!
//! Nodes live in an arena owned by the [`Document`] and are addressed by
//! [`NodeId`]. Every node knows its parent, which makes path lookups and
//! upward walks cheap without shared ownership.

use std::ops::{Index, IndexMut};

mod value;

pub use value::{escape_string, Cell, Number, Radix, Reference, Value};
pub(crate) use value::write_cells;

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeStyle {
    /// `#include "file"`
    Quoted,
    /// `#include <file>`
    Angled,
    /// `/include/ "file"`
    Directive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub path: String,
    pub style: IncludeStyle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemReserve {
    pub address: Number,
    pub size: Number,
}

/// A `#define NAME value` line. The value is kept as raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Define {
    pub name: String,
    pub value: String,
}

/// A named entry inside a node. A property without values is a boolean flag.
#[derive(Debug, Clone)]
pub struct Property {
    pub name: String,
    pub values: Vec<Value>,
    /// Source line, or 0 when built programmatically.
    pub line: u32,
}

impl Property {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
            line: 0,
        }
    }

    pub fn flag(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    pub fn is_flag(&self) -> bool {
        self.values.is_empty()
    }

    /// The first string of a string-valued property.
    pub fn as_str(&self) -> Option<&str> {
        match self.values.first()? {
            Value::String(s) => Some(s),
            Value::StringList(list) => list.first().map(String::as_str),
            _ => None,
        }
    }

    /// All strings of the property, in order.
    pub fn strings(&self) -> Vec<&str> {
        self.values.iter().flat_map(Value::strings).collect()
    }

    /// All cells of every `< ... >` array in the property, in order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.values.iter().flat_map(value_cells)
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.values.iter().flat_map(Value::references)
    }
}

fn value_cells(value: &Value) -> Vec<&Cell> {
    match value {
        Value::CellArray(cells) => cells.iter().collect(),
        Value::Bits { arrays, .. } => arrays.iter().flatten().collect(),
        _ => Vec::new(),
    }
}

impl PartialEq for Property {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.values == other.values
    }
}

impl Eq for Property {}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub label: Option<String>,
    pub unit_address: Option<String>,
    pub properties: Vec<Property>,
    /// Source line, or 0 when built programmatically.
    pub line: u32,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            unit_address: None,
            properties: Vec::new(),
            line: 0,
            children: Vec::new(),
            parent: None,
        }
    }

    /// Build a node from `name@address` notation.
    pub fn with_full_name(full_name: &str) -> Self {
        let (name, unit_address) = split_unit_address(full_name);
        let mut node = Self::new(name);
        node.unit_address = unit_address.map(str::to_string);
        node
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_unit_address(mut self, address: impl Into<String>) -> Self {
        self.unit_address = Some(address.into());
        self
    }

    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// `name@address`, or just `name`.
    pub fn full_name(&self) -> String {
        match &self.unit_address {
            Some(addr) => format!("{}@{}", self.name, addr),
            None => self.name.clone(),
        }
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.iter_mut().find(|p| p.name == name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    fn same_shape(&self, other: &Node) -> bool {
        self.name == other.name
            && self.label == other.label
            && self.unit_address == other.unit_address
            && self.properties == other.properties
            && self.children.len() == other.children.len()
    }
}

/// Split `name@address` at the first `@`.
pub fn split_unit_address(full_name: &str) -> (&str, Option<&str>) {
    match full_name.split_once('@') {
        Some((name, addr)) => (name, Some(addr)),
        None => (full_name, None),
    }
}

/// A parsed source file: header directives plus the node tree.
#[derive(Debug, Clone)]
pub struct Document {
    /// Comment block preceding the first directive, verbatim.
    pub comments: Vec<String>,
    /// `dts-v1` when the file carries `/dts-v1/;`.
    pub version: Option<String>,
    pub plugin: bool,
    pub memreserves: Vec<MemReserve>,
    pub includes: Vec<Include>,
    pub defines: Vec<Define>,
    /// Slots of removed nodes stay empty until [`Document::compact`], so a
    /// stale `NodeId` never aliases a newer node.
    nodes: Vec<Option<Node>>,
    root: NodeId,
    live: usize,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document holding only the root node `/`.
    pub fn new() -> Self {
        Self {
            comments: Vec::new(),
            version: None,
            plugin: false,
            memreserves: Vec::new(),
            includes: Vec::new(),
            defines: Vec::new(),
            nodes: vec![Some(Node::new("/"))],
            root: NodeId(0),
            live: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(Node::children).unwrap_or(&[])
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(Node::parent)
    }

    /// Value text of a `#define`, if present.
    pub fn define(&self, name: &str) -> Option<&str> {
        self.defines
            .iter()
            .rev()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }

    /// Attach `node` as the last child of `parent`.
    ///
    /// Any child ids already stored in `node` are discarded.
    pub fn append_child(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.parent = Some(parent);
        node.children.clear();
        self.nodes.push(Some(node));
        self.live += 1;
        self[parent].children.push(id);
        id
    }

    /// The child of `parent` identified by name and unit address.
    pub fn find_child(&self, parent: NodeId, name: &str, unit_address: Option<&str>) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|&child| {
            let node = &self[child];
            node.name == name && node.unit_address.as_deref() == unit_address
        })
    }

    /// Absolute path of a node, e.g. `/soc/uart@101f1000`.
    pub fn path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == self.root {
                break;
            }
            let Some(node) = self.get(node_id) else { break };
            parts.push(node.full_name());
            current = node.parent;
        }

        if parts.is_empty() {
            return "/".to_string();
        }

        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Look a node up by absolute path. Empty components are ignored.
    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        if !path.starts_with('/') {
            return None;
        }

        path.split('/')
            .filter(|part| !part.is_empty())
            .try_fold(self.root, |current, part| {
                let (name, addr) = split_unit_address(part);
                self.find_child(current, name, addr)
            })
    }

    /// The node carrying `label`.
    pub fn find_by_label(&self, label: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .find(|&id| self[id].label.as_deref() == Some(label))
    }

    /// Pre-order walk of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let stack = if self.contains(id) { vec![id] } else { Vec::new() };
        Descendants { doc: self, stack }
    }

    /// Pre-order walk of the whole tree.
    pub fn iter(&self) -> Descendants<'_> {
        self.descendants(self.root)
    }

    pub fn find_nodes_by_name(&self, name: &str) -> Vec<NodeId> {
        self.iter().filter(|&id| self[id].name == name).collect()
    }

    pub fn nodes_with_property(&self, property: &str) -> Vec<NodeId> {
        self.iter()
            .filter(|&id| self[id].has_property(property))
            .collect()
    }

    /// Nodes listing `compatible` among their `compatible` strings.
    pub fn nodes_with_compatible(&self, compatible: &str) -> Vec<NodeId> {
        self.iter()
            .filter(|&id| {
                self[id]
                    .property("compatible")
                    .map_or(false, |p| p.strings().contains(&compatible))
            })
            .collect()
    }

    /// Nodes whose `property` holds exactly `values`.
    pub fn nodes_with_property_value(&self, property: &str, values: &[Value]) -> Vec<NodeId> {
        self.iter()
            .filter(|&id| self[id].property(property).map_or(false, |p| p.values == values))
            .collect()
    }

    /// Nodes strictly below the node at `path` that satisfy `predicate`, in
    /// document order. Empty when `path` does not resolve.
    pub fn nodes_under(&self, path: &str, mut predicate: impl FnMut(&Node) -> bool) -> Vec<NodeId> {
        let Some(top) = self.find_by_path(path) else {
            return Vec::new();
        };
        self.descendants(top)
            .skip(1)
            .filter(|&id| predicate(&self[id]))
            .collect()
    }

    /// Detach a subtree and free its slots. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.contains(id) {
            return false;
        }

        self.detach(id);
        let doomed: Vec<NodeId> = self.descendants(id).collect();
        self.live -= doomed.len();
        for node_id in doomed {
            self.nodes[node_id.0] = None;
        }
        true
    }

    /// Drop the slots left by removed nodes and renumber the rest in
    /// document order. Every `NodeId` obtained before the call is invalid
    /// afterwards.
    pub fn compact(&mut self) {
        let order: Vec<NodeId> = self.iter().collect();
        let mut remap = vec![None; self.nodes.len()];
        for (new, old) in order.iter().enumerate() {
            remap[old.0] = Some(NodeId(new));
        }

        let mut nodes = Vec::with_capacity(order.len());
        for old in order {
            if let Some(mut node) = self.nodes[old.0].take() {
                node.parent = node.parent.and_then(|p| remap[p.0]);
                node.children = node.children.iter().filter_map(|c| remap[c.0]).collect();
                nodes.push(Some(node));
            }
        }

        self.live = nodes.len();
        self.nodes = nodes;
        self.root = NodeId(0);
    }

    /// Move a subtree under a new parent, appending it after the existing children.
    ///
    /// Returns `false` if either node is missing or `new_parent` lies inside the subtree.
    pub fn reparent(&mut self, id: NodeId, new_parent: NodeId) -> bool {
        if id == self.root || !self.contains(id) || !self.contains(new_parent) {
            return false;
        }
        if self.is_ancestor_or_self(id, new_parent) {
            return false;
        }

        self.detach(id);
        self[id].parent = Some(new_parent);
        self[new_parent].children.push(id);
        true
    }

    /// Copy a subtree under `new_parent`. Labels are dropped from the copy.
    ///
    /// Returns `None` if either node is missing or `new_parent` lies inside the subtree.
    pub fn copy_subtree(&mut self, id: NodeId, new_parent: NodeId) -> Option<NodeId> {
        if !self.contains(id) || !self.contains(new_parent) || self.is_ancestor_or_self(id, new_parent) {
            return None;
        }

        let mut top = None;
        let mut pending = vec![(id, new_parent)];
        while let Some((source, parent)) = pending.pop() {
            let mut copy = self[source].clone();
            copy.label = None;
            let source_children = std::mem::take(&mut copy.children);
            let copied = self.append_child(parent, copy);
            top.get_or_insert(copied);
            for &child in source_children.iter().rev() {
                pending.push((child, copied));
            }
        }
        top
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == ancestor {
                return true;
            }
            current = self.parent(node_id);
        }
        false
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            self[parent].children.retain(|&child| child != id);
        }
        self[id].parent = None;
    }
}

impl Index<NodeId> for Document {
    type Output = Node;

    /// Panics if the node was removed.
    fn index(&self, id: NodeId) -> &Node {
        self.get(id).expect("node was removed from the document")
    }
}

impl IndexMut<NodeId> for Document {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        self.get_mut(id).expect("node was removed from the document")
    }
}

impl PartialEq for Document {
    /// Structural equality: header directives plus the tree shape, ignoring
    /// source lines and arena layout.
    fn eq(&self, other: &Self) -> bool {
        if self.comments != other.comments
            || self.version != other.version
            || self.plugin != other.plugin
            || self.memreserves != other.memreserves
            || self.includes != other.includes
            || self.defines != other.defines
        {
            return false;
        }

        let mut pending = vec![(self.root, other.root)];
        while let Some((a, b)) = pending.pop() {
            let (a, b) = (&self[a], &other[b]);
            if !a.same_shape(b) {
                return false;
            }
            pending.extend(a.children.iter().copied().zip(b.children.iter().copied()));
        }
        true
    }
}

impl Eq for Document {}

/// Iterator returned by [`Document::descendants`].
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack.extend(self.doc.children(id).iter().rev());
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Document, NodeId, NodeId, NodeId) {
        let mut doc = Document::new();
        let root = doc.root();
        let cpus = doc.append_child(root, Node::new("cpus"));
        let cpu0 = doc.append_child(cpus, Node::with_full_name("cpu@0").with_label("cpu0"));
        let uart = doc.append_child(
            root,
            Node::with_full_name("serial@101f1000")
                .with_property(Property::new("status", vec![Value::string("okay")])),
        );
        (doc, cpus, cpu0, uart)
    }

    #[test]
    fn paths_and_lookups() {
        let (doc, cpus, cpu0, uart) = sample();

        assert_eq!(doc.path(doc.root()), "/");
        assert_eq!(doc.path(cpu0), "/cpus/cpu@0");

        for (path, expected) in [
            ("/", Some(doc.root())),
            ("/cpus", Some(cpus)),
            ("/cpus/cpu@0", Some(cpu0)),
            ("//cpus//cpu@0/", Some(cpu0)),
            ("/serial@101f1000", Some(uart)),
            ("/serial", None),
            ("/cpus/cpu@1", None),
            ("cpus", None),
        ] {
            assert_eq!(doc.find_by_path(path), expected, "{path}");
        }

        assert_eq!(doc.find_by_label("cpu0"), Some(cpu0));
        assert_eq!(doc.find_nodes_by_name("cpu"), vec![cpu0]);
        assert_eq!(doc.nodes_with_property("status"), vec![uart]);
        assert_eq!(doc.parent(cpu0), Some(cpus));
    }

    #[test]
    fn queries() {
        let doc = crate::from_str(
            r#"/ {
    soc {
        serial@1000 { compatible = "acme,uart", "ns16550a"; status = "okay"; };
        serial@2000 { compatible = "acme,uart"; status = "disabled"; };
        i2c@3000 { compatible = "acme,i2c"; status = "okay"; };
    };
    serial@9000 { compatible = "ns16550a"; };
};"#,
        )
        .unwrap();
        let paths = |ids: Vec<NodeId>| -> Vec<String> { ids.into_iter().map(|id| doc.path(id)).collect() };

        for (compatible, expected) in [
            ("acme,uart", vec!["/soc/serial@1000", "/soc/serial@2000"]),
            ("ns16550a", vec!["/soc/serial@1000", "/serial@9000"]),
            ("acme", vec![]),
        ] {
            assert_eq!(paths(doc.nodes_with_compatible(dbg!(compatible))), expected);
        }

        for (property, value, expected) in [
            ("status", "okay", vec!["/soc/serial@1000", "/soc/i2c@3000"]),
            ("status", "gone", vec![]),
            ("compatible", "acme,uart", vec!["/soc/serial@2000"]),
            ("model", "okay", vec![]),
        ] {
            let values = [Value::string(value)];
            assert_eq!(paths(doc.nodes_with_property_value(dbg!(property), &values)), expected);
        }

        let serial = |node: &Node| node.name == "serial";
        for (path, expected) in [
            ("/soc", vec!["/soc/serial@1000", "/soc/serial@2000"]),
            ("/", vec!["/soc/serial@1000", "/soc/serial@2000", "/serial@9000"]),
            ("/soc/serial@1000", vec![]),
            ("/missing", vec![]),
        ] {
            assert_eq!(paths(doc.nodes_under(dbg!(path), serial)), expected);
        }
    }

    #[test]
    fn descendants_are_pre_order() {
        let (doc, cpus, cpu0, uart) = sample();
        let order: Vec<_> = doc.iter().collect();
        assert_eq!(order, vec![doc.root(), cpus, cpu0, uart]);
    }

    #[test]
    fn remove_frees_the_subtree() {
        let (mut doc, cpus, cpu0, _) = sample();

        assert!(doc.remove(cpus));
        assert!(!doc.contains(cpu0));
        assert_eq!(doc.len(), 2);
        assert!(!doc.remove(doc.root()));
        assert!(!doc.remove(cpus));
    }

    #[test]
    fn compact_reclaims_removed_slots() {
        let (mut doc, cpus, _, uart) = sample();
        for i in 0..10 {
            let extra = doc.append_child(uart, Node::with_full_name(&format!("port@{i}")));
            assert!(doc.remove(extra));
        }
        assert!(doc.remove(cpus));
        let before = doc.clone();
        assert_eq!(doc.nodes.len(), 14);

        doc.compact();

        assert_eq!(doc, before);
        assert_eq!((doc.len(), doc.nodes.len()), (2, 2));
        let uart = doc.find_by_path("/serial@101f1000").unwrap();
        assert_eq!(doc.parent(uart), Some(doc.root()));
        assert_eq!(doc.children(doc.root()).to_vec(), vec![uart]);
    }

    #[test]
    fn reparent_rejects_cycles() {
        let (mut doc, cpus, cpu0, uart) = sample();

        assert!(!doc.reparent(cpus, cpu0));
        assert!(doc.reparent(cpu0, uart));
        assert_eq!(doc.path(cpu0), "/serial@101f1000/cpu@0");
        assert!(doc.children(cpus).is_empty());
    }

    #[test]
    fn copies_drop_labels() {
        let (mut doc, cpus, _, uart) = sample();

        let copy = doc.copy_subtree(cpus, uart).unwrap();
        let cpu_copy = doc.children(copy)[0];
        assert_eq!(doc.path(cpu_copy), "/serial@101f1000/cpus/cpu@0");
        assert_eq!(doc[cpu_copy].label, None);
        assert_eq!(doc.find_nodes_by_name("cpu").len(), 2);
    }

    #[test]
    fn equality_ignores_lines() {
        let (a, _, _, _) = sample();
        let (mut b, _, cpu0, _) = sample();
        b[cpu0].line = 42;
        assert_eq!(a, b);

        b[cpu0].label = None;
        assert_ne!(a, b);
    }
}
