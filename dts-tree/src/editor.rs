//! Path-addressed mutations of a [`Document`].

use tracing::debug;

use crate::ast::{Document, Node, NodeId, Property, Value};
use crate::error::EditError;

/// Edits a document in place, addressing nodes by absolute path.
///
/// Every operation either succeeds completely or leaves the document as it was.
pub struct Editor<'a> {
    doc: &'a mut Document,
}

impl<'a> Editor<'a> {
    pub fn new(doc: &'a mut Document) -> Self {
        Self { doc }
    }

    pub fn document(&self) -> &Document {
        self.doc
    }

    fn resolve(&self, path: &str) -> Result<NodeId, EditError> {
        self.doc
            .find_by_path(path)
            .ok_or_else(|| EditError::NotFound(path.to_string()))
    }

    /// Add `node` as the last child of the node at `parent_path`.
    pub fn add_node(&mut self, parent_path: &str, node: Node) -> Result<NodeId, EditError> {
        let parent = self.resolve(parent_path)?;

        if self
            .doc
            .find_child(parent, &node.name, node.unit_address.as_deref())
            .is_some()
        {
            let path = join_path(&self.doc.path(parent), &node.full_name());
            return Err(EditError::DuplicateNode(path));
        }
        if let Some(label) = &node.label {
            if self.doc.find_by_label(label).is_some() {
                return Err(EditError::DuplicateLabel(label.clone()));
            }
        }

        let id = self.doc.append_child(parent, node);
        debug!(path = %self.doc.path(id), "added node");
        Ok(id)
    }

    /// Remove the node at `path` with its whole subtree, labels included.
    pub fn remove_node(&mut self, path: &str) -> Result<(), EditError> {
        let id = self.resolve(path)?;
        if id == self.doc.root() {
            return Err(EditError::RootNode);
        }

        self.doc.remove(id);
        debug!(path, "removed node");
        Ok(())
    }

    pub fn add_property(&mut self, path: &str, property: Property) -> Result<(), EditError> {
        let id = self.resolve(path)?;
        if self.doc[id].has_property(&property.name) {
            return Err(EditError::DuplicateProperty {
                path: path.to_string(),
                property: property.name,
            });
        }

        self.doc[id].properties.push(property);
        Ok(())
    }

    /// Replace the values of an existing property, returning the old ones.
    pub fn update_property(&mut self, path: &str, name: &str, values: Vec<Value>) -> Result<Vec<Value>, EditError> {
        let id = self.resolve(path)?;
        let property = self.doc[id]
            .property_mut(name)
            .ok_or_else(|| EditError::PropertyNotFound {
                path: path.to_string(),
                property: name.to_string(),
            })?;

        Ok(std::mem::replace(&mut property.values, values))
    }

    /// Update the property if present, otherwise append it.
    pub fn set_property(&mut self, path: &str, name: &str, values: Vec<Value>) -> Result<(), EditError> {
        let id = self.resolve(path)?;
        match self.doc[id].property_mut(name) {
            Some(property) => property.values = values,
            None => self.doc[id].properties.push(Property::new(name, values)),
        }
        Ok(())
    }

    pub fn remove_property(&mut self, path: &str, name: &str) -> Result<Property, EditError> {
        let id = self.resolve(path)?;
        let node = &mut self.doc[id];
        let index = node
            .properties
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| EditError::PropertyNotFound {
                path: path.to_string(),
                property: name.to_string(),
            })?;

        Ok(node.properties.remove(index))
    }

    /// Move the node at `source` under `target_parent`, keeping its label.
    pub fn move_node(&mut self, source: &str, target_parent: &str) -> Result<NodeId, EditError> {
        let id = self.resolve(source)?;
        let target = self.resolve(target_parent)?;

        if id == self.doc.root() {
            return Err(EditError::RootNode);
        }
        if self.doc.is_ancestor_or_self(id, target) {
            return Err(EditError::InvalidMove {
                source_path: source.to_string(),
                target_path: target_parent.to_string(),
            });
        }
        self.check_free_slot(target, id)?;

        self.doc.reparent(id, target);
        debug!(from = source, to = %self.doc.path(id), "moved node");
        Ok(id)
    }

    /// Deep-copy the node at `source` under `target_parent`, optionally
    /// renaming the copy. Copies never carry labels.
    pub fn copy_node(&mut self, source: &str, target_parent: &str, new_name: Option<&str>) -> Result<NodeId, EditError> {
        let id = self.resolve(source)?;
        let target = self.resolve(target_parent)?;

        if self.doc.is_ancestor_or_self(id, target) {
            return Err(EditError::InvalidMove {
                source_path: source.to_string(),
                target_path: target_parent.to_string(),
            });
        }

        let renamed = new_name.map(Node::with_full_name);
        let (name, address) = match &renamed {
            Some(node) => (node.name.as_str(), node.unit_address.as_deref()),
            None => (self.doc[id].name.as_str(), self.doc[id].unit_address.as_deref()),
        };
        if self.doc.find_child(target, name, address).is_some() {
            let full_name = new_name.map_or_else(|| self.doc[id].full_name(), str::to_string);
            return Err(EditError::DuplicateNode(join_path(target_parent, &full_name)));
        }

        let copy = self
            .doc
            .copy_subtree(id, target)
            .ok_or_else(|| EditError::NotFound(source.to_string()))?;
        if let Some(node) = renamed {
            self.doc[copy].name = node.name;
            self.doc[copy].unit_address = node.unit_address;
        }

        debug!(from = source, to = %self.doc.path(copy), "copied node");
        Ok(copy)
    }

    /// Replace `old` with `new` in every property called `name`, across the
    /// whole tree. Returns how many properties changed.
    pub fn find_and_replace_property(&mut self, name: &str, old: &[Value], new: &[Value]) -> usize {
        let ids: Vec<NodeId> = self.doc.iter().collect();
        let mut replaced = 0;

        for id in ids {
            if let Some(property) = self.doc[id].property_mut(name) {
                if property.values == old {
                    property.values = new.to_vec();
                    replaced += 1;
                }
            }
        }

        debug!(property = name, replaced, "find and replace");
        replaced
    }

    fn check_free_slot(&self, parent: NodeId, id: NodeId) -> Result<(), EditError> {
        let node = &self.doc[id];
        match self.doc.find_child(parent, &node.name, node.unit_address.as_deref()) {
            Some(existing) if existing != id => Err(EditError::DuplicateNode(join_path(
                &self.doc.path(parent),
                &node.full_name(),
            ))),
            _ => Ok(()),
        }
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}
