//! Arena-backed DOM.
//!
//! Elements live in a generational arena, so a handle to a removed element
//! never aliases a newer one. Only the operations reconciliation needs are
//! provided: building a subtree from a [`View`], slot manipulation
//! (insert-before, replace, detach) and in-place patching.

use std::collections::BTreeMap;
use std::fmt::Write;

use slotmap::{SlotMap, new_key_type};
use thiserror::Error;

new_key_type! {
    /// Handle to a DOM element or text node.
    pub struct ElementId;
}

/// Declarative description of a subtree, produced by render closures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
        children: Vec<View>,
    },
    Text(String),
}

impl View {
    pub fn element(tag: impl Into<String>) -> Self {
        Self::Element {
            tag: tag.into(),
            attrs: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Builder: set an attribute (no-op on text).
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Element { attrs, .. } = &mut self {
            attrs.insert(name.into(), value.into());
        }
        self
    }

    /// Builder: append a child (no-op on text).
    pub fn child(mut self, child: View) -> Self {
        if let Self::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("element {0:?} no longer exists")]
    Stale(ElementId),

    #[error("element {0:?} is not attached to a parent")]
    Detached(ElementId),

    #[error("text node {0:?} cannot have children")]
    NotAnElement(ElementId),

    #[error("cannot insert {0:?} into its own subtree")]
    Cycle(ElementId),
}

#[derive(Debug)]
enum NodeData {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug)]
struct DomNode {
    data: NodeData,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

#[derive(Debug, Default)]
pub struct Dom {
    nodes: SlotMap<ElementId, DomNode>,
}

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_element(&mut self, tag: impl Into<String>) -> ElementId {
        self.insert(NodeData::Element {
            tag: tag.into(),
            attrs: BTreeMap::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> ElementId {
        self.insert(NodeData::Text(text.into()))
    }

    fn insert(&mut self, data: NodeData) -> ElementId {
        self.nodes.insert(DomNode {
            data,
            parent: None,
            children: Vec::new(),
        })
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.nodes.get(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn tag(&self, id: ElementId) -> Option<&str> {
        match &self.nodes.get(id)?.data {
            NodeData::Element { tag, .. } => Some(tag),
            NodeData::Text(_) => None,
        }
    }

    pub fn text(&self, id: ElementId) -> Option<&str> {
        match &self.nodes.get(id)?.data {
            NodeData::Text(text) => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    pub fn attr(&self, id: ElementId, name: &str) -> Option<&str> {
        match &self.nodes.get(id)?.data {
            NodeData::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            NodeData::Text(_) => None,
        }
    }

    fn node(&self, id: ElementId) -> Result<&DomNode, DomError> {
        self.nodes.get(id).ok_or(DomError::Stale(id))
    }

    fn node_mut(&mut self, id: ElementId) -> Result<&mut DomNode, DomError> {
        self.nodes.get_mut(id).ok_or(DomError::Stale(id))
    }

    /// Whether `ancestor` is `id` or one of its ancestors.
    fn is_ancestor(&self, ancestor: ElementId, mut id: ElementId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.parent(id) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    fn check_insert(&self, parent: ElementId, child: ElementId) -> Result<(), DomError> {
        self.node(child)?;
        if let NodeData::Text(_) = self.node(parent)?.data {
            return Err(DomError::NotAnElement(parent));
        }
        if self.is_ancestor(child, parent) {
            return Err(DomError::Cycle(child));
        }
        Ok(())
    }

    /// Append `child` to `parent`, moving it if already attached.
    pub fn append_child(&mut self, parent: ElementId, child: ElementId) -> Result<(), DomError> {
        self.check_insert(parent, child)?;
        self.detach(child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Insert `node` right before `anchor` in the anchor's parent.
    ///
    /// Returns the parent the node was inserted into.
    pub fn insert_before(&mut self, anchor: ElementId, node: ElementId) -> Result<ElementId, DomError> {
        let parent = self.node(anchor)?.parent.ok_or(DomError::Detached(anchor))?;
        self.check_insert(parent, node)?;
        self.detach(node)?;
        let siblings = &mut self.node_mut(parent)?.children;
        let index = siblings.iter().position(|&c| c == anchor).unwrap_or(siblings.len());
        siblings.insert(index, node);
        self.node_mut(node)?.parent = Some(parent);
        Ok(parent)
    }

    /// Put `new` into the slot of `old`. `old` is detached but kept alive.
    pub fn replace_child(&mut self, old: ElementId, new: ElementId) -> Result<(), DomError> {
        if old == new {
            return Ok(());
        }
        self.insert_before(old, new)?;
        self.detach(old)
    }

    /// Remove `id` from its parent, keeping the subtree alive.
    pub fn detach(&mut self, id: ElementId) -> Result<(), DomError> {
        let Some(parent) = self.node_mut(id)?.parent.take() else {
            return Ok(());
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|&c| c != id);
        }
        Ok(())
    }

    /// Detach `id` and free its whole subtree.
    pub fn remove(&mut self, id: ElementId) {
        if self.detach(id).is_err() {
            return;
        }
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(next) {
                stack.extend(node.children);
            }
        }
    }

    /// Build a detached subtree for `view`.
    pub fn render(&mut self, view: &View) -> ElementId {
        match view {
            View::Text(text) => self.create_text(text.clone()),
            View::Element {
                tag,
                attrs,
                children,
            } => {
                let id = self.insert(NodeData::Element {
                    tag: tag.clone(),
                    attrs: attrs.clone(),
                });
                for child in children {
                    let child_id = self.render(child);
                    self.nodes[child_id].parent = Some(id);
                    self.nodes[id].children.push(child_id);
                }
                id
            }
        }
    }

    /// Bring the subtree at `root` from `old` to `new` in place.
    ///
    /// `root` itself is never replaced: a tag or node-kind change is applied
    /// to the existing handle. Children are matched by position; a child
    /// whose kind differs is replaced by a freshly rendered one.
    pub fn patch(&mut self, root: ElementId, old: &View, new: &View) -> Result<(), DomError> {
        if old == new {
            return Ok(());
        }
        match new {
            View::Text(text) => {
                let node = self.node_mut(root)?;
                node.data = NodeData::Text(text.clone());
                let children = std::mem::take(&mut node.children);
                for child in children {
                    self.remove_detached_child(child);
                }
                Ok(())
            }
            View::Element {
                tag,
                attrs,
                children,
            } => {
                let node = self.node_mut(root)?;
                node.data = NodeData::Element {
                    tag: tag.clone(),
                    attrs: attrs.clone(),
                };
                let old_children: &[View] = match old {
                    View::Element { children, .. } => children,
                    View::Text(_) => &[],
                };
                self.patch_children(root, old_children, children)
            }
        }
    }

    fn patch_children(&mut self, parent: ElementId, old: &[View], new: &[View]) -> Result<(), DomError> {
        let existing = self.node(parent)?.children.clone();
        for (index, view) in new.iter().enumerate() {
            match (existing.get(index), old.get(index)) {
                (Some(&child), Some(previous)) if same_kind(previous, view) => {
                    self.patch(child, previous, view)?;
                }
                (Some(&child), _) => {
                    let fresh = self.render(view);
                    self.replace_child(child, fresh)?;
                    self.remove(child);
                }
                (None, _) => {
                    let fresh = self.render(view);
                    self.append_child(parent, fresh)?;
                }
            }
        }
        for &extra in existing.iter().skip(new.len()) {
            self.remove(extra);
        }
        Ok(())
    }

    fn remove_detached_child(&mut self, child: ElementId) {
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = None;
        }
        self.remove(child);
    }

    /// Serialize a subtree, mainly for assertions and debugging.
    pub fn to_html(&self, id: ElementId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: ElementId, out: &mut String) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(text) => out.push_str(&escape(text)),
            NodeData::Element { tag, attrs } => {
                let _ = write!(out, "<{tag}");
                for (name, value) in attrs {
                    let _ = write!(out, " {name}=\"{}\"", escape(value));
                }
                out.push('>');
                for &child in &node.children {
                    self.write_html(child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
        }
    }
}

fn same_kind(a: &View, b: &View) -> bool {
    matches!(
        (a, b),
        (View::Text(_), View::Text(_)) | (View::Element { .. }, View::Element { .. })
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
