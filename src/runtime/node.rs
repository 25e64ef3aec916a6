//! Component nodes: one live, mounted use of a component definition.

use std::rc::Rc;

use serde::Serialize;
use slotmap::{SlotMap, new_key_type};

use super::component::{ComponentDef, Instance};
use super::dom::{ElementId, View};
use super::reactive::{Scope, StateBag};

new_key_type! {
    /// Handle to a component node. Keys of destroyed nodes never resolve.
    pub struct NodeKey;
}

/// Arena of live component nodes.
pub type Nodes = SlotMap<NodeKey, ComponentNode>;

/// ```text
/// NotRendered ──mount──► Activated ◄──activate/deactivate──► Deactivated
///                            │                                   │
///                            └──────────── unmount ──────────────┘
///                                             ▼
///                                   Unmounting ──► Unloaded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    NotRendered,
    Activated,
    Deactivated,
    Unmounting,
    Unloaded,
}

impl Lifecycle {
    /// States a hot update acts on.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Activated | Self::Deactivated)
    }
}

/// Rendered somewhere else than the logical parent. The shadow keeps the
/// logical slot while the root lives under `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Portal {
    pub target: ElementId,
    pub shadow: ElementId,
}

#[derive(Debug)]
pub struct ComponentNode {
    pub(crate) def: Rc<ComponentDef>,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) scope: Scope,
    pub(crate) instance: Option<Instance>,
    pub(crate) root: Option<ElementId>,
    pub(crate) view: Option<View>,
    pub(crate) portal: Option<Portal>,
    /// Published state getters of the current instance.
    pub(crate) state: Option<StateBag>,
    /// Holds the slot while deactivated.
    pub(crate) anchor: Option<ElementId>,
    /// View produced while deactivated, applied on activation.
    pub(crate) pending: Option<View>,
}

impl ComponentNode {
    pub(crate) fn new(def: Rc<ComponentDef>) -> Self {
        Self {
            def,
            lifecycle: Lifecycle::NotRendered,
            scope: Scope::new(),
            instance: None,
            root: None,
            view: None,
            portal: None,
            state: None,
            anchor: None,
            pending: None,
        }
    }

    pub fn def(&self) -> &Rc<ComponentDef> {
        &self.def
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn root(&self) -> Option<ElementId> {
        self.root
    }

    pub fn view(&self) -> Option<&View> {
        self.view.as_ref()
    }

    pub fn portal(&self) -> Option<Portal> {
        self.portal
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn state(&self) -> Option<&StateBag> {
        self.state.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Element currently holding the node's place in its parent.
    pub(crate) fn slot(&self) -> Option<ElementId> {
        match self.lifecycle {
            Lifecycle::Deactivated => self.anchor,
            _ => self.portal.map(|p| p.shadow).or(self.root),
        }
    }

    /// Publish the capture bag of the current instance.
    pub(crate) fn publish(&mut self) {
        self.state = self
            .instance
            .as_ref()
            .map(|instance| self.def.strategy().capture(instance));
    }
}
