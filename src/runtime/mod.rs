//! Runtime half of hot reload.
//!
//! ```text
//! Runtime
//! ├── Host
//! │   ├── Dom          arena of elements
//! │   └── Nodes        arena of component nodes
//! └── ModuleManager    identity -> nodes, identity -> latest definition
//!         │
//!         └── Reconciler (per node: patch or remount)
//! ```
//!
//! Everything is single-threaded (`Rc`/`RefCell`); updates are applied one
//! node at a time.

pub mod component;
pub mod dom;
pub mod manager;
pub mod node;
pub mod reactive;
pub mod reconcile;

pub use component::{
    ClassComponent, ClassInstance, ComponentDef, ComponentKind, ComponentStrategy,
    FunctionComponent, Instance, RenderFn, SetupContext,
};
pub use dom::{Dom, DomError, ElementId, View};
pub use manager::{ModuleManager, ReloadRequired, UpdateSummary};
pub use node::{ComponentNode, Lifecycle, NodeKey, Nodes, Portal};
pub use reactive::{Effect, Scope, Signal, StateBag, StateValue};
pub use reconcile::{ReconcileError, Reconciled, Reconciler};

use std::rc::Rc;

use crate::classify::Classifier;
use crate::compiler::ComponentId;
use crate::debug;
use reconcile::guarded;

/// DOM plus component nodes: everything a reconciliation mutates.
#[derive(Debug, Default)]
pub struct Host {
    pub(crate) dom: Dom,
    pub(crate) nodes: Nodes,
}

/// Application host: mounts components and applies module updates.
pub struct Runtime {
    host: Host,
    manager: ModuleManager,
}

impl Runtime {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            host: Host::default(),
            manager: ModuleManager::new(classifier),
        }
    }

    pub fn dom(&self) -> &Dom {
        &self.host.dom
    }

    pub fn dom_mut(&mut self) -> &mut Dom {
        &mut self.host.dom
    }

    pub fn node(&self, key: NodeKey) -> Option<&ComponentNode> {
        self.host.nodes.get(key)
    }

    pub fn nodes(&self) -> &Nodes {
        &self.host.nodes
    }

    pub fn manager(&self) -> &ModuleManager {
        &self.manager
    }

    /// `bindId(def, id)` as emitted by the instrumented module.
    pub fn bind_id(&mut self, def: &Rc<ComponentDef>, id: ComponentId, module: &str) {
        self.manager.bind_id(def, id, module);
    }

    pub fn get_state(&self, key: NodeKey, name: &str) -> Option<StateValue> {
        self.manager.get_state(self.node(key)?, name)
    }

    /// Mount the newest definition of `def` as the last child of `parent`.
    pub fn mount(&mut self, def: &Rc<ComponentDef>, parent: ElementId) -> Result<NodeKey, ReconcileError> {
        self.mount_inner(def, parent, None)
    }

    /// Mount with the rendered root under `target`; `parent` only keeps a
    /// shadow element for the logical position.
    pub fn mount_portal(
        &mut self,
        def: &Rc<ComponentDef>,
        parent: ElementId,
        target: ElementId,
    ) -> Result<NodeKey, ReconcileError> {
        self.mount_inner(def, parent, Some(target))
    }

    fn mount_inner(
        &mut self,
        def: &Rc<ComponentDef>,
        parent: ElementId,
        target: Option<ElementId>,
    ) -> Result<NodeKey, ReconcileError> {
        let def = self.manager.resolve(def);
        let Host { dom, nodes } = &mut self.host;
        let key = nodes.insert(ComponentNode::new(Rc::clone(&def)));
        let node = &mut nodes[key];

        let built = guarded(def.name(), || {
            let strategy = def.strategy();
            let instance = strategy.construct(&mut node.scope, None);
            let view = strategy.render(&instance);
            (instance, view)
        });
        let (instance, view) = match built {
            Ok(built) => built,
            Err(err) => {
                node.scope.dispose();
                nodes.remove(key);
                return Err(err);
            }
        };

        let root = dom.render(&view);
        let attached = match target {
            Some(target) => {
                let shadow = dom.create_text("");
                let result = dom
                    .append_child(parent, shadow)
                    .and_then(|()| dom.append_child(target, root));
                if result.is_err() {
                    dom.remove(shadow);
                }
                result.map(|()| Some(Portal { target, shadow }))
            }
            None => dom.append_child(parent, root).map(|()| None),
        };
        let portal = match attached {
            Ok(portal) => portal,
            Err(err) => {
                dom.remove(root);
                node.scope.dispose();
                nodes.remove(key);
                return Err(err.into());
            }
        };

        node.instance = Some(instance);
        node.root = Some(root);
        node.view = Some(view);
        node.portal = portal;
        node.lifecycle = Lifecycle::Activated;
        // state getters become visible once the body has finished
        node.publish();

        self.manager.register(&self.host.nodes, key, None);
        debug!("hmr"; "mounted `{}`", def.name());
        Ok(key)
    }

    /// Tear a node down and forget it. Returns `false` for unknown keys.
    pub fn unmount(&mut self, key: NodeKey) -> bool {
        let Host { dom, nodes } = &mut self.host;
        let Some(node) = nodes.get_mut(key) else {
            return false;
        };

        node.lifecycle = Lifecycle::Unmounting;
        node.scope.dispose();
        node.instance = None;
        let elements = [
            node.root.take(),
            node.anchor.take(),
            node.portal.take().map(|p| p.shadow),
        ];
        for element in elements.into_iter().flatten() {
            dom.remove(element);
        }
        node.lifecycle = Lifecycle::Unloaded;

        let identity = node.def.identity().cloned();
        nodes.remove(key);
        if let Some(identity) = identity {
            self.manager.unregister(key, &identity);
        }
        true
    }

    /// Take an activated node out of the DOM, leaving an anchor in its slot.
    pub fn deactivate(&mut self, key: NodeKey) -> Result<bool, DomError> {
        let Host { dom, nodes } = &mut self.host;
        let Some(node) = nodes.get_mut(key) else {
            return Ok(false);
        };
        if node.lifecycle != Lifecycle::Activated {
            return Ok(false);
        }
        let Some(slot) = node.slot() else {
            return Ok(false);
        };

        let anchor = dom.create_text("");
        dom.insert_before(slot, anchor)?;
        if let Some(portal) = node.portal {
            dom.detach(portal.shadow)?;
        }
        if let Some(root) = node.root {
            dom.detach(root)?;
        }
        node.anchor = Some(anchor);
        node.lifecycle = Lifecycle::Deactivated;
        Ok(true)
    }

    /// Put a deactivated node back, applying any view produced meanwhile.
    pub fn activate(&mut self, key: NodeKey) -> Result<bool, DomError> {
        let Host { dom, nodes } = &mut self.host;
        let Some(node) = nodes.get_mut(key) else {
            return Ok(false);
        };
        if node.lifecycle != Lifecycle::Deactivated {
            return Ok(false);
        }

        if let (Some(pending), Some(root)) = (node.pending.take(), node.root) {
            if let Some(previous) = &node.view {
                dom.patch(root, previous, &pending)?;
            }
            node.view = Some(pending);
        }

        if let Some(anchor) = node.anchor.take() {
            match (node.portal, node.root) {
                (Some(portal), root) => {
                    dom.replace_child(anchor, portal.shadow)?;
                    if let Some(root) = root {
                        dom.append_child(portal.target, root)?;
                    }
                }
                (None, Some(root)) => dom.replace_child(anchor, root)?,
                (None, None) => {}
            }
            dom.remove(anchor);
        }
        node.lifecycle = Lifecycle::Activated;
        Ok(true)
    }

    /// Handle a reloaded module. `Err` carries the reason to fall back to a
    /// full reload.
    pub fn apply_update(&mut self, exports: &[Rc<ComponentDef>]) -> Result<UpdateSummary, ReloadRequired> {
        self.manager.update(&mut self.host, exports)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Classifier::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> Rc<ComponentDef> {
        Rc::new(ComponentDef::function("Counter", |cx| {
            let n = cx.signal("n", 0);
            Rc::new(move || View::element("p").child(View::text(n.get().to_string())))
        }))
    }

    #[test]
    fn test_mount_renders_into_parent() {
        let mut rt = Runtime::new(Classifier::default());
        let body = rt.dom_mut().create_element("body");
        let key = rt.mount(&counter(), body).unwrap();
        let node = rt.node(key).unwrap();
        assert_eq!(node.lifecycle(), Lifecycle::Activated);
        assert_eq!(rt.dom().to_html(body), "<body><p>0</p></body>");
        assert!(node.state().and_then(|s| s.get("n")).is_some());
    }

    #[test]
    fn test_mount_failure_leaves_nothing_behind() {
        let mut rt = Runtime::new(Classifier::default());
        let body = rt.dom_mut().create_element("body");
        let broken = Rc::new(ComponentDef::function("Broken", |_| -> RenderFn {
            panic!("no setup")
        }));
        assert!(matches!(
            rt.mount(&broken, body),
            Err(ReconcileError::Panicked { .. })
        ));
        assert!(rt.nodes().is_empty());
        assert!(rt.dom().children(body).is_empty());
    }

    #[test]
    fn test_deactivate_and_activate() {
        let mut rt = Runtime::new(Classifier::default());
        let body = rt.dom_mut().create_element("body");
        let key = rt.mount(&counter(), body).unwrap();
        let root = rt.node(key).unwrap().root().unwrap();

        assert!(rt.deactivate(key).unwrap());
        assert!(!rt.deactivate(key).unwrap());
        assert_eq!(rt.node(key).unwrap().lifecycle(), Lifecycle::Deactivated);
        assert_eq!(rt.dom().children(body).len(), 1);
        assert_ne!(rt.dom().children(body)[0], root);

        assert!(rt.activate(key).unwrap());
        assert!(!rt.activate(key).unwrap());
        assert_eq!(rt.dom().children(body), &[root]);
    }

    #[test]
    fn test_portal_deactivate_and_activate() {
        let mut rt = Runtime::new(Classifier::default());
        let body = rt.dom_mut().create_element("body");
        let modal = rt.dom_mut().create_element("aside");
        let key = rt.mount_portal(&counter(), body, modal).unwrap();
        let portal = rt.node(key).unwrap().portal().unwrap();
        let root = rt.node(key).unwrap().root().unwrap();

        rt.deactivate(key).unwrap();
        assert!(rt.dom().children(modal).is_empty());
        assert_eq!(rt.dom().parent(portal.shadow), None);

        rt.activate(key).unwrap();
        assert_eq!(rt.dom().children(body), &[portal.shadow]);
        assert_eq!(rt.dom().children(modal), &[root]);
    }

    #[test]
    fn test_unmount_portal_cleans_up() {
        let mut rt = Runtime::new(Classifier::default());
        let body = rt.dom_mut().create_element("body");
        let modal = rt.dom_mut().create_element("aside");
        let key = rt.mount_portal(&counter(), body, modal).unwrap();
        assert!(rt.unmount(key));
        assert!(rt.dom().children(body).is_empty());
        assert!(rt.dom().children(modal).is_empty());
        assert_eq!(rt.dom().len(), 2);
    }
}
