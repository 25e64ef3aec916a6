//! Per-node hot update: incremental patch or full remount.
//!
//! ```text
//!              ┌─ render unchanged ─► capture ─► dispose ─► construct ─► patch DOM in place
//! ChangeRecord ┤
//!              └─ render changed ───► placeholder ─► teardown ─► construct ─► replace placeholder
//! ```
//!
//! Captured state is handed to the new instance only when the logic half of
//! the definition is unchanged. Component code runs under `catch_unwind`, so
//! a panicking definition fails its own node and nothing else.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use thiserror::Error;

use super::Host;
use super::component::{ComponentDef, Instance};
use super::dom::{DomError, View};
use super::node::{Lifecycle, NodeKey, Portal};
use super::reactive::Scope;
use crate::classify::{ChangeRecord, Classifier, ClassifyError, default_source_type, source_type_for};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("component node no longer exists")]
    MissingNode,

    #[error("component node has nothing rendered")]
    NotRendered,

    #[error("`{component}` panicked: {message}")]
    Panicked { component: String, message: String },

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Dom(#[from] DomError),
}

/// How a node was brought up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    Patched,
    Remounted,
    /// Node not in a live lifecycle state; nothing to do.
    Skipped,
}

pub struct Reconciler<'c> {
    classifier: &'c Classifier,
}

impl<'c> Reconciler<'c> {
    pub fn new(classifier: &'c Classifier) -> Self {
        Self { classifier }
    }

    /// Which halves changed between the node's definition and `new`.
    ///
    /// Prefers the build-time record, then classifies the attached sources.
    /// Without either, or when the component switched between function and
    /// class, everything counts as changed.
    pub fn change_for(&self, old: &ComponentDef, new: &ComponentDef) -> Result<ChangeRecord, ClassifyError> {
        if old.kind().tag() != new.kind().tag() {
            return Ok(ChangeRecord::full());
        }
        if let Some(change) = new.change() {
            return Ok(change);
        }
        match (new.source(), old.source()) {
            (Some(new_source), Some(old_source)) => {
                let source_type = new
                    .module()
                    .or(old.module())
                    .map_or_else(default_source_type, source_type_for);
                self.classifier.classify_as(new_source, old_source, source_type)
            }
            _ => Ok(ChangeRecord::full()),
        }
    }

    /// Bring one node up to date with `new_def`.
    pub fn reconcile(
        &self,
        host: &mut Host,
        key: NodeKey,
        new_def: Rc<ComponentDef>,
    ) -> Result<Reconciled, ReconcileError> {
        let node = host.nodes.get(key).ok_or(ReconcileError::MissingNode)?;
        if !node.lifecycle.is_live() {
            return Ok(Reconciled::Skipped);
        }

        let change = self.change_for(&node.def, &new_def)?;
        if change.render_changed {
            remount(host, key, new_def, change)?;
            Ok(Reconciled::Remounted)
        } else {
            patch(host, key, new_def, change)?;
            Ok(Reconciled::Patched)
        }
    }
}

/// Keep the DOM, rebuild the instance and re-run its render closure.
fn patch(host: &mut Host, key: NodeKey, new_def: Rc<ComponentDef>, change: ChangeRecord) -> Result<(), ReconcileError> {
    let Host { dom, nodes } = host;
    let node = nodes.get_mut(key).ok_or(ReconcileError::MissingNode)?;

    let old_instance = node.instance.take();
    let bag = match &old_instance {
        Some(instance) if change.keeps_state() => Some(node.def.strategy().capture(instance)),
        _ => None,
    };

    // The old scope stays alive until the new instance exists.
    let mut scope = Scope::new();
    let built = guarded(new_def.name(), || {
        let strategy = new_def.strategy();
        let mut instance = strategy.construct(&mut scope, bag.as_ref());
        if let Some(previous) = &old_instance {
            strategy.restore(&mut instance, previous);
        }
        let view = strategy.render(&instance);
        (instance, view)
    });
    let (instance, view) = match built {
        Ok(built) => built,
        Err(err) => {
            // previous instance and scope stay in service
            scope.dispose();
            node.instance = old_instance;
            return Err(err);
        }
    };

    std::mem::replace(&mut node.scope, scope).dispose();
    drop(old_instance);
    node.def = new_def;
    node.instance = Some(instance);
    node.publish();

    if node.lifecycle == Lifecycle::Activated {
        let root = node.root.ok_or(ReconcileError::NotRendered)?;
        if let Some(previous) = &node.view {
            dom.patch(root, previous, &view)?;
        }
        node.view = Some(view);
        node.pending = None;
    } else {
        node.pending = Some(view);
    }
    Ok(())
}

/// Replace the node's DOM with a freshly constructed instance.
fn remount(host: &mut Host, key: NodeKey, new_def: Rc<ComponentDef>, change: ChangeRecord) -> Result<(), ReconcileError> {
    let Host { dom, nodes } = host;
    let node = nodes.get_mut(key).ok_or(ReconcileError::MissingNode)?;
    let activated = node.lifecycle == Lifecycle::Activated;

    // Deactivated nodes already have an anchor holding their slot.
    let placeholder = if activated {
        let slot = node.slot().ok_or(ReconcileError::NotRendered)?;
        let placeholder = dom.create_text("");
        dom.insert_before(slot, placeholder)?;
        Some(placeholder)
    } else {
        None
    };

    // teardown
    let bag = match &node.instance {
        Some(instance) if change.keeps_state() => Some(node.def.strategy().capture(instance)),
        _ => None,
    };
    node.scope.dispose();
    node.scope = Scope::new();
    node.instance = None;
    node.state = None;
    node.view = None;
    node.pending = None;
    if let Some(root) = node.root.take() {
        dom.remove(root);
    }
    let portal = node.portal.take();
    if let Some(portal) = portal {
        dom.remove(portal.shadow);
    }
    node.def = Rc::clone(&new_def);

    let built = guarded(new_def.name(), || {
        let strategy = new_def.strategy();
        let instance = strategy.construct(&mut node.scope, bag.as_ref());
        let view = strategy.render(&instance);
        (instance, view)
    });
    let (instance, view): (Instance, View) = match built {
        Ok(built) => built,
        Err(err) => {
            node.scope.dispose();
            node.lifecycle = Lifecycle::Unloaded;
            // the placeholder keeps the slot; unmount removes it
            if placeholder.is_some() {
                node.anchor = placeholder;
            }
            return Err(err);
        }
    };

    let root = dom.render(&view);
    node.portal = match (portal, placeholder) {
        (Some(portal), Some(placeholder)) => {
            let shadow = dom.create_text("");
            dom.replace_child(placeholder, shadow)?;
            dom.append_child(portal.target, root)?;
            Some(Portal {
                target: portal.target,
                shadow,
            })
        }
        (Some(portal), None) => Some(Portal {
            target: portal.target,
            shadow: dom.create_text(""),
        }),
        (None, Some(placeholder)) => {
            dom.replace_child(placeholder, root)?;
            None
        }
        (None, None) => None,
    };
    if let Some(placeholder) = placeholder {
        dom.remove(placeholder);
    }

    node.root = Some(root);
    node.view = Some(view);
    node.instance = Some(instance);
    node.publish();
    Ok(())
}

/// Run component code, turning a panic into a [`ReconcileError`].
pub(crate) fn guarded<T>(component: &str, f: impl FnOnce() -> T) -> Result<T, ReconcileError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| ReconcileError::Panicked {
        component: component.to_string(),
        message: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ComponentId;
    use crate::runtime::component::{ClassComponent, RenderFn};
    use crate::runtime::node::ComponentNode;
    use crate::runtime::reactive::{Signal, StateValue};
    use crate::runtime::Runtime;
    use crate::runtime::dom::ElementId;
    use serde_json::json;
    use std::cell::Cell;

    const MODULE: &str = "src/Counter.tsx";

    fn id() -> ComponentId {
        ComponentId::from("counter")
    }

    /// `<p>{prefix}{n}</p>` with a signal `n` starting at 0.
    fn counter(prefix: &'static str) -> ComponentDef {
        ComponentDef::function("Counter", move |cx| {
            let n = cx.signal("n", 0);
            Rc::new(move || View::element("p").child(View::text(format!("{prefix}{}", n.get()))))
        })
    }

    fn bound(rt: &mut Runtime, def: ComponentDef) -> Rc<ComponentDef> {
        let def = Rc::new(def);
        rt.bind_id(&def, id(), MODULE);
        def
    }

    fn signal(rt: &Runtime, key: NodeKey) -> Signal {
        rt.get_state(key, "n")
            .and_then(|v| v.as_signal().cloned())
            .unwrap()
    }

    fn setup() -> (Runtime, ElementId, NodeKey) {
        let mut rt = Runtime::new(Classifier::new(["jsx"]));
        let body = rt.dom_mut().create_element("body");
        let def = bound(&mut rt, counter(""));
        let key = rt.mount(&def, body).unwrap();
        (rt, body, key)
    }

    #[test]
    fn test_patch_keeps_root_and_state() {
        let (mut rt, body, key) = setup();
        let root = rt.node(key).unwrap().root().unwrap();
        signal(&rt, key).set(3);

        let new = bound(
            &mut rt,
            counter("").with_change(ChangeRecord::unchanged()),
        );
        rt.apply_update(&[new]).unwrap();

        let node = rt.node(key).unwrap();
        assert_eq!(node.root(), Some(root));
        assert_eq!(rt.dom().children(body), &[root]);
        assert_eq!(rt.dom().to_html(root), "<p>3</p>");
    }

    #[test]
    fn test_patch_with_logic_change_discards_state() {
        let (mut rt, _body, key) = setup();
        let root = rt.node(key).unwrap().root().unwrap();
        let old = signal(&rt, key);
        old.set(3);

        let new = bound(
            &mut rt,
            counter("n=").with_change(ChangeRecord {
                render_changed: false,
                logic_changed: true,
            }),
        );
        rt.apply_update(&[new]).unwrap();

        assert_eq!(rt.node(key).unwrap().root(), Some(root));
        assert_eq!(rt.dom().to_html(root), "<p>n=0</p>");
        assert!(!signal(&rt, key).ptr_eq(&old));
    }

    #[test]
    fn test_render_only_change_remounts_with_state() {
        let (mut rt, body, key) = setup();
        let old_root = rt.node(key).unwrap().root().unwrap();
        let old = signal(&rt, key);
        old.set(5);

        let new = bound(
            &mut rt,
            counter("count: ").with_change(ChangeRecord {
                render_changed: true,
                logic_changed: false,
            }),
        );
        let summary = rt.apply_update(&[new]).unwrap();
        assert_eq!(summary.remounted, 1);

        let new_root = rt.node(key).unwrap().root().unwrap();
        assert_ne!(new_root, old_root);
        assert!(!rt.dom().contains(old_root));
        // exactly one element occupies the slot
        assert_eq!(rt.dom().children(body), &[new_root]);
        assert_eq!(rt.dom().to_html(new_root), "<p>count: 5</p>");
        assert!(signal(&rt, key).ptr_eq(&old));
    }

    #[test]
    fn test_full_change_remounts_fresh() {
        let (mut rt, body, key) = setup();
        signal(&rt, key).set(5);

        let new = bound(&mut rt, counter("x").with_change(ChangeRecord::full()));
        rt.apply_update(&[new]).unwrap();

        let root = rt.node(key).unwrap().root().unwrap();
        assert_eq!(rt.dom().children(body), &[root]);
        assert_eq!(rt.dom().to_html(root), "<p>x0</p>");
    }

    #[test]
    fn test_remount_keeps_sibling_position() {
        let mut rt = Runtime::new(Classifier::default());
        let body = rt.dom_mut().create_element("body");
        let before = rt.dom_mut().create_element("header");
        rt.dom_mut().append_child(body, before).unwrap();
        let def = bound(&mut rt, counter(""));
        let key = rt.mount(&def, body).unwrap();
        let after = rt.dom_mut().create_element("footer");
        rt.dom_mut().append_child(body, after).unwrap();

        let new = bound(&mut rt, counter("!").with_change(ChangeRecord::full()));
        rt.apply_update(&[new]).unwrap();
        let root = rt.node(key).unwrap().root().unwrap();
        assert_eq!(rt.dom().children(body), &[before, root, after]);
    }

    #[test]
    fn test_portal_remount() {
        let mut rt = Runtime::new(Classifier::default());
        let body = rt.dom_mut().create_element("body");
        let modal = rt.dom_mut().create_element("aside");
        let def = bound(&mut rt, counter(""));
        let key = rt.mount_portal(&def, body, modal).unwrap();
        let old_portal = rt.node(key).unwrap().portal().unwrap();
        assert_eq!(rt.dom().children(body), &[old_portal.shadow]);

        let new = bound(&mut rt, counter("m").with_change(ChangeRecord::full()));
        rt.apply_update(&[new]).unwrap();

        let node = rt.node(key).unwrap();
        let portal = node.portal().unwrap();
        let root = node.root().unwrap();
        assert_ne!(portal.shadow, old_portal.shadow);
        assert_eq!(portal.target, modal);
        assert_eq!(rt.dom().children(body), &[portal.shadow]);
        assert_eq!(rt.dom().children(modal), &[root]);
        assert_eq!(rt.dom().to_html(modal), "<aside><p>m0</p></aside>");
    }

    #[test]
    fn test_old_scope_is_disposed() {
        let mut rt = Runtime::new(Classifier::default());
        let body = rt.dom_mut().create_element("body");
        let cleaned = Rc::new(Cell::new(0));
        let def = {
            let cleaned = cleaned.clone();
            bound(
                &mut rt,
                ComponentDef::function("Counter", move |cx| {
                    let cleaned = cleaned.clone();
                    cx.on_cleanup(move || cleaned.set(cleaned.get() + 1));
                    cx.effect(|| {});
                    Rc::new(|| View::text("a"))
                }),
            )
        };
        let key = rt.mount(&def, body).unwrap();
        let effect = rt.node(key).unwrap().scope().effects()[0].clone();

        let new = bound(&mut rt, counter("").with_change(ChangeRecord::unchanged()));
        rt.apply_update(&[new]).unwrap();
        assert_eq!(cleaned.get(), 1);
        assert!(!effect.is_active());
    }

    #[test]
    fn test_classifies_attached_sources() {
        let mut rt = Runtime::new(Classifier::new(["view"]));
        let body = rt.dom_mut().create_element("body");
        let def = bound(
            &mut rt,
            counter("").with_source("function Counter(){ const n = ref(0); return view(n) }"),
        );
        let key = rt.mount(&def, body).unwrap();
        let root = rt.node(key).unwrap().root().unwrap();

        // logic-only edit: patched in place
        let new = bound(
            &mut rt,
            counter("").with_source("function Counter(){ const n = ref(0); log(n); return view(n) }"),
        );
        let summary = rt.apply_update(&[new]).unwrap();
        assert_eq!(summary.patched, 1);
        assert_eq!(rt.node(key).unwrap().root(), Some(root));
    }

    #[test]
    fn test_typed_sources_classify_by_module_extension() {
        let classifier = Classifier::new(["view"]);
        let reconciler = Reconciler::new(&classifier);
        let typed = |body: &str| {
            let def = counter("").with_source(format!("function Counter(): Node {{ {body} }}"));
            def.bind(id(), MODULE);
            def
        };
        let old = typed("const n: number = 0; return view(n)");
        let new = typed("const n: number = 0; return view(n, 1)");
        assert_eq!(
            reconciler.change_for(&old, &new).unwrap(),
            ChangeRecord {
                render_changed: true,
                logic_changed: false,
            }
        );
    }

    #[test]
    fn test_kind_switch_forces_remount() {
        let classifier = Classifier::default();
        let reconciler = Reconciler::new(&classifier);
        let function = counter("").with_change(ChangeRecord::unchanged());
        let class = ComponentDef::class(
            "Counter",
            ClassComponent::new(|_, _| {}, |_| View::text("c")),
        )
        .with_change(ChangeRecord::unchanged());
        assert_eq!(reconciler.change_for(&function, &class).unwrap(), ChangeRecord::full());
        // no record and no sources
        assert_eq!(reconciler.change_for(&counter(""), &counter("")).unwrap(), ChangeRecord::full());
    }

    #[test]
    fn test_class_patch_copies_fields() {
        let mut rt = Runtime::new(Classifier::default());
        let body = rt.dom_mut().create_element("body");
        let class = |label: &'static str| {
            ClassComponent::new(
                |this, _| this.set("count", StateValue::Value(json!(0))),
                move |this| {
                    let count = this.get("count").and_then(StateValue::value).unwrap_or_default();
                    View::element("b").child(View::text(format!("{label}{count}")))
                },
            )
        };
        let def = bound(&mut rt, ComponentDef::class("Counter", class("")));
        let key = rt.mount(&def, body).unwrap();
        let root = rt.node(key).unwrap().root().unwrap();
        if let Some(Instance::Class(instance)) = rt.host.nodes[key].instance.as_mut() {
            instance.set("count", StateValue::Value(json!(4)));
        }

        let new = bound(
            &mut rt,
            ComponentDef::class("Counter", class("#")).with_change(ChangeRecord {
                render_changed: false,
                logic_changed: true,
            }),
        );
        rt.apply_update(&[new]).unwrap();
        assert_eq!(rt.dom().to_html(root), "<b>#4</b>");
    }

    #[test]
    fn test_panicking_component_is_isolated() {
        let mut rt = Runtime::new(Classifier::default());
        let body = rt.dom_mut().create_element("body");
        let a = Rc::new(counter("a"));
        let b = Rc::new(counter("b"));
        rt.bind_id(&a, ComponentId::from("a"), MODULE);
        rt.bind_id(&b, ComponentId::from("b"), MODULE);
        let key_a = rt.mount(&a, body).unwrap();
        let key_b = rt.mount(&b, body).unwrap();

        let broken = Rc::new(
            ComponentDef::function("Broken", |_| -> Rc<dyn Fn() -> View> { panic!("setup exploded") })
                .with_change(ChangeRecord::full()),
        );
        let fine = Rc::new(counter("B").with_change(ChangeRecord::full()));
        rt.bind_id(&broken, ComponentId::from("a"), MODULE);
        rt.bind_id(&fine, ComponentId::from("b"), MODULE);

        let err = rt.apply_update(&[broken, fine]).unwrap_err();
        assert!(err.reason.contains("setup exploded"), "{}", err.reason);

        let node_a = rt.node(key_a).unwrap();
        assert_eq!(node_a.lifecycle(), Lifecycle::Unloaded);
        assert!(!rt.manager().is_registered(key_a, &ComponentId::from("a")));

        let node_b = rt.node(key_b).unwrap();
        let root_b = node_b.root().unwrap();
        assert_eq!(rt.dom().to_html(root_b), "<p>B0</p>");

        // placeholder of the failed node still holds its slot
        let children = rt.dom().children(body);
        assert_eq!(children.len(), 2);
        assert_eq!(rt.dom().text(children[0]), Some(""));
        assert_eq!(children[1], root_b);
    }

    #[test]
    fn test_failed_patch_keeps_previous_dom() {
        let (mut rt, _body, key) = setup();
        let root = rt.node(key).unwrap().root().unwrap();
        let broken = bound(
            &mut rt,
            ComponentDef::function("Counter", |_| Rc::new(|| -> View { panic!("render exploded") }))
                .with_change(ChangeRecord::unchanged()),
        );
        assert!(rt.apply_update(&[broken]).is_err());
        let node = rt.node(key).unwrap();
        assert_eq!(node.lifecycle(), Lifecycle::Activated);
        assert_eq!(rt.dom().to_html(root), "<p>0</p>");
    }

    #[test]
    fn test_failed_patch_keeps_previous_scope_alive() {
        let mut rt = Runtime::new(Classifier::default());
        let body = rt.dom_mut().create_element("body");
        let cleaned = Rc::new(Cell::new(0));
        let def = {
            let cleaned = cleaned.clone();
            bound(
                &mut rt,
                ComponentDef::function("Counter", move |cx| {
                    let cleaned = cleaned.clone();
                    cx.on_cleanup(move || cleaned.set(cleaned.get() + 1));
                    cx.effect(|| {});
                    Rc::new(|| View::text("a"))
                }),
            )
        };
        let key = rt.mount(&def, body).unwrap();
        let effect = rt.node(key).unwrap().scope().effects()[0].clone();

        let broken = bound(
            &mut rt,
            ComponentDef::function("Counter", |_| -> RenderFn { panic!("setup exploded") })
                .with_change(ChangeRecord::unchanged()),
        );
        assert!(rt.apply_update(&[broken]).is_err());
        assert_eq!(cleaned.get(), 0);
        assert!(effect.is_active());
        assert!(!rt.node(key).unwrap().scope().is_disposed());

        // the next good update disposes it exactly once
        let fixed = bound(&mut rt, counter("").with_change(ChangeRecord::unchanged()));
        rt.apply_update(&[fixed]).unwrap();
        assert_eq!(cleaned.get(), 1);
        assert!(!effect.is_active());
    }

    #[test]
    fn test_non_live_nodes_are_skipped() {
        let mut rt = Runtime::new(Classifier::default());
        let def = Rc::new(counter(""));
        let key = rt.host.nodes.insert(ComponentNode::new(def.clone()));
        let reconciler = Reconciler::new(rt.manager.classifier());
        let outcome = reconciler.reconcile(&mut rt.host, key, def).unwrap();
        assert_eq!(outcome, Reconciled::Skipped);
    }

    #[test]
    fn test_deactivated_patch_applies_on_activation() {
        let (mut rt, body, key) = setup();
        let root = rt.node(key).unwrap().root().unwrap();
        assert!(rt.deactivate(key).unwrap());
        assert!(rt.dom().parent(root).is_none());

        let new = bound(
            &mut rt,
            counter("later ").with_change(ChangeRecord {
                render_changed: false,
                logic_changed: true,
            }),
        );
        rt.apply_update(&[new]).unwrap();
        assert!(rt.node(key).unwrap().has_pending());
        assert_eq!(rt.dom().to_html(root), "<p>0</p>");

        assert!(rt.activate(key).unwrap());
        assert_eq!(rt.dom().children(body), &[root]);
        assert_eq!(rt.dom().to_html(root), "<p>later 0</p>");
        assert!(!rt.node(key).unwrap().has_pending());
    }

    #[test]
    fn test_deactivated_remount_renders_detached() {
        let (mut rt, body, key) = setup();
        rt.deactivate(key).unwrap();
        let anchor = rt.dom().children(body)[0];

        let new = bound(&mut rt, counter("r").with_change(ChangeRecord::full()));
        rt.apply_update(&[new]).unwrap();
        let root = rt.node(key).unwrap().root().unwrap();
        assert!(rt.dom().parent(root).is_none());
        assert_eq!(rt.dom().children(body), &[anchor]);

        rt.activate(key).unwrap();
        assert_eq!(rt.dom().children(body), &[root]);
        assert!(!rt.dom().contains(anchor));
        assert_eq!(rt.dom().to_html(root), "<p>r0</p>");
    }

    #[test]
    fn test_panic_message() {
        let err = guarded::<()>("X", || panic!("boom {}", 1)).unwrap_err();
        assert_eq!(err.to_string(), "`X` panicked: boom 1");
        let err = guarded::<()>("Y", || std::panic::panic_any(7_u8)).unwrap_err();
        assert!(err.to_string().contains("unknown panic"));
    }
}
