//! Module Manager
//!
//! Tracks which live nodes render which logical component and routes a
//! reloaded module's exports to them.
//!
//! The manager never owns nodes or definitions: the registry stores arena
//! keys (stale keys are pruned on access) and the definition cache stores
//! `Weak` references.

use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use super::Host;
use super::component::ComponentDef;
use super::node::{ComponentNode, Lifecycle, NodeKey, Nodes};
use super::reactive::StateValue;
use super::reconcile::{Reconciled, Reconciler};
use crate::classify::Classifier;
use crate::compiler::ComponentId;
use crate::{debug, log};

// =============================================================================
// Update Results
// =============================================================================

/// Counts of a successfully applied module update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub patched: usize,
    pub remounted: usize,
    pub skipped: usize,
}

impl UpdateSummary {
    fn record(&mut self, outcome: Reconciled) {
        match outcome {
            Reconciled::Patched => self.patched += 1,
            Reconciled::Remounted => self.remounted += 1,
            Reconciled::Skipped => self.skipped += 1,
        }
    }
}

/// The update could not be applied in place; the host should reload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ReloadRequired {
    pub reason: String,
}

impl ReloadRequired {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Module Manager
// =============================================================================

type Registry = FxHashMap<ComponentId, BTreeSet<NodeKey>>;

pub struct ModuleManager {
    classifier: Classifier,
    registry: Registry,
    definitions: FxHashMap<ComponentId, Weak<ComponentDef>>,
    modules: FxHashMap<ComponentId, String>,
}

impl ModuleManager {
    pub fn new(classifier: Classifier) -> Self {
        Self {
            classifier,
            registry: Registry::default(),
            definitions: FxHashMap::default(),
            modules: FxHashMap::default(),
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Embed `id` into `def` (write-once) and remember where it lives.
    pub fn bind_id(&mut self, def: &Rc<ComponentDef>, id: ComponentId, module: &str) {
        if !def.bind(id, module) {
            debug!("hmr"; "`{}` is already bound, keeping its identity", def.name());
        }
        if let Some(id) = def.identity() {
            self.modules
                .insert(id.clone(), def.module().unwrap_or(module).to_string());
            self.definitions.insert(id.clone(), Rc::downgrade(def));
        }
    }

    /// Identity embedded in `def`, if any.
    pub fn module_id<'d>(&self, def: &'d ComponentDef) -> Option<&'d ComponentId> {
        def.identity()
    }

    /// Module path an identity was last bound from.
    pub fn module_of(&self, id: &ComponentId) -> Option<&str> {
        self.modules.get(id).map(String::as_str)
    }

    /// Track `key` under `identity` (defaults to the node's definition).
    ///
    /// Returns whether the node was newly added; registering twice is a no-op.
    pub fn register(&mut self, nodes: &Nodes, key: NodeKey, identity: Option<&ComponentId>) -> bool {
        let Some(node) = nodes.get(key) else {
            return false;
        };
        let Some(id) = identity.or_else(|| node.def.identity()) else {
            return false;
        };
        self.registry.entry(id.clone()).or_default().insert(key)
    }

    pub fn unregister(&mut self, key: NodeKey, identity: &ComponentId) -> bool {
        unregister(&mut self.registry, key, identity)
    }

    pub fn is_registered(&self, key: NodeKey, identity: &ComponentId) -> bool {
        self.registry
            .get(identity)
            .is_some_and(|keys| keys.contains(&key))
    }

    /// Live nodes registered under `identity`.
    pub fn nodes_of(&mut self, nodes: &Nodes, identity: &ComponentId) -> Vec<NodeKey> {
        live_nodes(&mut self.registry, nodes, identity)
    }

    /// Captured state `name` of `node`; effects never come back.
    pub fn get_state(&self, node: &ComponentNode, name: &str) -> Option<StateValue> {
        node.state
            .as_ref()?
            .get(name)
            .filter(|value| !value.is_effect())
            .cloned()
    }

    /// Newest known definition with the same identity as `def`.
    pub fn resolve(&self, def: &Rc<ComponentDef>) -> Rc<ComponentDef> {
        def.identity()
            .and_then(|id| self.definitions.get(id))
            .and_then(Weak::upgrade)
            .unwrap_or_else(|| Rc::clone(def))
    }

    /// Apply a reloaded module's exports to every live node they render.
    ///
    /// Nodes are reconciled one at a time; a failing node does not stop the
    /// others. Any failure, a removed component or an update touching no
    /// mounted component yields [`ReloadRequired`].
    pub fn update(&mut self, host: &mut Host, exports: &[Rc<ComponentDef>]) -> Result<UpdateSummary, ReloadRequired> {
        let module = exports
            .iter()
            .find_map(|def| def.module())
            .map(str::to_string);
        let exported: FxHashSet<&ComponentId> = exports.iter().filter_map(|def| def.identity()).collect();

        let Self {
            classifier,
            registry,
            definitions,
            modules,
        } = self;

        let mut reasons = Vec::new();
        if let Some(module) = &module {
            let mut removed: Vec<String> = modules
                .iter()
                .filter(|(id, m)| *m == module && !exported.contains(id))
                .map(|(id, _)| id.clone())
                .collect::<Vec<_>>()
                .into_iter()
                .filter(|id| !live_nodes(registry, &host.nodes, id).is_empty())
                .map(|id| {
                    let name = definitions
                        .get(&id)
                        .and_then(Weak::upgrade)
                        .map_or_else(|| id.to_string(), |def| def.name().to_string());
                    format!("component `{name}` removed from module `{module}`")
                })
                .collect();
            removed.sort();
            reasons.extend(removed);
        }

        let reconciler = Reconciler::new(classifier);
        let mut summary = UpdateSummary::default();
        let mut matched = false;
        for def in exports {
            let Some(id) = def.identity() else {
                continue;
            };
            definitions.insert(id.clone(), Rc::downgrade(def));
            if let Some(m) = def.module() {
                modules.insert(id.clone(), m.to_string());
            }

            let keys = live_nodes(registry, &host.nodes, id);
            matched |= !keys.is_empty();
            for key in keys {
                match reconciler.reconcile(host, key, Rc::clone(def)) {
                    Ok(outcome) => summary.record(outcome),
                    Err(err) => {
                        log!("hmr"; "failed to update `{}` ({}): {}", def.name(), id, err);
                        let unloaded = host
                            .nodes
                            .get(key)
                            .is_none_or(|node| node.lifecycle == Lifecycle::Unloaded);
                        if unloaded {
                            unregister(registry, key, id);
                        }
                        reasons.push(format!("`{}` failed to update: {err}", def.name()));
                    }
                }
            }
        }

        if !matched && reasons.is_empty() {
            let module = module.as_deref().unwrap_or("<unbound>");
            return Err(ReloadRequired::new(format!(
                "no mounted component in module `{module}`"
            )));
        }
        if !reasons.is_empty() {
            return Err(ReloadRequired::new(reasons.join("; ")));
        }

        debug!(
            "hmr";
            "{} patched, {} remounted, {} skipped",
            summary.patched, summary.remounted, summary.skipped
        );
        Ok(summary)
    }
}

/// Registered keys that still resolve to a live node; stale ones are dropped.
fn live_nodes(registry: &mut Registry, nodes: &Nodes, identity: &ComponentId) -> Vec<NodeKey> {
    let Some(keys) = registry.get_mut(identity) else {
        return Vec::new();
    };
    keys.retain(|&key| {
        nodes
            .get(key)
            .is_some_and(|node| node.lifecycle != Lifecycle::Unloaded)
    });
    let live: Vec<NodeKey> = keys.iter().copied().collect();
    if live.is_empty() {
        registry.remove(identity);
    }
    live
}

fn unregister(registry: &mut Registry, key: NodeKey, identity: &ComponentId) -> bool {
    let Some(keys) = registry.get_mut(identity) else {
        return false;
    };
    let removed = keys.remove(&key);
    if keys.is_empty() {
        registry.remove(identity);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::dom::View;
    use crate::runtime::reactive::{Effect, Signal};
    use crate::runtime::Runtime;
    use serde_json::json;

    const MODULE: &str = "src/Counter.tsx";

    fn counter() -> ComponentDef {
        ComponentDef::function("Counter", |cx| {
            let n = cx.signal("n", 1);
            cx.state("ticker", || StateValue::Effect(Effect::new(|| {})));
            Rc::new(move || View::text(n.get().to_string()))
        })
    }

    fn runtime() -> Runtime {
        Runtime::new(Classifier::default())
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut rt = runtime();
        let body = rt.dom_mut().create_element("body");
        let def = Rc::new(counter());
        rt.bind_id(&def, ComponentId::from("c"), MODULE);
        let key = rt.mount(&def, body).unwrap();

        let id = ComponentId::from("c");
        // mount already registered the node
        assert!(rt.manager().is_registered(key, &id));
        let Runtime { host, manager } = &mut rt;
        assert!(!manager.register(&host.nodes, key, None));
        assert!(!manager.register(&host.nodes, key, Some(&id)));
        assert_eq!(manager.nodes_of(&host.nodes, &id), vec![key]);

        assert!(manager.unregister(key, &id));
        assert!(!manager.unregister(key, &id));
    }

    #[test]
    fn test_unbound_definitions_are_not_registered() {
        let mut rt = runtime();
        let body = rt.dom_mut().create_element("body");
        let def = Rc::new(counter());
        let key = rt.mount(&def, body).unwrap();
        let Runtime { host, manager } = &mut rt;
        assert!(!manager.register(&host.nodes, key, None));
        assert!(manager.module_id(&def).is_none());
    }

    #[test]
    fn test_get_state_round_trip() {
        let mut rt = runtime();
        let body = rt.dom_mut().create_element("body");
        let def = Rc::new(counter());
        let key = rt.mount(&def, body).unwrap();

        let node = rt.node(key).unwrap();
        let n = rt.manager().get_state(node, "n").unwrap();
        let signal: &Signal = n.as_signal().unwrap();
        assert_eq!(signal.get(), json!(1));
        // effects are never captured
        assert!(rt.manager().get_state(node, "ticker").is_none());
        assert!(rt.manager().get_state(node, "missing").is_none());
    }

    #[test]
    fn test_bind_id_and_resolve() {
        let mut manager = ModuleManager::new(Classifier::default());
        let old = Rc::new(counter());
        let new = Rc::new(counter());
        let id = ComponentId::from("c");
        manager.bind_id(&old, id.clone(), MODULE);
        assert_eq!(manager.module_id(&old), Some(&id));
        assert_eq!(manager.module_of(&id), Some(MODULE));
        assert!(Rc::ptr_eq(&manager.resolve(&old), &old));

        manager.bind_id(&new, id.clone(), MODULE);
        assert!(Rc::ptr_eq(&manager.resolve(&old), &new));

        // write-once: rebinding keeps the original identity
        manager.bind_id(&new, ComponentId::from("other"), "src/Other.tsx");
        assert_eq!(new.identity(), Some(&id));

        // cache is weak
        drop(new);
        assert!(Rc::ptr_eq(&manager.resolve(&old), &old));
    }

    #[test]
    fn test_mount_uses_latest_definition() {
        let mut rt = runtime();
        let body = rt.dom_mut().create_element("body");
        let old = Rc::new(counter());
        rt.bind_id(&old, ComponentId::from("c"), MODULE);
        let new = Rc::new(ComponentDef::function("Counter", |_| Rc::new(|| View::text("new"))));
        rt.bind_id(&new, ComponentId::from("c"), MODULE);

        let key = rt.mount(&old, body).unwrap();
        let node = rt.node(key).unwrap();
        assert!(Rc::ptr_eq(node.def(), &new));
        assert_eq!(rt.dom().to_html(node.root().unwrap()), "new");
    }

    #[test]
    fn test_unmatched_update_requires_reload_without_dom_change() {
        let mut rt = runtime();
        let body = rt.dom_mut().create_element("body");
        let mounted = Rc::new(counter());
        rt.bind_id(&mounted, ComponentId::from("c"), MODULE);
        rt.mount(&mounted, body).unwrap();
        let before = rt.dom().to_html(body);
        let elements = rt.dom().len();

        let unrelated = Rc::new(counter());
        rt.bind_id(&unrelated, ComponentId::from("u"), "src/Unrelated.tsx");
        let err = rt.apply_update(&[unrelated]).unwrap_err();
        assert_eq!(err.reason, "no mounted component in module `src/Unrelated.tsx`");
        assert_eq!(rt.dom().to_html(body), before);
        assert_eq!(rt.dom().len(), elements);

        let err = rt.apply_update(&[]).unwrap_err();
        assert!(err.reason.contains("no mounted component"));
    }

    #[test]
    fn test_removed_component_requires_reload() {
        let mut rt = runtime();
        let body = rt.dom_mut().create_element("body");
        let a = Rc::new(counter());
        let b = Rc::new(ComponentDef::function("Badge", |_| Rc::new(|| View::text("b"))));
        rt.bind_id(&a, ComponentId::from("a"), MODULE);
        rt.bind_id(&b, ComponentId::from("b"), MODULE);
        rt.mount(&a, body).unwrap();
        rt.mount(&b, body).unwrap();

        let a2 = Rc::new(counter());
        rt.bind_id(&a2, ComponentId::from("a"), MODULE);
        let err = rt.apply_update(&[a2]).unwrap_err();
        assert_eq!(
            err.reason,
            format!("component `Badge` removed from module `{MODULE}`")
        );
    }

    #[test]
    fn test_unmount_unregisters() {
        let mut rt = runtime();
        let body = rt.dom_mut().create_element("body");
        let def = Rc::new(counter());
        let id = ComponentId::from("c");
        rt.bind_id(&def, id.clone(), MODULE);
        let key = rt.mount(&def, body).unwrap();

        assert!(rt.unmount(key));
        assert!(!rt.manager().is_registered(key, &id));
        assert!(rt.node(key).is_none());
        assert!(rt.dom().children(body).is_empty());
        assert!(!rt.unmount(key));
    }
}
