//! Component definitions and construction strategies.
//!
//! A definition is what a module exports. Reloading a module produces new
//! definitions; the identity slot ties them back to the logical component.

use std::cell::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use super::dom::View;
use super::reactive::{Effect, Scope, Signal, StateBag, StateValue};
use crate::classify::ChangeRecord;
use crate::compiler::{ComponentId, DefinitionKind};

/// Render closure returned by a function component body.
pub type RenderFn = Rc<dyn Fn() -> View>;

/// Function component body.
pub type SetupFn = dyn Fn(&mut SetupContext<'_>) -> RenderFn;

/// Class field initializer.
pub type ConstructFn = dyn Fn(&mut ClassInstance, &mut Scope);

/// Class render method.
pub type BuildFn = dyn Fn(&ClassInstance) -> View;

/// Class fields owned by the framework; never copied between instances.
const INTRINSIC_FIELDS: &[&str] = &["props", "children", "el", "node"];

fn is_intrinsic(name: &str) -> bool {
    INTRINSIC_FIELDS.contains(&name) || name.starts_with('$') || name.starts_with('#')
}

/// What a function component body sees while it runs.
pub struct SetupContext<'s> {
    scope: &'s mut Scope,
    restore: Option<&'s StateBag>,
    published: StateBag,
}

impl<'s> SetupContext<'s> {
    pub(crate) fn new(scope: &'s mut Scope, restore: Option<&'s StateBag>) -> Self {
        Self {
            scope,
            restore,
            published: StateBag::new(),
        }
    }

    /// `getState(node, name) ?? init()`; the binding is also captured.
    pub fn state(&mut self, name: &str, init: impl FnOnce() -> StateValue) -> StateValue {
        let value = self
            .restore
            .and_then(|bag| bag.get(name))
            .filter(|v| !v.is_effect())
            .cloned()
            .unwrap_or_else(init);
        self.published.insert(name, value.clone());
        value
    }

    /// Shorthand for a signal-valued state binding.
    pub fn signal(&mut self, name: &str, init: impl Into<Value>) -> Signal {
        match self.state(name, || StateValue::Signal(Signal::new(init))) {
            StateValue::Signal(signal) => signal,
            other => {
                // a previous version stored a plain value under this name
                let signal = Signal::new(other.value().unwrap_or(Value::Null));
                self.published.insert(name, StateValue::Signal(signal.clone()));
                signal
            }
        }
    }

    /// Register an effect owned by the component scope.
    pub fn effect(&mut self, callback: impl Fn() + 'static) -> Effect {
        let effect = Effect::new(callback);
        self.scope.add_effect(effect.clone());
        effect
    }

    pub fn on_cleanup(&mut self, hook: impl FnOnce() + 'static) {
        self.scope.on_cleanup(hook);
    }
}

/// Live instance created from a definition.
pub enum Instance {
    Function { render: RenderFn, state: StateBag },
    Class(ClassInstance),
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function { state, .. } => f.debug_struct("Function").field("state", state).finish(),
            Self::Class(instance) => fmt::Debug::fmt(instance, f),
        }
    }
}

/// Field storage of a class component instance.
#[derive(Debug, Default)]
pub struct ClassInstance {
    fields: BTreeMap<String, StateValue>,
}

impl ClassInstance {
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<StateValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&StateValue> {
        self.fields.get(name)
    }

    pub fn signal(&self, name: &str) -> Option<&Signal> {
        self.get(name).and_then(StateValue::as_signal)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Fields that may move to a new instance.
    fn transferable(&self) -> impl Iterator<Item = (&String, &StateValue)> {
        self.fields
            .iter()
            .filter(|(name, value)| !is_intrinsic(name) && !value.is_effect())
    }
}

/// Per-kind construction, capture, restore and render.
pub trait ComponentStrategy {
    /// Create an instance; `restore` carries state from a previous one.
    fn construct(&self, scope: &mut Scope, restore: Option<&StateBag>) -> Instance;

    /// State that would survive a reload of this instance.
    fn capture(&self, instance: &Instance) -> StateBag;

    /// Copy what the new instance inherits directly from the old one.
    fn restore(&self, instance: &mut Instance, previous: &Instance);

    fn render(&self, instance: &Instance) -> View;
}

#[derive(Clone)]
pub struct FunctionComponent {
    setup: Rc<SetupFn>,
}

impl FunctionComponent {
    pub fn new(setup: impl Fn(&mut SetupContext<'_>) -> RenderFn + 'static) -> Self {
        Self {
            setup: Rc::new(setup),
        }
    }
}

impl ComponentStrategy for FunctionComponent {
    fn construct(&self, scope: &mut Scope, restore: Option<&StateBag>) -> Instance {
        let mut ctx = SetupContext::new(scope, restore);
        let render = (self.setup)(&mut ctx);
        Instance::Function {
            render,
            state: ctx.published,
        }
    }

    fn capture(&self, instance: &Instance) -> StateBag {
        match instance {
            Instance::Function { state, .. } => state.clone(),
            Instance::Class(_) => StateBag::new(),
        }
    }

    /// Function bodies restore through `getState` during construction.
    fn restore(&self, _instance: &mut Instance, _previous: &Instance) {}

    fn render(&self, instance: &Instance) -> View {
        match instance {
            Instance::Function { render, .. } => render(),
            Instance::Class(_) => View::text(""),
        }
    }
}

#[derive(Clone)]
pub struct ClassComponent {
    construct: Rc<ConstructFn>,
    build: Rc<BuildFn>,
}

impl ClassComponent {
    pub fn new(
        construct: impl Fn(&mut ClassInstance, &mut Scope) + 'static,
        build: impl Fn(&ClassInstance) -> View + 'static,
    ) -> Self {
        Self {
            construct: Rc::new(construct),
            build: Rc::new(build),
        }
    }
}

impl ComponentStrategy for ClassComponent {
    fn construct(&self, scope: &mut Scope, restore: Option<&StateBag>) -> Instance {
        let mut instance = ClassInstance::default();
        (self.construct)(&mut instance, scope);
        if let Some(bag) = restore {
            for (name, value) in bag.iter() {
                if !is_intrinsic(name) {
                    instance.fields.insert(name.to_string(), value.clone());
                }
            }
        }
        Instance::Class(instance)
    }

    fn capture(&self, instance: &Instance) -> StateBag {
        let mut bag = StateBag::new();
        if let Instance::Class(instance) = instance {
            for (name, value) in instance.transferable() {
                bag.insert(name.clone(), value.clone());
            }
        }
        bag
    }

    fn restore(&self, instance: &mut Instance, previous: &Instance) {
        let (Instance::Class(instance), Instance::Class(previous)) = (instance, previous) else {
            return;
        };
        for (name, value) in previous.transferable() {
            instance.fields.insert(name.clone(), value.clone());
        }
    }

    fn render(&self, instance: &Instance) -> View {
        match instance {
            Instance::Class(instance) => (self.build)(instance),
            Instance::Function { .. } => View::text(""),
        }
    }
}

#[derive(Clone)]
pub enum ComponentKind {
    Function(FunctionComponent),
    Class(ClassComponent),
}

impl ComponentKind {
    pub fn strategy(&self) -> &dyn ComponentStrategy {
        match self {
            Self::Function(component) => component,
            Self::Class(component) => component,
        }
    }

    pub fn tag(&self) -> DefinitionKind {
        match self {
            Self::Function(_) => DefinitionKind::Function,
            Self::Class(_) => DefinitionKind::Class,
        }
    }
}

/// A component definition as exported by one version of a module.
pub struct ComponentDef {
    name: String,
    identity: OnceCell<ComponentId>,
    module: OnceCell<String>,
    kind: ComponentKind,
    source: Option<Rc<str>>,
    change: Option<ChangeRecord>,
}

impl ComponentDef {
    pub fn new(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            name: name.into(),
            identity: OnceCell::new(),
            module: OnceCell::new(),
            kind,
            source: None,
            change: None,
        }
    }

    pub fn function(
        name: impl Into<String>,
        setup: impl Fn(&mut SetupContext<'_>) -> RenderFn + 'static,
    ) -> Self {
        Self::new(name, ComponentKind::Function(FunctionComponent::new(setup)))
    }

    pub fn class(name: impl Into<String>, component: ClassComponent) -> Self {
        Self::new(name, ComponentKind::Class(component))
    }

    /// Attach the definition's source text for runtime classification.
    pub fn with_source(mut self, source: impl Into<Rc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach the change record computed at build time.
    pub fn with_change(mut self, change: ChangeRecord) -> Self {
        self.change = Some(change);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identity(&self) -> Option<&ComponentId> {
        self.identity.get()
    }

    pub fn module(&self) -> Option<&str> {
        self.module.get().map(String::as_str)
    }

    /// Embed identity and module path. Write-once: returns `false` and keeps
    /// the existing values if the definition is already bound.
    pub(crate) fn bind(&self, id: ComponentId, module: &str) -> bool {
        if self.identity.set(id).is_err() {
            return false;
        }
        // identity and module are bound together
        let _ = self.module.set(module.to_string());
        true
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn strategy(&self) -> &dyn ComponentStrategy {
        self.kind.strategy()
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn change(&self) -> Option<ChangeRecord> {
        self.change
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("name", &self.name)
            .field("identity", &self.identity.get())
            .field("module", &self.module.get())
            .field("kind", &self.kind.tag())
            .finish_non_exhaustive()
    }
}
