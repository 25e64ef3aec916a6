//! Minimal reactive primitives.
//!
//! Just enough of a reactive system to exercise state preservation: shared
//! signals, effects that can be stopped, scopes that own effects and cleanup
//! hooks, and the captured-state bag.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// Observable value shared by reference. Cloning shares the same cell.
#[derive(Clone)]
pub struct Signal {
    value: Rc<RefCell<Value>>,
    subscribers: Rc<RefCell<Vec<Effect>>>,
}

impl Signal {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: Rc::new(RefCell::new(value.into())),
            subscribers: Rc::default(),
        }
    }

    pub fn get(&self) -> Value {
        self.value.borrow().clone()
    }

    /// Store a new value and run every active subscriber.
    pub fn set(&self, value: impl Into<Value>) {
        *self.value.borrow_mut() = value.into();
        self.subscribers.borrow_mut().retain(Effect::is_active);
        let subscribers = self.subscribers.borrow().clone();
        for effect in subscribers {
            effect.run();
        }
    }

    pub fn subscribe(&self, effect: &Effect) {
        self.subscribers.borrow_mut().push(effect.clone());
    }

    /// Whether both handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.value, &other.value)
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Signal").field(&*self.value.borrow()).finish()
    }
}

struct EffectInner {
    active: Cell<bool>,
    runs: Cell<usize>,
    callback: Box<dyn Fn()>,
}

/// Side-effect subscription. Stopped effects never run again.
#[derive(Clone)]
pub struct Effect(Rc<EffectInner>);

impl Effect {
    pub fn new(callback: impl Fn() + 'static) -> Self {
        Self(Rc::new(EffectInner {
            active: Cell::new(true),
            runs: Cell::new(0),
            callback: Box::new(callback),
        }))
    }

    pub fn run(&self) {
        if self.is_active() {
            self.0.runs.set(self.0.runs.get() + 1);
            (self.0.callback)();
        }
    }

    pub fn stop(&self) {
        self.0.active.set(false);
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    /// How many times the callback ran.
    pub fn runs(&self) -> usize {
        self.0.runs.get()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("active", &self.is_active())
            .field("runs", &self.runs())
            .finish()
    }
}

/// A value a component body can hold in a local binding.
#[derive(Debug, Clone)]
pub enum StateValue {
    Value(Value),
    Signal(Signal),
    Effect(Effect),
}

impl StateValue {
    pub fn is_effect(&self) -> bool {
        matches!(self, Self::Effect(_))
    }

    pub fn as_signal(&self) -> Option<&Signal> {
        match self {
            Self::Signal(signal) => Some(signal),
            _ => None,
        }
    }

    /// Current plain value (signals are read through).
    pub fn value(&self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value.clone()),
            Self::Signal(signal) => Some(signal.get()),
            Self::Effect(_) => None,
        }
    }
}

impl From<Value> for StateValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Signal> for StateValue {
    fn from(signal: Signal) -> Self {
        Self::Signal(signal)
    }
}

/// Ordered name -> value map of captured state. Effects are never stored.
#[derive(Debug, Clone, Default)]
pub struct StateBag {
    entries: Vec<(String, StateValue)>,
}

impl StateBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `name`. Effect values are ignored.
    pub fn insert(&mut self, name: impl Into<String>, value: StateValue) {
        if value.is_effect() {
            return;
        }
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StateValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StateValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owns the effects and cleanup hooks of one component instance.
#[derive(Default)]
pub struct Scope {
    effects: Vec<Effect>,
    cleanups: Vec<Box<dyn FnOnce()>>,
    disposed: bool,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn on_cleanup(&mut self, hook: impl FnOnce() + 'static) {
        self.cleanups.push(Box::new(hook));
    }

    /// Stop every effect and run cleanup hooks in reverse registration order.
    pub fn dispose(&mut self) {
        for effect in self.effects.drain(..) {
            effect.stop();
        }
        while let Some(hook) = self.cleanups.pop() {
            hook();
        }
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("effects", &self.effects.len())
            .field("cleanups", &self.cleanups.len())
            .field("disposed", &self.disposed)
            .finish()
    }
}
