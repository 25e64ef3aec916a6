//! Change classification between two versions of a component definition.
//!
//! A definition is split into its render-construction calls and the
//! remaining logic; each half is compared independently:
//!
//! | render changed | logic changed | runtime strategy                       |
//! |----------------|---------------|----------------------------------------|
//! | no             | any           | incremental patch (DOM kept)           |
//! | yes            | no            | full remount, captured state restored  |
//! | yes            | yes           | full remount, fresh state              |

pub mod history;
mod split;

pub use history::ChangeTracker;
pub use split::{Split, default_source_type, source_type_for};
pub(crate) use split::callee_name;

use oxc::span::SourceType;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClassifyConfig;

/// Which halves of a definition changed between two versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub render_changed: bool,
    pub logic_changed: bool,
}

impl ChangeRecord {
    pub const fn unchanged() -> Self {
        Self {
            render_changed: false,
            logic_changed: false,
        }
    }

    /// Everything changed; nothing may be reused.
    pub const fn full() -> Self {
        Self {
            render_changed: true,
            logic_changed: true,
        }
    }

    pub const fn is_unchanged(&self) -> bool {
        !self.render_changed && !self.logic_changed
    }

    /// Captured state may be carried into the new instance.
    pub const fn keeps_state(&self) -> bool {
        !self.logic_changed
    }
}

/// Classification failures. A definition that does not parse is always an
/// error, never "no change".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("new source failed to parse: {0}")]
    NewSource(String),

    #[error("previous source failed to parse: {0}")]
    OldSource(String),
}

/// Splits definitions on a configurable set of render-construction callees.
#[derive(Debug, Clone)]
pub struct Classifier {
    render_callees: FxHashSet<String>,
}

impl Classifier {
    pub fn new<I, S>(render_callees: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            render_callees: render_callees.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &ClassifyConfig) -> Self {
        Self::new(config.render_callees.iter().cloned())
    }

    /// Compare two definitions of the same component, parsed as module
    /// JavaScript with JSX.
    pub fn classify(&self, new_source: &str, old_source: &str) -> Result<ChangeRecord, ClassifyError> {
        self.classify_as(new_source, old_source, default_source_type())
    }

    /// [`Self::classify`] for definitions taken from a module of `source_type`.
    pub fn classify_as(
        &self,
        new_source: &str,
        old_source: &str,
        source_type: SourceType,
    ) -> Result<ChangeRecord, ClassifyError> {
        let new = self.split_as(new_source, source_type).map_err(ClassifyError::NewSource)?;
        let old = self.split_as(old_source, source_type).map_err(ClassifyError::OldSource)?;
        Ok(ChangeRecord {
            render_changed: new.render != old.render,
            logic_changed: new.logic != old.logic,
        })
    }

    /// Normalized render fragments and logic text of one definition.
    pub fn split(&self, source: &str) -> Result<Split, String> {
        self.split_as(source, default_source_type())
    }

    pub fn split_as(&self, source: &str, source_type: SourceType) -> Result<Split, String> {
        split::split(source, &self.render_callees, source_type)
    }

    pub fn is_render_callee(&self, name: &str) -> bool {
        split::is_render_callee(name, &self.render_callees)
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_config(&ClassifyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(["view", "jsx"])
    }

    #[test]
    fn test_identical_after_formatting() {
        let old = "function Counter(){ const n = ref(1); return view(n) }";
        let new = "function Counter() {\n  // counter state\n  const n = ref(1);\n\n  return view( n );\n}";
        assert_eq!(classifier().classify(new, old).unwrap(), ChangeRecord::unchanged());
    }

    #[test]
    fn test_render_argument_change_keeps_logic() {
        let old = "function Counter(){ const n = ref(1); return view(n) }";
        let new = "function Counter(){ const n = ref(1); return view(n, 'bold') }";
        let change = classifier().classify(new, old).unwrap();
        assert!(change.render_changed);
        assert!(!change.logic_changed);
        assert!(change.keeps_state());
    }

    #[test]
    fn test_render_and_logic_change() {
        let old = "function Counter(){ const n = ref(1); return view(n) }";
        let new = "function Counter(){ const n = ref(2); return view(n, 'bold') }";
        assert_eq!(classifier().classify(new, old).unwrap(), ChangeRecord::full());
    }

    #[test]
    fn test_added_state_is_logic_change() {
        let old = "function Counter(){ const n = ref(1); return view(n) }";
        let new = "function Counter(){ const n = ref(1); const m = ref(2); return view(n) }";
        let change = classifier().classify(new, old).unwrap();
        assert!(!change.render_changed);
        assert!(change.logic_changed);
        assert!(!change.keeps_state());
    }

    #[test]
    fn test_nested_render_change_is_render_change() {
        let old = r#"function A(){ return jsx("div", { children: jsx("b", {}) }) }"#;
        let new = r#"function A(){ return jsx("div", { children: jsx("i", {}) }) }"#;
        let change = classifier().classify(new, old).unwrap();
        assert!(change.render_changed);
        assert!(!change.logic_changed);
    }

    #[test]
    fn test_no_render_calls() {
        let old = "function Value(){ return 1 }";
        let new = "function Value(){ return 2 }";
        let change = classifier().classify(new, old).unwrap();
        assert!(!change.render_changed);
        assert!(change.logic_changed);
    }

    #[test]
    fn test_render_call_added_to_plain_component() {
        let old = "function Value(){ return 1 }";
        let new = "function Value(){ return view(1) }";
        assert!(classifier().classify(new, old).unwrap().render_changed);
    }

    #[test]
    fn test_class_definitions() {
        let old = "class Panel { title = 'a'; build() { return view(this.title) } }";
        let new = "class Panel { title = 'a'; build() { return view(this.title, 1) } }";
        let change = classifier().classify(new, old).unwrap();
        assert!(change.render_changed);
        assert!(!change.logic_changed);
    }

    #[test]
    fn test_unparseable_new_source_is_error() {
        let old = "function A(){ return view(1) }";
        let err = classifier().classify("function A(){ return view(1", old).unwrap_err();
        assert!(matches!(err, ClassifyError::NewSource(_)));
        assert!(err.to_string().contains("new source"));
    }

    #[test]
    fn test_unparseable_old_source_is_error() {
        let new = "function A(){ return view(1) }";
        let err = classifier().classify(new, "function A(){ return").unwrap_err();
        assert!(matches!(err, ClassifyError::OldSource(_)));
    }

    #[test]
    fn test_change_record_serializes_camel_case() {
        let json = serde_json::to_string(&ChangeRecord::full()).unwrap();
        assert_eq!(json, r#"{"renderChanged":true,"logicChanged":true}"#);
    }

    #[test]
    fn test_underscore_prefixed_callee() {
        assert!(classifier().is_render_callee("_jsx"));
        assert!(!classifier().is_render_callee("ref"));
    }

    #[test]
    fn test_jsx_markup_change_is_render_change() {
        let old = "function Counter(){ const n = ref(1); return <i>{n}</i> }";
        let new = "function Counter(){ const n = ref(1); return <b>{n}</b> }";
        let change = Classifier::default().classify(new, old).unwrap();
        assert!(change.render_changed);
        assert!(!change.logic_changed);
    }

    #[test]
    fn test_jsx_logic_change_outside_markup() {
        let old = "function Counter(){ const n = ref(1); return <b>{n}</b> }";
        let new = "function Counter(){ const n = ref(2); return <b>{n}</b> }";
        let change = Classifier::default().classify(new, old).unwrap();
        assert!(!change.render_changed);
        assert!(change.logic_changed);
    }

    #[test]
    fn test_typescript_pair() {
        let old = r#"function A(props: { n: number }) { const n = ref(1); return jsx("a", {}) }"#;
        let new = r#"function A(props: { n: number }) { const n = ref(1); return jsx("b", {}) }"#;
        let ts = source_type_for("src/A.tsx");

        let change = classifier().classify_as(new, old, ts).unwrap();
        assert!(change.render_changed);
        assert!(!change.logic_changed);
        assert!(matches!(classifier().classify(new, old), Err(ClassifyError::NewSource(_))));
    }
}
