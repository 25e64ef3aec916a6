//! Build-time change history.
//!
//! Keeps the previous build's definition text per component identity so the
//! classification happens while compiling and only the resulting
//! [`ChangeRecord`] is shipped to the running application.

use oxc::span::SourceType;
use rustc_hash::FxHashMap;

use super::{ChangeRecord, Classifier, ClassifyError};
use crate::compiler::ComponentId;

/// Previous-build source text per component identity.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    previous: FxHashMap<ComponentId, String>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current definition of `id` and compare it with the last one,
    /// parsing both as `source_type`.
    ///
    /// Returns `Ok(None)` the first time an identity is seen. A definition
    /// that fails to parse is not recorded, so the next good build is still
    /// compared against the last good one.
    pub fn observe(
        &mut self,
        classifier: &Classifier,
        id: &ComponentId,
        source: &str,
        source_type: SourceType,
    ) -> Result<Option<ChangeRecord>, ClassifyError> {
        let change = match self.previous.get(id) {
            Some(old) if old == source => Some(ChangeRecord::unchanged()),
            Some(old) => Some(classifier.classify_as(source, old, source_type)?),
            None => None,
        };
        self.previous.insert(id.clone(), source.to_string());
        Ok(change)
    }

    /// Forget a component (its module was deleted).
    pub fn forget(&mut self, id: &ComponentId) -> bool {
        self.previous.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }
}
