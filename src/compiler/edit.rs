//! Span-based text edits.
//!
//! Instrumentation never mutates the AST. It records insertions and
//! replacements against byte offsets of the original source and applies
//! them in one pass. Insertions at the same offset keep the order in which
//! they were recorded.

/// A single edit against the original source.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    start: usize,
    end: usize,
    text: String,
    seq: usize,
}

/// Buffer of non-overlapping edits.
#[derive(Debug, Default)]
pub struct TextEdits {
    edits: Vec<Edit>,
}

impl TextEdits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `text` at byte offset `at`.
    pub fn insert(&mut self, at: u32, text: impl Into<String>) {
        self.replace(at, at, text);
    }

    /// Replace bytes `start..end` with `text`.
    pub fn replace(&mut self, start: u32, end: u32, text: impl Into<String>) {
        let seq = self.edits.len();
        self.edits.push(Edit {
            start: start as usize,
            end: end as usize,
            text: text.into(),
            seq,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Apply every edit to `source`.
    ///
    /// Offsets past the end are clamped; a replacement overlapping an
    /// already applied one is dropped.
    pub fn apply(mut self, source: &str) -> String {
        self.edits.sort_by_key(|e| (e.start, e.seq));

        let added: usize = self.edits.iter().map(|e| e.text.len()).sum();
        let mut out = String::with_capacity(source.len() + added);
        let mut cursor = 0;
        for edit in self.edits {
            let start = edit.start.min(source.len());
            let end = edit.end.min(source.len());
            if start < cursor {
                continue;
            }
            out.push_str(&source[cursor..start]);
            out.push_str(&edit.text);
            cursor = end.max(start);
        }
        out.push_str(&source[cursor..]);
        out
    }
}
