//! Configuration sections of `hotswap.toml`.
//!
//! # Example
//!
//! ```toml
//! [instrument]
//! client_module = "@hotswap/client"   # module exporting the manager
//! runtime_module = "vitarx"           # module exporting getCurrentNode
//! current_node_fn = "getCurrentNode"
//! render_method = "build"             # class components must define it
//! state_constructors = ["ref", "reactive"]
//!
//! [classify]
//! render_callees = ["jsx", "jsxs", "jsxDEV"]
//!
//! [watch]
//! root = "src"
//! out_dir = ".hotswap"
//! extensions = ["jsx", "tsx"]
//! debounce_ms = 300
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// `[instrument]` section: names used by the injected code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Module the injected `manager` import is taken from.
    pub client_module: String,

    /// Module that exports the current-node accessor.
    pub runtime_module: String,

    /// Name of the function returning the currently rendering node.
    pub current_node_fn: String,

    /// Method a class must define to count as a component.
    pub render_method: String,

    /// Calls whose results are captured and restored across reloads.
    pub state_constructors: Vec<String>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            client_module: "@hotswap/client".into(),
            runtime_module: "vitarx".into(),
            current_node_fn: "getCurrentNode".into(),
            render_method: "build".into(),
            state_constructors: ["ref", "shallowRef", "reactive", "shallowReactive", "signal"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// `[classify]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Callee names that construct render tree nodes.
    pub render_callees: Vec<String>,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            render_callees: ["jsx", "jsxs", "jsxDEV", "createElement", "h"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// `[watch]` section: development watcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Source directory to watch (relative to the config file).
    pub root: PathBuf,

    /// Where instrumented files are written, mirroring `root`.
    pub out_dir: PathBuf,

    /// File extensions that are instrumented.
    pub extensions: Vec<String>,

    /// Quiet period before a batch of changes is processed.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("src"),
            out_dir: PathBuf::from(".hotswap"),
            extensions: ["jsx", "tsx", "js", "ts"].map(String::from).to_vec(),
            debounce_ms: 300,
        }
    }
}

impl WatchConfig {
    /// Check whether a path has one of the watched extensions.
    pub fn accepts(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e == ext))
    }
}
