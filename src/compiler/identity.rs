//! Stable component identities.
//!
//! A component's function or class object is recreated on every module
//! reload, so it cannot be used as a key. The identity is derived from the
//! export site instead: `blake3("{module path}_{export name}")`.
//!
//! Short (16 hex chars) identities are used unless two different sites hash
//! to the same prefix within this process, in which case the later site gets
//! the full 64-char digest.

use std::fmt;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

const SHORT_LEN: usize = 16;

/// Stable key of one logical component, surviving module reloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Export site: normalized module path plus export name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Site {
    module: String,
    export: String,
}

/// Memoizing identity assigner.
///
/// Deterministic for a given site, unique across every site it has seen.
#[derive(Debug, Default)]
pub struct IdentityAssigner {
    by_site: FxHashMap<Site, ComponentId>,
    by_id: FxHashMap<ComponentId, Site>,
}

impl IdentityAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity of `export` in the module at `module_path`.
    pub fn assign(&mut self, module_path: &str, export: &str) -> ComponentId {
        let site = Site {
            module: normalize_module_path(module_path),
            export: export.to_string(),
        };
        if let Some(id) = self.by_site.get(&site) {
            return id.clone();
        }

        let digest = digest(&site);
        let short = ComponentId(digest[..SHORT_LEN].to_string());
        let id = match self.by_id.get(&short) {
            Some(other) if *other != site => {
                crate::debug!("compile"; "identity prefix collision for {}#{}", site.module, site.export);
                ComponentId(digest)
            }
            _ => short,
        };

        self.by_id.insert(id.clone(), site.clone());
        self.by_site.insert(site, id.clone());
        id
    }

    /// Number of distinct sites seen.
    pub fn len(&self) -> usize {
        self.by_site.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_site.is_empty()
    }
}

/// Identity for a site without memoization (same digest as the assigner).
pub fn identity_of(module_path: &str, export: &str) -> ComponentId {
    let site = Site {
        module: normalize_module_path(module_path),
        export: export.to_string(),
    };
    ComponentId(digest(&site)[..SHORT_LEN].to_string())
}

fn digest(site: &Site) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(site.module.as_bytes());
    hasher.update(b"_");
    hasher.update(site.export.as_bytes());
    hex::encode(hasher.finalize().as_bytes())
}

/// Forward slashes, no leading `./`, so the same file yields the same
/// identity on every platform.
pub fn normalize_module_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

/// Module path of `file` relative to `root` (falls back to the full path).
pub fn module_path(file: &Path, root: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    normalize_module_path(&relative.to_string_lossy())
}
