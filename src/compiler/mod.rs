//! Build-side pipeline: instrumentation plus build-time change classification.
//!
//! ```text
//! file ──hash──► unchanged? ──► skip
//!                    │
//!                    └─► Instrumentor ──► ChangeTracker.observe ──► bindId(.., change)
//!                                                                        │
//!                                                            out_dir/<relative path>
//! ```
//!
//! A module that fails to parse is written through unmodified so the dev
//! server still serves it and reports the syntax error itself.

pub mod edit;
pub mod identity;
pub mod inject;
pub mod instrument;
pub mod scan;

pub use identity::{ComponentId, IdentityAssigner};
pub use instrument::{InstrumentError, Instrumented, InstrumentedComponent, Instrumentor};
pub use scan::DefinitionKind;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::classify::{ChangeTracker, Classifier};
use crate::config::{HotswapConfig, WatchConfig};
use crate::log;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to read `{0}`")]
    Read(PathBuf, #[source] io::Error),

    #[error("failed to write `{0}`")]
    Write(PathBuf, #[source] io::Error),
}

/// What happened to one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// Instrumented output written.
    Written {
        output: PathBuf,
        components: usize,
    },
    /// Content identical to the last build; nothing written.
    Unchanged,
    /// Parse failure; the original text was copied through.
    PassedThrough { output: PathBuf, reason: String },
    /// Source deleted; output removed.
    Removed { output: PathBuf },
}

/// Stateful compiler for one project, shared by every build of a session.
pub struct Compiler {
    root: PathBuf,
    source_root: PathBuf,
    out_dir: PathBuf,
    watch: WatchConfig,
    instrumentor: Instrumentor,
    classifier: Classifier,
    tracker: ChangeTracker,
    hashes: FxHashMap<PathBuf, blake3::Hash>,
    modules: FxHashMap<PathBuf, Vec<ComponentId>>,
}

impl Compiler {
    pub fn new(config: &HotswapConfig) -> Self {
        Self {
            root: config.root.clone(),
            source_root: config.watch_root(),
            out_dir: config.out_dir(),
            watch: config.watch.clone(),
            instrumentor: Instrumentor::from_config(config),
            classifier: Classifier::from_config(&config.classify),
            tracker: ChangeTracker::new(),
            hashes: FxHashMap::default(),
            modules: FxHashMap::default(),
        }
    }

    /// Whether `path` is a source file this compiler handles.
    pub fn accepts(&self, path: &Path) -> bool {
        self.watch.accepts(path) && path.starts_with(&self.source_root) && !path.starts_with(&self.out_dir)
    }

    /// Output location of `path`, mirroring the source tree under `out_dir`.
    pub fn output_path(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix(&self.source_root).unwrap_or(path);
        let relative = relative.strip_prefix("/").unwrap_or(relative);
        self.out_dir.join(relative)
    }

    /// Module path used for identities (relative to the project root).
    pub fn module_path(&self, path: &Path) -> String {
        identity::module_path(path, &self.root)
    }

    /// Instrument a module's text, classifying each component against the
    /// previous build. Classification failures are logged and shipped as
    /// "no record" so the runtime falls back to a full remount.
    pub fn compile_source(&mut self, source: &str, module_path: &str) -> Result<Instrumented, InstrumentError> {
        let Self {
            instrumentor,
            classifier,
            tracker,
            ..
        } = self;
        let source_type = crate::classify::source_type_for(module_path);
        instrumentor.instrument_with(source, module_path, |id, definition| {
            match tracker.observe(classifier, id, definition, source_type) {
                Ok(change) => change,
                Err(err) => {
                    log!("compile"; "cannot classify {} in {}: {}", id, module_path, err);
                    None
                }
            }
        })
    }

    /// Compile one file on disk and write its output.
    pub fn compile_file(&mut self, path: &Path) -> Result<CompileOutcome, CompileError> {
        let source = fs::read_to_string(path).map_err(|err| CompileError::Read(path.to_path_buf(), err))?;

        let hash = blake3::hash(source.as_bytes());
        if self.hashes.get(path) == Some(&hash) {
            return Ok(CompileOutcome::Unchanged);
        }

        let output = self.output_path(path);
        let module_path = self.module_path(path);
        let outcome = match self.compile_source(&source, &module_path) {
            Ok(instrumented) => {
                write_output(&output, &instrumented.code)?;
                self.modules.insert(
                    path.to_path_buf(),
                    instrumented.components.iter().map(|c| c.id.clone()).collect(),
                );
                CompileOutcome::Written {
                    output,
                    components: instrumented.components.len(),
                }
            }
            Err(err) => {
                write_output(&output, &source)?;
                CompileOutcome::PassedThrough {
                    output,
                    reason: err.to_string(),
                }
            }
        };

        self.hashes.insert(path.to_path_buf(), hash);
        Ok(outcome)
    }

    /// Drop everything known about a deleted source file.
    pub fn remove_file(&mut self, path: &Path) -> Result<Option<CompileOutcome>, CompileError> {
        self.hashes.remove(path);
        if let Some(ids) = self.modules.remove(path) {
            for id in &ids {
                self.tracker.forget(id);
            }
        }

        let output = self.output_path(path);
        match fs::remove_file(&output) {
            Ok(()) => Ok(Some(CompileOutcome::Removed { output })),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(CompileError::Write(output, err)),
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }
}

fn write_output(output: &Path, content: &str) -> Result<(), CompileError> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|err| CompileError::Write(parent.to_path_buf(), err))?;
    }
    fs::write(output, content).map_err(|err| CompileError::Write(output.to_path_buf(), err))
}
