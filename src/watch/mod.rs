//! Watch mode: keep `out_dir` in sync with the source tree.
//!
//! ```text
//! notify ──► Debouncer (timing, dedup) ──► batch ──► Compiler ──► out_dir
//!                                                       │
//!                                                  WatchStatus
//! ```
//!
//! The watcher is created before the initial scan so edits made while the
//! scan runs are buffered instead of lost.

mod debouncer;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jwalk::WalkDir;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::compiler::{CompileOutcome, Compiler};
use crate::config::HotswapConfig;
use crate::logger::{status_error, status_success, status_unchanged};
use crate::{debug, log};
use debouncer::{ChangeKind, Debouncer, normalize_path};

/// Counts of what a batch (or the initial scan) did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub written: usize,
    pub unchanged: usize,
    pub passed_through: usize,
    pub removed: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &CompileOutcome) {
        match outcome {
            CompileOutcome::Written { .. } => self.written += 1,
            CompileOutcome::Unchanged => self.unchanged += 1,
            CompileOutcome::PassedThrough { .. } => self.passed_through += 1,
            CompileOutcome::Removed { .. } => self.removed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.written + self.unchanged + self.passed_through + self.removed + self.failed
    }
}

/// Source watcher bound to one project.
pub struct WatchLoop {
    /// sync channel fed by notify (it has no async API)
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    /// must stay alive for events to flow
    _watcher: RecommendedWatcher,
    compiler: Compiler,
    debouncer: Debouncer,
}

impl WatchLoop {
    /// Start watching the source root. Events buffer until [`run`](Self::run).
    pub fn new(config: &HotswapConfig) -> Result<Self> {
        let mut config = config.clone();
        config.root = normalize_path(&config.root);
        let source_root = config.watch_root();

        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })
        .context("failed to create file watcher")?;
        watcher
            .watch(&source_root, RecursiveMode::Recursive)
            .with_context(|| format!("failed to watch `{}`", source_root.display()))?;

        Ok(Self {
            notify_rx,
            _watcher: watcher,
            compiler: Compiler::new(&config),
            debouncer: Debouncer::new(config.watch.debounce_ms),
        })
    }

    /// Instrument every accepted file under the source root.
    pub fn initial_scan(&mut self) -> BatchReport {
        initial_scan(&mut self.compiler)
    }

    /// Process debounced batches until `shutdown` fires or the watcher dies.
    pub async fn run(self, mut shutdown: mpsc::UnboundedReceiver<()>) {
        let Self {
            notify_rx,
            _watcher,
            mut compiler,
            mut debouncer,
        } = self;

        let (async_tx, mut async_rx) = mpsc::channel::<notify::Event>(64);
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if async_tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => log!("watch"; "notify error: {}", e),
                }
            }
        });

        log!("watch"; "watching {}", compiler.source_root().display());
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                event = async_rx.recv() => match event {
                    Some(event) => debouncer.add_event(&event),
                    None => break,
                },
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    if let Some(batch) = debouncer.take_if_ready() {
                        process_batch(&mut compiler, batch);
                    }
                }
            }
        }
        log!("watch"; "stopped");
    }
}

/// Walk the source root and compile every accepted file.
pub fn initial_scan(compiler: &mut Compiler) -> BatchReport {
    let mut report = BatchReport::default();
    let files: Vec<PathBuf> = WalkDir::new(compiler.source_root())
        .sort(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path())
        .filter(|path| compiler.accepts(path))
        .collect();

    for path in files {
        compile_one(compiler, &path, &mut report);
    }
    debug!("watch"; "initial scan: {:?}", report);
    report
}

/// Apply one debounced batch.
fn process_batch(compiler: &mut Compiler, batch: Vec<(PathBuf, ChangeKind)>) -> BatchReport {
    let mut report = BatchReport::default();
    for (path, kind) in batch {
        if !compiler.accepts(&path) {
            continue;
        }
        debug!("watch"; "{}: {}", kind.label(), path.display());
        match kind {
            ChangeKind::Removed => match compiler.remove_file(&path) {
                Ok(Some(outcome)) => {
                    report.record(&outcome);
                    status_success(&format!("removed: {}", relative(compiler, &path)));
                }
                Ok(None) => {}
                Err(err) => {
                    report.failed += 1;
                    status_error(&format!("remove failed: {}", relative(compiler, &path)), &error_chain(&err));
                }
            },
            ChangeKind::Created | ChangeKind::Modified => compile_one(compiler, &path, &mut report),
        }
    }
    report
}

fn compile_one(compiler: &mut Compiler, path: &Path, report: &mut BatchReport) {
    let name = relative(compiler, path);
    match compiler.compile_file(path) {
        Ok(outcome) => {
            report.record(&outcome);
            match &outcome {
                CompileOutcome::Written { components, .. } => {
                    status_success(&format!("instrumented: {name} ({components} component(s))"));
                }
                CompileOutcome::Unchanged => status_unchanged(&format!("unchanged: {name}")),
                CompileOutcome::PassedThrough { reason, .. } => {
                    status_error(&format!("copied without instrumenting: {name}"), reason);
                }
                CompileOutcome::Removed { .. } => {}
            }
        }
        Err(err) => {
            report.failed += 1;
            status_error(&format!("compile failed: {name}"), &error_chain(&err));
        }
    }
}

fn relative(compiler: &Compiler, path: &Path) -> String {
    path.strip_prefix(compiler.source_root())
        .unwrap_or(path)
        .display()
        .to_string()
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Entry point of `hotswap watch`: scan, then watch until Ctrl+C.
pub fn run(config: &HotswapConfig) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("failed to set Ctrl+C handler")?;

    let mut watch = WatchLoop::new(config)?;
    let report = watch.initial_scan();
    log!("watch"; "initial scan: {} file(s), {} failed", report.total(), report.failed);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(watch.run(shutdown_rx));
    Ok(())
}
