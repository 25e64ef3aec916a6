//! hotswap: hot reload for component modules.
//!
//! Build time: [`compiler`] assigns stable identities and instruments each
//! component with state capture/restore and a registration call, embedding
//! the [`classify`] change record for the previous build.
//!
//! Run time: [`runtime`] keeps live nodes per identity and reconciles them
//! against a reloaded module, patching in place when only the render output
//! changed and remounting otherwise.

pub mod classify;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod logger;
pub mod runtime;
pub mod watch;

pub use classify::{ChangeRecord, Classifier};
pub use compiler::{ComponentId, Compiler, IdentityAssigner, Instrumentor};
pub use config::HotswapConfig;
pub use runtime::{ComponentDef, ModuleManager, Reconciler, ReloadRequired, Runtime};
