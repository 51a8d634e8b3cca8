//! erlmodel core - lazy, cached model of an Erlang workspace
//!
//! This library builds a hierarchical model of projects, modules and their
//! outline on demand, keeps it coherent with external changes and answers
//! pattern queries over it.

pub mod cache;
pub mod config;
pub mod element;
pub mod error;
pub mod handle;
pub mod model;
pub mod notify;
pub mod outline;
pub mod project;
pub mod query;
pub mod watch;
pub mod workspace;

pub use cache::ElementCache;
pub use config::Config;
pub use element::{Element, ElementInfo, ElementKind, ElementSpec, ModuleKind};
pub use error::{BuildFailure, ErrorEnvelope, ListenerFailure, ModelError};
pub use handle::{Handle, HandleId};
pub use model::Model;
pub use notify::{ChangeNotifier, ElementChangeListener, FailureReporter, TracingReporter};
pub use outline::{LineOutlineParser, OutlineParser};
pub use project::{Containment, ExcludeOutputDir, ProjectProperties, ProjectScope};
pub use query::{FunctionPattern, ModulePattern, UNKNOWN_ARITY, UNKNOWN_MODULE};
pub use watch::ModelWatcher;
pub use workspace::{
    DeltaKind, FsWorkspace, MemoryWorkspace, ResourceDelta, ResourceId, ResourceKind, Target,
    Workspace,
};

/// Result type alias for model operations
pub type Result<T> = std::result::Result<T, ModelError>;
