//! Resource collaborator: the storage the model is computed from
//!
//! The model never touches storage directly. It enumerates projects and
//! members, reads bytes and resolves paths through [`Workspace`], and learns
//! about external mutation from the [`ResourceDelta`] stream.

mod fs;
mod memory;

pub use fs::FsWorkspace;
pub use memory::MemoryWorkspace;

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

/// Kind of a workspace resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Root,
    Project,
    Folder,
    File,
}

/// Identity of a workspace resource: kind + workspace-relative path.
///
/// Paths use `/` separators; the root has the empty path and a project's
/// path is its name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    kind: ResourceKind,
    path: String,
}

impl ResourceId {
    pub fn root() -> Self {
        Self {
            kind: ResourceKind::Root,
            path: String::new(),
        }
    }

    pub fn project(name: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Project,
            path: name.into(),
        }
    }

    pub fn folder(path: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Folder,
            path: normalize(&path.into()),
        }
    }

    pub fn file(path: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::File,
            path: normalize(&path.into()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or("")
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.name();
        name.rsplit_once('.')
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext)
    }

    /// File name without its extension
    pub fn stem(&self) -> &str {
        let name = self.name();
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }

    /// Name of the project this resource belongs to (`None` for the root)
    pub fn project_name(&self) -> Option<&str> {
        match self.kind {
            ResourceKind::Root => None,
            _ => self.path.split('/').next().filter(|s| !s.is_empty()),
        }
    }

    /// True when `self` is `path` or lies below it (path-wise)
    pub fn is_within(&self, path: &str) -> bool {
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            return true;
        }
        self.path == path
            || (self.path.starts_with(path) && self.path.as_bytes().get(path.len()) == Some(&b'/'))
    }

    /// Path relative to the workspace root as a platform path
    pub fn to_relative_path(&self) -> PathBuf {
        self.path.split('/').filter(|s| !s.is_empty()).collect()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.path)
    }
}

fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a container-relative path onto a container path.
///
/// A leading root is ignored, so `/x/y` under `app` is `app/x/y`. Only `..`
/// leaves the container; escaping the workspace yields `None`.
pub(crate) fn join_relative(container: &ResourceId, relative: &Path) -> Option<String> {
    let mut segments: Vec<String> = container
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    for component in relative.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                segments.pop()?;
            }
            Component::Normal(part) => segments.push(part.to_str()?.to_string()),
        }
    }

    Some(segments.join("/"))
}

/// Kind of change carried by a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaKind {
    Added,
    Removed,
    Modified,
}

/// One external change to a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDelta {
    pub resource: ResourceId,
    pub kind: DeltaKind,
}

impl ResourceDelta {
    pub fn new(resource: ResourceId, kind: DeltaKind) -> Self {
        Self { resource, kind }
    }
}

/// Result of resolving a path against a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "target", rename_all = "lowercase")]
pub enum Target {
    /// A resource inside the workspace
    Internal(ResourceId),
    /// A file outside the workspace
    External(PathBuf),
}

/// Storage backing the model
pub trait Workspace: Send + Sync {
    /// Top-level projects, in store order
    fn projects(&self) -> io::Result<Vec<ResourceId>>;

    /// Every folder and file below a project, ordered by path
    fn members(&self, project: &str) -> io::Result<Vec<ResourceId>>;

    fn exists(&self, resource: &ResourceId) -> bool;

    fn read(&self, resource: &ResourceId) -> io::Result<Vec<u8>>;

    /// Existing resource at `relative` below `container`
    fn find_member(&self, container: &ResourceId, relative: &Path) -> Option<ResourceId>;

    /// Existence check for paths outside the workspace
    fn external_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Stream of resource deltas; every subscriber gets every delta
    fn subscribe(&self) -> Receiver<ResourceDelta>;
}

/// Fan-out of deltas to every live subscriber
#[derive(Default)]
pub(crate) struct Subscribers {
    senders: Mutex<Vec<Sender<ResourceDelta>>>,
}

impl Subscribers {
    pub(crate) fn subscribe(&self) -> Receiver<ResourceDelta> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.senders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    pub(crate) fn publish(&self, delta: ResourceDelta) {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        // Receivers that were dropped disconnect their sender
        senders.retain(|tx| tx.send(delta.clone()).is_ok());
    }
}
