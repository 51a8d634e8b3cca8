//! In-memory workspace for tests and tools that assemble models on the fly.

use super::{join_relative, DeltaKind, ResourceDelta, ResourceId, ResourceKind, Subscribers, Workspace};
use crossbeam_channel::Receiver;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;
use std::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    /// Projects in creation order
    projects: Vec<String>,
    folders: BTreeSet<String>,
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryState {
    fn has_project(&self, name: &str) -> bool {
        self.projects.iter().any(|p| p == name)
    }
}

/// Workspace held entirely in memory.
///
/// Every mutation publishes the matching [`ResourceDelta`].
#[derive(Default)]
pub struct MemoryWorkspace {
    state: Mutex<MemoryState>,
    subscribers: Subscribers,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a project; no-op when it already exists
    pub fn add_project(&self, name: &str) {
        {
            let mut state = self.state();
            if state.has_project(name) {
                return;
            }
            state.projects.push(name.to_string());
        }
        self.subscribers.publish(ResourceDelta::new(
            ResourceId::project(name),
            DeltaKind::Added,
        ));
    }

    /// Delete a project and everything below it
    pub fn remove_project(&self, name: &str) {
        {
            let mut state = self.state();
            if !state.has_project(name) {
                return;
            }
            state.projects.retain(|p| p != name);
            let prefix = format!("{}/", name);
            state.folders.retain(|f| !f.starts_with(&prefix));
            state.files.retain(|f, _| !f.starts_with(&prefix));
        }
        self.subscribers.publish(ResourceDelta::new(
            ResourceId::project(name),
            DeltaKind::Removed,
        ));
    }

    /// Create or overwrite a file; the project and parent folders are created
    /// as needed
    pub fn write_file(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let resource = ResourceId::file(path);
        let Some(project) = resource.project_name().map(str::to_string) else {
            return;
        };
        self.add_project(&project);

        let existed = {
            let mut state = self.state();
            let segments: Vec<&str> = resource.path().split('/').collect();
            for end in 2..segments.len() {
                state.folders.insert(segments[..end].join("/"));
            }
            state
                .files
                .insert(resource.path().to_string(), contents.into())
                .is_some()
        };

        let kind = if existed {
            DeltaKind::Modified
        } else {
            DeltaKind::Added
        };
        self.subscribers.publish(ResourceDelta::new(resource, kind));
    }

    /// Create an (empty) folder below an existing or new project
    pub fn create_folder(&self, path: &str) {
        let resource = ResourceId::folder(path);
        let Some(project) = resource.project_name().map(str::to_string) else {
            return;
        };
        self.add_project(&project);
        let added = {
            let mut state = self.state();
            let segments: Vec<&str> = resource.path().split('/').collect();
            let mut added = false;
            for end in 2..=segments.len() {
                added |= state.folders.insert(segments[..end].join("/"));
            }
            added
        };
        if added {
            self.subscribers
                .publish(ResourceDelta::new(resource, DeltaKind::Added));
        }
    }

    pub fn remove_file(&self, path: &str) {
        let resource = ResourceId::file(path);
        let removed = self.state().files.remove(resource.path()).is_some();
        if removed {
            self.subscribers
                .publish(ResourceDelta::new(resource, DeltaKind::Removed));
        }
    }
}

impl Workspace for MemoryWorkspace {
    fn projects(&self) -> io::Result<Vec<ResourceId>> {
        Ok(self
            .state()
            .projects
            .iter()
            .map(ResourceId::project)
            .collect())
    }

    fn members(&self, project: &str) -> io::Result<Vec<ResourceId>> {
        let state = self.state();
        if !state.has_project(project) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("project {} does not exist", project),
            ));
        }

        let prefix = format!("{}/", project);
        let mut members: Vec<ResourceId> = state
            .folders
            .iter()
            .filter(|f| f.starts_with(&prefix))
            .map(ResourceId::folder)
            .chain(
                state
                    .files
                    .keys()
                    .filter(|f| f.starts_with(&prefix))
                    .map(ResourceId::file),
            )
            .collect();
        members.sort();
        Ok(members)
    }

    fn exists(&self, resource: &ResourceId) -> bool {
        let state = self.state();
        match resource.kind() {
            ResourceKind::Root => true,
            ResourceKind::Project => state.has_project(resource.path()),
            ResourceKind::Folder => state.folders.contains(resource.path()),
            ResourceKind::File => state.files.contains_key(resource.path()),
        }
    }

    fn read(&self, resource: &ResourceId) -> io::Result<Vec<u8>> {
        self.state()
            .files
            .get(resource.path())
            .cloned()
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, format!("{} not found", resource))
            })
    }

    fn find_member(&self, container: &ResourceId, relative: &Path) -> Option<ResourceId> {
        let path = join_relative(container, relative)?;
        if path.is_empty() {
            return Some(ResourceId::root());
        }

        let state = self.state();
        if state.files.contains_key(&path) {
            Some(ResourceId::file(path))
        } else if state.folders.contains(&path) {
            Some(ResourceId::folder(path))
        } else if state.has_project(&path) {
            Some(ResourceId::project(path))
        } else {
            None
        }
    }

    fn subscribe(&self) -> Receiver<ResourceDelta> {
        self.subscribers.subscribe()
    }
}
