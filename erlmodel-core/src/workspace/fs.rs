//! Directory-backed workspace: top-level directories are projects.

use super::{join_relative, DeltaKind, ResourceDelta, ResourceId, ResourceKind, Subscribers, Workspace};
use crossbeam_channel::Receiver;
use ignore::WalkBuilder;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// Snapshot used to detect changes between rescans
type Snapshot = BTreeMap<ResourceId, Option<SystemTime>>;

pub struct FsWorkspace {
    root: PathBuf,
    subscribers: Subscribers,
    snapshot: Mutex<Snapshot>,
}

impl FsWorkspace {
    /// Open a workspace rooted at `root` and record its current state
    pub fn open(root: &Path) -> io::Result<Self> {
        let metadata = fs::metadata(root)?;
        if !metadata.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a directory", root.display()),
            ));
        }

        let workspace = Self {
            root: root.to_path_buf(),
            subscribers: Subscribers::default(),
            snapshot: Mutex::new(BTreeMap::new()),
        };
        let initial = workspace.take_snapshot()?;
        *workspace.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = initial;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a resource
    pub fn location(&self, resource: &ResourceId) -> PathBuf {
        self.root.join(resource.to_relative_path())
    }

    /// Compare the tree against the last snapshot and publish the differences.
    ///
    /// Returns the published deltas, ordered by resource.
    pub fn rescan(&self) -> io::Result<Vec<ResourceDelta>> {
        let current = self.take_snapshot()?;
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());

        let mut deltas = Vec::new();
        for (resource, mtime) in &current {
            match snapshot.get(resource) {
                None => deltas.push(ResourceDelta::new(resource.clone(), DeltaKind::Added)),
                Some(previous)
                    if resource.kind() == ResourceKind::File && previous != mtime =>
                {
                    deltas.push(ResourceDelta::new(resource.clone(), DeltaKind::Modified))
                }
                Some(_) => {}
            }
        }
        for resource in snapshot.keys() {
            if !current.contains_key(resource) {
                deltas.push(ResourceDelta::new(resource.clone(), DeltaKind::Removed));
            }
        }
        deltas.sort_by(|a, b| a.resource.cmp(&b.resource));

        *snapshot = current;
        drop(snapshot);

        for delta in &deltas {
            tracing::debug!(resource = %delta.resource, kind = ?delta.kind, "workspace change");
            self.subscribers.publish(delta.clone());
        }
        Ok(deltas)
    }

    fn take_snapshot(&self) -> io::Result<Snapshot> {
        let mut snapshot = BTreeMap::new();
        for project in self.projects()? {
            let mtime = modified(&self.location(&project));
            for member in self.members(project.path())? {
                let mtime = modified(&self.location(&member));
                snapshot.insert(member, mtime);
            }
            snapshot.insert(project, mtime);
        }
        Ok(snapshot)
    }

    /// Walk one project, respecting .gitignore
    fn walk_project(&self, project: &str) -> Vec<ResourceId> {
        let project_root = self.root.join(project);
        let mut builder = WalkBuilder::new(&project_root);
        builder.hidden(false);
        builder.git_ignore(true);
        builder.git_global(false);
        builder.git_exclude(true);
        builder.filter_entry(|entry| entry.file_name() != ".git");

        let mut members = Vec::new();
        for entry in builder.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if entry.depth() == 0 {
                continue;
            }

            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let Some(path) = relative_to_string(relative) else {
                continue;
            };

            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                members.push(ResourceId::folder(path));
            } else {
                members.push(ResourceId::file(path));
            }
        }

        members.sort();
        members
    }
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn relative_to_string(path: &Path) -> Option<String> {
    let parts: Option<Vec<&str>> = path.components().map(|c| c.as_os_str().to_str()).collect();
    parts.map(|p| p.join("/"))
}

impl Workspace for FsWorkspace {
    fn projects(&self) -> io::Result<Vec<ResourceId>> {
        let mut projects = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            projects.push(ResourceId::project(name));
        }
        projects.sort();
        Ok(projects)
    }

    fn members(&self, project: &str) -> io::Result<Vec<ResourceId>> {
        if !self.root.join(project).is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("project {} does not exist", project),
            ));
        }
        Ok(self.walk_project(project))
    }

    fn exists(&self, resource: &ResourceId) -> bool {
        let location = self.location(resource);
        match resource.kind() {
            ResourceKind::Root => self.root.is_dir(),
            ResourceKind::Project | ResourceKind::Folder => location.is_dir(),
            ResourceKind::File => location.is_file(),
        }
    }

    fn read(&self, resource: &ResourceId) -> io::Result<Vec<u8>> {
        fs::read(self.location(resource))
    }

    fn find_member(&self, container: &ResourceId, relative: &Path) -> Option<ResourceId> {
        let path = join_relative(container, relative)?;
        if path.is_empty() {
            return Some(ResourceId::root());
        }

        let metadata = fs::metadata(self.root.join(&path)).ok()?;
        if metadata.is_dir() {
            if path.contains('/') {
                Some(ResourceId::folder(path))
            } else {
                Some(ResourceId::project(path))
            }
        } else {
            Some(ResourceId::file(path))
        }
    }

    fn subscribe(&self) -> Receiver<ResourceDelta> {
        self.subscribers.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("app/src")).unwrap();
        fs::create_dir_all(root.join("app/ebin")).unwrap();
        fs::write(root.join("app/.erlproject"), "").unwrap();
        fs::write(root.join("app/src/server.erl"), "-module(server).\n").unwrap();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::create_dir_all(root.join(".hidden")).unwrap();
        dir
    }

    #[test]
    fn test_projects_sorted_and_visible_only() {
        let dir = create_workspace();
        let ws = FsWorkspace::open(dir.path()).unwrap();
        let projects = ws.projects().unwrap();
        assert_eq!(
            projects,
            vec![ResourceId::project("app"), ResourceId::project("docs")]
        );
    }

    #[test]
    fn test_members_include_folders_and_files() {
        let dir = create_workspace();
        let ws = FsWorkspace::open(dir.path()).unwrap();
        let members = ws.members("app").unwrap();
        assert!(members.contains(&ResourceId::file("app/.erlproject")));
        assert!(members.contains(&ResourceId::folder("app/src")));
        assert!(members.contains(&ResourceId::file("app/src/server.erl")));
        assert!(ws.members("missing").is_err());
    }

    #[test]
    fn test_find_member_kinds() {
        let dir = create_workspace();
        let ws = FsWorkspace::open(dir.path()).unwrap();
        let root = ResourceId::root();
        assert_eq!(
            ws.find_member(&root, Path::new("app")),
            Some(ResourceId::project("app"))
        );
        assert_eq!(
            ws.find_member(&ResourceId::project("app"), Path::new("src")),
            Some(ResourceId::folder("app/src"))
        );
        assert_eq!(
            ws.find_member(&ResourceId::project("app"), Path::new("src/server.erl")),
            Some(ResourceId::file("app/src/server.erl"))
        );
        assert_eq!(ws.find_member(&root, Path::new("app/nothing.erl")), None);
    }

    #[test]
    fn test_rescan_publishes_deltas() {
        let dir = create_workspace();
        let ws = FsWorkspace::open(dir.path()).unwrap();
        let rx = ws.subscribe();

        assert!(ws.rescan().unwrap().is_empty());

        fs::write(dir.path().join("app/src/client.erl"), "-module(client).\n").unwrap();
        fs::remove_dir_all(dir.path().join("docs")).unwrap();

        let deltas = ws.rescan().unwrap();
        assert!(deltas.contains(&ResourceDelta::new(
            ResourceId::file("app/src/client.erl"),
            DeltaKind::Added
        )));
        assert!(deltas.contains(&ResourceDelta::new(
            ResourceId::project("docs"),
            DeltaKind::Removed
        )));

        let received: Vec<_> = rx.try_iter().collect();
        assert_eq!(received, deltas);
    }
}
