//! Model root: the explicit context object every entry point goes through
//!
//! A [`Model`] owns the element cache, the change notifier and the cached
//! non-member resources of one workspace. It is built once and shared by
//! `Arc`.

mod build;

use crate::cache::ElementCache;
use crate::config::Config;
use crate::element::{Element, ElementInfo, ElementKind};
use crate::handle::Handle;
use crate::notify::{ChangeNotifier, ElementChangeListener, FailureReporter};
use crate::outline::{LineOutlineParser, OutlineParser};
use crate::project::{Containment, ExcludeOutputDir, ProjectScope};
use crate::workspace::{ResourceDelta, ResourceId, ResourceKind, Target, Workspace};
use crate::Result;
use std::path::{Component, Path};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub struct Model {
    workspace: Arc<dyn Workspace>,
    config: Config,
    cache: ElementCache,
    parser: Box<dyn OutlineParser>,
    containment: Box<dyn Containment>,
    notifier: ChangeNotifier,
    non_members: Mutex<Option<Vec<ResourceId>>>,
    /// Readers: project-set queries. Writer: delta application.
    structure: RwLock<()>,
}

impl Model {
    pub fn new(workspace: Arc<dyn Workspace>, config: Config) -> Self {
        Self {
            workspace,
            config,
            cache: ElementCache::new(Handle::root(), ElementInfo::Model),
            parser: Box::new(LineOutlineParser),
            containment: Box::new(ExcludeOutputDir),
            notifier: ChangeNotifier::default(),
            non_members: Mutex::new(None),
            structure: RwLock::new(()),
        }
    }

    pub fn with_parser(mut self, parser: impl OutlineParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    pub fn with_containment(mut self, containment: impl Containment + 'static) -> Self {
        self.containment = Box::new(containment);
        self
    }

    /// Replace the failure reporter; listeners registered so far are dropped
    pub fn with_reporter(mut self, reporter: impl FailureReporter + 'static) -> Self {
        self.notifier = ChangeNotifier::new(Box::new(reporter));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workspace(&self) -> &Arc<dyn Workspace> {
        &self.workspace
    }

    pub fn root(&self) -> Handle {
        Handle::root()
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, ()> {
        self.structure.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, ()> {
        self.structure.write().unwrap_or_else(|e| e.into_inner())
    }

    // Cache access

    /// Children of `handle`, building them on first access
    pub fn children(&self, handle: &Handle) -> Result<Vec<Element>> {
        if !self.cache.contains(handle) {
            match handle.parent() {
                Some(parent) if parent.is_root() && handle.kind() == ElementKind::Project => {
                    self.project(handle.name());
                }
                _ => {
                    self.element(handle)?;
                }
            }
        }
        self.cache.children(handle, &|element| self.build(element))
    }

    pub fn open(&self, handle: &Handle) -> Result<()> {
        self.children(handle).map(|_| ())
    }

    pub fn close(&self, handle: &Handle) {
        self.cache.close(handle);
    }

    pub fn is_open(&self, handle: &Handle) -> bool {
        self.cache.is_open(handle)
    }

    pub fn find_child(&self, parent: &Handle, name: &str, kind: ElementKind) -> Result<Option<Element>> {
        Ok(self
            .children(parent)?
            .into_iter()
            .find(|child| child.kind() == kind && child.name() == name))
    }

    /// Look up an element, opening its ancestors as needed.
    ///
    /// `Ok(None)` when no such element exists.
    pub fn element(&self, handle: &Handle) -> Result<Option<Element>> {
        if let Some(element) = self.cache.element(handle) {
            return Ok(Some(element));
        }
        let Some(parent) = handle.parent() else {
            return Ok(None);
        };
        if self.element(parent)?.is_none() {
            return Ok(None);
        }
        Ok(self.children(parent)?.into_iter().find(|c| &c.handle == handle))
    }

    pub fn build_count(&self, handle: &Handle) -> u64 {
        self.cache.build_count(handle)
    }

    /// Indented dump of everything currently cached
    pub fn describe(&self) -> String {
        self.cache.describe(&Handle::root())
    }

    // Projects

    /// Project element for `name`: the cached one, or a new closed node.
    ///
    /// The project need not exist; opening it fails later if it does not.
    pub fn project(&self, name: &str) -> Element {
        let handle = Handle::project(name);
        if let Some(element) = self.cache.element(&handle) {
            return element;
        }
        let info = ElementInfo::Project {
            resource: ResourceId::project(name),
            properties: self.load_properties(name),
        };
        self.cache.ensure(&handle, info)
    }

    /// Project element owning `resource`; `None` for the workspace root
    pub fn project_for_resource(&self, resource: &ResourceId) -> Option<Element> {
        resource.project_name().map(|name| self.project(name))
    }

    /// Projects carrying the nature marker, in workspace order
    pub fn projects(&self) -> Result<Vec<Element>> {
        let _guard = self.read_lock();
        self.projects_unlocked()
    }

    fn projects_unlocked(&self) -> Result<Vec<Element>> {
        Ok(self
            .children(&Handle::root())?
            .into_iter()
            .filter(|e| e.kind() == ElementKind::Project)
            .collect())
    }

    pub fn find_project(&self, resource: &ResourceId) -> Option<Element> {
        let _guard = self.read_lock();
        self.projects_unlocked()
            .ok()?
            .into_iter()
            .find(|p| p.resource() == Some(resource))
    }

    /// Whether `resource` is part of the model.
    ///
    /// Root and project resources always are. Anything finer is contained
    /// only if no project excludes it.
    pub fn contains(&self, resource: &ResourceId) -> bool {
        if matches!(resource.kind(), ResourceKind::Root | ResourceKind::Project) {
            return true;
        }
        let _guard = self.read_lock();
        let Ok(projects) = self.projects_unlocked() else {
            return false;
        };
        projects.iter().all(|project| match &project.info {
            ElementInfo::Project {
                resource: project_resource,
                properties,
            } => {
                let scope = ProjectScope {
                    resource: project_resource,
                    properties,
                };
                self.containment.contains(&scope, resource)
            }
            _ => true,
        })
    }

    /// Top-level projects without the nature marker.
    ///
    /// Computed on first use and kept until invalidated.
    pub fn non_member_resources(&self) -> Result<Vec<ResourceId>> {
        let _guard = self.read_lock();
        let mut cached = self.non_members.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(resources) = cached.as_ref() {
            return Ok(resources.clone());
        }

        let resources: Vec<ResourceId> = self
            .workspace
            .projects()?
            .into_iter()
            .filter(|project| !self.has_nature(project.path()))
            .collect();
        *cached = Some(resources.clone());
        Ok(resources)
    }

    pub fn invalidate_non_members(&self) {
        *self.non_members.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Resolve `path` against `container`.
    ///
    /// A path without a device prefix is first looked up inside
    /// `container`, a leading root included. Otherwise only an absolute path
    /// can resolve, as an external file. Misses are `None`.
    pub fn resolve_target(&self, container: &ResourceId, path: &Path, must_exist: bool) -> Option<Target> {
        let has_device = matches!(path.components().next(), Some(Component::Prefix(_)));
        if !has_device {
            if let Some(member) = self.workspace.find_member(container, path) {
                return (!must_exist || self.workspace.exists(&member)).then_some(Target::Internal(member));
            }
        }

        if !path.is_absolute() {
            return None;
        }
        if must_exist && !self.workspace.external_exists(path) {
            return None;
        }
        Some(Target::External(path.to_path_buf()))
    }

    // Notification

    pub fn subscribe(&self, listener: Arc<dyn ElementChangeListener>) -> bool {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, listener: &Arc<dyn ElementChangeListener>) -> bool {
        self.notifier.unsubscribe(listener)
    }

    /// Tell every listener that `element` changed; returns the failure count
    pub fn notify(&self, element: &Handle) -> usize {
        self.notifier.notify(element)
    }

    /// Bring the cache in line with one workspace change, then notify.
    ///
    /// Returns the handle listeners were notified with, if any.
    pub fn apply_delta(&self, delta: &ResourceDelta) -> Option<Handle> {
        let changed = {
            let _guard = self.write_lock();
            self.invalidate(delta)
        };

        if let Some(handle) = &changed {
            tracing::debug!(element = %handle, kind = ?delta.kind, resource = %delta.resource, "model changed");
            self.notify(handle);
        }
        changed
    }

    fn invalidate(&self, delta: &ResourceDelta) -> Option<Handle> {
        let resource = &delta.resource;
        let root = Handle::root();

        let project_name = match resource.kind() {
            ResourceKind::Root => {
                self.close(&root);
                self.invalidate_non_members();
                return Some(root);
            }
            _ => resource.project_name()?,
        };
        let project = Handle::project(project_name);

        let project_level =
            resource.kind() == ResourceKind::Project || *resource == self.marker(project_name);
        if project_level {
            // Nature or properties may have changed: rebuild the project set
            self.cache.forget(&project);
            self.close(&root);
            self.invalidate_non_members();
            return Some(root);
        }

        if !self.cache.contains(&project) {
            self.invalidate_non_members();
            return None;
        }
        let was_open = self.is_open(&project);
        self.close(&project);
        if was_open {
            if let Err(e) = self.open(&project) {
                tracing::warn!(project = %project_name, error = %e, "reopening project failed");
            }
        }
        Some(project)
    }
}
