//! Structure builders for the openable element kinds

use super::Model;
use crate::element::{Element, ElementInfo, ElementKind, ElementSpec, ModuleKind};
use crate::error::BuildFailure;
use crate::project::ProjectProperties;
use crate::workspace::{ResourceId, ResourceKind};
use std::collections::HashSet;

/// Extension of include headers; other module extensions are sources
const HEADER_EXTENSION: &str = "hrl";

impl Model {
    /// Children of an openable element, computed from the workspace
    pub(super) fn build(&self, element: &Element) -> Result<Vec<ElementSpec>, BuildFailure> {
        match &element.info {
            ElementInfo::Model => self.build_root(element),
            ElementInfo::Project {
                resource,
                properties,
            } => self.build_project(element, resource, properties),
            ElementInfo::Module { resource, .. } => self.build_module(element, resource),
            ElementInfo::Function { .. }
            | ElementInfo::Attribute { .. }
            | ElementInfo::Clause { .. }
            | ElementInfo::RecordDef { .. }
            | ElementInfo::MacroDef { .. }
            | ElementInfo::Folder { .. } => Ok(Vec::new()),
        }
    }

    /// Projects carrying the nature marker, in workspace order
    fn build_root(&self, element: &Element) -> Result<Vec<ElementSpec>, BuildFailure> {
        let projects = self
            .workspace
            .projects()
            .map_err(|e| BuildFailure::new(element.handle.to_string(), e.to_string()))?;

        Ok(projects
            .into_iter()
            .filter(|project| self.has_nature(project.path()))
            .map(|project| {
                let name = project.path().to_string();
                ElementSpec::leaf(
                    element.handle.child(name.as_str(), ElementKind::Project),
                    ElementInfo::Project {
                        properties: self.load_properties(&name),
                        resource: project,
                    },
                )
            })
            .collect())
    }

    /// Module directories as folders, then modules found below them
    fn build_project(
        &self,
        element: &Element,
        resource: &ResourceId,
        properties: &ProjectProperties,
    ) -> Result<Vec<ElementSpec>, BuildFailure> {
        let handle = &element.handle;
        let name = resource.path();
        if !self.workspace.exists(resource) {
            return Err(BuildFailure::new(handle.to_string(), "project does not exist"));
        }
        let members = self
            .workspace
            .members(name)
            .map_err(|e| BuildFailure::new(handle.to_string(), e.to_string()))?;

        let module_dirs: Vec<String> = properties
            .module_dirs()
            .map(|dir| ResourceId::folder(format!("{}/{}", name, dir)).path().to_string())
            .collect();

        let mut specs = Vec::new();
        for (dir, path) in properties.module_dirs().zip(&module_dirs) {
            if path == name {
                continue;
            }
            let folder = ResourceId::folder(path.as_str());
            if self.workspace.exists(&folder) {
                specs.push(ElementSpec::leaf(
                    handle.child(dir.trim_matches('/'), ElementKind::Folder),
                    ElementInfo::Folder { resource: folder },
                ));
            }
        }

        let mut names = HashSet::new();
        for member in members {
            if member.kind() != ResourceKind::File {
                continue;
            }
            let Some(extension) = member.extension() else {
                continue;
            };
            if !self.config.is_module_extension(extension) {
                continue;
            }
            if !module_dirs.iter().any(|dir| member.is_within(dir)) {
                continue;
            }

            let (module_name, module_kind) = if extension.eq_ignore_ascii_case(HEADER_EXTENSION) {
                (member.name().to_string(), ModuleKind::Header)
            } else {
                (member.stem().to_string(), ModuleKind::Source)
            };
            if !names.insert(module_name.clone()) {
                tracing::warn!(
                    project = %name,
                    module = %module_name,
                    resource = %member,
                    "duplicate module name, keeping the first"
                );
                continue;
            }

            specs.push(ElementSpec::leaf(
                handle.child(module_name, ElementKind::Module),
                ElementInfo::Module {
                    resource: member,
                    module_kind,
                },
            ));
        }

        Ok(specs)
    }

    fn build_module(
        &self,
        element: &Element,
        resource: &ResourceId,
    ) -> Result<Vec<ElementSpec>, BuildFailure> {
        let handle = &element.handle;
        let bytes = self
            .workspace
            .read(resource)
            .map_err(|e| BuildFailure::new(handle.to_string(), e.to_string()))?;
        let source = String::from_utf8(bytes).map_err(|e| {
            BuildFailure::new(handle.to_string(), format!("{} is not UTF-8: {}", resource, e))
        })?;
        Ok(self.parser.parse(handle, &source))
    }

    pub(super) fn marker(&self, project: &str) -> ResourceId {
        ResourceId::file(format!("{}/{}", project, self.config.model.nature_marker))
    }

    pub(super) fn has_nature(&self, project: &str) -> bool {
        self.workspace.exists(&self.marker(project))
    }

    /// Properties from the marker file; unreadable or malformed files fall
    /// back to the configured defaults
    pub(super) fn load_properties(&self, project: &str) -> ProjectProperties {
        let defaults = &self.config.project;
        let marker = self.marker(project);
        if !self.workspace.exists(&marker) {
            return ProjectProperties::from_defaults(defaults);
        }

        let parsed = self
            .workspace
            .read(&marker)
            .map_err(crate::ModelError::from)
            .and_then(|bytes| {
                ProjectProperties::parse(project, &String::from_utf8_lossy(&bytes), defaults)
            });
        match parsed {
            Ok(properties) => properties,
            Err(e) => {
                tracing::warn!(project = %project, error = %e, "using default project properties");
                ProjectProperties::from_defaults(defaults)
            }
        }
    }
}
