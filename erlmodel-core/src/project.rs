//! Project properties and resource containment policy

use crate::config::ProjectDefaults;
use crate::workspace::{ResourceId, ResourceKind};
use crate::ModelError;
use serde::{Deserialize, Serialize};

/// Separator of the packed directory list format
const DIR_SEPARATOR: char = ';';

/// Build layout of one project, read from its marker file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectProperties {
    pub source_dirs: Vec<String>,
    pub include_dirs: Vec<String>,
    pub output_dir: String,
    pub external_includes: Vec<String>,
}

/// Directory list as written in a marker file: array or packed string
#[derive(Deserialize)]
#[serde(untagged)]
enum DirList {
    List(Vec<String>),
    Packed(String),
}

impl DirList {
    fn into_dirs(self) -> Vec<String> {
        match self {
            Self::List(dirs) => dirs.into_iter().filter(|d| !d.is_empty()).collect(),
            Self::Packed(packed) => unpack_dirs(&packed),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawProperties {
    source_dirs: Option<DirList>,
    include_dirs: Option<DirList>,
    output_dir: Option<String>,
    external_includes: Option<DirList>,
}

impl ProjectProperties {
    pub fn from_defaults(defaults: &ProjectDefaults) -> Self {
        Self {
            source_dirs: defaults.source_dirs.clone(),
            include_dirs: defaults.include_dirs.clone(),
            output_dir: defaults.output_dir.clone(),
            external_includes: defaults.external_includes.clone(),
        }
    }

    /// Parse marker file contents; missing keys fall back to `defaults`
    pub fn parse(project: &str, text: &str, defaults: &ProjectDefaults) -> crate::Result<Self> {
        let raw: RawProperties = if text.trim().is_empty() {
            RawProperties::default()
        } else {
            toml::from_str(text).map_err(|e| ModelError::ProjectProperties {
                project: project.to_string(),
                message: e.to_string(),
            })?
        };

        let base = Self::from_defaults(defaults);
        Ok(Self {
            source_dirs: raw.source_dirs.map_or(base.source_dirs, DirList::into_dirs),
            include_dirs: raw.include_dirs.map_or(base.include_dirs, DirList::into_dirs),
            output_dir: raw
                .output_dir
                .map(|d| d.trim_matches('/').to_string())
                .unwrap_or(base.output_dir),
            external_includes: raw
                .external_includes
                .map_or(base.external_includes, DirList::into_dirs),
        })
    }

    /// Directories (project-relative) that hold modules
    pub fn module_dirs(&self) -> impl Iterator<Item = &str> {
        self.source_dirs
            .iter()
            .chain(self.include_dirs.iter())
            .map(String::as_str)
    }
}

/// Join directories into the packed `a;b;c` form
pub fn pack_dirs<S: AsRef<str>>(dirs: &[S]) -> String {
    dirs.iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(&DIR_SEPARATOR.to_string())
}

/// Split a packed directory list, dropping empty entries
pub fn unpack_dirs(packed: &str) -> Vec<String> {
    packed
        .split(DIR_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// A project as seen by a containment policy
#[derive(Debug, Clone, Copy)]
pub struct ProjectScope<'a> {
    pub resource: &'a ResourceId,
    pub properties: &'a ProjectProperties,
}

/// Decides whether a project claims a resource as part of the model
pub trait Containment: Send + Sync {
    /// `false` means the project explicitly excludes the resource
    fn contains(&self, project: &ProjectScope<'_>, resource: &ResourceId) -> bool;
}

/// Everything is contained except build output below a project's output
/// directory
#[derive(Debug, Default, Clone, Copy)]
pub struct ExcludeOutputDir;

impl Containment for ExcludeOutputDir {
    fn contains(&self, project: &ProjectScope<'_>, resource: &ResourceId) -> bool {
        if matches!(resource.kind(), ResourceKind::Root | ResourceKind::Project) {
            return true;
        }
        if resource.project_name() != Some(project.resource.path()) {
            return true;
        }
        let output = project.properties.output_dir.trim_matches('/');
        if output.is_empty() {
            return true;
        }
        let output_path = format!("{}/{}", project.resource.path(), output);
        !resource.is_within(&output_path)
    }
}
