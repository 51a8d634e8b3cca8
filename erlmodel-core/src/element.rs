//! Element kinds and per-kind element data

use crate::handle::Handle;
use crate::project::ProjectProperties;
use crate::workspace::ResourceId;
use serde::{Deserialize, Serialize};

/// Element kind tag (part of every handle)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ElementKind {
    Model = 0,
    Project = 1,
    Module = 2,
    Function = 3,
    Attribute = 4,
    Clause = 5,
    RecordDef = 6,
    MacroDef = 7,
    Folder = 8,
}

impl ElementKind {
    pub fn as_int(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Project => "project",
            Self::Module => "module",
            Self::Function => "function",
            Self::Attribute => "attribute",
            Self::Clause => "clause",
            Self::RecordDef => "record_def",
            Self::MacroDef => "macro_def",
            Self::Folder => "folder",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "model" => Some(Self::Model),
            "project" => Some(Self::Project),
            "module" => Some(Self::Module),
            "function" => Some(Self::Function),
            "attribute" => Some(Self::Attribute),
            "clause" => Some(Self::Clause),
            "record_def" => Some(Self::RecordDef),
            "macro_def" => Some(Self::MacroDef),
            "folder" => Some(Self::Folder),
            _ => None,
        }
    }

    /// Kinds whose children are computed lazily from a backing resource
    pub fn is_openable(self) -> bool {
        matches!(self, Self::Model | Self::Project | Self::Module)
    }
}

/// Whether a module file is a source module or an include header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Source,
    Header,
}

/// Kind-specific element data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementInfo {
    Model,
    Project {
        resource: ResourceId,
        properties: ProjectProperties,
    },
    Module {
        resource: ResourceId,
        module_kind: ModuleKind,
    },
    Function {
        exported: bool,
        line: usize,
    },
    Attribute {
        value: Option<String>,
        line: usize,
    },
    Clause {
        head: String,
        line: usize,
    },
    RecordDef {
        line: usize,
    },
    MacroDef {
        line: usize,
    },
    Folder {
        resource: ResourceId,
    },
}

impl ElementInfo {
    pub fn kind(&self) -> ElementKind {
        match self {
            Self::Model => ElementKind::Model,
            Self::Project { .. } => ElementKind::Project,
            Self::Module { .. } => ElementKind::Module,
            Self::Function { .. } => ElementKind::Function,
            Self::Attribute { .. } => ElementKind::Attribute,
            Self::Clause { .. } => ElementKind::Clause,
            Self::RecordDef { .. } => ElementKind::RecordDef,
            Self::MacroDef { .. } => ElementKind::MacroDef,
            Self::Folder { .. } => ElementKind::Folder,
        }
    }

    pub fn is_openable(&self) -> bool {
        self.kind().is_openable()
    }

    /// Backing resource, for the kinds that have one
    pub fn resource(&self) -> Option<&ResourceId> {
        match self {
            Self::Project { resource, .. }
            | Self::Module { resource, .. }
            | Self::Folder { resource } => Some(resource),
            Self::Model
            | Self::Function { .. }
            | Self::Attribute { .. }
            | Self::Clause { .. }
            | Self::RecordDef { .. }
            | Self::MacroDef { .. } => None,
        }
    }

    /// 1-indexed source line, for the kinds extracted from module text
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Function { line, .. }
            | Self::Attribute { line, .. }
            | Self::Clause { line, .. }
            | Self::RecordDef { line }
            | Self::MacroDef { line } => Some(*line),
            Self::Model | Self::Project { .. } | Self::Module { .. } | Self::Folder { .. } => None,
        }
    }
}

/// Read-only snapshot of a cached model element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub handle: Handle,
    pub info: ElementInfo,
}

impl Element {
    pub fn new(handle: Handle, info: ElementInfo) -> Self {
        Self { handle, info }
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn kind(&self) -> ElementKind {
        self.handle.kind()
    }

    pub fn arity(&self) -> Option<u32> {
        self.handle.arity()
    }

    pub fn resource(&self) -> Option<&ResourceId> {
        self.info.resource()
    }
}

/// Element subtree produced by a structure build
#[derive(Debug, Clone)]
pub struct ElementSpec {
    pub handle: Handle,
    pub info: ElementInfo,
    pub children: Vec<ElementSpec>,
}

impl ElementSpec {
    pub fn leaf(handle: Handle, info: ElementInfo) -> Self {
        Self {
            handle,
            info,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<ElementSpec>) -> Self {
        self.children = children;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip_names() {
        for kind in [
            ElementKind::Model,
            ElementKind::Project,
            ElementKind::Module,
            ElementKind::Function,
            ElementKind::Attribute,
            ElementKind::Clause,
            ElementKind::RecordDef,
            ElementKind::MacroDef,
            ElementKind::Folder,
        ] {
            assert_eq!(ElementKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ElementKind::parse("class"), None);
    }

    #[test]
    fn test_openable_kinds() {
        assert!(ElementKind::Model.is_openable());
        assert!(ElementKind::Module.is_openable());
        assert!(!ElementKind::Function.is_openable());
        assert!(!ElementKind::Folder.is_openable());
    }

    #[test]
    fn test_info_line_and_resource() {
        let info = ElementInfo::Clause {
            head: "f(X)".to_string(),
            line: 12,
        };
        assert_eq!(info.kind(), ElementKind::Clause);
        assert_eq!(info.line(), Some(12));
        assert!(info.resource().is_none());

        let folder = ElementInfo::Folder {
            resource: ResourceId::folder("app/src"),
        };
        assert_eq!(folder.resource().map(|r| r.path()), Some("app/src"));
    }
}
