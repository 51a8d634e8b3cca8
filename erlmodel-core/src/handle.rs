//! Handle types: immutable structural identity of model elements

use crate::element::ElementKind;
use crate::ModelError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

const ESCAPE: char = '\\';
const ARITY_SEPARATOR: char = '/';

/// Stable handle ID: hash of the handle memento
/// Displayed with 'h' prefix (e.g., "h1a2b3c4d5e6"), stored without prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandleId(String); // hex-encoded hash prefix (internal, no 'h')

impl HandleId {
    /// Create a new handle ID from a memento
    pub fn new(memento: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(memento.as_bytes());
        let hash = hasher.finalize();
        Self(hex::encode(&hash[..12])) // 24-char hex prefix (12 bytes)
    }

    /// Get the raw ID without prefix
    pub fn raw(&self) -> &str {
        &self.0
    }
}

impl Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

impl FromStr for HandleId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept both "h1a2b3c4d5e6" and "1a2b3c4d5e6"
        let s = s.strip_prefix('h').unwrap_or(s);

        if s.is_empty() || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ModelError::InvalidMemento(format!("Invalid handle ID: {}", s)));
        }

        Ok(HandleId(s.to_string()))
    }
}

/// Identity of a model element: parent chain + local name + kind.
///
/// Cheap to clone and compare. Two handles built independently are equal when
/// their whole chains are equal.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(Arc<HandleInner>);

#[derive(PartialEq, Eq, Hash, PartialOrd, Ord)]
struct HandleInner {
    parent: Option<Handle>,
    kind: ElementKind,
    name: String,
    /// Part of the identity of functions only
    arity: Option<u32>,
}

impl Handle {
    fn make(parent: Option<Handle>, name: String, kind: ElementKind, arity: Option<u32>) -> Self {
        Self(Arc::new(HandleInner {
            parent,
            kind,
            name,
            arity,
        }))
    }

    /// The model root handle (empty memento)
    pub fn root() -> Self {
        Self::make(None, String::new(), ElementKind::Model, None)
    }

    /// Handle of a project under the model root
    pub fn project(name: impl Into<String>) -> Self {
        Self::root().child(name, ElementKind::Project)
    }

    /// Child handle of any kind; functions should use [`Handle::function`]
    pub fn child(&self, name: impl Into<String>, kind: ElementKind) -> Self {
        Self::make(Some(self.clone()), name.into(), kind, None)
    }

    /// Function child handle; arity is part of its identity
    pub fn function(&self, name: impl Into<String>, arity: u32) -> Self {
        Self::make(
            Some(self.clone()),
            name.into(),
            ElementKind::Function,
            Some(arity),
        )
    }

    pub fn parent(&self) -> Option<&Handle> {
        self.0.parent.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> ElementKind {
        self.0.kind
    }

    pub fn arity(&self) -> Option<u32> {
        self.0.arity
    }

    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    /// Number of ancestors (root is 0)
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Ancestors from the direct parent up to the root
    pub fn ancestors(&self) -> impl Iterator<Item = &Handle> {
        std::iter::successors(self.parent(), |h| h.parent())
    }

    pub fn is_ancestor_of(&self, other: &Handle) -> bool {
        other.ancestors().any(|a| a == self)
    }

    /// Nearest project in the chain (self included)
    pub fn project_handle(&self) -> Option<&Handle> {
        std::iter::once(self)
            .chain(self.ancestors())
            .find(|h| h.kind() == ElementKind::Project)
    }

    /// Identifier used when comparing elements across versions:
    /// kind tag followed by `name/arity` for functions, the name otherwise
    pub fn label(&self) -> String {
        match self.arity() {
            Some(arity) => format!("{}{}/{}", self.kind().as_str(), self.name(), arity),
            None => format!("{}{}", self.kind().as_str(), self.name()),
        }
    }

    /// Textual memento; the root has the empty memento
    pub fn memento(&self) -> String {
        let mut out = String::new();
        self.write_memento(&mut out);
        out
    }

    fn write_memento(&self, out: &mut String) {
        let Some(parent) = self.parent() else {
            return;
        };
        parent.write_memento(out);
        out.push(delimiter(self.kind()));
        for c in self.name().chars() {
            if is_reserved(c) {
                out.push(ESCAPE);
            }
            out.push(c);
        }
        if let Some(arity) = self.arity() {
            out.push(ARITY_SEPARATOR);
            out.push_str(&arity.to_string());
        }
    }

    /// Parse a memento produced by [`Handle::memento`]
    pub fn from_memento(memento: &str) -> crate::Result<Self> {
        let mut handle = Handle::root();
        let mut chars = memento.chars().peekable();

        while let Some(c) = chars.next() {
            let kind = kind_for_delimiter(c).ok_or_else(|| {
                ModelError::InvalidMemento(format!("unexpected '{}' in {:?}", c, memento))
            })?;

            let mut name = String::new();
            let mut arity_text: Option<String> = None;
            while let Some(&next) = chars.peek() {
                if kind_for_delimiter(next).is_some() {
                    break;
                }
                chars.next();
                if next == ESCAPE {
                    let escaped = chars.next().ok_or_else(|| {
                        ModelError::InvalidMemento(format!("dangling escape in {:?}", memento))
                    })?;
                    name.push(escaped);
                } else if next == ARITY_SEPARATOR && kind == ElementKind::Function {
                    arity_text = Some(String::new());
                } else if let Some(text) = arity_text.as_mut() {
                    text.push(next);
                } else {
                    name.push(next);
                }
            }

            handle = match (kind, arity_text) {
                (ElementKind::Function, Some(text)) => {
                    let arity = text.parse::<u32>().map_err(|_| {
                        ModelError::InvalidMemento(format!("bad arity {:?} in {:?}", text, memento))
                    })?;
                    handle.function(name, arity)
                }
                (ElementKind::Function, None) => {
                    return Err(ModelError::InvalidMemento(format!(
                        "function without arity in {:?}",
                        memento
                    )))
                }
                (kind, _) => handle.child(name, kind),
            };
        }

        Ok(handle)
    }

    /// Stable short ID for display
    pub fn id(&self) -> HandleId {
        HandleId::new(&self.memento())
    }
}

fn delimiter(kind: ElementKind) -> char {
    match kind {
        ElementKind::Project => '=',
        ElementKind::Folder => '<',
        ElementKind::Module => '{',
        ElementKind::Function => '^',
        ElementKind::Clause => '~',
        ElementKind::Attribute => '@',
        ElementKind::RecordDef => '#',
        ElementKind::MacroDef => '?',
        // The root contributes nothing to a memento
        ElementKind::Model => '\0',
    }
}

fn kind_for_delimiter(c: char) -> Option<ElementKind> {
    match c {
        '=' => Some(ElementKind::Project),
        '<' => Some(ElementKind::Folder),
        '{' => Some(ElementKind::Module),
        '^' => Some(ElementKind::Function),
        '~' => Some(ElementKind::Clause),
        '@' => Some(ElementKind::Attribute),
        '#' => Some(ElementKind::RecordDef),
        '?' => Some(ElementKind::MacroDef),
        _ => None,
    }
}

fn is_reserved(c: char) -> bool {
    c == ESCAPE || c == ARITY_SEPARATOR || kind_for_delimiter(c).is_some()
}

impl Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.memento())
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Handle({:?})", self.memento())
    }
}

impl FromStr for Handle {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_memento(s)
    }
}

// Serialize handles as their memento for JSON output
impl Serialize for Handle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.memento())
    }
}

impl<'de> Deserialize<'de> for Handle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Handle::from_memento(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample() -> Handle {
        Handle::project("app")
            .child("server", ElementKind::Module)
            .function("handle_call", 3)
    }

    #[test]
    fn test_structural_equality() {
        let a = sample();
        let b = sample();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));

        let other_arity = Handle::project("app")
            .child("server", ElementKind::Module)
            .function("handle_call", 2);
        assert_ne!(b, other_arity);
    }

    #[test]
    fn test_root_memento_is_empty() {
        let root = Handle::root();
        assert_eq!(root.memento(), "");
        assert!(root.is_root());
        assert_eq!(Handle::from_memento("").unwrap(), root);
    }

    #[test]
    fn test_memento_format() {
        assert_eq!(sample().memento(), "=app{server^handle_call/3");
    }

    #[test]
    fn test_memento_parse() {
        let handle = sample();
        let parsed: Handle = handle.to_string().parse().unwrap();
        assert_eq!(parsed, handle);
        assert_eq!(parsed.arity(), Some(3));
        assert_eq!(parsed.parent().unwrap().kind(), ElementKind::Module);
    }

    #[test]
    fn test_memento_escapes_reserved_chars() {
        let odd = Handle::project("a=b").child("x{y/z", ElementKind::Module);
        let memento = odd.memento();
        assert_eq!(memento, "=a\\=b{x\\{y\\/z");
        assert_eq!(Handle::from_memento(&memento).unwrap(), odd);
    }

    #[test]
    fn test_memento_rejects_garbage() {
        assert!(Handle::from_memento("app").is_err());
        assert!(Handle::from_memento("=app^f").is_err());
        assert!(Handle::from_memento("=app^f/x").is_err());
        assert!(Handle::from_memento("=app\\").is_err());
    }

    #[test]
    fn test_navigation() {
        let handle = sample();
        assert_eq!(handle.depth(), 3);
        assert_eq!(handle.project_handle().unwrap().name(), "app");
        assert!(Handle::project("app").is_ancestor_of(&handle));
        assert!(!Handle::project("lib").is_ancestor_of(&handle));
        assert!(!handle.is_ancestor_of(&handle));
    }

    #[test]
    fn test_label() {
        assert_eq!(sample().label(), "functionhandle_call/3");
        let record = Handle::project("app")
            .child("server", ElementKind::Module)
            .child("state", ElementKind::RecordDef);
        assert_eq!(record.label(), "record_defstate");
    }

    #[test]
    fn test_handle_id_display_and_parse() {
        let id = sample().id();
        let displayed = id.to_string();
        assert!(displayed.starts_with('h'));
        assert_eq!(displayed.len(), 25); // 'h' + 24 hex chars

        let parsed: HandleId = displayed.parse().unwrap();
        assert_eq!(parsed, id);
        assert!("hxyz".parse::<HandleId>().is_err());
    }

    #[test]
    fn test_serde_as_memento() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, "\"=app{server^handle_call/3\"");
        let back: Handle = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }
}
