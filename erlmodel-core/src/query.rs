//! Pattern search over the cached model tree
//!
//! Module names are matched with glob patterns, function names with
//! regular expressions. Both must match the whole name.

use crate::element::{Element, ElementKind};
use crate::model::Model;
use crate::ModelError;
use globset::{Glob, GlobMatcher};
use regex::Regex;

/// Module pattern meaning "any module"
pub const UNKNOWN_MODULE: &str = "<unknown>";

/// Arity filter meaning "any arity"
pub const UNKNOWN_ARITY: Option<u32> = None;

/// Compiled module-name glob
#[derive(Debug, Clone)]
pub struct ModulePattern {
    matcher: GlobMatcher,
}

impl ModulePattern {
    pub fn new(pattern: &str) -> crate::Result<Self> {
        let pattern = if pattern == UNKNOWN_MODULE { "*" } else { pattern };
        let glob = Glob::new(pattern)
            .map_err(|e| ModelError::Pattern(format!("module pattern {:?}: {}", pattern, e)))?;
        Ok(Self {
            matcher: glob.compile_matcher(),
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.matcher.is_match(name)
    }
}

/// Compiled function-name regex, anchored at both ends
#[derive(Debug, Clone)]
pub struct FunctionPattern {
    regex: Regex,
}

impl FunctionPattern {
    pub fn new(pattern: &str) -> crate::Result<Self> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))
            .map_err(|e| ModelError::Pattern(format!("function pattern {:?}: {}", pattern, e)))?;
        Ok(Self { regex })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

impl Model {
    /// Modules of `project` whose names match `pattern`, in child order.
    ///
    /// A project that cannot be opened has no matches.
    pub fn find_module(&self, project: &str, pattern: &str) -> crate::Result<Vec<Element>> {
        let pattern = ModulePattern::new(pattern)?;
        let project = self.project(project);

        let children = match self.children(&project.handle) {
            Ok(children) => children,
            Err(e) => {
                tracing::debug!(project = %project.handle, error = %e, "project not searchable");
                return Ok(Vec::new());
            }
        };

        Ok(children
            .into_iter()
            .filter(|child| child.kind() == ElementKind::Module && pattern.matches(child.name()))
            .collect())
    }

    /// Functions matching `function` (regex) and `arity` in every module of
    /// `project` matching `module` (glob).
    ///
    /// Modules that fail to open are skipped.
    pub fn find_function(
        &self,
        project: &str,
        module: &str,
        function: &str,
        arity: Option<u32>,
    ) -> crate::Result<Vec<Element>> {
        let function = FunctionPattern::new(function)?;
        let mut found = Vec::new();

        for module in self.find_module(project, module)? {
            let children = match self.children(&module.handle) {
                Ok(children) => children,
                Err(e) => {
                    tracing::warn!(module = %module.handle, error = %e, "skipping module");
                    continue;
                }
            };
            found.extend(children.into_iter().filter(|child| {
                child.kind() == ElementKind::Function
                    && (arity == UNKNOWN_ARITY || child.arity() == arity)
                    && function.matches(child.name())
            }));
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_pattern_whole_name() {
        let pattern = ModulePattern::new("foo*").unwrap();
        assert!(pattern.matches("foo"));
        assert!(pattern.matches("foobar"));
        assert!(!pattern.matches("barfoo"));
    }

    #[test]
    fn test_unknown_module_matches_all() {
        let pattern = ModulePattern::new(UNKNOWN_MODULE).unwrap();
        assert!(pattern.matches("anything"));
        assert!(pattern.matches("x"));
    }

    #[test]
    fn test_function_pattern_anchored() {
        let pattern = FunctionPattern::new("f").unwrap();
        assert!(pattern.matches("f"));
        assert!(!pattern.matches("foo"));

        let alternation = FunctionPattern::new("init|start").unwrap();
        assert!(alternation.matches("start"));
        assert!(!alternation.matches("restart"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(ModulePattern::new("a[b"), Err(ModelError::Pattern(_))));
        assert!(matches!(FunctionPattern::new("f("), Err(ModelError::Pattern(_))));
    }
}
