//! Comparable descriptions of a test suite's shape.
//!
//! [`expected::derive`] builds one from the specification forest and
//! [`existing::extract`] builds one from a directory on disk. Paths are
//! relative and always use `/`.

pub mod existing;
pub mod expected;

use crate::ignore::IgnoreMatcher;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Metadata recorded for one test: `id`, `scenario`, `steps`,
/// `prerequisites`, `project_id`, `parameters` (name → values).
pub type TestDescriptor = BTreeMap<String, Value>;

/// Bare test name (function name without `test_`) → descriptor.
pub type FileTests = BTreeMap<String, TestDescriptor>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TestStructure {
    pub folders: BTreeSet<String>,
    pub files: BTreeSet<String>,
    pub test_cases: BTreeMap<String, FileTests>,
    /// `"<relative file>\<bare name>"` for every skipped test; only filled by
    /// the extractor.
    pub skipped_tests: Option<Vec<String>>,
}

impl TestStructure {
    /// Drop every folder, file and file's tests that `matcher` ignores.
    pub fn without_ignored(mut self, root: &Path, matcher: &dyn IgnoreMatcher) -> Self {
        self.folders.retain(|f| !matcher.is_ignored(&root.join(f), true));
        self.files.retain(|f| !matcher.is_ignored(&root.join(f), false));
        let files = &self.files;
        self.test_cases.retain(|f, _| files.contains(f));
        self
    }
}

pub(crate) fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_entries_are_dropped() {
        let mut s = TestStructure::default();
        s.folders.insert("Legacy".to_string());
        s.folders.insert("Login".to_string());
        s.files.insert("Legacy/test_old.py".to_string());
        s.test_cases.insert("Legacy/test_old.py".to_string(), FileTests::new());

        let skip_legacy = |p: &Path| p.components().any(|c| c.as_os_str() == "Legacy");
        let s = s.without_ignored(Path::new("/suite"), &skip_legacy);
        assert_eq!(s.folders.iter().collect::<Vec<_>>(), vec!["Login"]);
        assert!(s.files.is_empty());
        assert!(s.test_cases.is_empty());
    }

    #[test]
    fn join_skips_empty_parent() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a", "b"), "a/b");
    }
}
