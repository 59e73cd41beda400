//! Existing suite structure, extracted from a directory on disk.

use crate::ignore::IgnoreMatcher;
use crate::source::annotations::{interpret, Annotation};
use crate::source::scan;
use crate::structure::{FileTests, TestDescriptor, TestStructure};
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Component, Path};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// Directories never treated as part of the suite.
const EXCLUDED_DIRS: &[&str] = &["__pycache__", ".pytest_cache", "node_modules"];

fn is_test_file(name: &str) -> bool {
    name.starts_with("test_") && name.ends_with(".py")
}

fn is_excluded(entry: &DirEntry, ignore: Option<&dyn IgnoreMatcher>) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let is_dir = entry.file_type().is_dir();
    if is_dir {
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || EXCLUDED_DIRS.contains(&name.as_ref()) {
            return true;
        }
    }
    ignore.is_some_and(|m| m.is_ignored(entry.path(), is_dir))
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Walk `root` and describe every folder, test file and test function in it.
pub fn extract(root: &Path, ignore: Option<&dyn IgnoreMatcher>) -> Result<TestStructure> {
    let mut structure = TestStructure {
        skipped_tests: Some(Vec::new()),
        ..Default::default()
    };

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_excluded(e, ignore));

    for entry in walker {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if entry.depth() == 0 {
            continue;
        }
        let rel = relative(root, entry.path());

        if entry.file_type().is_dir() {
            structure.folders.insert(rel);
            continue;
        }
        if !entry.file_type().is_file() || !is_test_file(&entry.file_name().to_string_lossy()) {
            continue;
        }

        let bytes = fs::read(entry.path()).with_context(|| format!("failed to read {}", entry.path().display()))?;
        let content = match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %rel, error = %e, "not valid UTF-8, skipped");
                continue;
            }
        };
        let (tests, skipped) = parse_test_file(&content, &rel);
        debug!(file = %rel, tests = tests.len(), skipped = skipped.len(), "extracted");

        if let Some(all) = structure.skipped_tests.as_mut() {
            all.extend(skipped);
        }
        structure.files.insert(rel.clone());
        structure.test_cases.insert(rel, tests);
    }

    Ok(structure)
}

/// Descriptors of every test function in one file, plus the skipped ones as
/// `"<rel_file>\<bare name>"`.
pub fn parse_test_file(content: &str, rel_file: &str) -> (FileTests, Vec<String>) {
    let mut tests = FileTests::new();
    let mut skipped = Vec::new();

    for func in scan(content).functions {
        let bare = func.name.strip_prefix("test_").unwrap_or(&func.name).to_string();
        let mut desc = TestDescriptor::new();
        let mut parameters: Option<Map<String, Value>> = None;

        for block in &func.annotations {
            match interpret(block) {
                Annotation::Meta(fields) => desc.extend(fields),
                Annotation::Parametrize { name: Some(name), values } => {
                    let values = if values.is_null() { Value::Array(Vec::new()) } else { values };
                    parameters.get_or_insert_with(Map::new).insert(name, values);
                }
                Annotation::ProjectId(value) => {
                    desc.insert("project_id".to_string(), value.unwrap_or(Value::Null));
                }
                Annotation::Skip => skipped.push(format!("{}\\{}", rel_file, bare)),
                Annotation::Parametrize { name: None, .. } | Annotation::Foreign => {}
            }
        }
        if let Some(parameters) = parameters {
            desc.insert("parameters".to_string(), Value::Object(parameters));
        }
        tests.insert(bare, desc);
    }

    (tests, skipped)
}
