//! Incremental synchronization of a test suite with its specification.
//!
//! Folders are created for requirements, and each test group's file is
//! created or reconciled through [`render_module`]. Existing bodies, skip
//! markers, hand-written tests and preambles survive regeneration; a file is
//! only rewritten when its content actually changes.

use crate::ignore::IgnoreMatcher;
use crate::model::SpecDocument;
use crate::render::{render_module, CaseStub};
use crate::source::{scan, ScannedFile};
use crate::structure::expected::{layout, Entry};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What one synchronization run did, by relative path.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    pub folders_created: Vec<String>,
    pub files_created: Vec<String>,
    pub files_updated: Vec<String>,
    pub files_unchanged: Vec<String>,
    /// Vetoed by the ignore matcher, below a folder that was, or not
    /// readable as UTF-8 text.
    pub ignored: Vec<String>,
}

impl SyncReport {
    pub fn changed(&self) -> bool {
        !(self.folders_created.is_empty() && self.files_created.is_empty() && self.files_updated.is_empty())
    }
}

pub struct Synchronizer<'a> {
    doc: &'a SpecDocument,
    root: PathBuf,
    ignore: Option<&'a dyn IgnoreMatcher>,
}

impl<'a> Synchronizer<'a> {
    pub fn new(doc: &'a SpecDocument, root: impl Into<PathBuf>) -> Self {
        Self {
            doc,
            root: root.into(),
            ignore: None,
        }
    }

    pub fn with_ignore(mut self, matcher: &'a dyn IgnoreMatcher) -> Self {
        self.ignore = Some(matcher);
        self
    }

    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        self.ignore.is_some_and(|m| m.is_ignored(path, is_dir))
    }

    /// Walk the specification and bring the tree under `root` in line with it.
    ///
    /// `root` itself must already exist.
    pub fn run(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let project_id = self.doc.header.project_id();

        for entry in layout(&self.doc.forest) {
            let rel = entry.path().to_string();
            let path = self.root.join(&rel);
            let is_dir = matches!(entry, Entry::Folder { .. });

            if self.is_ignored(&path, is_dir) {
                debug!(path = %rel, "ignored");
                report.ignored.push(rel);
                continue;
            }
            if !path.parent().is_some_and(Path::is_dir) {
                warn!(path = %rel, "parent folder missing, skipped");
                report.ignored.push(rel);
                continue;
            }

            match entry {
                Entry::Folder { .. } => {
                    if !path.is_dir() {
                        fs::create_dir(&path)
                            .with_context(|| format!("failed to create folder {}", path.display()))?;
                        debug!(path = %rel, "folder created");
                        report.folders_created.push(rel);
                    }
                }
                Entry::File { cases, .. } => {
                    let stubs: Vec<CaseStub<'_>> = cases
                        .iter()
                        .map(|(name, node)| CaseStub { name, node })
                        .collect();
                    self.sync_file(&path, rel, &stubs, project_id, &mut report)?;
                }
            }
        }

        info!(
            folders_created = report.folders_created.len(),
            files_created = report.files_created.len(),
            files_updated = report.files_updated.len(),
            files_unchanged = report.files_unchanged.len(),
            ignored = report.ignored.len(),
            "synchronization finished"
        );
        Ok(report)
    }

    fn sync_file(
        &self,
        path: &Path,
        rel: String,
        cases: &[CaseStub<'_>],
        project_id: Option<&str>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let previous = if path.exists() {
            let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            match String::from_utf8(bytes) {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(path = %rel, error = %e, "not valid UTF-8, left untouched");
                    report.ignored.push(rel);
                    return Ok(());
                }
            }
        } else {
            None
        };

        let scanned = previous.as_deref().map(scan).unwrap_or_default();
        let content = render_module(cases, &scanned, project_id);
        log_orphans(&rel, cases, &scanned);

        match previous {
            Some(old) if old == content => {
                debug!(path = %rel, "unchanged");
                report.files_unchanged.push(rel);
            }
            Some(_) => {
                fs::write(path, &content).with_context(|| format!("failed to write {}", path.display()))?;
                debug!(path = %rel, "updated");
                report.files_updated.push(rel);
            }
            None => {
                fs::write(path, &content).with_context(|| format!("failed to write {}", path.display()))?;
                debug!(path = %rel, tests = cases.len(), "created");
                report.files_created.push(rel);
            }
        }
        Ok(())
    }
}

fn log_orphans(rel: &str, cases: &[CaseStub<'_>], scanned: &ScannedFile) {
    for func in &scanned.functions {
        let bare = func.name.strip_prefix("test_").unwrap_or(&func.name);
        if !cases.iter().any(|c| c.name == bare) {
            debug!(path = %rel, function = %func.name, "kept test without specification entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeKind, ParamType, Parameter, SpecNode};
    use serde_json::json;
    use tempfile::TempDir;

    const FILE: &str = "Login/test_Auth_Checks.py";

    fn login_doc(label: &str) -> SpecDocument {
        let mut doc = SpecDocument::default();
        doc.header.identifier = Some("PRJ-42".to_string());
        let forest = &mut doc.forest;
        let req = forest.add(SpecNode::new("REQ-1", NodeKind::Requirement).with_label("Login"), None);
        let group = forest.add(SpecNode::new("TG-1", NodeKind::TestGroup).with_label("Auth Checks"), Some(req));
        let mut case = SpecNode::new("TC-1", NodeKind::TestCase).with_label(label);
        case.parameters = vec![Parameter {
            name: "username".to_string(),
            param_type: ParamType::String,
            values: vec![json!("a"), json!("b")],
        }];
        forest.add(case, Some(group));
        doc
    }

    #[test]
    fn generates_fresh_tree() {
        let dir = TempDir::new().unwrap();
        let doc = login_doc("Valid Login");
        let report = Synchronizer::new(&doc, dir.path()).run().unwrap();

        assert_eq!(report.folders_created, vec!["Login"]);
        assert_eq!(report.files_created, vec![FILE]);
        let content = fs::read_to_string(dir.path().join(FILE)).unwrap();
        assert!(content.contains("@pytest.mark.parametrize(\"username\", [\"a\", \"b\"])"));
        assert!(content.contains("@pytest.mark.skip(reason=\"Not implemented yet.\")"));
        assert!(content.contains("def test_Valid_Login(username):"));
    }

    #[test]
    fn second_run_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let doc = login_doc("Valid Login");
        Synchronizer::new(&doc, dir.path()).run().unwrap();
        let first = fs::read_to_string(dir.path().join(FILE)).unwrap();

        let report = Synchronizer::new(&doc, dir.path()).run().unwrap();
        assert!(!report.changed());
        assert_eq!(report.files_unchanged, vec![FILE]);
        assert_eq!(fs::read_to_string(dir.path().join(FILE)).unwrap(), first);
    }

    #[test]
    fn rename_keeps_old_function_as_orphan() {
        let dir = TempDir::new().unwrap();
        Synchronizer::new(&login_doc("Valid Login"), dir.path()).run().unwrap();
        let path = dir.path().join(FILE);
        let edited = fs::read_to_string(&path).unwrap().replace("    pass", "    return 42");
        fs::write(&path, edited).unwrap();

        let report = Synchronizer::new(&login_doc("Valid Sign In"), dir.path()).run().unwrap();
        assert_eq!(report.files_updated, vec![FILE]);
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("def test_Valid_Sign_In(username):"));
        assert!(content.contains("def test_Valid_Login(username):\n    # TODO"));
        assert!(content.contains("    return 42"));
    }

    #[test]
    fn undecodable_file_is_left_alone() {
        let dir = TempDir::new().unwrap();
        let doc = login_doc("Valid Login");
        fs::create_dir(dir.path().join("Login")).unwrap();
        let garbage = b"def test_x():\n    s = '\xff\xfe'\n".to_vec();
        fs::write(dir.path().join(FILE), &garbage).unwrap();

        let report = Synchronizer::new(&doc, dir.path()).run().unwrap();
        assert_eq!(report.ignored, vec![FILE]);
        assert!(!report.changed());
        assert_eq!(fs::read(dir.path().join(FILE)).unwrap(), garbage);
    }

    #[test]
    fn ignored_folder_is_not_created() {
        let dir = TempDir::new().unwrap();
        let doc = login_doc("Valid Login");
        let skip_login = |p: &Path| p.ends_with("Login");
        let report = Synchronizer::new(&doc, dir.path())
            .with_ignore(&skip_login)
            .run()
            .unwrap();

        assert!(!dir.path().join("Login").exists());
        assert_eq!(report.ignored, vec!["Login", FILE]);
        assert!(!report.changed());
    }
}
