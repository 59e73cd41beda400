//! Expected suite layout, derived from the specification forest.
//!
//! [`layout`] decides where every requirement folder, test file and test
//! function goes. The synchronizer writes that layout to disk and [`derive`]
//! turns it into a [`TestStructure`], so both always agree on names.

use crate::model::{NodeId, NodeKind, SpecDocument, SpecForest, SpecNode};
use crate::naming::ScopedNames;
use crate::render::test_file_name;
use crate::structure::{join, FileTests, TestDescriptor, TestStructure};
use serde_json::{Map, Value};
use tracing::debug;

/// One planned filesystem entry.
#[derive(Debug, Clone)]
pub enum Entry<'a> {
    Folder {
        path: String,
        node: &'a SpecNode,
    },
    File {
        path: String,
        node: &'a SpecNode,
        /// Bare function name and test case, in document order.
        cases: Vec<(String, &'a SpecNode)>,
    },
}

impl Entry<'_> {
    pub fn path(&self) -> &str {
        match self {
            Entry::Folder { path, .. } | Entry::File { path, .. } => path,
        }
    }
}

/// Plan the suite in depth-first document order; a folder always precedes
/// its contents.
pub fn layout(forest: &SpecForest) -> Vec<Entry<'_>> {
    let mut out = Vec::new();
    walk(forest, forest.roots(), "", &mut out);
    out
}

fn walk<'a>(forest: &'a SpecForest, ids: &[NodeId], parent: &str, out: &mut Vec<Entry<'a>>) {
    let mut folders = ScopedNames::default();
    let mut files = ScopedNames::default();

    for &id in ids {
        let node = forest.node(id);
        match node.kind {
            NodeKind::Requirement => {
                let path = join(parent, &folders.claim(&node.label, &node.id));
                out.push(Entry::Folder { path: path.clone(), node });
                walk(forest, node.children(), &path, out);
            }
            NodeKind::TestGroup => {
                let bare = files.claim(&node.label, &node.id);
                let path = join(parent, &test_file_name(&bare));
                let mut names = ScopedNames::default();
                let cases = forest
                    .children(id)
                    .map(|(_, child)| child)
                    .filter(|child| child.kind == NodeKind::TestCase)
                    .map(|child| (names.claim(&child.label, &child.id), child))
                    .collect();
                out.push(Entry::File { path, node, cases });
            }
            _ => debug!(id = %node.id, kind = %node.kind, "node skipped in layout"),
        }
    }
}

/// Descriptor of one test case as the specification describes it.
pub fn descriptor(node: &SpecNode, project_id: Option<&str>) -> TestDescriptor {
    let mut parameters = Map::new();
    for parameter in &node.parameters {
        parameters.insert(parameter.name.clone(), Value::from(parameter.values.clone()));
    }

    let mut desc = TestDescriptor::new();
    desc.insert("id".to_string(), Value::from(node.id.clone()));
    desc.insert("name".to_string(), Value::from(node.label.clone()));
    desc.insert("scenario".to_string(), Value::from(node.description.clone()));
    desc.insert("steps".to_string(), Value::from(node.steps.clone()));
    desc.insert("prerequisites".to_string(), Value::from(node.prerequisites.clone()));
    desc.insert("parameters".to_string(), Value::Object(parameters));
    if let Some(project_id) = project_id {
        desc.insert("project_id".to_string(), Value::from(project_id));
    }
    desc
}

/// The structure a fully generated suite for `doc` would have.
pub fn derive(doc: &SpecDocument) -> TestStructure {
    let project_id = doc.header.project_id();
    let mut structure = TestStructure::default();

    for entry in layout(&doc.forest) {
        match entry {
            Entry::Folder { path, .. } => {
                structure.folders.insert(path);
            }
            Entry::File { path, cases, .. } => {
                let tests: FileTests = cases
                    .into_iter()
                    .map(|(name, node)| (name, descriptor(node, project_id)))
                    .collect();
                structure.files.insert(path.clone());
                structure.test_cases.insert(path, tests);
            }
        }
    }
    structure
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn login_doc() -> SpecDocument {
        let mut doc = SpecDocument::default();
        let forest = &mut doc.forest;
        let req = forest.add(SpecNode::new("REQ-1", NodeKind::Requirement).with_label("Login"), None);
        let group = forest.add(SpecNode::new("TG-1", NodeKind::TestGroup).with_label("Auth Checks"), Some(req));
        forest.add(SpecNode::new("TC-1", NodeKind::TestCase).with_label("Valid Login"), Some(group));
        forest.add(SpecNode::new("TC-2", NodeKind::TestCase).with_label("Valid-Login"), Some(group));
        forest.add(
            SpecNode::new("H-1", NodeKind::Other("_Heading".to_string())).with_label("Notes"),
            Some(req),
        );
        doc
    }

    #[test]
    fn derives_folders_files_and_tests() {
        let structure = derive(&login_doc());
        assert_eq!(structure.folders.iter().collect::<Vec<_>>(), vec!["Login"]);
        assert_eq!(structure.files.iter().collect::<Vec<_>>(), vec!["Login/test_Auth_Checks.py"]);

        let tests = &structure.test_cases["Login/test_Auth_Checks.py"];
        assert_eq!(tests.keys().collect::<Vec<_>>(), vec!["Valid_Login", "Valid_Login_TC_2"]);
        assert_eq!(tests["Valid_Login"]["id"], json!("TC-1"));
        assert_eq!(tests["Valid_Login"]["parameters"], json!({}));
        assert!(structure.skipped_tests.is_none());
    }

    #[test]
    fn unknown_kinds_contribute_nothing() {
        let doc = login_doc();
        let entries = layout(&doc.forest);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| !e.path().contains("Notes")));
    }

    #[test]
    fn project_id_lands_in_descriptor() {
        let mut doc = login_doc();
        doc.header.identifier = Some("PRJ-42".to_string());
        let structure = derive(&doc);
        let desc = &structure.test_cases["Login/test_Auth_Checks.py"]["Valid_Login"];
        assert_eq!(desc["project_id"], json!("PRJ-42"));
    }

    #[test]
    fn colliding_folders_are_disambiguated() {
        let mut doc = SpecDocument::default();
        doc.forest.add(SpecNode::new("R-1", NodeKind::Requirement).with_label("A B"), None);
        doc.forest.add(SpecNode::new("R-2", NodeKind::Requirement).with_label("A-B"), None);
        let structure = derive(&doc);
        assert!(structure.folders.contains("A_B"));
        assert!(structure.folders.contains("A_B_R_2"));
    }
}
