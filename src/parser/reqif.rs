//! ReqIF document reader.
//!
//! Two passes over the document:
//!
//! 1. **Objects**: every `SPEC-OBJECT` becomes a detached [`SpecNode`],
//!    indexed by its `IDENTIFIER`.
//! 2. **Hierarchy**: `SPECIFICATION/CHILDREN/SPEC-HIERARCHY` entries are
//!    walked recursively and each referenced node is attached under its
//!    parent entry's node (or as a root).
//!
//! The XML namespace is taken from the root element, so exports from
//! different tool versions parse alike. Problems are collected as
//! diagnostics; the caller always gets a [`SpecDocument`].

use crate::model::{DocumentHeader, NodeId, NodeKind, SpecDocument, SpecNode};
use crate::parser::params::decode_parameters;
use roxmltree::Node;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, warn};

#[derive(Debug, Error)]
pub enum ReqifError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("{0} not found in the ReqIF document")]
    MissingSection(&'static str),
    #[error("SPEC-OBJECT without IDENTIFIER skipped")]
    MissingIdentifier,
    #[error("duplicate SPEC-OBJECT identifier '{0}', keeping the first")]
    DuplicateIdentifier(String),
    #[error("SPEC-HIERARCHY without OBJECT/SPEC-OBJECT-REF skipped")]
    MissingReference,
    #[error("SPEC-HIERARCHY references unknown SPEC-OBJECT '{0}'")]
    UnknownObject(String),
    #[error("SPEC-OBJECT '{0}' is referenced more than once in the hierarchy")]
    AlreadyAttached(String),
}

/// Element lookup scoped to the document's namespace.
#[derive(Clone, Copy)]
struct Ns<'a>(Option<&'a str>);

impl<'a> Ns<'a> {
    fn is(&self, node: Node, name: &str) -> bool {
        node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == self.0
    }

    fn child<'b, 'i>(&self, node: Node<'b, 'i>, name: &str) -> Option<Node<'b, 'i>> {
        node.children().find(|c| self.is(*c, name))
    }

    fn children<'b, 'i>(&self, node: Node<'b, 'i>, name: &str) -> Vec<Node<'b, 'i>> {
        node.children().filter(|c| self.is(*c, name)).collect()
    }

    fn descendant<'b, 'i>(&self, node: Node<'b, 'i>, name: &str) -> Option<Node<'b, 'i>> {
        node.descendants().find(|c| self.is(*c, name))
    }

    /// Follow a chain of child element names.
    fn path<'b, 'i>(&self, node: Node<'b, 'i>, names: &[&str]) -> Option<Node<'b, 'i>> {
        names.iter().try_fold(node, |current, name| self.child(current, name))
    }

    fn path_text(&self, node: Node, names: &[&str]) -> Option<String> {
        self.path(node, names)
            .and_then(|n| n.text())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

/// Parse a ReqIF file. Never fails; see [`SpecDocument::diagnostics`].
pub fn parse_file(path: &Path) -> SpecDocument {
    match fs::read_to_string(path) {
        Ok(content) => parse_str(&content),
        Err(source) => {
            let mut doc = SpecDocument::default();
            abort(
                &mut doc,
                ReqifError::Read {
                    path: path.display().to_string(),
                    source,
                },
            );
            doc
        }
    }
}

/// Parse ReqIF content held in memory.
pub fn parse_str(content: &str) -> SpecDocument {
    let mut doc = SpecDocument::default();
    if let Err(e) = parse_into(content, &mut doc) {
        abort(&mut doc, e);
    }
    doc
}

fn abort(doc: &mut SpecDocument, e: ReqifError) {
    error!("error parsing ReqIF document: {}", e);
    doc.diagnostics.push(e.to_string());
}

fn report(doc: &mut SpecDocument, e: ReqifError) {
    warn!("{}", e);
    doc.diagnostics.push(e.to_string());
}

fn parse_into(content: &str, doc: &mut SpecDocument) -> Result<(), ReqifError> {
    let xml = roxmltree::Document::parse(content)?;
    let root = xml.root_element();
    let ns = Ns(root.tag_name().namespace());
    debug!(namespace = ?ns.0, "resolved ReqIF namespace");

    doc.header = read_header(root, ns);

    let core = ns
        .descendant(root, "CORE-CONTENT")
        .ok_or(ReqifError::MissingSection("CORE-CONTENT"))?;
    let content = ns
        .child(core, "REQ-IF-CONTENT")
        .ok_or(ReqifError::MissingSection("REQ-IF-CONTENT"))?;
    let objects = ns
        .child(content, "SPEC-OBJECTS")
        .ok_or(ReqifError::MissingSection("SPEC-OBJECTS"))?;
    let index = read_spec_objects(objects, ns, doc);

    let specifications = ns
        .child(content, "SPECIFICATIONS")
        .ok_or(ReqifError::MissingSection("SPECIFICATIONS"))?;
    for specification in ns.children(specifications, "SPECIFICATION") {
        if let Some(children) = ns.child(specification, "CHILDREN") {
            for hierarchy in ns.children(children, "SPEC-HIERARCHY") {
                build_hierarchy(hierarchy, None, ns, &index, doc);
            }
        }
    }
    debug!(
        objects = index.len(),
        roots = doc.forest.roots().len(),
        "parsed ReqIF hierarchy"
    );
    Ok(())
}

fn read_header(root: Node, ns: Ns) -> DocumentHeader {
    let Some(header) = ns.path(root, &["THE-HEADER", "REQ-IF-HEADER"]) else {
        return DocumentHeader::default();
    };
    DocumentHeader {
        identifier: header.attribute("IDENTIFIER").map(str::to_string),
        title: ns.path_text(header, &["TITLE"]),
        comment: ns.path_text(header, &["COMMENT"]),
        creation_time: ns.path_text(header, &["CREATION-TIME"]),
        source_tool_id: ns.path_text(header, &["SOURCE-TOOL-ID"]),
    }
}

fn read_spec_objects(objects: Node, ns: Ns, doc: &mut SpecDocument) -> HashMap<String, NodeId> {
    let mut index = HashMap::new();
    for object in ns.children(objects, "SPEC-OBJECT") {
        let Some(identifier) = object.attribute("IDENTIFIER") else {
            report(doc, ReqifError::MissingIdentifier);
            continue;
        };
        if index.contains_key(identifier) {
            report(doc, ReqifError::DuplicateIdentifier(identifier.to_string()));
            continue;
        }

        let type_ref = ns
            .path_text(object, &["TYPE", "SPEC-OBJECT-TYPE-REF"])
            .unwrap_or_default();
        let mut node = SpecNode::new(identifier, NodeKind::from_type_ref(&type_ref));

        if let Some(values) = ns.child(object, "VALUES") {
            for attr in ns.children(values, "ATTRIBUTE-VALUE-STRING") {
                let Some(definition) =
                    ns.path_text(attr, &["DEFINITION", "ATTRIBUTE-DEFINITION-STRING-REF"])
                else {
                    debug!(object = identifier, "attribute value without definition ref");
                    continue;
                };
                let value = attr.attribute("THE-VALUE").unwrap_or_default();
                apply_attribute(&mut node, &definition, value, &mut doc.diagnostics);
            }
        }

        let id = doc.forest.insert(node);
        index.insert(identifier.to_string(), id);
    }
    index
}

/// Store one string attribute into the matching node field.
fn apply_attribute(node: &mut SpecNode, definition: &str, value: &str, diagnostics: &mut Vec<String>) {
    match definition {
        "_Requirement_Title" | "_Test_Title" | "_TestCase_Title" => node.label = value.to_string(),
        "_Requirement_Description" | "_Test_Description" | "_TestCase_Description" => {
            node.description = value.to_string()
        }
        "_Priority" => node.priority = value.to_string(),
        "_Status" => node.status = value.to_string(),
        "_Steps" => node.steps = split_list(value),
        "_Prerequisites" => node.prerequisites = split_list(value),
        "_TestData" => node.test_data = split_list(value),
        "_ExpectedResults" => node.expected_results = split_list(value),
        "_Parameters" => node.parameters = decode_parameters(&node.id, value, diagnostics),
        other => debug!(object = %node.id, definition = other, "ignoring unknown attribute"),
    }
}

/// Comma-separated attribute → trimmed, non-empty items.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn build_hierarchy(
    hierarchy: Node,
    parent: Option<NodeId>,
    ns: Ns,
    index: &HashMap<String, NodeId>,
    doc: &mut SpecDocument,
) {
    let Some(object_ref) = ns.path_text(hierarchy, &["OBJECT", "SPEC-OBJECT-REF"]) else {
        report(doc, ReqifError::MissingReference);
        return;
    };
    let Some(&node) = index.get(&object_ref) else {
        report(doc, ReqifError::UnknownObject(object_ref));
        return;
    };
    if doc.forest.attach(node, parent).is_err() {
        report(doc, ReqifError::AlreadyAttached(object_ref));
        return;
    }

    if let Some(children) = ns.child(hierarchy, "CHILDREN") {
        for child in ns.children(children, "SPEC-HIERARCHY") {
            build_hierarchy(child, Some(node), ns, index, doc);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParamType;
    use serde_json::json;

    fn object(id: &str, type_ref: &str, attrs: &[(&str, &str)]) -> String {
        let values: String = attrs
            .iter()
            .map(|(def, value)| {
                format!(
                    "<ATTRIBUTE-VALUE-STRING THE-VALUE=\"{}\"><DEFINITION><ATTRIBUTE-DEFINITION-STRING-REF>{}</ATTRIBUTE-DEFINITION-STRING-REF></DEFINITION></ATTRIBUTE-VALUE-STRING>",
                    value, def
                )
            })
            .collect();
        format!(
            "<SPEC-OBJECT IDENTIFIER=\"{}\"><TYPE><SPEC-OBJECT-TYPE-REF>{}</SPEC-OBJECT-TYPE-REF></TYPE><VALUES>{}</VALUES></SPEC-OBJECT>",
            id, type_ref, values
        )
    }

    fn document(ns: &str, objects: &str, hierarchy: &str) -> String {
        format!(
            "<REQ-IF xmlns=\"{ns}\"><THE-HEADER><REQ-IF-HEADER IDENTIFIER=\"PRJ-1\"><TITLE>Demo</TITLE></REQ-IF-HEADER></THE-HEADER><CORE-CONTENT><REQ-IF-CONTENT><SPEC-OBJECTS>{objects}</SPEC-OBJECTS><SPECIFICATIONS><SPECIFICATION><CHILDREN>{hierarchy}</CHILDREN></SPECIFICATION></SPECIFICATIONS></REQ-IF-CONTENT></CORE-CONTENT></REQ-IF>"
        )
    }

    fn entry(reference: &str, children: &str) -> String {
        format!(
            "<SPEC-HIERARCHY><OBJECT><SPEC-OBJECT-REF>{}</SPEC-OBJECT-REF></OBJECT><CHILDREN>{}</CHILDREN></SPEC-HIERARCHY>",
            reference, children
        )
    }

    fn login_objects() -> String {
        [
            object("REQ-1", "_RequirementType", &[("_Requirement_Title", "Login")]),
            object("TG-1", "_TestType", &[("_Test_Title", "Auth Checks")]),
            object(
                "TC-1",
                "_TestCaseType",
                &[
                    ("_TestCase_Title", "Valid Login"),
                    ("_TestCase_Description", "User logs in"),
                    ("_Priority", "High"),
                    ("_Steps", "Open page, Enter credentials"),
                    (
                        "_Parameters",
                        "[{&quot;name&quot;:&quot;username&quot;,&quot;type&quot;:&quot;string&quot;,&quot;value&quot;:[&quot;a&quot;,&quot;b&quot;]}]",
                    ),
                ],
            ),
        ]
        .concat()
    }

    fn login_hierarchy() -> String {
        entry("REQ-1", &entry("TG-1", &entry("TC-1", "")))
    }

    #[test]
    fn parses_login_scenario() {
        let doc = parse_str(&document(
            "http://www.omg.org/spec/ReqIF/20110401/reqif.xsd",
            &login_objects(),
            &login_hierarchy(),
        ));
        assert!(doc.diagnostics.is_empty(), "{:?}", doc.diagnostics);
        assert_eq!(doc.forest.roots().len(), 1);

        let req = doc.forest.roots()[0];
        assert_eq!(doc.forest.node(req).label, "Login");
        assert_eq!(doc.forest.node(req).kind, NodeKind::Requirement);

        let (group, group_node) = doc.forest.children(req).next().unwrap();
        assert_eq!(group_node.label, "Auth Checks");
        let (_, case) = doc.forest.children(group).next().unwrap();
        assert_eq!(case.id, "TC-1");
        assert_eq!(case.priority, "High");
        assert_eq!(case.steps, vec!["Open page", "Enter credentials"]);
        assert_eq!(case.parameters[0].param_type, ParamType::String);
        assert_eq!(case.parameters[0].values, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn namespace_is_read_from_root() {
        let doc = parse_str(&document("urn:other-tool", &login_objects(), &login_hierarchy()));
        assert_eq!(doc.forest.roots().len(), 1);
    }

    #[test]
    fn header_is_read() {
        let doc = parse_str(&document("urn:x", &login_objects(), &login_hierarchy()));
        assert_eq!(doc.header.project_id(), Some("PRJ-1"));
        assert_eq!(doc.header.title.as_deref(), Some("Demo"));
    }

    #[test]
    fn unknown_reference_skips_only_that_subtree() {
        let hierarchy = entry("REQ-1", &[entry("MISSING", &entry("TC-1", "")), entry("TG-1", "")].concat());
        let doc = parse_str(&document("urn:x", &login_objects(), &hierarchy));

        let req = doc.forest.roots()[0];
        let children: Vec<_> = doc.forest.children(req).map(|(_, n)| n.id.clone()).collect();
        assert_eq!(children, vec!["TG-1"]);
        assert!(doc.diagnostics.iter().any(|d| d.contains("'MISSING'")));
    }

    #[test]
    fn node_attached_only_once() {
        let hierarchy = [entry("REQ-1", ""), entry("REQ-1", "")].concat();
        let doc = parse_str(&document("urn:x", &login_objects(), &hierarchy));
        assert_eq!(doc.forest.roots().len(), 1);
        assert!(doc.diagnostics.iter().any(|d| d.contains("more than once")));
    }

    #[test]
    fn missing_specifications_yields_empty_forest() {
        let xml = "<REQ-IF xmlns=\"urn:x\"><CORE-CONTENT><REQ-IF-CONTENT><SPEC-OBJECTS/></REQ-IF-CONTENT></CORE-CONTENT></REQ-IF>";
        let doc = parse_str(xml);
        assert!(doc.forest.is_empty());
        assert_eq!(doc.diagnostics, vec!["SPECIFICATIONS not found in the ReqIF document"]);
    }

    #[test]
    fn malformed_xml_yields_empty_forest() {
        let doc = parse_str("<REQ-IF><unclosed>");
        assert!(doc.forest.is_empty());
        assert!(doc.diagnostics[0].starts_with("malformed XML"));
    }

    #[test]
    fn malformed_parameters_do_not_abort() {
        let objects = [
            object("REQ-1", "_RequirementType", &[("_Requirement_Title", "Login")]),
            object("TG-1", "_TestType", &[("_Test_Title", "Auth")]),
            object("TC-1", "_TestCaseType", &[("_TestCase_Title", "Case"), ("_Parameters", "[oops")]),
        ]
        .concat();
        let doc = parse_str(&document("urn:x", &objects, &login_hierarchy()));

        let req = doc.forest.roots()[0];
        let (group, _) = doc.forest.children(req).next().unwrap();
        let (_, case) = doc.forest.children(group).next().unwrap();
        assert!(case.parameters.is_empty());
        assert_eq!(doc.diagnostics.len(), 1);
    }

    #[test]
    fn missing_file_reported() {
        let doc = parse_file(Path::new("/nonexistent/spec.reqif"));
        assert!(doc.forest.is_empty());
        assert!(doc.diagnostics[0].starts_with("failed to read"));
    }
}
