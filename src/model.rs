//! Specification forest of requirements, test groups and test cases.
//!
//! Nodes live in an arena owned by [`SpecForest`] and refer to each other by
//! [`NodeId`]. A node is attached at most once, so parent/child edges always
//! form a forest.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// Index of a node inside its [`SpecForest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// The three recognized node kinds, plus whatever else the export contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NodeKind {
    Requirement,
    TestGroup,
    TestCase,
    Other(String),
}

impl NodeKind {
    /// Map a `SPEC-OBJECT-TYPE-REF` value onto a node kind.
    pub fn from_type_ref(type_ref: &str) -> Self {
        match type_ref {
            "_RequirementType" => NodeKind::Requirement,
            "_TestType" => NodeKind::TestGroup,
            "_TestCaseType" => NodeKind::TestCase,
            other => NodeKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Requirement => write!(f, "Requirement"),
            NodeKind::TestGroup => write!(f, "TestGroup"),
            NodeKind::TestCase => write!(f, "TestCase"),
            NodeKind::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Declared type of a parameter axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Bool,
    Int,
    Float,
    Array,
    /// Explicit `string` or anything unrecognized.
    String,
}

impl ParamType {
    pub fn from_declared(declared: &str) -> Self {
        match declared {
            "bool" => ParamType::Bool,
            "int" => ParamType::Int,
            "float" => ParamType::Float,
            "array" => ParamType::Array,
            _ => ParamType::String,
        }
    }
}

/// One parametrization axis of a test case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    /// Values already coerced to `param_type`.
    pub values: Vec<Value>,
}

/// One node of the specification forest.
#[derive(Debug, Clone, Serialize)]
pub struct SpecNode {
    pub id: String,
    pub label: String,
    pub description: String,
    pub kind: NodeKind,
    pub priority: String,
    pub status: String,
    pub steps: Vec<String>,
    pub prerequisites: Vec<String>,
    pub test_data: Vec<String>,
    pub expected_results: Vec<String>,
    pub parameters: Vec<Parameter>,
    #[serde(skip)]
    parent: Option<NodeId>,
    #[serde(skip)]
    children: Vec<NodeId>,
    #[serde(skip)]
    attached: bool,
}

impl SpecNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            description: String::new(),
            kind,
            priority: String::new(),
            status: String::new(),
            steps: Vec::new(),
            prerequisites: Vec::new(),
            test_data: Vec::new(),
            expected_results: Vec::new(),
            parameters: Vec::new(),
            parent: None,
            children: Vec::new(),
            attached: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Returned when a node is attached a second time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlreadyAttached;

/// Arena of specification nodes plus the ordered list of roots.
#[derive(Debug, Default)]
pub struct SpecForest {
    nodes: Vec<SpecNode>,
    roots: Vec<NodeId>,
}

impl SpecForest {
    /// Store a detached node; it becomes reachable only once attached.
    pub fn insert(&mut self, node: SpecNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Attach `child` under `parent`, or as a root when `parent` is `None`.
    pub fn attach(&mut self, child: NodeId, parent: Option<NodeId>) -> Result<(), AlreadyAttached> {
        if self.nodes[child.0].attached {
            return Err(AlreadyAttached);
        }
        self.nodes[child.0].attached = true;
        self.nodes[child.0].parent = parent;
        match parent {
            Some(p) => self.nodes[p.0].children.push(child),
            None => self.roots.push(child),
        }
        Ok(())
    }

    /// Insert and attach in one step.
    pub fn add(&mut self, node: SpecNode, parent: Option<NodeId>) -> NodeId {
        let id = self.insert(node);
        // A freshly inserted node cannot already be attached.
        let _ = self.attach(id, parent);
        id
    }

    pub fn node(&self, id: NodeId) -> &SpecNode {
        &self.nodes[id.0]
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Children of `id` in document order.
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = (NodeId, &SpecNode)> {
        self.nodes[id.0]
            .children
            .iter()
            .map(move |&child| (child, &self.nodes[child.0]))
    }

    /// Nested JSON rendering of the reachable forest.
    pub fn to_json(&self) -> Value {
        Value::Array(self.roots.iter().map(|&id| self.node_json(id)).collect())
    }

    fn node_json(&self, id: NodeId) -> Value {
        let node = self.node(id);
        let mut object = match serde_json::to_value(node) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        object.insert("kind".to_string(), Value::String(node.kind.to_string()));
        let children = node.children.iter().map(|&c| self.node_json(c)).collect();
        object.insert("children".to_string(), Value::Array(children));
        Value::Object(object)
    }
}

/// Optional `REQ-IF-HEADER` information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentHeader {
    pub identifier: Option<String>,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub creation_time: Option<String>,
    pub source_tool_id: Option<String>,
}

impl DocumentHeader {
    /// Project identifier stamped onto generated tests.
    pub fn project_id(&self) -> Option<&str> {
        self.identifier.as_deref().filter(|id| !id.is_empty())
    }
}

/// Result of parsing one specification document.
///
/// `diagnostics` collects every recoverable problem met while parsing; the
/// forest holds whatever could be resolved.
#[derive(Debug, Default)]
pub struct SpecDocument {
    pub header: DocumentHeader,
    pub forest: SpecForest,
    pub diagnostics: Vec<String>,
}
