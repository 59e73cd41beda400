//! Rendering of pytest modules from specification test cases.
//!
//! A module is `import pytest`, the preserved preamble, one block per current
//! test case, then every previously existing test function that no longer has
//! a test case, copied verbatim. Blocks are separated by one blank line.

use crate::model::SpecNode;
use crate::source::annotations::{interpret, Annotation};
use crate::source::literal::{quote, split_top_level, to_python};
use crate::source::{ExistingFunction, ScannedFile, HEADER};
use serde_json::Value;
use std::collections::HashSet;

pub const SKIP_MARKER: &str = r#"@pytest.mark.skip(reason="Not implemented yet.")"#;

const PLACEHOLDER_BODY: [&str; 2] = [
    "    # TODO: Implement test and remove the @pytest.mark.skip marker.",
    "    pass",
];

pub fn test_file_name(bare: &str) -> String {
    format!("test_{}.py", bare)
}

pub fn test_function_name(bare: &str) -> String {
    format!("test_{}", bare)
}

/// A test case together with the (already disambiguated) bare name it gets.
#[derive(Debug, Clone, Copy)]
pub struct CaseStub<'a> {
    pub name: &'a str,
    pub node: &'a SpecNode,
}

pub fn meta_line(node: &SpecNode) -> String {
    let steps = Value::from(node.steps.clone());
    let prerequisites = Value::from(node.prerequisites.clone());
    format!(
        "@pytest.mark.meta(id={}, scenario={}, steps={}, prerequisites={})",
        quote(&node.id),
        quote(&node.description),
        to_python(&steps),
        to_python(&prerequisites)
    )
}

fn parametrize_line(name: &str, values: &[Value]) -> String {
    format!(
        "@pytest.mark.parametrize({}, {})",
        quote(name),
        to_python(&Value::from(values.to_vec()))
    )
}

/// Render one test function. `existing` is the function of the same name
/// found in the file being regenerated, if any.
pub fn render_case(case: &CaseStub<'_>, existing: Option<&ExistingFunction>, project_id: Option<&str>) -> String {
    let node = case.node;
    let mut lines: Vec<String> = Vec::new();

    if let Some(project_id) = project_id {
        lines.push(format!("@pytest.mark.project_id({})", quote(project_id)));
    }
    lines.push(meta_line(node));
    for parameter in &node.parameters {
        lines.push(parametrize_line(&parameter.name, &parameter.values));
    }
    if let Some(func) = existing {
        lines.extend(
            func.annotations
                .iter()
                .filter(|block| !interpret(block).is_generated())
                .cloned(),
        );
    }
    // New tests start skipped; an existing skip stays until removed by hand.
    if existing.is_none_or(|func| func.has_skip) {
        lines.push(SKIP_MARKER.to_string());
    }

    let args = signature_args(node, existing);
    let prefix = if existing.is_some_and(ExistingFunction::is_async) {
        "async def"
    } else {
        "def"
    };
    lines.push(format!("{} {}({}):", prefix, test_function_name(case.name), args.join(", ")));

    match existing {
        Some(func) if !func.body.is_empty() => lines.extend(func.body.iter().cloned()),
        _ => lines.extend(PLACEHOLDER_BODY.iter().map(|l| l.to_string())),
    }
    lines.join("\n")
}

/// Parameter names, followed by any other arguments (fixtures) the existing
/// signature declared that were not generated from an earlier parametrization.
fn signature_args(node: &SpecNode, existing: Option<&ExistingFunction>) -> Vec<String> {
    let mut args: Vec<String> = node.parameters.iter().map(|p| p.name.clone()).collect();
    let Some(func) = existing else {
        return args;
    };

    let previously_generated: HashSet<String> = func
        .annotations
        .iter()
        .filter_map(|block| match interpret(block) {
            Annotation::Parametrize { name: Some(name), .. } => Some(name),
            _ => None,
        })
        .collect();

    let sig = &func.signature;
    let (Some(open), Some(close)) = (sig.find('('), sig.rfind(')')) else {
        return args;
    };
    if close <= open {
        return args;
    }
    for arg in split_top_level(&sig[open + 1..close]) {
        let arg = arg.trim();
        let name = arg.split([':', '=']).next().unwrap_or(arg).trim();
        if arg.is_empty() || previously_generated.contains(name) || args.iter().any(|a| a == name) {
            continue;
        }
        args.push(arg.to_string());
    }
    args
}

/// Render a whole module, reconciling against what the file held before.
pub fn render_module(cases: &[CaseStub<'_>], existing: &ScannedFile, project_id: Option<&str>) -> String {
    let wanted: HashSet<String> = cases.iter().map(|c| test_function_name(c.name)).collect();

    let mut sections: Vec<String> = Vec::new();
    if !existing.preamble.is_empty() {
        sections.push(existing.preamble.join("\n"));
    }
    for case in cases {
        let previous = existing.get(&test_function_name(case.name));
        sections.push(render_case(case, previous, project_id));
    }
    sections.extend(
        existing
            .functions
            .iter()
            .filter(|func| !wanted.contains(&func.name))
            .map(ExistingFunction::full_block_text),
    );

    let mut out = String::from(HEADER);
    out.push('\n');
    for section in sections {
        out.push('\n');
        out.push_str(&section);
        out.push('\n');
    }
    out
}
