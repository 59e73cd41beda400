//! Interpretation of pytest marker annotations.
//!
//! The generator owns four markers: `project_id`, `meta`, `parametrize` and
//! `skip`. Everything else is [`Annotation::Foreign`] and is carried through
//! regeneration untouched.

use crate::source::literal::{parse_call_args, CallArg};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// `@pytest.mark.skip` or `@pytest.mark.skip(...)`, but not `skipif`.
static RE_SKIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@\s*pytest\.mark\.skip\b\s*(\(|$)").unwrap());

#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    ProjectId(Option<Value>),
    /// Keyword → literal value; unevaluable values are `Null`.
    Meta(Map<String, Value>),
    Parametrize { name: Option<String>, values: Value },
    Skip,
    Foreign,
}

impl Annotation {
    /// Whether regeneration replaces this annotation with a fresh rendering.
    pub fn is_generated(&self) -> bool {
        !matches!(self, Annotation::Foreign)
    }
}

/// True when the annotation block is a skip marker.
pub fn is_skip(block: &str) -> bool {
    RE_SKIP.is_match(block.trim_start())
}

/// Interpret one annotation block (possibly spanning several lines).
pub fn interpret(block: &str) -> Annotation {
    let block = block.trim();
    if is_skip(block) {
        return Annotation::Skip;
    }
    let Some((marker, args)) = split_call(block) else {
        return Annotation::Foreign;
    };

    match marker.as_str() {
        "pytest.mark.meta" => {
            let mut fields = Map::new();
            for CallArg { keyword, value } in parse_call_args(args) {
                if let Some(keyword) = keyword {
                    fields.insert(keyword, value.unwrap_or(Value::Null));
                }
            }
            Annotation::Meta(fields)
        }
        "pytest.mark.parametrize" => {
            let mut positional = parse_call_args(args).into_iter().filter(|a| a.keyword.is_none());
            let name = positional
                .next()
                .and_then(|a| a.value)
                .and_then(|v| v.as_str().map(str::to_string));
            let values = positional.next().and_then(|a| a.value).unwrap_or(Value::Null);
            Annotation::Parametrize { name, values }
        }
        "pytest.mark.project_id" => {
            let value = parse_call_args(args).into_iter().next().and_then(|a| a.value);
            Annotation::ProjectId(value)
        }
        _ => Annotation::Foreign,
    }
}

/// `@a.b.c(args)` → (`a.b.c`, `args`). Whitespace inside the dotted name is
/// dropped so multi-line markers still resolve.
fn split_call(block: &str) -> Option<(String, &str)> {
    let rest = block.strip_prefix('@')?;
    let open = rest.find('(')?;
    let close = rest.rfind(')')?;
    if close < open {
        return None;
    }
    let marker: String = rest[..open].chars().filter(|c| !c.is_whitespace()).collect();
    Some((marker, &rest[open + 1..close]))
}
