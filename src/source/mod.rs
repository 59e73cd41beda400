//! Restricted scanner for generated pytest modules.
//!
//! This is not a Python parser. Each line falls into one of three classes:
//!
//! | Class | Pattern |
//! |-------|---------|
//! | annotation start | `@…` at column 0 |
//! | definition start | `def test_…` / `async def test_…` at column 0 |
//! | other | everything else |
//!
//! Indented lines after an annotation (and before a definition) continue that
//! annotation. Annotations and definitions with unclosed brackets absorb the
//! following lines until the brackets balance. A test function's body runs until the next non-blank column-0
//! line. Top-level lines that belong to no test function form the preamble.
//!
//! Exact results are only guaranteed for files this tool wrote. Hand-written
//! files are best-effort: a column-0 comment inside a body, for example, ends
//! the body there and moves the rest of the function into the preamble.

pub mod annotations;
pub mod literal;

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

/// First line of every generated module; dropped when scanning.
pub const HEADER: &str = "import pytest";

static RE_TEST_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:async\s+)?def\s+(test_\w*)\s*\(").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    AnnotationStart,
    DefinitionStart,
    Other,
}

pub fn classify(line: &str) -> LineClass {
    if line.starts_with('@') {
        LineClass::AnnotationStart
    } else if RE_TEST_DEF.is_match(line) {
        LineClass::DefinitionStart
    } else {
        LineClass::Other
    }
}

/// A test function recovered from an existing file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingFunction {
    pub name: String,
    /// Annotation blocks in source order; multi-line blocks keep their newlines.
    pub annotations: Vec<String>,
    pub signature: String,
    pub body: Vec<String>,
    pub has_skip: bool,
}

impl ExistingFunction {
    pub fn body_text(&self) -> String {
        self.body.join("\n")
    }

    /// Annotations, signature and body, exactly as scanned.
    pub fn full_block_text(&self) -> String {
        let mut lines: Vec<&str> = self.annotations.iter().map(String::as_str).collect();
        lines.push(&self.signature);
        lines.extend(self.body.iter().map(String::as_str));
        lines.join("\n")
    }

    pub fn is_async(&self) -> bool {
        self.signature.starts_with("async")
    }
}

/// Everything the scanner recovered from one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScannedFile {
    pub preamble: Vec<String>,
    pub functions: Vec<ExistingFunction>,
}

impl ScannedFile {
    /// Last definition wins, as it does at import time.
    pub fn get(&self, name: &str) -> Option<&ExistingFunction> {
        self.functions.iter().rev().find(|f| f.name == name)
    }
}

fn is_top_level(line: &str) -> bool {
    !line.trim().is_empty() && !line.starts_with([' ', '\t'])
}

/// Scan a module's text.
pub fn scan(content: &str) -> ScannedFile {
    let mut out = ScannedFile::default();
    let mut pending: Vec<String> = Vec::new();
    let mut current: Option<ExistingFunction> = None;

    for line in content.lines() {
        if let Some(func) = current.as_mut() {
            // A wrapped signature runs until its brackets balance.
            if func.body.is_empty() && open_parens(&func.signature) > 0 && classify(line) == LineClass::Other {
                func.signature.push('\n');
                func.signature.push_str(line);
                continue;
            }
            if !is_top_level(line) {
                func.body.push(line.to_string());
                continue;
            }
            if let Some(done) = current.take() {
                if classify(line) == LineClass::Other {
                    debug!(function = %done.name, line, "top-level line ends test body");
                }
                out.functions.push(finish(done));
            }
        }

        if pending.last().is_some_and(|a| open_parens(a) > 0) {
            if let Some(last) = pending.last_mut() {
                last.push('\n');
                last.push_str(line);
            }
            continue;
        }

        match classify(line) {
            LineClass::AnnotationStart => pending.push(line.to_string()),
            LineClass::DefinitionStart => {
                let name = RE_TEST_DEF
                    .captures(line)
                    .map(|c| c[1].to_string())
                    .unwrap_or_default();
                let annotations = std::mem::take(&mut pending);
                let has_skip = annotations.iter().any(|a| annotations::is_skip(a));
                current = Some(ExistingFunction {
                    name,
                    annotations,
                    signature: line.to_string(),
                    body: Vec::new(),
                    has_skip,
                });
            }
            LineClass::Other => {
                if line.trim().is_empty() {
                    continue;
                }
                if !is_top_level(line) {
                    if let Some(last) = pending.last_mut() {
                        last.push('\n');
                        last.push_str(line);
                        continue;
                    }
                } else if line.trim_end() == HEADER {
                    continue;
                }
                // Decorators of a non-test definition belong with it.
                out.preamble.append(&mut pending);
                out.preamble.push(line.to_string());
            }
        }
    }

    if let Some(done) = current.take() {
        out.functions.push(finish(done));
    }
    if !pending.is_empty() {
        debug!(count = pending.len(), "dangling annotations moved to preamble");
        out.preamble.append(&mut pending);
    }
    out
}

/// Unclosed brackets in an annotation block, ignoring string contents.
fn open_parens(block: &str) -> i32 {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in block.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth
}

fn finish(mut func: ExistingFunction) -> ExistingFunction {
    while func.body.last().is_some_and(|l| l.trim().is_empty()) {
        func.body.pop();
    }
    func
}
