//! Structural diff between the expected and the existing suite.
//!
//! Two matching passes run side by side. `missing_tests`/`extra_tests` match
//! tests by bare function name. `modified_tests` matches them by their `id`
//! metadata, restricted to files present on both sides, so a renamed test
//! shows up as a `name` change there and as a missing/extra pair here.

use crate::source::literal::parse_literal;
use crate::structure::{FileTests, TestDescriptor, TestStructure};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// `(existing, expected)` value of one changed field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange(pub Value, pub Value);

/// Field name → change, for one test id.
pub type TestChanges = BTreeMap<String, FieldChange>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Difference {
    pub missing_folders: BTreeSet<String>,
    pub extra_folders: BTreeSet<String>,
    pub missing_files: BTreeSet<String>,
    pub extra_files: BTreeSet<String>,
    /// Every expected file, with the tests absent on disk (possibly none).
    pub missing_tests: BTreeMap<String, FileTests>,
    /// Every existing file, with the tests the specification lacks.
    pub extra_tests: BTreeMap<String, FileTests>,
    pub modified_tests: BTreeMap<String, BTreeMap<String, TestChanges>>,
}

impl Difference {
    /// True when nothing differs at folder, file or test level.
    pub fn is_clean(&self) -> bool {
        self.missing_folders.is_empty()
            && self.extra_folders.is_empty()
            && self.missing_files.is_empty()
            && self.extra_files.is_empty()
            && self.missing_tests.values().all(BTreeMap::is_empty)
            && self.extra_tests.values().all(BTreeMap::is_empty)
            && self.modified_tests.is_empty()
    }
}

/// The report printed by `coverage`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    #[serde(flatten)]
    pub difference: Difference,
    pub skipped_tests: Vec<String>,
}

impl CoverageReport {
    pub fn new(existing: &TestStructure, expected: &TestStructure) -> Self {
        Self {
            difference: compare_structures(existing, expected),
            skipped_tests: existing.skipped_tests.clone().unwrap_or_default(),
        }
    }
}

/// Tests in `side` that `other` lacks, for every file of `files`.
fn tests_absent(
    files: &BTreeSet<String>,
    side: &BTreeMap<String, FileTests>,
    other: &BTreeMap<String, FileTests>,
) -> BTreeMap<String, FileTests> {
    files
        .iter()
        .map(|file| {
            let absent = side
                .get(file)
                .into_iter()
                .flatten()
                .filter(|(name, _)| !other.get(file).is_some_and(|tests| tests.contains_key(*name)))
                .map(|(name, desc)| (name.clone(), desc.clone()))
                .collect();
            (file.clone(), absent)
        })
        .collect()
}

/// Compare what is on disk against what the specification expects.
pub fn compare_structures(existing: &TestStructure, expected: &TestStructure) -> Difference {
    let mut modified_tests = BTreeMap::new();
    for file in expected.files.intersection(&existing.files) {
        let changes = compare_file(
            existing.test_cases.get(file),
            expected.test_cases.get(file),
        );
        if !changes.is_empty() {
            modified_tests.insert(file.clone(), changes);
        }
    }

    let expected_files: BTreeSet<String> = expected.test_cases.keys().cloned().collect();

    Difference {
        missing_folders: expected.folders.difference(&existing.folders).cloned().collect(),
        extra_folders: existing.folders.difference(&expected.folders).cloned().collect(),
        missing_files: expected.files.difference(&existing.files).cloned().collect(),
        extra_files: existing.files.difference(&expected.files).cloned().collect(),
        missing_tests: tests_absent(&expected_files, &expected.test_cases, &existing.test_cases),
        extra_tests: tests_absent(&existing.files, &existing.test_cases, &expected.test_cases),
        modified_tests,
    }
}

fn by_id(tests: Option<&FileTests>) -> BTreeMap<String, (&str, &TestDescriptor)> {
    tests
        .into_iter()
        .flatten()
        .filter_map(|(name, desc)| {
            let id = match desc.get("id")? {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((id, (name.as_str(), desc)))
        })
        .collect()
}

fn compare_file(existing: Option<&FileTests>, expected: Option<&FileTests>) -> BTreeMap<String, TestChanges> {
    let existing = by_id(existing);
    let expected = by_id(expected);
    let mut out = BTreeMap::new();

    for (id, (existing_name, existing_desc)) in &existing {
        let Some((expected_name, expected_desc)) = expected.get(id) else {
            continue;
        };
        let changes = compare_test(existing_name, existing_desc, expected_name, expected_desc);
        if !changes.is_empty() {
            out.insert(id.clone(), changes);
        }
    }
    out
}

fn compare_test(
    existing_name: &str,
    existing: &TestDescriptor,
    expected_name: &str,
    expected: &TestDescriptor,
) -> TestChanges {
    let mut changes = TestChanges::new();
    if existing_name != expected_name {
        changes.insert(
            "name".to_string(),
            FieldChange(Value::from(existing_name), Value::from(expected_name)),
        );
    }

    let fields: BTreeSet<&String> = existing.keys().chain(expected.keys()).collect();
    for field in fields {
        if matches!(field.as_str(), "id" | "name" | "parameters") {
            continue;
        }
        let old = normalize(existing.get(field));
        let new = normalize(expected.get(field));
        if old != new {
            changes.insert(field.clone(), FieldChange(old, new));
        }
    }

    // Map equality ignores axis order.
    let old = parameters(existing);
    let new = parameters(expected);
    if old != new {
        changes.insert(
            "parameters".to_string(),
            FieldChange(Value::Object(old), Value::Object(new)),
        );
    }
    changes
}

/// A string that looks like a list literal compares as the list.
fn normalize(value: Option<&Value>) -> Value {
    match value {
        None => Value::Null,
        Some(Value::String(s)) if s.starts_with('[') && s.ends_with(']') => {
            parse_literal(s).unwrap_or_else(|_| Value::String(s.clone()))
        }
        Some(v) => v.clone(),
    }
}

fn parameters(desc: &TestDescriptor) -> Map<String, Value> {
    match desc.get("parameters") {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn desc(pairs: &[(&str, Value)]) -> TestDescriptor {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn structure(file: &str, tests: &[(&str, TestDescriptor)]) -> TestStructure {
        let mut s = TestStructure::default();
        s.folders.insert("Login".to_string());
        s.files.insert(file.to_string());
        s.test_cases.insert(
            file.to_string(),
            tests.iter().map(|(n, d)| (n.to_string(), d.clone())).collect(),
        );
        s
    }

    const FILE: &str = "Login/test_Auth_Checks.py";

    #[test]
    fn identical_structures_are_clean() {
        let s = structure(FILE, &[("Valid_Login", desc(&[("id", json!("TC-1"))]))]);
        assert!(compare_structures(&s, &s).is_clean());
    }

    #[test]
    fn rename_is_a_name_change_by_id() {
        let existing = structure(FILE, &[("Valid_Login", desc(&[("id", json!("TC-1"))]))]);
        let expected = structure(
            FILE,
            &[("Valid_Sign_In", desc(&[("id", json!("TC-1")), ("name", json!("Valid Sign In"))]))],
        );
        let diff = compare_structures(&existing, &expected);

        let change = &diff.modified_tests[FILE]["TC-1"]["name"];
        assert_eq!(change, &FieldChange(json!("Valid_Login"), json!("Valid_Sign_In")));
        assert!(diff.missing_tests[FILE].contains_key("Valid_Sign_In"));
        assert!(diff.extra_tests[FILE].contains_key("Valid_Login"));
    }

    #[test]
    fn list_strings_compare_as_lists() {
        let existing = structure(FILE, &[("T", desc(&[("id", json!("TC-1")), ("steps", json!("['a', 'b']"))]))]);
        let expected = structure(FILE, &[("T", desc(&[("id", json!("TC-1")), ("steps", json!(["a", "b"]))]))]);
        assert!(compare_structures(&existing, &expected).modified_tests.is_empty());
    }

    #[test]
    fn field_change_recorded_old_then_new() {
        let existing = structure(FILE, &[("T", desc(&[("id", json!("TC-1")), ("scenario", json!("old"))]))]);
        let expected = structure(FILE, &[("T", desc(&[("id", json!("TC-1")), ("scenario", json!("new"))]))]);
        let diff = compare_structures(&existing, &expected);
        assert_eq!(
            diff.modified_tests[FILE]["TC-1"]["scenario"],
            FieldChange(json!("old"), json!("new"))
        );
    }

    #[test]
    fn parameter_order_is_irrelevant() {
        let a = json!({"x": [1], "y": [2]});
        let b = json!({"y": [2], "x": [1]});
        let existing = structure(FILE, &[("T", desc(&[("id", json!("TC-1")), ("parameters", a)]))]);
        let expected = structure(FILE, &[("T", desc(&[("id", json!("TC-1")), ("parameters", b)]))]);
        assert!(compare_structures(&existing, &expected).modified_tests.is_empty());
    }

    #[test]
    fn absent_parameters_equal_empty() {
        let existing = structure(FILE, &[("T", desc(&[("id", json!("TC-1"))]))]);
        let expected = structure(FILE, &[("T", desc(&[("id", json!("TC-1")), ("parameters", json!({}))]))]);
        assert!(compare_structures(&existing, &expected).modified_tests.is_empty());
    }

    #[test]
    fn tests_without_id_skip_modification_pass() {
        let existing = structure(FILE, &[("T", desc(&[("scenario", json!("a"))]))]);
        let expected = structure(FILE, &[("T", desc(&[("scenario", json!("b"))]))]);
        assert!(compare_structures(&existing, &expected).modified_tests.is_empty());
    }

    #[test]
    fn missing_file_lists_all_its_tests() {
        let existing = TestStructure::default();
        let expected = structure(FILE, &[("T", desc(&[("id", json!("TC-1"))]))]);
        let diff = compare_structures(&existing, &expected);
        assert!(diff.missing_files.contains(FILE));
        assert!(diff.missing_folders.contains("Login"));
        assert!(diff.missing_tests[FILE].contains_key("T"));
        assert!(diff.extra_tests.is_empty());
    }

    #[test]
    fn report_serializes_flat() {
        let mut existing = structure(FILE, &[]);
        existing.skipped_tests = Some(vec![format!("{}\\T", FILE)]);
        let report = CoverageReport::new(&existing, &existing);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["missing_folders"], json!([]));
        assert_eq!(json["skipped_tests"], json!([format!("{}\\T", FILE)]));
        assert_eq!(json["modified_tests"], json!({}));
    }

    fn arb_structure() -> impl Strategy<Value = TestStructure> {
        (
            prop::collection::btree_set("[a-c]{1,2}", 0..5),
            prop::collection::btree_set("[a-c]{1,2}\\.py", 0..5),
        )
            .prop_map(|(folders, files)| TestStructure {
                folders,
                files,
                ..Default::default()
            })
    }

    proptest! {
        #[test]
        fn set_deltas_are_symmetric(a in arb_structure(), b in arb_structure()) {
            let ab = compare_structures(&a, &b);
            let ba = compare_structures(&b, &a);
            prop_assert_eq!(&ab.missing_folders, &ba.extra_folders);
            prop_assert_eq!(&ab.extra_folders, &ba.missing_folders);
            prop_assert_eq!(&ab.missing_files, &ba.extra_files);
            prop_assert_eq!(&ab.extra_files, &ba.missing_files);
        }

        #[test]
        fn self_comparison_is_clean(a in arb_structure()) {
            prop_assert!(compare_structures(&a, &a).is_clean());
        }
    }
}
