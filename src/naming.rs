//! Label → identifier normalization.
//!
//! Every character outside `[A-Za-z0-9_]` becomes `_`, and a leading digit
//! gets a `_` prefix. The mapping is not injective, so callers that place
//! names into a shared scope go through [`ScopedNames`], which keeps the
//! first claimant's name and suffixes later ones with their id.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::warn;

static RE_NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").unwrap());

/// Normalize a free-text label into a folder/file/function-safe name.
pub fn sanitize_name(label: &str) -> String {
    let mut name = RE_NON_WORD.replace_all(label, "_").into_owned();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Names already handed out within one scope (a folder's subfolders, a
/// folder's test files, or a file's test functions).
#[derive(Debug, Default)]
pub struct ScopedNames {
    taken: HashSet<String>,
}

impl ScopedNames {
    /// Claim the normalized name for `label`; `id` disambiguates collisions.
    pub fn claim(&mut self, label: &str, id: &str) -> String {
        let base = sanitize_name(label);
        if self.taken.insert(base.clone()) {
            return base;
        }

        let mut candidate = format!("{}_{}", base, sanitize_name(id));
        let mut counter = 2;
        while !self.taken.insert(candidate.clone()) {
            candidate = format!("{}_{}_{}", base, sanitize_name(id), counter);
            counter += 1;
        }
        warn!(label, id, name = %candidate, "normalized name collision, disambiguated by id");
        candidate
    }
}
