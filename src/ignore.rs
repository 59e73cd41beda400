//! Gitignore-style path filtering.
//!
//! Supported syntax: `#` comments, `!` negation, a trailing `/` for
//! directory-only rules, and anchoring by a leading or inner `/`. Globs go
//! through [`glob::Pattern`] with `*` not crossing `/`, so `**` matches any
//! number of directories.

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// File name looked up in the tests directory when no ignore file is given.
pub const DEFAULT_IGNORE_FILE: &str = ".typhoonignore";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Decides whether a path is excluded from generation and coverage.
pub trait IgnoreMatcher {
    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool;
}

impl<F> IgnoreMatcher for F
where
    F: Fn(&Path) -> bool,
{
    fn is_ignored(&self, path: &Path, _is_dir: bool) -> bool {
        self(path)
    }
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    negated: bool,
    dir_only: bool,
    anchored: bool,
}

impl Rule {
    fn parse(line: &str) -> Option<Result<Self, glob::PatternError>> {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (negated, rest) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line.strip_prefix('\\').unwrap_or(line)),
        };
        let (dir_only, rest) = match rest.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        let anchored = rest.contains('/');
        let rest = rest.trim_start_matches('/');
        if rest.is_empty() {
            return None;
        }

        Some(Pattern::new(rest).map(|pattern| Rule {
            pattern,
            negated,
            dir_only,
            anchored,
        }))
    }

    fn matches(&self, relative: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }
        if self.anchored {
            self.pattern.matches_with(relative, MATCH_OPTIONS)
        } else {
            let name = relative.rsplit('/').next().unwrap_or(relative);
            self.pattern.matches_with(name, MATCH_OPTIONS)
        }
    }
}

/// Rules from one ignore file, relative to the file's directory.
#[derive(Debug, Clone)]
pub struct IgnoreFile {
    base: PathBuf,
    rules: Vec<Rule>,
}

impl IgnoreFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read ignore file {}", path.display()))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::parse(&content, base))
    }

    /// Invalid patterns are logged and left out.
    pub fn parse(content: &str, base: impl Into<PathBuf>) -> Self {
        let rules = content
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| match Rule::parse(line)? {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(line = idx + 1, error = %e, "invalid ignore pattern skipped");
                    None
                }
            })
            .collect();
        Self {
            base: normalize(&base.into()),
            rules,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Last matching rule wins; `None` when no rule applies.
    fn verdict(&self, relative: &str, is_dir: bool) -> Option<bool> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(relative, is_dir))
            .map(|rule| !rule.negated)
    }
}

/// Absolute form of `path` with `.` and `..` resolved lexically, so
/// `./suite/Login` and `/work/suite/Login` compare equal.
fn normalize(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

impl IgnoreMatcher for IgnoreFile {
    fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let path = normalize(path);
        let Ok(relative) = path.strip_prefix(&self.base) else {
            return false;
        };
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        // An ignored directory hides everything below it, negations included.
        for depth in 1..=parts.len() {
            let prefix = parts[..depth].join("/");
            let last = depth == parts.len();
            let ignored = self.verdict(&prefix, !last || is_dir) == Some(true);
            if ignored {
                debug!(path = %path.display(), rule_path = %prefix, "ignored");
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(rules: &str) -> IgnoreFile {
        IgnoreFile::parse(rules, "/suite")
    }

    #[test]
    fn unanchored_name_matches_anywhere() {
        let m = matcher("*.tmp\n");
        assert!(m.is_ignored(Path::new("/suite/a/b/x.tmp"), false));
        assert!(!m.is_ignored(Path::new("/suite/a/b/x.py"), false));
    }

    #[test]
    fn anchored_rule_only_at_root() {
        let m = matcher("/Legacy\n");
        assert!(m.is_ignored(Path::new("/suite/Legacy"), true));
        assert!(m.is_ignored(Path::new("/suite/Legacy/test_old.py"), false));
        assert!(!m.is_ignored(Path::new("/suite/Other/Legacy"), true));
    }

    #[test]
    fn directory_only_rule() {
        let m = matcher("build/\n");
        assert!(m.is_ignored(Path::new("/suite/build"), true));
        assert!(!m.is_ignored(Path::new("/suite/build"), false));
        assert!(m.is_ignored(Path::new("/suite/build/test_x.py"), false));
    }

    #[test]
    fn negation_reincludes_file() {
        let m = matcher("# comment\n\ntest_*.py\n!test_keep.py\n");
        assert!(m.is_ignored(Path::new("/suite/test_drop.py"), false));
        assert!(!m.is_ignored(Path::new("/suite/test_keep.py"), false));
    }

    #[test]
    fn ignored_parent_is_final() {
        let m = matcher("Old/\n!Old/test_keep.py\n");
        assert!(m.is_ignored(Path::new("/suite/Old/test_keep.py"), false));
    }

    #[test]
    fn double_star_spans_directories() {
        let m = matcher("Login/**/test_slow.py\n");
        assert!(m.is_ignored(Path::new("/suite/Login/a/b/test_slow.py"), false));
        assert!(!m.is_ignored(Path::new("/suite/Other/a/test_slow.py"), false));
    }

    #[test]
    fn paths_outside_base_are_kept() {
        let m = matcher("*\n");
        assert!(!m.is_ignored(Path::new("/elsewhere/x"), false));
    }

    #[test]
    fn relative_and_absolute_spellings_agree() {
        let cwd = std::env::current_dir().unwrap();
        let m = IgnoreFile::parse("Login/\n", "./suite/.");
        assert!(m.is_ignored(Path::new("suite/Login"), true));
        assert!(m.is_ignored(&cwd.join("suite/Login/test_a.py"), false));
        assert!(m.is_ignored(Path::new("other/../suite/./Login"), true));
        assert!(!m.is_ignored(Path::new("suite/Logout"), true));
    }

    #[test]
    fn closures_are_matchers() {
        let m = |p: &Path| p.ends_with("skip_me");
        assert!(m.is_ignored(Path::new("/a/skip_me"), true));
        assert!(!m.is_ignored(Path::new("/a/keep"), true));
    }
}
