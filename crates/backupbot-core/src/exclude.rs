//! Exclusion matching for archive entries.
//!
//! A path is excluded when any configured pattern, in order:
//! 1. equals the path's base name,
//! 2. glob-matches the base name, or
//! 3. glob-matches the full path.
//!
//! `*` and `?` never cross a `/`. A pattern that fails to compile only takes
//! part in the exact base-name comparison.

use std::path::Path;

use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Clone, Debug)]
struct Rule {
    raw: String,
    glob: Option<Pattern>,
}

#[derive(Clone, Debug, Default)]
pub struct ExclusionMatcher {
    rules: Vec<Rule>,
}

impl ExclusionMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let rules = patterns
            .iter()
            .map(|p| {
                let raw = p.as_ref().to_string();
                let glob = match Pattern::new(&raw) {
                    Ok(g) => Some(g),
                    Err(e) => {
                        tracing::warn!(pattern = %raw, error = %e, "Invalid exclusion pattern");
                        None
                    }
                };
                Rule { raw, glob }
            })
            .collect();
        Self { rules }
    }

    /// Returns the first pattern that excludes `path`, if any.
    pub fn matching_pattern(&self, path: &Path) -> Option<&str> {
        let base = base_name(path);
        self.rules
            .iter()
            .find(|rule| {
                if rule.raw == base {
                    return true;
                }
                let Some(glob) = &rule.glob else {
                    return false;
                };
                glob.matches_with(&base, MATCH_OPTIONS)
                    || glob.matches_path_with(path, MATCH_OPTIONS)
            })
            .map(|rule| rule.raw.as_str())
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.matching_pattern(path).is_some()
    }
}

fn base_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.to_string_lossy().into_owned(),
    }
}
