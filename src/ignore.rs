// src/ignore.rs

//! The pattern filter: gitignore-style path exclusion.
//!
//! Rules are evaluated in the order they were defined, last match wins,
//! `!pattern` negates an earlier exclusion, and a trailing `/` restricts a
//! rule to directories. Wildcard matching for a single rule is delegated
//! to the `glob` crate (already part of the teacher's dependency stack for
//! component-level pattern matching); the negation/last-match-wins/anchor
//! logic around it is revkeep's own, since gitignore semantics aren't
//! something a single `glob::Pattern` expresses on its own.

use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

struct Rule {
    pattern: Pattern,
    negated: bool,
    directory_only: bool,
    anchored: bool,
}

/// A compiled, ordered set of ignore rules for one service.
pub struct IgnoreSet {
    rules: Vec<Rule>,
}

impl IgnoreSet {
    /// Compile patterns in the order they should be evaluated. A malformed
    /// pattern is skipped rather than rejecting the whole set — a bad rule
    /// in a large list shouldn't make every other rule stop working.
    pub fn compile(patterns: &[String]) -> Self {
        let rules = patterns
            .iter()
            .filter_map(|raw| Rule::parse(raw))
            .collect();
        Self { rules }
    }

    /// Whether `path` (a `/`-separated relative path) should be excluded.
    /// `is_dir` is only meaningful for distinguishing directory-only rules;
    /// revkeep paths are always files, so callers pass `false` unless
    /// filtering intermediate directories during a directory-aware walk.
    pub fn is_ignored(&self, path: &str, is_dir: bool) -> bool {
        let mut ignored = false;
        for rule in &self.rules {
            if rule.directory_only && !is_dir {
                continue;
            }
            if rule.matches(path) {
                ignored = !rule.negated;
            }
        }
        ignored
    }
}

impl Rule {
    fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return None;
        }

        let negated = trimmed.starts_with('!');
        let body = if negated { &trimmed[1..] } else { trimmed };

        let directory_only = body.ends_with('/');
        let body = body.trim_end_matches('/');
        if body.is_empty() {
            return None;
        }

        let anchored = body.contains('/');
        let glob_source = if anchored { body.trim_start_matches('/').to_string() } else { format!("**/{body}") };

        let pattern = Pattern::new(&glob_source).ok()?;
        Some(Rule {
            pattern,
            negated,
            directory_only,
            anchored,
        })
    }

    fn matches(&self, path: &str) -> bool {
        if self.anchored {
            self.pattern.matches_with(path, MATCH_OPTIONS)
        } else {
            // Unanchored patterns match the basename at any depth; `**/`
            // in the compiled glob already handles the "any depth" part,
            // but glob's `**` needs the full-path match call, not the
            // literal-separator-aware one, to traverse directory
            // boundaries.
            self.pattern.matches(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(patterns: &[&str]) -> IgnoreSet {
        IgnoreSet::compile(&patterns.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    #[test]
    fn simple_extension_pattern_matches_anywhere() {
        let s = set(&["*.tmp"]);
        assert!(s.is_ignored("songs/sermon.tmp", false));
        assert!(s.is_ignored("sermon.tmp", false));
        assert!(!s.is_ignored("sermon.pro", false));
    }

    #[test]
    fn anchored_pattern_only_matches_full_path() {
        let s = set(&["songs/drafts/*.pro"]);
        assert!(s.is_ignored("songs/drafts/wip.pro", false));
        assert!(!s.is_ignored("other/drafts/wip.pro", false));
    }

    #[test]
    fn negation_overrides_earlier_exclusion() {
        let s = set(&["*.pro", "!songs/keep.pro"]);
        assert!(s.is_ignored("songs/other.pro", false));
        assert!(!s.is_ignored("songs/keep.pro", false));
    }

    #[test]
    fn last_match_wins() {
        let s = set(&["!songs/keep.pro", "*.pro"]);
        assert!(s.is_ignored("songs/keep.pro", false));
    }

    #[test]
    fn directory_only_rule_ignores_files() {
        let s = set(&["drafts/"]);
        assert!(s.is_ignored("drafts", true));
        assert!(!s.is_ignored("drafts", false));
    }

    #[test]
    fn malformed_pattern_is_skipped_not_fatal() {
        let s = set(&["["]);
        assert!(!s.is_ignored("anything", false));
    }
}
