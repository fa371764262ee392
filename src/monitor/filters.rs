// src/monitor/filters.rs

use std::fmt;
use std::path::Path;

use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::errors::{BackupError, Result};

/// One include/exclude glob rule of a monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "lowercase")]
pub enum FilterRule {
    Include(String),
    Exclude(String),
}

impl FilterRule {
    pub fn pattern(&self) -> &str {
        match self {
            FilterRule::Include(p) | FilterRule::Exclude(p) => p,
        }
    }

    fn includes(&self) -> bool {
        matches!(self, FilterRule::Include(_))
    }
}

/// Compiled, ordered filter rules.
///
/// The first rule whose glob matches a path decides. A path that no rule
/// matches is included unless at least one include rule exists.
#[derive(Clone, Default)]
pub struct FilterSet {
    rules: Vec<(FilterRule, GlobMatcher)>,
    has_include: bool,
}

impl FilterSet {
    pub fn compile(rules: &[FilterRule]) -> Result<Self> {
        let compiled = rules
            .iter()
            .map(|rule| {
                Glob::new(rule.pattern())
                    .map(|g| (rule.clone(), g.compile_matcher()))
                    .map_err(|e| {
                        BackupError::Validation(format!(
                            "invalid filter pattern '{}': {e}",
                            rule.pattern()
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            has_include: rules.iter().any(FilterRule::includes),
            rules: compiled,
        })
    }

    pub fn rules(&self) -> impl Iterator<Item = &FilterRule> {
        self.rules.iter().map(|(rule, _)| rule)
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.rules
            .iter()
            .find(|(_, matcher)| matcher.is_match(path))
            .map(|(rule, _)| rule.includes())
            .unwrap_or(!self.has_include)
    }
}

impl fmt::Debug for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rules()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(rules: &[FilterRule]) -> FilterSet {
        FilterSet::compile(rules).unwrap()
    }

    #[test]
    fn empty_filters_include_everything() {
        assert!(set(&[]).matches(Path::new("/any/file")));
    }

    #[test]
    fn first_matching_rule_wins() {
        let filters = set(&[
            FilterRule::Exclude("**/.cache/**".into()),
            FilterRule::Include("/home/**".into()),
        ]);
        assert!(filters.matches(Path::new("/home/me/doc.txt")));
        assert!(!filters.matches(Path::new("/home/me/.cache/x")));
        // unmatched paths are out once an include rule exists
        assert!(!filters.matches(Path::new("/etc/hosts")));
    }

    #[test]
    fn exclude_only_filters_keep_unmatched_paths() {
        let filters = set(&[FilterRule::Exclude("**/*.tmp".into())]);
        assert!(filters.matches(Path::new("/data/a.txt")));
        assert!(!filters.matches(Path::new("/data/a.tmp")));
    }

    #[test]
    fn bad_patterns_are_rejected() {
        assert!(FilterSet::compile(&[FilterRule::Include("a[".into())]).is_err());
    }

    #[test]
    fn rules_serialise_with_kind_and_pattern() {
        let json = serde_json::to_string(&FilterRule::Exclude("*.tmp".into())).unwrap();
        assert_eq!(json, r#"{"kind":"exclude","pattern":"*.tmp"}"#);
    }
}
