//! Search query and result types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::node::EntryKind;

/// How the query text is compared against entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Case-insensitive substring match.
    #[default]
    Substring,
    /// Case-insensitive prefix match.
    Prefix,
}

/// Whether a search may trigger traversal of unscanned directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    /// Answer from the already-known tree only.
    #[default]
    KnownOnly,
    /// Also list every directory under the scope that is not yet listed.
    Exhaustive,
}

/// A search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Text to look for in entry names.
    pub text: String,
    /// Comparison rule.
    #[serde(default)]
    pub match_mode: MatchMode,
    /// Subtree to search (defaults to the job root).
    #[serde(default)]
    pub scope: Option<PathBuf>,
    /// Known-only or exhaustive.
    #[serde(default)]
    pub completeness: Completeness,
}

impl SearchQuery {
    /// Substring query over the known tree of the whole job.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            match_mode: MatchMode::Substring,
            scope: None,
            completeness: Completeness::KnownOnly,
        }
    }

    /// Use prefix matching.
    pub fn prefix(mut self) -> Self {
        self.match_mode = MatchMode::Prefix;
        self
    }

    /// Restrict the search to a subtree.
    pub fn within(mut self, scope: impl Into<PathBuf>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Allow listing directories that are not yet known.
    pub fn exhaustive(mut self) -> Self {
        self.completeness = Completeness::Exhaustive;
        self
    }

    /// Build a reusable matcher for this query.
    pub fn matcher(&self) -> NameMatcher {
        NameMatcher {
            needle: self.text.to_lowercase(),
            mode: self.match_mode,
        }
    }
}

/// Case-insensitive name matcher.
#[derive(Debug, Clone)]
pub struct NameMatcher {
    needle: String,
    mode: MatchMode,
}

impl NameMatcher {
    /// Check a display name against the query.
    pub fn is_match(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        match self.mode {
            MatchMode::Substring => name.contains(&self.needle),
            MatchMode::Prefix => name.starts_with(&self.needle),
        }
    }
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Size at the moment the entry matched.
    pub size_bytes: u64,
}
