//! Core types for diffmap - the diff-aware context selector.
//!
//! Everything the pipeline passes between stages lives here. Key design
//! decisions:
//! - `Arc<str>` for file paths so fragment ids clone cheaply across the
//!   universe, the edge builders and the graph
//! - Frozen/immutable by default: a `Fragment` never changes after the
//!   fragmenter produced it
//! - Ordering on `FragmentId` is `(path, start_line, end_line)` so every
//!   stage iterates fragments in a reproducible order

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable identity of a fragment within a single pipeline run:
/// a contiguous, 1-based, inclusive line span of one file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId {
    /// Repo-relative path, interned
    pub path: Arc<str>,
    /// First line (1-based, inclusive)
    pub start_line: u32,
    /// Last line (1-based, inclusive)
    pub end_line: u32,
}

impl FragmentId {
    pub fn new(path: Arc<str>, start_line: u32, end_line: u32) -> Self {
        Self { path, start_line, end_line }
    }

    /// Number of lines covered by this span.
    pub fn line_count(&self) -> u32 {
        self.end_line - self.start_line + 1
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.path, self.start_line, self.end_line)
    }
}

/// What kind of semantic unit a fragment represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FragmentKind {
    Function,
    Class,
    Method,
    ConfigBlock,
    Section,
    Paragraph,
    Generic,
}

impl FragmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FragmentKind::Function => "function",
            FragmentKind::Class => "class",
            FragmentKind::Method => "method",
            FragmentKind::ConfigBlock => "config-block",
            FragmentKind::Section => "section",
            FragmentKind::Paragraph => "paragraph",
            FragmentKind::Generic => "generic",
        }
    }
}

/// The unit of selection: a contiguous line span with semantic identity.
///
/// Fragments are produced once by the fragmenter and never mutated
/// afterwards. The `identifiers` set is the tokenizer output over the
/// content; `token_count` is the char-based cost estimate (framing
/// overhead is added by the selector, not stored here).
#[derive(Debug, Clone)]
pub struct Fragment {
    pub id: FragmentId,
    pub kind: FragmentKind,
    /// Declared name, when the parser found one (function/class name,
    /// heading title, config key)
    pub symbol: Option<String>,
    pub content: String,
    /// Non-stopword identifier tokens present in the content
    pub identifiers: std::collections::BTreeSet<String>,
    pub token_count: usize,
    /// Line of the enclosing container's declaration, set when an
    /// oversized container was split and this fragment came out of it
    pub container_line: Option<u32>,
}

impl Fragment {
    pub fn path(&self) -> &Arc<str> {
        &self.id.path
    }

    pub fn start_line(&self) -> u32 {
        self.id.start_line
    }

    pub fn end_line(&self) -> u32 {
        self.id.end_line
    }

    pub fn line_count(&self) -> u32 {
        self.id.line_count()
    }

    /// Whether `line` falls inside this fragment's span.
    pub fn contains_line(&self, line: u32) -> bool {
        self.id.start_line <= line && line <= self.id.end_line
    }
}

/// Which snapshot a hunk's line numbers refer to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffSide {
    /// Pre-image (the old version; removed lines)
    Pre,
    /// Post-image (the new version; added lines)
    Post,
}

/// One contiguous changed region, delivered by the git driver.
/// Line numbers are 1-based inclusive and absolute in the given side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    pub path: Arc<str>,
    pub side: DiffSide,
    pub start_line: u32,
    pub end_line: u32,
}

/// A changed file with both snapshots. `pre_text` is `None` for added
/// files, `post_text` is `None` for deleted ones.
#[derive(Debug, Clone)]
pub struct ChangedFile {
    pub path: Arc<str>,
    pub pre_text: Option<String>,
    pub post_text: Option<String>,
}

/// Commit metadata for the history edge family: newest first.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub id: String,
    pub paths: Vec<String>,
}

/// Why the selector stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Adaptive stopping fired: popped density fell below tau * baseline
    Tau,
    /// Token budget exhausted (possibly already by the core set)
    BudgetExhausted,
    /// Candidate pool drained
    NoCandidates,
    /// No candidate produced positive marginal gain
    NoUtility,
    /// The single-fragment fallback beat the greedy tail
    BestSingleton,
    /// Global deadline hit mid-selection
    Deadline,
    /// Selection bypassed, full universe returned
    Full,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Tau => "tau",
            StopReason::BudgetExhausted => "budget",
            StopReason::NoCandidates => "no_candidates",
            StopReason::NoUtility => "no_utility",
            StopReason::BestSingleton => "best_singleton",
            StopReason::Deadline => "deadline",
            StopReason::Full => "full",
        }
    }
}

/// Run metadata reported alongside the selection.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    /// |V| after capping
    pub universe_size: usize,
    /// |E| after assembly and hub suppression
    pub edge_count: usize,
    /// PPR iterations to convergence
    pub ppr_iterations: usize,
    pub reason: StopReason,
    pub used_tokens: usize,
    pub utility: f64,
}

/// Estimate token cost of a snippet: 1 token per ~4 chars, rounded up.
/// Coarse but consistent; swap for a real tokenizer if exact budgets
/// matter.
pub fn estimate_tokens(text: &str) -> usize {
    (text.len() + 3) / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(path: &str, start: u32, end: u32) -> FragmentId {
        FragmentId::new(Arc::from(path), start, end)
    }

    #[test]
    fn test_fragment_id_ordering() {
        let a = id("a.py", 1, 10);
        let b = id("a.py", 11, 20);
        let c = id("b.py", 1, 5);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_fragment_id_display() {
        assert_eq!(id("src/a.py", 3, 9).to_string(), "src/a.py:3-9");
    }

    #[test]
    fn test_line_count() {
        assert_eq!(id("a", 5, 5).line_count(), 1);
        assert_eq!(id("a", 1, 10).line_count(), 10);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_kind_str() {
        assert_eq!(FragmentKind::ConfigBlock.as_str(), "config-block");
        assert_eq!(FragmentKind::Generic.as_str(), "generic");
    }
}
