//! File fragmentation: splitting a file into an ordered sequence of
//! semantic fragments with stable identity.
//!
//! Strategies are tried in a fixed order, first applicable wins:
//!
//! 1. [`code::AstStrategy`] - tree-sitter parsing for supported languages
//! 2. [`markdown::MarkdownStrategy`] - ATX-heading sections
//! 3. [`config::ConfigStrategy`] - top-level keys of structured config
//! 4. [`text::TextStrategy`] - blank-line paragraphs, always applicable
//!
//! A strategy that cannot make sense of its input returns
//! [`StrategyOutcome::NotParseable`] and the engine falls through to the
//! next one; fragmenting never fails the run.
//!
//! Post-condition, enforced here: the fragments of a file tile it. Every
//! line belongs to exactly one fragment; lines no strategy claimed are
//! wrapped into `generic` gap fragments.

pub mod code;
pub mod config;
pub mod markdown;
pub mod text;

use std::sync::Arc;

use crate::tokenize::{extract_identifiers, TokenProfile};
use crate::types::{estimate_tokens, Fragment, FragmentId, FragmentKind};

/// Largest fragment the pipeline will emit; bigger semantic units are
/// split at natural sub-boundaries.
pub const MAX_FRAGMENT_LINES: u32 = 200;

/// Smallest fragment the text partitioner aims for (the file tail may
/// be shorter).
pub const MIN_FRAGMENT_LINES: u32 = 3;

/// Result of one strategy attempt. Parse failure is an expected branch,
/// not an error.
pub enum StrategyOutcome {
    Fragments(Vec<Fragment>),
    NotParseable,
}

/// One way of splitting a file.
pub trait FragmentStrategy {
    fn name(&self) -> &'static str;

    /// Cheap applicability check, usually by extension.
    fn can_handle(&self, path: &str, content: &str) -> bool;

    /// Produce fragments. Spans may leave gaps (the engine fills them)
    /// but must not overlap.
    fn fragment(&self, path: &Arc<str>, content: &str) -> StrategyOutcome;
}

/// The strategy pipeline. Construct once per run.
pub struct Fragmenter {
    strategies: Vec<Box<dyn FragmentStrategy>>,
}

impl Fragmenter {
    pub fn new() -> Self {
        Self {
            strategies: vec![
                Box::new(code::AstStrategy),
                Box::new(markdown::MarkdownStrategy),
                Box::new(config::ConfigStrategy),
                Box::new(text::TextStrategy),
            ],
        }
    }

    /// Fragment one file. Empty content yields no fragments; otherwise
    /// the result tiles the file.
    pub fn fragment_file(&self, path: &Arc<str>, content: &str) -> Vec<Fragment> {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return Vec::new();
        }

        for strategy in &self.strategies {
            if !strategy.can_handle(path, content) {
                continue;
            }
            match strategy.fragment(path, content) {
                StrategyOutcome::Fragments(frags) if !frags.is_empty() => {
                    return finalize(path, &lines, frags);
                }
                StrategyOutcome::Fragments(_) | StrategyOutcome::NotParseable => {
                    tracing::debug!(
                        strategy = strategy.name(),
                        path = path.as_ref(),
                        "strategy not applicable, falling through"
                    );
                }
            }
        }

        // TextStrategy handles everything, so this is only reachable for
        // whitespace-only files; tile them as one generic fragment.
        finalize(path, &lines, Vec::new())
    }
}

impl Default for Fragmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a fragment over `lines[start-1..end]` (1-based inclusive).
pub(crate) fn make_fragment(
    path: &Arc<str>,
    lines: &[&str],
    start: u32,
    end: u32,
    kind: FragmentKind,
    symbol: Option<String>,
    container_line: Option<u32>,
    profile: TokenProfile,
) -> Fragment {
    let mut content = lines[(start as usize - 1)..(end as usize)].join("\n");
    content.push('\n');
    let identifiers = extract_identifiers(&content, profile);
    let token_count = estimate_tokens(&content);
    Fragment {
        id: FragmentId::new(Arc::clone(path), start, end),
        kind,
        symbol,
        content,
        identifiers,
        token_count,
        container_line,
    }
}

/// Sort, drop overlaps, fill gaps. The output tiles `1..=lines.len()`.
fn finalize(path: &Arc<str>, lines: &[&str], mut frags: Vec<Fragment>) -> Vec<Fragment> {
    let total = lines.len() as u32;
    let profile = TokenProfile::from_path(path);

    frags.sort_by(|a, b| a.id.cmp(&b.id));

    // Clamp to the file and drop anything overlapping its predecessor;
    // strategies should not produce overlaps, but a dropped fragment
    // beats a violated tiling invariant.
    let mut kept: Vec<Fragment> = Vec::with_capacity(frags.len());
    let mut last_end = 0u32;
    for frag in frags {
        if frag.id.start_line > total || frag.id.start_line > frag.id.end_line {
            continue;
        }
        if frag.id.start_line <= last_end {
            tracing::debug!(id = %frag.id, "dropping overlapping fragment");
            continue;
        }
        let end = frag.id.end_line.min(total);
        last_end = end;
        if end == frag.id.end_line {
            kept.push(frag);
        } else {
            kept.push(make_fragment(
                path,
                lines,
                frag.id.start_line,
                end,
                frag.kind,
                frag.symbol,
                frag.container_line,
                profile,
            ));
        }
    }

    // Fill the gaps with generic chunks.
    let covered: Vec<(u32, u32)> = kept.iter().map(|f| (f.id.start_line, f.id.end_line)).collect();
    let mut out = kept;
    out.extend(gap_fragments(path, lines, &covered, profile));
    out.sort_by(|a, b| a.id.cmp(&b.id));

    debug_assert!(tiles(&out, total), "fragments must tile {}", path);
    out
}

/// Generic fragments over the uncovered line runs, split at the max
/// fragment size.
fn gap_fragments(
    path: &Arc<str>,
    lines: &[&str],
    covered: &[(u32, u32)],
    profile: TokenProfile,
) -> Vec<Fragment> {
    let total = lines.len() as u32;
    let mut covered_set = vec![false; total as usize + 1];
    for &(s, e) in covered {
        for line in s..=e.min(total) {
            covered_set[line as usize] = true;
        }
    }

    let mut out = Vec::new();
    let mut run_start: Option<u32> = None;
    for line in 1..=total + 1 {
        let is_gap = line <= total && !covered_set[line as usize];
        match (run_start, is_gap) {
            (None, true) => run_start = Some(line),
            (Some(start), false) => {
                let end = line - 1;
                let mut chunk_start = start;
                while chunk_start <= end {
                    let chunk_end = end.min(chunk_start + MAX_FRAGMENT_LINES - 1);
                    out.push(make_fragment(
                        path,
                        lines,
                        chunk_start,
                        chunk_end,
                        FragmentKind::Generic,
                        None,
                        None,
                        profile,
                    ));
                    chunk_start = chunk_end + 1;
                }
                run_start = None;
            }
            _ => {}
        }
    }
    out
}

fn tiles(frags: &[Fragment], total: u32) -> bool {
    let mut next = 1u32;
    for frag in frags {
        if frag.id.start_line != next {
            return false;
        }
        next = frag.id.end_line + 1;
    }
    next == total + 1
}

/// The smallest fragment covering `line`, if any.
pub fn enclosing_fragment(frags: &[Fragment], line: u32) -> Option<&Fragment> {
    frags
        .iter()
        .filter(|f| f.contains_line(line))
        .min_by_key(|f| (f.line_count(), f.start_line()))
}
