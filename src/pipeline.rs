//! The staged selection pipeline.
//!
//! ```text
//! files+diff -> fragments -> (E0, concepts) -> universe -> edges
//!            -> graph -> PPR -> selection
//! ```
//!
//! Strictly staged, no back-edges; every entity is created by one stage
//! and immutable afterwards. The global deadline is checked at stage
//! boundaries: before PPR a timeout degrades to the core set alone,
//! inside selection it returns the partial S. Invariants are asserted
//! at stage boundaries in debug builds; a violated one in release is
//! the only fatal error.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use crate::concepts::concepts_from_diff;
use crate::config::DiffmapConfig;
use crate::diff::core_set;
use crate::edges::{collect_edges, EdgeContext};
use crate::error::{DiffmapError, Result};
use crate::fragment::Fragmenter;
use crate::graph::FragmentGraph;
use crate::ppr::{personalized_pagerank, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
use crate::select::lazy_greedy_select;
use crate::types::{
    ChangedFile, CommitInfo, DiffHunk, Fragment, FragmentId, RunMetadata, StopReason,
};
use crate::universe::{
    cap_universe, expand_by_rare_concepts, manifest_relatives, scan_candidates,
    structural_relatives,
};

/// Everything the external collaborators deliver.
#[derive(Debug, Default)]
pub struct PipelineInput {
    pub files: Vec<ChangedFile>,
    pub hunks: Vec<DiffHunk>,
    /// Recent commits, newest first; absent disables the history family
    pub history: Option<Vec<CommitInfo>>,
    /// Repository root for universe expansion; absent limits V to the
    /// changed files
    pub repo_root: Option<PathBuf>,
}

/// The pipeline's output: the ordered selection plus run metadata.
#[derive(Debug)]
pub struct DiffContextReport {
    pub selected: Vec<Fragment>,
    pub metadata: RunMetadata,
}

/// Run the full pipeline.
///
/// Returns `EmptyDiff` when there are no hunks (a distinct status, not
/// a failure) and `Invariant` when a stage boundary check fails.
pub fn run(input: &PipelineInput, config: &DiffmapConfig) -> Result<DiffContextReport> {
    config.validate()?;

    if input.hunks.is_empty() {
        return Err(DiffmapError::EmptyDiff);
    }

    let fragmenter = Fragmenter::new();

    // Stage 1: fragment the changed files. Post images carry modified
    // and added files; pre images only deleted ones.
    let mut post_frags: BTreeMap<Arc<str>, Vec<Fragment>> = BTreeMap::new();
    let mut pre_frags: BTreeMap<Arc<str>, Vec<Fragment>> = BTreeMap::new();
    for file in &input.files {
        match (&file.post_text, &file.pre_text) {
            (Some(post), _) => {
                post_frags.insert(file.path.clone(), fragmenter.fragment_file(&file.path, post));
            }
            (None, Some(pre)) => {
                pre_frags.insert(file.path.clone(), fragmenter.fragment_file(&file.path, pre));
            }
            (None, None) => {
                tracing::warn!(path = file.path.as_ref(), "changed file has no content on either side");
            }
        }
    }

    // Stage 2: concepts from the changed lines
    let concepts = concepts_from_diff(&input.files, &input.hunks);
    tracing::debug!(concepts = concepts.len(), "extracted diff concepts");

    // Stage 3: universe expansion beyond the changed files
    let changed_paths: BTreeSet<Arc<str>> = input.files.iter().map(|f| f.path.clone()).collect();
    if let Some(root) = &input.repo_root {
        if config.past_deadline() {
            return Ok(core_only_report(&input.hunks, &post_frags, &pre_frags, config));
        }
        let candidates = scan_candidates(root, &config.universe);
        let mut expansion: BTreeSet<PathBuf> = BTreeSet::new();
        expansion.extend(expand_by_rare_concepts(
            root,
            &candidates,
            &concepts,
            &changed_paths,
            &config.universe,
        ));
        expansion.extend(structural_relatives(&candidates, &changed_paths, &config.universe));

        let changed_contents: BTreeMap<Arc<str>, Option<String>> = input
            .files
            .iter()
            .map(|f| (f.path.clone(), f.post_text.clone().or_else(|| f.pre_text.clone())))
            .collect();
        expansion.extend(manifest_relatives(root, &candidates, &changed_contents));

        for rel in expansion {
            let rel_str: Arc<str> = Arc::from(rel.to_string_lossy().replace('\\', "/"));
            if changed_paths.contains(&rel_str) || post_frags.contains_key(&rel_str) {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(root.join(&rel)) else {
                tracing::debug!(path = rel_str.as_ref(), "expansion file unreadable, skipping");
                continue;
            };
            post_frags.insert(rel_str.clone(), fragmenter.fragment_file(&rel_str, &content));
        }
    }

    // Stage 4: the core set
    let core = core_set(&input.hunks, &post_frags, &pre_frags);
    tracing::debug!(core = core.len(), "mapped diff onto core fragments");

    // Stage 5: finalize and cap the universe
    let mut all_fragments: Vec<Fragment> =
        post_frags.values().chain(pre_frags.values()).flatten().cloned().collect();
    all_fragments.sort_by(|a, b| a.id.cmp(&b.id));
    let universe = cap_universe(all_fragments, &core, &concepts, config.max_universe);

    let universe_ids: BTreeSet<&FragmentId> = universe.iter().map(|f| &f.id).collect();
    if !core.iter().all(|id| universe_ids.contains(id)) {
        return Err(DiffmapError::Invariant("core set escaped the universe cap".into()));
    }
    drop(universe_ids);

    // Full mode bypasses relevance and selection entirely
    if config.full {
        let selected: Vec<Fragment> = universe
            .iter()
            .filter(|f| changed_paths.contains(&f.id.path))
            .cloned()
            .collect();
        let used_tokens =
            selected.iter().map(|f| f.token_count + config.overhead_per_fragment).sum();
        return Ok(DiffContextReport {
            metadata: RunMetadata {
                universe_size: universe.len(),
                edge_count: 0,
                ppr_iterations: 0,
                reason: StopReason::Full,
                used_tokens,
                utility: 0.0,
            },
            selected,
        });
    }

    if config.past_deadline() {
        return Ok(core_only_report(&input.hunks, &post_frags, &pre_frags, config));
    }

    // Stage 6: edges
    let ctx = EdgeContext {
        config,
        repo_root: input.repo_root.as_deref(),
        history: input.history.as_deref(),
    };
    let edges = collect_edges(&universe, &ctx);

    // Stage 7: graph assembly (max-aggregation + hub suppression)
    let graph = FragmentGraph::assemble(&universe, edges, &core, config);
    debug_assert!(graph.max_weight() <= 1.0, "assembled weights must stay in (0, 1]");

    if config.past_deadline() {
        return Ok(core_only_report(&input.hunks, &post_frags, &pre_frags, config));
    }

    // Stage 8: personalized PageRank seeded on the core set
    let ppr = personalized_pagerank(
        &graph,
        &core,
        config.alpha,
        DEFAULT_TOLERANCE,
        DEFAULT_MAX_ITERATIONS,
    );
    #[cfg(debug_assertions)]
    {
        let total: f64 = ppr.scores.values().sum();
        debug_assert!(
            ppr.scores.is_empty() || (total - 1.0).abs() < 1e-6,
            "PPR must be a probability distribution, sums to {}",
            total
        );
    }

    // Stage 9: lazy-greedy selection
    let result = lazy_greedy_select(
        &universe,
        &core,
        &ppr.scores,
        &concepts,
        config.budget,
        config.tau,
        config.overhead_per_fragment,
        config.deadline,
    );

    if result.reason != StopReason::BudgetExhausted {
        debug_assert!(
            core.iter().all(|id| result.selected.iter().any(|f| f.id == *id)),
            "core must be contained in the selection"
        );
    }

    tracing::info!(
        selected = result.selected.len(),
        core = core.len(),
        universe = universe.len(),
        edges = graph.edge_count(),
        iterations = ppr.iterations,
        reason = result.reason.as_str(),
        used = result.used_tokens,
        "selection complete"
    );

    Ok(DiffContextReport {
        metadata: RunMetadata {
            universe_size: universe.len(),
            edge_count: graph.edge_count(),
            ppr_iterations: ppr.iterations,
            reason: result.reason,
            used_tokens: result.used_tokens,
            utility: result.utility,
        },
        selected: result.selected,
    })
}

/// Deadline fallback before PPR ran: the core fragments alone.
fn core_only_report(
    hunks: &[DiffHunk],
    post_frags: &BTreeMap<Arc<str>, Vec<Fragment>>,
    pre_frags: &BTreeMap<Arc<str>, Vec<Fragment>>,
    config: &DiffmapConfig,
) -> DiffContextReport {
    let core = core_set(hunks, post_frags, pre_frags);
    let mut selected: Vec<Fragment> = post_frags
        .values()
        .chain(pre_frags.values())
        .flatten()
        .filter(|f| core.contains(&f.id))
        .cloned()
        .collect();
    selected.sort_by(|a, b| a.id.cmp(&b.id));
    let used_tokens = selected.iter().map(|f| f.token_count + config.overhead_per_fragment).sum();

    tracing::warn!("deadline elapsed before ranking, returning the core set only");
    DiffContextReport {
        metadata: RunMetadata {
            universe_size: selected.len(),
            edge_count: 0,
            ppr_iterations: 0,
            reason: StopReason::Deadline,
            used_tokens,
            utility: 0.0,
        },
        selected,
    }
}
