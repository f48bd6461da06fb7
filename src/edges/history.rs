//! History edges: files that changed together in recent commits.
//!
//! Commit metadata is injected by the caller (the git driver is an
//! external collaborator); when it is absent this family is empty.
//! Commits touching more than the per-commit cap are skipped as bulk
//! moves, and pair counts are damped logarithmically so one refactor
//! spree cannot dominate the graph.

use std::collections::BTreeMap;

use crate::edges::{push_edge, Edge, EdgeBuilder, EdgeContext};
use crate::types::{Fragment, FragmentId};

pub struct CochangeEdgeBuilder;

impl EdgeBuilder for CochangeEdgeBuilder {
    fn id(&self) -> &'static str {
        "history"
    }

    fn build(&self, fragments: &[Fragment], ctx: &EdgeContext<'_>) -> Vec<Edge> {
        let Some(history) = ctx.history else {
            return Vec::new();
        };
        let config = &ctx.config.history;

        // Pair counts over the capped commit window
        let mut counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
        for commit in history.iter().take(config.commits_limit) {
            if commit.paths.len() > config.max_files_per_commit {
                continue;
            }
            let mut paths: Vec<&str> = commit.paths.iter().map(|p| p.as_str()).collect();
            paths.sort_unstable();
            paths.dedup();
            for (i, a) in paths.iter().enumerate() {
                for b in &paths[i + 1..] {
                    *counts.entry((a, b)).or_insert(0) += 1;
                }
            }
        }

        let mut by_path: BTreeMap<&str, Vec<&FragmentId>> = BTreeMap::new();
        for frag in fragments {
            by_path.entry(frag.path().as_ref()).or_default().push(&frag.id);
        }

        let mut edges = Vec::new();
        for ((a, b), count) in counts {
            if count < config.min_count {
                continue;
            }
            let weight = config.max_weight.min(0.1 * (1.0 + count as f64).ln());
            let (Some(a_ids), Some(b_ids)) = (by_path.get(a), by_path.get(b)) else {
                continue;
            };
            for src in a_ids {
                for dst in b_ids {
                    push_edge(&mut edges, "history", src, dst, weight, Some(1.0));
                }
            }
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiffmapConfig;
    use crate::fragment::make_fragment;
    use crate::tokenize::TokenProfile;
    use crate::types::{CommitInfo, FragmentKind};
    use std::sync::Arc;

    fn frag(path: &str) -> Fragment {
        let lines = vec!["line one", "line two"];
        make_fragment(&Arc::from(path), &lines, 1, 2, FragmentKind::Generic, None, None, TokenProfile::Code)
    }

    fn commit(paths: &[&str]) -> CommitInfo {
        CommitInfo { id: "c".into(), paths: paths.iter().map(|s| s.to_string()).collect() }
    }

    fn build(frags: &[Fragment], history: &[CommitInfo]) -> Vec<Edge> {
        let config = DiffmapConfig::default();
        let ctx = EdgeContext { config: &config, repo_root: None, history: Some(history) };
        CochangeEdgeBuilder.build(frags, &ctx)
    }

    #[test]
    fn test_cochange_pairs_connected_symmetrically() {
        let frags = vec![frag("a.py"), frag("b.py")];
        let history =
            vec![commit(&["a.py", "b.py"]), commit(&["a.py", "b.py"]), commit(&["a.py"])];
        let edges = build(&frags, &history);
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].weight, edges[1].weight);
        let expected = 0.1 * (3.0_f64).ln();
        assert!((edges[0].weight - expected).abs() < 1e-9);
    }

    #[test]
    fn test_single_cochange_below_min_count() {
        let frags = vec![frag("a.py"), frag("b.py")];
        let history = vec![commit(&["a.py", "b.py"])];
        assert!(build(&frags, &history).is_empty());
    }

    #[test]
    fn test_bulk_commits_skipped() {
        let frags = vec![frag("a.py"), frag("b.py")];
        let many: Vec<String> = (0..40).map(|i| format!("f{}.py", i)).collect();
        let mut paths: Vec<&str> = many.iter().map(|s| s.as_str()).collect();
        paths.push("a.py");
        paths.push("b.py");
        let history = vec![commit(&paths), commit(&paths)];
        assert!(build(&frags, &history).is_empty());
    }

    #[test]
    fn test_no_history_no_edges() {
        let frags = vec![frag("a.py"), frag("b.py")];
        let config = DiffmapConfig::default();
        let ctx = EdgeContext { config: &config, repo_root: None, history: None };
        assert!(CochangeEdgeBuilder.build(&frags, &ctx).is_empty());
    }

    #[test]
    fn test_weight_capped() {
        let frags = vec![frag("a.py"), frag("b.py")];
        let history: Vec<CommitInfo> = (0..200).map(|_| commit(&["a.py", "b.py"])).collect();
        let edges = build(&frags, &history);
        assert!(edges.iter().all(|e| e.weight <= 0.40));
    }
}
