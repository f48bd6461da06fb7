//! Personalized PageRank: restart-biased relevance over the fragment
//! graph.
//!
//! The restart distribution is uniform over the core set, so mass
//! concentrates within a few hops of the change (expected walk length
//! before restart is alpha/(1-alpha), 1.5 at the default alpha 0.60).
//! Dangling nodes teleport their mass back into the restart
//! distribution. Iteration stops on an L1 delta below tolerance or at
//! the iteration cap, and the result is normalised to a probability
//! distribution.

use std::collections::{BTreeSet, HashMap};

use crate::graph::FragmentGraph;
use crate::types::FragmentId;

pub const DEFAULT_TOLERANCE: f64 = 1e-4;
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// PPR output: one score per universe fragment plus the iteration
/// count for run metadata.
#[derive(Debug)]
pub struct PprScores {
    pub scores: HashMap<FragmentId, f64>,
    pub iterations: usize,
}

impl PprScores {
    pub fn score(&self, id: &FragmentId) -> f64 {
        self.scores.get(id).copied().unwrap_or(0.0)
    }
}

/// Run the power iteration.
///
/// Seeds outside the graph are ignored; with no valid seed at all the
/// result degrades to the uniform distribution (nothing to
/// personalise towards).
pub fn personalized_pagerank(
    graph: &FragmentGraph,
    seeds: &BTreeSet<FragmentId>,
    alpha: f64,
    tolerance: f64,
    max_iterations: usize,
) -> PprScores {
    let n = graph.node_count();
    if n == 0 {
        return PprScores { scores: HashMap::new(), iterations: 0 };
    }

    let seed_nodes: Vec<usize> = seeds.iter().filter_map(|id| graph.node(id)).map(|i| i.index()).collect();

    let mut restart = vec![0.0; n];
    if seed_nodes.is_empty() {
        tracing::debug!("no valid PPR seeds, falling back to uniform restart");
        for p in restart.iter_mut() {
            *p = 1.0 / n as f64;
        }
    } else {
        let mass = 1.0 / seed_nodes.len() as f64;
        for &idx in &seed_nodes {
            restart[idx] = mass;
        }
    }

    let base: Vec<f64> = restart.iter().map(|p| (1.0 - alpha) * p).collect();
    let mut scores = restart.clone();
    let mut iterations = 0;

    for iteration in 0..max_iterations {
        let mut next = base.clone();
        let mut dangling = 0.0;

        for node in graph.node_indices() {
            let idx = node.index();
            let out = graph.out_weight(node);
            if out <= 0.0 {
                dangling += scores[idx];
                continue;
            }
            let contribution = alpha * scores[idx];
            for (target, weight) in graph.out_edges(node) {
                next[target.index()] += contribution * (weight / out);
            }
        }

        if dangling > 0.0 {
            let add = alpha * dangling;
            for (value, p) in next.iter_mut().zip(&restart) {
                *value += add * p;
            }
        }

        let delta: f64 = next.iter().zip(&scores).map(|(a, b)| (a - b).abs()).sum();
        scores = next;
        iterations = iteration + 1;
        if delta < tolerance {
            break;
        }
    }

    // Normalise to a probability distribution
    let total: f64 = scores.iter().sum();
    if total > 0.0 {
        for value in scores.iter_mut() {
            *value /= total;
        }
    }

    let scores = graph
        .node_indices()
        .map(|idx| (graph.fragment_id(idx).clone(), scores[idx.index()]))
        .collect();

    PprScores { scores, iterations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiffmapConfig;
    use crate::edges::Edge;
    use crate::fragment::make_fragment;
    use crate::tokenize::TokenProfile;
    use crate::types::{Fragment, FragmentKind};
    use std::sync::Arc;

    fn frag(path: &str) -> Fragment {
        let lines = vec!["alpha", "beta"];
        make_fragment(&Arc::from(path), &lines, 1, 2, FragmentKind::Generic, None, None, TokenProfile::Code)
    }

    fn edge(src: &Fragment, dst: &Fragment, weight: f64) -> Edge {
        Edge { src: src.id.clone(), dst: dst.id.clone(), weight, builder: "test" }
    }

    fn run(
        frags: &[Fragment],
        edges: Vec<Edge>,
        seeds: &BTreeSet<FragmentId>,
        alpha: f64,
    ) -> PprScores {
        let graph = FragmentGraph::assemble(frags, edges, seeds, &DiffmapConfig::default());
        personalized_pagerank(&graph, seeds, alpha, DEFAULT_TOLERANCE, DEFAULT_MAX_ITERATIONS)
    }

    fn assert_distribution(scores: &PprScores) {
        let total: f64 = scores.scores.values().sum();
        assert!((total - 1.0).abs() < 1e-6, "sum should be 1, got {}", total);
        assert!(scores.scores.values().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_isolated_seeds_keep_all_mass() {
        let a = frag("a.py");
        let b = frag("b.py");
        let c = frag("c.py");
        let frags = vec![a.clone(), b.clone(), c.clone()];
        let seeds: BTreeSet<FragmentId> = [a.id.clone(), b.id.clone()].into_iter().collect();

        let scores = run(&frags, Vec::new(), &seeds, 0.60);
        assert_distribution(&scores);
        assert!((scores.score(&a.id) - 0.5).abs() < 1e-9);
        assert!((scores.score(&b.id) - 0.5).abs() < 1e-9);
        assert_eq!(scores.score(&c.id), 0.0);
    }

    #[test]
    fn test_neighbours_of_seed_gain_mass() {
        let a = frag("a.py");
        let b = frag("b.py");
        let c = frag("c.py");
        let frags = vec![a.clone(), b.clone(), c.clone()];
        let edges = vec![edge(&a, &b, 0.9)];
        let seeds: BTreeSet<FragmentId> = [a.id.clone()].into_iter().collect();

        let scores = run(&frags, edges, &seeds, 0.60);
        assert_distribution(&scores);
        assert!(scores.score(&a.id) > scores.score(&b.id));
        assert!(scores.score(&b.id) > scores.score(&c.id));
        assert!(scores.score(&b.id) > 0.0);
    }

    #[test]
    fn test_locality_falls_off_with_distance() {
        // Chain: seed -> n1 -> n2 -> n3
        let frags: Vec<Fragment> = (0..4).map(|i| frag(&format!("n{}.py", i))).collect();
        let edges = vec![
            edge(&frags[0], &frags[1], 0.8),
            edge(&frags[1], &frags[2], 0.8),
            edge(&frags[2], &frags[3], 0.8),
        ];
        let seeds: BTreeSet<FragmentId> = [frags[0].id.clone()].into_iter().collect();

        let scores = run(&frags, edges, &seeds, 0.60);
        assert_distribution(&scores);
        for window in frags.windows(2) {
            assert!(
                scores.score(&window[0].id) > scores.score(&window[1].id),
                "mass should decay along the chain"
            );
        }
    }

    #[test]
    fn test_no_seeds_uniform() {
        let frags: Vec<Fragment> = (0..4).map(|i| frag(&format!("n{}.py", i))).collect();
        let scores = run(&frags, Vec::new(), &BTreeSet::new(), 0.60);
        assert_distribution(&scores);
        for f in &frags {
            assert!((scores.score(&f.id) - 0.25).abs() < 1e-9);
        }
    }

    #[test]
    fn test_empty_graph() {
        let scores = run(&[], Vec::new(), &BTreeSet::new(), 0.60);
        assert!(scores.scores.is_empty());
        assert_eq!(scores.iterations, 0);
    }

    #[test]
    fn test_converges_within_bounds() {
        let frags: Vec<Fragment> = (0..10).map(|i| frag(&format!("n{}.py", i))).collect();
        let mut edges = Vec::new();
        for i in 0..10 {
            edges.push(edge(&frags[i], &frags[(i + 1) % 10], 0.5));
        }
        let seeds: BTreeSet<FragmentId> = [frags[0].id.clone()].into_iter().collect();
        let scores = run(&frags, edges, &seeds, 0.60);
        assert!(scores.iterations <= DEFAULT_MAX_ITERATIONS);
        assert!(scores.iterations >= 2, "a cycle needs several sweeps");
        assert_distribution(&scores);
    }

    #[test]
    fn test_deterministic() {
        let frags: Vec<Fragment> = (0..5).map(|i| frag(&format!("n{}.py", i))).collect();
        let mk = || {
            vec![
                edge(&frags[0], &frags[1], 0.7),
                edge(&frags[1], &frags[2], 0.4),
                edge(&frags[3], &frags[0], 0.2),
            ]
        };
        let seeds: BTreeSet<FragmentId> = [frags[0].id.clone()].into_iter().collect();
        let first = run(&frags, mk(), &seeds, 0.60);
        let second = run(&frags, mk(), &seeds, 0.60);
        for f in &frags {
            assert_eq!(first.score(&f.id).to_bits(), second.score(&f.id).to_bits());
        }
    }
}
