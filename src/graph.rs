//! Graph assembly: aggregate multi-builder edges, suppress hubs, and
//! freeze the result into a petgraph structure for PPR.
//!
//! Aggregation takes the max weight per ordered pair; the builder id
//! survives only in debug logs. Hub suppression runs on the aggregated
//! weights *before* out-degrees are computed, so the transition
//! probabilities PPR sees already reflect the dampened weights.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::config::DiffmapConfig;
use crate::edges::Edge;
use crate::types::{Fragment, FragmentId};

/// The assembled, immutable fragment graph.
pub struct FragmentGraph {
    graph: DiGraph<(), f64>,
    node_of: HashMap<FragmentId, NodeIndex>,
    id_of: Vec<FragmentId>,
    /// Weighted out-degree per node, cached for PPR normalisation
    out_weight: Vec<f64>,
}

impl FragmentGraph {
    /// Build the graph over the whole universe. Every fragment becomes
    /// a node (isolated ones included); edges are max-aggregated, then
    /// hub-suppressed.
    pub fn assemble(
        fragments: &[Fragment],
        edges: Vec<Edge>,
        core: &BTreeSet<FragmentId>,
        config: &DiffmapConfig,
    ) -> Self {
        let mut graph: DiGraph<(), f64> = DiGraph::new();
        let mut node_of: HashMap<FragmentId, NodeIndex> = HashMap::with_capacity(fragments.len());
        let mut id_of: Vec<FragmentId> = Vec::with_capacity(fragments.len());

        // Fragments arrive sorted, so node indices are deterministic
        for frag in fragments {
            let idx = graph.add_node(());
            node_of.insert(frag.id.clone(), idx);
            id_of.push(frag.id.clone());
        }

        // Max-aggregation over dense index pairs
        let mut aggregated: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        let mut dropped = 0usize;
        for edge in edges {
            if !edge.weight.is_finite() || edge.weight <= 0.0 {
                tracing::debug!(builder = edge.builder, "dropping edge with invalid weight");
                continue;
            }
            let (Some(&src), Some(&dst)) = (node_of.get(&edge.src), node_of.get(&edge.dst))
            else {
                // Builders may reference fragments evicted by the cap
                dropped += 1;
                continue;
            };
            if src == dst {
                continue;
            }
            let weight = edge.weight.min(1.0);
            let slot = aggregated.entry((src.index(), dst.index())).or_insert(0.0);
            if weight > *slot {
                *slot = weight;
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, "edges referenced fragments outside the universe");
        }

        apply_hub_suppression(&mut aggregated, &id_of, core, config.hub_percentile);

        let mut out_weight = vec![0.0; fragments.len()];
        for (&(src, dst), &weight) in &aggregated {
            graph.add_edge(NodeIndex::new(src), NodeIndex::new(dst), weight);
            out_weight[src] += weight;
        }

        Self { graph, node_of, id_of, out_weight }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, id: &FragmentId) -> Option<NodeIndex> {
        self.node_of.get(id).copied()
    }

    pub fn fragment_id(&self, idx: NodeIndex) -> &FragmentId {
        &self.id_of[idx.index()]
    }

    pub fn out_weight(&self, idx: NodeIndex) -> f64 {
        self.out_weight[idx.index()]
    }

    /// Outgoing `(target, weight)` pairs of a node.
    pub fn out_edges(&self, idx: NodeIndex) -> impl Iterator<Item = (NodeIndex, f64)> + '_ {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), *e.weight()))
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> {
        self.graph.node_indices()
    }

    /// Maximum edge weight, for invariant checks.
    pub fn max_weight(&self) -> f64 {
        self.graph
            .edge_references()
            .map(|e| *e.weight())
            .fold(0.0_f64, f64::max)
    }
}

/// Dampen edges into high in-degree nodes outside the core set.
///
/// theta is the `percentile`-th in-degree; nodes above it get their
/// incoming weights scaled by `1 / ln(1 + in_degree)`. This keeps
/// utility modules (loggers, config objects) from absorbing PPR mass
/// that belongs to the change's real neighbourhood.
fn apply_hub_suppression(
    aggregated: &mut BTreeMap<(usize, usize), f64>,
    id_of: &[FragmentId],
    core: &BTreeSet<FragmentId>,
    percentile: f64,
) {
    if aggregated.is_empty() {
        return;
    }

    let mut in_degree: BTreeMap<usize, usize> = BTreeMap::new();
    for &(_, dst) in aggregated.keys() {
        *in_degree.entry(dst).or_insert(0) += 1;
    }

    let mut degrees: Vec<usize> = in_degree.values().copied().collect();
    degrees.sort_unstable();
    let idx = ((degrees.len() as f64 * percentile) as usize).min(degrees.len() - 1);
    let theta = degrees[idx];

    let mut suppressed = 0usize;
    for ((_, dst), weight) in aggregated.iter_mut() {
        let degree = in_degree[dst];
        if degree <= theta {
            continue;
        }
        if core.contains(&id_of[*dst]) {
            continue;
        }
        *weight /= (1.0 + degree as f64).ln();
        suppressed += 1;
    }
    if suppressed > 0 {
        tracing::debug!(theta, suppressed, "hub suppression applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::make_fragment;
    use crate::tokenize::TokenProfile;
    use crate::types::FragmentKind;
    use std::sync::Arc;

    fn frag(path: &str) -> Fragment {
        let lines = vec!["alpha", "beta"];
        make_fragment(&Arc::from(path), &lines, 1, 2, FragmentKind::Generic, None, None, TokenProfile::Code)
    }

    fn edge(src: &Fragment, dst: &Fragment, weight: f64) -> Edge {
        Edge { src: src.id.clone(), dst: dst.id.clone(), weight, builder: "test" }
    }

    #[test]
    fn test_max_aggregation() {
        let a = frag("a.py");
        let b = frag("b.py");
        let frags = vec![a.clone(), b.clone()];
        let edges = vec![edge(&a, &b, 0.3), edge(&a, &b, 0.7), edge(&a, &b, 0.5)];
        let graph =
            FragmentGraph::assemble(&frags, edges, &BTreeSet::new(), &DiffmapConfig::default());
        assert_eq!(graph.edge_count(), 1);
        assert!((graph.max_weight() - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_no_self_loops() {
        let a = frag("a.py");
        let frags = vec![a.clone()];
        let edges = vec![edge(&a, &a, 0.9)];
        let graph =
            FragmentGraph::assemble(&frags, edges, &BTreeSet::new(), &DiffmapConfig::default());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_weights_clamped_to_one() {
        let a = frag("a.py");
        let b = frag("b.py");
        let frags = vec![a.clone(), b.clone()];
        let edges = vec![edge(&a, &b, 3.5)];
        let graph =
            FragmentGraph::assemble(&frags, edges, &BTreeSet::new(), &DiffmapConfig::default());
        assert!(graph.max_weight() <= 1.0);
    }

    #[test]
    fn test_hub_suppression_dampens_popular_target() {
        // hub receives edges from everyone; pair a->b stays untouched
        let hub = frag("log.py");
        let frags: Vec<Fragment> = (0..20)
            .map(|i| frag(&format!("f{:02}.py", i)))
            .chain([hub.clone()])
            .collect();

        let mut edges = Vec::new();
        for i in 0..20 {
            edges.push(edge(&frags[i], &hub, 0.8));
        }
        // Give every other node a single incoming edge so the hub's
        // in-degree sits far above the 95th percentile
        for i in 0..19 {
            edges.push(edge(&frags[i], &frags[i + 1], 0.8));
        }

        let graph =
            FragmentGraph::assemble(&frags, edges, &BTreeSet::new(), &DiffmapConfig::default());

        let hub_idx = graph.node(&hub.id).unwrap();
        let hub_in: f64 = graph
            .node_indices()
            .flat_map(|n| graph.out_edges(n))
            .filter(|(dst, _)| *dst == hub_idx)
            .map(|(_, w)| w)
            .fold(0.0, f64::max);
        // 0.8 / ln(21) < 0.8
        assert!(hub_in < 0.8 / 2.5);

        let normal_idx = graph.node(&frags[1].id).unwrap();
        let normal_in: f64 = graph
            .node_indices()
            .flat_map(|n| graph.out_edges(n))
            .filter(|(dst, _)| *dst == normal_idx)
            .map(|(_, w)| w)
            .fold(0.0, f64::max);
        assert!((normal_in - 0.8).abs() < 1e-12, "non-hub edges keep their weight");
    }

    #[test]
    fn test_hub_suppression_spares_core() {
        let hub = frag("core_hub.py");
        let frags: Vec<Fragment> = (0..20)
            .map(|i| frag(&format!("f{:02}.py", i)))
            .chain([hub.clone()])
            .collect();
        let mut edges = Vec::new();
        for i in 0..20 {
            edges.push(edge(&frags[i], &hub, 0.8));
        }
        for i in 0..19 {
            edges.push(edge(&frags[i], &frags[i + 1], 0.8));
        }

        let core: BTreeSet<FragmentId> = [hub.id.clone()].into_iter().collect();
        let graph = FragmentGraph::assemble(&frags, edges, &core, &DiffmapConfig::default());

        let hub_idx = graph.node(&hub.id).unwrap();
        let hub_in = graph
            .node_indices()
            .flat_map(|n| graph.out_edges(n))
            .filter(|(dst, _)| *dst == hub_idx)
            .map(|(_, w)| w)
            .fold(0.0, f64::max);
        assert!((hub_in - 0.8).abs() < 1e-12, "core nodes are never suppressed");
    }

    #[test]
    fn test_suppression_never_raises() {
        let a = frag("a.py");
        let b = frag("b.py");
        let frags = vec![a.clone(), b.clone()];
        let edges = vec![edge(&a, &b, 0.6), edge(&b, &a, 0.6)];
        let graph =
            FragmentGraph::assemble(&frags, edges, &BTreeSet::new(), &DiffmapConfig::default());
        assert!(graph.max_weight() <= 0.6 + 1e-12);
    }

    #[test]
    fn test_out_weight_cached() {
        let a = frag("a.py");
        let b = frag("b.py");
        let c = frag("c.py");
        let frags = vec![a.clone(), b.clone(), c.clone()];
        let edges = vec![edge(&a, &b, 0.5), edge(&a, &c, 0.25)];
        let graph =
            FragmentGraph::assemble(&frags, edges, &BTreeSet::new(), &DiffmapConfig::default());
        let a_idx = graph.node(&a.id).unwrap();
        assert!((graph.out_weight(a_idx) - 0.75).abs() < 1e-12);
    }
}
