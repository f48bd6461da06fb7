//! Edge builders: independent producers of weighted directed edges over
//! the candidate universe.
//!
//! Six families - semantic, configuration, structural, document,
//! similarity, history - each a plain function object registered in an
//! explicit list. Builders never fail: unparsable input means no edges
//! from that builder, nothing more. Aggregation across builders happens
//! in the graph assembler, which takes the max weight per ordered pair.

pub mod configuration;
pub mod document;
pub mod history;
pub mod semantic;
pub mod similarity;
pub mod structural;

use std::path::Path;

use crate::config::DiffmapConfig;
use crate::types::{CommitInfo, Fragment, FragmentId};

/// A weighted directed edge between two fragments, tagged with the
/// builder that produced it (diagnostics only).
#[derive(Debug, Clone)]
pub struct Edge {
    pub src: FragmentId,
    pub dst: FragmentId,
    pub weight: f64,
    pub builder: &'static str,
}

/// Shared read-only context handed to every builder.
pub struct EdgeContext<'a> {
    pub config: &'a DiffmapConfig,
    pub repo_root: Option<&'a Path>,
    pub history: Option<&'a [CommitInfo]>,
}

/// One edge producer. `fragments` is the finalized universe, sorted by
/// fragment id.
pub trait EdgeBuilder {
    fn id(&self) -> &'static str;
    fn build(&self, fragments: &[Fragment], ctx: &EdgeContext<'_>) -> Vec<Edge>;
}

/// The full builder registry in a fixed order. No dynamic loading;
/// adding a family means adding a line here.
pub fn default_builders() -> Vec<Box<dyn EdgeBuilder>> {
    vec![
        Box::new(semantic::SemanticEdgeBuilder),
        Box::new(configuration::ConfigurationEdgeBuilder),
        Box::new(structural::ContainmentEdgeBuilder),
        Box::new(structural::SiblingEdgeBuilder),
        Box::new(structural::TestEdgeBuilder),
        Box::new(document::DocumentEdgeBuilder),
        Box::new(similarity::LexicalEdgeBuilder),
        Box::new(history::CochangeEdgeBuilder),
    ]
}

/// Run every registered builder and concatenate the outputs.
pub fn collect_edges(fragments: &[Fragment], ctx: &EdgeContext<'_>) -> Vec<Edge> {
    let mut edges = Vec::new();
    for builder in default_builders() {
        let produced = builder.build(fragments, ctx);
        tracing::debug!(builder = builder.id(), edges = produced.len(), "edge builder done");
        edges.extend(produced);
    }
    edges
}

/// Push `src -> dst` and optionally the dampened reverse edge. Skips
/// self-edges and non-positive weights.
pub(crate) fn push_edge(
    edges: &mut Vec<Edge>,
    builder: &'static str,
    src: &FragmentId,
    dst: &FragmentId,
    weight: f64,
    reverse_factor: Option<f64>,
) {
    if src == dst || !weight.is_finite() || weight <= 0.0 {
        return;
    }
    let weight = weight.min(1.0);
    edges.push(Edge { src: src.clone(), dst: dst.clone(), weight, builder });
    if let Some(factor) = reverse_factor {
        let reverse = (weight * factor).min(1.0);
        if reverse > 0.0 {
            edges.push(Edge { src: dst.clone(), dst: src.clone(), weight: reverse, builder });
        }
    }
}

/// The fragment with the largest token count per file: the file's
/// representative for file-level relations.
pub(crate) fn file_representatives(
    fragments: &[Fragment],
) -> std::collections::BTreeMap<std::sync::Arc<str>, &Fragment> {
    let mut reps: std::collections::BTreeMap<std::sync::Arc<str>, &Fragment> =
        std::collections::BTreeMap::new();
    for frag in fragments {
        reps.entry(frag.id.path.clone())
            .and_modify(|existing| {
                if frag.token_count > existing.token_count {
                    *existing = frag;
                }
            })
            .or_insert(frag);
    }
    reps
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fid(path: &str, start: u32, end: u32) -> FragmentId {
        FragmentId::new(Arc::from(path), start, end)
    }

    #[test]
    fn test_push_edge_skips_self_and_invalid() {
        let a = fid("a.py", 1, 5);
        let b = fid("b.py", 1, 5);
        let mut edges = Vec::new();
        push_edge(&mut edges, "t", &a, &a, 0.5, None);
        push_edge(&mut edges, "t", &a, &b, 0.0, None);
        push_edge(&mut edges, "t", &a, &b, f64::NAN, None);
        assert!(edges.is_empty());
    }

    #[test]
    fn test_push_edge_reverse() {
        let a = fid("a.py", 1, 5);
        let b = fid("b.py", 1, 5);
        let mut edges = Vec::new();
        push_edge(&mut edges, "t", &a, &b, 0.8, Some(0.5));
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].weight, 0.8);
        assert_eq!(edges[1].weight, 0.4);
        assert_eq!(edges[1].src, b);
    }

    #[test]
    fn test_push_edge_clamps_to_one() {
        let a = fid("a.py", 1, 5);
        let b = fid("b.py", 1, 5);
        let mut edges = Vec::new();
        push_edge(&mut edges, "t", &a, &b, 1.7, None);
        assert_eq!(edges[0].weight, 1.0);
    }
}
