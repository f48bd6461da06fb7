//! Selection utility: concept coverage with diminishing returns.
//!
//! `U(S) = sum over concepts z of phi(max over f in S of a(f, z))`
//! where `a(f, z)` is the fragment's PPR score when it contains z and
//! `phi` is the square root. Covering a concept a second time with a
//! weaker fragment gains nothing; covering it with a stronger one
//! gains only the difference of roots. The result is monotone and
//! submodular, which is what licenses the greedy selector.
//!
//! Two escape hatches keep structurally-relevant fragments alive:
//! a relatedness floor for high-PPR fragments (the "structural
//! relatedness" sentinel concept), and a small PPR-proportional gain
//! when the diff produced no concepts at all.

use std::collections::{BTreeSet, HashMap};

use crate::types::Fragment;

/// Fragments below this PPR score get no relatedness floor.
const MIN_REL_FOR_BONUS: f64 = 0.03;
/// Scale of the relatedness floor.
const RELATEDNESS_BONUS: f64 = 0.25;
/// Gain scale when the concept set is empty.
const NO_CONCEPTS_FALLBACK_FACTOR: f64 = 0.1;
/// Concept-overlap count is capped here when scaling the floor.
const MAX_COVERED_FOR_BONUS: usize = 5;

/// Mutable coverage state: per concept, the best PPR score of any
/// selected fragment containing it.
#[derive(Debug, Clone, Default)]
pub struct UtilityState {
    max_rel: HashMap<String, f64>,
}

fn phi(x: f64) -> f64 {
    if x > 0.0 {
        x.sqrt()
    } else {
        0.0
    }
}

fn covered<'a>(frag: &'a Fragment, concepts: &'a BTreeSet<String>) -> Vec<&'a str> {
    if frag.identifiers.len() <= concepts.len() {
        frag.identifiers
            .iter()
            .filter(|t| concepts.contains(*t))
            .map(|s| s.as_str())
            .collect()
    } else {
        concepts
            .iter()
            .filter(|c| frag.identifiers.contains(*c))
            .map(|s| s.as_str())
            .collect()
    }
}

/// Marginal utility of adding `frag` to the selection behind `state`.
pub fn marginal_gain(
    frag: &Fragment,
    rel_score: f64,
    concepts: &BTreeSet<String>,
    state: &UtilityState,
) -> f64 {
    if concepts.is_empty() {
        return rel_score * NO_CONCEPTS_FALLBACK_FACTOR;
    }

    let covered = covered(frag, concepts);
    let mut gain = 0.0;
    for concept in &covered {
        let old = state.max_rel.get(*concept).copied().unwrap_or(0.0);
        let new = old.max(rel_score);
        gain += phi(new) - phi(old);
    }

    // Relatedness floor: concept-bearing fragments with real PPR mass
    // stay selectable even when their concepts are already covered
    if !covered.is_empty() && rel_score >= MIN_REL_FOR_BONUS {
        let floor = rel_score * RELATEDNESS_BONUS * covered.len().min(MAX_COVERED_FOR_BONUS) as f64;
        gain = gain.max(floor);
    }

    // Structural relatedness: pure graph neighbours (no concept
    // overlap) still contribute in proportion to their PPR score
    if rel_score >= MIN_REL_FOR_BONUS {
        gain = gain.max(rel_score * RELATEDNESS_BONUS);
    }

    gain
}

/// Commit `frag` to the coverage state.
pub fn apply_fragment(
    frag: &Fragment,
    rel_score: f64,
    concepts: &BTreeSet<String>,
    state: &mut UtilityState,
) {
    for concept in covered(frag, concepts) {
        let slot = state.max_rel.entry(concept.to_string()).or_insert(0.0);
        if rel_score > *slot {
            *slot = rel_score;
        }
    }
}

/// Gain per token: the greedy selection key.
pub fn density(
    frag: &Fragment,
    rel_score: f64,
    concepts: &BTreeSet<String>,
    state: &UtilityState,
    cost: usize,
) -> f64 {
    if cost == 0 {
        return 0.0;
    }
    marginal_gain(frag, rel_score, concepts, state) / cost as f64
}

/// Total utility of the state.
pub fn utility_value(state: &UtilityState) -> f64 {
    state.max_rel.values().map(|&v| phi(v)).sum()
}
