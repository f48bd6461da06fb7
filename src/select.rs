//! Lazy-greedy submodular selection with adaptive tau-stopping.
//!
//! The selection starts from the core set, admitted in PPR-descending
//! order (truncated with a warning if the core alone blows the
//! budget). Non-core candidates then compete on density - marginal
//! utility per token - through a max-heap with version-stamped lazy
//! revalidation: a popped entry computed against a stale selection is
//! recomputed and reinserted instead of trusted.
//!
//! The first five popped densities form a baseline; once a popped
//! density falls below tau times the baseline median, selection stops.
//! Candidates that do not fit the remaining budget are skipped, not
//! terminal - a smaller fragment may still fit. A final
//! single-fragment check covers the knapsack failure mode where one
//! expensive fragment beats the whole greedy tail.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap, HashMap};
use std::time::Instant;

use crate::types::{Fragment, FragmentId, StopReason};
use crate::utility::{apply_fragment, density, marginal_gain, UtilityState};

/// How many popped densities establish the stopping baseline.
const BASELINE_K: usize = 5;

#[derive(Debug)]
pub struct SelectionResult {
    /// Selected fragments in selection order (core first)
    pub selected: Vec<Fragment>,
    pub reason: StopReason,
    pub used_tokens: usize,
    pub utility: f64,
}

/// Max-heap entry. Ties break on higher PPR, then lexicographic
/// fragment id, which keeps the selection deterministic.
struct HeapEntry {
    density: f64,
    rel: f64,
    id: FragmentId,
    version: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.density
            .partial_cmp(&other.density)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.rel.partial_cmp(&other.rel).unwrap_or(Ordering::Equal))
            .then_with(|| other.id.cmp(&self.id))
    }
}

struct Budget {
    cap: Option<usize>,
    used: usize,
}

impl Budget {
    fn fits(&self, cost: usize) -> bool {
        self.cap.map_or(true, |cap| self.used + cost <= cap)
    }

    fn charge(&mut self, cost: usize) {
        self.used += cost;
    }
}

fn overlaps_selected(frag: &Fragment, selected: &[Fragment]) -> bool {
    selected.iter().any(|s| {
        s.id != frag.id
            && s.id.path == frag.id.path
            && s.id.start_line <= frag.id.end_line
            && s.id.end_line >= frag.id.start_line
    })
}

/// Run the selection. `rel` is the PPR score table; `overhead` is the
/// per-fragment framing cost added to every token count.
#[allow(clippy::too_many_arguments)]
pub fn lazy_greedy_select(
    fragments: &[Fragment],
    core: &BTreeSet<FragmentId>,
    rel: &HashMap<FragmentId, f64>,
    concepts: &BTreeSet<String>,
    budget: Option<usize>,
    tau: f64,
    overhead: usize,
    deadline: Option<Instant>,
) -> SelectionResult {
    let score = |id: &FragmentId| rel.get(id).copied().unwrap_or(0.0);
    let cost = |f: &Fragment| f.token_count + overhead;

    if fragments.is_empty() {
        return SelectionResult {
            selected: Vec::new(),
            reason: StopReason::NoCandidates,
            used_tokens: 0,
            utility: 0.0,
        };
    }

    let mut budget = Budget { cap: budget, used: 0 };
    let mut state = UtilityState::default();
    let mut selected: Vec<Fragment> = Vec::new();

    // Core admission, PPR-descending; truncation is the budget warning
    // path of pathological diffs
    let mut core_frags: Vec<&Fragment> =
        fragments.iter().filter(|f| core.contains(&f.id)).collect();
    core_frags.sort_by(|a, b| {
        score(&b.id)
            .partial_cmp(&score(&a.id))
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut total_utility = 0.0;
    for frag in core_frags {
        let frag_cost = cost(frag);
        if !budget.fits(frag_cost) {
            tracing::warn!(
                dropped = %frag.id,
                used = budget.used,
                "core set exceeds the token budget, truncating by relevance"
            );
            return SelectionResult {
                selected,
                reason: StopReason::BudgetExhausted,
                used_tokens: budget.used,
                utility: total_utility,
            };
        }
        budget.charge(frag_cost);
        total_utility += marginal_gain(frag, score(&frag.id), concepts, &state);
        apply_fragment(frag, score(&frag.id), concepts, &mut state);
        selected.push(frag.clone());
    }

    // Snapshot for the singleton fallback
    let base_state = state.clone();
    let base_selected_len = selected.len();
    let base_used = budget.used;
    let base_utility = total_utility;

    // Candidate heap over the non-core remainder
    let mut id_to_frag: HashMap<&FragmentId, &Fragment> = HashMap::new();
    let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
    for frag in fragments {
        if core.contains(&frag.id) || overlaps_selected(frag, &selected) {
            continue;
        }
        let d = density(frag, score(&frag.id), concepts, &state, cost(frag));
        heap.push(HeapEntry { density: d, rel: score(&frag.id), id: frag.id.clone(), version: 0 });
        id_to_frag.insert(&frag.id, frag);
    }

    let mut current_version: u64 = 0;
    let mut baseline: Vec<f64> = Vec::with_capacity(BASELINE_K);
    let mut threshold = 0.0;
    let mut tau_fired = false;
    let mut deadline_fired = false;
    let mut drained_nonpositive = false;
    let mut skipped_for_budget = false;

    while let Some(entry) = heap.pop() {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            deadline_fired = true;
            break;
        }
        let Some(frag) = id_to_frag.get(&entry.id).copied() else { continue };
        let frag_cost = cost(frag);
        if !budget.fits(frag_cost) {
            skipped_for_budget = true;
            continue;
        }
        if overlaps_selected(frag, &selected) {
            continue;
        }

        // Lazy revalidation against the current selection
        if entry.version < current_version {
            let fresh = density(frag, score(&frag.id), concepts, &state, frag_cost);
            if fresh > 0.0 {
                heap.push(HeapEntry {
                    density: fresh,
                    rel: entry.rel,
                    id: entry.id,
                    version: current_version,
                });
            }
            continue;
        }

        if entry.density <= 0.0 {
            drained_nonpositive = true;
            break;
        }

        if baseline.len() < BASELINE_K {
            baseline.push(entry.density);
            if baseline.len() == BASELINE_K {
                let mut sorted = baseline.clone();
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
                threshold = tau * sorted[BASELINE_K / 2];
            }
        } else if entry.density < threshold {
            tau_fired = true;
            break;
        }

        budget.charge(frag_cost);
        total_utility += entry.density * frag_cost as f64;
        apply_fragment(frag, score(&frag.id), concepts, &mut state);
        selected.push(frag.clone());
        current_version += 1;
    }

    let greedy_utility = total_utility;

    // Knapsack fallback: one expensive fragment can beat the greedy
    // tail, but only when something actually cut the run short - a
    // drained heap means the singleton is already inside S
    if tau_fired || skipped_for_budget {
        if let Some(result) = try_singleton(
            fragments,
            core,
            &selected[..base_selected_len],
            &base_state,
            base_used,
            budget.cap,
            rel,
            concepts,
            base_utility,
            greedy_utility,
            overhead,
        ) {
            return result;
        }
    }

    let reason = if deadline_fired {
        StopReason::Deadline
    } else if tau_fired {
        StopReason::Tau
    } else if skipped_for_budget || budget.cap.is_some_and(|cap| budget.used >= cap) {
        StopReason::BudgetExhausted
    } else if selected.len() == base_selected_len {
        StopReason::NoCandidates
    } else if drained_nonpositive && greedy_utility <= 0.0 {
        StopReason::NoUtility
    } else {
        StopReason::NoCandidates
    };

    SelectionResult { selected, reason, used_tokens: budget.used, utility: greedy_utility }
}

/// The `(1 - 1/sqrt(e))` guarantee: compare the greedy tail against the
/// single best non-core fragment on top of the core alone.
#[allow(clippy::too_many_arguments)]
fn try_singleton(
    fragments: &[Fragment],
    core: &BTreeSet<FragmentId>,
    base_selected: &[Fragment],
    base_state: &UtilityState,
    base_used: usize,
    cap: Option<usize>,
    rel: &HashMap<FragmentId, f64>,
    concepts: &BTreeSet<String>,
    base_utility: f64,
    greedy_utility: f64,
    overhead: usize,
) -> Option<SelectionResult> {
    let score = |id: &FragmentId| rel.get(id).copied().unwrap_or(0.0);

    let mut best: Option<(&Fragment, f64)> = None;
    for frag in fragments {
        if core.contains(&frag.id) || overlaps_selected(frag, base_selected) {
            continue;
        }
        let frag_cost = frag.token_count + overhead;
        if cap.is_some_and(|c| base_used + frag_cost > c) {
            continue;
        }
        let gain = marginal_gain(frag, score(&frag.id), concepts, base_state);
        if best.as_ref().map_or(gain > 0.0, |(_, g)| gain > *g) {
            best = Some((frag, gain));
        }
    }

    let (frag, gain) = best?;
    let singleton_utility = base_utility + gain;
    if singleton_utility <= greedy_utility {
        return None;
    }

    tracing::debug!(singleton = %frag.id, "single fragment beats the greedy tail");
    let mut selected = base_selected.to_vec();
    let used = base_used + frag.token_count + overhead;
    selected.push(frag.clone());
    Some(SelectionResult {
        selected,
        reason: StopReason::BestSingleton,
        used_tokens: used,
        utility: singleton_utility,
    })
}
