//! Diff mapping: project hunk line ranges onto fragments to produce the
//! core set E₀.
//!
//! Resolution order per hunk:
//! 1. A fragment fully covering the hunk - take the smallest such one.
//! 2. Fragments overlapping the hunk - take all of them.
//! 3. The fragment enclosing the hunk's first line.
//! 4. The nearest fragments before and after (hunks in gaps, e.g. pure
//!    deletions between two functions).
//!
//! Post-side hunks map against post-image fragments. Pre-side hunks map
//! against pre-image fragments only when the file is gone from the post
//! image; for modified files the removal is projected onto the post
//! image through rules 3 and 4.
//!
//! Whenever a chosen fragment records an enclosing container header
//! (an oversized class split at method boundaries), the header fragment
//! joins E₀ too.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::fragment::enclosing_fragment;
use crate::types::{DiffHunk, DiffSide, Fragment, FragmentId};

/// Compute E₀ from hunks and the fragmented snapshots.
///
/// `post_frags` holds the fragments of every universe file keyed by
/// path; `pre_frags` holds pre-image fragments of deleted files only.
pub fn core_set(
    hunks: &[DiffHunk],
    post_frags: &BTreeMap<Arc<str>, Vec<Fragment>>,
    pre_frags: &BTreeMap<Arc<str>, Vec<Fragment>>,
) -> BTreeSet<FragmentId> {
    let mut core: BTreeSet<FragmentId> = BTreeSet::new();

    for hunk in hunks {
        let frags = match hunk.side {
            DiffSide::Post => post_frags.get(&hunk.path),
            DiffSide::Pre => pre_frags
                .get(&hunk.path)
                .or_else(|| post_frags.get(&hunk.path)),
        };
        let Some(frags) = frags else {
            tracing::debug!(path = hunk.path.as_ref(), "hunk references unfragmented file");
            continue;
        };
        if frags.is_empty() {
            continue;
        }

        map_hunk(hunk, frags, &mut core);
    }

    // Pull in container headers for everything selected so far
    let mut headers: BTreeSet<FragmentId> = BTreeSet::new();
    for id in &core {
        let Some(frags) = post_frags.get(&id.path).or_else(|| pre_frags.get(&id.path)) else {
            continue;
        };
        let Some(frag) = frags.iter().find(|f| f.id == *id) else {
            continue;
        };
        if let Some(line) = frag.container_line {
            if let Some(header) = enclosing_fragment(frags, line) {
                headers.insert(header.id.clone());
            }
        }
    }
    core.extend(headers);

    core
}

fn map_hunk(hunk: &DiffHunk, frags: &[Fragment], core: &mut BTreeSet<FragmentId>) {
    let (h_start, h_end) = (hunk.start_line, hunk.end_line);

    // 1. Minimal covering fragment
    let covering = frags
        .iter()
        .filter(|f| f.start_line() <= h_start && h_end <= f.end_line())
        .min_by_key(|f| (f.line_count(), f.start_line()));
    if let Some(best) = covering {
        core.insert(best.id.clone());
        return;
    }

    // 2. Partial overlaps: take them all
    let mut overlapped = false;
    for f in frags {
        if f.start_line() <= h_end && f.end_line() >= h_start {
            core.insert(f.id.clone());
            overlapped = true;
        }
    }
    if overlapped {
        return;
    }

    // 3. Enclosing fragment of the first touched line
    if let Some(enc) = enclosing_fragment(frags, h_start) {
        core.insert(enc.id.clone());
        return;
    }

    // 4. Nearest neighbours around the gap
    if let Some(before) = frags
        .iter()
        .filter(|f| f.end_line() < h_start)
        .max_by_key(|f| f.end_line())
    {
        core.insert(before.id.clone());
    }
    if let Some(after) = frags
        .iter()
        .filter(|f| f.start_line() > h_end)
        .min_by_key(|f| f.start_line())
    {
        core.insert(after.id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::make_fragment;
    use crate::tokenize::TokenProfile;
    use crate::types::FragmentKind;

    fn frags_for(path: &str, spans: &[(u32, u32)], total: u32) -> Vec<Fragment> {
        let p: Arc<str> = Arc::from(path);
        let raw: Vec<String> = (0..total).map(|i| format!("line {}", i)).collect();
        let lines: Vec<&str> = raw.iter().map(|s| s.as_str()).collect();
        spans
            .iter()
            .map(|&(s, e)| {
                make_fragment(&p, &lines, s, e, FragmentKind::Generic, None, None, TokenProfile::Code)
            })
            .collect()
    }

    fn hunk(path: &str, side: DiffSide, start: u32, end: u32) -> DiffHunk {
        DiffHunk { path: Arc::from(path), side, start_line: start, end_line: end }
    }

    fn post_map(path: &str, frags: Vec<Fragment>) -> BTreeMap<Arc<str>, Vec<Fragment>> {
        let mut map = BTreeMap::new();
        map.insert(Arc::from(path), frags);
        map
    }

    #[test]
    fn test_covering_picks_smallest() {
        let frags = frags_for("a.py", &[(1, 30), (10, 14), (15, 30)], 30);
        let core = core_set(
            &[hunk("a.py", DiffSide::Post, 11, 12)],
            &post_map("a.py", frags),
            &BTreeMap::new(),
        );
        assert_eq!(core.len(), 1);
        assert_eq!(core.iter().next().unwrap().start_line, 10);
    }

    #[test]
    fn test_overlap_takes_all() {
        let frags = frags_for("a.py", &[(1, 10), (11, 20)], 20);
        let core = core_set(
            &[hunk("a.py", DiffSide::Post, 8, 13)],
            &post_map("a.py", frags),
            &BTreeMap::new(),
        );
        assert_eq!(core.len(), 2);
    }

    #[test]
    fn test_gap_picks_neighbours() {
        let frags = frags_for("a.py", &[(1, 5), (20, 25)], 25);
        let core = core_set(
            &[hunk("a.py", DiffSide::Post, 10, 10)],
            &post_map("a.py", frags),
            &BTreeMap::new(),
        );
        let starts: Vec<u32> = core.iter().map(|id| id.start_line).collect();
        assert_eq!(starts, vec![1, 20]);
    }

    #[test]
    fn test_pre_hunk_uses_pre_image_for_deleted_file() {
        let pre = frags_for("gone.py", &[(1, 8)], 8);
        let mut pre_map: BTreeMap<Arc<str>, Vec<Fragment>> = BTreeMap::new();
        pre_map.insert(Arc::from("gone.py"), pre);
        let core = core_set(
            &[hunk("gone.py", DiffSide::Pre, 2, 4)],
            &BTreeMap::new(),
            &pre_map,
        );
        assert_eq!(core.len(), 1);
    }

    #[test]
    fn test_container_header_joins_core() {
        let p: Arc<str> = Arc::from("big.py");
        let raw: Vec<String> = (0..40).map(|i| format!("line {}", i)).collect();
        let lines: Vec<&str> = raw.iter().map(|s| s.as_str()).collect();
        let header =
            make_fragment(&p, &lines, 1, 2, FragmentKind::Class, Some("Big".into()), None, TokenProfile::Code);
        let mut method =
            make_fragment(&p, &lines, 3, 20, FragmentKind::Method, Some("m".into()), None, TokenProfile::Code);
        method.container_line = Some(1);
        let frags = vec![header, method];

        let core = core_set(
            &[hunk("big.py", DiffSide::Post, 5, 6)],
            &post_map("big.py", frags),
            &BTreeMap::new(),
        );
        let starts: Vec<u32> = core.iter().map(|id| id.start_line).collect();
        assert_eq!(starts, vec![1, 3]);
    }

    #[test]
    fn test_missing_file_is_skipped() {
        let core = core_set(
            &[hunk("nope.py", DiffSide::Post, 1, 3)],
            &BTreeMap::new(),
            &BTreeMap::new(),
        );
        assert!(core.is_empty());
    }
}
