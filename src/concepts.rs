//! Diff concepts: the identifier vocabulary of the change.
//!
//! A concept is a non-stopword identifier token appearing on any added
//! or removed line. Concepts seed rare-identifier universe expansion
//! and define the coverage targets of the selection utility.

use std::collections::BTreeSet;

use crate::tokenize::{extract_identifiers, TokenProfile};
use crate::types::{ChangedFile, DiffHunk, DiffSide};

/// Extract the concept set from the changed lines named by the hunks.
///
/// Added lines are read out of the post image, removed lines out of the
/// pre image. Hunks pointing past the end of their snapshot are clipped;
/// hunks for unknown files are ignored.
pub fn concepts_from_diff(files: &[ChangedFile], hunks: &[DiffHunk]) -> BTreeSet<String> {
    let mut text = String::new();

    for hunk in hunks {
        let Some(file) = files.iter().find(|f| f.path == hunk.path) else {
            continue;
        };
        let snapshot = match hunk.side {
            DiffSide::Post => file.post_text.as_deref(),
            DiffSide::Pre => file.pre_text.as_deref(),
        };
        let Some(snapshot) = snapshot else { continue };

        for (i, line) in snapshot.lines().enumerate() {
            let ln = (i + 1) as u32;
            if ln >= hunk.start_line && ln <= hunk.end_line {
                text.push_str(line);
                text.push('\n');
            }
            if ln > hunk.end_line {
                break;
            }
        }
    }

    extract_identifiers(&text, TokenProfile::Code)
}

/// How many diff concepts a fragment's identifier set covers. Used to
/// prioritise fragments when the universe is capped.
pub fn concept_overlap(identifiers: &BTreeSet<String>, concepts: &BTreeSet<String>) -> usize {
    if identifiers.len() <= concepts.len() {
        identifiers.iter().filter(|t| concepts.contains(*t)).count()
    } else {
        concepts.iter().filter(|c| identifiers.contains(*c)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn changed(path: &str, pre: Option<&str>, post: Option<&str>) -> ChangedFile {
        ChangedFile {
            path: Arc::from(path),
            pre_text: pre.map(String::from),
            post_text: post.map(String::from),
        }
    }

    fn hunk(path: &str, side: DiffSide, start: u32, end: u32) -> DiffHunk {
        DiffHunk { path: Arc::from(path), side, start_line: start, end_line: end }
    }

    #[test]
    fn test_added_lines_yield_concepts() {
        let files = vec![changed(
            "a.py",
            Some("def foo():\n    pass\n"),
            Some("def foo():\n    launch_rocket()\n"),
        )];
        let hunks = vec![hunk("a.py", DiffSide::Post, 2, 2)];
        let concepts = concepts_from_diff(&files, &hunks);
        assert!(concepts.contains("launch_rocket"));
        assert!(concepts.contains("launch"));
        assert!(concepts.contains("rocket"));
        // Untouched lines contribute nothing
        assert!(!concepts.iter().any(|c| c == "pass"));
    }

    #[test]
    fn test_removed_lines_read_pre_image() {
        let files = vec![changed(
            "a.py",
            Some("legacy_handler()\n"),
            Some("\n"),
        )];
        let hunks = vec![hunk("a.py", DiffSide::Pre, 1, 1)];
        let concepts = concepts_from_diff(&files, &hunks);
        assert!(concepts.contains("legacy_handler"));
    }

    #[test]
    fn test_out_of_range_hunks_clip() {
        let files = vec![changed("a.py", None, Some("one_line()\n"))];
        let hunks = vec![hunk("a.py", DiffSide::Post, 1, 99)];
        let concepts = concepts_from_diff(&files, &hunks);
        assert!(concepts.contains("one_line"));
    }

    #[test]
    fn test_concept_overlap() {
        let identifiers: BTreeSet<String> =
            ["alpha", "beta", "gamma"].iter().map(|s| s.to_string()).collect();
        let concepts: BTreeSet<String> =
            ["beta", "gamma", "delta"].iter().map(|s| s.to_string()).collect();
        assert_eq!(concept_overlap(&identifiers, &concepts), 2);
    }
}
