//! Fallback text partitioner: blank-line-separated paragraphs coalesced
//! to the min/max fragment bounds.
//!
//! Always applicable, so it terminates the strategy pipeline. Small
//! paragraphs are merged forward until a fragment reaches the minimum
//! size; the file tail may stay shorter. Oversized spans are hard-split
//! at the maximum.

use std::sync::Arc;

use crate::fragment::{
    make_fragment, FragmentStrategy, StrategyOutcome, MAX_FRAGMENT_LINES, MIN_FRAGMENT_LINES,
};
use crate::tokenize::TokenProfile;
use crate::types::{Fragment, FragmentKind};

pub struct TextStrategy;

impl FragmentStrategy for TextStrategy {
    fn name(&self) -> &'static str {
        "text"
    }

    fn can_handle(&self, _path: &str, _content: &str) -> bool {
        true
    }

    fn fragment(&self, path: &Arc<str>, content: &str) -> StrategyOutcome {
        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len() as u32;
        let profile = TokenProfile::from_path(path);

        // Paragraphs: maximal runs of non-blank lines
        let mut paras: Vec<(u32, u32)> = Vec::new();
        let mut run_start: Option<u32> = None;
        for (i, line) in lines.iter().enumerate() {
            let ln = (i + 1) as u32;
            let blank = line.trim().is_empty();
            match (run_start, blank) {
                (None, false) => run_start = Some(ln),
                (Some(start), true) => {
                    paras.push((start, ln - 1));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            paras.push((start, total));
        }

        if paras.is_empty() {
            // Whitespace-only file: let the engine tile it generically
            return StrategyOutcome::Fragments(Vec::new());
        }

        let mut frags: Vec<Fragment> = Vec::new();
        let mut frag_start = 1u32;
        for (i, &(_p_start, p_end)) in paras.iter().enumerate() {
            let is_last = i + 1 == paras.len();
            let span_len = p_end - frag_start + 1;
            if span_len < MIN_FRAGMENT_LINES && !is_last {
                continue;
            }
            // Extend over trailing blanks up to the next paragraph so
            // fragments tile the file
            let frag_end = if is_last { total } else { paras[i + 1].0 - 1 };
            let mut chunk_start = frag_start;
            while chunk_start <= frag_end {
                let chunk_end = frag_end.min(chunk_start + MAX_FRAGMENT_LINES - 1);
                frags.push(make_fragment(
                    path,
                    &lines,
                    chunk_start,
                    chunk_end,
                    FragmentKind::Paragraph,
                    None,
                    None,
                    profile,
                ));
                chunk_start = chunk_end + 1;
            }
            frag_start = frag_end + 1;
        }

        StrategyOutcome::Fragments(frags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(content: &str) -> Vec<Fragment> {
        match TextStrategy.fragment(&Arc::from("notes.txt"), content) {
            StrategyOutcome::Fragments(f) => f,
            StrategyOutcome::NotParseable => panic!("text strategy must always parse"),
        }
    }

    #[test]
    fn test_paragraphs_split_on_blank_lines() {
        let content = "\
alpha one
alpha two
alpha three

beta one
beta two
beta three
";
        let frags = run(content);
        assert_eq!(frags.len(), 2);
        assert!(frags[0].content.contains("alpha"));
        assert!(frags[1].content.contains("beta"));
    }

    #[test]
    fn test_small_paragraphs_coalesce() {
        let content = "one\n\ntwo\n\nthree line a\nthree line b\nthree line c\n";
        let frags = run(content);
        // "one" and "two" are below the minimum and merge forward
        assert!(frags[0].line_count() >= MIN_FRAGMENT_LINES);
    }

    #[test]
    fn test_tail_may_be_short() {
        let content = "body line one\nbody line two\nbody line three\n\nend\n";
        let frags = run(content);
        let last = frags.last().unwrap();
        assert!(last.content.contains("end"));
    }

    #[test]
    fn test_fragments_tile() {
        let content = "a\nb\nc\n\n\nd\ne\nf\n\ng\n";
        let frags = run(content);
        let mut next = 1u32;
        for f in &frags {
            assert_eq!(f.start_line(), next);
            next = f.end_line() + 1;
        }
        assert_eq!(next, content.lines().count() as u32 + 1);
    }

    #[test]
    fn test_giant_paragraph_hard_splits() {
        let content: String = (0..450).map(|i| format!("line {}\n", i)).collect();
        let frags = run(&content);
        assert!(frags.len() >= 3);
        assert!(frags.iter().all(|f| f.line_count() <= MAX_FRAGMENT_LINES));
    }
}
