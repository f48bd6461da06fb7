//! Markdown fragmentation: ATX-heading sections, with fenced code
//! blocks carved out as their own fragments.
//!
//! Every heading starts a new section regardless of level, so the
//! output tiles the document instead of nesting. A document without a
//! single heading falls through to the text partitioner.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::fragment::{make_fragment, FragmentStrategy, StrategyOutcome, MAX_FRAGMENT_LINES};
use crate::tokenize::TokenProfile;
use crate::types::{Fragment, FragmentKind};

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6}) (.+)$").expect("invalid heading regex"));

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

pub struct MarkdownStrategy;

impl FragmentStrategy for MarkdownStrategy {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn can_handle(&self, path: &str, _content: &str) -> bool {
        let ext = path.rsplit('.').next().unwrap_or("");
        matches!(ext, "md" | "markdown" | "mdx")
    }

    fn fragment(&self, path: &Arc<str>, content: &str) -> StrategyOutcome {
        let lines: Vec<&str> = content.lines().collect();
        if !lines.iter().any(|l| HEADING_RE.is_match(l)) {
            return StrategyOutcome::NotParseable;
        }

        let mut frags: Vec<Fragment> = Vec::new();
        let mut in_fence = false;
        let mut fence_start = 0u32;
        let mut section: Option<(u32, String)> = None;

        for (i, line) in lines.iter().enumerate() {
            let ln = (i + 1) as u32;

            if in_fence {
                if is_fence(line) {
                    push_span(path, &lines, fence_start, ln, FragmentKind::Generic, None, &mut frags);
                    in_fence = false;
                }
                continue;
            }

            if is_fence(line) {
                if let Some((start, title)) = section.take() {
                    if start < ln {
                        push_span(path, &lines, start, ln - 1, FragmentKind::Section, Some(title), &mut frags);
                    }
                }
                in_fence = true;
                fence_start = ln;
                continue;
            }

            if let Some(caps) = HEADING_RE.captures(line) {
                if let Some((start, title)) = section.take() {
                    if start < ln {
                        push_span(path, &lines, start, ln - 1, FragmentKind::Section, Some(title), &mut frags);
                    }
                }
                let mut title = caps[2].trim().to_string();
                title.truncate(80);
                section = Some((ln, title));
            }
        }

        let total = lines.len() as u32;
        if in_fence {
            // Unterminated fence runs to EOF
            push_span(path, &lines, fence_start, total, FragmentKind::Generic, None, &mut frags);
        } else if let Some((start, title)) = section.take() {
            push_span(path, &lines, start, total, FragmentKind::Section, Some(title), &mut frags);
        }

        StrategyOutcome::Fragments(frags)
    }
}

/// Push a span, chunk-splitting anything over the size limit. Only the
/// first chunk keeps the section symbol.
fn push_span(
    path: &Arc<str>,
    lines: &[&str],
    start: u32,
    end: u32,
    kind: FragmentKind,
    symbol: Option<String>,
    frags: &mut Vec<Fragment>,
) {
    let mut chunk_start = start;
    let mut first = true;
    while chunk_start <= end {
        let chunk_end = end.min(chunk_start + MAX_FRAGMENT_LINES - 1);
        frags.push(make_fragment(
            path,
            lines,
            chunk_start,
            chunk_end,
            if first { kind } else { FragmentKind::Generic },
            if first { symbol.clone() } else { None },
            None,
            TokenProfile::Docs,
        ));
        first = false;
        chunk_start = chunk_end + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragmenter;

    fn frag_file(path: &str, content: &str) -> Vec<Fragment> {
        Fragmenter::new().fragment_file(&Arc::from(path), content)
    }

    #[test]
    fn test_sections_by_heading() {
        let content = "\
# Install

Run the installer.

## Requirements

A computer.

# Usage

Type things.
";
        let frags = frag_file("README.md", content);
        let sections: Vec<_> = frags.iter().filter(|f| f.kind == FragmentKind::Section).collect();
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].symbol.as_deref(), Some("Install"));
        assert_eq!(sections[1].symbol.as_deref(), Some("Requirements"));
        assert_eq!(sections[2].symbol.as_deref(), Some("Usage"));
    }

    #[test]
    fn test_fenced_block_is_own_fragment() {
        let content = "\
# Example

Intro text.

```python
print(\"hi\")
```

Outro.
";
        let frags = frag_file("doc.md", content);
        let fence = frags
            .iter()
            .find(|f| f.content.contains("print"))
            .unwrap();
        assert_eq!(fence.kind, FragmentKind::Generic);
        assert!(fence.content.starts_with("```"));
        // Section fragment ends before the fence
        let section = frags.iter().find(|f| f.kind == FragmentKind::Section).unwrap();
        assert!(section.end_line() < fence.start_line());
    }

    #[test]
    fn test_leading_prose_covered() {
        let content = "preamble before any heading\n\n# First\n\nbody\n";
        let frags = frag_file("doc.md", content);
        // Tiling demands the preamble is present as a generic fragment
        assert_eq!(frags[0].start_line(), 1);
        assert_eq!(frags[0].kind, FragmentKind::Generic);
    }

    #[test]
    fn test_no_headings_falls_back() {
        let content = "just a paragraph of text\nspanning a few lines\nwithout any heading\n";
        let frags = frag_file("doc.md", content);
        assert!(!frags.is_empty());
        assert!(frags.iter().all(|f| f.kind != FragmentKind::Section));
    }
}
