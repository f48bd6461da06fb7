//! Document edges: relations between markdown/doc fragments.
//!
//! - Structure: consecutive sections of the same document, directed in
//!   reading order.
//! - Anchor links: `[text](#anchor)` resolved to the section whose
//!   heading slugifies to the anchor, directed by the reference.
//! - Citations: `[@key]` groups connected through the first fragment
//!   that cites the key.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::edges::{push_edge, Edge, EdgeBuilder, EdgeContext};
use crate::types::{Fragment, FragmentId, FragmentKind};

static ANCHOR_LINK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]+\]\(#([^)]+)\)").unwrap());
static CITATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[@([a-zA-Z0-9_:-]+)\]").unwrap());

/// GitHub-style anchor slug of a heading title.
fn slugify(title: &str) -> String {
    title
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c.to_ascii_lowercase())
            } else if c.is_whitespace() || c == '-' || c == '_' {
                Some('-')
            } else {
                None
            }
        })
        .collect()
}

fn is_doc_path(path: &str) -> bool {
    let ext = path.rsplit('.').next().unwrap_or("");
    matches!(ext, "md" | "markdown" | "mdx" | "rst" | "txt" | "adoc")
}

pub struct DocumentEdgeBuilder;

impl EdgeBuilder for DocumentEdgeBuilder {
    fn id(&self) -> &'static str {
        "document"
    }

    fn build(&self, fragments: &[Fragment], ctx: &EdgeContext<'_>) -> Vec<Edge> {
        let weights = &ctx.config.edge_weights;
        let doc_frags: Vec<&Fragment> =
            fragments.iter().filter(|f| is_doc_path(f.path())).collect();
        if doc_frags.is_empty() {
            return Vec::new();
        }

        let mut edges = Vec::new();

        // Structure: consecutive sections per document. Fragments are
        // already sorted by (path, start_line).
        let mut prev: Option<&Fragment> = None;
        for frag in &doc_frags {
            if frag.kind != FragmentKind::Section {
                continue;
            }
            if let Some(p) = prev {
                if p.id.path == frag.id.path {
                    push_edge(
                        &mut edges,
                        "document",
                        &p.id,
                        &frag.id,
                        weights.doc_structure,
                        Some(weights.doc_structure_reverse_factor),
                    );
                }
            }
            prev = Some(*frag);
        }

        // Anchor links: slug -> section fragments across all docs
        let mut by_slug: BTreeMap<String, Vec<&FragmentId>> = BTreeMap::new();
        for frag in &doc_frags {
            if frag.kind == FragmentKind::Section {
                if let Some(symbol) = &frag.symbol {
                    by_slug.entry(slugify(symbol)).or_default().push(&frag.id);
                }
            }
        }
        for frag in &doc_frags {
            for caps in ANCHOR_LINK_RE.captures_iter(&frag.content) {
                let anchor = slugify(&caps[1]);
                for dst in by_slug.get(&anchor).map(|v| v.as_slice()).unwrap_or(&[]) {
                    push_edge(
                        &mut edges,
                        "document",
                        &frag.id,
                        dst,
                        weights.anchor_link,
                        Some(weights.anchor_link_reverse_factor),
                    );
                }
            }
        }

        // Citations: every fragment citing a key connects to the first
        let mut by_citation: BTreeMap<String, Vec<&FragmentId>> = BTreeMap::new();
        for frag in &doc_frags {
            for caps in CITATION_RE.captures_iter(&frag.content) {
                by_citation.entry(caps[1].to_string()).or_default().push(&frag.id);
            }
        }
        for ids in by_citation.values() {
            if ids.len() < 2 {
                continue;
            }
            let hub = ids[0];
            for other in &ids[1..] {
                push_edge(&mut edges, "document", hub, other, weights.citation, Some(1.0));
            }
        }

        edges
    }
}
