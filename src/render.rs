//! Rendering the selection into an output document.
//!
//! Fragments are grouped by path and ordered by line; the JSON shape
//! mirrors what downstream tooling consumes: per-fragment location,
//! kind, optional symbol, content and a one-line preview, plus the run
//! metadata block.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::pipeline::DiffContextReport;
use crate::types::Fragment;

const PREVIEW_CHARS: usize = 150;

fn preview(content: &str) -> String {
    let collapsed: String = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() > PREVIEW_CHARS {
        let mut cut = PREVIEW_CHARS;
        while !collapsed.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &collapsed[..cut])
    } else {
        collapsed
    }
}

fn fragment_entry(frag: &Fragment, include_content: bool) -> Value {
    let mut entry = json!({
        "path": frag.id.path.as_ref(),
        "lines": format!("{}-{}", frag.id.start_line, frag.id.end_line),
        "kind": frag.kind.as_str(),
    });
    let map = entry.as_object_mut().expect("entry is an object");
    if let Some(symbol) = &frag.symbol {
        map.insert("symbol".into(), json!(symbol));
    }
    if include_content {
        map.insert("content".into(), json!(frag.content));
        map.insert("preview".into(), json!(preview(&frag.content)));
    }
    entry
}

/// Render the report as a JSON document.
pub fn to_json(report: &DiffContextReport, root_name: &str, include_content: bool) -> Value {
    let mut by_path: BTreeMap<&str, Vec<&Fragment>> = BTreeMap::new();
    for frag in &report.selected {
        by_path.entry(frag.id.path.as_ref()).or_default().push(frag);
    }

    let mut fragments = Vec::new();
    for frags in by_path.values_mut() {
        frags.sort_by_key(|f| f.id.start_line);
        for frag in frags.iter() {
            fragments.push(fragment_entry(frag, include_content));
        }
    }

    json!({
        "name": root_name,
        "type": "diff_context",
        "fragment_count": fragments.len(),
        "fragments": fragments,
        "metadata": {
            "universe": report.metadata.universe_size,
            "edges": report.metadata.edge_count,
            "ppr_iterations": report.metadata.ppr_iterations,
            "reason": report.metadata.reason.as_str(),
            "used_tokens": report.metadata.used_tokens,
            "utility": report.metadata.utility,
        },
    })
}

/// Render the report as plain text, one header line per fragment.
pub fn to_text(report: &DiffContextReport, include_content: bool) -> String {
    let mut by_path: BTreeMap<&str, Vec<&Fragment>> = BTreeMap::new();
    for frag in &report.selected {
        by_path.entry(frag.id.path.as_ref()).or_default().push(frag);
    }

    let mut out = String::new();
    for (path, frags) in by_path.iter_mut() {
        frags.sort_by_key(|f| f.id.start_line);
        for frag in frags.iter() {
            out.push_str(&format!(
                "== {}:{}-{} [{}]",
                path,
                frag.id.start_line,
                frag.id.end_line,
                frag.kind.as_str()
            ));
            if let Some(symbol) = &frag.symbol {
                out.push_str(&format!(" {}", symbol));
            }
            out.push('\n');
            if include_content {
                out.push_str(&frag.content);
                if !frag.content.ends_with('\n') {
                    out.push('\n');
                }
            }
        }
    }
    out
}
