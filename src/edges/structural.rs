//! Structural edges: file-layout relationships that need no parsing.
//!
//! - Containment: a fragment split out of an oversized container points
//!   back at the container's header fragment.
//! - Sibling: representative fragments of files sharing a directory,
//!   weakly and symmetrically connected.
//! - Test↔code: test files matched to their subjects by naming
//!   convention, upgraded when the test demonstrably imports the
//!   subject.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::edges::{file_representatives, push_edge, Edge, EdgeBuilder, EdgeContext};
use crate::types::{Fragment, FragmentId};
use crate::universe::test_target_stem;

pub struct ContainmentEdgeBuilder;

impl EdgeBuilder for ContainmentEdgeBuilder {
    fn id(&self) -> &'static str {
        "containment"
    }

    fn build(&self, fragments: &[Fragment], ctx: &EdgeContext<'_>) -> Vec<Edge> {
        let weights = &ctx.config.edge_weights;
        let mut by_path: BTreeMap<&str, Vec<&Fragment>> = BTreeMap::new();
        for frag in fragments {
            by_path.entry(frag.path().as_ref()).or_default().push(frag);
        }

        let mut edges = Vec::new();
        for frags in by_path.values() {
            for frag in frags {
                let Some(line) = frag.container_line else { continue };
                // The header is the fragment holding the container's
                // declaration line
                let header = frags
                    .iter()
                    .filter(|f| f.contains_line(line))
                    .min_by_key(|f| (f.line_count(), f.start_line()));
                if let Some(header) = header {
                    push_edge(
                        &mut edges,
                        "containment",
                        &frag.id,
                        &header.id,
                        weights.containment,
                        Some(weights.containment_reverse_factor),
                    );
                }
            }
        }
        edges
    }
}

pub struct SiblingEdgeBuilder;

impl EdgeBuilder for SiblingEdgeBuilder {
    fn id(&self) -> &'static str {
        "sibling"
    }

    fn build(&self, fragments: &[Fragment], ctx: &EdgeContext<'_>) -> Vec<Edge> {
        let weight = ctx.config.edge_weights.sibling;
        let max_per_dir = ctx.config.universe.max_files_per_dir;

        let reps = file_representatives(fragments);
        let mut by_dir: BTreeMap<String, Vec<&FragmentId>> = BTreeMap::new();
        for (path, rep) in &reps {
            let dir = Path::new(path.as_ref())
                .parent()
                .map(|d| d.to_string_lossy().into_owned())
                .unwrap_or_default();
            by_dir.entry(dir).or_default().push(&rep.id);
        }

        let mut edges = Vec::new();
        for ids in by_dir.values() {
            let capped = &ids[..ids.len().min(max_per_dir)];
            for (i, a) in capped.iter().enumerate() {
                for b in &capped[i + 1..] {
                    push_edge(&mut edges, "sibling", a, b, weight, Some(1.0));
                }
            }
        }
        edges
    }
}

static PY_IMPORT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)(?:from\s+([\w.]+)\s+import|^\s*import\s+([\w.]+))").unwrap());
static PATH_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:use\s+[\w:]+|require\s*\(\s*['"][^'"]+['"]\s*\)|from\s+['"][^'"]+['"]|import\s+['"][^'"]+['"])"#)
        .unwrap()
});

/// Does the test fragment's import surface name the subject's stem?
fn has_direct_import(test_content: &str, subject_stem: &str) -> bool {
    for caps in PY_IMPORT_RE.captures_iter(test_content) {
        if let Some(module) = caps.get(1).or_else(|| caps.get(2)) {
            if module
                .as_str()
                .split('.')
                .any(|part| part.eq_ignore_ascii_case(subject_stem))
            {
                return true;
            }
        }
    }
    for m in PATH_IMPORT_RE.find_iter(test_content) {
        if m.as_str().to_lowercase().contains(subject_stem) {
            return true;
        }
    }
    false
}

fn is_test_path(path: &str) -> bool {
    let lower = path.to_lowercase();
    let name = lower.rsplit('/').next().unwrap_or(&lower);
    test_target_stem(name).is_some()
        || lower.contains("/tests/")
        || lower.contains("/test/")
        || lower.contains("__tests__")
}

pub struct TestEdgeBuilder;

impl EdgeBuilder for TestEdgeBuilder {
    fn id(&self) -> &'static str {
        "test"
    }

    fn build(&self, fragments: &[Fragment], ctx: &EdgeContext<'_>) -> Vec<Edge> {
        let weights = &ctx.config.edge_weights;
        let reps = file_representatives(fragments);
        let mut by_path: BTreeMap<&str, Vec<&Fragment>> = BTreeMap::new();
        for frag in fragments {
            by_path.entry(frag.path().as_ref()).or_default().push(frag);
        }

        // Subject files indexed by stem; test representatives kept aside
        let mut subjects: BTreeMap<String, Vec<&Fragment>> = BTreeMap::new();
        let mut tests: Vec<&Fragment> = Vec::new();
        for (path, rep) in &reps {
            if is_test_path(path) {
                tests.push(rep);
            } else {
                let stem = Path::new(path.as_ref())
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("")
                    .to_lowercase();
                subjects.entry(stem).or_default().push(rep);
            }
        }

        let mut edges = Vec::new();
        for test in tests {
            let name = Path::new(test.path().as_ref())
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("")
                .to_lowercase();
            // Inside tests/ directories plain stems name their subject
            let target = test_target_stem(&name).or_else(|| {
                let stem = name.rsplit_once('.').map(|(s, _)| s)?;
                Some(stem.to_string())
            });
            let Some(target) = target else { continue };

            // The import may live in any fragment of the test file
            let imports_subject = by_path
                .get(test.path().as_ref())
                .map(|frags| frags.iter().any(|f| has_direct_import(&f.content, &target)))
                .unwrap_or(false);

            for subject in subjects.get(&target).map(|v| v.as_slice()).unwrap_or(&[]) {
                let forward =
                    if imports_subject { weights.test_direct } else { weights.test_naming };
                push_edge(&mut edges, "test", &test.id, &subject.id, forward, None);
                push_edge(&mut edges, "test", &subject.id, &test.id, weights.test_reverse, None);
            }
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiffmapConfig;
    use crate::fragment::Fragmenter;
    use std::sync::Arc;

    fn frags(files: &[(&str, &str)]) -> Vec<Fragment> {
        let fragmenter = Fragmenter::new();
        let mut out = Vec::new();
        for (path, content) in files {
            out.extend(fragmenter.fragment_file(&Arc::from(*path), content));
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    fn ctx_build(builder: &dyn EdgeBuilder, fragments: &[Fragment]) -> Vec<Edge> {
        let config = DiffmapConfig::default();
        let ctx = EdgeContext { config: &config, repo_root: None, history: None };
        builder.build(fragments, &ctx)
    }

    #[test]
    fn test_sibling_edges_are_weak_and_symmetric() {
        let fragments = frags(&[
            ("src/a.py", "def a():\n    pass\n"),
            ("src/b.py", "def b():\n    pass\n"),
            ("other/c.py", "def c():\n    pass\n"),
        ]);
        let edges = ctx_build(&SiblingEdgeBuilder, &fragments);
        assert_eq!(edges.len(), 2, "one pair, both directions");
        assert!(edges.iter().all(|e| e.weight == 0.05));
        assert!(edges.iter().all(|e| !e.src.path.contains("other")));
    }

    #[test]
    fn test_test_edges_with_direct_import() {
        let fragments = frags(&[
            ("src/parser.py", "def parse():\n    pass\n"),
            ("tests/test_parser.py", "from parser import parse\n\ndef test_parse():\n    assert parse() is None\n"),
        ]);
        let edges = ctx_build(&TestEdgeBuilder, &fragments);
        let forward = edges
            .iter()
            .find(|e| e.src.path.contains("test_parser"))
            .expect("test -> subject edge");
        assert_eq!(forward.weight, 0.60, "direct import upgrades the weight");
        let reverse = edges
            .iter()
            .find(|e| e.dst.path.contains("test_parser"))
            .expect("subject -> test edge");
        assert_eq!(reverse.weight, 0.30);
    }

    #[test]
    fn test_naming_only_coupling() {
        let fragments = frags(&[
            ("src/lexer.py", "def lex():\n    pass\n"),
            ("tests/test_lexer.py", "def test_something():\n    pass\n"),
        ]);
        let edges = ctx_build(&TestEdgeBuilder, &fragments);
        let forward = edges.iter().find(|e| e.src.path.contains("test_lexer")).unwrap();
        assert_eq!(forward.weight, 0.50);
    }

    #[test]
    fn test_containment_edges() {
        let mut content = String::from("class Big:\n");
        for i in 0..30 {
            content.push_str(&format!("    def method_{}(self):\n", i));
            for j in 0..9 {
                content.push_str(&format!("        y_{} = {}\n", j, j));
            }
        }
        let fragments = frags(&[("big.py", &content)]);
        let edges = ctx_build(&ContainmentEdgeBuilder, &fragments);
        assert!(!edges.is_empty());
        // Every forward edge targets the header at line 1
        let forwards: Vec<_> = edges.iter().filter(|e| e.weight == 0.50).collect();
        assert!(!forwards.is_empty());
        assert!(forwards.iter().all(|e| e.dst.start_line == 1));
    }
}
