//! Semantic edges: fragment A references a symbol declared in fragment
//! B, resolved by name matching.
//!
//! This is deliberately not def-use analysis. Definitions and
//! references are harvested with per-language regex tables and joined
//! on lowercased names; the per-language policy table compensates for
//! precision differences - a Rust symbol reference almost certainly
//! resolves to the matched definition, a Python call frequently does
//! not, so the weights differ accordingly.
//!
//! Three reference kinds, each with its own weight from the policy:
//! calls -> function definitions, capitalized type references -> type
//! definitions, import/use/mod targets -> the referenced file's
//! representative fragment.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::lang_profile;
use crate::edges::{file_representatives, push_edge, Edge, EdgeBuilder, EdgeContext};
use crate::types::{Fragment, FragmentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum SemLang {
    Python,
    Rust,
    JsTs,
    Go,
}

fn sem_lang(path: &str) -> Option<SemLang> {
    let ext = path.rsplit('.').next()?;
    match ext {
        "py" | "pyi" | "pyw" => Some(SemLang::Python),
        "rs" => Some(SemLang::Rust),
        "js" | "jsx" | "mjs" | "cjs" | "ts" | "tsx" | "mts" | "cts" => Some(SemLang::JsTs),
        "go" => Some(SemLang::Go),
        _ => None,
    }
}

mod patterns {
    use super::*;

    pub static PY_IMPORT: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)(?:from\s+([\w.]+)\s+import|^\s*import\s+([\w.]+))").unwrap()
    });
    pub static PY_DEF: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^\s*(?:async\s+)?def\s+(\w+)").unwrap());
    pub static PY_CLASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*class\s+(\w+)").unwrap());

    pub static RUST_USE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^\s*use\s+(?:crate::)?([A-Za-z_]\w*(?:::[A-Za-z_]\w*)*)").unwrap()
    });
    pub static RUST_MOD: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?mod\s+([a-z_][a-z0-9_]*)\s*[;{]").unwrap()
    });
    pub static RUST_FN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?fn\s+([a-z_][a-z0-9_]*)")
            .unwrap()
    });
    pub static RUST_TYPE_DEF: Lazy<Regex> = Lazy::new(|| {
        Regex::new(
            r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union)\s+([A-Z]\w*)|^\s*impl(?:<[^>]+>)?\s+(?:\w+\s+for\s+)?([A-Z]\w*)",
        )
        .unwrap()
    });
    pub static RUST_PATH: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b([a-z_][a-z0-9_]*)::").unwrap());

    pub static JS_IMPORT: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"(?:import|export)\s[^'"]{0,200}['"]([^'"]{1,200})['"]|require\s*\(\s*['"]([^'"]{1,200})['"]\s*\)"#)
            .unwrap()
    });
    pub static JS_FN: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*(\w+)|^\s*(?:export\s+)?const\s+(\w+)\s*=\s*(?:async\s*)?\(")
            .unwrap()
    });
    pub static JS_TYPE_DEF: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?m)^\s*(?:export\s+)?(?:abstract\s+)?(?:class|interface|enum)\s+(\w+)|^\s*(?:export\s+)?type\s+(\w+)\s*=")
            .unwrap()
    });

    pub static GO_IMPORT_SINGLE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?m)^\s*import\s+(?:\w+\s+)?"([^"]+)""#).unwrap());
    pub static GO_IMPORT_BLOCK: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)import\s*\((.*?)\)").unwrap());
    pub static GO_IMPORT_LINE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r#"(?m)^\s*(?:\w+\s+)?"([^"]+)""#).unwrap());
    pub static GO_FN: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^func\s+(?:\([^)]+\)\s+)?(\w+)\s*\(").unwrap());
    pub static GO_TYPE_DEF: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?m)^type\s+(\w+)\s+").unwrap());

    pub static TYPE_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z]\w*)\b").unwrap());
    pub static CALL: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());
}

/// Names the call regex matches that are never function calls.
static CALL_NOISE: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        "if", "for", "while", "switch", "return", "match", "catch", "new", "def", "fn",
        "func", "function", "assert", "print", "println", "typeof", "await", "yield",
        "super", "import", "require", "defer", "panic", "raise", "lambda", "with", "elif",
        "except", "not", "and", "or", "in", "vec", "some", "ok", "err", "self",
    ]
    .into_iter()
    .collect()
});

/// Everything harvested from one fragment, lowercased.
#[derive(Debug, Default)]
struct Extracted {
    fn_defs: BTreeSet<String>,
    type_defs: BTreeSet<String>,
    calls: BTreeSet<String>,
    type_refs: BTreeSet<String>,
    /// Module/file stems named by imports, use paths, mod declarations
    modules: BTreeSet<String>,
}

fn extract(lang: SemLang, content: &str) -> Extracted {
    let mut out = Extracted::default();

    match lang {
        SemLang::Python => {
            for caps in patterns::PY_IMPORT.captures_iter(content) {
                let module = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
                if let Some(module) = module {
                    for part in module.split('.') {
                        if !part.is_empty() {
                            out.modules.insert(part.to_lowercase());
                        }
                    }
                }
            }
            for caps in patterns::PY_DEF.captures_iter(content) {
                out.fn_defs.insert(caps[1].to_lowercase());
            }
            for caps in patterns::PY_CLASS.captures_iter(content) {
                out.type_defs.insert(caps[1].to_lowercase());
            }
        }
        SemLang::Rust => {
            for caps in patterns::RUST_USE.captures_iter(content) {
                for part in caps[1].split("::") {
                    out.modules.insert(part.to_lowercase());
                }
            }
            for caps in patterns::RUST_MOD.captures_iter(content) {
                out.modules.insert(caps[1].to_lowercase());
            }
            for caps in patterns::RUST_FN.captures_iter(content) {
                out.fn_defs.insert(caps[1].to_lowercase());
            }
            for caps in patterns::RUST_TYPE_DEF.captures_iter(content) {
                if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
                    out.type_defs.insert(m.as_str().to_lowercase());
                }
            }
            for caps in patterns::RUST_PATH.captures_iter(content) {
                out.modules.insert(caps[1].to_lowercase());
            }
        }
        SemLang::JsTs => {
            for caps in patterns::JS_IMPORT.captures_iter(content) {
                let module = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
                if let Some(module) = module {
                    let stem = module
                        .rsplit('/')
                        .next()
                        .unwrap_or(module)
                        .trim_end_matches(".js")
                        .trim_end_matches(".ts");
                    if !stem.is_empty() && !stem.starts_with('@') {
                        out.modules.insert(stem.to_lowercase());
                    }
                }
            }
            for caps in patterns::JS_FN.captures_iter(content) {
                if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
                    out.fn_defs.insert(m.as_str().to_lowercase());
                }
            }
            for caps in patterns::JS_TYPE_DEF.captures_iter(content) {
                if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
                    out.type_defs.insert(m.as_str().to_lowercase());
                }
            }
        }
        SemLang::Go => {
            for caps in patterns::GO_IMPORT_SINGLE.captures_iter(content) {
                if let Some(stem) = caps[1].rsplit('/').next() {
                    out.modules.insert(stem.to_lowercase());
                }
            }
            for block in patterns::GO_IMPORT_BLOCK.captures_iter(content) {
                for caps in patterns::GO_IMPORT_LINE.captures_iter(&block[1]) {
                    if let Some(stem) = caps[1].rsplit('/').next() {
                        out.modules.insert(stem.to_lowercase());
                    }
                }
            }
            for caps in patterns::GO_FN.captures_iter(content) {
                out.fn_defs.insert(caps[1].to_lowercase());
            }
            for caps in patterns::GO_TYPE_DEF.captures_iter(content) {
                out.type_defs.insert(caps[1].to_lowercase());
            }
        }
    }

    for caps in patterns::TYPE_REF.captures_iter(content) {
        out.type_refs.insert(caps[1].to_lowercase());
    }
    for caps in patterns::CALL.captures_iter(content) {
        let name = caps[1].to_lowercase();
        if !CALL_NOISE.contains(name.as_str()) {
            out.calls.insert(name);
        }
    }

    out
}

pub struct SemanticEdgeBuilder;

impl EdgeBuilder for SemanticEdgeBuilder {
    fn id(&self) -> &'static str {
        "semantic"
    }

    fn build(&self, fragments: &[Fragment], _ctx: &EdgeContext<'_>) -> Vec<Edge> {
        let mut by_lang: BTreeMap<SemLang, Vec<&Fragment>> = BTreeMap::new();
        for frag in fragments {
            if let Some(lang) = sem_lang(frag.path()) {
                by_lang.entry(lang).or_default().push(frag);
            }
        }

        let mut edges = Vec::new();
        for (lang, group) in by_lang {
            link_language_group(lang, &group, &mut edges);
        }
        edges
    }
}

fn link_language_group(lang: SemLang, group: &[&Fragment], edges: &mut Vec<Edge>) {
    let extracted: Vec<Extracted> = group.iter().map(|f| extract(lang, &f.content)).collect();

    // Definition indexes across the group
    let mut fn_defs: BTreeMap<&str, Vec<&FragmentId>> = BTreeMap::new();
    let mut type_defs: BTreeMap<&str, Vec<&FragmentId>> = BTreeMap::new();
    for (frag, info) in group.iter().zip(&extracted) {
        for name in &info.fn_defs {
            fn_defs.entry(name).or_default().push(&frag.id);
        }
        for name in &info.type_defs {
            type_defs.entry(name).or_default().push(&frag.id);
        }
    }

    // Module index: file stem -> representative fragment. Files named
    // mod.rs/lib.rs/__init__.py/index.ts stand for their directory.
    let owned: Vec<Fragment> = group.iter().map(|f| (*f).clone()).collect();
    let reps = file_representatives(&owned);
    let mut module_reps: BTreeMap<String, Vec<FragmentId>> = BTreeMap::new();
    for (path, rep) in &reps {
        let p = Path::new(path.as_ref());
        let stem = p
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        module_reps.entry(stem.clone()).or_default().push(rep.id.clone());
        if matches!(stem.as_str(), "mod" | "lib" | "__init__" | "index" | "main") {
            if let Some(dir) = p.parent().and_then(|d| d.file_name()).and_then(|d| d.to_str()) {
                module_reps.entry(dir.to_lowercase()).or_default().push(rep.id.clone());
            }
        }
    }

    for (frag, info) in group.iter().zip(&extracted) {
        let profile = lang_profile(frag.path().rsplit('.').next().unwrap_or(""));
        let self_defs: BTreeSet<&String> = info.fn_defs.union(&info.type_defs).collect();

        for call in &info.calls {
            if self_defs.contains(call) {
                continue;
            }
            if let Some(targets) = fn_defs.get(call.as_str()) {
                for dst in targets {
                    push_edge(edges, "semantic", &frag.id, dst, profile.call, Some(profile.reverse_factor));
                }
            }
        }

        for type_ref in &info.type_refs {
            if self_defs.contains(type_ref) {
                continue;
            }
            if let Some(targets) = type_defs.get(type_ref.as_str()) {
                for dst in targets {
                    push_edge(edges, "semantic", &frag.id, dst, profile.type_ref, Some(profile.reverse_factor));
                }
            }
        }

        let own_stem = Path::new(frag.path().as_ref())
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        for module in &info.modules {
            if *module == own_stem {
                continue;
            }
            if let Some(targets) = module_reps.get(module) {
                for dst in targets {
                    push_edge(edges, "semantic", &frag.id, dst, profile.symbol_ref, Some(profile.reverse_factor));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiffmapConfig;
    use crate::fragment::Fragmenter;
    use std::sync::Arc;

    fn build(files: &[(&str, &str)]) -> Vec<Edge> {
        let fragmenter = Fragmenter::new();
        let mut frags = Vec::new();
        for (path, content) in files {
            frags.extend(fragmenter.fragment_file(&Arc::from(*path), content));
        }
        frags.sort_by(|a, b| a.id.cmp(&b.id));
        let config = DiffmapConfig::default();
        let ctx = EdgeContext { config: &config, repo_root: None, history: None };
        SemanticEdgeBuilder.build(&frags, &ctx)
    }

    fn has_edge(edges: &[Edge], src_path: &str, dst_path: &str) -> bool {
        edges
            .iter()
            .any(|e| e.src.path.as_ref() == src_path && e.dst.path.as_ref() == dst_path)
    }

    #[test]
    fn test_python_call_site_links_to_definition() {
        let edges = build(&[
            ("src/a.py", "def frobnicate(x):\n    return x + 1\n"),
            ("src/b.py", "from a import frobnicate\n\ndef caller():\n    return frobnicate(2)\n"),
        ]);
        assert!(has_edge(&edges, "src/b.py", "src/a.py"));
        // Reverse edge exists at reduced weight
        let forward = edges
            .iter()
            .find(|e| e.src.path.as_ref() == "src/b.py" && e.dst.path.as_ref() == "src/a.py")
            .unwrap();
        let reverse = edges
            .iter()
            .find(|e| e.src.path.as_ref() == "src/a.py" && e.dst.path.as_ref() == "src/b.py")
            .unwrap();
        assert!(reverse.weight < forward.weight);
    }

    #[test]
    fn test_rust_type_reference() {
        let edges = build(&[
            ("src/conn.rs", "pub struct Connection {\n    host: String,\n}\n"),
            (
                "src/pool.rs",
                "use crate::conn::Connection;\n\npub fn acquire() -> Connection {\n    todo!()\n}\n",
            ),
        ]);
        assert!(has_edge(&edges, "src/pool.rs", "src/conn.rs"));
        let w = edges
            .iter()
            .filter(|e| e.src.path.as_ref() == "src/pool.rs")
            .map(|e| e.weight)
            .fold(0.0_f64, f64::max);
        // Rust policy weights are high
        assert!(w >= 0.85, "rust weight should reflect strict typing, got {}", w);
    }

    #[test]
    fn test_python_weight_lower_than_rust() {
        let py = build(&[
            ("a.py", "def target():\n    pass\n"),
            ("b.py", "import a\n\ndef run():\n    target()\n"),
        ]);
        let py_max = py.iter().map(|e| e.weight).fold(0.0_f64, f64::max);
        assert!(py_max <= 0.60 + 1e-9, "python weights are discounted, got {}", py_max);
    }

    #[test]
    fn test_no_cross_language_edges() {
        let edges = build(&[
            ("a.py", "def shared_name():\n    pass\n"),
            ("b.rs", "fn caller() {\n    shared_name();\n}\n"),
        ]);
        assert!(!has_edge(&edges, "b.rs", "a.py"));
    }

    #[test]
    fn test_self_reference_skipped() {
        let edges = build(&[(
            "a.py",
            "def helper():\n    pass\n\ndef outer():\n    helper()\n",
        )]);
        // Edges between fragments of the same file are fine; an edge
        // from a fragment to itself is not
        assert!(edges.iter().all(|e| e.src != e.dst));
    }
}
