//! Configuration edges: manifests and config files tied to the code
//! they reference.
//!
//! Two mechanisms:
//! - Path references: Dockerfile `COPY`/`ADD` sources, compose
//!   `build`/`context`/volume paths matched against universe files.
//! - Key references: top-level config keys (YAML/JSON/TOML/INI/env)
//!   expanded into sub-words and searched for in code fragments.
//!
//! All edges in this family are symmetric: a config change explains the
//! code it configures and vice versa.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::edges::{push_edge, Edge, EdgeBuilder, EdgeContext};
use crate::tokenize::is_code_path;
use crate::types::{Fragment, FragmentId};
use crate::universe::{is_compose_file, is_dockerfile, manifest_refs};

static YAML_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*([a-zA-Z_][a-zA-Z0-9_-]*)\s*:").unwrap());
static JSON_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([a-zA-Z_][a-zA-Z0-9_-]*)"\s*:"#).unwrap());
static ASSIGN_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*([a-zA-Z_][a-zA-Z0-9_-]*)\s*=").unwrap());
static TOML_TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\[([a-zA-Z_][a-zA-Z0-9_.-]*)\]").unwrap());

/// Config keys too generic to tie a file to code.
static KEY_NOISE: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        "actions", "author", "before", "branch", "client", "config", "create", "default",
        "delete", "deploy", "description", "enable", "engines", "exports", "format",
        "health", "ignore", "import", "inputs", "keywords", "module", "modules", "number",
        "object", "options", "output", "outputs", "params", "plugins", "private", "public",
        "remove", "render", "report", "require", "result", "return", "scripts", "server",
        "source", "status", "string", "target", "update", "verbose", "version",
    ]
    .into_iter()
    .collect()
});

const KEY_PREFIXES: &[&str] =
    &["default", "max", "min", "smtp", "http", "https", "api", "db", "app", "allowed"];

const MIN_KEY_LEN: usize = 6;

fn is_config_path(path: &str) -> bool {
    let ext = path.rsplit('.').next().unwrap_or("");
    matches!(ext, "yaml" | "yml" | "json" | "toml" | "ini" | "env")
}

/// Split a key into searchable variants: the key itself, its words,
/// and the key with common prefixes stripped.
fn expand_key(key: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    out.insert(key.to_string());
    for part in key.split(['_', '-']) {
        if part.len() >= 3 {
            out.insert(part.to_string());
        }
    }
    for prefix in KEY_PREFIXES {
        for sep in ['_', '-'] {
            let lead = format!("{}{}", prefix, sep);
            if let Some(stripped) = key.strip_prefix(&lead) {
                if !stripped.is_empty() {
                    out.insert(stripped.to_string());
                    for part in stripped.split(['_', '-']) {
                        if part.len() >= 3 {
                            out.insert(part.to_string());
                        }
                    }
                }
            }
        }
    }
    out
}

fn extract_keys(path: &str, content: &str) -> BTreeSet<String> {
    let ext = path.rsplit('.').next().unwrap_or("");
    let regexes: &[&Regex] = match ext {
        "yaml" | "yml" => &[&YAML_KEY_RE],
        "json" => &[&JSON_KEY_RE],
        "toml" => &[&ASSIGN_KEY_RE, &TOML_TABLE_RE],
        "ini" | "env" => &[&ASSIGN_KEY_RE],
        _ => &[],
    };

    let mut keys = BTreeSet::new();
    for re in regexes {
        for caps in re.captures_iter(content) {
            for expanded in expand_key(&caps[1].to_lowercase()) {
                keys.insert(expanded);
            }
        }
    }
    keys
}

pub struct ConfigurationEdgeBuilder;

impl EdgeBuilder for ConfigurationEdgeBuilder {
    fn id(&self) -> &'static str {
        "configuration"
    }

    fn build(&self, fragments: &[Fragment], ctx: &EdgeContext<'_>) -> Vec<Edge> {
        let weights = &ctx.config.edge_weights;
        let mut edges = Vec::new();

        link_manifest_paths(fragments, weights.docker_copy, weights.compose, &mut edges);
        link_config_keys(fragments, weights.config_code, &mut edges);

        edges
    }
}

/// Dockerfile/compose fragments -> fragments of the files they name.
fn link_manifest_paths(
    fragments: &[Fragment],
    copy_weight: f64,
    compose_weight: f64,
    edges: &mut Vec<Edge>,
) {
    let manifest_frags: Vec<&Fragment> = fragments
        .iter()
        .filter(|f| {
            let name = Path::new(f.path().as_ref())
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("");
            is_dockerfile(name) || is_compose_file(name)
        })
        .collect();
    if manifest_frags.is_empty() {
        return;
    }

    // Path -> fragment ids, plus a name index for suffix matches
    let mut by_path: BTreeMap<&str, Vec<&FragmentId>> = BTreeMap::new();
    let mut by_name: BTreeMap<String, Vec<&FragmentId>> = BTreeMap::new();
    for frag in fragments {
        by_path.entry(frag.path().as_ref()).or_default().push(&frag.id);
        if let Some(name) = Path::new(frag.path().as_ref())
            .file_name()
            .and_then(|n| n.to_str())
        {
            by_name.entry(name.to_lowercase()).or_default().push(&frag.id);
        }
    }

    for manifest in &manifest_frags {
        let name = Path::new(manifest.path().as_ref())
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");
        let weight = if is_dockerfile(name) { copy_weight } else { compose_weight };

        for reference in manifest_refs(&manifest.content) {
            let mut targets: BTreeSet<&FragmentId> = BTreeSet::new();
            if let Some(ids) = by_path.get(reference.as_str()) {
                targets.extend(ids.iter().copied());
            }
            // Directory references cover everything underneath
            let dir_prefix = format!("{}/", reference.trim_end_matches('/'));
            for (path, ids) in &by_path {
                if path.starts_with(&dir_prefix) {
                    targets.extend(ids.iter().copied());
                }
            }
            let ref_name = reference.rsplit('/').next().unwrap_or(&reference);
            if let Some(ids) = by_name.get(&ref_name.to_lowercase()) {
                targets.extend(ids.iter().copied());
            }

            for dst in targets {
                if dst.path != manifest.id.path {
                    push_edge(edges, "configuration", &manifest.id, dst, weight, Some(1.0));
                }
            }
        }
    }
}

/// Config-block keys searched for inside code fragments.
fn link_config_keys(fragments: &[Fragment], weight: f64, edges: &mut Vec<Edge>) {
    let config_frags: Vec<&Fragment> =
        fragments.iter().filter(|f| is_config_path(f.path())).collect();
    let code_frags: Vec<&Fragment> =
        fragments.iter().filter(|f| is_code_path(f.path())).collect();
    if config_frags.is_empty() || code_frags.is_empty() {
        return;
    }

    let mut key_regexes: BTreeMap<String, Regex> = BTreeMap::new();

    for cfg in &config_frags {
        let keys: Vec<String> = extract_keys(cfg.path(), &cfg.content)
            .into_iter()
            .filter(|k| k.len() >= MIN_KEY_LEN && !KEY_NOISE.contains(k.as_str()))
            .collect();
        if keys.is_empty() {
            continue;
        }

        for key in &keys {
            key_regexes.entry(key.clone()).or_insert_with(|| {
                Regex::new(&format!(r"(?i)\b{}\b", regex::escape(key)))
                    .expect("escaped key regex is valid")
            });
        }

        for code in &code_frags {
            let hit = keys.iter().any(|k| key_regexes[k].is_match(&code.content));
            if hit {
                push_edge(edges, "configuration", &cfg.id, &code.id, weight, Some(1.0));
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
        ConfigurationEdgeBuilder.build(&frags, &ctx)
    }

    #[test]
    fn test_dockerfile_copy_links_source() {
        let edges = build(&[
            ("Dockerfile", "FROM python:3.12\nCOPY src/worker.py /app/\nCMD [\"python\"]\n"),
            ("src/worker.py", "def work():\n    return 1\n"),
        ]);
        let fwd = edges
            .iter()
            .find(|e| e.src.path.as_ref() == "Dockerfile" && e.dst.path.as_ref() == "src/worker.py");
        assert!(fwd.is_some(), "COPY reference should create an edge");
        // Symmetric family
        assert!(edges
            .iter()
            .any(|e| e.src.path.as_ref() == "src/worker.py" && e.weight == fwd.unwrap().weight));
    }

    #[test]
    fn test_config_key_matches_code() {
        let edges = build(&[
            ("settings.yaml", "retry_backoff_ms: 250\nworker_pool_size: 8\n"),
            ("pool.py", "def resize(worker_pool_size):\n    return worker_pool_size\n"),
        ]);
        assert!(edges
            .iter()
            .any(|e| e.src.path.as_ref() == "settings.yaml" && e.dst.path.as_ref() == "pool.py"));
    }

    #[test]
    fn test_generic_keys_ignored() {
        let edges = build(&[
            ("settings.yaml", "version: 2\nconfig: here\n"),
            ("app.py", "version = get_version()\nconfig = load_config()\n"),
        ]);
        assert!(edges.is_empty(), "noise keys must not create edges");
    }

    #[test]
    fn test_expand_key() {
        let expanded = expand_key("max_retry_backoff");
        assert!(expanded.contains("max_retry_backoff"));
        assert!(expanded.contains("retry_backoff"));
        assert!(expanded.contains("retry"));
        assert!(expanded.contains("backoff"));
    }
}
