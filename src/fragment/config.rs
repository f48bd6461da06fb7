//! Structured-config fragmentation: each top-level key and its full
//! value becomes one fragment.
//!
//! Boundaries are found by per-format regexes on line starts, which
//! keeps the strategy independent of any parser's location reporting
//! and tolerant of files no strict parser would accept.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::fragment::{make_fragment, FragmentStrategy, StrategyOutcome, MAX_FRAGMENT_LINES};
use crate::tokenize::TokenProfile;
use crate::types::{Fragment, FragmentKind};

static YAML_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-zA-Z_][a-zA-Z0-9_-]*):\s*").expect("invalid yaml key regex"));
static TOML_TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[([a-zA-Z_][a-zA-Z0-9_.-]*)\]").expect("invalid toml table regex"));
static JSON_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s{0,4}"([^"]+)":\s*"#).expect("invalid json key regex"));

pub struct ConfigStrategy;

impl FragmentStrategy for ConfigStrategy {
    fn name(&self) -> &'static str {
        "config"
    }

    fn can_handle(&self, path: &str, _content: &str) -> bool {
        let ext = path.rsplit('.').next().unwrap_or("");
        matches!(ext, "yaml" | "yml" | "toml" | "json")
    }

    fn fragment(&self, path: &Arc<str>, content: &str) -> StrategyOutcome {
        let lines: Vec<&str> = content.lines().collect();
        if lines.is_empty() {
            return StrategyOutcome::NotParseable;
        }

        let ext = path.rsplit('.').next().unwrap_or("");
        let key_re: &Regex = match ext {
            "yaml" | "yml" => &YAML_KEY_RE,
            "toml" => &TOML_TABLE_RE,
            _ => &JSON_KEY_RE,
        };

        let mut boundaries: Vec<(u32, String)> = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if let Some(caps) = key_re.captures(line) {
                boundaries.push(((i + 1) as u32, caps[1].to_string()));
            }
        }

        if boundaries.is_empty() {
            // Whole file as one config block (e.g. a JSON array)
            return StrategyOutcome::Fragments(chunked(
                path,
                &lines,
                1,
                lines.len() as u32,
                None,
            ));
        }

        let total = lines.len() as u32;
        let mut frags: Vec<Fragment> = Vec::new();
        for (idx, (start, key)) in boundaries.iter().enumerate() {
            let end = boundaries
                .get(idx + 1)
                .map(|(next, _)| next - 1)
                .unwrap_or(total);
            if *start > end {
                continue;
            }
            frags.extend(chunked(path, &lines, *start, end, Some(key.clone())));
        }

        StrategyOutcome::Fragments(frags)
    }
}

/// One config block, split when its value runs past the size limit.
fn chunked(
    path: &Arc<str>,
    lines: &[&str],
    start: u32,
    end: u32,
    symbol: Option<String>,
) -> Vec<Fragment> {
    let mut out = Vec::new();
    let mut chunk_start = start;
    let mut first = true;
    while chunk_start <= end {
        let chunk_end = end.min(chunk_start + MAX_FRAGMENT_LINES - 1);
        out.push(make_fragment(
            path,
            lines,
            chunk_start,
            chunk_end,
            FragmentKind::ConfigBlock,
            if first { symbol.clone() } else { None },
            None,
            TokenProfile::Data,
        ));
        first = false;
        chunk_start = chunk_end + 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::Fragmenter;

    fn frag_file(path: &str, content: &str) -> Vec<Fragment> {
        Fragmenter::new().fragment_file(&Arc::from(path), content)
    }

    #[test]
    fn test_yaml_top_level_keys() {
        let content = "\
services:
  web:
    image: nginx
  db:
    image: postgres
volumes:
  data: {}
";
        let frags = frag_file("docker-compose.yml", content);
        let keys: Vec<_> = frags.iter().filter_map(|f| f.symbol.as_deref()).collect();
        assert_eq!(keys, vec!["services", "volumes"]);
        assert!(frags.iter().all(|f| f.kind == FragmentKind::ConfigBlock));
        // The services block carries its nested children
        let services = &frags[0];
        assert!(services.content.contains("postgres"));
    }

    #[test]
    fn test_toml_tables() {
        let content = "\
[package]
name = \"demo\"
version = \"0.1.0\"

[dependencies]
serde = \"1.0\"
";
        let frags = frag_file("Cargo.toml", content);
        let keys: Vec<_> = frags.iter().filter_map(|f| f.symbol.as_deref()).collect();
        assert_eq!(keys, vec!["package", "dependencies"]);
    }

    #[test]
    fn test_json_keys() {
        let content = "\
{
  \"name\": \"demo\",
  \"scripts\": {
    \"build\": \"tsc\"
  }
}
";
        let frags = frag_file("package.json", content);
        let keys: Vec<_> = frags.iter().filter_map(|f| f.symbol.as_deref()).collect();
        assert!(keys.contains(&"name"));
        assert!(keys.contains(&"scripts"));
    }

    #[test]
    fn test_keyless_file_single_block() {
        let content = "[1, 2, 3,\n 4, 5]\n";
        let frags = frag_file("data.json", content);
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].kind, FragmentKind::ConfigBlock);
    }
}
