//! Candidate universe expansion: grow V beyond the changed files
//! without scanning everything.
//!
//! Sources, in order:
//! 1. fragments of changed files (assembled by the pipeline)
//! 2. rare diff concepts via a cheap on-disk inverted index
//! 3. structural relatives: same-directory siblings and test↔code pairs
//! 4. manifests referencing changed files, and files referenced by
//!    changed manifests (Dockerfile COPY, compose build/volumes)
//!
//! When the universe exceeds its cap, fragments are kept by priority:
//! E₀ first, then highest diff-concept overlap, then path order. Core
//! fragments are never evicted.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::concepts::concept_overlap;
use crate::config::UniverseConfig;
use crate::tokenize::{extract_identifiers, TokenProfile};
use crate::types::{Fragment, FragmentId};

/// Extensions worth scanning during expansion: source code plus the
/// structured config formats the edge builders understand.
const EXPANSION_EXTENSIONS: &[&str] = &[
    "py", "pyi", "js", "jsx", "ts", "tsx", "rs", "go", "java", "kt", "rb", "php", "cs",
    "yaml", "yml", "json", "toml", "ini", "env",
];

fn has_expansion_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| EXPANSION_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Walk the repository and list candidate files for expansion, sorted
/// and capped. Respects .gitignore via the `ignore` crate.
pub fn scan_candidates(root: &Path, config: &UniverseConfig) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .follow_links(false)
        .build();

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in walker.flatten() {
        let path = entry.path();
        if !path.is_file() || !has_expansion_extension(path) {
            continue;
        }
        if let Ok(meta) = path.metadata() {
            if meta.len() > config.max_file_size {
                continue;
            }
        }
        if let Ok(rel) = path.strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }

    files.sort();
    files.truncate(config.max_candidate_files);
    files
}

/// Source 2: files containing a rare diff concept.
///
/// Builds an inverted index concept -> files over the candidate list,
/// then pulls in the files of every concept that occurs in at most
/// `rare_threshold` of them.
pub fn expand_by_rare_concepts(
    root: &Path,
    candidates: &[PathBuf],
    concepts: &BTreeSet<String>,
    already_included: &BTreeSet<Arc<str>>,
    config: &UniverseConfig,
) -> Vec<PathBuf> {
    if concepts.is_empty() {
        return Vec::new();
    }

    let mut index: BTreeMap<&str, Vec<&PathBuf>> = BTreeMap::new();
    for candidate in candidates {
        let rel = candidate.to_string_lossy();
        if already_included.contains(rel.as_ref()) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(root.join(candidate)) else {
            continue;
        };
        let profile = TokenProfile::from_path(&rel);
        let idents = extract_identifiers(&content, profile);
        for concept in concepts {
            if idents.contains(concept) {
                index.entry(concept.as_str()).or_default().push(candidate);
            }
        }
    }

    let mut expansion: BTreeSet<PathBuf> = BTreeSet::new();
    for (concept, files) in &index {
        if files.is_empty() || files.len() > config.rare_threshold {
            continue;
        }
        tracing::debug!(concept = *concept, files = files.len(), "rare concept expansion");
        for file in files {
            expansion.insert((*file).clone());
            if expansion.len() >= config.max_expansion_files {
                return expansion.into_iter().collect();
            }
        }
    }

    expansion.into_iter().collect()
}

/// Test-file naming conventions, shared with the structural edges.
pub fn test_target_stem(file_name: &str) -> Option<String> {
    let stem = file_name.rsplit_once('.').map(|(s, _)| s).unwrap_or(file_name);
    if let Some(rest) = stem.strip_prefix("test_") {
        return Some(rest.to_string());
    }
    if let Some(rest) = stem.strip_suffix("_test") {
        return Some(rest.to_string());
    }
    if let Some((base, _)) = stem.split_once(".test") {
        return Some(base.to_string());
    }
    if let Some((base, _)) = stem.split_once(".spec") {
        return Some(base.to_string());
    }
    None
}

/// Source 3: same-directory siblings and test↔code pairs of the
/// changed files.
pub fn structural_relatives(
    candidates: &[PathBuf],
    changed: &BTreeSet<Arc<str>>,
    config: &UniverseConfig,
) -> Vec<PathBuf> {
    let changed_paths: Vec<&Path> = changed.iter().map(|p| Path::new(p.as_ref())).collect();
    let changed_dirs: BTreeSet<&Path> =
        changed_paths.iter().filter_map(|p| p.parent()).collect();
    let changed_stems: BTreeSet<String> = changed_paths
        .iter()
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()))
        .map(|s| s.to_ascii_lowercase())
        .collect();

    let mut per_dir: BTreeMap<&Path, usize> = BTreeMap::new();
    let mut out: Vec<PathBuf> = Vec::new();

    for candidate in candidates {
        let rel = candidate.to_string_lossy();
        if changed.contains(rel.as_ref()) {
            continue;
        }
        let name = candidate
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        let stem = candidate
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        // Sibling in a changed directory, bounded per directory
        if let Some(parent) = candidate.parent() {
            if changed_dirs.contains(parent) {
                let seen = per_dir.entry(parent).or_insert(0);
                if *seen < config.max_files_per_dir {
                    *seen += 1;
                    out.push(candidate.clone());
                    continue;
                }
            }
        }

        // Candidate is a test of a changed file
        if let Some(target) = test_target_stem(&name) {
            if changed_stems.contains(&target) {
                out.push(candidate.clone());
                continue;
            }
        }
        // Candidate is the code a changed test exercises
        if changed_stems.iter().any(|s| test_target_stem(s).as_deref() == Some(stem.as_str())) {
            out.push(candidate.clone());
        }
    }

    out
}

static DOCKER_COPY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^(?:COPY|ADD)\s+(?:--\S+\s+)*(\S+)\s+").expect("invalid COPY regex")
});
static COMPOSE_BUILD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r##"(?m)^\s+(?:build|context|dockerfile):\s*['"]?([^'"#\n]+)"##)
        .expect("invalid compose regex")
});
static COMPOSE_VOLUME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^\s+-\s*['"]?([./][^:'"\n]+):"#).expect("invalid volume regex")
});

pub fn is_dockerfile(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "dockerfile" || lower.starts_with("dockerfile.") || lower.ends_with(".dockerfile")
}

pub fn is_compose_file(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "docker-compose.yml" | "docker-compose.yaml" | "compose.yml" | "compose.yaml"
    )
}

/// Paths referenced by a manifest's content.
pub fn manifest_refs(content: &str) -> BTreeSet<String> {
    let mut refs = BTreeSet::new();
    for caps in DOCKER_COPY_RE.captures_iter(content) {
        let src = caps[1].trim().trim_matches(|c| c == '\'' || c == '"');
        if !src.starts_with("--") && !src.starts_with('$') {
            refs.insert(src.trim_start_matches("./").to_string());
        }
    }
    for caps in COMPOSE_BUILD_RE.captures_iter(content) {
        refs.insert(caps[1].trim().trim_start_matches("./").to_string());
    }
    for caps in COMPOSE_VOLUME_RE.captures_iter(content) {
        refs.insert(caps[1].trim().trim_start_matches("./").to_string());
    }
    refs
}

/// Source 4, both directions: files a changed manifest references, and
/// manifests among the candidates that reference a changed file.
pub fn manifest_relatives(
    root: &Path,
    candidates: &[PathBuf],
    changed: &BTreeMap<Arc<str>, Option<String>>,
) -> Vec<PathBuf> {
    let mut out: BTreeSet<PathBuf> = BTreeSet::new();

    // Changed manifest -> referenced files
    let mut changed_refs: BTreeSet<String> = BTreeSet::new();
    for (path, content) in changed {
        let name = Path::new(path.as_ref())
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("");
        if !is_dockerfile(name) && !is_compose_file(name) {
            continue;
        }
        if let Some(content) = content {
            changed_refs.extend(manifest_refs(content));
        }
    }
    for candidate in candidates {
        let rel = candidate.to_string_lossy().replace('\\', "/");
        if changed.contains_key(rel.as_str()) {
            continue;
        }
        let name = candidate.file_name().and_then(|n| n.to_str()).unwrap_or("");
        for reference in &changed_refs {
            let ref_name = reference.rsplit('/').next().unwrap_or(reference);
            if name.eq_ignore_ascii_case(ref_name) || rel.starts_with(reference.as_str()) {
                out.insert(candidate.clone());
                break;
            }
        }
    }

    // Candidate manifest -> changed file
    for candidate in candidates {
        let name = candidate.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if !is_dockerfile(name) && !is_compose_file(name) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(root.join(candidate)) else {
            continue;
        };
        let refs = manifest_refs(&content);
        let hit = changed.keys().any(|changed_path| {
            refs.iter().any(|r| {
                changed_path.as_ref() == r.as_str()
                    || changed_path.starts_with(&format!("{}/", r.trim_end_matches('/')))
                    || changed_path.ends_with(r.as_str())
            })
        });
        if hit {
            out.insert(candidate.clone());
        }
    }

    out.into_iter().collect()
}

/// Enforce the universe cap. Keeps every core fragment, then the best
/// concept-overlap fragments, then path order.
pub fn cap_universe(
    mut fragments: Vec<Fragment>,
    core: &BTreeSet<FragmentId>,
    concepts: &BTreeSet<String>,
    max_universe: usize,
) -> Vec<Fragment> {
    if fragments.len() <= max_universe {
        fragments.sort_by(|a, b| a.id.cmp(&b.id));
        return fragments;
    }

    tracing::debug!(
        total = fragments.len(),
        cap = max_universe,
        "capping candidate universe"
    );

    fragments.sort_by_cached_key(|f| {
        (
            !core.contains(&f.id),
            std::cmp::Reverse(concept_overlap(&f.identifiers, concepts)),
            f.id.clone(),
        )
    });
    fragments.truncate(max_universe.max(core.len()));
    fragments.sort_by(|a, b| a.id.cmp(&b.id));
    fragments
}
