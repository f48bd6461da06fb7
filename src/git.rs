//! The git collaborator: subprocess `git` wrapped into the pipeline's
//! input types.
//!
//! Spawning git beats FFI bindings here: no native dependency, works
//! with whatever git the user has, and the three commands we need
//! (diff, show, log) are stable since forever. Everything is batched -
//! one `diff` for hunks, one `log --name-only` for the co-change
//! window.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{DiffmapError, Result};
use crate::types::{ChangedFile, CommitInfo, DiffHunk, DiffSide};

static HUNK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap());
static RANGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\S+?)\.\.\.?(\S+?)\s*$").unwrap());

fn run_git(root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .map_err(|e| DiffmapError::Git(format!("failed to spawn git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DiffmapError::Git(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

pub fn is_git_repo(root: &Path) -> bool {
    run_git(root, &["rev-parse", "--git-dir"]).is_ok()
}

/// Split `base..head` / `base...head` into its endpoints.
pub fn split_diff_range(range: &str) -> (Option<String>, Option<String>) {
    match RANGE_RE.captures(range) {
        Some(caps) => (Some(caps[1].to_string()), Some(caps[2].to_string())),
        None => (None, None),
    }
}

/// Parse `git diff --unified=0` into per-side hunks with absolute line
/// numbers. A modified region yields a post-side hunk for its added
/// lines and a pre-side hunk for its removed ones.
pub fn diff_hunks(root: &Path, range: &str) -> Result<Vec<DiffHunk>> {
    let output = run_git(root, &["diff", "--unified=0", range])?;

    let mut hunks = Vec::new();
    let mut old_path: Option<Arc<str>> = None;
    let mut new_path: Option<Arc<str>> = None;

    for line in output.lines() {
        if let Some(rest) = line.strip_prefix("--- ") {
            old_path = rest.strip_prefix("a/").map(|p| Arc::from(p.trim()));
            continue;
        }
        if let Some(rest) = line.strip_prefix("+++ ") {
            new_path = rest.strip_prefix("b/").map(|p| Arc::from(p.trim()));
            continue;
        }
        let Some(caps) = HUNK_RE.captures(line) else { continue };

        let old_start: u32 = caps[1].parse().unwrap_or(0);
        let old_len: u32 = caps.get(2).map_or(1, |m| m.as_str().parse().unwrap_or(1));
        let new_start: u32 = caps[3].parse().unwrap_or(0);
        let new_len: u32 = caps.get(4).map_or(1, |m| m.as_str().parse().unwrap_or(1));

        if new_len > 0 {
            if let Some(path) = new_path.clone().or_else(|| old_path.clone()) {
                hunks.push(DiffHunk {
                    path,
                    side: DiffSide::Post,
                    start_line: new_start.max(1),
                    end_line: new_start.max(1) + new_len - 1,
                });
            }
        }
        if old_len > 0 {
            if let Some(path) = old_path.clone().or_else(|| new_path.clone()) {
                hunks.push(DiffHunk {
                    path,
                    side: DiffSide::Pre,
                    start_line: old_start.max(1),
                    end_line: old_start.max(1) + old_len - 1,
                });
            }
        }
    }

    Ok(hunks)
}

/// Relative paths touched by the diff.
pub fn changed_paths(root: &Path, range: &str) -> Result<Vec<String>> {
    let output = run_git(root, &["diff", "--name-only", range])?;
    Ok(output.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
}

fn show_at(root: &Path, rev: &str, rel_path: &str) -> Result<String> {
    run_git(root, &["show", &format!("{}:{}", rev, rel_path)])
}

/// Assemble both snapshots of every changed file.
///
/// For a `base..head` range the pre image comes from `base` and the
/// post image from `head`; for a single revision the post image is the
/// working tree. A missing side (added/deleted file) stays `None`.
pub fn read_changed_files(root: &Path, range: &str) -> Result<Vec<ChangedFile>> {
    let (base, head) = split_diff_range(range);
    let base_rev = base.unwrap_or_else(|| range.trim().to_string());

    let mut files = Vec::new();
    for rel in changed_paths(root, range)? {
        let pre_text = show_at(root, &base_rev, &rel).ok();
        let post_text = match &head {
            Some(head_rev) => show_at(root, head_rev, &rel).ok(),
            None => std::fs::read_to_string(root.join(&rel)).ok(),
        };
        if pre_text.is_none() && post_text.is_none() {
            tracing::warn!(path = rel.as_str(), "unreadable on both sides, skipping");
            continue;
        }
        files.push(ChangedFile { path: Arc::from(rel.as_str()), pre_text, post_text });
    }
    Ok(files)
}

/// Recent commit metadata for the co-change family, newest first.
/// A `\x01` marker keeps shas unambiguous from path lines.
pub fn recent_commits(root: &Path, limit: usize) -> Result<Vec<CommitInfo>> {
    let count = format!("-n{}", limit);
    let output = run_git(root, &["log", "--name-only", "--format=%x01%H", count.as_str()])?;

    let mut commits: Vec<CommitInfo> = Vec::new();
    for line in output.lines() {
        let line = line.trim();
        if let Some(sha) = line.strip_prefix('\u{1}') {
            commits.push(CommitInfo { id: sha.to_string(), paths: Vec::new() });
        } else if !line.is_empty() {
            if let Some(commit) = commits.last_mut() {
                commit.paths.push(line.to_string());
            }
        }
    }
    Ok(commits)
}
