//! Pipeline configuration: the policy bundle handed to every stage.
//!
//! All tunables live in one immutable struct so stages never reach for
//! global state. Scalar knobs can be overridden from a `diffmap.toml`
//! next to the repository root:
//!
//! ```toml
//! [selector]
//! alpha = 0.60
//! tau = 0.08
//! budget = 50000
//! max-universe = 5000
//! ```

use std::path::Path;
use std::time::Instant;

use serde::Deserialize;

use crate::error::{DiffmapError, Result};

/// Per-language semantic edge weights and lexical similarity band.
///
/// Stricter type systems earn higher semantic weights (a Rust symbol
/// reference almost certainly resolves; a Python call might not) and a
/// narrower lexical band (name overlap adds little on top of resolved
/// references).
#[derive(Debug, Clone, Copy)]
pub struct LangProfile {
    pub call: f64,
    pub symbol_ref: f64,
    pub type_ref: f64,
    pub lexical_min: f64,
    pub lexical_max: f64,
    /// Multiplier for the reverse edge of a semantic reference
    pub reverse_factor: f64,
}

pub const DEFAULT_LANG_PROFILE: LangProfile = LangProfile {
    call: 0.55,
    symbol_ref: 0.60,
    type_ref: 0.50,
    lexical_min: 0.15,
    lexical_max: 0.25,
    reverse_factor: 0.70,
};

/// Look up the semantic policy for a file extension.
pub fn lang_profile(ext: &str) -> LangProfile {
    match ext {
        "py" | "pyi" | "pyw" => LangProfile {
            call: 0.55,
            symbol_ref: 0.60,
            type_ref: 0.50,
            lexical_min: 0.20,
            lexical_max: 0.35,
            reverse_factor: 0.70,
        },
        "js" | "jsx" | "mjs" | "cjs" => LangProfile {
            call: 0.50,
            symbol_ref: 0.55,
            type_ref: 0.45,
            lexical_min: 0.25,
            lexical_max: 0.35,
            reverse_factor: 0.50,
        },
        "ts" | "tsx" | "mts" | "cts" => LangProfile {
            call: 0.70,
            symbol_ref: 0.75,
            type_ref: 0.65,
            lexical_min: 0.15,
            lexical_max: 0.25,
            reverse_factor: 0.50,
        },
        "rs" => LangProfile {
            call: 0.90,
            symbol_ref: 0.95,
            type_ref: 0.85,
            lexical_min: 0.10,
            lexical_max: 0.15,
            reverse_factor: 0.40,
        },
        "go" => LangProfile {
            call: 0.85,
            symbol_ref: 0.85,
            type_ref: 0.75,
            lexical_min: 0.12,
            lexical_max: 0.20,
            reverse_factor: 0.40,
        },
        _ => DEFAULT_LANG_PROFILE,
    }
}

/// Weights for the non-semantic edge families.
#[derive(Debug, Clone)]
pub struct EdgeWeights {
    pub containment: f64,
    pub containment_reverse_factor: f64,
    pub sibling: f64,
    pub test_direct: f64,
    pub test_naming: f64,
    pub test_reverse: f64,
    pub config_code: f64,
    pub docker_copy: f64,
    pub compose: f64,
    pub doc_structure: f64,
    pub doc_structure_reverse_factor: f64,
    pub anchor_link: f64,
    pub anchor_link_reverse_factor: f64,
    pub citation: f64,
}

impl Default for EdgeWeights {
    fn default() -> Self {
        Self {
            containment: 0.50,
            containment_reverse_factor: 0.70,
            sibling: 0.05,
            test_direct: 0.60,
            test_naming: 0.50,
            test_reverse: 0.30,
            config_code: 0.45,
            docker_copy: 0.65,
            compose: 0.50,
            doc_structure: 0.30,
            doc_structure_reverse_factor: 0.83,
            anchor_link: 0.55,
            anchor_link_reverse_factor: 0.64,
            citation: 0.25,
        }
    }
}

/// TF-IDF similarity tuning.
#[derive(Debug, Clone)]
pub struct LexicalConfig {
    /// Cosine similarity below this emits no edge
    pub min_similarity: f64,
    /// Keep only the strongest k neighbours per fragment
    pub top_k_neighbors: usize,
    /// Terms appearing in more than this fraction of fragments are
    /// dropped from vectors
    pub max_df_ratio: f64,
    pub min_idf: f64,
    /// Posting lists longer than this are skipped when accumulating
    /// dot products
    pub max_postings: usize,
    pub backward_factor: f64,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            min_similarity: 0.30,
            top_k_neighbors: 5,
            max_df_ratio: 0.15,
            min_idf: 2.0,
            max_postings: 100,
            backward_factor: 0.5,
        }
    }
}

/// Co-change edge tuning. The commit and per-commit file caps are
/// heuristics calibrated on mid-size repositories; expose them rather
/// than hard-coding.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub max_weight: f64,
    pub min_count: usize,
    pub max_files_per_commit: usize,
    pub commits_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_weight: 0.40,
            min_count: 2,
            max_files_per_commit: 30,
            commits_limit: 500,
        }
    }
}

/// Universe expansion limits.
#[derive(Debug, Clone)]
pub struct UniverseConfig {
    /// A concept is "rare" when it occurs in at most this many files
    pub rare_threshold: usize,
    /// Hard cap on files pulled in by rare-concept expansion
    pub max_expansion_files: usize,
    /// Hard cap on files scanned to build the concept index
    pub max_candidate_files: usize,
    /// Files larger than this are never scanned or fragmented
    pub max_file_size: u64,
    /// Sibling expansion reads at most this many files per directory
    pub max_files_per_dir: usize,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            rare_threshold: 3,
            max_expansion_files: 20,
            max_candidate_files: 2000,
            max_file_size: 100_000,
            max_files_per_dir: 20,
        }
    }
}

/// The full policy bundle. Constructed once, passed by reference to
/// each stage.
#[derive(Debug, Clone)]
pub struct DiffmapConfig {
    /// PPR damping: probability of following an edge vs teleporting
    /// back to the core set. Valid range [0.50, 0.65].
    pub alpha: f64,
    /// Stopping threshold as a fraction of the baseline median density.
    /// Valid range [0.05, 0.20]; 0 disables adaptive stopping.
    pub tau: f64,
    /// Token cap on the selection. `None` means tau-stopping alone
    /// controls output size.
    pub budget: Option<usize>,
    /// Bypass the selector and return the whole changed-file universe
    pub full: bool,
    /// Cap on |V|
    pub max_universe: usize,
    /// Per-fragment framing cost added to every token count
    pub overhead_per_fragment: usize,
    /// Global deadline; checked at stage boundaries
    pub deadline: Option<Instant>,

    pub edge_weights: EdgeWeights,
    pub lexical: LexicalConfig,
    pub history: HistoryConfig,
    pub universe: UniverseConfig,
    /// In-degree percentile above which hub suppression kicks in
    pub hub_percentile: f64,
}

impl Default for DiffmapConfig {
    fn default() -> Self {
        Self {
            alpha: 0.60,
            tau: 0.08,
            budget: None,
            full: false,
            max_universe: 5000,
            overhead_per_fragment: 18,
            deadline: None,
            edge_weights: EdgeWeights::default(),
            lexical: LexicalConfig::default(),
            history: HistoryConfig::default(),
            universe: UniverseConfig::default(),
            hub_percentile: 0.95,
        }
    }
}

impl DiffmapConfig {
    /// Check value ranges. Called once at pipeline entry.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(DiffmapError::Input(format!(
                "alpha must be in (0, 1), got {}",
                self.alpha
            )));
        }
        if self.tau < 0.0 {
            return Err(DiffmapError::Input(format!("tau must be >= 0, got {}", self.tau)));
        }
        if self.max_universe == 0 {
            return Err(DiffmapError::Input("max_universe must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.hub_percentile) {
            return Err(DiffmapError::Input(format!(
                "hub_percentile must be in [0, 1], got {}",
                self.hub_percentile
            )));
        }
        Ok(())
    }

    /// Whether the deadline has elapsed.
    pub fn past_deadline(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Merge scalar overrides from `diffmap.toml` in `root`, if present.
    /// Unparsable files are ignored: configuration is a convenience,
    /// not a failure mode.
    pub fn with_overrides_from(mut self, root: &Path) -> Self {
        let path = root.join("diffmap.toml");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return self;
        };
        let Ok(raw) = toml::from_str::<RawConfig>(&content) else {
            tracing::warn!("ignoring unparsable {}", path.display());
            return self;
        };
        let Some(selector) = raw.selector else { return self };
        if let Some(alpha) = selector.alpha {
            self.alpha = alpha;
        }
        if let Some(tau) = selector.tau {
            self.tau = tau;
        }
        if let Some(budget) = selector.budget {
            self.budget = Some(budget);
        }
        if let Some(max_universe) = selector.max_universe {
            self.max_universe = max_universe;
        }
        if let Some(overhead) = selector.overhead_per_fragment {
            self.overhead_per_fragment = overhead;
        }
        self
    }
}

/// Raw `diffmap.toml` shape.
#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    selector: Option<RawSelector>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
struct RawSelector {
    alpha: Option<f64>,
    tau: Option<f64>,
    budget: Option<usize>,
    max_universe: Option<usize>,
    overhead_per_fragment: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(DiffmapConfig::default().validate().is_ok());
    }

    #[test]
    fn test_alpha_out_of_range() {
        let config = DiffmapConfig { alpha: 1.0, ..Default::default() };
        assert!(config.validate().is_err());
        let config = DiffmapConfig { alpha: 0.0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_tau_rejected() {
        let config = DiffmapConfig { tau: -0.1, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lang_profiles() {
        // Stricter type systems get higher semantic weights
        assert!(lang_profile("rs").symbol_ref > lang_profile("py").symbol_ref);
        assert!(lang_profile("go").call > lang_profile("js").call);
        // ...and narrower lexical bands
        assert!(lang_profile("rs").lexical_max < lang_profile("py").lexical_max);
        // Unknown extensions fall back to the default
        assert_eq!(lang_profile("zig").call, DEFAULT_LANG_PROFILE.call);
    }

    #[test]
    fn test_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("diffmap.toml"),
            "[selector]\nalpha = 0.55\nbudget = 4096\nmax-universe = 100\n",
        )
        .unwrap();

        let config = DiffmapConfig::default().with_overrides_from(dir.path());
        assert_eq!(config.alpha, 0.55);
        assert_eq!(config.budget, Some(4096));
        assert_eq!(config.max_universe, 100);
        // Untouched knobs keep their defaults
        assert_eq!(config.tau, 0.08);
    }

    #[test]
    fn test_missing_toml_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DiffmapConfig::default().with_overrides_from(dir.path());
        assert_eq!(config.alpha, 0.60);
    }
}
