//! diffmap - diff-aware context selection.
//!
//! Given two snapshots of a repository and a syntactic diff between
//! them, diffmap chooses a small, semantically coherent set of code
//! fragments that best explains the change to a downstream reader,
//! subject to a token budget.
//!
//! # Architecture
//!
//! ```text
//! files+diff → fragments → (E₀, concepts) → universe → edges
//!      ↓           ↓             ↓              ↓         ↓
//!    git      tree-sitter    diff mapper    ignore    six edge
//!  driver     + fallbacks    + tokenizer    walker    families
//!
//!           → graph → PPR → selection → rendering
//!               ↓       ↓        ↓           ↓
//!           petgraph  power   lazy greedy   JSON /
//!           + hub     iter.   + τ-stopping  text
//!           damping
//! ```
//!
//! The stages are strict: each consumes the previous stage's frozen
//! output, nothing flows backwards, and nothing survives the run.

pub mod concepts;
pub mod config;
pub mod diff;
pub mod edges;
pub mod error;
pub mod fragment;
pub mod git;
pub mod graph;
pub mod pipeline;
pub mod ppr;
pub mod render;
pub mod select;
pub mod tokenize;
pub mod types;
pub mod universe;
pub mod utility;

// Re-export the surface most callers need
pub use config::DiffmapConfig;
pub use error::{DiffmapError, Result};
pub use pipeline::{run, DiffContextReport, PipelineInput};
pub use types::{
    ChangedFile, CommitInfo, DiffHunk, DiffSide, Fragment, FragmentId, FragmentKind,
    RunMetadata, StopReason,
};
