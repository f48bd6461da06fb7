//! Error kinds for the selection pipeline.
//!
//! Policy: recoverable problems (unreadable files, unparsable inputs)
//! are logged and degrade gracefully inside their stage; only invariant
//! violations halt the run. Parse failures in the fragmenter are not
//! errors at all - they are a strategy-fallback branch and never reach
//! this type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DiffmapError>;

#[derive(Error, Debug)]
pub enum DiffmapError {
    /// Bad input: invalid configuration values, hunks referencing
    /// missing files, malformed line ranges.
    #[error("invalid input: {0}")]
    Input(String),

    /// The diff contained no hunks. Callers treat this as a distinct
    /// exit status, not a failure.
    #[error("diff is empty")]
    EmptyDiff,

    /// A git subprocess failed or git is unavailable.
    #[error("git: {0}")]
    Git(String),

    /// The global deadline elapsed before the pipeline produced a
    /// partial result it could return.
    #[error("deadline elapsed during {0}")]
    Timeout(&'static str),

    /// A stage-boundary invariant was violated. Always a bug.
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let e = DiffmapError::Input("alpha must be in (0, 1), got 1.5".into());
        assert!(e.to_string().contains("alpha"));
        assert_eq!(DiffmapError::EmptyDiff.to_string(), "diff is empty");
    }
}
