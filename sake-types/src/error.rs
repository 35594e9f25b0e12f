//! Canonical error type for sake.
//!
//! Every `sake-core` and `sake` function that can fail returns
//! `Result<T, SakeError>`. Variants mirror the error kinds named in the
//! build engine specification: a Sakefile that doesn't parse, a target the
//! user asked for that doesn't exist, a cyclic dependency graph, a target
//! missing required fields, a file that can't be hashed, a formula that
//! exited non-zero, and a fingerprint store from an incompatible version.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SakeError {
    /// The Sakefile (or an included file) could not be parsed as YAML, or a
    /// `#!`/`#<` directive line was malformed.
    #[error("{0}")]
    ParseError(String),

    /// A named target (or meta-target) is not present in the Sakefile.
    #[error("Couldn't find target '{0}' in Sakefile")]
    UnknownTarget(String),

    /// The dependency graph contains a cycle.
    #[error("dependency graph contains a cycle: {0}")]
    CycleDetected(String),

    /// A target is missing `help`, or a non-meta target is missing
    /// `formula`.
    #[error("{0}")]
    IntegrityError(String),

    /// A required include, or a declared dependency file, could not be
    /// read when hashing.
    #[error("{0}")]
    MissingFile(String),

    /// A target's formula exited with a non-zero status.
    #[error("target '{target}' failed: {detail}")]
    FormulaFailed { target: String, detail: String },

    /// `.shastore` was written by an incompatible (older) version of sake.
    #[error("'.shastore' is from an incompatible version of sake, run `sake clean` and rebuild")]
    StoreVersionMismatch,

    /// A required macro (`#! NAME or MESSAGE`) was never defined.
    #[error("{0}")]
    InvalidMacro(String),

    /// A required include (`#< PATH`, with no `optional`/`or`) is missing.
    #[error("{0}")]
    MissingInclude(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type SakeResult<T> = Result<T, SakeError>;
