// Copyright 2025 Lars Brubaker
// License: MIT
//
// Error types for scaffold construction.
//
// Fatal errors abort a build before any partial state is exposed.
// Non-fatal conditions (annotation closure violations, refinement
// non-conformance, unrecognized terms) are surfaced as data and logged,
// never as Err.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScaffoldError {
    /// Unsupported parameter combination: bad layer count, incompatible
    /// element counts at a junction, unknown organ/species variant.
    #[error("configuration: {0}")]
    Configuration(String),

    /// A path parameter outside [0, path length].
    #[error("path parameter {t} outside [0, {length}]")]
    Range { t: f64, length: f64 },

    /// Segmentation input failed validation (too few recognized landmarks,
    /// duplicate branch names).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Topology fingerprints of two scaffolds differ; they cannot be merged.
    #[error("merge incompatible: {0}")]
    MergeIncompatible(String),

    /// No annotation group bound to the requested term.
    #[error("annotation group not found: {0}")]
    GroupNotFound(String),
}

pub type Result<T> = std::result::Result<T, ScaffoldError>;
