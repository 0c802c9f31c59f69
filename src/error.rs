//! Error types for CPAB operations.

use std::io;
use thiserror::Error;

/// Errors that can occur when constructing or applying a CPAB transformation.
#[derive(Error, Debug)]
pub enum CpabError {
    /// The configuration cannot describe a valid transformation.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The constraint matrix leaves no free parameters.
    #[error(
        "Constraints are degenerate: all {n_params} affine parameters are fixed (rank {rank}), so the transformation space is empty"
    )]
    DegenerateConstraints { n_params: usize, rank: usize },

    /// An input array has the wrong shape for the configuration.
    #[error("Shape mismatch: {0}")]
    Shape(String),

    /// An input value is outside its valid range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading or writing a persisted basis failed.
    #[error("Basis store error: {0}")]
    Store(#[from] io::Error),
}

/// Result type for CPAB operations.
pub type Result<T> = std::result::Result<T, CpabError>;

impl CpabError {
    /// Creates a shape error from an expected and a found description, with context.
    pub fn shape_mismatch<E, G>(context: &str, expected: E, found: G) -> Self
    where
        E: std::fmt::Display,
        G: std::fmt::Display,
    {
        Self::Shape(format!("{}: expected {}, got {}", context, expected, found))
    }
}
