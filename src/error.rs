use thiserror::Error;

/// Errors reported by [`Sketch`](crate::Sketch) construction, merging and persistence.
#[derive(Debug, Error)]
pub enum Error {
    /// A constructor argument is outside its valid range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Two sketches with different configurations cannot be merged.
    #[error(
        "incompatible sketches: {bucket_bits}/{max_precision} vs. {other_bucket_bits}/{other_max_precision} (bucket bits/precision cap)"
    )]
    IncompatibleSketch {
        bucket_bits: u32,
        max_precision: u8,
        other_bucket_bits: u32,
        other_max_precision: u8,
    },

    /// Persisted data does not describe a valid sketch.
    #[error("malformed sketch data: {0}")]
    Malformed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
