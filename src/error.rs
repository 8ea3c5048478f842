use thiserror::Error;

/// Canonical error type exposed by the erasure coding core.
///
/// The variants are deliberately fieldless: callers compare outcomes across
/// retry/fallback policies and ship them between tasks, so the type stays
/// `Copy`, equality-comparable, and trivially `Send + Sync`.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ErasureCodingError {
    /// The presented blocks carry too little information to reconstruct the
    /// original data, or the elimination system turned out singular.
    #[error("decoding failed: insufficient information to reconstruct the original blocks")]
    DecodingFailed,

    /// Fewer blocks are present (or addressable) than the original count.
    #[error("insufficient blocks for reconstruction")]
    InsufficientBlocks,

    /// A redundancy value that cannot be interpreted at all.
    ///
    /// Encode entry points clamp malformed redundancy instead of rejecting
    /// it; this variant is only produced by [`crate::validate_redundancy`].
    #[error("invalid redundancy value")]
    InvalidRedundancy,
}
