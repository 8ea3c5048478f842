//! Erasure coding core for the RCUP resilient upload pipeline.
//!
//! This crate is the resilience layer of a chunked-upload stack: chunks are
//! encoded with redundant blocks so the receiving side reconstructs the
//! original data despite lost, dropped, or unacknowledged chunks, without
//! re-transmission. Four building blocks make that up:
//!
//! * [`gf`] — GF(256) and GF(65536) arithmetic over precomputed
//!   log/antilog tables.
//! * [`reed_solomon`] — fixed-rate systematic Reed–Solomon coding with a
//!   deterministic Cauchy parity matrix and erasure decoding restricted to
//!   the erased positions.
//! * [`raptorq`] — rateless fountain coding with LDPC/HDPC precoding and a
//!   peeling + inactivation decoder.
//! * [`selector`] — the pure policy mapping (chunk count, loss rate) to a
//!   coding mode, plus the caller-level chunk-priority table.
//!
//! [`ErasureCodingEngine`] ties them together behind encode entry points
//! that never fail and a single all-or-nothing `decode`. Everything is
//! deterministic: encoder and decoder derive every coefficient from block
//! counts and indices alone, so nothing about the code travels with the
//! data. The engine does no I/O, persists nothing, and is safe to share
//! across threads.

pub mod engine;
pub mod gf;
pub mod raptorq;
pub mod reed_solomon;
pub mod selector;

mod error;

pub use engine::{BlockSetMetadata, EncodedBlockSet, ErasureCodingEngine};
pub use error::ErasureCodingError;
pub use gf::FieldKind;
pub use selector::{select_coder, ChunkPriority, CodingMode};

/// An opaque, fixed-length chunk payload. All blocks within one coding
/// operation share one length; zero-length blocks are valid.
pub type Block = Vec<u8>;

/// Strict redundancy validation for callers that prefer rejection over the
/// engine's clamping: NaN and negative values are refused.
pub fn validate_redundancy(redundancy: f64) -> Result<f64, ErasureCodingError> {
    if redundancy.is_nan() || redundancy < 0.0 {
        return Err(ErasureCodingError::InvalidRedundancy);
    }
    Ok(redundancy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redundancy_validation() {
        assert_eq!(validate_redundancy(0.0), Ok(0.0));
        assert_eq!(validate_redundancy(2.5), Ok(2.5));
        assert_eq!(
            validate_redundancy(-0.1),
            Err(ErasureCodingError::InvalidRedundancy)
        );
        assert_eq!(
            validate_redundancy(f64::NAN),
            Err(ErasureCodingError::InvalidRedundancy)
        );
    }

    #[test]
    fn errors_are_comparable_and_sendable() {
        fn assert_send_sync<T: Send + Sync + Copy + Eq>() {}
        assert_send_sync::<ErasureCodingError>();
        assert_ne!(
            ErasureCodingError::DecodingFailed,
            ErasureCodingError::InsufficientBlocks
        );
    }
}
