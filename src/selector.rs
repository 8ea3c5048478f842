//! Adaptive coding-mode selection and the caller-level priority policy.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::gf::FieldKind;

/// Loss-rate ceiling below which GF(256) Reed–Solomon stays worthwhile.
pub const GF256_LOSS_CEILING: f64 = 0.08;

/// Loss-rate ceiling below which GF(65536) Reed–Solomon stays worthwhile.
/// Lower than the GF(256) ceiling: wide-field elimination is costly enough
/// that the rateless coder wins earlier.
pub const GF65536_LOSS_CEILING: f64 = 0.03;

/// The coding algorithm applied to one block set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodingMode {
    /// Fixed-rate systematic Reed–Solomon over the given field.
    ReedSolomon(FieldKind),
    /// Rateless RaptorQ fountain coding.
    RaptorQ,
}

/// Upload priority of a chunk, ordered from most to least critical.
///
/// The engine never interprets priority; callers translate it into a
/// redundancy ratio via [`ChunkPriority::redundancy_ratio`] before encoding
/// (unequal error protection stays a caller concern).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChunkPriority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
}

impl ChunkPriority {
    /// Multiplier applied to a base redundancy before encoding.
    pub fn redundancy_ratio(self) -> f64 {
        match self {
            ChunkPriority::Critical => 3.0,
            ChunkPriority::High => 2.5,
            ChunkPriority::Normal => 1.5,
            ChunkPriority::Low => 1.0,
        }
    }
}

/// Pick a coding mode for `chunk_count` blocks under the observed (or
/// predicted) loss rate.
///
/// Pure and deterministic: the loss rate is clamped to `[0, 1]` (NaN counts
/// as zero), a non-positive chunk count degenerates to GF(256)
/// Reed–Solomon, the field follows the chunk count, and at or above the
/// field's loss ceiling the rateless coder takes over. For a fixed chunk
/// count the decision is monotone in the loss rate: one threshold, no
/// oscillation.
pub fn select_coder(chunk_count: i64, loss_rate: f64) -> CodingMode {
    let loss = if loss_rate.is_nan() {
        0.0
    } else {
        loss_rate.clamp(0.0, 1.0)
    };
    if chunk_count <= 0 {
        return CodingMode::ReedSolomon(FieldKind::Gf256);
    }
    let (field, ceiling) = if chunk_count <= 255 {
        (FieldKind::Gf256, GF256_LOSS_CEILING)
    } else {
        (FieldKind::Gf65536, GF65536_LOSS_CEILING)
    };
    let mode = if loss < ceiling {
        CodingMode::ReedSolomon(field)
    } else {
        CodingMode::RaptorQ
    };
    trace!(chunk_count, loss, ?mode, "coder selected");
    mode
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_field_threshold() {
        assert_eq!(
            select_coder(10, 0.079),
            CodingMode::ReedSolomon(FieldKind::Gf256)
        );
        assert_eq!(select_coder(10, 0.080), CodingMode::RaptorQ);
    }

    #[test]
    fn wide_field_threshold() {
        assert_eq!(
            select_coder(256, 0.029),
            CodingMode::ReedSolomon(FieldKind::Gf65536)
        );
        assert_eq!(select_coder(256, 0.03), CodingMode::RaptorQ);
    }

    #[test]
    fn field_follows_chunk_count() {
        assert_eq!(
            select_coder(255, 0.0),
            CodingMode::ReedSolomon(FieldKind::Gf256)
        );
        assert_eq!(
            select_coder(256, 0.0),
            CodingMode::ReedSolomon(FieldKind::Gf65536)
        );
    }

    #[test]
    fn degenerate_and_clamped_inputs() {
        assert_eq!(
            select_coder(0, 0.5),
            CodingMode::ReedSolomon(FieldKind::Gf256)
        );
        assert_eq!(
            select_coder(-3, 2.0),
            CodingMode::ReedSolomon(FieldKind::Gf256)
        );
        assert_eq!(
            select_coder(10, -0.5),
            CodingMode::ReedSolomon(FieldKind::Gf256)
        );
        assert_eq!(select_coder(10, 2.0), CodingMode::RaptorQ);
        assert_eq!(
            select_coder(10, f64::NAN),
            CodingMode::ReedSolomon(FieldKind::Gf256)
        );
    }

    #[test]
    fn selection_is_monotone_in_loss_rate() {
        for &chunk_count in &[1i64, 10, 255, 256, 4096] {
            let mut switched = false;
            for step in 0..=1000 {
                let loss = step as f64 / 1000.0;
                let rateless = select_coder(chunk_count, loss) == CodingMode::RaptorQ;
                if switched {
                    assert!(rateless, "oscillation at chunk_count={chunk_count} loss={loss}");
                }
                switched |= rateless;
            }
            assert!(switched, "no threshold found for chunk_count={chunk_count}");
        }
    }

    #[test]
    fn priority_ratio_table() {
        assert_eq!(ChunkPriority::Critical.redundancy_ratio(), 3.0);
        assert_eq!(ChunkPriority::High.redundancy_ratio(), 2.5);
        assert_eq!(ChunkPriority::Normal.redundancy_ratio(), 1.5);
        assert_eq!(ChunkPriority::Low.redundancy_ratio(), 1.0);
        assert!(ChunkPriority::Critical < ChunkPriority::Low);
    }

    #[test]
    fn mode_serde_round_trip() {
        let modes = [
            CodingMode::ReedSolomon(FieldKind::Gf256),
            CodingMode::ReedSolomon(FieldKind::Gf65536),
            CodingMode::RaptorQ,
        ];
        for mode in modes {
            let json = serde_json::to_string(&mode).expect("serialize");
            let back: CodingMode = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(back, mode);
        }
    }
}
