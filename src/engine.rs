//! The public erasure-coding facade.
//!
//! One engine serves an upload/download session (or the whole process).
//! GF(256) tables are compile-time constants, the GF(65536) tables are a
//! shared process-wide singleton, and the RaptorQ sub-engine is built
//! exactly once on first use behind a [`OnceLock`] — after that every call
//! is pure CPU work over its own buffers, so the engine is freely shared
//! across threads.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ErasureCodingError;
use crate::raptorq::RaptorQCodec;
use crate::selector::{select_coder, CodingMode};
use crate::{reed_solomon, Block};

/// Shape of an encoded block set, enough to mirror the encode on the
/// receiving side and restore exact block lengths.
///
/// The `mode` records the algorithm that produced the set; `decode` does
/// not guess and does not fall back across algorithms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSetMetadata {
    pub mode: CodingMode,
    pub original_count: usize,
    pub total_count: usize,
    /// Byte length of the source blocks (parity blocks may carry one
    /// alignment byte more in the wide field).
    pub block_len: usize,
}

/// An encoded block set together with its metadata, for callers that
/// persist or ship blocks (the CLI manifest serializes this shape).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedBlockSet {
    pub meta: BlockSetMetadata,
    pub blocks: Vec<Block>,
}

/// Erasure coding engine: encode entry points that never fail, one
/// error-returning decode, and the pure mode selector.
pub struct ErasureCodingEngine {
    raptorq: OnceLock<RaptorQCodec>,
}

impl Default for ErasureCodingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ErasureCodingEngine {
    pub fn new() -> Self {
        Self {
            raptorq: OnceLock::new(),
        }
    }

    /// The RaptorQ sub-engine, constructed on first need and reused for the
    /// engine's lifetime.
    fn raptorq(&self) -> &RaptorQCodec {
        self.raptorq.get_or_init(RaptorQCodec::new)
    }

    /// Pure mode selection; see [`select_coder`].
    pub fn select_coder(&self, chunk_count: i64, loss_rate: f64) -> CodingMode {
        select_coder(chunk_count, loss_rate)
    }

    /// Systematic Reed–Solomon encode. Never fails; the field follows the
    /// block counts.
    pub fn encode_reed_solomon(&self, data: &[Block], redundancy: f64) -> Vec<Block> {
        reed_solomon::encode(data, redundancy)
    }

    /// Rateless RaptorQ encode. Never fails.
    pub fn encode_raptorq(&self, data: &[Block], redundancy: f64) -> Vec<Block> {
        self.raptorq().encode(data, redundancy)
    }

    /// Select a mode for the input under `loss_rate`, encode with it, and
    /// return both — the receiving side needs the mode to decode.
    pub fn encode_auto(
        &self,
        data: &[Block],
        redundancy: f64,
        loss_rate: f64,
    ) -> (CodingMode, Vec<Block>) {
        let mode = select_coder(data.len() as i64, loss_rate);
        debug!(k = data.len(), redundancy, loss_rate, ?mode, "auto encode");
        let blocks = match mode {
            CodingMode::ReedSolomon(_) => self.encode_reed_solomon(data, redundancy),
            CodingMode::RaptorQ => self.encode_raptorq(data, redundancy),
        };
        (mode, blocks)
    }

    /// Reconstruct the original blocks with the algorithm that encoded
    /// them. `None` slots mark erasures. All-or-nothing: exactly
    /// `original_count` blocks or an error, never a partial result.
    pub fn decode(
        &self,
        mode: CodingMode,
        blocks: &[Option<Block>],
        original_count: usize,
    ) -> Result<Vec<Block>, ErasureCodingError> {
        match mode {
            CodingMode::ReedSolomon(_) => reed_solomon::decode(blocks, original_count),
            CodingMode::RaptorQ => self.raptorq().decode(blocks, original_count),
        }
    }

    /// [`Self::encode_auto`] packaged with metadata.
    pub fn encode_block_set(
        &self,
        data: &[Block],
        redundancy: f64,
        loss_rate: f64,
    ) -> EncodedBlockSet {
        let block_len = data.iter().map(Vec::len).max().unwrap_or(0);
        let (mode, blocks) = self.encode_auto(data, redundancy, loss_rate);
        EncodedBlockSet {
            meta: BlockSetMetadata {
                mode,
                original_count: data.len(),
                total_count: blocks.len(),
                block_len,
            },
            blocks,
        }
    }

    /// Decode a sparse block set against its metadata, restoring exact
    /// source block lengths.
    pub fn decode_block_set(
        &self,
        meta: &BlockSetMetadata,
        blocks: &[Option<Block>],
    ) -> Result<Vec<Block>, ErasureCodingError> {
        let mut out = self.decode(meta.mode, blocks, meta.original_count)?;
        for block in &mut out {
            block.truncate(meta.block_len);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gf::FieldKind;
    use std::sync::Arc;

    fn sample_blocks(k: usize, len: usize) -> Vec<Block> {
        (0..k)
            .map(|i| (0..len).map(|j| ((i * 31 + j * 7 + 3) % 256) as u8).collect())
            .collect()
    }

    fn with_erasures(encoded: &[Block], erase: &[usize]) -> Vec<Option<Block>> {
        encoded
            .iter()
            .enumerate()
            .map(|(i, b)| (!erase.contains(&i)).then(|| b.clone()))
            .collect()
    }

    #[test]
    fn auto_encode_low_loss_uses_reed_solomon() {
        let engine = ErasureCodingEngine::new();
        let data = sample_blocks(8, 64);
        let (mode, encoded) = engine.encode_auto(&data, 0.5, 0.01);
        assert_eq!(mode, CodingMode::ReedSolomon(FieldKind::Gf256));
        assert_eq!(&encoded[..8], &data[..]);

        let decoded = engine
            .decode(mode, &with_erasures(&encoded, &[1, 6]), 8)
            .expect("decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn auto_encode_high_loss_uses_raptorq() {
        let engine = ErasureCodingEngine::new();
        let data = sample_blocks(8, 64);
        let (mode, encoded) = engine.encode_auto(&data, 0.5, 0.2);
        assert_eq!(mode, CodingMode::RaptorQ);
        assert_eq!(&encoded[..8], &data[..]);

        let decoded = engine
            .decode(mode, &with_erasures(&encoded, &[2]), 8)
            .expect("decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn empty_input_encodes_to_empty() {
        let engine = ErasureCodingEngine::new();
        assert!(engine.encode_reed_solomon(&[], 0.1).is_empty());
        assert!(engine.encode_raptorq(&[], 0.1).is_empty());
        let (_, encoded) = engine.encode_auto(&[], 0.1, 0.5);
        assert!(encoded.is_empty());
    }

    #[test]
    fn explicit_entry_points_agree_with_modules() {
        let engine = ErasureCodingEngine::new();
        let data = sample_blocks(5, 16);
        assert_eq!(
            engine.encode_reed_solomon(&data, 0.4),
            crate::reed_solomon::encode(&data, 0.4)
        );
        assert_eq!(
            engine.encode_raptorq(&data, 0.4),
            crate::raptorq::RaptorQCodec::new().encode(&data, 0.4)
        );
    }

    #[test]
    fn shared_engine_across_threads() {
        let engine = Arc::new(ErasureCodingEngine::new());
        let data = sample_blocks(6, 32);
        let expected = engine.encode_raptorq(&data, 0.5);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                let data = data.clone();
                let expected = expected.clone();
                std::thread::spawn(move || {
                    let encoded = engine.encode_raptorq(&data, 0.5);
                    assert_eq!(encoded, expected);
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread");
        }
    }

    #[test]
    fn block_set_round_trip_restores_lengths() {
        let engine = ErasureCodingEngine::new();
        // Wide field with odd block length: parity is word-aligned but the
        // metadata restores the exact source length.
        let data: Vec<Block> = (0u32..300)
            .map(|i| vec![i as u8, (i >> 8) as u8, (i % 5) as u8])
            .collect();
        let set = engine.encode_block_set(&data, 0.02, 0.0);
        assert_eq!(set.meta.mode, CodingMode::ReedSolomon(FieldKind::Gf65536));
        assert_eq!(set.meta.original_count, 300);
        assert_eq!(set.meta.block_len, 3);

        let sparse = with_erasures(&set.blocks, &[0, 123]);
        let decoded = engine.decode_block_set(&set.meta, &sparse).expect("decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn metadata_serde_round_trip() {
        let meta = BlockSetMetadata {
            mode: CodingMode::RaptorQ,
            original_count: 42,
            total_count: 50,
            block_len: 4096,
        };
        let json = serde_json::to_string(&meta).expect("serialize");
        let back: BlockSetMetadata = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, meta);
    }
}
