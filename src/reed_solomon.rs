//! Systematic Reed–Solomon erasure coding over GF(256) or GF(65536).
//!
//! Parity blocks are generated from a deterministic Cauchy coefficient
//! matrix: entry `(i, j)` is `1 / (element(i) + element(k + j))`, a pure
//! function of `(k, parity_count, field)`. Every square submatrix of a
//! Cauchy matrix is invertible, so any combination of `k` surviving blocks
//! (source and/or parity) reconstructs the original data — the MDS
//! guarantee. Decoding inverts only the submatrix covering the erased
//! positions.
//!
//! The field is implied by the block counts: GF(256) while `k + parity`
//! fits its element space, GF(65536) otherwise. Encoder and decoder derive
//! the field and the matrix from the counts alone, so nothing about the
//! code needs to travel with the blocks.

use tracing::{debug, warn};

use crate::error::ErasureCodingError;
use crate::gf::{FieldKind, GaloisField, Gf256, Gf65536};
use crate::Block;

/// Number of parity blocks for `k` data blocks at the given redundancy.
///
/// Negative or NaN redundancy counts as zero. Any positive redundancy
/// yields at least one parity block, even for a single data block.
pub fn parity_count(k: usize, redundancy: f64) -> usize {
    if k == 0 || !(redundancy > 0.0) {
        return 0;
    }
    ((k as f64) * redundancy).ceil() as usize
}

/// Field implied by the total element demand of a `(k, parity)` code.
///
/// The Cauchy construction needs `k + parity` distinct field elements, so a
/// heavily redundant code can outgrow GF(256) even when `k <= 255`. Both
/// sides derive this from the counts, keeping encode and decode in
/// agreement without any side channel.
pub(crate) fn field_for(k: usize, parity: usize) -> FieldKind {
    if k <= 255 && k + parity <= Gf256::ORDER {
        FieldKind::Gf256
    } else {
        FieldKind::Gf65536
    }
}

/// Cauchy matrix entry for data block `i` and parity block `j`.
fn cauchy_coeff<F: GaloisField>(k: usize, i: usize, j: usize) -> F {
    F::element(i)
        .add(F::element(k + j))
        .inv()
        .expect("cauchy points are distinct")
}

/// Encode `data` into a systematic block set: the input blocks followed by
/// `parity_count(k, redundancy)` parity blocks.
///
/// Never fails: malformed redundancy clamps to zero, empty input yields
/// empty output, and blocks of unequal length are zero-extended to the
/// longest for parity purposes (the systematic outputs stay byte-identical
/// to the inputs). In the GF(65536) field parity blocks are emitted at
/// 16-bit word-aligned length.
pub fn encode(data: &[Block], redundancy: f64) -> Vec<Block> {
    let k = data.len();
    if k == 0 {
        return Vec::new();
    }
    let mut parity = parity_count(k, redundancy);
    match field_for(k, parity) {
        FieldKind::Gf256 => encode_in::<Gf256>(data, parity),
        FieldKind::Gf65536 => {
            if k + parity > Gf65536::ORDER {
                // Beyond the largest field there is no code to construct;
                // cap parity at the addressable remainder.
                let capped = Gf65536::ORDER.saturating_sub(k);
                warn!(k, requested = parity, capped, "parity capped to GF(65536) element space");
                parity = capped;
            }
            encode_in::<Gf65536>(data, parity)
        }
    }
}

fn encode_in<F: GaloisField>(data: &[Block], parity: usize) -> Vec<Block> {
    let k = data.len();
    let block_len = data.iter().map(Vec::len).max().unwrap_or(0);
    let width = F::aligned_len(block_len);

    let mut parity_blocks = vec![vec![0u8; width]; parity];
    let mut padded = vec![0u8; width];
    for (i, block) in data.iter().enumerate() {
        let src: &[u8] = if block.len() == width {
            block
        } else {
            padded[..block.len()].copy_from_slice(block);
            padded[block.len()..].fill(0);
            &padded
        };
        for (j, par) in parity_blocks.iter_mut().enumerate() {
            F::addmul_slice(par, src, cauchy_coeff::<F>(k, i, j));
        }
    }

    let mut out = data.to_vec();
    out.extend(parity_blocks);
    out
}

/// Reconstruct the original `original_count` blocks from a sparse block set
/// (`None` marks an erasure).
///
/// All-or-nothing: returns exactly `original_count` blocks or an error.
/// Succeeds for every erasure pattern of at most `parity_count` blocks.
pub fn decode(
    blocks: &[Option<Block>],
    original_count: usize,
) -> Result<Vec<Block>, ErasureCodingError> {
    let k = original_count;
    if k == 0 {
        return Ok(Vec::new());
    }
    if blocks.iter().all(Option::is_none) {
        return Err(ErasureCodingError::DecodingFailed);
    }
    let present = blocks.iter().filter(|b| b.is_some()).count();
    if k > blocks.len() || present < k {
        return Err(ErasureCodingError::InsufficientBlocks);
    }
    // Fast path: every systematic slot survived.
    if blocks[..k].iter().all(Option::is_some) {
        return Ok(blocks[..k]
            .iter()
            .map(|b| b.clone().expect("slot checked present"))
            .collect());
    }
    let parity = blocks.len() - k;
    match field_for(k, parity) {
        FieldKind::Gf256 => decode_in::<Gf256>(blocks, k),
        FieldKind::Gf65536 => decode_in::<Gf65536>(blocks, k),
    }
}

fn decode_in<F: GaloisField>(
    blocks: &[Option<Block>],
    k: usize,
) -> Result<Vec<Block>, ErasureCodingError> {
    let erased: Vec<usize> = (0..k).filter(|&i| blocks[i].is_none()).collect();
    let e = erased.len();

    // One surviving parity row per erased source block.
    let rows: Vec<usize> = (k..blocks.len())
        .filter(|&idx| blocks[idx].is_some())
        .take(e)
        .collect();
    if rows.len() < e {
        return Err(ErasureCodingError::DecodingFailed);
    }

    let source_len = blocks[..k]
        .iter()
        .flatten()
        .map(Vec::len)
        .max();
    let widest = blocks
        .iter()
        .flatten()
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    let out_len = source_len.unwrap_or(widest);
    let width = F::aligned_len(widest.max(out_len));

    let pad = |block: &Block| -> Vec<u8> {
        let mut buf = vec![0u8; width];
        buf[..block.len()].copy_from_slice(block);
        buf
    };

    // Syndromes: each chosen parity row minus the contribution of every
    // surviving source block, leaving a system over the erased ones only.
    let mut rhs: Vec<Vec<u8>> = rows
        .iter()
        .map(|&idx| pad(blocks[idx].as_ref().expect("row checked present")))
        .collect();
    for i in (0..k).filter(|&i| blocks[i].is_some()) {
        let src = pad(blocks[i].as_ref().expect("slot checked present"));
        for (r, &row_idx) in rows.iter().enumerate() {
            F::addmul_slice(&mut rhs[r], &src, cauchy_coeff::<F>(k, i, row_idx - k));
        }
    }

    // e x e Cauchy submatrix: rows are the chosen parity blocks, columns the
    // erased source positions.
    let mut m: Vec<Vec<F>> = rows
        .iter()
        .map(|&row_idx| {
            erased
                .iter()
                .map(|&i| cauchy_coeff::<F>(k, i, row_idx - k))
                .collect()
        })
        .collect();

    // Gauss-Jordan elimination over the field. The Cauchy structure makes
    // the submatrix invertible, so a missing pivot means malformed input.
    for col in 0..e {
        let pivot = (col..e)
            .find(|&r| m[r][col] != F::ZERO)
            .ok_or(ErasureCodingError::DecodingFailed)?;
        m.swap(col, pivot);
        rhs.swap(col, pivot);

        let inv = m[col][col]
            .inv()
            .ok_or(ErasureCodingError::DecodingFailed)?;
        for c in 0..e {
            m[col][c] = m[col][c].mul(inv);
        }
        F::mul_slice(&mut rhs[col], inv);

        let pivot_row: Vec<F> = m[col].clone();
        for r in 0..e {
            if r == col {
                continue;
            }
            let factor = m[r][col];
            if factor == F::ZERO {
                continue;
            }
            for c in 0..e {
                m[r][c] = m[r][c].add(factor.mul(pivot_row[c]));
            }
            let (head, tail) = rhs.split_at_mut(r.max(col));
            let (pivot_rhs, target) = if r > col {
                (&head[col], &mut tail[0])
            } else {
                (&tail[0], &mut head[r])
            };
            F::addmul_slice(target, pivot_rhs, factor);
        }
    }

    debug!(k, erased = e, "reed-solomon erasures recovered");

    let mut recovered = rhs.into_iter();
    let out = (0..k)
        .map(|i| match &blocks[i] {
            Some(block) => block.clone(),
            None => {
                let mut block = recovered.next().expect("one syndrome per erasure");
                block.truncate(out_len);
                block
            }
        })
        .collect();
    Ok(out)
}
