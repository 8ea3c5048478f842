//! Rateless RaptorQ-style fountain coding with LDPC/HDPC precoding and
//! inactivation decoding.
//!
//! Encoding builds `L = k + S + H` intermediate symbols: the `k` source
//! blocks, `S` sparse LDPC parity symbols (XOR of a small pseudo-random
//! subset of the sources), and `H` dense HDPC parity symbols (GF(256)
//! combinations over sources and LDPC symbols). Repair symbols are GF(256)
//! combinations of intermediate symbols chosen by a degree distribution
//! keyed deterministically by `(k, symbol id)` — repeated encodes of the
//! same input are byte-identical, and the decoder regenerates every
//! coefficient from indices alone.
//!
//! Decoding runs in two phases: peeling (belief propagation over degree-1
//! equations, cheap thanks to LDPC sparsity) followed by inactivation —
//! the columns peeling could not resolve are deferred into a small dense
//! subsystem solved by ordinary Gaussian elimination, whose solutions then
//! back-substitute into the sparse phase.
//!
//! The precode parameters and the repair generator below are frozen:
//! changing them breaks decoding of previously encoded block sets.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::error::ErasureCodingError;
use crate::gf::{xor_slice, GaloisField, Gf256};
use crate::Block;

/// Seed-mixing constant for per-symbol generators (splitmix64 increment).
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;
/// Domain tags keeping LDPC, HDPC, and repair streams independent.
const LDPC_TAG: u64 = 0x1D9C;
const HDPC_TAG: u64 = 0x4D9C;
const REPAIR_TAG: u64 = 0x7E9A;

/// Precoding parameters derived from the source block count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecodeParams {
    /// Source block count.
    pub k: usize,
    /// Sparse LDPC constraint rows.
    pub s: usize,
    /// Dense HDPC constraint rows.
    pub h: usize,
    /// Intermediate symbol count: `k + s + h`.
    pub l: usize,
}

impl PrecodeParams {
    /// Parameters for `k` source blocks.
    pub fn for_block_count(k: usize) -> Self {
        let s = ((k + 49) / 50).max(2);
        let h = ((k + 1).next_power_of_two().trailing_zeros() as usize).max(3);
        Self { k, s, h, l: k + s + h }
    }
}

/// Repair symbols for `k` blocks at the given redundancy: none for
/// non-positive redundancy, otherwise at least one.
pub fn repair_count(k: usize, redundancy: f64) -> usize {
    if k == 0 || !(redundancy > 0.0) {
        return 0;
    }
    (((k as f64) * redundancy).ceil() as usize).max(1)
}

fn stream_rng(tag: u64, k: usize, index: usize) -> StdRng {
    let seed = (k as u64)
        .wrapping_mul(SEED_MIX)
        .wrapping_add(tag)
        .wrapping_mul(SEED_MIX)
        .wrapping_add(index as u64);
    StdRng::seed_from_u64(seed)
}

/// Source columns feeding LDPC parity row `row`.
///
/// Sparse by construction: roughly 1% of the source columns with a floor of
/// three, matching the density the peeling phase is tuned for.
fn ldpc_columns(k: usize, row: usize) -> Vec<usize> {
    let degree = (k / 100).max(3).min(k);
    let mut rng = stream_rng(LDPC_TAG, k, row);
    let mut cols: Vec<usize> = (0..k).collect();
    cols.shuffle(&mut rng);
    cols.truncate(degree);
    cols.sort_unstable();
    cols
}

/// Dense GF(256) coefficients of HDPC parity row `row` over the first
/// `k + s` intermediate symbols.
fn hdpc_coefficients(params: PrecodeParams, row: usize) -> Vec<Gf256> {
    let mut rng = stream_rng(HDPC_TAG, params.k, row);
    (0..params.k + params.s)
        .map(|_| Gf256::new(rng.gen_range(1..=255)))
        .collect()
}

/// A sparse GF(256) equation over the intermediate symbols.
///
/// Terms are `(column, coefficient)` pairs kept sorted by column; duplicate
/// columns merge by field addition and zero coefficients drop out.
struct Equation {
    terms: Vec<(usize, Gf256)>,
    used: bool,
}

impl Equation {
    fn new(mut terms: Vec<(usize, Gf256)>) -> Self {
        terms.sort_by_key(|(col, _)| *col);
        let mut merged: Vec<(usize, Gf256)> = Vec::with_capacity(terms.len());
        for (col, coef) in terms {
            if let Some((last_col, last_coef)) = merged.last_mut() {
                if *last_col == col {
                    *last_coef = last_coef.add(coef);
                    continue;
                }
            }
            merged.push((col, coef));
        }
        merged.retain(|(_, coef)| !coef.is_zero());
        Self {
            terms: merged,
            used: false,
        }
    }

    fn degree(&self) -> usize {
        self.terms.len()
    }

    fn coef(&self, col: usize) -> Gf256 {
        self.terms
            .binary_search_by_key(&col, |(c, _)| *c)
            .map(|idx| self.terms[idx].1)
            .unwrap_or(Gf256::ZERO)
    }

    fn remove(&mut self, col: usize) {
        if let Ok(idx) = self.terms.binary_search_by_key(&col, |(c, _)| *c) {
            self.terms.remove(idx);
        }
    }
}

/// The RaptorQ sub-engine: precomputed degree distribution plus the
/// deterministic symbol generators. Stateless per call and freely shared
/// once constructed.
pub struct RaptorQCodec {
    /// Cumulative degree distribution for sparse repair symbols:
    /// `(cumulative probability, degree)`.
    degree_cdf: Vec<(f64, usize)>,
}

impl Default for RaptorQCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl RaptorQCodec {
    pub fn new() -> Self {
        // Soliton-flavoured small degrees; every other repair symbol is a
        // dense row instead (see `repair_equation`), which is what keeps the
        // decode success probability high at small overhead margins.
        let degree_cdf = vec![(0.4, 2), (0.7, 3), (0.85, 4), (1.0, 8)];
        Self { degree_cdf }
    }

    /// Encode `data` into the systematic block set `data ++ repairs`.
    ///
    /// Never fails; non-positive redundancy yields the source blocks
    /// unchanged and empty input yields empty output.
    pub fn encode(&self, data: &[Block], redundancy: f64) -> Vec<Block> {
        let k = data.len();
        if k == 0 {
            return Vec::new();
        }
        let repairs = repair_count(k, redundancy);
        if repairs == 0 {
            return data.to_vec();
        }

        let params = PrecodeParams::for_block_count(k);
        let width = data.iter().map(Vec::len).max().unwrap_or(0);
        let intermediates = build_intermediates(params, data, width);

        let mut out = data.to_vec();
        for j in 0..repairs {
            let esi = k + j;
            let mut symbol = vec![0u8; width];
            for (col, coef) in self.repair_equation(params, esi) {
                Gf256::addmul_slice(&mut symbol, &intermediates[col], coef);
            }
            out.push(symbol);
        }
        trace!(k, repairs, s = params.s, h = params.h, "raptorq encode");
        out
    }

    /// Reconstruct the `original_count` source blocks from a sparse block
    /// set (`None` marks an erasure). All-or-nothing.
    pub fn decode(
        &self,
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
        if blocks[..k].iter().all(Option::is_some) {
            return Ok(blocks[..k]
                .iter()
                .map(|b| b.clone().expect("slot checked present"))
                .collect());
        }

        let params = PrecodeParams::for_block_count(k);
        let width = blocks.iter().flatten().map(Vec::len).max().unwrap_or(0);

        let pad = |block: &Block| -> Vec<u8> {
            let mut buf = vec![0u8; width];
            buf[..block.len()].copy_from_slice(block);
            buf
        };

        // Zero-RHS precode constraints plus one equation per present symbol.
        let mut equations: Vec<Equation> = Vec::with_capacity(params.s + params.h + present);
        let mut rhs: Vec<Vec<u8>> = Vec::with_capacity(params.s + params.h + present);

        for row in 0..params.s {
            let mut terms: Vec<(usize, Gf256)> = ldpc_columns(k, row)
                .into_iter()
                .map(|col| (col, Gf256::ONE))
                .collect();
            terms.push((k + row, Gf256::ONE));
            equations.push(Equation::new(terms));
            rhs.push(vec![0u8; width]);
        }
        for row in 0..params.h {
            let mut terms: Vec<(usize, Gf256)> = hdpc_coefficients(params, row)
                .into_iter()
                .enumerate()
                .collect();
            terms.push((params.k + params.s + row, Gf256::ONE));
            equations.push(Equation::new(terms));
            rhs.push(vec![0u8; width]);
        }
        for (idx, block) in blocks.iter().enumerate() {
            let Some(block) = block else { continue };
            let terms = if idx < k {
                vec![(idx, Gf256::ONE)]
            } else {
                self.repair_equation(params, idx)
            };
            equations.push(Equation::new(terms));
            rhs.push(pad(block));
        }

        let mut solved: Vec<Option<Vec<u8>>> = vec![None; params.l];
        let peeled = peel(&mut equations, &mut rhs, &mut solved);
        let inactivated = solved.iter().filter(|entry| entry.is_none()).count();
        if inactivated > 0 {
            solve_inactivated(&equations, &rhs, &mut solved, width)?;
        }
        debug!(k, peeled, inactivated, "raptorq decode phases complete");

        let out = (0..k)
            .map(|i| match &blocks[i] {
                Some(block) => Ok(block.clone()),
                None => solved[i]
                    .clone()
                    .ok_or(ErasureCodingError::DecodingFailed),
            })
            .collect::<Result<Vec<Block>, _>>()?;
        Ok(out)
    }

    /// The combination defining repair symbol `esi`, regenerated from
    /// `(k, esi)` alone.
    ///
    /// Odd-indexed repair symbols draw a small degree from the soliton
    /// table; even-indexed ones are dense rows over every intermediate
    /// symbol, the HDPC-style backstop that lets the inactivation phase
    /// finish from a thin overhead margin.
    fn repair_equation(&self, params: PrecodeParams, esi: usize) -> Vec<(usize, Gf256)> {
        let mut rng = stream_rng(REPAIR_TAG, params.k, esi);
        let repair_index = esi - params.k;

        if repair_index % 2 == 0 {
            return (0..params.l)
                .map(|col| (col, Gf256::new(rng.gen_range(1..=255))))
                .collect();
        }

        let roll: f64 = rng.gen();
        let degree = self
            .degree_cdf
            .iter()
            .find(|(cum, _)| roll < *cum)
            .map(|(_, degree)| *degree)
            .unwrap_or(8)
            .min(params.l);
        let mut cols: Vec<usize> = (0..params.l).collect();
        cols.shuffle(&mut rng);
        cols.truncate(degree);
        cols.sort_unstable();
        cols.into_iter()
            .map(|col| (col, Gf256::new(rng.gen_range(1..=255))))
            .collect()
    }
}

/// Build the `L` intermediate symbols from padded source blocks.
fn build_intermediates(params: PrecodeParams, data: &[Block], width: usize) -> Vec<Vec<u8>> {
    let mut intermediates: Vec<Vec<u8>> = Vec::with_capacity(params.l);
    for block in data {
        let mut buf = vec![0u8; width];
        buf[..block.len()].copy_from_slice(block);
        intermediates.push(buf);
    }
    for row in 0..params.s {
        let mut parity = vec![0u8; width];
        for col in ldpc_columns(params.k, row) {
            xor_slice(&mut parity, &intermediates[col]);
        }
        intermediates.push(parity);
    }
    for row in 0..params.h {
        let mut parity = vec![0u8; width];
        for (col, coef) in hdpc_coefficients(params, row).into_iter().enumerate() {
            Gf256::addmul_slice(&mut parity, &intermediates[col], coef);
        }
        intermediates.push(parity);
    }
    intermediates
}

/// Phase one: solve degree-1 equations and propagate until none remain.
/// Returns the number of columns resolved this way.
fn peel(
    equations: &mut [Equation],
    rhs: &mut [Vec<u8>],
    solved: &mut [Option<Vec<u8>>],
) -> usize {
    let mut peeled = 0usize;
    loop {
        let next = equations.iter().enumerate().find_map(|(idx, eq)| {
            if eq.used || eq.degree() != 1 {
                return None;
            }
            let col = eq.terms[0].0;
            solved[col].is_none().then_some(idx)
        });
        let Some(eq_idx) = next else {
            return peeled;
        };

        let (col, coef) = equations[eq_idx].terms[0];
        equations[eq_idx].used = true;

        let mut solution = std::mem::take(&mut rhs[eq_idx]);
        if coef != Gf256::ONE {
            let inv = coef.inv().expect("nonzero equation coefficient");
            Gf256::mul_slice(&mut solution, inv);
        }

        for (idx, eq) in equations.iter_mut().enumerate() {
            if eq.used {
                continue;
            }
            let eq_coef = eq.coef(col);
            if eq_coef.is_zero() {
                continue;
            }
            Gf256::addmul_slice(&mut rhs[idx], &solution, eq_coef);
            eq.remove(col);
        }

        solved[col] = Some(solution);
        peeled += 1;
    }
}

/// Phase two: the columns peeling left behind become a dense subsystem over
/// the still-unused equations, solved by Gaussian elimination with full
/// back-substitution.
fn solve_inactivated(
    equations: &[Equation],
    rhs: &[Vec<u8>],
    solved: &mut [Option<Vec<u8>>],
    width: usize,
) -> Result<(), ErasureCodingError> {
    let cols: Vec<usize> = (0..solved.len()).filter(|&c| solved[c].is_none()).collect();
    let col_index = |col: usize| cols.binary_search(&col).ok();

    let rows: Vec<usize> = equations
        .iter()
        .enumerate()
        .filter_map(|(idx, eq)| (!eq.used && eq.degree() > 0).then_some(idx))
        .collect();
    let n_rows = rows.len();
    let n_cols = cols.len();
    if n_rows < n_cols {
        return Err(ErasureCodingError::DecodingFailed);
    }

    let mut a: Vec<Vec<Gf256>> = vec![vec![Gf256::ZERO; n_cols]; n_rows];
    let mut b: Vec<Vec<u8>> = Vec::with_capacity(n_rows);
    for (row, &eq_idx) in rows.iter().enumerate() {
        for &(col, coef) in &equations[eq_idx].terms {
            if let Some(dense_col) = col_index(col) {
                a[row][dense_col] = coef;
            }
        }
        b.push(rhs[eq_idx].clone());
    }

    let mut pivot_of: Vec<usize> = vec![usize::MAX; n_cols];
    for col in 0..n_cols {
        let pivot = (0..n_rows)
            .find(|&row| !pivot_of.contains(&row) && !a[row][col].is_zero())
            .ok_or(ErasureCodingError::DecodingFailed)?;
        pivot_of[col] = pivot;

        let inv = a[pivot][col]
            .inv()
            .ok_or(ErasureCodingError::DecodingFailed)?;
        for value in &mut a[pivot] {
            *value = value.mul(inv);
        }
        Gf256::mul_slice(&mut b[pivot], inv);

        let pivot_coeffs = a[pivot].clone();
        let pivot_rhs = b[pivot].clone();
        for row in 0..n_rows {
            if row == pivot {
                continue;
            }
            let factor = a[row][col];
            if factor.is_zero() {
                continue;
            }
            for c in 0..n_cols {
                a[row][c] = a[row][c].add(factor.mul(pivot_coeffs[c]));
            }
            Gf256::addmul_slice(&mut b[row], &pivot_rhs, factor);
        }
    }

    for (dense_col, &col) in cols.iter().enumerate() {
        let row = pivot_of[dense_col];
        solved[col] = Some(if row < n_rows {
            std::mem::take(&mut b[row])
        } else {
            vec![0u8; width]
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> RaptorQCodec {
        RaptorQCodec::new()
    }

    fn sample_blocks(k: usize, len: usize) -> Vec<Block> {
        (0..k)
            .map(|i| (0..len).map(|j| ((i * 37 + j * 13 + 7) % 256) as u8).collect())
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
    fn repair_count_formula() {
        assert_eq!(repair_count(10, 0.0), 0);
        assert_eq!(repair_count(10, -0.5), 0);
        assert_eq!(repair_count(10, f64::NAN), 0);
        assert_eq!(repair_count(1, 0.01), 1);
        assert_eq!(repair_count(100, 0.02), 2);
        assert_eq!(repair_count(150, 0.02), 3);
    }

    #[test]
    fn encode_is_systematic_and_deterministic() {
        let data = sample_blocks(12, 48);
        let encoded = codec().encode(&data, 0.5);
        assert_eq!(encoded.len(), 18);
        assert_eq!(&encoded[..12], &data[..]);
        assert_eq!(encoded, codec().encode(&data, 0.5));
    }

    #[test]
    fn no_erasure_fast_path() {
        let data = sample_blocks(8, 16);
        let encoded = codec().encode(&data, 0.25);
        let decoded = codec()
            .decode(&with_erasures(&encoded, &[]), 8)
            .expect("decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn recovers_erased_sources() {
        let data = sample_blocks(10, 32);
        let encoded = codec().encode(&data, 0.5);
        assert_eq!(encoded.len(), 15);

        let decoded = codec()
            .decode(&with_erasures(&encoded, &[2, 7]), 10)
            .expect("decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn recovers_with_mixed_source_and_repair_loss() {
        let data = sample_blocks(20, 24);
        let encoded = codec().encode(&data, 0.3);
        assert_eq!(encoded.len(), 26);

        // Lose one source block and half the repair stream.
        let decoded = codec()
            .decode(&with_erasures(&encoded, &[3, 21, 23, 25]), 20)
            .expect("decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn insufficient_blocks_detected() {
        let data = sample_blocks(6, 8);
        let encoded = codec().encode(&data, 0.0);
        assert_eq!(encoded.len(), 6);
        let err = codec()
            .decode(&with_erasures(&encoded, &[1]), 6)
            .unwrap_err();
        assert_eq!(err, ErasureCodingError::InsufficientBlocks);
    }

    #[test]
    fn all_nil_raises_decoding_failed() {
        let blocks: Vec<Option<Block>> = vec![None; 4];
        let err = codec().decode(&blocks, 2).unwrap_err();
        assert_eq!(err, ErasureCodingError::DecodingFailed);
    }

    #[test]
    fn empty_input_round_trip() {
        assert!(codec().encode(&[], 0.4).is_empty());
        assert!(codec().decode(&[], 0).expect("decode").is_empty());
    }

    #[test]
    fn zero_length_blocks_propagate() {
        let data: Vec<Block> = vec![Vec::new(); 3];
        let encoded = codec().encode(&data, 2.0);
        assert_eq!(encoded.len(), 9);
        assert!(encoded.iter().all(Vec::is_empty));

        let decoded = codec()
            .decode(&with_erasures(&encoded, &[0]), 3)
            .expect("decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn precode_params_scale_with_k() {
        let small = PrecodeParams::for_block_count(10);
        assert_eq!(small.s, 2);
        assert!(small.h >= 3);
        assert_eq!(small.l, 10 + small.s + small.h);

        let large = PrecodeParams::for_block_count(500);
        assert_eq!(large.s, 10);
        assert_eq!(large.l, 500 + large.s + large.h);
    }

    #[test]
    fn overhead_tracks_requested_ratio() {
        let data = sample_blocks(100, 4);
        let encoded = codec().encode(&data, 0.02);
        assert_eq!(encoded.len(), 102);
    }

    #[test]
    fn repair_equations_are_reproducible() {
        let params = PrecodeParams::for_block_count(16);
        let c = codec();
        assert_eq!(c.repair_equation(params, 20), c.repair_equation(params, 20));
        assert_ne!(c.repair_equation(params, 20), c.repair_equation(params, 21));
    }
}
