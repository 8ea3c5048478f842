//! Finite-field arithmetic over GF(256) and GF(65536).
//!
//! Both fields use precomputed log/antilog tables built once from a fixed
//! primitive polynomial: `x^8 + x^4 + x^3 + x^2 + 1` (0x11D) for GF(256) and
//! `x^16 + x^12 + x^3 + x + 1` (0x1100B) for GF(65536). Addition is XOR;
//! multiplication, division, and inversion are table lookups.
//!
//! The GF(256) tables are `const`-built at compile time. The GF(65536)
//! tables (256 KiB) are built lazily behind a [`OnceLock`] on first use and
//! are read-only afterwards, so both fields are freely shared across
//! concurrent coding operations without locking.

use std::fmt;
use std::sync::OnceLock;

/// Reduction mask of the GF(256) primitive polynomial 0x11D.
const GF256_POLY: u16 = 0x1D;

/// GF(65536) primitive polynomial `x^16 + x^12 + x^3 + x + 1`.
const GF65536_POLY: u32 = 0x1100B;

const GF65536_LIMIT: usize = 65535;

/// Which Galois field a coding operation runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FieldKind {
    /// GF(2^8): one byte per field element, up to 255 data blocks.
    Gf256,
    /// GF(2^16): one little-endian 16-bit word per element, up to 65535 blocks.
    Gf65536,
}

/// Field operations needed by the Reed–Solomon coder, implemented by the
/// element types of both supported fields.
///
/// `element(i)` yields distinct elements for `i < ORDER`, which is what the
/// deterministic Cauchy parity matrix is built from. Slice kernels interpret
/// byte buffers as streams of field elements (`WORD_BYTES` bytes each).
pub trait GaloisField: Copy + Eq + fmt::Debug + 'static {
    const ZERO: Self;
    const ONE: Self;
    /// Number of elements in the field.
    const ORDER: usize;
    /// Bytes per element in a block buffer.
    const WORD_BYTES: usize;

    /// The `index`-th field element; distinct for `index < ORDER`.
    fn element(index: usize) -> Self;

    /// Field addition (XOR in characteristic 2).
    fn add(self, rhs: Self) -> Self;

    /// Field multiplication via the log/antilog tables.
    fn mul(self, rhs: Self) -> Self;

    /// Multiplicative inverse; `None` for the zero element.
    fn inv(self) -> Option<Self>;

    /// Field division; `None` when dividing by zero.
    fn div(self, rhs: Self) -> Option<Self> {
        rhs.inv().map(|r| self.mul(r))
    }

    /// Round `len` up to a whole number of field elements.
    fn aligned_len(len: usize) -> usize {
        (len + Self::WORD_BYTES - 1) / Self::WORD_BYTES * Self::WORD_BYTES
    }

    /// `dst[i] = c * dst[i]` element-wise across the buffer.
    fn mul_slice(dst: &mut [u8], c: Self);

    /// `dst[i] ^= c * src[i]` element-wise across the buffers.
    fn addmul_slice(dst: &mut [u8], src: &[u8], c: Self);
}

// ============================================================================
// GF(256)
// ============================================================================

/// Log table for GF(256): `GF256_LOG[a]` is the discrete log of `a` base 2.
/// Entry 0 is unused (log of zero is undefined).
static GF256_LOG: [u8; 256] = build_gf256_log();

/// Antilog table, mirrored to 512 entries so `EXP[la + lb]` needs no
/// modular reduction for `la, lb < 255`.
static GF256_EXP: [u8; 512] = build_gf256_exp();

const fn build_gf256_exp() -> [u8; 512] {
    let mut table = [0u8; 512];
    let mut val: u16 = 1;
    let mut i = 0usize;
    while i < 255 {
        table[i] = val as u8;
        table[i + 255] = val as u8;
        val <<= 1;
        if val & 0x100 != 0 {
            val ^= 0x100 | GF256_POLY;
        }
        i += 1;
    }
    table[255] = 1;
    table[510] = 1;
    table
}

const fn build_gf256_log() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut val: u16 = 1;
    let mut i = 0u8;
    loop {
        table[val as usize] = i;
        val <<= 1;
        if val & 0x100 != 0 {
            val ^= 0x100 | GF256_POLY;
        }
        if i == 254 {
            break;
        }
        i += 1;
    }
    table
}

/// An element of GF(256).
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Gf256(pub u8);

impl fmt::Debug for Gf256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gf256({})", self.0)
    }
}

impl Gf256 {
    #[inline]
    pub const fn new(val: u8) -> Self {
        Self(val)
    }

    #[inline]
    pub const fn raw(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl GaloisField for Gf256 {
    const ZERO: Self = Self(0);
    const ONE: Self = Self(1);
    const ORDER: usize = 256;
    const WORD_BYTES: usize = 1;

    #[inline]
    fn element(index: usize) -> Self {
        Self(index as u8)
    }

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        if self.0 == 0 || rhs.0 == 0 {
            return Self::ZERO;
        }
        let log_sum = GF256_LOG[self.0 as usize] as usize + GF256_LOG[rhs.0 as usize] as usize;
        Self(GF256_EXP[log_sum])
    }

    #[inline]
    fn inv(self) -> Option<Self> {
        if self.0 == 0 {
            return None;
        }
        Some(Self(GF256_EXP[255 - GF256_LOG[self.0 as usize] as usize]))
    }

    fn mul_slice(dst: &mut [u8], c: Self) {
        if c.is_zero() {
            dst.fill(0);
            return;
        }
        if c == Self::ONE {
            return;
        }
        let table = build_product_table(c);
        for d in dst.iter_mut() {
            *d = table[*d as usize];
        }
    }

    fn addmul_slice(dst: &mut [u8], src: &[u8], c: Self) {
        debug_assert_eq!(dst.len(), src.len(), "slice length mismatch");
        if c.is_zero() {
            return;
        }
        if c == Self::ONE {
            xor_slice(dst, src);
            return;
        }
        let table = build_product_table(c);
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d ^= table[*s as usize];
        }
    }
}

/// 256-entry product table for a fixed nonzero scalar: `table[x] = x * c`.
///
/// One table build replaces a branch plus two lookups per byte in the
/// multiply kernels.
fn build_product_table(c: Gf256) -> [u8; 256] {
    let log_c = GF256_LOG[c.0 as usize] as usize;
    let mut table = [0u8; 256];
    for x in 1usize..=255 {
        table[x] = GF256_EXP[GF256_LOG[x] as usize + log_c];
    }
    table
}

/// XOR `src` into `dst`: `dst[i] ^= src[i]`, eight bytes at a time.
pub fn xor_slice(dst: &mut [u8], src: &[u8]) {
    debug_assert_eq!(dst.len(), src.len(), "slice length mismatch");
    let mut d_chunks = dst.chunks_exact_mut(8);
    let mut s_chunks = src.chunks_exact(8);
    for (d, s) in d_chunks.by_ref().zip(s_chunks.by_ref()) {
        let dw = u64::from_ne_bytes(d.try_into().expect("8 bytes"));
        let sw = u64::from_ne_bytes(s.try_into().expect("8 bytes"));
        d.copy_from_slice(&(dw ^ sw).to_ne_bytes());
    }
    for (d, s) in d_chunks
        .into_remainder()
        .iter_mut()
        .zip(s_chunks.remainder())
    {
        *d ^= s;
    }
}

// ============================================================================
// GF(65536)
// ============================================================================

/// Lazily-built log/antilog tables for GF(65536).
struct Gf65536Tables {
    log: Vec<u16>,
    antilog: Vec<u16>,
}

impl Gf65536Tables {
    fn build() -> Self {
        let mut log = vec![0u16; 65536];
        let mut antilog = vec![0u16; 65536];
        let mut b: u32 = 1;
        for l in 0..GF65536_LIMIT {
            log[b as usize] = l as u16;
            antilog[l] = b as u16;
            b <<= 1;
            if b & 0x10000 != 0 {
                b ^= GF65536_POLY;
            }
        }
        Self { log, antilog }
    }

    fn get() -> &'static Self {
        static TABLES: OnceLock<Gf65536Tables> = OnceLock::new();
        TABLES.get_or_init(Self::build)
    }
}

/// Force construction of the shared GF(65536) tables.
///
/// Purely an initialization hook: the tables build themselves on first
/// arithmetic use either way.
pub fn warm_gf65536_tables() {
    let _ = Gf65536Tables::get();
}

/// An element of GF(65536).
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Gf65536(pub u16);

impl fmt::Debug for Gf65536 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gf65536({})", self.0)
    }
}

impl Gf65536 {
    #[inline]
    pub const fn new(val: u16) -> Self {
        Self(val)
    }

    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl GaloisField for Gf65536 {
    const ZERO: Self = Self(0);
    const ONE: Self = Self(1);
    const ORDER: usize = 65536;
    const WORD_BYTES: usize = 2;

    #[inline]
    fn element(index: usize) -> Self {
        Self(index as u16)
    }

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        if self.0 == 0 || rhs.0 == 0 {
            return Self::ZERO;
        }
        let t = Gf65536Tables::get();
        let log_sum =
            (t.log[self.0 as usize] as usize + t.log[rhs.0 as usize] as usize) % GF65536_LIMIT;
        Self(t.antilog[log_sum])
    }

    #[inline]
    fn inv(self) -> Option<Self> {
        if self.0 == 0 {
            return None;
        }
        let t = Gf65536Tables::get();
        let log_inv = (GF65536_LIMIT - t.log[self.0 as usize] as usize) % GF65536_LIMIT;
        Some(Self(t.antilog[log_inv]))
    }

    fn mul_slice(dst: &mut [u8], c: Self) {
        if c.is_zero() {
            dst.fill(0);
            return;
        }
        if c == Self::ONE {
            return;
        }
        let mut chunks = dst.chunks_exact_mut(2);
        for chunk in chunks.by_ref() {
            let w = Self(u16::from_le_bytes([chunk[0], chunk[1]]));
            chunk.copy_from_slice(&w.mul(c).0.to_le_bytes());
        }
        // Word-aligned buffers are the coder's responsibility; a stray odd
        // tail byte is treated as the low byte of a zero-extended word.
        if let [tail] = chunks.into_remainder() {
            let w = Self(u16::from(*tail));
            *tail = w.mul(c).0.to_le_bytes()[0];
        }
    }

    fn addmul_slice(dst: &mut [u8], src: &[u8], c: Self) {
        debug_assert_eq!(dst.len(), src.len(), "slice length mismatch");
        debug_assert_eq!(dst.len() % 2, 0, "GF(65536) buffers must be word-aligned");
        if c.is_zero() {
            return;
        }
        if c == Self::ONE {
            xor_slice(dst, src);
            return;
        }
        let mut d_chunks = dst.chunks_exact_mut(2);
        let mut s_chunks = src.chunks_exact(2);
        for (d, s) in d_chunks.by_ref().zip(s_chunks.by_ref()) {
            let sw = Self(u16::from_le_bytes([s[0], s[1]]));
            let prod = sw.mul(c).0;
            let dw = u16::from_le_bytes([d[0], d[1]]);
            d.copy_from_slice(&(dw ^ prod).to_le_bytes());
        }
    }
}
