//! File-level encode/decode tool for the RCUP erasure coding core.
//!
//! `encode` splits a file into fixed-size chunks, encodes them with a
//! chosen or auto-selected mode, and writes one file per block plus a JSON
//! manifest. `decode` reloads the blocks, treats missing files and digest
//! mismatches as erasures, and reconstructs the original file. The digest
//! check lives here on purpose: the engine recovers known-missing blocks
//! only, spotting corrupt-but-present ones is the caller's job.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::warn;

use rcup_core::{Block, BlockSetMetadata, ChunkPriority, ErasureCodingEngine};

const MANIFEST_NAME: &str = "manifest.json";
const MANIFEST_VERSION: u8 = 1;

#[derive(Parser)]
#[command(name = "rcup", about = "Erasure-code files into resilient block sets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Split a file into chunks and encode them into a block directory.
    Encode {
        /// Input file.
        input: PathBuf,
        /// Output directory for blocks and manifest.
        #[arg(long)]
        out: PathBuf,
        /// Chunk size in bytes.
        #[arg(long, default_value_t = 65536)]
        chunk_size: usize,
        /// Base redundancy ratio (parity blocks per data block).
        #[arg(long, default_value_t = 0.5)]
        redundancy: f64,
        /// Chunk priority; scales the base redundancy.
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        /// Observed or predicted loss rate used for mode selection.
        #[arg(long, default_value_t = 0.0)]
        loss_rate: f64,
        /// Randomly omit this many block files, simulating loss in transit.
        #[arg(long, default_value_t = 0)]
        drop: usize,
    },
    /// Reconstruct the original file from a block directory.
    Decode {
        /// Directory produced by `encode`.
        dir: PathBuf,
        /// Output file.
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Priority {
    Critical,
    High,
    Normal,
    Low,
}

impl From<Priority> for ChunkPriority {
    fn from(p: Priority) -> Self {
        match p {
            Priority::Critical => ChunkPriority::Critical,
            Priority::High => ChunkPriority::High,
            Priority::Normal => ChunkPriority::Normal,
            Priority::Low => ChunkPriority::Low,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Manifest {
    version: u8,
    meta: BlockSetMetadata,
    original_len: usize,
    file_name: String,
    /// BLAKE3 digest per block, hex encoded.
    digests: Vec<String>,
}

fn block_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("blk_{index:05}.bin"))
}

fn digest_hex(data: &[u8]) -> String {
    hex::encode(blake3::hash(data).as_bytes())
}

fn fail(msg: &str) -> ! {
    eprintln!("error: {msg}");
    std::process::exit(2)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let engine = ErasureCodingEngine::new();
    match Cli::parse().command {
        Command::Encode {
            input,
            out,
            chunk_size,
            redundancy,
            priority,
            loss_rate,
            drop,
        } => encode(&engine, &input, &out, chunk_size, redundancy, priority, loss_rate, drop),
        Command::Decode { dir, out } => decode(&engine, &dir, &out),
    }
}

#[allow(clippy::too_many_arguments)]
fn encode(
    engine: &ErasureCodingEngine,
    input: &Path,
    out: &Path,
    chunk_size: usize,
    redundancy: f64,
    priority: Option<Priority>,
    loss_rate: f64,
    drop: usize,
) {
    if chunk_size == 0 {
        fail("chunk size must be greater than zero");
    }
    let data = fs::read(input).unwrap_or_else(|e| fail(&format!("read {}: {e}", input.display())));

    let mut chunks: Vec<Block> = Vec::new();
    for chunk in data.chunks(chunk_size) {
        let mut block = vec![0u8; chunk_size];
        block[..chunk.len()].copy_from_slice(chunk);
        chunks.push(block);
    }

    let effective = match priority {
        Some(p) => redundancy * ChunkPriority::from(p).redundancy_ratio(),
        None => redundancy,
    };
    let set = engine.encode_block_set(&chunks, effective, loss_rate);

    fs::create_dir_all(out).unwrap_or_else(|e| fail(&format!("create {}: {e}", out.display())));

    let mut dropped: Vec<usize> = (0..set.blocks.len()).collect();
    dropped.shuffle(&mut rand::thread_rng());
    dropped.truncate(drop.min(set.blocks.len()));

    let mut digests = Vec::with_capacity(set.blocks.len());
    for (i, block) in set.blocks.iter().enumerate() {
        digests.push(digest_hex(block));
        if dropped.contains(&i) {
            warn!(index = i, "dropping block on write");
            continue;
        }
        fs::write(block_path(out, i), block)
            .unwrap_or_else(|e| fail(&format!("write block {i}: {e}")));
    }

    let manifest = Manifest {
        version: MANIFEST_VERSION,
        meta: set.meta.clone(),
        original_len: data.len(),
        file_name: input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        digests,
    };
    let json = serde_json::to_string_pretty(&manifest).expect("serialize manifest");
    fs::write(out.join(MANIFEST_NAME), json)
        .unwrap_or_else(|e| fail(&format!("write manifest: {e}")));

    println!(
        "encoded {} -> {} blocks ({} data + {} redundancy, mode {:?}), {} dropped",
        input.display(),
        set.meta.total_count,
        set.meta.original_count,
        set.meta.total_count - set.meta.original_count,
        set.meta.mode,
        dropped.len(),
    );
}

fn decode(engine: &ErasureCodingEngine, dir: &Path, out: &Path) {
    let manifest_raw = fs::read_to_string(dir.join(MANIFEST_NAME))
        .unwrap_or_else(|e| fail(&format!("read manifest: {e}")));
    let manifest: Manifest = serde_json::from_str(&manifest_raw)
        .unwrap_or_else(|e| fail(&format!("parse manifest: {e}")));
    if manifest.version != MANIFEST_VERSION {
        fail(&format!("unsupported manifest version {}", manifest.version));
    }
    if manifest.digests.len() != manifest.meta.total_count {
        fail("manifest digest count does not match block count");
    }

    let mut erased = 0usize;
    let blocks: Vec<Option<Block>> = (0..manifest.meta.total_count)
        .map(|i| {
            let block = fs::read(block_path(dir, i)).ok()?;
            if digest_hex(&block) != manifest.digests[i] {
                warn!(index = i, "block digest mismatch, treating as erasure");
                return None;
            }
            Some(block)
        })
        .inspect(|b| erased += usize::from(b.is_none()))
        .collect();

    let decoded = engine
        .decode_block_set(&manifest.meta, &blocks)
        .unwrap_or_else(|e| fail(&format!("decode ({erased} erasures): {e}")));

    let mut data: Vec<u8> = Vec::with_capacity(manifest.original_len);
    for block in decoded {
        data.extend_from_slice(&block);
    }
    data.truncate(manifest.original_len);

    fs::write(out, &data).unwrap_or_else(|e| fail(&format!("write {}: {e}", out.display())));
    println!(
        "decoded {} -> {} ({} bytes, {} of {} blocks erased)",
        dir.display(),
        out.display(),
        data.len(),
        erased,
        manifest.meta.total_count,
    );
}
