//! Checks the accumulator traces of a sequence of blocks.
//!
//! The input is a JSON array of blocks, each block being an array of decoded
//! traces (`{"type", "location", "trace"}`). Every block is inspected and
//! replayed, and consecutive blocks must chain: a block starts from the
//! world-state root the previous one ended at.
//!
//! Example usage:
//! ```
//! RUST_LOG=info cargo run --bin check_traces -- --input ./traces.json
//! ```

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use accumulator_trie::hashing::DEFAULT_DEPTH;
use anyhow::{bail, Context, Result};
use clap::{Parser, ValueHint};
use trace_inspector::{
    check_traces, inspect_account_segment, split_account_segments, DecodedTrace, StateConfig,
};
use tracing::{error, info};

/// Checks the accumulator traces of a sequence of blocks.
#[derive(Parser)]
#[command(version, propagate_version = true)]
struct Cli {
    /// JSON file holding the blocks. Read from stdin when absent.
    #[arg(long, short = 'i', value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Depth of the world-state tree.
    #[arg(long, env = "TRACE_CHECK_WORLD_STATE_DEPTH", default_value_t = DEFAULT_DEPTH)]
    world_state_depth: usize,

    /// Depth of the storage tries.
    #[arg(long, env = "TRACE_CHECK_STORAGE_DEPTH", default_value_t = DEFAULT_DEPTH)]
    storage_depth: usize,

    /// Only classify the account segments, without replaying the proofs.
    #[arg(long)]
    inspect_only: bool,
}

fn read_input(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        }
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn inspect_block(config: &StateConfig, block: &[DecodedTrace]) -> Result<()> {
    for (index, segment) in split_account_segments(block)?.into_iter().enumerate() {
        let pattern = inspect_account_segment(config, segment)
            .with_context(|| format!("segment #{index}"))?;
        println!("  segment #{index}: {pattern}");
    }
    Ok(())
}

fn main() -> Result<()> {
    trace_inspector::tracing::init();

    let args = Cli::parse();
    let config =
        StateConfig::default().with_depths(args.world_state_depth, args.storage_depth);

    let buffer = read_input(args.input.as_ref())?;
    let des = &mut serde_json::Deserializer::from_str(&buffer);
    let blocks = serde_path_to_error::deserialize::<_, Vec<Vec<DecodedTrace>>>(des)?;
    info!("loaded {} blocks", blocks.len());

    let mut previous = None;
    for (number, block) in blocks.iter().enumerate() {
        println!("block #{number}: {} traces", block.len());
        if args.inspect_only {
            inspect_block(&config, block).with_context(|| format!("block #{number}"))?;
            continue;
        }

        let (old_root, new_root) = match check_traces(&config, block) {
            Ok(roots) => roots,
            Err(err) => {
                error!("block #{number} rejected: {err}");
                return Err(err).with_context(|| format!("block #{number}"));
            }
        };
        if let Some(previous) = previous {
            if previous != old_root {
                bail!(
                    "block #{number} starts from {old_root:#x} but the previous block ended at {previous:#x}"
                );
            }
        }
        println!("  world state: {old_root:#x} -> {new_root:#x}");
        previous = Some(new_root);
    }

    Ok(())
}
