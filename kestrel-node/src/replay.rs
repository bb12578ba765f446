//! Replays a blocks file through the application.
//!
//! One block per line, as JSON: `{"txs": ["<hex>", ...]}`. Blank lines are
//! skipped.

use std::io::BufRead;

use anyhow::Context;
use serde::Deserialize;
use tracing::{debug, info};

use kestrel_chain::Application;
use kestrel_core::Hash;
use kestrel_storage::StateStore;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockLine {
    #[serde(default)]
    txs: Vec<String>,
}

/// Outcome of a replay run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub blocks: u64,
    pub txs: u64,
    /// Transactions answered with a non-OK code.
    pub rejected: u64,
    pub height: u64,
    pub root: Hash,
}

/// Run every block in `reader` through the lifecycle.
///
/// A line is fully decoded before its block opens, so a malformed line stops
/// the replay between blocks.
pub fn replay<S, R>(app: &mut Application<S>, reader: R) -> anyhow::Result<ReplaySummary>
where
    S: StateStore,
    R: BufRead,
{
    let mut summary = ReplaySummary {
        blocks: 0,
        txs: 0,
        rejected: 0,
        height: app.height(),
        root: app.info().last_block_app_hash,
    };

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("reading line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let txs = decode_line(&line).with_context(|| format!("line {line_no}"))?;

        app.begin_block()?;
        for tx in &txs {
            let resp = app.deliver_tx(tx)?;
            if !resp.is_ok() {
                debug!(code = %resp.code, log = %resp.log, "tx rejected");
                summary.rejected += 1;
            }
        }
        let end = app.end_block()?;
        let commit = app.commit()?;

        info!(
            height = commit.height,
            root = %commit.root,
            txs = txs.len(),
            validator_updates = end.validator_updates.len(),
            "replayed block"
        );
        summary.blocks += 1;
        summary.txs += txs.len() as u64;
        summary.height = commit.height;
        summary.root = commit.root;
    }

    Ok(summary)
}

fn decode_line(line: &str) -> anyhow::Result<Vec<Vec<u8>>> {
    let block: BlockLine = serde_json::from_str(line)?;
    block
        .txs
        .iter()
        .enumerate()
        .map(|(i, tx)| hex::decode(tx).with_context(|| format!("tx {i} is not hex")))
        .collect()
}
