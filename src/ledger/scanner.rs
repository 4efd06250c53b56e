//! Log scanner
//!
//! Walks the immutable block history backward from the chain tip and turns
//! every decodable call to the contract into an [`Event`].

use crate::chain::{Address, BlockRef, CallDecoder, Event, LogProvider};
use crate::config::{RpcConfig, ZERO_HASH};
use crate::Result;

/// Where a history walk stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Parent hash of the first block of history
    pub genesis_sentinel: String,

    /// Stop after visiting this many blocks
    pub max_blocks: Option<u64>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            genesis_sentinel: ZERO_HASH.to_string(),
            max_blocks: None,
        }
    }
}

impl From<&RpcConfig> for ScanOptions {
    fn from(config: &RpcConfig) -> Self {
        Self {
            genesis_sentinel: config.genesis_sentinel.clone(),
            max_blocks: config.max_blocks,
        }
    }
}

/// Result of a history walk
///
/// A failed walk reads as empty history through [`ScanOutcome::events`], but
/// stays distinguishable from a walk that genuinely found nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The walk reached the genesis sentinel or its block bound.
    /// Events are in reverse-chronological order.
    Complete(Vec<Event>),

    /// A provider call failed mid-walk; partial results are discarded
    Failed { reason: String },
}

impl ScanOutcome {
    /// Events found, empty if the scan failed
    pub fn events(&self) -> &[Event] {
        match self {
            ScanOutcome::Complete(events) => events,
            ScanOutcome::Failed { .. } => &[],
        }
    }

    pub fn into_events(self) -> Vec<Event> {
        match self {
            ScanOutcome::Complete(events) => events,
            ScanOutcome::Failed { .. } => Vec::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ScanOutcome::Failed { .. })
    }

    /// True for a completed walk without matching calls
    pub fn is_empty_history(&self) -> bool {
        matches!(self, ScanOutcome::Complete(events) if events.is_empty())
    }
}

/// Collect all calls to `target` whose function name matches `filter`
/// (every decodable call when `filter` is `None`).
///
/// Never returns an error: a provider failure yields
/// [`ScanOutcome::Failed`]. Dropping the future cancels the walk.
pub async fn scan_calls(
    provider: &dyn LogProvider,
    decoder: &dyn CallDecoder,
    target: &Address,
    filter: Option<&str>,
    options: &ScanOptions,
) -> ScanOutcome {
    match walk(provider, decoder, target, filter, options).await {
        Ok(events) => {
            tracing::debug!(
                "Scan for {:?} calls to {} found {} events",
                filter,
                target,
                events.len()
            );
            ScanOutcome::Complete(events)
        }
        Err(e) => {
            tracing::warn!("History scan failed, treating as empty: {}", e);
            ScanOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

async fn walk(
    provider: &dyn LogProvider,
    decoder: &dyn CallDecoder,
    target: &Address,
    filter: Option<&str>,
    options: &ScanOptions,
) -> Result<Vec<Event>> {
    let tip = provider.current_height().await?;
    let mut next = BlockRef::Number(tip);
    let mut visited: u64 = 0;
    let mut events = Vec::new();

    loop {
        if let Some(max) = options.max_blocks
            && visited >= max
        {
            tracing::debug!("Stopping history scan after {} blocks", visited);
            break;
        }

        let block = provider.block(&next).await?;
        visited += 1;

        for tx in &block.transactions {
            if tx.to.as_ref() != Some(target) {
                continue;
            }
            let Some(call) = decoder.decode(&tx.input) else {
                continue;
            };
            if filter.is_some_and(|name| name != call.name) {
                continue;
            }
            events.push(Event {
                sender: tx.from.clone(),
                function: call.name,
                args: call.args,
                timestamp: block.timestamp,
                block_number: block.number,
                tx_hash: tx.hash.clone(),
            });
        }

        if block
            .parent_hash
            .eq_ignore_ascii_case(&options.genesis_sentinel)
        {
            break;
        }
        next = BlockRef::hash(&block.parent_hash);
    }

    Ok(events)
}
