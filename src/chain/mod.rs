//! Chain module - Abstractions over the external IOU ledger and its log
//!
//! The ledger contract is the system of record; this module provides
//! trait-based access to it so the netting logic can run against a JSON-RPC
//! node or an in-memory chain.

use crate::cli::SourceType;
use crate::{Config, Result};
use async_trait::async_trait;
use std::sync::Arc;

pub mod abi;
pub mod cache;
pub mod mock;
pub mod models;
pub mod rpc;

// Re-export models
pub use abi::{CallDecoder, IouContractAbi};
pub use models::{
    Address, Amount, Block, BlockRef, CallArg, ChainTransaction, CyclePath, DecodedCall, Event,
};

/// The IOU ledger contract
///
/// Implementations:
/// - `RpcChain`: contract deployed behind an Ethereum JSON-RPC node
/// - `MockChain`: in-memory ledger for tests and demos
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Record that `debtor` owes `creditor` an additional `amount`
    async fn add_iou(&self, debtor: &Address, creditor: &Address, amount: Amount) -> Result<()>;

    /// Current amount `debtor` owes `creditor`
    async fn pairwise_debt(&self, debtor: &Address, creditor: &Address) -> Result<Amount>;

    /// Current aggregate amount `debtor` owes
    async fn total_debt(&self, debtor: &Address) -> Result<Amount>;

    /// Reduce every edge of `cycle` by `cycle.amount`.
    ///
    /// Must be atomic: either every edge still carries at least the amount
    /// and all are reduced, or nothing changes and an error is returned.
    async fn cancel_cycle(&self, cycle: &CyclePath) -> Result<()>;
}

/// Read access to the immutable block history
#[async_trait]
pub trait LogProvider: Send + Sync {
    /// Height of the current chain tip
    async fn current_height(&self) -> Result<u64>;

    /// Fetch a block with its transactions
    async fn block(&self, at: &BlockRef) -> Result<Block>;
}

/// Ledger and log provider for one deployment
pub struct Backend {
    pub ledger: Arc<dyn Ledger>,
    pub logs: Arc<dyn LogProvider>,
    pub contract: Address,

    /// Account IOUs are written from
    pub account: Option<Address>,
}

/// Create a backend based on source type and configuration
pub fn create_backend(source: SourceType, config: &Config, cache_enabled: bool) -> Result<Backend> {
    match source {
        SourceType::Mock => {
            let chain = Arc::new(mock::MockChain::with_sample_history()?);
            let account = config
                .account()
                .ok()
                .or_else(|| mock::sample_participants().into_iter().next());
            Ok(Backend {
                ledger: chain.clone(),
                logs: chain.clone(),
                contract: chain.contract().clone(),
                account,
            })
        }
        SourceType::Rpc => {
            let contract = config.contract_address()?;
            let account = config.account().ok();
            let mut chain = rpc::RpcChain::new(config.rpc_url()?, contract.clone(), &config.rpc)?;
            if let Some(ref sender) = account {
                chain = chain.with_sender(sender.clone());
            }
            if cache_enabled {
                chain = chain.with_cache(cache::BlockCache::new(
                    config.cache_ttl(),
                    Some(config.cache_directory()),
                ));
            }
            let chain = Arc::new(chain);
            Ok(Backend {
                ledger: chain.clone(),
                logs: chain,
                contract,
                account,
            })
        }
    }
}
