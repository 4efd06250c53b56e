//! In-memory chain for testing and development
//!
//! `MockChain` plays both collaborators: it is an IOU ledger with atomic
//! cycle cancellation and an append-only block history where every write is
//! mined into its own block, exactly as an automining dev node would do.

use super::abi;
use super::{
    Address, Amount, Block, BlockRef, ChainTransaction, CyclePath, Ledger, LogProvider,
};
use crate::config::ZERO_HASH;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Contract address used by the mock chain
pub const MOCK_CONTRACT_ADDRESS: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

/// Timestamp of the mock genesis block
pub const MOCK_GENESIS_TIMESTAMP: u64 = 1_700_000_000;

/// Seconds between consecutive mock blocks
pub const MOCK_BLOCK_TIME: u64 = 12;

/// Accounts used by the sample history
pub fn sample_participants() -> Vec<Address> {
    [
        "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
        "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
        "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc",
        "0x90f79bf6eb2c4f870365e785982e1f101e93b906",
    ]
    .into_iter()
    .map(Address::new)
    .collect()
}

fn block_hash(number: u64) -> String {
    format!("0x{:064x}", number + 1)
}

#[derive(Debug, Default)]
struct ChainState {
    /// Index equals block number
    blocks: Vec<Block>,
    debts: BTreeMap<(Address, Address), Amount>,
}

impl ChainState {
    fn mine(&mut self, from: &Address, to: &Address, input: Vec<u8>) {
        let number = self.blocks.len() as u64;
        let parent_hash = self
            .blocks
            .last()
            .map(|b| b.hash.clone())
            .unwrap_or_else(|| ZERO_HASH.to_string());
        self.blocks.push(Block {
            hash: block_hash(number),
            number,
            parent_hash,
            timestamp: MOCK_GENESIS_TIMESTAMP + number * MOCK_BLOCK_TIME,
            transactions: vec![ChainTransaction {
                hash: format!("0x{:064x}", (number << 8) | 1),
                from: from.clone(),
                to: Some(to.clone()),
                input,
            }],
        });
    }

    fn debt(&self, debtor: &Address, creditor: &Address) -> Amount {
        self.debts
            .get(&(debtor.clone(), creditor.clone()))
            .copied()
            .unwrap_or(0)
    }
}

/// In-memory IOU ledger with a block history
#[derive(Debug)]
pub struct MockChain {
    contract: Address,
    state: Mutex<ChainState>,
    fail_logs: AtomicBool,
    fail_queries: AtomicBool,
    fail_writes: AtomicBool,
    reject_cancellations: AtomicBool,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    /// A chain holding only an empty genesis block
    pub fn new() -> Self {
        let genesis = Block {
            hash: block_hash(0),
            number: 0,
            parent_hash: ZERO_HASH.to_string(),
            timestamp: MOCK_GENESIS_TIMESTAMP,
            transactions: vec![],
        };
        Self {
            contract: Address::new(MOCK_CONTRACT_ADDRESS),
            state: Mutex::new(ChainState {
                blocks: vec![genesis],
                debts: BTreeMap::new(),
            }),
            fail_logs: AtomicBool::new(false),
            fail_queries: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            reject_cancellations: AtomicBool::new(false),
        }
    }

    /// A chain with a few IOUs, one of which closes an uncancelled loop
    pub fn with_sample_history() -> Result<Self> {
        let chain = Self::new();
        let p = sample_participants();
        let seed = [(0, 1, 10), (1, 2, 5), (0, 3, 3), (2, 0, 5)];

        let mut state = chain.state.try_lock().map_err(|e| Error::custom(e.to_string()))?;
        for (debtor, creditor, amount) in seed {
            let input = abi::encode_add_iou(&p[creditor], amount)?;
            state.mine(&p[debtor], &chain.contract, input);
            *state
                .debts
                .entry((p[debtor].clone(), p[creditor].clone()))
                .or_default() += amount;
        }
        drop(state);

        Ok(chain)
    }

    pub fn contract(&self) -> &Address {
        &self.contract
    }

    /// Make every log provider call fail
    pub fn set_fail_logs(&self, fail: bool) {
        self.fail_logs.store(fail, Ordering::SeqCst);
    }

    /// Make every ledger read fail
    pub fn set_fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Make `add_iou` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every cycle cancellation fail
    pub fn set_reject_cancellations(&self, reject: bool) {
        self.reject_cancellations.store(reject, Ordering::SeqCst);
    }

    /// Current debt without going through the failure switches
    pub async fn debt(&self, debtor: &Address, creditor: &Address) -> Amount {
        self.state.lock().await.debt(debtor, creditor)
    }

    /// Record a raw transaction to the contract without touching balances
    pub async fn submit_raw(&self, from: &Address, input: Vec<u8>) {
        let contract = self.contract.clone();
        self.state.lock().await.mine(from, &contract, input);
    }

    /// Number of mined calls to `function`
    pub async fn call_count(&self, function: &str) -> usize {
        let state = self.state.lock().await;
        state
            .blocks
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter_map(|tx| abi::decode_call(&tx.input).ok())
            .filter(|call| call.name == function)
            .count()
    }
}

#[async_trait]
impl Ledger for MockChain {
    async fn add_iou(&self, debtor: &Address, creditor: &Address, amount: Amount) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::ledger("add_IOU reverted"));
        }
        if amount == 0 {
            return Err(Error::ledger("amount must be positive"));
        }
        let input = abi::encode_add_iou(creditor, amount)?;

        let mut state = self.state.lock().await;
        let entry = state
            .debts
            .entry((debtor.clone(), creditor.clone()))
            .or_default();
        *entry = entry
            .checked_add(amount)
            .ok_or_else(|| Error::ledger("debt overflow"))?;
        let contract = self.contract.clone();
        state.mine(debtor, &contract, input);
        Ok(())
    }

    async fn pairwise_debt(&self, debtor: &Address, creditor: &Address) -> Result<Amount> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::rpc("lookup unavailable"));
        }
        Ok(self.state.lock().await.debt(debtor, creditor))
    }

    async fn total_debt(&self, debtor: &Address) -> Result<Amount> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(Error::rpc("lookupAllDebt unavailable"));
        }
        let state = self.state.lock().await;
        Ok(state
            .debts
            .iter()
            .filter(|((d, _), _)| d == debtor)
            .map(|(_, amount)| *amount)
            .sum())
    }

    async fn cancel_cycle(&self, cycle: &CyclePath) -> Result<()> {
        if self.reject_cancellations.load(Ordering::SeqCst) {
            return Err(Error::ledger("checkAndRemoveCycle reverted"));
        }
        if cycle.participants.len() < 2 {
            return Err(Error::ledger("cycle needs at least two participants"));
        }
        let distinct: std::collections::BTreeSet<&Address> = cycle.participants.iter().collect();
        if distinct.len() != cycle.participants.len() {
            return Err(Error::ledger("cycle visits a participant twice"));
        }
        if cycle.amount == 0 {
            return Err(Error::ledger("cycle amount must be positive"));
        }
        let input = abi::encode_check_and_remove_cycle(cycle)?;

        // check and apply under one lock
        let mut state = self.state.lock().await;
        for (debtor, creditor) in cycle.edges() {
            let held = state.debt(debtor, creditor);
            if held < cycle.amount {
                return Err(Error::ledger(format!(
                    "edge {} -> {} holds {} < {}",
                    debtor, creditor, held, cycle.amount
                )));
            }
        }
        for (debtor, creditor) in cycle.edges() {
            let remaining = state.debt(debtor, creditor) - cycle.amount;
            let key = (debtor.clone(), creditor.clone());
            if remaining == 0 {
                state.debts.remove(&key);
            } else {
                state.debts.insert(key, remaining);
            }
        }
        let contract = self.contract.clone();
        state.mine(&cycle.participants[0], &contract, input);
        Ok(())
    }
}

#[async_trait]
impl LogProvider for MockChain {
    async fn current_height(&self) -> Result<u64> {
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(Error::rpc("node unavailable"));
        }
        let state = self.state.lock().await;
        Ok(state.blocks.len().saturating_sub(1) as u64)
    }

    async fn block(&self, at: &BlockRef) -> Result<Block> {
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(Error::rpc("node unavailable"));
        }
        let state = self.state.lock().await;
        let found = match at {
            BlockRef::Number(n) => usize::try_from(*n).ok().and_then(|n| state.blocks.get(n)),
            BlockRef::Hash(h) => state.blocks.iter().find(|b| b.hash.eq_ignore_ascii_case(h)),
        };
        found
            .cloned()
            .ok_or_else(|| Error::rpc(format!("block {} not found", at)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sample_history() {
        let chain = MockChain::with_sample_history().unwrap();
        let p = sample_participants();

        assert_eq!(chain.current_height().await.unwrap(), 4);
        assert_eq!(chain.debt(&p[0], &p[1]).await, 10);
        assert_eq!(chain.total_debt(&p[0]).await.unwrap(), 13);
        assert_eq!(chain.call_count(abi::ADD_IOU).await, 4);
    }

    #[tokio::test]
    async fn test_blocks_link_back_to_genesis() {
        let chain = MockChain::with_sample_history().unwrap();

        let tip = chain.current_height().await.unwrap();
        let mut block = chain.block(&BlockRef::Number(tip)).await.unwrap();
        let mut visited = 1;
        while block.parent_hash != ZERO_HASH {
            block = chain.block(&BlockRef::hash(&block.parent_hash)).await.unwrap();
            visited += 1;
        }
        assert_eq!(visited, 5);
        assert_eq!(block.number, 0);
    }

    #[tokio::test]
    async fn test_cancel_cycle_is_all_or_nothing() {
        let chain = MockChain::with_sample_history().unwrap();
        let p = sample_participants();

        // p1 -> p2 only holds 5
        let too_much = CyclePath {
            participants: vec![p[0].clone(), p[1].clone(), p[2].clone()],
            amount: 6,
        };
        assert!(chain.cancel_cycle(&too_much).await.is_err());
        assert_eq!(chain.debt(&p[0], &p[1]).await, 10);
        assert_eq!(chain.debt(&p[2], &p[0]).await, 5);

        let exact = CyclePath {
            amount: 5,
            ..too_much
        };
        chain.cancel_cycle(&exact).await.unwrap();
        assert_eq!(chain.debt(&p[0], &p[1]).await, 5);
        assert_eq!(chain.debt(&p[1], &p[2]).await, 0);
        assert_eq!(chain.debt(&p[2], &p[0]).await, 0);
        assert_eq!(chain.call_count(abi::CHECK_AND_REMOVE_CYCLE).await, 1);

        // the same cancellation no longer holds
        assert!(chain.cancel_cycle(&exact).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_switches() {
        let chain = MockChain::new();
        let p = sample_participants();

        chain.set_fail_writes(true);
        assert!(chain.add_iou(&p[0], &p[1], 1).await.is_err());
        chain.set_fail_writes(false);
        chain.add_iou(&p[0], &p[1], 1).await.unwrap();

        chain.set_fail_queries(true);
        assert!(chain.pairwise_debt(&p[0], &p[1]).await.is_err());
        assert!(chain.total_debt(&p[0]).await.is_err());

        chain.set_fail_logs(true);
        assert!(chain.current_height().await.is_err());
    }

    #[tokio::test]
    async fn test_zero_amount_is_rejected() {
        let chain = MockChain::new();
        let p = sample_participants();
        assert!(chain.add_iou(&p[0], &p[1], 0).await.is_err());
        assert_eq!(chain.current_height().await.unwrap(), 0);
    }
}
