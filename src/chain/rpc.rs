//! Ethereum JSON-RPC chain implementation
//!
//! Talks to a node that manages the participants' accounts: reads go through
//! `eth_call`, writes through `eth_sendTransaction` (the node signs) and
//! resolve once the receipt is mined. History is walked with
//! `eth_getBlockByNumber` / `eth_getBlockByHash` including full transactions.

use super::abi;
use super::cache::BlockCache;
use super::{
    Address, Amount, Block, BlockRef, ChainTransaction, CyclePath, Ledger, LogProvider,
};
use crate::config::RpcConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    hash: String,
    number: String,
    parent_hash: String,
    timestamp: String,
    transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    hash: String,
    from: String,
    to: Option<String>,
    input: String,
}

#[derive(Debug, Deserialize)]
struct RpcReceipt {
    status: Option<String>,
}

/// Parse a hex quantity (`0x1a`)
fn parse_quantity(raw: &str) -> Result<u64> {
    u64::from_str_radix(raw.trim_start_matches("0x"), 16)
        .map_err(|e| Error::rpc(format!("invalid quantity {:?}: {}", raw, e)))
}

fn parse_data(raw: &str) -> Result<Vec<u8>> {
    hex::decode(raw.trim_start_matches("0x"))
        .map_err(|e| Error::rpc(format!("invalid hex data: {}", e)))
}

impl TryFrom<RpcBlock> for Block {
    type Error = Error;

    fn try_from(block: RpcBlock) -> Result<Self> {
        let transactions = block
            .transactions
            .into_iter()
            .map(|tx| {
                Ok(ChainTransaction {
                    hash: tx.hash,
                    from: Address::new(tx.from),
                    to: tx.to.map(Address::new),
                    input: parse_data(&tx.input)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Block {
            hash: block.hash.to_lowercase(),
            number: parse_quantity(&block.number)?,
            parent_hash: block.parent_hash.to_lowercase(),
            timestamp: parse_quantity(&block.timestamp)?,
            transactions,
        })
    }
}

/// JSON-RPC client for one deployed IOU contract
#[derive(Debug)]
pub struct RpcChain {
    client: Client,
    url: String,
    contract: Address,

    /// Account cancellations are sent from
    sender: Option<Address>,
    receipt_poll_interval: Duration,
    receipt_timeout: Duration,
    cache: Option<Arc<BlockCache>>,
    next_id: AtomicU64,
}

impl RpcChain {
    /// Create a new JSON-RPC chain client
    pub fn new(url: String, contract: Address, config: &RpcConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url,
            contract,
            sender: None,
            receipt_poll_interval: Duration::from_millis(config.receipt_poll_interval_ms),
            receipt_timeout: Duration::from_secs(config.receipt_timeout_secs),
            cache: None,
            next_id: AtomicU64::new(1),
        })
    }

    /// Set the account cancellations are sent from
    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Set cache
    pub fn with_cache(mut self, cache: BlockCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Issue a call whose `null` result is meaningful
    async fn request_optional<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });

        tracing::trace!(%method, %id, "JSON-RPC request");

        let response: JsonRpcResponse<T> = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(Error::rpc(format!(
                "{} failed ({}): {}",
                method, err.code, err.message
            )));
        }

        Ok(response.result)
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        self.request_optional(method, params)
            .await?
            .ok_or_else(|| Error::rpc(format!("{} returned no result", method)))
    }

    /// Read-only contract call returning a single `uint`
    async fn call_uint(&self, data: Vec<u8>) -> Result<Amount> {
        let raw: String = self
            .request(
                "eth_call",
                json!([{
                    "to": self.contract.as_str(),
                    "data": format!("0x{}", hex::encode(data)),
                }, "latest"]),
            )
            .await?;

        abi::decode_uint_return(&parse_data(&raw)?)
    }

    /// Send a state-changing call and wait until it is mined
    async fn transact(&self, from: &Address, data: Vec<u8>) -> Result<()> {
        let tx_hash: String = self
            .request(
                "eth_sendTransaction",
                json!([{
                    "from": from.as_str(),
                    "to": self.contract.as_str(),
                    "data": format!("0x{}", hex::encode(data)),
                }]),
            )
            .await?;

        tracing::debug!(%tx_hash, "Transaction submitted, waiting for receipt");

        let receipt = tokio::time::timeout(self.receipt_timeout, self.wait_for_receipt(&tx_hash))
            .await
            .map_err(|_| {
                Error::ledger(format!(
                    "transaction {} not mined within {:?}",
                    tx_hash, self.receipt_timeout
                ))
            })??;

        match receipt.status.as_deref() {
            Some("0x0") => Err(Error::ledger(format!("transaction {} reverted", tx_hash))),
            _ => Ok(()),
        }
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<RpcReceipt> {
        loop {
            if let Some(receipt) = self
                .request_optional::<RpcReceipt>("eth_getTransactionReceipt", json!([tx_hash]))
                .await?
            {
                return Ok(receipt);
            }
            sleep(self.receipt_poll_interval).await;
        }
    }
}

#[async_trait]
impl Ledger for RpcChain {
    async fn add_iou(&self, debtor: &Address, creditor: &Address, amount: Amount) -> Result<()> {
        tracing::info!(%debtor, %creditor, %amount, "Submitting add_IOU");
        self.transact(debtor, abi::encode_add_iou(creditor, amount)?)
            .await
    }

    async fn pairwise_debt(&self, debtor: &Address, creditor: &Address) -> Result<Amount> {
        self.call_uint(abi::encode_lookup(debtor, creditor)?).await
    }

    async fn total_debt(&self, debtor: &Address) -> Result<Amount> {
        self.call_uint(abi::encode_lookup_all_debt(debtor)?).await
    }

    async fn cancel_cycle(&self, cycle: &CyclePath) -> Result<()> {
        let from = self
            .sender
            .as_ref()
            .or_else(|| cycle.participants.first())
            .ok_or_else(|| Error::ledger("empty cycle"))?;
        self.transact(from, abi::encode_check_and_remove_cycle(cycle)?)
            .await
    }
}

#[async_trait]
impl LogProvider for RpcChain {
    async fn current_height(&self) -> Result<u64> {
        let raw: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw)
    }

    async fn block(&self, at: &BlockRef) -> Result<Block> {
        if let BlockRef::Hash(hash) = at
            && let Some(ref c) = self.cache
            && let Some(block) = c.get_block(hash).await
        {
            return Ok(block);
        }

        let raw: Option<RpcBlock> = match at {
            BlockRef::Number(n) => {
                self.request_optional("eth_getBlockByNumber", json!([format!("0x{:x}", n), true]))
                    .await?
            }
            BlockRef::Hash(h) => {
                self.request_optional("eth_getBlockByHash", json!([h, true]))
                    .await?
            }
        };
        let block = Block::try_from(
            raw.ok_or_else(|| Error::rpc(format!("block {} not found", at)))?,
        )?;

        if let Some(ref c) = self.cache {
            c.save_block(&block).await;
        }

        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1a").unwrap(), 26);
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_block_from_rpc_json() {
        let raw = json!({
            "hash": "0xAB",
            "number": "0x10",
            "parentHash": "0xCD",
            "timestamp": "0x6553f100",
            "transactions": [{
                "hash": "0x01",
                "from": "0xF39FD6E51AAD88F6F4CE6AB8827279CFFFB92266",
                "to": null,
                "input": "0x"
            }, {
                "hash": "0x02",
                "from": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
                "to": "0x5FbDB2315678afecb367f032d93F642f64180aa3",
                "input": "0xd12099e4"
            }]
        });

        let block: RpcBlock = serde_json::from_value(raw).unwrap();
        let block = Block::try_from(block).unwrap();

        assert_eq!(block.number, 16);
        assert_eq!(block.hash, "0xab");
        assert_eq!(block.parent_hash, "0xcd");
        assert_eq!(block.timestamp, 1_700_000_000);
        assert!(block.transactions[0].to.is_none());
        assert!(block.transactions[0].input.is_empty());
        assert_eq!(
            block.transactions[1].to.as_ref().map(Address::as_str),
            Some("0x5fbdb2315678afecb367f032d93f642f64180aa3")
        );
        assert_eq!(block.transactions[1].input, vec![0xd1, 0x20, 0x99, 0xe4]);
    }

    #[test]
    fn test_error_response() {
        let raw = json!({"jsonrpc": "2.0", "id": 1, "error": {"code": -32000, "message": "execution reverted"}});
        let response: JsonRpcResponse<String> = serde_json::from_value(raw).unwrap();
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32000);
    }

    #[tokio::test]
    async fn test_unreachable_node_is_an_rpc_error() {
        let chain = RpcChain::new(
            "http://127.0.0.1:9".to_string(),
            Address::new("0x5fbdb2315678afecb367f032d93f642f64180aa3"),
            &RpcConfig::default(),
        )
        .unwrap();

        let err = chain.current_height().await.unwrap_err();
        assert!(matches!(err, Error::Rpc(_)));
    }
}
