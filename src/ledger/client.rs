use super::canceller::{self, SweepOptions, SweepReport};
use super::graph::DebtGraph;
use super::query;
use super::reconstruct::{list_participants, rebuild_graph};
use super::scanner::{ScanOptions, ScanOutcome, scan_calls};
use crate::chain::abi::ADD_IOU;
use crate::chain::{Address, Amount, Backend, CallDecoder, IouContractAbi, Ledger, LogProvider};
use crate::{Config, Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Caller-facing facade over one IOU contract deployment.
///
/// Every read rebuilds from the ledger; nothing is kept between calls.
pub struct IouClient {
    ledger: Arc<dyn Ledger>,
    logs: Arc<dyn LogProvider>,
    decoder: Arc<dyn CallDecoder>,
    contract: Address,
    account: Option<Address>,
    scan: ScanOptions,
    sweep: SweepOptions,
    max_concurrent_queries: usize,
}

impl IouClient {
    pub fn new(backend: Backend, config: &Config) -> Self {
        Self {
            ledger: backend.ledger,
            logs: backend.logs,
            decoder: Arc::new(IouContractAbi),
            contract: backend.contract,
            account: backend.account,
            scan: ScanOptions::from(&config.rpc),
            sweep: SweepOptions::from(&config.sweep),
            max_concurrent_queries: config.sweep.max_concurrent_queries,
        }
    }

    /// Write IOUs from `account` instead of the configured one
    pub fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    pub fn account(&self) -> Option<&Address> {
        self.account.as_ref()
    }

    /// All `add_IOU` calls ever made to the contract, newest first
    pub async fn history(&self) -> ScanOutcome {
        scan_calls(
            self.logs.as_ref(),
            self.decoder.as_ref(),
            &self.contract,
            Some(ADD_IOU),
            &self.scan,
        )
        .await
    }

    /// Everyone who ever sent or received an IOU.
    /// Empty when the history cannot be read.
    pub async fn get_users(&self) -> BTreeSet<Address> {
        list_participants(self.history().await.events())
    }

    pub async fn get_total_owed(&self, user: &Address) -> Amount {
        query::total_owed(self.ledger.as_ref(), user).await
    }

    pub async fn get_last_active(&self, user: &Address) -> Option<u64> {
        query::last_active(&self.history().await, user)
    }

    /// Fresh snapshot of every pairwise debt between known users
    pub async fn snapshot(&self) -> DebtGraph {
        let users = self.get_users().await;
        rebuild_graph(self.ledger.as_ref(), &users, self.max_concurrent_queries).await
    }

    /// Rebuild and cancel every debt loop found
    pub async fn remove_cycle(&self) -> SweepReport {
        let graph = self.snapshot().await;
        canceller::sweep(self.ledger.as_ref(), &graph, self.sweep).await
    }

    /// Record that the account owes `creditor` an extra `amount`, then run
    /// one sweep. Resolves once the sweep has settled.
    pub async fn add_iou(&self, creditor: &Address, amount: Amount) -> Result<SweepReport> {
        let debtor = self.account.as_ref().ok_or_else(|| {
            Error::MissingConfig("No account configured to write IOUs from".to_string())
        })?;

        self.ledger.add_iou(debtor, creditor, amount).await?;
        tracing::info!("Recorded IOU {} -> {} ({})", debtor, creditor, amount);

        Ok(self.remove_cycle().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::{MOCK_BLOCK_TIME, MOCK_GENESIS_TIMESTAMP, MockChain, sample_participants};

    fn client_for(chain: Arc<MockChain>, account: Option<Address>) -> IouClient {
        let backend = Backend {
            ledger: chain.clone(),
            logs: chain.clone(),
            contract: chain.contract().clone(),
            account,
        };
        IouClient::new(backend, &Config::default())
    }

    #[tokio::test]
    async fn test_get_users_from_history() {
        let chain = Arc::new(MockChain::with_sample_history().unwrap());
        let client = client_for(chain, None);

        let users = client.get_users().await;
        let expected: BTreeSet<Address> = sample_participants().into_iter().collect();
        assert_eq!(users, expected);
    }

    #[tokio::test]
    async fn test_users_empty_when_history_unreadable() {
        let chain = Arc::new(MockChain::with_sample_history().unwrap());
        chain.set_fail_logs(true);
        let client = client_for(chain, None);

        assert!(client.get_users().await.is_empty());
        assert!(client.history().await.is_failed());
        assert_eq!(client.snapshot().await.stats().participants, 0);
    }

    #[tokio::test]
    async fn test_remove_cycle_then_idempotent() {
        let chain = Arc::new(MockChain::with_sample_history().unwrap());
        let p = sample_participants();
        let client = client_for(chain.clone(), None);

        let first = client.remove_cycle().await;
        assert_eq!(first.cancelled_count(), 1);
        assert_eq!(chain.debt(&p[0], &p[1]).await, 5);
        assert_eq!(chain.debt(&p[1], &p[2]).await, 0);
        assert_eq!(chain.debt(&p[2], &p[0]).await, 0);

        let second = client.remove_cycle().await;
        assert_eq!(second.cancelled_count(), 0);
        assert!(second.is_noop());
        assert!(!client.snapshot().await.has_cycles());
    }

    #[tokio::test]
    async fn test_add_iou_round_trip() {
        let chain = Arc::new(MockChain::with_sample_history().unwrap());
        let p = sample_participants();
        let client = client_for(chain.clone(), None).with_account(p[3].clone());

        let report = client.add_iou(&p[1], 4).await.unwrap();

        // the pair is not on the loop the sweep cancelled
        assert_eq!(chain.debt(&p[3], &p[1]).await, 4);
        assert_eq!(report.cancelled_count(), 1);
        assert_eq!(client.get_total_owed(&p[3]).await, 4);
        assert_eq!(chain.call_count(ADD_IOU).await, 5);

        // mined in block 5, right after the sample history
        assert_eq!(
            client.get_last_active(&p[3]).await,
            Some(MOCK_GENESIS_TIMESTAMP + 5 * MOCK_BLOCK_TIME)
        );
    }

    #[tokio::test]
    async fn test_add_iou_closing_a_loop_is_netted() {
        let chain = Arc::new(MockChain::new());
        let p = sample_participants();
        chain.add_iou(&p[0], &p[1], 10).await.unwrap();
        chain.add_iou(&p[1], &p[2], 5).await.unwrap();

        let client = client_for(chain.clone(), Some(p[2].clone()));
        let report = client.add_iou(&p[0], 5).await.unwrap();

        assert_eq!(report.cancelled_count(), 1);
        assert_eq!(chain.debt(&p[0], &p[1]).await, 5);
        assert_eq!(chain.debt(&p[1], &p[2]).await, 0);
        assert_eq!(chain.debt(&p[2], &p[0]).await, 0);
    }

    #[tokio::test]
    async fn test_add_iou_failure_is_surfaced() {
        let chain = Arc::new(MockChain::with_sample_history().unwrap());
        chain.set_fail_writes(true);
        let p = sample_participants();
        let client = client_for(chain.clone(), Some(p[0].clone()));

        let err = client.add_iou(&p[1], 1).await.unwrap_err();
        assert!(err.is_ledger_rejection());
        assert_eq!(chain.debt(&p[0], &p[1]).await, 10);
    }

    #[tokio::test]
    async fn test_add_iou_without_account() {
        let chain = Arc::new(MockChain::new());
        let client = client_for(chain, None);

        let err = client
            .add_iou(&sample_participants()[1], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingConfig(_)));
    }

    #[tokio::test]
    async fn test_unknown_user_queries() {
        let chain = Arc::new(MockChain::with_sample_history().unwrap());
        let client = client_for(chain, None);
        let stranger = Address::new("0x00000000000000000000000000000000000000ee");

        assert_eq!(client.get_total_owed(&stranger).await, 0);
        assert_eq!(client.get_last_active(&stranger).await, None);
    }
}
