//! Per-participant queries
//!
//! Both queries are fail-soft: an unavailable ledger reads as zero debt and
//! a failed history walk reads as no activity.

use super::scanner::ScanOutcome;
use crate::chain::abi::ADD_IOU;
use crate::chain::{Address, Amount, Ledger};

/// Aggregate amount `participant` owes, as reported by the ledger.
/// Zero when the query fails.
pub async fn total_owed(ledger: &dyn Ledger, participant: &Address) -> Amount {
    match ledger.total_debt(participant).await {
        Ok(amount) => amount,
        Err(e) => {
            tracing::warn!("Total debt lookup for {} failed: {}", participant, e);
            0
        }
    }
}

/// Timestamp of the latest IOU that `participant` sent or received
pub fn last_active(history: &ScanOutcome, participant: &Address) -> Option<u64> {
    history
        .events()
        .iter()
        .filter(|e| e.function == ADD_IOU && e.mentions(participant))
        .map(|e| e.timestamp)
        .max()
}
