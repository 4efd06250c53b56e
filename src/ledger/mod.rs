//! Ledger module - Rebuild debt state from history and net out debt loops
//!
//! A pass runs scan → participants → pairwise queries → snapshot → sweep.
//! Snapshots are values; nothing carries over from one pass to the next.

pub mod canceller;
pub mod client;
pub mod graph;
pub mod query;
pub mod reconstruct;
pub mod scanner;

// Re-export key types
pub use canceller::{CancellationOutcome, SweepOptions, SweepReport};
pub use client::IouClient;
pub use graph::{DebtGraph, GraphStats};
pub use scanner::{ScanOptions, ScanOutcome};
