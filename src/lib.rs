//! IOU Netting
//!
//! A client for an on-chain IOU ledger that keeps debt loops netted out.
//!
//! This library provides functionality for:
//! - Walking the contract's call history block by block (JSON-RPC node or in-memory chain)
//! - Rebuilding a pairwise debt snapshot from the ledger
//! - Finding debt cycles with breadth-first search and cancelling them by their smallest edge
//! - Per-participant queries: total owed and last activity

pub mod chain;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;

pub use config::Config;
pub use error::{Error, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize logging with the given log level
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
