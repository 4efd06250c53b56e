//! CLI command implementations
//!
//! This module contains the implementation for each CLI command.

use super::output::{self, UserRow};
use super::{Cli, OutputFormat, SourceType};
use crate::chain::{Address, create_backend};
use crate::ledger::IouClient;
use crate::ledger::query::last_active as last_active_in;
use crate::ledger::reconstruct::list_participants;
use crate::{Config, Result};
use futures::future::join_all;
use std::io::Write;

/// Build a client from command-line flags and configuration
pub fn connect(args: &Cli, config: &Config) -> Result<IouClient> {
    let source = match args.source {
        Some(source) => source,
        None => SourceType::from_config(&config.default.source)?,
    };
    let cache = args.cache || config.cache.enabled;
    tracing::debug!("Using {:?} backend (cache: {})", source, cache);

    let backend = create_backend(source, config, cache)?;
    let client = IouClient::new(backend, config);

    Ok(match &args.account {
        Some(account) => client.with_account(Address::new(account)),
        None => client,
    })
}

/// List users with their totals and last activity
pub async fn users(client: &IouClient, format: OutputFormat, w: &mut impl Write) -> Result<()> {
    let history = client.history().await;
    if history.is_failed() {
        tracing::warn!("History unavailable, listing no users");
    }

    let users = list_participants(history.events());
    let totals = join_all(users.iter().map(|u| client.get_total_owed(u))).await;

    let rows: Vec<UserRow> = users
        .iter()
        .zip(totals)
        .map(|(user, total_owed)| UserRow {
            address: user.clone(),
            total_owed,
            last_active: last_active_in(&history, user),
        })
        .collect();

    output::output_users(w, format, &rows)
}

pub async fn owed(
    client: &IouClient,
    user: &str,
    format: OutputFormat,
    w: &mut impl Write,
) -> Result<()> {
    let user = Address::new(user);
    let amount = client.get_total_owed(&user).await;
    output::output_owed(w, format, &user, amount)
}

pub async fn last_active(
    client: &IouClient,
    user: &str,
    format: OutputFormat,
    w: &mut impl Write,
) -> Result<()> {
    let user = Address::new(user);
    let timestamp = client.get_last_active(&user).await;
    output::output_last_active(w, format, &user, timestamp)
}

/// Record an IOU, then report the sweep that followed it
pub async fn add(
    client: &IouClient,
    creditor: &str,
    amount: u32,
    format: OutputFormat,
    w: &mut impl Write,
) -> Result<()> {
    let creditor = Address::new(creditor);
    tracing::info!("Adding IOU of {} to {}", amount, creditor);

    let report = client.add_iou(&creditor, u64::from(amount)).await?;
    output::output_sweep(w, format, &report)
}

pub async fn sweep(client: &IouClient, format: OutputFormat, w: &mut impl Write) -> Result<()> {
    let report = client.remove_cycle().await;
    output::output_sweep(w, format, &report)
}

pub async fn graph(client: &IouClient, format: OutputFormat, w: &mut impl Write) -> Result<()> {
    let graph = client.snapshot().await;
    output::output_graph(w, format, &graph)
}
