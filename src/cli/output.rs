//! Output formatting module
//!
//! This module renders query results, sweep reports and debt graphs for the
//! different output formats.

use super::OutputFormat;
use crate::chain::{Address, Amount};
use crate::ledger::{CancellationOutcome, DebtGraph, SweepReport};
use crate::{Error, Result};
use chrono::DateTime;
use serde::Serialize;
use serde_json::json;
use std::io::Write;

/// One line of the `users` listing
#[derive(Debug, Clone, Serialize)]
pub struct UserRow {
    pub address: Address,
    pub total_owed: Amount,
    pub last_active: Option<u64>,
}

/// Human-readable UTC time for a block timestamp
pub fn format_timestamp(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

fn dot_unsupported(what: &str) -> Error {
    Error::custom(format!(
        "DOT output is only available for the graph command, not {}",
        what
    ))
}

fn write_json(w: &mut impl Write, value: &serde_json::Value) -> Result<()> {
    serde_json::to_writer_pretty(&mut *w, value)?;
    writeln!(w)?;
    Ok(())
}

pub fn output_users(w: &mut impl Write, format: OutputFormat, rows: &[UserRow]) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(
            w,
            &json!({
                "summary": {
                    "total_users": rows.len(),
                    "total_outstanding": rows.iter().map(|r| r.total_owed).sum::<Amount>(),
                },
                "users": rows.iter().map(|row| {
                    json!({
                        "address": row.address,
                        "total_owed": row.total_owed,
                        "last_active": row.last_active,
                        "last_active_utc": row.last_active.map(format_timestamp),
                    })
                }).collect::<Vec<_>>(),
            }),
        ),
        OutputFormat::Table => {
            writeln!(w, "Users: {}", rows.len())?;
            if rows.is_empty() {
                return Ok(());
            }
            writeln!(w, "{:-<88}", "")?;
            writeln!(w, "{:<44} {:>14} {:>27}", "Address", "Owes", "Last Active")?;
            writeln!(w, "{:-<88}", "")?;
            for row in rows {
                let last = row
                    .last_active
                    .map(format_timestamp)
                    .unwrap_or_else(|| "never".to_string());
                writeln!(w, "{:<44} {:>14} {:>27}", row.address, row.total_owed, last)?;
            }
            Ok(())
        }
        OutputFormat::Dot => Err(dot_unsupported("users")),
    }
}

pub fn output_owed(
    w: &mut impl Write,
    format: OutputFormat,
    user: &Address,
    amount: Amount,
) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(w, &json!({ "address": user, "total_owed": amount })),
        OutputFormat::Table => {
            writeln!(w, "{} owes {}", user, amount)?;
            Ok(())
        }
        OutputFormat::Dot => Err(dot_unsupported("owed")),
    }
}

pub fn output_last_active(
    w: &mut impl Write,
    format: OutputFormat,
    user: &Address,
    timestamp: Option<u64>,
) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(
            w,
            &json!({
                "address": user,
                "last_active": timestamp,
                "last_active_utc": timestamp.map(format_timestamp),
            }),
        ),
        OutputFormat::Table => {
            match timestamp {
                Some(ts) => writeln!(w, "{} last active {} ({})", user, format_timestamp(ts), ts)?,
                None => writeln!(w, "{} has no recorded IOUs", user)?,
            }
            Ok(())
        }
        OutputFormat::Dot => Err(dot_unsupported("last-active")),
    }
}

pub fn output_sweep(w: &mut impl Write, format: OutputFormat, report: &SweepReport) -> Result<()> {
    match format {
        OutputFormat::Json => write_json(
            w,
            &json!({
                "summary": {
                    "candidates": report.outcomes.len(),
                    "cancelled": report.cancelled_count(),
                    "rejected": report.rejected_count(),
                },
                "outcomes": report.outcomes,
            }),
        ),
        OutputFormat::Table => {
            writeln!(w, "Debt cycle sweep")?;
            writeln!(w, "{}", "=".repeat(60))?;
            writeln!(w, "  Candidates: {}", report.outcomes.len())?;
            writeln!(w, "  Cancelled: {}", report.cancelled_count())?;
            writeln!(w, "  Rejected: {}", report.rejected_count())?;

            if !report.outcomes.is_empty() {
                writeln!(w)?;
                for outcome in &report.outcomes {
                    match outcome {
                        CancellationOutcome::Cancelled { cycle } => {
                            writeln!(w, "  ✓ {}", cycle)?
                        }
                        CancellationOutcome::Rejected { cycle, reason } => {
                            writeln!(w, "  ✗ {}: {}", cycle, reason)?
                        }
                    }
                }
            }
            Ok(())
        }
        OutputFormat::Dot => Err(dot_unsupported("sweep reports")),
    }
}

pub fn output_graph(w: &mut impl Write, format: OutputFormat, graph: &DebtGraph) -> Result<()> {
    match format {
        OutputFormat::Dot => {
            write!(w, "{}", graph.to_dot())?;
            Ok(())
        }
        OutputFormat::Json => write_json(
            w,
            &json!({
                "stats": graph.stats(),
                "debts": graph.debts().into_iter().map(|(debtor, creditor, amount)| {
                    json!({ "debtor": debtor, "creditor": creditor, "amount": amount })
                }).collect::<Vec<_>>(),
            }),
        ),
        OutputFormat::Table => {
            let stats = graph.stats();
            writeln!(w, "Debt graph")?;
            writeln!(w, "{}", "=".repeat(60))?;
            writeln!(w, "  Participants: {}", stats.participants)?;
            writeln!(w, "  Debts:        {}", stats.debts)?;
            writeln!(w, "  Outstanding:  {}", stats.total_outstanding)?;
            writeln!(
                w,
                "  Debt loops:   {}",
                if stats.has_cycles { "yes" } else { "no" }
            )?;

            let debts = graph.debts();
            if !debts.is_empty() {
                writeln!(w)?;
                writeln!(w, "{:<14} {:<14} {:>12}", "Debtor", "Creditor", "Amount")?;
                writeln!(w, "{:-<42}", "")?;
                for (debtor, creditor, amount) in debts {
                    writeln!(
                        w,
                        "{:<14} {:<14} {:>12}",
                        debtor.short(),
                        creditor.short(),
                        amount
                    )?;
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::CyclePath;

    fn addr(n: u8) -> Address {
        Address::new(format!("0x{:040x}", n))
    }

    fn text(bytes: Vec<u8>) -> String {
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
        assert_eq!(format_timestamp(1_700_000_000), "2023-11-14 22:13:20 UTC");
    }

    #[test]
    fn test_output_users_table() {
        let rows = vec![
            UserRow {
                address: addr(1),
                total_owed: 13,
                last_active: Some(1_700_000_000),
            },
            UserRow {
                address: addr(2),
                total_owed: 0,
                last_active: None,
            },
        ];

        let mut out = Vec::new();
        output_users(&mut out, OutputFormat::Table, &rows).unwrap();
        let out = text(out);
        assert!(out.contains("Users: 2"));
        assert!(out.contains("2023-11-14 22:13:20 UTC"));
        assert!(out.contains("never"));
    }

    #[test]
    fn test_output_last_active_json() {
        let mut out = Vec::new();
        output_last_active(&mut out, OutputFormat::Json, &addr(1), None).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert!(value["last_active"].is_null());
        assert_eq!(value["address"], addr(1).as_str());
    }

    #[test]
    fn test_output_sweep() {
        let cycle = CyclePath {
            participants: vec![addr(1), addr(2)],
            amount: 3,
        };
        let report = SweepReport {
            outcomes: vec![
                CancellationOutcome::Cancelled {
                    cycle: cycle.clone(),
                },
                CancellationOutcome::Rejected {
                    cycle,
                    reason: "Ledger error: edge holds 0".to_string(),
                },
            ],
        };

        let mut out = Vec::new();
        output_sweep(&mut out, OutputFormat::Json, &report).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["summary"]["cancelled"], 1);
        assert_eq!(value["outcomes"][1]["status"], "rejected");
        assert_eq!(value["outcomes"][0]["cycle"]["amount"], 3);

        let mut out = Vec::new();
        output_sweep(&mut out, OutputFormat::Table, &report).unwrap();
        assert!(text(out).contains("Rejected: 1"));

        assert!(output_sweep(&mut Vec::new(), OutputFormat::Dot, &report).is_err());
    }

    #[test]
    fn test_output_graph_json() {
        let mut graph = DebtGraph::new();
        graph.set_debt(&addr(1), &addr(2), 4);

        let mut out = Vec::new();
        output_graph(&mut out, OutputFormat::Json, &graph).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["stats"]["total_outstanding"], 4);
        assert_eq!(value["debts"][0]["debtor"], addr(1).as_str());
    }
}
