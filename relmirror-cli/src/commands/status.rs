//! `relmirror status`: what the sync ledger has recorded.

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use relmirror_core::{config::DEFAULT_LEDGER_FILE, LedgerStore, LedgerTotals, LoadSource, SyncLedger};

/// Arguments for `relmirror status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Path of the sync ledger.
    #[arg(long, env = "SYNCED_DATA_FILE", default_value = DEFAULT_LEDGER_FILE)]
    pub ledger: PathBuf,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let store = LedgerStore::new(&self.ledger);
        let (ledger, loaded_from) = store.load_with_source();
        let report = build_report(&ledger, loaded_from);

        if self.json {
            print_json(report)?;
            return Ok(());
        }
        print_table(&store, report);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
struct ReleaseRow {
    release_id: String,
    tag: Option<String>,
    assets: usize,
    archives: usize,
    fully_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    loaded_from: &'static str,
    totals: LedgerTotals,
    releases: Vec<ReleaseRow>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "release")]
    release_id: String,
    #[tabled(rename = "tag")]
    tag: String,
    #[tabled(rename = "assets")]
    assets: usize,
    #[tabled(rename = "archives")]
    archives: usize,
    #[tabled(rename = "fully synced")]
    synced: String,
}

/// One row per release id seen in any ledger mapping.
fn build_report(ledger: &SyncLedger, loaded_from: LoadSource) -> StatusReport {
    let ids: BTreeSet<&String> = ledger.releases.keys().chain(ledger.assets.keys()).collect();
    let mut releases: Vec<ReleaseRow> = ids
        .into_iter()
        .map(|id| {
            let entry = ledger.releases.get(id);
            let tag = entry.map(|e| e.tag_name.clone());
            let archives = tag
                .as_ref()
                .and_then(|t| ledger.source_codes.get(t))
                .map_or(0, |m| m.len());
            ReleaseRow {
                release_id: id.clone(),
                tag,
                assets: ledger.assets.get(id).map_or(0, |m| m.len()),
                archives,
                fully_synced_at: entry.map(|e| e.fully_synced_at),
            }
        })
        .collect();
    releases.sort_by(|a, b| {
        a.fully_synced_at
            .cmp(&b.fully_synced_at)
            .then_with(|| a.release_id.cmp(&b.release_id))
    });

    StatusReport {
        loaded_from: source_key(loaded_from),
        totals: ledger.totals(),
        releases,
    }
}

fn print_json(report: StatusReport) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(store: &LedgerStore, report: StatusReport) {
    println!(
        "relmirror v{} | {} releases | {} assets | {} archive files",
        env!("CARGO_PKG_VERSION"),
        report.totals.releases,
        report.totals.assets,
        report.totals.source_codes,
    );
    match report.loaded_from {
        "backup" => println!(
            "{}",
            format!("primary ledger unreadable; showing {}", store.backup_path().display()).yellow()
        ),
        "fresh" => {
            println!("No ledger at {}; nothing mirrored yet.", store.path().display());
            return;
        }
        _ => {}
    }
    if report.releases.is_empty() {
        println!("Ledger is empty.");
        return;
    }

    let rows: Vec<StatusTableRow> = report
        .releases
        .into_iter()
        .map(|row| StatusTableRow {
            release_id: row.release_id,
            tag: row.tag.unwrap_or_else(|| "-".to_string()),
            assets: row.assets,
            archives: row.archives,
            synced: row
                .fully_synced_at
                .map(format_age)
                .unwrap_or_else(|| "in progress".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn source_key(source: LoadSource) -> &'static str {
    match source {
        LoadSource::Primary => "primary",
        LoadSource::Backup => "backup",
        LoadSource::Fresh => "fresh",
    }
}

fn format_age(at: DateTime<Utc>) -> String {
    let seconds = Utc::now().signed_duration_since(at).num_seconds().max(0) as u64;
    let short = if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 60 * 60 {
        format!("{}m", seconds / 60)
    } else if seconds < 60 * 60 * 24 {
        format!("{}h", seconds / (60 * 60))
    } else {
        format!("{}d", seconds / (60 * 60 * 24))
    };
    format!("{short} ago")
}
