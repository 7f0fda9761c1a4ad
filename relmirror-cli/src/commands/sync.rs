//! `relmirror sync`: run one mirror pass.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use relmirror_core::{
    config::{DEFAULT_LEDGER_FILE, DEFAULT_RETRY_COUNT},
    ConfigError, MirrorConfig, RepoSlug, RetryPolicy,
};
use relmirror_github::{GitCommitter, GithubClient, HttpDownloader, DEFAULT_API_URL};
use relmirror_sync::{
    pipeline, Collaborators, CommitStatus, LedgerCommitter, ReleasePhase, RunReport, SystemClock,
};

/// Arguments for `relmirror sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Repository to mirror from (`owner/repo`).
    #[arg(long, env = "SOURCE_REPO")]
    pub source: Option<String>,

    /// Repository to mirror into (`owner/repo`); defaults to GITHUB_REPOSITORY.
    #[arg(long, env = "TARGET_REPO")]
    pub target: Option<String>,

    /// Path of the sync ledger.
    #[arg(long, env = "SYNCED_DATA_FILE", default_value = DEFAULT_LEDGER_FILE)]
    pub ledger: PathBuf,

    /// Directory for `temp_*` staging files.
    #[arg(long, default_value = ".")]
    pub staging_dir: PathBuf,

    /// Upload attempts per artifact.
    #[arg(long, env = "RETRY_COUNT", default_value_t = DEFAULT_RETRY_COUNT)]
    pub retry_count: u32,

    /// Seconds to wait between failed upload attempts.
    #[arg(long, env = "RETRY_DELAY", default_value_t = 10)]
    pub retry_delay: u64,

    /// Do not commit the ledger to git after releases that changed.
    #[arg(long)]
    pub no_commit: bool,

    /// Token for the target repository.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Token for the source repository; defaults to the target token.
    #[arg(long, env = "SOURCE_GITHUB_TOKEN", hide_env_values = true)]
    pub source_token: Option<String>,

    /// GitHub API root.
    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let config = self.config().context("invalid mirror configuration")?;
        tracing::debug!(?config, api = %self.api_url, "resolved configuration");
        print_banner(&config, self.token.is_some());

        let target_token = self.token.clone();
        let source_token = self.source_token.clone().or_else(|| target_token.clone());
        let source = GithubClient::with_api_url(config.source.clone(), source_token, &self.api_url);
        let target = GithubClient::with_api_url(config.target.clone(), target_token, &self.api_url);
        let downloader = HttpDownloader::default();
        let committer = GitCommitter::new(".");
        let clock = SystemClock;

        let parts = Collaborators {
            source: &source,
            target: &target,
            downloader: &downloader,
            committer: config
                .commit_ledger
                .then_some(&committer as &dyn LedgerCommitter),
            clock: &clock,
        };
        let report = pipeline::run(&config, parts);
        print_summary(&report);
        Ok(())
    }

    /// Resolve flags and environment into a [`MirrorConfig`].
    pub fn config(&self) -> Result<MirrorConfig, ConfigError> {
        let source = self
            .source
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("SOURCE_REPO"))?
            .parse::<RepoSlug>()?;
        let target = self
            .target
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var("GITHUB_REPOSITORY").ok())
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("TARGET_REPO"))?
            .parse::<RepoSlug>()?;
        let retry = RetryPolicy::new(self.retry_count, Duration::from_secs(self.retry_delay))?;

        Ok(MirrorConfig::new(source, target)
            .with_ledger_path(&self.ledger)
            .with_staging_dir(&self.staging_dir)
            .with_retry(retry)
            .with_commit_ledger(!self.no_commit))
    }
}

fn print_banner(config: &MirrorConfig, has_token: bool) {
    println!("{}", "relmirror".bold());
    println!("  source:  {}", config.source);
    println!("  target:  {}", config.target);
    println!("  ledger:  {}", config.ledger_path.display());
    println!(
        "  retries: {} attempt(s), {}s apart",
        config.retry.count,
        config.retry.delay.as_secs()
    );
    println!(
        "  commit:  {}",
        if config.commit_ledger { "yes" } else { "no" }
    );
    if !has_token {
        println!("  {}", "no GITHUB_TOKEN set; target writes will fail".yellow());
    }
}

fn print_summary(report: &RunReport) {
    if let Some((kind, message)) = &report.fatal {
        println!("{} run aborted ({kind}): {message}", "✗".red().bold());
    }

    for release in &report.releases {
        let mark = match release.phase {
            ReleasePhase::Abandoned => "✗".red().bold(),
            _ if release.failed() > 0 => "!".yellow().bold(),
            _ => "✓".green().bold(),
        };
        let detail = match release.phase {
            ReleasePhase::Abandoned => format!(
                "skipped: {}",
                release.skipped_reason.as_deref().unwrap_or("unknown")
            ),
            ReleasePhase::SkippedNoChange => "up to date".to_string(),
            _ => format!(
                "{} transferred, {} failed{}",
                release.transferred(),
                release.failed(),
                commit_note(&release.commit)
            ),
        };
        println!("{mark} {}: {detail}", release.tag);
    }

    println!(
        "Ledger: {} releases, {} assets, {} archive files",
        report.totals.releases, report.totals.assets, report.totals.source_codes
    );
    if report.failed() > 0 || report.abandoned() > 0 {
        println!(
            "{}",
            format!(
                "{} artifact(s) and {} release(s) will be retried on the next run.",
                report.failed(),
                report.abandoned()
            )
            .yellow()
        );
    }
}

fn commit_note(commit: &CommitStatus) -> String {
    match commit {
        CommitStatus::NotNeeded | CommitStatus::Done(_) => String::new(),
        CommitStatus::Disabled => " (ledger not committed)".to_string(),
        CommitStatus::Failed(message) => format!(" (ledger commit failed: {message})"),
    }
}
