//! Shared mirror pipeline entrypoint used by the CLI.

use relmirror_core::MirrorConfig;

use crate::api::Collaborators;
use crate::mirror::{ReleaseMirror, RunReport};
use crate::transfer::StagingSweep;

/// Run one complete mirror pass.
///
/// Staging files are swept on the way out even if the pass ends early, and
/// the final ledger totals are logged.
pub fn run(config: &MirrorConfig, parts: Collaborators<'_>) -> RunReport {
    let _sweep = StagingSweep::new(&config.staging_dir);
    tracing::info!(
        source = %config.source,
        target = %config.target,
        ledger = %config.ledger_path.display(),
        "starting release mirror"
    );

    let mut mirror = ReleaseMirror::new(config, parts);
    let report = mirror.run();

    tracing::info!(
        releases = report.totals.releases,
        assets = report.totals.assets,
        source_codes = report.totals.source_codes,
        transferred = report.transferred(),
        failed = report.failed(),
        "mirror run finished"
    );
    if report.persistence_failures > 0 {
        tracing::warn!(
            failures = report.persistence_failures,
            "ledger could not be saved every time; the next run will redo that work"
        );
    }
    report
}
