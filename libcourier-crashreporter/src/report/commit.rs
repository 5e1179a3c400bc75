// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

//! The rename step that makes a report durable.
//!
//! `rename(2)` is the only atomicity primitive the report directory gets:
//! it either fully succeeds or fully fails, and it is what arbitrates
//! between a crashing process, a still-draining uploader from the previous
//! launch, and the next launch's scanner. The attribute file is renamed
//! first and the `.pending` dump last, so the `.pending` name only ever
//! appears once everything the uploader might want is in place. Dying
//! between the two renames leaves an orphan attribute file, which the
//! invariant already declares garbage and the next drain sweeps.

use super::{PendingReport, ReportId};
use anyhow::Context;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Moves a just-produced raw dump and attribute snapshot into the pending
/// namespace. Runs on the crash path, so everything is single-shot: a failed
/// rename is reported, never retried.
///
/// The attribute rename is best-effort. A report whose attribute file could
/// not be moved still commits; the uploader treats the missing file as "no
/// attributes".
pub fn commit_report(
    report_dir: &Path,
    id: ReportId,
    raw_dump: &Path,
    raw_attributes: &Path,
) -> anyhow::Result<PendingReport> {
    let report = PendingReport::in_dir(report_dir, id);

    if let Err(e) = fs::rename(raw_attributes, report.attributes_path()) {
        warn!(
            "could not commit attributes {} for report {}: {e}",
            raw_attributes.display(),
            report.id()
        );
    }

    fs::rename(raw_dump, report.dump_path()).with_context(|| {
        format!(
            "could not commit dump {} for report {}",
            raw_dump.display(),
            report.id()
        )
    })?;

    Ok(report)
}
