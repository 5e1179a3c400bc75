// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

//! Launch-time enumeration of reports left behind by earlier process
//! instances. Everything here is read-only; acting on the results is the
//! uploader's business.

use super::ReportId;
use crate::shared::constants;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// Lists the committed reports in `report_dir`, sorted by id.
///
/// Only names of the exact shape `<36-char id>.dmp.pending` count; the id
/// shape check keeps out partial commits, transient files, and anything
/// with extra dot segments. Sorting makes the per-launch upload selection
/// deterministic.
pub fn scan_pending_reports(report_dir: &Path) -> anyhow::Result<Vec<ReportId>> {
    let mut ids = Vec::new();
    for entry in fs::read_dir(report_dir)
        .with_context(|| format!("could not list report directory {}", report_dir.display()))?
    {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(stem) = name.strip_suffix(constants::PENDING_DUMP_SUFFIX) else {
            continue;
        };
        if let Some(id) = ReportId::from_guid(stem) {
            ids.push(id);
        }
    }
    ids.sort();
    Ok(ids)
}

/// Lists attribute files whose report will never be uploaded: there is no
/// committed dump and no raw dump still on its way to a commit. These are
/// the residue of a process that died between the two commit renames.
pub fn scan_orphan_attributes(report_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut orphans = Vec::new();
    for entry in fs::read_dir(report_dir)
        .with_context(|| format!("could not list report directory {}", report_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(stem) = name.strip_suffix(constants::ATTRIBUTES_SUFFIX) else {
            continue;
        };
        let Some(id) = ReportId::from_guid(stem) else {
            continue;
        };
        let committed = report_dir.join(format!("{id}{}", constants::PENDING_DUMP_SUFFIX));
        let in_flight = report_dir.join(format!("{id}{}", constants::RAW_DUMP_SUFFIX));
        if !committed.exists() && !in_flight.exists() {
            orphans.push(entry.path());
        }
    }
    orphans.sort();
    Ok(orphans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_scan_matches_only_exact_pending_names() {
        let dir = tempfile::tempdir().unwrap();
        let id = ReportId::generate();
        touch(dir.path(), &format!("{id}.dmp.pending"));
        // Near misses the scanner must skip.
        touch(dir.path(), "short.dmp.pending");
        touch(dir.path(), &format!("{id}.dmp"));
        touch(dir.path(), &format!("{id}.attributes"));
        touch(dir.path(), &format!("{id}.extra.dmp.pending"));
        touch(dir.path(), "courier_attributes");
        touch(
            dir.path(),
            "zzzzzzzz-zzzz-zzzz-zzzz-zzzzzzzzzzzz.dmp.pending",
        );

        assert_eq!(scan_pending_reports(dir.path()).unwrap(), vec![id]);
    }

    #[test]
    fn test_scan_returns_sorted_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut ids: Vec<ReportId> = (0..5).map(|_| ReportId::generate()).collect();
        for id in &ids {
            touch(dir.path(), &format!("{id}.dmp.pending"));
        }
        ids.sort();
        assert_eq!(scan_pending_reports(dir.path()).unwrap(), ids);
    }

    #[test]
    fn test_scan_missing_directory_is_an_error() {
        assert!(scan_pending_reports(Path::new("/nonexistent-report-dir")).is_err());
    }

    #[test]
    fn test_orphan_attributes_detection() {
        let dir = tempfile::tempdir().unwrap();
        let orphan = ReportId::generate();
        let committed = ReportId::generate();
        let in_flight = ReportId::generate();
        touch(dir.path(), &format!("{orphan}.attributes"));
        touch(dir.path(), &format!("{committed}.attributes"));
        touch(dir.path(), &format!("{committed}.dmp.pending"));
        touch(dir.path(), &format!("{in_flight}.attributes"));
        touch(dir.path(), &format!("{in_flight}.dmp"));
        touch(dir.path(), "courier_attributes");

        let orphans = scan_orphan_attributes(dir.path()).unwrap();
        assert_eq!(orphans, vec![dir.path().join(format!("{orphan}.attributes"))]);
    }
}
