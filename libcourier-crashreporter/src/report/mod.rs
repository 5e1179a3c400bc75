// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

pub mod commit;
pub mod scanner;
pub mod uploader;

use crate::shared::constants;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A 36-character report identifier in the canonical UUID shape.
///
/// The id doubles as the file stem of both artifacts of a report, so it must
/// never contain a dot or a path separator; the shape check guarantees that.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReportId(String);

impl ReportId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accepts `candidate` only if it already has the 8-4-4-4-12 hex shape.
    pub fn from_guid(candidate: &str) -> Option<Self> {
        has_report_id_shape(candidate).then(|| Self(candidate.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn has_report_id_shape(candidate: &str) -> bool {
    candidate.len() == constants::REPORT_ID_LEN
        && candidate.bytes().enumerate().all(|(i, b)| match i {
            8 | 13 | 18 | 23 => b == b'-',
            _ => b.is_ascii_hexdigit(),
        })
}

/// The two sibling artifacts of a committed report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReport {
    id: ReportId,
    dump_path: PathBuf,
    attributes_path: PathBuf,
}

impl PendingReport {
    pub fn in_dir(report_dir: &Path, id: ReportId) -> Self {
        let dump_path = report_dir.join(format!("{id}{}", constants::PENDING_DUMP_SUFFIX));
        let attributes_path = report_dir.join(format!("{id}{}", constants::ATTRIBUTES_SUFFIX));
        Self {
            id,
            dump_path,
            attributes_path,
        }
    }

    pub fn id(&self) -> &ReportId {
        &self.id
    }

    pub fn dump_path(&self) -> &Path {
        &self.dump_path
    }

    pub fn attributes_path(&self) -> &Path {
        &self.attributes_path
    }

    /// A report only counts as committed once the `.pending` file exists.
    pub fn is_committed(&self) -> bool {
        self.dump_path.exists()
    }

    /// Removes both artifacts. Files that are already gone are fine: another
    /// process instance may have drained this report first.
    pub fn delete(&self) -> io::Result<()> {
        remove_file_if_exists(&self.dump_path)?;
        remove_file_if_exists(&self.attributes_path)
    }
}

pub(crate) fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
