// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

//! On-device crash reporting: capture, durable commit, recovery, upload.
//!
//! Architecturally the crate has three moving parts:
//! 1. A signal handler which catches the UNIX signals associated with a crash
//!    (SIGSEGV, SIGBUS, SIGABRT, ...) on whichever thread faulted. The handler
//!    runs under a constrained environment where many standard operations are
//!    illegal (<https://man7.org/linux/man-pages/man7/signal-safety.7.html>);
//!    in particular mutexes are off the table, so everything it needs is
//!    published ahead of time through atomics. It snapshots the process
//!    attributes, asks the configured dump producer to write a raw dump, and
//!    commits both files into the pending namespace with filesystem renames
//!    before chaining the previously installed handler. The same completion
//!    path serves explicit "dump without crashing" requests, which may run
//!    concurrently on any number of threads.
//! 2. An on-disk protocol: a committed report is the sibling pair
//!    `<id>.dmp.pending` + `<id>.attributes` in the report directory. The
//!    rename into the `.pending` name is the commit point; everything else in
//!    the directory is transient or garbage. This is what lets a later
//!    process instance resume where a dead one left off.
//! 3. A recovery pass: shortly after initialization, a detached background
//!    thread scans the report directory for reports left behind by earlier
//!    process instances and uploads a bounded number of them, deleting each
//!    one only once the collector acknowledged it. Upload failures leave the
//!    files untouched; retries are paced by app restarts.
#![cfg(unix)]
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod api;
mod attributes;
mod collector;
mod report;
mod shared;

pub use api::{
    add_attribute, disable, dump_without_crash, enable, initialize, remove_attribute,
};
pub use libcourier_common::Endpoint;
pub use attributes::codec;
pub use attributes::AttributeStore;
pub use collector::dump_context::DumpContext;
pub use collector::dump_producer::{BufferDumpProducer, DumpProducer};
pub use report::scanner::{scan_orphan_attributes, scan_pending_reports};
pub use report::uploader::{drain_pending_reports, DrainSummary};
pub use report::{PendingReport, ReportId};
pub use shared::configuration::ReporterConfig;
pub use shared::constants;

use nix::sys::signal::Signal;

/// The signals registered when the configuration does not name any.
pub fn default_signals() -> Vec<i32> {
    vec![libc::SIGABRT, libc::SIGBUS, libc::SIGSEGV, libc::SIGILL]
}

pub fn signal_from_signum(signum: i32) -> anyhow::Result<Signal> {
    Ok(Signal::try_from(signum)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_signals_are_valid() {
        for signum in default_signals() {
            signal_from_signum(signum).unwrap();
        }
    }

    #[test]
    fn test_signal_from_signum_rejects_garbage() {
        assert!(signal_from_signum(-1).is_err());
        assert!(signal_from_signum(4096).is_err());
    }
}
