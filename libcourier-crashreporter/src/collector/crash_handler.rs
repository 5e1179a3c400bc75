// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

//! The code that runs while the process is dying.
//!
//! Everything the handler needs is published ahead of time through an
//! `AtomicPtr` that is swapped in once at initialization and never freed;
//! mutexes are not allowed in a signal handler, and the faulting thread may
//! be the very thread that holds them. The handler itself stays single-shot
//! (one crash report per process) and strictly best-effort: any failure
//! degrades to "this report is lost", never to a second crash.

use crate::attributes::{codec, AttributeStore};
use crate::collector::dump_context;
use crate::collector::dump_producer::DumpProducer;
use crate::collector::signal_handler_manager::chain_signal_handler;
use crate::report::{commit, PendingReport, ReportId};
use crate::shared::configuration::ReporterConfig;
use crate::shared::constants;
use libc::{c_void, siginfo_t};
use std::ptr;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64};
use tracing::warn;

/// Everything the crash path may touch, assembled once at initialization.
/// The installed instance is intentionally leaked: a crashing thread may be
/// reading it at any time, so it must live for the rest of the process.
pub(crate) struct ReporterContext {
    pub config: ReporterConfig,
    pub store: AttributeStore,
    pub producer: Box<dyn DumpProducer>,
    pub main_thread_id: i64,
}

static CONTEXT: AtomicPtr<ReporterContext> = AtomicPtr::new(ptr::null_mut());

static UPLOADS_ENABLED: AtomicBool = AtomicBool::new(true);

#[derive(Debug, thiserror::Error)]
pub enum CrashHandlerError {
    #[error("the crash reporter is not initialized")]
    NotInitialized,
    #[error("could not write raw dump: {0}")]
    Dump(#[from] std::io::Error),
    #[error("could not commit report: {0}")]
    Commit(anyhow::Error),
}

/// Installs the process-wide reporter context.
///
/// PRECONDITIONS:
///     None.
/// ATOMICITY:
///     Compare-and-swap from null; a second installation fails rather than
///     replacing state a concurrent crash might be reading.
pub(crate) fn install_context(context: ReporterContext) -> anyhow::Result<()> {
    let fresh = Box::into_raw(Box::new(context));
    if CONTEXT
        .compare_exchange(ptr::null_mut(), fresh, SeqCst, SeqCst)
        .is_err()
    {
        // SAFETY: `fresh` came from Box::into_raw above and was never shared.
        drop(unsafe { Box::from_raw(fresh) });
        anyhow::bail!("the crash reporter is already initialized");
    }
    Ok(())
}

pub(crate) fn context() -> Option<&'static ReporterContext> {
    let ptr = CONTEXT.load(SeqCst);
    // SAFETY: context pointers come from Box::into_raw and are never freed.
    unsafe { ptr.as_ref() }
}

/// Stops the uploader from transmitting anything. Capture and commit keep
/// running, so reports accumulate on disk until re-enabled.
pub(crate) fn set_uploads_enabled(enabled: bool) {
    UPLOADS_ENABLED.store(enabled, SeqCst);
}

pub(crate) fn uploads_enabled() -> bool {
    UPLOADS_ENABLED.load(SeqCst)
}

pub(crate) extern "C" fn handle_posix_sigaction(
    signum: i32,
    sig_info: *mut siginfo_t,
    ucontext: *mut c_void,
) {
    // Handle the signal. Note this has a guard to ensure that we only
    // generate one crash report per process.
    let _ = handle_posix_signal_impl(signum);
    // SAFETY: No preconditions.
    unsafe { chain_signal_handler(signum, sig_info, ucontext) };
}

fn handle_posix_signal_impl(signum: i32) -> Result<(), CrashHandlerError> {
    // One-time guard: in the case where some lower-level signal handler
    // recovered the error we don't want to spam the directory with reports.
    static NUM_TIMES_CALLED: AtomicU64 = AtomicU64::new(0);
    if NUM_TIMES_CALLED.fetch_add(1, SeqCst) > 0 {
        return Ok(());
    }

    let context = context().ok_or(CrashHandlerError::NotInitialized)?;
    let report = produce_and_commit(context, None)?;
    eprintln!("captured crash report {} for signal {signum}", report.id());
    Ok(())
}

/// The shared completion path behind fatal signals and explicit dump
/// requests: write the raw dump, snapshot the attributes, commit.
///
/// May run on an arbitrary, possibly corrupted thread. It takes no locks on
/// shared state (the attribute read is the store's published snapshot) and
/// every filesystem step is single-shot.
pub(crate) fn produce_and_commit(
    context: &ReporterContext,
    context_key: Option<u64>,
) -> Result<PendingReport, CrashHandlerError> {
    let id = report_id(&context.store);
    let report_dir = context.config.report_dir();

    let raw_dump = report_dir.join(format!("{id}{}", constants::RAW_DUMP_SUFFIX));
    context.producer.write_dump(&raw_dump, context_key)?;

    // The registry only ever holds entries for in-flight explicit dump
    // requests; an absent key means the fatal/global path, which uses the
    // live store without per-report overrides.
    let mut overrides = Vec::new();
    if let Some(key) = context_key {
        if let Some(dump_context) = dump_context::registry().take(key) {
            if dump_context.set_main_thread_as_faulting_thread {
                overrides.push((
                    constants::KEY_FAULTING_TID.to_string(),
                    context.main_thread_id.to_string(),
                ));
            }
            if let Some(message) = dump_context.message {
                overrides.push((constants::KEY_ERROR_MESSAGE.to_string(), message));
            }
        }
    }
    let attributes = context.store.snapshot_merged(overrides);

    let raw_attributes = report_dir.join(format!("{id}{}", constants::RAW_ATTRIBUTES_SUFFIX));
    if let Err(e) = codec::serialize_to_file(&attributes, &raw_attributes) {
        warn!("could not write attribute snapshot for report {id}: {e}");
    }

    commit::commit_report(report_dir, id, &raw_dump, &raw_attributes)
        .map_err(CrashHandlerError::Commit)
}

/// A caller-provided `guid` attribute overrides the generated id, as long
/// as it already has the id shape and therefore works as a file stem.
fn report_id(store: &AttributeStore) -> ReportId {
    store
        .snapshot()
        .get(constants::KEY_GUID)
        .and_then(|guid| ReportId::from_guid(guid))
        .unwrap_or_else(ReportId::generate)
}
