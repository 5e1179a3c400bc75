// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

use crate::attributes::AttributeStore;
use crate::collector::crash_handler::{self, ReporterContext};
use crate::collector::dump_context::{self, DumpContext};
use crate::collector::dump_producer::DumpProducer;
use crate::collector::signal_handler_manager::register_crash_handlers;
use crate::report::uploader;
use crate::shared::configuration::ReporterConfig;
use crate::shared::constants;
use anyhow::Context as _;
use libcourier_common::threading::get_current_thread_id;
use std::collections::HashMap;
use std::fs;
use tracing::{debug, warn};

/// Initialize the crash reporter: open the report directory, write the
/// bundled certificate, seed the attribute store, install the signal
/// handlers, and kick off the recovery/upload pass for reports left behind
/// by earlier process instances.
///
/// `attributes` are the host's initial annotations; `format` and
/// `thread.main` are seeded first, so a host key of the same name wins.
///
/// PRECONDITIONS:
///     Call from the process's primary thread; its id becomes `thread.main`.
/// SAFETY:
///     Crash handling functions are not reentrant.
///     No other crash handling functions should be called concurrently.
/// ATOMICITY:
///     One-shot. A second call fails and changes nothing. Failure partway
///     through leaves the feature inert, never broken.
pub fn initialize(
    config: ReporterConfig,
    attributes: HashMap<String, String>,
    producer: Box<dyn DumpProducer>,
) -> anyhow::Result<()> {
    // Fail fast on re-initialization before touching the live store's
    // canonical file; the context swap below is the authoritative guard.
    anyhow::ensure!(
        crash_handler::context().is_none(),
        "the crash reporter is already initialized"
    );

    fs::create_dir_all(config.report_dir()).with_context(|| {
        format!(
            "could not create report directory {}",
            config.report_dir().display()
        )
    })?;
    if let (Some(pem), Some(path)) = (config.certificate_pem(), config.certificate_path()) {
        fs::write(&path, pem)
            .with_context(|| format!("could not write certificate {}", path.display()))?;
    }

    let main_thread_id = get_current_thread_id();
    let store = AttributeStore::new(config.canonical_attributes_path());
    let mut seed = HashMap::from([
        (
            constants::KEY_FORMAT.to_string(),
            constants::FORMAT_MINIDUMP.to_string(),
        ),
        (
            constants::KEY_MAIN_THREAD.to_string(),
            main_thread_id.to_string(),
        ),
    ]);
    seed.extend(attributes);
    store.seed(seed)?;

    crash_handler::install_context(ReporterContext {
        config,
        store,
        producer,
        main_thread_id,
    })?;
    // The context was installed just above; re-reading it hands out the
    // 'static borrow the signal handlers and the uploader thread need.
    let context = crash_handler::context()
        .ok_or_else(|| anyhow::anyhow!("reporter context vanished during initialization"))?;

    register_crash_handlers(&context.config)?;
    uploader::spawn_drain_thread();
    Ok(())
}

/// Adds or overwrites one shared annotation and synchronously rewrites the
/// canonical attribute file. Before initialization this is a logged no-op.
pub fn add_attribute(key: impl Into<String>, value: impl Into<String>) -> anyhow::Result<()> {
    let Some(context) = crash_handler::context() else {
        warn!("the crash reporter is not initialized; dropping attribute");
        return Ok(());
    };
    context.store.set(key, value)
}

/// Removes a shared annotation. Returns whether it was present. Before
/// initialization this is a logged no-op.
pub fn remove_attribute(key: &str) -> anyhow::Result<bool> {
    let Some(context) = crash_handler::context() else {
        warn!("the crash reporter is not initialized; nothing to remove");
        return Ok(false);
    };
    context.store.remove(key)
}

/// Captures and commits a report for the current process state without
/// crashing. `message` becomes the report's `error.message`;
/// `set_main_thread_as_faulting_thread` marks the main thread as faulting
/// via `_mod_faulting_tid`. Neither touches the shared attribute store.
///
/// Any number of these may run concurrently on different threads; each
/// request is tracked by its own registry entry, with no shared sequencing.
pub fn dump_without_crash(
    message: Option<&str>,
    set_main_thread_as_faulting_thread: bool,
) -> anyhow::Result<()> {
    let Some(context) = crash_handler::context() else {
        warn!("the crash reporter is not initialized; ignoring dump request");
        return Ok(());
    };
    let key = dump_context::registry().register(DumpContext {
        message: message.map(str::to_string),
        set_main_thread_as_faulting_thread,
    });
    let report = crash_handler::produce_and_commit(context, Some(key))?;
    debug!("committed explicit dump {}", report.id());
    Ok(())
}

/// Stops uploads. Capture and commit keep running, so reports accumulate on
/// disk for a later `enable`. Idempotent.
pub fn disable() {
    crash_handler::set_uploads_enabled(false);
}

/// Re-enables uploads after a `disable`. Idempotent.
pub fn enable() {
    crash_handler::set_uploads_enabled(true);
}
