// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

use super::crash_handler::handle_posix_sigaction;
use crate::shared::configuration::ReporterConfig;
use crate::signal_from_signum;
use libc::{
    c_void, mmap, sigaltstack, siginfo_t, MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_NONE, PROT_READ,
    PROT_WRITE, SIGSTKSZ,
};
use libcourier_common::unix_utils::terminate;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler};
use std::ptr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::SeqCst;

// Linux supports signal numbers up to 64 inclusive.
// https://man7.org/linux/man-pages/man7/signal.7.html
const MAX_SIGNALS: usize = 65;
static mut HANDLERS: [Option<(signal::Signal, SigAction)>; MAX_SIGNALS] = [None; MAX_SIGNALS];
static INIT_STARTED: AtomicBool = AtomicBool::new(false);
static INIT_FINISHED: AtomicBool = AtomicBool::new(false);

/// Registers UNIX signal handlers for the configured crash signals.
///
/// PRECONDITIONS:
///     The reporter context must already be installed; the handler reads it.
/// SAFETY:
///     Crash handling functions are not guaranteed to be reentrant.
///     No other crash handling functions should be called concurrently.
/// ATOMICITY:
///     Registration itself is not atomic. A crash while this function runs
///     may find the new handler registered but the old one not yet stored;
///     that case is handled by explicitly aborting the process.
pub fn register_crash_handlers(config: &ReporterConfig) -> anyhow::Result<()> {
    // Guarantee that the handler table is only mutated once.
    anyhow::ensure!(
        INIT_STARTED
            .compare_exchange(false, true, SeqCst, SeqCst)
            .is_ok(),
        "Attempted to double register crash handlers"
    );

    for signum in config.signals() {
        anyhow::ensure!(
            *signum >= 0 && *signum < MAX_SIGNALS as i32,
            "Signal {signum} out of range"
        );
    }

    if config.create_alt_stack() {
        // SAFETY: This function has no documented preconditions.
        unsafe { create_alt_stack()? };
    }

    let mut errors = vec![];
    for signum in config.signals() {
        let index = *signum as usize;
        // SAFETY: This function has no documented preconditions.
        match unsafe { register_signal_handler(*signum, config) } {
            // SAFETY: only this function writes `HANDLERS`, and the
            // INIT_STARTED guard above means only one call ever gets here.
            // Readers are gated on INIT_FINISHED, which is still false.
            Ok(handler) => unsafe { HANDLERS[index] = Some(handler) },
            Err(e) => errors.push(format!("Unable to register signal {signum}: {e:?}")),
        };
    }
    INIT_FINISHED.store(true, SeqCst);
    anyhow::ensure!(
        errors.is_empty(),
        "Errors registering signal handlers {errors:?}"
    );
    Ok(())
}

/// Once the crash has been handled, chain to whatever handler was installed
/// before ours, so the host runtime's own crash machinery still runs.
///
/// SAFETY: Must only be invoked from the registered signal handler. If the
/// chain state is unexpectedly missing we `_exit` rather than re-raise.
pub(crate) unsafe fn chain_signal_handler(
    signum: i32,
    sig_info: *mut siginfo_t,
    ucontext: *mut c_void,
) {
    if !INIT_FINISHED.load(SeqCst) {
        eprintln!("Crashed during signal handler setup, cannot chain {signum}, aborting");
        terminate()
    }
    if signum < 0 || signum >= MAX_SIGNALS as i32 {
        eprintln!("Unexpected value for {signum}, cannot chain, aborting");
        terminate()
    }
    // SAFETY: INIT_FINISHED was true, so `HANDLERS` will never be mutated
    // again and reading it is safe.
    if let Some((signal, sigaction)) = &mut unsafe { HANDLERS[signum as usize] } {
        // How we chain depends on what kind of handler we're chaining to.
        // https://man7.org/linux/man-pages/man2/sigaction.2.html
        match sigaction.handler() {
            SigHandler::SigDfl => {
                // Restore the default handler and re-raise so the platform
                // can produce its own core dump / tombstone.
                unsafe { signal::sigaction(*signal, sigaction) }.unwrap_or_else(|_| terminate());
                unsafe { libc::raise(signum) };
            }
            SigHandler::SigIgn => (), // Return and ignore the signal.
            SigHandler::Handler(f) => f(signum),
            SigHandler::SigAction(f) => f(signum, sig_info, ucontext),
        }
    } else {
        eprintln!("Missing chain handler for {signum}, cannot chain, aborting");
        terminate()
    }
}

/// Allocates a signal altstack with a guard page at the end. The default
/// SIGSTKSZ is too small for dump production on several platforms.
unsafe fn create_alt_stack() -> anyhow::Result<()> {
    let page_size = page_size::get();
    let sigalstack_base_size = std::cmp::max(SIGSTKSZ, 16 * page_size);
    let stackp = mmap(
        ptr::null_mut(),
        sigalstack_base_size + page_size,
        PROT_READ | PROT_WRITE,
        MAP_PRIVATE | MAP_ANON,
        -1,
        0,
    );
    anyhow::ensure!(
        stackp != MAP_FAILED,
        "failed to allocate an alternative stack"
    );
    let guard_result = libc::mprotect(stackp, page_size, PROT_NONE);
    anyhow::ensure!(
        guard_result == 0,
        "failed to set up alternative stack guard page"
    );
    let stackp = stackp.add(page_size);

    let stack = libc::stack_t {
        ss_sp: stackp,
        ss_flags: 0,
        ss_size: sigalstack_base_size,
    };
    let rval = sigaltstack(&stack, ptr::null_mut());
    anyhow::ensure!(rval == 0, "sigaltstack failed {rval}");
    Ok(())
}

unsafe fn register_signal_handler(
    signum: i32,
    config: &ReporterConfig,
) -> anyhow::Result<(signal::Signal, SigAction)> {
    let signal_type = signal_from_signum(signum)?;

    let extra_saflags = if config.use_alt_stack() {
        SaFlags::SA_ONSTACK
    } else {
        SaFlags::empty()
    };

    let sig_action = SigAction::new(
        SigHandler::SigAction(handle_posix_sigaction),
        SaFlags::SA_NODEFER | extra_saflags,
        signal::SigSet::empty(),
    );

    let old_handler = signal::sigaction(signal_type, &sig_action)?;
    Ok((signal_type, old_handler))
}
