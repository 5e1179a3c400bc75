// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0
#![cfg(unix)]

/// Exit the process immediately without running atexit handlers or unwinding.
///
/// Only async-signal-safe: intended for unrecoverable states inside signal
/// handlers where returning or panicking would be worse.
pub fn terminate() -> ! {
    // SAFETY: `_exit` is async-signal-safe and does not return.
    unsafe { libc::_exit(128 + libc::SIGABRT) }
}
