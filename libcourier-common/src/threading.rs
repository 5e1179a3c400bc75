// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

/// Returns a numeric identifier for the current OS thread.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn get_current_thread_id() -> i64 {
    // SAFETY: syscall(SYS_gettid) has no preconditions for current thread.
    unsafe { libc::syscall(libc::SYS_gettid) as i64 }
}

/// Returns a numeric identifier for the current OS thread.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn get_current_thread_id() -> i64 {
    let mut tid: u64 = 0;
    // SAFETY: `pthread_threadid_np` has no preconditions for the current
    // thread when pthread_t is 0 and the output pointer is valid.
    let rc = unsafe { libc::pthread_threadid_np(0, &mut tid) };
    debug_assert_eq!(rc, 0);
    tid as i64
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
compile_error!("libcourier_common::threading::get_current_thread_id is unsupported on this platform");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_ids_are_nonzero_and_distinct() {
        let here = get_current_thread_id();
        let there = std::thread::spawn(get_current_thread_id).join().unwrap();
        assert!(here > 0);
        assert!(there > 0);
        assert_ne!(here, there);
    }
}
