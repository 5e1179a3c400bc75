// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

//! Correlates in-flight "dump without crashing" requests with the completion
//! path. The underlying dump machinery only carries an opaque integer handle
//! through its callback, so per-request data lives here, keyed by that
//! handle, instead of riding through raw pointer casts.

use libcourier_common::MutexExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering::SeqCst};
use std::sync::{LazyLock, Mutex};

/// Per-request data for one explicit dump: everything a single report may
/// override without touching the shared attribute store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpContext {
    pub message: Option<String>,
    pub set_main_thread_as_faulting_thread: bool,
}

pub(crate) struct DumpContextRegistry {
    next_key: AtomicU64,
    entries: Mutex<HashMap<u64, DumpContext>>,
}

impl DumpContextRegistry {
    fn new() -> Self {
        Self {
            next_key: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Stores `context` under a fresh key. Keys are never reused.
    pub fn register(&self, context: DumpContext) -> u64 {
        let key = self.next_key.fetch_add(1, SeqCst);
        self.entries.lock_or_panic().insert(key, context);
        key
    }

    /// Removes and returns the context for `key`. None is a valid outcome:
    /// the fatal path never registered anything.
    pub fn take(&self, key: u64) -> Option<DumpContext> {
        self.entries.lock_or_panic().remove(&key)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock_or_panic().len()
    }
}

static REGISTRY: LazyLock<DumpContextRegistry> = LazyLock::new(DumpContextRegistry::new);

pub(crate) fn registry() -> &'static DumpContextRegistry {
    &REGISTRY
}
