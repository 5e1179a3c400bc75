// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

pub mod codec;

use anyhow::Context;
use libcourier_common::MutexExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::AtomicPtr;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::Mutex;

/// Shared key/value annotations attached to every report.
///
/// All mutation goes through one mutex and synchronously rewrites the
/// canonical attribute file, so whatever is on disk always reflects the last
/// completed mutation. Mutation also republishes the map through an atomic
/// pointer; the crash path reads that pointer without taking any lock, since
/// a mutex held by the faulting thread itself would deadlock the handler.
/// Superseded snapshots are intentionally leaked: another thread may be
/// crashing right now while still holding the previous pointer.
pub struct AttributeStore {
    inner: Mutex<HashMap<String, String>>,
    published: AtomicPtr<HashMap<String, String>>,
    canonical_path: PathBuf,
}

impl AttributeStore {
    pub fn new(canonical_path: PathBuf) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            published: AtomicPtr::new(ptr::null_mut()),
            canonical_path,
        }
    }

    pub fn canonical_path(&self) -> &Path {
        &self.canonical_path
    }

    /// Bulk-inserts `entries`, then persists and republishes once.
    pub fn seed(
        &self,
        entries: impl IntoIterator<Item = (String, String)>,
    ) -> anyhow::Result<()> {
        let mut guard = self.inner.lock_or_panic();
        guard.extend(entries);
        self.persist_and_publish(&guard)
    }

    /// Inserts or overwrites one entry and synchronously rewrites the
    /// canonical attribute file.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> anyhow::Result<()> {
        let mut guard = self.inner.lock_or_panic();
        guard.insert(key.into(), value.into());
        self.persist_and_publish(&guard)
    }

    /// Removes an entry. Returns whether it was present; the canonical file
    /// is only rewritten when it was.
    pub fn remove(&self, key: &str) -> anyhow::Result<bool> {
        let mut guard = self.inner.lock_or_panic();
        if guard.remove(key).is_none() {
            return Ok(false);
        }
        self.persist_and_publish(&guard)?;
        Ok(true)
    }

    /// Returns a copy of the current map with `overrides` applied on top.
    ///
    /// Lock-free: reads the last published snapshot, so it is safe to call
    /// from the crash handler even if a mutator holds the store lock.
    pub fn snapshot_merged(
        &self,
        overrides: impl IntoIterator<Item = (String, String)>,
    ) -> HashMap<String, String> {
        let ptr = self.published.load(SeqCst);
        // SAFETY: every pointer stored in `published` comes from
        // `Box::into_raw` and is never freed, so a loaded value stays valid
        // for the rest of the process lifetime.
        let mut snapshot = if ptr.is_null() {
            HashMap::new()
        } else {
            unsafe { (*ptr).clone() }
        };
        for (key, value) in overrides {
            snapshot.insert(key, value);
        }
        snapshot
    }

    /// The current map without overrides.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.snapshot_merged([])
    }

    fn persist_and_publish(&self, map: &HashMap<String, String>) -> anyhow::Result<()> {
        // Publish before touching the filesystem: a crash during the write
        // must still see the new entry.
        let fresh = Box::into_raw(Box::new(map.clone()));
        let _superseded = self.published.swap(fresh, SeqCst);
        codec::serialize_to_file(map, &self.canonical_path).with_context(|| {
            format!(
                "could not rewrite attribute file {}",
                self.canonical_path.display()
            )
        })
    }
}
