// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

//! The full public lifecycle in one process: initialization is one-shot and
//! global, so everything that depends on it lives in this single test.

#![cfg(unix)]

use libcourier_crashreporter::{
    add_attribute, codec, constants, dump_without_crash, initialize, remove_attribute,
    scan_pending_reports, BufferDumpProducer, Endpoint, PendingReport, ReporterConfig,
};
use std::collections::HashMap;
use std::path::Path;

fn config_for(dir: &Path) -> ReporterConfig {
    // Nothing listens on this endpoint: the launch-time drain thread must
    // not be able to delete the reports this test asserts on.
    ReporterConfig::new(
        Endpoint::new("http://127.0.0.1:9/api/post").unwrap(),
        dir.to_path_buf(),
        vec![],
        vec![],
        false,
        false,
        Some(b"-----BEGIN CERTIFICATE-----\nplaceholder\n-----END CERTIFICATE-----\n".to_vec()),
    )
    .unwrap()
}

#[test]
fn test_initialize_dump_and_commit_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());

    initialize(
        config.clone(),
        HashMap::from([("app.name".to_string(), "demo".to_string())]),
        Box::new(BufferDumpProducer::new(b"MDMP\x01".to_vec())),
    )
    .unwrap();

    // One-shot: a second initialization fails and changes nothing.
    assert!(initialize(
        config.clone(),
        HashMap::new(),
        Box::new(BufferDumpProducer::new(vec![])),
    )
    .is_err());

    // The ambient files written by initialization.
    assert!(dir.path().join("courier_attributes").exists());
    assert!(dir.path().join("courier-cacert.pem").exists());
    let canonical = codec::read_attributes_file(&dir.path().join("courier_attributes"));
    assert_eq!(
        canonical.get(constants::KEY_FORMAT).map(String::as_str),
        Some(constants::FORMAT_MINIDUMP)
    );
    assert!(canonical.contains_key(constants::KEY_MAIN_THREAD));
    assert_eq!(canonical.get("app.name").map(String::as_str), Some("demo"));

    // An attribute added just before a dump lands in the committed file.
    add_attribute("k", "v").unwrap();
    dump_without_crash(Some("checkpoint"), true).unwrap();

    let ids = scan_pending_reports(dir.path()).unwrap();
    assert_eq!(ids.len(), 1);
    let report = PendingReport::in_dir(dir.path(), ids[0].clone());
    let attributes = codec::read_attributes_file(report.attributes_path());
    assert_eq!(attributes.get("k").map(String::as_str), Some("v"));
    assert_eq!(
        attributes.get(constants::KEY_ERROR_MESSAGE).map(String::as_str),
        Some("checkpoint")
    );
    // The faulting-thread override points at the thread that initialized.
    assert_eq!(
        attributes.get(constants::KEY_FAULTING_TID),
        attributes.get(constants::KEY_MAIN_THREAD)
    );
    assert_eq!(std::fs::read(report.dump_path()).unwrap(), b"MDMP\x01");

    // Per-report overrides never leak back into the live store.
    let canonical = codec::read_attributes_file(&dir.path().join("courier_attributes"));
    assert!(!canonical.contains_key(constants::KEY_ERROR_MESSAGE));
    assert!(!canonical.contains_key(constants::KEY_FAULTING_TID));

    // Removal rewrites the canonical file too.
    assert!(remove_attribute("k").unwrap());
    let canonical = codec::read_attributes_file(&dir.path().join("courier_attributes"));
    assert!(!canonical.contains_key("k"));

    // Concurrent explicit dumps each get their own report.
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                dump_without_crash(Some(&format!("snapshot {i}")), false).unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(scan_pending_reports(dir.path()).unwrap().len(), 5);
}
