// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

//! The launch-time drain: find reports left behind by earlier process
//! instances, upload a bounded number of them, and clean up what will never
//! upload. Runs once per launch on a detached background thread; nothing
//! here is ever surfaced to the host application.

use super::{remove_file_if_exists, scanner, PendingReport, ReportId};
use crate::attributes::codec;
use crate::collector::crash_handler;
use crate::shared::configuration::ReporterConfig;
use crate::shared::constants;
use anyhow::Context;
use std::fs;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, warn};

/// What one drain pass did, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainSummary {
    pub uploaded: usize,
    pub failed: usize,
    pub remaining: usize,
    pub swept_orphans: usize,
    pub pruned: usize,
}

/// Uploads at most [`constants::MAX_UPLOADS_PER_RUN`] pending reports,
/// deleting each one only on a 2xx collector response. Any other outcome
/// leaves the files untouched for the next launch; retries are paced purely
/// by how often the app restarts.
///
/// When uploads are disabled the pass only counts what is pending; capture
/// and commit are unaffected by the gate, so reports keep accumulating.
pub async fn drain_pending_reports(config: &ReporterConfig) -> anyhow::Result<DrainSummary> {
    let report_dir = config.report_dir();
    let mut summary = DrainSummary::default();

    if !crash_handler::uploads_enabled() {
        debug!("uploads are disabled; leaving pending reports in place");
        summary.remaining = scanner::scan_pending_reports(report_dir)?.len();
        return Ok(summary);
    }

    let ids = scanner::scan_pending_reports(report_dir)?;
    if !ids.is_empty() {
        let client = build_client(config)?;
        for id in ids.iter().take(constants::MAX_UPLOADS_PER_RUN) {
            let report = PendingReport::in_dir(report_dir, id.clone());
            match upload_report(&client, config, &report).await {
                Ok(status) if status.is_success() => {
                    // Another process may have drained this report already;
                    // delete tolerates files that are gone.
                    if let Err(e) = report.delete() {
                        warn!("could not delete uploaded report {id}: {e}");
                    }
                    summary.uploaded += 1;
                }
                Ok(status) => {
                    debug!("collector answered {status} for report {id}; keeping files");
                    summary.failed += 1;
                }
                Err(e) => {
                    warn!("upload of report {id} failed: {e:#}");
                    summary.failed += 1;
                }
            }
        }
    }

    for orphan in scanner::scan_orphan_attributes(report_dir)? {
        match remove_file_if_exists(&orphan) {
            Ok(()) => summary.swept_orphans += 1,
            Err(e) => debug!("could not sweep orphan {}: {e}", orphan.display()),
        }
    }

    summary.pruned = prune_over_quota(config)?;
    summary.remaining = scanner::scan_pending_reports(report_dir)?.len();
    Ok(summary)
}

/// One multipart POST: every attribute as a form field, the dump bytes as
/// the `upload_file_minidump` file part, configured attachments as
/// `attachment_<basename>` parts.
async fn upload_report(
    client: &reqwest::Client,
    config: &ReporterConfig,
    report: &PendingReport,
) -> anyhow::Result<reqwest::StatusCode> {
    // Missing attribute file means "no attributes", never a failed upload.
    let attributes = codec::read_attributes_file(report.attributes_path());
    let dump_bytes = fs::read(report.dump_path())
        .with_context(|| format!("could not read dump {}", report.dump_path().display()))?;

    let mut form = reqwest::multipart::Form::new();
    let mut keys: Vec<&String> = attributes.keys().collect();
    keys.sort();
    for key in keys {
        form = form.text(key.clone(), attributes[key].clone());
    }
    form = form.part(
        constants::DUMP_FILE_FIELD,
        reqwest::multipart::Part::bytes(dump_bytes).file_name(format!("{}.dmp", report.id())),
    );
    for attachment in config.attachments() {
        let Some(name) = attachment.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match fs::read(attachment) {
            Ok(bytes) => {
                form = form.part(
                    format!("{}{name}", constants::ATTACHMENT_FIELD_PREFIX),
                    reqwest::multipart::Part::bytes(bytes).file_name(name.to_string()),
                );
            }
            Err(e) => debug!("skipping attachment {}: {e}", attachment.display()),
        }
    }

    let response = client
        .post(config.endpoint().url.to_string())
        .multipart(form)
        .send()
        .await?;
    Ok(response.status())
}

fn build_client(config: &ReporterConfig) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(Duration::from_millis(config.endpoint().timeout_ms));
    if let Some(cert_path) = config.certificate_path() {
        let pem = fs::read(&cert_path).with_context(|| {
            format!("could not read pinned certificate {}", cert_path.display())
        })?;
        let certificate =
            reqwest::Certificate::from_pem(&pem).context("invalid pinned certificate")?;
        builder = builder
            .tls_built_in_root_certs(false)
            .add_root_certificate(certificate);
    }
    builder.build().context("could not build upload client")
}

/// Pending reports never expire by age, but they do yield to newer ones:
/// anything beyond [`constants::MAX_PENDING_REPORTS`] is deleted oldest
/// first, so a collector outage cannot grow the directory forever.
fn prune_over_quota(config: &ReporterConfig) -> anyhow::Result<usize> {
    let report_dir = config.report_dir();
    let ids = scanner::scan_pending_reports(report_dir)?;
    if ids.len() <= constants::MAX_PENDING_REPORTS {
        return Ok(0);
    }

    let mut by_age: Vec<(SystemTime, ReportId)> = ids
        .into_iter()
        .map(|id| {
            let dump_path = PendingReport::in_dir(report_dir, id.clone())
                .dump_path()
                .to_path_buf();
            let modified = fs::metadata(dump_path)
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (modified, id)
        })
        .collect();
    by_age.sort();

    let excess = by_age.len() - constants::MAX_PENDING_REPORTS;
    let mut pruned = 0;
    for (_, id) in by_age.into_iter().take(excess) {
        let report = PendingReport::in_dir(report_dir, id);
        match report.delete() {
            Ok(()) => {
                warn!("pruned pending report {} over retention quota", report.id());
                pruned += 1;
            }
            Err(e) => debug!("could not prune report {}: {e}", report.id()),
        }
    }
    Ok(pruned)
}

/// Starts the fire-and-forget drain thread. The thread is never joined and
/// never cancelled; its failures are logged and otherwise invisible.
pub(crate) fn spawn_drain_thread() {
    let Some(context) = crash_handler::context() else {
        return;
    };
    let spawned = std::thread::Builder::new()
        .name("courier-uploader".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("could not build uploader runtime: {e}");
                    return;
                }
            };
            match runtime.block_on(drain_pending_reports(&context.config)) {
                Ok(summary) => debug!("upload pass finished: {summary:?}"),
                Err(e) => warn!("upload pass failed: {e:#}"),
            }
        });
    if let Err(e) = spawned {
        warn!("could not spawn uploader thread: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libcourier_common::Endpoint;
    use std::path::Path;

    fn config_in(dir: &Path) -> ReporterConfig {
        ReporterConfig::new(
            Endpoint::new("http://127.0.0.1:9/post").unwrap(),
            dir.to_path_buf(),
            vec![],
            vec![],
            false,
            false,
            None,
        )
        .unwrap()
    }

    fn commit_fake_report(dir: &Path) -> ReportId {
        let id = ReportId::generate();
        fs::write(dir.join(format!("{id}.dmp.pending")), b"dump").unwrap();
        fs::write(dir.join(format!("{id}.attributes")), b"").unwrap();
        id
    }

    #[test]
    fn test_prune_keeps_quota_newest() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        for _ in 0..constants::MAX_PENDING_REPORTS + 4 {
            commit_fake_report(dir.path());
        }
        let pruned = prune_over_quota(&config).unwrap();
        assert_eq!(pruned, 4);
        assert_eq!(
            scanner::scan_pending_reports(dir.path()).unwrap().len(),
            constants::MAX_PENDING_REPORTS
        );
        // Already under quota: nothing more to prune.
        assert_eq!(prune_over_quota(&config).unwrap(), 0);
    }

    #[test]
    fn test_build_client_rejects_garbage_certificate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("courier-cacert.pem"), b"not a pem").unwrap();
        let config = ReporterConfig::new(
            Endpoint::new("https://collector.example.com/post").unwrap(),
            dir.path().to_path_buf(),
            vec![],
            vec![],
            false,
            false,
            Some(b"not a pem".to_vec()),
        )
        .unwrap();
        assert!(build_client(&config).is_err());
    }
}
