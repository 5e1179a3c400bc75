// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0
use crate::shared::constants;
use crate::{default_signals, signal_from_signum};
use libcourier_common::Endpoint;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Validated configuration for the crash reporter.
///
/// Constructed once, before initialization, on the host application's main
/// thread; after installation it is only ever read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporterConfig {
    // Paths to any additional files to attach to every upload, if any
    attachments: Vec<PathBuf>,
    // PEM bytes of the certificate the uploader trusts, written to disk at
    // initialization. None means the platform root store.
    certificate_pem: Option<Vec<u8>>,
    create_alt_stack: bool,
    endpoint: Endpoint,
    report_dir: PathBuf,
    signals: Vec<i32>,
    use_alt_stack: bool,
}

impl ReporterConfig {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        endpoint: Endpoint,
        report_dir: PathBuf,
        attachments: Vec<PathBuf>,
        mut signals: Vec<i32>,
        create_alt_stack: bool,
        use_alt_stack: bool,
        certificate_pem: Option<Vec<u8>>,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(
            !report_dir.as_os_str().is_empty(),
            "A report directory is required"
        );
        // Requesting to create, but not use, the altstack is considered paradoxical.
        anyhow::ensure!(
            !create_alt_stack || use_alt_stack,
            "Cannot create an altstack without using it"
        );
        if signals.is_empty() {
            signals = default_signals();
        } else {
            let before_len = signals.len();
            signals.sort();
            signals.dedup();
            anyhow::ensure!(
                before_len == signals.len(),
                "Signals contained duplicate elements"
            );
            signals
                .iter()
                .try_for_each(|x| signal_from_signum(*x).map(|_| ()))?;
        }
        if let Some(pem) = &certificate_pem {
            anyhow::ensure!(!pem.is_empty(), "Bundled certificate must not be empty");
        }

        Ok(Self {
            attachments,
            certificate_pem,
            create_alt_stack,
            endpoint,
            report_dir,
            signals,
            use_alt_stack,
        })
    }

    pub fn attachments(&self) -> &Vec<PathBuf> {
        &self.attachments
    }

    pub fn certificate_pem(&self) -> Option<&[u8]> {
        self.certificate_pem.as_deref()
    }

    /// Where the bundled certificate lives once initialization wrote it.
    /// None when no certificate is bundled.
    pub fn certificate_path(&self) -> Option<PathBuf> {
        self.certificate_pem
            .as_ref()
            .map(|_| self.report_dir.join(constants::CERTIFICATE_FILE))
    }

    pub fn create_alt_stack(&self) -> bool {
        self.create_alt_stack
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    /// The canonical attribute file rewritten on every attribute mutation.
    pub fn canonical_attributes_path(&self) -> PathBuf {
        self.report_dir.join(constants::CANONICAL_ATTRIBUTES_FILE)
    }

    pub fn signals(&self) -> &Vec<i32> {
        &self.signals
    }

    pub fn use_alt_stack(&self) -> bool {
        self.use_alt_stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("https://collector.example.com/api/post").unwrap()
    }

    #[test]
    fn test_empty_signals_fall_back_to_defaults() {
        let config = ReporterConfig::new(
            endpoint(),
            PathBuf::from("/tmp/reports"),
            vec![],
            vec![],
            false,
            false,
            None,
        )
        .unwrap();
        assert_eq!(config.signals(), &default_signals());
    }

    #[test]
    fn test_duplicate_signals_rejected() {
        let result = ReporterConfig::new(
            endpoint(),
            PathBuf::from("/tmp/reports"),
            vec![],
            vec![libc::SIGSEGV, libc::SIGSEGV],
            false,
            false,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_signal_rejected() {
        let result = ReporterConfig::new(
            endpoint(),
            PathBuf::from("/tmp/reports"),
            vec![],
            vec![9999],
            false,
            false,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_report_dir_rejected() {
        let result = ReporterConfig::new(
            endpoint(),
            PathBuf::new(),
            vec![],
            vec![],
            false,
            false,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_altstack_paradox_rejected() {
        let result = ReporterConfig::new(
            endpoint(),
            PathBuf::from("/tmp/reports"),
            vec![],
            vec![],
            true,
            false,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_certificate_path_follows_bundle() {
        let without = ReporterConfig::new(
            endpoint(),
            PathBuf::from("/tmp/reports"),
            vec![],
            vec![],
            false,
            false,
            None,
        )
        .unwrap();
        assert_eq!(without.certificate_path(), None);

        let with = ReporterConfig::new(
            endpoint(),
            PathBuf::from("/tmp/reports"),
            vec![],
            vec![],
            false,
            false,
            Some(b"-----BEGIN CERTIFICATE-----".to_vec()),
        )
        .unwrap();
        assert_eq!(
            with.certificate_path(),
            Some(PathBuf::from("/tmp/reports/courier-cacert.pem"))
        );
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = ReporterConfig::new(
            endpoint(),
            PathBuf::from("/tmp/reports"),
            vec![PathBuf::from("/tmp/app.log")],
            vec![libc::SIGSEGV],
            false,
            true,
            None,
        )
        .unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let back: ReporterConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
