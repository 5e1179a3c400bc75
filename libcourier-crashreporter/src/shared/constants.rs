// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0

/// Length of a report id: a UUID rendered in its canonical 8-4-4-4-12 form.
pub const REPORT_ID_LEN: usize = 36;

/// Suffix of a raw dump before it is committed.
pub const RAW_DUMP_SUFFIX: &str = ".dmp";
/// Suffix of a transient attribute snapshot before it is committed.
pub const RAW_ATTRIBUTES_SUFFIX: &str = ".attributes.tmp";
/// Suffix of a committed, not-yet-uploaded dump.
pub const PENDING_DUMP_SUFFIX: &str = ".dmp.pending";
/// Suffix of a committed attribute file.
pub const ATTRIBUTES_SUFFIX: &str = ".attributes";

/// The canonical attribute file, rewritten on every attribute mutation.
pub const CANONICAL_ATTRIBUTES_FILE: &str = "courier_attributes";
/// Where the bundled TLS certificate gets written during initialization.
pub const CERTIFICATE_FILE: &str = "courier-cacert.pem";

/// Upper bound on reports uploaded per process launch.
pub const MAX_UPLOADS_PER_RUN: usize = 3;
/// Upper bound on pending reports retained across launches; the oldest
/// beyond this are pruned after each upload pass.
pub const MAX_PENDING_REPORTS: usize = 16;

/// Multipart field carrying the dump bytes.
pub const DUMP_FILE_FIELD: &str = "upload_file_minidump";
/// Prefix for multipart fields carrying configured attachments.
pub const ATTACHMENT_FIELD_PREFIX: &str = "attachment_";

/// Reserved attribute keys.
pub const KEY_FORMAT: &str = "format";
pub const KEY_MAIN_THREAD: &str = "thread.main";
pub const KEY_FAULTING_TID: &str = "_mod_faulting_tid";
pub const KEY_ERROR_MESSAGE: &str = "error.message";
pub const KEY_GUID: &str = "guid";

/// Value of the `format` attribute for every report this crate produces.
pub const FORMAT_MINIDUMP: &str = "minidump";
