// Copyright 2024-Present Courier contributors
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use http::uri;
use serde::de::Error;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::{Mutex, MutexGuard};
use std::{borrow::Cow, ops::Deref, str::FromStr};

pub mod threading;
pub mod unix_utils;

/// Extension trait for `Mutex` that acquires the lock, panicking if the lock
/// is poisoned.
///
/// Avoids sprinkling `#[allow(clippy::unwrap_used)]` over every `Mutex` user.
///
/// # Panics
///
/// Panics if the `Mutex` is poisoned.
pub trait MutexExt<T> {
    fn lock_or_panic(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[inline(always)]
    #[track_caller]
    fn lock_or_panic(&self) -> MutexGuard<'_, T> {
        #[allow(clippy::unwrap_used)]
        self.lock().unwrap()
    }
}

/// Where reports get sent: a collector URL plus a per-request timeout.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(serialize_with = "serialize_uri", deserialize_with = "deserialize_uri")]
    pub url: http::Uri,
    pub timeout_ms: u64,
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint {
            url: http::Uri::default(),
            timeout_ms: Self::DEFAULT_TIMEOUT,
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize)]
struct SerializedUri<'a> {
    scheme: Option<Cow<'a, str>>,
    authority: Option<Cow<'a, str>>,
    path_and_query: Option<Cow<'a, str>>,
}

fn serialize_uri<S>(uri: &http::Uri, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let parts = uri.clone().into_parts();
    let uri = SerializedUri {
        scheme: parts.scheme.as_ref().map(|s| Cow::Borrowed(s.as_str())),
        authority: parts.authority.as_ref().map(|s| Cow::Borrowed(s.as_str())),
        path_and_query: parts
            .path_and_query
            .as_ref()
            .map(|s| Cow::Borrowed(s.as_str())),
    };
    uri.serialize(serializer)
}

fn deserialize_uri<'de, D>(deserializer: D) -> Result<http::Uri, D::Error>
where
    D: Deserializer<'de>,
{
    let uri = SerializedUri::deserialize(deserializer)?;
    let mut builder = http::Uri::builder();
    if let Some(v) = uri.authority {
        builder = builder.authority(v.deref());
    }
    if let Some(v) = uri.scheme {
        builder = builder.scheme(v.deref());
    }
    if let Some(v) = uri.path_and_query {
        builder = builder.path_and_query(v.deref());
    }

    builder.build().map_err(Error::custom)
}

pub fn parse_uri(uri: &str) -> anyhow::Result<http::Uri> {
    let parsed = http::Uri::from_str(uri)?;
    anyhow::ensure!(
        matches!(parsed.scheme_str(), Some("http") | Some("https")),
        "unsupported endpoint scheme in {uri:?}"
    );
    anyhow::ensure!(
        parsed.authority().is_some(),
        "endpoint url {uri:?} has no host"
    );
    Ok(parsed)
}

impl Endpoint {
    /// Default value for the timeout field in milliseconds.
    pub const DEFAULT_TIMEOUT: u64 = 15_000;

    pub fn new(url: &str) -> anyhow::Result<Endpoint> {
        Ok(Endpoint {
            url: parse_uri(url)?,
            ..Default::default()
        })
    }

    #[inline]
    pub fn from_url(url: http::Uri) -> Endpoint {
        Endpoint {
            url,
            ..Default::default()
        }
    }

    /// Set a custom timeout for this endpoint. Pass 0 to keep the default.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = if timeout_ms == 0 {
            Self::DEFAULT_TIMEOUT
        } else {
            timeout_ms
        };
        self
    }

    fn uri_scheme(&self) -> Option<&uri::Scheme> {
        self.url.scheme()
    }

    pub fn is_https(&self) -> bool {
        self.uri_scheme().map(uri::Scheme::as_str) == Some("https")
    }
}
