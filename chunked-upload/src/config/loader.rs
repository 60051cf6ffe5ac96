/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::env;
use std::str::FromStr;

use crate::config::Builder;
use crate::http::SharedHttpClient;
use crate::metrics::Throughput;
use crate::{
    types::{ConcurrencySetting, PartSize},
    Config,
};

const ENV_THREADS: &str = "CHUNKED_UPLOAD_THREADS";
const ENV_PART_SIZE: &str = "CHUNKED_UPLOAD_PART_SIZE";
const ENV_MAX_RATE: &str = "CHUNKED_UPLOAD_MAX_RATE";
const ENV_RAPID: &str = "CHUNKED_UPLOAD_RAPID";

/// Load [`Config`] from the environment.
///
/// Explicit settings on the loader win over environment variables:
///
/// * `CHUNKED_UPLOAD_THREADS` - maximum parts in flight
/// * `CHUNKED_UPLOAD_PART_SIZE` - fallback part size in bytes
/// * `CHUNKED_UPLOAD_MAX_RATE` - bandwidth ceiling, e.g. `4194304` or `4 MiB/s`
/// * `CHUNKED_UPLOAD_RAPID` - `true`/`1` to attempt rapid upload
#[derive(Default, Debug)]
pub struct ConfigLoader {
    part_size: Option<PartSize>,
    concurrency: Option<ConcurrencySetting>,
    max_upload_rate: Option<Throughput>,
    rapid_upload: Option<bool>,
    http_client: Option<SharedHttpClient>,
}

impl ConfigLoader {
    /// Part size to use when the remote service does not negotiate one.
    pub fn part_size(mut self, part_size: PartSize) -> Self {
        self.part_size = Some(part_size);
        self
    }

    /// Set the maximum number of parts in flight for a single upload.
    pub fn concurrency(mut self, concurrency: ConcurrencySetting) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Limit the combined throughput of all part uploads.
    pub fn max_upload_rate(mut self, rate: Throughput) -> Self {
        self.max_upload_rate = Some(rate);
        self
    }

    /// Attempt the content hash short-circuit before transferring any part.
    pub fn rapid_upload(mut self, enabled: bool) -> Self {
        self.rapid_upload = Some(enabled);
        self
    }

    /// Use an explicit HTTP client instead of the default `reqwest` based one.
    pub fn http_client(mut self, client: SharedHttpClient) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Load the default configuration
    ///
    /// If fields have been overridden during builder construction, the override values will be
    /// used. Otherwise, the environment is consulted and then the default values are used.
    pub async fn load(self) -> Config {
        let mut builder = Builder::default();

        if let Some(part_size) = self
            .part_size
            .or_else(|| from_env::<u64>(ENV_PART_SIZE).map(PartSize::Target))
        {
            builder = builder.part_size(part_size);
        }
        if let Some(concurrency) = self
            .concurrency
            .or_else(|| from_env::<usize>(ENV_THREADS).map(ConcurrencySetting::Explicit))
        {
            builder = builder.concurrency(concurrency);
        }
        builder =
            builder.set_max_upload_rate(self.max_upload_rate.or_else(|| from_env(ENV_MAX_RATE)));
        if let Some(rapid) = self.rapid_upload.or_else(|| rapid_from_env(ENV_RAPID)) {
            builder = builder.rapid_upload(rapid);
        }
        let http_client = self
            .http_client
            .unwrap_or_else(crate::http::default_client);

        builder.http_client(http_client).build()
    }
}

fn from_env<T: FromStr>(name: &str) -> Option<T> {
    let value = env::var(name).ok()?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("ignoring invalid value for {name}: {value:?}");
            None
        }
    }
}

fn rapid_from_env(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => {
            tracing::warn!("ignoring invalid value for {name}: {value:?}");
            None
        }
    }
}
