/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use crate::http::SharedHttpClient;
use crate::metrics::Throughput;
use crate::types::{ConcurrencySetting, PartSize};
use std::time::Duration;

/// Environment based configuration loading
pub mod loader;

/// Number of attempts a single part gets before the upload fails
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Delay before the first part retry, doubled on every subsequent retry
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const DEFAULT_MAX_POLL_WAIT: Duration = Duration::from_secs(10 * 60);

/// Configuration for a [`Client`](crate::client::Client)
#[derive(Debug, Clone)]
pub struct Config {
    part_size: PartSize,
    concurrency: ConcurrencySetting,
    max_upload_rate: Option<Throughput>,
    retry_attempts: u32,
    retry_base_delay: Duration,
    poll_interval: Duration,
    max_poll_wait: Duration,
    rapid_upload: bool,
    http_client: SharedHttpClient,
}

impl Config {
    /// Create a new `Config` builder
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Returns a reference to the fallback part size
    pub fn part_size(&self) -> &PartSize {
        &self.part_size
    }

    /// Returns the concurrency setting to use for individual uploads.
    pub fn concurrency(&self) -> &ConcurrencySetting {
        &self.concurrency
    }

    /// The shared bandwidth ceiling across all part uploads, if any
    pub fn max_upload_rate(&self) -> Option<&Throughput> {
        self.max_upload_rate.as_ref()
    }

    /// Maximum number of attempts per part
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Delay before the first retry of a part
    pub fn retry_base_delay(&self) -> Duration {
        self.retry_base_delay
    }

    /// Delay between asynchronous completion polls
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Maximum time spent polling for asynchronous completion
    pub fn max_poll_wait(&self) -> Duration {
        self.max_poll_wait
    }

    /// Whether uploads attempt the content hash short-circuit before transferring parts
    pub fn rapid_upload(&self) -> bool {
        self.rapid_upload
    }

    /// The HTTP client used for part transfers
    pub fn http_client(&self) -> &SharedHttpClient {
        &self.http_client
    }
}

/// Fluent style builder for [Config]
#[derive(Debug, Clone)]
pub struct Builder {
    part_size: PartSize,
    concurrency: ConcurrencySetting,
    max_upload_rate: Option<Throughput>,
    retry_attempts: u32,
    retry_base_delay: Duration,
    poll_interval: Duration,
    max_poll_wait: Duration,
    rapid_upload: bool,
    http_client: Option<SharedHttpClient>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            part_size: PartSize::default(),
            concurrency: ConcurrencySetting::default(),
            max_upload_rate: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_poll_wait: DEFAULT_MAX_POLL_WAIT,
            rapid_upload: false,
            http_client: None,
        }
    }
}

impl Builder {
    /// Part size to use when the remote service does not negotiate one.
    ///
    /// Default is [PartSize::Auto]
    pub fn part_size(mut self, part_size: PartSize) -> Self {
        self.part_size = part_size;
        self
    }

    /// Set the maximum number of parts in flight for a single upload.
    ///
    /// Default is [ConcurrencySetting::Auto].
    pub fn concurrency(mut self, concurrency: ConcurrencySetting) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Limit the combined throughput of all part uploads made through this client.
    pub fn max_upload_rate(mut self, rate: Throughput) -> Self {
        self.max_upload_rate = Some(rate);
        self
    }

    /// Set or clear the combined throughput limit.
    pub fn set_max_upload_rate(mut self, rate: Option<Throughput>) -> Self {
        self.max_upload_rate = rate;
        self
    }

    /// Maximum number of attempts per part, including the first one. Values below 1 are
    /// raised to 1.
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Delay before the first retry of a part. Each subsequent retry doubles the delay.
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Delay between asynchronous completion status polls.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Maximum time to wait for asynchronous completion before failing the upload.
    pub fn max_poll_wait(mut self, wait: Duration) -> Self {
        self.max_poll_wait = wait;
        self
    }

    /// Attempt the content hash short-circuit before transferring any part.
    pub fn rapid_upload(mut self, enabled: bool) -> Self {
        self.rapid_upload = enabled;
        self
    }

    /// Set an explicit HTTP client to use for part transfers.
    pub fn http_client(mut self, client: SharedHttpClient) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Consumes the builder and constructs a [`Config`](crate::config::Config)
    pub fn build(self) -> Config {
        Config {
            part_size: self.part_size,
            concurrency: self.concurrency,
            max_upload_rate: self.max_upload_rate,
            retry_attempts: self.retry_attempts,
            retry_base_delay: self.retry_base_delay,
            poll_interval: self.poll_interval,
            max_poll_wait: self.max_poll_wait,
            rapid_upload: self.rapid_upload,
            http_client: self
                .http_client
                .unwrap_or_else(crate::http::default_client),
        }
    }
}
