/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use crate::metrics::unit::ByteUnit;
use crate::middleware::retry::RetryPolicy;
use crate::runtime::token_bucket::TokenBucket;
use crate::types::{ConcurrencySetting, PartSize};
use crate::{Config, DEFAULT_CONCURRENCY};

/// Chunked upload client.
///
/// Cheap to clone, clones share the bandwidth ceiling.
#[derive(Debug, Clone)]
pub struct Client {
    pub(crate) handle: Arc<Handle>,
}

/// Whatever is needed to carry out operations, e.g. config and the shared bandwidth budget
#[derive(Debug)]
pub(crate) struct Handle {
    pub(crate) config: Config,
    pub(crate) bandwidth: TokenBucket,
}

impl Handle {
    /// Get the concrete number of parts in flight for a single upload.
    pub(crate) fn num_workers(&self) -> usize {
        match self.config.concurrency() {
            ConcurrencySetting::Explicit(concurrency) => (*concurrency).max(1),
            ConcurrencySetting::Auto => DEFAULT_CONCURRENCY,
        }
    }

    /// Get the part size to use when the remote service does not negotiate one
    pub(crate) fn upload_part_size_bytes(&self) -> u64 {
        match self.config.part_size() {
            PartSize::Auto => 10 * ByteUnit::Mebibyte.as_bytes_u64(),
            PartSize::Target(explicit) => (*explicit).max(1),
        }
    }

    /// A fresh per-part retry policy
    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.retry_attempts(), self.config.retry_base_delay())
    }
}

impl Client {
    /// Creates a new client from a config.
    pub fn new(config: Config) -> Client {
        let bandwidth = TokenBucket::new(config.max_upload_rate());
        if bandwidth.is_limited() {
            if let Some(rate) = config.max_upload_rate() {
                tracing::debug!("part uploads limited to {rate}");
            }
        }
        let handle = Arc::new(Handle { config, bandwidth });
        Client { handle }
    }

    /// Returns the client's configuration
    pub fn config(&self) -> &Config {
        &self.handle.config
    }

    /// Upload a single piece of content.
    ///
    /// Constructs a fluent builder for the
    /// [`Upload`](crate::operation::upload::builders::UploadFluentBuilder) operation.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::error::Error;
    /// use std::path::Path;
    /// use std::sync::Arc;
    /// use chunked_upload::io::ContentStream;
    /// use chunked_upload::operation::upload::UploadApi;
    ///
    /// async fn upload_file(
    ///     client: &chunked_upload::Client,
    ///     api: Arc<dyn UploadApi>,
    ///     path: impl AsRef<Path>
    /// ) -> Result<(), Box<dyn Error>> {
    ///     let stream = ContentStream::from_path(path)?;
    ///     let handle = client.upload()
    ///         .api(api)
    ///         .parent_id("0")
    ///         .name("report.pdf")
    ///         .body(stream)
    ///         .initiate()?;
    ///
    ///     // initiate() will return before the transfer is complete.
    ///     // Call the `join()` method on the returned handle to drive the transfer to completion.
    ///     let response = handle.join().await?;
    ///     // ... do something with response
    ///     Ok(())
    /// }
    ///
    /// ```
    pub fn upload(&self) -> crate::operation::upload::builders::UploadFluentBuilder {
        crate::operation::upload::builders::UploadFluentBuilder::new(self.handle.clone())
    }
}
