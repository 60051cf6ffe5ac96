/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

/* Automatically managed default lints */
#![cfg_attr(docsrs, feature(doc_auto_cfg))]
/* End of automatically managed default lints */
#![warn(
    missing_debug_implementations,
    missing_docs,
    rustdoc::missing_crate_level_docs,
    unreachable_pub,
    rust_2018_idioms
)]

//! A resumable, concurrent chunked-upload engine.
//!
//! Content is split into fixed size parts that are transferred concurrently against an
//! upload session opened with a remote storage service. Parts are retried independently,
//! optionally throttled to a shared bandwidth ceiling, and requests to the service are signed
//! per identity and repaired in place when the signature or access credential expires.
//!
//! # Examples
//!
//! ```no_run
//! # async fn example(
//! #     api: std::sync::Arc<dyn chunked_upload::operation::upload::UploadApi>,
//! # ) -> Result<(), chunked_upload::error::Error> {
//! use chunked_upload::io::ContentStream;
//!
//! let config = chunked_upload::from_env().load().await;
//! let client = chunked_upload::Client::new(config);
//!
//! let handle = client
//!     .upload()
//!     .api(api)
//!     .parent_id("root")
//!     .name("movie.mkv")
//!     .body(ContentStream::from_path("/tmp/movie.mkv")?)
//!     .progress(|pct| println!("{pct:.1}%"))
//!     .initiate()?;
//!
//! // wait for the transfer to complete
//! let output = handle.join().await?;
//! # let _ = output;
//! # Ok(())
//! # }
//! ```

pub(crate) const MEBIBYTE: u64 = 1024 * 1024;

/// Default number of parts in flight for a single upload
pub(crate) const DEFAULT_CONCURRENCY: usize = 3;

/// Error types emitted by `chunked-upload`
pub mod error;

/// Common types used by `chunked-upload`
pub mod types;

/// Types and helpers for I/O
pub mod io;

/// Upload client
pub mod client;

/// Upload operations
pub mod operation;

/// Client configuration
pub mod config;

/// Signed, self-repairing requests against the remote service
pub mod auth;

/// HTTP transport abstraction
pub mod http;

/// Units and throughput measurements
pub mod metrics;

/// Tower related middleware and components
pub(crate) mod middleware;

/// Internal runtime components
pub(crate) mod runtime;

pub use self::client::Client;
use self::config::loader::ConfigLoader;
pub use self::config::Config;

/// Create a config loader
pub fn from_env() -> ConfigLoader {
    ConfigLoader::default()
}
