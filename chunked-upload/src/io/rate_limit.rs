/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::http::Body;
use crate::io::SectionReader;
use crate::runtime::token_bucket::TokenBucket;

/// Bytes sent between two checks of the bandwidth budget
const CHUNK_SIZE: u64 = 64 * 1024;

/// A part body that meters every chunk through the shared [`TokenBucket`].
///
/// The body always starts at the first byte of the reader's window and reports the window
/// length as its content length.
#[derive(Debug)]
pub(crate) struct RateLimitedBody {
    reader: Arc<SectionReader>,
    bucket: TokenBucket,
    cancel: CancellationToken,
}

impl RateLimitedBody {
    pub(crate) fn new(
        reader: Arc<SectionReader>,
        bucket: TokenBucket,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reader,
            bucket,
            cancel,
        }
    }

    pub(crate) fn into_body(self) -> Body {
        let content_length = self.reader.len();
        let Self {
            reader,
            bucket,
            cancel,
        } = self;
        let stream = stream::unfold(0u64, move |pos| {
            let reader = reader.clone();
            let bucket = bucket.clone();
            let cancel = cancel.clone();
            async move {
                if pos >= reader.len() {
                    return None;
                }
                let chunk = reader.chunk(pos, CHUNK_SIZE);
                let len = chunk.len() as u64;
                match bucket.acquire(len, &cancel).await {
                    Ok(()) => Some((Ok(chunk), pos + len)),
                    // end the stream after the error
                    Err(err) => Some((Err(BoxError::from(err)), reader.len())),
                }
            }
        });
        Body::Stream {
            stream: stream.boxed(),
            content_length,
        }
    }
}
