/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::cmp;
use std::sync::{Arc, Mutex, PoisonError};

use http::Method;
use tokio_util::sync::CancellationToken;
use tower::{service_fn, Service};
use tracing::Instrument;

use crate::error::{self, Error};
use crate::http::{HttpRequest, HttpResponse};
use crate::io::rate_limit::RateLimitedBody;
use crate::io::{part_ranges, ContentStream, SectionReader, SectionReaderPool};
use crate::operation::upload::context::UploadContext;
use crate::operation::upload::session::UploadSession;
use crate::runtime::group::ConcurrencyGroup;

/// One part of the content, shared across its retry attempts.
///
/// The section is read once, on the first attempt, and reused by later attempts.
#[derive(Debug)]
pub(super) struct PartTask {
    part_number: u64,
    offset: u64,
    length: u64,
    reader: Mutex<Option<Arc<SectionReader>>>,
}

impl PartTask {
    fn new(part_number: u64, offset: u64, length: u64) -> Self {
        Self {
            part_number,
            offset,
            length,
            reader: Mutex::new(None),
        }
    }

    async fn reader(&self, pool: &SectionReaderPool) -> Result<Arc<SectionReader>, Error> {
        let cached = self.slot().clone();
        if let Some(reader) = cached {
            return Ok(reader);
        }
        let reader = Arc::new(pool.section(self.offset, self.length).await?);
        *self.slot() = Some(reader.clone());
        Ok(reader)
    }

    /// Hand the section's buffer back to the pool.
    ///
    /// A body still referenced by the transport keeps the buffer alive, it is freed instead.
    fn recycle(&self, pool: &SectionReaderPool) {
        let Some(reader) = self.slot().take() else {
            return;
        };
        match Arc::into_inner(reader) {
            Some(reader) => pool.recycle(reader),
            None => tracing::trace!(
                "section of part {} still referenced by the transport, not pooled",
                self.part_number
            ),
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<SectionReader>>> {
        self.reader.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Request/input type for our "upload_part" service.
#[derive(Debug, Clone)]
pub(super) struct UploadPartRequest {
    pub(super) ctx: UploadContext,
    pub(super) session: Arc<UploadSession>,
    pub(super) pool: Arc<SectionReaderPool>,
    pub(super) task: Arc<PartTask>,
    pub(super) cancel: CancellationToken,
}

/// handler (service fn) for a single part
async fn upload_part_handler(request: UploadPartRequest) -> Result<(), Error> {
    let UploadPartRequest {
        ctx,
        session,
        pool,
        task,
        cancel,
    } = request;
    let part_number = task.part_number;

    let reader = task
        .reader(&pool)
        .await
        .map_err(|err| error::chunk_failed(part_number, err))?;

    // part URLs are short-lived, every attempt asks for a fresh one
    let url = ctx
        .api()
        .part_url(&session, part_number)
        .instrument(tracing::debug_span!("get-part-url", part_number))
        .await
        .map_err(|err| error::chunk_failed(part_number, err))?;

    let body = RateLimitedBody::new(reader, ctx.handle.bandwidth.clone(), cancel).into_body();
    ctx.http_client()
        .send(HttpRequest::new(Method::PUT, url).body(body))
        .instrument(tracing::debug_span!("send-upload-part", part_number))
        .await
        .and_then(HttpResponse::error_for_status)
        .map_err(|err| error::chunk_failed(part_number, err))?;

    tracing::trace!("completed upload of part number {part_number}");
    Ok(())
}

/// Create a new tower::Service for uploading individual parts
pub(super) fn upload_part_service(
) -> impl Service<UploadPartRequest, Response = (), Error = Error, Future: Send> + Clone + Send {
    service_fn(upload_part_handler)
}

/// Transfer every part of `stream` through `session`, returning the number of parts sent.
///
/// Parts are dispatched in order with at most `min(part_count, num_workers)` in flight. The
/// first part to exhaust its retries cancels the others and its error is returned.
pub(super) async fn transfer_parts(
    ctx: &UploadContext,
    stream: ContentStream,
    session: Arc<UploadSession>,
) -> Result<u64, Error> {
    let total = session.part_count();
    if total == 0 {
        return Ok(0);
    }

    let workers = cmp::min(total, ctx.handle.num_workers() as u64) as usize;
    tracing::debug!(
        "uploading {total} parts of {} bytes with {workers} workers",
        session.part_size()
    );
    let pool = Arc::new(SectionReaderPool::new(stream, session.part_size(), workers));
    let progress = ctx.progress().clone();
    let mut group = ConcurrencyGroup::new(
        workers,
        ctx.handle.retry_policy(),
        ctx.cancellation_token().child_token(),
    )
    .on_success(move |done| progress.parts_done(done, total));

    let svc = upload_part_service();
    for (index, (offset, length)) in part_ranges(session.size(), session.part_size()).enumerate()
    {
        if group.is_cancelled() {
            return Err(abandon(group, error::operation_cancelled()).await);
        }
        let task = Arc::new(PartTask::new(index as u64 + 1, offset, length));
        let req = UploadPartRequest {
            ctx: ctx.clone(),
            session: session.clone(),
            pool: pool.clone(),
            task: task.clone(),
            cancel: group.cancellation_token().clone(),
        };
        let cleanup = {
            let pool = pool.clone();
            move || task.recycle(&pool)
        };
        if let Err(err) = group.go(svc.clone(), req, cleanup).await {
            return Err(abandon(group, err).await);
        }
    }

    let uploaded = group.wait().await?;
    tracing::trace!("all {uploaded} parts uploaded");
    Ok(uploaded)
}

/// Cancel the group, wait for in-flight parts and prefer the error that caused the cancellation.
async fn abandon(group: ConcurrencyGroup, err: Error) -> Error {
    group.cancel();
    group.wait().await.err().unwrap_or(err)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::PartTask;
    use crate::io::{ContentStream, SectionReaderPool};

    fn file_pool(content: &[u8]) -> (NamedTempFile, SectionReaderPool) {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(content).unwrap();
        let stream = ContentStream::from_path(tmp.path()).unwrap();
        (tmp, SectionReaderPool::new(stream, 4, 2))
    }

    #[tokio::test]
    async fn test_section_is_read_once_and_recycled_once() {
        let (_tmp, pool) = file_pool(b"abcdefgh");
        let task = PartTask::new(2, 4, 4);

        let first = task.reader(&pool).await.unwrap();
        let second = task.reader(&pool).await.unwrap();
        assert!(std::sync::Arc::ptr_eq(&first, &second));
        assert_eq!(b"efgh", first.as_slice());
        drop((first, second));

        task.recycle(&pool);
        task.recycle(&pool);
        assert_eq!(1, pool.idle_buffers());
    }

    #[tokio::test]
    async fn test_section_held_by_transport_is_not_pooled() {
        let (_tmp, pool) = file_pool(b"abcdefgh");
        let task = PartTask::new(1, 0, 4);

        let in_flight = task.reader(&pool).await.unwrap();
        task.recycle(&pool);
        assert_eq!(0, pool.idle_buffers());
        assert_eq!(b"abcd", in_flight.as_slice());

        // nothing is left to hand back once the slot was emptied
        drop(in_flight);
        task.recycle(&pool);
        assert_eq!(0, pool.idle_buffers());
    }
}
