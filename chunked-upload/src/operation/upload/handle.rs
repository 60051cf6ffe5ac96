/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use tokio::task::JoinHandle;

use crate::error::{self, Error};
use crate::operation::upload::context::UploadContext;
use crate::operation::upload::UploadOutput;

/// Response type for a single upload request.
///
/// # Cancellation
///
/// The upload can be cancelled by calling [`Self::cancel`], [`Self::abort`] or by dropping the
/// handle. Parts not yet dispatched are never started, parts in flight stop at their next
/// await point and their buffers are released.
#[derive(Debug)]
#[non_exhaustive]
pub struct UploadHandle {
    task: Option<JoinHandle<Result<UploadOutput, Error>>>,
    /// The context used to drive an upload to completion
    pub(crate) ctx: UploadContext,
}

impl UploadHandle {
    pub(crate) fn new(ctx: UploadContext, task: JoinHandle<Result<UploadOutput, Error>>) -> Self {
        Self {
            task: Some(task),
            ctx,
        }
    }

    /// Request cancellation without waiting for the upload to stop.
    ///
    /// [`Self::join`] then reports a cancellation error unless the upload already finished.
    pub fn cancel(&self) {
        self.ctx.cancellation_token().cancel();
    }

    /// Returns true once the upload stopped, successfully or not
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Consume the handle and wait for upload to complete
    #[tracing::instrument(skip_all, level = "debug", name = "join-upload")]
    pub async fn join(mut self) -> Result<UploadOutput, Error> {
        match self.task.take() {
            Some(task) => task.await?,
            None => Err(error::operation_cancelled()),
        }
    }

    /// Cancel the upload and wait for every in-flight part to stop.
    ///
    /// Returns the cancellation error, or the output if the upload finished before the
    /// cancellation took effect.
    #[tracing::instrument(skip_all, level = "debug", name = "abort-upload")]
    pub async fn abort(mut self) -> Result<UploadOutput, Error> {
        self.cancel();
        match self.task.take() {
            Some(task) => task.await?,
            None => Err(error::operation_cancelled()),
        }
    }
}

impl Drop for UploadHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.ctx.cancellation_token().cancel();
        }
    }
}
