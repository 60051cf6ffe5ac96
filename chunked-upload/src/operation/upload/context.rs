/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::io::ContentStream;
use crate::operation::upload::api::UploadApi;
use crate::operation::upload::progress::ProgressReporter;
use crate::operation::upload::session::CreateSessionRequest;
use crate::operation::upload::UploadInput;
use crate::operation::TransferContext;

/// Internal context used to drive a single Upload operation
pub(crate) type UploadContext = TransferContext<UploadState>;

/// State shared by every task of one upload
#[derive(Debug)]
pub(crate) struct UploadState {
    /// the remote service the upload is driven through
    pub(crate) api: Arc<dyn UploadApi>,
    /// the original request (NOTE: the body and session will have been taken for processing)
    pub(crate) request: UploadInput,
    pub(crate) progress: ProgressReporter,
    /// cancelled by the handle, parent of every part group's token
    pub(crate) cancel: CancellationToken,
    pub(crate) rapid_upload: bool,
}

impl UploadContext {
    pub(crate) fn api(&self) -> &Arc<dyn UploadApi> {
        &self.state.api
    }

    pub(crate) fn progress(&self) -> &ProgressReporter {
        &self.state.progress
    }

    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.state.cancel
    }

    /// The session request for `stream`, without any hash evidence
    pub(crate) fn session_request(&self, stream: &ContentStream) -> CreateSessionRequest {
        let req = &self.state.request;
        let mut session_req = CreateSessionRequest::new(
            req.parent_id().unwrap_or_default(),
            req.name().unwrap_or_default(),
            stream.size(),
            req.duplicate(),
        );
        session_req.mime_type = stream.mime_type().map(str::to_owned);
        session_req
    }
}
