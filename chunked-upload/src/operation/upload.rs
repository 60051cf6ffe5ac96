/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

/// Remote service operations
pub mod api;
/// Request type for uploads
pub mod builders;
mod context;
mod handle;
mod input;
mod output;
mod progress;
mod rapid;
mod service;
mod session;

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{self, Error, ErrorKind};
use crate::io::ContentStream;
use crate::types::RemoteErrorCode;

pub use api::{JsonUploadApi, UploadApi, UploadEndpoints};
use context::{UploadContext, UploadState};
pub use handle::UploadHandle;
pub use input::{UploadInput, UploadInputBuilder};
pub use output::UploadOutput;
pub use progress::ProgressListener;
use progress::ProgressReporter;
use service::transfer_parts;
pub use session::{
    CompleteOutput, ContentHash, CreateSessionOutput, CreateSessionRequest, UploadSession,
};

/// Operation struct for single upload
#[derive(Clone, Default, Debug)]
pub(crate) struct Upload;

impl Upload {
    /// Execute a single `Upload` transfer operation
    pub(crate) fn orchestrate(
        handle: Arc<crate::client::Handle>,
        mut input: UploadInput,
    ) -> Result<UploadHandle, Error> {
        let api = input
            .api
            .clone()
            .ok_or_else(|| error::invalid_input("upload api is required"))?;
        let stream = input.take_body();
        let session = input.take_session();
        let rapid_upload = input
            .rapid_upload
            .unwrap_or_else(|| handle.config.rapid_upload());

        let span = tracing::debug_span!(
            "upload",
            name = input.name().unwrap_or_default(),
            size = stream.size()
        );
        let state = UploadState {
            api,
            progress: ProgressReporter::new(input.progress.clone()),
            cancel: CancellationToken::new(),
            rapid_upload,
            request: input,
        };
        let ctx = UploadContext::new(handle, state);
        let task = tokio::spawn(run_upload(ctx.clone(), stream, session).instrument(span));
        Ok(UploadHandle::new(ctx, task))
    }
}

/// Outcome of opening a session
enum Opened {
    /// Parts have to be transferred through this session
    Session(UploadSession),
    /// The service already holds the content
    Existing(CreateSessionOutput),
}

async fn run_upload(
    ctx: UploadContext,
    stream: ContentStream,
    session: Option<UploadSession>,
) -> Result<UploadOutput, Error> {
    let size = stream.size();
    let session = match session {
        Some(session) => session,
        None => match open_session(&ctx, &stream).await? {
            Opened::Session(session) => session,
            Opened::Existing(created) => {
                tracing::info!("content already stored, skipping transfer");
                ctx.progress().report(progress::FINISHED);
                return Ok(UploadOutput {
                    file_id: created.file_id,
                    size,
                    rapid_upload: true,
                    ..Default::default()
                });
            }
        },
    };
    let session = Arc::new(session);
    ctx.progress().report(progress::SESSION_OPENED);

    let parts_uploaded = transfer_parts(&ctx, stream, session.clone()).await?;
    let file_id = complete_session(&ctx, &session).await?;
    ctx.progress().report(progress::FINISHED);

    Ok(UploadOutput {
        session_id: Some(session.session_id().to_owned()),
        file_id,
        size,
        parts_uploaded,
        rapid_upload: false,
    })
}

async fn open_session(ctx: &UploadContext, stream: &ContentStream) -> Result<Opened, Error> {
    let mut request = ctx.session_request(stream);
    request.etag = Some(rapid::content_md5(stream, ctx.cancellation_token()).await?);
    let created = if ctx.state.rapid_upload {
        let pre_hashed =
            request.with_content_hash(ContentHash::PreHash(rapid::pre_hash(stream).await?));
        match create_session(ctx, &pre_hashed).await {
            Err(err) if err.remote_code() == Some(&RemoteErrorCode::PreHashMatched) => {
                match ctx.api().proof_secret().await {
                    Some(secret) => {
                        tracing::debug!("pre-hash matched, submitting the full content hash");
                        let sha1 = rapid::content_sha1(stream, ctx.cancellation_token()).await?;
                        let proof_code = rapid::proof_code(&secret, stream).await?;
                        let full =
                            request.with_content_hash(ContentHash::Full { sha1, proof_code });
                        create_session(ctx, &full).await?
                    }
                    None => {
                        tracing::debug!("pre-hash matched but no proof secret is available");
                        create_session(ctx, &request).await?
                    }
                }
            }
            other => other?,
        }
    } else {
        create_session(ctx, &request).await?
    };

    if created.already_exists {
        return Ok(Opened::Existing(created));
    }
    let part_size = created
        .part_size
        .unwrap_or_else(|| ctx.handle.upload_part_size_bytes());
    let session = UploadSession::new(created.session_id, stream.size(), part_size)
        .map_err(error::from_kind(ErrorKind::SessionCreateFailed))?
        .with_file_id(created.file_id);
    tracing::debug!(
        "opened session {} with {} parts of {part_size} bytes",
        session.session_id(),
        session.part_count()
    );
    Ok(Opened::Session(session))
}

async fn create_session(
    ctx: &UploadContext,
    request: &CreateSessionRequest,
) -> Result<CreateSessionOutput, Error> {
    ctx.api()
        .create_session(request)
        .instrument(tracing::debug_span!("send-create-session"))
        .await
        .map_err(error::from_kind(ErrorKind::SessionCreateFailed))
}

/// Finalize the session, polling until the service assembled the object if needed.
async fn complete_session(
    ctx: &UploadContext,
    session: &UploadSession,
) -> Result<Option<String>, Error> {
    let status = ctx
        .api()
        .complete(session)
        .instrument(tracing::debug_span!("send-complete-session"))
        .await
        .map_err(error::from_kind(ErrorKind::CompletionFailed))?;

    if !status.completed && status.async_completion {
        session.mark_async_completion();
        poll_completion(ctx, session).await?;
    }
    session.mark_completed();
    Ok(status
        .file_id
        .or_else(|| session.file_id().map(str::to_owned)))
}

async fn poll_completion(ctx: &UploadContext, session: &UploadSession) -> Result<(), Error> {
    let interval = ctx.handle.config.poll_interval();
    let max_wait = ctx.handle.config.max_poll_wait();
    let deadline = Instant::now() + max_wait;
    loop {
        let done = ctx
            .api()
            .poll_completion(session)
            .instrument(tracing::trace_span!("poll-completion"))
            .await
            .map_err(error::from_kind(ErrorKind::CompletionFailed))?;
        if done {
            return Ok(());
        }
        if Instant::now() + interval > deadline {
            return Err(Error::new(
                ErrorKind::CompletionFailed,
                format!(
                    "session {} was not finalized within {max_wait:?}",
                    session.session_id()
                ),
            ));
        }
        tokio::select! {
            _ = ctx.cancellation_token().cancelled() => return Err(error::operation_cancelled()),
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
