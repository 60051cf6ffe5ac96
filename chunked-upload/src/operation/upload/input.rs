/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::sync::Arc;

use crate::error::{self, Error};
use crate::io::ContentStream;
use crate::operation::upload::api::UploadApi;
use crate::operation::upload::progress::ProgressListener;
use crate::operation::upload::session::UploadSession;
use crate::types::DuplicatePolicy;

/// Input for a single upload.
#[non_exhaustive]
pub struct UploadInput {
    /// The remote service the upload is driven through
    pub api: Option<Arc<dyn UploadApi>>,
    /// Folder the upload is placed in
    pub parent_id: Option<String>,
    /// Name of the uploaded object
    pub name: Option<String>,
    /// Name collision handling
    pub duplicate: DuplicatePolicy,
    /// Content to upload
    pub body: ContentStream,
    /// An already opened session to transfer the content through
    pub session: Option<UploadSession>,
    /// Progress callback
    pub progress: Option<ProgressListener>,
    /// Overrides [`Config::rapid_upload`](crate::Config::rapid_upload) for this upload
    pub rapid_upload: Option<bool>,
}

impl UploadInput {
    /// Create a new builder
    pub fn builder() -> UploadInputBuilder {
        UploadInputBuilder::default()
    }

    /// Folder the upload is placed in
    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    /// Name of the uploaded object
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name collision handling
    pub fn duplicate(&self) -> DuplicatePolicy {
        self.duplicate
    }

    /// Content to upload
    pub fn body(&self) -> &ContentStream {
        &self.body
    }

    /// The already opened session, if any
    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    /// Rapid upload override
    pub fn rapid_upload(&self) -> Option<bool> {
        self.rapid_upload
    }

    pub(crate) fn take_body(&mut self) -> ContentStream {
        std::mem::take(&mut self.body)
    }

    pub(crate) fn take_session(&mut self) -> Option<UploadSession> {
        self.session.take()
    }
}

impl fmt::Debug for UploadInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadInput")
            .field("parent_id", &self.parent_id)
            .field("name", &self.name)
            .field("duplicate", &self.duplicate)
            .field("size", &self.body.size())
            .field("session", &self.session.as_ref().map(UploadSession::session_id))
            .field("rapid_upload", &self.rapid_upload)
            .finish_non_exhaustive()
    }
}

/// A builder for [`UploadInput`].
#[non_exhaustive]
#[derive(Default)]
pub struct UploadInputBuilder {
    pub(crate) api: Option<Arc<dyn UploadApi>>,
    pub(crate) parent_id: Option<String>,
    pub(crate) name: Option<String>,
    pub(crate) duplicate: Option<DuplicatePolicy>,
    pub(crate) body: Option<ContentStream>,
    pub(crate) session: Option<UploadSession>,
    pub(crate) progress: Option<ProgressListener>,
    pub(crate) rapid_upload: Option<bool>,
}

impl UploadInputBuilder {
    /// The remote service the upload is driven through
    ///
    /// This field is required.
    pub fn api(mut self, api: Arc<dyn UploadApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// The remote service the upload is driven through
    pub fn set_api(mut self, api: Option<Arc<dyn UploadApi>>) -> Self {
        self.api = api;
        self
    }

    /// Folder the upload is placed in
    ///
    /// This field is required unless a session is given.
    pub fn parent_id(mut self, input: impl Into<String>) -> Self {
        self.parent_id = Some(input.into());
        self
    }

    /// Folder the upload is placed in
    pub fn set_parent_id(mut self, input: Option<String>) -> Self {
        self.parent_id = input;
        self
    }

    /// Name of the uploaded object
    ///
    /// This field is required unless a session is given.
    pub fn name(mut self, input: impl Into<String>) -> Self {
        self.name = Some(input.into());
        self
    }

    /// Name of the uploaded object
    pub fn set_name(mut self, input: Option<String>) -> Self {
        self.name = input;
        self
    }

    /// Name collision handling, defaults to [`DuplicatePolicy::Rename`]
    pub fn duplicate(mut self, input: DuplicatePolicy) -> Self {
        self.duplicate = Some(input);
        self
    }

    /// Content to upload
    ///
    /// This field is required.
    pub fn body(mut self, input: ContentStream) -> Self {
        self.body = Some(input);
        self
    }

    /// Content to upload
    pub fn set_body(mut self, input: Option<ContentStream>) -> Self {
        self.body = input;
        self
    }

    /// Transfer the content through an already opened session instead of opening one
    pub fn session(mut self, input: UploadSession) -> Self {
        self.session = Some(input);
        self
    }

    /// Progress callback, called with monotonically increasing percentages
    pub fn progress(mut self, listener: ProgressListener) -> Self {
        self.progress = Some(listener);
        self
    }

    /// Override [`Config::rapid_upload`](crate::Config::rapid_upload) for this upload
    pub fn rapid_upload(mut self, enabled: bool) -> Self {
        self.rapid_upload = Some(enabled);
        self
    }

    /// Consumes the builder and constructs a [`UploadInput`]
    pub fn build(self) -> Result<UploadInput, Error> {
        let body = self
            .body
            .ok_or_else(|| error::invalid_input("body is required"))?;
        if self.api.is_none() {
            return Err(error::invalid_input("upload api is required"));
        }
        match &self.session {
            Some(session) if session.size() != body.size() => {
                return Err(error::invalid_input(format!(
                    "session {} expects {} bytes but the body has {}",
                    session.session_id(),
                    session.size(),
                    body.size()
                )));
            }
            Some(_) => {}
            None => {
                if self.parent_id.as_deref().map_or(true, str::is_empty) {
                    return Err(error::invalid_input("parent id is required"));
                }
                if self.name.as_deref().map_or(true, str::is_empty) {
                    return Err(error::invalid_input("name is required"));
                }
            }
        }
        Ok(UploadInput {
            api: self.api,
            parent_id: self.parent_id,
            name: self.name,
            duplicate: self.duplicate.unwrap_or_default(),
            body,
            session: self.session,
            progress: self.progress,
            rapid_upload: self.rapid_upload,
        })
    }
}

impl fmt::Debug for UploadInputBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadInputBuilder")
            .field("parent_id", &self.parent_id)
            .field("name", &self.name)
            .field("duplicate", &self.duplicate)
            .field("body", &self.body)
            .field("rapid_upload", &self.rapid_upload)
            .finish_non_exhaustive()
    }
}
