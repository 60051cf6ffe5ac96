/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

use crate::error::Error;
use crate::io::ContentStream;
use crate::operation::upload::api::UploadApi;
use crate::operation::upload::progress::ProgressListener;
use crate::operation::upload::session::UploadSession;
use crate::types::DuplicatePolicy;

use super::{UploadHandle, UploadInputBuilder};

/// Fluent builder for constructing a single upload transfer
#[derive(Debug)]
pub struct UploadFluentBuilder {
    handle: Arc<crate::client::Handle>,
    inner: UploadInputBuilder,
}

impl UploadFluentBuilder {
    pub(crate) fn new(handle: Arc<crate::client::Handle>) -> Self {
        Self {
            handle,
            inner: ::std::default::Default::default(),
        }
    }

    /// Initiate the upload.
    ///
    /// The transfer runs in the background, use the returned handle to wait for or cancel it.
    /// Must be called from within a tokio runtime.
    pub fn initiate(self) -> Result<UploadHandle, Error> {
        let input = self.inner.build()?;
        crate::operation::upload::Upload::orchestrate(self.handle, input)
    }

    /// The remote service the upload is driven through
    pub fn api(mut self, api: Arc<dyn UploadApi>) -> Self {
        self.inner = self.inner.api(api);
        self
    }

    /// Folder the upload is placed in
    pub fn parent_id(mut self, input: impl Into<String>) -> Self {
        self.inner = self.inner.parent_id(input);
        self
    }

    /// Name of the uploaded object
    pub fn name(mut self, input: impl Into<String>) -> Self {
        self.inner = self.inner.name(input);
        self
    }

    /// Name collision handling
    pub fn duplicate(mut self, input: DuplicatePolicy) -> Self {
        self.inner = self.inner.duplicate(input);
        self
    }

    /// Content to upload
    pub fn body(mut self, input: ContentStream) -> Self {
        self.inner = self.inner.body(input);
        self
    }

    /// Transfer the content through an already opened session
    pub fn session(mut self, input: UploadSession) -> Self {
        self.inner = self.inner.session(input);
        self
    }

    /// Called with monotonically increasing percentages in `[0, 100]`
    pub fn progress(mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        self.inner = self.inner.progress(ProgressListener::new(callback));
        self
    }

    /// Override the client's rapid upload setting for this upload
    pub fn rapid_upload(mut self, enabled: bool) -> Self {
        self.inner = self.inner.rapid_upload(enabled);
        self
    }
}

impl crate::operation::upload::input::UploadInputBuilder {
    /// Initiate an upload with this input using the given client.
    pub fn initiate_with(self, client: &crate::Client) -> Result<UploadHandle, Error> {
        let mut fluent_builder = client.upload();
        fluent_builder.inner = self;
        fluent_builder.initiate()
    }
}
