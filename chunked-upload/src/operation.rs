/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::Arc;

/// Types for the chunked upload operation
pub mod upload;

/// Container for maintaining context required to carry out a single operation/transfer.
///
/// `State` is whatever additional operation specific state is required for the operation.
#[derive(Debug)]
pub(crate) struct TransferContext<State> {
    pub(crate) handle: Arc<crate::client::Handle>,
    pub(crate) state: Arc<State>,
}

impl<State> TransferContext<State> {
    pub(crate) fn new(handle: Arc<crate::client::Handle>, state: State) -> Self {
        Self {
            handle,
            state: Arc::new(state),
        }
    }

    /// The HTTP client used for part transfers
    pub(crate) fn http_client(&self) -> &crate::http::SharedHttpClient {
        self.handle.config.http_client()
    }
}

impl<State> Clone for TransferContext<State> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            state: self.state.clone(),
        }
    }
}
