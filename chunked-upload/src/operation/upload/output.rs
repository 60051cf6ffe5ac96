/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

/// Result of a finished upload
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadOutput {
    /// The session the content was transferred through, `None` for rapid uploads
    pub session_id: Option<String>,
    /// Identifier of the stored object, if the service reported one
    pub file_id: Option<String>,
    /// Number of content bytes
    pub size: u64,
    /// Number of parts transferred
    pub parts_uploaded: u64,
    /// True if the service already held the content and nothing was transferred
    pub rapid_upload: bool,
}

impl UploadOutput {
    /// The session the content was transferred through
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Identifier of the stored object
    pub fn file_id(&self) -> Option<&str> {
        self.file_id.as_deref()
    }
}
