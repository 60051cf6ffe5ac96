/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{self, Error};
use crate::io::part_ranges;
use crate::types::DuplicatePolicy;

/// Hash evidence sent when opening a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum ContentHash {
    /// No hash, always transfer the content
    #[default]
    None,
    /// SHA-1 of the first 1 KiB, hex encoded
    PreHash(String),
    /// SHA-1 of the whole content and the possession proof for it
    Full {
        /// hex encoded SHA-1 of the content
        sha1: String,
        /// base64 of up to 8 content bytes at a secret derived offset
        proof_code: String,
    },
}

/// Request to open an upload session.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct CreateSessionRequest {
    /// Folder the upload is placed in
    pub parent_id: String,
    /// Name of the uploaded object
    pub name: String,
    /// Total content size in bytes
    pub size: u64,
    /// Name collision handling
    pub duplicate: DuplicatePolicy,
    /// Mime type of the content, if known
    pub mime_type: Option<String>,
    /// Lowercase hex MD5 of the whole content
    pub etag: Option<String>,
    /// Hash evidence for rapid upload
    pub content_hash: ContentHash,
}

impl CreateSessionRequest {
    pub(crate) fn new(
        parent_id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        duplicate: DuplicatePolicy,
    ) -> Self {
        Self {
            parent_id: parent_id.into(),
            name: name.into(),
            size,
            duplicate,
            mime_type: None,
            etag: None,
            content_hash: ContentHash::None,
        }
    }

    pub(crate) fn with_content_hash(&self, content_hash: ContentHash) -> Self {
        Self {
            content_hash,
            ..self.clone()
        }
    }
}

/// Response to [`CreateSessionRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct CreateSessionOutput {
    /// Session identifier, empty when `already_exists` is set
    pub session_id: String,
    /// Identifier of the stored object, if already assigned
    pub file_id: Option<String>,
    /// Part size negotiated by the service
    pub part_size: Option<u64>,
    /// The service already holds identical content, no part needs to be transferred
    pub already_exists: bool,
}

impl CreateSessionOutput {
    /// A session that requires the content to be transferred
    pub fn session(session_id: impl Into<String>, part_size: Option<u64>) -> Self {
        Self {
            session_id: session_id.into(),
            part_size,
            ..Default::default()
        }
    }

    /// The content is already stored as `file_id`
    pub fn existing(file_id: impl Into<String>) -> Self {
        Self {
            file_id: Some(file_id.into()),
            already_exists: true,
            ..Default::default()
        }
    }

    /// Set the object identifier
    pub fn with_file_id(mut self, file_id: impl Into<String>) -> Self {
        self.file_id = Some(file_id.into());
        self
    }
}

/// Response to finalizing a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct CompleteOutput {
    /// The object is fully assembled
    pub completed: bool,
    /// Assembly continues in the background and has to be polled
    pub async_completion: bool,
    /// Identifier of the stored object, if known
    pub file_id: Option<String>,
}

impl CompleteOutput {
    /// Finalization finished synchronously
    pub fn done() -> Self {
        Self {
            completed: true,
            ..Default::default()
        }
    }

    /// Finalization continues asynchronously
    pub fn pending() -> Self {
        Self {
            async_completion: true,
            ..Default::default()
        }
    }
}

/// A remote upload session.
///
/// Immutable once opened except for its completion flags.
#[derive(Debug)]
pub struct UploadSession {
    session_id: String,
    file_id: Option<String>,
    size: u64,
    part_size: u64,
    part_count: u64,
    completed: AtomicBool,
    async_completion: AtomicBool,
}

impl UploadSession {
    /// Describe an already opened session for `size` bytes split into `part_size` parts.
    pub fn new(session_id: impl Into<String>, size: u64, part_size: u64) -> Result<Self, Error> {
        if part_size == 0 {
            return Err(error::invalid_input("part size must be greater than zero"));
        }
        Ok(Self {
            session_id: session_id.into(),
            file_id: None,
            size,
            part_size,
            part_count: part_ranges(size, part_size).part_count(),
            completed: AtomicBool::new(false),
            async_completion: AtomicBool::new(false),
        })
    }

    /// Set the object identifier
    pub fn with_file_id(mut self, file_id: Option<String>) -> Self {
        self.file_id = file_id;
        self
    }

    /// Session identifier
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Object identifier, if assigned
    pub fn file_id(&self) -> Option<&str> {
        self.file_id.as_deref()
    }

    /// Total content size
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Size of every part but the last
    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// `ceil(size / part_size)`
    pub fn part_count(&self) -> u64 {
        self.part_count
    }

    /// True once the service reported the object as assembled
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// True if the service finalizes this session asynchronously
    pub fn is_async_completion(&self) -> bool {
        self.async_completion.load(Ordering::Acquire)
    }

    pub(crate) fn mark_async_completion(&self) {
        self.async_completion.store(true, Ordering::Release);
    }

    pub(crate) fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }
}

impl Clone for UploadSession {
    fn clone(&self) -> Self {
        Self {
            session_id: self.session_id.clone(),
            file_id: self.file_id.clone(),
            size: self.size,
            part_size: self.part_size,
            part_count: self.part_count,
            completed: AtomicBool::new(self.is_completed()),
            async_completion: AtomicBool::new(self.is_async_completion()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UploadSession;

    #[test]
    fn test_part_count() {
        let mb = 1024 * 1024;
        assert_eq!(3, UploadSession::new("s", 25 * mb, 10 * mb).unwrap().part_count());
        assert_eq!(2, UploadSession::new("s", 20 * mb, 10 * mb).unwrap().part_count());
        assert_eq!(0, UploadSession::new("s", 0, 10 * mb).unwrap().part_count());
        assert!(UploadSession::new("s", 10, 0).is_err());
    }

    #[test]
    fn test_completion_flags() {
        let session = UploadSession::new("s", 10, 4).unwrap();
        assert!(!session.is_completed());
        session.mark_async_completion();
        session.mark_completed();
        let copy = session.clone();
        assert!(copy.is_completed());
        assert!(copy.is_async_completion());
    }
}
