/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;

/// Failed to read a window of the content
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

#[derive(Debug)]
enum ErrorKind {
    OutOfRange { offset: u64, length: u64, size: u64 },
    Io(std::io::Error),
    TaskFailed(tokio::task::JoinError),
}

impl Error {
    pub(crate) fn out_of_range(offset: u64, length: u64, size: u64) -> Self {
        Self {
            kind: ErrorKind::OutOfRange {
                offset,
                length,
                size,
            },
        }
    }

    /// True if the requested window does not fit inside the content
    pub fn is_out_of_range(&self) -> bool {
        matches!(self.kind, ErrorKind::OutOfRange { .. })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::OutOfRange {
                offset,
                length,
                size,
            } => write!(
                f,
                "window of {length} bytes at offset {offset} exceeds content size {size}"
            ),
            ErrorKind::Io(_) => f.write_str("failed to read content"),
            ErrorKind::TaskFailed(_) => f.write_str("blocking read task failed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::OutOfRange { .. } => None,
            ErrorKind::Io(err) => Some(err),
            ErrorKind::TaskFailed(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self {
            kind: ErrorKind::Io(value),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(value: tokio::task::JoinError) -> Self {
        Self {
            kind: ErrorKind::TaskFailed(value),
        }
    }
}
