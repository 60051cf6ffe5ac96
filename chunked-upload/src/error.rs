/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;

use crate::types::RemoteErrorCode;

/// A boxed error that is `Send` and `Sync`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by this library
///
/// Use the `source()` chain to get the underlying cause, the [`ErrorKind`] identifies the
/// phase of the transfer that failed.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    source: BoxError,
}

/// General categories of transfer errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Operation input validation issues
    InputInvalid,

    /// I/O errors
    IOError,

    /// Some kind of internal runtime issue (e.g. task failure, poisoned mutex, etc)
    RuntimeError,

    /// Opening the upload session failed
    SessionCreateFailed,

    /// Failed to upload a part of the content
    ChunkFailed(ChunkFailed),

    /// Finalizing the upload session failed or did not finish in time
    CompletionFailed,

    /// The remote service answered with a structured error code that is not locally repairable
    RemoteError(RemoteErrorCode),

    /// The request could not be sent or the remote service answered with an unexpected status
    RequestFailed,

    /// The remote service answered with a body that is missing expected fields
    MalformedResponse,

    /// Re-creating the device session failed too many times in a row
    AuthRepairExhausted,

    /// The operation was cancelled, either explicitly through the handle or because a part
    /// failed permanently.
    OperationCancelled,
}

/// Stores information about a failed part
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChunkFailed {
    /// 1-indexed part number
    part_number: u64,
}

impl ChunkFailed {
    /// The 1-indexed number of the part that failed
    pub fn part_number(&self) -> u64 {
        self.part_number
    }
}

impl Error {
    /// Creates a new transfer [`Error`] from a known kind of error as well as an arbitrary error
    /// source.
    pub fn new<E>(kind: ErrorKind, err: E) -> Error
    where
        E: Into<BoxError>,
    {
        Error {
            kind,
            source: err.into(),
        }
    }

    /// Returns the corresponding [`ErrorKind`] for this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The structured remote error code carried by this error, if any.
    ///
    /// Errors wrapped by a phase (e.g. [`ErrorKind::SessionCreateFailed`]) are searched through
    /// their source chain.
    pub fn remote_code(&self) -> Option<&RemoteErrorCode> {
        let mut next: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = next {
            if let Some(Error {
                kind: ErrorKind::RemoteError(code),
                ..
            }) = err.downcast_ref::<Error>()
            {
                return Some(code);
            }
            next = err.source();
        }
        None
    }

    /// Returns true if this error (or any error it wraps) is a cancellation
    pub fn is_cancelled(&self) -> bool {
        let mut next: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = next {
            if let Some(err) = err.downcast_ref::<Error>() {
                if err.kind == ErrorKind::OperationCancelled {
                    return true;
                }
            }
            next = err.source();
        }
        false
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::InputInvalid => write!(f, "invalid input"),
            ErrorKind::IOError => write!(f, "I/O error"),
            ErrorKind::RuntimeError => write!(f, "runtime error"),
            ErrorKind::SessionCreateFailed => write!(f, "failed to create upload session"),
            ErrorKind::ChunkFailed(chunk_failed) => {
                write!(f, "failed to upload part {}", chunk_failed.part_number)
            }
            ErrorKind::CompletionFailed => write!(f, "failed to complete upload session"),
            ErrorKind::RemoteError(code) => write!(f, "remote error {code}: {}", self.source),
            ErrorKind::RequestFailed => write!(f, "request failed"),
            ErrorKind::MalformedResponse => write!(f, "malformed response"),
            ErrorKind::AuthRepairExhausted => write!(f, "authentication repair exhausted"),
            ErrorKind::OperationCancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

impl From<crate::io::error::Error> for Error {
    fn from(value: crate::io::error::Error) -> Self {
        Self::new(ErrorKind::IOError, value)
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::new(ErrorKind::IOError, value)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::new(ErrorKind::RuntimeError, value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::new(ErrorKind::MalformedResponse, value)
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Self::new(ErrorKind::RequestFailed, value)
    }
}

pub(crate) fn invalid_input<E>(err: E) -> Error
where
    E: Into<BoxError>,
{
    Error::new(ErrorKind::InputInvalid, err)
}

pub(crate) fn chunk_failed<E>(part_number: u64, err: E) -> Error
where
    E: Into<BoxError>,
{
    Error::new(ErrorKind::ChunkFailed(ChunkFailed { part_number }), err)
}

pub(crate) fn malformed_response<E>(err: E) -> Error
where
    E: Into<BoxError>,
{
    Error::new(ErrorKind::MalformedResponse, err)
}

pub(crate) fn remote(code: RemoteErrorCode, message: impl Into<String>) -> Error {
    Error::new(ErrorKind::RemoteError(code), message.into())
}

pub(crate) fn from_kind<E>(kind: ErrorKind) -> impl FnOnce(E) -> Error
where
    E: Into<BoxError>,
{
    |err| Error::new(kind, err)
}

static CANCELLATION_ERROR: &str =
    "the upload has been cancelled, no further parts will be dispatched";

pub(crate) fn operation_cancelled() -> Error {
    Error::new(ErrorKind::OperationCancelled, CANCELLATION_ERROR)
}
