/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;

/// The target part size for an upload.
#[derive(Debug, Clone, Default)]
pub enum PartSize {
    /// Use the default part size (10 MiB).
    #[default]
    Auto,

    /// Target part size explicitly given.
    ///
    /// NOTE: The remote service negotiates the part size when the session is created. This
    /// value is only used when the service does not return one.
    Target(u64),
}

/// The concurrency settings to use for a single upload.
#[derive(Debug, Clone, Default)]
pub enum ConcurrencySetting {
    /// Use the default number of concurrent part uploads.
    #[default]
    Auto,

    /// Explicitly configured maximum number of parts in flight.
    Explicit(usize),
}

/// How the remote service should handle an existing object with the same name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum DuplicatePolicy {
    /// Keep both, the service picks a new name for the upload
    #[default]
    Rename,
    /// Replace the existing object
    Overwrite,
    /// Fail the session creation
    Refuse,
}

impl DuplicatePolicy {
    /// Numeric wire value of this policy
    pub fn as_code(&self) -> u8 {
        match self {
            DuplicatePolicy::Rename => 1,
            DuplicatePolicy::Overwrite => 2,
            DuplicatePolicy::Refuse => 3,
        }
    }

    /// Name mode wire value of this policy
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicatePolicy::Rename => "auto_rename",
            DuplicatePolicy::Overwrite => "overwrite",
            DuplicatePolicy::Refuse => "refuse",
        }
    }
}

/// Structured error codes reported by the remote service.
///
/// Recovery is dispatched on the variant: expired credentials and invalid device session
/// signatures are repaired locally, everything else is surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RemoteErrorCode {
    /// The access credential expired and must be refreshed
    AccessTokenInvalid,
    /// The per-device session signature is no longer accepted
    DeviceSessionSignatureInvalid,
    /// The submitted partial content hash matches content the service already holds
    PreHashMatched,
    /// Any other code, carried verbatim
    Other(String),
}

impl RemoteErrorCode {
    /// Parse a wire code
    pub fn from_code(code: &str) -> Self {
        match code {
            "AccessTokenInvalid" | "AccessTokenExpired" => RemoteErrorCode::AccessTokenInvalid,
            "DeviceSessionSignatureInvalid" => RemoteErrorCode::DeviceSessionSignatureInvalid,
            "PreHashMatched" => RemoteErrorCode::PreHashMatched,
            other => RemoteErrorCode::Other(other.to_owned()),
        }
    }

    /// The wire representation of this code
    pub fn as_str(&self) -> &str {
        match self {
            RemoteErrorCode::AccessTokenInvalid => "AccessTokenInvalid",
            RemoteErrorCode::DeviceSessionSignatureInvalid => "DeviceSessionSignatureInvalid",
            RemoteErrorCode::PreHashMatched => "PreHashMatched",
            RemoteErrorCode::Other(code) => code,
        }
    }

    /// Returns true if the request client can repair this error locally
    pub fn is_repairable(&self) -> bool {
        matches!(
            self,
            RemoteErrorCode::AccessTokenInvalid | RemoteErrorCode::DeviceSessionSignatureInvalid
        )
    }
}

impl fmt::Display for RemoteErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::RemoteErrorCode;

    #[test]
    fn test_parse_remote_codes() {
        assert_eq!(
            RemoteErrorCode::AccessTokenInvalid,
            RemoteErrorCode::from_code("AccessTokenInvalid")
        );
        assert_eq!(
            RemoteErrorCode::DeviceSessionSignatureInvalid,
            RemoteErrorCode::from_code("DeviceSessionSignatureInvalid")
        );
        let other = RemoteErrorCode::from_code("QuotaExhausted.Drive");
        assert_eq!("QuotaExhausted.Drive", other.as_str());
        assert!(!other.is_repairable());
        assert!(RemoteErrorCode::AccessTokenInvalid.is_repairable());
    }
}
