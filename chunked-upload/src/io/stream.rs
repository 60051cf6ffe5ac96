/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::io::error::Error;

/// Random access content that is read with positional, blocking reads.
///
/// Reads are always issued from a blocking thread, implementations may use plain `std` I/O.
pub trait RandomAccess: Send + Sync + fmt::Debug {
    /// Fill `dst` completely with the bytes starting at `offset`.
    fn read_exact_at(&self, dst: &mut [u8], offset: u64) -> std::io::Result<()>;
}

/// Content to upload.
///
/// The total size must be known up front, parts are read from arbitrary offsets and
/// may be read more than once when a part is retried.
#[derive(Debug, Clone)]
pub struct ContentStream {
    inner: RawContent,
    size: u64,
    mime_type: Option<String>,
}

#[derive(Debug, Clone)]
enum RawContent {
    /// In-memory buffer
    Buf(Bytes),
    /// File on disk
    Fs(PathBuf),
    /// User provided random access source
    Dyn(Arc<dyn RandomAccess>),
}

impl ContentStream {
    /// Create a new `ContentStream` that reads data from a given `path`.
    ///
    /// ## Warning
    /// The contents of the file MUST not change during the upload. The length is read once here
    /// and parts are read lazily as they are dispatched.
    ///
    /// ```no_run
    /// use chunked_upload::io::ContentStream;
    ///
    /// fn make_stream() -> ContentStream {
    ///     ContentStream::from_path("docs/rows.csv").expect("file should be readable")
    /// }
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Result<ContentStream, Error> {
        let path = path.as_ref().to_path_buf();
        let size = std::fs::metadata(&path)?.len();
        Ok(Self {
            inner: RawContent::Fs(path),
            size,
            mime_type: None,
        })
    }

    /// Create a new `ContentStream` over a custom [`RandomAccess`] source of `size` bytes.
    pub fn from_random_access(source: Arc<dyn RandomAccess>, size: u64) -> Self {
        Self {
            inner: RawContent::Dyn(source),
            size,
            mime_type: None,
        }
    }

    /// Attach a mime type that is forwarded to the remote service with the session request.
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Total number of bytes in the content
    pub fn size(&self) -> u64 {
        self.size
    }

    /// True if the content has no bytes
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The mime type, if one was attached
    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub(crate) fn check_range(&self, offset: u64, length: u64) -> Result<(), Error> {
        match offset.checked_add(length) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::out_of_range(offset, length, self.size)),
        }
    }

    /// The window as a zero copy slice, if the content is already in memory
    pub(crate) fn in_memory(&self, offset: u64, length: u64) -> Option<Bytes> {
        match &self.inner {
            RawContent::Buf(bytes) => {
                Some(bytes.slice(offset as usize..(offset + length) as usize))
            }
            _ => None,
        }
    }

    /// Fill `dst` with the bytes starting at `offset`, blocking the calling thread.
    pub(crate) fn read_exact_at_sync(&self, dst: &mut [u8], offset: u64) -> Result<(), Error> {
        self.check_range(offset, dst.len() as u64)?;
        match &self.inner {
            RawContent::Buf(bytes) => {
                let start = offset as usize;
                dst.copy_from_slice(&bytes[start..start + dst.len()]);
            }
            RawContent::Fs(path) => file_util::read_file_chunk_sync(dst, path, offset)?,
            RawContent::Dyn(source) => source.read_exact_at(dst, offset)?,
        }
        Ok(())
    }

    /// Read `length` bytes starting at `offset`.
    pub(crate) async fn read_range(&self, offset: u64, length: u64) -> Result<Bytes, Error> {
        self.check_range(offset, length)?;
        if let Some(bytes) = self.in_memory(offset, length) {
            return Ok(bytes);
        }
        let this = self.clone();
        let handle = tokio::task::spawn_blocking(move || {
            let mut dst = vec![0u8; length as usize];
            this.read_exact_at_sync(&mut dst, offset)?;
            Ok::<Bytes, Error>(dst.into())
        });
        handle.await?
    }
}

mod file_util {
    #[cfg(unix)]
    pub(super) use unix::read_file_chunk_sync;
    #[cfg(windows)]
    pub(super) use windows::read_file_chunk_sync;

    #[cfg(unix)]
    mod unix {
        use std::fs::File;
        use std::io;
        use std::os::unix::fs::FileExt;
        use std::path::Path;

        pub(crate) fn read_file_chunk_sync(
            dst: &mut [u8],
            path: impl AsRef<Path>,
            offset: u64,
        ) -> Result<(), io::Error> {
            let file = File::open(path)?;
            file.read_exact_at(dst, offset)
        }
    }

    #[cfg(windows)]
    mod windows {
        use std::fs::File;
        use std::io;
        use std::io::{Read, Seek, SeekFrom};
        use std::path::Path;

        pub(crate) fn read_file_chunk_sync(
            dst: &mut [u8],
            path: impl AsRef<Path>,
            offset: u64,
        ) -> Result<(), io::Error> {
            let mut file = File::open(path)?;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(dst)
        }
    }
}

impl Default for ContentStream {
    fn default() -> Self {
        Self::from(Bytes::default())
    }
}

impl From<Bytes> for ContentStream {
    fn from(value: Bytes) -> Self {
        Self {
            size: value.len() as u64,
            inner: RawContent::Buf(value),
            mime_type: None,
        }
    }
}

impl From<Vec<u8>> for ContentStream {
    fn from(value: Vec<u8>) -> Self {
        Self::from(Bytes::from(value))
    }
}

impl From<&'static [u8]> for ContentStream {
    fn from(slice: &'static [u8]) -> ContentStream {
        Self::from(Bytes::from_static(slice))
    }
}

impl From<&'static str> for ContentStream {
    fn from(slice: &'static str) -> ContentStream {
        Self::from(Bytes::from_static(slice.as_bytes()))
    }
}
