/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::ops::{Deref, DerefMut};

use bytes::{Bytes, BytesMut};

/// A reusable, fixed capacity buffer holding one window of content.
///
/// Buffers are handed out by the [`SectionReaderPool`](crate::io::SectionReaderPool) and return
/// to it once the part they hold has been transferred.
#[derive(Debug)]
pub(crate) struct Buffer {
    inner: BytesMut,
}

impl Buffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(capacity),
        }
    }

    /// Returns the number of bytes this buffer can hold without reallocating.
    pub(crate) fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Resize to exactly `len` zero filled bytes, ready to be read into.
    pub(crate) fn fill_to(&mut self, len: usize) {
        self.inner.clear();
        self.inner.resize(len, 0);
    }

    /// Forget the contents, keeping the allocation.
    pub(crate) fn clear(&mut self) {
        self.inner.clear();
    }

    /// Copy out `len` bytes starting at `pos` as an owned chunk.
    pub(crate) fn copy_chunk(&self, pos: usize, len: usize) -> Bytes {
        Bytes::copy_from_slice(&self.inner[pos..pos + len])
    }
}

impl AsRef<[u8]> for Buffer {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.inner.as_ref()
    }
}

impl Deref for Buffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.inner.deref()
    }
}

impl DerefMut for Buffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        self.inner.deref_mut()
    }
}
