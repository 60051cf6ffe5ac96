/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::cmp;
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;

use crate::io::error::Error;
use crate::io::{Buffer, ContentStream};

/// Iterator over the `(offset, length)` windows a piece of content is split into.
///
/// Windows are contiguous, non-overlapping and cover the whole content. Every window is
/// `part_size` bytes long except the last one, which holds the remainder.
#[derive(Debug, Clone)]
pub struct PartRanges {
    size: u64,
    part_size: u64,
    next_offset: u64,
}

/// Split `size` bytes into windows of `part_size` bytes.
///
/// Yields nothing for empty content. A zero `part_size` is treated as one byte.
pub fn part_ranges(size: u64, part_size: u64) -> PartRanges {
    PartRanges {
        size,
        part_size: part_size.max(1),
        next_offset: 0,
    }
}

impl PartRanges {
    /// The number of windows, `ceil(size / part_size)`
    pub fn part_count(&self) -> u64 {
        self.size.div_ceil(self.part_size)
    }
}

impl Iterator for PartRanges {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_offset >= self.size {
            return None;
        }
        let offset = self.next_offset;
        let length = cmp::min(self.part_size, self.size - offset);
        self.next_offset += length;
        Some((offset, length))
    }
}

/// An independent read-only view over one window of the content.
///
/// Every body produced from a reader starts at the first byte of its window, so a retried part
/// re-reads the same bytes without coordinating with other parts.
#[derive(Debug)]
pub struct SectionReader {
    offset: u64,
    data: SectionData,
}

#[derive(Debug)]
enum SectionData {
    Shared(Bytes),
    Pooled(Buffer),
}

impl SectionReader {
    /// Offset of the window inside the content
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of bytes in the window
    pub fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    /// True if the window is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes of the window
    pub fn as_slice(&self) -> &[u8] {
        match &self.data {
            SectionData::Shared(bytes) => bytes,
            SectionData::Pooled(buf) => buf,
        }
    }

    /// At most `max` bytes starting `pos` bytes into the window.
    pub(crate) fn chunk(&self, pos: u64, max: u64) -> Bytes {
        let pos = cmp::min(pos, self.len());
        let len = cmp::min(max, self.len() - pos) as usize;
        let pos = pos as usize;
        match &self.data {
            SectionData::Shared(bytes) => bytes.slice(pos..pos + len),
            SectionData::Pooled(buf) => buf.copy_chunk(pos, len),
        }
    }
}

/// Hands out [`SectionReader`]s over one [`ContentStream`] and recycles their buffers.
///
/// In-memory content is sliced without copying. File and custom sources are read into pooled
/// buffers sized to the window, at most `max_pooled` of them are kept for reuse.
#[derive(Debug)]
pub struct SectionReaderPool {
    stream: ContentStream,
    max_buffer: usize,
    max_pooled: usize,
    buffers: Mutex<Vec<Buffer>>,
}

impl SectionReaderPool {
    /// Create a pool over `stream` for windows of at most `part_size` bytes.
    pub fn new(stream: ContentStream, part_size: u64, max_pooled: usize) -> Self {
        let max_buffer = usize::try_from(part_size.min(stream.size())).unwrap_or(usize::MAX);
        Self {
            stream,
            max_buffer,
            max_pooled,
            buffers: Mutex::new(Vec::new()),
        }
    }

    /// The content this pool reads from
    pub fn stream(&self) -> &ContentStream {
        &self.stream
    }

    /// Get a reader over `length` bytes starting at `offset`.
    ///
    /// Fails if the window does not fit inside the content.
    pub async fn section(&self, offset: u64, length: u64) -> Result<SectionReader, Error> {
        self.stream.check_range(offset, length)?;
        if let Some(bytes) = self.stream.in_memory(offset, length) {
            return Ok(SectionReader {
                offset,
                data: SectionData::Shared(bytes),
            });
        }

        let len = usize::try_from(length)
            .map_err(|_| Error::out_of_range(offset, length, self.stream.size()))?;
        let mut buf = self.take_buffer(len);
        buf.fill_to(len);
        let stream = self.stream.clone();
        let handle = tokio::task::spawn_blocking(move || {
            stream.read_exact_at_sync(&mut buf, offset)?;
            Ok::<Buffer, Error>(buf)
        });
        let buf = handle.await??;

        Ok(SectionReader {
            offset,
            data: SectionData::Pooled(buf),
        })
    }

    /// Return a reader's buffer to the pool. The reader must not be used afterwards.
    pub fn recycle(&self, reader: SectionReader) {
        if let SectionData::Pooled(mut buf) = reader.data {
            let mut buffers = self.buffers.lock().unwrap_or_else(PoisonError::into_inner);
            if buffers.len() < self.max_pooled && buf.capacity() <= self.max_buffer {
                buf.clear();
                buffers.push(buf);
            }
        }
    }

    /// Number of idle buffers waiting to be reused
    pub fn idle_buffers(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn take_buffer(&self, length: usize) -> Buffer {
        let pooled = self
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();
        match pooled {
            Some(buf) if buf.capacity() >= length => buf,
            _ => Buffer::new(length),
        }
    }
}
