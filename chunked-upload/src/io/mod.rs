/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

mod buffer;
pub(crate) mod rate_limit;
mod section_reader;
mod stream;

/// Error types related to I/O abstractions
pub mod error;

// re-exports
pub(crate) use self::buffer::Buffer;
pub use self::section_reader::{part_ranges, PartRanges, SectionReader, SectionReaderPool};
pub use self::stream::{ContentStream, RandomAccess};
