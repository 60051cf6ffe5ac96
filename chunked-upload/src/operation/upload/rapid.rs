/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::cmp;

use base64::Engine;
use sha1::{Digest, Sha1};
use tokio_util::sync::CancellationToken;

use crate::error::{self, Error};
use crate::io::ContentStream;

/// Bytes covered by the pre-hash
const PRE_HASH_LEN: u64 = 1024;

/// Bytes covered by the proof code
const PROOF_LEN: u64 = 8;

/// Window size used while hashing the whole content
const HASH_WINDOW: u64 = 4 * crate::MEBIBYTE;

/// Hex encoded SHA-1 of the first 1 KiB of the content
pub(crate) async fn pre_hash(stream: &ContentStream) -> Result<String, Error> {
    let head = stream
        .read_range(0, cmp::min(PRE_HASH_LEN, stream.size()))
        .await?;
    Ok(hex::encode(Sha1::digest(&head)))
}

/// Hex encoded SHA-1 of the whole content
pub(crate) async fn content_sha1(
    stream: &ContentStream,
    cancel: &CancellationToken,
) -> Result<String, Error> {
    let mut hasher = Sha1::new();
    for_each_window(stream, cancel, |window| hasher.update(window)).await?;
    Ok(hex::encode(hasher.finalize()))
}

/// Lowercase hex MD5 of the whole content, sent as the session etag
pub(crate) async fn content_md5(
    stream: &ContentStream,
    cancel: &CancellationToken,
) -> Result<String, Error> {
    let mut context = md5::Context::new();
    for_each_window(stream, cancel, |window| context.consume(window)).await?;
    Ok(format!("{:x}", context.compute()))
}

async fn for_each_window(
    stream: &ContentStream,
    cancel: &CancellationToken,
    mut f: impl FnMut(&[u8]),
) -> Result<(), Error> {
    let mut offset = 0;
    while offset < stream.size() {
        if cancel.is_cancelled() {
            return Err(error::operation_cancelled());
        }
        let len = cmp::min(HASH_WINDOW, stream.size() - offset);
        f(&stream.read_range(offset, len).await?);
        offset += len;
    }
    Ok(())
}

/// Offset of the proof bytes: the first 64 bits of `md5(secret)` modulo the content size
pub(crate) fn proof_offset(secret: &str, size: u64) -> u64 {
    if size == 0 {
        return 0;
    }
    let digest = format!("{:x}", md5::compute(secret.as_bytes()));
    // 16 hex digits always fit in a u64
    let r = u64::from_str_radix(&digest[..16], 16).unwrap_or_default();
    r % size
}

/// Base64 of up to 8 content bytes starting at [`proof_offset`]
pub(crate) async fn proof_code(secret: &str, stream: &ContentStream) -> Result<String, Error> {
    let offset = proof_offset(secret, stream.size());
    let len = cmp::min(PROOF_LEN, stream.size() - offset);
    let bytes = stream.read_range(offset, len).await?;
    Ok(base64::engine::general_purpose::STANDARD.encode(&bytes))
}
