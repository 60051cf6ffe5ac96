/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{self, Error};
use crate::metrics::Throughput;

/// Shared bandwidth budget for all part bodies of a client.
///
/// Tokens are bytes and refill continuously at the configured rate, up to one second worth of
/// burst. Acquiring more than is available takes the bucket into debt and waits until the debt
/// has been paid back, so large chunks are throttled as accurately as small ones.
#[derive(Debug, Clone)]
pub(crate) struct TokenBucket {
    inner: Option<Arc<Bucket>>,
}

#[derive(Debug)]
struct Bucket {
    bytes_per_sec: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a bucket refilling at `rate`, or an unlimited one when no rate is given.
    pub(crate) fn new(rate: Option<&Throughput>) -> Self {
        let inner = rate
            .map(Throughput::as_bytes_per_sec)
            .filter(|bytes_per_sec| *bytes_per_sec > 0.0)
            .map(|bytes_per_sec| {
                Arc::new(Bucket {
                    bytes_per_sec,
                    state: Mutex::new(BucketState {
                        tokens: bytes_per_sec,
                        last_refill: Instant::now(),
                    }),
                })
            });
        Self { inner }
    }

    #[cfg(test)]
    pub(crate) fn unlimited() -> Self {
        Self { inner: None }
    }

    pub(crate) fn is_limited(&self) -> bool {
        self.inner.is_some()
    }

    /// Wait until `bytes` may be sent, or fail if `cancel` fires first.
    pub(crate) async fn acquire(&self, bytes: u64, cancel: &CancellationToken) -> Result<(), Error> {
        if cancel.is_cancelled() {
            return Err(error::operation_cancelled());
        }
        let Some(bucket) = &self.inner else {
            return Ok(());
        };

        let wait = bucket.reserve(bytes as f64);
        if wait.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(error::operation_cancelled()),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}

impl Bucket {
    /// Take `bytes` tokens and return how long the caller has to wait for them.
    fn reserve(&self, bytes: f64) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.bytes_per_sec).min(self.bytes_per_sec);
        state.last_refill = now;
        state.tokens -= bytes;

        if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-state.tokens / self.bytes_per_sec)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    use super::TokenBucket;
    use crate::metrics::Throughput;

    #[tokio::test(start_paused = true)]
    async fn test_unlimited_never_waits() {
        let bucket = TokenBucket::unlimited();
        assert!(!bucket.is_limited());
        let start = Instant::now();
        bucket
            .acquire(u64::MAX, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(start, Instant::now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttles_to_rate() {
        let bucket = TokenBucket::new(Some(&Throughput::new_bytes_per_sec(1000)));
        let cancel = CancellationToken::new();
        let start = Instant::now();

        // initial burst is free
        bucket.acquire(1000, &cancel).await.unwrap();
        assert_eq!(Duration::ZERO, start.elapsed());

        for _ in 0..4 {
            bucket.acquire(500, &cancel).await.unwrap();
        }
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(1990) && elapsed <= Duration::from_millis(2100),
            "{elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_while_throttled() {
        let bucket = TokenBucket::new(Some(&Throughput::new_bytes_per_sec(10)));
        let cancel = CancellationToken::new();
        bucket.acquire(10, &cancel).await.unwrap();

        let waiter = {
            let bucket = bucket.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { bucket.acquire(1000, &cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let err = waiter.await.unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }
}
