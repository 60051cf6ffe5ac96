/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::time::Duration;

use crate::error::Error;

/// A `tower::retry::Policy` retrying failed parts with exponential backoff.
///
/// `tower::retry::Retry` clones the policy for every request, so the attempt budget applies to
/// each part on its own.
#[derive(Debug, Clone)]
pub(crate) struct RetryPolicy {
    remaining_attempts: u32,
    next_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` includes the first attempt
    pub(crate) fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            remaining_attempts: max_attempts.saturating_sub(1),
            next_delay: base_delay,
        }
    }
}

impl<Req> tower::retry::Policy<Req, (), Error> for RetryPolicy
where
    Req: Clone,
{
    type Future = tokio::time::Sleep;

    fn retry(&mut self, _req: &mut Req, result: &mut Result<(), Error>) -> Option<Self::Future> {
        let err = result.as_ref().err()?;
        if err.is_cancelled() || self.remaining_attempts == 0 {
            return None;
        }
        self.remaining_attempts -= 1;
        let delay = self.next_delay;
        self.next_delay = delay.saturating_mul(2);
        tracing::warn!("retrying in {delay:?} after error: {err}");
        Some(tokio::time::sleep(delay))
    }

    fn clone_request(&mut self, req: &Req) -> Option<Req> {
        Some(req.clone())
    }
}
