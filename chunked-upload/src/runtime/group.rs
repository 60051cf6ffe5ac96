/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceExt};

use crate::error::{self, Error, ErrorKind};
use crate::middleware::retry::RetryPolicy;

type SuccessHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Runs tasks with bounded parallelism, per-task retries and first-error cancellation.
///
/// * At most `limit` tasks run at once, [`go`](Self::go) waits for a free slot.
/// * Every task is wrapped in `tower::retry::Retry` with the group's [`RetryPolicy`].
/// * The first task to fail permanently cancels the group, its error is what
///   [`wait`](Self::wait) returns.
/// * Every task's cleanup runs exactly once, after its final attempt, whether it succeeded,
///   failed or was cancelled.
pub(crate) struct ConcurrencyGroup {
    permits: Arc<Semaphore>,
    tasks: JoinSet<()>,
    policy: RetryPolicy,
    shared: Arc<Shared>,
    on_success: Option<SuccessHook>,
}

#[derive(Debug)]
struct Shared {
    succeeded: AtomicU64,
    first_error: Mutex<Option<Error>>,
    cancel: CancellationToken,
}

impl Shared {
    fn fail(&self, err: Error) {
        let mut first = self.first_error.lock().unwrap_or_else(PoisonError::into_inner);
        if first.is_none() {
            if !err.is_cancelled() {
                tracing::error!("task failed permanently, cancelling remaining tasks: {err}");
            }
            *first = Some(err);
            self.cancel.cancel();
        }
    }
}

impl ConcurrencyGroup {
    /// Create a group running at most `limit` tasks at once. Cancelling `cancel` (or any of
    /// its parents) cancels the group.
    pub(crate) fn new(limit: usize, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.max(1))),
            tasks: JoinSet::new(),
            policy,
            shared: Arc::new(Shared {
                succeeded: AtomicU64::new(0),
                first_error: Mutex::new(None),
                cancel,
            }),
            on_success: None,
        }
    }

    /// Called with the running success count every time a task succeeds.
    pub(crate) fn on_success(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(hook));
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub(crate) fn cancel(&self) {
        self.shared.cancel.cancel();
    }

    /// The token tasks should observe for cancellation
    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.shared.cancel
    }

    /// Schedule `req` on `svc` once a slot is free.
    ///
    /// Returns a cancellation error without scheduling anything if the group is cancelled
    /// while waiting. `cleanup` runs in either case.
    pub(crate) async fn go<S, Req, C>(&mut self, svc: S, req: Req, cleanup: C) -> Result<(), Error>
    where
        S: Service<Req, Response = (), Error = Error> + Clone + Send + 'static,
        S::Future: Send,
        Req: Clone + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let cleanup = Cleanup(Some(cleanup));
        let permit = tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => return Err(error::operation_cancelled()),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(error::from_kind(ErrorKind::RuntimeError))?
            }
        };

        let svc = tower::retry::Retry::new(self.policy.clone(), svc);
        let shared = self.shared.clone();
        let on_success = self.on_success.clone();
        self.tasks.spawn(async move {
            let _permit = permit;
            let _cleanup = cleanup;
            let result = tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => Err(error::operation_cancelled()),
                result = svc.oneshot(req) => result,
            };
            match result {
                Ok(()) => {
                    let succeeded = shared.succeeded.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(hook) = on_success {
                        hook(succeeded);
                    }
                }
                Err(err) => shared.fail(err),
            }
        });
        Ok(())
    }

    /// Wait for every scheduled task. Returns the number of tasks that succeeded, or the
    /// first error.
    pub(crate) async fn wait(mut self) -> Result<u64, Error> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                self.shared.fail(err.into());
            }
        }
        let first = self
            .shared
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match first {
            Some(err) => Err(err),
            None => Ok(self.shared.succeeded.load(Ordering::SeqCst)),
        }
    }
}

impl fmt::Debug for ConcurrencyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyGroup")
            .field("available_permits", &self.permits.available_permits())
            .field("tasks", &self.tasks.len())
            .field("shared", &self.shared)
            .finish()
    }
}

/// Runs the wrapped closure when dropped, including when the owning task is aborted.
struct Cleanup<C: FnOnce()>(Option<C>);

impl<C: FnOnce()> Drop for Cleanup<C> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.0.take() {
            cleanup();
        }
    }
}
