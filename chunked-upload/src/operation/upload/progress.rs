/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Progress reported once the session is open
pub(crate) const SESSION_OPENED: f64 = 10.0;

/// Share of the progress range covered by part transfers
const PARTS_SPAN: f64 = 85.0;

/// Progress reported once the upload is finished
pub(crate) const FINISHED: f64 = 100.0;

/// Callback receiving upload progress as a percentage in `[0, 100]`.
#[derive(Clone)]
pub struct ProgressListener(Arc<dyn Fn(f64) + Send + Sync>);

impl ProgressListener {
    /// Wrap a callback
    pub fn new(callback: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self(Arc::new(callback))
    }
}

impl fmt::Debug for ProgressListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressListener")
    }
}

/// Forwards progress to the listener, dropping values that would move it backwards.
#[derive(Debug, Clone)]
pub(crate) struct ProgressReporter {
    listener: Option<ProgressListener>,
    last: Arc<Mutex<f64>>,
}

impl ProgressReporter {
    pub(crate) fn new(listener: Option<ProgressListener>) -> Self {
        Self {
            listener,
            last: Arc::new(Mutex::new(0.0)),
        }
    }

    pub(crate) fn report(&self, value: f64) {
        let value = value.clamp(0.0, FINISHED);
        // the lock is held while calling out so listeners observe values in order
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if value <= *last {
            return;
        }
        *last = value;
        if let Some(listener) = &self.listener {
            (listener.0)(value);
        }
    }

    /// Progress after `done` of `total` parts succeeded
    pub(crate) fn parts_done(&self, done: u64, total: u64) {
        if total > 0 {
            self.report(SESSION_OPENED + PARTS_SPAN * done as f64 / total as f64);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{ProgressListener, ProgressReporter};

    #[test]
    fn test_monotonic_and_bounded() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let reporter =
            ProgressReporter::new(Some(ProgressListener::new(move |v| sink.lock().unwrap().push(v))));

        reporter.report(10.0);
        reporter.parts_done(1, 3);
        reporter.parts_done(1, 3);
        reporter.report(20.0);
        reporter.parts_done(3, 3);
        reporter.report(250.0);
        reporter.report(100.0);

        let seen = seen.lock().unwrap();
        assert_eq!(4, seen.len());
        assert_eq!(10.0, seen[0]);
        assert!((seen[1] - (10.0 + 85.0 / 3.0)).abs() < 1e-9);
        assert_eq!(95.0, seen[2]);
        assert_eq!(100.0, seen[3]);
    }
}
