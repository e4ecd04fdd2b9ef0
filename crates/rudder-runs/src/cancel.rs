// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::{ErrorCode, RunError};

/// Cooperative cancellation handle.
///
/// Executors observe the token at their yield points; nothing is aborted
/// for them.  The first `cancel` call wins — later calls (e.g. a timeout
/// racing a user cancel) do not overwrite the recorded reason.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    canceled: AtomicBool,
    reason: Mutex<Option<ErrorCode>>,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token.  Idempotent; only the first reason is kept.
    pub fn cancel(&self, reason: ErrorCode) {
        {
            let mut r = self.inner.reason.lock().unwrap();
            if r.is_some() {
                return;
            }
            *r = Some(reason);
        }
        self.inner.canceled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<ErrorCode> {
        *self.inner.reason.lock().unwrap()
    }

    /// Error-on-canceled observation for use with `?` at yield points.
    pub fn check(&self) -> Result<(), RunError> {
        match self.reason() {
            None => Ok(()),
            Some(ErrorCode::RunTimeout) => Err(RunError::timeout()),
            Some(_) => Err(RunError::canceled()),
        }
    }

    /// Resolve when the token is tripped.
    pub async fn cancelled(&self) {
        loop {
            if self.is_canceled() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_canceled() {
                return;
            }
            notified.await;
        }
    }

    /// Token-aware sleep.  Polls the token at least every 250 ms and
    /// returns the cancellation error as soon as it is observed.
    pub async fn sleep(&self, duration: Duration) -> Result<(), RunError> {
        const SLICE: Duration = Duration::from_millis(250);
        let mut remaining = duration;
        loop {
            self.check()?;
            if remaining.is_zero() {
                return Ok(());
            }
            let step = remaining.min(SLICE);
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = self.cancelled() => {}
            }
            remaining = remaining.saturating_sub(step);
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
