// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

use rudder_config::RunsConfig;

use crate::cancel::CancelToken;
use crate::error::{ErrorCode, RunError};
use crate::run::{derive_status, error_from_result, Run, RunMetrics, RunProgress, RunStatus};

/// Handles passed to an executor for the duration of one run.
pub struct RunContext {
    pub run_id: String,
    pub cancel: CancelToken,
    pub progress: ProgressHandle,
}

/// Reports completed work units back to the stored run.
#[derive(Clone)]
pub struct ProgressHandle {
    inner: Arc<dyn Fn(u32) + Send + Sync>,
}

impl ProgressHandle {
    pub fn set(&self, done_steps: u32) {
        (self.inner)(done_steps)
    }

    /// A handle that discards updates; for tests and detached executors.
    pub fn noop() -> Self {
        Self {
            inner: Arc::new(|_| {}),
        }
    }
}

pub type ExecutorFuture = BoxFuture<'static, Result<Value, RunError>>;
/// The work of one run: an async closure consuming the run context.
pub type RunExecutor = Box<dyn FnOnce(RunContext) -> ExecutorFuture + Send>;
/// Invoked exactly once after the terminal status is set, before sync
/// callers are released.  Session reaping lives here.
pub type TerminalHook = Box<dyn FnOnce(Run) -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmitMode {
    Sync,
    Async,
    /// Sync for light workloads (≤ 10 units), async otherwise.
    #[default]
    Auto,
}

#[derive(Default)]
pub struct SubmitOptions {
    pub mode: SubmitMode,
    pub timeout_ms: Option<u64>,
    pub on_terminal: Option<TerminalHook>,
}

/// Identity of the run being submitted.
#[derive(Debug, Clone, Default)]
pub struct SubmitRequest {
    pub template_id: String,
    pub session_id: Option<String>,
    pub owns_session: bool,
    pub total_steps: u32,
}

/// What `submit` hands back: the terminal run (sync) or just the id (async).
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    Completed(Run),
    Accepted { run_id: String },
}

impl SubmitOutcome {
    pub fn run_id(&self) -> &str {
        match self {
            SubmitOutcome::Completed(run) => &run.id,
            SubmitOutcome::Accepted { run_id } => run_id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<RunStatus>,
    pub template_id: Option<String>,
    pub session_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ListResult {
    /// Size of the filtered set, independent of pagination.
    pub total: usize,
    pub runs: Vec<Run>,
}

struct Slot {
    run: Run,
    seq: u64,
    cancel: CancelToken,
    done_rx: watch::Receiver<bool>,
}

struct ManagerInner {
    runs: Mutex<HashMap<String, Slot>>,
    sem: Arc<Semaphore>,
    max_pending: usize,
    seq: AtomicU64,
}

/// Concurrency-bounded task-run registry.
///
/// A semaphore of `max_concurrent_runs` gates queued → running; ordering
/// among ready runs is FIFO because waiters queue on the semaphore in
/// submission order and no run holds a permit across anything but its own
/// executor.  Runs are kept in memory only.
#[derive(Clone)]
pub struct RunManager {
    inner: Arc<ManagerInner>,
}

impl RunManager {
    pub fn new(cfg: &RunsConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                runs: Mutex::new(HashMap::new()),
                sem: Arc::new(Semaphore::new(cfg.max_concurrent_runs.max(1))),
                max_pending: cfg.max_pending_runs.max(1),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Create and schedule a run.
    ///
    /// In sync mode the call resolves with the terminal run; in async mode
    /// it returns immediately with the run id.  Submissions beyond the
    /// queued+running bound fail with RUN_BACKPRESSURE and never consume a
    /// run id.
    pub async fn submit(
        &self,
        req: SubmitRequest,
        executor: RunExecutor,
        options: SubmitOptions,
    ) -> Result<SubmitOutcome, RunError> {
        let run_id = format!("run_{}", uuid::Uuid::new_v4());
        let cancel = CancelToken::new();
        let (done_tx, done_rx) = watch::channel(false);

        {
            let mut runs = self.inner.runs.lock().unwrap();
            let live = runs.values().filter(|s| !s.run.status.is_terminal()).count();
            if live >= self.inner.max_pending {
                return Err(RunError::backpressure(self.inner.max_pending));
            }
            runs.insert(
                run_id.clone(),
                Slot {
                    run: Run {
                        id: run_id.clone(),
                        template_id: req.template_id.clone(),
                        session_id: req.session_id.clone(),
                        owns_session: req.owns_session,
                        status: RunStatus::Queued,
                        progress: RunProgress {
                            done_steps: 0,
                            total_steps: req.total_steps,
                        },
                        result: None,
                        error: None,
                        artifact_ids: Vec::new(),
                        metrics: RunMetrics {
                            created_at: Utc::now(),
                            ..RunMetrics::default()
                        },
                    },
                    seq: self.inner.seq.fetch_add(1, Ordering::SeqCst),
                    cancel: cancel.clone(),
                    done_rx: done_rx.clone(),
                },
            );
        }

        let sync = match options.mode {
            SubmitMode::Sync => true,
            SubmitMode::Async => false,
            SubmitMode::Auto => req.total_steps <= 10,
        };

        debug!(run_id = %run_id, template = %req.template_id, sync, "run submitted");

        let inner = Arc::clone(&self.inner);
        let task_run_id = run_id.clone();
        let timeout_ms = options.timeout_ms;
        let on_terminal = options.on_terminal;
        tokio::spawn(async move {
            drive_run(inner, task_run_id, cancel, executor, timeout_ms, on_terminal, done_tx)
                .await;
        });

        if sync {
            let mut rx = done_rx;
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
            let run = self
                .get(&run_id)
                .ok_or_else(|| RunError::new(ErrorCode::RunNotFound, "run vanished"))?;
            Ok(SubmitOutcome::Completed(run))
        } else {
            Ok(SubmitOutcome::Accepted { run_id })
        }
    }

    pub fn get(&self, run_id: &str) -> Option<Run> {
        self.inner
            .runs
            .lock()
            .unwrap()
            .get(run_id)
            .map(|s| s.run.clone())
    }

    /// Filtered snapshot ordered by createdAt descending; same-millisecond
    /// ties break by insertion order (newest first).
    pub fn list(&self, filter: &ListFilter) -> ListResult {
        let runs = self.inner.runs.lock().unwrap();
        let mut matched: Vec<(&u64, &Run)> = runs
            .values()
            .filter(|s| {
                filter.status.map_or(true, |st| s.run.status == st)
                    && filter
                        .template_id
                        .as_deref()
                        .map_or(true, |t| s.run.template_id == t)
                    && filter
                        .session_id
                        .as_deref()
                        .map_or(true, |id| s.run.session_id.as_deref() == Some(id))
            })
            .map(|s| (&s.seq, &s.run))
            .collect();
        matched.sort_by(|a, b| {
            b.1.metrics
                .created_at
                .cmp(&a.1.metrics.created_at)
                .then(b.0.cmp(a.0))
        });
        let total = matched.len();
        let offset = filter.offset.unwrap_or(0).min(total);
        let limit = filter.limit.unwrap_or(total);
        let runs = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|(_, r)| r.clone())
            .collect();
        ListResult { total, runs }
    }

    /// Idempotent cooperative cancel.  Returns `false` for unknown or
    /// already-terminal runs.  The run transitions to canceled once its
    /// executor resolves; a partial result produced after the cancel is
    /// preserved on the canceled record.
    pub fn cancel(&self, run_id: &str) -> bool {
        let runs = self.inner.runs.lock().unwrap();
        match runs.get(run_id) {
            Some(slot) if !slot.run.status.is_terminal() => {
                slot.cancel.cancel(ErrorCode::RunCanceled);
                true
            }
            _ => false,
        }
    }

    /// Append an artifact id; permitted until the run is terminal.
    /// Duplicate ids are ignored so the list stays unique.
    pub fn attach_artifact(&self, run_id: &str, artifact_id: &str) -> Result<(), RunError> {
        let mut runs = self.inner.runs.lock().unwrap();
        let slot = runs
            .get_mut(run_id)
            .ok_or_else(|| RunError::new(ErrorCode::RunNotFound, format!("no run {run_id}")))?;
        if slot.run.status.is_terminal() {
            return Err(RunError::new(
                ErrorCode::InvalidParameter,
                "cannot attach artifacts to a terminal run",
            ));
        }
        if !slot.run.artifact_ids.iter().any(|a| a == artifact_id) {
            slot.run.artifact_ids.push(artifact_id.to_string());
        }
        Ok(())
    }

    /// Runs that are queued or running right now.
    pub fn live_count(&self) -> usize {
        self.inner
            .runs
            .lock()
            .unwrap()
            .values()
            .filter(|s| !s.run.status.is_terminal())
            .count()
    }

    /// Cancel every non-terminal run and wait for all of them to reach a
    /// terminal state.
    pub async fn dispose(&self) {
        let pending: Vec<(CancelToken, watch::Receiver<bool>)> = {
            let runs = self.inner.runs.lock().unwrap();
            runs.values()
                .filter(|s| !s.run.status.is_terminal())
                .map(|s| (s.cancel.clone(), s.done_rx.clone()))
                .collect()
        };
        for (token, _) in &pending {
            token.cancel(ErrorCode::RunCanceled);
        }
        for (_, mut rx) in pending {
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }
}

/// The per-run driver task: waits for a permit, runs the executor with an
/// optional timeout timer, then finalizes exactly once.
async fn drive_run(
    inner: Arc<ManagerInner>,
    run_id: String,
    cancel: CancelToken,
    executor: RunExecutor,
    timeout_ms: Option<u64>,
    on_terminal: Option<TerminalHook>,
    done_tx: watch::Sender<bool>,
) {
    let permit = match Arc::clone(&inner.sem).acquire_owned().await {
        Ok(p) => p,
        Err(_) => return, // semaphore closed: process shutting down
    };

    // Canceled while still queued: terminal without ever starting.
    let outcome = if cancel.is_canceled() {
        Err(RunError::canceled())
    } else {
        {
            let mut runs = inner.runs.lock().unwrap();
            if let Some(slot) = runs.get_mut(&run_id) {
                slot.run.status = RunStatus::Running;
                slot.run.metrics.started_at = Some(Utc::now());
            }
        }

        let timer = timeout_ms.map(|ms| {
            let token = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                token.cancel(ErrorCode::RunTimeout);
            })
        });

        let ctx = RunContext {
            run_id: run_id.clone(),
            cancel: cancel.clone(),
            progress: progress_handle(&inner, &run_id),
        };
        // Spawned so an executor panic becomes a terminal failure instead
        // of a run that never resolves.
        let result = match tokio::spawn(executor(ctx)).await {
            Ok(r) => r,
            Err(e) => {
                warn!(run_id = %run_id, "executor panicked: {e}");
                Err(RunError::internal(format!("executor panicked: {e}")))
            }
        };
        if let Some(t) = timer {
            t.abort();
        }
        result
    };

    let (status, result, error) = resolve_terminal(&cancel, outcome);
    let snapshot = {
        let mut runs = inner.runs.lock().unwrap();
        match runs.get_mut(&run_id) {
            Some(slot) if !slot.run.status.is_terminal() => {
                slot.run.status = status;
                slot.run.result = result;
                slot.run.error = error;
                let ended = Utc::now();
                slot.run.metrics.ended_at = Some(ended);
                if let Some(started) = slot.run.metrics.started_at {
                    slot.run.metrics.elapsed_ms =
                        Some((ended - started).num_milliseconds().max(0));
                }
                Some(slot.run.clone())
            }
            _ => None,
        }
    };

    if let Some(run) = snapshot {
        debug!(run_id = %run.id, status = %run.status, "run terminal");
        if let Some(hook) = on_terminal {
            hook(run).await;
        }
    }
    let _ = done_tx.send(true);
    drop(permit);
}

/// Map the executor outcome and the token state to the terminal triple.
/// Cancellation wins over completion; a timeout that fired after the
/// executor already returned successfully is a no-op.
fn resolve_terminal(
    cancel: &CancelToken,
    outcome: Result<Value, RunError>,
) -> (RunStatus, Option<Value>, Option<RunError>) {
    match outcome {
        Ok(value) => {
            if cancel.reason() == Some(ErrorCode::RunCanceled) {
                (RunStatus::Canceled, Some(value), Some(RunError::canceled()))
            } else {
                let status = derive_status(&value);
                let error = (status == RunStatus::Failed).then(|| error_from_result(&value));
                (status, Some(value), error)
            }
        }
        Err(err) => {
            if cancel.reason() == Some(ErrorCode::RunCanceled)
                || err.code == ErrorCode::RunCanceled
            {
                (RunStatus::Canceled, None, Some(RunError::canceled()))
            } else {
                (RunStatus::Failed, None, Some(err))
            }
        }
    }
}

fn progress_handle(inner: &Arc<ManagerInner>, run_id: &str) -> ProgressHandle {
    let inner = Arc::clone(inner);
    let run_id = run_id.to_string();
    ProgressHandle {
        inner: Arc::new(move |done| {
            let mut runs = inner.runs.lock().unwrap();
            if let Some(slot) = runs.get_mut(&run_id) {
                if !slot.run.status.is_terminal() {
                    slot.run.progress.done_steps = done.min(slot.run.progress.total_steps);
                }
            }
        }),
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
