//! In-process job scheduler
//!
//! Runs one-shot and repeating deferred actions keyed by name on the tokio
//! runtime. Each job is driven by its own task, so a job is never invoked
//! concurrently with itself, while independent jobs interleave freely.
//!
//! Failures inside an action (an `Err` or a panic) are logged and isolated:
//! a repeating job keeps its schedule and other jobs are unaffected.

use futures_util::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// One-shot or repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    /// Runs once, then is removed
    Once,
    /// Runs until it asks for removal or is cancelled
    Repeating,
}

/// What a job wants after an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobControl<P> {
    /// Keep the job; the next invocation receives this payload.
    Continue(P),
    /// Remove the job.
    Remove,
}

/// Data handed to a job action on every invocation.
pub struct JobContext<P> {
    /// Job name
    pub name: String,
    /// Payload as left by the previous invocation
    pub payload: P,
    handle: JobHandle,
}

impl<P> JobContext<P> {
    /// Remove the job from the schedule right away.
    ///
    /// The current invocation still runs to completion; no further
    /// invocation will start and [`Scheduler::is_scheduled`] turns false
    /// immediately.
    pub fn schedule_removal(&self) {
        self.handle.remove();
    }
}

#[derive(Clone)]
struct JobHandle {
    inner: Arc<Inner>,
    name: String,
    id: u64,
    token: CancellationToken,
}

impl JobHandle {
    fn remove(&self) {
        self.token.cancel();
        self.inner.remove_if_current(&self.name, self.id);
    }
}

struct JobEntry {
    id: u64,
    kind: JobKind,
    token: CancellationToken,
}

struct Inner {
    jobs: Mutex<HashMap<String, JobEntry>>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl Inner {
    fn jobs(&self) -> MutexGuard<'_, HashMap<String, JobEntry>> {
        // The table is only touched in short non-panicking sections
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove_if_current(&self, name: &str, id: u64) {
        let mut jobs = self.jobs();
        if jobs.get(name).is_some_and(|entry| entry.id == id) {
            jobs.remove(name);
        }
    }
}

/// Named job scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.len())
            .field("shut_down", &self.inner.shutdown.is_cancelled())
            .finish()
    }
}

impl Scheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Run `action` once, no earlier than `delay` from now.
    ///
    /// A job already scheduled under `name` is cancelled and replaced.
    /// Returns `false` if the scheduler has been shut down.
    pub fn schedule_once<P, F, Fut>(
        &self,
        name: impl Into<String>,
        delay: Duration,
        payload: P,
        action: F,
    ) -> bool
    where
        P: Send + 'static,
        F: FnOnce(JobContext<P>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<JobControl<P>>> + Send + 'static,
    {
        let name = name.into();
        let Some(handle) = self.register(&name, JobKind::Once) else {
            return false;
        };

        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = handle.token.cancelled() => {
                    debug!(job = %handle.name, "Job cancelled before it was due");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }

            let ctx = JobContext {
                name: handle.name.clone(),
                payload,
                handle: handle.clone(),
            };
            let _ = run_isolated(&handle.name, async move { action(ctx).await }).await;
            handle.inner.remove_if_current(&handle.name, handle.id);
        });

        true
    }

    /// Run `action` first after `first_delay`, then every `interval`, until
    /// the action returns [`JobControl::Remove`], calls
    /// [`JobContext::schedule_removal`], or the job is cancelled.
    ///
    /// A due tick that arrives while an invocation is still running is
    /// delayed, never run in parallel. A failed invocation keeps the previous
    /// payload. Returns `false` if the scheduler has been shut down.
    pub fn schedule_repeating<P, F, Fut>(
        &self,
        name: impl Into<String>,
        interval: Duration,
        first_delay: Duration,
        payload: P,
        mut action: F,
    ) -> bool
    where
        P: Clone + Send + 'static,
        F: FnMut(JobContext<P>) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<JobControl<P>>> + Send + 'static,
    {
        let name = name.into();
        let Some(handle) = self.register(&name, JobKind::Repeating) else {
            return false;
        };

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + first_delay, interval.max(MIN_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut payload = payload;

            loop {
                tokio::select! {
                    biased;
                    () = handle.token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let ctx = JobContext {
                    name: handle.name.clone(),
                    payload: payload.clone(),
                    handle: handle.clone(),
                };
                match run_isolated(&handle.name, async { action(ctx).await }).await {
                    Some(JobControl::Continue(next)) => payload = next,
                    Some(JobControl::Remove) => break,
                    None => {}
                }

                if handle.token.is_cancelled() {
                    break;
                }
            }

            debug!(job = %handle.name, "Repeating job finished");
            handle.inner.remove_if_current(&handle.name, handle.id);
        });

        true
    }

    /// Cancel a job by name. Returns whether a job was found.
    ///
    /// An invocation already in progress is allowed to finish.
    pub fn cancel(&self, name: &str) -> bool {
        let removed = self.inner.jobs().remove(name);
        match removed {
            Some(entry) => {
                entry.token.cancel();
                debug!(job = %name, kind = ?entry.kind, "Job cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether a job is currently scheduled under `name`.
    #[must_use]
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.inner.jobs().contains_key(name)
    }

    /// Kind of the job scheduled under `name`.
    #[must_use]
    pub fn kind_of(&self, name: &str) -> Option<JobKind> {
        self.inner.jobs().get(name).map(|entry| entry.kind)
    }

    /// Number of scheduled jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.jobs().len()
    }

    /// Whether no job is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every job and refuse new ones.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let drained: Vec<(String, JobEntry)> = self.inner.jobs().drain().collect();
        for (name, entry) in &drained {
            entry.token.cancel();
            debug!(job = %name, "Job cancelled on shutdown");
        }
        if !drained.is_empty() {
            warn!("Scheduler shut down with {} pending job(s)", drained.len());
        }
    }

    fn register(&self, name: &str, kind: JobKind) -> Option<JobHandle> {
        if self.inner.shutdown.is_cancelled() {
            warn!(job = %name, "Scheduler is shut down, job not scheduled");
            return None;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.shutdown.child_token();
        let previous = self.inner.jobs().insert(
            name.to_string(),
            JobEntry {
                id,
                kind,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
            debug!(job = %name, "Replaced previously scheduled job");
        }

        Some(JobHandle {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
            id,
            token,
        })
    }
}

async fn run_isolated<T, Fut>(name: &str, fut: Fut) -> Option<T>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            error!(job = %name, "Scheduled job failed: {e:#}");
            None
        }
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(job = %name, "Scheduled job panicked: {reason}");
            None
        }
    }
}
