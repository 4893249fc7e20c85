//! Job queue: runs request processing as named, tagged tokio tasks.
//!
//! Flow:
//! 1. The I/O side calls `post_coro()` with a tag, a label and a closure
//! 2. The closure is spawned immediately but waits for a permit of its tag
//! 3. The closure receives a [`JobCoro`] it can use to suspend further via
//!    `JobCoro::post()` without holding up any I/O task
//! 4. After `stop()`, new posts are refused and `drain()` waits for
//!    outstanding jobs to finish

use crate::domain::config::JobQueueConfig;
use crate::domain::error::{GatewayError, GatewayResult};
use crate::domain::job_id::JobId;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, trace, warn};

/// Job tag, used for scheduling limits and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobType {
    /// A client JSON-RPC request
    Client,
    /// Work a running command suspended onto
    ClientCommand,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Client => "clientRPC",
            JobType::ClientCommand => "clientCommand",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Statistics for the job queue
#[derive(Debug, Default)]
pub struct JobStats {
    /// Jobs accepted by `post_coro`
    pub posted: AtomicU64,
    /// Jobs currently holding a permit
    pub running: AtomicU64,
    /// Jobs that ran to completion
    pub finished: AtomicU64,
    /// Posts refused after `stop()`
    pub refused: AtomicU64,
}

struct Inner {
    client_permits: Arc<Semaphore>,
    stopping: AtomicBool,
    /// Posted but not yet finished
    outstanding: AtomicU64,
    idle: Notify,
    stats: JobStats,
}

/// Counts one outstanding job until dropped.
struct Outstanding(Arc<Inner>);

impl Outstanding {
    fn enter(inner: &Arc<Inner>) -> Self {
        inner.outstanding.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(inner))
    }
}

impl Drop for Outstanding {
    fn drop(&mut self) {
        if self.0.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Scheduler for request-processing jobs. Cheap to clone.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl JobQueue {
    pub fn new(config: &JobQueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client_permits: Arc::new(Semaphore::new(config.max_concurrent_client_jobs)),
                stopping: AtomicBool::new(false),
                outstanding: AtomicU64::new(0),
                idle: Notify::new(),
                stats: JobStats::default(),
            }),
        }
    }

    /// Post a job that receives its own continuation handle.
    ///
    /// Returns `false` if the queue is stopping; the closure is dropped
    /// without running. Must be called from within a tokio runtime.
    pub fn post_coro<F, Fut>(&self, job_type: JobType, name: &str, job: F) -> bool
    where
        F: FnOnce(JobCoro) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_stopping() {
            self.inner.stats.refused.fetch_add(1, Ordering::Relaxed);
            debug!(job_type = %job_type, name = name, "Job refused; queue is stopping");
            return false;
        }

        let coro = JobCoro {
            id: JobId::new(),
            job_type,
            name: name.to_string(),
            queue: self.clone(),
        };

        let outstanding = Outstanding::enter(&self.inner);
        self.inner.stats.posted.fetch_add(1, Ordering::Relaxed);
        trace!(job_id = %coro.id, job_type = %job_type, name = name, "Job posted");

        let inner = Arc::clone(&self.inner);
        let permits = Arc::clone(&self.inner.client_permits);
        tokio::spawn(async move {
            let _outstanding = outstanding;
            // The semaphore is never closed
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!(job_id = %coro.id, "Job queue semaphore closed");
                return;
            };

            let id = coro.id;
            inner.stats.running.fetch_add(1, Ordering::Relaxed);
            job(coro).await;
            inner.stats.running.fetch_sub(1, Ordering::Relaxed);
            inner.stats.finished.fetch_add(1, Ordering::Relaxed);
            trace!(job_id = %id, "Job finished");
        });

        true
    }

    /// Continuation handle for work already running outside the queue.
    pub fn handle(&self, job_type: JobType, name: &str) -> JobCoro {
        JobCoro {
            id: JobId::new(),
            job_type,
            name: name.to_string(),
            queue: self.clone(),
        }
    }

    /// Refuse new jobs. Jobs already posted still run.
    pub fn stop(&self) {
        if !self.inner.stopping.swap(true, Ordering::AcqRel) {
            debug!(
                outstanding = self.outstanding(),
                "Job queue stopping"
            );
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.stopping.load(Ordering::Acquire)
    }

    /// Jobs posted and not yet finished.
    pub fn outstanding(&self) -> u64 {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Wait until every posted job has finished.
    pub async fn drain(&self) {
        loop {
            let idle = self.inner.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if self.outstanding() == 0 {
                return;
            }
            idle.await;
        }
    }

    pub fn stats(&self) -> &JobStats {
        &self.inner.stats
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(&JobQueueConfig::default())
    }
}

/// Continuation handle for one running job.
///
/// Threaded into the request context so a command can suspend on further
/// work without blocking the task that carries the request.
#[derive(Clone)]
pub struct JobCoro {
    id: JobId,
    job_type: JobType,
    name: String,
    queue: JobQueue,
}

impl JobCoro {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn job_type(&self) -> JobType {
        self.job_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `work` as a separate named job and wait for its result.
    ///
    /// Nested work does not take a client permit; the parent already holds
    /// one and waiting on a second could deadlock a saturated queue.
    pub async fn post<F, T>(&self, name: &str, work: F) -> GatewayResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.queue.is_stopping() {
            return Err(GatewayError::ShuttingDown);
        }

        let inner = &self.queue.inner;
        let _outstanding = Outstanding::enter(inner);
        inner.stats.posted.fetch_add(1, Ordering::Relaxed);
        trace!(
            parent = %self.id,
            job_type = %JobType::ClientCommand,
            name = name,
            "Nested job posted"
        );

        let handle = tokio::spawn(work);
        let result = handle.await;
        inner.stats.finished.fetch_add(1, Ordering::Relaxed);

        result.map_err(|e| GatewayError::Internal(format!("job '{}' failed: {}", name, e)))
    }
}

impl fmt::Debug for JobCoro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobCoro")
            .field("id", &self.id)
            .field("job_type", &self.job_type)
            .field("name", &self.name)
            .finish()
    }
}
