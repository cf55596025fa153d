//! # Job System
//!
//! Worker threads partitioned by [`JobThreadType`], each type with its own
//! ready queue. Jobs enter a queue only once all their dependencies are done;
//! finishing a job releases the dependents that were waiting on it.
//!
//! ## Threads
//!
//! ```text
//!   owner thread ──► schedule() ─┬─► [main queue]     ─► execute_main_thread_jobs() / destroy()
//!                                ├─► [render queue]   ─► ember-render-0..N
//!                                ├─► [resource queue] ─► ember-resource-0..N
//!                                └─► [other queue]    ─► ember-other-0..N
//! ```
//!
//! ## Counters
//!
//! - `outstanding`: submitted and not finished (pending, queued or running)
//! - `in_flight`: queued or running
//!
//! A finishing job queues its released dependents before it stops counting
//! itself as in flight, so `in_flight == 0` with an empty main queue means no
//! thread can make progress any more.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::config::JobSystemConfig;
use crate::error::{JobError, JobResult};
use crate::job::{Job, JobId, JobState, JobStatus, JobThreadType};
use crate::queue::ReadyQueue;

/// Failure records kept for the owner before new ones are dropped.
pub const FAILURE_BACKLOG: usize = 1024;

/// A job that did not succeed, as reported on [`JobSystem::failures`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobFailure {
    /// ID of the failed job.
    pub job: JobId,
    /// Name of the failed job.
    pub name: String,
    /// What went wrong.
    pub status: JobStatus,
}

/// State shared with the worker threads.
struct Shared {
    queues: [ReadyQueue; 4],
    outstanding: AtomicUsize,
    in_flight: AtomicUsize,
    /// Submitted jobs still waiting on dependencies.
    waiting: Mutex<HashMap<JobId, Arc<Job>>>,
    drain_lock: Mutex<()>,
    /// Signalled every time a job finishes.
    drained: Condvar,
    failures: Sender<JobFailure>,
}

impl Shared {
    #[inline]
    fn queue(&self, thread_type: JobThreadType) -> &ReadyQueue {
        &self.queues[thread_type.index()]
    }

    /// Queues a dependent whose last dependency just finished.
    fn release(&self, job: Arc<Job>) {
        job.set_state(JobState::Ready);
        self.waiting.lock().remove(&job.id());
        self.enqueue(job);
    }

    fn enqueue(&self, job: Arc<Job>) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        job.set_state(JobState::Ready);
        let thread_type = job.scheduled_type();
        tracing::debug!(job = job.name(), %thread_type, "job ready");
        self.queue(thread_type).push(job);
    }

    /// Runs one ready job to completion on the calling thread.
    fn execute(&self, job: &Arc<Job>) {
        job.set_state(JobState::Running);
        tracing::debug!(job = job.name(), "job started");

        let status = job.run();
        let failure = (!status.is_success()).then(|| JobFailure {
            job: job.id(),
            name: job.name().to_string(),
            status: status.clone(),
        });

        for dependent in job.complete(status) {
            if dependent.release_one() {
                self.release(dependent);
            }
        }

        match failure {
            Some(failure) => {
                tracing::error!(job = %failure.name, status = ?failure.status, "job failed");
                if let Err(TrySendError::Full(dropped)) = self.failures.try_send(failure) {
                    tracing::warn!(
                        job = %dropped.name,
                        backlog = FAILURE_BACKLOG,
                        "failure channel full, record dropped"
                    );
                }
            }
            None => tracing::debug!(job = job.name(), "job done"),
        }

        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        let _guard = self.drain_lock.lock();
        self.drained.notify_all();
    }

    fn close_queues(&self) {
        for queue in &self.queues {
            queue.close();
        }
    }
}

/// Dependency-aware job scheduler.
///
/// # Thread Safety
///
/// `JobSystem` is `Send + Sync`; jobs may be scheduled from any thread,
/// including from inside running jobs. [`JobSystem::execute_main_thread_jobs`]
/// should only be called by the thread that owns the system.
///
/// # Example
///
/// ```rust,ignore
/// let jobs = JobSystem::init(JobSystemConfig::default())?;
///
/// let load = Job::new("load", || { /* read file */ });
/// let upload = Job::new("upload", || { /* push to GPU */ });
/// upload.add_dependency(&load)?;
///
/// jobs.schedule(&upload, JobThreadType::Render)?;
/// jobs.schedule(&load, JobThreadType::Resource)?;
///
/// jobs.destroy()?; // waits for both
/// ```
pub struct JobSystem {
    config: JobSystemConfig,
    shared: Arc<Shared>,
    /// Read-held by `schedule`, write-held while shutdown starts.
    accepting: RwLock<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    destroyed: AtomicBool,
    failures: Receiver<JobFailure>,
}

impl JobSystem {
    /// Starts the worker threads.
    ///
    /// # Errors
    ///
    /// - [`JobError::InvalidConfig`] if a thread type has no workers
    /// - [`JobError::WorkerSpawn`] if the OS refuses a thread; workers
    ///   already started are stopped again
    pub fn init(config: JobSystemConfig) -> JobResult<Self> {
        config.validate()?;

        let (sender, receiver) = crossbeam_channel::bounded(FAILURE_BACKLOG);
        let shared = Arc::new(Shared {
            queues: [
                ReadyQueue::new(),
                ReadyQueue::new(),
                ReadyQueue::new(),
                ReadyQueue::new(),
            ],
            outstanding: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            waiting: Mutex::new(HashMap::new()),
            drain_lock: Mutex::new(()),
            drained: Condvar::new(),
            failures: sender,
        });

        let mut workers = Vec::with_capacity(config.total_workers());
        for (thread_type, count) in [
            (JobThreadType::Render, config.render_workers),
            (JobThreadType::Resource, config.resource_workers),
            (JobThreadType::Other, config.other_workers),
        ] {
            for index in 0..count {
                let worker_shared = Arc::clone(&shared);
                let spawned = thread::Builder::new()
                    .name(format!("ember-{}-{index}", thread_type.label()))
                    .spawn(move || Self::worker_loop(&worker_shared, thread_type));
                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(e) => {
                        shared.close_queues();
                        for handle in workers {
                            let _ = handle.join();
                        }
                        return Err(JobError::WorkerSpawn(e.to_string()));
                    }
                }
            }
        }

        tracing::info!(
            render = config.render_workers,
            resource = config.resource_workers,
            other = config.other_workers,
            "job system started"
        );

        Ok(Self {
            config,
            shared,
            accepting: RwLock::new(true),
            workers: Mutex::new(workers),
            destroyed: AtomicBool::new(false),
            failures: receiver,
        })
    }

    /// Worker thread main loop.
    fn worker_loop(shared: &Shared, thread_type: JobThreadType) {
        tracing::debug!(%thread_type, "worker started");
        while let Some(job) = shared.queue(thread_type).pop_blocking() {
            shared.execute(&job);
        }
        tracing::debug!(%thread_type, "worker stopped");
    }

    /// Submits `job` to run on `thread_type` threads.
    ///
    /// A job whose dependencies are all done is queued immediately; otherwise
    /// it is queued by whichever dependency finishes last. Dependencies do not
    /// have to be scheduled first.
    ///
    /// # Errors
    ///
    /// - [`JobError::SystemShutDown`] once [`JobSystem::destroy`] has started
    /// - [`JobError::AlreadySubmitted`] if the job was submitted and not reset
    pub fn schedule(&self, job: &Arc<Job>, thread_type: JobThreadType) -> JobResult<()> {
        let accepting = self.accepting.read();
        if !*accepting {
            return Err(JobError::SystemShutDown);
        }
        self.shared.outstanding.fetch_add(1, Ordering::AcqRel);
        let ready = match job.submit(thread_type) {
            Ok(ready) => ready,
            Err(err) => {
                self.shared.outstanding.fetch_sub(1, Ordering::AcqRel);
                return Err(err);
            }
        };

        if ready {
            self.shared.enqueue(Arc::clone(job));
        } else {
            // A dependency may already have released the job; `release`
            // marks it Ready before it looks in the map.
            let mut waiting = self.shared.waiting.lock();
            if job.state() == JobState::Pending {
                waiting.insert(job.id(), Arc::clone(job));
            }
            tracing::debug!(job = job.name(), %thread_type, "job waiting on dependencies");
        }
        Ok(())
    }

    /// Runs every ready main-thread job on the calling thread.
    ///
    /// Returns the number of jobs run.
    pub fn execute_main_thread_jobs(&self) -> usize {
        let queue = self.shared.queue(JobThreadType::Main);
        let mut executed = 0;
        while let Some(job) = queue.try_pop() {
            self.shared.execute(&job);
            executed += 1;
        }
        executed
    }

    /// Stops accepting jobs, waits for every submitted job to finish, then
    /// joins the workers.
    ///
    /// Main-thread jobs are run on the calling thread while waiting. Calling
    /// `destroy` again is a no-op. Must not be called from inside a job.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Stalled`] if some submitted jobs can never run
    /// because they wait on jobs that were never scheduled. The workers are
    /// joined regardless.
    pub fn destroy(&self) -> JobResult<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        *self.accepting.write() = false;
        tracing::info!(
            pending = self.shared.outstanding.load(Ordering::Acquire),
            "job system shutting down"
        );

        let stalled = self.drain();

        self.shared.close_queues();
        for handle in self.workers.lock().drain(..) {
            if handle.join().is_err() {
                tracing::error!("job worker panicked outside a job");
            }
        }

        let stuck: Vec<Arc<Job>> = self
            .shared
            .waiting
            .lock()
            .drain()
            .map(|(_, job)| job)
            .collect();
        for job in &stuck {
            job.detach_from_dependencies();
        }

        match stalled {
            Some(pending) => {
                tracing::warn!(pending, "job system stopped with jobs that never became ready");
                Err(JobError::Stalled { pending })
            }
            None => {
                tracing::info!("job system stopped");
                Ok(())
            }
        }
    }

    /// Waits until nothing is outstanding. Returns the stuck count on stall.
    fn drain(&self) -> Option<usize> {
        let shared = &self.shared;
        let main = shared.queue(JobThreadType::Main);
        loop {
            self.execute_main_thread_jobs();

            let mut guard = shared.drain_lock.lock();
            let outstanding = shared.outstanding.load(Ordering::Acquire);
            if outstanding == 0 {
                return None;
            }
            if !main.is_empty() {
                continue;
            }
            if shared.in_flight.load(Ordering::Acquire) == 0 {
                return Some(outstanding);
            }
            shared.drained.wait(&mut guard);
        }
    }

    /// Returns a receiver for failed and panicked jobs.
    ///
    /// Holds up to [`FAILURE_BACKLOG`] records; once full, further failures
    /// are logged and dropped until the owner drains it.
    #[must_use]
    pub fn failures(&self) -> Receiver<JobFailure> {
        self.failures.clone()
    }

    /// Jobs submitted and not yet finished.
    #[inline]
    #[must_use]
    pub fn pending_jobs(&self) -> usize {
        self.shared.outstanding.load(Ordering::Acquire)
    }

    /// Total worker threads.
    #[inline]
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.config.total_workers()
    }

    /// Worker threads serving `thread_type` (zero for `Main`).
    #[must_use]
    pub fn workers_for(&self, thread_type: JobThreadType) -> usize {
        match thread_type {
            JobThreadType::Main => 0,
            JobThreadType::Render => self.config.render_workers,
            JobThreadType::Resource => self.config.resource_workers,
            JobThreadType::Other => self.config.other_workers,
        }
    }

    /// Returns the configuration the system was started with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &JobSystemConfig {
        &self.config
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        if let Err(err) = self.destroy() {
            tracing::warn!(%err, "job system dropped with unfinished jobs");
        }
    }
}
