//! # Jobs
//!
//! A job is a callable, a completion flag and a list of jobs that must finish
//! first. Jobs are shared as `Arc<Job>` between the code that builds the
//! graph, the scheduler and the jobs that depend on them.
//!
//! ## Lifecycle
//!
//! ```text
//!   Pending ──(all dependencies done)──► Ready ──(worker picks up)──► Running ──► Done
//!      ▲                                                                           │
//!      └──────────────────────────────── reset() ──────────────────────────────────┘
//! ```

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{JobError, JobResult};

/// Unique identifier for a job.
pub type JobId = u64;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Serialises dependency edits so two concurrent edits cannot close a cycle
/// that neither sees.
static GRAPH_EDIT: Mutex<()> = parking_lot::const_mutex(());

type Task = Box<dyn FnMut() -> Result<(), String> + Send>;

/// Which threads may run a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum JobThreadType {
    /// The thread that owns the [`JobSystem`](crate::JobSystem).
    Main = 0,
    /// Render workers.
    Render = 1,
    /// Resource (IO, decoding) workers.
    Resource = 2,
    /// General-purpose workers.
    Other = 3,
}

impl JobThreadType {
    /// Every thread type, in queue order.
    pub const ALL: [Self; 4] = [Self::Main, Self::Render, Self::Resource, Self::Other];

    /// Short name used in thread names and logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Render => "render",
            Self::Resource => "resource",
            Self::Other => "other",
        }
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Main,
            1 => Self::Render,
            2 => Self::Resource,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for JobThreadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scheduling state of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum JobState {
    /// Not submitted, or submitted and waiting on dependencies.
    Pending = 0,
    /// In a ready queue.
    Ready = 1,
    /// Executing on some thread.
    Running = 2,
    /// Finished, successfully or not.
    Done = 3,
}

impl JobState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Ready,
            2 => Self::Running,
            _ => Self::Done,
        }
    }
}

/// How a finished job ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    /// The callable returned normally.
    Succeeded,
    /// A fallible callable returned an error.
    Failed {
        /// The error, rendered with `Display`.
        reason: String,
    },
    /// The callable panicked.
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },
}

impl JobStatus {
    /// Returns true for [`JobStatus::Succeeded`].
    #[inline]
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Jobs waiting on this one, and whether it already finished.
///
/// Both live under one lock so a dependent either registers before
/// completion (and is released by it) or sees `done` and does not wait.
#[derive(Default)]
struct Links {
    dependents: Vec<Arc<Job>>,
    done: bool,
}

/// A unit of work with dependencies.
///
/// # Thread Safety
///
/// `Job` is `Send + Sync`. The callable runs on exactly one thread per
/// submission; every other method may be called from any thread.
///
/// # Example
///
/// ```rust,ignore
/// let load = Job::new("load_stone_png", move || bytes.lock().extend(read_file()));
/// let decode = Job::fallible("decode_stone_png", move || decode(&bytes.lock()));
/// decode.add_dependency(&load)?;
///
/// jobs.schedule(&decode, JobThreadType::Other)?;
/// jobs.schedule(&load, JobThreadType::Resource)?;
/// ```
pub struct Job {
    id: JobId,
    name: String,
    task: Mutex<Task>,
    state: AtomicU8,
    submitted: AtomicBool,
    thread_type: AtomicU8,
    dependencies: Mutex<Vec<Arc<Job>>>,
    links: Mutex<Links>,
    /// Unfinished dependencies plus one scheduling guard.
    remaining: AtomicUsize,
    status: Mutex<Option<JobStatus>>,
}

impl Job {
    /// Creates a job from an infallible callable.
    pub fn new<F>(name: impl Into<String>, mut task: F) -> Arc<Self>
    where
        F: FnMut() + Send + 'static,
    {
        Self::with_task(
            name.into(),
            Box::new(move || {
                task();
                Ok(())
            }),
        )
    }

    /// Creates a job whose callable can fail.
    ///
    /// An `Err` marks the job [`JobStatus::Failed`]; dependents still run.
    pub fn fallible<F, E>(name: impl Into<String>, mut task: F) -> Arc<Self>
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        E: fmt::Display,
    {
        Self::with_task(name.into(), Box::new(move || task().map_err(|e| e.to_string())))
    }

    fn with_task(name: String, task: Task) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
            name,
            task: Mutex::new(task),
            state: AtomicU8::new(JobState::Pending as u8),
            submitted: AtomicBool::new(false),
            thread_type: AtomicU8::new(JobThreadType::Other as u8),
            dependencies: Mutex::new(Vec::new()),
            links: Mutex::new(Links::default()),
            remaining: AtomicUsize::new(0),
            status: Mutex::new(None),
        })
    }

    /// Returns the job's unique ID.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Returns the job's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Makes this job wait for `dependency`.
    ///
    /// Only allowed before the job is submitted. The dependency itself may
    /// already be submitted or even done.
    ///
    /// # Errors
    ///
    /// - [`JobError::AlreadySubmitted`] if this job was submitted
    /// - [`JobError::SelfDependency`] if `dependency` is this job
    /// - [`JobError::DuplicateDependency`] if the edge already exists
    /// - [`JobError::CycleDetected`] if `dependency` already waits on this job
    pub fn add_dependency(&self, dependency: &Arc<Job>) -> JobResult<()> {
        if self.submitted.load(Ordering::Acquire) {
            return Err(JobError::AlreadySubmitted(self.name.clone()));
        }
        if dependency.id == self.id {
            return Err(JobError::SelfDependency(self.name.clone()));
        }

        let _edit = GRAPH_EDIT.lock();
        if self.submitted.load(Ordering::Acquire) {
            return Err(JobError::AlreadySubmitted(self.name.clone()));
        }
        if self
            .dependencies
            .lock()
            .iter()
            .any(|existing| existing.id == dependency.id)
        {
            return Err(JobError::DuplicateDependency {
                job: self.name.clone(),
                dependency: dependency.name.clone(),
            });
        }
        if dependency.depends_on(self.id) {
            return Err(JobError::CycleDetected {
                job: self.name.clone(),
                dependency: dependency.name.clone(),
            });
        }

        self.dependencies.lock().push(Arc::clone(dependency));
        tracing::trace!(job = %self.name, dependency = %dependency.name, "dependency added");
        Ok(())
    }

    /// DFS over the dependency graph looking for `target`.
    fn depends_on(&self, target: JobId) -> bool {
        let mut visited = HashSet::new();
        let mut stack: Vec<Arc<Job>> = self.dependencies.lock().clone();

        while let Some(job) = stack.pop() {
            if job.id == target {
                return true;
            }
            if visited.insert(job.id) {
                stack.extend(job.dependencies.lock().iter().cloned());
            }
        }
        false
    }

    /// Returns a snapshot of the job's dependencies.
    #[must_use]
    pub fn dependencies(&self) -> Vec<Arc<Job>> {
        self.dependencies.lock().clone()
    }

    /// Returns true once the job has finished. Never blocks.
    #[inline]
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state() == JobState::Done
    }

    /// Returns true once the callable has started.
    #[inline]
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.state() >= JobState::Running
    }

    /// Returns true if the job is submitted and not yet reset.
    #[inline]
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.submitted.load(Ordering::Acquire)
    }

    /// Returns the current scheduling state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> JobState {
        JobState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns how the job ended, or `None` while it has not finished.
    #[must_use]
    pub fn status(&self) -> Option<JobStatus> {
        self.status.lock().clone()
    }

    /// Returns true if every dependency has finished.
    #[must_use]
    pub fn dependencies_done(&self) -> bool {
        self.dependencies.lock().iter().all(|dependency| dependency.is_done())
    }

    /// Returns the thread type the job was last scheduled on.
    #[must_use]
    pub fn thread_type(&self) -> Option<JobThreadType> {
        self.is_submitted()
            .then(|| JobThreadType::from_u8(self.thread_type.load(Ordering::Acquire)))
    }

    /// Returns a finished job to a fresh, unsubmitted state so it can be
    /// scheduled again. Dependencies are cleared.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::JobNotFinished`] if the job is submitted but not done.
    pub fn reset(&self) -> JobResult<()> {
        let _edit = GRAPH_EDIT.lock();
        // Held across the check: `complete` publishes Done under this lock,
        // so a done job has already handed off its dependents.
        let mut links = self.links.lock();
        if self.is_submitted() && !self.is_done() {
            return Err(JobError::JobNotFinished(self.name.clone()));
        }

        self.dependencies.lock().clear();
        *links = Links::default();
        *self.status.lock() = None;
        self.remaining.store(0, Ordering::Release);
        self.state.store(JobState::Pending as u8, Ordering::Release);
        self.submitted.store(false, Ordering::Release);
        tracing::debug!(job = %self.name, "job reset");
        Ok(())
    }

    // ---- scheduler hooks ----

    /// Claims the job for one submission.
    fn mark_submitted(&self, thread_type: JobThreadType) -> JobResult<()> {
        self.submitted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| JobError::AlreadySubmitted(self.name.clone()))?;
        self.thread_type.store(thread_type as u8, Ordering::Release);
        Ok(())
    }

    /// Claims the job and registers it with every unfinished dependency.
    ///
    /// Returns true if nothing is left to wait for and the job should be
    /// queued now. Runs under the graph edit lock, so the dependency list
    /// cannot change between the claim and the registration.
    pub(crate) fn submit(self: &Arc<Self>, thread_type: JobThreadType) -> JobResult<bool> {
        let _edit = GRAPH_EDIT.lock();
        self.mark_submitted(thread_type)?;

        // The extra count keeps the job from being queued while its
        // dependencies are still being registered.
        self.remaining.store(1, Ordering::Release);
        for dependency in self.dependencies.lock().iter() {
            self.remaining.fetch_add(1, Ordering::AcqRel);
            if !dependency.register_dependent(self) {
                self.release_one();
            }
        }
        Ok(self.release_one())
    }

    /// Withdraws this job from its dependencies' dependent lists.
    ///
    /// Used for jobs that can never run, so they and their dependencies stop
    /// keeping each other alive.
    pub(crate) fn detach_from_dependencies(&self) {
        let _edit = GRAPH_EDIT.lock();
        for dependency in self.dependencies.lock().iter() {
            dependency
                .links
                .lock()
                .dependents
                .retain(|dependent| dependent.id != self.id);
        }
    }

    pub(crate) fn scheduled_type(&self) -> JobThreadType {
        JobThreadType::from_u8(self.thread_type.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: JobState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Drops one pending count; true if that was the last one.
    pub(crate) fn release_one(&self) -> bool {
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Registers `dependent` to be released when this job finishes.
    ///
    /// Returns false if this job is already done; nothing is registered then.
    pub(crate) fn register_dependent(&self, dependent: &Arc<Job>) -> bool {
        let mut links = self.links.lock();
        if links.done {
            return false;
        }
        links.dependents.push(Arc::clone(dependent));
        true
    }

    /// Runs the callable, catching panics.
    pub(crate) fn run(&self) -> JobStatus {
        let mut task = self.task.lock();
        match panic::catch_unwind(AssertUnwindSafe(|| (*task)())) {
            Ok(Ok(())) => JobStatus::Succeeded,
            Ok(Err(reason)) => JobStatus::Failed { reason },
            Err(payload) => JobStatus::Panicked {
                message: panic_message(payload.as_ref()),
            },
        }
    }

    /// Records the outcome, sets the done flag and hands back the dependents
    /// to release.
    ///
    /// Everything happens under the links lock, so anyone who observes
    /// [`Job::is_done`] and then takes that lock finds the dependents gone.
    pub(crate) fn complete(&self, status: JobStatus) -> Vec<Arc<Job>> {
        let mut links = self.links.lock();
        *self.status.lock() = Some(status);
        links.done = true;
        self.set_state(JobState::Done);
        std::mem::take(&mut links.dependents)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("dependencies", &self.dependencies.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_rules() {
        let a = Job::new("a", || {});
        let b = Job::new("b", || {});

        assert_eq!(a.add_dependency(&a), Err(JobError::SelfDependency("a".into())));
        b.add_dependency(&a).unwrap();
        assert!(matches!(
            b.add_dependency(&a),
            Err(JobError::DuplicateDependency { .. })
        ));
        assert_eq!(b.dependencies().len(), 1);
    }

    #[test]
    fn test_cycle_detected() {
        let a = Job::new("a", || {});
        let b = Job::new("b", || {});
        let c = Job::new("c", || {});
        b.add_dependency(&a).unwrap();
        c.add_dependency(&b).unwrap();

        assert_eq!(
            a.add_dependency(&c),
            Err(JobError::CycleDetected {
                job: "a".into(),
                dependency: "c".into(),
            })
        );
        // A diamond is not a cycle.
        let d = Job::new("d", || {});
        d.add_dependency(&b).unwrap();
        d.add_dependency(&c).unwrap();
    }

    #[test]
    fn test_run_captures_outcomes() {
        let ok = Job::new("ok", || {});
        let failed = Job::fallible("failed", || Err::<(), _>("disk on fire"));
        let panicked = Job::new("panicked", || panic!("boom"));

        assert_eq!(ok.run(), JobStatus::Succeeded);
        assert_eq!(
            failed.run(),
            JobStatus::Failed {
                reason: "disk on fire".into()
            }
        );
        assert_eq!(
            panicked.run(),
            JobStatus::Panicked {
                message: "boom".into()
            }
        );
    }

    #[test]
    fn test_completion_releases_registered_dependents() {
        let a = Job::new("a", || {});
        let b = Job::new("b", || {});
        assert!(a.register_dependent(&b));

        let released = a.complete(JobStatus::Succeeded);
        assert_eq!(released.len(), 1);
        assert!(a.is_done());
        // Too late to register now.
        assert!(!a.register_dependent(&b));
    }

    #[test]
    fn test_reset_right_after_done_keeps_dependents() {
        for _ in 0..200 {
            let a = Job::new("a", || {});
            let b = Job::new("b", || {});
            a.mark_submitted(JobThreadType::Other).unwrap();
            assert!(a.register_dependent(&b));

            let finisher = {
                let a = Arc::clone(&a);
                std::thread::spawn(move || a.complete(JobStatus::Succeeded))
            };
            while !a.is_done() {
                std::hint::spin_loop();
            }
            a.reset().unwrap();

            let released = finisher.join().unwrap();
            assert_eq!(released.len(), 1);
            assert_eq!(released[0].id(), b.id());
            // The reset job waits for its next run again.
            assert!(a.register_dependent(&b));
            assert_eq!(a.status(), None);
        }
    }

    #[test]
    fn test_dependency_rejected_once_submitted() {
        let a = Job::new("a", || {});
        let b = Job::new("b", || {});
        assert!(b.submit(JobThreadType::Other).unwrap());
        assert!(b.submit(JobThreadType::Other).is_err());
        assert_eq!(
            b.add_dependency(&a),
            Err(JobError::AlreadySubmitted("b".into()))
        );
    }

    #[test]
    fn test_submit_registers_with_unfinished_dependencies() {
        let a = Job::new("a", || {});
        let done = Job::new("done", || {});
        let _ = done.complete(JobStatus::Succeeded);
        let b = Job::new("b", || {});
        b.add_dependency(&a).unwrap();
        b.add_dependency(&done).unwrap();

        assert!(!b.submit(JobThreadType::Render).unwrap());
        assert_eq!(b.thread_type(), Some(JobThreadType::Render));

        let released = a.complete(JobStatus::Succeeded);
        assert_eq!(released.len(), 1);
        assert!(released[0].release_one());
    }

    #[test]
    fn test_detach_breaks_dependent_links() {
        let a = Job::new("a", || {});
        let b = Job::new("b", || {});
        b.add_dependency(&a).unwrap();
        b.submit(JobThreadType::Other).unwrap();
        assert_eq!(Arc::strong_count(&b), 2);

        b.detach_from_dependencies();
        assert_eq!(Arc::strong_count(&b), 1);
        assert!(a.complete(JobStatus::Succeeded).is_empty());
    }

    #[test]
    fn test_reset_rules() {
        let job = Job::new("job", || {});
        job.mark_submitted(JobThreadType::Other).unwrap();
        assert!(matches!(
            job.mark_submitted(JobThreadType::Other),
            Err(JobError::AlreadySubmitted(_))
        ));
        assert!(matches!(job.reset(), Err(JobError::JobNotFinished(_))));

        let _ = job.complete(JobStatus::Succeeded);
        job.reset().unwrap();
        assert_eq!(job.state(), JobState::Pending);
        assert!(!job.is_submitted());
        assert_eq!(job.status(), None);
    }
}
