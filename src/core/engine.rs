use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

use crate::core::config::EngineConfig;
use crate::core::error::EngineError;
use crate::core::event_loop::EventLoop;
use crate::core::events::{ChunkEvent, Completion};
use crate::core::model::{CancelToken, Job, JobId, JobMessage};
use crate::core::queue::Queues;
use crate::core::worker::Worker;
use crate::plugins::registry::Transport;

pub type ProgressCallback = Box<dyn FnMut(&ChunkEvent<'_>)>;
pub type CompleteCallback = Box<dyn FnOnce(Completion)>;

/// What to fetch and whom to tell.
pub struct DownloadRequest {
    url: String,
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompleteCallback>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), on_progress: None, on_complete: None }
    }

    pub fn on_progress(mut self, f: impl FnMut(&ChunkEvent<'_>) + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnOnce(Completion) + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }
}

/// Returned by [`Engine::submit`]; consumed by [`Engine::cancel`].
#[derive(Debug)]
pub struct DownloadHandle {
    id: JobId,
    cancel: CancelToken,
}

impl DownloadHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Lets the holder stop the transfer without suppressing its callbacks.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

/// Coordinator-side bookkeeping for one job.
struct JobEntry {
    cancel: CancelToken,
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompleteCallback>,
    delivered: u64,
    /// set by `cancel`: the job still runs its course but nobody hears about it
    silenced: bool,
}

/// Runs fetches on worker threads and replays their progress and results on
/// the thread that owns the engine, from a recurring poll.
pub struct Engine {
    config: EngineConfig,
    queues: Arc<Queues>,
    workers: RefCell<Vec<JoinHandle<()>>>,
    jobs: RefCell<HashMap<JobId, JobEntry>>,
    active: Cell<usize>,
    timer_armed: Cell<bool>,
    in_poll: Cell<bool>,
    event_loop: Rc<dyn EventLoop>,
    this: Weak<Engine>,
}

impl Engine {
    pub fn start(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        event_loop: Rc<dyn EventLoop>,
    ) -> Result<Rc<Self>, EngineError> {
        let queues = Arc::new(Queues::new());
        let mut workers = Vec::with_capacity(config.workers);

        for index in 0..config.workers.max(1) {
            let worker = Worker::new(
                index,
                transport.clone(),
                queues.clone(),
                config.chunk_capacity,
                config.recycle_limit,
            );
            let spawned = thread::Builder::new()
                .name(format!("fetch-worker-{index}"))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    for _ in &workers {
                        queues.jobs.push(JobMessage::Shutdown);
                    }
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(EngineError::Spawn(e));
                }
            }
        }

        debug!(workers = workers.len(), chunk = config.chunk_capacity, "engine started");
        Ok(Rc::new_cyclic(|this| Self {
            config,
            queues,
            workers: RefCell::new(workers),
            jobs: RefCell::new(HashMap::new()),
            active: Cell::new(0),
            timer_armed: Cell::new(false),
            in_poll: Cell::new(false),
            event_loop,
            this: this.clone(),
        }))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Jobs submitted and not yet finalized.
    pub fn active_jobs(&self) -> usize {
        self.active.get()
    }

    /// Whether the recurring poll is currently installed.
    pub fn is_polling(&self) -> bool {
        self.timer_armed.get()
    }

    pub fn submit(&self, request: DownloadRequest) -> DownloadHandle {
        let job = Job::new(request.url);
        let handle = DownloadHandle { id: job.id, cancel: job.cancel.clone() };

        self.jobs.borrow_mut().insert(
            job.id,
            JobEntry {
                cancel: job.cancel.clone(),
                on_progress: request.on_progress,
                on_complete: request.on_complete,
                delivered: 0,
                silenced: false,
            },
        );
        debug!(job = %job.id, url = %job.url, "job submitted");
        self.queues.jobs.push(JobMessage::Fetch(job));

        self.active.set(self.active.get() + 1);
        if !self.timer_armed.get() {
            self.arm_timer();
        }
        handle
    }

    fn arm_timer(&self) {
        debug!(interval = ?self.config.poll_interval, "installing queue poller");
        self.timer_armed.set(true);
        let this = self.this.clone();
        self.event_loop.every(
            self.config.poll_interval,
            Box::new(move || {
                let Some(engine) = this.upgrade() else {
                    return false;
                };
                let again = engine.poll();
                if !again {
                    debug!("no active jobs; poller shutting down");
                    engine.timer_armed.set(false);
                }
                again
            }),
        );
    }

    /// Stop a job. Its progress callback is dropped now; its completion
    /// callback is never called, and is dropped only once the worker has
    /// reported the job. Returns `false` if the job had already been finalized.
    pub fn cancel(&self, handle: DownloadHandle) -> bool {
        handle.cancel.cancel();
        let mut jobs = self.jobs.borrow_mut();
        let Some(entry) = jobs.get_mut(&handle.id) else {
            return false;
        };
        debug!(job = %handle.id, "job cancelled");
        entry.silenced = true;
        let on_progress = entry.on_progress.take();
        // dropped after the borrow ends: it may hold the last reference to caller state
        drop(jobs);
        drop(on_progress);
        true
    }

    /// One pass of the dispatch poller. Returns whether jobs are still active.
    /// Only the recurring timer disarms itself; an extra call from outside
    /// leaves it installed.
    pub fn poll(&self) -> bool {
        if self.in_poll.replace(true) {
            warn!("poller re-entered; skipping");
            return true;
        }

        self.dispatch_progress();
        self.dispatch_results();

        self.in_poll.set(false);
        self.active.get() > 0
    }

    fn dispatch_progress(&self) {
        while let Some(chunk) = self.queues.progress.try_pop() {
            let callback = {
                let mut jobs = self.jobs.borrow_mut();
                match jobs.get_mut(&chunk.job_id) {
                    Some(entry) => {
                        entry.delivered += 1;
                        if entry.silenced { None } else { entry.on_progress.take() }
                    }
                    None => {
                        warn!(job = %chunk.job_id, "chunk for unknown job");
                        None
                    }
                }
            };

            if let Some(mut callback) = callback {
                trace!(job = %chunk.job_id, seq = chunk.sequence, len = chunk.len(), "delivering chunk");
                callback(&ChunkEvent::from_chunk(&chunk));
                // the callback may have cancelled its own job meanwhile
                if let Some(entry) = self.jobs.borrow_mut().get_mut(&chunk.job_id) {
                    if !entry.silenced {
                        entry.on_progress = Some(callback);
                    }
                }
            }

            self.queues.recycle.push(chunk.data);
        }
    }

    fn dispatch_results(&self) {
        // Each result is looked at once per pass. One whose chunks have not all
        // been delivered yet goes back to the front of the queue for the next
        // tick; nothing new can arrive for it within this pass.
        let batch = self.queues.results.drain();
        let mut deferred = Vec::new();

        for job in batch {
            let ready = {
                let jobs = self.jobs.borrow();
                match jobs.get(&job.id) {
                    Some(entry) => entry.delivered >= job.chunks_emitted,
                    None => {
                        warn!(job = %job.id, "result for unknown job");
                        continue;
                    }
                }
            };

            if !ready {
                trace!(job = %job.id, "result waiting on chunks");
                deferred.push(job);
                continue;
            }

            let entry = self.jobs.borrow_mut().remove(&job.id);
            if let Some(entry) = entry {
                debug!(job = %job.id, code = job.code, reason = job.reason, "job complete");
                if let (false, Some(callback)) = (entry.silenced, entry.on_complete) {
                    callback(Completion::from_job(&job));
                }
            }
            self.active.set(self.active.get().saturating_sub(1));
        }

        for job in deferred.into_iter().rev() {
            self.queues.results.push_front(job);
        }
    }

    /// Stop the workers. In-flight transfers are asked to abort and their
    /// callbacks are dropped.
    pub fn shutdown(&self) {
        let workers: Vec<_> = self.workers.borrow_mut().drain(..).collect();
        if workers.is_empty() {
            return;
        }

        for entry in self.jobs.borrow().values() {
            entry.cancel.cancel();
        }
        for _ in &workers {
            self.queues.jobs.push(JobMessage::Shutdown);
        }
        for handle in workers {
            if handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }

        let abandoned = std::mem::take(&mut *self.jobs.borrow_mut());
        drop(abandoned);
        self.queues.progress.drain();
        self.queues.results.drain();
        self.queues.recycle.drain();
        self.active.set(0);
        debug!("engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
