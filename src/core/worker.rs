use std::sync::Arc;
use std::thread;
use tracing::{debug, trace, warn};

use crate::core::model::{code, Chunk, Job, JobMessage, REASON_DONE, REASON_INIT_ERROR};
use crate::core::pool::ChunkPool;
use crate::core::queue::Queues;
use crate::plugins::registry::{FetchRequest, TransferSink, Transport, TransportError};

/// Splits transport segments into fixed-capacity chunks and ships each full
/// chunk to the progress queue.
pub struct ChunkSink<'a> {
    job: &'a mut Job,
    pool: &'a mut ChunkPool,
    queues: &'a Queues,
    current: Option<Chunk>,
}

impl<'a> ChunkSink<'a> {
    pub fn new(job: &'a mut Job, pool: &'a mut ChunkPool, queues: &'a Queues) -> Self {
        Self { job, pool, queues, current: None }
    }

    fn emit(&mut self) {
        let Some(mut chunk) = self.current.take() else {
            return;
        };
        chunk.bytes_loaded = self.job.bytes_loaded;
        chunk.bytes_expected = self.job.bytes_expected;
        trace!(job = %self.job.id, seq = chunk.sequence, len = chunk.len(), "chunk ready");
        self.job.chunks_emitted += 1;
        self.queues.progress.push(chunk);
        thread::yield_now();
    }

    /// Emit whatever partial chunk remains. Consumes the sink.
    pub fn finish(mut self) {
        self.emit();
    }
}

impl TransferSink for ChunkSink<'_> {
    fn write(&mut self, mut segment: &[u8]) -> bool {
        if self.job.cancel.is_cancelled() {
            return false;
        }
        self.pool.reclaim(&self.queues.recycle);

        let capacity = self.pool.capacity();
        while !segment.is_empty() {
            if self.current.is_none() {
                let sequence = self.job.chunks_emitted;
                self.current = Some(Chunk::new(self.job.id, sequence, self.pool.take()));
            }
            let Some(chunk) = self.current.as_mut() else {
                break;
            };

            let n = (capacity - chunk.len()).min(segment.len());
            chunk.data.extend_from_slice(&segment[..n]);
            segment = &segment[n..];
            self.job.bytes_loaded += n as u64;

            if chunk.len() == capacity {
                self.emit();
            }
        }
        true
    }

    // `bytes_loaded` only ever counts bytes that went through `write`; the
    // transport's own total may run ahead of what it has handed over.
    fn progress(&mut self, expected: Option<u64>, loaded: u64) -> bool {
        if expected.is_some() {
            self.job.bytes_expected = expected;
        }
        trace!(job = %self.job.id, reported = loaded, written = self.job.bytes_loaded, "transport progress");
        !self.job.cancel.is_cancelled()
    }
}

pub(crate) struct Worker {
    index: usize,
    transport: Arc<dyn Transport>,
    queues: Arc<Queues>,
    pool: ChunkPool,
}

impl Worker {
    pub(crate) fn new(
        index: usize,
        transport: Arc<dyn Transport>,
        queues: Arc<Queues>,
        chunk_capacity: usize,
        recycle_limit: usize,
    ) -> Self {
        Self {
            index,
            transport,
            queues,
            pool: ChunkPool::new(chunk_capacity, recycle_limit),
        }
    }

    pub(crate) fn run(mut self) {
        debug!(worker = self.index, "worker started");
        loop {
            self.pool.reclaim(&self.queues.recycle);

            let job = match self.queues.jobs.pop() {
                JobMessage::Fetch(job) => job,
                JobMessage::Shutdown => break,
            };

            let job = self.process(job);
            debug!(worker = self.index, job = %job.id, code = job.code, reason = job.reason, chunks = job.chunks_emitted, "job finished");
            self.queues.results.push(job);
        }
        self.pool.reclaim(&self.queues.recycle);
        debug!(worker = self.index, allocated = self.pool.allocated(), "worker stopped");
    }

    fn process(&mut self, mut job: Job) -> Job {
        if job.cancel.is_cancelled() {
            job.finish(code::ABORTED_BY_CALLBACK, code::describe(code::ABORTED_BY_CALLBACK));
            return job;
        }

        debug!(worker = self.index, job = %job.id, url = %job.url, "fetching");
        let request = FetchRequest::new(job.url.clone());
        let transport = self.transport.clone();
        let mut sink = ChunkSink::new(&mut job, &mut self.pool, &self.queues);
        let outcome = transport.fetch(&request, &mut sink);

        match outcome {
            Ok(()) => {
                sink.finish();
                job.finish(code::OK, REASON_DONE);
            }
            Err(TransportError::Init(detail)) => {
                // a transport that never started has nothing buffered, but keep
                // the count honest if one misbehaves
                sink.finish();
                warn!(job = %job.id, %detail, "transport init failed");
                job.finish(code::FAILED_INIT, REASON_INIT_ERROR);
            }
            Err(e) => {
                sink.finish();
                let c = e.code();
                warn!(job = %job.id, code = c, error = %e, "transfer failed");
                job.finish(c, code::describe(c));
            }
        }
        job
    }
}
