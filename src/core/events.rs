use crate::core::model::{Chunk, Job, JobId};

/// A chunk as handed to a progress callback. Borrowed: the buffer goes back to
/// the workers as soon as the callback returns.
#[derive(Debug, Clone, Copy)]
pub struct ChunkEvent<'a> {
    pub job_id: JobId,
    pub sequence: u64,
    pub data: &'a [u8],
    pub bytes_loaded: u64,
    pub bytes_expected: Option<u64>,
}

impl<'a> ChunkEvent<'a> {
    pub(crate) fn from_chunk(chunk: &'a Chunk) -> Self {
        Self {
            job_id: chunk.job_id,
            sequence: chunk.sequence,
            data: &chunk.data,
            bytes_loaded: chunk.bytes_loaded,
            bytes_expected: chunk.bytes_expected,
        }
    }
}

/// Terminal notification for a job, delivered after all of its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub job_id: JobId,
    pub code: i32,
    pub reason: &'static str,
    pub bytes_loaded: u64,
    pub bytes_expected: Option<u64>,
    pub chunks: u64,
}

impl Completion {
    pub(crate) fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id,
            code: job.code,
            reason: job.reason,
            bytes_loaded: job.bytes_loaded,
            bytes_expected: job.bytes_expected,
            chunks: job.chunks_emitted,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == crate::core::model::code::OK
    }
}
