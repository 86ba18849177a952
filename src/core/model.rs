use bytes::BytesMut;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub type JobId = Uuid;

/// Reason attached to a job whose transfer ran to the end (any code).
pub const REASON_DONE: &str = "transport-done";
/// Reason attached to a job whose transport could not even be set up.
pub const REASON_INIT_ERROR: &str = "transport-init-error";

/// Integer result codes reported by transports. The numbering follows libcurl
/// for the subset we produce, so codes read the same in logs either way.
pub mod code {
    pub const OK: i32 = 0;
    pub const UNSUPPORTED_PROTOCOL: i32 = 1;
    pub const FAILED_INIT: i32 = 2;
    pub const URL_MALFORMAT: i32 = 3;
    pub const COULDNT_RESOLVE_HOST: i32 = 6;
    pub const COULDNT_CONNECT: i32 = 7;
    pub const HTTP_RETURNED_ERROR: i32 = 22;
    pub const WRITE_ERROR: i32 = 23;
    pub const READ_ERROR: i32 = 26;
    pub const OPERATION_TIMEDOUT: i32 = 28;
    pub const FILE_COULDNT_READ_FILE: i32 = 37;
    pub const ABORTED_BY_CALLBACK: i32 = 42;
    pub const RECV_ERROR: i32 = 56;

    /// Human readable text for a result code.
    pub fn describe(code: i32) -> &'static str {
        match code {
            OK => "No error",
            UNSUPPORTED_PROTOCOL => "Unsupported protocol",
            FAILED_INIT => "Failed initialization",
            URL_MALFORMAT => "URL using bad/illegal format or missing URL",
            COULDNT_RESOLVE_HOST => "Couldn't resolve host name",
            COULDNT_CONNECT => "Couldn't connect to server",
            HTTP_RETURNED_ERROR => "HTTP response code said error",
            WRITE_ERROR => "Failed writing received data to disk/application",
            READ_ERROR => "Failed to open/read local data from file/application",
            OPERATION_TIMEDOUT => "Timeout was reached",
            FILE_COULDNT_READ_FILE => "Couldn't read a file:// file",
            ABORTED_BY_CALLBACK => "Operation was aborted by an application callback",
            RECV_ERROR => "Failure when receiving data from the peer",
            _ => "Unknown error",
        }
    }
}

/// One-way cancellation flag shared between the coordinator and the worker
/// that currently owns the job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One fetch. Owned by whichever side last popped it from a queue.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub url: String,
    pub cancel: CancelToken,
    pub bytes_expected: Option<u64>,
    pub bytes_loaded: u64,
    /// Chunks pushed to the progress queue; stamped before the job is reported.
    pub chunks_emitted: u64,
    pub code: i32,
    pub reason: &'static str,
}

impl Job {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            cancel: CancelToken::new(),
            bytes_expected: None,
            bytes_loaded: 0,
            chunks_emitted: 0,
            code: code::OK,
            reason: REASON_DONE,
        }
    }

    pub fn finish(&mut self, code: i32, reason: &'static str) {
        self.code = code;
        self.reason = reason;
    }

    pub fn is_success(&self) -> bool {
        self.code == code::OK
    }
}

/// A bounded run of bytes for one job, plus the job's totals when it was emitted.
#[derive(Debug)]
pub struct Chunk {
    pub job_id: JobId,
    pub sequence: u64,
    pub data: BytesMut,
    pub bytes_loaded: u64,
    pub bytes_expected: Option<u64>,
}

impl Chunk {
    pub fn new(job_id: JobId, sequence: u64, mut data: BytesMut) -> Self {
        data.clear();
        Self {
            job_id,
            sequence,
            data,
            bytes_loaded: 0,
            bytes_expected: None,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Messages on the job queue. `Shutdown` is the sentinel that stops one worker.
#[derive(Debug)]
pub enum JobMessage {
    Fetch(Job),
    Shutdown,
}
