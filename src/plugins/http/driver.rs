use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use std::io::{ErrorKind, Read};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::core::model::code;
use crate::plugins::registry::{DriverContext, FetchRequest, TransferSink, Transport, TransportError};

/// Size of the reads handed to the sink.
const SEGMENT_LEN: usize = 16 * 1024;

#[derive(thiserror::Error, Debug)]
pub enum HttpDriverError {
    #[error("http status error: {0}")]
    Status(StatusCode),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("body read failed: {0}")]
    Body(#[from] std::io::Error),
}

impl HttpDriverError {
    fn code(&self) -> i32 {
        match self {
            HttpDriverError::Status(_) => code::HTTP_RETURNED_ERROR,
            HttpDriverError::Request(e) if e.is_timeout() => code::OPERATION_TIMEDOUT,
            HttpDriverError::Request(e) if e.is_builder() => code::URL_MALFORMAT,
            HttpDriverError::Request(e) if e.is_connect() => code::COULDNT_CONNECT,
            HttpDriverError::Request(_) => code::RECV_ERROR,
            HttpDriverError::Body(e) if e.kind() == ErrorKind::TimedOut => code::OPERATION_TIMEDOUT,
            HttpDriverError::Body(_) => code::RECV_ERROR,
        }
    }
}

impl From<HttpDriverError> for TransportError {
    fn from(e: HttpDriverError) -> Self {
        TransportError::failed(e.code(), e.to_string())
    }
}

pub struct HttpDriver {
    // Kept as a result so a client that cannot be built surfaces per job as an
    // init failure instead of taking the process down.
    client: Result<Client, String>,
}

impl HttpDriver {
    pub fn new(ctx: &DriverContext) -> Self {
        let connect_timeout = (ctx.timeout_secs > 0).then(|| Duration::from_secs(ctx.timeout_secs));
        // The server may hold a request open until it has the next frame, so
        // only connecting is bounded; the blocking client's 30 s default total
        // timeout is switched off.
        let client = Client::builder()
            .user_agent(ctx.user_agent.clone())
            .connect_timeout(connect_timeout)
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| {
                warn!(error = %e, "http client unavailable");
                e.to_string()
            });
        Self { client }
    }

    fn aborted() -> TransportError {
        TransportError::failed(code::ABORTED_BY_CALLBACK, "transfer aborted by sink")
    }

    fn stream_body(mut resp: Response, sink: &mut dyn TransferSink) -> Result<(), TransportError> {
        let expected = resp.content_length();
        if !sink.progress(expected, 0) {
            return Err(Self::aborted());
        }

        let mut buf = vec![0u8; SEGMENT_LEN];
        let mut loaded = 0u64;
        loop {
            let n = match resp.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(HttpDriverError::Body(e).into()),
            };
            loaded += n as u64;
            if !sink.write(&buf[..n]) {
                return Err(Self::aborted());
            }
            if !sink.progress(expected, loaded) {
                return Err(Self::aborted());
            }
        }

        debug!(loaded, ?expected, "http body complete");
        Ok(())
    }
}

impl Transport for HttpDriver {
    fn name(&self) -> &'static str {
        "http-driver"
    }

    fn supports(&self, url: &Url) -> bool {
        url.scheme() == "http" || url.scheme() == "https"
    }

    fn fetch(&self, request: &FetchRequest, sink: &mut dyn TransferSink) -> Result<(), TransportError> {
        let client = self.client.as_ref().map_err(|e| TransportError::Init(e.clone()))?;

        let resp = client
            .get(&request.url)
            .send()
            .map_err(HttpDriverError::from)?;

        if !resp.status().is_success() {
            return Err(HttpDriverError::Status(resp.status()).into());
        }

        Self::stream_body(resp, sink)
    }
}
