use std::fs::File;
use std::io::{ErrorKind, Read};
use tracing::debug;
use url::Url;

use crate::core::model::code;
use crate::plugins::registry::{FetchRequest, TransferSink, Transport, TransportError};

const SEGMENT_LEN: usize = 32 * 1024;

/// Streams `file://` URLs from local disk.
pub struct FileDriver;

impl FileDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for FileDriver {
    fn name(&self) -> &'static str {
        "file-driver"
    }

    fn supports(&self, url: &Url) -> bool {
        url.scheme() == "file"
    }

    fn fetch(&self, request: &FetchRequest, sink: &mut dyn TransferSink) -> Result<(), TransportError> {
        let url = Url::parse(&request.url).map_err(|e| TransportError::failed(code::URL_MALFORMAT, e.to_string()))?;
        let path = url
            .to_file_path()
            .map_err(|_| TransportError::failed(code::URL_MALFORMAT, format!("not a local path: {}", url)))?;

        let mut file = File::open(&path)
            .map_err(|e| TransportError::failed(code::FILE_COULDNT_READ_FILE, format!("{}: {}", path.display(), e)))?;
        let expected = file.metadata().ok().map(|m| m.len());
        debug!(path = %path.display(), ?expected, "reading local file");

        let mut buf = vec![0u8; SEGMENT_LEN];
        let mut loaded = 0u64;
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransportError::failed(code::READ_ERROR, e.to_string())),
            };
            loaded += n as u64;
            if !sink.write(&buf[..n]) || !sink.progress(expected, loaded) {
                return Err(TransportError::failed(code::ABORTED_BY_CALLBACK, "transfer aborted by sink"));
            }
        }
        Ok(())
    }
}
