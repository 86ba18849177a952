use crate::core::model::code;
use clap::{ArgMatches, Command};
use std::sync::Arc;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct DriverContext {
    pub user_agent: String,
    /// Bound on establishing a connection; 0 waits indefinitely. The transfer
    /// itself is never timed out.
    pub timeout_secs: u64,
}

impl Default for DriverContext {
    fn default() -> Self {
        Self {
            user_agent: "framefetch/0.1".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Receives a transfer as it happens. Returning `false` from either method
/// asks the transport to abort with `ABORTED_BY_CALLBACK`.
pub trait TransferSink {
    /// A body segment of any length.
    fn write(&mut self, segment: &[u8]) -> bool;

    /// Running totals; `expected` is `None` while the size is unknown.
    fn progress(&mut self, expected: Option<u64>, loaded: u64) -> bool;
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// The client/session could not be built; nothing was transferred.
    #[error("transport init failed: {0}")]
    Init(String),

    #[error("{} (code {code}): {detail}", code::describe(*.code))]
    Failed { code: i32, detail: String },
}

impl TransportError {
    pub fn failed(code: i32, detail: impl Into<String>) -> Self {
        TransportError::Failed { code, detail: detail.into() }
    }

    pub fn code(&self) -> i32 {
        match self {
            TransportError::Init(_) => code::FAILED_INIT,
            TransportError::Failed { code, .. } => *code,
        }
    }
}

/// Blocking fetch of one URL. Runs on a worker thread.
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, url: &Url) -> bool;

    fn fetch(&self, request: &FetchRequest, sink: &mut dyn TransferSink) -> Result<(), TransportError>;
}

pub trait CliPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn augment_command(&self, cmd: Command) -> Command;
    fn apply_matches(&self, matches: &ArgMatches, ctx: &mut DriverContext) -> anyhow::Result<()>;
}

/// Picks a driver by URL scheme.
pub struct TransportRegistry {
    drivers: Vec<Arc<dyn Transport>>,
    cli_plugins: Vec<Box<dyn CliPlugin>>,
}

impl TransportRegistry {
    pub fn empty() -> Self {
        Self { drivers: vec![], cli_plugins: vec![] }
    }

    /// HTTP(S) and file drivers configured from `ctx`.
    pub fn with_defaults(ctx: &DriverContext) -> Self {
        let mut reg = Self::cli_only();
        reg.register(Arc::new(crate::plugins::http::driver::HttpDriver::new(ctx)));
        reg.register(Arc::new(crate::plugins::file::driver::FileDriver::new()));
        reg
    }

    /// Only the CLI side, for building the command before any driver exists.
    pub fn cli_only() -> Self {
        let mut reg = Self::empty();
        reg.cli_plugins.push(Box::new(crate::plugins::http::cli::HttpCliPlugin::new()));
        reg
    }

    pub fn register(&mut self, driver: Arc<dyn Transport>) {
        self.drivers.push(driver);
    }

    pub fn augment_command(&self, cmd: Command) -> Command {
        self.cli_plugins
            .iter()
            .fold(cmd, |c, p| p.augment_command(c))
    }

    pub fn apply_matches(&self, matches: &ArgMatches, ctx: &mut DriverContext) -> anyhow::Result<()> {
        for p in &self.cli_plugins {
            p.apply_matches(matches, ctx)?;
        }
        Ok(())
    }

    pub fn driver_for(&self, url: &Url) -> Option<Arc<dyn Transport>> {
        self.drivers.iter().find(|d| d.supports(url)).cloned()
    }
}

impl Transport for TransportRegistry {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn supports(&self, url: &Url) -> bool {
        self.drivers.iter().any(|d| d.supports(url))
    }

    fn fetch(&self, request: &FetchRequest, sink: &mut dyn TransferSink) -> Result<(), TransportError> {
        let url = Url::parse(&request.url)
            .map_err(|e| TransportError::failed(code::URL_MALFORMAT, format!("{}: {}", request.url, e)))?;
        let driver = self.driver_for(&url).ok_or_else(|| {
            TransportError::failed(code::UNSUPPORTED_PROTOCOL, format!("no driver for scheme {:?}", url.scheme()))
        })?;
        debug!(driver = driver.name(), url = %url, "selected driver");
        driver.fetch(request, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullSink;

    impl TransferSink for NullSink {
        fn write(&mut self, _segment: &[u8]) -> bool {
            true
        }
        fn progress(&mut self, _expected: Option<u64>, _loaded: u64) -> bool {
            true
        }
    }

    #[test]
    fn malformed_url_is_reported_as_such() {
        let reg = TransportRegistry::empty();
        let err = reg.fetch(&FetchRequest::new("not a url"), &mut NullSink).unwrap_err();
        assert_eq!(err.code(), code::URL_MALFORMAT);
    }

    #[test]
    fn unknown_scheme_is_unsupported() {
        let reg = TransportRegistry::with_defaults(&DriverContext::default());
        let err = reg.fetch(&FetchRequest::new("gopher://example.com/x"), &mut NullSink).unwrap_err();
        assert_eq!(err.code(), code::UNSUPPORTED_PROTOCOL);
    }

    #[test]
    fn defaults_cover_http_and_file() {
        let reg = TransportRegistry::with_defaults(&DriverContext::default());
        assert!(reg.supports(&Url::parse("https://example.com/a.png").unwrap()));
        assert!(reg.supports(&Url::parse("file:///tmp/a.png").unwrap()));
        assert!(!reg.supports(&Url::parse("ftp://example.com/a.png").unwrap()));
    }

    #[test]
    fn init_errors_map_to_failed_init() {
        assert_eq!(TransportError::Init("boom".into()).code(), code::FAILED_INIT);
    }
}
