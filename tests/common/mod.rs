#![allow(dead_code)]

use framefetch::core::event_loop::EventLoop;
use framefetch::plugins::registry::{FetchRequest, TransferSink, Transport, TransportError};
use framefetch::code;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};
use url::Url;

type Ticker = Box<dyn FnMut() -> bool>;
type Timer = Box<dyn FnOnce()>;

/// Event loop driven by hand from the test thread.
#[derive(Default)]
pub struct ManualEventLoop {
    tickers: RefCell<Vec<(Duration, Ticker)>>,
    timers: RefCell<Vec<(Duration, Timer)>>,
    installs: Cell<usize>,
}

impl ManualEventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recurring timers ever installed.
    pub fn installs(&self) -> usize {
        self.installs.get()
    }

    /// Recurring timers still alive.
    pub fn tickers(&self) -> usize {
        self.tickers.borrow().len()
    }

    pub fn pending_delays(&self) -> Vec<Duration> {
        self.timers.borrow().iter().map(|(d, _)| *d).collect()
    }

    /// Run every recurring timer once, dropping those that return `false`.
    pub fn tick(&self) {
        let current: Vec<_> = self.tickers.borrow_mut().drain(..).collect();
        let mut kept = Vec::new();
        for (interval, mut tick) in current {
            if tick() {
                kept.push((interval, tick));
            }
        }
        // timers installed during the ticks come after the survivors
        let mut tickers = self.tickers.borrow_mut();
        let added: Vec<_> = tickers.drain(..).collect();
        tickers.extend(kept);
        tickers.extend(added);
    }

    /// Fire every pending one-shot; returns their delays.
    pub fn fire_timers(&self) -> Vec<Duration> {
        let due: Vec<_> = self.timers.borrow_mut().drain(..).collect();
        let delays = due.iter().map(|(d, _)| *d).collect();
        for (_, task) in due {
            task();
        }
        delays
    }

    /// Tick until `done` holds, sleeping briefly between ticks.
    pub fn run_until(&self, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            self.tick();
            if done() {
                return;
            }
            assert!(Instant::now() < deadline, "timed out waiting for the engine");
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl EventLoop for ManualEventLoop {
    fn every(&self, interval: Duration, tick: Ticker) {
        self.installs.set(self.installs.get() + 1);
        self.tickers.borrow_mut().push((interval, tick));
    }

    fn after(&self, delay: Duration, task: Timer) {
        self.timers.borrow_mut().push((delay, task));
    }
}

/// One step of a scripted transfer.
#[derive(Clone)]
pub enum Step {
    Write(Vec<u8>),
    Progress(Option<u64>, u64),
    /// Report progress until the sink asks to stop, then abort.
    HoldUntilCancelled,
    Fail(i32),
    InitFail,
}

/// Plays back a script per URL; unknown URLs fail to connect.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Vec<Step>>>,
    fetches: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, url: &str, steps: Vec<Step>) -> Self {
        self.scripts.lock().unwrap().insert(url.to_string(), steps);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, _url: &Url) -> bool {
        true
    }

    fn fetch(&self, request: &FetchRequest, sink: &mut dyn TransferSink) -> Result<(), TransportError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let steps = self
            .scripts
            .lock()
            .unwrap()
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| vec![Step::Fail(code::COULDNT_CONNECT)]);

        let mut loaded = 0u64;
        for step in steps {
            match step {
                Step::Write(bytes) => {
                    loaded += bytes.len() as u64;
                    if !sink.write(&bytes) {
                        return Err(TransportError::failed(code::ABORTED_BY_CALLBACK, "write refused"));
                    }
                }
                Step::Progress(expected, n) => {
                    if !sink.progress(expected, n) {
                        return Err(TransportError::failed(code::ABORTED_BY_CALLBACK, "progress refused"));
                    }
                }
                Step::HoldUntilCancelled => {
                    let deadline = Instant::now() + Duration::from_secs(10);
                    while sink.progress(None, loaded) {
                        assert!(Instant::now() < deadline, "never cancelled");
                        thread::sleep(Duration::from_millis(1));
                    }
                    return Err(TransportError::failed(code::ABORTED_BY_CALLBACK, "cancelled"));
                }
                Step::Fail(c) => return Err(TransportError::failed(c, "scripted failure")),
                Step::InitFail => return Err(TransportError::Init("scripted init failure".into())),
            }
        }
        Ok(())
    }
}

/// `len` bytes of a recognisable pattern.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::ImageBuffer::from_fn(width, height, |x, y| image::Rgb([x as u8, y as u8, 0x40]));
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}
