use image::DynamicImage;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::event_loop::EventLoop;
use crate::decode::error::ErrorKind;
use crate::decode::session::{ImageDownload, ImageDownloader, ImageResult};

/// Receives each decoded frame.
pub trait FrameSink {
    fn present(&mut self, frame: DynamicImage);
}

impl<F: FnMut(DynamicImage)> FrameSink for F {
    fn present(&mut self, frame: DynamicImage) {
        self(frame)
    }
}

#[derive(Debug, Clone)]
pub struct CycleOptions {
    pub url: String,
    /// Wait before the very first fetch.
    pub startup_delay: Duration,
    /// Wait after a frame was shown.
    pub delay: Duration,
    /// Wait after a failed fetch.
    pub retry_delay: Duration,
    /// Stop after this many frames; `None` runs forever.
    pub max_frames: Option<u64>,
}

impl CycleOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            startup_delay: Duration::from_millis(5000),
            delay: Duration::from_millis(1),
            retry_delay: Duration::from_millis(10_000),
            max_frames: None,
        }
    }
}

/// Fetch a frame, show it, wait, repeat.
pub struct FrameCycle {
    downloader: ImageDownloader,
    event_loop: Rc<dyn EventLoop>,
    options: CycleOptions,
    sink: RefCell<Box<dyn FrameSink>>,
    current: RefCell<Option<ImageDownload>>,
    frames: Cell<u64>,
    failures: Cell<u64>,
    stopped: Cell<bool>,
    on_done: RefCell<Option<Box<dyn FnOnce()>>>,
    this: Weak<FrameCycle>,
}

impl FrameCycle {
    pub fn new(
        downloader: ImageDownloader,
        event_loop: Rc<dyn EventLoop>,
        options: CycleOptions,
        sink: Box<dyn FrameSink>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            downloader,
            event_loop,
            options,
            sink: RefCell::new(sink),
            current: RefCell::new(None),
            frames: Cell::new(0),
            failures: Cell::new(0),
            stopped: Cell::new(false),
            on_done: RefCell::new(None),
            this: this.clone(),
        })
    }

    pub fn options(&self) -> &CycleOptions {
        &self.options
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames.get()
    }

    pub fn failures(&self) -> u64 {
        self.failures.get()
    }

    /// Stopped explicitly or after the frame limit.
    pub fn is_done(&self) -> bool {
        self.stopped.get()
    }

    /// Run `f` once when the cycle stops, or now if it already has.
    pub fn on_done(&self, f: impl FnOnce() + 'static) {
        if self.stopped.get() {
            f();
        } else {
            *self.on_done.borrow_mut() = Some(Box::new(f));
        }
    }

    /// Schedule the first fetch after the startup delay.
    pub fn start(&self) {
        info!(url = %self.options.url, delay = ?self.options.startup_delay, "frame cycle starting");
        self.schedule(self.options.startup_delay);
    }

    /// Abandon any fetch in flight and schedule nothing further.
    pub fn stop(&self) {
        if self.stopped.replace(true) {
            return;
        }
        let current = self.current.borrow_mut().take();
        if let Some(download) = current {
            download.stop();
        }
        debug!(frames = self.frames.get(), failures = self.failures.get(), "frame cycle stopped");
        let done = self.on_done.borrow_mut().take();
        if let Some(done) = done {
            done();
        }
    }

    fn schedule(&self, delay: Duration) {
        let this = self.this.clone();
        self.event_loop.after(
            delay,
            Box::new(move || {
                if let Some(cycle) = this.upgrade() {
                    cycle.fetch();
                }
            }),
        );
    }

    fn fetch(&self) {
        if self.stopped.get() {
            return;
        }
        let this = self.this.clone();
        let download = self.downloader.start(self.options.url.clone(), move |result| {
            if let Some(cycle) = this.upgrade() {
                cycle.on_result(result);
            }
        });
        debug!(job = %download.id(), "fetching frame");
        *self.current.borrow_mut() = Some(download);
    }

    fn on_result(&self, result: ImageResult) {
        self.current.borrow_mut().take();
        if self.stopped.get() {
            return;
        }

        let next = match result {
            Ok(frame) => {
                debug!(width = frame.width(), height = frame.height(), "frame ready");
                self.sink.borrow_mut().present(frame);
                self.frames.set(self.frames.get() + 1);
                self.options.delay
            }
            Err(e) => {
                warn!(kind = %ErrorKind(&e), error = %e, "can't fetch frame; retrying");
                self.failures.set(self.failures.get() + 1);
                self.options.retry_delay
            }
        };

        if let Some(limit) = self.options.max_frames {
            if self.frames.get() >= limit {
                info!(frames = self.frames.get(), "frame limit reached");
                self.stop();
                return;
            }
        }
        self.schedule(next);
    }
}
