use image::DynamicImage;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

use crate::core::engine::{DownloadHandle, DownloadRequest, Engine};
use crate::core::events::{ChunkEvent, Completion};
use crate::core::model::{code, CancelToken, JobId, REASON_INIT_ERROR};
use crate::decode::decoder::{ImageCrateDecoder, IncrementalDecoder};
use crate::decode::error::{DecodeError, ImageDownloadError};

pub type ImageResult = Result<DynamicImage, ImageDownloadError>;
pub type ImageCallback = Box<dyn FnOnce(ImageResult)>;
pub type DecoderFactory = Rc<dyn Fn() -> Box<dyn IncrementalDecoder>>;
pub type ProgressObserver = Rc<dyn Fn(&ChunkEvent<'_>)>;

/// State shared between an [`ImageDownload`] and the engine callbacks of its
/// job. Dropped once both sides have let go.
struct Session {
    decoder: Option<Box<dyn IncrementalDecoder>>,
    failure: Option<DecodeError>,
    on_complete: Option<ImageCallback>,
    cancel: Option<CancelToken>,
    finished: bool,
}

impl Session {
    fn feed(&mut self, chunk: &ChunkEvent<'_>) {
        if self.failure.is_some() {
            return;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        if let Err(e) = decoder.write(chunk.data) {
            warn!(job = %chunk.job_id, error = %e, "decoder rejected data; stopping transfer");
            if let Some(decoder) = self.decoder.take() {
                decoder.abort();
            }
            self.failure = Some(e);
            if let Some(token) = &self.cancel {
                token.cancel();
            }
        }
    }

    fn finish(&mut self, done: &Completion) -> Option<(ImageCallback, ImageResult)> {
        self.finished = true;
        let callback = self.on_complete.take()?;
        let decoder = self.decoder.take();

        let outcome = match (self.failure.take(), decoder) {
            (Some(e), decoder) => {
                if let Some(decoder) = decoder {
                    decoder.abort();
                }
                Err(ImageDownloadError::Decode(e))
            }
            (None, Some(decoder)) if done.is_success() => decoder.close().map_err(Into::into),
            (None, None) if done.is_success() => Err(ImageDownloadError::Decode(DecodeError::Empty)),
            (None, decoder) => {
                if let Some(decoder) = decoder {
                    decoder.abort();
                }
                let reason = code::describe(done.code);
                if done.reason == REASON_INIT_ERROR {
                    Err(ImageDownloadError::TransportInit { code: done.code, reason })
                } else {
                    Err(ImageDownloadError::Transport { code: done.code, reason })
                }
            }
        };
        Some((callback, outcome))
    }

    fn stop(&mut self) {
        self.finished = true;
        self.on_complete = None;
        if let Some(decoder) = self.decoder.take() {
            decoder.abort();
        }
    }
}

/// Downloads images through an [`Engine`], decoding them as the bytes arrive.
#[derive(Clone)]
pub struct ImageDownloader {
    engine: Rc<Engine>,
    decoders: DecoderFactory,
    observer: Option<ProgressObserver>,
}

impl ImageDownloader {
    pub fn new(engine: Rc<Engine>) -> Self {
        Self::with_decoder(engine, Rc::new(|| Box::new(ImageCrateDecoder::new()) as Box<dyn IncrementalDecoder>))
    }

    pub fn with_decoder(engine: Rc<Engine>, decoders: DecoderFactory) -> Self {
        Self { engine, decoders, observer: None }
    }

    /// Also show every chunk to `observer`, after the decoder has seen it.
    pub fn on_progress(mut self, observer: impl Fn(&ChunkEvent<'_>) + 'static) -> Self {
        self.observer = Some(Rc::new(observer));
        self
    }

    pub fn engine(&self) -> &Rc<Engine> {
        &self.engine
    }

    /// Start fetching `url`. `on_complete` runs exactly once on the engine's
    /// thread, unless the download is stopped first.
    pub fn start(
        &self,
        url: impl Into<String>,
        on_complete: impl FnOnce(ImageResult) + 'static,
    ) -> ImageDownload {
        let session = Rc::new(RefCell::new(Session {
            decoder: Some((self.decoders)()),
            failure: None,
            on_complete: Some(Box::new(on_complete)),
            cancel: None,
            finished: false,
        }));

        let feed = session.clone();
        let done = session.clone();
        let observer = self.observer.clone();
        let request = DownloadRequest::new(url)
            .on_progress(move |chunk| {
                feed.borrow_mut().feed(chunk);
                if let Some(observer) = &observer {
                    observer(chunk);
                }
            })
            .on_complete(move |completion| {
                // the user callback may start another download; no borrow held
                let ready = done.borrow_mut().finish(&completion);
                if let Some((callback, outcome)) = ready {
                    callback(outcome);
                }
            });

        let handle = self.engine.submit(request);
        session.borrow_mut().cancel = Some(handle.cancel_token());
        debug!(job = %handle.id(), "image download started");

        ImageDownload { handle, session, engine: self.engine.clone() }
    }
}

/// A running image download. Dropping it lets the download finish and its
/// callback run; [`ImageDownload::stop`] abandons it.
pub struct ImageDownload {
    handle: DownloadHandle,
    session: Rc<RefCell<Session>>,
    engine: Rc<Engine>,
}

impl ImageDownload {
    pub fn id(&self) -> JobId {
        self.handle.id()
    }

    /// Whether the completion has been delivered or the download stopped.
    pub fn is_finished(&self) -> bool {
        self.session.borrow().finished
    }

    /// Abort the transfer and drop the pending callback without calling it.
    pub fn stop(self) {
        let id = self.handle.id();
        let pending = self.engine.cancel(self.handle);
        self.session.borrow_mut().stop();
        debug!(job = %id, pending, "image download stopped");
    }
}
