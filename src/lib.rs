pub mod core;
pub mod cycle;
pub mod decode;
pub mod plugins;

pub use crate::core::config::EngineConfig;
pub use crate::core::engine::{DownloadHandle, DownloadRequest, Engine};
pub use crate::core::error::EngineError;
pub use crate::core::event_loop::{EventLoop, LocalTokioLoop};
pub use crate::core::events::{ChunkEvent, Completion};
pub use crate::core::model::{code, CancelToken, JobId};
pub use crate::decode::error::{DecodeError, ImageDownloadError};
pub use crate::decode::session::{ImageDownload, ImageDownloader};
pub use crate::plugins::registry::{DriverContext, Transport, TransportRegistry};
