use std::fmt;

/// Why the decoder refused the bytes it was given, or could not produce an
/// image at close.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
    #[error("unrecognised image format")]
    UnknownFormat,

    #[error("no image data received")]
    Empty,

    #[error("image data ended after {0} bytes")]
    Truncated(usize),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Final outcome of an image download that did not produce an image.
#[derive(thiserror::Error, Debug)]
pub enum ImageDownloadError {
    #[error("transport could not start ({reason}, code {code})")]
    TransportInit { code: i32, reason: &'static str },

    #[error("transfer failed ({reason}, code {code})")]
    Transport { code: i32, reason: &'static str },

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),
}

impl ImageDownloadError {
    /// Transport result code, or `None` for decode failures.
    pub fn code(&self) -> Option<i32> {
        match self {
            ImageDownloadError::TransportInit { code, .. } | ImageDownloadError::Transport { code, .. } => {
                Some(*code)
            }
            ImageDownloadError::Decode(_) => None,
        }
    }
}

/// Short label for log fields.
pub struct ErrorKind<'a>(pub &'a ImageDownloadError);

impl fmt::Display for ErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self.0 {
            ImageDownloadError::TransportInit { .. } => "transport-init",
            ImageDownloadError::Transport { .. } => "transport",
            ImageDownloadError::Decode(_) => "decode",
        })
    }
}
