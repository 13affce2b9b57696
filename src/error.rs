//! Error kinds for the halftone engine and the video jobs driving it.

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Zero-sized or unreadable image.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Two timeline presets share a frame number.
    #[error("duplicate preset for frame {frame}")]
    DuplicateKey { frame: i32 },

    /// The video decoder itself failed; ends the whole job.
    #[error("video source error: {0}")]
    Source(String),

    /// One frame failed to process or save; the job keeps going.
    #[error("frame {index}: {message}")]
    Frame { index: u32, message: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_image(msg: impl Into<String>) -> Self {
        Self::InvalidImage(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn source_error(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    pub fn frame(index: u32, msg: impl Into<String>) -> Self {
        Self::Frame {
            index,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Source errors stop a video job; everything else is scoped to one call or frame.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Source(_))
    }
}
