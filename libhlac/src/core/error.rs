//! error types for hlac

use thiserror::Error;

/// everything the codec can fail with
///
/// Codec code returns these and never recovers locally. The only tolerated
/// degradation is the reader recounting samples when the header trailer is
/// missing, which is not an error at all.
#[derive(Debug, Error)]
pub enum HlacError {
    /// mutually exclusive options, bad bit depth or block width
    #[error("configuration error: {0}")]
    Configuration(String),

    /// bad magic/version, wrong payload size, truncated data
    #[error("corrupt stream: {0}")]
    CorruptStream(String),

    /// buffers with inconsistent channel or sample counts
    #[error("size mismatch: {0}")]
    SizeMismatch(String),

    /// mode tag the decoder does not know
    #[error("unsupported block mode tag {0}")]
    UnsupportedMode(u8),

    /// encoding after the session was flushed
    #[error("encoding session already flushed")]
    SessionClosed,

    /// cancellation flag was raised between block groups
    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl From<std::io::Error> for HlacError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            HlacError::CorruptStream("unexpected end of stream".to_string())
        } else {
            HlacError::Io(e)
        }
    }
}

/// result type for hlac stuff
pub type HlacResult<T> = Result<T, HlacError>;
