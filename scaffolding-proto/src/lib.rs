pub mod framing;
pub mod kinds;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use framing::*;
pub use kinds::*;
pub use session::*;
pub use transport::*;

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ScaffoldingError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Connection closed while reading {field}: got {received} of {expected} bytes")]
    ConnectionClosed {
        field: FrameField,
        received: usize,
        expected: usize,
    },

    #[error("Timed out after {after:?} while reading {field}")]
    Timeout { field: FrameField, after: Duration },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Frame too large: {length} bytes (max: {max})")]
    FrameTooLarge { length: u32, max: u32 },

    #[error("Unsupported kind {kind}: {message}")]
    UnsupportedKind { kind: String, message: String },

    #[error("Request {kind} rejected with status {status}: {message}")]
    Rejected {
        kind: String,
        status: u8,
        message: String,
    },

    #[error("Ping fingerprint mismatch: sent {sent}, received {received}")]
    FingerprintMismatch { sent: String, received: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Session is not connected")]
    NotConnected,

    #[error("Session is unusable after a failed request")]
    SessionUnusable,
}

impl ScaffoldingError {
    /// True when the stream position is no longer known and the session
    /// must not carry another request. An oversized frame counts: its body
    /// is left unread on the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScaffoldingError::Connection(_)
                | ScaffoldingError::ConnectionClosed { .. }
                | ScaffoldingError::Timeout { .. }
                | ScaffoldingError::FrameTooLarge { .. }
        )
    }
}

impl From<serde_json::Error> for ScaffoldingError {
    fn from(err: serde_json::Error) -> Self {
        ScaffoldingError::Decode(format!("invalid JSON: {}", err))
    }
}

impl From<std::string::FromUtf8Error> for ScaffoldingError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        ScaffoldingError::Decode(format!("invalid UTF-8: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ScaffoldingError>;
